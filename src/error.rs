use std::fmt;
use std::io;

use tokio_util::codec::LinesCodecError;

pub type ChartResult<T> = Result<T, ChartError>;

#[derive(Debug)]
pub enum ChartError {
    Io(io::Error),
    Codec(LinesCodecError),
    Json(serde_json::Error),
    /// The peer went away while a request or reply was still owed.
    ConnectionClosed,
    Handler(String),
    InvalidState(&'static str),
    Join(String),
    Runtime(io::Error),
}

impl fmt::Display for ChartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartError::Io(err) => write!(f, "transport i/o failed: {}", err),
            ChartError::Codec(err) => write!(f, "frame decoding failed: {}", err),
            ChartError::Json(err) => write!(f, "malformed message: {}", err),
            ChartError::ConnectionClosed => write!(f, "connection closed by peer"),
            ChartError::Handler(msg) => write!(f, "request handler failed: {}", msg),
            ChartError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            ChartError::Join(msg) => write!(f, "background worker died: {}", msg),
            ChartError::Runtime(err) => write!(f, "failed to build runtime: {}", err),
        }
    }
}

impl std::error::Error for ChartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChartError::Io(err) | ChartError::Runtime(err) => Some(err),
            ChartError::Codec(err) => Some(err),
            ChartError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ChartError {
    fn from(err: io::Error) -> Self {
        ChartError::Io(err)
    }
}

impl From<LinesCodecError> for ChartError {
    fn from(err: LinesCodecError) -> Self {
        ChartError::Codec(err)
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(err: serde_json::Error) -> Self {
        ChartError::Json(err)
    }
}
