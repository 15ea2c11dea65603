use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::ChartResult;

/// Longest accepted JSON line.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub(crate) type Transport = Framed<TcpStream, LinesCodec>;

pub(crate) fn framed(stream: TcpStream) -> ChartResult<Transport> {
    stream.set_nodelay(true)?;
    Ok(Framed::new(
        stream,
        LinesCodec::new_with_max_length(MAX_FRAME_LEN),
    ))
}

pub(crate) async fn send<T: Serialize>(transport: &mut Transport, message: &T) -> ChartResult<()> {
    let line = serde_json::to_string(message)?;
    transport.send(line).await?;
    Ok(())
}

/// `Ok(None)` means the peer closed the connection cleanly.
pub(crate) async fn recv<T: DeserializeOwned>(transport: &mut Transport) -> ChartResult<Option<T>> {
    match transport.next().await {
        None => Ok(None),
        Some(line) => Ok(Some(serde_json::from_str(&line?)?)),
    }
}
