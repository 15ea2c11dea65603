pub mod chart;
pub mod collector;
pub mod config;
mod error;
pub mod protocol;
mod record;

pub use chart::ChartWindow;
pub use collector::{Collector, CollectorState, Overrun, SamplerReport, SequenceReader};
pub use config::{ClientConfig, CollectorConfig, ServerConfig};
pub use error::{ChartError, ChartResult};
pub use protocol::{
    BlockingRequestClient, RecordCursor, ReplyServer, RequestClient, RequestHandler, ServeOutcome,
    ServerState,
};
pub use record::{Record, Reply, Request};
