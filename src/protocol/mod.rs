mod client;
mod codec;
mod server;
#[cfg(test)]
mod tests;

pub use client::{BlockingRecords, BlockingRequestClient, RecordCursor, RequestClient};
pub use codec::MAX_FRAME_LEN;
pub use server::{ReplyServer, RequestHandler, ServeOutcome, ServerState};
