use std::net::SocketAddr;

use log::debug;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::runtime::{Builder, Runtime};

use super::codec::{self, Transport};
use crate::config::ClientConfig;
use crate::error::{ChartError, ChartResult};
use crate::record::{Record, Reply, Request};

/// Client side of a session. Holds at most one request in flight, so replies
/// pair with requests by order alone.
pub struct RequestClient {
    transport: Transport,
    peer: SocketAddr,
}

impl RequestClient {
    pub async fn connect(config: &ClientConfig) -> ChartResult<Self> {
        RequestClient::connect_to(config.connect_addr()).await
    }

    pub async fn connect_to(addr: impl ToSocketAddrs) -> ChartResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        debug!("connected to {}", peer);
        Ok(RequestClient {
            transport: codec::framed(stream)?,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends one request and waits for its reply. Any error here ends the
    /// session; there is no retry.
    pub async fn request(&mut self, request: &Request) -> ChartResult<Reply> {
        codec::send(&mut self.transport, request).await?;
        codec::recv::<Reply>(&mut self.transport)
            .await?
            .ok_or(ChartError::ConnectionClosed)
    }
}

/// Walks the sequence from index 0, one request per record, and stops for
/// good at the terminator.
pub struct RecordCursor {
    client: RequestClient,
    next_index: u64,
    done: bool,
    failed: bool,
}

impl RecordCursor {
    pub fn new(client: RequestClient) -> Self {
        RecordCursor {
            client,
            next_index: 0,
            done: false,
            failed: false,
        }
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// True once the terminator has been received.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// `Ok(None)` only after the terminator. Once a request has failed the
    /// session is unusable and every later call returns
    /// `ChartError::ConnectionClosed`.
    pub async fn next_record(&mut self) -> ChartResult<Option<Record>> {
        if self.failed {
            return Err(ChartError::ConnectionClosed);
        }
        if self.done {
            return Ok(None);
        }
        let reply = match self.client.request(&Request::at(self.next_index)).await {
            Ok(reply) => reply,
            Err(err) => {
                debug!("request {} failed: {}", self.next_index, err);
                self.failed = true;
                return Err(err);
            }
        };
        match reply {
            Reply::Record(record) => {
                self.next_index += 1;
                Ok(Some(record))
            }
            Reply::End => {
                debug!("stream ended after {} records", self.next_index);
                self.done = true;
                Ok(None)
            }
        }
    }

    pub fn into_client(self) -> RequestClient {
        self.client
    }
}

/// Blocking front for callers outside async code. Owns a current-thread
/// runtime; do not use it from inside another runtime.
pub struct BlockingRequestClient {
    runtime: Runtime,
    client: RequestClient,
}

impl BlockingRequestClient {
    pub fn connect(config: &ClientConfig) -> ChartResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ChartError::Runtime)?;
        let client = runtime.block_on(RequestClient::connect(config))?;
        Ok(BlockingRequestClient { runtime, client })
    }

    pub fn request(&mut self, request: &Request) -> ChartResult<Reply> {
        self.runtime.block_on(self.client.request(request))
    }

    pub fn into_records(self) -> BlockingRecords {
        BlockingRecords {
            runtime: self.runtime,
            cursor: RecordCursor::new(self.client),
        }
    }
}

pub struct BlockingRecords {
    runtime: Runtime,
    cursor: RecordCursor,
}

impl BlockingRecords {
    pub fn next_index(&self) -> u64 {
        self.cursor.next_index()
    }
}

impl Iterator for BlockingRecords {
    type Item = ChartResult<Record>;

    /// Yields a failure once, then ends.
    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.has_failed() {
            return None;
        }
        self.runtime.block_on(self.cursor.next_record()).transpose()
    }
}
