use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use tokio::select;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::protocol::RequestHandler;
use crate::record::{Record, Reply, Request};

/// Values carried from the sampler thread to the pull loop.
#[derive(Debug)]
pub(crate) enum Handoff {
    Record(Record),
    Finished,
}

/// Append-only history of records. The pull loop is the only writer.
pub(crate) struct Sequence {
    records: RwLock<Vec<Record>>,
    appended: Notify,
}

impl Sequence {
    pub(crate) fn new() -> Self {
        Sequence {
            records: RwLock::new(Vec::new()),
            appended: Notify::new(),
        }
    }

    async fn append(&self, record: Record) {
        self.records.write().await.push(record);
        self.appended.notify_waiters();
    }

    pub(crate) async fn pull(self: Arc<Self>, mut handoff: UnboundedReceiver<Handoff>) {
        let mut pulled = 0u64;
        while let Some(value) = handoff.recv().await {
            match value {
                Handoff::Record(record) => {
                    self.append(record).await;
                    pulled += 1;
                }
                Handoff::Finished => break,
            }
        }
        debug!("hand-off drained after {} records", pulled);
    }
}

/// Read side of a collector's sequence. Cheap to clone.
#[derive(Clone)]
pub struct SequenceReader {
    inner: Arc<Sequence>,
}

impl SequenceReader {
    pub(crate) fn new(inner: Arc<Sequence>) -> Self {
        SequenceReader { inner }
    }

    /// Returns the record at `index`, waiting until it has been appended.
    ///
    /// There is no deadline: if the sampler never produces that many records
    /// this never resolves. Wrap it in `tokio::time::timeout` or race it
    /// against a cancellation token when that matters.
    pub async fn get(&self, index: usize) -> Record {
        loop {
            // Registered before the length check so an append in between
            // still wakes us.
            let appended = self.inner.appended.notified();
            if let Some(record) = self.inner.records.read().await.get(index) {
                return record.clone();
            }
            appended.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> Vec<Record> {
        self.inner.records.read().await.clone()
    }

    /// Request handler backed by this sequence. Once `finish` is cancelled
    /// every request is answered with the terminator.
    pub fn handler(&self, finish: CancellationToken) -> SequenceHandler {
        SequenceHandler {
            reader: self.clone(),
            finish,
        }
    }
}

pub struct SequenceHandler {
    reader: SequenceReader,
    finish: CancellationToken,
}

impl RequestHandler for SequenceHandler {
    type Error = Infallible;

    fn handle(
        &mut self,
        request: Request,
    ) -> impl Future<Output = Result<Reply, Self::Error>> + Send {
        let reader = self.reader.clone();
        let finish = self.finish.clone();
        async move {
            let index = match usize::try_from(request.index) {
                Ok(index) => index,
                Err(_) => {
                    // Unaddressable here, so it can only ever end.
                    finish.cancelled().await;
                    return Ok(Reply::End);
                }
            };
            select! {
                biased;
                _ = finish.cancelled() => Ok(Reply::End),
                record = reader.get(index) => Ok(Reply::Record(record)),
            }
        }
    }
}
