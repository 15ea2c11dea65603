mod sampler;
mod sequence;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CollectorConfig;
use crate::error::{ChartError, ChartResult};
use crate::record::Record;

use sampler::Sampler;
use sequence::{Handoff, Sequence};

pub use sampler::{log_overrun, Overrun, OverrunObserver, Producer, SamplerReport};
pub use sequence::{SequenceHandler, SequenceReader};

const SAMPLER_THREAD_NAME: &str = "remote-chart-sampler";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
    Stopped,
}

struct Running {
    cancel: CancellationToken,
    handoff: UnboundedSender<Handoff>,
    sampler: thread::JoinHandle<SamplerReport>,
    puller: JoinHandle<()>,
}

/// Samples a producer on its own thread and keeps every record it returns,
/// in order, for lookup by index.
pub struct Collector {
    producer: Option<Box<dyn Producer>>,
    interval: Duration,
    observer: OverrunObserver,
    sequence: Arc<Sequence>,
    state: CollectorState,
    running: Option<Running>,
}

impl Collector {
    pub fn new(producer: impl Producer, interval: Duration) -> Self {
        Collector {
            producer: Some(Box::new(producer)),
            interval,
            observer: Arc::new(log_overrun),
            sequence: Arc::new(Sequence::new()),
            state: CollectorState::Idle,
            running: None,
        }
    }

    pub fn from_config(producer: impl Producer, config: &CollectorConfig) -> Self {
        Collector::new(producer, config.interval())
    }

    /// Replaces the default overrun warning (a `log::warn!`).
    pub fn with_overrun_observer(
        mut self,
        observer: impl Fn(&Overrun) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reader(&self) -> SequenceReader {
        SequenceReader::new(Arc::clone(&self.sequence))
    }

    /// Spawns the sampler thread and the pull loop. Needs a tokio runtime.
    pub fn start(&mut self) -> ChartResult<()> {
        if self.state != CollectorState::Idle {
            return Err(ChartError::InvalidState("collector can only be started once"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ChartError::InvalidState("collector must start inside a tokio runtime")
        })?;
        let producer = self
            .producer
            .take()
            .ok_or(ChartError::InvalidState("collector has no producer"))?;

        let (handoff, pending) = unbounded_channel();
        let cancel = CancellationToken::new();
        let puller = runtime.spawn(Arc::clone(&self.sequence).pull(pending));

        let sampler = Sampler {
            producer,
            interval: self.interval,
            observer: Arc::clone(&self.observer),
            cancel: cancel.clone(),
            handoff: handoff.clone(),
            runtime: runtime.clone(),
        };
        let sampler = match thread::Builder::new()
            .name(SAMPLER_THREAD_NAME.into())
            .spawn(move || sampler.run())
        {
            Ok(handle) => handle,
            Err(err) => {
                puller.abort();
                self.state = CollectorState::Stopped;
                return Err(ChartError::Io(err));
            }
        };

        debug!("collector started, interval {:?}", self.interval);
        self.running = Some(Running {
            cancel,
            handoff,
            sampler,
            puller,
        });
        self.state = CollectorState::Running;
        Ok(())
    }

    /// Stops sampling and drains the hand-off. Once this returns the
    /// sequence holds exactly `report.ticks` records and never grows again.
    pub async fn stop(&mut self) -> ChartResult<SamplerReport> {
        let running = match (self.state, self.running.take()) {
            (CollectorState::Running, Some(running)) => running,
            _ => return Err(ChartError::InvalidState("collector is not running")),
        };
        self.state = CollectorState::Stopped;

        running.cancel.cancel();
        let sampler = running.sampler;
        let report = tokio::task::spawn_blocking(move || sampler.join())
            .await
            .map_err(|err| ChartError::Join(err.to_string()))?
            .map_err(|_| ChartError::Join("sampler thread panicked".into()))?;

        // The pull loop may already be gone if it was aborted; then there is
        // nothing left to drain.
        let _ = running.handoff.send(Handoff::Finished);
        running
            .puller
            .await
            .map_err(|err| ChartError::Join(err.to_string()))?;

        debug!(
            "collector stopped after {} ticks ({} overruns)",
            report.ticks, report.overruns
        );
        Ok(report)
    }

    pub async fn get(&self, index: usize) -> Record {
        self.reader().get(index).await
    }

    pub async fn len(&self) -> usize {
        self.reader().len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}
