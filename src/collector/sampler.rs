use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::sequence::Handoff;
use crate::record::Record;

/// Synchronous data source called once per tick.
pub trait Producer: Send + 'static {
    fn produce(&mut self) -> Result<Record, String>;
}

impl<F, E> Producer for F
where
    F: FnMut() -> Result<Record, E> + Send + 'static,
    E: fmt::Display,
{
    fn produce(&mut self) -> Result<Record, String> {
        (self)().map_err(|err| err.to_string())
    }
}

/// A tick whose producer call did not fit in the interval.
#[derive(Clone, Debug, Serialize)]
pub struct Overrun {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub interval: Duration,
}

pub type OverrunObserver = Arc<dyn Fn(&Overrun) + Send + Sync>;

pub fn log_overrun(overrun: &Overrun) {
    warn!(
        "producer took {:.2}s on tick {}, longer than the {:.2}s interval; increase the interval",
        overrun.elapsed.as_secs_f64(),
        overrun.tick,
        overrun.interval.as_secs_f64()
    );
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SamplerReport {
    /// Records handed off, which is also the final sequence length.
    pub ticks: u64,
    pub overruns: u64,
    /// Why the producer stopped, if it stopped on its own.
    pub failure: Option<String>,
}

pub(crate) struct Sampler {
    pub(crate) producer: Box<dyn Producer>,
    pub(crate) interval: Duration,
    pub(crate) observer: OverrunObserver,
    pub(crate) cancel: CancellationToken,
    pub(crate) handoff: UnboundedSender<Handoff>,
    pub(crate) runtime: Handle,
}

impl Sampler {
    pub(crate) fn run(mut self) -> SamplerReport {
        let mut report = SamplerReport::default();

        while !self.cancel.is_cancelled() {
            let started = Instant::now();
            let started_at = Utc::now();

            let record = match catch_unwind(AssertUnwindSafe(|| self.producer.produce())) {
                Ok(Ok(record)) => record,
                Ok(Err(err)) => {
                    debug!("producer failed on tick {}: {}", report.ticks, err);
                    report.failure = Some(err);
                    break;
                }
                Err(payload) => {
                    let msg = panic_message(payload);
                    debug!("producer panicked on tick {}: {}", report.ticks, msg);
                    report.failure = Some(msg);
                    break;
                }
            };

            // JSON has no spelling for NaN or infinity, so such a record
            // could never be served.
            if let Some((field, value)) = record.first_non_finite() {
                let msg = format!("field {:?} is not a finite number ({})", field, value);
                debug!("producer failed on tick {}: {}", report.ticks, msg);
                report.failure = Some(msg);
                break;
            }

            if self.handoff.send(Handoff::Record(record)).is_err() {
                debug!("hand-off closed, sampler exiting");
                break;
            }
            report.ticks += 1;

            let elapsed = started.elapsed();
            if elapsed >= self.interval {
                report.overruns += 1;
                (self.observer)(&Overrun {
                    tick: report.ticks - 1,
                    started_at,
                    elapsed,
                    interval: self.interval,
                });
            } else if self.pause(self.interval - elapsed) {
                break;
            }
        }

        report
    }

    /// Waits out the rest of a tick. Returns true if cancelled meanwhile.
    fn pause(&self, remaining: Duration) -> bool {
        let cancel = self.cancel.clone();
        self.runtime.block_on(async move {
            select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = sleep(remaining) => false,
            }
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "producer panicked".to_string()
    }
}
