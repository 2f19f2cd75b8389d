//! Consumer-facing loop: pulls a run's results one at a time until the run
//! completes or the consumer goes away.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::{AttachedReceiver, ResultChannel};
use crate::types::ScanResult;

/// What the streamer forwards to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Result(ScanResult),
    /// Sent exactly once, after the last result of the run.
    Complete,
}

/// Why a streamer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Disconnected,
}

/// Pull-based view of one run's results for a single consumer.
///
/// A result leaves the run's queue only when [`EventStreamer::next`] returns it.
/// Dropping the streamer hands any undelivered results back for the next consumer.
#[derive(Debug)]
pub struct EventStreamer {
    channel: Arc<ResultChannel>,
    cancel: CancellationToken,
    rx: Option<AttachedReceiver>,
    finished: bool,
}

impl EventStreamer {
    pub fn new(channel: Arc<ResultChannel>, cancel: CancellationToken) -> Self {
        Self {
            channel,
            cancel,
            rx: None,
            finished: false,
        }
    }

    /// Wait for the next event.
    ///
    /// Attaches to the active run (or waits for the next one) on first use.
    /// Returns `None` after [`StreamEvent::Complete`] or once `cancel` fires.
    /// Cancel-safe: dropping the future loses no result.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let cancel = self.cancel.clone();

        if self.rx.is_none() {
            let attached = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                rx = self.channel.attach() => Some(rx),
            };
            match attached {
                Some(rx) => self.rx = Some(rx),
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }

        let rx = self.rx.as_mut()?;
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            next = rx.recv() => Some(next),
        };
        match next {
            Some(Some(result)) => Some(StreamEvent::Result(result)),
            Some(None) => {
                self.finished = true;
                Some(StreamEvent::Complete)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Forward the active (or next) run to `out` until it completes.
///
/// `cancel` or a closed `out` both count as the consumer disconnecting; either
/// one stops the loop at whatever point it is waiting. The sweep is never told.
/// A slot in `out` is reserved before a result is pulled, so a disconnect never
/// swallows a dequeued result.
pub async fn stream_run(
    channel: &Arc<ResultChannel>,
    out: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> StreamEnd {
    let mut streamer = EventStreamer::new(Arc::clone(channel), cancel.clone());
    let end = loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Disconnected,
            permit = out.reserve() => match permit {
                Ok(p) => p,
                Err(_) => break StreamEnd::Disconnected,
            },
        };

        let event = tokio::select! {
            biased;
            _ = out.closed() => break StreamEnd::Disconnected,
            event = streamer.next() => event,
        };

        match event {
            Some(StreamEvent::Complete) => {
                permit.send(StreamEvent::Complete);
                break StreamEnd::Completed;
            }
            Some(event) => permit.send(event),
            None => break StreamEnd::Disconnected,
        }
    };
    debug!(?end, "event stream ended");
    end
}
