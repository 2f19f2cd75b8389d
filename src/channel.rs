//! Per-run bounded result queue between the sweep and whoever streams it.
//!
//! Each admitted run opens a fresh channel. The producer half goes to the sweep;
//! the consumer half is parked in a slot until a streamer attaches. A streamer
//! that stops before the run is drained hands the receiver back, so the next
//! consumer resumes where it left off.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};

use crate::types::ScanResult;

/// Buffer size of a run's result queue.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    pending: Option<mpsc::Receiver<ScanResult>>,
}

#[derive(Debug)]
pub struct ResultChannel {
    capacity: usize,
    slot: Mutex<Slot>,
    ready: Notify,
}

impl Default for ResultChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ResultChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slot: Mutex::new(Slot::default()),
            ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the queue for a new run, discarding any unclaimed receiver of a previous run.
    pub fn open(&self) -> ResultSender {
        let (tx, rx) = mpsc::channel(self.capacity);
        {
            let mut slot = self.lock();
            slot.generation += 1;
            slot.pending = Some(rx);
        }
        self.ready.notify_waiters();
        ResultSender { tx }
    }

    /// Wait until a run's receiver is available and take it.
    ///
    /// Cancel-safe: dropping the future before it resolves claims nothing.
    pub async fn attach(self: &Arc<Self>) -> AttachedReceiver {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(rx) = self.try_attach() {
                return rx;
            }
            notified.await;
        }
    }

    /// Take the parked receiver if there is one.
    pub fn try_attach(self: &Arc<Self>) -> Option<AttachedReceiver> {
        let mut slot = self.lock();
        let rx = slot.pending.take()?;
        Some(AttachedReceiver {
            channel: Arc::clone(self),
            generation: slot.generation,
            rx: Some(rx),
            drained: false,
        })
    }

    fn hand_back(&self, generation: u64, rx: mpsc::Receiver<ScanResult>) {
        {
            let mut slot = self.lock();
            if slot.generation != generation || slot.pending.is_some() {
                return;
            }
            slot.pending = Some(rx);
        }
        self.ready.notify_waiters();
    }
}

/// Producer half, owned by the sweep. Closing consumes it, so nothing can be pushed afterwards.
#[derive(Debug)]
pub struct ResultSender {
    tx: mpsc::Sender<ScanResult>,
}

impl ResultSender {
    /// Push one result, waiting while the buffer is full.
    ///
    /// Returns `false` when the receiver is gone for good (superseded or shut down).
    pub async fn push(&self, result: ScanResult) -> bool {
        self.tx.send(result).await.is_ok()
    }

    /// Signal "no more results". Buffered items stay readable.
    pub fn close(self) {
        drop(self.tx);
    }
}

/// Consumer half claimed by a streamer.
#[derive(Debug)]
pub struct AttachedReceiver {
    channel: Arc<ResultChannel>,
    generation: u64,
    rx: Option<mpsc::Receiver<ScanResult>>,
    drained: bool,
}

impl AttachedReceiver {
    /// Next buffered result, or `None` once the run closed the queue and it is empty.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<ScanResult> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Some(result) => Some(result),
            None => {
                self.drained = true;
                None
            }
        }
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }
}

impl Drop for AttachedReceiver {
    fn drop(&mut self) {
        if self.drained {
            return;
        }
        if let Some(rx) = self.rx.take() {
            self.channel.hand_back(self.generation, rx);
        }
    }
}
