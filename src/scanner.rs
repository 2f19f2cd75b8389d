use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace};

use crate::channel::{ResultChannel, ResultSender};
use crate::progress::ProgressTracker;
use crate::types::{PortSpec, PortStatus, ScanResult};

/// Connect timeout per probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// One bounded-time TCP connect to `target:port`.
///
/// A completed handshake is `Open` and the socket is closed right away. Timeouts,
/// refusals, unreachable hosts and failed name lookups are all `Closed`.
pub async fn probe(target: &str, port: u16, timeout: Duration) -> PortStatus {
    match time::timeout(timeout, TcpStream::connect((target, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            PortStatus::Open
        }
        Ok(Err(e)) => {
            trace!(%target, port, error = %e, "connect failed");
            PortStatus::Closed
        }
        Err(_) => {
            trace!(%target, port, "connect timed out");
            PortStatus::Closed
        }
    }
}

/// Cleanup for a run: closes the sink and returns the tracker to idle on every exit path,
/// including a panic inside the sweep.
struct RunGuard {
    sink: Option<ResultSender>,
    tracker: Arc<ProgressTracker>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.close();
        }
        self.tracker.finish();
    }
}

/// Sweep `targets` x `ports` in target-major, port-minor order.
///
/// Each pair is probed once, its result pushed to `sink` (waiting while the
/// buffer is full) and then counted on `tracker`. The run carries on when the
/// receiving side is gone; results are then simply not delivered.
pub async fn run(
    targets: Vec<String>,
    ports: Vec<PortSpec>,
    sink: ResultSender,
    tracker: Arc<ProgressTracker>,
    timeout: Duration,
) {
    let guard = RunGuard {
        sink: Some(sink),
        tracker: Arc::clone(&tracker),
    };
    info!(
        targets = targets.len(),
        ports = ports.len(),
        "scan started"
    );

    let mut open = 0u64;
    let mut delivering = true;
    for ip in &targets {
        for spec in &ports {
            let status = probe(ip, spec.port, timeout).await;
            debug!(%ip, port = spec.port, status = status.as_str(), "probed");
            if status == PortStatus::Open {
                open += 1;
            }

            if delivering {
                let result = ScanResult {
                    ip: ip.clone(),
                    port: spec.clone(),
                    status,
                };
                if let Some(sink) = guard.sink.as_ref() {
                    if !sink.push(result).await {
                        debug!("result receiver gone, continuing without delivery");
                        delivering = false;
                    }
                }
            }
            tracker.advance();
        }
    }

    let done = tracker.snapshot();
    info!(scanned = done.current, total = done.total, open, "scan finished");
    drop(guard);
}

/// Launch [`run`] as a detached task that outlives the caller.
pub fn spawn_run(
    targets: Vec<String>,
    ports: Vec<PortSpec>,
    sink: ResultSender,
    tracker: Arc<ProgressTracker>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(targets, ports, sink, tracker, timeout))
}

/// Start an admitted run: record its size, open a fresh result queue and spawn the sweep.
///
/// The caller must already hold admission through [`ProgressTracker::try_start`].
pub fn launch(
    targets: Vec<String>,
    ports: Vec<PortSpec>,
    channel: &ResultChannel,
    tracker: Arc<ProgressTracker>,
    timeout: Duration,
) -> JoinHandle<()> {
    tracker.set_total(targets.len() as u64 * ports.len() as u64);
    let sink = channel.open();
    spawn_run(targets, ports, sink, tracker, timeout)
}
