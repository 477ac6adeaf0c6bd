use crate::api::NodeFetcher;
use crate::internal::models::Tree;
use crate::internal::tree::{BuildError, TreeBuilder};
use jiff::Timestamp;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Immutable, versioned, point-in-time tree. Readers hold it through an `Arc`
/// and never observe a partially built tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tree: Tree,
    pub version: u64,
    pub fetched_at: Timestamp,
}

impl Snapshot {
    pub fn new(tree: Tree, version: u64) -> Self {
        Self {
            tree,
            version,
            fetched_at: Timestamp::now(),
        }
    }
}

/// Discrete progress notifications for a refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        version: u64,
    },
    Progress {
        nodes: usize,
    },
    Completed {
        version: u64,
        nodes: usize,
        truncated: bool,
        failed: usize,
    },
    Failed {
        message: String,
    },
    /// A tick arrived while another refresh was still running.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published(u64),
    Failed,
    Dropped,
    Cancelled,
}

/// Re-runs the tree build for one root and publishes the result into the
/// shared snapshot slot. At most one refresh runs at a time.
pub struct Refresher<F> {
    builder: TreeBuilder<F>,
    root_id: u32,
    slot: watch::Sender<Arc<Snapshot>>,
    events: broadcast::Sender<ProgressEvent>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the refresh ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<F: NodeFetcher> Refresher<F> {
    pub fn new(
        builder: TreeBuilder<F>,
        root_id: u32,
        slot: watch::Sender<Arc<Snapshot>>,
        events: broadcast::Sender<ProgressEvent>,
    ) -> Self {
        Self {
            builder,
            root_id,
            slot,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run one refresh cycle, or drop it if another is still running.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::debug!(root_id = self.root_id, "refresh already in flight, dropping tick");
            self.emit(ProgressEvent::Dropped);
            return RefreshOutcome::Dropped;
        }
        let _guard = InFlight(&self.in_flight);

        let version = self.slot.borrow().version + 1;
        tracing::info!(root_id = self.root_id, version, "refresh started");
        self.emit(ProgressEvent::Started { version });

        let events = self.events.clone();
        let built = self
            .builder
            .build_with_progress(self.root_id, move |nodes| {
                let _ = events.send(ProgressEvent::Progress { nodes });
            })
            .await;

        match built {
            Ok(tree) => {
                let completed = ProgressEvent::Completed {
                    version,
                    nodes: tree.node_count(),
                    truncated: tree.truncated(),
                    failed: tree.failed_count(),
                };
                self.slot.send_replace(Arc::new(Snapshot::new(tree, version)));
                tracing::info!(root_id = self.root_id, version, "snapshot published");
                self.emit(completed);
                RefreshOutcome::Published(version)
            }
            Err(BuildError::Cancelled) => {
                tracing::debug!(root_id = self.root_id, "refresh cancelled");
                RefreshOutcome::Cancelled
            }
            Err(err) => {
                tracing::warn!(root_id = self.root_id, "refresh failed, keeping previous snapshot: {}", err);
                self.emit(ProgressEvent::Failed {
                    message: err.to_string(),
                });
                RefreshOutcome::Failed
            }
        }
    }
}

/// Fire `refresh_once` every `period` until `cancel` fires. Each tick runs in
/// its own task, so a tick that lands during a slow refresh is dropped rather
/// than queued.
pub fn spawn_refresh_loop<F: NodeFetcher>(
    refresher: Arc<Refresher<F>>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let refresher = Arc::clone(&refresher);
                    tokio::spawn(async move {
                        refresher.refresh_once().await;
                    });
                }
            }
        }
        tracing::debug!("refresh loop stopped");
    })
}
