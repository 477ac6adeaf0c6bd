use crate::api::NodeFetcher;
use crate::internal::models::{Page, SortOrder};
use crate::internal::navigation::{Command, NavigationState, Navigator};
use crate::internal::paginate::{paginate, row_count, total_pages};
use crate::internal::refresh::{
    ProgressEvent, RefreshOutcome, Refresher, Snapshot, spawn_refresh_loop,
};
use crate::internal::tree::{BuildError, BuildLimits, TreeBuilder};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Settings for one opened thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadOptions {
    pub limits: BuildLimits,
    pub page_size: usize,
    pub sort_order: SortOrder,
    /// Page shown first; clamped against the initial snapshot.
    pub start_page: i64,
    /// Zero disables background refresh.
    pub refresh_interval: Duration,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            limits: BuildLimits::default(),
            page_size: 10,
            sort_order: SortOrder::Default,
            start_page: 1,
            refresh_interval: Duration::ZERO,
        }
    }
}

/// Live view over one item's discussion.
///
/// Reads (`current_page`, `snapshot`) only touch the latest published snapshot
/// and never wait on the network. Navigation is applied on the caller's task.
pub struct ThreadHandle<F: NodeFetcher> {
    root_id: u32,
    page_size: usize,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    navigator: Navigator,
    refresher: Arc<Refresher<F>>,
    events: broadcast::Sender<ProgressEvent>,
    cancel: CancellationToken,
    refresh_task: Option<JoinHandle<()>>,
}

/// Build the initial tree for `root_id` and start the engine around it.
///
/// Fails only when the root itself cannot be fetched; no handle and no
/// snapshot exist in that case.
pub async fn open_thread<F: NodeFetcher>(
    fetcher: Arc<F>,
    root_id: u32,
    options: ThreadOptions,
) -> Result<ThreadHandle<F>, BuildError> {
    let cancel = CancellationToken::new();
    let builder = TreeBuilder::new(fetcher, options.limits.clone()).with_cancellation(cancel.clone());

    let tree = builder.build(root_id).await?;
    let total = total_pages(row_count(&tree), options.page_size);
    let snapshot = Arc::new(Snapshot::new(tree, 1));
    let (slot, snapshots) = watch::channel(snapshot);
    let (events, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);

    let refresher = Arc::new(Refresher::new(builder, root_id, slot, events.clone()));
    let refresh_task = match options.refresh_interval.is_zero() {
        true => None,
        false => Some(spawn_refresh_loop(
            Arc::clone(&refresher),
            options.refresh_interval,
            cancel.clone(),
        )),
    };

    tracing::info!(
        root_id,
        refresh_secs = options.refresh_interval.as_secs(),
        "thread opened"
    );

    Ok(ThreadHandle {
        root_id,
        page_size: options.page_size.max(1),
        snapshots,
        navigator: Navigator::new(options.sort_order, 1).starting_at(options.start_page, total),
        refresher,
        events,
        cancel,
        refresh_task,
    })
}

impl<F: NodeFetcher> ThreadHandle<F> {
    pub fn root_id(&self) -> u32 {
        self.root_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Navigation state as reconciled with the latest snapshot. A snapshot
    /// published since the last `dispatch` is reflected here already.
    pub fn state(&self) -> NavigationState {
        self.reconciled(&self.snapshot())
    }

    fn reconciled(&self, snapshot: &Snapshot) -> NavigationState {
        let mut navigator = self.navigator.clone();
        let total = total_pages(row_count(&snapshot.tree), self.page_size);
        navigator.observe_snapshot(snapshot.version, total);
        navigator.state()
    }

    /// Page for the current navigation state against the latest snapshot.
    pub fn current_page(&self) -> Page {
        let snapshot = self.snapshot();
        let state = self.reconciled(&snapshot);
        paginate(
            &snapshot.tree,
            state.sort_order,
            self.page_size,
            i64::try_from(state.current_page).unwrap_or(i64::MAX),
        )
    }

    /// Apply one navigation command. A snapshot published since the last
    /// command is reconciled first so the page stays in range.
    pub fn dispatch(&mut self, command: Command) -> NavigationState {
        let snapshot = self.snapshot();
        let total = total_pages(row_count(&snapshot.tree), self.page_size);
        self.navigator.observe_snapshot(snapshot.version, total);
        self.navigator.apply(command, total)
    }

    /// Progress events from now on. Dropping the stream does not affect the engine;
    /// a consumer that falls behind skips the events it missed.
    pub fn progress_events(&self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures::stream::unfold(self.events.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "progress consumer lagged");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Refresh immediately through the same single-flight guard as the timer.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        if self.is_closed() {
            return RefreshOutcome::Cancelled;
        }
        self.refresher.refresh_once().await
    }

    /// Start a refresh in the background without waiting for it.
    pub fn request_refresh(&self) {
        if self.is_closed() {
            return;
        }
        let refresher = Arc::clone(&self.refresher);
        tokio::spawn(async move {
            refresher.refresh_once().await;
        });
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresher.is_in_flight()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel in-flight builds and stop the refresh loop. Idempotent.
    pub fn close(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }
        tracing::info!(root_id = self.root_id, "thread closed");
    }
}

impl<F: NodeFetcher> Drop for ThreadHandle<F> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchErrorKind;
    use crate::internal::fixture::{FixtureFetcher, comment, flat_thread};
    use crate::internal::models::NodeKind;
    use futures::StreamExt;

    fn options(page_size: usize) -> ThreadOptions {
        ThreadOptions {
            limits: BuildLimits {
                concurrency: 4,
                retry_backoff: Duration::from_millis(1),
                ..Default::default()
            },
            page_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_and_navigate() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(25)));
        let mut handle = open_thread(fetcher, 0, options(10)).await.unwrap();

        let page = handle.current_page();
        assert_eq!(page.page_number, 1);
        assert_eq!(page.total_pages, 3);
        assert_eq!(handle.snapshot().version, 1);

        assert_eq!(handle.dispatch(Command::Goto(5)).current_page, 3);
        assert_eq!(handle.current_page().rows.len(), 5);
        assert_eq!(handle.dispatch(Command::Prev).current_page, 2);

        let state = handle.dispatch(Command::ToggleSort);
        assert_eq!(state.current_page, 1);
        // Timestamps descend with id, so by-time order starts at the newest id
        assert_eq!(handle.current_page().rows[0].node.id, 25);
    }

    #[tokio::test]
    async fn test_open_fails_when_root_unavailable() {
        let fetcher =
            Arc::new(FixtureFetcher::new(flat_thread(3)).failing(0, FetchErrorKind::Transient));
        let result = open_thread(Arc::clone(&fetcher), 0, options(10)).await;

        assert!(matches!(result, Err(BuildError::RootUnavailable(_))));
        // One attempt plus two retries
        assert_eq!(fetcher.calls(0), 3);
    }

    #[tokio::test]
    async fn test_start_page_is_clamped() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(25)));
        let handle = open_thread(
            fetcher,
            0,
            ThreadOptions {
                start_page: 9,
                ..options(10)
            },
        )
        .await
        .unwrap();

        assert_eq!(handle.state().current_page, 3);
    }

    #[tokio::test]
    async fn test_failing_leaf_renders_placeholder() {
        let nodes = vec![
            comment(1, &[2, 3], 0),
            comment(2, &[4], 1),
            comment(3, &[], 2),
            comment(4, &[], 3),
        ];
        let fetcher = Arc::new(FixtureFetcher::new(nodes).failing(4, FetchErrorKind::Permanent));
        let handle = open_thread(fetcher, 1, options(10)).await.unwrap();

        let page = handle.current_page();
        let kinds: Vec<(u32, NodeKind)> = page
            .rows
            .iter()
            .map(|row| (row.node.id, row.node.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (2, NodeKind::Comment),
                (4, NodeKind::Failed),
                (3, NodeKind::Comment)
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_now_publishes_and_navigation_reconciles() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(25)));
        let mut handle = open_thread(fetcher, 0, options(10)).await.unwrap();
        let mut events = Box::pin(handle.progress_events());

        handle.dispatch(Command::Last);
        assert_eq!(handle.refresh_now().await, RefreshOutcome::Published(2));

        let state = handle.dispatch(Command::First);
        assert_eq!(state.snapshot_version, 2);

        assert_eq!(
            events.next().await,
            Some(ProgressEvent::Started { version: 2 })
        );
    }

    #[tokio::test]
    async fn test_state_reflects_new_snapshot_before_dispatch() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(25)));
        let mut handle = open_thread(fetcher, 0, options(10)).await.unwrap();
        handle.dispatch(Command::Last);

        assert_eq!(handle.refresh_now().await, RefreshOutcome::Published(2));

        let state = handle.state();
        assert_eq!(state.snapshot_version, 2);
        assert_eq!(state.current_page, 3);
        assert_eq!(handle.current_page().page_number, state.current_page);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_refresh() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(3)));
        let mut handle = open_thread(
            Arc::clone(&fetcher),
            0,
            ThreadOptions {
                refresh_interval: Duration::from_secs(1),
                ..options(10)
            },
        )
        .await
        .unwrap();

        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.refresh_now().await, RefreshOutcome::Cancelled);

        // Reads still work against the last snapshot
        assert_eq!(handle.current_page().total_rows, 3);
    }

    #[tokio::test]
    async fn test_dropping_progress_stream_does_not_affect_engine() {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(3)));
        let handle = open_thread(fetcher, 0, options(10)).await.unwrap();

        drop(handle.progress_events());
        assert_eq!(handle.refresh_now().await, RefreshOutcome::Published(2));
    }
}
