use crate::internal::models::SortOrder;
use crate::internal::paginate::clamp_page;

/// User commands understood by the navigator. Every command is valid in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Prev,
    First,
    Last,
    Goto(i64),
    ToggleSort,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationState {
    pub current_page: usize,
    pub sort_order: SortOrder,
    /// Version of the snapshot this state was last reconciled with.
    pub snapshot_version: u64,
    /// Set by `Quit`; no further transitions happen afterwards.
    pub quit: bool,
}

/// Page/sort state machine. Pure: transitions never touch the network.
#[derive(Debug, Clone)]
pub struct Navigator {
    state: NavigationState,
}

impl Navigator {
    pub fn new(sort_order: SortOrder, snapshot_version: u64) -> Self {
        Self {
            state: NavigationState {
                current_page: 1,
                sort_order,
                snapshot_version,
                quit: false,
            },
        }
    }

    /// Start on a specific page (e.g. `--page` from the command line).
    pub fn starting_at(mut self, page_number: i64, total_pages: usize) -> Self {
        self.state.current_page = clamp_page(page_number, total_pages);
        self
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// Apply one command against a thread currently spanning `total_pages`.
    pub fn apply(&mut self, command: Command, total_pages: usize) -> NavigationState {
        if self.state.quit {
            return self.state;
        }

        let total_pages = total_pages.max(1);
        let page = self.state.current_page.clamp(1, total_pages);

        self.state.current_page = match command {
            Command::Next => (page + 1).min(total_pages),
            Command::Prev => page.saturating_sub(1).max(1),
            Command::First => 1,
            Command::Last => total_pages,
            Command::Goto(n) => clamp_page(n, total_pages),
            Command::ToggleSort => {
                // A re-sort starts over at the first page.
                self.state.sort_order = self.state.sort_order.toggled();
                1
            }
            Command::Quit => {
                self.state.quit = true;
                page
            }
        };

        tracing::debug!(?command, state = ?self.state, "navigation");
        self.state
    }

    /// Reconcile with a newly published snapshot: record its version and keep
    /// the current page inside the new bounds.
    pub fn observe_snapshot(&mut self, version: u64, total_pages: usize) {
        if version == self.state.snapshot_version {
            return;
        }
        self.state.snapshot_version = version;
        self.state.current_page = self.state.current_page.clamp(1, total_pages.max(1));
    }
}
