use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::api::NodeFetcher;
use crate::config::AppConfig;
use crate::internal::export::{export_tree, write_export};
use crate::internal::models::Page;
use crate::internal::navigation::{Command, NavigationState};
use crate::internal::notification::Notification;
use crate::internal::refresh::ProgressEvent;
use crate::internal::thread::ThreadHandle;
use crate::internal::ui::keybindings::{KeyAction, KeyBindingMap};

use ratatui::Frame;

/// Longest page number the goto prompt accepts.
const MAX_GOTO_DIGITS: usize = 12;

/// Messages sent through the app action channel.
#[derive(Debug, Clone)]
pub enum Action {
    Navigate(Command),
    Refresh,
    Export,
    ExportFinished(Result<PathBuf, String>),
}

impl From<KeyAction> for Action {
    fn from(action: KeyAction) -> Self {
        match action {
            KeyAction::NextPage => Action::Navigate(Command::Next),
            KeyAction::PrevPage => Action::Navigate(Command::Prev),
            KeyAction::FirstPage => Action::Navigate(Command::First),
            KeyAction::LastPage => Action::Navigate(Command::Last),
            KeyAction::ToggleSort => Action::Navigate(Command::ToggleSort),
            KeyAction::Quit => Action::Navigate(Command::Quit),
            KeyAction::Refresh => Action::Refresh,
            KeyAction::Export => Action::Export,
        }
    }
}

/// Interactive viewer around one open thread.
pub struct App<F: NodeFetcher> {
    pub running: bool,
    pub handle: ThreadHandle<F>,
    pub config: AppConfig,
    pub keybindings: KeyBindingMap,
    pub notification: Option<Notification>,
    /// Digits typed so far for a goto; empty when no goto is pending.
    pub goto_input: String,
    /// Nodes settled by the refresh in flight, if any.
    pub refresh_progress: Option<usize>,
    pub spinner_state: usize,
    pub last_spinner_update: Option<tokio::time::Instant>,
    pub page: Page,
    page_key: (u64, NavigationState),
    progress: BoxStream<'static, ProgressEvent>,
    pub action_tx: UnboundedSender<Action>,
    pub action_rx: UnboundedReceiver<Action>,
}

impl<F: NodeFetcher> App<F> {
    pub fn new(handle: ThreadHandle<F>, config: AppConfig) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        let mut keybindings = KeyBindingMap::with_defaults();
        keybindings.merge_config(&config.keybindings);

        let progress = handle.progress_events().boxed();
        let page = handle.current_page();
        let page_key = (handle.snapshot().version, handle.state());

        Self {
            running: true,
            handle,
            config,
            keybindings,
            notification: None,
            goto_input: String::new(),
            refresh_progress: None,
            spinner_state: 0,
            last_spinner_update: None,
            page,
            page_key,
            progress,
            action_tx,
            action_rx,
        }
    }

    pub fn notify_info(&mut self, message: impl Into<String>) {
        self.notification = Some(Notification::info(message));
    }

    pub fn notify_error(&mut self, message: impl Into<String>) {
        self.notification = Some(Notification::error(message));
    }

    pub fn clear_notification(&mut self) {
        self.notification = None;
    }

    pub async fn run(&mut self, mut tui: crate::tui::Tui) -> Result<()> {
        let mut event_interval = tokio::time::interval(Duration::from_millis(16));

        while self.running {
            let now = tokio::time::Instant::now();
            match self.last_spinner_update {
                Some(last_update) if now.duration_since(last_update).as_millis() >= 100 => {
                    self.spinner_state = self.spinner_state.wrapping_add(1);
                    self.last_spinner_update = Some(now);
                }
                Some(_) => {}
                None => self.last_spinner_update = Some(now),
            }

            if let Some(notification) = &self.notification
                && notification.should_dismiss()
            {
                self.clear_notification();
            }

            self.sync_page();
            tui.draw(|f| self.ui(f))?;

            tokio::select! {
                _ = event_interval.tick() => {
                    if event::poll(Duration::from_millis(0))?
                        && let Event::Key(key) = event::read()?
                        && key.kind == KeyEventKind::Press
                    {
                        self.handle_key_event(key);
                    }
                }
                Some(action) = self.action_rx.recv() => {
                    self.handle_action(action);
                }
                Some(progress) = self.progress.next() => {
                    self.handle_progress(progress);
                }
            }
        }

        self.handle.close();
        Ok(())
    }

    /// Recompute the visible page when the snapshot or the navigation state moved.
    pub fn sync_page(&mut self) {
        let key = (self.handle.snapshot().version, self.handle.state());
        if key != self.page_key {
            self.page = self.handle.current_page();
            self.page_key = key;
        }
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        let plain = !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);

        match key.code {
            KeyCode::Char(c) if plain && c.is_ascii_digit() => {
                if self.goto_input.len() < MAX_GOTO_DIGITS {
                    self.goto_input.push(c);
                }
                return;
            }
            KeyCode::Backspace if !self.goto_input.is_empty() => {
                self.goto_input.pop();
                return;
            }
            KeyCode::Enter if !self.goto_input.is_empty() => {
                let page = self.goto_input.parse::<i64>().unwrap_or(i64::MAX);
                self.goto_input.clear();
                let _ = self.action_tx.send(Action::Navigate(Command::Goto(page)));
                return;
            }
            KeyCode::Esc if !self.goto_input.is_empty() => {
                self.goto_input.clear();
                return;
            }
            _ => {}
        }

        if let Some(action) = self.keybindings.get_action(&key) {
            let _ = self.action_tx.send(action.into());
        }
    }

    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::Navigate(command) => {
                let state = self.handle.dispatch(command);
                tracing::debug!(?command, page = state.current_page, "navigate");
                if state.quit {
                    self.running = false;
                }
            }
            Action::Refresh => match self.handle.is_refreshing() {
                true => self.notify_info("Refresh already in progress"),
                false => {
                    self.handle.request_refresh();
                    self.notify_info("Refreshing...");
                }
            },
            Action::Export => self.start_export(),
            Action::ExportFinished(Ok(path)) => {
                tracing::info!(path = %path.display(), "exported comments");
                self.notify_info(format!("Exported to {}", path.display()));
            }
            Action::ExportFinished(Err(e)) => {
                tracing::error!("Export failed: {}", e);
                self.notify_error(format!("Export failed: {}", e));
            }
        }
    }

    pub fn handle_progress(&mut self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Started { .. } => self.refresh_progress = Some(0),
            ProgressEvent::Progress { nodes } => self.refresh_progress = Some(*nodes),
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. } => {
                self.refresh_progress = None
            }
            ProgressEvent::Dropped => {}
        }
        if let Some(notification) = Notification::from_progress(&event) {
            self.notification = Some(notification);
        }
    }

    /// Write the whole current tree in the configured format off the UI task.
    fn start_export(&mut self) {
        let snapshot = self.handle.snapshot();
        let sort_order = self.handle.state().sort_order;
        let story_id = self.handle.root_id();
        let dir = PathBuf::from(&self.config.export_directory);
        let format = self.config.export_format;
        let tx = self.action_tx.clone();

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                let contents = export_tree(&snapshot.tree, sort_order, format)?;
                write_export(&dir, story_id, format, &contents)
            })
            .await;

            let outcome = match result {
                Ok(Ok(path)) => Ok(path),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(Action::ExportFinished(outcome));
        });
    }

    pub fn get_spinner_char(&self) -> &'static str {
        const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER_FRAMES[self.spinner_state % SPINNER_FRAMES.len()]
    }

    pub fn ui(&self, f: &mut Frame) {
        super::view::draw(self, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::export::ExportFormat;
    use crate::internal::fixture::{FixtureFetcher, flat_thread};
    use crate::internal::models::SortOrder;
    use crate::internal::thread::{ThreadOptions, open_thread};
    use std::sync::Arc;

    async fn app_with(count: u32) -> App<FixtureFetcher> {
        let fetcher = Arc::new(FixtureFetcher::new(flat_thread(count)));
        let options = ThreadOptions {
            page_size: 10,
            ..Default::default()
        };
        let handle = open_thread(fetcher, 0, options).await.unwrap();
        App::new(handle, AppConfig::default())
    }

    fn press(app: &mut App<FixtureFetcher>, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::empty()));
        while let Ok(action) = app.action_rx.try_recv() {
            app.handle_action(action);
        }
        app.sync_page();
    }

    #[tokio::test]
    async fn test_paging_keys() {
        let mut app = app_with(25).await;
        assert_eq!(app.page.page_number, 1);
        assert_eq!(app.page.total_pages, 3);

        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.page.page_number, 2);
        press(&mut app, KeyCode::End);
        assert_eq!(app.page.page_number, 3);
        assert_eq!(app.page.rows.len(), 5);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.page.page_number, 3);
        press(&mut app, KeyCode::Char('g'));
        assert_eq!(app.page.page_number, 1);
    }

    #[tokio::test]
    async fn test_goto_digits() {
        let mut app = app_with(25).await;

        press(&mut app, KeyCode::Char('2'));
        assert_eq!(app.goto_input, "2");
        assert_eq!(app.page.page_number, 1);
        press(&mut app, KeyCode::Enter);
        assert!(app.goto_input.is_empty());
        assert_eq!(app.page.page_number, 2);

        // Out of range clamps to the last page.
        press(&mut app, KeyCode::Char('9'));
        press(&mut app, KeyCode::Char('9'));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.page.page_number, 3);

        // Esc cancels a pending goto instead of quitting.
        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Esc);
        assert!(app.goto_input.is_empty());
        assert!(app.running);
        assert_eq!(app.page.page_number, 3);
    }

    #[tokio::test]
    async fn test_toggle_sort_and_quit() {
        let mut app = app_with(25).await;
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.handle.state().sort_order, SortOrder::ByTime);
        assert_eq!(app.page.page_number, 1);

        press(&mut app, KeyCode::Char('q'));
        assert!(!app.running);
    }

    #[tokio::test]
    async fn test_progress_events_drive_status() {
        let mut app = app_with(3).await;

        app.handle_progress(ProgressEvent::Started { version: 2 });
        assert_eq!(app.refresh_progress, Some(0));
        app.handle_progress(ProgressEvent::Progress { nodes: 2 });
        assert_eq!(app.refresh_progress, Some(2));
        app.handle_progress(ProgressEvent::Failed {
            message: "root item unavailable".to_string(),
        });
        assert_eq!(app.refresh_progress, None);
        assert!(app.notification.is_some());
    }

    #[tokio::test]
    async fn test_refresh_key_publishes_new_snapshot() {
        let mut app = app_with(3).await;
        press(&mut app, KeyCode::Char('r'));

        let mut version = app.handle.snapshot().version;
        for _ in 0..100 {
            if version == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            version = app.handle.snapshot().version;
        }
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn test_export_writes_file() {
        let dir = std::env::temp_dir().join(format!("tui_hn_threads_app_export_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut app = app_with(3).await;
        app.config.export_directory = dir.to_string_lossy().into_owned();
        app.handle_action(Action::Export);

        let action = tokio::time::timeout(Duration::from_secs(5), app.action_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let Action::ExportFinished(Ok(path)) = action else {
            panic!("unexpected action: {:?}", action);
        };
        assert!(path.starts_with(&dir));
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"comments\""));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_export_key_uses_configured_csv_format() {
        let dir = std::env::temp_dir().join(format!("tui_hn_threads_app_csv_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let mut app = app_with(3).await;
        app.config.export_directory = dir.to_string_lossy().into_owned();
        app.config.export_format = ExportFormat::Csv;
        app.handle_key_event(KeyEvent::new(KeyCode::Char('e'), KeyModifiers::empty()));
        let export = app.action_rx.try_recv().unwrap();
        app.handle_action(export);

        let action = tokio::time::timeout(Duration::from_secs(5), app.action_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let Action::ExportFinished(Ok(path)) = action else {
            panic!("unexpected action: {:?}", action);
        };
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("id,parent_id,depth,by,time,text,status"));
        assert_eq!(contents.lines().count(), 4);

        let _ = std::fs::remove_dir_all(dir);
    }
}
