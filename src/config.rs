use crate::api::HN_API_BASE_URL;
use crate::internal::export::ExportFormat;
use crate::internal::models::SortOrder;
use crate::internal::thread::ThreadOptions;
use crate::internal::tree::{BuildLimits, default_concurrency};
use crate::internal::ui::keybindings::KeyAction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the item API; override to point at a mirror.
    pub api_base_url: String,
    pub thread: ThreadConfig,
    pub logging: LoggingConfig,
    /// Directory exports from the `e` key are written to.
    pub export_directory: String,
    /// Format of exports from the `e` key.
    pub export_format: ExportFormat,
    /// Upper bound on the comment wrap width; `None` wraps to the terminal.
    pub display_width: Option<usize>,
    /// Extra key bindings, e.g. `{"j": NextPage, "Ctrl+r": Refresh}`.
    pub keybindings: HashMap<String, KeyAction>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ThreadConfig {
    pub max_depth: usize,
    pub max_nodes: usize,
    /// Parallel fetches; `None` uses the host CPU count.
    pub concurrency: Option<usize>,
    pub page_size: usize,
    pub sort_by_time: bool,
    /// Background refresh period; 0 disables refreshing.
    pub refresh_interval_secs: u64,
    pub fetch_timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every module (e.g. "info").
    pub level: String,
    /// Where the rolling log file is written; defaults to "logs".
    pub log_directory: Option<String>,
    /// Per-module overrides, e.g. `{"tui_hn_threads::internal::tree": "debug"}`.
    pub module_levels: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: HN_API_BASE_URL.to_string(),
            thread: ThreadConfig::default(),
            logging: LoggingConfig::default(),
            export_directory: ".".to_string(),
            export_format: ExportFormat::Json,
            display_width: None,
            keybindings: HashMap::new(),
        }
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        let limits = BuildLimits::default();
        Self {
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
            concurrency: None,
            page_size: 10,
            sort_by_time: false,
            refresh_interval_secs: 0,
            fetch_timeout_ms: 5_000,
            retries: limits.retries,
            retry_backoff_ms: limits.retry_backoff.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_directory: None,
            module_levels: HashMap::new(),
        }
    }
}

impl ThreadConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1))
    }

    pub fn to_options(&self) -> ThreadOptions {
        ThreadOptions {
            limits: BuildLimits {
                max_depth: self.max_depth,
                max_nodes: self.max_nodes.max(1),
                concurrency: self.concurrency.unwrap_or_else(default_concurrency).max(1),
                retries: self.retries,
                retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            page_size: self.page_size.max(1),
            sort_order: match self.sort_by_time {
                true => SortOrder::ByTime,
                false => SortOrder::Default,
            },
            start_page: 1,
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive string: the base level followed by module overrides.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();
        let mut filter_str = self.level.clone();
        for (module, level) in modules {
            filter_str.push_str(&format!(",{}={}", module, level));
        }
        filter_str
    }
}

impl AppConfig {
    /// Load `config.ron` from the working directory, next to the executable, or
    /// the user config directory, falling back to defaults.
    pub fn load() -> Self {
        let mut candidates = vec![PathBuf::from("config.ron")];

        if let Ok(exe) = std::env::current_exe()
            && let Some(dir) = exe.parent()
        {
            candidates.push(dir.join("config.ron"));
        }
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("tui-hn-threads").join("config.ron"));
        }

        for path in candidates {
            if let Some(config) = Self::load_from(&path) {
                return config;
            }
        }

        tracing::info!("No config file found, using defaults");
        Self::default()
    }

    /// Parse one config file. Missing or invalid files yield `None`.
    pub fn load_from(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Failed to read config at {}: {}", path.display(), e);
                return None;
            }
        };
        match ron::from_str::<AppConfig>(&content) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config at {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = ron::from_str(
            r#"(
    // Only override what matters
    thread: (page_size: 25, refresh_interval_secs: 60),
)"#,
        )
        .unwrap();

        assert_eq!(config.thread.page_size, 25);
        assert_eq!(config.thread.refresh_interval_secs, 60);
        assert_eq!(config.thread.max_nodes, 2000);
        assert_eq!(config.api_base_url, HN_API_BASE_URL);
        assert_eq!(config.logging.level, "info");
        assert!(config.keybindings.is_empty());
        assert_eq!(config.export_format, ExportFormat::Json);
        assert_eq!(config.display_width, None);
    }

    #[test]
    fn test_export_format_and_width_parse() {
        let config: AppConfig =
            ron::from_str(r#"(export_format: csv, display_width: Some(100))"#).unwrap();
        assert_eq!(config.export_format, ExportFormat::Csv);
        assert_eq!(config.display_width, Some(100));
    }

    #[test]
    fn test_keybindings_parse() {
        let config: AppConfig =
            ron::from_str(r#"(keybindings: {"j": NextPage, "Ctrl+r": Refresh})"#).unwrap();
        assert_eq!(config.keybindings.get("j"), Some(&KeyAction::NextPage));
        assert_eq!(config.keybindings.get("Ctrl+r"), Some(&KeyAction::Refresh));
    }

    #[test]
    fn test_to_options() {
        let thread = ThreadConfig {
            concurrency: Some(3),
            sort_by_time: true,
            refresh_interval_secs: 30,
            page_size: 0,
            ..Default::default()
        };
        let options = thread.to_options();

        assert_eq!(options.limits.concurrency, 3);
        assert_eq!(options.sort_order, SortOrder::ByTime);
        assert_eq!(options.refresh_interval, Duration::from_secs(30));
        assert_eq!(options.page_size, 1);
    }

    #[test]
    fn test_filter_directives() {
        let mut logging = LoggingConfig::default();
        logging
            .module_levels
            .insert("tui_hn_threads::internal::tree".to_string(), "debug".to_string());
        logging
            .module_levels
            .insert("reqwest".to_string(), "warn".to_string());

        assert_eq!(
            logging.filter_directives(),
            "info,reqwest=warn,tui_hn_threads::internal::tree=debug"
        );
    }

    #[test]
    fn test_load_from_invalid_file() {
        let path = std::env::temp_dir().join("tui_hn_threads_bad_config.ron");
        fs::write(&path, "not ron at all (").unwrap();
        assert!(AppConfig::load_from(&path).is_none());
        let _ = fs::remove_file(path);

        assert!(AppConfig::load_from(Path::new("/nonexistent/config.ron")).is_none());
    }
}
