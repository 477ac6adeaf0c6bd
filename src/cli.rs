use clap::Parser;
use std::path::PathBuf;
use tui_hn_threads::config::AppConfig;

/// Browse a Hacker News discussion one page at a time.
#[derive(Parser, Debug, Clone)]
#[command(name = "tui-hn-threads", version, about, long_about = None)]
pub struct Cli {
    /// Story or comment id whose replies to browse.
    #[arg(value_name = "ITEM_ID")]
    pub item_id: u32,

    /// Comments per page.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Page to open first; out-of-range values are clamped.
    #[arg(long, allow_negative_numbers = true)]
    pub page: Option<i64>,

    /// Max simultaneous item fetches.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Deepest reply level to fetch.
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Max nodes to fetch per build.
    #[arg(long)]
    pub max_nodes: Option<usize>,

    /// Background refresh period in seconds (0 disables).
    #[arg(long, value_name = "SECS")]
    pub refresh: Option<u64>,

    /// Order siblings by post time.
    #[arg(long, default_value_t = false)]
    pub sort_by_time: bool,

    /// Wrap comment text at most this many columns wide.
    #[arg(short = 'w', long)]
    pub width: Option<usize>,

    /// Item API base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Config file path (optional; will search defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Build the tree once, write it to this path and exit. A `.csv`
    /// path is written as CSV, anything else as JSON. Combined with
    /// `--page`, only that page is written.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.page_size != Some(0), "--page-size must be > 0");
        anyhow::ensure!(self.threads != Some(0), "--threads must be > 0");
        anyhow::ensure!(self.max_nodes != Some(0), "--max-nodes must be > 0");
        anyhow::ensure!(self.width != Some(0), "--width must be > 0");
        if let Some(url) = &self.base_url {
            anyhow::ensure!(!url.trim().is_empty(), "--base-url must be non-empty");
        }
        Ok(())
    }

    /// Load the config named by `--config`, or search the default locations.
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load_from(path)
                .ok_or_else(|| anyhow::anyhow!("Could not load config from {}", path.display())),
            None => Ok(AppConfig::load()),
        }
    }

    /// Command-line values win over the config file.
    pub fn apply(&self, config: &mut AppConfig) {
        let thread = &mut config.thread;
        if let Some(page_size) = self.page_size {
            thread.page_size = page_size;
        }
        if let Some(threads) = self.threads {
            thread.concurrency = Some(threads);
        }
        if let Some(max_depth) = self.max_depth {
            thread.max_depth = max_depth;
        }
        if let Some(max_nodes) = self.max_nodes {
            thread.max_nodes = max_nodes;
        }
        if let Some(refresh) = self.refresh {
            thread.refresh_interval_secs = refresh;
        }
        if self.sort_by_time {
            thread.sort_by_time = true;
        }
        if let Some(width) = self.width {
            config.display_width = Some(width);
        }
        if let Some(url) = &self.base_url {
            config.api_base_url = url.clone();
        }
    }
}
