mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use ratatui::widgets::Paragraph;
use tui_hn_threads::api::ApiService;
use tui_hn_threads::config::AppConfig;
use tui_hn_threads::internal::export::{ExportFormat, export_page, export_tree};
use tui_hn_threads::internal::thread::open_thread;
use tui_hn_threads::internal::ui::app::App;
use tui_hn_threads::tui;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let mut config = cli.load_config()?;
    cli.apply(&mut config);

    if cli.export.is_some() {
        init_console_logging(&config);
        return export_once(&cli, &config).await;
    }

    // While the TUI owns the terminal, logs go to a rotating file. If the
    // terminal cannot be initialized, log to the console instead.
    match tui::init() {
        Ok(terminal) => {
            let log_dir = config.logging.log_directory.as_deref().unwrap_or("logs");
            let file_appender = tracing_appender::rolling::daily(log_dir, "tui-hn-threads.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::fmt()
                .with_env_filter(env_filter(&config))
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact()
                .init();

            let res = run_interactive(&cli, config, terminal).await;

            tui::restore()?;

            if let Err(err) = &res {
                tracing::error!("{err:#}");
            }
            res
        }
        Err(e) => {
            init_console_logging(&config);
            tracing::error!("Failed to initialize TUI: {e:?}");
            Err(e).context("Failed to initialize TUI")
        }
    }
}

/// RUST_LOG wins; otherwise the configured level plus per-module overrides.
fn env_filter(config: &AppConfig) -> tracing_subscriber::EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new(config.logging.filter_directives()),
    }
}

fn init_console_logging(config: &AppConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .init();
}

fn fetcher(config: &AppConfig) -> Arc<ApiService> {
    let service = ApiService::with_base_url(config.api_base_url.clone())
        .with_timeout(config.thread.fetch_timeout());
    tracing::info!(base_url = service.base_url(), "using item API");
    Arc::new(service)
}

async fn run_interactive(cli: &Cli, config: AppConfig, mut terminal: tui::Tui) -> Result<()> {
    terminal.draw(|f| {
        f.render_widget(
            Paragraph::new(format!("Loading comments for item {}...", cli.item_id)),
            f.area(),
        )
    })?;

    let mut options = config.thread.to_options();
    if let Some(page) = cli.page {
        options.start_page = page;
    }

    let handle = open_thread(fetcher(&config), cli.item_id, options)
        .await
        .with_context(|| format!("Failed to open item {}", cli.item_id))?;

    let mut app = App::new(handle, config);
    app.run(terminal).await
}

/// Non-interactive mode: one build, one file. The format follows the file
/// extension. With `--page` only that page is written, as flat rows.
async fn export_once(cli: &Cli, config: &AppConfig) -> Result<()> {
    let mut options = config.thread.to_options();
    options.refresh_interval = std::time::Duration::ZERO;
    if let Some(page) = cli.page {
        options.start_page = page;
    }

    let mut handle = open_thread(fetcher(config), cli.item_id, options)
        .await
        .with_context(|| format!("Failed to open item {}", cli.item_id))?;

    let snapshot = handle.snapshot();
    if let Some(path) = &cli.export {
        let format = ExportFormat::from_path(path);
        let contents = match cli.page {
            Some(_) => export_page(&snapshot.tree, &handle.current_page(), format)?,
            None => export_tree(&snapshot.tree, handle.state().sort_order, format)?,
        };
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(
            %format,
            nodes = snapshot.tree.node_count(),
            failed = snapshot.tree.failed_count(),
            "exported item {} to {}",
            cli.item_id,
            path.display()
        );
    }
    handle.close();
    Ok(())
}
