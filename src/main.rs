//! CLI entry point for the comicfetch tool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use comicfetch_core::config::{load_default_file_config, load_file_config};
use comicfetch_core::{
    AppContext, PageDownloadReport, PageDownloader, PipelineConfig, Viewport, WindowFill,
};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command, WarmArgs};

/// Extensions the `warm` command treats as page images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = build_config(&args)?;
    let context = AppContext::new(config).context("failed to initialize HTTP client")?;

    let interrupted = context.fetcher().interrupt_handle();
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    match args.command {
        Command::Extract(page) => {
            let downloader = PageDownloader::from_context(&context);
            match downloader.resolve_page(&page.page_url, &page.selector).await {
                Ok((_, urls)) => {
                    for url in urls {
                        println!("{url}");
                    }
                }
                Err(e) if e.is_cancelled() => info!("Interrupted"),
                Err(e) => return Err(e).context("failed to extract image URLs"),
            }
        }
        Command::Download { page, output, .. } => {
            let downloader = PageDownloader::from_context(&context);
            match downloader
                .download_page(&page.page_url, &page.selector, &output)
                .await
            {
                Ok(report) => print_download_summary(&report, &output),
                Err(e) if e.is_cancelled() => info!("Interrupted"),
                Err(e) => return Err(e).context("page download failed"),
            }
        }
        Command::Warm(warm) => run_warm(&context, &warm, &interrupted).await?,
    }

    Ok(())
}

/// Merges defaults, the config file and CLI overrides, in that order.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::default();

    let file_config = match &args.config {
        Some(path) => Some(
            load_file_config(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
        ),
        None => {
            let loaded = load_default_file_config().context("failed to load default config")?;
            if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
                debug!(path = %path.display(), "loaded config file");
            }
            loaded.config
        }
    };
    if let Some(file_config) = &file_config {
        config.apply_file(file_config);
    }

    if let Some(user_agent) = &args.user_agent {
        config.user_agent.clone_from(user_agent);
    }
    if let Some(rate_limit) = args.rate_limit {
        config.min_interval_ms = rate_limit;
    }
    if let Command::Download {
        concurrency: Some(concurrency),
        ..
    } = &args.command
    {
        config.max_concurrent = usize::from(*concurrency);
    }
    if let Command::Warm(WarmArgs {
        radius: Some(radius),
        ..
    }) = &args.command
    {
        config.set_preload_radius(*radius);
    }

    Ok(config)
}

async fn run_warm(context: &AppContext, warm: &WarmArgs, interrupted: &AtomicBool) -> Result<()> {
    let items = list_page_images(&warm.dir)?;
    if items.is_empty() {
        bail!("no page images found in '{}'", warm.dir.display());
    }
    if warm.index >= items.len() {
        bail!(
            "index {} is out of range (directory has {} images)",
            warm.index,
            items.len()
        );
    }

    let (width, height) = warm.viewport;
    let radius = context.config().preload_radius();
    let mut window = context.window_for(items, Viewport::new(width, height, warm.scale));
    info!(
        index = warm.index,
        radius,
        target = window.target_dimension(),
        "filling reading window"
    );

    let fill = window
        .ensure_loaded_window(warm.index, radius, interrupted)
        .await;
    if fill == WindowFill::Cancelled {
        info!("Interrupted");
    }

    let cache = context.decode_cache();
    let loaded: Vec<String> = window
        .loaded_indices()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("loaded: {}", loaded.join(","));
    println!(
        "cache: {} images, {} bytes",
        cache.len(),
        cache.total_cost()
    );

    let undecodable = window
        .loaded_indices()
        .iter()
        .filter(|&&index| !cache.contains(&window.items()[index]))
        .count();
    if undecodable > 0 {
        warn!(undecodable, "some pages could not be decoded or cached");
    }
    Ok(())
}

fn list_page_images(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory '{}'", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect())
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn print_download_summary(report: &PageDownloadReport, output: &Path) {
    for path in &report.saved {
        println!("{}", path.display());
    }
    info!(
        resolved = report.resolved,
        saved = report.saved.len(),
        failed = report.failed,
        cancelled = report.cancelled,
        output = %output.display(),
        "Download complete"
    );
}
