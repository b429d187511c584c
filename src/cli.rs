//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Default CSS selector for page images.
pub const DEFAULT_SELECTOR: &str = "img";

/// Fetch web-comic pages and keep their images ready to read.
#[derive(Parser, Debug)]
#[command(name = "comicfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override `network.userAgent`
    #[arg(long, value_name = "UA", global = true)]
    pub user_agent: Option<String>,

    /// Override `network.minIntervalMs` (0 disables spacing, max 60000)
    #[arg(long, value_name = "MS", global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the image URLs found on a page, one per line
    Extract(PageArgs),

    /// Download every image on a page as numbered files
    Download {
        #[command(flatten)]
        page: PageArgs,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Override `download.maxConcurrent` (1-32)
        #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=32))]
        concurrency: Option<u16>,
    },

    /// Decode the window of local images around a reading position
    Warm(WarmArgs),
}

#[derive(ClapArgs, Debug)]
pub struct PageArgs {
    /// Page URL
    pub page_url: String,

    /// CSS selector matching the page images
    #[arg(short, long, default_value = DEFAULT_SELECTOR)]
    pub selector: String,
}

#[derive(ClapArgs, Debug)]
pub struct WarmArgs {
    /// Directory of page images (read in file-name order)
    pub dir: PathBuf,

    /// Reading position (0-based)
    #[arg(short, long, default_value_t = 0)]
    pub index: usize,

    /// Pages to keep ready on each side; defaults to `reader.preloadRadius`
    #[arg(short, long)]
    pub radius: Option<i64>,

    /// Viewport size in points, `WIDTHxHEIGHT`
    #[arg(long, default_value = "1024x768", value_parser = parse_viewport_size)]
    pub viewport: (u32, u32),

    /// Display scale (pixels per point)
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,
}

fn parse_viewport_size(raw: &str) -> Result<(u32, u32), String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width '{width}': {e}"))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid height '{height}': {e}"))?;
    if width == 0 || height == 0 {
        return Err("viewport dimensions must be positive".to_string());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_extract_defaults_selector() {
        let args = Args::try_parse_from(["comicfetch", "extract", "https://c.example/1"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        let Command::Extract(page) = args.command else {
            panic!("expected extract");
        };
        assert_eq!(page.page_url, "https://c.example/1");
        assert_eq!(page.selector, "img");
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["comicfetch", "-vv", "extract", "u"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["comicfetch", "extract", "u", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_quiet_and_config_are_global() {
        let args = Args::try_parse_from([
            "comicfetch",
            "download",
            "https://c.example/1",
            "-q",
            "--config",
            "/tmp/c.toml",
        ])
        .unwrap();
        assert!(args.quiet);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_cli_download_options() {
        let args = Args::try_parse_from([
            "comicfetch",
            "download",
            "https://c.example/1",
            "-s",
            "#comic img",
            "-o",
            "out",
            "-c",
            "8",
        ])
        .unwrap();
        let Command::Download {
            page,
            output,
            concurrency,
        } = args.command
        else {
            panic!("expected download");
        };
        assert_eq!(page.selector, "#comic img");
        assert_eq!(output, PathBuf::from("out"));
        assert_eq!(concurrency, Some(8));
    }

    #[test]
    fn test_cli_download_concurrency_zero_rejected() {
        let err = Args::try_parse_from(["comicfetch", "download", "u", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_rate_limit_over_max_rejected() {
        let err = Args::try_parse_from(["comicfetch", "--rate-limit", "60001", "extract", "u"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_warm_parses_viewport_and_scale() {
        let args = Args::try_parse_from([
            "comicfetch",
            "warm",
            "pages",
            "--index",
            "12",
            "--radius",
            "4",
            "--viewport",
            "800x1280",
            "--scale",
            "2",
        ])
        .unwrap();
        let Command::Warm(warm) = args.command else {
            panic!("expected warm");
        };
        assert_eq!(warm.dir, PathBuf::from("pages"));
        assert_eq!(warm.index, 12);
        assert_eq!(warm.radius, Some(4));
        assert_eq!(warm.viewport, (800, 1280));
        assert!((warm.scale - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cli_warm_defaults() {
        let args = Args::try_parse_from(["comicfetch", "warm", "pages"]).unwrap();
        let Command::Warm(warm) = args.command else {
            panic!("expected warm");
        };
        assert_eq!(warm.index, 0);
        assert_eq!(warm.radius, None);
        assert_eq!(warm.viewport, (1024, 768));
    }

    #[test]
    fn test_parse_viewport_size_rejects_garbage() {
        assert!(parse_viewport_size("800").is_err());
        assert!(parse_viewport_size("0x600").is_err());
        assert!(parse_viewport_size("axb").is_err());
        assert_eq!(parse_viewport_size("640X480"), Ok((640, 480)));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let err = Args::try_parse_from(["comicfetch"]).unwrap_err();
        assert!(matches!(
            err.kind(),
            clap::error::ErrorKind::MissingSubcommand
                | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        ));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["comicfetch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
