//! Pipeline configuration and config-file loading.
//!
//! Options use dotted camel-case keys (`network.perHost`,
//! `reader.preloadRadius`, ...). The file format is one `key = value` per
//! line with `#` comments; strings are double-quoted.
//!
//! ```text
//! # ~/.config/comicfetch/config.toml
//! network.userAgent = "MyReader/1.0"
//! network.perHost = 2
//! reader.preloadRadius = 4   # pages either side
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::decode::{DEFAULT_CACHE_COST_BYTES, DEFAULT_CACHE_ENTRIES};
use crate::fetch::{DEFAULT_MIN_INTERVAL, FetcherOptions};
use crate::user_agent;

/// Largest accepted preload radius.
pub const MAX_PRELOAD_RADIUS: usize = 12;

/// Default preload radius.
pub const DEFAULT_PRELOAD_RADIUS: usize = 3;

/// Default decode ceiling in pixels.
pub const DEFAULT_DOWNSAMPLE_MAX_PIXEL: u32 = 2048;

/// Default number of concurrent image downloads per page.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default per-host connection ceiling.
pub const DEFAULT_PER_HOST: usize = 2;

/// Errors raised while loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not of the form `key = value`.
    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax {
        /// 1-based line number.
        line: usize,
    },

    /// A value could not be parsed or is out of range.
    #[error("invalid value for `{key}` on line {line}: '{value}' (expected {expected})")]
    InvalidValue {
        /// The option key.
        key: String,
        /// The raw value text.
        value: String,
        /// Description of what was expected.
        expected: &'static str,
        /// 1-based line number.
        line: usize,
    },

    /// The key is not a recognized option.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// The unrecognized key.
        key: String,
        /// 1-based line number.
        line: usize,
    },
}

/// Effective settings for the acquisition pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// `network.userAgent`.
    pub user_agent: String,
    /// `network.perHost`: concurrently open requests per host.
    pub per_host: usize,
    /// `network.minIntervalMs`: minimum spacing of request starts per host.
    pub min_interval_ms: u64,
    /// `download.maxConcurrent`: image downloads in flight per page.
    pub max_concurrent: usize,
    /// `reader.downsampleMaxPixel`: ceiling on decode target dimension.
    pub downsample_max_pixel: u32,
    preload_radius: usize,
    /// `cache.maxEntries`.
    pub cache_max_entries: usize,
    /// `cache.maxCostBytes`.
    pub cache_max_cost_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: user_agent::default_user_agent(),
            per_host: DEFAULT_PER_HOST,
            min_interval_ms: u64::try_from(DEFAULT_MIN_INTERVAL.as_millis()).unwrap_or(250),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            downsample_max_pixel: DEFAULT_DOWNSAMPLE_MAX_PIXEL,
            preload_radius: DEFAULT_PRELOAD_RADIUS,
            cache_max_entries: DEFAULT_CACHE_ENTRIES,
            cache_max_cost_bytes: DEFAULT_CACHE_COST_BYTES,
        }
    }
}

impl PipelineConfig {
    /// `reader.preloadRadius`, always within `0..=MAX_PRELOAD_RADIUS`.
    #[must_use]
    pub fn preload_radius(&self) -> usize {
        self.preload_radius
    }

    /// Sets the preload radius, clamping to `0..=MAX_PRELOAD_RADIUS`.
    pub fn set_preload_radius(&mut self, radius: i64) {
        self.preload_radius = clamp_radius(radius);
    }

    /// Overlays every option present in `file`.
    pub fn apply_file(&mut self, file: &FileConfig) {
        if let Some(user_agent) = &file.user_agent {
            self.user_agent.clone_from(user_agent);
        }
        if let Some(per_host) = file.per_host {
            self.per_host = per_host;
        }
        if let Some(min_interval_ms) = file.min_interval_ms {
            self.min_interval_ms = min_interval_ms;
        }
        if let Some(max_concurrent) = file.max_concurrent {
            self.max_concurrent = max_concurrent;
        }
        if let Some(max_pixel) = file.downsample_max_pixel {
            self.downsample_max_pixel = max_pixel;
        }
        if let Some(radius) = file.preload_radius {
            self.set_preload_radius(radius);
        }
        if let Some(entries) = file.cache_max_entries {
            self.cache_max_entries = entries;
        }
        if let Some(cost) = file.cache_max_cost_bytes {
            self.cache_max_cost_bytes = cost;
        }
    }

    /// Fetcher options derived from the network settings.
    #[must_use]
    pub fn fetcher_options(&self) -> FetcherOptions {
        FetcherOptions {
            user_agent: self.user_agent.clone(),
            per_host_connections: self.per_host,
            ..FetcherOptions::default()
        }
    }
}

fn clamp_radius(radius: i64) -> usize {
    usize::try_from(radius.max(0)).map_or(MAX_PRELOAD_RADIUS, |r| r.min(MAX_PRELOAD_RADIUS))
}

/// Options read from a config file; `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// `network.userAgent`.
    pub user_agent: Option<String>,
    /// `network.perHost`.
    pub per_host: Option<usize>,
    /// `network.minIntervalMs`.
    pub min_interval_ms: Option<u64>,
    /// `download.maxConcurrent`.
    pub max_concurrent: Option<usize>,
    /// `reader.downsampleMaxPixel`.
    pub downsample_max_pixel: Option<u32>,
    /// `reader.preloadRadius`, unclamped as written.
    pub preload_radius: Option<i64>,
    /// `cache.maxEntries`.
    pub cache_max_entries: Option<usize>,
    /// `cache.maxCostBytes`.
    pub cache_max_cost_bytes: Option<usize>,
}

/// Result of looking for the default config file.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path, if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file contents when the file exists.
    pub config: Option<FileConfig>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/comicfetch/config.toml`
/// 2. `$HOME/.config/comicfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("comicfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("comicfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the default config file if it exists.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or parsed.
pub fn load_default_file_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(existing) if existing.exists() => Some(load_file_config(existing)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read, or a parse error.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&raw)
}

/// Parses config file text.
///
/// # Errors
///
/// Returns [`ConfigError`] on the first malformed line, unknown key, or
/// invalid value.
pub fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_number = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax { line: line_number });
        };
        let key = raw_key.trim();
        let value = ValueToken {
            key,
            raw: raw_value.trim(),
            line: line_number,
        };

        match key {
            "network.userAgent" => cfg.user_agent = Some(value.string()?),
            "network.perHost" => cfg.per_host = Some(value.positive()?),
            "network.minIntervalMs" => cfg.min_interval_ms = Some(value.non_negative()?),
            "download.maxConcurrent" => cfg.max_concurrent = Some(value.positive()?),
            "reader.downsampleMaxPixel" => cfg.downsample_max_pixel = Some(value.positive()?),
            "reader.preloadRadius" => cfg.preload_radius = Some(value.integer()?),
            "cache.maxEntries" => cfg.cache_max_entries = Some(value.positive()?),
            "cache.maxCostBytes" => cfg.cache_max_cost_bytes = Some(value.positive()?),
            unknown => {
                return Err(ConfigError::UnknownKey {
                    key: unknown.to_string(),
                    line: line_number,
                });
            }
        }
    }
    Ok(cfg)
}

struct ValueToken<'a> {
    key: &'a str,
    raw: &'a str,
    line: usize,
}

impl ValueToken<'_> {
    fn invalid(&self, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.key.to_string(),
            value: self.raw.to_string(),
            expected,
            line: self.line,
        }
    }

    fn string(&self) -> Result<String, ConfigError> {
        self.raw
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .map(str::to_string)
            .ok_or_else(|| self.invalid("a double-quoted string"))
    }

    fn integer(&self) -> Result<i64, ConfigError> {
        self.raw
            .parse::<i64>()
            .map_err(|_| self.invalid("an integer"))
    }

    fn non_negative<T: TryFrom<i64>>(&self) -> Result<T, ConfigError> {
        let value = self.integer()?;
        T::try_from(value).map_err(|_| self.invalid("a non-negative integer"))
    }

    fn positive<T: TryFrom<i64>>(&self) -> Result<T, ConfigError> {
        match self.integer()? {
            value if value > 0 => {
                T::try_from(value).map_err(|_| self.invalid("a positive integer in range"))
            }
            _ => Err(self.invalid("a positive integer")),
        }
    }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}
