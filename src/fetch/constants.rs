//! Constants for the fetch module (timeouts, throttling thresholds).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; comic pages are small, long strips are not).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Default ceiling on simultaneously open requests to one host.
pub const DEFAULT_PER_HOST_CONNECTIONS: usize = 2;

/// Warning threshold for cumulative throttling delay per host (30 seconds).
pub const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Filename prefix for temporary download files.
pub const TEMP_FILE_PREFIX: &str = "comicfetch-";
