//! Default User-Agent for outbound page and image requests.
//!
//! Comic hosts routinely reject obviously automated clients, so the default
//! is a current desktop browser string. Users can override it through the
//! `network.userAgent` config option.

/// Desktop browser User-Agent sent when no override is configured.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Returns the default User-Agent as an owned string.
#[must_use]
pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
