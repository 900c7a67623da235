//! Constants for the download module (timeouts, pacing, size caps).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large archives).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Hard cap on a single archive payload (500 MB). Applied both to the
/// declared Content-Length during validation and to the streamed byte count
/// during the real fetch.
pub const MAX_ARCHIVE_BYTES: u64 = 500 * 1024 * 1024;

/// Maximum Retry-After header value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Initial and lower bound for the adaptive request delay.
pub const MIN_REQUEST_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for the adaptive request delay.
pub const MAX_REQUEST_DELAY: Duration = Duration::from_secs(60);

/// Consecutive successes required before the delay is eased.
pub const SUCCESS_STREAK_THRESHOLD: u32 = 10;

/// Consecutive errors tolerated before the delay is increased.
pub const ERROR_STREAK_THRESHOLD: u32 = 3;

/// Multiplier applied to the delay after a sustained success streak.
pub const EASE_FACTOR: f64 = 0.95;

/// Multiplier applied to the delay when the server signals throttling.
pub const THROTTLE_FACTOR: f64 = 2.0;

/// Multiplier applied to the delay after a sustained error streak.
pub const ERROR_FACTOR: f64 = 1.5;
