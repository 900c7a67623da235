//! Adaptive pacing for all outbound requests.
//!
//! This module provides the [`RateLimiter`] struct: a single shared gate
//! every network call passes through. The gate enforces a minimum delay
//! between dispatched requests and adapts that delay to server feedback —
//! doubling on throttling, growing on sustained errors, and easing slowly
//! after sustained success.
//!
//! # Overview
//!
//! The limiter is deliberately global rather than per-host: the pipeline
//! targets one catalog server, so one gate serializes pacing across all
//! concurrent fetches. The asymmetric factors (×2.0 on throttling, ×0.95
//! after ten straight successes) bias toward caution.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use harvester_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::with_defaults());
//!
//! limiter.wait().await;
//! // ... issue the request ...
//! limiter.on_success().await;
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{
    EASE_FACTOR, ERROR_FACTOR, ERROR_STREAK_THRESHOLD, MAX_REQUEST_DELAY, MAX_RETRY_AFTER,
    MIN_REQUEST_DELAY, SUCCESS_STREAK_THRESHOLD, THROTTLE_FACTOR,
};

/// State behind the pacing gate.
///
/// Owned exclusively by the limiter; mutated only through the outcome
/// callbacks. The read-modify-write of `delay` and `last_dispatch` must be
/// serialized, hence the single Mutex.
#[derive(Debug)]
struct PacerState {
    /// Current delay between dispatched requests.
    delay: Duration,
    /// Consecutive successful requests since the last adjustment.
    consecutive_successes: u32,
    /// Consecutive failed requests (any kind).
    consecutive_errors: u32,
    /// Time of the most recently dispatched request.
    /// `None` means nothing has been dispatched yet (first call is immediate).
    last_dispatch: Option<Instant>,
}

/// Shared adaptive rate limiter for all pipeline requests.
///
/// Wrap in `Arc` and share across tasks. Callers holding the internal lock
/// also sleep under it, which is what serializes pacing: two concurrent
/// `wait()` calls cannot both dispatch inside the same delay window.
#[derive(Debug)]
pub struct RateLimiter {
    /// Lower bound for the adaptive delay.
    min_delay: Duration,
    /// Upper bound for the adaptive delay.
    max_delay: Duration,
    state: Mutex<PacerState>,
}

impl RateLimiter {
    /// Creates a rate limiter with explicit delay bounds.
    ///
    /// The delay starts at `min_delay`. Bounds are swapped if given in the
    /// wrong order.
    #[must_use]
    #[instrument(skip_all, fields(min_ms = min_delay.as_millis(), max_ms = max_delay.as_millis()))]
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        let (min_delay, max_delay) = if min_delay <= max_delay {
            (min_delay, max_delay)
        } else {
            (max_delay, min_delay)
        };
        debug!("creating rate limiter");
        Self {
            min_delay,
            max_delay,
            state: Mutex::new(PacerState {
                delay: min_delay,
                consecutive_successes: 0,
                consecutive_errors: 0,
                last_dispatch: None,
            }),
        }
    }

    /// Creates a rate limiter with the default bounds (500 ms – 60 s).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(MIN_REQUEST_DELAY, MAX_REQUEST_DELAY)
    }

    /// Returns the configured lower delay bound.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Returns the configured upper delay bound.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the current adaptive delay.
    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.delay
    }

    /// Suspends the caller until at least the current delay has elapsed
    /// since the previous dispatched request.
    ///
    /// The first call proceeds immediately. The internal lock is held across
    /// the sleep so concurrent callers are dispatched one delay apart.
    #[instrument(skip(self))]
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        if let Some(last_dispatch) = state.last_dispatch {
            let elapsed = last_dispatch.elapsed();
            if elapsed < state.delay {
                let pause = state.delay.saturating_sub(elapsed);
                debug!(pause_ms = pause.as_millis(), "pacing request");
                tokio::time::sleep(pause).await;
            }
        } else {
            debug!("first request - no pacing delay");
        }

        state.last_dispatch = Some(Instant::now());
    }

    /// Records a successful request.
    ///
    /// After ten consecutive successes the delay is eased by 5 % toward the
    /// lower bound and the streak restarts.
    #[instrument(skip(self))]
    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_errors = 0;
        state.consecutive_successes += 1;

        if state.consecutive_successes >= SUCCESS_STREAK_THRESHOLD {
            state.consecutive_successes = 0;
            let eased = state.delay.mul_f64(EASE_FACTOR).max(self.min_delay);
            if eased != state.delay {
                debug!(
                    delay_ms = eased.as_millis(),
                    "easing request delay after sustained success"
                );
                state.delay = eased;
            }
        }
    }

    /// Records a throttling signal from the server (HTTP 429 or equivalent).
    ///
    /// Doubles the delay toward the upper bound and resets the success
    /// streak.
    #[instrument(skip(self))]
    pub async fn on_rate_limited(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes = 0;
        state.consecutive_errors += 1;
        state.delay = state.delay.mul_f64(THROTTLE_FACTOR).min(self.max_delay);

        warn!(
            delay_ms = state.delay.as_millis(),
            "server throttling detected - backing off"
        );
    }

    /// Records a non-throttling transient failure.
    ///
    /// After more than three consecutive errors the delay grows ×1.5, capped
    /// at the upper bound.
    #[instrument(skip(self))]
    pub async fn on_error(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes = 0;
        state.consecutive_errors += 1;

        if state.consecutive_errors > ERROR_STREAK_THRESHOLD {
            state.delay = state.delay.mul_f64(ERROR_FACTOR).min(self.max_delay);
            warn!(
                consecutive_errors = state.consecutive_errors,
                delay_ms = state.delay.as_millis(),
                "repeated request errors - slowing down"
            );
        }
    }

    /// Raises the delay to honor a server-mandated Retry-After value.
    ///
    /// The value is capped at one hour and then at the limiter's upper
    /// bound; it never lowers the current delay.
    #[instrument(skip(self), fields(delay_ms = delay.as_millis()))]
    pub async fn apply_server_delay(&self, delay: Duration) {
        let capped = delay.min(MAX_RETRY_AFTER).min(self.max_delay);
        let mut state = self.state.lock().await;
        if capped > state.delay {
            debug!(delay_ms = capped.as_millis(), "honoring Retry-After delay");
            state.delay = capped;
        }
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports both RFC 7231 formats: integer seconds and HTTP-date. Returns
/// `None` if the value cannot be parsed. Caps excessive values at 1 hour.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Integer seconds first (most common)
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    // HTTP-date
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            // Date is in the past
            Err(_) => Some(Duration::ZERO),
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}
