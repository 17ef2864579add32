//! Transport-uniform retry with exponential backoff and a shared budget.
//!
//! Connection establishment, `tools/list`, and `tools/call` all run under
//! the same policy. Only transport-level transient failures are retried;
//! once a server has produced a protocol response (including a tool-level
//! error), the result is final.

use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;

use crate::config::Settings;

/// Headroom kept at the end of the budget so the final attempt is not
/// started with effectively no time left.
const BUDGET_HEADROOM: Duration = Duration::from_secs(1);

/// Error codes considered safe to retry.
const TRANSIENT_CODES: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "EPIPE",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EAI_AGAIN",
];

/// HTTP statuses considered safe to retry.
const TRANSIENT_STATUSES: &[u16] = &[429, 502, 503, 504];

/// Message fragments that mark a failure as transient (checked lowercase).
const TRANSIENT_PATTERNS: &[&str] = &[
    "network error",
    "network fail",
    "network unavailable",
    "network timeout",
    "connection reset",
    "connection refused",
    "connection timeout",
    "timeout",
    "timed out",
];

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub total_budget: Duration,
}

impl RetryConfig {
    /// Derive the policy from env-backed settings. The delay ceiling is
    /// `min(10 s, (budget − 5 s) / 2)` so backoff can never eat the
    /// whole budget.
    pub fn from_settings(settings: &Settings) -> Self {
        let budget_ms = settings.timeout.as_millis() as u64;
        let max_delay_ms = (budget_ms.saturating_sub(5_000) / 2).min(10_000).max(1);
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.retry_delay,
            max_delay: Duration::from_millis(max_delay_ms),
            total_budget: settings.timeout,
        }
    }

    /// Undithered backoff for attempt `n` (0-indexed): `min(base·2ⁿ, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        Duration::from_millis(exp_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Backoff with uniform ±25 % jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        self.backoff(attempt).mul_f64(factor)
    }
}

/// Run `op`, retrying transient failures while attempts and at least one
/// second of the shared budget remain. Non-transient failures and
/// exhaustion surface the last error verbatim.
pub async fn with_retry<T, F, Fut>(
    what: &str,
    config: &RetryConfig,
    deadline: Instant,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if attempt >= config.max_retries || remaining <= BUDGET_HEADROOM || !is_transient(&err) {
            return Err(err);
        }

        let delay = config
            .delay_for_attempt(attempt)
            .min(remaining - BUDGET_HEADROOM);
        tracing::debug!(
            "{what}: transient failure on attempt {}: {err:#}; retrying in {delay:?}",
            attempt + 1
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Classify a failure as transient (safe to retry).
pub fn is_transient(err: &anyhow::Error) -> bool {
    if let Some(code) = io_error_code(err) {
        if TRANSIENT_CODES.contains(&code) {
            return true;
        }
    }
    is_transient_message(&format!("{err:#}"))
}

/// Message-based classification, also used for failures that arrive as
/// plain strings (e.g. over the daemon wire).
pub fn is_transient_message(message: &str) -> bool {
    if TRANSIENT_CODES.iter().any(|code| message.contains(code)) {
        return true;
    }
    let lower = message.to_lowercase();
    if let Some(status) = leading_http_status(&lower) {
        if TRANSIENT_STATUSES.contains(&status) {
            return true;
        }
    }
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Map an `io::Error` anywhere in the chain to its errno-style code.
fn io_error_code(err: &anyhow::Error) -> Option<&'static str> {
    use std::io::ErrorKind;
    let io = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())?;
    match io.kind() {
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Some("ECONNRESET"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        ErrorKind::BrokenPipe => Some("EPIPE"),
        ErrorKind::NetworkUnreachable => Some("ENETUNREACH"),
        ErrorKind::HostUnreachable => Some("EHOSTUNREACH"),
        ErrorKind::NotFound => Some("ENOENT"),
        ErrorKind::PermissionDenied => Some("EACCES"),
        _ => None,
    }
}

/// Parse an HTTP status found at the start of the message, optionally
/// after a status-word preamble ("status 503", "HTTP 502", ...).
fn leading_http_status(lower: &str) -> Option<u16> {
    let mut rest = lower.trim_start();
    for prefix in [
        "http status",
        "status code",
        "http error",
        "status",
        "http",
        "error",
    ] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped.trim_start_matches([':', ' ']);
            break;
        }
    }
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 3 {
        digits.parse().ok()
    } else {
        None
    }
}
