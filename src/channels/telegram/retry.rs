//! Backoff for the getUpdates polling loop
//!
//! Polling never gives up; consecutive failures only stretch the wait.

use std::time::{Duration, SystemTime};

/// Backoff policy for failed Bot API polls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay after the first failure (doubles each consecutive failure)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Whether a failed poll is worth logging as transient
///
/// Rate limits (429) and server errors (5xx) clear up on their own. Anything
/// else (bad token, a competing webhook or poller) needs an operator.
#[must_use]
pub fn is_recoverable(status: u16, body: &str) -> bool {
    if status == 429 || (500..600).contains(&status) {
        return true;
    }

    let lower = body.to_lowercase();
    lower.contains("timed out") || lower.contains("connection reset")
}

/// Extract `parameters.retry_after` (seconds) from a Bot API error body
#[must_use]
pub fn parse_retry_after(body: &str) -> Option<Duration> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = v.get("parameters")?.get("retry_after")?.as_u64()?;

    Some(Duration::from_secs(secs))
}

/// Delay before the next poll after `failures` consecutive failures
///
/// A server-provided `retry_after` wins (capped at `max_delay`). Otherwise
/// `base_delay * 2^failures` plus up to 25% clock-derived jitter, capped.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    failures: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(failures))
        .min(policy.max_delay);

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let jitter = base / 4 * (nanos % 100) / 100;

    (base + jitter).min(policy.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(is_recoverable(429, ""));
        assert!(is_recoverable(502, ""));
        assert!(is_recoverable(200, "request Timed Out"));
    }

    #[test]
    fn operator_statuses() {
        assert!(!is_recoverable(401, ""));
        assert!(!is_recoverable(409, r#"{"description":"Conflict: terminated by other getUpdates request"}"#));
    }

    #[test]
    fn retry_after_is_read_from_parameters() {
        let body = r#"{"ok":false,"error_code":429,"parameters":{"retry_after":7}}"#;
        assert_eq!(parse_retry_after(body), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(r#"{"ok":false}"#), None);
        assert_eq!(parse_retry_after("<html>"), None);
    }

    #[test]
    fn retry_after_wins_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            delay_for_attempt(&policy, 5, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            delay_for_attempt(&policy, 0, Some(Duration::from_secs(600))),
            policy.max_delay
        );
    }

    #[test]
    fn delay_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };

        let first = delay_for_attempt(&policy, 0, None);
        let third = delay_for_attempt(&policy, 2, None);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));
        assert_eq!(delay_for_attempt(&policy, 30, None), policy.max_delay);
    }
}
