//! Bounded retry with exponential backoff and jitter.
//!
//! Applies to the top-level snapshot fetch only. Per-run reads inside a
//! crawl are never retried: a failed run is omitted from that refresh and
//! the next manual refresh picks it up if the data reappears.

use rand::Rng;
use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::source::SourceError;

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
            jitter_factor: 0.3,
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor;
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }
}

/// Transient failures are worth another attempt; a missing path, denied
/// access, or garbage payload will not improve by waiting.
pub fn is_retryable(err: &SourceError) -> bool {
    match err {
        SourceError::Transport { .. } => true,
        SourceError::Status { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
        SourceError::NotFound(_) | SourceError::Forbidden(_) | SourceError::Malformed { .. } => {
            false
        }
    }
}

/// Retry a fallible source operation, backing off between attempts.
pub async fn retry_source<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut last_error: Option<SourceError> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(e);
                }
                if attempt < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    log(
                        Level::Warn,
                        Domain::Source,
                        "retry",
                        obj(&[
                            ("operation", v_str(operation_name)),
                            ("attempt", serde_json::json!(attempt + 1)),
                            ("max", serde_json::json!(config.max_retries + 1)),
                            ("error", v_str(&e.to_string())),
                            ("delay_ms", serde_json::json!(delay.as_millis() as u64)),
                        ]),
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SourceError::Transport {
        path: operation_name.to_string(),
        reason: "retry exhausted without error".to_string(),
    }))
}
