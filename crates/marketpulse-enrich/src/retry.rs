//! Retry with exponential back-off and jitter for LLM API calls.

use std::future::Future;
use std::time::Duration;

use crate::error::EnrichError;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 429: the provider asked us to slow down.
/// - HTTP 5xx: transient server/infrastructure errors.
///
/// **Not retriable (straight to fallback):**
/// - HTTP 4xx other than 429: bad request or bad credentials; retrying won't fix it.
/// - [`EnrichError::Deserialize`]: malformed response body.
/// - [`EnrichError::EmptyResponse`]: the model returned nothing.
pub(crate) fn is_retriable(err: &EnrichError) -> bool {
    match err {
        EnrichError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        EnrichError::RateLimited { .. } => true,
        EnrichError::Api { status, .. } => *status >= 500,
        EnrichError::Deserialize { .. } | EnrichError::EmptyResponse => false,
    }
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors, sleeping `backoff_base_ms × 2^(attempt-1) ± 25 %` between attempts
/// (capped at 60 s). Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, EnrichError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EnrichError>>,
{
    const MAX_DELAY_MS: u64 = 60_000;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let computed = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(10));
                let capped = computed.min(MAX_DELAY_MS);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "LLM transient error, retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
