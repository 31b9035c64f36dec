//! Client-side request pacing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces calls at least `60 / requests_per_minute` seconds apart.
///
/// The limiter is shared across concurrent summarization tasks, so the
/// effective request rate stays under the provider's per-minute quota no
/// matter how many tasks are in flight.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// A limiter allowing `requests_per_minute` calls. Zero disables pacing.
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / f64::from(requests_per_minute))
        };
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until the next call is allowed, then claims the slot.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let next_allowed = prev + self.min_interval;
            if next_allowed > now {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
