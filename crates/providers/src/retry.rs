use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use wayfarer_core::errors::ProviderError;

/// Backoff policy shared by every outbound provider call.
#[derive(Clone, Copy, Debug)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetrySettings {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay_ms = self.base_delay_ms;
        for _ in 0..attempt {
            delay_ms = delay_ms.saturating_mul(2);
        }
        delay_ms = delay_ms.min(self.max_delay_ms);
        let jitter_ms = rand::thread_rng().gen_range(0..=delay_ms / 4);
        Duration::from_millis(delay_ms + jitter_ms)
    }
}

/// Runs `operation`, retrying only retryable failures. Attempt numbering
/// starts at zero, so `max_retries = 2` allows up to three calls total.
pub async fn with_retry<F, Fut, T>(
    provider: &str,
    settings: RetrySettings,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempt < settings.max_retries => {
                let delay = settings.delay_for_attempt(attempt);
                warn!(
                    provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "provider call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
