use std::{future::Future, time::Duration};

use crate::Result;

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_delay: Duration,
}

impl RetryPolicy {
	pub fn from_config(cfg: &coach_config::SyncConfig) -> Self {
		Self {
			max_attempts: cfg.max_attempts,
			base_delay: Duration::from_millis(cfg.retry_base_ms),
		}
	}

	/// Linear backoff: the n-th failure waits n times the base delay.
	pub fn delay_after(&self, attempt: u32) -> Duration {
		self.base_delay * attempt
	}
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut attempt = 0;

	loop {
		attempt += 1;

		match op().await {
			Ok(value) => {
				if attempt > 1 {
					tracing::info!(attempt, label, "Attempt succeeded after retries.");
				}

				return Ok(value);
			},
			Err(err) if attempt < policy.max_attempts => {
				tracing::warn!(error = %err, attempt, label, "Attempt failed; retrying.");
				tokio::time::sleep(policy.delay_after(attempt)).await;
			},
			Err(err) => {
				tracing::error!(error = %err, attempt, label, "Attempts exhausted.");

				return Err(err);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;
	use crate::Error;

	fn policy() -> RetryPolicy {
		RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(100) }
	}

	fn failure() -> Error {
		Error::Sqlx(sqlx::Error::PoolClosed)
	}

	#[test]
	fn backoff_grows_linearly() {
		let policy = policy();

		assert_eq!(policy.delay_after(1), Duration::from_millis(100));
		assert_eq!(policy.delay_after(2), Duration::from_millis(200));
	}

	#[tokio::test(start_paused = true)]
	async fn succeeds_on_the_last_allowed_attempt() {
		let attempts = AtomicU32::new(0);
		let result = with_retry(policy(), "test", || {
			let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;

			async move { if attempt < 3 { Err(failure()) } else { Ok(attempt) } }
		})
		.await;

		assert_eq!(result.expect("should succeed on attempt 3"), 3);
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn exhaustion_returns_the_last_error() {
		let attempts = AtomicU32::new(0);
		let result: Result<()> = with_retry(policy(), "test", || {
			attempts.fetch_add(1, Ordering::SeqCst);

			async { Err(failure()) }
		})
		.await;

		assert!(result.is_err());
		assert_eq!(attempts.load(Ordering::SeqCst), 3);
	}
}
