//! Bounded retries with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use saffron_workflow::{StepContext, StepError, StepFn, StepOutput};

/// Backoff configuration applied between retryable step failures.
///
/// The raw delay after the Nth failed attempt is
/// `min(base_delay * 2^(N-1), max_delay)`; half of it is kept fixed and the
/// other half drawn uniformly at random, so concurrent retries against the
/// same origin spread out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Base delay for exponential backoff.
  pub base_delay: Duration,

  /// Cap on the raw backoff delay.
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

impl RetryPolicy {
  /// Whether another attempt is allowed after `attempt` consecutive
  /// failures under a per-step retry ceiling.
  ///
  /// A ceiling of N permits N retries, so the step fails terminally on the
  /// (N+1)-th consecutive failure and never earlier.
  pub fn should_retry(&self, attempt: u32, max_retries: u32) -> bool {
    attempt <= max_retries
  }

  /// Jittered delay before the attempt after `attempt` failures (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
    let raw = self.base_delay.saturating_mul(multiplier).min(self.max_delay);
    let half = raw / 2;
    half + rand::rng().random_range(Duration::ZERO..=half)
  }
}

/// Outcome of driving one step through the retry loop.
#[derive(Debug)]
pub enum StepRun {
  /// The body returned; `attempts` counts every invocation made.
  Completed {
    attempts: u32,
    result: Result<StepOutput, StepError>,
  },

  /// The run was cancelled before the body settled; nothing to record.
  Cancelled,
}

/// Execute a step body under its retry ceiling.
///
/// Retryable failures sleep the backoff and go again while attempts remain;
/// terminal failures return immediately. Cancellation is observed both
/// while the body runs and during backoff sleeps.
pub async fn run_step(
  body: StepFn,
  ctx: StepContext,
  max_retries: u32,
  policy: &RetryPolicy,
  cancel: &CancellationToken,
) -> StepRun {
  let mut attempts = 0u32;
  loop {
    attempts += 1;

    let result = tokio::select! {
      _ = cancel.cancelled() => return StepRun::Cancelled,
      result = (body)(ctx.clone()) => result,
    };

    match result {
      Ok(output) => {
        return StepRun::Completed {
          attempts,
          result: Ok(output),
        };
      }
      Err(error) if error.is_retryable() && policy.should_retry(attempts, max_retries) => {
        let delay = policy.backoff(attempts);
        warn!(
          run_id = %ctx.run_id(),
          step = %ctx.step(),
          attempt = attempts,
          delay_ms = delay.as_millis() as u64,
          error = %error,
          "step failed, retrying"
        );
        tokio::select! {
          _ = cancel.cancelled() => return StepRun::Cancelled,
          _ = tokio::time::sleep(delay) => {}
        }
      }
      Err(error) => {
        return StepRun::Completed {
          attempts,
          result: Err(error),
        };
      }
    }
  }
}
