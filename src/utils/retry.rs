// Copyright 2025 zncdata-labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded retry with backoff for operations that fail transiently.
//!
//! ```ignore
//! let updated = retry_if(&Backoff::default(), |e: &Error| e.is_conflict(), || async {
//!     api.replace_status(&latest).await
//! })
//! .await?;
//! ```

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay schedule between attempts.
///
/// The default matches what Kubernetes clients use for conflict retries:
/// 5 attempts, 10ms apart, with 10% jitter.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Maximum number of attempts, including the first one
    pub steps: u32,
    /// Delay before the second attempt
    pub duration: Duration,
    /// Multiplier applied to the delay after every attempt
    pub factor: f64,
    /// Up to `jitter * delay` is added to each sleep
    pub jitter: f64,
    /// Upper bound for the delay, before jitter
    pub cap: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            steps: 5,
            duration: Duration::from_millis(10),
            factor: 1.0,
            jitter: 0.1,
            cap: None,
        }
    }
}

impl Backoff {
    /// Delay after `attempt` earlier failures, before jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        (0..attempt.min(64)).fold(self.duration, |delay, _| self.next_delay(delay))
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::try_from_secs_f64(delay.as_secs_f64() * self.factor.max(1.0))
            .unwrap_or(Duration::MAX);
        match self.cap {
            Some(cap) => next.min(cap),
            None => next,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let extra = rand::rng().random_range(0.0..self.jitter);
        delay + Duration::from_secs_f64(delay.as_secs_f64() * extra)
    }
}

/// Runs `operation` until it succeeds, fails with an error `retriable` does
/// not accept, or `backoff.steps` attempts have been made. The last error is
/// returned on exhaustion.
pub async fn retry_if<T, E, F, Fut, P>(
    backoff: &Backoff,
    retriable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let steps = backoff.steps.max(1);
    let mut delay = backoff.duration;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !retriable(&error) {
            debug!(attempt, error = %error, "operation failed with a non-retriable error");
            return Err(error);
        }

        if attempt >= steps {
            warn!(attempt, error = %error, "operation failed after max retries");
            return Err(error);
        }

        let sleep = backoff.jittered(delay);
        debug!(
            attempt,
            error = %error,
            delay_ms = sleep.as_millis() as u64,
            "operation failed, retrying"
        );
        tokio::time::sleep(sleep).await;
        delay = backoff.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(steps: u32) -> Backoff {
        Backoff {
            steps,
            duration: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<i32, String> = retry_if(&fast(3), |_| true, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = retry_if(&fast(4), |_| true, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 4 { Err(format!("conflict {n}")) } else { Ok(n) }
        })
        .await;

        assert_eq!(result, Ok(4));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = retry_if(&fast(3), |_| true, || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(format!("conflict {n}"))
        })
        .await;

        assert_eq!(result, Err("conflict 3".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retriable_error_stops_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = retry_if(
            &fast(5),
            |e: &String| e.starts_with("conflict"),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("forbidden".to_string())
            },
        )
        .await;

        assert_eq!(result, Err("forbidden".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let backoff = Backoff {
            duration: Duration::from_millis(100),
            factor: 2.0,
            cap: Some(Duration::from_millis(300)),
            ..Default::default()
        };

        let second = backoff.next_delay(backoff.duration);
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(backoff.next_delay(second), Duration::from_millis(300));

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(40), Duration::from_millis(300));

        let jittered = backoff.jittered(Duration::from_millis(100));
        assert!(jittered >= Duration::from_millis(100));
        assert!(jittered <= Duration::from_millis(110));
    }
}
