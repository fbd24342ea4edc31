// SPDX-License-Identifier: MIT

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Keeps a loop at a steady rate by sleeping for the remainder of the period
/// since the previous call.
///
/// ```no_run
/// # async fn example() {
/// use std::time::Duration;
/// use superflow::utils::RateLimiter;
///
/// let pace = RateLimiter::new(Duration::from_millis(10));
/// loop {
///     // do work
///     pace.wait().await;
/// }
/// # }
/// ```
///
/// If an iteration takes longer than the period, the next call returns
/// immediately; the schedule is cumulative, not reset per call.
pub struct RateLimiter {
    deadline: Mutex<Instant>,
    period: Mutex<Duration>,
}

impl RateLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            deadline: Mutex::new(Instant::now()),
            period: Mutex::new(period),
        }
    }

    /// Sleep until another period has passed since the previous call.
    pub async fn wait(&self) {
        let next = {
            let period = *lock(&self.period);
            let mut deadline = lock(&self.deadline);
            *deadline += period;
            *deadline
        };

        tokio::time::sleep_until(next).await;
    }

    /// Change the period used by subsequent waits.
    pub fn set_period(&self, period: Duration) {
        *lock(&self.period) = period;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
