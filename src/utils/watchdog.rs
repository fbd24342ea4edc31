// SPDX-License-Identifier: MIT

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Calls a function on a background task at a fixed period, omitting the
/// first immediate tick, until stopped or dropped. Useful for nagging about
/// stalled operations:
///
/// ```no_run
/// # async fn example() {
/// use std::time::Duration;
/// use superflow::utils::Watchdog;
///
/// let watchdog = Watchdog::spawn(Duration::from_secs(2), |waited| {
///     tracing::warn!(?waited, "operation still outstanding");
/// });
///
/// // ... something that may stall ...
/// watchdog.stop();
/// # }
/// ```
///
/// The callback receives the time elapsed since the watchdog was spawned.
pub struct Watchdog {
    stop: CancellationToken,
}

impl Watchdog {
    pub fn spawn(period: Duration, on_tick: impl Fn(Duration) + Send + 'static) -> Self {
        let stop = CancellationToken::new();
        let observed = stop.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = tokio::time::interval_at(started + period, period);

            loop {
                tokio::select! {
                    _ = observed.cancelled() => break,
                    _ = ticks.tick() => on_tick(started.elapsed()),
                }
            }
        });

        Self { stop }
    }

    /// Stop ticking. Idempotent; also performed on drop.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
