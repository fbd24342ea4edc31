// SPDX-License-Identifier: MIT

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct MeterState {
    first_start: Option<Instant>,
    current_start: Option<Instant>,
    total_processing: Duration,
    runs: u64,
}

/// Measures the workload of a processing loop.
///
/// Bracket each unit of work with [`start`](Self::start) and
/// [`stop`](Self::stop); the meter accumulates mean processing time and the
/// busyness ratio (time spent processing divided by time since the first
/// start). [`status_info`](Self::status_info) formats both for a proxel's
/// info line:
///
/// ```no_run
/// # fn work() {}
/// use superflow::utils::TimingMeter;
///
/// let meter = TimingMeter::new();
/// loop {
///     meter.start();
///     work();
///     meter.stop();
///     // core.set_info(meter.status_info());
/// }
/// ```
#[derive(Default)]
pub struct TimingMeter {
    state: Mutex<MeterState>,
}

impl TimingMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a unit of work.
    pub fn start(&self) {
        let now = Instant::now();
        let mut state = self.lock_state();

        state.current_start = Some(now);
        state.first_start.get_or_insert(now);
    }

    /// Stop timing and return the elapsed time of this unit, or `None` if
    /// `start` was never called.
    pub fn stop(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.lock_state();

        let started = state.current_start.take()?;
        let processing = now - started;

        state.total_processing += processing;
        state.runs += 1;

        Some(processing)
    }

    /// Elapsed time of the unit currently being timed, without stopping.
    pub fn peek(&self) -> Option<Duration> {
        let state = self.lock_state();
        state.current_start.map(|started| started.elapsed())
    }

    /// Mean time per completed unit of work.
    pub fn mean_processing_time(&self) -> Duration {
        let state = self.lock_state();

        if state.runs == 0 {
            return Duration::ZERO;
        }

        state.total_processing / u32::try_from(state.runs).unwrap_or(u32::MAX)
    }

    /// Ratio of processing time to wall time since the first start: 1 means
    /// never idle, 0 means never processing.
    pub fn busyness(&self) -> f64 {
        let state = self.lock_state();

        let Some(first) = state.first_start else {
            return 0.0;
        };

        let uptime = first.elapsed().as_secs_f64();
        if uptime == 0.0 {
            return 0.0;
        }

        state.total_processing.as_secs_f64() / uptime
    }

    /// Number of completed units of work.
    pub fn run_count(&self) -> u64 {
        self.lock_state().runs
    }

    /// Mean processing time and busyness formatted for an info line.
    pub fn status_info(&self) -> String {
        format!(
            "time: {:.3}s\nbusy: {:.3}",
            self.mean_processing_time().as_secs_f64(),
            self.busyness()
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
