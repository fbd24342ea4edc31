// SPDX-License-Identifier: MIT

//! Support utilities: guarded cells, pacing helpers, a periodic watchdog, a
//! coalescing throttle, OS signal translation and a timing meter.

pub mod meter;
pub mod mutexed;
pub mod pace;
pub mod shared;
pub mod signal;
pub mod throttle;
pub mod watchdog;

pub use meter::TimingMeter;
pub use mutexed::Mutexed;
pub use pace::RateLimiter;
pub use shared::SharedMutexed;
pub use signal::{wait_for_shutdown_signal, SignalWaiter};
pub use throttle::Throttle;
pub use watchdog::Watchdog;
