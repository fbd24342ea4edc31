// SPDX-License-Identifier: MIT

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Rate-limits a callback by coalescing to the latest value.
///
/// Pushed values land in a single pending slot, overwriting whatever was
/// there. A background task delivers the slot's content to the callback:
/// immediately when the throttle is idle, otherwise once the configured
/// delay since the previous delivery has passed. Values overwritten while
/// stalling are never delivered; a push after an idle stretch goes out at
/// once.
pub struct Throttle<T> {
    shared: Arc<Shared<T>>,
    stop: CancellationToken,
}

struct Shared<T> {
    pending: Mutex<Option<T>>,
    arrived: Notify,
}

impl<T: Send + 'static> Throttle<T> {
    pub fn new(delay: Duration, callback: impl Fn(T) + Send + 'static) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(None),
            arrived: Notify::new(),
        });
        let stop = CancellationToken::new();

        let worker_shared = shared.clone();
        let worker_stop = stop.clone();

        tokio::spawn(async move {
            loop {
                let value = {
                    let mut arrival = pin!(worker_shared.arrived.notified());
                    let taken = {
                        let mut pending = lock(&worker_shared.pending);
                        let taken = pending.take();
                        if taken.is_none() {
                            arrival.as_mut().enable();
                        }
                        taken
                    };

                    match taken {
                        Some(value) => value,
                        None => {
                            tokio::select! {
                                _ = &mut arrival => continue,
                                _ = worker_stop.cancelled() => break,
                            }
                        }
                    }
                };

                callback(value);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = worker_stop.cancelled() => break,
                }
            }
        });

        Self { shared, stop }
    }

    /// Replace the pending value; it is delivered when the delay allows.
    pub fn push(&self, value: T) {
        *lock(&self.shared.pending) = Some(value);
        self.shared.arrived.notify_waiters();
    }
}

impl<T> Drop for Throttle<T> {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn lock<T>(mutex: &Mutex<Option<T>>) -> MutexGuard<'_, Option<T>> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
