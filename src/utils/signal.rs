// SPDX-License-Identifier: MIT

//! OS signal handling without process-global mutable state: a single
//! background task translates termination signals into a cancellation
//! token that any number of waiters can observe.

use tokio_util::sync::CancellationToken;

/// Completes when the process receives a termination signal.
///
/// On Unix this covers SIGINT, SIGTERM and SIGQUIT, with
/// [`tokio::signal::ctrl_c`] as a fallback; elsewhere only ctrl-c is
/// awaited.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        _ = sigquit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Listens for termination signals on a background task and trips a
/// [`CancellationToken`] when one arrives.
///
/// Check [`is_signalled`](Self::is_signalled) at any time, or
/// [`wait`](Self::wait) to suspend until a signal has been received.
pub struct SignalWaiter {
    signalled: CancellationToken,
}

impl SignalWaiter {
    pub fn spawn() -> Self {
        let signalled = CancellationToken::new();
        let trip = signalled.clone();

        tokio::spawn(async move {
            // An Err means signal handlers could not be installed; trip the
            // token either way so waiters are not stranded.
            let _ = wait_for_shutdown_signal().await;
            trip.cancel();
        });

        Self { signalled }
    }

    pub fn is_signalled(&self) -> bool {
        self.signalled.is_cancelled()
    }

    pub async fn wait(&self) {
        self.signalled.cancelled().await;
    }

    /// A token observers can select on alongside their own work.
    pub fn token(&self) -> CancellationToken {
        self.signalled.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_unsignalled() {
        let waiter = SignalWaiter::spawn();
        assert!(!waiter.is_signalled());
    }

    #[tokio::test]
    async fn tripped_token_wakes_waiters() {
        let waiter = SignalWaiter::spawn();

        // Trip the token directly; raising a real signal would interfere
        // with the test harness.
        waiter.token().cancel();

        waiter.wait().await;
        assert!(waiter.is_signalled());
    }
}
