//! Restartable idle timeout
//!
//! An [`IdleAbort`] counts down from the moment it is armed. Every call to
//! [`IdleAbort::postpone`] pushes the deadline back by the full window. The
//! timer only ever resolves once per race: [`IdleAbort::run`] returns whichever
//! of the wrapped work or the expiry finishes first, and the loser is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Outcome of racing some work against the idle timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raced<T> {
    /// The work finished before the timer fired
    Completed(T),

    /// The timer fired first; the work was dropped
    Aborted,
}

/// A cloneable handle to an idle countdown
///
/// Clones share the same deadline, so a response listener and a scroll loop
/// can both postpone the same harvest.
#[derive(Debug, Clone)]
pub struct IdleAbort {
    timeout: Duration,
    deadline: Arc<watch::Sender<Instant>>,
}

impl IdleAbort {
    /// Starts counting down `timeout` from now
    pub fn arm(timeout: Duration) -> Self {
        let (deadline, _) = watch::channel(Instant::now() + timeout);

        Self {
            timeout,
            deadline: Arc::new(deadline),
        }
    }

    /// The configured window
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resets the countdown to the full window from now
    pub fn postpone(&self) {
        self.deadline.send_replace(Instant::now() + self.timeout);
    }

    /// Resolves once the deadline passes without being postponed
    pub async fn expired(&self) {
        let mut rx = self.deadline.subscribe();

        loop {
            let deadline = *rx.borrow_and_update();

            if Instant::now() >= deadline {
                return;
            }

            tokio::select! {
                _ = sleep_until(deadline) => {}
                _ = rx.changed() => {}
            }
        }
    }

    /// Races `work` against the timer, first resolution wins
    pub async fn run<F>(&self, work: F) -> Raced<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;

            value = work => Raced::Completed(value),
            _ = self.expired() => Raced::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_timeout() {
        let timer = IdleAbort::arm(Duration::from_secs(10));
        let start = Instant::now();

        timer.expired().await;

        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_fire_early() {
        let timer = IdleAbort::arm(Duration::from_secs(10));

        let outcome = timer.run(sleep(Duration::from_secs(9))).await;
        assert_eq!(outcome, Raced::Completed(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_postponing_keeps_timer_alive() {
        let timer = IdleAbort::arm(Duration::from_secs(10));
        let handle = timer.clone();

        // Postpone every T/2 for a total of 3T
        let work = async move {
            for _ in 0..6 {
                sleep(Duration::from_secs(5)).await;
                handle.postpone();
            }
            "done"
        };

        assert_eq!(timer.run(work).await, Raced::Completed("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_stalled_work() {
        let timer = IdleAbort::arm(Duration::from_secs(10));
        let start = Instant::now();

        let outcome = timer.run(std::future::pending::<()>()).await;

        assert_eq!(outcome, Raced::Aborted);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_postponing_stops() {
        let timer = IdleAbort::arm(Duration::from_secs(10));
        let handle = timer.clone();
        let start = Instant::now();

        let work = async move {
            sleep(Duration::from_secs(5)).await;
            handle.postpone();
            std::future::pending::<()>().await
        };

        assert_eq!(timer.run(work).await, Raced::Aborted);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }
}
