//! Repeating timer with a single cancel point

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Fires a callback every `period` until cancelled or the callback returns false.
///
/// The first firing happens one period after start. Cancelling the parent
/// token also stops the timer; dropping the timer cancels it.
pub struct RepeatingTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RepeatingTimer {
    pub fn start<F>(period: Duration, parent: &CancellationToken, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = parent.child_token();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
            trace!("Repeating timer stopped");
        });

        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the timer task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_cancelled() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let parent = CancellationToken::new();
        let timer = RepeatingTimer::start(Duration::from_millis(5), &parent, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(22)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        timer.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_can_stop_timer() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let parent = CancellationToken::new();
        let timer = RepeatingTimer::start(Duration::from_millis(5), &parent, move || {
            counter.fetch_add(1, Ordering::SeqCst) < 2
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(timer.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_timer() {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let parent = CancellationToken::new();
        let timer = RepeatingTimer::start(Duration::from_millis(5), &parent, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(timer.is_cancelled());
    }
}
