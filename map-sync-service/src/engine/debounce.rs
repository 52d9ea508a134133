use std::{pin::Pin, time::Duration};

use tokio::time::{sleep, Sleep};

/// Trailing-edge debounced command.
///
/// Every `schedule` replaces the pending command and restarts the quiescence
/// window; `fired` resolves with the last scheduled command once the window
/// elapses without another `schedule`. Dropping the debouncer discards any
/// pending command. `fired` is cancel-safe: dropping its future keeps the
/// pending command in place.
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<Pending<T>>,
}

struct Pending<T> {
    command: T,
    deadline: Pin<Box<Sleep>>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self { window, pending: None }
    }

    /// Returns `true` if a not-yet-fired command was superseded.
    pub fn schedule(&mut self, command: T) -> bool {
        let replaced = self.pending.is_some();
        self.pending = Some(Pending {
            command,
            deadline: Box::pin(sleep(self.window)),
        });
        replaced
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.command)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits for the pending command's window to elapse. Never resolves while
    /// nothing is scheduled.
    pub async fn fired(&mut self) -> T {
        loop {
            match self.pending.as_mut() {
                Some(p) => p.deadline.as_mut().await,
                None => std::future::pending::<()>().await,
            }
            if let Some(p) = self.pending.take() {
                return p.command;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_last_command() {
        let mut d = Debouncer::new(Duration::from_millis(100));

        assert!(!d.schedule(1));
        advance(Duration::from_millis(60)).await;
        assert!(d.schedule(2));
        advance(Duration::from_millis(60)).await;
        assert!(d.schedule(3));

        // 120ms since the first trigger but only 0ms since the last one.
        assert!(timeout(Duration::from_millis(90), d.fired()).await.is_err());
        assert_eq!(d.fired().await, 3);
        assert!(!d.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_scheduled_never_fires() {
        let mut d: Debouncer<u8> = Debouncer::new(Duration::from_millis(10));
        assert!(timeout(Duration::from_secs(5), d.fired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_command() {
        let mut d = Debouncer::new(Duration::from_millis(10));
        d.schedule("refresh");
        assert_eq!(d.cancel(), Some("refresh"));
        assert!(timeout(Duration::from_secs(1), d.fired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_wait_keeps_command_pending() {
        let mut d = Debouncer::new(Duration::from_millis(100));
        d.schedule(7);
        assert!(timeout(Duration::from_millis(50), d.fired()).await.is_err());
        assert!(d.is_pending());
        assert_eq!(d.fired().await, 7);
    }
}
