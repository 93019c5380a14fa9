use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Trailing debounce: every `schedule` re-arms the delay, and only the most
/// recently scheduled action runs once the delay passes quietly.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Arm the timer. Outside a Tokio runtime the action runs immediately.
    pub fn schedule<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            action();
            return;
        };

        let delay = self.delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });

        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    /// Drop the armed action without running it
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = pending.take() {
            previous.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_quiet_period() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fired = fired.clone();
            debouncer.schedule(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        debouncer.schedule(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_runs_inline_without_runtime() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        debouncer.schedule(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
