use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Quiet period after the last input event before typing decays to idle.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Per-connection typing state with a debounced decay timer.
///
/// Owned by a single connection's event loop; the only other toucher is
/// the spawned timer task, which flips the flag back to idle when the
/// quiet period elapses. Every refresh aborts the previous timer.
pub struct TypingDebouncer {
    active: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl TypingDebouncer {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            timer: None,
        }
    }

    /// Marks the connection as typing and (re)arms the decay timer.
    /// `on_expire` runs once if the quiet period elapses without another
    /// refresh, after the state has already returned to idle.
    pub fn refresh<F>(&mut self, on_expire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.active.store(true, Ordering::SeqCst);

        let active = Arc::clone(&self.active);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(TYPING_DEBOUNCE).await;
            active.store(false, Ordering::SeqCst);
            on_expire.await;
        }));
    }

    /// Forces `typing -> idle`, cancelling any pending timer. Returns
    /// whether the connection was typing, so the caller knows if peers
    /// still need a typing-false event. Used on explicit stop, on message
    /// send, and on disconnect.
    pub fn stop(&mut self) -> bool {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.active.swap(false, Ordering::SeqCst)
    }
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::{advance, timeout};

    #[tokio::test(start_paused = true)]
    async fn decays_after_the_quiet_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut typing = TypingDebouncer::new();

        typing.refresh(async move {
            let _ = tx.send(());
        });
        // Let the spawned timer register its sleep before moving the
        // paused clock, so the deadline anchors at the refresh.
        tokio::task::yield_now().await;
        advance(Duration::from_millis(1999)).await;
        assert!(rx.try_recv().is_err());

        assert!(timeout(Duration::from_secs(1), rx.recv()).await.is_ok());
        assert!(!typing.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn each_keystroke_resets_the_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut typing = TypingDebouncer::new();

        for _ in 0..3 {
            let tx = tx.clone();
            typing.refresh(async move {
                let _ = tx.send(());
            });
            advance(Duration::from_millis(1500)).await;
            assert!(rx.try_recv().is_err());
        }

        assert!(timeout(Duration::from_secs(3), rx.recv()).await.is_ok());
        // Only the surviving timer fired.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_the_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut typing = TypingDebouncer::new();

        typing.refresh(async move {
            let _ = tx.send(());
        });
        assert!(typing.stop());
        assert!(!typing.stop());

        advance(Duration::from_millis(2500)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
