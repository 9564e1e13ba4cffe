/// Connectivity monitor. Samples backend health on an interval.
///
/// The monitor is the only writer of the connectivity flag. Readers hold a
/// `watch::Receiver<bool>`; every check publishes, so receivers are woken even
/// when the value did not change and must treat notifications as idempotent.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::client::Backend;

/// Running monitor. Dropping or stopping it cancels the polling task.
pub struct MonitorHandle {
    rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Start polling. The first check runs immediately; until it completes
    /// the backend is reported as unreachable.
    pub fn spawn<B: Backend>(backend: Arc<B>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(poll_loop(backend, interval, tx));
        Self { rx, task }
    }

    /// A new receiver for connectivity updates.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Last observed reachability.
    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }

    pub fn stop(self) {
        // Drop aborts the task.
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop<B: Backend>(backend: Arc<B>, interval: Duration, tx: watch::Sender<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<bool> = None;

    loop {
        ticker.tick().await;
        let connected = backend.check_health().await;
        if last != Some(connected) {
            if connected {
                info!("backend reachable");
            } else {
                info!("backend unreachable");
            }
            last = Some(connected);
        }
        // send_replace notifies even when the value is unchanged and
        // never fails for lack of receivers.
        tx.send_replace(connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::ScriptedBackend;
    use crate::conversation::Conversation;
    use crate::protocol::Mode;

    const TICK: Duration = Duration::from_millis(20);

    async fn next_value(rx: &mut watch::Receiver<bool>) -> bool {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("monitor did not publish in time")
            .expect("monitor stopped");
        *rx.borrow_and_update()
    }

    #[tokio::test]
    async fn test_first_check_is_immediate() {
        let backend = Arc::new(ScriptedBackend::new());
        // Long interval: only the immediate check can satisfy this.
        let monitor = MonitorHandle::spawn(backend.clone(), Duration::from_secs(3600));
        let mut rx = monitor.subscribe();
        assert!(next_value(&mut rx).await);
        assert!(monitor.is_connected());
        assert_eq!(backend.health_checks(), 1);
    }

    #[tokio::test]
    async fn test_publishes_transitions_and_repeats() {
        let backend = Arc::new(ScriptedBackend::new());
        let monitor = MonitorHandle::spawn(backend.clone(), TICK);
        let mut rx = monitor.subscribe();

        assert!(next_value(&mut rx).await);
        // Unchanged value is still re-published.
        assert!(next_value(&mut rx).await);

        backend.set_healthy(false);
        let mut saw_down = false;
        for _ in 0..10 {
            if !next_value(&mut rx).await {
                saw_down = true;
                break;
            }
        }
        assert!(saw_down);
        assert!(!monitor.is_connected());
    }

    #[tokio::test]
    async fn test_stop_cancels_polling() {
        let backend = Arc::new(ScriptedBackend::new());
        let monitor = MonitorHandle::spawn(backend.clone(), TICK);
        let mut rx = monitor.subscribe();
        next_value(&mut rx).await;

        monitor.stop();
        // Sender is dropped with the aborted task; drain until closed.
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(closed.is_ok());

        let checks = backend.health_checks();
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(backend.health_checks(), checks);
    }

    #[tokio::test]
    async fn test_unreachable_backend_blocks_submission() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_healthy(false);
        let monitor = MonitorHandle::spawn(backend.clone(), TICK);
        let mut rx = monitor.subscribe();

        let mut convo = Conversation::new(Mode::Agent);
        convo.set_connected(true);
        convo.set_connected(next_value(&mut rx).await);

        assert!(!convo.handle_submit(backend.as_ref(), "clean my desktop").await);
        assert!(convo.messages().is_empty());
        assert!(backend.calls().is_empty());
    }
}
