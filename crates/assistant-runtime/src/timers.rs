//! # Tokio Timer Scheduler
//!
//! Implements the engine's `TimerScheduler` port with one sleeping task per
//! armed timer. Expiries are sent back to the actor, which applies them as
//! `TimerFired` commands in queue order.

use bass_client::{TimerId, TimerScheduler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::errors::RuntimeError;

pub struct TokioTimerScheduler {
    fired: mpsc::UnboundedSender<TimerId>,
    pending: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
    runtime: Handle,
}

impl TokioTimerScheduler {
    /// Must be created inside a tokio runtime; timers are spawned on it.
    pub fn new(fired: mpsc::UnboundedSender<TimerId>) -> Result<Self, RuntimeError> {
        let runtime = Handle::try_current().map_err(|e| RuntimeError::NoRuntime(e.to_string()))?;
        Ok(Self {
            fired,
            pending: Arc::new(Mutex::new(HashMap::new())),
            runtime,
        })
    }

    /// Timers armed and not yet fired or cancelled.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl TimerScheduler for TokioTimerScheduler {
    fn schedule(&self, id: TimerId, after: Duration) {
        let fired = self.fired.clone();
        let registry = Arc::clone(&self.pending);

        // Held across the spawn so an immediate expiry cannot remove the
        // entry before it is inserted.
        let mut pending = self.pending.lock();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            registry.lock().remove(&id);
            trace!(generation = id.generation, "Timer fired");
            let _ = fired.send(id);
        });
        if let Some(previous) = pending.insert(id, task) {
            previous.abort();
        }
    }

    fn cancel(&self, id: TimerId) {
        if let Some(task) = self.pending.lock().remove(&id) {
            task.abort();
        }
    }
}

impl Drop for TokioTimerScheduler {
    fn drop(&mut self) {
        for (_, task) in self.pending.lock().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bass_client::TimerKind;
    use tokio::sync::mpsc::error::TryRecvError;

    fn id(generation: u64) -> TimerId {
        TimerId {
            kind: TimerKind::SyncIdleTeardown,
            generation,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimerScheduler::new(tx).unwrap();

        timers.schedule(id(1), Duration::from_millis(100));
        assert_eq!(timers.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(rx.recv().await, Some(id(1)));
        assert_eq!(timers.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TokioTimerScheduler::new(tx).unwrap();

        timers.schedule(id(1), Duration::from_millis(100));
        timers.cancel(id(1));
        timers.cancel(id(1));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(timers.pending_len(), 0);
    }

    #[test]
    fn test_requires_runtime() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            TokioTimerScheduler::new(tx),
            Err(RuntimeError::NoRuntime(_))
        ));
    }
}
