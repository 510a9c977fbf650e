use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A delayed event posted back into the session loop.
///
/// Dropping or cancelling the task aborts the sleeper so the event is never
/// delivered. Receivers still compare the token carried in the event, since an
/// event can already sit in the channel when the task is cancelled.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn schedule<E: Send + 'static>(
        tx: &mpsc::UnboundedSender<E>,
        delay: Duration,
        event: E,
    ) -> Self {
        let tx = tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _task = ScheduledTask::schedule(&tx, Duration::from_millis(3000), 1u32);
        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(rx.try_recv().ok(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = ScheduledTask::schedule(&tx, Duration::from_millis(100), 1u32);
        task.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_replacement_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = ScheduledTask::schedule(&tx, Duration::from_millis(100), 1u32);
        assert!(!slot.is_finished());
        slot = ScheduledTask::schedule(&tx, Duration::from_millis(100), 2u32);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().ok(), Some(2));
        assert!(rx.try_recv().is_err());
        assert!(slot.is_finished());
    }
}
