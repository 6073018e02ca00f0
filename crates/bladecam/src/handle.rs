//! Background tasks with progress and cancellation.

use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use bladecam_kernel_task::{CancelToken, ChannelProgress, Checkpoint, TaskContext};

use crate::error::{BladecamError, Result};

/// A task running on its own thread.
///
/// Checkpoints arrive on [`progress`](Self::progress) while the task
/// runs. [`cancel`](Self::cancel) is observed at the next checkpoint.
#[derive(Debug)]
pub struct TaskHandle<T> {
    thread: JoinHandle<Result<T>>,
    progress: mpsc::Receiver<Checkpoint>,
    cancel: CancelToken,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Run `work` on a new named thread.
    pub fn spawn<F>(name: &str, work: F) -> Result<Self>
    where
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
    {
        let (sink, progress) = ChannelProgress::new();
        let cancel = CancelToken::new();
        let ctx = TaskContext::new(cancel.clone(), Arc::new(sink));
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || work(&ctx))?;
        Ok(Self {
            thread,
            progress,
            cancel,
        })
    }
}

impl<T> TaskHandle<T> {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The task's cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Checkpoints reported so far and from now on.
    pub fn progress(&self) -> &mpsc::Receiver<Checkpoint> {
        &self.progress
    }

    /// Whether the thread has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the result.
    pub fn join(self) -> Result<T> {
        self.thread.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            BladecamError::TaskPanicked(message)
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bladecam_kernel_task::Stage;

    #[test]
    fn test_result_and_progress() {
        let handle = TaskHandle::spawn("sum", |ctx| {
            let mut total = 0;
            for i in 0..4 {
                ctx.checkpoint(Stage::Planning, i + 1, 4, format!("item {i}"))?;
                total += i;
            }
            Ok(total)
        })
        .unwrap();
        let total = handle.progress().iter().take(4).count();
        assert_eq!(total, 4);
        assert_eq!(handle.join().unwrap(), 6);
    }

    #[test]
    fn test_cancel_before_first_checkpoint() {
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let handle = TaskHandle::spawn("cancelled", move |ctx| {
            go_rx.recv().ok();
            ctx.checkpoint(Stage::Simulation, 0, 1, "step")?;
            Ok(())
        })
        .unwrap();
        handle.cancel();
        go_tx.send(()).unwrap();
        assert!(matches!(handle.join(), Err(BladecamError::Cancelled(_))));
    }

    #[test]
    fn test_panic_is_reported() {
        let handle: TaskHandle<()> = TaskHandle::spawn("panics", |_| panic!("boom")).unwrap();
        match handle.join() {
            Err(BladecamError::TaskPanicked(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
