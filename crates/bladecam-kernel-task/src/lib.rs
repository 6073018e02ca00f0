#![warn(missing_docs)]

//! Cooperative task plumbing shared by the long-running kernel operations.
//!
//! Rebuild, toolpath generation and simulation report discrete
//! [`Checkpoint`]s through a [`ProgressSink`] and poll a [`CancelToken`]
//! between them. Cancellation is never preemptive: work already committed
//! at the last checkpoint stays valid, work in flight is discarded by the
//! caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The task was cancelled at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled during {stage} at checkpoint {completed}/{total}")]
pub struct Cancelled {
    /// Stage that observed the cancellation.
    pub stage: Stage,
    /// Checkpoints completed before cancelling.
    pub completed: usize,
    /// Checkpoints planned for the stage.
    pub total: usize,
}

/// Shared cancellation flag.
///
/// A child token is cancelled with its parent, but cancelling the child
/// leaves the parent running.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A new token that also observes this one.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Request cancellation. Observed at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested here or on any ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
}

/// Phase of a long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Sampling reference geometry into sections.
    Sampling,
    /// Lofting, blending and filleting the blade model.
    Rebuild,
    /// Partitioning an operation into passes.
    Planning,
    /// Axis resolution, clearance checks and linking.
    Generation,
    /// Replaying a toolpath against stock.
    Simulation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Sampling => "sampling",
            Stage::Rebuild => "rebuild",
            Stage::Planning => "planning",
            Stage::Generation => "generation",
            Stage::Simulation => "simulation",
        };
        f.write_str(name)
    }
}

/// A progress report emitted at a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Phase being reported.
    pub stage: Stage,
    /// Units completed so far.
    pub completed: usize,
    /// Units planned.
    pub total: usize,
    /// Short human-readable label ("layer 3", "surface BSide").
    pub label: String,
}

impl Checkpoint {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Receiver of progress checkpoints.
pub trait ProgressSink: Send + Sync {
    /// Called once per checkpoint, on the worker thread.
    fn report(&self, checkpoint: &Checkpoint);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _checkpoint: &Checkpoint) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&Checkpoint) + Send + Sync,
{
    fn report(&self, checkpoint: &Checkpoint) {
        self(checkpoint)
    }
}

/// Forwards checkpoints over an mpsc channel.
///
/// A disconnected receiver is ignored; the task keeps running.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: std::sync::Mutex<mpsc::Sender<Checkpoint>>,
}

impl ChannelProgress {
    /// Create a sink and the matching receiver.
    pub fn new() -> (Self, mpsc::Receiver<Checkpoint>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                sender: std::sync::Mutex::new(tx),
            },
            rx,
        )
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, checkpoint: &Checkpoint) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(checkpoint.clone());
        }
    }
}

/// Cancellation token and progress sink handed to every long-running call.
#[derive(Clone)]
pub struct TaskContext {
    cancel: CancelToken,
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl TaskContext {
    /// Context with the given token and sink.
    pub fn new(cancel: CancelToken, progress: Arc<dyn ProgressSink>) -> Self {
        Self { cancel, progress }
    }

    /// Context that is never cancelled and reports nowhere.
    pub fn detached() -> Self {
        Self::new(CancelToken::new(), Arc::new(NullProgress))
    }

    /// Replace the progress sink.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// The cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Context sharing this sink, with a child of this cancellation token.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child(),
            progress: Arc::clone(&self.progress),
        }
    }

    /// Report a checkpoint, then fail if cancellation was requested.
    pub fn checkpoint(
        &self,
        stage: Stage,
        completed: usize,
        total: usize,
        label: impl Into<String>,
    ) -> Result<(), Cancelled> {
        let checkpoint = Checkpoint {
            stage,
            completed,
            total,
            label: label.into(),
        };
        tracing::trace!(%stage, completed, total, label = %checkpoint.label, "checkpoint");
        self.progress.report(&checkpoint);
        self.ensure_active(stage, completed, total)
    }

    /// Fail if cancellation was requested, without reporting progress.
    pub fn ensure_active(&self, stage: Stage, completed: usize, total: usize) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            tracing::debug!(%stage, completed, total, "task cancelled");
            Err(Cancelled {
                stage,
                completed,
                total,
            })
        } else {
            Ok(())
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_detached_never_cancels() {
        let ctx = TaskContext::detached();
        for i in 0..5 {
            assert!(ctx.checkpoint(Stage::Rebuild, i, 5, "layer").is_ok());
        }
    }

    #[test]
    fn test_cancel_observed_at_next_checkpoint() {
        let token = CancelToken::new();
        let ctx = TaskContext::new(token.clone(), Arc::new(NullProgress));
        assert!(ctx.checkpoint(Stage::Simulation, 0, 3, "step").is_ok());
        token.cancel();
        let err = ctx.checkpoint(Stage::Simulation, 1, 3, "step").unwrap_err();
        assert_eq!(err.stage, Stage::Simulation);
        assert_eq!(err.completed, 1);
    }

    #[test]
    fn test_child_token_follows_parent_only() {
        let parent = TaskContext::detached();
        let child = parent.child();
        child.cancel_token().cancel();
        assert!(child.checkpoint(Stage::Generation, 0, 1, "pass 0").is_err());
        assert!(parent.checkpoint(Stage::Generation, 0, 1, "pass 0").is_ok());

        let sibling = parent.child();
        parent.cancel_token().cancel();
        assert!(sibling.cancel_token().is_cancelled());
    }

    #[test]
    fn test_closure_sink_receives_checkpoints() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |c: &Checkpoint| seen.lock().unwrap().push(c.completed)
        };
        let ctx = TaskContext::new(CancelToken::new(), Arc::new(sink));
        ctx.checkpoint(Stage::Planning, 1, 2, "a").unwrap();
        ctx.checkpoint(Stage::Planning, 2, 2, "b").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_channel_sink() {
        let (sink, rx) = ChannelProgress::new();
        let ctx = TaskContext::detached().with_progress(Arc::new(sink));
        ctx.checkpoint(Stage::Sampling, 1, 4, "section 1").unwrap();
        let got = rx.recv().unwrap();
        assert_eq!(got.label, "section 1");
        assert!((got.fraction() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_fraction_empty_total() {
        let c = Checkpoint {
            stage: Stage::Rebuild,
            completed: 0,
            total: 0,
            label: String::new(),
        };
        assert!((c.fraction() - 1.0).abs() < 1e-12);
    }
}
