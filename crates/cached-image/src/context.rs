//! Execution contexts for consumer updates
//!
//! Consumers such as UI widgets may only be mutated from one designated
//! context. The loader never assigns directly; it hands a task to a
//! [`ConsumerContext`] and lets the context decide where it runs.

use tokio::sync::mpsc;
use tracing::warn;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs consumer updates on the consumer's designated context
pub trait ConsumerContext: Send + Sync {
    fn run(&self, task: Task);
}

/// Runs every task immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl ConsumerContext for InlineContext {
    fn run(&self, task: Task) {
        task();
    }
}

/// Queues tasks for a single-threaded [`ContextLoop`]
#[derive(Debug, Clone)]
pub struct QueueContext {
    tx: mpsc::UnboundedSender<Task>,
}

impl QueueContext {
    /// Create a context and the loop that owns its queue
    pub fn channel() -> (Self, ContextLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ContextLoop { rx })
    }
}

impl ConsumerContext for QueueContext {
    fn run(&self, task: Task) {
        if self.tx.send(task).is_err() {
            warn!("Consumer context loop is gone, dropping update");
        }
    }
}

/// Receiving end of a [`QueueContext`], driven by whoever owns the consumer
pub struct ContextLoop {
    rx: mpsc::UnboundedReceiver<Task>,
}

impl std::fmt::Debug for ContextLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextLoop").finish_non_exhaustive()
    }
}

impl ContextLoop {
    /// Run every task queued so far; returns how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        count
    }

    /// Run tasks as they arrive until every [`QueueContext`] is dropped
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
    }
}
