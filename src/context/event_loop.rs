use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::trace;

use super::is_thread_default;
use super::push_thread_default;
use super::Priority;
use super::SchedulingContext;
use super::Task;

/// Handle to a serial task queue.
///
/// Tasks queued with [`Priority::High`] run before any pending
/// [`Priority::Default`] task. The queue is drained by the paired
/// [`EventLoop`]; it stops once every `LoopContext` handle is gone and the
/// queue is empty.
#[derive(Debug)]
pub struct LoopContext {
    high_tx: mpsc::UnboundedSender<Task>,
    default_tx: mpsc::UnboundedSender<Task>,
}

/// Drains the queue of a [`LoopContext`].
#[derive(Debug)]
pub struct EventLoop {
    context: Weak<LoopContext>,
    high_rx: mpsc::UnboundedReceiver<Task>,
    default_rx: mpsc::UnboundedReceiver<Task>,
}

impl LoopContext {
    /// Creates a context and the loop that serves it.
    pub fn new() -> (Arc<LoopContext>, EventLoop) {
        let (high_tx, high_rx) = mpsc::unbounded_channel();
        let (default_tx, default_rx) = mpsc::unbounded_channel();

        let context = Arc::new(LoopContext { high_tx, default_tx });
        let event_loop = EventLoop {
            context: Arc::downgrade(&context),
            high_rx,
            default_rx,
        };
        (context, event_loop)
    }

    /// Creates a context whose loop runs as a task on the current Tokio
    /// runtime.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn spawn() -> Arc<LoopContext> {
        let (context, event_loop) = Self::new();
        tokio::spawn(event_loop.run());
        context
    }
}

impl SchedulingContext for LoopContext {
    fn is_current(&self) -> bool {
        is_thread_default(self)
    }

    fn schedule(
        &self,
        priority: Priority,
        task: Task,
    ) {
        let tx = match priority {
            Priority::High => &self.high_tx,
            Priority::Default => &self.default_tx,
        };
        if tx.send(task).is_err() {
            trace!("Event loop is gone, dropping task");
        }
    }
}

impl EventLoop {
    /// Runs queued tasks until every [`LoopContext`] handle has been dropped
    /// and the queue is drained.
    pub async fn run(mut self) {
        trace!("Event loop started");
        loop {
            let task = tokio::select! {
                biased;
                Some(task) = self.high_rx.recv() => task,
                Some(task) = self.default_rx.recv() => task,
                else => break,
            };
            self.dispatch(task);
        }
        trace!("Event loop stopped");
    }

    /// Runs every task queued right now, high priority first, without
    /// waiting. Returns how many tasks ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        loop {
            let task = match self.high_rx.try_recv() {
                Ok(task) => task,
                Err(_) => match self.default_rx.try_recv() {
                    Ok(task) => task,
                    Err(_) => break,
                },
            };
            self.dispatch(task);
            ran += 1;
        }
        ran
    }

    fn dispatch(
        &self,
        task: Task,
    ) {
        let _guard = self
            .context
            .upgrade()
            .map(|context| push_thread_default(context as Arc<dyn SchedulingContext>));
        task();
    }
}
