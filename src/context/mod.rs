//! Scheduling contexts: where watch callbacks run.
//!
//! A watch captures a [`SchedulingContext`] when it is started and delivers
//! every appeared/vanished notification on it. When the code that produces a
//! notification already runs on that context the callback is invoked inline,
//! otherwise a task is queued.
//!
//! - [`LoopContext`] / [`EventLoop`]: a serial task queue driven by a Tokio
//!   task (`EventLoop::run`) or stepped by hand (`EventLoop::run_pending`).
//! - [`ImmediateContext`]: runs every task synchronously on the caller.
//!
//! The *thread default* context is the one a thread is currently dispatching
//! for; [`push_thread_default`] installs one explicitly.
mod event_loop;

pub use event_loop::*;


use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// A unit of work queued on a context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Queue lane a task is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Runs before any queued default-priority task
    High,
    Default,
}

/// An execution context tasks can be handed to.
pub trait SchedulingContext: Send + Sync + 'static {
    /// Whether the calling code is currently executing on this context.
    fn is_current(&self) -> bool;

    /// Queues `task`. Must never block.
    fn schedule(
        &self,
        priority: Priority,
        task: Task,
    );
}

impl fmt::Debug for dyn SchedulingContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SchedulingContext").finish_non_exhaustive()
    }
}

thread_local! {
    static THREAD_DEFAULT: RefCell<Vec<Arc<dyn SchedulingContext>>> = const { RefCell::new(Vec::new()) };
}

/// The context most recently pushed on this thread, if any.
pub fn thread_default() -> Option<Arc<dyn SchedulingContext>> {
    THREAD_DEFAULT.with(|stack| stack.borrow().last().cloned())
}

/// Makes `context` the thread default until the returned guard is dropped.
///
/// Guards must be dropped in reverse push order.
pub fn push_thread_default(context: Arc<dyn SchedulingContext>) -> ThreadDefaultGuard {
    THREAD_DEFAULT.with(|stack| stack.borrow_mut().push(context));
    ThreadDefaultGuard {
        _not_send: std::marker::PhantomData,
    }
}

/// Pops the thread default pushed by [`push_thread_default`]
#[must_use = "the context stops being the thread default when the guard is dropped"]
pub struct ThreadDefaultGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for ThreadDefaultGuard {
    fn drop(&mut self) {
        THREAD_DEFAULT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl fmt::Debug for ThreadDefaultGuard {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("ThreadDefaultGuard")
    }
}

/// Whether `context` is the top of this thread's default stack.
pub(crate) fn is_thread_default<T: SchedulingContext>(context: &T) -> bool {
    THREAD_DEFAULT.with(|stack| {
        stack
            .borrow()
            .last()
            .is_some_and(|top| std::ptr::addr_eq(Arc::as_ptr(top), context as *const T))
    })
}

/// Runs every task synchronously, on whatever thread schedules it.
///
/// Delivery order is only as strict as the order in which notifications are
/// produced, which makes it suited to tests that drive a watch step by step.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateContext;

impl SchedulingContext for ImmediateContext {
    fn is_current(&self) -> bool {
        true
    }

    fn schedule(
        &self,
        _priority: Priority,
        task: Task,
    ) {
        task();
    }
}
