//! The common task vocabulary shared by every queue variant.

/// Identifies a pushed task so it can later be canceled. Unique within one queue
/// instance, not across queues.
pub type TaskId = i64;

pub const INVALID_TASK_ID: TaskId = -1;

/// A unit of work. Queues never inspect the closure; they only move it around.
pub type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling metadata attached to a pushed task.
#[derive(Debug, Clone, Copy)]
pub struct TaskAttr {
    /// Lower values run first in [`crate::PriorityTaskQueue`].
    pub priority: u64,
    /// Microsecond timestamp (see [`wrpc_core::timer::now_micros`]) before which
    /// [`crate::TimerTaskQueue`] will not run the task.
    pub exec_time_us: i64,
    /// Advisory; queues in this crate do not enforce it themselves.
    pub timeout_us: i64,
}

impl Default for TaskAttr {
    fn default() -> Self {
        Self {
            priority: 0,
            exec_time_us: wrpc_core::timer::now_micros(),
            timeout_us: 0,
        }
    }
}

/// The pooled, reusable node every queue implementation stores internally.
#[derive(Default)]
pub(crate) struct TaskEntry {
    pub func: Option<TaskFn>,
    pub attr: TaskAttr,
}

/// Common contract implemented by every queue variant in this crate.
pub trait TaskQueue: Send + Sync {
    fn push_task_with_attr(&self, func: TaskFn, attr: TaskAttr) -> TaskId;

    fn push_task(&self, func: TaskFn) -> TaskId {
        self.push_task_with_attr(func, TaskAttr::default())
    }

    /// Blocks until a task is available, then returns it.
    fn pop_task(&self) -> (TaskFn, TaskAttr);

    /// Best-effort cancellation: if the task has not yet been popped it will never
    /// run, but a task already in flight at the moment of the call cannot be
    /// un-dispatched. Returns whether the task was found and canceled.
    fn cancel_task(&self, task_id: TaskId) -> bool;

    fn queue_len(&self) -> usize;
}

pub(crate) fn do_nothing() {}
