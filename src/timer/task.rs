use super::clock;
use super::queue::{TaskKey, TaskQueue};
use crate::executor::{Executor, Thunk};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

/// The lifecycle of a scheduled task.
///
/// A task leaves `New` at most once, either to `Running` when the timer
/// fires it or to `Cancelled` when a caller cancels it. `Finished` and
/// `Cancelled` are terminal.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    New = 0,
    Running = 1,
    Finished = 2,
    Cancelled = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::New,
            1 => TaskState::Running,
            2 => TaskState::Finished,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_done(self) -> bool {
        match self {
            TaskState::Finished | TaskState::Cancelled => true,
            TaskState::New | TaskState::Running => false,
        }
    }
}

pub(crate) struct Task {
    id: u64,
    start_time: u64,
    state: AtomicU8,
    work: Mutex<Option<Thunk>>,
    executor: Option<Arc<dyn Executor + Send + Sync>>,
}

impl Task {
    pub(crate) fn new(
        id: u64,
        start_time: u64,
        work: Thunk,
        executor: Option<Arc<dyn Executor + Send + Sync>>,
    ) -> Self {
        Self {
            id,
            start_time,
            state: AtomicU8::new(TaskState::New as u8),
            work: Mutex::new(Some(work)),
            executor,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn start_time(&self) -> u64 {
        self.start_time
    }

    pub(crate) fn key(&self) -> TaskKey {
        TaskKey::new(self.start_time, self.id)
    }

    pub(crate) fn executor(&self) -> Option<&Arc<dyn Executor + Send + Sync>> {
        self.executor.as_ref()
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Nanoseconds until this task is due, according to `now`.
    pub(crate) fn remaining(&self, now: u64) -> i64 {
        clock::remaining(self.start_time, now)
    }

    /// Claim the task for execution. Only the timer thread calls this,
    /// and only one of this and `cancel` can ever succeed.
    pub(crate) fn try_run(&self) -> Option<Thunk> {
        if self.transition(TaskState::New, TaskState::Running) {
            self.work.lock().take()
        } else {
            None
        }
    }

    pub(crate) fn cancel(&self) -> bool {
        if self.transition(TaskState::New, TaskState::Cancelled) {
            // release whatever the work captured now, rather than
            // whenever the last handle is dropped
            drop(self.work.lock().take());

            true
        } else {
            false
        }
    }

    pub(crate) fn finish(&self) {
        self.transition(TaskState::Running, TaskState::Finished);
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("start_time", &self.start_time)
            .field("state", &self.state())
            .field("executor_override", &self.executor.is_some())
            .finish()
    }
}

/// A handle to a scheduled task, returned by `Timer::schedule`.
///
/// Handles can be cloned and sent to other threads, and the task can
/// be cancelled from any of them.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<Task>,
    queue: Weak<TaskQueue>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<Task>, queue: Weak<TaskQueue>) -> Self {
        Self { task, queue }
    }

    /// The identifier the timer assigned to this task. Identifiers are
    /// unique per timer.
    pub fn id(&self) -> u64 {
        self.task.id()
    }

    /// The task's current state.
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// True once the task has finished running (successfully or not),
    /// or has been cancelled.
    pub fn is_done(&self) -> bool {
        self.task.state().is_done()
    }

    /// True if the task was cancelled before it started running.
    pub fn is_cancelled(&self) -> bool {
        self.task.state() == TaskState::Cancelled
    }

    /// Cancel the task, returning true if this call cancelled it.
    ///
    /// Returns false if the timer has already fired the task or it was
    /// previously cancelled. If true is returned, the work will never run.
    pub fn cancel(&self) -> bool {
        if !self.task.cancel() {
            return false;
        }

        if let Some(queue) = self.queue.upgrade() {
            queue.remove(&self.task.key());
        }

        true
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task).finish()
    }
}
