use super::clock::{self, Clock, MonotonicClock};
use super::queue::TaskQueue;
use super::task::{Task, TaskHandle};
use super::thread_factory::{NamedThreadFactory, ThreadFactory};
use crate::cfg::{Config, ExecutorKind, TimerConfig};
use crate::executor::{
    Executor, InlineExecutor, SingleThreadedExecutor, Thunk, WorkStealingExecutor,
};
use crate::logging;
use crate::util::Deferred;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::{fmt, io, time};

/// State shared between a `Timer` and its background thread.
struct TimerInner {
    queue: Arc<TaskQueue>,
    running: AtomicBool,
    clock: Arc<dyn Clock + Send + Sync>,
    default_executor: Arc<dyn Executor + Send + Sync>,
}

impl TimerInner {
    fn run(&self) {
        debug!("timer started");

        while self.running.load(Ordering::Acquire) {
            if let Err(e) = panic::catch_unwind(AssertUnwindSafe(|| self.step())) {
                error!("timer loop panicked, continuing: {}", panic_message(&*e));
            }
        }

        if self.queue.is_empty() {
            debug!("timer stopped");
        } else {
            debug!("timer stopped, abandoning {} pending task(s)", self.queue.len());
        }
    }

    /// Fires the earliest task if it is due, otherwise parks until it is
    /// (or until something is scheduled, or the timer is shut down).
    fn step(&self) {
        let task = match self.queue.first() {
            Some(task) => task,

            None => {
                thread::park();
                return;
            }
        };

        let remaining = task.remaining(self.clock.now());

        if remaining > 0 {
            thread::park_timeout(time::Duration::from_nanos(remaining as u64));
            return;
        }

        self.queue.remove(&task.key());

        match task.try_run() {
            Some(work) => self.fire(task, work),

            None => {
                trace!("task {} was cancelled before firing", task.id());
            }
        }
    }

    fn fire(&self, task: Arc<Task>, work: Thunk) {
        trace!("firing task {} due at {}", task.id(), task.start_time());

        let executor = task
            .executor()
            .unwrap_or(&self.default_executor)
            .clone();

        // the guard travels with the work, so the task is finished when the
        // work returns, panics, or is dropped by the executor unrun
        let finished = {
            let task = task.clone();

            Deferred::new(move || task.finish())
        };

        executor.execute(Box::new(move || {
            let _finished = finished;

            work.apply();
        }));
    }
}

/// A `Timer` runs work after a delay has elapsed.
///
/// Each timer owns a single background thread. That thread repeatedly
/// looks at the pending task that is due soonest, and either hands it to
/// an `Executor` or parks until it is due. Scheduling a task always wakes
/// the thread, so a task that is due sooner than the one currently being
/// waited on is never delayed by it.
///
/// Tasks are offered to their executors in order of their due time. Any
/// work that is submitted runs on the executor, so a slow or failing task
/// doesn't hold up the timer, unless an executor that runs work inline
/// is used.
///
/// A timer must be shut down before its default executor is, otherwise
/// work may be handed to an executor that no longer runs anything.
/// Dropping a timer shuts it down.
pub struct Timer {
    inner: Arc<TimerInner>,
    next_task_id: AtomicU64,
    thread: Thread,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    on_shutdown: Mutex<Option<Thunk>>,
}

impl Timer {
    /// Create a timer that fires tasks on `default_executor` (unless a task
    /// specifies its own) and runs its loop on a thread obtained from
    /// `thread_factory`. The thread is started immediately.
    pub fn new<F: ThreadFactory>(
        default_executor: Arc<dyn Executor + Send + Sync>,
        thread_factory: F,
    ) -> io::Result<Self> {
        Self::with_clock(
            default_executor,
            thread_factory,
            Arc::new(MonotonicClock::new()),
        )
    }

    /// Like `new`, but reading time from the supplied clock.
    pub fn with_clock<F: ThreadFactory>(
        default_executor: Arc<dyn Executor + Send + Sync>,
        thread_factory: F,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> io::Result<Self> {
        let inner = Arc::new(TimerInner {
            queue: Arc::new(TaskQueue::new()),
            running: AtomicBool::new(true),
            clock,
            default_executor,
        });

        let join_handle = {
            let inner = inner.clone();

            thread_factory.new_thread(Box::new(move || inner.run()))?
        };

        Ok(Self {
            inner,
            next_task_id: AtomicU64::new(0),
            thread: join_handle.thread().clone(),
            join_handle: Mutex::new(Some(join_handle)),
            on_shutdown: Mutex::new(None),
        })
    }

    /// Create a timer, along with its default executor, from configuration.
    ///
    /// The executor is owned by the timer and is shut down after the timer
    /// thread has exited.
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let config = TimerConfig::new(config)?;

        if config.install_logger {
            logging::setup_logger_once();
        }

        if config.log_config_on_start {
            info!("configuration: {:?}", config);
        }

        let (executor, on_shutdown): (Arc<dyn Executor + Send + Sync>, Option<Thunk>) =
            match config.default_executor {
                ExecutorKind::WorkStealing => {
                    let executor = WorkStealingExecutor::new(
                        config.work_stealing_parallelism(),
                        config.work_stealing_task_queue_fifo,
                    );

                    let on_shutdown: Thunk = {
                        let executor = executor.clone();

                        Box::new(move || executor.shutdown())
                    };

                    let executor: Arc<dyn Executor + Send + Sync> = Arc::new(executor);

                    (executor, Some(on_shutdown))
                }

                ExecutorKind::SingleThreaded => {
                    let executor = SingleThreadedExecutor::new();

                    let on_shutdown: Thunk = {
                        let executor = executor.clone();

                        Box::new(move || executor.shutdown())
                    };

                    let executor: Arc<dyn Executor + Send + Sync> = Arc::new(executor);

                    (executor, Some(on_shutdown))
                }

                ExecutorKind::Inline => {
                    let executor: Arc<dyn Executor + Send + Sync> = Arc::new(InlineExecutor::new());

                    (executor, None)
                }
            };

        let timer = Self::new(
            executor,
            NamedThreadFactory::new(config.thread_name_prefix.as_str()),
        )?;

        *timer.on_shutdown.lock() = on_shutdown;

        Ok(timer)
    }

    /// Schedule `work` to run on the default executor once `delay` has
    /// elapsed. A zero delay runs it as soon as possible.
    pub fn schedule<F: FnOnce()>(&self, delay: time::Duration, work: F) -> TaskHandle
    where
        F: 'static + Send,
    {
        self.schedule_task(delay, Box::new(work), None)
    }

    /// Schedule `work` to run on `executor` once `delay` has elapsed.
    pub fn schedule_with_executor<F: FnOnce()>(
        &self,
        delay: time::Duration,
        work: F,
        executor: Arc<dyn Executor + Send + Sync>,
    ) -> TaskHandle
    where
        F: 'static + Send,
    {
        self.schedule_task(delay, Box::new(work), Some(executor))
    }

    /// The number of tasks waiting to be fired. Cancelled tasks are not
    /// counted.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// False once `shutdown` has been called.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stop the timer thread and wait for it to exit.
    ///
    /// Tasks that haven't fired yet are abandoned: they never run, and
    /// their handles never report done. Only the first call does anything.
    pub fn shutdown(&self) {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        debug!("timer shutting down");

        self.thread.unpark();

        // work running inline on the timer thread may shut it down, but a
        // thread cannot join itself
        if thread::current().id() != self.thread.id() {
            if let Some(join_handle) = self.join_handle.lock().take() {
                if let Err(e) = join_handle.join() {
                    error!("timer thread panicked: {}", panic_message(&*e));
                }
            }
        }

        if let Some(on_shutdown) = self.on_shutdown.lock().take() {
            on_shutdown.apply();
        }
    }

    fn schedule_task(
        &self,
        delay: time::Duration,
        work: Thunk,
        executor: Option<Arc<dyn Executor + Send + Sync>>,
    ) -> TaskHandle {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let start_time = clock::deadline(self.inner.clock.now(), delay);
        let task = Arc::new(Task::new(id, start_time, work, executor));

        if !self.is_running() {
            debug!("task {} scheduled on a timer that has been shut down", id);
        }

        self.inner.queue.insert(task.clone());

        self.thread.unpark();

        TaskHandle::new(task, Arc::downgrade(&self.inner.queue))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Timer")
            .field("thread", &self.thread.name())
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
