use super::{Executor, Thunk};
use crossbeam::deque::{self as deque, Injector, Steal, Stealer, Worker};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time;

#[derive(Debug)]
enum PollSchedule {
    Aggressive(usize),
    Moderate(usize),
    Conservative(usize),
    UltraConservative,
}

enum WorkStealingExecutorMessage {
    Execute(Thunk),
    Shutdown,
}

/// A work stealing executor that is backed by crossbeam_deque.
///
/// A number of worker threads are created, and jobs can be submitted to it. Each
/// thread manages its own deque and has stealers for each other thread.
///
/// If a worker thread submits tasks to itself, they are inserted into its
/// own deque and potentially stolen by other idle threads (internal execution).
///
/// If an external thread submits tasks to the executor, e.g. the timer thread,
/// it is placed in an injector queue that is checked by the workers.
///
/// If a thread panics while executing, a new thread is spawned to take
/// its place.
pub struct WorkStealingExecutor {
    injector: Arc<Injector<WorkStealingExecutorMessage>>,
    num_workers: usize,
}

thread_local! {
    static WORKER: RefCell<Option<Worker<WorkStealingExecutorMessage>>> = RefCell::new(None);
}

impl WorkStealingExecutor {
    /// Creates a new executor with the given parameters.
    ///
    /// # Arguments
    ///
    /// * `parallelism` - Number of threads to start
    /// * `task_queue_fifo` - If true, execute tasks in FIFO order. In general, LIFO is more
    ///                       performant given cache locality, but FIFO provides greater
    ///                       fairness.
    ///
    /// # Remarks
    ///
    /// When built from configuration, the number of threads is calculated
    /// as follows:
    ///
    /// threads = min(parallelism_max, max(parallelism_min, cpus * parallelism_factor))
    pub fn new(parallelism: usize, task_queue_fifo: bool) -> Self {
        let parallelism = parallelism.max(1);
        let mut stealers = Vec::new();
        let mut workers = Vec::new();

        for _ in 0..parallelism {
            let w = if task_queue_fifo {
                deque::Worker::new_fifo()
            } else {
                deque::Worker::new_lifo()
            };
            let s = w.stealer();

            workers.push(w);
            stealers.push(s);
        }

        let injector = Arc::new(Injector::new());

        for i in (0..parallelism).rev() {
            let injector = injector.clone();

            let mut stealers: Vec<Stealer<WorkStealingExecutorMessage>> = stealers.to_vec();

            let w = workers.remove(i);
            let _ = stealers.remove(i);

            Self::spawn_worker(w, stealers, injector);
        }

        Self {
            injector,
            num_workers: parallelism,
        }
    }

    /// The number of worker threads backing this executor.
    pub fn parallelism(&self) -> usize {
        self.num_workers
    }

    /// Signal each worker to stop. Work that is already queued ahead of
    /// the signal is still executed.
    pub fn shutdown(&self) {
        for _ in 0..self.num_workers {
            self.injector.push(WorkStealingExecutorMessage::Shutdown);
        }
    }

    /// Runs the message, returning false if the worker should exit.
    #[inline(always)]
    fn handle(message: WorkStealingExecutorMessage) -> bool {
        match message {
            WorkStealingExecutorMessage::Execute(thunk) => {
                thunk.apply();
                true
            }

            WorkStealingExecutorMessage::Shutdown => false,
        }
    }

    fn steal_into(
        source: impl Fn() -> Steal<WorkStealingExecutorMessage>,
        worker: &Worker<WorkStealingExecutorMessage>,
    ) -> bool {
        loop {
            match source() {
                Steal::Success(work) => {
                    worker.push(work);
                    return true;
                }

                Steal::Empty => {
                    return false;
                }

                Steal::Retry => {}
            }
        }
    }

    fn spawn_worker(
        worker: Worker<WorkStealingExecutorMessage>,
        stealers: Vec<Stealer<WorkStealingExecutorMessage>>,
        injector: Arc<Injector<WorkStealingExecutorMessage>>,
    ) {
        struct Panicking {
            stealers: Vec<Stealer<WorkStealingExecutorMessage>>,
            injector: Arc<Injector<WorkStealingExecutorMessage>>,
        }

        impl Drop for Panicking {
            fn drop(&mut self) {
                if thread::panicking() {
                    WORKER.with(|w| {
                        if let Some(worker) = w.replace(None) {
                            warn!("work stealing executor worker panicked, respawning");

                            WorkStealingExecutor::spawn_worker(
                                worker,
                                self.stealers.clone(),
                                self.injector.clone(),
                            );
                        }
                    });
                }
            }
        }

        thread::spawn(move || {
            let p = Panicking {
                stealers: stealers.clone(),
                injector: injector.clone(),
            };

            WORKER.with(|w| {
                {
                    *w.borrow_mut() = Some(worker);
                }

                // we've chosen SmallRng because the main requirement
                // is to be fast, not secure
                let mut small_rng = SmallRng::from_entropy();

                let mut schedule_state = PollSchedule::Aggressive(0);

                let inline_steal_every = 1000;
                let inline_steal_injector_limit = 100;

                let schedule_aggressive_attempts = 100;
                let schedule_moderate_attempts = 100;
                let schedule_conservative_attempts = 20;

                let schedule_moderate = time::Duration::from_micros(50);
                let schedule_conservative = time::Duration::from_millis(10);
                let schedule_ultra_conservative = time::Duration::from_millis(100);

                let l = stealers.len();

                let borrowed = w.borrow();

                let worker = match *borrowed {
                    Some(ref worker) => worker,
                    None => {
                        error!("cannot initialize WorkStealingExecutor thread");
                        return;
                    }
                };

                loop {
                    let mut i = 0;

                    while let Some(work) = worker.pop() {
                        if !Self::handle(work) {
                            return;
                        }

                        i += 1;

                        if i % inline_steal_every == 0 {
                            // occasionally pull in tasks that may be sitting in
                            // the injector so that other idle workers can steal
                            // them from us
                            for _ in 0..inline_steal_injector_limit {
                                if !Self::steal_into(|| injector.steal(), worker) {
                                    break;
                                }
                            }
                        }
                    }

                    // our deque is empty, and since only this thread
                    // can insert items into it, it's time to start
                    // stealing

                    let mut work_available = Self::steal_into(|| injector.steal(), worker);

                    if !work_available && l > 0 {
                        let r: usize = small_rng.gen();

                        work_available = Self::steal_into(|| stealers[r % l].steal(), worker);
                    }

                    // if any work was found, immediately continue, otherwise
                    // we go into a backoff to avoid spinning

                    if work_available {
                        schedule_state = PollSchedule::Aggressive(0);
                        continue;
                    }

                    match schedule_state {
                        PollSchedule::Aggressive(n) if n < schedule_aggressive_attempts => {
                            schedule_state = PollSchedule::Aggressive(n + 1);
                            thread::yield_now();
                        }

                        PollSchedule::Aggressive(_) => {
                            schedule_state = PollSchedule::Moderate(1);
                            thread::park_timeout(schedule_moderate);
                        }

                        PollSchedule::Moderate(n) if n < schedule_moderate_attempts => {
                            schedule_state = PollSchedule::Moderate(n + 1);
                            thread::park_timeout(schedule_moderate);
                        }

                        PollSchedule::Moderate(_) => {
                            schedule_state = PollSchedule::Conservative(1);
                            thread::park_timeout(schedule_conservative);
                        }

                        PollSchedule::Conservative(n) if n < schedule_conservative_attempts => {
                            schedule_state = PollSchedule::Conservative(n + 1);
                            thread::park_timeout(schedule_conservative);
                        }

                        PollSchedule::Conservative(_) => {
                            schedule_state = PollSchedule::UltraConservative;
                            thread::park_timeout(schedule_ultra_conservative);
                        }

                        PollSchedule::UltraConservative => {
                            thread::park_timeout(schedule_ultra_conservative);
                        }
                    }
                }
            });

            drop(p);
        });
    }
}

impl Executor for WorkStealingExecutor {
    fn execute(&self, thunk: Thunk) {
        WORKER.with(|w| match *w.borrow() {
            Some(ref worker) => {
                worker.push(WorkStealingExecutorMessage::Execute(thunk));
            }

            None => {
                self.injector
                    .push(WorkStealingExecutorMessage::Execute(thunk));
            }
        });
    }
}

impl Clone for WorkStealingExecutor {
    fn clone(&self) -> Self {
        Self {
            injector: self.injector.clone(),
            num_workers: self.num_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn simple_test_fifo() {
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = WorkStealingExecutor::new(8, true);

        for _ in 0..100 {
            let counter = counter.clone();

            executor.execute(Box::new(move || {
                counter.fetch_add(10, Ordering::SeqCst);
            }));
        }

        eventually(Duration::from_millis(3000), move || {
            counter.load(Ordering::SeqCst) == 1000
        });
    }

    #[test]
    fn simple_test_lifo() {
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = WorkStealingExecutor::new(8, false);

        for _ in 0..100 {
            let counter = counter.clone();

            executor.execute(Box::new(move || {
                counter.fetch_add(10, Ordering::SeqCst);
            }));
        }

        eventually(Duration::from_millis(3000), move || {
            counter.load(Ordering::SeqCst) == 1000
        });
    }

    #[test]
    fn test_panic() {
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = WorkStealingExecutor::new(8, false);

        for _ in 0..16 {
            executor.execute(Box::new(move || {
                panic!();
            }));
        }

        for _ in 0..16 {
            let counter = counter.clone();

            executor.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        eventually(Duration::from_millis(3000), move || {
            counter.load(Ordering::SeqCst) == 16
        });
    }

    #[test]
    fn test_zero_parallelism_is_one() {
        let executor = WorkStealingExecutor::new(0, true);

        assert_eq!(executor.parallelism(), 1);

        executor.shutdown();
    }
}
