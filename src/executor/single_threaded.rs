use super::{Executor, Thunk};
use crossbeam::channel::{unbounded, Receiver, RecvError, Sender};
use std::thread;

enum SingleThreadedExecutorMessage {
    Execute(Thunk),
    Shutdown,
}

/// A single threaded executor that is backed by crossbeam_channel.
///
/// This is an MPSC queue that allows producer handlers (senders) to
/// be cloned. The worker thread owns the consumer handler (receiver)
/// and executes jobs in the order they were submitted.
///
/// If a thunk panics, the worker thread is replaced and continues
/// with the rest of the queue.
pub struct SingleThreadedExecutor {
    sender: Sender<SingleThreadedExecutorMessage>,
}

impl SingleThreadedExecutor {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<SingleThreadedExecutorMessage>();

        Self::spawn(receiver);

        Self { sender }
    }

    /// Stop the worker thread once all previously submitted work
    /// has been executed. Thunks submitted afterwards are dropped.
    pub fn shutdown(&self) {
        let _ = self.sender.send(SingleThreadedExecutorMessage::Shutdown);
    }

    fn spawn(receiver: Receiver<SingleThreadedExecutorMessage>) {
        struct Panicking {
            receiver: Receiver<SingleThreadedExecutorMessage>,
        }

        impl Drop for Panicking {
            fn drop(&mut self) {
                if thread::panicking() {
                    warn!("single threaded executor worker panicked, respawning");

                    SingleThreadedExecutor::spawn(self.receiver.clone());
                }
            }
        }

        thread::spawn(move || {
            let p = Panicking {
                receiver: receiver.clone(),
            };

            loop {
                match receiver.recv() {
                    Ok(SingleThreadedExecutorMessage::Execute(work)) => {
                        work.apply();
                    }

                    Ok(SingleThreadedExecutorMessage::Shutdown) => {
                        break;
                    }

                    Err(RecvError) => {
                        break;
                    }
                }
            }

            drop(receiver);
            drop(p);
        });
    }
}

impl Default for SingleThreadedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for SingleThreadedExecutor {
    fn execute(&self, thunk: Thunk) {
        let _ = self
            .sender
            .send(SingleThreadedExecutorMessage::Execute(thunk));
    }
}

impl Clone for SingleThreadedExecutor {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn simple_test_fifo() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let executor = SingleThreadedExecutor::new();

        for i in 0..100 {
            let order = order.clone();

            executor.execute(Box::new(move || {
                order.lock().unwrap().push(i);
            }));
        }

        eventually(Duration::from_millis(3000), || order.lock().unwrap().len() == 100);

        assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic() {
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = SingleThreadedExecutor::new();

        executor.execute(Box::new(move || {
            panic!("testing");
        }));

        {
            let counter = counter.clone();

            executor.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        eventually(Duration::from_millis(10000), move || {
            counter.load(Ordering::SeqCst) == 1
        });
    }

    #[test]
    fn test_shutdown_drains_first() {
        let counter = Arc::new(AtomicUsize::new(0));

        let executor = SingleThreadedExecutor::new();

        for _ in 0..10 {
            let counter = counter.clone();

            executor.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        executor.shutdown();

        eventually(Duration::from_millis(3000), move || {
            counter.load(Ordering::SeqCst) == 10
        });
    }
}
