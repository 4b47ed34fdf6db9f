use crate::executor::Thunk;

/// Runs the supplied function when dropped, including when the
/// stack is unwinding due to a panic.
///
/// The timer uses this to mark a task as finished no matter how
/// its work returned.
pub struct Deferred {
    thunk: Option<Thunk>,
}

impl Deferred {
    pub fn new<F: FnOnce()>(f: F) -> Self
    where
        F: 'static + Send,
    {
        Self {
            thunk: Some(Box::new(f)),
        }
    }
}

impl Drop for Deferred {
    fn drop(&mut self) {
        if let Some(thunk) = self.thunk.take() {
            thunk.apply();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::Deferred;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_deferred_runs_on_panic() {
        let done = Arc::new(AtomicBool::new(false));

        {
            let done = done.clone();

            let _ = thread::spawn(move || {
                #[allow(unused_variables)]
                let deferred = {
                    let done = done.clone();

                    Deferred::new(move || {
                        done.store(true, Ordering::SeqCst);
                    })
                };

                assert!(!done.load(Ordering::SeqCst));

                panic!();
            })
            .join();
        }

        assert!(done.load(Ordering::SeqCst));
    }
}
