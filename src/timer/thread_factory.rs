use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates the background thread that a `Timer` runs its loop on.
///
/// The returned thread must already be started. The timer wakes it with
/// `Thread::unpark`, so the body must run on the thread the handle refers
/// to.
pub trait ThreadFactory {
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>>;
}

impl<F> ThreadFactory for F
where
    F: Fn(ThreadBody) -> io::Result<JoinHandle<()>>,
{
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        self(body)
    }
}

/// Spawns threads named `<prefix>-<n>`, where `n` counts the threads
/// created by this factory.
#[derive(Debug)]
pub struct NamedThreadFactory {
    prefix: String,
    next_id: AtomicUsize,
}

impl NamedThreadFactory {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl ThreadFactory for NamedThreadFactory {
    fn new_thread(&self, body: ThreadBody) -> io::Result<JoinHandle<()>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        thread::Builder::new()
            .name(format!("{}-{}", self.prefix, id))
            .spawn(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_name(factory: &NamedThreadFactory) -> Option<String> {
        factory
            .new_thread(Box::new(|| ()))
            .ok()
            .and_then(|handle| handle.thread().name().map(|n| n.to_string()))
    }

    #[test]
    fn test_names_are_per_factory() {
        let a = NamedThreadFactory::new("a");
        let b = NamedThreadFactory::new("b");

        assert_eq!(thread_name(&a), Some("a-0".to_string()));
        assert_eq!(thread_name(&a), Some("a-1".to_string()));
        assert_eq!(thread_name(&b), Some("b-0".to_string()));
    }

    #[test]
    fn test_closure_factory() {
        let factory = |body: ThreadBody| thread::Builder::new().name("custom".into()).spawn(body);

        let handle = factory.new_thread(Box::new(|| ())).unwrap();

        assert_eq!(handle.thread().name(), Some("custom"));
        assert!(handle.join().is_ok());
    }
}
