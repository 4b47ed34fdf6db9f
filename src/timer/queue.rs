use super::clock;
use super::task::Task;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Orders tasks by start time, then by id.
///
/// Start times are compared by the sign of their wrapping difference, so
/// the order stays correct when the clock wraps, provided every pending
/// task is due within ~292 years of every other. Delays are capped at
/// `clock::MAX_DELAY_NANOS`, which leaves the other half of that window
/// for tasks that are overdue. Ids are unique per timer,
/// so two distinct tasks never compare equal even if their start times
/// collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TaskKey {
    start_time: u64,
    id: u64,
}

impl TaskKey {
    pub(crate) fn new(start_time: u64, id: u64) -> Self {
        Self { start_time, id }
    }
}

impl Ord for TaskKey {
    fn cmp(&self, other: &Self) -> Ordering {
        clock::remaining(self.start_time, other.start_time)
            .cmp(&0)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for TaskKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The pending tasks of a timer, shared between the timer thread
/// (which fires them) and callers (which schedule and cancel them).
pub(crate) struct TaskQueue {
    tasks: Mutex<BTreeMap<TaskKey, Arc<Task>>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn insert(&self, task: Arc<Task>) {
        self.tasks.lock().insert(task.key(), task);
    }

    /// The earliest task, without removing it.
    pub(crate) fn first(&self) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .iter()
            .next()
            .map(|(_, task)| task.clone())
    }

    pub(crate) fn remove(&self, key: &TaskKey) -> Option<Arc<Task>> {
        self.tasks.lock().remove(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, start_time: u64) -> Arc<Task> {
        Arc::new(Task::new(id, start_time, Box::new(|| ()), None))
    }

    #[test]
    fn test_key_order() {
        assert!(TaskKey::new(1, 9) < TaskKey::new(2, 0));
        assert!(TaskKey::new(5, 1) < TaskKey::new(5, 2));
        assert_eq!(TaskKey::new(5, 1), TaskKey::new(5, 1));

        // u64::MAX - 1 is "before" 3 once the clock has wrapped
        assert!(TaskKey::new(u64::MAX - 1, 7) < TaskKey::new(3, 0));
    }

    #[test]
    fn test_first_is_earliest() {
        let queue = TaskQueue::new();

        assert!(queue.is_empty());
        assert!(queue.first().is_none());

        queue.insert(task(0, 300));
        queue.insert(task(1, 100));
        queue.insert(task(2, 200));

        assert_eq!(queue.first().map(|t| t.id()), Some(1));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_equal_start_times_are_distinct() {
        let queue = TaskQueue::new();

        queue.insert(task(0, 1000));
        queue.insert(task(1, 1000));

        assert_eq!(queue.len(), 2);

        let first = queue.first().map(|t| t.key());

        assert_eq!(first, Some(TaskKey::new(1000, 0)));
        assert!(queue.remove(&TaskKey::new(1000, 0)).is_some());
        assert_eq!(queue.first().map(|t| t.id()), Some(1));
    }

    #[test]
    fn test_wrapped_start_times() {
        let queue = TaskQueue::new();
        let now = u64::MAX - 50;

        queue.insert(task(0, clock::deadline(now, std::time::Duration::from_nanos(100))));
        queue.insert(task(1, clock::deadline(now, std::time::Duration::from_nanos(10))));

        assert_eq!(queue.first().map(|t| t.id()), Some(1));
    }

    #[test]
    fn test_overdue_before_longest_delay() {
        let queue = TaskQueue::new();
        let due = 1000;

        // scheduled while the timer was busy, and now slightly overdue
        queue.insert(task(0, due));
        queue.insert(task(1, clock::deadline(due + 5, std::time::Duration::MAX)));

        assert_eq!(queue.first().map(|t| t.id()), Some(0));
        assert!(TaskKey::new(due, 0) < TaskKey::new(due + 5 + clock::MAX_DELAY_NANOS, 1));
    }
}
