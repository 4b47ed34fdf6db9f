//! Timers are used to schedule work to be performed in the future
mod clock;
mod queue;
mod task;
mod thread_factory;
mod timer;


pub use self::clock::{deadline, remaining, Clock, ManualClock, MonotonicClock, MAX_DELAY_NANOS};
pub use self::task::{TaskHandle, TaskState};
pub use self::thread_factory::{NamedThreadFactory, ThreadBody, ThreadFactory};
pub use self::timer::Timer;
