//! # Pantomime Timer
//!
//! A single threaded delay scheduler. Work is scheduled to run once a
//! delay has elapsed on a monotonic clock, and can be cancelled up until
//! the moment the timer decides to fire it.
//!
//! The timer itself only decides *when* something runs. The work is then
//! handed to an `Executor`, either the timer's default or one supplied
//! for that particular task.
//!
//! ```no_run
//! use pantomime_timer::executor::WorkStealingExecutor;
//! use pantomime_timer::timer::{NamedThreadFactory, Timer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let executor = Arc::new(WorkStealingExecutor::new(4, true));
//! let timer = Timer::new(executor.clone(), NamedThreadFactory::new("timer")).unwrap();
//!
//! let handle = timer.schedule(Duration::from_millis(100), || println!("hello"));
//!
//! if handle.cancel() {
//!     println!("cancelled before it fired");
//! }
//!
//! timer.shutdown();
//! ```

extern crate atty;
extern crate chrono;
extern crate crossbeam;
extern crate fern;
extern crate parking_lot;
extern crate rand;

#[macro_use]
extern crate log;

pub mod cfg;
pub mod executor;
pub mod logging;
pub mod timer;
pub mod util;

#[cfg(feature = "testkit")]
pub mod testkit;

#[cfg(all(test, not(feature = "testkit")))]
pub mod testkit;
