//! Executors run the work that the timer decides is due

mod inline;
mod single_threaded;
mod work_stealing;

pub use self::inline::InlineExecutor;
pub use self::single_threaded::SingleThreadedExecutor;
pub use self::work_stealing::WorkStealingExecutor;

/// An `Executor` is a service that can execute `Thunk`s, which
/// are boxed functions.
///
/// The timer hands every task that it fires to an executor. The
/// timer's own thread only decides what is due, so a slow task
/// never delays the firing of another one unless the executor
/// itself runs work inline.
///
/// Typically, a `WorkStealingExecutor` is used which uses a
/// scheduler implemented ontop of Crossbeam's deque.
///
/// Implementations may run the thunk synchronously or on another
/// thread. Panics raised by a thunk are the executor's concern,
/// not the caller's.
pub trait Executor {
    /// Execute the thunk on this executor
    fn execute(&self, thunk: Thunk);
}

pub trait BoxedFn {
    fn apply(self: Box<Self>);
}

impl<F: FnOnce()> BoxedFn for F {
    #[inline(always)]
    fn apply(self: Box<F>) {
        (*self)()
    }
}

pub type Thunk = Box<dyn BoxedFn + Send + 'static>;
