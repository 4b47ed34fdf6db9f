use super::*;

/// Executes thunks directly on the calling thread.
///
/// When used as a timer's executor, work runs on the timer thread
/// itself, so a long running thunk delays everything scheduled after
/// it. This is mostly useful for tests and for very cheap work such
/// as sending on a channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    pub fn new() -> Self {
        InlineExecutor
    }
}

impl Executor for InlineExecutor {
    #[inline(always)]
    fn execute(&self, thunk: Thunk) {
        thunk.apply();
    }
}
