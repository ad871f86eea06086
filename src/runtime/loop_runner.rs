//! Running and stopping loops.

use super::LockedRuntime;
use super::record::LoopHandle;
use crate::context::ThreadKey;
use crate::error::Result;
use crate::native::RunLoop;

impl LockedRuntime<'_> {
    /// Run the calling thread's loop until it is stopped.
    ///
    /// Registers the loop under `thread` unless a loop is already registered
    /// there, then releases the execution lock and blocks. Once the loop has
    /// stopped the lock is taken back and `thread` is unregistered. If a
    /// callback on this loop failed while it ran, that failure is returned
    /// here, once.
    pub fn run_loop(&mut self, thread: ThreadKey) -> Result<()> {
        let run_loop = RunLoop::current();

        if !self.state.loops.contains(&thread) {
            // Checked under the lock, so this cannot collide
            let _ = self
                .state
                .loops
                .register(thread, LoopHandle::new(run_loop.clone()));
        }

        crate::log_event!("loop", "running", "{thread} on {}", run_loop.id());
        self.allow_threads(|| run_loop.run());

        // Stops that arrive after `run` returned belong to this run
        if run_loop.cancel_stop() {
            crate::debug_event!("loop", "late stop discarded", "{thread}");
        }

        if !self.state.loops.release(&thread) {
            crate::debug_event!("loop", "already unregistered", "{thread}");
        }

        match self.state.failures.remove(&run_loop.id()) {
            Some(failure) => {
                tracing::error!("[loop] {thread} stopped by callback failure: {failure}");
                Err(failure)
            }
            None => {
                crate::log_event!("loop", "stopped", "{thread}");
                Ok(())
            }
        }
    }

    /// Ask the loop registered under `thread` to stop.
    ///
    /// Returns immediately; the matching `run_loop` call returns once the
    /// loop has finished its current job. Returns `false`, and does nothing,
    /// if no loop is registered under `thread`.
    pub fn stop(&mut self, thread: ThreadKey) -> bool {
        match self.state.loops.lookup(&thread) {
            Some(handle) => {
                handle.run_loop().stop();
                crate::debug_event!("loop", "stop requested", "{thread}");
                true
            }
            None => {
                crate::debug_event!("loop", "stop ignored, not running", "{thread}");
                false
            }
        }
    }
}
