//! Registry entries for loops and streams.

use std::fmt;
use std::sync::Arc;

use super::Callback;
use crate::context::ExecutionContext;
use crate::native::{EventStream, NativeError, RunLoop};
use crate::registry::Release;

/// A running loop, registered under its thread key.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    run_loop: Arc<RunLoop>,
}

impl LoopHandle {
    pub(crate) fn new(run_loop: Arc<RunLoop>) -> Self {
        Self { run_loop }
    }

    pub fn run_loop(&self) -> &Arc<RunLoop> {
        &self.run_loop
    }
}

impl Release for LoopHandle {
    fn release(self) {
        // The run loop belongs to its thread; only our reference goes away.
        drop(self.run_loop);
    }
}

/// Everything the dispatcher needs to deliver a stream's batches.
///
/// Built once by `schedule` and never modified afterwards.
pub struct StreamRecord {
    pub(super) native: Box<dyn EventStream>,
    pub(super) callback: Callback,
    /// Loop the stream was attached to; stopped when the callback fails.
    pub(super) run_loop: Arc<RunLoop>,
    /// Context of the thread that scheduled the stream.
    pub(super) context: ExecutionContext,
    /// Distinguishes this registration from later ones under the same key.
    pub(super) serial: u64,
}

impl StreamRecord {
    pub(super) fn start(&mut self) -> Result<(), NativeError> {
        self.native.start()
    }

    /// Tear down a stream that never started.
    pub(super) fn discard(mut self) {
        self.native.invalidate();
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn run_loop(&self) -> &Arc<RunLoop> {
        &self.run_loop
    }
}

impl Release for StreamRecord {
    /// Stop, invalidate and release the native stream, then drop the callback.
    fn release(mut self) {
        self.native.stop();
        self.native.invalidate();
        drop(self.native);
        drop(self.callback);
    }
}

impl fmt::Debug for StreamRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRecord")
            .field("run_loop", &self.run_loop.id())
            .field("context", &self.context)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}
