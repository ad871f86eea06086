//! Scheduling and unscheduling streams.

use std::path::PathBuf;
use std::sync::Arc;

use super::record::StreamRecord;
use super::{Callback, LockedRuntime, dispatch};
use crate::context::{ExecutionContext, StreamKey, ThreadKey};
use crate::error::{BridgeError, Result};
use crate::events::EventBatch;
use crate::native::{BatchHandler, RunLoop, SinceWhen, StreamParams};
use crate::registry::Release;

impl LockedRuntime<'_> {
    /// Watch `paths` and deliver their batches to `callback` on `thread`'s loop.
    ///
    /// The stream reports only changes made after it starts, coalesced over
    /// the configured latency. The callback runs under the execution context
    /// of the caller of `schedule`.
    ///
    /// If no loop is registered under `thread` the stream is attached to the
    /// calling thread's own loop instead, and is only serviced while the
    /// caller runs that loop. Start `thread`'s loop first to avoid this.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::AlreadyScheduled`] if `stream` is registered; the
    ///   existing registration is left untouched.
    /// - [`BridgeError::WatchCreateFailed`] if the native stream could not be created.
    /// - [`BridgeError::WatchStartFailed`] if it could not be started; nothing
    ///   stays registered.
    pub fn schedule<I>(
        &mut self,
        thread: ThreadKey,
        stream: StreamKey,
        callback: Callback,
        paths: I,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        if self.state.streams.contains(&stream) {
            return Err(BridgeError::AlreadyScheduled { stream });
        }

        let params = StreamParams {
            paths: paths.into_iter().map(Into::into).collect(),
            since: SinceWhen::Now,
            latency: self.inner.settings.latency(),
            flags: self.inner.settings.create_flags(),
        };
        let path_count = params.paths.len();

        let serial = self.state.next_serial;
        self.state.next_serial += 1;

        let handler: BatchHandler = {
            let runtime = Arc::downgrade(self.inner);
            let key = stream.clone();
            Arc::new(move |batch: EventBatch| dispatch::deliver(&runtime, &key, serial, batch))
        };

        let mut native = self.inner.factory.create(params, handler).map_err(|e| {
            BridgeError::WatchCreateFailed {
                stream: stream.clone(),
                reason: e.to_string(),
            }
        })?;

        let run_loop = match self.state.loops.lookup(&thread) {
            Some(handle) => handle.run_loop().clone(),
            None => {
                let own = RunLoop::current();
                tracing::warn!(
                    "[stream] no loop running for {thread}, {stream} attached to the caller's {} instead",
                    own.id()
                );
                own
            }
        };
        native.schedule_with_run_loop(run_loop.clone());

        let record = StreamRecord {
            native,
            callback,
            run_loop,
            context: ExecutionContext::current(),
            serial,
        };

        let started = match self.state.streams.register(stream.clone(), record) {
            Ok(record) => record.start(),
            Err(rejected) => {
                rejected.handle.discard();
                return Err(BridgeError::AlreadyScheduled { stream });
            }
        };

        if let Err(e) = started {
            if let Some(record) = self.state.streams.unregister(&stream) {
                record.discard();
            }
            tracing::warn!("[stream] {stream} failed to start: {e}");
            return Err(BridgeError::WatchStartFailed {
                stream,
                reason: e.to_string(),
            });
        }

        crate::log_event!("stream", "scheduled", "{stream} ({path_count} paths) on {thread}");
        Ok(())
    }

    /// Tear down a scheduled stream.
    ///
    /// The record is removed first, then the native stream is stopped,
    /// invalidated and released, then the callback reference is dropped.
    /// Batches still queued for the stream are discarded.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NotScheduled`] if `stream` is not registered.
    pub fn unschedule(&mut self, stream: &StreamKey) -> Result<()> {
        let record = self
            .state
            .streams
            .unregister(stream)
            .ok_or_else(|| BridgeError::NotScheduled {
                stream: stream.clone(),
            })?;

        record.release();
        crate::log_event!("stream", "unscheduled", "{stream}");
        Ok(())
    }
}
