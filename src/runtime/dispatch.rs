//! Delivery of native batches into callbacks.
//!
//! Runs on the thread of the loop a stream is attached to. Each batch is
//! handled under the execution lock, with the execution context of the thread
//! that scheduled the stream swapped in for the duration of the callback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use super::{Inner, LockedRuntime};
use crate::context::{ContextScope, StreamKey};
use crate::error::BridgeError;
use crate::events::EventBatch;

/// Entry point used by the batch handler of every scheduled stream.
pub(super) fn deliver(runtime: &Weak<Inner>, stream: &StreamKey, serial: u64, batch: EventBatch) {
    let Some(inner) = runtime.upgrade() else {
        tracing::trace!("[dispatch] runtime gone, dropping batch for {stream}");
        return;
    };
    deliver_to(&inner, stream, serial, batch);
}

fn deliver_to(inner: &Arc<Inner>, stream: &StreamKey, serial: u64, batch: EventBatch) {
    let mut runtime = LockedRuntime::acquire(inner);
    runtime.dispatch(stream, serial, batch);
}

impl LockedRuntime<'_> {
    fn dispatch(&mut self, stream: &StreamKey, serial: u64, batch: EventBatch) {
        let (callback, context, owner) = match self.state.streams.lookup(stream) {
            Some(record) if record.serial == serial => (
                record.callback.clone(),
                record.context.clone(),
                record.run_loop.clone(),
            ),
            _ => {
                crate::debug_event!("dispatch", "stale batch dropped", "{stream}");
                return;
            }
        };

        crate::debug_event!(
            "dispatch",
            "batch",
            "{} events for {stream} under {context}",
            batch.len()
        );
        let (paths, flags) = batch.into_parts();

        let outcome = {
            let _scope = ContextScope::enter(context);
            panic::catch_unwind(AssertUnwindSafe(|| {
                callback.invoke(self, &paths, &flags)
            }))
        };

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(source)) => BridgeError::CallbackFailed {
                stream: stream.clone(),
                source,
            },
            Err(_) => BridgeError::CallbackInvocationFailed {
                stream: stream.clone(),
            },
        };

        tracing::warn!("[dispatch] {failure}, stopping {}", owner.id());
        self.state.failures.entry(owner.id()).or_insert(failure);
        owner.stop();
    }
}
