//! In-process stream backend driven by the caller.
//!
//! Streams created by [`ManualStreams`] never touch the filesystem. Each one
//! is paired with a [`ManualHandle`] that pushes batches into it, which makes
//! delivery deterministic for tests and for embedders that produce events
//! themselves.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::NativeError;
use super::run_loop::RunLoop;
use super::stream::{BatchHandler, DeliveryPort, EventStream, StreamFactory, StreamParams};
use crate::events::EventBatch;

/// Lifecycle calls observed on a manual stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatus {
    pub scheduled: bool,
    pub started: bool,
    pub stopped: bool,
    pub invalidated: bool,
    pub released: bool,
}

struct Shared {
    params: StreamParams,
    port: Mutex<DeliveryPort>,
    status: Mutex<StreamStatus>,
    next_event_id: AtomicU64,
}

/// Test-side handle to a manual stream.
#[derive(Clone)]
pub struct ManualHandle {
    shared: Arc<Shared>,
}

impl ManualHandle {
    pub fn params(&self) -> &StreamParams {
        &self.shared.params
    }

    pub fn status(&self) -> StreamStatus {
        *self.shared.status.lock()
    }

    /// Batches posted to the loop that have not run yet.
    pub fn backlog(&self) -> usize {
        self.shared.port.lock().backlog()
    }

    /// Push a batch. Returns `false` if the stream is not live or the
    /// loop's backlog is full.
    pub fn deliver(&self, batch: EventBatch) -> bool {
        self.shared.port.lock().post(batch)
    }

    /// Push `(path, flags)` pairs as one batch, numbering events in order.
    pub fn deliver_events<'a>(&self, events: impl IntoIterator<Item = (&'a str, u32)>) -> bool {
        let batch = events
            .into_iter()
            .map(|(path, flags)| {
                let id = self.shared.next_event_id.fetch_add(1, Ordering::Relaxed);
                (path, flags, id)
            })
            .collect();
        self.deliver(batch)
    }
}

struct ManualStream {
    shared: Arc<Shared>,
    fail_start: Option<String>,
}

impl EventStream for ManualStream {
    fn schedule_with_run_loop(&mut self, run_loop: Arc<RunLoop>) {
        self.shared.port.lock().attach(run_loop);
        self.shared.status.lock().scheduled = true;
    }

    fn start(&mut self) -> Result<(), NativeError> {
        if !self.shared.port.lock().is_attached() {
            return Err(NativeError::NotScheduled);
        }
        if let Some(reason) = self.fail_start.take() {
            return Err(NativeError::StartRejected { reason });
        }
        self.shared.port.lock().set_live(true);
        self.shared.status.lock().started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.port.lock().set_live(false);
        self.shared.status.lock().stopped = true;
    }

    fn invalidate(&mut self) {
        self.shared.port.lock().detach();
        self.shared.status.lock().invalidated = true;
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        self.shared.status.lock().released = true;
    }
}

#[derive(Default)]
struct FactoryState {
    handles: Vec<ManualHandle>,
    fail_next_create: Option<String>,
    fail_next_start: Option<String>,
}

/// Factory for caller-driven streams.
#[derive(Clone, Default)]
pub struct ManualStreams {
    state: Arc<Mutex<FactoryState>>,
}

impl ManualStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail with `reason`.
    pub fn fail_next_create(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_create = Some(reason.into());
    }

    /// Make the next created stream refuse to start with `reason`.
    pub fn fail_next_start(&self, reason: impl Into<String>) {
        self.state.lock().fail_next_start = Some(reason.into());
    }

    /// Handles of every stream created so far, oldest first.
    pub fn handles(&self) -> Vec<ManualHandle> {
        self.state.lock().handles.clone()
    }

    /// Handle of the most recently created stream.
    pub fn last(&self) -> Option<ManualHandle> {
        self.state.lock().handles.last().cloned()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().handles.len()
    }
}

impl StreamFactory for ManualStreams {
    fn create(
        &self,
        params: StreamParams,
        handler: BatchHandler,
    ) -> Result<Box<dyn EventStream>, NativeError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_next_create.take() {
            return Err(NativeError::CreateRejected { reason });
        }

        let port = DeliveryPort::new(handler).with_roots(&params.paths);
        let shared = Arc::new(Shared {
            params,
            port: Mutex::new(port),
            status: Mutex::new(StreamStatus::default()),
            next_event_id: AtomicU64::new(1),
        });
        state.handles.push(ManualHandle {
            shared: shared.clone(),
        });

        Ok(Box::new(ManualStream {
            shared,
            fail_start: state.fail_next_start.take(),
        }))
    }
}
