//! Loop and stream lifecycle under a single execution lock.
//!
//! # Architecture
//!
//! ```text
//! Runtime (cloneable handle)
//!   Mutex<RuntimeState>          the global execution lock
//!     loops:   ThreadKey -> LoopHandle
//!     streams: StreamKey -> StreamRecord
//!     failures per run loop
//!         |
//!   LockedRuntime                proof that the lock is held
//!     run_loop / stop            loop_runner.rs
//!     schedule / unschedule      scheduler.rs
//!     dispatch                   dispatch.rs (on the loop's thread)
//! ```
//!
//! Every registry access happens through a [`LockedRuntime`]. `run_loop`
//! gives the lock up while its thread is blocked in the run loop, and the
//! dispatcher takes it for the duration of each callback. Callbacks receive
//! the `LockedRuntime` they run under, so they can schedule, unschedule or
//! stop without locking again.

mod dispatch;
mod loop_runner;
mod record;
mod scheduler;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::StreamSettings;
use crate::context::{StreamKey, ThreadKey};
use crate::error::{BridgeError, Result};
use crate::native::{LoopId, NotifyStreams, StreamFactory};
use crate::registry::HandleRegistry;

pub use record::{LoopHandle, StreamRecord};

type CallbackFn =
    dyn Fn(&mut LockedRuntime<'_>, &[String], &[u32]) -> anyhow::Result<()> + Send + Sync;

/// Callback invoked with the paths and flags of each batch.
///
/// Cheap to clone; all clones share one allocation. A scheduled stream holds
/// one reference until it is unscheduled.
#[derive(Clone)]
pub struct Callback(Arc<CallbackFn>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut LockedRuntime<'_>, &[String], &[u32]) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn invoke(
        &self,
        runtime: &mut LockedRuntime<'_>,
        paths: &[String],
        flags: &[u32],
    ) -> anyhow::Result<()> {
        (self.0)(runtime, paths, flags)
    }

    /// Number of live references, including this one.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").finish()
    }
}

/// State guarded by the execution lock.
pub(crate) struct RuntimeState {
    loops: HandleRegistry<ThreadKey, LoopHandle>,
    streams: HandleRegistry<StreamKey, StreamRecord>,
    /// First callback failure on each run loop, taken by `run_loop`.
    failures: HashMap<LoopId, BridgeError>,
    next_serial: u64,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            loops: HandleRegistry::new("loop"),
            streams: HandleRegistry::new("stream"),
            failures: HashMap::new(),
            next_serial: 1,
        }
    }
}

pub(crate) struct Inner {
    state: Mutex<RuntimeState>,
    factory: Arc<dyn StreamFactory>,
    settings: StreamSettings,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.streams.release_all();
        state.loops.release_all();
    }
}

/// Handle to a runtime instance.
///
/// Cloning is cheap and every clone refers to the same registries and lock.
/// Do not call these methods from inside a callback: the lock is already held
/// there, use the [`LockedRuntime`] passed to the callback instead.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    /// Runtime whose streams come from `factory`, with default settings.
    pub fn new(factory: impl StreamFactory + 'static) -> Self {
        Self::builder().factory(factory).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Acquire the execution lock.
    pub fn lock(&self) -> LockedRuntime<'_> {
        LockedRuntime::acquire(&self.inner)
    }

    /// Run the calling thread's loop under `thread` until it is stopped.
    ///
    /// See [`LockedRuntime::run_loop`].
    pub fn run_loop(&self, thread: ThreadKey) -> Result<()> {
        self.lock().run_loop(thread)
    }

    /// Ask the loop registered under `thread` to stop.
    ///
    /// See [`LockedRuntime::stop`].
    pub fn stop(&self, thread: ThreadKey) -> bool {
        self.lock().stop(thread)
    }

    /// Watch `paths` and deliver their batches to `callback`.
    ///
    /// See [`LockedRuntime::schedule`].
    pub fn schedule<I>(
        &self,
        thread: ThreadKey,
        stream: impl Into<StreamKey>,
        callback: Callback,
        paths: I,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        self.lock().schedule(thread, stream.into(), callback, paths)
    }

    /// Tear down a scheduled stream.
    ///
    /// See [`LockedRuntime::unschedule`].
    pub fn unschedule(&self, stream: &StreamKey) -> Result<()> {
        self.lock().unschedule(stream)
    }

    pub fn is_loop_registered(&self, thread: ThreadKey) -> bool {
        self.lock().is_loop_registered(thread)
    }

    pub fn is_scheduled(&self, stream: &StreamKey) -> bool {
        self.lock().is_scheduled(stream)
    }

    pub fn scheduled_count(&self) -> usize {
        self.lock().scheduled_count()
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.inner.settings
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// The execution lock, held.
///
/// All registry operations are methods on this type. Dropping it releases the
/// lock.
pub struct LockedRuntime<'rt> {
    inner: &'rt Arc<Inner>,
    state: MutexGuard<'rt, RuntimeState>,
}

impl<'rt> LockedRuntime<'rt> {
    fn acquire(inner: &'rt Arc<Inner>) -> Self {
        Self {
            inner,
            state: inner.state.lock(),
        }
    }

    /// Release the lock while `f` runs, re-acquiring it afterwards.
    ///
    /// Callbacks use this around blocking work so other loops can dispatch
    /// in the meantime.
    pub fn allow_threads<T>(&mut self, f: impl FnOnce() -> T) -> T {
        MutexGuard::unlocked(&mut self.state, f)
    }

    pub fn is_loop_registered(&self, thread: ThreadKey) -> bool {
        self.state.loops.contains(&thread)
    }

    pub fn is_scheduled(&self, stream: &StreamKey) -> bool {
        self.state.streams.contains(stream)
    }

    pub fn scheduled_count(&self) -> usize {
        self.state.streams.len()
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.inner.settings
    }
}

/// Builder for a [`Runtime`].
pub struct RuntimeBuilder {
    factory: Option<Arc<dyn StreamFactory>>,
    settings: StreamSettings,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            factory: None,
            settings: StreamSettings::default(),
        }
    }

    /// Set the stream factory. Defaults to [`NotifyStreams`].
    pub fn factory(mut self, factory: impl StreamFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set an already shared stream factory.
    pub fn shared_factory(mut self, factory: Arc<dyn StreamFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set latency and creation flags for new streams.
    pub fn settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Runtime {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(NotifyStreams::new()));

        Runtime {
            inner: Arc::new(Inner {
                state: Mutex::new(RuntimeState::new()),
                factory,
                settings: self.settings,
            }),
        }
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
