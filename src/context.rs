//! Thread, stream and execution-context identities.
//!
//! A [`ThreadKey`] names a logical host thread and is the key under which a
//! running loop is registered. A [`StreamKey`] is supplied by the caller to
//! name a watch. An [`ExecutionContext`] is the host runtime's notion of
//! "who is executing right now"; it is captured when a stream is scheduled
//! and re-entered with a [`ContextScope`] whenever that stream's callback runs.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_THREAD_KEY: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Default context of this OS thread, created on first use.
    static DEFAULT_CONTEXT: ExecutionContext = ExecutionContext::for_current_thread();

    /// Context swapped in by a [`ContextScope`], if any.
    static ACTIVE_CONTEXT: RefCell<Option<ExecutionContext>> = const { RefCell::new(None) };
}

/// Identity of a logical host thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey(u64);

impl ThreadKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Thread key of the currently active execution context.
    ///
    /// Inside a dispatched callback this is the key of the thread that
    /// scheduled the stream, not of the thread running the loop.
    pub fn current() -> Self {
        ExecutionContext::current().thread()
    }

    fn allocate() -> Self {
        Self(NEXT_THREAD_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Caller-chosen identity of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey(Arc<str>);

impl StreamKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StreamKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// The host runtime's active execution context.
///
/// Cheap to clone. Two contexts are equal when they are the same context,
/// regardless of which OS thread observes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    id: u64,
    thread: ThreadKey,
    name: Option<Arc<str>>,
}

impl ExecutionContext {
    fn for_current_thread() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            thread: ThreadKey::allocate(),
            name: std::thread::current().name().map(Arc::from),
        }
    }

    /// The context active on the calling OS thread.
    ///
    /// Returns the context entered through a [`ContextScope`] if one is
    /// active, otherwise this thread's default context.
    pub fn current() -> Self {
        ACTIVE_CONTEXT
            .with(|active| active.borrow().clone())
            .unwrap_or_else(|| DEFAULT_CONTEXT.with(Clone::clone))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Logical thread this context belongs to.
    pub fn thread(&self) -> ThreadKey {
        self.thread
    }

    /// Name of the OS thread that created this context, if it had one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "ctx-{} ({}, {name})", self.id, self.thread),
            None => write!(f, "ctx-{} ({})", self.id, self.thread),
        }
    }
}

/// Makes a context active on the current OS thread until dropped.
///
/// The previously active context is restored on drop, which also covers
/// unwinding out of a panicking callback.
#[must_use = "the context is restored as soon as the scope is dropped"]
pub struct ContextScope {
    previous: Option<ExecutionContext>,
}

impl ContextScope {
    pub fn enter(context: ExecutionContext) -> Self {
        let previous = ACTIVE_CONTEXT.with(|active| active.borrow_mut().replace(context));
        Self { previous }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_CONTEXT.with(|active| *active.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_default_context_is_stable_per_thread() {
        let a = ExecutionContext::current();
        let b = ExecutionContext::current();
        assert_eq!(a, b);
        assert_eq!(ThreadKey::current(), a.thread());
    }

    #[test]
    fn test_threads_get_distinct_contexts() {
        let here = ExecutionContext::current();
        let there = thread::spawn(ExecutionContext::current).join().unwrap();

        assert_ne!(here, there);
        assert_ne!(here.thread(), there.thread());
    }

    #[test]
    fn test_scope_swaps_and_restores() {
        let own = ExecutionContext::current();
        let foreign = thread::spawn(ExecutionContext::current).join().unwrap();

        {
            let _scope = ContextScope::enter(foreign.clone());
            assert_eq!(ExecutionContext::current(), foreign);
            assert_eq!(ThreadKey::current(), foreign.thread());

            // Nested scopes restore the outer one
            {
                let _inner = ContextScope::enter(own.clone());
                assert_eq!(ExecutionContext::current(), own);
            }
            assert_eq!(ExecutionContext::current(), foreign);
        }

        assert_eq!(ExecutionContext::current(), own);
    }

    #[test]
    fn test_scope_restores_on_panic() {
        let own = ExecutionContext::current();
        let foreign = thread::spawn(ExecutionContext::current).join().unwrap();

        let result = std::panic::catch_unwind(|| {
            let _scope = ContextScope::enter(foreign);
            panic!("callback blew up");
        });

        assert!(result.is_err());
        assert_eq!(ExecutionContext::current(), own);
    }

    #[test]
    fn test_stream_key_conversions() {
        let a = StreamKey::from("docs");
        let b = StreamKey::from("docs".to_string());
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "docs");
        assert_eq!(ThreadKey::new(4).to_string(), "thread-4");
    }
}
