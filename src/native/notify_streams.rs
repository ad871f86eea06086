//! Event streams backed by the `notify` crate.
//!
//! Each started stream owns a `notify::RecommendedWatcher` watching its roots
//! recursively and a coalescing thread. Raw `notify` events are translated to
//! platform event flag bits, collected for the configured latency and posted
//! onto the stream's run loop as one batch. With [`CreateFlags::NO_DEFER`]
//! the first event of a burst is posted immediately and only the rest of the
//! burst waits for the window to close.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::NativeError;
use super::flags::{CreateFlags, EventFlags};
use super::run_loop::RunLoop;
use super::stream::{BatchHandler, DeliveryPort, EventStream, SinceWhen, StreamFactory, StreamParams};
use crate::events::EventBatch;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Factory for filesystem-backed streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyStreams;

impl NotifyStreams {
    pub fn new() -> Self {
        Self
    }
}

impl StreamFactory for NotifyStreams {
    fn create(
        &self,
        params: StreamParams,
        handler: BatchHandler,
    ) -> Result<Box<dyn EventStream>, NativeError> {
        if let SinceWhen::EventId(id) = params.since {
            return Err(NativeError::Unsupported(format!(
                "history replay from event {id}"
            )));
        }

        if params.flags.contains(CreateFlags::IGNORE_SELF) {
            return Err(NativeError::Unsupported(
                "ignoring changes made by this process".to_string(),
            ));
        }

        let port = DeliveryPort::new(handler).with_roots(&params.paths);
        Ok(Box::new(NotifyStream {
            params,
            port,
            watcher: None,
            invalidated: false,
        }))
    }
}

struct NotifyStream {
    params: StreamParams,
    port: DeliveryPort,
    /// Present while started. Dropping it ends the coalescing thread.
    watcher: Option<notify::RecommendedWatcher>,
    invalidated: bool,
}

impl EventStream for NotifyStream {
    fn schedule_with_run_loop(&mut self, run_loop: Arc<RunLoop>) {
        self.port.attach(run_loop);
    }

    fn start(&mut self) -> Result<(), NativeError> {
        if self.invalidated {
            return Err(NativeError::Invalidated);
        }
        if !self.port.is_attached() {
            return Err(NativeError::NotScheduled);
        }
        if self.watcher.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        for path in &self.params.paths {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|source| NativeError::PathWatchFailed {
                    path: path.clone(),
                    source,
                })?;
            crate::debug_event!("notify", "watching", "{}", path.display());
        }

        let coalescer = Coalescer {
            rx,
            port: self.port.clone(),
            roots: self.params.paths.clone(),
            latency: self.params.latency,
            flags: self.params.flags,
        };

        self.port.set_live(true);
        if let Err(e) = thread::Builder::new()
            .name("fsevents-coalesce".to_string())
            .spawn(move || coalescer.run())
        {
            self.port.set_live(false);
            return Err(NativeError::StartRejected {
                reason: e.to_string(),
            });
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        self.port.set_live(false);
        self.watcher = None;
    }

    fn invalidate(&mut self) {
        self.stop();
        self.port.detach();
        self.invalidated = true;
    }
}

/// Collects raw events into batches and posts them.
struct Coalescer {
    rx: Receiver<notify::Result<Event>>,
    port: DeliveryPort,
    roots: Vec<PathBuf>,
    latency: Duration,
    flags: CreateFlags,
}

impl Coalescer {
    fn run(self) {
        let mut pending = EventBatch::new();

        // Ends when the watcher, and with it the sender, is dropped
        while let Ok(first) = self.rx.recv() {
            self.absorb(first, &mut pending);
            if self.flags.contains(CreateFlags::NO_DEFER) {
                self.flush(&mut pending);
            }

            let deadline = Instant::now() + self.latency;
            loop {
                match self.rx.recv_deadline(deadline) {
                    Ok(res) => self.absorb(res, &mut pending),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        self.flush(&mut pending);
                        return;
                    }
                }
            }
            self.flush(&mut pending);
        }
    }

    fn flush(&self, pending: &mut EventBatch) {
        if pending.is_empty() {
            return;
        }
        let batch = std::mem::take(pending);
        let count = batch.len();
        if !self.port.post(batch) {
            tracing::trace!("[notify] dropped {count} events for stopped stream");
        }
    }

    fn absorb(&self, res: notify::Result<Event>, pending: &mut EventBatch) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("[notify] watch error: {e}");
                let dropped = EventFlags::MUST_SCAN_SUBDIRS | EventFlags::USER_DROPPED;
                let paths = if e.paths.is_empty() { &self.roots } else { &e.paths };
                for path in paths {
                    pending.push(path_string(path), dropped.bits(), next_event_id());
                }
                return;
            }
        };

        let Some(mut base) = kind_flags(&event.kind) else {
            return;
        };
        if event.need_rescan() {
            base |= EventFlags::MUST_SCAN_SUBDIRS;
        }

        let file_events = self.flags.contains(CreateFlags::FILE_EVENTS);
        for path in &event.paths {
            if file_events {
                let flags = base | item_type_flags(&event.kind, path);
                pending.push(path_string(path), flags.bits(), next_event_id());
            } else {
                let dir = path_string(directory_of(path));
                if !pending.paths().contains(&dir) {
                    let flags = base & EventFlags::MUST_SCAN_SUBDIRS;
                    pending.push(dir, flags.bits(), next_event_id());
                }
            }

            if self.flags.contains(CreateFlags::WATCH_ROOT) && self.is_root_change(&event.kind, path)
            {
                pending.push(
                    path_string(path),
                    EventFlags::ROOT_CHANGED.bits(),
                    next_event_id(),
                );
            }
        }
    }

    fn is_root_change(&self, kind: &EventKind, path: &Path) -> bool {
        matches!(
            kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        ) && self.roots.iter().any(|root| root == path)
    }
}

fn next_event_id() -> u64 {
    NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Directory reported for `path` when streams are directory-granular.
fn directory_of(path: &Path) -> &Path {
    if path.is_dir() {
        return path;
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => path,
    }
}

/// Translate a `notify` event kind into platform flag bits.
///
/// Access events have no platform counterpart and yield `None`.
fn kind_flags(kind: &EventKind) -> Option<EventFlags> {
    let flags = match kind {
        EventKind::Access(_) => return None,
        EventKind::Create(_) => EventFlags::ITEM_CREATED,
        EventKind::Remove(_) => EventFlags::ITEM_REMOVED,
        EventKind::Modify(ModifyKind::Name(_)) => EventFlags::ITEM_RENAMED,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership)) => {
            EventFlags::ITEM_CHANGE_OWNER
        }
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Extended)) => {
            EventFlags::ITEM_XATTR_MOD
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => EventFlags::ITEM_INODE_META_MOD,
        EventKind::Modify(_) => EventFlags::ITEM_MODIFIED,
        EventKind::Any | EventKind::Other => EventFlags::MUST_SCAN_SUBDIRS,
    };
    Some(flags)
}

/// File/dir/symlink bits, from the event kind when it says, else from disk.
fn item_type_flags(kind: &EventKind, path: &Path) -> EventFlags {
    match kind {
        EventKind::Create(CreateKind::File) | EventKind::Remove(RemoveKind::File) => {
            return EventFlags::ITEM_IS_FILE;
        }
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            return EventFlags::ITEM_IS_DIR;
        }
        _ => {}
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => EventFlags::ITEM_IS_SYMLINK,
        Ok(meta) if meta.is_dir() => EventFlags::ITEM_IS_DIR,
        Ok(_) => EventFlags::ITEM_IS_FILE,
        Err(_) => EventFlags::empty(),
    }
}
