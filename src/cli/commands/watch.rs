//! Watch command: run a loop on the main thread and print every batch.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::cli::args::WatchArgs;
use crate::config::Settings;
use crate::context::{StreamKey, ThreadKey};
use crate::error::{BridgeError, Result};
use crate::native::RunLoop;
use crate::runtime::{Callback, Runtime};

const STREAM_NAME: &str = "cli-watch";

/// One batch as printed with `--json`.
#[derive(Debug, Serialize)]
struct BatchLine<'a> {
    paths: &'a [String],
    flags: &'a [u32],
}

/// Render a batch in the requested output format.
fn render(paths: &[String], flags: &[u32], json: bool) -> serde_json::Result<String> {
    if json {
        return serde_json::to_string(&BatchLine { paths, flags });
    }

    let mut out = String::new();
    for (path, flag) in paths.iter().zip(flags) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("{flag:#010x} {path}"));
    }
    Ok(out)
}

/// Run the watch command until interrupted or `--max-batches` is reached.
pub fn run_watch(args: WatchArgs, settings: &Settings) -> Result<()> {
    let mut stream_settings = settings.stream.clone();
    if let Some(latency_ms) = args.latency_ms {
        stream_settings.latency_ms = latency_ms;
    }
    stream_settings.file_events |= args.file_events;
    stream_settings.watch_root |= args.watch_root;

    let runtime = Runtime::builder().settings(stream_settings).build();
    let thread = ThreadKey::current();
    let json = args.json;
    let max_batches = args.max_batches;
    let seen = Arc::new(AtomicUsize::new(0));

    let callback = Callback::new(move |rt, paths, flags| {
        let line = render(paths, flags, json)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;

        let count = seen.fetch_add(1, Ordering::Relaxed) + 1;
        if max_batches.is_some_and(|max| count >= max) {
            rt.stop(thread);
        }
        Ok(())
    });

    // Scheduling happens from the loop itself so the stream lands on it.
    let schedule_error: Arc<Mutex<Option<BridgeError>>> = Arc::default();
    {
        let runtime = runtime.clone();
        let schedule_error = Arc::clone(&schedule_error);
        let paths = args.paths;
        RunLoop::current().perform(move || {
            let mut rt = runtime.lock();
            if let Err(e) = rt.schedule(thread, StreamKey::from(STREAM_NAME), callback, paths) {
                *schedule_error.lock() = Some(e);
                rt.stop(thread);
            }
        });
    }

    let outcome = runtime.run_loop(thread);

    if let Some(e) = schedule_error.lock().take() {
        return Err(e);
    }
    outcome?;

    let key = StreamKey::from(STREAM_NAME);
    if runtime.is_scheduled(&key) {
        runtime.unschedule(&key)?;
    }
    Ok(())
}
