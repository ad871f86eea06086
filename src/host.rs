//! Host module glue.
//!
//! Exposes the runtime as a table of named functions taking positional
//! [`HostValue`] arguments, the shape an embedding interpreter calls into.
//! Arguments are decoded here; anything of the wrong count or type is
//! rejected with [`BridgeError::MalformedArguments`] before the runtime is
//! touched.

use std::fmt;

use crate::context::{StreamKey, ThreadKey};
use crate::error::{BridgeError, Result};
use crate::native::flags::{POLLIN, POLLOUT};
use crate::runtime::{Callback, Runtime};

pub const MODULE_NAME: &str = "_fsevents";
pub const MODULE_DOC: &str = "Low-level filesystem event stream interface.";

/// Functions exported by [`Module`], with their docstrings.
pub const FUNCTIONS: [(&str, &str); 4] = [
    ("loop", "Runs an event loop in a thread."),
    ("stop", "Stops running the event loop in the specified thread."),
    ("schedule", "Schedules a stream."),
    ("unschedule", "Unschedules a stream."),
];

/// Integer constants exported by [`Module`].
pub const CONSTANTS: [(&str, i64); 2] = [("POLLIN", POLLIN), ("POLLOUT", POLLOUT)];

/// A value crossing the host boundary.
#[derive(Clone)]
pub enum HostValue {
    None,
    Int(i64),
    Str(String),
    List(Vec<HostValue>),
    Thread(ThreadKey),
    Stream(StreamKey),
    Callable(Callback),
}

impl HostValue {
    fn type_name(&self) -> &'static str {
        match self {
            HostValue::None => "None",
            HostValue::Int(_) => "int",
            HostValue::Str(_) => "str",
            HostValue::List(_) => "list",
            HostValue::Thread(_) => "thread",
            HostValue::Stream(_) => "stream",
            HostValue::Callable(_) => "callable",
        }
    }

    /// Build a list of strings.
    pub fn str_list<S: Into<String>>(items: impl IntoIterator<Item = S>) -> Self {
        HostValue::List(items.into_iter().map(|s| HostValue::Str(s.into())).collect())
    }

    /// Build a list of integers.
    pub fn int_list(items: impl IntoIterator<Item = i64>) -> Self {
        HostValue::List(items.into_iter().map(HostValue::Int).collect())
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::None => f.write_str("None"),
            HostValue::Int(i) => write!(f, "{i}"),
            HostValue::Str(s) => write!(f, "{s:?}"),
            HostValue::List(items) => f.debug_list().entries(items).finish(),
            HostValue::Thread(t) => write!(f, "<{t}>"),
            HostValue::Stream(s) => write!(f, "<stream {s}>"),
            HostValue::Callable(_) => f.write_str("<callable>"),
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::None, HostValue::None) => true,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Thread(a), HostValue::Thread(b)) => a == b,
            (HostValue::Stream(a), HostValue::Stream(b)) => a == b,
            _ => false,
        }
    }
}

/// Positional arguments of one call, decoded left to right.
struct Args<'a> {
    function: &'static str,
    values: &'a [HostValue],
}

impl<'a> Args<'a> {
    fn new(function: &'static str, values: &'a [HostValue], arity: usize) -> Result<Self> {
        if values.len() != arity {
            return Err(BridgeError::malformed(
                function,
                format!("expected {arity} arguments, got {}", values.len()),
            ));
        }
        Ok(Self { function, values })
    }

    fn mismatch(&self, index: usize, expected: &str) -> BridgeError {
        BridgeError::malformed(
            self.function,
            format!(
                "argument {} must be {expected}, not {}",
                index + 1,
                self.values[index].type_name()
            ),
        )
    }

    fn thread(&self, index: usize) -> Result<ThreadKey> {
        match &self.values[index] {
            HostValue::Thread(key) => Ok(*key),
            HostValue::Int(raw) if *raw >= 0 => Ok(ThreadKey::new(*raw as u64)),
            _ => Err(self.mismatch(index, "a thread")),
        }
    }

    fn stream(&self, index: usize) -> Result<StreamKey> {
        match &self.values[index] {
            HostValue::Stream(key) => Ok(key.clone()),
            HostValue::Str(name) => Ok(StreamKey::from(name.as_str())),
            _ => Err(self.mismatch(index, "a stream")),
        }
    }

    fn callable(&self, index: usize) -> Result<Callback> {
        match &self.values[index] {
            HostValue::Callable(callback) => Ok(callback.clone()),
            _ => Err(self.mismatch(index, "callable")),
        }
    }

    fn str_list(&self, index: usize) -> Result<Vec<String>> {
        let HostValue::List(items) = &self.values[index] else {
            return Err(self.mismatch(index, "a list of str"));
        };
        items
            .iter()
            .map(|item| match item {
                HostValue::Str(s) => Ok(s.clone()),
                other => Err(BridgeError::malformed(
                    self.function,
                    format!(
                        "argument {} must contain only str, found {}",
                        index + 1,
                        other.type_name()
                    ),
                )),
            })
            .collect()
    }
}

/// The exported function table, bound to one runtime.
#[derive(Clone, Debug, Default)]
pub struct Module {
    runtime: Runtime,
}

impl Module {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Value of an exported constant.
    pub fn constant(name: &str) -> Option<i64> {
        CONSTANTS
            .iter()
            .find(|(constant, _)| *constant == name)
            .map(|(_, value)| *value)
    }

    /// Call an exported function by name.
    ///
    /// Every function returns [`HostValue::None`] on success, except `stop`
    /// which also returns `None` whether or not a loop was running.
    pub fn call(&self, function: &str, args: &[HostValue]) -> Result<HostValue> {
        match function {
            "loop" => {
                let args = Args::new("loop", args, 1)?;
                self.runtime.run_loop(args.thread(0)?)?;
            }
            "stop" => {
                let args = Args::new("stop", args, 1)?;
                self.runtime.stop(args.thread(0)?);
            }
            "schedule" => {
                let args = Args::new("schedule", args, 4)?;
                let thread = args.thread(0)?;
                let stream = args.stream(1)?;
                let callback = args.callable(2)?;
                let paths = args.str_list(3)?;
                self.runtime.schedule(thread, stream, callback, paths)?;
            }
            "unschedule" => {
                let args = Args::new("unschedule", args, 1)?;
                self.runtime.unschedule(&args.stream(0)?)?;
            }
            other => {
                return Err(BridgeError::MalformedArguments {
                    function: other.to_string(),
                    reason: format!("{MODULE_NAME} has no function '{other}'"),
                });
            }
        }
        Ok(HostValue::None)
    }
}
