//! # AppShell JS
//!
//! Script engine integration for the AppShell host.
//!
//! The host needs three things from the engine: evaluate a script, find a
//! callable at a property path below the global object, and expose native
//! functions to script. Everything else about the engine stays behind
//! [`JsRuntime`].
//!
//! Script functions the host wants to call later are kept in the runtime's
//! [`RetainedFunctions`], which lives on the engine heap. Host code only
//! holds their ids.

use appshell_common::SCRIPT_TARGET;
use boa_engine::{Context, JsObject, JsString, NativeFunction, Source};
use boa_gc::{Finalize, Gc, GcRefCell, Trace};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Failures of engine operations requested by the host.
#[derive(Error, Debug)]
pub enum JsError {
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),
}

/// A callable script value together with the receiver it was found on.
#[derive(Clone, Trace, Finalize)]
pub struct JsFunction {
    object: JsObject,
    this: boa_engine::JsValue,
}

impl fmt::Debug for JsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsFunction")
    }
}

/// A script value as seen by the host. Objects and arrays stay opaque.
#[derive(Debug, Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object,
    Array,
    Function(JsFunction),
}

impl JsValue {
    /// Name of the value's type as `typeof` would report it, with arrays
    /// and null told apart.
    pub fn type_name(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "null",
            JsValue::Boolean(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::String(_) => "string",
            JsValue::Object => "object",
            JsValue::Array => "array",
            JsValue::Function(_) => "function",
        }
    }
}

/// Level of a `console` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn parse(level: &str) -> Self {
        match level {
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Log,
        }
    }
}

#[derive(Default, Trace, Finalize)]
struct FunctionTable {
    next_id: u64,
    functions: HashMap<u64, JsFunction>,
}

/// Script functions kept for a later call, addressed by id.
///
/// The table is traced by the engine's collector. Functions in it stay
/// alive as long as the runtime does and are collected with it.
#[derive(Clone, Trace, Finalize)]
pub struct RetainedFunctions(Gc<GcRefCell<FunctionTable>>);

impl RetainedFunctions {
    fn new() -> Self {
        Self(Gc::new(GcRefCell::new(FunctionTable::default())))
    }

    /// Keep `function` and return its id. Ids are never reused.
    pub fn retain(&self, function: JsFunction) -> u64 {
        let mut table = self.0.borrow_mut();
        table.next_id += 1;
        let id = table.next_id;
        table.functions.insert(id, function);
        id
    }

    /// Remove and return the function with `id`.
    pub fn take(&self, id: u64) -> Option<JsFunction> {
        self.0.borrow_mut().functions.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type NativeBody = dyn Fn(Vec<JsValue>, &RetainedFunctions) -> JsValue;

/// State captured by a registered native function.
#[derive(Trace, Finalize)]
struct NativeCaptures {
    retained: RetainedFunctions,
    // Host closures hold no engine values; script functions go through
    // `retained`.
    #[unsafe_ignore_trace]
    body: Rc<NativeBody>,
}

/// Name of the native sink the script-side `console` writes to.
const CONSOLE_SINK: &str = "__appshellConsole";

/// One engine context with `console` wired to the host log.
pub struct JsRuntime {
    context: Context,
    retained: RetainedFunctions,
}

impl JsRuntime {
    /// Create a context and install `console`.
    pub fn new() -> Result<Self, JsError> {
        let mut runtime = Self {
            context: Context::default(),
            retained: RetainedFunctions::new(),
        };
        runtime.setup_console()?;

        debug!("Script engine ready");
        Ok(runtime)
    }

    /// Set up console API. Output goes to the host log.
    fn setup_console(&mut self) -> Result<(), JsError> {
        self.register_function(CONSOLE_SINK, 2, |args, _| {
            let level = match args.first() {
                Some(JsValue::String(level)) => LogLevel::parse(level),
                _ => LogLevel::Log,
            };
            let text = match args.get(1) {
                Some(JsValue::String(text)) => text.as_str(),
                _ => "",
            };
            match level {
                LogLevel::Error => error!(target: SCRIPT_TARGET, "{}", text),
                LogLevel::Warn => warn!(target: SCRIPT_TARGET, "{}", text),
                LogLevel::Debug => debug!(target: SCRIPT_TARGET, "{}", text),
                LogLevel::Log | LogLevel::Info => info!(target: SCRIPT_TARGET, "{}", text),
            }
            JsValue::Undefined
        })?;

        let console_script = format!(
            r#"
            var console = (function(sink) {{
                function emit(level, args) {{
                    sink(level, Array.prototype.map.call(args, String).join(' '));
                }}
                return {{
                    log: function() {{ emit('log', arguments); }},
                    info: function() {{ emit('info', arguments); }},
                    warn: function() {{ emit('warn', arguments); }},
                    error: function() {{ emit('error', arguments); }},
                    debug: function() {{ emit('debug', arguments); }}
                }};
            }})({});
        "#,
            CONSOLE_SINK
        );

        self.evaluate_script(&console_script)?;
        Ok(())
    }

    /// Run `source` in the global scope and return its completion value.
    pub fn evaluate_script(&mut self, source: &str) -> Result<JsValue, JsError> {
        trace!(len = source.len(), "Evaluating script");

        match self.context.eval(Source::from_bytes(source)) {
            Ok(value) => Ok(from_engine(&value)),
            Err(err) => Err(JsError::ExecutionError(err.to_string())),
        }
    }

    /// Look up a callable by property path from the global object, e.g.
    /// `["shellAPI", "executeCommand"]`. The object holding the last link
    /// becomes the receiver when the function is called.
    ///
    /// Returns `None` if any link is missing or not an object, or if the
    /// final value is not callable.
    pub fn lookup_function(&mut self, path: &[&str]) -> Option<JsFunction> {
        let mut this = boa_engine::JsValue::undefined();
        let mut current = boa_engine::JsValue::from(self.context.global_object());

        for key in path {
            let holder = current.as_object()?.clone();
            let next = holder
                .get(JsString::from(*key), &mut self.context)
                .ok()?;
            this = boa_engine::JsValue::from(holder);
            current = next;
        }

        let object = current.as_object()?;
        if !object.is_callable() {
            return None;
        }

        Some(JsFunction {
            object: object.clone(),
            this,
        })
    }

    /// Call a function with the receiver it was found on.
    pub fn call_function(
        &mut self,
        function: &JsFunction,
        args: &[JsValue],
    ) -> Result<JsValue, JsError> {
        let args: Vec<boa_engine::JsValue> = args.iter().map(to_engine).collect();

        function
            .object
            .call(&function.this, &args, &mut self.context)
            .map(|value| from_engine(&value))
            .map_err(|err| JsError::ExecutionError(err.to_string()))
    }

    /// Expose a native function to script as a global.
    ///
    /// `body` receives the converted arguments and the runtime's
    /// [`RetainedFunctions`]. Function arguments arrive as
    /// [`JsValue::Function`]; to call one after `body` returns, retain it
    /// and keep the id.
    pub fn register_function<F>(
        &mut self,
        name: &str,
        length: usize,
        body: F,
    ) -> Result<(), JsError>
    where
        F: Fn(Vec<JsValue>, &RetainedFunctions) -> JsValue + 'static,
    {
        let captures = NativeCaptures {
            retained: self.retained.clone(),
            body: Rc::new(body),
        };
        let native = NativeFunction::from_copy_closure_with_captures(
            |_this, args, captures: &NativeCaptures, _context| {
                let args: Vec<JsValue> = args.iter().map(from_engine).collect();
                Ok(to_engine(&(captures.body)(args, &captures.retained)))
            },
            captures,
        );

        self.context
            .register_global_callable(JsString::from(name), length, native)
            .map_err(|err| JsError::RegistrationError(format!("{}: {}", name, err)))?;

        trace!(name, "Registered native function");
        Ok(())
    }

    /// Script functions retained by native calls.
    pub fn retained(&self) -> &RetainedFunctions {
        &self.retained
    }

    /// Check if a global variable exists.
    pub fn has_global(&mut self, name: &str) -> bool {
        let check = format!("typeof {} !== 'undefined'", name);
        matches!(self.evaluate_script(&check), Ok(JsValue::Boolean(true)))
    }
}

/// Convert an engine value to [`JsValue`].
fn from_engine(value: &boa_engine::JsValue) -> JsValue {
    use boa_engine::JsValue as EngineValue;

    match value {
        EngineValue::Undefined => JsValue::Undefined,
        EngineValue::Null => JsValue::Null,
        EngineValue::Boolean(b) => JsValue::Boolean(*b),
        EngineValue::Integer(n) => JsValue::Number(*n as f64),
        EngineValue::Rational(n) => JsValue::Number(*n),
        EngineValue::String(s) => JsValue::String(s.to_std_string_escaped()),
        EngineValue::Object(obj) => {
            if obj.is_array() {
                JsValue::Array
            } else if obj.is_callable() {
                JsValue::Function(JsFunction {
                    object: obj.clone(),
                    this: EngineValue::undefined(),
                })
            } else {
                JsValue::Object
            }
        }
        _ => JsValue::Undefined,
    }
}

/// Convert a [`JsValue`] to an engine value. Opaque objects and arrays
/// become `undefined`.
fn to_engine(value: &JsValue) -> boa_engine::JsValue {
    use boa_engine::JsValue as EngineValue;

    match value {
        JsValue::Undefined | JsValue::Object | JsValue::Array => EngineValue::undefined(),
        JsValue::Null => EngineValue::null(),
        JsValue::Boolean(b) => EngineValue::from(*b),
        JsValue::Number(n) => EngineValue::from(*n),
        JsValue::String(s) => EngineValue::from(JsString::from(s.as_str())),
        JsValue::Function(function) => EngineValue::from(function.object.clone()),
    }
}
