//! Sandboxed rule scripts.
//!
//! A snippet is the body of `script(p, t, match, level, modifiers)` written in
//! a small indentation-structured language. It is compiled once to bytecode
//! and executed by a VM whose only globals are an allow-listed set of
//! builtins, the `Paragraph` API and the `re`, `math` and `itertools`
//! modules. Names outside that set fail at compile time.
//!
//! ```
//! use quickjump::document::{Paragraph, TextBlock, TextDocument};
//! use quickjump::script::{Invocation, MatchOffset, Script, ScriptCall};
//!
//! let doc = TextDocument::new(vec![TextBlock::new("a"), TextBlock::new("b")]);
//! let p = Paragraph::new(doc.cursor_at(0));
//! let script = Script::compile("if p.text == 'a':\n    match(1)").unwrap();
//! match script.invoke(ScriptCall::new(p.clone(), p)).unwrap() {
//!     Invocation::Finished { result: Some(args), .. } => {
//!         assert_eq!(args.offset, MatchOffset::Paragraphs(1));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

mod builtins;
mod compiler;
mod lexer;
mod parser;
mod task;
mod value;
mod vm;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::document::Paragraph;
use compiler::Program;
use value::Value;
use vm::{Context, Exit, Machine};

pub use task::{Scheduler, ScriptTask, Task, TaskId, TaskStep};

/// Instructions a single run may execute before it is stopped.
pub const DEFAULT_STEP_LIMIT: u64 = 100_000;

fn located(message: &str, line: &Option<usize>) -> String {
    match line {
        Some(line) => format!("line {}: {}", line, message),
        None => message.to_string(),
    }
}

/// A snippet or pattern that failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", located(.message, .line))]
pub struct CompileError {
    pub message: String,
    pub line: Option<usize>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
        }
    }

    pub fn at(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line: Some(line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// `NotFoundError`, raised explicitly or by paragraph movement
    NotFound,
    /// `raise ScriptError(...)`
    Raised,
    /// Type errors, bad indices, division by zero and the like
    Runtime,
    /// Malformed `match()` arguments or results
    Contract,
    /// The run exceeded its instruction budget
    StepLimit,
}

/// Error raised while a script runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", located(.message, .line))]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    pub line: Option<usize>,
}

impl ScriptError {
    /// A user-raised script error.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ScriptErrorKind::Raised, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::with_kind(ScriptErrorKind::Runtime, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(ScriptErrorKind::NotFound, message)
    }

    pub fn contract(message: impl Into<String>) -> Self {
        Self::with_kind(ScriptErrorKind::Contract, message)
    }

    pub fn with_kind(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attach a source line unless one is already set.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ScriptErrorKind::NotFound
    }

    pub fn is_contract(&self) -> bool {
        self.kind == ScriptErrorKind::Contract
    }
}

/// Where a match lands.
#[derive(Debug, Clone)]
pub enum MatchOffset {
    /// The candidate paragraph itself
    Here,
    /// This many paragraphs from the candidate
    Paragraphs(i32),
    /// An explicit paragraph
    Paragraph(Paragraph),
}

impl PartialEq for MatchOffset {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MatchOffset::Here, MatchOffset::Here) => true,
            (MatchOffset::Paragraphs(a), MatchOffset::Paragraphs(b)) => a == b,
            (MatchOffset::Paragraph(a), MatchOffset::Paragraph(b)) => a.same_position(b),
            _ => false,
        }
    }
}

/// What a match announces.
#[derive(Debug, Clone)]
pub enum MatchMessage {
    None,
    Text(String),
    /// Speak this paragraph's text
    Paragraph(Paragraph),
}

impl MatchMessage {
    pub fn is_none(&self) -> bool {
        matches!(self, MatchMessage::None)
    }

    /// Text to speak, if any.
    pub fn text(&self) -> Option<String> {
        match self {
            MatchMessage::None => None,
            MatchMessage::Text(s) => Some(s.clone()),
            MatchMessage::Paragraph(p) => Some(p.text()),
        }
    }
}

impl PartialEq for MatchMessage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MatchMessage::None, MatchMessage::None) => true,
            (MatchMessage::Text(a), MatchMessage::Text(b)) => a == b,
            (MatchMessage::Paragraph(a), MatchMessage::Paragraph(b)) => a.same_position(b),
            _ => false,
        }
    }
}

/// Validated arguments of a script's `match(...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchArgs {
    pub offset: MatchOffset,
    pub message: MatchMessage,
}

/// Side effects requested by a script, dispatched by the caller.
#[derive(Debug, Clone)]
pub enum ScriptEffect {
    Speak(String),
    Click(Paragraph),
    Beep {
        frequency: f64,
        duration_ms: u64,
        left: u8,
        right: u8,
    },
    BlockKeys(Duration),
    UnblockKeys,
}

/// Arguments of one script invocation.
#[derive(Debug, Clone)]
pub struct ScriptCall {
    /// `p`: the candidate paragraph
    pub candidate: Paragraph,
    /// `t`: the paragraph the scan started from
    pub origin: Paragraph,
    pub level: Option<i64>,
    pub modifiers: i64,
    pub step_limit: u64,
}

impl ScriptCall {
    pub fn new(candidate: Paragraph, origin: Paragraph) -> Self {
        Self {
            candidate,
            origin,
            level: None,
            modifiers: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_level(mut self, level: Option<i64>) -> Self {
        self.level = level;
        self
    }

    pub fn with_modifiers(mut self, modifiers: i64) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }
}

/// Outcome of [`Script::invoke`].
#[derive(Debug)]
pub enum Invocation {
    /// The script ran to completion. `result` is `None` for no match.
    Finished {
        result: Option<MatchArgs>,
        effects: Vec<ScriptEffect>,
    },
    /// The script is a generator; drive it with a [`Scheduler`].
    Task(ScriptTask),
}

/// A compiled snippet. Cheap to clone and shareable across threads.
#[derive(Clone)]
pub struct Script {
    program: Arc<Program>,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("instructions", &self.program.code.len())
            .field("is_generator", &self.program.is_generator)
            .finish()
    }
}

impl Script {
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        Ok(Self {
            program: Arc::new(compiler::compile(source)?),
        })
    }

    /// Whether the snippet contains `yield`.
    pub fn is_generator(&self) -> bool {
        self.program.is_generator
    }

    /// Run the script for one candidate.
    ///
    /// A `NotFoundError` escaping the script means "no match" and is returned
    /// as a finished invocation without a result.
    pub fn invoke(&self, call: ScriptCall) -> Result<Invocation, ScriptError> {
        let mut machine = self.machine(call);
        if self.is_generator() {
            return Ok(Invocation::Task(ScriptTask::new(machine)));
        }
        let returned = match machine.run() {
            Ok(Exit::Return(value)) => value,
            Ok(Exit::Yield(_)) => return Err(ScriptError::runtime("unexpected yield")),
            Err(e) if e.is_not_found() => {
                log::debug!("script found nothing: {}", e);
                return Ok(Invocation::Finished {
                    result: None,
                    effects: machine.context_mut().take_effects(),
                });
            }
            Err(e) => return Err(e),
        };
        let context = machine.context_mut();
        let result = resolve(returned, context.match_args.take())?;
        Ok(Invocation::Finished {
            result,
            effects: context.take_effects(),
        })
    }

    fn machine(&self, call: ScriptCall) -> Machine {
        let candidate = Value::paragraph(call.candidate);
        let args = [
            candidate.clone(),
            Value::paragraph(call.origin),
            Value::Builtin(builtins::Builtin::Match),
            call.level.map_or(Value::None, Value::Int),
            Value::Int(call.modifiers),
        ];
        let context = Context::new(candidate);
        Machine::new(Arc::clone(&self.program), args, context, call.step_limit)
    }
}

/// Turn a script's return value and/or `match()` call into match arguments.
fn resolve(returned: Value, called: Option<(Value, Value)>) -> Result<Option<MatchArgs>, ScriptError> {
    let (offset, message) = match (called, returned) {
        (Some(_), returned) if !matches!(returned, Value::None) => {
            return Err(ScriptError::contract(
                "script called match() and also returned a value",
            ))
        }
        (Some(args), _) => args,
        (None, Value::None) => return Ok(None),
        (None, Value::Tuple(items)) => match items.as_slice() {
            [] => (Value::None, Value::None),
            [offset] => (offset.clone(), Value::None),
            [offset, message] => (offset.clone(), message.clone()),
            _ => {
                return Err(ScriptError::contract(format!(
                    "match() takes at most 2 arguments ({} given)",
                    items.len()
                )))
            }
        },
        (None, Value::Dict(dict)) => {
            let dict = dict.borrow();
            for key in dict.keys() {
                if !matches!(key.as_str(), Some("offset") | Some("message")) {
                    return Err(ScriptError::contract(format!(
                        "unexpected match() argument {}",
                        key.repr()
                    )));
                }
            }
            (
                dict.get(&Value::str("offset")).unwrap_or(Value::None),
                dict.get(&Value::str("message")).unwrap_or(Value::None),
            )
        }
        (None, other) => (other, Value::None),
    };
    Ok(Some(MatchArgs {
        offset: match_offset(offset)?,
        message: match_message(message)?,
    }))
}

fn match_offset(value: Value) -> Result<MatchOffset, ScriptError> {
    match value {
        Value::None => Ok(MatchOffset::Here),
        Value::Int(n) => i32::try_from(n)
            .map(MatchOffset::Paragraphs)
            .map_err(|_| ScriptError::contract(format!("offset {} out of range", n))),
        Value::Paragraph(p) => Ok(MatchOffset::Paragraph((*p).clone())),
        other => Err(ScriptError::contract(format!(
            "offset must be None, int or Paragraph, not {}",
            other.type_name()
        ))),
    }
}

fn match_message(value: Value) -> Result<MatchMessage, ScriptError> {
    match value {
        Value::None => Ok(MatchMessage::None),
        Value::Str(s) if s.is_empty() => Ok(MatchMessage::None),
        Value::Str(s) => Ok(MatchMessage::Text(s.to_string())),
        Value::Paragraph(p) => Ok(MatchMessage::Paragraph((*p).clone())),
        other => Err(ScriptError::contract(format!(
            "message must be None, str or Paragraph, not {}",
            other.type_name()
        ))),
    }
}
