//! The allow-listed global namespace and the methods of built-in types.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use super::parser::BinOp;
use super::value::{collect, iterate, ExceptionKind, Iter, MatchData, Module, Value, MAX_ITEMS};
use super::vm::{binary, Context};
use super::{ScriptEffect, ScriptError};
use crate::document::{Direction, ElementKind, Paragraph};
use crate::error::Error;
use crate::model::{AttributeMatch, Role};

macro_rules! builtins {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Callable built-in functions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(crate) enum Builtin {
            $($variant),*
        }

        impl Builtin {
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),*
                }
            }
        }
    };
}

builtins! {
    Len => "len", Str => "str", Int => "int", Float => "float", Bool => "bool",
    Abs => "abs", Min => "min", Max => "max", Round => "round", Sum => "sum",
    Range => "range", List => "list", Tuple => "tuple", Dict => "dict",
    Sorted => "sorted", Reversed => "reversed", Enumerate => "enumerate", Zip => "zip",
    Any => "any", All => "all", Isinstance => "isinstance", Print => "print",
    Repr => "repr", Paragraph => "Paragraph", NotFoundError => "NotFoundError",
    ScriptError => "ScriptError", Speak => "speak", Click => "click", Beep => "beep",
    BlockKeys => "blockKeys", UnblockKeys => "unblockKeys", Match => "match",
    ReSearch => "search", ReMatch => "match", ReFullmatch => "fullmatch",
    ReFindall => "findall", ReSub => "sub", ReSplit => "split", ReCompile => "compile",
    ReEscape => "escape",
    Floor => "floor", Ceil => "ceil", Sqrt => "sqrt", Log => "log", Log2 => "log2",
    Log10 => "log10", Exp => "exp", Pow => "pow", Fabs => "fabs",
    Chain => "chain", Islice => "islice", Product => "product", Repeat => "repeat",
}

const GLOBAL_FUNCTIONS: &[Builtin] = &[
    Builtin::Len,
    Builtin::Str,
    Builtin::Int,
    Builtin::Float,
    Builtin::Bool,
    Builtin::Abs,
    Builtin::Min,
    Builtin::Max,
    Builtin::Round,
    Builtin::Sum,
    Builtin::Range,
    Builtin::List,
    Builtin::Tuple,
    Builtin::Dict,
    Builtin::Sorted,
    Builtin::Reversed,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Any,
    Builtin::All,
    Builtin::Isinstance,
    Builtin::Print,
    Builtin::Repr,
    Builtin::Paragraph,
    Builtin::NotFoundError,
    Builtin::ScriptError,
    Builtin::Speak,
    Builtin::Click,
    Builtin::Beep,
    Builtin::BlockKeys,
    Builtin::UnblockKeys,
];

const RE_FUNCTIONS: &[Builtin] = &[
    Builtin::ReSearch,
    Builtin::ReMatch,
    Builtin::ReFullmatch,
    Builtin::ReFindall,
    Builtin::ReSub,
    Builtin::ReSplit,
    Builtin::ReCompile,
    Builtin::ReEscape,
];

const MATH_FUNCTIONS: &[Builtin] = &[
    Builtin::Floor,
    Builtin::Ceil,
    Builtin::Sqrt,
    Builtin::Log,
    Builtin::Log2,
    Builtin::Log10,
    Builtin::Exp,
    Builtin::Pow,
    Builtin::Fabs,
];

const ITERTOOLS_FUNCTIONS: &[Builtin] = &[
    Builtin::Chain,
    Builtin::Islice,
    Builtin::Product,
    Builtin::Repeat,
];

const RE_IGNORECASE: i64 = 2;
const RE_MULTILINE: i64 = 8;
const RE_DOTALL: i64 = 16;

const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "startswith", "endswith", "find", "rfind",
    "index", "replace", "split", "splitlines", "join", "count", "isdigit", "isspace",
    "isalpha", "isalnum", "isupper", "islower", "title", "capitalize", "format",
];
const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "reverse", "sort", "copy",
];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "pop", "update"];
const MATCH_METHODS: &[&str] = &["group", "groups", "start", "end", "span"];
const REGEX_METHODS: &[&str] = &["search", "match", "fullmatch", "findall", "sub", "split"];
const PARAGRAPH_METHODS: &[&str] = &["move", "find", "findRegexp", "hasRole", "hasAttribute"];

/// A name resolvable in the global namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Global {
    Function(Builtin),
    Module(Module),
}

impl Global {
    pub fn value(self) -> Value {
        match self {
            Global::Function(b) => Value::Builtin(b),
            Global::Module(m) => Value::Module(m),
        }
    }
}

pub(crate) fn lookup_global(name: &str) -> Option<Global> {
    match name {
        "re" => Some(Global::Module(Module::Re)),
        "math" => Some(Global::Module(Module::Math)),
        "itertools" => Some(Global::Module(Module::Itertools)),
        _ => GLOBAL_FUNCTIONS
            .iter()
            .find(|b| b.name() == name)
            .map(|b| Global::Function(*b)),
    }
}

/// Positional and keyword arguments of one call.
pub(crate) struct Args {
    func: String,
    positional: Vec<Option<Value>>,
    keywords: Vec<(Arc<str>, Value)>,
}

impl Args {
    pub fn new(func: &str, positional: Vec<Value>, keywords: Vec<(Arc<str>, Value)>) -> Self {
        Self {
            func: func.to_string(),
            positional: positional.into_iter().map(Some).collect(),
            keywords,
        }
    }

    /// Parameter `index`, passed positionally or as `keyword`.
    fn take(&mut self, index: usize, keyword: &str) -> Option<Value> {
        if let Some(v) = self.positional.get_mut(index).and_then(Option::take) {
            return Some(v);
        }
        let pos = self.keywords.iter().position(|(k, _)| &**k == keyword)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Like `take`, treating an explicit `None` as absent.
    fn opt(&mut self, index: usize, keyword: &str) -> Option<Value> {
        self.take(index, keyword).filter(|v| !matches!(v, Value::None))
    }

    fn required(&mut self, index: usize, keyword: &str) -> Result<Value, ScriptError> {
        self.take(index, keyword).ok_or_else(|| {
            ScriptError::runtime(format!(
                "{}() missing required argument '{}'",
                self.func, keyword
            ))
        })
    }

    /// Remaining positional arguments from `index` on.
    fn rest(&mut self, index: usize) -> Vec<Value> {
        if index >= self.positional.len() {
            return Vec::new();
        }
        self.positional.drain(index..).flatten().collect()
    }

    fn positional_len(&self) -> usize {
        self.positional.len()
    }

    fn finish(self) -> Result<(), ScriptError> {
        if let Some((k, _)) = self.keywords.first() {
            return Err(ScriptError::runtime(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.func, k
            )));
        }
        if self.positional.iter().any(Option::is_some) {
            return Err(ScriptError::runtime(format!(
                "{}() takes fewer positional arguments than given",
                self.func
            )));
        }
        Ok(())
    }
}

/// Map navigation failures into script errors.
pub(crate) fn nav<T>(result: crate::Result<T>) -> Result<T, ScriptError> {
    result.map_err(|e| match e {
        Error::NotFound => ScriptError::not_found("no such paragraph"),
        other => ScriptError::runtime(other.to_string()),
    })
}

fn int_of(value: &Value) -> Result<i64, ScriptError> {
    value.as_int().ok_or_else(|| {
        ScriptError::runtime(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn float_of(value: &Value) -> Result<f64, ScriptError> {
    value.as_float().ok_or_else(|| {
        ScriptError::runtime(format!("must be real number, not {}", value.type_name()))
    })
}

fn str_of(value: &Value) -> Result<Rc<str>, ScriptError> {
    match value {
        Value::Str(s) => Ok(Rc::clone(s)),
        other => Err(ScriptError::runtime(format!(
            "expected str, got {}",
            other.type_name()
        ))),
    }
}

fn paragraph_of(value: &Value) -> Result<Rc<Paragraph>, ScriptError> {
    match value {
        Value::Paragraph(p) => Ok(Rc::clone(p)),
        other => Err(ScriptError::runtime(format!(
            "expected Paragraph, got {}",
            other.type_name()
        ))),
    }
}

fn direction(reverse: bool) -> Direction {
    if reverse {
        Direction::Backward
    } else {
        Direction::Forward
    }
}

fn flag(args: &mut Args, index: usize, keyword: &str) -> bool {
    args.take(index, keyword).map_or(false, |v| v.truthy())
}

fn strings(items: Vec<String>) -> Value {
    Value::list(items.iter().map(|s| Value::str(s)).collect())
}

/// Call any callable value.
pub(crate) fn call(
    func: &Value,
    positional: Vec<Value>,
    keywords: Vec<(Arc<str>, Value)>,
    ctx: &mut Context,
) -> Result<Value, ScriptError> {
    match func {
        Value::Builtin(b) => call_builtin(*b, Args::new(b.name(), positional, keywords), ctx),
        Value::Method(receiver, name) => {
            call_method(receiver, name, Args::new(name, positional, keywords))
        }
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

/// `value.name`
pub(crate) fn get_attr(value: &Value, name: &str) -> Result<Value, ScriptError> {
    let method = |names: &[&str]| {
        names
            .contains(&name)
            .then(|| Value::Method(Rc::new(value.clone()), Rc::from(name)))
    };
    let found = match value {
        Value::Paragraph(p) => match paragraph_property(p, name)? {
            Some(v) => Some(v),
            None => method(PARAGRAPH_METHODS),
        },
        Value::Str(_) => method(STR_METHODS),
        Value::List(_) => method(LIST_METHODS),
        Value::Dict(_) => method(DICT_METHODS),
        Value::Match(_) => method(MATCH_METHODS),
        Value::Regex(r) if name == "pattern" => Some(Value::str(r.as_str())),
        Value::Regex(_) => method(REGEX_METHODS),
        Value::Module(m) => module_attr(*m, name),
        _ => None,
    };
    found.ok_or_else(|| {
        ScriptError::runtime(format!(
            "'{}' object has no attribute '{}'",
            value.type_name(),
            name
        ))
    })
}

fn module_attr(module: Module, name: &str) -> Option<Value> {
    let functions = match module {
        Module::Re => RE_FUNCTIONS,
        Module::Math => MATH_FUNCTIONS,
        Module::Itertools => ITERTOOLS_FUNCTIONS,
    };
    if let Some(b) = functions.iter().find(|b| b.name() == name) {
        return Some(Value::Builtin(*b));
    }
    match (module, name) {
        (Module::Re, "I" | "IGNORECASE") => Some(Value::Int(RE_IGNORECASE)),
        (Module::Re, "M" | "MULTILINE") => Some(Value::Int(RE_MULTILINE)),
        (Module::Re, "S" | "DOTALL") => Some(Value::Int(RE_DOTALL)),
        (Module::Math, "pi") => Some(Value::Float(std::f64::consts::PI)),
        (Module::Math, "e") => Some(Value::Float(std::f64::consts::E)),
        (Module::Math, "inf") => Some(Value::Float(f64::INFINITY)),
        _ => None,
    }
}

fn paragraph_property(p: &Paragraph, name: &str) -> Result<Option<Value>, ScriptError> {
    let value = match name {
        "text" => Value::str(&p.text()),
        "next" => Value::paragraph(nav(p.next())?),
        "previous" => Value::paragraph(nav(p.previous())?),
        "home" => Value::paragraph(p.home()),
        "end" => Value::paragraph(p.end()),
        "attributes" => strings(p.attributes().iter().map(|a| a.to_string()).collect()),
        "roles" => strings(p.roles().iter().map(|r| r.name().to_string()).collect()),
        "headingLevel" => p.heading_level().map_or(Value::None, |l| Value::Int(l as i64)),
        "offset" => p
            .horizontal_offset()
            .map_or(Value::None, |x| Value::Int(x as i64)),
        _ => {
            let element = |prefix: &str| name.strip_prefix(prefix).and_then(ElementKind::from_name);
            if let Some(kind) = element("next") {
                Value::paragraph(nav(p.find_element(kind, Direction::Forward))?)
            } else if let Some(kind) = element("previous") {
                Value::paragraph(nav(p.find_element(kind, Direction::Backward))?)
            } else {
                return Ok(None);
            }
        }
    };
    Ok(Some(value))
}

fn call_builtin(builtin: Builtin, mut args: Args, ctx: &mut Context) -> Result<Value, ScriptError> {
    let result = match builtin {
        Builtin::Len => Value::Int(args.required(0, "obj")?.len()? as i64),
        Builtin::Str => args.take(0, "object").map_or(Value::str(""), |v| Value::str(&v.to_str())),
        Builtin::Repr => Value::str(&args.required(0, "obj")?.repr()),
        Builtin::Bool => Value::Bool(args.take(0, "x").map_or(false, |v| v.truthy())),
        Builtin::Int => {
            let base = args.take(1, "base");
            match args.take(0, "x") {
                None => Value::Int(0),
                Some(v) => Value::Int(to_int(&v, base)?),
            }
        }
        Builtin::Float => match args.take(0, "x") {
            None => Value::Float(0.0),
            Some(Value::Str(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ScriptError::runtime(format!("could not convert string to float: '{}'", s)))?,
            Some(v) => Value::Float(float_of(&v)?),
        },
        Builtin::Abs => match args.required(0, "x")? {
            Value::Float(f) => Value::Float(f.abs()),
            v => Value::Int(
                int_of(&v)?
                    .checked_abs()
                    .ok_or_else(|| ScriptError::runtime("integer overflow"))?,
            ),
        },
        Builtin::Min | Builtin::Max => {
            let items = if args.positional_len() == 1 {
                collect(&args.required(0, "iterable")?)?
            } else {
                args.rest(0)
            };
            extreme(items, builtin == Builtin::Max)?
        }
        Builtin::Round => {
            let x = args.required(0, "number")?;
            match args.opt(1, "ndigits") {
                None => match x {
                    Value::Float(f) if f.is_finite() => Value::Int(round_half_even(f) as i64),
                    Value::Float(_) => return Err(ScriptError::runtime("cannot round a non-finite float")),
                    v => Value::Int(int_of(&v)?),
                },
                Some(n) => {
                    let scale = 10f64.powi(int_of(&n)? as i32);
                    match x {
                        Value::Float(f) => Value::Float(round_half_even(f * scale) / scale),
                        v => Value::Int(int_of(&v)?),
                    }
                }
            }
        }
        Builtin::Sum => {
            let items = collect(&args.required(0, "iterable")?)?;
            let mut total = args.take(1, "start").unwrap_or(Value::Int(0));
            for item in items {
                total = binary(BinOp::Add, &total, &item)?;
            }
            total
        }
        Builtin::Range => {
            let bounds: Vec<i64> = args.rest(0).iter().map(int_of).collect::<Result<_, _>>()?;
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(ScriptError::runtime("range expected 1 to 3 arguments")),
            };
            if step == 0 {
                return Err(ScriptError::runtime("range() arg 3 must not be zero"));
            }
            Value::Range(start, stop, step)
        }
        Builtin::List => Value::list(match args.take(0, "iterable") {
            Some(v) => collect(&v)?,
            None => Vec::new(),
        }),
        Builtin::Tuple => Value::tuple(match args.take(0, "iterable") {
            Some(v) => collect(&v)?,
            None => Vec::new(),
        }),
        Builtin::Dict => {
            let mut dict = super::value::Dict::default();
            if let Some(source) = args.take(0, "iterable") {
                let pairs = match &source {
                    Value::Dict(d) => d.borrow().items(),
                    other => collect(other)?,
                };
                for pair in pairs {
                    match collect(&pair)?.as_slice() {
                        [k, v] => dict.insert(k.clone(), v.clone())?,
                        _ => return Err(ScriptError::runtime("dictionary update sequence element has wrong length")),
                    }
                }
            }
            for (k, v) in std::mem::take(&mut args.keywords) {
                dict.insert(Value::str(&k), v)?;
            }
            Value::Dict(Rc::new(RefCell::new(dict)))
        }
        Builtin::Sorted => {
            let mut items = collect(&args.required(0, "iterable")?)?;
            let reverse = flag(&mut args, 1, "reverse");
            sort_values(&mut items, reverse)?;
            Value::list(items)
        }
        Builtin::Reversed => {
            let mut items = collect(&args.required(0, "sequence")?)?;
            items.reverse();
            Value::iter(Iter::Items(items.into_iter()))
        }
        Builtin::Enumerate => {
            let items = collect(&args.required(0, "iterable")?)?;
            let start = args.take(1, "start").map_or(Ok(0), |v| int_of(&v))?;
            let pairs: Vec<Value> = items
                .into_iter()
                .enumerate()
                .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                .collect();
            Value::iter(Iter::Items(pairs.into_iter()))
        }
        Builtin::Zip => {
            let iters = args.rest(0).iter().map(iterate).collect::<Result<Vec<_>, _>>()?;
            let mut rows = Vec::new();
            'rows: while !iters.is_empty() && rows.len() < MAX_ITEMS {
                let mut row = Vec::with_capacity(iters.len());
                for iter in &iters {
                    match iter.borrow_mut().next()? {
                        Some(v) => row.push(v),
                        None => break 'rows,
                    }
                }
                rows.push(Value::tuple(row));
            }
            Value::iter(Iter::Items(rows.into_iter()))
        }
        Builtin::Any | Builtin::All => {
            let iter = iterate(&args.required(0, "iterable")?)?;
            let want = builtin == Builtin::Any;
            let mut result = !want;
            while let Some(v) = iter.borrow_mut().next()? {
                if v.truthy() == want {
                    result = want;
                    break;
                }
            }
            Value::Bool(result)
        }
        Builtin::Isinstance => {
            let value = args.required(0, "obj")?;
            let classes = match args.required(1, "class_or_tuple")? {
                Value::Tuple(items) => items.to_vec(),
                single => vec![single],
            };
            let mut result = false;
            for class in &classes {
                result |= is_instance(&value, class)?;
            }
            Value::Bool(result)
        }
        Builtin::Print => {
            let sep = args.take(usize::MAX, "sep").map(|v| v.to_str()).unwrap_or_else(|| " ".into());
            let line: Vec<String> = args.rest(0).iter().map(Value::to_str).collect();
            log::info!(target: "quickjump::script", "{}", line.join(&sep));
            Value::None
        }
        Builtin::Paragraph => Value::Paragraph(paragraph_of(&args.required(0, "paragraph")?)?),
        Builtin::NotFoundError | Builtin::ScriptError => {
            let message = args.take(0, "message").map(|v| v.to_str()).unwrap_or_default();
            let kind = if builtin == Builtin::NotFoundError {
                ExceptionKind::NotFound
            } else {
                ExceptionKind::Script
            };
            Value::Exception(kind, Rc::from(message.as_str()))
        }
        Builtin::Speak => {
            let text = args.required(0, "text")?.to_str();
            ctx.effects.push(ScriptEffect::Speak(text));
            Value::None
        }
        Builtin::Click => {
            let target = match args.opt(0, "paragraph") {
                Some(v) => paragraph_of(&v)?,
                None => paragraph_of(&ctx.candidate)?,
            };
            ctx.effects.push(ScriptEffect::Click((*target).clone()));
            Value::None
        }
        Builtin::Beep => {
            let frequency = float_of(&args.required(0, "frequency")?)?;
            let duration = args.take(1, "duration").map_or(Ok(50), |v| int_of(&v))?;
            let left = args.take(2, "left").map_or(Ok(50), |v| int_of(&v))?;
            let right = args.take(3, "right").map_or(Ok(50), |v| int_of(&v))?;
            ctx.effects.push(ScriptEffect::Beep {
                frequency,
                duration_ms: duration.max(0) as u64,
                left: left.clamp(0, 100) as u8,
                right: right.clamp(0, 100) as u8,
            });
            Value::None
        }
        Builtin::BlockKeys => {
            let ms = args.take(0, "timeout").map_or(Ok(10_000), |v| int_of(&v))?;
            ctx.effects
                .push(ScriptEffect::BlockKeys(Duration::from_millis(ms.max(0) as u64)));
            Value::None
        }
        Builtin::UnblockKeys => {
            ctx.effects.push(ScriptEffect::UnblockKeys);
            Value::None
        }
        Builtin::Match => {
            if ctx.match_args.is_some() {
                return Err(ScriptError::contract("match() called more than once"));
            }
            let offset = args.take(0, "offset").unwrap_or(Value::None);
            let message = args.take(1, "message").unwrap_or(Value::None);
            args.finish()?;
            ctx.match_args = Some((offset, message));
            return Ok(Value::None);
        }
        Builtin::ReCompile => {
            let flags = args.take(1, "flags").map_or(Ok(0), |v| int_of(&v))?;
            Value::Regex(compile_regex(&args.required(0, "pattern")?, flags)?)
        }
        Builtin::ReEscape => Value::str(&regex::escape(&str_of(&args.required(0, "pattern")?)?)),
        Builtin::ReSearch
        | Builtin::ReMatch
        | Builtin::ReFullmatch
        | Builtin::ReFindall
        | Builtin::ReSub
        | Builtin::ReSplit => {
            let op = match builtin {
                Builtin::ReSearch => "search",
                Builtin::ReMatch => "match",
                Builtin::ReFullmatch => "fullmatch",
                Builtin::ReFindall => "findall",
                Builtin::ReSub => "sub",
                _ => "split",
            };
            let flags_index = match op {
                "sub" => 4,
                "split" => 3,
                _ => 2,
            };
            let flags = args.take(flags_index, "flags").map_or(Ok(0), |v| int_of(&v))?;
            let regex = compile_regex(&args.required(0, "pattern")?, flags)?;
            let result = regex_op(op, &regex, &mut args, 1)?;
            args.finish()?;
            return Ok(result);
        }
        Builtin::Floor | Builtin::Ceil => match args.required(0, "x")? {
            Value::Float(f) if f.is_finite() => {
                let rounded = if builtin == Builtin::Floor { f.floor() } else { f.ceil() };
                Value::Int(rounded as i64)
            }
            Value::Float(_) => return Err(ScriptError::runtime("cannot convert float infinity or NaN to integer")),
            v => Value::Int(int_of(&v)?),
        },
        Builtin::Sqrt => {
            let x = float_of(&args.required(0, "x")?)?;
            if x < 0.0 {
                return Err(ScriptError::runtime("math domain error"));
            }
            Value::Float(x.sqrt())
        }
        Builtin::Log | Builtin::Log2 | Builtin::Log10 => {
            let x = float_of(&args.required(0, "x")?)?;
            if x <= 0.0 {
                return Err(ScriptError::runtime("math domain error"));
            }
            Value::Float(match builtin {
                Builtin::Log2 => x.log2(),
                Builtin::Log10 => x.log10(),
                _ => match args.opt(1, "base") {
                    Some(base) => x.ln() / float_of(&base)?.ln(),
                    None => x.ln(),
                },
            })
        }
        Builtin::Exp => Value::Float(float_of(&args.required(0, "x")?)?.exp()),
        Builtin::Fabs => Value::Float(float_of(&args.required(0, "x")?)?.abs()),
        Builtin::Pow => {
            let x = float_of(&args.required(0, "x")?)?;
            let y = float_of(&args.required(1, "y")?)?;
            Value::Float(x.powf(y))
        }
        Builtin::Chain => Value::iter(Iter::Chain {
            current: None,
            rest: args.rest(0).into(),
        }),
        Builtin::Islice => {
            let iter = iterate(&args.required(0, "iterable")?)?;
            let (start, stop) = match (args.take(1, "start"), args.take(2, "stop")) {
                (stop, None) => (Value::Int(0), stop.unwrap_or(Value::None)),
                (start, Some(stop)) => (start.unwrap_or(Value::Int(0)), stop),
            };
            let start = int_of(&start)?.max(0) as usize;
            for _ in 0..start {
                if iter.borrow_mut().next()?.is_none() {
                    break;
                }
            }
            let remaining = match stop {
                Value::None => usize::MAX,
                v => (int_of(&v)?.max(0) as usize).saturating_sub(start),
            };
            Value::iter(Iter::Take { inner: iter, remaining })
        }
        Builtin::Product => {
            let repeat = args.take(usize::MAX, "repeat").map_or(Ok(1), |v| int_of(&v))?;
            let pools = args.rest(0).iter().map(collect).collect::<Result<Vec<_>, _>>()?;
            let pools: Vec<&Vec<Value>> = (0..repeat.max(0)).flat_map(|_| pools.iter()).collect();
            let mut rows: Vec<Vec<Value>> = vec![Vec::new()];
            for pool in pools {
                let mut next = Vec::new();
                for row in &rows {
                    for item in pool {
                        if next.len() >= MAX_ITEMS {
                            return Err(ScriptError::runtime("product too large"));
                        }
                        let mut row = row.clone();
                        row.push(item.clone());
                        next.push(row);
                    }
                }
                rows = next;
            }
            let rows: Vec<Value> = rows.into_iter().map(Value::tuple).collect();
            Value::iter(Iter::Items(rows.into_iter()))
        }
        Builtin::Repeat => {
            let value = args.required(0, "object")?;
            let remaining = match args.opt(1, "times") {
                Some(n) => Some(int_of(&n)?.max(0) as u64),
                None => None,
            };
            Value::iter(Iter::Repeat { value, remaining })
        }
    };
    args.finish()?;
    Ok(result)
}

fn to_int(value: &Value, base: Option<Value>) -> Result<i64, ScriptError> {
    match value {
        Value::Str(s) => {
            let base = base.map_or(Ok(10), |b| int_of(&b))?;
            if !(2..=36).contains(&base) {
                return Err(ScriptError::runtime("int() base must be >= 2 and <= 36"));
            }
            let digits: String = s.trim().chars().filter(|c| *c != '_').collect();
            i64::from_str_radix(&digits, base as u32).map_err(|_| {
                ScriptError::runtime(format!(
                    "invalid literal for int() with base {}: '{}'",
                    base, s
                ))
            })
        }
        Value::Float(f) if f.is_finite() => Ok(f.trunc() as i64),
        Value::Float(_) => Err(ScriptError::runtime("cannot convert float infinity or NaN to integer")),
        other => int_of(other),
    }
}

fn round_half_even(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

fn extreme(items: Vec<Value>, max: bool) -> Result<Value, ScriptError> {
    let mut items = items.into_iter();
    let mut best = items
        .next()
        .ok_or_else(|| ScriptError::runtime("arg is an empty sequence"))?;
    for item in items {
        let wanted = if max { Ordering::Greater } else { Ordering::Less };
        if item.compare(&best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

pub(crate) fn sort_values(items: &mut [Value], reverse: bool) -> Result<(), ScriptError> {
    let mut error = None;
    items.sort_by(|a, b| {
        let (a, b) = if reverse { (b, a) } else { (a, b) };
        a.compare(b).unwrap_or_else(|e| {
            error.get_or_insert(e);
            Ordering::Equal
        })
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn is_instance(value: &Value, class: &Value) -> Result<bool, ScriptError> {
    let Value::Builtin(class) = class else {
        return Err(ScriptError::runtime("isinstance() arg 2 must be a type or tuple of types"));
    };
    Ok(match class {
        Builtin::Str => matches!(value, Value::Str(_)),
        Builtin::Int => matches!(value, Value::Int(_) | Value::Bool(_)),
        Builtin::Float => matches!(value, Value::Float(_)),
        Builtin::Bool => matches!(value, Value::Bool(_)),
        Builtin::List => matches!(value, Value::List(_)),
        Builtin::Tuple => matches!(value, Value::Tuple(_)),
        Builtin::Dict => matches!(value, Value::Dict(_)),
        Builtin::Range => matches!(value, Value::Range(..)),
        Builtin::Paragraph => matches!(value, Value::Paragraph(_)),
        Builtin::NotFoundError => matches!(value, Value::Exception(ExceptionKind::NotFound, _)),
        Builtin::ScriptError => matches!(value, Value::Exception(ExceptionKind::Script, _)),
        _ => return Err(ScriptError::runtime("isinstance() arg 2 must be a type or tuple of types")),
    })
}

fn compile_regex(pattern: &Value, flags: i64) -> Result<Rc<Regex>, ScriptError> {
    if let Value::Regex(r) = pattern {
        return Ok(Rc::clone(r));
    }
    let source = str_of(pattern)?;
    let mut inline = String::new();
    for (bit, letter) in [(RE_IGNORECASE, 'i'), (RE_MULTILINE, 'm'), (RE_DOTALL, 's')] {
        if flags & bit != 0 {
            inline.push(letter);
        }
    }
    let source = if inline.is_empty() {
        source.to_string()
    } else {
        format!("(?{}){}", inline, source)
    };
    Regex::new(&source)
        .map(Rc::new)
        .map_err(|e| ScriptError::runtime(format!("invalid regular expression: {}", e)))
}

fn anchored(regex: &Regex, full: bool) -> Result<Regex, ScriptError> {
    let tail = if full { r"\z" } else { "" };
    Regex::new(&format!(r"\A(?:{}){}", regex.as_str(), tail))
        .map_err(|e| ScriptError::runtime(format!("invalid regular expression: {}", e)))
}

/// Rewrite `\1` and `\g<name>` group references into `regex` syntax.
fn replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{}}}", group));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                        out.push_str(&format!("${{{}}}", name));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

/// Shared body of `re.<op>(pattern, ...)` and `pattern.<op>(...)`; the
/// operation's own arguments start at `base`.
fn regex_op(op: &str, regex: &Regex, args: &mut Args, base: usize) -> Result<Value, ScriptError> {
    match op {
        "search" | "match" | "fullmatch" => {
            let text = str_of(&args.required(base, "string")?)?;
            let local;
            let regex = match op {
                "search" => regex,
                _ => {
                    local = anchored(regex, op == "fullmatch")?;
                    &local
                }
            };
            Ok(match regex.captures(&text) {
                Some(caps) => Value::Match(Rc::new(MatchData::from_captures(&text, regex, &caps))),
                None => Value::None,
            })
        }
        "findall" => {
            let text = str_of(&args.required(base, "string")?)?;
            let groups = regex.captures_len();
            let found = regex
                .captures_iter(&text)
                .map(|caps| {
                    let group = |i: usize| Value::str(caps.get(i).map_or("", |m| m.as_str()));
                    match groups {
                        1 => group(0),
                        2 => group(1),
                        n => Value::tuple((1..n).map(group).collect()),
                    }
                })
                .collect();
            Ok(Value::list(found))
        }
        "sub" => {
            let repl = str_of(&args.required(base, "repl")?)?;
            let text = str_of(&args.required(base + 1, "string")?)?;
            let count = args.take(base + 2, "count").map_or(Ok(0), |v| int_of(&v))?;
            let replaced = regex.replacen(&text, count.max(0) as usize, replacement(&repl).as_str());
            Ok(Value::str(&replaced))
        }
        _ => {
            let text = str_of(&args.required(base, "string")?)?;
            let maxsplit = args.take(base + 1, "maxsplit").map_or(Ok(0), |v| int_of(&v))?;
            let parts: Vec<String> = if maxsplit > 0 {
                regex.splitn(&text, maxsplit as usize + 1).map(str::to_string).collect()
            } else {
                regex.split(&text).map(str::to_string).collect()
            };
            Ok(strings(parts))
        }
    }
}

fn call_method(receiver: &Value, name: &str, mut args: Args) -> Result<Value, ScriptError> {
    let result = match receiver {
        Value::Str(s) => str_method(s, name, &mut args)?,
        Value::List(items) => list_method(items, name, &mut args)?,
        Value::Dict(dict) => dict_method(dict, name, &mut args)?,
        Value::Match(m) => {
            let group_arg = |args: &mut Args| -> Result<usize, ScriptError> {
                args.take(0, "group").map_or(Ok(0), |g| m.group_index(&g))
            };
            match name {
                "group" => {
                    let wanted = args.rest(0);
                    match wanted.as_slice() {
                        [] => m.group(0),
                        [one] => m.group(m.group_index(one)?),
                        many => Value::tuple(
                            many.iter()
                                .map(|g| m.group_index(g).map(|i| m.group(i)))
                                .collect::<Result<_, _>>()?,
                        ),
                    }
                }
                "groups" => Value::tuple((1..m.spans.len()).map(|i| m.group(i)).collect()),
                "start" => Value::Int(m.char_span(group_arg(&mut args)?).0),
                "end" => Value::Int(m.char_span(group_arg(&mut args)?).1),
                _ => {
                    let (s, e) = m.char_span(group_arg(&mut args)?);
                    Value::tuple(vec![Value::Int(s), Value::Int(e)])
                }
            }
        }
        Value::Regex(regex) => regex_op(name, regex, &mut args, 0)?,
        Value::Paragraph(p) => paragraph_method(p, name, &mut args)?,
        other => {
            return Err(ScriptError::runtime(format!(
                "'{}' object has no method '{}'",
                other.type_name(),
                name
            )))
        }
    };
    args.finish()?;
    Ok(result)
}

fn dict_method(dict: &Rc<RefCell<super::value::Dict>>, name: &str, args: &mut Args) -> Result<Value, ScriptError> {
    Ok(match name {
        "get" => {
            let key = args.required(0, "key")?;
            let default = args.take(1, "default").unwrap_or(Value::None);
            dict.borrow().get(&key).unwrap_or(default)
        }
        "keys" => Value::list(dict.borrow().keys()),
        "values" => Value::list(dict.borrow().values()),
        "items" => Value::list(dict.borrow().items()),
        "pop" => {
            let key = args.required(0, "key")?;
            let removed = dict.borrow_mut().remove(&key);
            match (removed, args.take(1, "default")) {
                (Some(v), _) | (None, Some(v)) => v,
                (None, None) => return Err(ScriptError::runtime(format!("KeyError: {}", key.repr()))),
            }
        }
        _ => {
            let Value::Dict(other) = args.required(0, "other")? else {
                return Err(ScriptError::runtime("update() expects a dict"));
            };
            let items = other.borrow().items();
            let mut dict = dict.borrow_mut();
            for item in items {
                if let Value::Tuple(pair) = item {
                    dict.insert(pair[0].clone(), pair[1].clone())?;
                }
            }
            Value::None
        }
    })
}

fn paragraph_method(p: &Paragraph, name: &str, args: &mut Args) -> Result<Value, ScriptError> {
    Ok(match name {
        "move" => {
            let count = int_of(&args.required(0, "count")?)?;
            let count = i32::try_from(count).map_err(|_| ScriptError::runtime("move count out of range"))?;
            Value::paragraph(nav(p.move_by(count))?)
        }
        "find" => {
            let needle = str_of(&args.required(0, "text")?)?;
            let case_sensitive = flag(args, 1, "caseSensitive");
            let reverse = flag(args, 2, "reverse");
            Value::paragraph(nav(p.find_text(&needle, case_sensitive, direction(reverse)))?)
        }
        "findRegexp" => {
            let regex = compile_regex(&args.required(0, "pattern")?, 0)?;
            let reverse = flag(args, 1, "reverse");
            Value::paragraph(nav(p.find_regex(&regex, direction(reverse)))?)
        }
        "hasRole" => {
            let role: Role = str_of(&args.required(0, "role")?)?
                .parse()
                .map_err(|e: Error| ScriptError::runtime(e.to_string()))?;
            Value::Bool(p.roles().contains(&role))
        }
        _ => {
            let filter: AttributeMatch = str_of(&args.required(0, "attribute")?)?
                .parse()
                .map_err(|e: Error| ScriptError::runtime(e.to_string()))?;
            Value::Bool(filter.matches(&p.attributes()))
        }
    })
}

fn list_method(items: &Rc<RefCell<Vec<Value>>>, name: &str, args: &mut Args) -> Result<Value, ScriptError> {
    let position = |items: &[Value], x: &Value| items.iter().position(|v| v.py_eq(x));
    Ok(match name {
        "append" => {
            let item = args.required(0, "object")?;
            items.borrow_mut().push(item);
            Value::None
        }
        "extend" => {
            let more = collect(&args.required(0, "iterable")?)?;
            items.borrow_mut().extend(more);
            Value::None
        }
        "pop" => {
            let mut items = items.borrow_mut();
            let index = args.take(0, "index").map_or(Ok(-1), |v| int_of(&v))?;
            let i = normalize_index(index, items.len())
                .ok_or_else(|| ScriptError::runtime("pop index out of range"))?;
            items.remove(i)
        }
        "insert" => {
            let mut items = items.borrow_mut();
            let index = int_of(&args.required(0, "index")?)?;
            let item = args.required(1, "object")?;
            let len = items.len() as i64;
            let i = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(i as usize, item);
            Value::None
        }
        "remove" => {
            let x = args.required(0, "value")?;
            let mut items = items.borrow_mut();
            let i = position(&items[..], &x).ok_or_else(|| ScriptError::runtime("list.remove(x): x not in list"))?;
            items.remove(i);
            Value::None
        }
        "index" => {
            let x = args.required(0, "value")?;
            let i = position(&items.borrow()[..], &x)
                .ok_or_else(|| ScriptError::runtime(format!("{} is not in list", x.repr())))?;
            Value::Int(i as i64)
        }
        "count" => {
            let x = args.required(0, "value")?;
            Value::Int(items.borrow().iter().filter(|v| v.py_eq(&x)).count() as i64)
        }
        "reverse" => {
            items.borrow_mut().reverse();
            Value::None
        }
        "sort" => {
            let reverse = flag(args, usize::MAX, "reverse");
            sort_values(&mut items.borrow_mut(), reverse)?;
            Value::None
        }
        _ => Value::list(items.borrow().clone()),
    })
}

pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let i = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&i).then_some(i as usize)
}

fn char_index(s: &str, byte: Option<usize>) -> Value {
    Value::Int(byte.map_or(-1, |b| s[..b].chars().count() as i64))
}

fn str_method(s: &Rc<str>, name: &str, args: &mut Args) -> Result<Value, ScriptError> {
    let strip_chars = |args: &mut Args| -> Result<Option<Vec<char>>, ScriptError> {
        Ok(match args.opt(0, "chars") {
            Some(v) => Some(str_of(&v)?.chars().collect()),
            None => None,
        })
    };
    let affix_test = |args: &mut Args, test: &dyn Fn(&str) -> bool| -> Result<Value, ScriptError> {
        Ok(Value::Bool(match args.required(0, "prefix")? {
            Value::Tuple(options) => {
                let mut any = false;
                for option in options.iter() {
                    any |= test(&str_of(option)?);
                }
                any
            }
            single => test(&str_of(&single)?),
        }))
    };
    Ok(match name {
        "lower" => Value::str(&s.to_lowercase()),
        "upper" => Value::str(&s.to_uppercase()),
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(args)?;
            let is_strippable = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Value::str(match name {
                "strip" => s.trim_matches(is_strippable),
                "lstrip" => s.trim_start_matches(is_strippable),
                _ => s.trim_end_matches(is_strippable),
            })
        }
        "startswith" => affix_test(args, &|p: &str| s.starts_with(p))?,
        "endswith" => affix_test(args, &|p: &str| s.ends_with(p))?,
        "find" => char_index(s, s.find(&*str_of(&args.required(0, "sub")?)?)),
        "rfind" => char_index(s, s.rfind(&*str_of(&args.required(0, "sub")?)?)),
        "index" => {
            let sub = str_of(&args.required(0, "sub")?)?;
            match s.find(&*sub) {
                Some(b) => char_index(s, Some(b)),
                None => return Err(ScriptError::runtime("substring not found")),
            }
        }
        "replace" => {
            let old = str_of(&args.required(0, "old")?)?;
            let new = str_of(&args.required(1, "new")?)?;
            let count = args.take(2, "count").map_or(Ok(-1), |v| int_of(&v))?;
            Value::str(&if count < 0 {
                s.replace(&*old, &new)
            } else {
                s.replacen(&*old, &new, count as usize)
            })
        }
        "split" => {
            let sep = args.opt(0, "sep");
            let maxsplit = args.take(1, "maxsplit").map_or(Ok(-1), |v| int_of(&v))?;
            strings(match sep {
                None => split_whitespace(s, maxsplit),
                Some(sep) => {
                    let sep = str_of(&sep)?;
                    if sep.is_empty() {
                        return Err(ScriptError::runtime("empty separator"));
                    }
                    if maxsplit < 0 {
                        s.split(&*sep).map(str::to_string).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, &*sep).map(str::to_string).collect()
                    }
                }
            })
        }
        "splitlines" => strings(s.lines().map(str::to_string).collect()),
        "join" => {
            let parts = collect(&args.required(0, "iterable")?)?
                .iter()
                .map(|v| str_of(v).map(|p| p.to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            Value::str(&parts.join(&**s))
        }
        "count" => {
            let sub = str_of(&args.required(0, "sub")?)?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&*sub).count()
            };
            Value::Int(n as i64)
        }
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "isspace" => Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace)),
        "isalpha" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)),
        "isalnum" => Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric)),
        "isupper" => Value::Bool(s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)),
        "islower" => Value::Bool(s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase)),
        "title" => Value::str(&title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            let out: String = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            };
            Value::str(&out)
        }
        _ => {
            let positional = args.rest(0);
            let keywords = std::mem::take(&mut args.keywords);
            Value::str(&format_template(s, &positional, &keywords)?)
        }
    })
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                parts.push(rest[..i].to_string());
                rest = rest[i..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// `str.format` with `{}`, `{0}`, `{name}`, `!r` and the `d`, `s`, `.Nf`
/// format specs.
fn format_template(template: &str, positional: &[Value], keywords: &[(Arc<str>, Value)]) -> Result<String, ScriptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let field: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let (field, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
                let (field, conversion) = field.split_once('!').unwrap_or((field, ""));
                let value = if field.is_empty() {
                    auto += 1;
                    positional.get(auto - 1)
                } else if let Ok(i) = field.parse::<usize>() {
                    positional.get(i)
                } else {
                    keywords.iter().find(|(k, _)| &**k == field).map(|(_, v)| v)
                };
                let value = value.ok_or_else(|| {
                    ScriptError::runtime(format!("format field '{}' not supplied", field))
                })?;
                out.push_str(&format_value(value, conversion, spec)?);
            }
            '}' => return Err(ScriptError::runtime("single '}' encountered in format string")),
            c => out.push(c),
        }
    }
    Ok(out)
}

pub(crate) fn format_value(value: &Value, conversion: &str, spec: &str) -> Result<String, ScriptError> {
    if conversion == "r" {
        return Ok(value.repr());
    }
    if let Some(precision) = spec.strip_prefix('.').and_then(|p| p.strip_suffix('f')) {
        let precision: usize = precision
            .parse()
            .map_err(|_| ScriptError::runtime(format!("invalid format spec '{}'", spec)))?;
        return Ok(format!("{:.*}", precision, float_of(value)?));
    }
    match spec {
        "" | "s" => Ok(value.to_str()),
        "d" => Ok(int_of(value)?.to_string()),
        "f" => Ok(format!("{:.6}", float_of(value)?)),
        other => Err(ScriptError::runtime(format!("unsupported format spec '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_names_are_not_globals() {
        for name in ["open", "eval", "exec", "compile", "__import__", "getattr", "globals"] {
            assert!(lookup_global(name).is_none(), "{} leaked", name);
        }
        assert_eq!(lookup_global("len"), Some(Global::Function(Builtin::Len)));
        assert_eq!(lookup_global("re"), Some(Global::Module(Module::Re)));
    }

    #[test]
    fn test_python_replacement_syntax() {
        assert_eq!(replacement(r"\1-\g<name>"), "${1}-${name}");
        assert_eq!(replacement("$5"), "$$5");
    }

    #[test]
    fn test_format_template() {
        let out = format_template(
            "{} of {total} ({0!r}) {{x}} {1:.2f}",
            &[Value::str("a"), Value::Float(0.5)],
            &[(Arc::from("total"), Value::Int(3))],
        )
        .unwrap();
        assert_eq!(out, "a of 3 ('a') {x} 0.50");
    }

    #[test]
    fn test_split_whitespace() {
        assert_eq!(split_whitespace("  a b  c ", -1), vec!["a", "b", "c"]);
        assert_eq!(split_whitespace("a b  c ", 1), vec!["a", "b  c "]);
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_half_even(2.6), 3.0);
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }
}
