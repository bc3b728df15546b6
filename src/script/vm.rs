//! Stack machine executing compiled scripts.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::builtins::{self, format_value, normalize_index};
use super::compiler::{Instr, Program};
use super::parser::{BinOp, CmpOp, Const, UnaryOp};
use super::value::{collect, iterate, range_len, Dict, ExceptionKind, Value, MAX_ITEMS};
use super::{ScriptEffect, ScriptError, ScriptErrorKind};

/// Per-invocation state visible to builtins.
pub(crate) struct Context {
    /// The candidate paragraph `p`
    pub candidate: Value,
    pub effects: Vec<ScriptEffect>,
    pub match_args: Option<(Value, Value)>,
}

impl Context {
    pub fn new(candidate: Value) -> Self {
        Self {
            candidate,
            effects: Vec::new(),
            match_args: None,
        }
    }

    pub fn take_effects(&mut self) -> Vec<ScriptEffect> {
        std::mem::take(&mut self.effects)
    }
}

/// How a run stopped.
#[derive(Debug)]
pub(crate) enum Exit {
    Return(Value),
    Yield(Value),
}

pub(crate) struct Machine {
    program: Arc<Program>,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Option<Value>>,
    step_limit: u64,
    finished: bool,
    context: Context,
}

impl Machine {
    pub fn new(program: Arc<Program>, args: [Value; 5], context: Context, step_limit: u64) -> Self {
        let mut locals: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        locals.resize(program.locals.len(), None);
        Self {
            program,
            ip: 0,
            stack: Vec::new(),
            locals,
            step_limit,
            finished: false,
            context,
        }
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run until the script returns or yields. The step budget applies to
    /// each run separately.
    pub fn run(&mut self) -> Result<Exit, ScriptError> {
        if self.finished {
            return Err(ScriptError::runtime("script already finished"));
        }
        let mut steps = 0u64;
        loop {
            steps += 1;
            if steps > self.step_limit {
                self.finished = true;
                return Err(ScriptError::with_kind(
                    ScriptErrorKind::StepLimit,
                    format!("script exceeded {} steps", self.step_limit),
                ));
            }
            let at = self.ip;
            match self.step() {
                Ok(None) => {}
                Ok(Some(exit)) => {
                    if matches!(exit, Exit::Return(_)) {
                        self.finished = true;
                    }
                    return Ok(exit);
                }
                Err(e) => {
                    self.finished = true;
                    let line = self.program.lines.get(at).copied().unwrap_or(1);
                    return Err(e.at_line(line));
                }
            }
        }
    }

    fn pop(&mut self) -> Result<Value, ScriptError> {
        self.stack
            .pop()
            .ok_or_else(|| ScriptError::runtime("stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, ScriptError> {
        if n > self.stack.len() {
            return Err(ScriptError::runtime("stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn top(&self) -> Result<&Value, ScriptError> {
        self.stack
            .last()
            .ok_or_else(|| ScriptError::runtime("stack underflow"))
    }

    fn step(&mut self) -> Result<Option<Exit>, ScriptError> {
        let Some(&instr) = self.program.code.get(self.ip) else {
            return Err(ScriptError::runtime("instruction pointer out of range"));
        };
        self.ip += 1;
        match instr {
            Instr::Const(i) => {
                let value = match &self.program.consts[i as usize] {
                    Const::None => Value::None,
                    Const::Bool(b) => Value::Bool(*b),
                    Const::Int(i) => Value::Int(*i),
                    Const::Float(f) => Value::Float(*f),
                    Const::Str(s) => Value::str(s),
                };
                self.stack.push(value);
            }
            Instr::LoadLocal(slot) => {
                let value = self.locals[slot as usize].clone().ok_or_else(|| {
                    ScriptError::runtime(format!(
                        "local variable '{}' referenced before assignment",
                        self.program.locals[slot as usize]
                    ))
                })?;
                self.stack.push(value);
            }
            Instr::StoreLocal(slot) => {
                let value = self.pop()?;
                self.locals[slot as usize] = Some(value);
            }
            Instr::LoadGlobal(global) => self.stack.push(global.value()),
            Instr::LoadAttr(i) => {
                let value = self.pop()?;
                let name = Arc::clone(&self.program.attrs[i as usize]);
                self.stack.push(builtins::get_attr(&value, &name)?);
            }
            Instr::LoadIndex => {
                let index = self.pop()?;
                let container = self.pop()?;
                self.stack.push(load_index(&container, &index)?);
            }
            Instr::StoreIndex => {
                let index = self.pop()?;
                let container = self.pop()?;
                let value = self.pop()?;
                store_index(&container, index, value)?;
            }
            Instr::Slice { lower, upper } => {
                let upper = if upper { Some(self.pop()?) } else { None };
                let lower = if lower { Some(self.pop()?) } else { None };
                let value = self.pop()?;
                self.stack.push(slice(&value, lower, upper)?);
            }
            Instr::BuildTuple(n) => {
                let items = self.pop_n(n as usize)?;
                self.stack.push(Value::tuple(items));
            }
            Instr::BuildList(n) => {
                let items = self.pop_n(n as usize)?;
                self.stack.push(Value::list(items));
            }
            Instr::BuildDict(n) => {
                let items = self.pop_n(2 * n as usize)?;
                let mut dict = Dict::default();
                let mut items = items.into_iter();
                while let (Some(k), Some(v)) = (items.next(), items.next()) {
                    dict.insert(k, v)?;
                }
                self.stack.push(Value::Dict(Rc::new(RefCell::new(dict))));
            }
            Instr::ListAppend => {
                let item = self.pop()?;
                match self.pop()? {
                    Value::List(items) => items.borrow_mut().push(item),
                    other => {
                        return Err(ScriptError::runtime(format!(
                            "cannot append to '{}'",
                            other.type_name()
                        )))
                    }
                }
            }
            Instr::Call { argc, kwnames } => {
                let names = match kwnames {
                    Some(i) => self.program.kwnames[i as usize].clone(),
                    None => Vec::new(),
                };
                let kwvalues = self.pop_n(names.len())?;
                let args = self.pop_n(argc as usize)?;
                let func = self.pop()?;
                let keywords = names.into_iter().zip(kwvalues).collect();
                let result = builtins::call(&func, args, keywords, &mut self.context)?;
                self.stack.push(result);
            }
            Instr::Binary(op) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(binary(op, &a, &b)?);
            }
            Instr::Unary(op) => {
                let value = self.pop()?;
                self.stack.push(unary(op, &value)?);
            }
            Instr::Compare(op) => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Bool(compare(op, &a, &b)?));
            }
            Instr::Not => {
                let value = self.pop()?;
                self.stack.push(Value::Bool(!value.truthy()));
            }
            Instr::Jump(target) => self.ip = target as usize,
            Instr::PopJumpIfFalse(target) => {
                if !self.pop()?.truthy() {
                    self.ip = target as usize;
                }
            }
            Instr::JumpIfFalseOrPop(target) => {
                if self.top()?.truthy() {
                    self.pop()?;
                } else {
                    self.ip = target as usize;
                }
            }
            Instr::JumpIfTrueOrPop(target) => {
                if self.top()?.truthy() {
                    self.ip = target as usize;
                } else {
                    self.pop()?;
                }
            }
            Instr::GetIter => {
                let value = self.pop()?;
                self.stack.push(Value::Iter(iterate(&value)?));
            }
            Instr::ForIter(exit) => {
                let Value::Iter(iter) = self.top()? else {
                    return Err(ScriptError::runtime("loop over a non-iterator"));
                };
                let next = iter.borrow_mut().next()?;
                match next {
                    Some(item) => self.stack.push(item),
                    None => {
                        self.pop()?;
                        self.ip = exit as usize;
                    }
                }
            }
            Instr::Pop => {
                self.pop()?;
            }
            Instr::Dup => {
                let value = self.top()?.clone();
                self.stack.push(value);
            }
            Instr::RotTwo => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(ScriptError::runtime("stack underflow"));
                }
                self.stack.swap(len - 1, len - 2);
            }
            Instr::RotThree => {
                let top = self.pop()?;
                let len = self.stack.len();
                if len < 2 {
                    return Err(ScriptError::runtime("stack underflow"));
                }
                self.stack.insert(len - 2, top);
            }
            Instr::Unpack(n) => {
                let value = self.pop()?;
                let items = collect(&value)?;
                if items.len() != n as usize {
                    let problem = if items.len() < n as usize {
                        "not enough"
                    } else {
                        "too many"
                    };
                    return Err(ScriptError::runtime(format!(
                        "{} values to unpack (expected {}, got {})",
                        problem,
                        n,
                        items.len()
                    )));
                }
                self.stack.extend(items.into_iter().rev());
            }
            Instr::Return => {
                let value = self.pop()?;
                return Ok(Some(Exit::Return(value)));
            }
            Instr::Yield => {
                let value = self.pop()?;
                // result of the `yield` expression once resumed
                self.stack.push(Value::None);
                return Ok(Some(Exit::Yield(value)));
            }
            Instr::Raise(with_value) => {
                if !with_value {
                    return Err(ScriptError::runtime("no active exception to re-raise"));
                }
                return Err(raised(self.pop()?));
            }
        }
        Ok(None)
    }
}

fn raised(value: Value) -> ScriptError {
    match value {
        Value::Exception(ExceptionKind::NotFound, message) => ScriptError::not_found(&*message),
        Value::Exception(ExceptionKind::Script, message) => ScriptError::new(&*message),
        Value::Builtin(builtins::Builtin::NotFoundError) => ScriptError::not_found("NotFoundError"),
        Value::Builtin(builtins::Builtin::ScriptError) => ScriptError::new("ScriptError"),
        other => ScriptError::runtime(format!(
            "exceptions must be NotFoundError or ScriptError, not {}",
            other.type_name()
        )),
    }
}

fn overflow() -> ScriptError {
    ScriptError::runtime("integer overflow")
}

fn unsupported(symbol: &str, a: &Value, b: &Value) -> ScriptError {
    ScriptError::runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        a.type_name(),
        b.type_name()
    ))
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, ScriptError> {
    let times = times.max(0) as usize;
    if items.len().saturating_mul(times) > MAX_ITEMS {
        return Err(ScriptError::runtime("sequence too long"));
    }
    Ok((0..times).flat_map(|_| items.iter().cloned()).collect())
}

pub(crate) fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
    };
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => return Ok(Value::str(&format!("{}{}", x, y))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            return Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let chars: Vec<char> = s.chars().collect();
            let out: String = repeat(&chars[..], n.as_int().unwrap_or(0))?.into_iter().collect();
            return Ok(Value::str(&out));
        }
        (BinOp::Mul, Value::List(l), n) | (BinOp::Mul, n, Value::List(l)) if n.as_int().is_some() => {
            return Ok(Value::list(repeat(&l.borrow()[..], n.as_int().unwrap_or(0))?))
        }
        (BinOp::Mul, Value::Tuple(t), n) | (BinOp::Mul, n, Value::Tuple(t)) if n.as_int().is_some() => {
            return Ok(Value::tuple(repeat(&t[..], n.as_int().unwrap_or(0))?))
        }
        (BinOp::Mod, Value::Str(template), args) => {
            return Ok(Value::str(&percent_format(template, args)?))
        }
        _ => {}
    }

    if let (Some(x), Some(y)) = (int_operand(a), int_operand(b)) {
        return int_binary(op, x, y);
    }
    let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
        return Err(unsupported(symbol, a, b));
    };
    let zero = || ScriptError::runtime("float division by zero");
    Ok(Value::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div if y == 0.0 => return Err(zero()),
        BinOp::Div => x / y,
        BinOp::FloorDiv if y == 0.0 => return Err(zero()),
        BinOp::FloorDiv => (x / y).floor(),
        BinOp::Mod if y == 0.0 => return Err(ScriptError::runtime("float modulo")),
        BinOp::Mod => x - y * (x / y).floor(),
        BinOp::Pow => x.powf(y),
    }))
}

fn int_operand(value: &Value) -> Option<i64> {
    match value {
        Value::Int(_) | Value::Bool(_) => value.as_int(),
        _ => None,
    }
}

fn int_binary(op: BinOp, x: i64, y: i64) -> Result<Value, ScriptError> {
    let zero = || ScriptError::runtime("integer division or modulo by zero");
    Ok(Value::Int(match op {
        BinOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        BinOp::Div if y == 0 => return Err(ScriptError::runtime("division by zero")),
        BinOp::Div => return Ok(Value::Float(x as f64 / y as f64)),
        BinOp::FloorDiv if y == 0 => return Err(zero()),
        BinOp::FloorDiv => {
            let q = x.checked_div(y).ok_or_else(overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod if y == 0 => return Err(zero()),
        BinOp::Mod => {
            let r = x.checked_rem(y).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow if y < 0 => return Ok(Value::Float((x as f64).powf(y as f64))),
        BinOp::Pow => {
            let exp = u32::try_from(y).map_err(|_| overflow())?;
            x.checked_pow(exp).ok_or_else(overflow)?
        }
    }))
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, ScriptError> {
    match (op, value) {
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (op, v) => {
            let i = int_operand(v).ok_or_else(|| {
                ScriptError::runtime(format!("bad operand type for unary: '{}'", v.type_name()))
            })?;
            Ok(Value::Int(match op {
                UnaryOp::Neg => i.checked_neg().ok_or_else(overflow)?,
                UnaryOp::Pos => i,
            }))
        }
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ScriptError> {
    use std::cmp::Ordering::*;
    Ok(match op {
        CmpOp::Eq => a.py_eq(b),
        CmpOp::Ne => !a.py_eq(b),
        CmpOp::Lt => a.compare(b)? == Less,
        CmpOp::Le => a.compare(b)? != Greater,
        CmpOp::Gt => a.compare(b)? == Greater,
        CmpOp::Ge => a.compare(b)? != Less,
        CmpOp::In => b.contains(a)?,
        CmpOp::NotIn => !b.contains(a)?,
        CmpOp::Is => a.is(b),
        CmpOp::IsNot => !a.is(b),
    })
}

fn index_error(what: &str) -> ScriptError {
    ScriptError::runtime(format!("{} index out of range", what))
}

fn load_index(container: &Value, index: &Value) -> Result<Value, ScriptError> {
    let position = |len: usize, what: &str| -> Result<usize, ScriptError> {
        let i = index.as_int().ok_or_else(|| {
            ScriptError::runtime(format!(
                "{} indices must be integers, not {}",
                what,
                index.type_name()
            ))
        })?;
        normalize_index(i, len).ok_or_else(|| index_error(what))
    };
    match container {
        Value::List(items) => {
            let items = items.borrow();
            Ok(items[position(items.len(), "list")?].clone())
        }
        Value::Tuple(items) => Ok(items[position(items.len(), "tuple")?].clone()),
        Value::Str(s) => {
            let i = position(s.chars().count(), "string")?;
            Ok(s.chars().nth(i).map_or(Value::None, |c| Value::str(c.encode_utf8(&mut [0; 4]))))
        }
        Value::Range(start, stop, step) => {
            let i = position(range_len(*start, *stop, *step), "range")?;
            Ok(Value::Int(start + step * i as i64))
        }
        Value::Dict(dict) => dict
            .borrow()
            .get(index)
            .ok_or_else(|| ScriptError::runtime(format!("KeyError: {}", index.repr()))),
        Value::Match(m) => Ok(m.group(m.group_index(index)?)),
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn store_index(container: &Value, index: Value, value: Value) -> Result<(), ScriptError> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = index
                .as_int()
                .and_then(|i| normalize_index(i, items.len()))
                .ok_or_else(|| index_error("list assignment"))?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(dict) => dict.borrow_mut().insert(index, value),
        other => Err(ScriptError::runtime(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// Clamp Python-style slice bounds to `0..=len`.
fn slice_bounds(len: usize, lower: Option<Value>, upper: Option<Value>) -> Result<(usize, usize), ScriptError> {
    let bound = |v: Option<Value>, default: usize| -> Result<usize, ScriptError> {
        match v {
            None | Some(Value::None) => Ok(default),
            Some(v) => {
                let i = v.as_int().ok_or_else(|| {
                    ScriptError::runtime("slice indices must be integers or None")
                })?;
                let i = if i < 0 { i + len as i64 } else { i };
                Ok(i.clamp(0, len as i64) as usize)
            }
        }
    };
    let start = bound(lower, 0)?;
    let end = bound(upper, len)?;
    Ok((start, end.max(start)))
}

fn slice(value: &Value, lower: Option<Value>, upper: Option<Value>) -> Result<Value, ScriptError> {
    match value {
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), lower, upper)?;
            Ok(Value::str(&chars[start..end].iter().collect::<String>()))
        }
        Value::List(items) => {
            let items = items.borrow();
            let (start, end) = slice_bounds(items.len(), lower, upper)?;
            Ok(Value::list(items[start..end].to_vec()))
        }
        Value::Tuple(items) => {
            let (start, end) = slice_bounds(items.len(), lower, upper)?;
            Ok(Value::tuple(items[start..end].to_vec()))
        }
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not sliceable",
            other.type_name()
        ))),
    }
}

/// `template % args` with `%s`, `%r`, `%d`, `%i`, `%f`, `%.Nf` and `%%`.
fn percent_format(template: &str, args: &Value) -> Result<String, ScriptError> {
    let values = match args {
        Value::Tuple(items) => items.to_vec(),
        single => vec![single.clone()],
    };
    let mut values = values.into_iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let missing = || ScriptError::runtime("not enough arguments for format string");
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        while let Some(&d) = chars.peek() {
            if d == '.' || d.is_ascii_digit() {
                spec.push(d);
                chars.next();
            } else {
                break;
            }
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => out.push_str(&values.next().ok_or_else(missing)?.to_str()),
            Some('r') => out.push_str(&values.next().ok_or_else(missing)?.repr()),
            Some('d') | Some('i') => {
                out.push_str(&format_value(&values.next().ok_or_else(missing)?, "", "d")?)
            }
            Some('f') => {
                let spec = if spec.is_empty() { ".6f".to_string() } else { format!("{}f", spec) };
                out.push_str(&format_value(&values.next().ok_or_else(missing)?, "", &spec)?)
            }
            _ => return Err(ScriptError::runtime("unsupported format character")),
        }
    }
    if values.next().is_some() {
        return Err(ScriptError::runtime(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}
