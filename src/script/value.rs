//! Runtime values of the script VM.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::rc::Rc;

use regex::Regex;

use super::builtins::Builtin;
use super::ScriptError;
use crate::document::Paragraph;

/// Upper bound on materialised sequence length.
pub(crate) const MAX_ITEMS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Module {
    Re,
    Math,
    Itertools,
}

impl Module {
    pub fn name(self) -> &'static str {
        match self {
            Module::Re => "re",
            Module::Math => "math",
            Module::Itertools => "itertools",
        }
    }
}

/// Exception classes a script may raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExceptionKind {
    NotFound,
    Script,
}

/// Result of a regex search, spans in bytes.
#[derive(Debug)]
pub(crate) struct MatchData {
    pub text: Rc<str>,
    pub spans: Vec<Option<(usize, usize)>>,
    pub names: Vec<Option<String>>,
}

impl MatchData {
    pub fn from_captures(text: &Rc<str>, regex: &Regex, caps: &regex::Captures<'_>) -> Self {
        Self {
            text: Rc::clone(text),
            spans: caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect(),
            names: regex.capture_names().map(|n| n.map(str::to_string)).collect(),
        }
    }

    pub fn group_index(&self, key: &Value) -> Result<usize, ScriptError> {
        match key {
            Value::Int(i) if *i >= 0 && (*i as usize) < self.spans.len() => Ok(*i as usize),
            Value::Str(name) => self
                .names
                .iter()
                .position(|n| n.as_deref() == Some(&**name))
                .ok_or_else(|| ScriptError::runtime("no such group")),
            _ => Err(ScriptError::runtime("no such group")),
        }
    }

    pub fn group(&self, index: usize) -> Value {
        match self.spans.get(index).copied().flatten() {
            Some((s, e)) => Value::str(&self.text[s..e]),
            None => Value::None,
        }
    }

    /// Character span of a group, `(-1, -1)` when it did not participate.
    pub fn char_span(&self, index: usize) -> (i64, i64) {
        match self.spans.get(index).copied().flatten() {
            Some((s, e)) => (char_offset(&self.text, s), char_offset(&self.text, e)),
            None => (-1, -1),
        }
    }
}

fn char_offset(text: &str, byte: usize) -> i64 {
    text[..byte].chars().count() as i64
}

/// Insertion-ordered mapping with linear lookup.
#[derive(Debug, Default)]
pub(crate) struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.py_eq(key))
            .map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), ScriptError> {
        if !key.is_hashable() {
            return Err(ScriptError::runtime(format!(
                "unhashable type: '{}'",
                key.type_name()
            )));
        }
        match self.entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k.py_eq(key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
            .collect()
    }
}

/// Lazy iterator state.
#[derive(Debug)]
pub(crate) enum Iter {
    Items(std::vec::IntoIter<Value>),
    Range { next: i64, stop: i64, step: i64 },
    Repeat { value: Value, remaining: Option<u64> },
    Take { inner: Rc<RefCell<Iter>>, remaining: usize },
    Chain { current: Option<Rc<RefCell<Iter>>>, rest: VecDeque<Value> },
}

impl Iter {
    pub fn next(&mut self) -> Result<Option<Value>, ScriptError> {
        match self {
            Iter::Items(items) => Ok(items.next()),
            Iter::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return Ok(None);
                }
                let value = *next;
                *next = next.saturating_add(*step);
                Ok(Some(Value::Int(value)))
            }
            Iter::Repeat { value, remaining } => match remaining {
                Some(0) => Ok(None),
                Some(n) => {
                    *n -= 1;
                    Ok(Some(value.clone()))
                }
                None => Ok(Some(value.clone())),
            },
            Iter::Take { inner, remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
                inner.borrow_mut().next()
            }
            Iter::Chain { current, rest } => loop {
                if let Some(iter) = current {
                    if let Some(v) = iter.borrow_mut().next()? {
                        return Ok(Some(v));
                    }
                }
                match rest.pop_front() {
                    Some(next) => *current = Some(iterate(&next)?),
                    None => return Ok(None),
                }
            },
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Tuple(Rc<Vec<Value>>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Dict>>),
    Range(i64, i64, i64),
    Iter(Rc<RefCell<Iter>>),
    Paragraph(Rc<Paragraph>),
    Regex(Rc<Regex>),
    Match(Rc<MatchData>),
    Builtin(Builtin),
    /// Bound method: receiver and method name
    Method(Rc<Value>, Rc<str>),
    Module(Module),
    Exception(ExceptionKind, Rc<str>),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn paragraph(p: Paragraph) -> Value {
        Value::Paragraph(Rc::new(p))
    }

    pub fn iter(iter: Iter) -> Value {
        Value::Iter(Rc::new(RefCell::new(iter)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Range(..) => "range",
            Value::Iter(_) => "iterator",
            Value::Paragraph(_) => "Paragraph",
            Value::Regex(_) => "Pattern",
            Value::Match(_) => "Match",
            Value::Builtin(_) | Value::Method(..) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::Exception(ExceptionKind::NotFound, _) => "NotFoundError",
            Value::Exception(ExceptionKind::Script, _) => "ScriptError",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => d.borrow().len() > 0,
            Value::Range(start, stop, step) => range_len(*start, *stop, *step) > 0,
            _ => true,
        }
    }

    /// Integer view; bools count as ints.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn is_hashable(&self) -> bool {
        match self {
            Value::List(_) | Value::Dict(_) | Value::Iter(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(_, message) => message.to_string(),
            Value::Paragraph(p) => p.text(),
            other => other.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => str_repr(s),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items.iter())),
            Value::List(items) => format!("[{}]", join_repr(items.borrow().iter())),
            Value::Dict(d) => {
                let d = d.borrow();
                let body: Vec<String> = d
                    .entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Value::Range(start, stop, 1) => format!("range({}, {})", start, stop),
            Value::Range(start, stop, step) => format!("range({}, {}, {})", start, stop, step),
            Value::Iter(_) => "<iterator>".into(),
            Value::Paragraph(p) => {
                let text: String = p.text().chars().take(40).collect();
                format!("<Paragraph {}>", str_repr(&text))
            }
            Value::Regex(r) => format!("re.compile({})", str_repr(r.as_str())),
            Value::Match(m) => {
                let (s, e) = m.char_span(0);
                format!("<re.Match span=({}, {}), match={}>", s, e, m.group(0).repr())
            }
            Value::Builtin(b) => format!("<built-in function {}>", b.name()),
            Value::Method(recv, name) => {
                format!("<built-in method {} of {} object>", name, recv.type_name())
            }
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::Exception(_, message) => {
                format!("{}({})", self.type_name(), str_repr(message))
            }
        }
    }

    /// `==`
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => seq_eq(a, b),
            (Value::List(a), Value::List(b)) => seq_eq(&a.borrow(), &b.borrow()),
            (Value::Dict(a), Value::Dict(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.entries
                        .iter()
                        .all(|(k, v)| b.get(k).map_or(false, |bv| bv.py_eq(v)))
            }
            (Value::Range(a, b, c), Value::Range(x, y, z)) => (a, b, c) == (x, y, z),
            (Value::Paragraph(a), Value::Paragraph(b)) => a.same_position(b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => a.as_str() == b.as_str(),
            (Value::Exception(ka, ma), Value::Exception(kb, mb)) => ka == kb && ma == mb,
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// `is`
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Paragraph(a), Value::Paragraph(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            _ => false,
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Bool(b) => Some(Number::Int(*b as i64)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Ordering for `<`, `sorted`, `min` and `max`.
    pub fn compare(&self, other: &Value) -> Result<Ordering, ScriptError> {
        let unorderable = || {
            ScriptError::runtime(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))
        };
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Tuple(a), Value::Tuple(b)) => seq_cmp(a, b),
            (Value::List(a), Value::List(b)) => seq_cmp(&a.borrow(), &b.borrow()),
            (Value::Paragraph(a), Value::Paragraph(b)) => a.compare(b).ok_or_else(unorderable),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(Number::Int(x)), Some(Number::Int(y))) => Ok(x.cmp(&y)),
                (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()).ok_or_else(unorderable),
                _ => Err(unorderable()),
            },
        }
    }

    /// `x in self`
    pub fn contains(&self, item: &Value) -> Result<bool, ScriptError> {
        match self {
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(&**needle)),
                _ => Err(ScriptError::runtime(format!(
                    "'in <string>' requires string as left operand, not {}",
                    item.type_name()
                ))),
            },
            Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
            Value::List(items) => Ok(items.borrow().iter().any(|v| v.py_eq(item))),
            Value::Dict(d) => Ok(d.borrow().get(item).is_some()),
            Value::Range(start, stop, step) => Ok(match item.as_int() {
                Some(i) => {
                    let inside = if *step > 0 {
                        *start <= i && i < *stop
                    } else {
                        *stop < i && i <= *start
                    };
                    inside && (i128::from(i) - i128::from(*start)) % i128::from(*step) == 0
                }
                None => false,
            }),
            Value::Iter(_) => Ok(collect(self)?.iter().any(|v| v.py_eq(item))),
            other => Err(ScriptError::runtime(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// `len(self)`
    pub fn len(&self) -> Result<usize, ScriptError> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::Tuple(items) => Ok(items.len()),
            Value::List(items) => Ok(items.borrow().len()),
            Value::Dict(d) => Ok(d.borrow().len()),
            Value::Range(start, stop, step) => Ok(range_len(*start, *stop, *step)),
            other => Err(ScriptError::runtime(format!(
                "object of type '{}' has no len()",
                other.type_name()
            ))),
        }
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

pub(crate) fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let span = if step > 0 {
        stop.saturating_sub(start)
    } else {
        start.saturating_sub(stop)
    };
    if span <= 0 {
        0
    } else {
        let step = step.unsigned_abs();
        ((span as u64 + step - 1) / step) as usize
    }
}

fn seq_eq(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
}

fn seq_cmp(a: &[Value], b: &[Value]) -> Result<Ordering, ScriptError> {
    for (x, y) in a.iter().zip(b) {
        if !x.py_eq(y) {
            return x.compare(y);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

fn join_repr<'a>(items: impl Iterator<Item = &'a Value>) -> String {
    items.map(Value::repr).collect::<Vec<_>>().join(", ")
}

pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".into()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".into() } else { "-inf".into() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// An iterator over `value`; iterators iterate themselves.
pub(crate) fn iterate(value: &Value) -> Result<Rc<RefCell<Iter>>, ScriptError> {
    let iter = match value {
        Value::Iter(iter) => return Ok(Rc::clone(iter)),
        Value::Str(s) => Iter::Items(
            s.chars()
                .map(|c| Value::str(c.encode_utf8(&mut [0; 4])))
                .collect::<Vec<_>>()
                .into_iter(),
        ),
        Value::Tuple(items) => Iter::Items(items.to_vec().into_iter()),
        Value::List(items) => Iter::Items(items.borrow().clone().into_iter()),
        Value::Dict(d) => Iter::Items(d.borrow().keys().into_iter()),
        Value::Range(start, stop, step) => Iter::Range {
            next: *start,
            stop: *stop,
            step: *step,
        },
        other => {
            return Err(ScriptError::runtime(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };
    Ok(Rc::new(RefCell::new(iter)))
}

/// Drain an iterable into a vector.
pub(crate) fn collect(value: &Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::Tuple(items) => return Ok(items.to_vec()),
        Value::List(items) => return Ok(items.borrow().clone()),
        _ => {}
    }
    let iter = iterate(value)?;
    let mut out = Vec::new();
    while let Some(v) = iter.borrow_mut().next()? {
        if out.len() >= MAX_ITEMS {
            return Err(ScriptError::runtime("sequence too long"));
        }
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(Value::str("x").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(!Value::Range(3, 3, 1).truthy());
    }

    #[test]
    fn test_repr() {
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Float(0.5).repr(), "0.5");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(
            Value::list(vec![Value::None, Value::Bool(true)]).repr(),
            "[None, True]"
        );
    }

    #[test]
    fn test_range_membership_spans_full_int_range() {
        let wide = Value::Range(i64::MIN, i64::MAX, 3);
        assert!(!wide.contains(&Value::Int(5)).unwrap());
        assert!(wide.contains(&Value::Int(i64::MIN + 3)).unwrap());
        let down = Value::Range(i64::MAX, i64::MIN, -1);
        assert!(down.contains(&Value::Int(0)).unwrap());
        assert!(!Value::Range(0, 10, 2).contains(&Value::Int(3)).unwrap());
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&Value::str("1")));
    }

    #[test]
    fn test_ordering() {
        let a = Value::tuple(vec![Value::Int(1), Value::str("b")]);
        let b = Value::tuple(vec![Value::Int(1), Value::str("c")]);
        assert_eq!(a.compare(&b).unwrap(), Ordering::Less);
        assert!(Value::Int(1).compare(&Value::str("x")).is_err());
    }

    #[test]
    fn test_range_iteration_and_len() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -4), 3);
        let items = collect(&Value::Range(5, 0, -2)).unwrap();
        let ints: Vec<i64> = items.iter().filter_map(Value::as_int).collect();
        assert_eq!(ints, vec![5, 3, 1]);
        assert!(Value::Range(0, 10, 2).contains(&Value::Int(4)).unwrap());
        assert!(!Value::Range(0, 10, 2).contains(&Value::Int(5)).unwrap());
    }

    #[test]
    fn test_dict_rejects_unhashable_keys() {
        let mut d = Dict::default();
        assert!(d.insert(Value::list(vec![]), Value::None).is_err());
        d.insert(Value::str("a"), Value::Int(1)).unwrap();
        d.insert(Value::str("a"), Value::Int(2)).unwrap();
        assert_eq!(d.len(), 1);
        assert!(d.get(&Value::str("a")).unwrap().py_eq(&Value::Int(2)));
    }
}
