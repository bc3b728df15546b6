//! Bytecode compiler for rule scripts.
//!
//! Names assigned anywhere in a script are locals; every other name must
//! resolve to an allow-listed global at compile time, so a script cannot even
//! mention a capability it was not given.

use std::collections::HashSet;
use std::sync::Arc;

use super::builtins::{lookup_global, Global};
use super::parser::{parse, BinOp, CmpOp, Const, Expr, Stmt, StmtKind, Target, UnaryOp};
use super::CompileError;

/// Parameters of every script, in call order.
pub(crate) const PARAMETERS: [&str; 5] = ["p", "t", "match", "level", "modifiers"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Instr {
    Const(u32),
    LoadLocal(u32),
    StoreLocal(u32),
    LoadGlobal(Global),
    LoadAttr(u32),
    LoadIndex,
    /// Stack: value, container, index
    StoreIndex,
    Slice { lower: bool, upper: bool },
    BuildTuple(u32),
    BuildList(u32),
    BuildDict(u32),
    /// Stack: list, item
    ListAppend,
    /// Stack: callable, positional args, keyword values
    Call { argc: u32, kwnames: Option<u32> },
    Binary(BinOp),
    Unary(UnaryOp),
    Compare(CmpOp),
    Not,
    Jump(u32),
    PopJumpIfFalse(u32),
    JumpIfFalseOrPop(u32),
    JumpIfTrueOrPop(u32),
    GetIter,
    /// Push the next item, or pop the iterator and jump when exhausted
    ForIter(u32),
    Pop,
    Dup,
    RotTwo,
    RotThree,
    Unpack(u32),
    Return,
    Yield,
    Raise(bool),
}

/// Compiled script body.
#[derive(Debug)]
pub(crate) struct Program {
    pub code: Vec<Instr>,
    pub lines: Vec<usize>,
    pub consts: Vec<Const>,
    pub attrs: Vec<Arc<str>>,
    pub kwnames: Vec<Vec<Arc<str>>>,
    pub locals: Vec<String>,
    pub is_generator: bool,
}

pub(crate) fn compile(source: &str) -> Result<Program, CompileError> {
    let body = parse(source)?;
    let mut assigned = HashSet::new();
    collect_assigned(&body, &mut assigned);

    let mut locals: Vec<String> = PARAMETERS.iter().map(|s| s.to_string()).collect();
    let mut sorted: Vec<String> = assigned
        .into_iter()
        .filter(|n| !PARAMETERS.contains(&n.as_str()))
        .collect();
    sorted.sort();
    locals.extend(sorted);

    let mut compiler = Compiler {
        program: Program {
            code: Vec::new(),
            lines: Vec::new(),
            consts: Vec::new(),
            attrs: Vec::new(),
            kwnames: Vec::new(),
            locals,
            is_generator: false,
        },
        loops: Vec::new(),
        line: 1,
        temps: 0,
    };
    compiler.block(&body)?;
    let none = compiler.constant(Const::None);
    compiler.emit(Instr::Const(none));
    compiler.emit(Instr::Return);
    Ok(compiler.program)
}

fn collect_assigned(body: &[Stmt], out: &mut HashSet<String>) {
    fn target(t: &Target, out: &mut HashSet<String>) {
        match t {
            Target::Name(n) => {
                out.insert(n.clone());
            }
            Target::Tuple(items) => items.iter().for_each(|t| target(t, out)),
            Target::Index(..) => {}
        }
    }
    fn expr(e: &Expr, out: &mut HashSet<String>) {
        match e {
            Expr::ListComp {
                element,
                target: t,
                iter,
                conditions,
            } => {
                target(t, out);
                expr(element, out);
                expr(iter, out);
                conditions.iter().for_each(|c| expr(c, out));
            }
            Expr::Tuple(items) | Expr::List(items) => items.iter().for_each(|i| expr(i, out)),
            Expr::Dict(items) => items.iter().for_each(|(k, v)| {
                expr(k, out);
                expr(v, out);
            }),
            Expr::Attr(v, _) | Expr::Unary(_, v) | Expr::Not(v) => expr(v, out),
            Expr::Call { func, args, kwargs } => {
                expr(func, out);
                args.iter().for_each(|a| expr(a, out));
                kwargs.iter().for_each(|(_, a)| expr(a, out));
            }
            Expr::Index(a, b) | Expr::Binary(_, a, b) | Expr::And(a, b) | Expr::Or(a, b) => {
                expr(a, out);
                expr(b, out);
            }
            Expr::Slice { value, lower, upper } => {
                expr(value, out);
                lower.iter().for_each(|l| expr(l, out));
                upper.iter().for_each(|u| expr(u, out));
            }
            Expr::Compare(first, rest) => {
                expr(first, out);
                rest.iter().for_each(|(_, e)| expr(e, out));
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                expr(cond, out);
                expr(then, out);
                expr(otherwise, out);
            }
            Expr::Yield(v) => v.iter().for_each(|v| expr(v, out)),
            Expr::Const(_) | Expr::Name(_) => {}
        }
    }
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign(targets, value) => {
                targets.iter().for_each(|t| target(t, out));
                expr(value, out);
            }
            StmtKind::AugAssign(t, _, value) => {
                target(t, out);
                expr(value, out);
            }
            StmtKind::For(t, iter, body) => {
                target(t, out);
                expr(iter, out);
                collect_assigned(body, out);
            }
            StmtKind::If(branches, otherwise) => {
                for (cond, body) in branches {
                    expr(cond, out);
                    collect_assigned(body, out);
                }
                if let Some(body) = otherwise {
                    collect_assigned(body, out);
                }
            }
            StmtKind::While(cond, body) => {
                expr(cond, out);
                collect_assigned(body, out);
            }
            StmtKind::Expr(e) => expr(e, out),
            StmtKind::Return(Some(e)) | StmtKind::Raise(Some(e)) => expr(e, out),
            StmtKind::Return(None)
            | StmtKind::Raise(None)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass => {}
        }
    }
}

struct Loop {
    continue_to: usize,
    breaks: Vec<usize>,
    owns_iterator: bool,
}

struct Compiler {
    program: Program,
    loops: Vec<Loop>,
    line: usize,
    temps: usize,
}

impl Compiler {
    fn emit(&mut self, instr: Instr) -> usize {
        self.program.code.push(instr);
        self.program.lines.push(self.line);
        self.program.code.len() - 1
    }

    fn here(&self) -> usize {
        self.program.code.len()
    }

    fn patch(&mut self, at: usize, target: usize) {
        let target = target as u32;
        self.program.code[at] = match self.program.code[at] {
            Instr::Jump(_) => Instr::Jump(target),
            Instr::PopJumpIfFalse(_) => Instr::PopJumpIfFalse(target),
            Instr::JumpIfFalseOrPop(_) => Instr::JumpIfFalseOrPop(target),
            Instr::JumpIfTrueOrPop(_) => Instr::JumpIfTrueOrPop(target),
            Instr::ForIter(_) => Instr::ForIter(target),
            other => other,
        };
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(message, self.line)
    }

    fn constant(&mut self, value: Const) -> u32 {
        if let Some(i) = self.program.consts.iter().position(|c| *c == value) {
            return i as u32;
        }
        self.program.consts.push(value);
        (self.program.consts.len() - 1) as u32
    }

    fn attr(&mut self, name: &str) -> u32 {
        if let Some(i) = self.program.attrs.iter().position(|a| &**a == name) {
            return i as u32;
        }
        self.program.attrs.push(Arc::from(name));
        (self.program.attrs.len() - 1) as u32
    }

    fn local(&self, name: &str) -> Option<u32> {
        self.program
            .locals
            .iter()
            .position(|l| l == name)
            .map(|i| i as u32)
    }

    /// A fresh hidden local slot.
    fn temp(&mut self) -> u32 {
        self.temps += 1;
        self.program.locals.push(format!(".{}", self.temps));
        (self.program.locals.len() - 1) as u32
    }

    fn block(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        body.iter().try_for_each(|stmt| self.statement(stmt))
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.expr(e)?;
                self.emit(Instr::Pop);
            }
            StmtKind::Assign(targets, value) => {
                self.expr(value)?;
                for (i, target) in targets.iter().enumerate() {
                    if i + 1 < targets.len() {
                        self.emit(Instr::Dup);
                    }
                    self.store(target)?;
                }
            }
            StmtKind::AugAssign(target, op, value) => self.aug_assign(target, *op, value)?,
            StmtKind::If(branches, otherwise) => {
                let mut exits = Vec::new();
                for (cond, body) in branches {
                    self.expr(cond)?;
                    let skip = self.emit(Instr::PopJumpIfFalse(0));
                    self.block(body)?;
                    exits.push(self.emit(Instr::Jump(0)));
                    let next = self.here();
                    self.patch(skip, next);
                }
                if let Some(body) = otherwise {
                    self.block(body)?;
                }
                let end = self.here();
                for exit in exits {
                    self.patch(exit, end);
                }
            }
            StmtKind::While(cond, body) => {
                let start = self.here();
                self.expr(cond)?;
                let exit = self.emit(Instr::PopJumpIfFalse(0));
                self.loops.push(Loop {
                    continue_to: start,
                    breaks: Vec::new(),
                    owns_iterator: false,
                });
                self.block(body)?;
                self.emit(Instr::Jump(start as u32));
                self.finish_loop(exit);
            }
            StmtKind::For(target, iter, body) => {
                self.expr(iter)?;
                self.emit(Instr::GetIter);
                let start = self.emit(Instr::ForIter(0));
                self.loops.push(Loop {
                    continue_to: start,
                    breaks: Vec::new(),
                    owns_iterator: true,
                });
                self.store(target)?;
                self.block(body)?;
                self.emit(Instr::Jump(start as u32));
                self.finish_loop(start);
            }
            StmtKind::Break => {
                let owns = match self.loops.last() {
                    Some(l) => l.owns_iterator,
                    None => return Err(self.error("'break' outside loop")),
                };
                if owns {
                    self.emit(Instr::Pop);
                }
                let jump = self.emit(Instr::Jump(0));
                if let Some(l) = self.loops.last_mut() {
                    l.breaks.push(jump);
                }
            }
            StmtKind::Continue => {
                let target = match self.loops.last() {
                    Some(l) => l.continue_to,
                    None => return Err(self.error("'continue' not properly in loop")),
                };
                self.emit(Instr::Jump(target as u32));
            }
            StmtKind::Pass => {}
            StmtKind::Return(value) => {
                match value {
                    Some(v) => self.expr(v)?,
                    None => {
                        let none = self.constant(Const::None);
                        self.emit(Instr::Const(none));
                    }
                }
                self.emit(Instr::Return);
            }
            StmtKind::Raise(value) => {
                if let Some(v) = value {
                    self.expr(v)?;
                }
                self.emit(Instr::Raise(value.is_some()));
            }
        }
        Ok(())
    }

    /// Close the innermost loop: `exit` is the instruction that leaves it
    /// normally, breaks land after the loop.
    fn finish_loop(&mut self, exit: usize) {
        let end = self.here();
        self.patch(exit, end);
        if let Some(l) = self.loops.pop() {
            for b in l.breaks {
                self.patch(b, end);
            }
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<(), CompileError> {
        match target {
            Target::Name(name) => {
                let slot = self.local(name).ok_or_else(|| self.error(format!("name '{}' is not defined", name)))?;
                self.emit(Instr::LoadLocal(slot));
                self.expr(value)?;
                self.emit(Instr::Binary(op));
                self.emit(Instr::StoreLocal(slot));
            }
            Target::Index(container, index) => {
                let c = self.temp();
                let i = self.temp();
                self.expr(container)?;
                self.emit(Instr::StoreLocal(c));
                self.expr(index)?;
                self.emit(Instr::StoreLocal(i));
                self.emit(Instr::LoadLocal(c));
                self.emit(Instr::LoadLocal(i));
                self.emit(Instr::LoadIndex);
                self.expr(value)?;
                self.emit(Instr::Binary(op));
                self.emit(Instr::LoadLocal(c));
                self.emit(Instr::LoadLocal(i));
                self.emit(Instr::StoreIndex);
            }
            Target::Tuple(_) => return Err(self.error("illegal expression for augmented assignment")),
        }
        Ok(())
    }

    fn store(&mut self, target: &Target) -> Result<(), CompileError> {
        match target {
            Target::Name(name) => {
                let slot = self
                    .local(name)
                    .ok_or_else(|| self.error(format!("cannot assign to '{}'", name)))?;
                self.emit(Instr::StoreLocal(slot));
            }
            Target::Tuple(items) => {
                self.emit(Instr::Unpack(items.len() as u32));
                for item in items {
                    self.store(item)?;
                }
            }
            Target::Index(container, index) => {
                self.expr(container)?;
                self.expr(index)?;
                self.emit(Instr::StoreIndex);
            }
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Const(c) => {
                let i = self.constant(c.clone());
                self.emit(Instr::Const(i));
            }
            Expr::Name(name) => {
                if let Some(slot) = self.local(name) {
                    self.emit(Instr::LoadLocal(slot));
                } else if let Some(global) = lookup_global(name) {
                    self.emit(Instr::LoadGlobal(global));
                } else {
                    return Err(self.error(format!("name '{}' is not defined", name)));
                }
            }
            Expr::Tuple(items) => {
                items.iter().try_for_each(|i| self.expr(i))?;
                self.emit(Instr::BuildTuple(items.len() as u32));
            }
            Expr::List(items) => {
                items.iter().try_for_each(|i| self.expr(i))?;
                self.emit(Instr::BuildList(items.len() as u32));
            }
            Expr::Dict(items) => {
                for (k, v) in items {
                    self.expr(k)?;
                    self.expr(v)?;
                }
                self.emit(Instr::BuildDict(items.len() as u32));
            }
            Expr::ListComp {
                element,
                target,
                iter,
                conditions,
            } => {
                let result = self.temp();
                self.emit(Instr::BuildList(0));
                self.emit(Instr::StoreLocal(result));
                self.expr(iter)?;
                self.emit(Instr::GetIter);
                let start = self.emit(Instr::ForIter(0));
                self.store(target)?;
                for cond in conditions {
                    self.expr(cond)?;
                    self.emit(Instr::PopJumpIfFalse(start as u32));
                }
                self.emit(Instr::LoadLocal(result));
                self.expr(element)?;
                self.emit(Instr::ListAppend);
                self.emit(Instr::Jump(start as u32));
                let end = self.here();
                self.patch(start, end);
                self.emit(Instr::LoadLocal(result));
            }
            Expr::Attr(value, name) => {
                self.expr(value)?;
                let i = self.attr(name);
                self.emit(Instr::LoadAttr(i));
            }
            Expr::Call { func, args, kwargs } => {
                self.expr(func)?;
                args.iter().try_for_each(|a| self.expr(a))?;
                kwargs.iter().try_for_each(|(_, v)| self.expr(v))?;
                let kwnames = if kwargs.is_empty() {
                    None
                } else {
                    self.program
                        .kwnames
                        .push(kwargs.iter().map(|(k, _)| Arc::from(k.as_str())).collect());
                    Some((self.program.kwnames.len() - 1) as u32)
                };
                self.emit(Instr::Call {
                    argc: args.len() as u32,
                    kwnames,
                });
            }
            Expr::Index(value, index) => {
                self.expr(value)?;
                self.expr(index)?;
                self.emit(Instr::LoadIndex);
            }
            Expr::Slice { value, lower, upper } => {
                self.expr(value)?;
                if let Some(l) = lower {
                    self.expr(l)?;
                }
                if let Some(u) = upper {
                    self.expr(u)?;
                }
                self.emit(Instr::Slice {
                    lower: lower.is_some(),
                    upper: upper.is_some(),
                });
            }
            Expr::Unary(op, value) => {
                self.expr(value)?;
                self.emit(Instr::Unary(*op));
            }
            Expr::Binary(op, a, b) => {
                self.expr(a)?;
                self.expr(b)?;
                self.emit(Instr::Binary(*op));
            }
            Expr::Compare(first, rest) => self.compare(first, rest)?,
            Expr::And(a, b) => {
                self.expr(a)?;
                let jump = self.emit(Instr::JumpIfFalseOrPop(0));
                self.expr(b)?;
                let end = self.here();
                self.patch(jump, end);
            }
            Expr::Or(a, b) => {
                self.expr(a)?;
                let jump = self.emit(Instr::JumpIfTrueOrPop(0));
                self.expr(b)?;
                let end = self.here();
                self.patch(jump, end);
            }
            Expr::Not(value) => {
                self.expr(value)?;
                self.emit(Instr::Not);
            }
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                let skip = self.emit(Instr::PopJumpIfFalse(0));
                self.expr(then)?;
                let exit = self.emit(Instr::Jump(0));
                let other = self.here();
                self.patch(skip, other);
                self.expr(otherwise)?;
                let end = self.here();
                self.patch(exit, end);
            }
            Expr::Yield(value) => {
                match value {
                    Some(v) => self.expr(v)?,
                    None => {
                        let none = self.constant(Const::None);
                        self.emit(Instr::Const(none));
                    }
                }
                self.program.is_generator = true;
                self.emit(Instr::Yield);
            }
        }
        Ok(())
    }

    /// Chained comparison `a < b < c` evaluates `b` once and short-circuits.
    fn compare(&mut self, first: &Expr, rest: &[(CmpOp, Expr)]) -> Result<(), CompileError> {
        self.expr(first)?;
        let mut cleanups = Vec::new();
        for (i, (op, operand)) in rest.iter().enumerate() {
            self.expr(operand)?;
            if i + 1 < rest.len() {
                self.emit(Instr::Dup);
                self.emit(Instr::RotThree);
                self.emit(Instr::Compare(*op));
                cleanups.push(self.emit(Instr::JumpIfFalseOrPop(0)));
            } else {
                self.emit(Instr::Compare(*op));
            }
        }
        if !cleanups.is_empty() {
            let exit = self.emit(Instr::Jump(0));
            let cleanup = self.here();
            for c in cleanups {
                self.patch(c, cleanup);
            }
            self.emit(Instr::RotTwo);
            self.emit(Instr::Pop);
            let end = self.here();
            self.patch(exit, end);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_names_fail() {
        let err = compile("open('/etc/passwd')").unwrap_err();
        assert!(err.message.contains("'open' is not defined"));
        assert!(compile("__import__('os')").is_err());
        assert!(compile("eval('1')").is_err());
        assert!(compile("exec('1')").is_err());
        assert!(compile("compile('1', 'x', 'exec')").is_err());
    }

    #[test]
    fn test_assigned_names_are_locals() {
        let program = compile("x = 1\nfor y in range(3):\n    x += y\nreturn x").unwrap();
        assert!(program.locals.contains(&"x".to_string()));
        assert!(program.locals.contains(&"y".to_string()));
        assert_eq!(&program.locals[..5], &PARAMETERS.map(String::from)[..]);
        assert!(!program.is_generator);
    }

    #[test]
    fn test_generator_detection() {
        assert!(compile("yield 10").unwrap().is_generator);
        assert!(compile("while True:\n    x = yield\n").unwrap().is_generator);
    }

    #[test]
    fn test_loop_control_outside_loop() {
        assert!(compile("break").is_err());
        assert!(compile("continue").is_err());
    }

    #[test]
    fn test_jumps_are_patched() {
        let program = compile("if p:\n    x = 1\nelse:\n    x = 2").unwrap();
        let len = program.code.len() as u32;
        for instr in &program.code {
            if let Instr::Jump(t) | Instr::PopJumpIfFalse(t) = instr {
                assert!(*t > 0 && *t <= len);
            }
        }
    }
}
