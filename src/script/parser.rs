//! Recursive-descent parser producing the script syntax tree.

use super::lexer::{tokenize, Keyword, Tok, Token};
use super::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Const(Const),
    Name(String),
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    ListComp {
        element: Box<Expr>,
        target: Target,
        iter: Box<Expr>,
        conditions: Vec<Expr>,
    },
    Attr(Box<Expr>, String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Yield(Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    Name(String),
    Tuple(Vec<Target>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StmtKind {
    Expr(Expr),
    /// `a = b = value`
    Assign(Vec<Target>, Expr),
    AugAssign(Target, BinOp, Expr),
    If(Vec<(Expr, Vec<Stmt>)>, Option<Vec<Stmt>>),
    While(Expr, Vec<Stmt>),
    For(Target, Expr, Vec<Stmt>),
    Break,
    Continue,
    Pass,
    Return(Option<Expr>),
    Raise(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut parser = Parser {
        tokens: tokenize(source)?,
        pos: 0,
    };
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        parser.statement(&mut body)?;
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        self.tokens
            .get(self.pos + ahead)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.peek(), Tok::Kw(k) if *k == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::at(message, self.line())
    }

    fn unexpected(&self) -> CompileError {
        let found = match self.peek() {
            Tok::Name(n) => format!("name '{}'", n),
            Tok::Int(i) => format!("number {}", i),
            Tok::Float(f) => format!("number {}", f),
            Tok::Str(_) => "string".to_string(),
            Tok::Kw(k) => format!("keyword {:?}", k).to_lowercase(),
            Tok::Op(o) => format!("'{}'", o),
            Tok::Newline => "end of line".to_string(),
            Tok::Indent => "unexpected indent".to_string(),
            Tok::Dedent => "unexpected dedent".to_string(),
            Tok::Eof => "end of script".to_string(),
        };
        self.error(format!("invalid syntax near {}", found))
    }

    fn expect_op(&mut self, op: &str) -> Result<(), CompileError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", op)))
        }
    }

    fn expect_newline(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Tok::Newline => {
                self.pos += 1;
                Ok(())
            }
            Tok::Eof | Tok::Dedent => Ok(()),
            _ => Err(self.unexpected()),
        }
    }

    fn name(&mut self) -> Result<String, CompileError> {
        match self.peek().clone() {
            Tok::Name(n) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    // ---- statements -------------------------------------------------------

    fn statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), CompileError> {
        let line = self.line();
        let kind = match self.peek() {
            Tok::Kw(Keyword::If) => {
                self.pos += 1;
                self.if_statement()?
            }
            Tok::Kw(Keyword::While) => {
                self.pos += 1;
                let cond = self.expression()?;
                let body = self.block()?;
                StmtKind::While(cond, body)
            }
            Tok::Kw(Keyword::For) => {
                self.pos += 1;
                let target = self.target_list()?;
                if !self.eat_kw(Keyword::In) {
                    return Err(self.error("expected 'in'"));
                }
                let iter = self.expression_list()?;
                let body = self.block()?;
                StmtKind::For(target, iter, body)
            }
            Tok::Indent => return Err(self.error("unexpected indent")),
            _ => return self.simple_statements(out),
        };
        out.push(Stmt { kind, line });
        Ok(())
    }

    fn if_statement(&mut self) -> Result<StmtKind, CompileError> {
        let mut branches = Vec::new();
        let cond = self.expression()?;
        branches.push((cond, self.block()?));
        let mut otherwise = None;
        loop {
            if self.eat_kw(Keyword::Elif) {
                let cond = self.expression()?;
                branches.push((cond, self.block()?));
            } else if self.eat_kw(Keyword::Else) {
                otherwise = Some(self.block()?);
                break;
            } else {
                break;
            }
        }
        Ok(StmtKind::If(branches, otherwise))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect_op(":")?;
        let mut body = Vec::new();
        if self.at(&Tok::Newline) {
            self.pos += 1;
            if !self.at(&Tok::Indent) {
                return Err(self.error("expected an indented block"));
            }
            self.pos += 1;
            while !self.at(&Tok::Dedent) && !self.at(&Tok::Eof) {
                self.statement(&mut body)?;
            }
            if self.at(&Tok::Dedent) {
                self.pos += 1;
            }
        } else {
            self.simple_statements(&mut body)?;
        }
        Ok(body)
    }

    fn simple_statements(&mut self, out: &mut Vec<Stmt>) -> Result<(), CompileError> {
        loop {
            let line = self.line();
            let kind = self.simple_statement()?;
            out.push(Stmt { kind, line });
            if !self.eat_op(";") {
                break;
            }
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
        }
        self.expect_newline()
    }

    fn simple_statement(&mut self) -> Result<StmtKind, CompileError> {
        if self.eat_kw(Keyword::Pass) {
            return Ok(StmtKind::Pass);
        }
        if self.eat_kw(Keyword::Break) {
            return Ok(StmtKind::Break);
        }
        if self.eat_kw(Keyword::Continue) {
            return Ok(StmtKind::Continue);
        }
        if self.eat_kw(Keyword::Return) {
            if self.at_statement_end() {
                return Ok(StmtKind::Return(None));
            }
            return Ok(StmtKind::Return(Some(self.expression_list()?)));
        }
        if self.eat_kw(Keyword::Raise) {
            if self.at_statement_end() {
                return Ok(StmtKind::Raise(None));
            }
            return Ok(StmtKind::Raise(Some(self.expression()?)));
        }

        let first = self.assignment_value()?;
        if let Some(op) = self.augmented_operator() {
            let target = to_target(first).map_err(|m| self.error(m))?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.assignment_value()?;
            return Ok(StmtKind::AugAssign(target, op, value));
        }
        if !self.at_op("=") {
            return Ok(StmtKind::Expr(first));
        }
        let mut exprs = vec![first];
        while self.eat_op("=") {
            exprs.push(self.assignment_value()?);
        }
        let value = exprs.pop().ok_or_else(|| self.unexpected())?;
        let targets = exprs
            .into_iter()
            .map(to_target)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|m| self.error(m))?;
        Ok(StmtKind::Assign(targets, value))
    }

    fn at_statement_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Dedent) || self.at_op(";")
    }

    fn augmented_operator(&mut self) -> Option<BinOp> {
        let op = match self.peek() {
            Tok::Op("+=") => BinOp::Add,
            Tok::Op("-=") => BinOp::Sub,
            Tok::Op("*=") => BinOp::Mul,
            Tok::Op("/=") => BinOp::Div,
            Tok::Op("//=") => BinOp::FloorDiv,
            Tok::Op("%=") => BinOp::Mod,
            Tok::Op("**=") => BinOp::Pow,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    /// Right-hand side of an assignment: a yield or an expression list.
    fn assignment_value(&mut self) -> Result<Expr, CompileError> {
        if self.at_kw(Keyword::Yield) {
            return self.yield_expression();
        }
        self.expression_list()
    }

    fn yield_expression(&mut self) -> Result<Expr, CompileError> {
        self.pos += 1;
        if self.at_statement_end() || self.at_op(")") || self.at_op("=") {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.expression_list()?))))
    }

    /// Loop targets: postfix expressions separated by commas.
    fn target_list(&mut self) -> Result<Target, CompileError> {
        let mut targets = Vec::new();
        let mut trailing_comma;
        loop {
            let expr = self.postfix()?;
            targets.push(to_target(expr).map_err(|m| self.error(m))?);
            trailing_comma = false;
            if !self.eat_op(",") {
                break;
            }
            trailing_comma = true;
            if self.at_kw(Keyword::In) || self.at_op("=") {
                break;
            }
        }
        if targets.len() == 1 && !trailing_comma {
            return targets.pop().ok_or_else(|| self.unexpected());
        }
        Ok(Target::Tuple(targets))
    }

    // ---- expressions ------------------------------------------------------

    /// Comma-separated expressions; more than one (or a trailing comma) is a tuple.
    fn expression_list(&mut self) -> Result<Expr, CompileError> {
        let first = self.expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_statement_end() || self.at_op("=") || self.at_op(")") || self.at_op(":") {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn expression(&mut self) -> Result<Expr, CompileError> {
        let value = self.or_test()?;
        if !self.eat_kw(Keyword::If) {
            return Ok(value);
        }
        let cond = self.or_test()?;
        if !self.eat_kw(Keyword::Else) {
            return Err(self.error("expected 'else' in conditional expression"));
        }
        let otherwise = self.expression()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(value),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_test(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.and_test()?;
        while self.eat_kw(Keyword::Or) {
            let rhs = self.and_test()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn and_test(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.not_test()?;
        while self.eat_kw(Keyword::And) {
            let rhs = self.not_test()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn not_test(&mut self) -> Result<Expr, CompileError> {
        if self.eat_kw(Keyword::Not) {
            let expr = self.not_test()?;
            return Ok(Expr::Not(Box::new(expr)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        loop {
            let (op, width) = match self.peek() {
                Tok::Op("==") => (CmpOp::Eq, 1),
                Tok::Op("!=") => (CmpOp::Ne, 1),
                Tok::Op("<") => (CmpOp::Lt, 1),
                Tok::Op("<=") => (CmpOp::Le, 1),
                Tok::Op(">") => (CmpOp::Gt, 1),
                Tok::Op(">=") => (CmpOp::Ge, 1),
                Tok::Kw(Keyword::In) => (CmpOp::In, 1),
                Tok::Kw(Keyword::Not) if matches!(self.peek_at(1), Tok::Kw(Keyword::In)) => {
                    (CmpOp::NotIn, 2)
                }
                Tok::Kw(Keyword::Is) if matches!(self.peek_at(1), Tok::Kw(Keyword::Not)) => {
                    (CmpOp::IsNot, 2)
                }
                Tok::Kw(Keyword::Is) => (CmpOp::Is, 1),
                _ => break,
            };
            self.pos += width;
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.factor()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, CompileError> {
        if self.eat_op("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.factor()?)));
        }
        if self.eat_op("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.factor()?)));
        }
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let name = self.name()?;
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn call(&mut self, func: Expr) -> Result<Expr, CompileError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat_op(")") {
            if let (Tok::Name(name), Tok::Op("=")) = (self.peek().clone(), self.peek_at(1)) {
                self.pos += 2;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error(format!("keyword argument repeated: {}", name)));
                }
                kwargs.push((name, self.expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.expression()?);
            }
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr, CompileError> {
        let lower = if self.at_op(":") {
            None
        } else {
            Some(self.expression_list()?)
        };
        if !self.eat_op(":") {
            self.expect_op("]")?;
            let index = lower.ok_or_else(|| self.unexpected())?;
            return Ok(Expr::Index(Box::new(value), Box::new(index)));
        }
        let upper = if self.at_op("]") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect_op("]")?;
        Ok(Expr::Slice {
            value: Box::new(value),
            lower: lower.map(Box::new),
            upper,
        })
    }

    fn atom(&mut self) -> Result<Expr, CompileError> {
        let start = self.pos;
        match self.advance() {
            Tok::Name(n) => Ok(Expr::Name(n)),
            Tok::Int(i) => Ok(Expr::Const(Const::Int(i))),
            Tok::Float(f) => Ok(Expr::Const(Const::Float(f))),
            Tok::Str(s) => {
                let mut s = s;
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Const(Const::Str(s)))
            }
            Tok::Kw(Keyword::None) => Ok(Expr::Const(Const::None)),
            Tok::Kw(Keyword::True) => Ok(Expr::Const(Const::Bool(true))),
            Tok::Kw(Keyword::False) => Ok(Expr::Const(Const::Bool(false))),
            Tok::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let expr = if self.at_kw(Keyword::Yield) {
                    self.yield_expression()?
                } else {
                    self.expression_list()?
                };
                self.expect_op(")")?;
                Ok(expr)
            }
            Tok::Op("[") => self.list_display(),
            Tok::Op("{") => self.dict_display(),
            _ => {
                self.pos = start;
                Err(self.unexpected())
            }
        }
    }

    fn list_display(&mut self) -> Result<Expr, CompileError> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat_kw(Keyword::For) {
            let target = self.target_list()?;
            if !self.eat_kw(Keyword::In) {
                return Err(self.error("expected 'in'"));
            }
            let iter = self.or_test()?;
            let mut conditions = Vec::new();
            while self.eat_kw(Keyword::If) {
                conditions.push(self.or_test()?);
            }
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                target,
                iter: Box::new(iter),
                conditions,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> Result<Expr, CompileError> {
        let mut items = Vec::new();
        while !self.eat_op("}") {
            let key = self.expression()?;
            self.expect_op(":")?;
            let value = self.expression()?;
            items.push((key, value));
            if !self.eat_op(",") {
                self.expect_op("}")?;
                break;
            }
        }
        Ok(Expr::Dict(items))
    }
}

fn to_target(expr: Expr) -> Result<Target, String> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
            items.into_iter().map(to_target).collect::<Result<_, _>>()?,
        )),
        Expr::Index(value, index) => Ok(Target::Index(value, index)),
        Expr::Attr(_, name) => Err(format!("cannot assign to attribute '{}'", name)),
        _ => Err("cannot assign to expression".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(source: &str) -> StmtKind {
        let mut body = parse(source).unwrap();
        assert_eq!(body.len(), 1);
        body.remove(0).kind
    }

    #[test]
    fn test_precedence() {
        let StmtKind::Expr(expr) = single("1 + 2 * 3") else {
            panic!("expected expression");
        };
        assert_eq!(
            expr,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Const(Const::Int(1))),
                Box::new(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Const(Const::Int(2))),
                    Box::new(Expr::Const(Const::Int(3)))
                ))
            )
        );
    }

    #[test]
    fn test_tuple_unpacking() {
        let StmtKind::Assign(targets, _) = single("a, b = 1, 2") else {
            panic!("expected assignment");
        };
        assert_eq!(
            targets,
            vec![Target::Tuple(vec![Target::Name("a".into()), Target::Name("b".into())])]
        );
    }

    #[test]
    fn test_keyword_arguments() {
        let StmtKind::Expr(Expr::Call { args, kwargs, .. }) = single("match(offset=2, message='hi')")
        else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert_eq!(kwargs.len(), 2);
        assert!(parse("f(a=1, 2)").is_err());
    }

    #[test]
    fn test_not_in_and_is_not() {
        let StmtKind::Expr(Expr::Compare(_, ops)) = single("a not in b is not c") else {
            panic!("expected comparison");
        };
        let ops: Vec<CmpOp> = ops.into_iter().map(|(op, _)| op).collect();
        assert_eq!(ops, vec![CmpOp::NotIn, CmpOp::IsNot]);
    }

    #[test]
    fn test_compound_statements() {
        let body = parse(
            "for i, x in enumerate(xs):\n    if x:\n        break\n    elif i > 2:\n        continue\n    else:\n        pass\nwhile True: break\n",
        )
        .unwrap();
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0].kind, StmtKind::For(Target::Tuple(_), _, _)));
        assert!(matches!(body[1].kind, StmtKind::While(_, _)));
        assert_eq!(body[1].line, 8);
    }

    #[test]
    fn test_comprehension_and_slices() {
        assert!(matches!(
            single("[x for x in xs if x]"),
            StmtKind::Expr(Expr::ListComp { .. })
        ));
        assert!(matches!(single("s[1:]"), StmtKind::Expr(Expr::Slice { .. })));
    }

    #[test]
    fn test_yield_forms() {
        assert!(matches!(single("yield 100"), StmtKind::Expr(Expr::Yield(Some(_)))));
        assert!(matches!(single("x = yield"), StmtKind::Assign(_, Expr::Yield(None))));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("x = ").is_err());
        assert!(parse("if x\n    y").is_err());
        assert!(parse("p.text = 'a'").is_err());
        assert!(parse("1 = x").is_err());
    }
}
