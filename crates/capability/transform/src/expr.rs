//! 算术表达式：数字、变量、`+ - * / % ^`、括号与少量数学函数。
//!
//! 整数参与 `+ - * % ^` 时保持整数（溢出时提升为浮点）；`/` 总是得到浮点。

use std::collections::HashMap;
use std::fmt;

/// 表达式错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("invalid expression {expr} at offset {offset}: {reason}")]
    Syntax {
        expr: String,
        offset: usize,
        reason: String,
    },
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("function {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

/// 表达式求值中的数值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(v) => v == 0,
            Self::Float(v) => v == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Rem => 2,
            Self::Pow => 4,
        }
    }
}

const UNARY_PRECEDENCE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Abs,
    Round,
    Floor,
    Ceil,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        let func = match name {
            "abs" => Self::Abs,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        };
        Some(func)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    fn check_arity(self, got: usize) -> Result<(), ExprError> {
        let (ok, expected) = match self {
            Self::Round | Self::Log => ((1..=2).contains(&got), "1 or 2"),
            Self::Min | Self::Max => (got >= 1, "at least 1"),
            _ => (got == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ExprError::Arity {
                name: self.name(),
                expected,
                got,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(Number),
    Var(String),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

/// 已解析的算术表达式。
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    variables: Vec<String>,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let source = input.trim().to_string();
        let tokens = tokenize(&source)?;
        let mut parser = Parser {
            source: &source,
            tokens,
            pos: 0,
        };
        let root = parser.expression(0)?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(ExprError::Syntax {
                expr: source.clone(),
                offset: *offset,
                reason: format!("unexpected {}", token),
            });
        }

        let mut variables = Vec::new();
        collect_variables(&root, &mut variables);
        Ok(Self {
            source,
            root,
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 表达式引用的变量名（按出现顺序去重）。
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn evaluate(&self, vars: &HashMap<String, Number>) -> Result<Number, ExprError> {
        let result = eval(&self.root, vars)?;
        match result {
            Number::Float(v) if !v.is_finite() => Err(ExprError::NonFinite),
            other => Ok(other),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_variables(node: &Node, out: &mut Vec<String>) {
    match node {
        Node::Num(_) => {}
        Node::Var(name) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        Node::Neg(inner) => collect_variables(inner, out),
        Node::Binary(_, lhs, rhs) => {
            collect_variables(lhs, out);
            collect_variables(rhs, out);
        }
        Node::Call(_, args) => args.iter().for_each(|arg| collect_variables(arg, out)),
    }
}

fn eval(node: &Node, vars: &HashMap<String, Number>) -> Result<Number, ExprError> {
    match node {
        Node::Num(n) => Ok(*n),
        Node::Var(name) => vars
            .get(name)
            .copied()
            .ok_or_else(|| ExprError::UnboundVariable(name.clone())),
        Node::Neg(inner) => Ok(match eval(inner, vars)? {
            Number::Int(v) => v
                .checked_neg()
                .map(Number::Int)
                .unwrap_or(Number::Float(-(v as f64))),
            Number::Float(v) => Number::Float(-v),
        }),
        Node::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, vars)?;
            let rhs = eval(rhs, vars)?;
            apply_binary(*op, lhs, rhs)
        }
        Node::Call(func, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, vars))
                .collect::<Result<Vec<_>, _>>()?;
            apply_func(*func, &args)
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: Number, rhs: Number) -> Result<Number, ExprError> {
    use Number::{Float, Int};

    let int_or = |checked: Option<i64>, fallback: f64| checked.map(Int).unwrap_or(Float(fallback));
    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    let result = match (op, lhs, rhs) {
        (BinaryOp::Add, Int(x), Int(y)) => int_or(x.checked_add(y), a + b),
        (BinaryOp::Sub, Int(x), Int(y)) => int_or(x.checked_sub(y), a - b),
        (BinaryOp::Mul, Int(x), Int(y)) => int_or(x.checked_mul(y), a * b),
        (BinaryOp::Add, _, _) => Float(a + b),
        (BinaryOp::Sub, _, _) => Float(a - b),
        (BinaryOp::Mul, _, _) => Float(a * b),
        (BinaryOp::Div, _, _) => {
            if rhs.is_zero() {
                return Err(ExprError::DivisionByZero);
            }
            Float(a / b)
        }
        (BinaryOp::Rem, _, _) if rhs.is_zero() => return Err(ExprError::DivisionByZero),
        (BinaryOp::Rem, Int(x), Int(y)) => match x.checked_rem(y) {
            Some(r) if r != 0 && (r < 0) != (y < 0) => Int(r + y),
            Some(r) => Int(r),
            None => Float(floored_rem(a, b)),
        },
        (BinaryOp::Rem, _, _) => Float(floored_rem(a, b)),
        (BinaryOp::Pow, Int(x), Int(y)) if y >= 0 => int_or(
            u32::try_from(y).ok().and_then(|exp| x.checked_pow(exp)),
            a.powf(b),
        ),
        (BinaryOp::Pow, _, _) => Float(a.powf(b)),
    };
    Ok(result)
}

/// 余数符号跟随除数。
fn floored_rem(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn float_to_int(v: f64) -> Number {
    if v.is_finite() && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Number::Int(v as i64)
    } else {
        Number::Float(v)
    }
}

fn apply_func(func: Func, args: &[Number]) -> Result<Number, ExprError> {
    func.check_arity(args.len())?;
    let x = args[0];
    let result = match func {
        Func::Abs => match x {
            Number::Int(v) => v
                .checked_abs()
                .map(Number::Int)
                .unwrap_or(Number::Float((v as f64).abs())),
            Number::Float(v) => Number::Float(v.abs()),
        },
        Func::Round => match (x, args.get(1)) {
            (Number::Int(v), None) => Number::Int(v),
            (_, None) => float_to_int(x.as_f64().round_ties_even()),
            (_, Some(digits)) => {
                let scale = 10f64.powf(digits.as_f64().trunc());
                Number::Float((x.as_f64() * scale).round_ties_even() / scale)
            }
        },
        Func::Floor => match x {
            Number::Int(v) => Number::Int(v),
            Number::Float(v) => float_to_int(v.floor()),
        },
        Func::Ceil => match x {
            Number::Int(v) => Number::Int(v),
            Number::Float(v) => float_to_int(v.ceil()),
        },
        Func::Sqrt => Number::Float(x.as_f64().sqrt()),
        Func::Exp => Number::Float(x.as_f64().exp()),
        Func::Log => match args.get(1) {
            None => Number::Float(x.as_f64().ln()),
            Some(base) => Number::Float(x.as_f64().ln() / base.as_f64().ln()),
        },
        Func::Sin => Number::Float(x.as_f64().sin()),
        Func::Cos => Number::Float(x.as_f64().cos()),
        Func::Tan => Number::Float(x.as_f64().tan()),
        Func::Min => args
            .iter()
            .copied()
            .fold(x, |acc, n| if n.as_f64() < acc.as_f64() { n } else { acc }),
        Func::Max => args
            .iter()
            .copied()
            .fold(x, |acc, n| if n.as_f64() > acc.as_f64() { n } else { acc }),
    };
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "number {}", n),
            Self::Ident(name) => write!(f, "identifier {}", name),
            Self::Op(op) => write!(f, "'{}'", op),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let syntax = |offset: usize, reason: String| ExprError::Syntax {
        expr: source.to_string(),
        offset,
        reason,
    };

    let chars = source.char_indices().collect::<Vec<_>>();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let end = chars.get(i).map(|(o, _)| *o).unwrap_or(source.len());
            let text = &source[offset..end];
            let number = if text.contains(['.', 'e', 'E']) {
                text.parse::<f64>().map(Number::Float).ok()
            } else {
                text.parse::<i64>()
                    .map(Number::Int)
                    .or_else(|_| text.parse::<f64>().map(Number::Float))
                    .ok()
            };
            let number =
                number.ok_or_else(|| syntax(chars[start].0, format!("invalid number {}", text)))?;
            tokens.push((offset, Token::Num(number)));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let mut name = String::new();
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                name.push(chars[i].1);
                i += 1;
            }
            tokens.push((offset, Token::Ident(name)));
            continue;
        }
        let token = match c {
            '+' | '-' | '*' | '/' | '%' | '^' => Token::Op(c),
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => return Err(syntax(offset, format!("unexpected character '{}'", other))),
        };
        tokens.push((offset, token));
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn expression(&mut self, min_precedence: u8) -> Result<Node, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_binary() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            // `^` 右结合
            let next_min = if op == BinaryOp::Pow {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.expression(next_min)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                let operand = self.expression(UNARY_PRECEDENCE)?;
                Ok(Node::Neg(Box::new(operand)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.expression(UNARY_PRECEDENCE)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        let Some((offset, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error(self.source.len(), "unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(Node::Num(n)),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let func = Func::lookup(&name).ok_or(ExprError::UnknownFunction(name))?;
                    let args = self.arguments()?;
                    func.check_arity(args.len())?;
                    return Ok(Node::Call(func, args));
                }
                Ok(match name.as_str() {
                    "PI" => Node::Num(Number::Float(std::f64::consts::PI)),
                    "E" => Node::Num(Number::Float(std::f64::consts::E)),
                    _ => Node::Var(name),
                })
            }
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(self.error(offset, &format!("unexpected {}", other))),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Node>, ExprError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                _ => break,
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.tokens.get(self.pos) {
            Some((_, token)) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some((offset, token)) => {
                Err(self.error(*offset, &format!("expected {}, found {}", expected, token)))
            }
            None => Err(self.error(self.source.len(), &format!("expected {}", expected))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn peek_binary(&self) -> Option<BinaryOp> {
        match self.peek()? {
            Token::Op('+') => Some(BinaryOp::Add),
            Token::Op('-') => Some(BinaryOp::Sub),
            Token::Op('*') => Some(BinaryOp::Mul),
            Token::Op('/') => Some(BinaryOp::Div),
            Token::Op('%') => Some(BinaryOp::Rem),
            Token::Op('^') => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    fn error(&self, offset: usize, reason: &str) -> ExprError {
        ExprError::Syntax {
            expr: self.source.to_string(),
            offset,
            reason: reason.to_string(),
        }
    }
}
