//! Score-function expressions.
//!
//! Rules carry a formula (e.g. `1000 * apples - 50 * frame`) that turns the
//! JSON outcard emitted by a cartridge into a single score. The language
//! follows the expr-eval dialect used by rule authors: arithmetic, comparisons,
//! `and`/`or`/`not`, `x in [..]`, the ternary, postfix `!`, string and array
//! literals, and prefix math functions (`sqrt x` or `sqrt(x)`).

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::DomainError;
use crate::outcard::Outcard;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    /// Identifier with optional member access, e.g. `player.lives`.
    Path(Vec<String>),
    Op(Op),
    Not,
    Bang,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Question,
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    In,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Ceil,
    Floor,
    Round,
    Trunc,
    Sign,
    Sqrt,
    Cbrt,
    Exp,
    Expm1,
    Ln,
    Log2,
    Log10,
    Log1p,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Fac,
    Length,
    Min,
    Max,
    Hypot,
    Pow,
    Atan2,
    RoundTo,
    If,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "ceil" => Func::Ceil,
            "floor" => Func::Floor,
            "round" => Func::Round,
            "trunc" => Func::Trunc,
            "sign" => Func::Sign,
            "sqrt" => Func::Sqrt,
            "cbrt" => Func::Cbrt,
            "exp" => Func::Exp,
            "expm1" => Func::Expm1,
            "log" | "ln" => Func::Ln,
            "log2" => Func::Log2,
            "log10" | "lg" => Func::Log10,
            "log1p" => Func::Log1p,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "asinh" => Func::Asinh,
            "acosh" => Func::Acosh,
            "atanh" => Func::Atanh,
            "fac" => Func::Fac,
            "length" => Func::Length,
            "min" => Func::Min,
            "max" => Func::Max,
            "hypot" | "pyt" => Func::Hypot,
            "pow" => Func::Pow,
            "atan2" => Func::Atan2,
            "roundTo" => Func::RoundTo,
            "if" => Func::If,
            _ => return None,
        })
    }

    /// Single-argument functions, which may also be applied without parentheses.
    fn is_prefix(self) -> bool {
        !matches!(
            self,
            Func::Min | Func::Max | Func::Hypot | Func::Pow | Func::Atan2 | Func::RoundTo | Func::If
        )
    }

    fn arity_ok(self, args: usize) -> bool {
        match self {
            Func::Min | Func::Max | Func::Hypot => args >= 1,
            Func::Pow | Func::Atan2 => args == 2,
            Func::RoundTo => args == 1 || args == 2,
            Func::If => args == 3,
            _ => args == 1,
        }
    }
}

fn constant(name: &str) -> Option<Expr> {
    Some(match name {
        "PI" => Expr::Number(std::f64::consts::PI),
        "E" => Expr::Number(std::f64::consts::E),
        "true" => Expr::Number(1.0),
        "false" => Expr::Number(0.0),
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Str(String),
    List(Vec<Expr>),
    Var(Vec<String>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Factorial(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

/// A parsed score expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreFunction {
    source: String,
    expr: Expr,
}

impl ScoreFunction {
    pub fn parse(source: &str) -> Result<Self, DomainError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.conditional()?;
        if let Some((position, token)) = parser.peek_positioned() {
            return Err(DomainError::ScoreParse {
                position,
                message: format!("unexpected token {:?}", token),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Parses `source` unless it is empty or whitespace.
    pub fn parse_optional(source: Option<&str>) -> Result<Option<Self>, DomainError> {
        match source.map(str::trim) {
            Some(s) if !s.is_empty() => Self::parse(s).map(Some),
            _ => Ok(None),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against the fields of a JSON outcard. The result must be a
    /// finite number.
    pub fn evaluate(&self, vars: &Value) -> Result<f64, DomainError> {
        let value = eval(&self.expr, vars)?.number()?;
        if !value.is_finite() {
            return Err(DomainError::ScoreEval(format!(
                "`{}` produced a non-finite value",
                self.source
            )));
        }
        Ok(value)
    }
}

impl FromStr for ScoreFunction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScoreFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Score of a frame or finished session.
///
/// With a score function the function is evaluated against the JSON outcard;
/// otherwise the outcard's `score` field is used. Non-JSON outcards and a
/// missing `score` field give no score.
pub fn compute_score(
    function: Option<&ScoreFunction>,
    outcard: &Outcard,
) -> Result<Option<i64>, DomainError> {
    let Some(json) = outcard.as_json() else {
        return Ok(None);
    };
    match function {
        Some(function) => function.evaluate(json).map(|v| Some(v.trunc() as i64)),
        None => Ok(json.get("score").and_then(Value::as_f64).map(|v| v.trunc() as i64)),
    }
}

fn parse_error(position: usize, message: impl Into<String>) -> DomainError {
    DomainError::ScoreParse {
        position,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, DomainError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse::<f64>()
                .map_err(|_| parse_error(start, format!("invalid number `{}`", text)))?;
            tokens.push((start, Token::Number(number)));
            continue;
        }

        if c == '"' || c == '\'' {
            i += 1;
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None => return Err(parse_error(start, "unterminated string")),
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars
                            .get(i + 1)
                            .ok_or_else(|| parse_error(i, "unterminated string"))?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some(other) => {
                        text.push(*other);
                        i += 1;
                    }
                }
            }
            tokens.push((start, Token::Str(text)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut path: Vec<String> = Vec::new();
            loop {
                let seg_start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if seg_start == i {
                    return Err(parse_error(i, "expected field name after `.`"));
                }
                path.push(chars[seg_start..i].iter().collect());
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                } else {
                    break;
                }
            }
            let token = match path.as_slice() {
                [word] if word == "and" => Token::Op(Op::And),
                [word] if word == "or" => Token::Op(Op::Or),
                [word] if word == "in" => Token::Op(Op::In),
                [word] if word == "not" => Token::Not,
                _ => Token::Path(path),
            };
            tokens.push((start, token));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('<', Some('=')) => (Token::Op(Op::Le), 2),
            ('>', Some('=')) => (Token::Op(Op::Ge), 2),
            ('=', Some('=')) => (Token::Op(Op::Eq), 2),
            ('!', Some('=')) => (Token::Op(Op::Ne), 2),
            ('|', Some('|')) => (Token::Op(Op::Concat), 2),
            ('<', _) => (Token::Op(Op::Lt), 1),
            ('>', _) => (Token::Op(Op::Gt), 1),
            ('+', _) => (Token::Op(Op::Add), 1),
            ('-', _) => (Token::Op(Op::Sub), 1),
            ('*', _) => (Token::Op(Op::Mul), 1),
            ('/', _) => (Token::Op(Op::Div), 1),
            ('%', _) => (Token::Op(Op::Rem), 1),
            ('^', _) => (Token::Op(Op::Pow), 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            _ => return Err(parse_error(start, format!("unexpected character `{}`", c))),
        };
        tokens.push((start, token));
        i += width;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, t)| t)
    }

    fn peek_positioned(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(p, t)| (*p, t))
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(p, _)| *p)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek().cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> DomainError {
        parse_error(self.position(), message)
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), DomainError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[Op],
        next: fn(&mut Self) -> Result<Expr, DomainError>,
    ) -> Result<Expr, DomainError> {
        let mut left = next(self)?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            if !ops.contains(&op) {
                break;
            }
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn conditional(&mut self) -> Result<Expr, DomainError> {
        let condition = self.or()?;
        if self.peek() == Some(&Token::Question) {
            self.pos += 1;
            let then = self.conditional()?;
            self.expect(Token::Colon, "`:`")?;
            let otherwise = self.conditional()?;
            return Ok(Expr::Conditional(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(condition)
    }

    fn or(&mut self) -> Result<Expr, DomainError> {
        self.binary_level(&[Op::Or], Self::and)
    }

    fn and(&mut self) -> Result<Expr, DomainError> {
        self.binary_level(&[Op::And], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, DomainError> {
        self.binary_level(
            &[Op::Lt, Op::Le, Op::Gt, Op::Ge, Op::Eq, Op::Ne, Op::In],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, DomainError> {
        self.binary_level(&[Op::Add, Op::Sub, Op::Concat], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, DomainError> {
        self.binary_level(&[Op::Mul, Op::Div, Op::Rem], Self::unary)
    }

    // Prefix operators bind looser than `^`, so `-2^2` is -4 and `sqrt 4^2` is 4.
    fn unary(&mut self) -> Result<Expr, DomainError> {
        match self.peek() {
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            _ => match self.prefix_function() {
                Some(func) => {
                    self.pos += 1;
                    Ok(Expr::Call(func, vec![self.unary()?]))
                }
                None => self.power(),
            },
        }
    }

    /// A one-argument function name directly followed by its operand.
    fn prefix_function(&self) -> Option<Func> {
        let Some(Token::Path(path)) = self.peek() else {
            return None;
        };
        let [name] = path.as_slice() else {
            return None;
        };
        let func = Func::lookup(name).filter(|f| f.is_prefix())?;
        self.peek_at(1).filter(|next| starts_operand(next)).map(|_| func)
    }

    fn power(&mut self) -> Result<Expr, DomainError> {
        let base = self.postfix()?;
        if self.peek() == Some(&Token::Op(Op::Pow)) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(Op::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, DomainError> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Token::Bang) {
            self.pos += 1;
            expr = Expr::Factorial(Box::new(expr));
        }
        Ok(expr)
    }

    fn list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>, DomainError> {
        let mut items = Vec::new();
        if self.peek() != Some(&close) {
            loop {
                items.push(self.conditional()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, DomainError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.conditional()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::LBracket) => Ok(Expr::List(self.list(Token::RBracket, "`]`")?)),
            Some(Token::Path(path)) => {
                if self.peek() != Some(&Token::LParen) {
                    if let [name] = path.as_slice() {
                        if let Some(value) = constant(name) {
                            return Ok(value);
                        }
                    }
                    return Ok(Expr::Var(path));
                }
                let name = path.join(".");
                let func = Func::lookup(&name).ok_or_else(|| {
                    parse_error(self.tokens[self.pos - 1].0, format!("unknown function `{}`", name))
                })?;
                self.pos += 1;
                let args = self.list(Token::RParen, "`)`")?;
                if !func.arity_ok(args.len()) {
                    return Err(self.error(format!("wrong number of arguments for `{}`", name)));
                }
                Ok(Expr::Call(func, args))
            }
            Some(token) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected token {:?}", token)))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn starts_operand(token: &Token) -> bool {
    matches!(
        token,
        Token::Number(_) | Token::Str(_) | Token::Path(_) | Token::LBracket | Token::Not
    )
}

/// Runtime value of a sub-expression.
#[derive(Debug, Clone, PartialEq)]
enum Val {
    Num(f64),
    Str(String),
    List(Vec<Val>),
}

impl Val {
    fn number(self) -> Result<f64, DomainError> {
        match self {
            Val::Num(n) => Ok(n),
            other => Err(DomainError::ScoreEval(format!("{} is not a number", other.describe()))),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            Val::List(items) => !items.is_empty(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Val::Num(n) => n.to_string(),
            Val::Str(s) => format!("\"{}\"", s),
            Val::List(items) => format!("array of {}", items.len()),
        }
    }

    fn from_json(value: &Value, name: &str) -> Result<Self, DomainError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(Val::Num)
                .ok_or_else(|| DomainError::ScoreEval(format!("`{}` is not a number", name))),
            Value::Bool(b) => Ok(Val::Num(truth(*b))),
            Value::String(s) => Ok(Val::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| Val::from_json(item, name))
                .collect::<Result<_, _>>()
                .map(Val::List),
            Value::Null | Value::Object(_) => {
                Err(DomainError::ScoreEval(format!("`{}` is not a value", name)))
            }
        }
    }
}

fn lookup(vars: &Value, path: &[String]) -> Result<Val, DomainError> {
    let name = path.join(".");
    let mut current = vars;
    for segment in path {
        current = current
            .get(segment)
            .ok_or_else(|| DomainError::ScoreEval(format!("unknown variable `{}`", name)))?;
    }
    Val::from_json(current, &name)
}

fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn factorial(n: f64) -> Result<f64, DomainError> {
    if n < 0.0 || n.fract() != 0.0 {
        return Err(DomainError::ScoreEval(format!(
            "factorial of {} is undefined",
            n
        )));
    }
    // Past 170! the product is infinite; the caller rejects non-finite results.
    Ok((2..=(n.min(171.0) as u64)).fold(1.0, |acc, k| acc * k as f64))
}

fn compare(op: Op, a: Val, b: Val) -> Result<bool, DomainError> {
    match op {
        Op::Eq => return Ok(a == b),
        Op::Ne => return Ok(a != b),
        Op::In => {
            return match b {
                Val::List(items) => Ok(items.contains(&a)),
                other => Err(DomainError::ScoreEval(format!(
                    "`in` needs an array, got {}",
                    other.describe()
                ))),
            };
        }
        _ => {}
    }
    let ordering = match (&a, &b) {
        (Val::Num(x), Val::Num(y)) => x.partial_cmp(y),
        (Val::Str(x), Val::Str(y)) => Some(x.cmp(y)),
        _ => {
            return Err(DomainError::ScoreEval(format!(
                "cannot compare {} with {}",
                a.describe(),
                b.describe()
            )));
        }
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        Op::Lt => ordering.is_lt(),
        Op::Le => ordering.is_le(),
        Op::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}

fn eval(expr: &Expr, vars: &Value) -> Result<Val, DomainError> {
    match expr {
        Expr::Number(n) => Ok(Val::Num(*n)),
        Expr::Str(s) => Ok(Val::Str(s.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, vars))
            .collect::<Result<_, _>>()
            .map(Val::List),
        Expr::Var(path) => lookup(vars, path),
        Expr::Neg(inner) => Ok(Val::Num(-eval(inner, vars)?.number()?)),
        Expr::Not(inner) => Ok(Val::Num(truth(!eval(inner, vars)?.truthy()))),
        Expr::Factorial(inner) => factorial(eval(inner, vars)?.number()?).map(Val::Num),
        Expr::Conditional(condition, then, otherwise) => {
            if eval(condition, vars)?.truthy() {
                eval(then, vars)
            } else {
                eval(otherwise, vars)
            }
        }
        Expr::Binary(Op::And, left, right) => {
            let value = eval(left, vars)?.truthy() && eval(right, vars)?.truthy();
            Ok(Val::Num(truth(value)))
        }
        Expr::Binary(Op::Or, left, right) => {
            let value = eval(left, vars)?.truthy() || eval(right, vars)?.truthy();
            Ok(Val::Num(truth(value)))
        }
        Expr::Binary(op, left, right) => {
            let a = eval(left, vars)?;
            let b = eval(right, vars)?;
            match op {
                Op::Lt | Op::Le | Op::Gt | Op::Ge | Op::Eq | Op::Ne | Op::In => {
                    compare(*op, a, b).map(|v| Val::Num(truth(v)))
                }
                Op::Concat => match (a, b) {
                    (Val::Str(x), Val::Str(y)) => Ok(Val::Str(x + &y)),
                    (Val::List(mut x), Val::List(y)) => {
                        x.extend(y);
                        Ok(Val::List(x))
                    }
                    (a, b) => Err(DomainError::ScoreEval(format!(
                        "cannot concatenate {} and {}",
                        a.describe(),
                        b.describe()
                    ))),
                },
                _ => {
                    let (a, b) = (a.number()?, b.number()?);
                    Ok(Val::Num(match op {
                        Op::Add => a + b,
                        Op::Sub => a - b,
                        Op::Mul => a * b,
                        Op::Div | Op::Rem if b == 0.0 => {
                            return Err(DomainError::ScoreEval("division by zero".into()));
                        }
                        Op::Div => a / b,
                        Op::Rem => a % b,
                        _ => a.powf(b),
                    }))
                }
            }
        }
        Expr::Call(Func::If, args) => {
            if eval(&args[0], vars)?.truthy() {
                eval(&args[1], vars)
            } else {
                eval(&args[2], vars)
            }
        }
        Expr::Call(func, args) => {
            let values = args
                .iter()
                .map(|arg| eval(arg, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(*func, values).map(Val::Num)
        }
    }
}

fn call(func: Func, mut values: Vec<Val>) -> Result<f64, DomainError> {
    if func == Func::Length {
        return match values.remove(0) {
            Val::Str(s) => Ok(s.chars().count() as f64),
            Val::List(items) => Ok(items.len() as f64),
            Val::Num(n) => Ok(n.to_string().len() as f64),
        };
    }
    // `min([a, b])` spreads a single array argument.
    if matches!(func, Func::Min | Func::Max | Func::Hypot) && values.len() == 1 {
        if let Val::List(items) = &values[0] {
            values = items.clone();
        }
    }
    let numbers = values
        .into_iter()
        .map(Val::number)
        .collect::<Result<Vec<_>, _>>()?;
    let x = numbers.first().copied().unwrap_or(f64::NAN);
    Ok(match func {
        Func::Abs => x.abs(),
        Func::Ceil => x.ceil(),
        Func::Floor => x.floor(),
        Func::Round => x.round(),
        Func::Trunc => x.trunc(),
        Func::Sign => {
            if x == 0.0 { 0.0 } else { x.signum() }
        }
        Func::Sqrt => x.sqrt(),
        Func::Cbrt => x.cbrt(),
        Func::Exp => x.exp(),
        Func::Expm1 => x.exp_m1(),
        Func::Ln => x.ln(),
        Func::Log2 => x.log2(),
        Func::Log10 => x.log10(),
        Func::Log1p => x.ln_1p(),
        Func::Sin => x.sin(),
        Func::Cos => x.cos(),
        Func::Tan => x.tan(),
        Func::Asin => x.asin(),
        Func::Acos => x.acos(),
        Func::Atan => x.atan(),
        Func::Sinh => x.sinh(),
        Func::Cosh => x.cosh(),
        Func::Tanh => x.tanh(),
        Func::Asinh => x.asinh(),
        Func::Acosh => x.acosh(),
        Func::Atanh => x.atanh(),
        Func::Fac => factorial(x)?,
        Func::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        Func::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Func::Hypot => numbers.iter().map(|n| n * n).sum::<f64>().sqrt(),
        Func::Pow => x.powf(numbers[1]),
        Func::Atan2 => x.atan2(numbers[1]),
        Func::RoundTo => {
            let scale = 10f64.powf(numbers.get(1).copied().unwrap_or(0.0));
            (x * scale).round() / scale
        }
        Func::Length | Func::If => {
            return Err(DomainError::ScoreEval(format!("{:?} is not numeric", func)));
        }
    })
}
