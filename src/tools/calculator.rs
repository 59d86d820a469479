//! Math toolkit.
//!
//! Provides `calculator` (arithmetic expressions over `+ - * / ( )`) and
//! `random_number`.

use std::fmt;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::{parse_args, Tool, ToolRegistry};

const ALLOWED_CHARS: &str = "0123456789+-*/.() ";
/// Nesting allowed for parentheses, unary signs and `**` chains.
const MAX_DEPTH: usize = 200;

/// Create the math toolkit with the calculator and random number tools
pub fn math_toolkit() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool);
    registry.register(RandomNumberTool);
    registry
}

struct CalculatorTool;

#[derive(Deserialize)]
struct CalculatorArgs {
    expression: String,
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate mathematical expressions safely, e.g. \"2+2\" or \"10*5+3\"."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., \"2+2\", \"10*5+3\")"
                }
            },
            "required": ["expression"]
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: CalculatorArgs = parse_args(self.name(), input)?;
        Ok(Value::String(calculate(&args.expression)))
    }
}

/// Evaluate `expression` and render the reply the model sees.
pub fn calculate(expression: &str) -> String {
    if !expression.chars().all(|c| ALLOWED_CHARS.contains(c)) {
        return "Error: Only basic math operations (+, -, *, /, parentheses) are allowed".into();
    }

    match evaluate(expression) {
        Ok(value) => format!("The result of '{expression}' is: {value}"),
        Err(err) => format!("Error calculating '{expression}': {err}"),
    }
}

/// Integers stay integers until true division or a decimal literal is involved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

/// Shortest round-trip form, with exponents written as `e+16` / `e-05`.
fn format_float(v: f64) -> String {
    let repr = format!("{v:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Integer result when it fits in `i64`, otherwise the float approximation.
fn int_or_float(exact: Option<i64>, approx: f64) -> std::result::Result<Number, EvalError> {
    match exact {
        Some(v) => Ok(Number::Int(v)),
        None if approx.is_finite() => Ok(Number::Float(approx)),
        None => Err(EvalError::Overflow),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Syntax,
    DivisionByZero,
    Overflow,
    TooDeep,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Syntax => f.write_str("invalid syntax"),
            EvalError::DivisionByZero => f.write_str("division by zero"),
            EvalError::Overflow => f.write_str("result too large"),
            EvalError::TooDeep => write!(f, "expression nested deeper than {MAX_DEPTH} levels"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Power,
    Slash,
    FloorDiv,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> std::result::Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = expression.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::FloorDiv);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_literal(&literal)?));
            }
            _ => return Err(EvalError::Syntax),
        }
    }

    Ok(tokens)
}

fn parse_literal(literal: &str) -> std::result::Result<Number, EvalError> {
    if literal.contains('.') {
        if literal == "." || literal.matches('.').count() > 1 {
            return Err(EvalError::Syntax);
        }
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| EvalError::Syntax)
    } else {
        match literal.parse::<i64>() {
            Ok(v) => Ok(Number::Int(v)),
            Err(_) => literal
                .parse::<f64>()
                .map_err(|_| EvalError::Syntax)
                .and_then(|v| int_or_float(None, v)),
        }
    }
}

/// Evaluate an arithmetic expression with the usual precedence: `**`
/// (right-associative) binds tighter than unary signs, which bind tighter
/// than `* / //`, which bind tighter than `+ -`.
pub fn evaluate(expression: &str) -> std::result::Result<Number, EvalError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::Syntax);
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> std::result::Result<T, EvalError>,
    ) -> std::result::Result<T, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> std::result::Result<Number, EvalError> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus {
                add(value, rhs)?
            } else {
                sub(value, rhs)?
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<Number, EvalError> {
        let mut value = self.factor()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::FloorDiv)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = match op {
                Token::Star => mul(value, rhs)?,
                Token::Slash => div(value, rhs)?,
                _ => floor_div(value, rhs)?,
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> std::result::Result<Number, EvalError> {
        self.nested(|parser| match parser.peek() {
            Some(Token::Plus) => {
                parser.pos += 1;
                parser.factor()
            }
            Some(Token::Minus) => {
                parser.pos += 1;
                match parser.factor()? {
                    Number::Int(v) => int_or_float(v.checked_neg(), -(v as f64)),
                    Number::Float(v) => Ok(Number::Float(-v)),
                }
            }
            _ => parser.power(),
        })
    }

    fn power(&mut self) -> std::result::Result<Number, EvalError> {
        let base = self.primary()?;
        if self.peek() == Some(Token::Power) {
            self.pos += 1;
            let exponent = self.factor()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> std::result::Result<Number, EvalError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::Syntax),
                }
            }
            _ => Err(EvalError::Syntax),
        }
    }
}

fn int_op(
    a: Number,
    b: Number,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> std::result::Result<Number, EvalError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => int_or_float(checked(x, y), float(x as f64, y as f64)),
        _ => Ok(Number::Float(float(a.as_f64(), b.as_f64()))),
    }
}

fn add(a: Number, b: Number) -> std::result::Result<Number, EvalError> {
    int_op(a, b, i64::checked_add, |x, y| x + y)
}

fn sub(a: Number, b: Number) -> std::result::Result<Number, EvalError> {
    int_op(a, b, i64::checked_sub, |x, y| x - y)
}

fn mul(a: Number, b: Number) -> std::result::Result<Number, EvalError> {
    int_op(a, b, i64::checked_mul, |x, y| x * y)
}

fn div(a: Number, b: Number) -> std::result::Result<Number, EvalError> {
    if b.as_f64() == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

fn floor_div(a: Number, b: Number) -> std::result::Result<Number, EvalError> {
    if b.as_f64() == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => {
            let Some(q) = x.checked_div(y) else {
                return int_or_float(None, (x as f64 / y as f64).floor());
            };
            let floored = if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q };
            Ok(Number::Int(floored))
        }
        _ => Ok(Number::Float((a.as_f64() / b.as_f64()).floor())),
    }
}

fn pow(base: Number, exponent: Number) -> std::result::Result<Number, EvalError> {
    match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let exact = u32::try_from(e).ok().and_then(|e| b.checked_pow(e));
            int_or_float(exact, (b as f64).powf(e as f64))
        }
        _ => {
            if base.as_f64() == 0.0 && exponent.as_f64() < 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            int_or_float(None, base.as_f64().powf(exponent.as_f64()))
        }
    }
}

struct RandomNumberTool;

#[derive(Deserialize)]
struct RandomNumberArgs {
    #[serde(default = "default_min")]
    min_val: i64,
    #[serde(default = "default_max")]
    max_val: i64,
}

fn default_min() -> i64 {
    1
}

fn default_max() -> i64 {
    100
}

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "random_number"
    }

    fn description(&self) -> &str {
        "Generate a random integer within a range (inclusive). Defaults to 1..100."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "min_val": { "type": "integer", "description": "Minimum value (default: 1)" },
                "max_val": { "type": "integer", "description": "Maximum value (default: 100)" }
            }
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let args: RandomNumberArgs = parse_args(self.name(), input)?;
        if args.min_val >= args.max_val {
            return Ok(json!("Error: min_val must be less than max_val"));
        }

        let number = rand::thread_rng().gen_range(args.min_val..=args.max_val);
        Ok(Value::String(format!(
            "Random number between {} and {}: {number}",
            args.min_val, args.max_val
        )))
    }
}
