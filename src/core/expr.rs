// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Expression evaluation.
//!
//! Expressions are evaluated straight from operand text with a small
//! precedence-climbing parser. Symbols are resolved through an
//! [`EvalContext`]; an unresolved name yields [`EvalError::Undefined`] and the
//! caller decides whether that is an error in the current pass.

use thiserror::Error;

use crate::core::text_utils::{is_ident_char, is_ident_start, unescape, Cursor};

/// Error returned from expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Found no label/variable/constant named {0}")]
    Undefined(String),
    #[error("{0}")]
    Syntax(String),
    #[error("Division by zero")]
    DivisionByZero,
}

impl EvalError {
    fn syntax(message: impl Into<String>) -> Self {
        EvalError::Syntax(message.into())
    }
}

/// Context for expression evaluation.
///
/// Provides symbol values and the current location counter (`PC`).
pub trait EvalContext {
    /// Look up a symbol's value by name.
    fn lookup_symbol(&self, name: &str) -> Option<i64>;

    /// Get the current address (`PC`).
    fn current_address(&self) -> Option<i64>;

    /// Whether `name` is known, used by `DEFINED(name)`.
    fn is_defined(&self, name: &str) -> bool {
        self.lookup_symbol(name).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    LogicNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    LogicOr,
    LogicAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::LogicOr => 1,
            BinaryOp::LogicAnd => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Subtract => 9,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Mod => 10,
        }
    }
}

const OPERATORS: &[(&str, BinaryOp)] = &[
    ("||", BinaryOp::LogicOr),
    ("&&", BinaryOp::LogicAnd),
    ("==", BinaryOp::Eq),
    ("!=", BinaryOp::Ne),
    ("<=", BinaryOp::Le),
    (">=", BinaryOp::Ge),
    ("<<", BinaryOp::Shl),
    (">>", BinaryOp::Shr),
    ("|", BinaryOp::BitOr),
    ("^", BinaryOp::BitXor),
    ("&", BinaryOp::BitAnd),
    ("<", BinaryOp::Lt),
    (">", BinaryOp::Gt),
    ("+", BinaryOp::Add),
    ("-", BinaryOp::Subtract),
    ("*", BinaryOp::Multiply),
    ("/", BinaryOp::Divide),
    ("%", BinaryOp::Mod),
];

/// Evaluate `text` as a complete expression.
pub fn eval_str(text: &str, ctx: &dyn EvalContext) -> Result<i64, EvalError> {
    if text.trim().is_empty() {
        return Err(EvalError::syntax("Missing expression"));
    }
    let mut parser = ExprParser {
        cursor: Cursor::new(text),
        ctx,
    };
    let value = parser.expr(0)?;
    parser.cursor.skip_ws();
    if parser.cursor.peek().is_some() {
        let rest = String::from_utf8_lossy(parser.cursor.rest());
        return Err(EvalError::syntax(format!(
            "Garbage in expression: {}",
            rest.trim()
        )));
    }
    Ok(value)
}

struct ExprParser<'a> {
    cursor: Cursor<'a>,
    ctx: &'a dyn EvalContext,
}

impl ExprParser<'_> {
    fn expr(&mut self, min_prec: u8) -> Result<i64, EvalError> {
        let mut left = self.unary()?;
        loop {
            self.cursor.skip_ws();
            let Some((text, op)) = self.peek_operator() else {
                break;
            };
            let prec = op.precedence();
            if prec < min_prec.max(1) {
                break;
            }
            for _ in 0..text.len() {
                self.cursor.next();
            }
            let right = self.expr(prec + 1)?;
            left = apply_binary(op, left, right)?;
        }
        Ok(left)
    }

    fn peek_operator(&self) -> Option<(&'static str, BinaryOp)> {
        let rest = self.cursor.rest();
        OPERATORS
            .iter()
            .find(|(text, _)| rest.starts_with(text.as_bytes()))
            .copied()
    }

    fn unary(&mut self) -> Result<i64, EvalError> {
        self.cursor.skip_ws();
        let op = match self.cursor.peek() {
            Some(b'-') => UnaryOp::Minus,
            Some(b'+') => UnaryOp::Plus,
            Some(b'~') => UnaryOp::BitNot,
            Some(b'!') if self.cursor.peek_at(1) != Some(b'=') => UnaryOp::LogicNot,
            _ => return self.primary(),
        };
        self.cursor.next();
        let value = self.unary()?;
        Ok(apply_unary(op, value))
    }

    fn primary(&mut self) -> Result<i64, EvalError> {
        self.cursor.skip_ws();
        match self.cursor.peek() {
            Some(b'(') => {
                self.cursor.next();
                let value = self.expr(0)?;
                self.expect_close()?;
                Ok(value)
            }
            Some(b'\'') => self.char_literal(),
            Some(b'$') => {
                self.cursor.next();
                let digits = self.take_word();
                i64::from_str_radix(&digits, 16)
                    .map_err(|_| EvalError::syntax(format!("Invalid number: ${digits}")))
            }
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_word();
                parse_number(&digits)
                    .ok_or_else(|| EvalError::syntax(format!("Invalid number: {digits}")))
            }
            Some(c) if is_ident_start(c) => {
                let name = self.cursor.take_ident().unwrap_or_default();
                self.cursor.skip_ws();
                if self.cursor.peek() == Some(b'(') {
                    if let Some(func) = Function::from_name(&name) {
                        return self.call(func);
                    }
                }
                self.symbol(&name)
            }
            Some(c) => Err(EvalError::syntax(format!(
                "Unexpected character in expression: {}",
                c as char
            ))),
            None => Err(EvalError::syntax("Unexpected end of expression")),
        }
    }

    fn symbol(&self, name: &str) -> Result<i64, EvalError> {
        if let Some(value) = self.ctx.lookup_symbol(name) {
            return Ok(value);
        }
        if name.eq_ignore_ascii_case("PC") {
            if let Some(pc) = self.ctx.current_address() {
                return Ok(pc);
            }
        }
        Err(EvalError::Undefined(name.to_string()))
    }

    fn call(&mut self, func: Function) -> Result<i64, EvalError> {
        self.cursor.next();
        if func == Function::Defined {
            self.cursor.skip_ws();
            let name = self
                .cursor
                .take_ident()
                .ok_or_else(|| EvalError::syntax("DEFINED() expects a symbol name"))?;
            self.expect_close()?;
            return Ok(i64::from(self.ctx.is_defined(&name)));
        }
        let arg = self.expr(0)?;
        self.expect_close()?;
        Ok(func.apply(arg))
    }

    fn expect_close(&mut self) -> Result<(), EvalError> {
        self.cursor.skip_ws();
        if self.cursor.eat(b')') {
            Ok(())
        } else {
            Err(EvalError::syntax("Missing ')' in expression"))
        }
    }

    fn char_literal(&mut self) -> Result<i64, EvalError> {
        self.cursor.next();
        let value = match self.cursor.next() {
            Some(b'\\') => self.cursor.next().map(unescape),
            other => other,
        }
        .ok_or_else(|| EvalError::syntax("Unterminated character literal"))?;
        if !self.cursor.eat(b'\'') {
            return Err(EvalError::syntax("Unterminated character literal"));
        }
        Ok(i64::from(value))
    }

    fn take_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.cursor.peek().filter(|c| is_ident_char(*c)) {
            word.push(c as char);
            self.cursor.next();
        }
        word
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Low,
    High,
    Byte3,
    Byte4,
    Lwrd,
    Hwrd,
    Page,
    Exp2,
    Log2,
    Abs,
    Defined,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_uppercase().as_str() {
            "LOW" | "BYTE1" => Function::Low,
            "HIGH" | "BYTE2" => Function::High,
            "BYTE3" => Function::Byte3,
            "BYTE4" => Function::Byte4,
            "LWRD" => Function::Lwrd,
            "HWRD" => Function::Hwrd,
            "PAGE" => Function::Page,
            "EXP2" => Function::Exp2,
            "LOG2" => Function::Log2,
            "ABS" => Function::Abs,
            "DEFINED" => Function::Defined,
            _ => return None,
        };
        Some(func)
    }

    fn apply(self, val: i64) -> i64 {
        match self {
            Function::Low => val & 0xff,
            Function::High => (val >> 8) & 0xff,
            Function::Byte3 => (val >> 16) & 0xff,
            Function::Byte4 => (val >> 24) & 0xff,
            Function::Lwrd => val & 0xffff,
            Function::Hwrd => (val >> 16) & 0xffff,
            Function::Page => (val >> 16) & 0x3f,
            Function::Exp2 => 1i64.checked_shl(val as u32).unwrap_or(0),
            Function::Log2 => {
                if val > 0 {
                    i64::from(63 - val.leading_zeros())
                } else {
                    0
                }
            }
            Function::Abs => val.wrapping_abs(),
            Function::Defined => 0,
        }
    }
}

/// Apply a unary operator to a value.
pub fn apply_unary(op: UnaryOp, val: i64) -> i64 {
    match op {
        UnaryOp::Plus => val,
        UnaryOp::Minus => val.wrapping_neg(),
        UnaryOp::BitNot => !val,
        UnaryOp::LogicNot => i64::from(val == 0),
    }
}

/// Apply a binary operator to two values.
pub fn apply_binary(op: BinaryOp, l: i64, r: i64) -> Result<i64, EvalError> {
    Ok(match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err(EvalError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Shl => l << (r & 0x3f),
        BinaryOp::Shr => l >> (r & 0x3f),
        BinaryOp::Eq => i64::from(l == r),
        BinaryOp::Ne => i64::from(l != r),
        BinaryOp::Lt => i64::from(l < r),
        BinaryOp::Le => i64::from(l <= r),
        BinaryOp::Gt => i64::from(l > r),
        BinaryOp::Ge => i64::from(l >= r),
        BinaryOp::LogicAnd => i64::from((l != 0) && (r != 0)),
        BinaryOp::LogicOr => i64::from((l != 0) || (r != 0)),
    })
}

/// Parse a number literal.
///
/// Supports:
/// - Decimal: `42`
/// - Hex: `0x2A`, `$2A`
/// - Binary: `0b101010`
pub fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (is_neg, text) = if let Some(rest) = text.strip_prefix('-') {
        (true, rest)
    } else {
        (false, text)
    };

    let val = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        text.parse::<i64>().ok()?
    };

    Some(if is_neg { -val } else { val })
}

/// Simple evaluation context that wraps a symbol lookup function.
pub struct SimpleEvalContext<F>
where
    F: Fn(&str) -> Option<i64>,
{
    lookup: F,
    addr: Option<i64>,
}

impl<F> SimpleEvalContext<F>
where
    F: Fn(&str) -> Option<i64>,
{
    /// Create a new context with a symbol lookup function.
    pub fn new(lookup: F) -> Self {
        Self { lookup, addr: None }
    }

    /// Create a new context with symbol lookup and current address.
    pub fn with_address(lookup: F, addr: i64) -> Self {
        Self {
            lookup,
            addr: Some(addr),
        }
    }
}

impl<F> EvalContext for SimpleEvalContext<F>
where
    F: Fn(&str) -> Option<i64>,
{
    fn lookup_symbol(&self, name: &str) -> Option<i64> {
        (self.lookup)(name)
    }

    fn current_address(&self) -> Option<i64> {
        self.addr
    }
}
