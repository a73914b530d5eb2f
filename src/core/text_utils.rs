// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Shared text utilities for line scanning.

/// Check if a byte is a valid identifier start character (letter or underscore).
#[inline]
pub fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

/// Check if a byte is a valid identifier continuation character.
///
/// Labels may carry `%` so that generated names survive macro expansion.
#[inline]
pub fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'%'
}

/// Split a line into code and comment parts at the first unquoted semicolon.
///
/// `//` also starts a comment when it is outside of quotes.
pub fn split_comment(line: &str) -> (&str, &str) {
    let bytes = line.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut idx = 0usize;
    while idx < bytes.len() {
        let c = bytes[idx];
        match c {
            _ if escape => {
                escape = false;
            }
            b'\\' if in_single || in_double => {
                escape = true;
            }
            b'\'' if !in_double => {
                in_single = !in_single;
            }
            b'"' if !in_single => {
                in_double = !in_double;
            }
            b';' if !in_single && !in_double => {
                return (&line[..idx], &line[idx..]);
            }
            b'/' if !in_single && !in_double && bytes.get(idx + 1) == Some(&b'/') => {
                return (&line[..idx], &line[idx..]);
            }
            _ => {}
        }
        idx += 1;
    }
    (line, "")
}

/// Split an operand field at top-level commas.
///
/// Commas inside quotes or parentheses do not split. Items are trimmed and an
/// all-blank field yields no items.
pub fn split_operands(text: &str) -> Vec<&str> {
    let mut items = Vec::new();
    if text.trim().is_empty() {
        return items;
    }
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut escape = false;
    let mut start = 0usize;
    for (idx, &c) in bytes.iter().enumerate() {
        match c {
            _ if escape => escape = false,
            b'\\' if in_single || in_double => escape = true,
            b'\'' if !in_double => in_single = !in_single,
            b'"' if !in_single => in_double = !in_double,
            b'(' if !in_single && !in_double => depth += 1,
            b')' if !in_single && !in_double => depth -= 1,
            b',' if !in_single && !in_double && depth <= 0 => {
                items.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(text[start..].trim());
    items
}

/// Decode a double-quoted string literal, returning its bytes.
///
/// Supports the `\n`, `\r`, `\t`, `\0`, `\\`, `\'` and `\"` escapes. Returns
/// `None` if `text` is not exactly one quoted literal.
pub fn parse_string_literal(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.bytes();
    while let Some(c) = chars.next() {
        match c {
            b'\\' => out.push(unescape(chars.next()?)),
            b'"' => return None,
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Map the character after a backslash to the byte it stands for.
pub fn unescape(c: u8) -> u8 {
    match c {
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'0' => 0,
        other => other,
    }
}

/// A simple cursor for scanning text byte-by-byte.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a new cursor at the start of the input.
    pub fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Get the current position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Skip whitespace characters.
    pub fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Peek at the current byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Peek `offset` bytes ahead of the current position.
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Consume and return the current byte.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Consume `c` if it is the next byte.
    pub fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// The unconsumed remainder of the input.
    pub fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    /// Try to consume an identifier, returning it if found.
    pub fn take_ident(&mut self) -> Option<String> {
        let start = self.pos;
        let first = self.peek()?;
        if !is_ident_start(first) {
            return None;
        }
        self.pos += 1;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string())
    }
}
