// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand forms for the AVR family.

use crate::core::encoder::{EncodeContext, EncodeError};

/// Instruction operand shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    /// No operand (NOP, RET, SEI, ...)
    Implied,
    /// Rd,Rr - two full-range registers
    RegReg,
    /// Rd - one full-range register
    Reg,
    /// Rd - written as Rd,Rd (LSL, ROL, TST, CLR)
    RegTwice,
    /// Rd,K - upper register and 8-bit immediate
    RegImm,
    /// Rd,K with the complement of K (CBR)
    RegImmInverted,
    /// Rd - upper register, immediate 0xFF (SER)
    RegOnes,
    /// Rd,Rr - upper registers only (MULS)
    UpperRegs,
    /// Rd,Rr - r16 to r23 (MULSU, FMUL...)
    MidRegs,
    /// Rd,Rr - even register pairs (MOVW)
    RegPairs,
    /// k - 12-bit relative (RJMP, RCALL)
    Relative12,
    /// k - 7-bit relative (BRxx)
    Relative7,
    /// s,k - status bit and 7-bit relative (BRBS, BRBC)
    BitRelative7,
    /// s - status bit (BSET, BCLR)
    StatusBit,
    /// k - 22-bit absolute, two words (JMP, CALL)
    Absolute22,
    /// Rd,A - register from I/O space
    In,
    /// A,Rr - register to I/O space
    Out,
    /// A,b - low I/O bit (CBI, SBIS, ...)
    IoBit,
    /// Rr,b - register bit (SBRC, BST, ...)
    RegBit,
    /// Rd,K - upper word register and 6-bit immediate (ADIW, SBIW)
    WordImm,
    /// Rd,k - load direct (LDS)
    LoadDirect,
    /// k,Rr - store direct (STS)
    StoreDirect,
    /// Rd,ptr - load indirect (LD)
    LoadIndirect,
    /// ptr,Rr - store indirect (ST)
    StoreIndirect,
    /// Rd,Y+q / Rd,Z+q - load with displacement (LDD)
    LoadDisplaced,
    /// Y+q,Rr / Z+q,Rr - store with displacement (STD)
    StoreDisplaced,
    /// none, or Rd,Z / Rd,Z+ (LPM, ELPM)
    ProgramLoad,
    /// none, or Z+ (SPM)
    ProgramStore,
    /// Z,Rd (XCH, LAS, LAC, LAT)
    ZReg,
    /// K - 4-bit immediate (DES)
    Nibble,
}

impl Form {
    /// Operand count, or `None` if it varies.
    pub fn operand_count(self) -> Option<usize> {
        match self {
            Form::Implied => Some(0),
            Form::ProgramLoad | Form::ProgramStore => None,
            Form::Reg
            | Form::RegTwice
            | Form::RegOnes
            | Form::Relative12
            | Form::Relative7
            | Form::StatusBit
            | Form::Absolute22
            | Form::Nibble => Some(1),
            _ => Some(2),
        }
    }
}

/// Pointer register of an indirect operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pointer {
    X,
    Y,
    Z,
}

/// Addressing of an indirect operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerMode {
    Plain,
    PostIncrement,
    PreDecrement,
}

/// Parse a register operand: `r0`..`r31` or a `.DEF` alias.
pub fn parse_register(text: &str, ctx: &dyn EncodeContext) -> Result<u8, EncodeError> {
    let text = text.trim();
    if let Some(reg) = ctx.register_alias(text) {
        return Ok(reg);
    }
    register_number(text).ok_or_else(|| EncodeError::operand(format!("{text} is not a register")))
}

/// Number of a literal `rN` register.
pub fn register_number(text: &str) -> Option<u8> {
    let digits = text.strip_prefix(['r', 'R'])?;
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok().filter(|n| *n < 32)
}

/// Parse `X`, `X+`, `-X` (and the Y/Z forms).
pub fn parse_pointer(text: &str) -> Option<(Pointer, PointerMode)> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    let (name, mode) = if let Some(rest) = upper.strip_prefix('-') {
        (rest, PointerMode::PreDecrement)
    } else if let Some(rest) = upper.strip_suffix('+') {
        (rest, PointerMode::PostIncrement)
    } else {
        (upper.as_str(), PointerMode::Plain)
    };
    let pointer = match name {
        "X" => Pointer::X,
        "Y" => Pointer::Y,
        "Z" => Pointer::Z,
        _ => return None,
    };
    Some((pointer, mode))
}

/// Split `Y+q` / `Z+q` into the pointer and the displacement expression.
pub fn parse_displacement(text: &str) -> Option<(Pointer, &str)> {
    let text = text.trim();
    let (name, rest) = text.split_at(text.find('+')?);
    let pointer = match name.trim().to_ascii_uppercase().as_str() {
        "Y" => Pointer::Y,
        "Z" => Pointer::Z,
        _ => return None,
    };
    let expr = rest[1..].trim();
    if expr.is_empty() {
        return None;
    }
    Some((pointer, expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_numbers() {
        assert_eq!(register_number("r0"), Some(0));
        assert_eq!(register_number("R31"), Some(31));
        assert_eq!(register_number("r32"), None);
        assert_eq!(register_number("rx"), None);
        assert_eq!(register_number("r"), None);
    }

    #[test]
    fn pointer_forms() {
        assert_eq!(parse_pointer("x"), Some((Pointer::X, PointerMode::Plain)));
        assert_eq!(
            parse_pointer("Y+"),
            Some((Pointer::Y, PointerMode::PostIncrement))
        );
        assert_eq!(
            parse_pointer("- Z"),
            Some((Pointer::Z, PointerMode::PreDecrement))
        );
        assert_eq!(parse_pointer("W"), None);
    }

    #[test]
    fn displacement_forms() {
        assert_eq!(parse_displacement("Y+2"), Some((Pointer::Y, "2")));
        assert_eq!(parse_displacement("z + off*2"), Some((Pointer::Z, "off*2")));
        assert_eq!(parse_displacement("Z+"), None);
        assert_eq!(parse_displacement("X+1"), None);
    }
}
