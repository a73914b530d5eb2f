// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! AVR instruction encoder.

use crate::core::device::{flags, DeviceRecord};
use crate::core::encoder::{EncodeContext, EncodeError, MnemonicEncoder};
use crate::families::avr::operand::{
    parse_displacement, parse_pointer, parse_register, Form, Pointer, PointerMode,
};
use crate::families::avr::table::{lookup_instruction, InstructionEntry};

/// Encoder for the AVR core instruction set.
#[derive(Debug, Default)]
pub struct AvrEncoder;

impl AvrEncoder {
    pub fn new() -> Self {
        Self
    }
}

fn unsupported(entry: &InstructionEntry, device: &DeviceRecord) -> EncodeError {
    EncodeError::Unsupported {
        mnemonic: entry.mnemonic.to_string(),
        device: device.display_name().to_string(),
    }
}

/// Reject instructions and operand forms the device lacks.
fn check_device(
    entry: &InstructionEntry,
    operands: &[&str],
    device: &DeviceRecord,
) -> Result<(), EncodeError> {
    let has = |flag: u16| device.flags.contains(flag);
    if device.flags.bits() & entry.not_with != 0 {
        return Err(unsupported(entry, device));
    }
    let pointer_operand = match entry.form {
        Form::LoadIndirect => operands.get(1),
        Form::StoreIndirect => operands.first(),
        _ => None,
    };
    if let Some((pointer, mode)) = pointer_operand.and_then(|text| parse_pointer(text)) {
        let missing = match pointer {
            Pointer::X => has(flags::NO_XREG),
            Pointer::Y => has(flags::NO_YREG),
            Pointer::Z => false,
        };
        let tiny = has(flags::TINY1X) && (pointer != Pointer::Z || mode != PointerMode::Plain);
        if missing || tiny {
            return Err(unsupported(entry, device));
        }
    }
    if entry.form == Form::ProgramLoad && !operands.is_empty() {
        let restricted = if entry.mnemonic == "ELPM" {
            has(flags::NO_ELPM_X)
        } else {
            has(flags::NO_LPM_X)
        };
        if restricted {
            return Err(unsupported(entry, device));
        }
    }
    Ok(())
}

fn check_count(entry: &InstructionEntry, operands: &[&str]) -> Result<(), EncodeError> {
    let expected = match entry.form.operand_count() {
        Some(count) => count,
        None => match entry.form {
            Form::ProgramLoad if operands.is_empty() => 0,
            Form::ProgramLoad => 2,
            Form::ProgramStore if operands.is_empty() => 0,
            _ => 1,
        },
    };
    if operands.len() != expected {
        return Err(EncodeError::OperandCount {
            mnemonic: entry.mnemonic.to_string(),
            expected,
            found: operands.len(),
        });
    }
    Ok(())
}

fn value(
    ctx: &dyn EncodeContext,
    text: &str,
    what: &'static str,
    min: i64,
    max: i64,
) -> Result<i64, EncodeError> {
    let value = ctx.eval(text)?;
    if value < min || value > max {
        return Err(EncodeError::Range {
            what,
            min,
            max,
            value,
        });
    }
    Ok(value)
}

fn register(ctx: &dyn EncodeContext, text: &str) -> Result<u16, EncodeError> {
    let reg = parse_register(text, ctx)?;
    let device = ctx.device();
    if device.flags.contains(flags::AVR8L) && reg < 16 {
        return Err(EncodeError::operand(format!(
            "Register r{reg} is not available on {}",
            device.display_name()
        )));
    }
    Ok(u16::from(reg))
}

fn register_in(ctx: &dyn EncodeContext, text: &str, lo: u16, hi: u16) -> Result<u16, EncodeError> {
    let reg = register(ctx, text)?;
    if reg < lo || reg > hi {
        return Err(EncodeError::operand(format!(
            "Register r{reg} not allowed, use r{lo} to r{hi}"
        )));
    }
    Ok(reg)
}

fn even_register(ctx: &dyn EncodeContext, text: &str) -> Result<u16, EncodeError> {
    let reg = register(ctx, text)?;
    if reg % 2 != 0 {
        return Err(EncodeError::operand(format!(
            "Register r{reg} is odd, a register pair starts at an even register"
        )));
    }
    Ok(reg)
}

fn reg_reg(opcode: u16, d: u16, r: u16) -> u16 {
    opcode | (d << 4) | (r & 0x0F) | ((r & 0x10) << 5)
}

fn reg_imm(opcode: u16, d: u16, k: i64) -> u16 {
    let k = (k & 0xFF) as u16;
    opcode | ((k & 0xF0) << 4) | ((d - 16) << 4) | (k & 0x0F)
}

/// Relative offset from the instruction after the current one.
fn relative(
    ctx: &dyn EncodeContext,
    text: &str,
    bits: u32,
    what: &'static str,
) -> Result<u16, EncodeError> {
    let target = ctx.eval(text)?;
    let next = ctx.current_address().checked_add(1);
    let mut offset = next
        .and_then(|next| target.checked_sub(next))
        .ok_or_else(|| EncodeError::operand(format!("{what} target {target} is out of reach")))?;
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    let flash = ctx.device().flash_size;
    if bits == 12 && (offset < min || offset > max) && flash <= 4096 {
        // Small parts wrap around the program memory.
        offset = offset.rem_euclid(flash);
        if offset > max {
            offset -= flash;
        }
    }
    if offset < min || offset > max {
        return Err(EncodeError::Range {
            what,
            min,
            max,
            value: offset,
        });
    }
    Ok((offset & ((1i64 << bits) - 1)) as u16)
}

fn pointer_opcode(pointer: Pointer, mode: PointerMode) -> u16 {
    match (pointer, mode) {
        (Pointer::X, PointerMode::Plain) => 0x900C,
        (Pointer::X, PointerMode::PostIncrement) => 0x900D,
        (Pointer::X, PointerMode::PreDecrement) => 0x900E,
        (Pointer::Y, PointerMode::Plain) => 0x8008,
        (Pointer::Y, PointerMode::PostIncrement) => 0x9009,
        (Pointer::Y, PointerMode::PreDecrement) => 0x900A,
        (Pointer::Z, PointerMode::Plain) => 0x8000,
        (Pointer::Z, PointerMode::PostIncrement) => 0x9001,
        (Pointer::Z, PointerMode::PreDecrement) => 0x9002,
    }
}

fn pointer(text: &str) -> Result<(Pointer, PointerMode), EncodeError> {
    parse_pointer(text)
        .ok_or_else(|| EncodeError::operand(format!("{} is not a pointer register", text.trim())))
}

fn displaced(
    ctx: &dyn EncodeContext,
    opcode: u16,
    reg: u16,
    text: &str,
) -> Result<u16, EncodeError> {
    let (pointer, expr) = parse_displacement(text).ok_or_else(|| {
        EncodeError::operand(format!("{} is not Y+q or Z+q", text.trim()))
    })?;
    let q = value(ctx, expr, "Displacement", 0, 63)? as u16;
    let base = match pointer {
        Pointer::Y => 0x0008,
        _ => 0x0000,
    };
    Ok(opcode | base | ((q & 0x20) << 8) | ((q & 0x18) << 7) | (q & 0x07) | (reg << 4))
}

fn program_load(
    ctx: &dyn EncodeContext,
    entry: &InstructionEntry,
    operands: &[&str],
) -> Result<Vec<u16>, EncodeError> {
    if operands.is_empty() {
        return Ok(vec![entry.opcode]);
    }
    let d = register(ctx, operands[0])?;
    let base = if entry.mnemonic == "ELPM" { 0x9006 } else { 0x9004 };
    match pointer(operands[1])? {
        (Pointer::Z, PointerMode::Plain) => Ok(vec![base | (d << 4)]),
        (Pointer::Z, PointerMode::PostIncrement) => Ok(vec![base | 1 | (d << 4)]),
        _ => Err(EncodeError::operand(format!(
            "{} only takes Z or Z+",
            entry.mnemonic
        ))),
    }
}

impl MnemonicEncoder for AvrEncoder {
    fn is_mnemonic(&self, name: &str) -> bool {
        lookup_instruction(name).is_some()
    }

    fn size(
        &self,
        mnemonic: &str,
        operands: &[&str],
        device: &DeviceRecord,
    ) -> Result<u32, EncodeError> {
        let entry = lookup_instruction(mnemonic)
            .ok_or_else(|| EncodeError::operand(format!("Unknown instruction {mnemonic}")))?;
        check_device(entry, operands, device)?;
        let words = match entry.form {
            Form::Absolute22 => 2,
            Form::LoadDirect | Form::StoreDirect if !device.flags.contains(flags::AVR8L) => 2,
            _ => 1,
        };
        Ok(words)
    }

    fn encode(
        &self,
        mnemonic: &str,
        operands: &[&str],
        ctx: &dyn EncodeContext,
    ) -> Result<Vec<u16>, EncodeError> {
        let entry = lookup_instruction(mnemonic)
            .ok_or_else(|| EncodeError::operand(format!("Unknown instruction {mnemonic}")))?;
        let device = ctx.device();
        check_device(entry, operands, device)?;
        check_count(entry, operands)?;
        let op = entry.opcode;
        let word = match entry.form {
            Form::Implied => op,
            Form::RegReg => reg_reg(op, register(ctx, operands[0])?, register(ctx, operands[1])?),
            Form::RegTwice => {
                let d = register(ctx, operands[0])?;
                reg_reg(op, d, d)
            }
            Form::Reg => op | (register(ctx, operands[0])? << 4),
            Form::RegOnes => op | ((register_in(ctx, operands[0], 16, 31)? - 16) << 4),
            Form::RegImm => {
                let d = register_in(ctx, operands[0], 16, 31)?;
                reg_imm(op, d, value(ctx, operands[1], "Constant", -128, 255)?)
            }
            Form::RegImmInverted => {
                let d = register_in(ctx, operands[0], 16, 31)?;
                reg_imm(op, d, !value(ctx, operands[1], "Constant", -128, 255)?)
            }
            Form::UpperRegs => {
                let d = register_in(ctx, operands[0], 16, 31)?;
                let r = register_in(ctx, operands[1], 16, 31)?;
                op | ((d - 16) << 4) | (r - 16)
            }
            Form::MidRegs => {
                let d = register_in(ctx, operands[0], 16, 23)?;
                let r = register_in(ctx, operands[1], 16, 23)?;
                op | ((d - 16) << 4) | (r - 16)
            }
            Form::RegPairs => {
                let d = even_register(ctx, operands[0])?;
                let r = even_register(ctx, operands[1])?;
                op | ((d / 2) << 4) | (r / 2)
            }
            Form::Relative12 => op | relative(ctx, operands[0], 12, "Relative address")?,
            Form::Relative7 => op | (relative(ctx, operands[0], 7, "Branch offset")? << 3),
            Form::BitRelative7 => {
                let s = value(ctx, operands[0], "Status bit", 0, 7)? as u16;
                op | s | (relative(ctx, operands[1], 7, "Branch offset")? << 3)
            }
            Form::StatusBit => op | ((value(ctx, operands[0], "Status bit", 0, 7)? as u16) << 4),
            Form::Absolute22 => {
                let k = value(ctx, operands[0], "Address", 0, 0x3F_FFFF)?;
                let high = (((k >> 16) & 0x01) | (((k >> 17) & 0x1F) << 4)) as u16;
                return Ok(vec![op | high, (k & 0xFFFF) as u16]);
            }
            Form::In => {
                let d = register(ctx, operands[0])?;
                let a = value(ctx, operands[1], "I/O address", 0, 63)? as u16;
                op | ((a & 0x30) << 5) | (d << 4) | (a & 0x0F)
            }
            Form::Out => {
                let a = value(ctx, operands[0], "I/O address", 0, 63)? as u16;
                let r = register(ctx, operands[1])?;
                op | ((a & 0x30) << 5) | (r << 4) | (a & 0x0F)
            }
            Form::IoBit => {
                let a = value(ctx, operands[0], "I/O address", 0, 31)? as u16;
                let b = value(ctx, operands[1], "Bit number", 0, 7)? as u16;
                op | (a << 3) | b
            }
            Form::RegBit => {
                let r = register(ctx, operands[0])?;
                let b = value(ctx, operands[1], "Bit number", 0, 7)? as u16;
                op | (r << 4) | b
            }
            Form::WordImm => {
                let d = register(ctx, operands[0])?;
                if !matches!(d, 24 | 26 | 28 | 30) {
                    return Err(EncodeError::operand(format!(
                        "Register r{d} not allowed, use r24, r26, r28 or r30"
                    )));
                }
                let k = value(ctx, operands[1], "Constant", 0, 63)? as u16;
                op | ((k & 0x30) << 2) | (((d - 24) / 2) << 4) | (k & 0x0F)
            }
            Form::LoadDirect | Form::StoreDirect => {
                let (reg_text, addr_text) = if entry.form == Form::LoadDirect {
                    (operands[0], operands[1])
                } else {
                    (operands[1], operands[0])
                };
                if device.flags.contains(flags::AVR8L) {
                    let reg = register_in(ctx, reg_text, 16, 31)?;
                    let k = value(ctx, addr_text, "Address", 0, 127)? as u16;
                    let base = if entry.form == Form::LoadDirect { 0xA000 } else { 0xA800 };
                    base | ((k & 0x70) << 4) | ((reg & 0x0F) << 4) | (k & 0x0F)
                } else {
                    let reg = register(ctx, reg_text)?;
                    let k = value(ctx, addr_text, "Address", 0, 0xFFFF)? as u16;
                    return Ok(vec![op | (reg << 4), k]);
                }
            }
            Form::LoadIndirect => {
                let d = register(ctx, operands[0])?;
                let (ptr, mode) = pointer(operands[1])?;
                pointer_opcode(ptr, mode) | (d << 4)
            }
            Form::StoreIndirect => {
                let (ptr, mode) = pointer(operands[0])?;
                let r = register(ctx, operands[1])?;
                pointer_opcode(ptr, mode) | 0x0200 | (r << 4)
            }
            Form::LoadDisplaced => {
                let d = register(ctx, operands[0])?;
                displaced(ctx, op, d, operands[1])?
            }
            Form::StoreDisplaced => {
                let r = register(ctx, operands[1])?;
                displaced(ctx, op, r, operands[0])?
            }
            Form::ProgramLoad => return program_load(ctx, entry, operands),
            Form::ProgramStore => match operands.first() {
                None => op,
                Some(text) => {
                    if pointer(text)? != (Pointer::Z, PointerMode::PostIncrement) {
                        return Err(EncodeError::operand("SPM only takes Z+"));
                    }
                    0x95F8
                }
            },
            Form::ZReg => {
                if pointer(operands[0])? != (Pointer::Z, PointerMode::Plain) {
                    return Err(EncodeError::operand(format!(
                        "{} needs Z as first operand",
                        entry.mnemonic
                    )));
                }
                op | (register(ctx, operands[1])? << 4)
            }
            Form::Nibble => op | ((value(ctx, operands[0], "Constant", 0, 15)? as u16) << 4),
        };
        Ok(vec![word])
    }
}
