// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! AVR instruction family.
//!
//! # Operand Syntax
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `r16`, `temp` | Register, or a `.DEF` alias |
//! | `X`, `Y+`, `-Z` | Pointer register with optional increment |
//! | `Y+q`, `Z+q` | Pointer with displacement (LDD, STD) |
//! | `expr` | Immediate, I/O address, bit number or jump target |
//!
//! Relative jumps and branches take the target word address; the offset is
//! computed from the following instruction.

mod handler;
mod operand;
mod table;

pub use handler::AvrEncoder;
pub use operand::{register_number, Form, Pointer, PointerMode};
pub use table::{has_mnemonic, lookup_instruction, INSTRUCTION_TABLE};
