// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoder abstraction.
//!
//! The pass coordinator only needs two things from an instruction set: the
//! size of an instruction in pass one, when operands may still be forward
//! references, and its encoded words in pass two.
//!
//! ```text
//! Line Pump → MnemonicEncoder::size (pass 1) → Segment::advance
//!           → MnemonicEncoder::encode (pass 2) → ImageStore
//! ```

use thiserror::Error;

use crate::core::device::DeviceRecord;
use crate::core::expr::EvalError;

/// Error returned when an instruction cannot be sized or encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{mnemonic} instruction is not supported on {device}")]
    Unsupported { mnemonic: String, device: String },
    #[error("{mnemonic} needs {expected} operand(s), found {found}")]
    OperandCount {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    #[error("{0}")]
    Operand(String),
    #[error("{what} out of range ({min} <= {what} <= {max}), found {value}")]
    Range {
        what: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl EncodeError {
    pub fn operand(message: impl Into<String>) -> Self {
        EncodeError::Operand(message.into())
    }
}

/// Services the encoder needs from the assembler during pass two.
pub trait EncodeContext {
    /// Evaluate an operand expression.
    fn eval(&self, expr: &str) -> Result<i64, EvalError>;

    /// Register number bound to a `.DEF` alias.
    fn register_alias(&self, name: &str) -> Option<u8>;

    /// Word address of the instruction being encoded.
    fn current_address(&self) -> i64;

    /// Active device.
    fn device(&self) -> &DeviceRecord;
}

/// Table-driven instruction encoder for one instruction set.
pub trait MnemonicEncoder {
    /// Check if `name` is an instruction of this set.
    fn is_mnemonic(&self, name: &str) -> bool;

    /// Size in program words. Fails when the device lacks the instruction.
    fn size(
        &self,
        mnemonic: &str,
        operands: &[&str],
        device: &DeviceRecord,
    ) -> Result<u32, EncodeError>;

    /// Encode to program words.
    fn encode(
        &self,
        mnemonic: &str,
        operands: &[&str],
        ctx: &dyn EncodeContext,
    ) -> Result<Vec<u16>, EncodeError>;
}
