// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction-set independent assembler core.
//!
//! # Components
//!
//! - [`text_utils`] - Text processing utilities (cursor, identifiers, comments)
//! - [`expr`] - Expression evaluation
//! - [`symbol_table`] - Labels, constants and variables
//! - [`device`] - Device records and predefined symbols
//! - [`segment`] - Segment cursors and overlap tracking
//! - [`conditional`] - Conditional assembly
//! - [`macro_processor`] - Macro recording and expansion
//! - [`encoder`] - Instruction encoder interface
//! - [`imagestore`] - Memory images and Intel HEX output
//! - [`assembler`] - Diagnostics and listing output

pub mod assembler;
pub mod conditional;
pub mod device;
pub mod encoder;
pub mod expr;
pub mod imagestore;
pub mod macro_processor;
pub mod segment;
pub mod symbol_table;
pub mod text_utils;

// Re-exports for convenience
pub use expr::{eval_str, parse_number, EvalContext, EvalError};
pub use symbol_table::{Namespace, SymbolTable, Symbols};
