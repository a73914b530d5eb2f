// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Components shared by the pass coordinator: diagnostics and listing output.

pub mod error;
pub mod listing;

use std::fmt;

/// Assembler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Discovery: symbol values and segment sizes.
    One,
    /// Emission.
    Two,
}

impl Pass {
    pub fn number(self) -> u8 {
        match self {
            Pass::One => 1,
            Pass::Two => 2,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass {}", self.number())
    }
}
