// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction table for the AVR core instruction set.
//!
//! `not_with` lists device flags that remove the instruction. Operand
//! dependent restrictions (pointer registers, LPM operands) are checked by
//! the handler.

use crate::core::device::flags::*;
use crate::families::avr::operand::Form;

/// An instruction table entry.
pub struct InstructionEntry {
    pub mnemonic: &'static str,
    pub form: Form,
    pub opcode: u16,
    pub not_with: u16,
}

const fn op(mnemonic: &'static str, form: Form, opcode: u16, not_with: u16) -> InstructionEntry {
    InstructionEntry {
        mnemonic,
        form,
        opcode,
        not_with,
    }
}

/// Instruction table, linear search is sufficient.
pub static INSTRUCTION_TABLE: &[InstructionEntry] = &[
    // Implied
    op("NOP", Form::Implied, 0x0000, 0),
    op("SEC", Form::Implied, 0x9408, 0),
    op("CLC", Form::Implied, 0x9488, 0),
    op("SEZ", Form::Implied, 0x9418, 0),
    op("CLZ", Form::Implied, 0x9498, 0),
    op("SEN", Form::Implied, 0x9428, 0),
    op("CLN", Form::Implied, 0x94A8, 0),
    op("SEV", Form::Implied, 0x9438, 0),
    op("CLV", Form::Implied, 0x94B8, 0),
    op("SES", Form::Implied, 0x9448, 0),
    op("CLS", Form::Implied, 0x94C8, 0),
    op("SEH", Form::Implied, 0x9458, 0),
    op("CLH", Form::Implied, 0x94D8, 0),
    op("SET", Form::Implied, 0x9468, 0),
    op("CLT", Form::Implied, 0x94E8, 0),
    op("SEI", Form::Implied, 0x9478, 0),
    op("CLI", Form::Implied, 0x94F8, 0),
    op("RET", Form::Implied, 0x9508, 0),
    op("RETI", Form::Implied, 0x9518, 0),
    op("SLEEP", Form::Implied, 0x9588, 0),
    op("BREAK", Form::Implied, 0x9598, NO_BREAK),
    op("WDR", Form::Implied, 0x95A8, 0),
    op("IJMP", Form::Implied, 0x9409, TINY1X),
    op("ICALL", Form::Implied, 0x9509, TINY1X),
    op("EIJMP", Form::Implied, 0x9419, NO_EIJMP),
    op("EICALL", Form::Implied, 0x9519, NO_EICALL),
    // Two registers
    op("ADD", Form::RegReg, 0x0C00, 0),
    op("ADC", Form::RegReg, 0x1C00, 0),
    op("SUB", Form::RegReg, 0x1800, 0),
    op("SBC", Form::RegReg, 0x0800, 0),
    op("AND", Form::RegReg, 0x2000, 0),
    op("OR", Form::RegReg, 0x2800, 0),
    op("EOR", Form::RegReg, 0x2400, 0),
    op("MOV", Form::RegReg, 0x2C00, 0),
    op("CP", Form::RegReg, 0x1400, 0),
    op("CPC", Form::RegReg, 0x0400, 0),
    op("CPSE", Form::RegReg, 0x1000, 0),
    op("MUL", Form::RegReg, 0x9C00, NO_MUL),
    op("MULS", Form::UpperRegs, 0x0200, NO_MUL),
    op("MULSU", Form::MidRegs, 0x0300, NO_MUL),
    op("FMUL", Form::MidRegs, 0x0308, NO_MUL),
    op("FMULS", Form::MidRegs, 0x0380, NO_MUL),
    op("FMULSU", Form::MidRegs, 0x0388, NO_MUL),
    op("MOVW", Form::RegPairs, 0x0100, NO_MOVW),
    // Register twice
    op("LSL", Form::RegTwice, 0x0C00, 0),
    op("ROL", Form::RegTwice, 0x1C00, 0),
    op("TST", Form::RegTwice, 0x2000, 0),
    op("CLR", Form::RegTwice, 0x2400, 0),
    // One register
    op("COM", Form::Reg, 0x9400, 0),
    op("NEG", Form::Reg, 0x9401, 0),
    op("SWAP", Form::Reg, 0x9402, 0),
    op("INC", Form::Reg, 0x9403, 0),
    op("ASR", Form::Reg, 0x9405, 0),
    op("LSR", Form::Reg, 0x9406, 0),
    op("ROR", Form::Reg, 0x9407, 0),
    op("DEC", Form::Reg, 0x940A, 0),
    op("PUSH", Form::Reg, 0x920F, TINY1X),
    op("POP", Form::Reg, 0x900F, TINY1X),
    op("SER", Form::RegOnes, 0xEF0F, 0),
    // Register and immediate
    op("LDI", Form::RegImm, 0xE000, 0),
    op("CPI", Form::RegImm, 0x3000, 0),
    op("SBCI", Form::RegImm, 0x4000, 0),
    op("SUBI", Form::RegImm, 0x5000, 0),
    op("ORI", Form::RegImm, 0x6000, 0),
    op("SBR", Form::RegImm, 0x6000, 0),
    op("ANDI", Form::RegImm, 0x7000, 0),
    op("CBR", Form::RegImmInverted, 0x7000, 0),
    op("ADIW", Form::WordImm, 0x9600, TINY1X | AVR8L),
    op("SBIW", Form::WordImm, 0x9700, TINY1X | AVR8L),
    op("DES", Form::Nibble, 0x940B, TINY1X | AVR8L),
    // Relative jumps
    op("RJMP", Form::Relative12, 0xC000, 0),
    op("RCALL", Form::Relative12, 0xD000, 0),
    op("BRBS", Form::BitRelative7, 0xF000, 0),
    op("BRBC", Form::BitRelative7, 0xF400, 0),
    op("BRCS", Form::Relative7, 0xF000, 0),
    op("BRLO", Form::Relative7, 0xF000, 0),
    op("BRCC", Form::Relative7, 0xF400, 0),
    op("BRSH", Form::Relative7, 0xF400, 0),
    op("BREQ", Form::Relative7, 0xF001, 0),
    op("BRNE", Form::Relative7, 0xF401, 0),
    op("BRMI", Form::Relative7, 0xF002, 0),
    op("BRPL", Form::Relative7, 0xF402, 0),
    op("BRVS", Form::Relative7, 0xF003, 0),
    op("BRVC", Form::Relative7, 0xF403, 0),
    op("BRLT", Form::Relative7, 0xF004, 0),
    op("BRGE", Form::Relative7, 0xF404, 0),
    op("BRHS", Form::Relative7, 0xF005, 0),
    op("BRHC", Form::Relative7, 0xF405, 0),
    op("BRTS", Form::Relative7, 0xF006, 0),
    op("BRTC", Form::Relative7, 0xF406, 0),
    op("BRIE", Form::Relative7, 0xF007, 0),
    op("BRID", Form::Relative7, 0xF407, 0),
    op("BSET", Form::StatusBit, 0x9408, 0),
    op("BCLR", Form::StatusBit, 0x9488, 0),
    // Absolute jumps
    op("JMP", Form::Absolute22, 0x940C, NO_JMP),
    op("CALL", Form::Absolute22, 0x940E, NO_JMP),
    // I/O
    op("IN", Form::In, 0xB000, 0),
    op("OUT", Form::Out, 0xB800, 0),
    op("CBI", Form::IoBit, 0x9800, 0),
    op("SBIC", Form::IoBit, 0x9900, 0),
    op("SBI", Form::IoBit, 0x9A00, 0),
    op("SBIS", Form::IoBit, 0x9B00, 0),
    // Register bits
    op("SBRC", Form::RegBit, 0xFC00, 0),
    op("SBRS", Form::RegBit, 0xFE00, 0),
    op("BST", Form::RegBit, 0xFA00, 0),
    op("BLD", Form::RegBit, 0xF800, 0),
    // Data memory
    op("LDS", Form::LoadDirect, 0x9000, TINY1X),
    op("STS", Form::StoreDirect, 0x9200, TINY1X),
    op("LD", Form::LoadIndirect, 0x9000, 0),
    op("ST", Form::StoreIndirect, 0x9200, 0),
    op("LDD", Form::LoadDisplaced, 0x8000, TINY1X | NO_YREG | AVR8L),
    op("STD", Form::StoreDisplaced, 0x8200, TINY1X | NO_YREG | AVR8L),
    op("XCH", Form::ZReg, 0x9204, TINY1X | AVR8L),
    op("LAS", Form::ZReg, 0x9205, TINY1X | AVR8L),
    op("LAC", Form::ZReg, 0x9206, TINY1X | AVR8L),
    op("LAT", Form::ZReg, 0x9207, TINY1X | AVR8L),
    // Program memory
    op("LPM", Form::ProgramLoad, 0x95C8, NO_LPM),
    op("ELPM", Form::ProgramLoad, 0x95D8, NO_ELPM),
    op("SPM", Form::ProgramStore, 0x95E8, NO_SPM),
];

/// Look up an instruction by mnemonic, case-insensitively.
pub fn lookup_instruction(mnemonic: &str) -> Option<&'static InstructionEntry> {
    INSTRUCTION_TABLE
        .iter()
        .find(|entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Check if a mnemonic is in the table.
pub fn has_mnemonic(mnemonic: &str) -> bool {
    lookup_instruction(mnemonic).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = HashSet::new();
        for entry in INSTRUCTION_TABLE {
            assert!(seen.insert(entry.mnemonic), "duplicate {}", entry.mnemonic);
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup_instruction("ldi").map(|e| e.opcode), Some(0xE000));
        assert!(has_mnemonic("BrNe"));
        assert!(!has_mnemonic("MOVE"));
    }
}
