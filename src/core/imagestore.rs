// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Image store with Intel HEX output.

use std::collections::BTreeMap;
use std::io::{self, Write};

/// Data bytes per HEX record.
const LINE_LIMIT: usize = 16;

/// First address an extended segment address record cannot reach.
const SEGMENT_RECORD_LIMIT: u32 = 0x10_0000;

/// Sparse byte image of one segment.
#[derive(Debug, Default, Clone)]
pub struct ImageStore {
    bytes: BTreeMap<u32, u8>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_entries(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn store(&mut self, addr: u32, val: u8) {
        self.bytes.insert(addr, val);
    }

    pub fn store_slice(&mut self, addr: u32, values: &[u8]) {
        for (ix, val) in values.iter().enumerate() {
            self.store(addr.wrapping_add(ix as u32), *val);
        }
    }

    /// Store a program word at a word address, low byte first.
    pub fn store_word(&mut self, word_addr: u32, word: u16) {
        self.store_slice(word_addr.wrapping_mul(2), &word.to_le_bytes());
    }

    pub fn get(&self, addr: u32) -> Option<u8> {
        self.bytes.get(&addr).copied()
    }

    pub fn output_range(&self) -> Option<(u32, u32)> {
        let first = self.bytes.keys().next()?;
        let last = self.bytes.keys().next_back()?;
        Some((*first, *last))
    }

    /// Write Intel HEX records, with an extended address record whenever
    /// data crosses into a new 64 KiB bank. Images reaching past 1 MiB use
    /// extended linear address records, smaller ones extended segment
    /// address records.
    pub fn write_hex_file<W: Write>(&self, mut out: W) -> io::Result<()> {
        let linear = self
            .bytes
            .keys()
            .next_back()
            .is_some_and(|addr| *addr >= SEGMENT_RECORD_LIMIT);
        let mut bank: u32 = 0;
        let mut line_addr: u32 = 0;
        let mut line: Vec<u8> = Vec::with_capacity(LINE_LIMIT);
        let mut iter = self.bytes.iter().peekable();

        while let Some((&addr, &val)) = iter.next() {
            if line.is_empty() {
                let addr_bank = addr >> 16;
                if addr_bank != bank {
                    bank = addr_bank;
                    if linear {
                        write_record(&mut out, 0, 0x04, &((bank as u16).to_be_bytes()))?;
                    } else {
                        write_record(&mut out, 0, 0x02, &(((bank << 12) as u16).to_be_bytes()))?;
                    }
                }
                line_addr = addr;
            }
            line.push(val);

            let contiguous = iter
                .peek()
                .is_some_and(|(next, _)| **next == addr.wrapping_add(1) && **next >> 16 == bank);
            if line.len() >= LINE_LIMIT || !contiguous {
                write_record(&mut out, (line_addr & 0xffff) as u16, 0x00, &line)?;
                line.clear();
            }
        }

        writeln!(out, ":00000001FF")?;
        Ok(())
    }
}

fn write_record<W: Write>(out: &mut W, addr: u16, rec_type: u8, data: &[u8]) -> io::Result<()> {
    let mut checksum = data.len() as u8;
    checksum = checksum.wrapping_add((addr >> 8) as u8);
    checksum = checksum.wrapping_add((addr & 0xff) as u8);
    checksum = checksum.wrapping_add(rec_type);
    let mut hex_data = String::with_capacity(data.len() * 2);
    for val in data {
        hex_data.push(hex_digit((val >> 4) & 0x0f));
        hex_data.push(hex_digit(val & 0x0f));
        checksum = checksum.wrapping_add(*val);
    }
    checksum = (!checksum).wrapping_add(1);
    writeln!(
        out,
        ":{:02X}{:04X}{:02X}{}{:02X}",
        data.len(),
        addr,
        rec_type,
        hex_data,
        checksum
    )
}

fn hex_digit(val: u8) -> char {
    match val {
        0..=9 => (b'0' + val) as char,
        _ => (b'A' + (val - 10)) as char,
    }
}
