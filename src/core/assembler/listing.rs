// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing file generation.

use std::io::Write;

use crate::core::segment::{SegmentKind, Segments};

use super::error::{Diagnostic, PassCounts};

/// Cells emitted by one source line.
#[derive(Debug, Clone, Copy)]
pub enum ListingCells<'a> {
    None,
    Words(&'a [u16]),
    Bytes(&'a [u8]),
}

/// Data for a single listing line.
pub struct ListingLine<'a> {
    pub segment: SegmentKind,
    pub addr: i64,
    pub cells: ListingCells<'a>,
    pub source: &'a str,
}

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{title}")?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn write_line(&mut self, line: ListingLine<'_>) -> std::io::Result<()> {
        let source = line.source.trim_end_matches(['\r', '\n']);
        let cells = match line.cells {
            ListingCells::None => return writeln!(self.out, "          {source}"),
            ListingCells::Words(words) => format_words(words),
            ListingCells::Bytes(bytes) => format_bytes(bytes),
        };
        writeln!(
            self.out,
            "{}:{:06X} {:<14} {}",
            line.segment.ident(),
            line.addr,
            cells,
            source
        )
    }

    pub fn write_diagnostic(&mut self, diag: &Diagnostic) -> std::io::Result<()> {
        writeln!(self.out, "{}", diag.format())
    }

    pub fn footer(&mut self, counts: &PassCounts, segments: &Segments) -> std::io::Result<()> {
        writeln!(self.out)?;
        segments.write_used_blocks(&mut self.out)?;
        let code = segments.get(SegmentKind::Code).count();
        writeln!(self.out)?;
        writeln!(self.out, "Segment usage:")?;
        writeln!(self.out, "   Code      :   {:>7} words ({} bytes)", code, code * 2)?;
        writeln!(
            self.out,
            "   Data      :   {:>7} bytes",
            segments.get(SegmentKind::Data).count()
        )?;
        writeln!(
            self.out,
            "   EEPROM    :   {:>7} bytes",
            segments.get(SegmentKind::Eeprom).count()
        )?;
        writeln!(
            self.out,
            "\nLines: {}  Errors: {}  Warnings: {}",
            counts.lines, counts.errors, counts.warnings
        )?;
        if counts.errors == 0 {
            writeln!(self.out, "\nAssembly completed with no errors.")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }
}

/// Format words as hex string for listing.
pub fn format_words(words: &[u16]) -> String {
    words
        .iter()
        .map(|w| format!("{:04X}", w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as hex string for listing.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitting_line_shows_segment_and_address() {
        let mut out = Vec::new();
        let mut writer = ListingWriter::new(&mut out);
        writer
            .write_line(ListingLine {
                segment: SegmentKind::Code,
                addr: 0x12,
                cells: ListingCells::Words(&[0xE004, 0x0000]),
                source: "  ldi r16, 4\n",
            })
            .unwrap();
        writer
            .write_line(ListingLine {
                segment: SegmentKind::Code,
                addr: 0x14,
                cells: ListingCells::None,
                source: "; comment",
            })
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "C:000012 E004 0000        ldi r16, 4\n          ; comment\n"
        );
    }

    #[test]
    fn byte_cells_are_two_digits() {
        assert_eq!(format_bytes(&[1, 0xAB]), "01 AB");
        assert_eq!(format_words(&[0x950A]), "950A");
    }
}
