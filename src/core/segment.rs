// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Segment cursors and used-range bookkeeping.
//!
//! Each segment records one [`UsedRange`] per uninterrupted run of placement.
//! Ranges are opened and closed during pass one only; at the end of pass one
//! they are checked against the device bounds and against each other.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use thiserror::Error;

use crate::core::assembler::error::Severity;
use crate::core::assembler::Pass;
use crate::core::device::{DeviceRecord, DEFAULT_DEVICE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Code,
    Data,
    Eeprom,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 3] = [SegmentKind::Code, SegmentKind::Data, SegmentKind::Eeprom];

    pub fn ident(self) -> char {
        match self {
            SegmentKind::Code => 'C',
            SegmentKind::Data => 'D',
            SegmentKind::Eeprom => 'E',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Code => "code",
            SegmentKind::Data => "data",
            SegmentKind::Eeprom => "eeprom",
        }
    }

    /// Cell unit in singular and plural form.
    pub fn cell_names(self) -> (&'static str, &'static str) {
        match self {
            SegmentKind::Code => ("word", "words"),
            SegmentKind::Data | SegmentKind::Eeprom => ("byte", "bytes"),
        }
    }

    fn index(self) -> usize {
        match self {
            SegmentKind::Code => 0,
            SegmentKind::Data => 1,
            SegmentKind::Eeprom => 2,
        }
    }

    fn bounds(self, device: &DeviceRecord) -> (i64, i64) {
        match self {
            SegmentKind::Code => (0, device.flash_size),
            SegmentKind::Data => (device.ram_start, device.ram_start + device.ram_size),
            SegmentKind::Eeprom => (0, device.eeprom_size),
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How overlapping ranges are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OverlapPolicy {
    Ignore,
    Warn,
    #[default]
    Error,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" | "i" => Ok(OverlapPolicy::Ignore),
            "warn" | "warning" | "w" => Ok(OverlapPolicy::Warn),
            "error" | "e" => Ok(OverlapPolicy::Error),
            other => Err(format!("Unknown overlap policy {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedRange {
    pub start: i64,
    /// `None` while the range is open.
    pub length: Option<i64>,
    pub allow_overlap: bool,
    pub policy: OverlapPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("Internal error: no open range in {0} segment")]
    NoOpenRange(SegmentKind),
    #[error("Internal error: last range in {0} segment is already closed")]
    AlreadyClosed(SegmentKind),
    #[error("Address overflow in {0} segment")]
    AddressOverflow(SegmentKind),
}

/// A problem found by [`Segment::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeIssue {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Segment {
    kind: SegmentKind,
    lo_addr: i64,
    hi_addr: i64,
    addr: i64,
    count: i64,
    ranges: Vec<UsedRange>,
}

impl Segment {
    pub fn new(kind: SegmentKind) -> Self {
        let (lo_addr, hi_addr) = kind.bounds(&DEFAULT_DEVICE);
        Self {
            kind,
            lo_addr,
            hi_addr,
            addr: lo_addr,
            count: 0,
            ranges: Vec::new(),
        }
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn lo_addr(&self) -> i64 {
        self.lo_addr
    }

    pub fn hi_addr(&self) -> i64 {
        self.hi_addr
    }

    pub fn addr(&self) -> i64 {
        self.addr
    }

    /// Cells placed during pass one.
    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn ranges(&self) -> &[UsedRange] {
        &self.ranges
    }

    pub fn set_addr(&mut self, addr: i64) {
        self.addr = addr;
    }

    pub fn set_bounds(&mut self, device: &DeviceRecord) {
        let (lo, hi) = self.kind.bounds(device);
        self.lo_addr = lo;
        self.hi_addr = hi;
    }

    pub fn rewind(&mut self) {
        self.addr = self.lo_addr;
    }

    /// Drop every range and the cell counter.
    pub fn reset(&mut self) {
        self.ranges.clear();
        self.count = 0;
        self.rewind();
    }

    pub fn open_range(&mut self, allow_overlap: bool, policy: OverlapPolicy) {
        self.ranges.push(UsedRange {
            start: self.addr,
            length: None,
            allow_overlap,
            policy,
        });
    }

    pub fn close_range(&mut self) -> Result<(), SegmentError> {
        let addr = self.addr;
        let range = self
            .ranges
            .last_mut()
            .ok_or(SegmentError::NoOpenRange(self.kind))?;
        if range.length.is_some() {
            return Err(SegmentError::AlreadyClosed(self.kind));
        }
        range.length = Some(addr.saturating_sub(range.start).max(0));
        Ok(())
    }

    pub fn has_open_range(&self) -> bool {
        self.ranges.last().is_some_and(|range| range.length.is_none())
    }

    /// Set the policy of the open range.
    pub fn set_open_policy(&mut self, policy: OverlapPolicy) {
        if let Some(range) = self.ranges.last_mut().filter(|range| range.length.is_none()) {
            range.policy = policy;
        }
    }

    /// Move the cursor past `cells` placed cells. The cursor is left
    /// unchanged when the new address does not fit.
    pub fn advance(&mut self, cells: i64, pass: Pass) -> Result<(), SegmentError> {
        let overflow = SegmentError::AddressOverflow(self.kind);
        let addr = self.addr.checked_add(cells).ok_or(overflow.clone())?;
        if pass == Pass::One {
            self.count = self.count.checked_add(cells).ok_or(overflow)?;
        }
        self.addr = addr;
        Ok(())
    }

    fn closed_ranges(&self) -> impl Iterator<Item = (&UsedRange, i64)> {
        self.ranges
            .iter()
            .filter_map(|range| range.length.filter(|len| *len > 0).map(|len| (range, len)))
    }

    /// Check bounds and pairwise overlap of every closed, non-empty range.
    ///
    /// With `device_known` false, bounds violations are reported as warnings.
    pub fn validate(&self, device_known: bool) -> Vec<RangeIssue> {
        let mut issues = Vec::new();
        let bounds_severity = if device_known {
            Severity::Error
        } else {
            Severity::Warning
        };
        let ranges: Vec<(&UsedRange, i64)> = self.closed_ranges().collect();
        for (ix, (range, len)) in ranges.iter().enumerate() {
            if range.start < self.lo_addr {
                issues.push(RangeIssue {
                    severity: bounds_severity,
                    message: format!(
                        "Segment start below allowed start address: 0x{:04X}{}",
                        self.lo_addr,
                        self.describe_range(range)
                    ),
                });
            }
            if range.start.saturating_add(*len) > self.hi_addr {
                issues.push(RangeIssue {
                    severity: bounds_severity,
                    message: format!(
                        "Segment start above allowed high address: 0x{:04X}{}",
                        self.hi_addr,
                        self.describe_range(range)
                    ),
                });
            }
            if range.allow_overlap {
                continue;
            }
            for (other, other_len) in ranges.iter().skip(ix + 1) {
                if other.allow_overlap {
                    continue;
                }
                let intersects =
                    range.start < other.start.saturating_add(*other_len)
                        && other.start < range.start.saturating_add(*len);
                if !intersects {
                    continue;
                }
                let severity = match range.policy.max(other.policy) {
                    OverlapPolicy::Ignore => continue,
                    OverlapPolicy::Warn => Severity::Warning,
                    OverlapPolicy::Error => Severity::Error,
                };
                issues.push(RangeIssue {
                    severity,
                    message: format!(
                        "Overlapping {} segments:\n{}\n{}\nPlease check your .ORG directives !",
                        self.kind,
                        self.describe_range(range),
                        self.describe_range(other)
                    ),
                });
            }
        }
        issues
    }

    /// One used-block line in the listing format.
    pub fn describe_range(&self, range: &UsedRange) -> String {
        let len = range.length.unwrap_or(0);
        let (cell, cells) = self.kind.cell_names();
        format!(
            "   {:<6}    :  Start = 0x{:04X}, End = 0x{:04X}, Length = 0x{:04X} ({} {}), Overlap={}",
            self.kind.name(),
            range.start,
            range.start.saturating_add(len - 1),
            len,
            len,
            if len == 1 { cell } else { cells },
            if range.allow_overlap { 'Y' } else { 'N' }
        )
    }
}

/// The three segments plus the active one and the overlap settings.
#[derive(Debug, Clone)]
pub struct Segments {
    segments: [Segment; 3],
    active: SegmentKind,
    allow_overlap: bool,
    policy: OverlapPolicy,
    default_policy: OverlapPolicy,
    org_seen: bool,
}

impl Segments {
    pub fn new(default_policy: OverlapPolicy) -> Self {
        Self {
            segments: SegmentKind::ALL.map(Segment::new),
            active: SegmentKind::Code,
            allow_overlap: false,
            policy: default_policy,
            default_policy,
            org_seen: false,
        }
    }

    pub fn get(&self, kind: SegmentKind) -> &Segment {
        &self.segments[kind.index()]
    }

    fn get_mut(&mut self, kind: SegmentKind) -> &mut Segment {
        &mut self.segments[kind.index()]
    }

    pub fn active(&self) -> SegmentKind {
        self.active
    }

    pub fn current(&self) -> &Segment {
        self.get(self.active)
    }

    fn current_mut(&mut self) -> &mut Segment {
        let active = self.active;
        self.get_mut(active)
    }

    /// Whether `.ORG` was used or cells were placed in this pass.
    pub fn placed_anything(&self) -> bool {
        self.org_seen || self.segments.iter().any(|segment| segment.count() > 0)
    }

    /// Reset cursors to default-device bounds and select the code segment.
    /// Pass one also discards ranges and counters and opens the first range.
    pub fn begin_pass(&mut self, pass: Pass) {
        self.active = SegmentKind::Code;
        self.allow_overlap = false;
        self.org_seen = false;
        for segment in &mut self.segments {
            segment.set_bounds(&DEFAULT_DEVICE);
            if pass == Pass::One {
                segment.reset();
            } else {
                segment.rewind();
            }
        }
        if pass == Pass::One {
            self.policy = self.default_policy;
            let (allow, policy) = (self.allow_overlap, self.policy);
            self.current_mut().open_range(allow, policy);
        }
    }

    fn reopen<F>(&mut self, pass: Pass, change: F) -> Result<(), SegmentError>
    where
        F: FnOnce(&mut Self),
    {
        if pass == Pass::One {
            self.current_mut().close_range()?;
        }
        change(self);
        if pass == Pass::One {
            let (allow, policy) = (self.allow_overlap, self.policy);
            self.current_mut().open_range(allow, policy);
        }
        Ok(())
    }

    pub fn activate(&mut self, kind: SegmentKind, pass: Pass) -> Result<(), SegmentError> {
        self.reopen(pass, |segments| segments.active = kind)
    }

    pub fn org(&mut self, addr: i64, pass: Pass) -> Result<(), SegmentError> {
        self.reopen(pass, |segments| {
            segments.org_seen = true;
            segments.current_mut().set_addr(addr);
        })
    }

    pub fn set_overlap(&mut self, allow: bool, pass: Pass) -> Result<(), SegmentError> {
        self.reopen(pass, |segments| segments.allow_overlap = allow)
    }

    /// Set the overlap policy for the open range and later ones. `None`
    /// restores the configured default.
    pub fn set_policy(&mut self, policy: Option<OverlapPolicy>) {
        self.policy = policy.unwrap_or(self.default_policy);
        let policy = self.policy;
        self.current_mut().set_open_policy(policy);
    }

    pub fn apply_device(&mut self, device: &DeviceRecord, pass: Pass) -> Result<(), SegmentError> {
        self.reopen(pass, |segments| {
            for segment in &mut segments.segments {
                segment.set_bounds(device);
                segment.rewind();
            }
        })
    }

    pub fn advance(&mut self, cells: i64, pass: Pass) -> Result<(), SegmentError> {
        self.current_mut().advance(cells, pass)
    }

    /// Close the open range at the end of pass one.
    pub fn finish_pass(&mut self, pass: Pass) -> Result<(), SegmentError> {
        if pass == Pass::One {
            self.current_mut().close_range()?;
        }
        Ok(())
    }

    pub fn validate(&self, device_known: bool) -> Vec<RangeIssue> {
        let mut issues = Vec::new();
        if !device_known {
            issues.push(RangeIssue {
                severity: Severity::Warning,
                message: "No .DEVICE definition found. Cannot make useful address range check !"
                    .to_string(),
            });
        }
        for segment in &self.segments {
            issues.extend(segment.validate(device_known));
        }
        issues
    }

    pub fn write_used_blocks<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "Used memory blocks:")?;
        for segment in &self.segments {
            for (range, _) in segment.closed_ranges() {
                writeln!(out, "{}", segment.describe_range(range))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::device::lookup;

    fn segments_with_blocks(policy: OverlapPolicy, blocks: &[(i64, i64)]) -> Segments {
        let mut segments = Segments::new(policy);
        segments.begin_pass(Pass::One);
        for (start, len) in blocks {
            segments.org(*start, Pass::One).unwrap();
            segments.advance(*len, Pass::One).unwrap();
        }
        segments.finish_pass(Pass::One).unwrap();
        segments
    }

    fn count(issues: &[RangeIssue], severity: Severity) -> usize {
        issues.iter().filter(|issue| issue.severity == severity).count()
    }

    #[test]
    fn close_range_requires_an_open_range() {
        let mut segment = Segment::new(SegmentKind::Code);
        assert_eq!(
            segment.close_range(),
            Err(SegmentError::NoOpenRange(SegmentKind::Code))
        );
        segment.open_range(false, OverlapPolicy::Error);
        segment.advance(3, Pass::One).unwrap();
        assert_eq!(segment.close_range(), Ok(()));
        assert_eq!(segment.ranges()[0].length, Some(3));
        assert_eq!(
            segment.close_range(),
            Err(SegmentError::AlreadyClosed(SegmentKind::Code))
        );
    }

    #[test]
    fn advance_counts_only_in_pass_one() {
        let mut segment = Segment::new(SegmentKind::Eeprom);
        segment.advance(4, Pass::One).unwrap();
        segment.advance(2, Pass::Two).unwrap();
        assert_eq!(segment.addr(), 6);
        assert_eq!(segment.count(), 4);
        segment.rewind();
        assert_eq!(segment.addr(), 0);
    }

    #[test]
    fn advance_past_the_address_space_is_rejected() {
        let mut segment = Segment::new(SegmentKind::Data);
        segment.set_addr(i64::MAX - 1);
        assert_eq!(segment.advance(1, Pass::One), Ok(()));
        assert_eq!(
            segment.advance(1, Pass::One),
            Err(SegmentError::AddressOverflow(SegmentKind::Data))
        );
        assert_eq!(segment.addr(), i64::MAX);
        assert_eq!(segment.count(), 1);
    }

    #[test]
    fn overlap_is_reported_by_policy() {
        let blocks = [(0, 4), (2, 2)];
        let issues = segments_with_blocks(OverlapPolicy::Error, &blocks).validate(true);
        assert_eq!(count(&issues, Severity::Error), 1);

        let issues = segments_with_blocks(OverlapPolicy::Warn, &blocks).validate(true);
        assert_eq!(count(&issues, Severity::Error), 0);
        assert_eq!(count(&issues, Severity::Warning), 1);

        let issues = segments_with_blocks(OverlapPolicy::Ignore, &blocks).validate(true);
        assert!(issues.is_empty());
    }

    #[test]
    fn adjacent_blocks_do_not_overlap() {
        let issues = segments_with_blocks(OverlapPolicy::Error, &[(0, 4), (4, 4)]).validate(true);
        assert!(issues.is_empty());
    }

    #[test]
    fn overlap_allowed_ranges_are_exempt_from_pairing() {
        let mut segments = Segments::new(OverlapPolicy::Error);
        segments.begin_pass(Pass::One);
        segments.advance(4, Pass::One).unwrap();
        segments.set_overlap(true, Pass::One).unwrap();
        segments.org(0, Pass::One).unwrap();
        segments.advance(4, Pass::One).unwrap();
        segments.finish_pass(Pass::One).unwrap();
        assert!(segments.validate(true).is_empty());
    }

    #[test]
    fn bounds_errors_ignore_overlap_policy() {
        let mut segments = Segments::new(OverlapPolicy::Ignore);
        segments.begin_pass(Pass::One);
        let device = lookup(Some("ATtiny13")).unwrap();
        segments.apply_device(device, Pass::One).unwrap();
        segments.org(510, Pass::One).unwrap();
        segments.advance(4, Pass::One).unwrap();
        segments.finish_pass(Pass::One).unwrap();
        let issues = segments.validate(true);
        assert_eq!(count(&issues, Severity::Error), 1);
        assert!(issues[0].message.contains("above allowed high address"));
    }

    #[test]
    fn missing_device_degrades_bounds_to_warnings() {
        let mut segments = Segments::new(OverlapPolicy::Error);
        segments.begin_pass(Pass::One);
        segments.activate(SegmentKind::Data, Pass::One).unwrap();
        segments.org(0x10, Pass::One).unwrap();
        segments.advance(2, Pass::One).unwrap();
        segments.finish_pass(Pass::One).unwrap();
        let issues = segments.validate(false);
        assert_eq!(count(&issues, Severity::Error), 0);
        assert_eq!(count(&issues, Severity::Warning), 2);
    }

    #[test]
    fn pragma_policy_applies_to_the_open_range() {
        let mut segments = Segments::new(OverlapPolicy::Error);
        segments.begin_pass(Pass::One);
        segments.set_policy(Some(OverlapPolicy::Ignore));
        segments.advance(4, Pass::One).unwrap();
        segments.org(2, Pass::One).unwrap();
        segments.advance(2, Pass::One).unwrap();
        segments.finish_pass(Pass::One).unwrap();
        assert!(segments.validate(true).is_empty());
    }

    #[test]
    fn pass_two_keeps_ranges_and_rewinds() {
        let mut segments = segments_with_blocks(OverlapPolicy::Error, &[(0, 4)]);
        segments.begin_pass(Pass::Two);
        assert_eq!(segments.current().addr(), 0);
        segments.org(8, Pass::Two).unwrap();
        assert_eq!(segments.get(SegmentKind::Code).ranges().len(), 2);
        assert!(!segments.current().has_open_range());
    }

    #[test]
    fn used_blocks_listing_skips_empty_ranges() {
        let segments = segments_with_blocks(OverlapPolicy::Error, &[(0, 4)]);
        let mut out = Vec::new();
        segments.write_used_blocks(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Used memory blocks:\n   code      :  Start = 0x0000, End = 0x0003, Length = 0x0004 (4 words), Overlap=N\n"
        );
    }
}
