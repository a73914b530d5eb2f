// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Directive handlers.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::core::assembler::error::{AsmErrorKind, LineStatus};
use crate::core::assembler::Pass;
use crate::core::conditional::CondDirective;
use crate::core::device;
use crate::core::macro_processor::MacroError;
use crate::core::segment::{OverlapPolicy, SegmentKind};
use crate::core::symbol_table::Namespace;
use crate::core::text_utils::{
    is_ident_char, is_ident_start, parse_string_literal, split_operands,
};
use crate::families::avr::register_number;

use super::{image_address, Assembler, Emitted, Input};

/// Nested `.INCLUDE` files allowed at once.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Split `name = expr` at the first `=`.
fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, expr) = text.split_once('=')?;
    let (name, expr) = (name.trim(), expr.trim());
    if name.is_empty() || expr.is_empty() {
        return None;
    }
    Some((name, expr))
}

fn is_symbol_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.first().is_some_and(|c| is_ident_start(*c)) && bytes.iter().all(|c| is_ident_char(*c))
}

/// Include and message operands may be quoted or bare.
fn unquote(text: &str) -> Option<String> {
    let text = text.trim();
    if text.starts_with('"') {
        parse_string_literal(text).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    } else {
        Some(text.to_string())
    }
}

impl Assembler {
    pub(super) fn process_directive(
        &mut self,
        name: &str,
        operands: &str,
        label: Option<&str>,
    ) -> LineStatus {
        if let Some(directive) = CondDirective::classify(name) {
            return self.conditional_directive(directive, operands);
        }
        match name {
            "BYTE" => self.directive_byte(operands),
            "CSEG" => self.select_segment(SegmentKind::Code),
            "DSEG" => self.select_segment(SegmentKind::Data),
            "ESEG" => self.select_segment(SegmentKind::Eeprom),
            "CSEGSIZE" => LineStatus::Ok,
            "DB" => self.directive_db(operands),
            "DW" => self.directive_dw(operands),
            "DEF" => self.directive_def(operands),
            "UNDEF" => self.directive_undef(operands),
            "DEVICE" => self.directive_device(operands),
            "EQU" => self.directive_equ(operands),
            "SET" => self.directive_set(operands),
            "DEFINE" => self.directive_define(operands),
            "ORG" => self.directive_org(operands, label),
            "EXIT" => self.directive_exit(),
            "INCLUDE" => self.directive_include(operands),
            "INCLUDEPATH" => self.directive_includepath(operands),
            "LIST" => {
                self.list_on = true;
                LineStatus::Ok
            }
            "NOLIST" => {
                self.list_on = false;
                LineStatus::Ok
            }
            "LISTMAC" => {
                self.list_macros = true;
                LineStatus::Ok
            }
            "MACRO" => self.directive_macro(operands),
            "ENDM" | "ENDMACRO" => {
                self.error(AsmErrorKind::Macro, &MacroError::EndWithoutMacro.to_string())
            }
            "MESSAGE" => self.directive_message(operands),
            "WARNING" => self.directive_warning(operands),
            "ERROR" => self.directive_error(operands),
            "PRAGMA" => self.directive_pragma(operands),
            "OVERLAP" => self.segment_overlap(true),
            "NOOVERLAP" => self.segment_overlap(false),
            _ => self.error(
                AsmErrorKind::Directive,
                &format!("Unknown directive: .{name}"),
            ),
        }
    }

    // ---- conditionals ----

    fn conditional_directive(&mut self, directive: CondDirective, operands: &str) -> LineStatus {
        let origin = self.inputs.len().saturating_sub(1);
        match directive {
            CondDirective::If => {
                let (taken, status) = self.eval_condition(operands, ".IF needs an expression");
                self.conditionals.enter_if(taken, origin);
                status
            }
            CondDirective::IfDef | CondDirective::IfNDef => {
                let negate = directive == CondDirective::IfNDef;
                let Some(name) = operands.split_whitespace().next() else {
                    self.conditionals.enter_if(false, origin);
                    let message = if negate {
                        ".IFNDEF needs an operand"
                    } else {
                        ".IFDEF needs an operand"
                    };
                    return self.error(AsmErrorKind::Conditional, message);
                };
                let defined = self.is_defined_now(name);
                let site = self.site();
                let taken =
                    self.conditionals
                        .enter_ifdef(negate, defined, self.pass, site, origin);
                trace!(symbol = name, negate, taken, "ifdef");
                LineStatus::Ok
            }
            CondDirective::Else | CondDirective::ElseIf => {
                match self.conditionals.enter_else(origin) {
                    Ok(()) => LineStatus::Ok,
                    Err(err) => self.error(AsmErrorKind::Conditional, &err.to_string()),
                }
            }
            CondDirective::EndIf => match self.conditionals.end_if() {
                Ok(()) => LineStatus::Ok,
                Err(err) => self.error(AsmErrorKind::Conditional, &err.to_string()),
            },
        }
    }

    // ---- segments ----

    fn select_segment(&mut self, kind: SegmentKind) -> LineStatus {
        if let Err(err) = self.segments.activate(kind, self.pass) {
            return self.fatal(AsmErrorKind::Segment, &err.to_string());
        }
        match kind {
            SegmentKind::Data if self.device.ram_size == 0 => self.error(
                AsmErrorKind::Segment,
                "Can't use .DSEG directive because device has no RAM",
            ),
            SegmentKind::Eeprom if self.device.eeprom_size == 0 => self.error(
                AsmErrorKind::Segment,
                "Can't use .ESEG directive because device has no EEPROM",
            ),
            _ => LineStatus::Ok,
        }
    }

    fn segment_overlap(&mut self, allow: bool) -> LineStatus {
        match self.segments.set_overlap(allow, self.pass) {
            Ok(()) => LineStatus::Ok,
            Err(err) => self.fatal(AsmErrorKind::Segment, &err.to_string()),
        }
    }

    fn directive_org(&mut self, operands: &str, label: Option<&str>) -> LineStatus {
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, ".ORG needs an operand");
        }
        let addr = match self.eval(operands) {
            Ok(addr) => addr,
            Err(err) => return self.error(AsmErrorKind::Expression, &err.to_string()),
        };
        if let Err(err) = self.segments.org(addr, self.pass) {
            return self.fatal(AsmErrorKind::Segment, &err.to_string());
        }
        match label {
            Some(label) => self.define_label(label),
            None => LineStatus::Ok,
        }
    }

    fn directive_byte(&mut self, operands: &str) -> LineStatus {
        if self.segments.active() == SegmentKind::Code {
            return self.error(
                AsmErrorKind::Directive,
                ".BYTE directive cannot be used within the code segment (.CSEG)",
            );
        }
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, ".BYTE needs a size operand");
        }
        let size = match self.eval(operands) {
            Ok(size) => size,
            Err(err) => return self.error(AsmErrorKind::Expression, &err.to_string()),
        };
        if size < 0 {
            return self.error(
                AsmErrorKind::Directive,
                ".BYTE directive must have nonnegative operand",
            );
        }
        self.advance(size)
    }

    fn directive_db(&mut self, operands: &str) -> LineStatus {
        let segment = self.segments.active();
        if segment == SegmentKind::Data {
            return self.error(
                AsmErrorKind::Directive,
                "Can't use .DB directive in data segment (.DSEG) !",
            );
        }
        let mut status = LineStatus::Ok;
        let mut bytes = Vec::new();
        for item in split_operands(operands) {
            if item.starts_with('"') {
                match parse_string_literal(item) {
                    Some(text) => {
                        if text.iter().any(|b| *b > 127) {
                            self.warn(
                                AsmErrorKind::Directive,
                                "Found .DB string with characters > code 127. Be careful !",
                            );
                        }
                        bytes.extend(text);
                    }
                    None => {
                        status = status.max(self.error(
                            AsmErrorKind::Directive,
                            "String is missing a closing \"-sign",
                        ));
                    }
                }
                continue;
            }
            if self.pass == Pass::One {
                bytes.push(0);
                continue;
            }
            match self.eval(item) {
                Ok(value) => {
                    if !(-128..=255).contains(&value) {
                        self.warn(
                            AsmErrorKind::Directive,
                            &format!("Value {value} is out of range (-128 <= k <= 255). Will be masked"),
                        );
                    }
                    bytes.push(value as u8);
                }
                Err(err) => {
                    status = status.max(self.error(AsmErrorKind::Expression, &err.to_string()));
                    bytes.push(0);
                }
            }
        }

        if segment == SegmentKind::Code {
            if bytes.len() % 2 == 1 {
                self.warn(
                    AsmErrorKind::Directive,
                    "A .DB segment with an odd number of bytes is detected. A zero byte is added.",
                );
                bytes.push(0);
            }
            let words = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            status = status.max(self.emit_words(words));
        } else {
            status = status.max(self.emit_bytes(bytes));
        }
        status
    }

    fn directive_dw(&mut self, operands: &str) -> LineStatus {
        let segment = self.segments.active();
        if segment == SegmentKind::Data {
            return self.error(
                AsmErrorKind::Directive,
                "Can't use .DW directive in data segment (.DSEG)",
            );
        }
        let mut status = LineStatus::Ok;
        let mut words = Vec::new();
        for item in split_operands(operands) {
            if self.pass == Pass::One {
                words.push(0);
                continue;
            }
            match self.eval(item) {
                Ok(value) => {
                    if !(-32768..=65535).contains(&value) {
                        self.warn(
                            AsmErrorKind::Directive,
                            &format!(
                                "Value {value} is out of range (-32768 <= k <= 65535). Will be masked"
                            ),
                        );
                    }
                    words.push(value as u16);
                }
                Err(err) => {
                    status = status.max(self.error(AsmErrorKind::Expression, &err.to_string()));
                    words.push(0);
                }
            }
        }

        if segment == SegmentKind::Code {
            status = status.max(self.emit_words(words));
        } else {
            let bytes = words.iter().flat_map(|word| word.to_le_bytes()).collect();
            status = status.max(self.emit_bytes(bytes));
        }
        status
    }

    /// Place program words at the code cursor.
    fn emit_words(&mut self, words: Vec<u16>) -> LineStatus {
        let addr = self.segments.current().addr();
        let status = self.advance(words.len() as i64);
        if status != LineStatus::Ok || self.pass == Pass::One || words.is_empty() {
            return status;
        }
        let status = self.store_code(addr, &words);
        if status == LineStatus::Ok {
            self.emitted = Some(Emitted {
                segment: SegmentKind::Code,
                addr,
                words,
                bytes: Vec::new(),
            });
        }
        status
    }

    /// Place bytes at the EEPROM cursor.
    fn emit_bytes(&mut self, bytes: Vec<u8>) -> LineStatus {
        let addr = self.segments.current().addr();
        let status = self.advance(bytes.len() as i64);
        if status != LineStatus::Ok || self.pass == Pass::One || bytes.is_empty() {
            return status;
        }
        let Some(base) = image_address(addr, bytes.len(), 1) else {
            return self.outside_image(addr);
        };
        self.eeprom.store_slice(base, &bytes);
        self.emitted = Some(Emitted {
            segment: SegmentKind::Eeprom,
            addr,
            words: Vec::new(),
            bytes,
        });
        LineStatus::Ok
    }

    // ---- symbols ----

    fn directive_equ(&mut self, operands: &str) -> LineStatus {
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, ".EQU needs an operand");
        }
        let Some((name, expr)) = split_assignment(operands) else {
            return self.error(
                AsmErrorKind::Directive,
                &format!("{operands} needs an expression (e.g. .EQU BZZZT = 0x2a)"),
            );
        };
        if !is_symbol_name(name) {
            return self.error(
                AsmErrorKind::Symbol,
                &format!("Invalid symbol name: {name}"),
            );
        }
        match self.eval(expr) {
            Ok(value) => self.define_symbol(Namespace::Constant, name, value),
            Err(err) => self.error(AsmErrorKind::Expression, &err.to_string()),
        }
    }

    fn directive_set(&mut self, operands: &str) -> LineStatus {
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, ".SET needs an operand");
        }
        let Some((name, expr)) = split_assignment(operands) else {
            return self.error(
                AsmErrorKind::Directive,
                &format!("{operands} needs an expression (e.g. .SET BZZZT = 0x2a)"),
            );
        };
        if !is_symbol_name(name) {
            return self.error(
                AsmErrorKind::Symbol,
                &format!("Invalid symbol name: {name}"),
            );
        }
        let value = match self.eval(expr) {
            Ok(value) => value,
            Err(err) => return self.error(AsmErrorKind::Expression, &err.to_string()),
        };
        match self.symbols.assign(name, value) {
            Ok(()) => LineStatus::Ok,
            Err(err) => self.error(AsmErrorKind::Symbol, &err.to_string()),
        }
    }

    /// `.DEFINE name [value]`, the value defaulting to 1.
    fn directive_define(&mut self, operands: &str) -> LineStatus {
        let end = operands
            .find(|c: char| c.is_ascii_whitespace() || c == '=')
            .unwrap_or(operands.len());
        let (name, rest) = operands.split_at(end);
        if name.is_empty() {
            return self.error(AsmErrorKind::Directive, ".DEFINE needs an operand");
        }
        if !is_symbol_name(name) {
            return self.error(
                AsmErrorKind::Symbol,
                &format!("Invalid symbol name: {name}"),
            );
        }
        let expr = rest.trim().trim_start_matches('=').trim();
        let value = if expr.is_empty() {
            1
        } else {
            match self.eval(expr) {
                Ok(value) => value,
                Err(err) => return self.error(AsmErrorKind::Expression, &err.to_string()),
            }
        };
        self.define_symbol(Namespace::Constant, name, value)
    }

    fn directive_def(&mut self, operands: &str) -> LineStatus {
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, ".DEF needs an operand");
        }
        let Some((name, reg_text)) = split_assignment(operands) else {
            return self.error(
                AsmErrorKind::Directive,
                &format!("{operands} needs a register (e.g. .def BZZZT = r16)"),
            );
        };
        if !is_symbol_name(name) {
            return self.error(
                AsmErrorKind::Symbol,
                &format!("Invalid symbol name: {name}"),
            );
        }
        let Some(reg) =
            register_number(reg_text).or_else(|| self.aliases.get(reg_text).copied())
        else {
            return self.error(
                AsmErrorKind::Directive,
                &format!("{reg_text} is not a valid register"),
            );
        };

        if self.config.warn_register_reuse {
            let other = self
                .aliases
                .iter()
                .find(|(alias, bound)| **bound == reg && !alias.eq_ignore_ascii_case(name))
                .map(|(alias, _)| alias.to_string());
            if let Some(other) = other {
                self.warn(
                    AsmErrorKind::Symbol,
                    &format!("r{reg} is already assigned to '{other}'!"),
                );
            }
            if let Some(old) = self.aliases.get(name).copied().filter(|old| *old != reg) {
                self.warn(
                    AsmErrorKind::Symbol,
                    &format!("'{name}' is already assigned as r{old} but will now be set to r{reg}!"),
                );
            }
        }
        if self.symbols.is_defined(name) {
            self.warn(
                AsmErrorKind::Symbol,
                &format!("Name '{name}' is used for a register and a label/constant"),
            );
        }
        match self.aliases.set(name, reg) {
            Ok(_) => LineStatus::Ok,
            Err(err) => self.error(AsmErrorKind::Symbol, &err.to_string()),
        }
    }

    fn directive_undef(&mut self, operands: &str) -> LineStatus {
        let Some(name) = operands.split_whitespace().next() else {
            return self.error(AsmErrorKind::Directive, ".UNDEF needs an operand");
        };
        match self.aliases.remove(name) {
            Ok(Some(_)) => LineStatus::Ok,
            Ok(None) => self.warn(
                AsmErrorKind::Symbol,
                &format!("{name} is not a register alias"),
            ),
            Err(err) => self.error(AsmErrorKind::Symbol, &err.to_string()),
        }
    }

    fn directive_device(&mut self, operands: &str) -> LineStatus {
        let Some(name) = operands.split_whitespace().next() else {
            return self.error(AsmErrorKind::Directive, ".DEVICE needs an operand");
        };
        if self.device_set {
            return self.error(AsmErrorKind::Directive, "More than one .DEVICE definition");
        }
        if self.pass == Pass::One && self.segments.placed_anything() {
            return self.error(
                AsmErrorKind::Directive,
                ".DEVICE definition must be before any code lines",
            );
        }
        let Some(record) = device::lookup(Some(name)) else {
            return self.error(AsmErrorKind::Directive, &format!("Unknown device: {name}"));
        };
        debug!(device = record.display_name(), pass = %self.pass, "device selected");
        self.device = record;
        self.device_set = true;
        if let Err(err) = self.segments.apply_device(record, self.pass) {
            return self.fatal(AsmErrorKind::Segment, &err.to_string());
        }
        self.assign_device_variables()
    }

    // ---- source files ----

    /// Stop reading the current file and any expansion running inside it.
    fn directive_exit(&mut self) -> LineStatus {
        let expansions = self
            .inputs
            .iter()
            .rev()
            .take_while(|input| matches!(input, Input::Macro { .. }))
            .count();
        self.macros.exit_frames(expansions);
        if let Some(Input::File { next, .. }) = self
            .inputs
            .iter_mut()
            .rev()
            .find(|input| matches!(input, Input::File { .. }))
        {
            *next = usize::MAX;
        }
        LineStatus::Ok
    }

    fn current_dir(&self) -> Option<PathBuf> {
        let (index, _) = self.file_position()?;
        self.loader
            .file(index)
            .and_then(|file| file.dir())
            .map(|dir| dir.to_path_buf())
    }

    fn directive_include(&mut self, operands: &str) -> LineStatus {
        let Some(name) = unquote(operands).filter(|name| !name.is_empty()) else {
            return self.error(AsmErrorKind::Directive, "Nothing to include");
        };
        let base = self.current_dir();
        let Some(path) = self.loader.resolve(&name, base.as_deref()) else {
            return self.error(
                AsmErrorKind::Io,
                &format!("Cannot find include file: {name}"),
            );
        };
        let open_files = self
            .inputs
            .iter()
            .filter(|input| matches!(input, Input::File { .. }))
            .count();
        if open_files >= MAX_INCLUDE_DEPTH {
            return self.fatal(
                AsmErrorKind::Resource,
                &format!("Include nesting too deep, limit is {MAX_INCLUDE_DEPTH} files"),
            );
        }
        match self.loader.load(&path) {
            Ok(index) => {
                trace!(path = %path.display(), "include");
                self.push_file(index);
                LineStatus::Ok
            }
            Err(err) => self.error(AsmErrorKind::Io, &err.to_string()),
        }
    }

    fn directive_includepath(&mut self, operands: &str) -> LineStatus {
        let Some(dir) = unquote(operands).filter(|dir| !dir.is_empty()) else {
            return self.error(AsmErrorKind::Directive, ".INCLUDEPATH needs an operand");
        };
        self.loader.add_include_dir(dir);
        LineStatus::Ok
    }

    // ---- macros ----

    fn directive_macro(&mut self, operands: &str) -> LineStatus {
        let name = operands.split_whitespace().next().unwrap_or_default();
        let (file, line) = self.location();
        let file = file.unwrap_or_default();
        match self.macros.begin_definition(name, &file, line) {
            Ok(()) => LineStatus::Ok,
            Err(err) => self.error(AsmErrorKind::Macro, &err.to_string()),
        }
    }

    // ---- messages ----

    fn directive_message(&mut self, operands: &str) -> LineStatus {
        if operands.is_empty() {
            return self.error(AsmErrorKind::Directive, "No message parameter supplied");
        }
        if self.pass == Pass::One {
            return LineStatus::Ok;
        }
        let mut text = String::new();
        for item in split_operands(operands) {
            if item.starts_with('"') {
                match unquote(item) {
                    Some(part) => text.push_str(&part),
                    None => {
                        return self.error(
                            AsmErrorKind::Directive,
                            "String is missing a closing \"-sign",
                        )
                    }
                }
                continue;
            }
            match self.eval(item) {
                Ok(value) => text.push_str(&format!("0x{value:02X}")),
                Err(err) => return self.error(AsmErrorKind::Expression, &err.to_string()),
            }
        }
        self.note(&text)
    }

    /// Quoted text of `.WARNING` and `.ERROR`.
    fn message_text(&mut self, operands: &str, missing: &str) -> Result<String, LineStatus> {
        if operands.is_empty() {
            return Err(self.error(AsmErrorKind::Directive, missing));
        }
        if !operands.starts_with('"') {
            return Err(self.error(
                AsmErrorKind::Directive,
                "String must be enclosed in \"-signs",
            ));
        }
        unquote(operands).ok_or_else(|| {
            self.error(
                AsmErrorKind::Directive,
                "String is missing a closing \"-sign",
            )
        })
    }

    fn directive_warning(&mut self, operands: &str) -> LineStatus {
        if self.pass == Pass::One {
            return LineStatus::Ok;
        }
        match self.message_text(operands, "No warning string supplied") {
            Ok(text) => self.warn(AsmErrorKind::Assembler, &text),
            Err(status) => status,
        }
    }

    fn directive_error(&mut self, operands: &str) -> LineStatus {
        let status = match self.message_text(operands, "No error string supplied") {
            Ok(text) => self.error(AsmErrorKind::Assembler, &text),
            Err(status) => status,
        };
        let limit = self.config.max_errors.max(1);
        self.counts.errors = self.counts.errors.max(limit);
        status
    }

    fn directive_pragma(&mut self, operands: &str) -> LineStatus {
        let mut words = operands.split_whitespace();
        let Some(pragma) = words.next() else {
            return self.error(
                AsmErrorKind::Directive,
                "PRAGMA needs an operand, OVERLAP should be specified",
            );
        };
        if !pragma.eq_ignore_ascii_case("OVERLAP") {
            return self.note(&format!(
                "PRAGMA {} directive currently ignored",
                pragma.to_ascii_uppercase()
            ));
        }
        if self.pass == Pass::Two {
            return LineStatus::Ok;
        }
        let policy = match words.next().map(str::to_ascii_uppercase).as_deref() {
            Some("DEFAULT") => None,
            Some("IGNORE") => Some(OverlapPolicy::Ignore),
            Some("WARNING") => Some(OverlapPolicy::Warn),
            Some("ERROR") => Some(OverlapPolicy::Error),
            _ => {
                return self.error(
                    AsmErrorKind::Directive,
                    "For PRAGMA OVERLAP directive DEFAULT, IGNORE, WARNING, ERROR should be specified as the parameter",
                )
            }
        };
        self.segments.set_policy(policy);
        LineStatus::Ok
    }
}
