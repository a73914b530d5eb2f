// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! AVR Assembler - pass coordinator.
//!
//! Pass one discovers label addresses, constants and segment usage. Pass two
//! replays the same source with the pass-one values in hand, emits code and
//! checks that every label and constant comes out the same.
//!
//! ```text
//! SourceLoader → line pump → conditional scan / macro recording
//!              → label → directive | instruction | macro call
//! ```

pub mod cli;
mod directives;
mod output;
pub mod source;

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, trace};

use crate::core::assembler::error::{
    AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, LineStatus, PassCounts, Severity,
};
use crate::core::assembler::listing::{ListingCells, ListingLine, ListingWriter};
use crate::core::assembler::Pass;
use crate::core::conditional::{
    CondDirective, ConditionalEngine, ScanOutcome, SourceId, SourceLocation,
};
use crate::core::device::{self, DeviceRecord, DEFAULT_DEVICE};
use crate::core::encoder::{EncodeContext, MnemonicEncoder};
use crate::core::expr::{eval_str, EvalContext, EvalError};
use crate::core::imagestore::ImageStore;
use crate::core::macro_processor::{MacroEngine, MacroError, MAX_NESTING};
use crate::core::segment::{OverlapPolicy, SegmentKind, Segments};
use crate::core::symbol_table::{Namespace, SymbolTable, Symbols};
use crate::core::text_utils::{is_ident_char, is_ident_start, split_comment, split_operands};
use crate::families::avr::AvrEncoder;

use cli::{init_logging, validate_cli, Cli};
use source::{SourceLine, SourceLoader};

// Re-export public types
pub use crate::core::assembler::error::{AsmRunError as RunError, AsmRunReport as RunReport};
pub use cli::VERSION;

/// Errors tolerated before a pass gives up.
pub const DEFAULT_MAX_ERRORS: u32 = 10;

/// Run the assembler with command-line arguments.
pub fn run() -> Result<Vec<AsmRunReport>, AsmRunError> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    if cli.devices {
        device::write_device_list(io::stdout().lock())
            .map_err(|err| io_failure(&err.to_string(), Vec::new(), PassCounts::new()))?;
        return Ok(Vec::new());
    }
    let config = validate_cli(&cli)?;
    Ok(vec![run_one(&config)?])
}

/// Validated settings for one assembly run.
#[derive(Debug, Clone)]
pub struct AsmConfig {
    pub input: PathBuf,
    pub hex_path: PathBuf,
    pub eep_path: PathBuf,
    pub list_path: Option<PathBuf>,
    pub map_path: Option<PathBuf>,
    /// `-D` constants, defined before the first source line.
    pub defines: Vec<(String, i64)>,
    pub include_dirs: Vec<PathBuf>,
    pub list_macros: bool,
    pub max_errors: u32,
    pub overlap: OverlapPolicy,
    pub warn_register_reuse: bool,
    pub max_macro_depth: usize,
}

impl AsmConfig {
    /// Defaults for `input`, with the images written next to it.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        Self {
            hex_path: input.with_extension("hex"),
            eep_path: input.with_extension("eep.hex"),
            input,
            list_path: None,
            map_path: None,
            defines: Vec::new(),
            include_dirs: Vec::new(),
            list_macros: false,
            max_errors: DEFAULT_MAX_ERRORS,
            overlap: OverlapPolicy::default(),
            warn_register_reuse: true,
            max_macro_depth: MAX_NESTING,
        }
    }
}

/// Assemble the file named by `config`.
pub fn run_one(config: &AsmConfig) -> Result<AsmRunReport, AsmRunError> {
    run_with_loader(config, SourceLoader::new(config.include_dirs.clone()))
}

/// Assemble with a prepared source loader.
pub fn run_with_loader(
    config: &AsmConfig,
    loader: SourceLoader,
) -> Result<AsmRunReport, AsmRunError> {
    let mut assembler = Assembler::new(config.clone(), loader);
    let pass1 = assembler.pass1();
    if pass1.errors > 0 {
        output::remove_outputs(config);
        return Err(AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Assembler,
                "Errors detected in source. No output files created.",
                None,
            ),
            assembler.take_diagnostics(),
            pass1,
        ));
    }

    if let Some(path) = &config.list_path {
        match output::open_listing(path) {
            Ok(listing) => assembler.listing = Some(listing),
            Err(err) => {
                return Err(io_failure(
                    &err.to_string(),
                    assembler.take_diagnostics(),
                    pass1,
                ))
            }
        }
    }

    let pass2 = assembler.pass2();
    let totals = PassCounts {
        lines: pass2.lines,
        errors: pass1.errors + pass2.errors,
        warnings: pass1.warnings + pass2.warnings,
    };
    let listing = assembler.listing.take();
    if totals.errors > 0 {
        drop(listing);
        output::remove_outputs(config);
        return Err(AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Assembler,
                "Errors detected in source. No output files created.",
                None,
            ),
            assembler.take_diagnostics(),
            totals,
        ));
    }

    let written = match assembler.listing_error.take() {
        Some(err) => Err(err),
        None => output::write_outputs(config, &assembler, listing, &totals),
    };
    if let Err(err) = written {
        output::remove_outputs(config);
        return Err(io_failure(
            &err.to_string(),
            assembler.take_diagnostics(),
            totals,
        ));
    }
    Ok(AsmRunReport::new(assembler.take_diagnostics(), totals))
}

fn io_failure(message: &str, diagnostics: Vec<Diagnostic>, counts: PassCounts) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Io, message, None),
        diagnostics,
        counts,
    )
}

/// One-line result summary printed after a run.
pub fn summary(counts: &PassCounts) -> String {
    match (counts.errors, counts.warnings) {
        (0, 0) => "Assembly complete with no errors.".to_string(),
        (0, warnings) => format!(
            "Assembly complete with no errors ({warnings} {}).",
            plural(warnings, "warning")
        ),
        (errors, warnings) => format!(
            "Assembly aborted with {errors} {} and {warnings} {}.",
            plural(errors, "error"),
            plural(warnings, "warning")
        ),
    }
}

/// `addr` as an image cell address, if `cells` cells of `cell_bytes` bytes
/// starting there stay within 32-bit byte addresses.
fn image_address(addr: i64, cells: usize, cell_bytes: i64) -> Option<u32> {
    let end = addr
        .checked_add(i64::try_from(cells).ok()?)?
        .checked_mul(cell_bytes)?;
    u32::try_from(end).ok()?;
    u32::try_from(addr).ok()
}

fn plural(count: u32, word: &str) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// An open input on the line-source stack.
#[derive(Debug, Clone, Copy)]
enum Input {
    File {
        index: usize,
        id: u32,
        next: usize,
        line: u32,
    },
    Macro {
        call_id: u32,
    },
}

/// A line handed out by the pump.
#[derive(Debug, Clone)]
struct PumpLine {
    text: String,
    expansion: bool,
    form_feed: bool,
    too_long: bool,
}

impl PumpLine {
    fn from_source(line: &SourceLine) -> Self {
        Self {
            text: line.text.clone(),
            expansion: false,
            form_feed: line.form_feed,
            too_long: line.too_long,
        }
    }

    fn expanded(text: String) -> Self {
        Self {
            text,
            expansion: true,
            form_feed: false,
            too_long: false,
        }
    }
}

/// Cells emitted by the line being assembled, for the listing.
#[derive(Debug, Clone)]
struct Emitted {
    segment: SegmentKind,
    addr: i64,
    words: Vec<u16>,
    bytes: Vec<u8>,
}

/// A source line split into label, operation and operand text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedLine<'a> {
    label: Option<&'a str>,
    op: Option<&'a str>,
    operands: &'a str,
}

impl<'a> ParsedLine<'a> {
    fn parse(code: &'a str) -> Self {
        let mut rest = code.trim_start();
        let mut label = None;
        let bytes = rest.as_bytes();
        if bytes.first().is_some_and(|c| is_ident_start(*c)) {
            let end = bytes
                .iter()
                .position(|c| !is_ident_char(*c))
                .unwrap_or(bytes.len());
            if bytes.get(end) == Some(&b':') {
                label = Some(&rest[..end]);
                rest = rest[end + 1..].trim_start();
            }
        }
        let rest = rest.trim_end();
        if rest.is_empty() {
            return Self {
                label,
                op: None,
                operands: "",
            };
        }
        let end = rest
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(rest.len());
        Self {
            label,
            op: Some(&rest[..end]),
            operands: rest[end..].trim(),
        }
    }

    /// Upper-case directive name without its `.` or `#` prefix.
    fn directive(&self) -> Option<String> {
        let op = self.op?;
        let name = op.strip_prefix('.').or_else(|| op.strip_prefix('#'))?;
        Some(name.to_ascii_uppercase())
    }
}

/// Symbol and address view handed to the expression evaluator and encoder.
struct SymbolView<'a> {
    asm: &'a Assembler,
}

impl EvalContext for SymbolView<'_> {
    fn lookup_symbol(&self, name: &str) -> Option<i64> {
        let asm = self.asm;
        asm.macros
            .lookup_local(name)
            .or_else(|| asm.symbols.resolve(name))
            .or_else(|| {
                let pass_one = asm.pass_one.as_ref()?;
                pass_one
                    .lookup(Namespace::Label, name)
                    .or_else(|| pass_one.lookup(Namespace::Constant, name))
            })
    }

    fn current_address(&self) -> Option<i64> {
        Some(self.asm.segments.current().addr())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.asm.is_defined_now(name)
    }
}

impl EncodeContext for SymbolView<'_> {
    fn eval(&self, expr: &str) -> Result<i64, EvalError> {
        eval_str(expr, self)
    }

    fn register_alias(&self, name: &str) -> Option<u8> {
        self.asm.aliases.get(name).copied()
    }

    fn current_address(&self) -> i64 {
        self.asm.segments.current().addr()
    }

    fn device(&self) -> &DeviceRecord {
        self.asm.device
    }
}

struct Assembler {
    config: AsmConfig,
    loader: SourceLoader,
    encoder: AvrEncoder,
    pass: Pass,
    symbols: Symbols,
    /// Pass-one symbols, kept during pass two.
    pass_one: Option<Symbols>,
    aliases: SymbolTable<u8>,
    segments: Segments,
    conditionals: ConditionalEngine,
    macros: MacroEngine,
    device: &'static DeviceRecord,
    device_set: bool,
    code: ImageStore,
    eeprom: ImageStore,
    inputs: Vec<Input>,
    next_file_id: u32,
    counts: PassCounts,
    diagnostics: Vec<Diagnostic>,
    listing: Option<ListingWriter<Box<dyn Write>>>,
    listing_error: Option<io::Error>,
    list_on: bool,
    list_macros: bool,
    current_text: Option<String>,
    emitted: Option<Emitted>,
}

impl Assembler {
    fn new(config: AsmConfig, loader: SourceLoader) -> Self {
        Self {
            segments: Segments::new(config.overlap),
            macros: MacroEngine::new(config.max_macro_depth),
            list_macros: config.list_macros,
            config,
            loader,
            encoder: AvrEncoder::new(),
            pass: Pass::One,
            symbols: Symbols::new(),
            pass_one: None,
            aliases: SymbolTable::new(),
            conditionals: ConditionalEngine::new(),
            device: &DEFAULT_DEVICE,
            device_set: false,
            code: ImageStore::new(),
            eeprom: ImageStore::new(),
            inputs: Vec::new(),
            next_file_id: 0,
            counts: PassCounts::new(),
            diagnostics: Vec::new(),
            listing: None,
            listing_error: None,
            list_on: true,
            current_text: None,
            emitted: None,
        }
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn pass1(&mut self) -> PassCounts {
        self.run_pass(Pass::One)
    }

    fn pass2(&mut self) -> PassCounts {
        self.run_pass(Pass::Two)
    }

    fn begin_pass(&mut self, pass: Pass) {
        self.pass = pass;
        self.counts = PassCounts::new();
        match pass {
            Pass::One => {
                self.symbols = Symbols::new();
                self.pass_one = None;
            }
            Pass::Two => self.pass_one = Some(std::mem::take(&mut self.symbols)),
        }
        self.aliases = SymbolTable::new();
        self.segments.begin_pass(pass);
        self.conditionals.begin_pass(pass);
        self.macros.begin_pass(pass);
        self.loader.begin_pass();
        self.device = &DEFAULT_DEVICE;
        self.device_set = false;
        self.code.clear();
        self.eeprom.clear();
        self.inputs.clear();
        self.next_file_id = 0;
        self.list_on = true;
        self.list_macros = self.config.list_macros;
        self.current_text = None;
        self.emitted = None;
    }

    fn run_pass(&mut self, pass: Pass) -> PassCounts {
        self.begin_pass(pass);
        debug!(%pass, input = %self.config.input.display(), "begin");

        let mut status = self.predefine();
        if status != LineStatus::Fatal {
            status = self.open_root();
        }
        let mut completed = status != LineStatus::Fatal;
        while completed {
            let Some(line) = self.next_line() else {
                break;
            };
            self.current_text = Some(line.text.clone());
            self.emitted = None;
            let status = self.process_line(&line);
            self.list_line(&line);
            if status == LineStatus::Fatal {
                completed = false;
            } else if self.counts.errors >= self.config.max_errors.max(1) {
                self.note_always("Maximum error count reached. Exiting...");
                completed = false;
            }
        }
        self.end_pass(completed);
        debug!(
            %pass,
            lines = self.counts.lines,
            errors = self.counts.errors,
            warnings = self.counts.warnings,
            "end"
        );
        self.counts
    }

    /// Device constants, `-D` defines and the device variables.
    fn predefine(&mut self) -> LineStatus {
        let mut status = LineStatus::Ok;
        for (name, value) in device::predefined_constants() {
            status = status.max(self.define_symbol(Namespace::Constant, &name, value));
        }
        let defines = self.config.defines.clone();
        for (name, value) in &defines {
            status = status.max(self.define_symbol(Namespace::Constant, name, *value));
        }
        status.max(self.assign_device_variables())
    }

    fn assign_device_variables(&mut self) -> LineStatus {
        for (name, value) in device::device_variables(self.device) {
            if let Err(err) = self.symbols.assign(name, value) {
                return self.error(AsmErrorKind::Symbol, &err.to_string());
            }
        }
        LineStatus::Ok
    }

    fn open_root(&mut self) -> LineStatus {
        let path = self.config.input.clone();
        match self.loader.load(&path) {
            Ok(index) => {
                self.push_file(index);
                LineStatus::Ok
            }
            Err(err) => self.fatal(AsmErrorKind::Io, &err.to_string()),
        }
    }

    fn push_file(&mut self, index: usize) {
        let id = self.next_file_id;
        self.next_file_id += 1;
        self.inputs.push(Input::File {
            index,
            id,
            next: 0,
            line: 0,
        });
    }

    fn end_pass(&mut self, completed: bool) {
        self.current_text = None;
        if completed {
            if let Some(err) = self.macros.abandon_definition() {
                self.error(AsmErrorKind::Macro, &err.to_string());
            }
            if self.pass == Pass::One && self.conditionals.depth() > 0 {
                self.report(
                    Severity::Warning,
                    AsmErrorKind::Conditional,
                    "Found .IF without .ENDIF",
                );
            }
        }
        while self.macros.pop().is_some() {}
        self.inputs.clear();
        if let Err(err) = self.segments.finish_pass(self.pass) {
            self.fatal(AsmErrorKind::Segment, &err.to_string());
        }
        if self.pass == Pass::One && completed {
            for issue in self.segments.validate(self.device_set) {
                self.report(issue.severity, AsmErrorKind::Segment, &issue.message);
            }
        }
    }

    /// Next line from the innermost input, closing exhausted inputs.
    fn next_line(&mut self) -> Option<PumpLine> {
        loop {
            let top = self.inputs.len().checked_sub(1)?;
            if let Input::File {
                index, next, line, ..
            } = &mut self.inputs[top]
            {
                let source = self
                    .loader
                    .file(*index)
                    .and_then(|file| file.lines().get(*next));
                if let Some(source) = source {
                    *next += 1;
                    *line = source.number;
                    self.counts.lines += 1;
                    return Some(PumpLine::from_source(source));
                }
            } else {
                match self.macros.next_line() {
                    Some(Ok(expanded)) => return Some(PumpLine::expanded(expanded.text)),
                    Some(Err(err)) => {
                        self.error(AsmErrorKind::Macro, &err.to_string());
                        continue;
                    }
                    None => {}
                }
            }
            self.close_input(top);
        }
    }

    fn close_input(&mut self, top: usize) {
        let expansion = matches!(self.inputs[top], Input::Macro { .. });
        if let Err(err) = self.conditionals.end_source(top, expansion) {
            self.error(AsmErrorKind::Conditional, &err.to_string());
        }
        if expansion {
            self.macros.pop();
        }
        self.inputs.pop();
    }

    fn process_line(&mut self, line: &PumpLine) -> LineStatus {
        if line.too_long {
            return self.fatal(AsmErrorKind::Resource, "Line too long");
        }
        if line.form_feed {
            self.warn(
                AsmErrorKind::Assembler,
                "Found Formfeed char. Please remove it.",
            );
        }
        let (code, _) = split_comment(&line.text);
        let parsed = ParsedLine::parse(code);
        if self.macros.is_recording() {
            return self.record_macro_line(&parsed, &line.text);
        }
        if self.conditionals.is_skipping() {
            return self.skip_line(&parsed);
        }
        self.assemble_line(&parsed)
    }

    fn record_macro_line(&mut self, parsed: &ParsedLine<'_>, raw: &str) -> LineStatus {
        match parsed.directive().as_deref() {
            Some("ENDM" | "ENDMACRO") => match self.macros.end_definition() {
                Ok(name) => {
                    trace!(macro_name = %name, "macro defined");
                    LineStatus::Ok
                }
                Err(err @ MacroError::Redefined(_)) => {
                    self.report(Severity::Warning, AsmErrorKind::Macro, &err.to_string())
                }
                Err(err) => self.error(AsmErrorKind::Macro, &err.to_string()),
            },
            Some("MACRO") => {
                self.error(AsmErrorKind::Macro, &MacroError::NestedDefinition.to_string())
            }
            _ => {
                self.macros.record_line(raw);
                LineStatus::Ok
            }
        }
    }

    fn skip_line(&mut self, parsed: &ParsedLine<'_>) -> LineStatus {
        let directive = parsed
            .directive()
            .and_then(|name| CondDirective::classify(&name));
        match self.conditionals.scan(directive, parsed.operands) {
            ScanOutcome::Skip | ScanOutcome::Resume => LineStatus::Ok,
            ScanOutcome::EvaluateElseIf(expr) => {
                let (taken, status) =
                    self.eval_condition(&expr, ".ELSEIF / .ELIF needs an operand");
                self.conditionals.resolve_elseif(taken);
                status
            }
        }
    }

    fn assemble_line(&mut self, parsed: &ParsedLine<'_>) -> LineStatus {
        let directive = parsed.directive();
        let mut status = LineStatus::Ok;
        if let Some(label) = parsed.label {
            if directive.as_deref() != Some("ORG") {
                status = self.define_label(label);
                if status == LineStatus::Fatal {
                    return status;
                }
            }
        }
        let Some(op) = parsed.op else {
            return status;
        };
        let result = if let Some(name) = directive {
            self.process_directive(&name, parsed.operands, parsed.label)
        } else if self.encoder.is_mnemonic(op) {
            self.process_instruction(op, parsed.operands)
        } else if self.macros.is_macro(op) {
            self.invoke_macro(op, parsed.operands)
        } else {
            self.error(
                AsmErrorKind::Instruction,
                &format!("Unknown mnemonic/macro: {op}"),
            )
        };
        status.max(result)
    }

    fn process_instruction(&mut self, mnemonic: &str, operands: &str) -> LineStatus {
        let segment = self.segments.active();
        if segment != SegmentKind::Code {
            return self.error(
                AsmErrorKind::Instruction,
                &format!(
                    "Instructions are not allowed in the {} segment",
                    segment.name()
                ),
            );
        }
        let operands = split_operands(operands);
        let size = match self.encoder.size(mnemonic, &operands, self.device) {
            Ok(size) => i64::from(size),
            Err(err) => return self.error(AsmErrorKind::Instruction, &err.to_string()),
        };
        if self.pass == Pass::One {
            return self.advance(size);
        }

        let addr = self.segments.current().addr();
        let encoded = self
            .encoder
            .encode(mnemonic, &operands, &SymbolView { asm: self });
        let status = self.advance(size);
        if status != LineStatus::Ok {
            return status;
        }
        match encoded {
            Ok(words) => {
                let status = self.store_code(addr, &words);
                if status == LineStatus::Ok {
                    self.emitted = Some(Emitted {
                        segment,
                        addr,
                        words,
                        bytes: Vec::new(),
                    });
                }
                status
            }
            Err(err) => self.error(AsmErrorKind::Instruction, &err.to_string()),
        }
    }

    /// Move the active segment cursor past `cells` cells.
    fn advance(&mut self, cells: i64) -> LineStatus {
        match self.segments.advance(cells, self.pass) {
            Ok(()) => LineStatus::Ok,
            Err(err) => self.error(AsmErrorKind::Segment, &err.to_string()),
        }
    }

    /// Store program words starting at word address `addr`.
    fn store_code(&mut self, addr: i64, words: &[u16]) -> LineStatus {
        let Some(base) = image_address(addr, words.len(), 2) else {
            return self.outside_image(addr);
        };
        for (offset, word) in (0u32..).zip(words) {
            self.code.store_word(base + offset, *word);
        }
        LineStatus::Ok
    }

    fn outside_image(&mut self, addr: i64) -> LineStatus {
        self.error(
            AsmErrorKind::Segment,
            &format!("Address {addr} is outside the output image"),
        )
    }

    fn invoke_macro(&mut self, name: &str, args: &str) -> LineStatus {
        match self.macros.invoke(name, args) {
            Ok(call_id) => {
                trace!(macro_name = name, call_id, "expanding");
                self.inputs.push(Input::Macro { call_id });
                LineStatus::Ok
            }
            Err(err) if err.is_fatal() => self.fatal(AsmErrorKind::Resource, &err.to_string()),
            Err(err) => self.error(AsmErrorKind::Macro, &err.to_string()),
        }
    }

    fn in_expansion(&self) -> bool {
        self.macros.depth() > 0
    }

    fn define_label(&mut self, name: &str) -> LineStatus {
        let addr = self.segments.current().addr();
        if !self.in_expansion() {
            return self.define_symbol(Namespace::Label, name, addr);
        }
        let global = self.symbols.is_defined(name);
        match self.macros.define_local(name, addr, global) {
            Ok(()) => LineStatus::Ok,
            Err(err @ (MacroError::LocalMissing(_) | MacroError::LocalChanged { .. })) => {
                self.fatal(AsmErrorKind::Consistency, &err.to_string())
            }
            Err(err) => self.error(AsmErrorKind::Symbol, &err.to_string()),
        }
    }

    /// Define a label or constant; in pass two, check it against pass one.
    fn define_symbol(&mut self, namespace: Namespace, name: &str, value: i64) -> LineStatus {
        if let Err(err) = self.symbols.define(namespace, name, value) {
            return self.error(AsmErrorKind::Symbol, &err.to_string());
        }
        let Some(pass_one) = self.pass_one.as_ref() else {
            return LineStatus::Ok;
        };
        match pass_one.lookup(namespace, name) {
            None => self.fatal(
                AsmErrorKind::Consistency,
                &format!("{namespace} {name} is missing in pass 2"),
            ),
            Some(before) if before != value => self.fatal(
                AsmErrorKind::Consistency,
                &format!(
                    "{namespace} {name} changed value from {before} in pass 1 to {value} in pass 2"
                ),
            ),
            Some(_) => LineStatus::Ok,
        }
    }

    /// Defined so far in this pass, ignoring pass-one values.
    fn is_defined_now(&self, name: &str) -> bool {
        self.symbols.is_defined(name) || self.macros.is_local_defined(name)
    }

    fn eval(&self, expr: &str) -> Result<i64, EvalError> {
        eval_str(expr, &SymbolView { asm: self })
    }

    /// Evaluate a conditional expression. Errors count as false.
    fn eval_condition(&mut self, expr: &str, missing: &str) -> (bool, LineStatus) {
        if expr.trim().is_empty() {
            return (false, self.error(AsmErrorKind::Conditional, missing));
        }
        match self.eval(expr) {
            Ok(value) => (value != 0, LineStatus::Ok),
            Err(err) => (false, self.error(AsmErrorKind::Expression, &err.to_string())),
        }
    }

    /// Conditional nesting site of the current line.
    fn site(&self) -> SourceLocation {
        match self.inputs.last() {
            Some(Input::File { id, line, .. }) => SourceLocation {
                source: SourceId::File(*id),
                line: *line,
            },
            Some(Input::Macro { call_id }) => SourceLocation {
                source: SourceId::Expansion(*call_id),
                line: self.macros.top().map_or(0, |frame| frame.line_index() as u32),
            },
            None => SourceLocation {
                source: SourceId::File(0),
                line: 0,
            },
        }
    }

    /// Innermost file input and its current line.
    fn file_position(&self) -> Option<(usize, u32)> {
        self.inputs.iter().rev().find_map(|input| match input {
            Input::File { index, line, .. } => Some((*index, *line)),
            Input::Macro { .. } => None,
        })
    }

    fn location(&self) -> (Option<String>, u32) {
        match self.file_position() {
            Some((index, line)) => (
                self.loader.file(index).map(|file| file.name().to_string()),
                line,
            ),
            None => (Some(self.config.input.display().to_string()), 0),
        }
    }

    /// Definition file and line of the macro body line being expanded.
    fn macro_site(&self) -> Option<(String, u32)> {
        if !matches!(self.inputs.last(), Some(Input::Macro { .. })) {
            return None;
        }
        let frame = self.macros.top()?;
        let def = self.macros.definition_of(frame)?;
        Some((def.file.clone(), def.line + frame.line_index() as u32))
    }

    fn report(&mut self, severity: Severity, kind: AsmErrorKind, message: &str) -> LineStatus {
        let (file, line) = self.location();
        let diag = Diagnostic::new(line, severity, AsmError::new(kind, message, None))
            .with_file(file)
            .with_source(self.current_text.clone())
            .with_macro_site(self.macro_site());
        self.counts.record(severity);
        if let Some(listing) = self.listing.as_mut() {
            if let Err(err) = listing.write_diagnostic(&diag) {
                self.listing = None;
                self.listing_error = Some(err);
            }
        }
        self.diagnostics.push(diag);
        match severity {
            Severity::Error => LineStatus::Error,
            Severity::Warning | Severity::Note => LineStatus::Ok,
        }
    }

    fn error(&mut self, kind: AsmErrorKind, message: &str) -> LineStatus {
        self.report(Severity::Error, kind, message)
    }

    fn fatal(&mut self, kind: AsmErrorKind, message: &str) -> LineStatus {
        self.report(Severity::Error, kind, message);
        LineStatus::Fatal
    }

    /// Warnings are reported in pass two, pass one would repeat them.
    fn warn(&mut self, kind: AsmErrorKind, message: &str) -> LineStatus {
        if self.pass == Pass::Two {
            self.report(Severity::Warning, kind, message);
        }
        LineStatus::Ok
    }

    fn note(&mut self, message: &str) -> LineStatus {
        if self.pass == Pass::Two {
            self.report(Severity::Note, AsmErrorKind::Assembler, message);
        }
        LineStatus::Ok
    }

    fn note_always(&mut self, message: &str) {
        self.report(Severity::Note, AsmErrorKind::Assembler, message);
    }

    fn list_line(&mut self, line: &PumpLine) {
        if self.pass != Pass::Two || !self.list_on || (line.expansion && !self.list_macros) {
            return;
        }
        let Some(listing) = self.listing.as_mut() else {
            return;
        };
        let (segment, addr, cells) = match &self.emitted {
            Some(emitted) if !emitted.words.is_empty() => (
                emitted.segment,
                emitted.addr,
                ListingCells::Words(&emitted.words),
            ),
            Some(emitted) => (
                emitted.segment,
                emitted.addr,
                ListingCells::Bytes(&emitted.bytes),
            ),
            None => (self.segments.active(), 0, ListingCells::None),
        };
        let written = listing.write_line(ListingLine {
            segment,
            addr,
            cells,
            source: &line.text,
        });
        if let Err(err) = written {
            self.listing = None;
            self.listing_error = Some(err);
        }
    }
}
