// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use super::{run_one, summary, AsmConfig, Assembler, LineStatus, ParsedLine, Severity};
use crate::core::assembler::error::PassCounts;
use crate::core::assembler::Pass;
use crate::core::segment::{OverlapPolicy, SegmentKind};
use crate::core::symbol_table::{Namespace, Symbols};
use crate::assembler::source::SourceLoader;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

struct Outcome {
    asm: Assembler,
    pass1: PassCounts,
    pass2: Option<PassCounts>,
}

impl Outcome {
    fn messages(&self, severity: Severity) -> Vec<String> {
        self.asm
            .diagnostics
            .iter()
            .filter(|diag| diag.severity() == severity)
            .map(|diag| diag.error().message().to_string())
            .collect()
    }

    fn errors(&self) -> Vec<String> {
        self.messages(Severity::Error)
    }

    fn warnings(&self) -> Vec<String> {
        self.messages(Severity::Warning)
    }

    fn assert_clean(&self) {
        assert_eq!(self.pass1.errors, 0, "pass 1 errors: {:?}", self.errors());
        let pass2 = self.pass2.expect("pass 2 ran");
        assert_eq!(pass2.errors, 0, "pass 2 errors: {:?}", self.errors());
    }

    /// Program words `0..count` of the code image.
    fn words(&self, count: u32) -> Vec<u16> {
        (0..count)
            .map(|addr| {
                let lo = self.asm.code.get(addr * 2).unwrap_or(0xFF);
                let hi = self.asm.code.get(addr * 2 + 1).unwrap_or(0xFF);
                u16::from_le_bytes([lo, hi])
            })
            .collect()
    }

    fn eeprom(&self, count: u32) -> Vec<u8> {
        (0..count)
            .map(|addr| self.asm.eeprom.get(addr).unwrap_or(0xFF))
            .collect()
    }

    fn label(&self, name: &str) -> Option<i64> {
        self.asm.symbols.lookup(Namespace::Label, name)
    }
}

fn assemble_with(config: AsmConfig, files: &[(&str, &str)]) -> Outcome {
    let mut loader = SourceLoader::default();
    for (path, text) in files {
        loader = loader.with_source(*path, *text);
    }
    let mut asm = Assembler::new(config, loader);
    let pass1 = asm.pass1();
    let pass2 = (pass1.errors == 0).then(|| asm.pass2());
    Outcome { asm, pass1, pass2 }
}

fn assemble(source: &str) -> Outcome {
    assemble_with(AsmConfig::new("main.asm"), &[("main.asm", source)])
}

fn create_temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("target")
        .join(format!("test-{label}-{}-{nanos}", process::id()));
    fs::create_dir_all(&dir).expect("Create temp dir");
    dir
}

#[test]
fn parses_label_operation_and_operands() {
    let line = ParsedLine::parse("  loop:  brne loop ");
    assert_eq!(line.label, Some("loop"));
    assert_eq!(line.op, Some("brne"));
    assert_eq!(line.operands, "loop");

    let line = ParsedLine::parse(".equ N = 4");
    assert_eq!(line.label, None);
    assert_eq!(line.directive().as_deref(), Some("EQU"));
    assert_eq!(line.operands, "N = 4");

    let line = ParsedLine::parse("#include \"x.inc\"");
    assert_eq!(line.directive().as_deref(), Some("INCLUDE"));

    let line = ParsedLine::parse("start:");
    assert_eq!(line.label, Some("start"));
    assert_eq!(line.op, None);
}

#[test]
fn constants_and_words_fill_one_range() {
    let out = assemble(".DEVICE ATmega8\n.EQU N = 4\n.ORG 0\n.DW 1, 2, 3, N\n");
    out.assert_clean();
    assert_eq!(out.words(4), vec![1, 2, 3, 4]);
    let used: Vec<(i64, Option<i64>)> = out
        .asm
        .segments
        .get(SegmentKind::Code)
        .ranges()
        .iter()
        .filter(|range| range.length.unwrap_or(0) > 0)
        .map(|range| (range.start, range.length))
        .collect();
    assert_eq!(used, vec![(0, Some(4))]);
}

#[test]
fn forward_references_resolve_in_pass_two() {
    let out = assemble(".DEVICE ATmega8\nrjmp done\nnop\ndone: rjmp done\n");
    out.assert_clean();
    assert_eq!(out.words(3), vec![0xC001, 0x0000, 0xCFFF]);
    assert_eq!(out.label("done"), Some(2));
}

#[test]
fn missing_device_warns_once() {
    let out = assemble("nop\n");
    out.assert_clean();
    assert_eq!(
        out.warnings(),
        vec!["No .DEVICE definition found. Cannot make useful address range check !"]
    );
}

#[test]
fn macro_labels_are_local_to_each_call() {
    let source = "\
.DEVICE ATmega8
.MACRO DELAY
loop: dec r16
      brne loop
.ENDM
DELAY
DELAY
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(4), vec![0x950A, 0xF7F1, 0x950A, 0xF7F1]);
    assert_eq!(out.label("loop"), None);
}

#[test]
fn macro_arguments_are_substituted() {
    let out = assemble(".DEVICE ATmega8\n.MACRO SETREG\n ldi @0, @1\n.ENDM\nSETREG r16, 0x12\n");
    out.assert_clean();
    assert_eq!(out.words(1), vec![0xE102]);
}

#[test]
fn recursive_macro_hits_the_nesting_limit() {
    let mut config = AsmConfig::new("main.asm");
    config.max_macro_depth = 8;
    let out = assemble_with(
        config,
        &[("main.asm", ".MACRO RECURSE\nRECURSE\n.ENDM\nRECURSE\nnop\n")],
    );
    assert_eq!(out.pass1.errors, 1);
    assert!(out.pass2.is_none());
    assert_eq!(out.errors(), vec!["Macro nesting too deep, limit is 8 levels"]);
}

#[test]
fn errors_inside_macros_name_the_body_line() {
    let out = assemble(".DEVICE ATmega8\n.MACRO BAD\n ldi r1, 5\n.ENDM\nBAD\n");
    let pass2 = out.pass2.expect("pass 2 ran");
    assert_eq!(pass2.errors, 1);
    let diag = out
        .asm
        .diagnostics
        .iter()
        .find(|diag| diag.severity() == Severity::Error)
        .expect("error reported");
    assert_eq!(diag.line(), 5);
    assert_eq!(diag.macro_site, Some(("main.asm".to_string(), 3)));
}

#[test]
fn redefined_macro_keeps_the_first_body() {
    let source = "\
.DEVICE ATmega8
.MACRO ONE
 nop
.ENDM
.MACRO ONE
 ret
.ENDM
ONE
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(1), vec![0x0000]);
    assert!(out
        .warnings()
        .iter()
        .any(|msg| msg.contains("Macro ONE is already defined")));
}

#[test]
fn overlapping_org_is_an_error_by_default() {
    let out = assemble(".DEVICE ATmega8\n.ORG 0\nnop\nnop\n.ORG 1\nnop\n");
    assert_eq!(out.pass1.errors, 1);
    assert!(out.errors()[0].starts_with("Overlapping code segments"));
}

#[test]
fn overlap_policy_can_downgrade_to_warning() {
    let mut config = AsmConfig::new("main.asm");
    config.overlap = OverlapPolicy::Warn;
    let out = assemble_with(
        config,
        &[("main.asm", ".DEVICE ATmega8\n.ORG 0\nnop\nnop\n.ORG 1\nnop\n")],
    );
    out.assert_clean();
    assert_eq!(out.pass1.warnings, 1);
}

#[test]
fn pragma_overlap_ignore_silences_overlap() {
    let source = "\
.DEVICE ATmega8
.PRAGMA OVERLAP IGNORE
.ORG 0
nop
nop
.ORG 1
nop
";
    let out = assemble(source);
    out.assert_clean();
    assert!(out.warnings().is_empty());
    assert_eq!(out.words(2), vec![0x0000, 0x0000]);
}

#[test]
fn overlap_directive_exempts_a_range() {
    let out = assemble(".DEVICE ATmega8\nnop\nnop\n.OVERLAP\n.ORG 0\nret\n.NOOVERLAP\n");
    out.assert_clean();
    assert_eq!(out.words(1), vec![0x9508]);
}

#[test]
fn code_beyond_flash_is_an_error() {
    let out = assemble(".DEVICE ATtiny13\n.ORG 0x1FF\nnop\nnop\n");
    assert_eq!(out.pass1.errors, 1);
    assert!(out.errors()[0].starts_with("Segment start above allowed high address"));
}

#[test]
fn data_and_eeprom_below_their_start_are_errors() {
    let out = assemble(".DEVICE ATmega8\n.DSEG\n.ORG 0x10\nv: .BYTE 2\n");
    assert_eq!(out.pass1.errors, 1);
    assert!(out.errors()[0].starts_with("Segment start below allowed start address: 0x0060"));

    let out = assemble(".DEVICE ATmega8\n.ESEG\n.ORG -2\n.DB 1, 2\n");
    assert_eq!(out.pass1.errors, 1);
    assert!(out.errors()[0].starts_with("Segment start below allowed start address: 0x0000"));
}

#[test]
fn cursor_overflow_is_an_error() {
    let out = assemble(".DEVICE ATmega8\n.ORG 0x7FFFFFFFFFFFFFFF\nnop\nnop\n");
    assert!(out.pass2.is_none());
    assert_eq!(out.errors(), vec!["Address overflow in code segment"; 2]);

    let out = assemble(".DSEG\n.BYTE 0x7FFFFFFFFFFFFFFF\n.BYTE 0x7FFFFFFFFFFFFFFF\n");
    assert!(out.pass2.is_none());
    assert_eq!(out.errors(), vec!["Address overflow in data segment"; 2]);
}

#[test]
fn addresses_outside_the_image_are_errors_without_a_device() {
    let cases = [
        (".ORG 0x80000000\n.DW 1\n", "Address 2147483648 is outside the output image"),
        (".ORG -1\nnop\n", "Address -1 is outside the output image"),
        (".ESEG\n.ORG -1\n.DB 1, 2\n", "Address -1 is outside the output image"),
    ];
    for (source, message) in cases {
        let out = assemble(source);
        assert_eq!(out.pass1.errors, 0, "{source}");
        assert_eq!(out.errors(), vec![message], "{source}");
        assert!(out.asm.code.is_empty());
        assert!(out.asm.eeprom.is_empty());
    }
}

#[test]
fn symbols_keep_their_values_across_passes() {
    let main = "\
.DEVICE ATmega8
.INCLUDE \"defs.inc\"
.MACRO WAIT
loop: dec @0
      brne loop
.ENDM
.CSEG
.ORG 0
      rjmp reset
.IFDEF USE_TIMER
      rjmp timer
.ELSE
      nop
.ENDIF
reset: ldi r16, low(buffer)
      WAIT r16
      rcall helper
      rjmp reset
helper: ldi r17, COUNT
      WAIT r17
      ret
.EQU USE_TIMER = 1
.DSEG
buffer: .BYTE BUFSIZE
flag: .BYTE 1
.ESEG
table: .DB 1, 2, 3
.DW tableend
tableend:
";
    let defs = ".EQU COUNT = 10\n.EQU BUFSIZE = 8\n.SET scratch = 3\n";
    let loader = SourceLoader::default()
        .with_source("main.asm", main)
        .with_source("defs.inc", defs);
    let mut asm = Assembler::new(AsmConfig::new("main.asm"), loader);

    let pass1 = asm.pass1();
    assert_eq!(pass1.errors, 0);
    let after_pass_one = asm.symbols.clone();
    let pass2 = asm.pass2();
    assert_eq!(pass2.errors, 0);

    let entries = |symbols: &Symbols, namespace: Namespace| -> Vec<(String, i64)> {
        symbols
            .table(namespace)
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    };
    for namespace in [Namespace::Label, Namespace::Constant] {
        assert_eq!(
            entries(&asm.symbols, namespace),
            entries(&after_pass_one, namespace),
            "{namespace}"
        );
    }
    let labels = entries(&asm.symbols, Namespace::Label);
    assert_eq!(
        labels,
        vec![
            ("reset".to_string(), 2),
            ("helper".to_string(), 7),
            ("buffer".to_string(), 0x60),
            ("flag".to_string(), 0x68),
            ("table".to_string(), 0),
            ("tableend".to_string(), 5),
        ]
    );
    assert_eq!(asm.symbols.lookup(Namespace::Constant, "USE_TIMER"), Some(1));
    assert_eq!(asm.code.get(2), Some(0x00));
    assert_eq!(asm.code.get(3), Some(0x00));
}

#[test]
fn ifdef_on_forward_symbol_stays_untaken() {
    let source = "\
.DEVICE ATmega8
.IFDEF LATER
ldi r16, 1
.ELSE
ldi r16, 2
.ENDIF
.EQU LATER = 1
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(1), vec![0xE002]);
}

#[test]
fn elif_chain_selects_one_branch() {
    let source = "\
.DEVICE ATmega8
.EQU A = 2
.IF A == 1
.DW 1
.ELIF A == 2
.DW 2
.ELSE
.DW 3
.ENDIF
.DW 9
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(2), vec![2, 9]);
}

#[test]
fn nested_conditionals_skip_inner_blocks() {
    let source = "\
.DEVICE ATmega8
.IF 0
.IF 1
.DW 1
.ENDIF
.ELSE
.DW 2
.ENDIF
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(1), vec![2]);
}

#[test]
fn unbalanced_conditionals_are_reported() {
    let out = assemble(".DEVICE ATmega8\n.ENDIF\n");
    assert_eq!(out.errors(), vec!["Too many .ENDIF"]);

    let out = assemble(".DEVICE ATmega8\n.IF 1\nnop\n");
    assert!(out.warnings().contains(&"Found .IF without .ENDIF".to_string()));
}

#[test]
fn label_changes_between_passes_are_fatal() {
    let mut out = assemble(".DEVICE ATmega8\nnop\n");
    let mut pass_one = Symbols::new();
    pass_one.define(Namespace::Label, "moved", 5).unwrap();
    out.asm.pass_one = Some(pass_one);
    out.asm.pass = Pass::Two;

    let status = out.asm.define_symbol(Namespace::Label, "moved", 6);
    assert_eq!(status, LineStatus::Fatal);
    let status = out.asm.define_symbol(Namespace::Label, "extra", 1);
    assert_eq!(status, LineStatus::Fatal);
    let errors = out.errors();
    assert!(errors.contains(&"Label moved changed value from 5 in pass 1 to 6 in pass 2".to_string()));
    assert!(errors.contains(&"Label extra is missing in pass 2".to_string()));
}

#[test]
fn error_directive_stops_the_pass() {
    let out = assemble(".ERROR \"stop here\"\nnop\nbogus\n");
    assert!(out.pass2.is_none());
    let errors = out.errors();
    assert_eq!(errors, vec!["stop here"]);
    assert!(out
        .messages(Severity::Note)
        .contains(&"Maximum error count reached. Exiting...".to_string()));
}

#[test]
fn error_limit_stops_the_pass() {
    let mut config = AsmConfig::new("main.asm");
    config.max_errors = 2;
    let out = assemble_with(config, &[("main.asm", "bad1\nbad2\nbad3\nbad4\n")]);
    assert_eq!(out.pass1.errors, 2);
    assert_eq!(
        out.errors(),
        vec!["Unknown mnemonic/macro: bad1", "Unknown mnemonic/macro: bad2"]
    );
}

#[test]
fn diagnostics_carry_file_and_line() {
    let out = assemble("nop\nbogus r1\n");
    let diag = out
        .asm
        .diagnostics
        .iter()
        .find(|diag| diag.severity() == Severity::Error)
        .expect("error reported");
    assert_eq!(diag.file(), Some("main.asm"));
    assert_eq!(diag.line(), 2);
    assert_eq!(diag.error().message(), "Unknown mnemonic/macro: bogus");
    assert_eq!(
        diag.format(),
        "main.asm(2): Error: Unknown mnemonic/macro: bogus"
    );
}

#[test]
fn includes_are_searched_relative_to_the_includer() {
    let out = assemble_with(
        AsmConfig::new("src/main.asm"),
        &[
            ("src/main.asm", ".DEVICE ATmega8\n.INCLUDE \"defs.inc\"\nldi r16, VALUE\n"),
            ("src/defs.inc", ".EQU VALUE = 7\n"),
        ],
    );
    out.assert_clean();
    assert_eq!(out.words(1), vec![0xE007]);
}

#[test]
fn missing_include_is_an_error() {
    let out = assemble(".INCLUDE \"nowhere.inc\"\n");
    assert_eq!(out.errors(), vec!["Cannot find include file: nowhere.inc"]);
}

#[test]
fn errors_in_included_files_name_that_file() {
    let out = assemble_with(
        AsmConfig::new("main.asm"),
        &[("main.asm", "nop\n.INCLUDE \"bad.inc\"\n"), ("bad.inc", "\nfoo\n")],
    );
    let diag = &out.asm.diagnostics[0];
    assert_eq!(diag.file(), Some("bad.inc"));
    assert_eq!(diag.line(), 2);
}

#[test]
fn exit_ends_the_current_file() {
    let out = assemble(".DEVICE ATmega8\nnop\n.EXIT\nbogus\n");
    out.assert_clean();
    assert_eq!(out.asm.segments.get(SegmentKind::Code).count(), 1);
}

#[test]
fn exit_inside_a_macro_ends_the_expansion_and_the_file() {
    let source = "\
.DEVICE ATmega8
.MACRO STOP
 nop
 .EXIT
 ret
.ENDM
STOP
bogus
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.words(1), vec![0x0000]);
    assert_eq!(out.asm.segments.get(SegmentKind::Code).count(), 1);
}

#[test]
fn db_packs_bytes_into_words() {
    let out = assemble(".DEVICE ATmega8\n.DB \"AB\", 1\n");
    out.assert_clean();
    assert_eq!(out.words(2), vec![0x4241, 0x0001]);
    assert!(out
        .warnings()
        .iter()
        .any(|msg| msg.starts_with("A .DB segment with an odd number of bytes")));
}

#[test]
fn eeprom_data_is_stored_bytewise() {
    let out = assemble(".DEVICE ATmega8\n.ESEG\n.DB 1, 2\n.DW 0x1234\n");
    out.assert_clean();
    assert_eq!(out.eeprom(4), vec![1, 2, 0x34, 0x12]);
    assert!(out.asm.code.is_empty());
}

#[test]
fn data_segment_reserves_bytes() {
    let source = "\
.DEVICE ATmega8
.DSEG
buf: .BYTE 4
next: .BYTE 1
.CSEG
ldi r16, low(next)
";
    let out = assemble(source);
    out.assert_clean();
    assert_eq!(out.label("buf"), Some(0x60));
    assert_eq!(out.label("next"), Some(0x64));
    assert_eq!(out.words(1), vec![0xE604]);
}

#[test]
fn data_directives_are_rejected_in_the_wrong_segment() {
    let out = assemble(".DEVICE ATmega8\n.BYTE 2\n");
    assert_eq!(
        out.errors(),
        vec![".BYTE directive cannot be used within the code segment (.CSEG)"]
    );
    let out = assemble(".DEVICE ATmega8\n.DSEG\n.DW 1\n");
    assert_eq!(out.errors(), vec!["Can't use .DW directive in data segment (.DSEG)"]);
    let out = assemble(".DEVICE ATmega8\n.DSEG\nnop\n");
    assert_eq!(out.pass1.errors, 1);
}

#[test]
fn out_of_range_values_are_masked_with_a_warning() {
    let out = assemble(".DEVICE ATmega8\n.DB 300, 0\n");
    out.assert_clean();
    assert_eq!(out.words(1), vec![0x002C]);
    assert!(out
        .warnings()
        .contains(&"Value 300 is out of range (-128 <= k <= 255). Will be masked".to_string()));
}

#[test]
fn register_aliases_encode_and_warn_on_reuse() {
    let out = assemble(".DEVICE ATmega8\n.DEF temp = r16\n.DEF other = r16\nldi temp, 1\n");
    out.assert_clean();
    assert_eq!(out.words(1), vec![0xE001]);
    assert_eq!(out.warnings(), vec!["r16 is already assigned to 'temp'!"]);

    let mut config = AsmConfig::new("main.asm");
    config.warn_register_reuse = false;
    let out = assemble_with(
        config,
        &[("main.asm", ".DEVICE ATmega8\n.DEF temp = r16\n.DEF other = r16\n")],
    );
    assert!(out.warnings().is_empty());
}

#[test]
fn undef_removes_an_alias() {
    let out = assemble(".DEVICE ATmega8\n.DEF temp = r16\n.UNDEF temp\nldi temp, 1\n");
    assert_eq!(out.pass2.expect("pass 2 ran").errors, 1);
}

#[test]
fn set_variables_can_be_reassigned() {
    let out = assemble(".DEVICE ATmega8\n.SET v = 1\n.DW v\n.SET v = v + 1\n.DW v\n");
    out.assert_clean();
    assert_eq!(out.words(2), vec![1, 2]);
}

#[test]
fn constants_cannot_be_redefined() {
    let out = assemble(".EQU A = 1\n.EQU A = 2\n");
    assert_eq!(out.errors(), vec!["Can't redefine constant A, use .SET instead"]);
}

#[test]
fn device_rules() {
    let out = assemble("nop\n.DEVICE ATmega8\n");
    assert_eq!(out.errors(), vec![".DEVICE definition must be before any code lines"]);
    let out = assemble(".DEVICE ATmega8\n.DEVICE ATmega16\n");
    assert_eq!(out.errors(), vec!["More than one .DEVICE definition"]);
    let out = assemble(".DEVICE ATmega9999\n");
    assert_eq!(out.errors(), vec!["Unknown device: ATmega9999"]);
    let out = assemble(".DEVICE ATtiny11\n.DSEG\n");
    assert_eq!(
        out.errors(),
        vec!["Can't use .DSEG directive because device has no RAM"]
    );
}

#[test]
fn device_variables_follow_the_device() {
    let out = assemble(".DEVICE ATmega8\n.DW __FLASH_SIZE__, __EEPROM_SIZE__\n");
    out.assert_clean();
    assert_eq!(out.words(2), vec![4096, 512]);
}

#[test]
fn unsupported_instructions_are_rejected_per_device() {
    let out = assemble(".DEVICE ATtiny13\njmp 0\n");
    assert_eq!(out.pass1.errors, 1);
}

#[test]
fn command_line_defines_are_constants() {
    let mut config = AsmConfig::new("main.asm");
    config.defines.push(("BAUD".to_string(), 9600));
    let out = assemble_with(
        config,
        &[("main.asm", ".DEVICE ATmega8\n.IFDEF BAUD\n.DW BAUD\n.ENDIF\n")],
    );
    out.assert_clean();
    assert_eq!(out.words(1), vec![9600]);
}

#[test]
fn message_directive_reports_a_note() {
    let out = assemble(".DEVICE ATmega8\n.EQU N = 10\n.MESSAGE \"N is \", N\n");
    out.assert_clean();
    assert_eq!(out.messages(Severity::Note), vec!["N is 0x0A"]);
}

#[test]
fn overlong_lines_stop_the_pass() {
    let source = format!("nop\n{}\nbogus\n", "x".repeat(5000));
    let out = assemble(&source);
    assert_eq!(out.errors(), vec!["Line too long"]);
}

#[test]
fn unknown_directive_is_an_error() {
    let out = assemble(".FROB 1\n");
    assert_eq!(out.errors(), vec!["Unknown directive: .FROB"]);
}

#[test]
fn summary_lines() {
    let mut counts = PassCounts::new();
    assert_eq!(summary(&counts), "Assembly complete with no errors.");
    counts.warnings = 2;
    assert_eq!(summary(&counts), "Assembly complete with no errors (2 warnings).");
    counts.errors = 1;
    assert_eq!(summary(&counts), "Assembly aborted with 1 error and 2 warnings.");
}

#[test]
fn run_writes_images_listing_and_map() {
    let dir = create_temp_dir("run-outputs");
    let input = dir.join("blink.asm");
    fs::write(
        &input,
        ".DEVICE ATmega8\n.EQU N = 1\nstart: ldi r16, N\nrjmp start\n.ESEG\n.DB 7\n",
    )
    .expect("write source");
    let mut config = AsmConfig::new(&input);
    config.list_path = Some(dir.join("blink.lst"));
    config.map_path = Some(dir.join("blink.map"));

    let report = run_one(&config).expect("assembly succeeds");
    assert_eq!(report.error_count(), 0);

    let hex = fs::read_to_string(dir.join("blink.hex")).expect("read hex");
    assert!(hex.starts_with(":04000000"));
    assert!(hex.trim_end().ends_with(":00000001FF"));
    let eep = fs::read_to_string(dir.join("blink.eep.hex")).expect("read eep");
    assert!(eep.starts_with(":0100000007"));
    let listing = fs::read_to_string(dir.join("blink.lst")).expect("read listing");
    assert!(listing.contains("avrforge AVR Assembler"));
    assert!(listing.contains("C:000000 E001"));
    let map = fs::read_to_string(dir.join("blink.map")).expect("read map");
    assert!(map.contains("start"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_run_removes_stale_outputs() {
    let dir = create_temp_dir("run-failure");
    let input = dir.join("bad.asm");
    fs::write(&input, "bogus\n").expect("write source");
    let config = AsmConfig::new(&input);
    fs::write(&config.hex_path, ":00000001FF\n").expect("write stale hex");

    let err = run_one(&config).expect_err("assembly fails");
    assert_eq!(err.counts().errors, 1);
    assert_eq!(
        err.to_string(),
        "Errors detected in source. No output files created."
    );
    assert!(!config.hex_path.exists());
    let _ = fs::remove_dir_all(&dir);
}
