// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::io;
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::Level;

use crate::core::assembler::error::{AsmError, AsmErrorKind, AsmRunError, PassCounts};
use crate::core::expr::parse_number;
use crate::core::segment::OverlapPolicy;
use crate::core::text_utils::{is_ident_char, is_ident_start};

use super::AsmConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Two-pass macro assembler for 8-bit AVR microcontrollers.

The code image is written to <input>.hex and the EEPROM image to
<input>.eep.hex unless -o/-e name other files. A listing and a symbol map
are written only when -l/-m are given. When assembly fails, no output files
are left behind.";

#[derive(Parser, Debug)]
#[command(
    name = "avrforge",
    version = VERSION,
    about = "Two-pass macro assembler for 8-bit AVR microcontrollers",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        value_name = "INFILE",
        required_unless_present = "devices",
        long_help = "Assembly source file."
    )]
    pub infile: Option<PathBuf>,
    #[arg(
        short = 'o',
        long = "hex",
        value_name = "FILE",
        long_help = "Code image file (Intel HEX). Defaults to the input name with a .hex extension."
    )]
    pub hex_name: Option<PathBuf>,
    #[arg(
        short = 'e',
        long = "eep",
        value_name = "FILE",
        long_help = "EEPROM image file (Intel HEX). Defaults to the input name with a .eep.hex extension."
    )]
    pub eep_name: Option<PathBuf>,
    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        long_help = "Write a listing file."
    )]
    pub list_name: Option<PathBuf>,
    #[arg(
        short = 'm',
        long = "map",
        value_name = "FILE",
        long_help = "Write a map file with every constant, variable and label."
    )]
    pub map_name: Option<PathBuf>,
    #[arg(
        short = 'D',
        long = "define",
        value_name = "NAME[=VAL]",
        action = ArgAction::Append,
        long_help = "Predefine a constant (repeatable). If VAL is omitted, defaults to 1."
    )]
    pub defines: Vec<String>,
    #[arg(
        short = 'I',
        long = "includepath",
        value_name = "DIR",
        action = ArgAction::Append,
        long_help = "Additional directory searched by .INCLUDE (repeatable)."
    )]
    pub include_dirs: Vec<PathBuf>,
    #[arg(
        long = "listmac",
        action = ArgAction::SetTrue,
        long_help = "List macro expansion lines in the listing file."
    )]
    pub list_macros: bool,
    #[arg(
        long = "max-errors",
        value_name = "N",
        default_value_t = 10,
        long_help = "Stop a pass after N errors. Defaults to 10."
    )]
    pub max_errors: u32,
    #[arg(
        short = 'O',
        long = "overlap",
        value_name = "ignore|warn|error",
        default_value = "error",
        long_help = "How overlapping memory ranges are reported. Defaults to error. .PRAGMA OVERLAP overrides it in the source."
    )]
    pub overlap: String,
    #[arg(
        short = 'W',
        long = "warning",
        value_name = "NAME",
        action = ArgAction::Append,
        long_help = "Disable a warning (repeatable). NoRegDef silences register reuse warnings from .DEF."
    )]
    pub warnings: Vec<String>,
    #[arg(
        long = "devices",
        action = ArgAction::SetTrue,
        long_help = "List the supported devices and exit."
    )]
    pub devices: bool,
    #[arg(
        long = "max-macro-depth",
        value_name = "N",
        default_value_t = 256,
        long_help = "Maximum macro call nesting. Defaults to 256."
    )]
    pub max_macro_depth: usize,
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "warn",
        long_help = "Diagnostic log level on stderr: error, warn, info, debug or trace."
    )]
    pub log_level: Level,
}

/// Install the stderr log subscriber. A second call is ignored.
pub fn init_logging(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn cli_error(message: &str, param: Option<&str>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, message, param),
        Vec::new(),
        PassCounts::new(),
    )
}

/// Parse a `-D NAME[=VAL]` argument.
pub fn parse_define(arg: &str) -> Result<(String, i64), &'static str> {
    let (name, value) = match arg.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => (arg.trim(), None),
    };
    let bytes = name.as_bytes();
    let valid_name =
        bytes.first().is_some_and(|c| is_ident_start(*c)) && bytes.iter().all(|c| is_ident_char(*c));
    if !valid_name {
        return Err("Invalid define name");
    }
    let value = match value {
        None => 1,
        Some(text) => parse_number(text).ok_or("Invalid define value")?,
    };
    Ok((name.to_string(), value))
}

pub fn validate_cli(cli: &Cli) -> Result<AsmConfig, AsmRunError> {
    let Some(input) = cli.infile.clone() else {
        return Err(cli_error("No input file specified", None));
    };
    let mut config = AsmConfig::new(input);
    if let Some(path) = &cli.hex_name {
        config.hex_path = path.clone();
    }
    if let Some(path) = &cli.eep_name {
        config.eep_path = path.clone();
    }
    config.list_path = cli.list_name.clone();
    config.map_path = cli.map_name.clone();

    for define in &cli.defines {
        let parsed = parse_define(define).map_err(|msg| cli_error(msg, Some(define.as_str())))?;
        config.defines.push(parsed);
    }
    config.include_dirs = cli.include_dirs.clone();
    config.list_macros = cli.list_macros;
    config.max_errors = cli.max_errors;
    config.overlap = cli
        .overlap
        .parse::<OverlapPolicy>()
        .map_err(|_| cli_error("Invalid overlap policy, use ignore, warn or error", Some(cli.overlap.as_str())))?;

    for warning in &cli.warnings {
        if warning.eq_ignore_ascii_case("NoRegDef") {
            config.warn_register_reuse = false;
        } else {
            return Err(cli_error("Unknown warning", Some(warning.as_str())));
        }
    }

    if cli.max_macro_depth == 0 {
        return Err(cli_error("--max-macro-depth must be at least 1", None));
    }
    config.max_macro_depth = cli.max_macro_depth;
    Ok(config)
}
