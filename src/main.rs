// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for avrforge.

use avrforge::assembler::summary;

fn main() {
    let use_color = std::env::var("NO_COLOR").is_err();
    match avrforge::assembler::run() {
        Ok(reports) => {
            for report in reports {
                for diag in report.diagnostics() {
                    eprintln!("{}", diag.format_with_context(use_color));
                }
                eprintln!("{}", summary(&report.counts()));
            }
        }
        Err(err) => {
            for diag in err.diagnostics() {
                eprintln!("{}", diag.format_with_context(use_color));
            }
            eprintln!("{err}");
            if err.counts().errors > 0 {
                eprintln!("{}", summary(&err.counts()));
            }
            std::process::exit(1);
        }
    }
}
