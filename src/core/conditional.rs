// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Conditional assembly state.
//!
//! The engine keeps a nesting depth and, while a branch is not taken, a skip
//! state that the coordinator feeds one directive at a time. `.IFDEF` and
//! `.IFNDEF` sites that were not taken in pass one are recorded so that pass
//! two takes the same branch even after forward references resolve.

use std::collections::HashSet;

use thiserror::Error;

use crate::core::assembler::Pass;

/// Identity of an input source, stable across passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// Included file, numbered in order of first inclusion.
    File(u32),
    /// Macro expansion, numbered by call order within the pass.
    Expansion(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub source: SourceId,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionalError {
    #[error(".ELSE without .IF")]
    ElseWithoutIf,
    #[error("Too many .ENDIF")]
    TooManyEndif,
    #[error("Found no closing .ENDIF")]
    NoClosingEndif,
    #[error("Found no closing .ENDIF in macro")]
    NoClosingEndifInMacro,
}

/// Directives that affect conditional structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondDirective {
    If,
    IfDef,
    IfNDef,
    Else,
    ElseIf,
    EndIf,
}

impl CondDirective {
    /// Classify an upper-case directive name without its prefix.
    pub fn classify(name: &str) -> Option<Self> {
        match name {
            "IF" => Some(CondDirective::If),
            "IFDEF" => Some(CondDirective::IfDef),
            "IFNDEF" => Some(CondDirective::IfNDef),
            "ELSE" => Some(CondDirective::Else),
            "ELSEIF" | "ELIF" => Some(CondDirective::ElseIf),
            "ENDIF" => Some(CondDirective::EndIf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipMode {
    /// The taken branch has not been found yet.
    UntilElse,
    /// A branch was already taken; only `.ENDIF` ends the skip.
    UntilEndif,
}

#[derive(Debug, Clone, Copy)]
struct Skip {
    nested: u32,
    mode: SkipMode,
    origin: usize,
}

/// What the coordinator should do with a line seen while skipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Keep skipping.
    Skip,
    /// The skip ended on this line; resume with the next line.
    Resume,
    /// Evaluate this `.ELSEIF` expression and call
    /// [`ConditionalEngine::resolve_elseif`].
    EvaluateElseIf(String),
}

#[derive(Debug, Default)]
pub struct ConditionalEngine {
    depth: u32,
    skip: Option<Skip>,
    ifdef_blacklist: HashSet<SourceLocation>,
    ifndef_blacklist: HashSet<SourceLocation>,
}

impl ConditionalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-pass state. The blacklists are rebuilt only in pass one.
    pub fn begin_pass(&mut self, pass: Pass) {
        self.depth = 0;
        self.skip = None;
        if pass == Pass::One {
            self.ifdef_blacklist.clear();
            self.ifndef_blacklist.clear();
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_skipping(&self) -> bool {
        self.skip.is_some()
    }

    /// Enter an `.IF` with an evaluated condition. `origin` identifies the
    /// input source the directive came from.
    pub fn enter_if(&mut self, taken: bool, origin: usize) {
        if taken {
            self.depth += 1;
        } else {
            self.start_skip(SkipMode::UntilElse, origin);
        }
    }

    /// Enter an `.IFDEF` (`negate` false) or `.IFNDEF` (`negate` true).
    /// Returns whether the branch was taken.
    pub fn enter_ifdef(
        &mut self,
        negate: bool,
        defined: bool,
        pass: Pass,
        site: SourceLocation,
        origin: usize,
    ) -> bool {
        let blacklist = if negate {
            &mut self.ifndef_blacklist
        } else {
            &mut self.ifdef_blacklist
        };
        let taken = match pass {
            Pass::One => {
                let taken = defined != negate;
                if !taken {
                    blacklist.insert(site);
                }
                taken
            }
            Pass::Two => !blacklist.contains(&site),
        };
        self.enter_if(taken, origin);
        taken
    }

    /// `.ELSE`, `.ELSEIF` or `.ELIF` reached while emitting: the taken branch
    /// is over.
    pub fn enter_else(&mut self, origin: usize) -> Result<(), ConditionalError> {
        if self.depth == 0 {
            return Err(ConditionalError::ElseWithoutIf);
        }
        self.start_skip(SkipMode::UntilEndif, origin);
        Ok(())
    }

    pub fn end_if(&mut self) -> Result<(), ConditionalError> {
        if self.depth == 0 {
            return Err(ConditionalError::TooManyEndif);
        }
        self.depth -= 1;
        Ok(())
    }

    fn start_skip(&mut self, mode: SkipMode, origin: usize) {
        self.skip = Some(Skip {
            nested: 0,
            mode,
            origin,
        });
    }

    /// Feed one line while skipping. `directive` is the line's conditional
    /// directive, if any, and `operand` its remaining text.
    pub fn scan(&mut self, directive: Option<CondDirective>, operand: &str) -> ScanOutcome {
        let Some(skip) = self.skip.as_mut() else {
            return ScanOutcome::Resume;
        };
        let Some(directive) = directive else {
            return ScanOutcome::Skip;
        };
        match directive {
            CondDirective::If | CondDirective::IfDef | CondDirective::IfNDef => {
                skip.nested += 1;
                ScanOutcome::Skip
            }
            CondDirective::EndIf if skip.nested > 0 => {
                skip.nested -= 1;
                ScanOutcome::Skip
            }
            CondDirective::EndIf => {
                if skip.mode == SkipMode::UntilEndif {
                    self.depth = self.depth.saturating_sub(1);
                }
                self.skip = None;
                ScanOutcome::Resume
            }
            _ if skip.nested > 0 || skip.mode == SkipMode::UntilEndif => ScanOutcome::Skip,
            CondDirective::Else => {
                self.skip = None;
                self.depth += 1;
                ScanOutcome::Resume
            }
            CondDirective::ElseIf => ScanOutcome::EvaluateElseIf(operand.trim().to_string()),
        }
    }

    /// Complete an `.ELSEIF` returned by [`scan`](Self::scan).
    pub fn resolve_elseif(&mut self, taken: bool) {
        if taken && self.skip.take().is_some() {
            self.depth += 1;
        }
    }

    /// Notify that input source `origin` has ended. A skip started in that
    /// source can never be closed.
    pub fn end_source(&mut self, origin: usize, expansion: bool) -> Result<(), ConditionalError> {
        match self.skip {
            Some(skip) if skip.origin >= origin => {
                if skip.mode == SkipMode::UntilEndif {
                    self.depth = self.depth.saturating_sub(1);
                }
                self.skip = None;
                Err(if expansion {
                    ConditionalError::NoClosingEndifInMacro
                } else {
                    ConditionalError::NoClosingEndif
                })
            }
            _ => Ok(()),
        }
    }

    pub fn blacklisted(&self, negate: bool, site: &SourceLocation) -> bool {
        if negate {
            self.ifndef_blacklist.contains(site)
        } else {
            self.ifdef_blacklist.contains(site)
        }
    }
}
