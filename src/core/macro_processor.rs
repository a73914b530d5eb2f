// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Macro definitions and the expansion call stack.
//!
//! Bodies are stored as raw lines. An invocation pushes a [`MacroCallFrame`]
//! and the coordinator pulls substituted lines from the top frame through
//! [`MacroEngine::next_line`], feeding them to the same line path as file
//! input. Nested invocations push further frames; there is no host recursion.

use std::collections::HashMap;

use thiserror::Error;

use crate::core::assembler::Pass;
use crate::core::symbol_table::{SymbolError, SymbolTable};
use crate::core::text_utils::{split_comment, split_operands};

/// Highest number of positional arguments (`@0` to `@9`).
pub const MAX_MACRO_ARGS: usize = 10;
/// Default bound on active expansion frames.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    #[error("Missing macro name")]
    MissingName,
    #[error("Unknown macro {0}")]
    Unknown(String),
    #[error("Macro {0} is already defined, keeping the first definition")]
    Redefined(String),
    #[error("Nested .MACRO definitions are not supported")]
    NestedDefinition,
    #[error("No .MACRO found before .ENDMACRO")]
    EndWithoutMacro,
    #[error("Found no closing .ENDMACRO for macro {0}")]
    Unterminated(String),
    #[error("Too many arguments to macro {name}, at most {max} are allowed")]
    TooManyArgs { name: String, max: usize },
    #[error("Macro argument @{0} was not given")]
    MissingArg(usize),
    #[error("Macro nesting too deep, limit is {0} levels")]
    Nesting(usize),
    #[error("Can't redefine local label {0}")]
    LocalRedefined(String),
    #[error("Label {0} is missing in pass 2")]
    LocalMissing(String),
    #[error("Label {name} changed value from {before} in pass 1 to {after} in pass 2")]
    LocalChanged { name: String, before: i64, after: i64 },
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

impl MacroError {
    /// Errors that end the current pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MacroError::Nesting(_) | MacroError::LocalMissing(_) | MacroError::LocalChanged { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct MacroDefinition {
    pub name: String,
    pub file: String,
    /// Line of the `.MACRO` directive.
    pub line: u32,
    pub body: Vec<String>,
}

#[derive(Debug)]
struct Recording {
    def: MacroDefinition,
    store: bool,
}

/// One active expansion.
#[derive(Debug)]
pub struct MacroCallFrame {
    def: usize,
    call_id: u32,
    line_index: usize,
    args: Vec<String>,
    locals: SymbolTable<i64>,
    pass_one_locals: Option<SymbolTable<i64>>,
}

impl MacroCallFrame {
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Index of the next body line.
    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// A substituted body line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedLine {
    pub text: String,
    /// Zero-based index into the macro body.
    pub index: usize,
}

pub struct MacroEngine {
    names: SymbolTable<usize>,
    defs: Vec<MacroDefinition>,
    recording: Option<Recording>,
    frames: Vec<MacroCallFrame>,
    history: HashMap<u32, SymbolTable<i64>>,
    next_call: u32,
    pass: Pass,
    max_depth: usize,
}

impl Default for MacroEngine {
    fn default() -> Self {
        Self::new(MAX_NESTING)
    }
}

impl MacroEngine {
    pub fn new(max_depth: usize) -> Self {
        Self {
            names: SymbolTable::new(),
            defs: Vec::new(),
            recording: None,
            frames: Vec::new(),
            history: HashMap::new(),
            next_call: 0,
            pass: Pass::One,
            max_depth,
        }
    }

    /// Reset per-pass state. Definitions and the local-label history are
    /// kept from pass one to pass two.
    pub fn begin_pass(&mut self, pass: Pass) {
        self.pass = pass;
        self.recording = None;
        self.frames.clear();
        self.next_call = 0;
        if pass == Pass::One {
            self.names = SymbolTable::new();
            self.defs.clear();
            self.history.clear();
        }
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.names.get(name).and_then(|ix| self.defs.get(*ix))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    // ---- definitions ----

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn begin_definition(&mut self, name: &str, file: &str, line: u32) -> Result<(), MacroError> {
        if self.recording.is_some() {
            return Err(MacroError::NestedDefinition);
        }
        if name.is_empty() {
            return Err(MacroError::MissingName);
        }
        self.recording = Some(Recording {
            def: MacroDefinition {
                name: name.to_string(),
                file: file.to_string(),
                line,
                body: Vec::new(),
            },
            store: self.pass == Pass::One,
        });
        Ok(())
    }

    pub fn record_line(&mut self, line: &str) {
        if let Some(recording) = self.recording.as_mut() {
            recording.def.body.push(line.to_string());
        }
    }

    /// Close the definition being recorded. Returns its name.
    pub fn end_definition(&mut self) -> Result<String, MacroError> {
        let recording = self.recording.take().ok_or(MacroError::EndWithoutMacro)?;
        let name = recording.def.name.clone();
        if !recording.store {
            return Ok(name);
        }
        if self.names.contains(&name) {
            return Err(MacroError::Redefined(name));
        }
        self.names.insert(&name, self.defs.len())?;
        self.defs.push(recording.def);
        Ok(name)
    }

    /// Drop an unterminated definition at end of input.
    pub fn abandon_definition(&mut self) -> Option<MacroError> {
        self.recording
            .take()
            .map(|recording| MacroError::Unterminated(recording.def.name))
    }

    // ---- expansion ----

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&MacroCallFrame> {
        self.frames.last()
    }

    pub fn definition_of(&self, frame: &MacroCallFrame) -> Option<&MacroDefinition> {
        self.defs.get(frame.def)
    }

    /// Push a frame for `name` with the raw argument text.
    pub fn invoke(&mut self, name: &str, raw_args: &str) -> Result<u32, MacroError> {
        let def = *self
            .names
            .get(name)
            .ok_or_else(|| MacroError::Unknown(name.to_string()))?;
        if self.frames.len() >= self.max_depth {
            return Err(MacroError::Nesting(self.max_depth));
        }
        let args: Vec<String> = split_operands(raw_args)
            .into_iter()
            .map(str::to_string)
            .collect();
        if args.len() > MAX_MACRO_ARGS {
            return Err(MacroError::TooManyArgs {
                name: self.defs[def].name.clone(),
                max: MAX_MACRO_ARGS,
            });
        }
        let call_id = self.next_call;
        self.next_call += 1;
        let pass_one_locals = match self.pass {
            Pass::One => None,
            Pass::Two => self.history.remove(&call_id),
        };
        tracing::trace!(
            macro_name = %self.defs[def].name,
            call_id,
            depth = self.frames.len() + 1,
            "macro call"
        );
        self.frames.push(MacroCallFrame {
            def,
            call_id,
            line_index: 0,
            args,
            locals: SymbolTable::new(),
            pass_one_locals,
        });
        Ok(call_id)
    }

    /// Next substituted line of the top frame, or `None` when its body is
    /// exhausted. The index advances even when substitution fails.
    pub fn next_line(&mut self) -> Option<Result<ExpandedLine, MacroError>> {
        let frame = self.frames.last_mut()?;
        let line = self.defs.get(frame.def)?.body.get(frame.line_index)?;
        let index = frame.line_index;
        frame.line_index += 1;
        Some(substitute_args(line, &frame.args).map(|text| ExpandedLine { text, index }))
    }

    /// Exhaust the bodies of the top `count` frames so that the pump ends
    /// them on their next read.
    pub fn exit_frames(&mut self, count: usize) {
        let start = self.frames.len().saturating_sub(count);
        for frame in &mut self.frames[start..] {
            frame.line_index = self.defs.get(frame.def).map_or(0, |def| def.body.len());
        }
    }

    /// Pop the top frame. In pass one its locals are kept for pass two.
    pub fn pop(&mut self) -> Option<u32> {
        let frame = self.frames.pop()?;
        if self.pass == Pass::One {
            self.history.insert(frame.call_id, frame.locals);
        }
        Some(frame.call_id)
    }

    /// Define a label local to the top frame. `globally_defined` reports a
    /// clash with a label, constant or variable of the current pass.
    pub fn define_local(
        &mut self,
        name: &str,
        value: i64,
        globally_defined: bool,
    ) -> Result<(), MacroError> {
        if globally_defined || self.frames.iter().any(|frame| frame.locals.contains(name)) {
            return Err(MacroError::LocalRedefined(name.to_string()));
        }
        let pass = self.pass;
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| MacroError::LocalMissing(name.to_string()))?;
        if pass == Pass::Two {
            let before = frame
                .pass_one_locals
                .as_ref()
                .and_then(|locals| locals.get(name).copied());
            match before {
                None => return Err(MacroError::LocalMissing(name.to_string())),
                Some(before) if before != value => {
                    return Err(MacroError::LocalChanged {
                        name: name.to_string(),
                        before,
                        after: value,
                    })
                }
                Some(_) => {}
            }
        }
        frame.locals.insert(name, value)?;
        Ok(())
    }

    /// Resolve a local label, innermost frame first. Pass-one values stand in
    /// for labels not yet reached in pass two.
    pub fn lookup_local(&self, name: &str) -> Option<i64> {
        self.frames.iter().rev().find_map(|frame| {
            frame.locals.get(name).copied().or_else(|| {
                frame
                    .pass_one_locals
                    .as_ref()
                    .and_then(|locals| locals.get(name).copied())
            })
        })
    }

    /// Whether a local label is defined so far in this pass.
    pub fn is_local_defined(&self, name: &str) -> bool {
        self.frames.iter().any(|frame| frame.locals.contains(name))
    }
}

/// Replace `@0` to `@9` in the code part of `line`.
pub fn substitute_args(line: &str, args: &[String]) -> Result<String, MacroError> {
    let (code, comment) = split_comment(line);
    if !code.contains('@') {
        return Ok(line.to_string());
    }
    let mut out = String::with_capacity(line.len());
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '@' {
            if let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
                chars.next();
                let ix = digit as usize;
                let arg = args.get(ix).ok_or(MacroError::MissingArg(ix))?;
                out.push_str(arg);
                continue;
            }
        }
        out.push(c);
    }
    out.push_str(comment);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, body: &[&str]) -> MacroEngine {
        let mut engine = MacroEngine::default();
        engine.begin_pass(Pass::One);
        engine.begin_definition(name, "test.asm", 1).unwrap();
        for line in body {
            engine.record_line(line);
        }
        engine.end_definition().unwrap();
        engine
    }

    fn drain(engine: &mut MacroEngine) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = engine.next_line() {
            out.push(line.unwrap().text);
        }
        out
    }

    #[test]
    fn substitutes_positional_arguments() {
        let mut engine = engine_with("SETREG", &["  ldi @0, @1 ; load @2"]);
        engine.invoke("setreg", "r16, 0x20").unwrap();
        assert_eq!(drain(&mut engine), vec!["  ldi r16, 0x20 ; load @2"]);
        assert_eq!(engine.pop(), Some(0));
        assert_eq!(engine.depth(), 0);
    }

    #[test]
    fn missing_argument_is_an_error() {
        let mut engine = engine_with("M", &["  .db @1"]);
        engine.invoke("M", "1").unwrap();
        assert_eq!(engine.next_line(), Some(Err(MacroError::MissingArg(1))));
        assert_eq!(engine.next_line(), None);
    }

    #[test]
    fn exited_frames_end_without_touching_callers() {
        let mut engine = engine_with("M", &["a", "b", "c"]);
        engine.invoke("M", "").unwrap();
        assert_eq!(engine.next_line().map(|line| line.unwrap().text), Some("a".into()));
        engine.invoke("M", "").unwrap();
        engine.exit_frames(1);
        assert_eq!(engine.next_line(), None);
        assert_eq!(engine.pop(), Some(1));
        assert_eq!(drain(&mut engine), vec!["b", "c"]);
    }

    #[test]
    fn unknown_macro_is_reported() {
        let mut engine = MacroEngine::default();
        assert_eq!(
            engine.invoke("nope", ""),
            Err(MacroError::Unknown("nope".to_string()))
        );
    }

    #[test]
    fn argument_count_is_bounded() {
        let mut engine = engine_with("M", &[]);
        let args = (0..11).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        assert!(matches!(
            engine.invoke("M", &args),
            Err(MacroError::TooManyArgs { max: MAX_MACRO_ARGS, .. })
        ));
    }

    #[test]
    fn first_definition_wins() {
        let mut engine = engine_with("M", &["first"]);
        engine.begin_definition("m", "test.asm", 5).unwrap();
        engine.record_line("second");
        assert_eq!(
            engine.end_definition(),
            Err(MacroError::Redefined("m".to_string()))
        );
        assert_eq!(engine.get("M").unwrap().body, vec!["first".to_string()]);
    }

    #[test]
    fn definition_errors() {
        let mut engine = MacroEngine::default();
        assert_eq!(engine.end_definition(), Err(MacroError::EndWithoutMacro));
        engine.begin_definition("A", "t", 1).unwrap();
        assert_eq!(
            engine.begin_definition("B", "t", 2),
            Err(MacroError::NestedDefinition)
        );
        assert_eq!(
            engine.abandon_definition(),
            Some(MacroError::Unterminated("A".to_string()))
        );
    }

    #[test]
    fn pass_two_does_not_store_definitions() {
        let mut engine = engine_with("M", &["a"]);
        engine.begin_pass(Pass::Two);
        engine.begin_definition("N", "t", 1).unwrap();
        engine.end_definition().unwrap();
        assert!(engine.is_macro("M"));
        assert!(!engine.is_macro("N"));
    }

    #[test]
    fn nesting_is_bounded() {
        let mut engine = MacroEngine::new(3);
        engine.begin_definition("R", "t", 1).unwrap();
        engine.record_line("R");
        engine.end_definition().unwrap();
        for _ in 0..3 {
            engine.invoke("R", "").unwrap();
        }
        let err = engine.invoke("R", "").unwrap_err();
        assert_eq!(err, MacroError::Nesting(3));
        assert!(err.is_fatal());
    }

    #[test]
    fn locals_are_private_per_call() {
        let mut engine = engine_with("DELAY", &["loop: dec r16"]);
        engine.invoke("DELAY", "").unwrap();
        engine.define_local("loop", 0, false).unwrap();
        engine.pop();
        assert_eq!(engine.lookup_local("loop"), None);
        engine.invoke("DELAY", "").unwrap();
        engine.define_local("loop", 2, false).unwrap();
        assert_eq!(engine.lookup_local("LOOP"), Some(2));
    }

    #[test]
    fn nested_frames_see_and_protect_outer_locals() {
        let mut engine = engine_with("M", &[]);
        engine.invoke("M", "").unwrap();
        engine.define_local("outer", 4, false).unwrap();
        engine.invoke("M", "").unwrap();
        assert_eq!(engine.lookup_local("outer"), Some(4));
        assert_eq!(
            engine.define_local("outer", 6, false),
            Err(MacroError::LocalRedefined("outer".to_string()))
        );
        assert_eq!(
            engine.define_local("global", 6, true),
            Err(MacroError::LocalRedefined("global".to_string()))
        );
    }

    #[test]
    fn pass_two_verifies_locals_and_sees_forward_refs() {
        let mut engine = engine_with("M", &[]);
        engine.invoke("M", "").unwrap();
        engine.define_local("fwd", 10, false).unwrap();
        engine.pop();

        engine.begin_pass(Pass::Two);
        engine.invoke("M", "").unwrap();
        assert_eq!(engine.lookup_local("fwd"), Some(10));
        let err = engine.define_local("fwd", 12, false).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            engine.define_local("other", 1, false),
            Err(MacroError::LocalMissing("other".to_string()))
        );
    }
}
