// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source file loading and include path resolution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest accepted logical line, in bytes.
pub const MAX_LINE_LENGTH: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Cannot find include file: {0}")]
    NotFound(String),
    #[error("Error opening file {path}: {message}")]
    Io { path: String, message: String },
}

/// One logical source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    /// Physical line number of the first line joined into this one.
    pub number: u32,
    pub text: String,
    /// The line was terminated by a form feed.
    pub form_feed: bool,
    /// The line exceeded [`MAX_LINE_LENGTH`]; `text` is empty.
    pub too_long: bool,
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    name: String,
    lines: Vec<SourceLine>,
}

impl SourceFile {
    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }
}

/// Reads source files, caching them across passes.
///
/// Sources registered with [`with_source`](Self::with_source) shadow the file
/// system, which keeps tests free of temporary files.
#[derive(Debug, Default)]
pub struct SourceLoader {
    overlay: HashMap<PathBuf, String>,
    cli_dirs: Vec<PathBuf>,
    include_dirs: Vec<PathBuf>,
    files: Vec<SourceFile>,
    by_path: HashMap<PathBuf, usize>,
}

impl SourceLoader {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        Self {
            include_dirs: include_dirs.clone(),
            cli_dirs: include_dirs,
            ..Self::default()
        }
    }

    /// Register an in-memory source for `path`.
    pub fn with_source(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.overlay.insert(path.into(), text.into());
        self
    }

    /// Drop include paths added by `.INCLUDEPATH` in the previous pass.
    pub fn begin_pass(&mut self) {
        self.include_dirs = self.cli_dirs.clone();
    }

    pub fn add_include_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.include_dirs.contains(&dir) {
            self.include_dirs.push(dir);
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.overlay.contains_key(path) || path.is_file()
    }

    /// Find `name` relative to `base_dir`, the working directory, then each
    /// include directory.
    pub fn resolve(&self, name: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
        let name = Path::new(name);
        if name.is_absolute() {
            return self.exists(name).then(|| name.to_path_buf());
        }
        base_dir
            .map(|dir| dir.join(name))
            .into_iter()
            .chain(std::iter::once(name.to_path_buf()))
            .chain(self.include_dirs.iter().map(|dir| dir.join(name)))
            .find(|candidate| self.exists(candidate))
    }

    /// Load `path`, returning its index. A file already loaded is not read
    /// again.
    pub fn load(&mut self, path: &Path) -> Result<usize, SourceError> {
        if let Some(index) = self.by_path.get(path) {
            return Ok(*index);
        }
        let text = match self.overlay.get(path) {
            Some(text) => text.clone(),
            None => {
                let bytes = fs::read(path).map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        SourceError::NotFound(path.display().to_string())
                    } else {
                        SourceError::Io {
                            path: path.display().to_string(),
                            message: err.to_string(),
                        }
                    }
                })?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        tracing::trace!(path = %path.display(), "loaded source");
        let index = self.files.len();
        self.files.push(SourceFile {
            path: path.to_path_buf(),
            name: path.display().to_string(),
            lines: split_lines(&text),
        });
        self.by_path.insert(path.to_path_buf(), index);
        Ok(index)
    }

    pub fn file(&self, index: usize) -> Option<&SourceFile> {
        self.files.get(index)
    }
}

fn is_line_end(c: u8) -> bool {
    matches!(c, b'\n' | b'\r' | 0x0c | 0)
}

/// Split text into logical lines.
///
/// Lines end at LF, CR, CRLF, FF or NUL. A backslash directly before the line
/// end joins the next physical line.
pub fn split_lines(text: &str) -> Vec<SourceLine> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut physical: u32 = 1;
    let mut first = physical;
    let mut too_long = false;
    let mut idx = 0usize;

    while idx < bytes.len() {
        let c = bytes[idx];
        if c == b'\\' && bytes.get(idx + 1).is_some_and(|next| is_line_end(*next)) {
            idx += 1;
            if bytes[idx] == b'\r' && bytes.get(idx + 1) == Some(&b'\n') {
                idx += 1;
            }
            idx += 1;
            physical += 1;
            continue;
        }
        if is_line_end(c) {
            lines.push(finish_line(first, &current, c == 0x0c, too_long));
            if c == b'\r' && bytes.get(idx + 1) == Some(&b'\n') {
                idx += 1;
            }
            idx += 1;
            physical += 1;
            first = physical;
            current.clear();
            too_long = false;
            continue;
        }
        if current.len() >= MAX_LINE_LENGTH {
            too_long = true;
        } else {
            current.push(c);
        }
        idx += 1;
    }
    if !current.is_empty() || too_long {
        lines.push(finish_line(first, &current, false, too_long));
    }
    lines
}

fn finish_line(number: u32, bytes: &[u8], form_feed: bool, too_long: bool) -> SourceLine {
    SourceLine {
        number,
        text: if too_long {
            String::new()
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        },
        form_feed,
        too_long,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[SourceLine]) -> Vec<(u32, &str)> {
        lines
            .iter()
            .map(|line| (line.number, line.text.as_str()))
            .collect()
    }

    #[test]
    fn splits_on_every_line_ending() {
        let lines = split_lines("a\nb\r\nc\rd");
        assert_eq!(texts(&lines), vec![(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
    }

    #[test]
    fn backslash_joins_lines_and_keeps_numbering() {
        let lines = split_lines("ldi r16, \\\n 5\nnop\n");
        assert_eq!(texts(&lines), vec![(1, "ldi r16,  5"), (3, "nop")]);
    }

    #[test]
    fn form_feed_is_flagged() {
        let lines = split_lines("nop\x0cret\n");
        assert!(lines[0].form_feed);
        assert!(!lines[1].form_feed);
    }

    #[test]
    fn overlong_lines_are_marked() {
        let long = "x".repeat(MAX_LINE_LENGTH + 1);
        let lines = split_lines(&format!("nop\n{long}\nret\n"));
        assert!(lines[1].too_long);
        assert!(lines[1].text.is_empty());
        assert_eq!(lines[2].text, "ret");
    }

    #[test]
    fn resolves_overlay_sources_through_include_dirs() {
        let loader = SourceLoader::new(vec![PathBuf::from("inc")])
            .with_source("main.asm", "")
            .with_source("inc/defs.inc", ".equ a = 1\n");
        let base = Path::new("main.asm").parent();
        assert_eq!(
            loader.resolve("defs.inc", base),
            Some(PathBuf::from("inc/defs.inc"))
        );
        assert_eq!(loader.resolve("missing.inc", base), None);
    }

    #[test]
    fn loads_each_file_once() {
        let mut loader = SourceLoader::default().with_source("a.asm", "nop\n");
        let first = loader.load(Path::new("a.asm")).unwrap();
        let second = loader.load(Path::new("a.asm")).unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.file(first).unwrap().lines().len(), 1);
    }
}
