// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Line-oriented source reading with a nested include stack.

use crate::core::error::{AsmError, AsmErrorKind};

use std::fs;
use std::path::Path;

pub const MAX_INCLUDE_DEPTH: usize = 100;

/// What the reader produced: a source line, or the end of an include file
/// (reported so the listing can note the close).
#[derive(Debug, PartialEq, Eq)]
pub enum SourceEvent {
    Line(String),
    EndInclude(String),
}

struct SourceFrame {
    name: String,
    lines: Vec<String>,
    index: usize,
    line_no: u32,
}

/// Stacked line reader over the root source and its includes. Rewinding
/// restores the root for pass 2; include files are re-read on re-entry.
pub struct SourceStream {
    frames: Vec<SourceFrame>,
    pub total_lines: u32,
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(|line| line.trim_end_matches('\r').to_string()).collect())
}

impl SourceStream {
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let lines = read_lines(path)?;
        Ok(Self::from_lines(&path.to_string_lossy(), lines))
    }

    pub fn from_lines(name: &str, lines: Vec<String>) -> Self {
        Self {
            frames: vec![SourceFrame {
                name: name.to_string(),
                lines,
                index: 0,
                line_no: 0,
            }],
            total_lines: 0,
        }
    }

    /// Name of the file currently being read.
    pub fn file_name(&self) -> &str {
        &self.frames.last().expect("root frame").name
    }

    /// Line number within the current file.
    pub fn line_no(&self) -> u32 {
        self.frames.last().expect("root frame").line_no
    }

    pub fn include_depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Push an include file. The search is literal: no path resolution.
    pub fn push_include(&mut self, name: &str) -> Result<(), AsmError> {
        if self.frames.len() >= MAX_INCLUDE_DEPTH {
            return Err(AsmError::new(
                AsmErrorKind::Structural,
                "Too many includes nested",
                Some(&MAX_INCLUDE_DEPTH.to_string()),
            ));
        }
        let lines = read_lines(Path::new(name)).map_err(|_| {
            AsmError::new(AsmErrorKind::Io, "Could not open include file", Some(name))
        })?;
        self.frames.push(SourceFrame {
            name: name.to_string(),
            lines,
            index: 0,
            line_no: 0,
        });
        Ok(())
    }

    /// Abandon the current include file (for END inside an include).
    /// Returns the closed file's name, or None at the root.
    pub fn close_include(&mut self) -> Option<String> {
        if self.frames.len() > 1 {
            self.frames.pop().map(|frame| frame.name)
        } else {
            None
        }
    }

    pub fn next_event(&mut self) -> Option<SourceEvent> {
        loop {
            let frame = self.frames.last_mut()?;
            if frame.index < frame.lines.len() {
                let line = frame.lines[frame.index].clone();
                frame.index += 1;
                frame.line_no += 1;
                self.total_lines += 1;
                return Some(SourceEvent::Line(line));
            }
            if self.frames.len() > 1 {
                let frame = self.frames.pop().expect("include frame");
                return Some(SourceEvent::EndInclude(frame.name));
            }
            return None;
        }
    }

    /// Reset to the start of the root file for pass 2. The line total
    /// restarts so the summary reports each source line once.
    pub fn rewind(&mut self) {
        self.frames.truncate(1);
        let root = &mut self.frames[0];
        root.index = 0;
        root.line_no = 0;
        self.total_lines = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_lines_and_counts() {
        let mut stream = SourceStream::from_lines(
            "main.as9",
            vec!["one".to_string(), "two".to_string()],
        );
        assert_eq!(stream.next_event(), Some(SourceEvent::Line("one".to_string())));
        assert_eq!(stream.line_no(), 1);
        assert_eq!(stream.next_event(), Some(SourceEvent::Line("two".to_string())));
        assert_eq!(stream.next_event(), None);
        assert_eq!(stream.total_lines, 2);
    }

    #[test]
    fn rewind_restarts_root() {
        let mut stream = SourceStream::from_lines("main.as9", vec!["x".to_string()]);
        stream.next_event();
        stream.rewind();
        assert_eq!(stream.line_no(), 0);
        assert_eq!(stream.next_event(), Some(SourceEvent::Line("x".to_string())));
    }

    #[test]
    fn include_restores_parent_position() {
        let dir = std::env::temp_dir();
        let inc = dir.join(format!("bs9-test-inc-{}.as9", std::process::id()));
        std::fs::write(&inc, "inner\n").unwrap();

        let mut stream = SourceStream::from_lines(
            "main.as9",
            vec!["before".to_string(), "after".to_string()],
        );
        stream.next_event();
        stream.push_include(&inc.to_string_lossy()).unwrap();
        assert_eq!(stream.include_depth(), 1);
        assert_eq!(
            stream.next_event(),
            Some(SourceEvent::Line("inner".to_string()))
        );
        assert_eq!(stream.line_no(), 1);
        assert!(matches!(
            stream.next_event(),
            Some(SourceEvent::EndInclude(_))
        ));
        assert_eq!(
            stream.next_event(),
            Some(SourceEvent::Line("after".to_string()))
        );
        std::fs::remove_file(&inc).ok();
    }

    #[test]
    fn missing_include_is_io_error() {
        let mut stream = SourceStream::from_lines("main.as9", Vec::new());
        let err = stream.push_include("no-such-file.inc").unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::Io);
    }
}
