//! G-code program loading
//!
//! Turns raw G-code text into an ordered list of executable command lines.
//! Blank lines and comment lines (lines that start with `;` or `(` once
//! trimmed) are dropped. Inline comments after real code are kept verbatim.
//!
//! While scanning, the loader tracks the last planar target seen in the file
//! so callers can preview where the job ends without parsing the program.

use gcodestream_core::LoadError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Last known planar (X, Y) target of a program
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryHint {
    /// Last X target
    pub last_x: f64,
    /// Last Y target
    pub last_y: f64,
}

impl TrajectoryHint {
    /// Update the running target from one command line
    ///
    /// A coordinate whose number does not parse keeps its previous value.
    pub fn observe(&mut self, line: &str) {
        if let Some(x) = word_value(line, 'X') {
            self.last_x = x;
        }
        if let Some(y) = word_value(line, 'Y') {
            self.last_y = y;
        }
    }
}

/// Parse the number right after the first occurrence of `letter`, up to the
/// next whitespace.
fn word_value(line: &str, letter: char) -> Option<f64> {
    let start = line.find(letter)? + letter.len_utf8();
    line[start..].split_whitespace().next()?.parse::<f64>().ok()
}

/// Check whether a trimmed line is a whole-line comment
fn is_comment(line: &str) -> bool {
    line.starts_with(';') || line.starts_with('(')
}

/// An ordered, immutable list of G-code commands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    commands: Vec<String>,
    trajectory: TrajectoryHint,
}

impl Program {
    /// Build a program from command lines
    ///
    /// Lines go through the same trimming and filtering as loaded text, so
    /// blank and comment lines never become commands.
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut program = Self::default();
        for line in commands {
            program.accept(line.as_ref());
        }
        program
    }

    /// Append one raw line if it is an executable command
    fn accept(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || is_comment(line) {
            return;
        }
        self.trajectory.observe(line);
        self.commands.push(line.to_string());
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the program has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Get the command at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.commands.get(index).map(String::as_str)
    }

    /// All commands in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Last planar target seen while loading
    pub fn trajectory(&self) -> TrajectoryHint {
        self.trajectory
    }
}

/// Loads G-code text into a [`Program`]
pub struct GcodeLoader;

impl GcodeLoader {
    /// Load a program from in-memory text
    pub fn load_str(raw_text: &str) -> Program {
        let mut program = Program::default();
        for line in raw_text.lines() {
            program.accept(line);
        }
        tracing::debug!("Loaded {} G-code commands", program.len());
        program
    }

    /// Load a program from a buffered reader
    ///
    /// # Errors
    /// Returns [`LoadError::Io`] if reading fails, including invalid UTF-8.
    pub fn load<R: BufRead>(reader: R) -> Result<Program, LoadError> {
        let mut program = Program::default();
        for line in reader.lines() {
            program.accept(&line?);
        }
        tracing::debug!("Loaded {} G-code commands", program.len());
        Ok(program)
    }

    /// Load a program from a file on disk
    ///
    /// # Errors
    /// Returns [`LoadError::FileError`] if the file cannot be opened and
    /// [`LoadError::Io`] if reading it fails.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Program, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LoadError::FileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let program = Self::load(BufReader::new(file))?;
        tracing::info!(
            "Loaded {} commands from {}",
            program.len(),
            path.display()
        );
        Ok(program)
    }
}
