//! Error types for sregx.
//!
//! Parsing and compiling report every problem they find as a positioned
//! [`Diagnostic`]. Evaluation can fail only in a few well-defined ways,
//! described by [`Error`].

use std::fmt;
use std::io;

/// A problem found in an expression, positioned at a byte offset into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The error message.
    pub message: String,
    /// Byte offset in the expression text.
    pub offset: usize,
}

impl Diagnostic {
    /// Create a diagnostic at a byte offset in the expression.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    /// Render the message, the expression, and a caret under the offending
    /// character.
    pub fn render(&self, expression: &str) -> String {
        let column = expression
            .get(..self.offset)
            .map_or(self.offset, |prefix| prefix.chars().count());
        format!("{}\n  {}\n  {}^", self, expression, " ".repeat(column))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at position {})", self.message, self.offset)
    }
}

impl std::error::Error for Diagnostic {}

/// Every diagnostic produced by one parse or compile attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render each diagnostic against the expression, separated by newlines.
    pub fn render(&self, expression: &str) -> String {
        self.0
            .iter()
            .map(|d| d.render(expression))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self(diagnostics)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

/// What a range operator counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeUnit {
    Byte,
    Line,
}

impl fmt::Display for RangeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeUnit::Byte => write!(f, "byte"),
            RangeUnit::Line => write!(f, "line"),
        }
    }
}

/// Errors that can occur while evaluating a compiled expression.
#[derive(Debug)]
pub enum Error {
    /// A byte or line range does not fit the buffer after negative indices
    /// were resolved. `start` and `end` are the resolved values.
    RangeOutOfBounds {
        unit: RangeUnit,
        start: i64,
        end: i64,
        len: usize,
    },
    /// The print sink rejected a write.
    Output(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::RangeOutOfBounds {
                unit,
                start,
                end,
                len,
            } => write!(
                f,
                "{} range [{}:{}] out of bounds (input has {} {}s)",
                unit, start, end, len, unit
            ),
            Error::Output(e) => write!(f, "failed to write output: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Output(e) => Some(e),
            Error::RangeOutOfBounds { .. } => None,
        }
    }
}

/// Result type for evaluation.
pub type Result<T> = std::result::Result<T, Error>;
