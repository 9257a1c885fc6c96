//! The operators of the sregx language.
//!
//! A compiled expression is a tree of [`Command`]s. Evaluating a command maps
//! an input buffer to a new output buffer; structural commands (`x`, `y`,
//! `g`, `v`, `n`, `l`) hand some part of their input to a nested command and
//! splice its result back in.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use regex::bytes::Regex;
use tracing::warn;

use crate::error::{Error, RangeUnit, Result};
use crate::ranges::{nth_separator_offset, partition_by_complement, splice_range};

/// Destination of the `p` command.
///
/// The sink is shared with the caller, who owns it and flushes it once
/// evaluation has finished.
pub type Sink = Rc<RefCell<dyn Write>>;

/// A failed user-defined evaluation.
///
/// `output` is whatever the evaluator managed to produce; it replaces the
/// input span just as a successful result would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionError {
    pub output: Vec<u8>,
    pub message: String,
}

impl ExtensionError {
    pub fn new(message: impl Into<String>, output: Vec<u8>) -> Self {
        Self {
            output,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExtensionError {}

/// The transformation performed by a user-defined command.
pub type Evaluator = Box<dyn Fn(&[u8]) -> std::result::Result<Vec<u8>, ExtensionError>>;

/// Box a closure as an [`Evaluator`].
pub fn evaluator(
    f: impl Fn(&[u8]) -> std::result::Result<Vec<u8>, ExtensionError> + 'static,
) -> Evaluator {
    Box::new(f)
}

/// A user-defined command bound to its letter.
pub struct Extension {
    letter: char,
    evaluator: Evaluator,
}

impl Extension {
    pub fn new(letter: char, evaluator: Evaluator) -> Self {
        Self { letter, evaluator }
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Run the evaluator. A failure is logged and its partial output used.
    pub fn evaluate(&self, input: &[u8]) -> Vec<u8> {
        match (self.evaluator)(input) {
            Ok(output) => output,
            Err(e) => {
                warn!(command = %self.letter, error = %e.message, "user-defined command failed");
                e.output
            }
        }
    }
}

/// A compiled sregx command.
pub enum Command {
    /// Commands applied in order, each to the previous one's output.
    Pipeline(Vec<Command>),
    /// `x` - replace every match with the nested command applied to it.
    Extract { pattern: Regex, command: Box<Command> },
    /// `y` - replace every span between matches with the nested command
    /// applied to it.
    ComplementExtract { pattern: Regex, command: Box<Command> },
    /// `g` - apply the nested command to the whole input if the pattern
    /// matches anywhere in it.
    GuardMatch { pattern: Regex, command: Box<Command> },
    /// `v` - apply the nested command to the whole input if the pattern
    /// matches nowhere in it.
    GuardNoMatch { pattern: Regex, command: Box<Command> },
    /// `s` - replace all matches, expanding `$1`, `${name}` in the template.
    Substitute { pattern: Regex, replacement: Vec<u8> },
    /// `c` - replace the input with fixed text.
    Change(Vec<u8>),
    /// `d` - replace the input with nothing.
    Delete,
    /// `p` - write the input to the sink and pass it through.
    Print(Sink),
    /// `n` - apply the nested command to `input[start:end]`.
    ByteRange {
        start: i64,
        end: i64,
        command: Box<Command>,
    },
    /// `l` - apply the nested command to lines `start` to `end`.
    LineRange {
        start: i64,
        end: i64,
        command: Box<Command>,
    },
    UserDefined(Extension),
}

impl Command {
    /// Evaluate the command on `input`, returning the transformed buffer.
    ///
    /// Nested commands run depth first, left to right, so `p` commands write
    /// to the sink in the order they appear in the expression.
    pub fn evaluate(&self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            Command::Pipeline(commands) => {
                let mut buffer = input.to_vec();
                for command in commands {
                    buffer = command.evaluate(&buffer)?;
                }
                Ok(buffer)
            }
            Command::Extract { pattern, command } => extract(pattern, input, command),
            Command::ComplementExtract { pattern, command } => {
                partition_by_complement(pattern, input, |span| command.evaluate(span))
            }
            Command::GuardMatch { pattern, command } => {
                if pattern.is_match(input) {
                    command.evaluate(input)
                } else {
                    Ok(input.to_vec())
                }
            }
            Command::GuardNoMatch { pattern, command } => {
                if pattern.is_match(input) {
                    Ok(input.to_vec())
                } else {
                    command.evaluate(input)
                }
            }
            Command::Substitute {
                pattern,
                replacement,
            } => Ok(pattern
                .replace_all(input, replacement.as_slice())
                .into_owned()),
            Command::Change(text) => Ok(text.clone()),
            Command::Delete => Ok(Vec::new()),
            Command::Print(sink) => {
                sink.borrow_mut().write_all(input).map_err(Error::Output)?;
                Ok(input.to_vec())
            }
            Command::ByteRange {
                start,
                end,
                command,
            } => {
                let (s, e) = byte_bounds(*start, *end, input.len())?;
                let replacement = command.evaluate(&input[s..e])?;
                Ok(splice_range(input, s, e, &replacement))
            }
            Command::LineRange {
                start,
                end,
                command,
            } => {
                let (s, e) = line_bounds(*start, *end, input)?;
                let replacement = command.evaluate(&input[s..e])?;
                Ok(splice_range(input, s, e, &replacement))
            }
            Command::UserDefined(extension) => Ok(extension.evaluate(input)),
        }
    }

    /// Whether a `p` command appears anywhere in this tree.
    pub fn contains_print(&self) -> bool {
        match self {
            Command::Print(_) => true,
            Command::Pipeline(commands) => commands.iter().any(Command::contains_print),
            Command::Extract { command, .. }
            | Command::ComplementExtract { command, .. }
            | Command::GuardMatch { command, .. }
            | Command::GuardNoMatch { command, .. }
            | Command::ByteRange { command, .. }
            | Command::LineRange { command, .. } => command.contains_print(),
            Command::Substitute { .. }
            | Command::Change(_)
            | Command::Delete
            | Command::UserDefined(_) => false,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pipeline(commands) => f.debug_list().entries(commands).finish(),
            Command::Extract { pattern, command } => f
                .debug_struct("Extract")
                .field("pattern", &pattern.as_str())
                .field("command", command)
                .finish(),
            Command::ComplementExtract { pattern, command } => f
                .debug_struct("ComplementExtract")
                .field("pattern", &pattern.as_str())
                .field("command", command)
                .finish(),
            Command::GuardMatch { pattern, command } => f
                .debug_struct("GuardMatch")
                .field("pattern", &pattern.as_str())
                .field("command", command)
                .finish(),
            Command::GuardNoMatch { pattern, command } => f
                .debug_struct("GuardNoMatch")
                .field("pattern", &pattern.as_str())
                .field("command", command)
                .finish(),
            Command::Substitute {
                pattern,
                replacement,
            } => f
                .debug_struct("Substitute")
                .field("pattern", &pattern.as_str())
                .field("replacement", &String::from_utf8_lossy(replacement))
                .finish(),
            Command::Change(text) => f
                .debug_tuple("Change")
                .field(&String::from_utf8_lossy(text))
                .finish(),
            Command::Delete => write!(f, "Delete"),
            Command::Print(_) => write!(f, "Print"),
            Command::ByteRange {
                start,
                end,
                command,
            } => f
                .debug_struct("ByteRange")
                .field("start", start)
                .field("end", end)
                .field("command", command)
                .finish(),
            Command::LineRange {
                start,
                end,
                command,
            } => f
                .debug_struct("LineRange")
                .field("start", start)
                .field("end", end)
                .field("command", command)
                .finish(),
            Command::UserDefined(extension) => f
                .debug_tuple("UserDefined")
                .field(&extension.letter)
                .finish(),
        }
    }
}

/// Replace each match of `pattern` with `command` applied to it.
fn extract(pattern: &Regex, input: &[u8], command: &Command) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut last = 0;
    for m in pattern.find_iter(input) {
        out.extend_from_slice(&input[last..m.start()]);
        out.extend(command.evaluate(m.as_bytes())?);
        last = m.end();
    }
    out.extend_from_slice(&input[last..]);
    Ok(out)
}

/// Resolve a negative index against `len`: `-1` is `len`, `-2` is `len - 1`.
fn resolve(index: i64, len: usize) -> i64 {
    if index < 0 {
        len as i64 + 1 + index
    } else {
        index
    }
}

/// Resolve and check a range against `len`, returning usable offsets.
fn checked_bounds(start: i64, end: i64, len: usize, unit: RangeUnit) -> Result<(usize, usize)> {
    let start = resolve(start, len);
    let end = resolve(end, len);
    if start < 0 || start > end || end > len as i64 {
        return Err(Error::RangeOutOfBounds {
            unit,
            start,
            end,
            len,
        });
    }
    Ok((start as usize, end as usize))
}

fn byte_bounds(start: i64, end: i64, len: usize) -> Result<(usize, usize)> {
    checked_bounds(start, end, len, RangeUnit::Byte)
}

/// Byte offsets of the start of line `start` and the start of line `end`.
fn line_bounds(start: i64, end: i64, input: &[u8]) -> Result<(usize, usize)> {
    let lines = input.iter().filter(|&&b| b == b'\n').count();
    let (first, last) = checked_bounds(start, end, lines, RangeUnit::Line)?;
    // Both are within the newline count, so the offsets exist.
    let s = nth_separator_offset(input, b"\n", first).unwrap_or(input.len());
    let e = nth_separator_offset(input, b"\n", last).unwrap_or(input.len());
    Ok((s, e))
}
