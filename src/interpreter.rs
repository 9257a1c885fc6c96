//! Compiler from parse trees to executable [`Command`] trees.
//!
//! Compilation resolves everything that can be checked before any input is
//! seen: escape sequences, regular expressions, range bounds and
//! user-defined commands. Problems are reported as diagnostics positioned at
//! the node that caused them, and all of them are returned together.

use std::collections::HashMap;

use regex::bytes::Regex;
use tracing::debug;

use crate::ast::{NodeId, NodeKind, ParseTree};
use crate::error::{Diagnostic, Diagnostics};
use crate::operators::{Command, Evaluator, Extension, Sink};
use crate::parser;

/// Builds the evaluator for one occurrence of a user-defined command from
/// its decoded `/.../` argument.
pub type Factory = Box<dyn Fn(&str) -> anyhow::Result<Evaluator>>;

/// User-defined commands, keyed by their letter.
#[derive(Default)]
pub struct Extensions {
    factories: HashMap<char, Factory>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `letter`, replacing any earlier registration.
    ///
    /// Letters with a built-in meaning (`x y g v s c n l p d`) are parsed as
    /// the built-in command whenever that form parses. Only where it does not,
    /// as in `x/abc/` or `s/abc/`, does the letter name a user-defined command.
    pub fn register(
        &mut self,
        letter: char,
        factory: impl Fn(&str) -> anyhow::Result<Evaluator> + 'static,
    ) {
        self.factories.insert(letter, Box::new(factory));
    }

    pub fn get(&self, letter: char) -> Option<&Factory> {
        self.factories.get(&letter)
    }
}

/// Compile an expression into a command pipeline.
///
/// `p` commands write to `sink`. User-defined commands are looked up in
/// `extensions`. Every command that parsed is compiled, even when others did
/// not, and on failure all parse and compile diagnostics are returned
/// together, ordered by position.
pub fn compile(
    source: &str,
    sink: &Sink,
    extensions: &Extensions,
) -> Result<Command, Diagnostics> {
    let (tree, diagnostics) = parser::parse(source);
    let Some(root) = tree.root() else {
        return Err(Diagnostics::from(vec![Diagnostic::new(
            "expression has no commands",
            0,
        )]));
    };

    let mut compiler = Compiler {
        source,
        tree: &tree,
        sink,
        extensions,
        diagnostics,
    };
    let commands: Vec<Command> = tree
        .children(root)
        .iter()
        .filter_map(|&id| compiler.command(id))
        .collect();

    if !compiler.diagnostics.is_empty() {
        let mut diagnostics = compiler.diagnostics;
        diagnostics.sort_by_key(|d| d.offset);
        return Err(Diagnostics::from(diagnostics));
    }
    debug!(commands = commands.len(), "compiled expression");
    Ok(Command::Pipeline(commands))
}

/// The contents of a `/.../` pattern with escapes resolved.
#[derive(Debug, Default, PartialEq, Eq)]
struct Literal {
    /// Escaped bytes read as code points; used for regexes and extension
    /// arguments.
    text: String,
    /// Escaped bytes inserted verbatim; used for `c` and `s` replacements.
    bytes: Vec<u8>,
}

impl Literal {
    fn push_char(&mut self, c: char) {
        self.text.push(c);
        let mut buf = [0; 4];
        self.bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn push_byte(&mut self, b: u8) {
        self.text.push(char::from(b));
        self.bytes.push(b);
    }
}

/// Resolve one `Char` node's text into `literal`.
///
/// The parser only produces well-formed escapes, so anything after a
/// backslash is either a known letter or one to three octal digits.
fn decode_char(text: &str, literal: &mut Literal) {
    match text.strip_prefix('\\') {
        Some("n") => literal.push_byte(b'\n'),
        Some("r") => literal.push_byte(b'\r'),
        Some("t") => literal.push_byte(b'\t'),
        Some("\\") => literal.push_byte(b'\\'),
        Some("/") => literal.push_byte(b'/'),
        Some(digits) => {
            let value = digits
                .bytes()
                .fold(0u16, |acc, d| acc * 8 + u16::from(d - b'0'));
            literal.push_byte(value as u8);
        }
        None => text.chars().for_each(|c| literal.push_char(c)),
    }
}

struct Compiler<'a> {
    source: &'a str,
    tree: &'a ParseTree,
    sink: &'a Sink,
    extensions: &'a Extensions,
    diagnostics: Vec<Diagnostic>,
}

impl Compiler<'_> {
    fn error(&mut self, message: impl Into<String>, id: NodeId) {
        let offset = self.tree.node(id).span.start;
        self.diagnostics.push(Diagnostic::new(message, offset));
    }

    /// Compile a `Command` node. Returns `None` after recording diagnostics.
    fn command(&mut self, id: NodeId) -> Option<Command> {
        let tree = self.tree;
        let Some((&letter, args)) = tree.children(id).split_first() else {
            self.error("empty command", id);
            return None;
        };

        match (tree.kind(letter), args) {
            (NodeKind::Extract, &[pattern, command]) => self
                .scoped(pattern, command)
                .map(|(pattern, command)| Command::Extract { pattern, command }),
            (NodeKind::ComplementExtract, &[pattern, command]) => self
                .scoped(pattern, command)
                .map(|(pattern, command)| Command::ComplementExtract { pattern, command }),
            (NodeKind::GuardMatch, &[pattern, command]) => self
                .scoped(pattern, command)
                .map(|(pattern, command)| Command::GuardMatch { pattern, command }),
            (NodeKind::GuardNoMatch, &[pattern, command]) => self
                .scoped(pattern, command)
                .map(|(pattern, command)| Command::GuardNoMatch { pattern, command }),
            (NodeKind::Substitute, &[pattern, replacement]) => {
                let pattern = self.regex(pattern)?;
                Some(Command::Substitute {
                    pattern,
                    replacement: self.literal(replacement).bytes,
                })
            }
            (NodeKind::Change, &[text]) => Some(Command::Change(self.literal(text).bytes)),
            (NodeKind::ByteRange, &[range, command]) => {
                let bounds = self.range(range);
                let command = self.command(command);
                let ((start, end), command) = (bounds?, Box::new(command?));
                Some(Command::ByteRange {
                    start,
                    end,
                    command,
                })
            }
            (NodeKind::LineRange, &[range, command]) => {
                let bounds = self.range(range);
                let command = self.command(command);
                let ((start, end), command) = (bounds?, Box::new(command?));
                Some(Command::LineRange {
                    start,
                    end,
                    command,
                })
            }
            (NodeKind::Print, &[]) => Some(Command::Print(self.sink.clone())),
            (NodeKind::Delete, &[]) => Some(Command::Delete),
            (NodeKind::UserDefined, &[argument]) => self.user_defined(letter, argument),
            (kind, _) => {
                self.error(format!("malformed {:?} command", kind), id);
                None
            }
        }
    }

    /// Compile the pattern and nested command of `x`, `y`, `g` and `v`.
    ///
    /// Both are compiled even if the pattern fails, so errors in the nested
    /// command are reported too.
    fn scoped(&mut self, pattern: NodeId, command: NodeId) -> Option<(Regex, Box<Command>)> {
        let pattern = self.regex(pattern);
        let command = self.command(command);
        Some((pattern?, Box::new(command?)))
    }

    fn literal(&self, pattern: NodeId) -> Literal {
        let mut literal = Literal::default();
        for &c in self.tree.children(pattern) {
            decode_char(self.tree.text(c, self.source), &mut literal);
        }
        literal
    }

    fn regex(&mut self, pattern: NodeId) -> Option<Regex> {
        let literal = self.literal(pattern);
        match Regex::new(&literal.text) {
            Ok(regex) => Some(regex),
            Err(e) => {
                self.error(format!("invalid regular expression: {}", e), pattern);
                None
            }
        }
    }

    fn range(&mut self, range: NodeId) -> Option<(i64, i64)> {
        let tree = self.tree;
        let (start, end) = match tree.children(range) {
            &[start, end] => (start, end),
            _ => {
                self.error("malformed range", range);
                return None;
            }
        };
        let start = self.integer(start);
        let end = self.integer(end);
        Some((start?, end?))
    }

    fn integer(&mut self, id: NodeId) -> Option<i64> {
        let text = self.tree.text(id, self.source);
        let parsed = text.parse::<i64>();
        match parsed {
            Ok(value) => Some(value),
            Err(_) => {
                self.error(format!("integer {} is out of range", text), id);
                None
            }
        }
    }

    fn user_defined(&mut self, letter: NodeId, argument: NodeId) -> Option<Command> {
        let extensions = self.extensions;
        let Some(name) = self.tree.text(letter, self.source).chars().next() else {
            self.error("missing command letter", letter);
            return None;
        };
        let Some(factory) = extensions.get(name) else {
            self.error(format!("no command defined for '{}'", name), letter);
            return None;
        };

        let argument_text = self.literal(argument).text;
        match factory(&argument_text) {
            Ok(evaluator) => Some(Command::UserDefined(Extension::new(name, evaluator))),
            Err(e) => {
                self.error(format!("{}: {:#}", name, e), argument);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::bail;

    use super::*;
    use crate::operators::{ExtensionError, evaluator};

    fn sink() -> Sink {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn run(source: &str, input: &str) -> String {
        let command = compile(source, &sink(), &Extensions::new()).unwrap();
        String::from_utf8(command.evaluate(input.as_bytes()).unwrap()).unwrap()
    }

    fn errors(source: &str, extensions: &Extensions) -> Vec<(usize, String)> {
        compile(source, &sink(), extensions)
            .unwrap_err()
            .into_iter()
            .map(|d| (d.offset, d.message))
            .collect()
    }

    fn upper_extensions() -> Extensions {
        let mut extensions = Extensions::new();
        extensions.register('u', |arg| {
            if arg.is_empty() {
                bail!("empty argument");
            }
            let suffix = arg.as_bytes().to_vec();
            Ok(evaluator(move |b| {
                let mut out = b.to_ascii_uppercase();
                out.extend_from_slice(&suffix);
                Ok(out)
            }))
        });
        extensions
    }

    fn decoded(text: &str) -> Literal {
        let mut literal = Literal::default();
        decode_char(text, &mut literal);
        literal
    }

    #[test]
    fn decode_plain_and_escaped_chars() {
        assert_eq!(decoded("a").bytes, b"a");
        assert_eq!(decoded("é").bytes, "é".as_bytes());
        assert_eq!(decoded(r"\n").bytes, b"\n");
        assert_eq!(decoded(r"\t").bytes, b"\t");
        assert_eq!(decoded(r"\r").bytes, b"\r");
        assert_eq!(decoded(r"\/").bytes, b"/");
        assert_eq!(decoded(r"\\").bytes, b"\\");
    }

    #[test]
    fn decode_octal() {
        assert_eq!(decoded(r"\101").bytes, b"A");
        assert_eq!(decoded(r"\12").bytes, b"\n");
        assert_eq!(decoded(r"\0").bytes, b"\0");
        let high = decoded(r"\277");
        assert_eq!(high.bytes, vec![0o277]);
        assert_eq!(high.text, "\u{bf}");
    }

    #[test]
    fn compiles_pipeline_of_top_level_commands() {
        let command = compile("d | c/x/ | p", &sink(), &Extensions::new()).unwrap();
        match command {
            Command::Pipeline(commands) => assert_eq!(commands.len(), 3),
            other => panic!("expected pipeline, got {:?}", other),
        }
    }

    #[test]
    fn delete_matches() {
        assert_eq!(run("x/string/d", "hello string hi string test"), "hello  hi  test");
    }

    #[test]
    fn substitute_with_backreferences() {
        assert_eq!(run(r"s/(\\w+) (\\w+)//$2 $1/", "hello world"), "world hello");
    }

    #[test]
    fn escapes_reach_the_regex() {
        assert_eq!(run(r"x/\n/c/;/", "a\nb\n"), "a;b;");
        assert_eq!(run(r"x/a\/b/c/ok/", "a/b"), "ok");
        assert_eq!(run(r"x/\\./c/dot/", "a.b"), "adotb");
    }

    #[test]
    fn change_text_is_literal() {
        assert_eq!(run(r"c/one\ttwo\n/", "x"), "one\ttwo\n");
        assert_eq!(run(r"c/[.*]/", "x"), "[.*]");
    }

    #[test]
    fn rename_identifier_outside_strings() {
        let source = r#"y/".*"/ y/'.*'/ x/[a-zA-Z0-9]+/ g/n/ v/../ c/num/"#;
        let input = "int main() {\n\tchar* n = \"hello n \\n\";\n\tprintf(\"%s\\n\", n);\n}\n";
        let want = "int main() {\n\tchar* num = \"hello n \\n\";\n\tprintf(\"%s\\n\", num);\n}\n";
        assert_eq!(run(source, "n"), "num");
        assert_eq!(run(source, input), want);
    }

    #[test]
    fn byte_and_line_ranges() {
        assert_eq!(run("n[0:5]c/howdy/", "hello world"), "howdy world");
        assert_eq!(run("n[-1:-1] c/!/", "hi"), "hi!");
        assert_eq!(run("l[1:2]d", "a\nb\nc\n"), "a\nc\n");
    }

    #[test]
    fn print_binds_the_sink() {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let sink: Sink = buffer.clone();
        let command = compile("x/[0-9]+/p", &sink, &Extensions::new()).unwrap();
        assert!(command.contains_print());
        command.evaluate(b"a1b22c").unwrap();
        assert_eq!(buffer.borrow().as_slice(), b"122");
    }

    #[test]
    fn invalid_regex_is_positioned_at_pattern() {
        let errs = errors("x/a(/d", &Extensions::new());
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].0, 1);
        assert!(errs[0].1.starts_with("invalid regular expression"));
    }

    #[test]
    fn collects_errors_from_every_command() {
        let errs = errors("x/(/ g/[/ d | s/)//x/", &Extensions::new());
        let offsets: Vec<usize> = errs.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![1, 6, 15]);
    }

    #[test]
    fn integer_overflow_in_range() {
        let errs = errors("n[0:99999999999999999999]p", &Extensions::new());
        assert_eq!(
            errs,
            vec![(4, "integer 99999999999999999999 is out of range".to_string())]
        );
    }

    #[test]
    fn parse_and_compile_errors_are_reported_together() {
        let errs = errors(r"x/(/d | c/\q/", &Extensions::new());
        let offsets: Vec<usize> = errs.iter().map(|(o, _)| *o).collect();
        assert_eq!(offsets, vec![1, 10]);
        assert!(errs[0].1.starts_with("invalid regular expression"));
        assert_eq!(errs[1].1, r"invalid escape sequence '\q'");

        // Commands after one that failed to parse are still compiled.
        let errs = errors("1 | k//", &Extensions::new());
        assert_eq!(
            errs,
            vec![
                (0, "expected a command letter, found '1'".to_string()),
                (4, "no command defined for 'k'".to_string()),
            ]
        );
    }

    #[test]
    fn user_defined_command() {
        let command = compile("x/[a-z]+/u/!/", &sink(), &upper_extensions()).unwrap();
        assert!(!command.contains_print());
        assert_eq!(command.evaluate(b"ab 12 cd").unwrap(), b"AB! 12 CD!");
    }

    #[test]
    fn user_defined_argument_is_decoded() {
        let command = compile(r"u/\t\//", &sink(), &upper_extensions()).unwrap();
        assert_eq!(command.evaluate(b"a").unwrap(), b"A\t/");
    }

    #[test]
    fn unregistered_letter() {
        let errs = errors("d | k/arg/", &Extensions::new());
        assert_eq!(errs, vec![(4, "no command defined for 'k'".to_string())]);
    }

    #[test]
    fn factory_failure_is_positioned_at_argument() {
        let errs = errors("d | u//", &upper_extensions());
        assert_eq!(errs, vec![(5, "u: empty argument".to_string())]);
    }

    #[test]
    fn factory_runs_once_per_occurrence() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let mut extensions = Extensions::new();
        extensions.register('k', move |_| {
            *counter.borrow_mut() += 1;
            Ok(evaluator(|b| Ok(b.to_vec())))
        });

        let command = compile("x/a/k// | k//", &sink(), &extensions).unwrap();
        assert_eq!(*calls.borrow(), 2);
        command.evaluate(b"aaaa").unwrap();
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn user_defined_failure_degrades() {
        let mut extensions = Extensions::new();
        extensions.register('f', |_| {
            Ok(evaluator(|_| {
                Err(ExtensionError::new("failed", Vec::new()))
            }))
        });
        let command = compile("x/[0-9]/f// | s/a//A/", &sink(), &extensions).unwrap();
        assert_eq!(command.evaluate(b"a1a2").unwrap(), b"AA");
    }

    #[test]
    fn built_in_letter_without_its_arguments_is_user_defined() {
        let mut extensions = upper_extensions();
        extensions.register('s', |arg| {
            let text = arg.as_bytes().to_vec();
            Ok(evaluator(move |_| Ok(text.clone())))
        });
        let command = compile("s/abc/", &sink(), &extensions).unwrap();
        assert_eq!(command.evaluate(b"xyz").unwrap(), b"abc");

        // The built-in form still wins where it parses.
        let command = compile("s/x//y/", &sink(), &extensions).unwrap();
        assert_eq!(command.evaluate(b"xyz").unwrap(), b"yyz");
    }

    #[test]
    fn unregistered_fallback_is_positioned_at_letter() {
        let errs = errors("x/abc/", &Extensions::new());
        assert_eq!(errs, vec![(0, "no command defined for 'x'".to_string())]);
        let errs = errors("d | n/arg/", &Extensions::new());
        assert_eq!(errs, vec![(4, "no command defined for 'n'".to_string())]);
    }

    #[test]
    fn built_in_letters_shadow_extensions() {
        let mut extensions = upper_extensions();
        extensions.register('d', |_| Ok(evaluator(|_| Ok(b"never".to_vec()))));
        let command = compile("d", &sink(), &extensions).unwrap();
        assert_eq!(command.evaluate(b"abc").unwrap(), b"");
    }
}
