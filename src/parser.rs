//! Grammar for sregx expressions.
//!
//! ```text
//! Expression <- Command (S '|' S Command)* !.
//! Command    <- 'x' Pattern S Command
//!             / 'y' Pattern S Command
//!             / 'g' Pattern S Command
//!             / 'v' Pattern S Command
//!             / 's' Pattern Pattern
//!             / 'c' Pattern
//!             / 'n' Range S Command
//!             / 'l' Range S Command
//!             / 'p'
//!             / 'd'
//!             / [A-Za-z] Pattern
//! Pattern    <- '/' (!'/' Char)* '/'
//! Char       <- '\' [/nrt\\] / '\' [0-2][0-7][0-7] / '\' [0-7][0-7]? / !'\' .
//! Range      <- '[' Integer ':' Integer ']'
//! Integer    <- '-'? [0-9]+
//! S          <- [ \t\n\v\f\r]*
//! ```
//!
//! `Command` is an ordered choice. When the built-in form of a letter does
//! not parse, the letter is retried as a user-defined command with a single
//! pattern, so `x/abc/` is the user command `x` rather than an error. Instead
//! of failing on the first problem, each mismatch records a positioned
//! [`Diagnostic`] and the parser resumes at the next `|` outside a pattern.

use tracing::debug;
use winnow::ModalResult;
use winnow::ascii::digit1;
use winnow::combinator::{alt, opt, repeat};
use winnow::prelude::*;
use winnow::token::{any, none_of, one_of, take_while};

use crate::ast::{NodeId, NodeKind, ParseTree, Span};
use crate::error::Diagnostic;

/// Parse an expression into a parse tree.
///
/// The tree is complete only when the returned diagnostics are empty. Nodes
/// of commands that failed to parse are left out of it.
pub fn parse(source: &str) -> (ParseTree, Vec<Diagnostic>) {
    let mut grammar = Grammar {
        source,
        tree: ParseTree::new(),
        diagnostics: Vec::new(),
    };
    let mut input = source;
    let root = grammar.expression(&mut input);
    grammar.tree.set_root(root);

    debug!(
        nodes = grammar.tree.len(),
        diagnostics = grammar.diagnostics.len(),
        "parsed expression"
    );
    (grammar.tree, grammar.diagnostics)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

/// Parser for optional whitespace.
fn space<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(0.., is_space).parse_next(input)
}

/// Parser for the `|` between two commands.
fn pipe(input: &mut &str) -> ModalResult<()> {
    (space, '|', space).void().parse_next(input)
}

/// Parser for the part of an escape sequence after the backslash.
fn escape<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    alt((
        one_of(('/', 'n', 'r', 't', '\\')).take(),
        (one_of('0'..='2'), one_of('0'..='7'), one_of('0'..='7')).take(),
        (one_of('0'..='7'), opt(one_of('0'..='7'))).take(),
    ))
    .parse_next(input)
}

/// Parser for a signed decimal integer.
fn signed_integer<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (opt('-'), digit1).take().parse_next(input)
}

/// Consume `expected` if it is the next character.
fn eat(input: &mut &str, mut expected: char) -> bool {
    let parsed: ModalResult<char> = expected.parse_next(input);
    parsed.is_ok()
}

/// Parser for a terminated `/.../` pattern, skipped without building nodes.
fn skipped_pattern(input: &mut &str) -> ModalResult<()> {
    let body = repeat::<_, _, (), _, _>(
        0..,
        alt((('\\', any).void(), none_of(('/', '\\')).void())),
    );
    ('/', body, '/').void().parse_next(input)
}

/// Skip to the next `|` that is not inside a pattern.
///
/// A `/` without a matching closing `/` is skipped like any other character.
fn skip_to_pipe(input: &mut &str) {
    let _: ModalResult<()> =
        repeat(0.., alt((skipped_pattern, none_of('|').void()))).parse_next(input);
}

/// Consume one character, whatever it is.
fn skip_char(input: &mut &str) {
    let _: ModalResult<char> = any.parse_next(input);
}

/// Describe the next character for a diagnostic.
fn found(input: &str) -> String {
    match input.chars().next() {
        Some(c) => format!("{:?}", c),
        None => "end of input".to_string(),
    }
}

struct Grammar<'s> {
    source: &'s str,
    tree: ParseTree,
    diagnostics: Vec<Diagnostic>,
}

impl<'s> Grammar<'s> {
    fn offset(&self, input: &str) -> usize {
        self.source.len() - input.len()
    }

    fn error(&mut self, message: impl Into<String>, offset: usize) {
        self.diagnostics.push(Diagnostic::new(message, offset));
    }

    fn expression(&mut self, input: &mut &'s str) -> NodeId {
        let mut commands = Vec::new();
        loop {
            match self.command(input) {
                Some(command) => commands.push(command),
                None => skip_to_pipe(input),
            }

            let before = *input;
            if pipe(input).is_ok() {
                continue;
            }
            *input = before;

            let _ = space(input);
            if !input.is_empty() {
                let at = self.offset(input);
                self.error(
                    format!(
                        "unexpected {} after command, expected '|' or end of input",
                        found(input)
                    ),
                    at,
                );
            }
            break;
        }
        self.tree.push(
            NodeKind::Expression,
            Span::new(0, self.source.len()),
            commands,
        )
    }

    fn command(&mut self, input: &mut &'s str) -> Option<NodeId> {
        let mark = self.tree.len();
        let start = self.offset(input);
        match self.command_parts(input) {
            Some(children) => {
                let span = Span::new(start, self.offset(input));
                Some(self.tree.push(NodeKind::Command, span, children))
            }
            None => {
                self.tree.truncate(mark);
                None
            }
        }
    }

    fn command_parts(&mut self, input: &mut &'s str) -> Option<Vec<NodeId>> {
        let start = self.offset(input);
        let Some(letter) = input.chars().next() else {
            self.error("unexpected end of input, expected a command", start);
            return None;
        };
        if !letter.is_ascii_alphabetic() {
            self.error(
                format!("expected a command letter, found {:?}", letter),
                start,
            );
            return None;
        }

        let kind = NodeKind::from_letter(letter);
        let checkpoint = *input;
        let (nodes, errors) = (self.tree.len(), self.diagnostics.len());
        if let Some(children) = self.alternative(kind, input) {
            return Some(children);
        }
        if kind == NodeKind::UserDefined {
            return None;
        }

        // Retry as `[A-Za-z] Pattern`. If that fails too, the built-in
        // alternative's diagnostics are the ones reported.
        let failed = std::mem::replace(input, checkpoint);
        let built_in = self.diagnostics.split_off(errors);
        self.tree.truncate(nodes);
        if let Some(children) = self.alternative(NodeKind::UserDefined, input) {
            debug!(%letter, offset = start, "parsed letter as a user-defined command");
            return Some(children);
        }
        self.diagnostics.truncate(errors);
        self.diagnostics.extend(built_in);
        *input = failed;
        None
    }

    /// One alternative of `Command`, starting at its letter.
    fn alternative(&mut self, kind: NodeKind, input: &mut &'s str) -> Option<Vec<NodeId>> {
        let start = self.offset(input);
        skip_char(input);
        let name = self.tree.push(kind, Span::new(start, start + 1), vec![]);
        let mut children = vec![name];
        match kind {
            NodeKind::Extract
            | NodeKind::ComplementExtract
            | NodeKind::GuardMatch
            | NodeKind::GuardNoMatch => {
                children.push(self.pattern(input)?);
                let _ = space(input);
                children.push(self.command(input)?);
            }
            NodeKind::Substitute => {
                children.push(self.pattern(input)?);
                children.push(self.pattern(input)?);
            }
            NodeKind::Change | NodeKind::UserDefined => {
                children.push(self.pattern(input)?);
            }
            NodeKind::ByteRange | NodeKind::LineRange => {
                children.push(self.range(input)?);
                let _ = space(input);
                children.push(self.command(input)?);
            }
            // p and d take no arguments
            _ => {}
        }
        Some(children)
    }

    fn pattern(&mut self, input: &mut &'s str) -> Option<NodeId> {
        let start = self.offset(input);
        if !eat(input, '/') {
            self.error(
                format!("expected opening '/' of pattern, found {}", found(input)),
                start,
            );
            return None;
        }

        let mut chars = Vec::new();
        loop {
            let at = self.offset(input);
            if eat(input, '/') {
                break;
            }
            if input.is_empty() {
                self.error("missing closing '/' of pattern", at);
                return None;
            }

            if eat(input, '\\') {
                let before = *input;
                if escape(input).is_ok() {
                    let span = Span::new(at, self.offset(input));
                    chars.push(self.tree.push(NodeKind::Char, span, vec![]));
                    continue;
                }
                *input = before;
                match input.chars().next() {
                    Some(c) => {
                        self.error(format!("invalid escape sequence '\\{}'", c), at);
                        skip_char(input);
                    }
                    None => {
                        let end = self.offset(input);
                        self.error("missing closing '/' of pattern", end);
                        return None;
                    }
                }
                continue;
            }

            skip_char(input);
            let span = Span::new(at, self.offset(input));
            chars.push(self.tree.push(NodeKind::Char, span, vec![]));
        }

        let span = Span::new(start, self.offset(input));
        Some(self.tree.push(NodeKind::Pattern, span, chars))
    }

    fn range(&mut self, input: &mut &'s str) -> Option<NodeId> {
        let start = self.offset(input);
        if !eat(input, '[') {
            self.error(
                format!("expected '[' to open range, found {}", found(input)),
                start,
            );
            return None;
        }
        let low = self.integer(input)?;
        if !eat(input, ':') {
            let at = self.offset(input);
            self.error(format!("expected ':' in range, found {}", found(input)), at);
            return None;
        }
        let high = self.integer(input)?;
        if !eat(input, ']') {
            let at = self.offset(input);
            self.error(
                format!("expected closing ']' of range, found {}", found(input)),
                at,
            );
            return None;
        }

        let span = Span::new(start, self.offset(input));
        Some(self.tree.push(NodeKind::Range, span, vec![low, high]))
    }

    fn integer(&mut self, input: &mut &'s str) -> Option<NodeId> {
        let start = self.offset(input);
        let before = *input;
        match signed_integer(input) {
            Ok(digits) => {
                let span = Span::new(start, start + digits.len());
                Some(self.tree.push(NodeKind::Integer, span, vec![]))
            }
            Err(_) => {
                *input = before;
                self.error(format!("expected an integer, found {}", found(input)), start);
                None
            }
        }
    }
}
