//! Parse tree for sregx expressions.
//!
//! Nodes live in an arena and refer to their children by [`NodeId`]. Each
//! node records the byte span of the expression text it was parsed from, so
//! the compiler can slice out literals and position its diagnostics.

use serde::Serialize;

/// Index of a node in a [`ParseTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

/// Half-open byte range `[start, end)` into the expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// What a node represents.
///
/// A `Command` node's first child is always one of the command letter kinds
/// (`Extract` through `UserDefined`); its remaining children are the
/// arguments that letter takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The whole expression; children are the `|`-separated commands.
    Expression,
    Command,
    /// `x`
    Extract,
    /// `y`
    ComplementExtract,
    /// `g`
    GuardMatch,
    /// `v`
    GuardNoMatch,
    /// `s`
    Substitute,
    /// `c`
    Change,
    /// `n`
    ByteRange,
    /// `l`
    LineRange,
    /// `p`
    Print,
    /// `d`
    Delete,
    /// Any other letter, resolved against the extension registry.
    UserDefined,
    /// `/.../`; children are `Char` nodes.
    Pattern,
    /// One literal character or escape sequence inside a pattern.
    Char,
    /// `[start:end]`; children are two `Integer` nodes.
    Range,
    Integer,
}

impl NodeKind {
    /// The command kind introduced by `letter`.
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'x' => NodeKind::Extract,
            'y' => NodeKind::ComplementExtract,
            'g' => NodeKind::GuardMatch,
            'v' => NodeKind::GuardNoMatch,
            's' => NodeKind::Substitute,
            'c' => NodeKind::Change,
            'n' => NodeKind::ByteRange,
            'l' => NodeKind::LineRange,
            'p' => NodeKind::Print,
            'd' => NodeKind::Delete,
            _ => NodeKind::UserDefined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub children: Vec<NodeId>,
}

/// A parsed expression.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl ParseTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    pub fn push(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            span,
            children,
        });
        id
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node pushed after the arena held `len` nodes.
    ///
    /// Used to discard the nodes of a command that failed to parse.
    pub fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The `Expression` node, once parsing has finished.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// The expression text a node was parsed from.
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        let span = self.node(id).span;
        &source[span.start..span.end]
    }
}
