//! Node tree definitions for LaTeX-like documents.
//!
//! Nodes are produced by the parser and are immutable afterwards, except for
//! a single derived annotation that a construct handler may attach the first
//! time it inspects the node (see [`Node::derived_or_try_init`]).

use crate::error::{ParseError, Position, Result};
use std::cell::{Cell, OnceCell};
use std::ops::Deref;

/// Stable identity of a node, stamped by the parser.
///
/// Identities are unique within one [`Document`](crate::Document) and survive
/// cloning, so they can key registries across render passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Hands out node identities in increasing order.
#[derive(Debug, Default)]
pub struct NodeIdAllocator {
    next: Cell<u64>,
}

impl NodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> NodeId {
        let id = self.next.get() + 1;
        self.next.set(id);
        NodeId(id)
    }
}

/// Parsing state snapshot attached to each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsingState {
    /// `Some(true)` in block context, `Some(false)` when the content is
    /// explicitly inline, `None` when unspecified.
    pub is_block_level: Option<bool>,
    /// Whether the node sits inside math mode.
    pub in_math: bool,
}

impl ParsingState {
    pub fn inline() -> Self {
        Self {
            is_block_level: Some(false),
            in_math: false,
        }
    }

    pub fn block() -> Self {
        Self {
            is_block_level: Some(true),
            in_math: false,
        }
    }
}

/// Math display type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathDisplay {
    Inline,
    Display,
}

impl MathDisplay {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathDisplay::Inline => "inline",
            MathDisplay::Display => "display",
        }
    }
}

/// Which kind of invocable construct a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationKind {
    Macro,
    Environment,
    Specials,
}

/// A resolved argument binding of an invocation.
#[derive(Debug, Clone)]
pub struct Argument {
    /// Argument name from the construct's argument spec
    pub name: String,
    /// Argument content, `None` if an optional argument was not provided
    pub value: Option<NodeList>,
}

impl Argument {
    pub fn was_provided(&self) -> bool {
        self.value.is_some()
    }
}

/// Payload of a macro, environment or specials node.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub name: String,
    pub arguments: Vec<Argument>,
    /// Environment body, `None` for macros and specials
    pub body: Option<NodeList>,
}

impl Invocation {
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Content of an argument if it was provided.
    pub fn argument_nodes(&self, name: &str) -> Option<&NodeList> {
        self.argument(name).and_then(|a| a.value.as_ref())
    }

    /// Content of a mandatory argument; missing content is a parse error.
    pub fn required_nodes(&self, name: &str, pos: Position) -> Result<&NodeList> {
        self.argument_nodes(name).ok_or_else(|| {
            ParseError::MissingArgument {
                pos,
                construct: self.name.clone(),
                argument: name.to_string(),
            }
            .into()
        })
    }

    /// Content of an argument as plain characters, if provided.
    pub fn argument_chars(&self, name: &str) -> Result<Option<String>> {
        match self.argument_nodes(name) {
            Some(nodes) => nodes.as_chars().map(Some),
            None => Ok(None),
        }
    }
}

/// Type-specific node payload.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A run of text
    Chars(String),
    /// A `%` comment
    Comment(String),
    /// A `{...}` group
    Group {
        delimiters: (String, String),
        nodes: NodeList,
    },
    Macro(Invocation),
    Environment(Invocation),
    Specials(Invocation),
    /// Math content, kept as its source between the delimiters
    Math {
        delimiters: (String, String),
        display: MathDisplay,
        source: String,
    },
}

/// One item of an enumeration environment: the `\item` node and its content.
#[derive(Debug, Clone)]
pub struct EnumerationItem {
    pub item: Node,
    pub content: NodeList,
}

/// One key of a `\cite` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiteItem {
    pub prefix: Option<String>,
    pub key: String,
}

/// A float body split into caption and remaining content.
#[derive(Debug, Clone)]
pub struct FloatParts {
    pub caption: Option<NodeList>,
    pub content: NodeList,
    pub has_label: bool,
}

/// Sub-structure derived from a node by its construct handler.
#[derive(Debug, Clone)]
pub enum Derived {
    Enumeration(Vec<EnumerationItem>),
    Citation {
        extra: Option<NodeList>,
        items: Vec<CiteItem>,
    },
    Graphics {
        options: String,
        path: String,
    },
    Float(FloatParts),
}

/// A parsed document node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub pos: Position,
    pub pos_end: usize,
    pub state: ParsingState,
    pub kind: NodeKind,
    derived: OnceCell<Derived>,
}

impl Node {
    pub fn new(
        id: NodeId,
        pos: Position,
        pos_end: usize,
        state: ParsingState,
        kind: NodeKind,
    ) -> Self {
        Self {
            id,
            pos,
            pos_end,
            state,
            kind,
            derived: OnceCell::new(),
        }
    }

    /// Create a text node.
    pub fn chars(id: NodeId, text: impl Into<String>, pos: Position, state: ParsingState) -> Self {
        Self::new(id, pos, pos.offset, state, NodeKind::Chars(text.into()))
    }

    pub fn invocation(&self) -> Option<(InvocationKind, &Invocation)> {
        match &self.kind {
            NodeKind::Macro(inv) => Some((InvocationKind::Macro, inv)),
            NodeKind::Environment(inv) => Some((InvocationKind::Environment, inv)),
            NodeKind::Specials(inv) => Some((InvocationKind::Specials, inv)),
            _ => None,
        }
    }

    pub fn is_macro(&self, name: &str) -> bool {
        matches!(&self.kind, NodeKind::Macro(inv) if inv.name == name)
    }

    /// Whether this is the blank-line separator between paragraphs.
    pub fn is_paragraph_break(&self) -> bool {
        matches!(&self.kind, NodeKind::Specials(inv) if inv.name == PARAGRAPH_BREAK)
    }

    /// Whether the node only contributes whitespace or nothing at all.
    pub fn is_whitespace(&self) -> bool {
        match &self.kind {
            NodeKind::Chars(text) => text.trim().is_empty(),
            NodeKind::Comment(_) => true,
            _ => false,
        }
    }

    /// Attach the derived annotation; only the first call has an effect.
    pub fn set_derived(&self, derived: Derived) {
        let _ = self.derived.set(derived);
    }

    pub fn derived(&self) -> Option<&Derived> {
        self.derived.get()
    }

    /// Return the memoized derived annotation, computing it on first access.
    pub fn derived_or_try_init<F>(&self, f: F) -> Result<&Derived>
    where
        F: FnOnce() -> Result<Derived>,
    {
        if let Some(derived) = self.derived.get() {
            return Ok(derived);
        }
        let derived = f()?;
        Ok(self.derived.get_or_init(|| derived))
    }
}

/// Specials name used for the paragraph separator produced by blank lines.
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// An ordered sequence of nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeList(Vec<Node>);

impl NodeList {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.0
    }

    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    /// Position of the first node, if any.
    pub fn pos(&self) -> Option<Position> {
        self.0.first().map(|n| n.pos)
    }

    pub fn is_whitespace(&self) -> bool {
        self.0.iter().all(Node::is_whitespace)
    }

    /// Split the list wherever `is_separator` matches.
    ///
    /// With `keep_separators` each separator starts the following segment;
    /// otherwise separators are dropped. Empty segments are never returned.
    pub fn split_at<P>(&self, is_separator: P, keep_separators: bool) -> Vec<NodeList>
    where
        P: Fn(&Node) -> bool,
    {
        let mut segments = Vec::new();
        let mut current = Vec::new();

        for node in &self.0 {
            if is_separator(node) {
                if !current.is_empty() {
                    segments.push(NodeList(std::mem::take(&mut current)));
                }
                if keep_separators {
                    current.push(node.clone());
                }
            } else {
                current.push(node.clone());
            }
        }
        if !current.is_empty() {
            segments.push(NodeList(current));
        }

        segments
    }

    /// Concatenate the text of a chars-only list.
    ///
    /// Comments are skipped; any other node type is a parse error.
    pub fn as_chars(&self) -> Result<String> {
        let mut out = String::new();
        for node in &self.0 {
            match &node.kind {
                NodeKind::Chars(text) => out.push_str(text),
                NodeKind::Comment(_) => {}
                _ => {
                    return Err(ParseError::malformed(
                        node.pos,
                        "expected plain characters only",
                    )
                    .into())
                }
            }
        }
        Ok(out)
    }
}

impl Deref for NodeList {
    type Target = [Node];

    fn deref(&self) -> &[Node] {
        &self.0
    }
}

impl From<Vec<Node>> for NodeList {
    fn from(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(ids: &NodeIdAllocator, s: &str) -> Node {
        Node::chars(ids.allocate(), s, Position::default(), ParsingState::default())
    }

    fn brk(ids: &NodeIdAllocator) -> Node {
        Node::new(
            ids.allocate(),
            Position::default(),
            0,
            ParsingState::default(),
            NodeKind::Specials(Invocation {
                name: PARAGRAPH_BREAK.to_string(),
                arguments: Vec::new(),
                body: None,
            }),
        )
    }

    #[test]
    fn test_split_drops_separators() {
        let ids = NodeIdAllocator::new();
        let list = NodeList::new(vec![text(&ids, "a"), brk(&ids), text(&ids, "b"), brk(&ids)]);
        let parts = list.split_at(Node::is_paragraph_break, false);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_chars().unwrap(), "a");
        assert_eq!(parts[1].as_chars().unwrap(), "b");
    }

    #[test]
    fn test_split_keeps_separators() {
        let ids = NodeIdAllocator::new();
        let list = NodeList::new(vec![text(&ids, " "), brk(&ids), text(&ids, "x")]);
        let parts = list.split_at(Node::is_paragraph_break, true);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].is_whitespace());
        assert!(parts[1][0].is_paragraph_break());
    }

    #[test]
    fn test_node_ids_are_unique() {
        let ids = NodeIdAllocator::new();
        let a = ids.allocate();
        let b = ids.allocate();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn test_derived_is_memoized() {
        let ids = NodeIdAllocator::new();
        let node = text(&ids, "x");
        let mut calls = 0;
        node.derived_or_try_init(|| {
            calls += 1;
            Ok(Derived::Graphics {
                options: String::new(),
                path: "a.png".into(),
            })
        })
        .unwrap();
        node.derived_or_try_init(|| {
            calls += 1;
            Ok(Derived::Graphics {
                options: String::new(),
                path: "b.png".into(),
            })
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert!(matches!(node.derived(), Some(Derived::Graphics { path, .. }) if path == "a.png"));
    }
}
