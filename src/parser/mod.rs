//! Parser for LaTeX-like source into a node tree.
//!
//! The parser knows nothing about individual constructs beyond what the
//! [`SpecRegistry`] tells it: argument shapes, specials sequences and the
//! handler to run on freshly built nodes.

mod lexer;

use crate::ast::{
    Argument, Invocation, InvocationKind, MathDisplay, Node, NodeIdAllocator, NodeKind, NodeList,
    ParsingState, PARAGRAPH_BREAK,
};
use crate::error::{ParseError, Position, Result};
use crate::spec::{ArgKind, ConstructSpec, SpecRegistry};

/// Parse `source` into a node list.
///
/// `state` is the parsing state given to top-level nodes; every node gets a
/// fresh identity from `ids`.
pub fn parse_fragment(
    source: &str,
    specs: &SpecRegistry,
    ids: &NodeIdAllocator,
    state: ParsingState,
) -> Result<NodeList> {
    let parser = Parser::new(source, specs, ids);
    let (nodes, _) = parser.parse_nodes(source, &Stop::Eof, state)?;
    Ok(nodes)
}

/// What ends the node list currently being parsed.
#[derive(Debug, PartialEq)]
enum Stop<'a> {
    Eof,
    CloseBrace,
    CloseBracket,
    EndEnvironment(&'a str),
}

struct Parser<'a> {
    source: &'a str,
    specs: &'a SpecRegistry,
    ids: &'a NodeIdAllocator,
    specials: Vec<&'a str>,
    line_starts: Vec<usize>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, specs: &'a SpecRegistry, ids: &'a NodeIdAllocator) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            source,
            specs,
            ids,
            specials: specs.specials(),
            line_starts,
        }
    }

    fn offset(&self, rest: &str) -> usize {
        self.source.len() - rest.len()
    }

    fn position(&self, rest: &str) -> Position {
        let offset = self.offset(rest);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        Position {
            offset,
            line: line_idx + 1,
            column: self.source[line_start..offset].chars().count() + 1,
        }
    }

    fn syntax_error(&self, at: &str, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            pos: self.position(at),
            message: message.into(),
        }
    }

    fn eof_error(&self, at: &str, message: impl Into<String>) -> ParseError {
        ParseError::UnexpectedEof {
            pos: self.position(at),
            message: message.into(),
        }
    }

    fn node(&self, start: &str, end: &str, state: ParsingState, kind: NodeKind) -> Node {
        Node::new(
            self.ids.allocate(),
            self.position(start),
            self.offset(end),
            state,
            kind,
        )
    }

    fn parse_nodes(
        &self,
        mut input: &'a str,
        stop: &Stop<'_>,
        state: ParsingState,
    ) -> Result<(NodeList, &'a str)> {
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            if input.is_empty() {
                return match stop {
                    Stop::Eof => Ok((nodes.into(), input)),
                    Stop::CloseBrace => Err(self.eof_error(input, "missing ‘}’").into()),
                    Stop::CloseBracket => Err(self.eof_error(input, "missing ‘]’").into()),
                    Stop::EndEnvironment(name) => Err(self
                        .eof_error(input, format!("missing ‘\\end{{{}}}’", name))
                        .into()),
                };
            }

            match stop {
                Stop::CloseBrace if input.starts_with('}') => {
                    return Ok((nodes.into(), &input[1..]))
                }
                Stop::CloseBracket if input.starts_with(']') => {
                    return Ok((nodes.into(), &input[1..]))
                }
                Stop::EndEnvironment(name) => {
                    if let Ok((rest, found)) = lexer::end_environment(input) {
                        if found == *name {
                            return Ok((nodes.into(), rest));
                        }
                        let message = format!(
                            "‘\\end{{{}}}’ does not match ‘\\begin{{{}}}’",
                            found, name
                        );
                        return Err(self.syntax_error(input, message).into());
                    }
                }
                _ => {}
            }

            if input.starts_with('}') {
                return Err(self.syntax_error(input, "unexpected ‘}’").into());
            }

            if let Ok((rest, _)) = lexer::blank_line(input) {
                nodes.push(self.node(
                    input,
                    rest,
                    state,
                    NodeKind::Specials(Invocation {
                        name: PARAGRAPH_BREAK.to_string(),
                        arguments: Vec::new(),
                        body: None,
                    }),
                ));
                input = rest;
                continue;
            }

            if let Ok((rest, text)) = lexer::comment(input) {
                nodes.push(self.node(input, rest, state, NodeKind::Comment(text.to_string())));
                input = rest;
                continue;
            }

            if input.starts_with('{') {
                let (inner, rest) = self.parse_nodes(&input[1..], &Stop::CloseBrace, state)?;
                nodes.push(self.node(
                    input,
                    rest,
                    state,
                    NodeKind::Group {
                        delimiters: ("{".to_string(), "}".to_string()),
                        nodes: inner,
                    },
                ));
                input = rest;
                continue;
            }

            if let Ok((body, (open, close))) = lexer::math_open(input) {
                let (rest, source) = lexer::math_body(body, close).map_err(|_| {
                    self.eof_error(input, format!("unterminated math, expected ‘{}’", close))
                })?;
                let rest = &rest[close.len()..];
                let display = if open == "$$" || open == "\\[" {
                    MathDisplay::Display
                } else {
                    MathDisplay::Inline
                };
                nodes.push(self.node(
                    input,
                    rest,
                    ParsingState {
                        in_math: true,
                        ..state
                    },
                    NodeKind::Math {
                        delimiters: (open.to_string(), close.to_string()),
                        display,
                        source: source.to_string(),
                    },
                ));
                input = rest;
                continue;
            }

            if let Ok((rest, name)) = lexer::begin_environment(input) {
                let (node, rest) = self.parse_environment(input, rest, name, state)?;
                nodes.push(node);
                input = rest;
                continue;
            }

            if lexer::end_environment(input).is_ok() {
                return Err(self.syntax_error(input, "unexpected ‘\\end’").into());
            }

            if let Ok((rest, name)) = lexer::macro_name(input) {
                let (node, rest) = self.parse_macro(input, rest, name, state)?;
                nodes.push(node);
                input = rest;
                continue;
            }

            if let Some(name) = self.specials.iter().find(|s| input.starts_with(**s)) {
                let rest = &input[name.len()..];
                let (node, rest) =
                    self.parse_invocation(input, rest, InvocationKind::Specials, name, state)?;
                nodes.push(node);
                input = rest;
                continue;
            }

            let rest = self.chars_end(input, stop);
            let text = &input[..input.len() - rest.len()];
            match nodes.last_mut() {
                Some(Node {
                    kind: NodeKind::Chars(prev),
                    pos_end,
                    ..
                }) => {
                    prev.push_str(text);
                    *pos_end = self.offset(rest);
                }
                _ => nodes.push(self.node(input, rest, state, NodeKind::Chars(text.to_string()))),
            }
            input = rest;
        }
    }

    /// Consume plain characters, always at least one.
    fn chars_end(&self, input: &'a str, stop: &Stop<'_>) -> &'a str {
        let mut iter = input.char_indices();
        // the first character is never the start of another token here
        iter.next();
        for (idx, c) in iter {
            let rest = &input[idx..];
            let starts_token = match c {
                '\\' | '{' | '}' | '$' | '%' => true,
                ']' => *stop == Stop::CloseBracket,
                '\n' => lexer::blank_line(rest).is_ok(),
                _ => self.specials.iter().any(|s| rest.starts_with(*s)),
            };
            if starts_token {
                return rest;
            }
        }
        &input[input.len()..]
    }

    fn parse_macro(
        &self,
        start: &'a str,
        rest: &'a str,
        name: &'a str,
        state: ParsingState,
    ) -> Result<(Node, &'a str)> {
        self.parse_invocation(start, rest, InvocationKind::Macro, name, state)
    }

    fn parse_environment(
        &self,
        start: &'a str,
        rest: &'a str,
        name: &'a str,
        state: ParsingState,
    ) -> Result<(Node, &'a str)> {
        self.parse_invocation(start, rest, InvocationKind::Environment, name, state)
    }

    fn lookup(&self, at: &str, kind: InvocationKind, name: &str) -> Result<&'a ConstructSpec> {
        self.specs.get(kind, name).ok_or_else(|| {
            let what = match kind {
                InvocationKind::Macro => format!("unknown macro ‘\\{}’", name),
                InvocationKind::Environment => format!("unknown environment ‘{}’", name),
                InvocationKind::Specials => format!("unknown specials ‘{}’", name),
            };
            self.syntax_error(at, what).into()
        })
    }

    fn parse_invocation(
        &self,
        start: &'a str,
        mut rest: &'a str,
        kind: InvocationKind,
        name: &str,
        state: ParsingState,
    ) -> Result<(Node, &'a str)> {
        let spec = self.lookup(start, kind, name)?;

        let arg_state = ParsingState {
            is_block_level: None,
            ..state
        };
        let mut arguments = Vec::with_capacity(spec.arguments.len());
        for arg in &spec.arguments {
            let (value, after) = self.parse_argument(rest, arg.kind, arg_state, spec)?;
            arguments.push(Argument {
                name: arg.name.clone(),
                value,
            });
            rest = after;
        }

        let body = if kind == InvocationKind::Environment {
            let body_state = ParsingState {
                is_block_level: Some(spec.is_block_level),
                ..state
            };
            let (body, after) = self.parse_nodes(rest, &Stop::EndEnvironment(name), body_state)?;
            rest = after;
            Some(body)
        } else {
            None
        };

        let node_state = ParsingState {
            is_block_level: if spec.is_block_level { Some(true) } else { state.is_block_level },
            ..state
        };
        let node_kind = {
            let inv = Invocation {
                name: name.to_string(),
                arguments,
                body,
            };
            match kind {
                InvocationKind::Macro => NodeKind::Macro(inv),
                InvocationKind::Environment => NodeKind::Environment(inv),
                InvocationKind::Specials => NodeKind::Specials(inv),
            }
        };
        let node = self.node(start, rest, node_state, node_kind);

        if let Some(handler) = spec.handler() {
            if let Some(derived) = handler.postprocess_parsed_node(&node)? {
                node.set_derived(derived);
            }
        }

        Ok((node, rest))
    }

    fn parse_argument(
        &self,
        input: &'a str,
        kind: ArgKind,
        state: ParsingState,
        spec: &ConstructSpec,
    ) -> Result<(Option<NodeList>, &'a str)> {
        let after_space = match lexer::argument_space(input) {
            Ok((rest, _)) => rest,
            Err(_) => input,
        };

        match kind {
            ArgKind::Star => match after_space.strip_prefix('*') {
                Some(rest) => Ok((Some(NodeList::default()), rest)),
                None => Ok((None, input)),
            },
            ArgKind::Optional => match after_space.strip_prefix('[') {
                Some(rest) => {
                    let (nodes, rest) = self.parse_nodes(rest, &Stop::CloseBracket, state)?;
                    Ok((Some(nodes), rest))
                }
                None => Ok((None, input)),
            },
            ArgKind::Mandatory => {
                if let Some(rest) = after_space.strip_prefix('{') {
                    let (nodes, rest) = self.parse_nodes(rest, &Stop::CloseBrace, state)?;
                    return Ok((Some(nodes), rest));
                }
                if after_space.is_empty() {
                    return Err(self
                        .eof_error(after_space, format!("missing argument to ‘{}’", spec.name))
                        .into());
                }
                if let Ok((rest, name)) = lexer::macro_name(after_space) {
                    let (node, rest) = self.parse_macro(after_space, rest, name, state)?;
                    return Ok((Some(NodeList::new(vec![node])), rest));
                }
                // single character token
                let c = after_space.chars().next().map(char::len_utf8).unwrap_or(1);
                let rest = &after_space[c..];
                let node = self.node(
                    after_space,
                    rest,
                    state,
                    NodeKind::Chars(after_space[..c].to_string()),
                );
                Ok((Some(NodeList::new(vec![node])), rest))
            }
        }
    }
}
