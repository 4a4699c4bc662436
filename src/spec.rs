//! Construct specifications: argument shapes and render handlers.
//!
//! Every macro, environment and specials sequence the parser understands is
//! described by a [`ConstructSpec`]. Specs are collected into a
//! [`SpecRegistry`] keyed by `(kind, name)`; rendering looks the handler up
//! there instead of inspecting node types at runtime.

use crate::ast::{Derived, InvocationKind, Node};
use crate::context::RenderContext;
use crate::error::{ConfigError, Result};
use crate::render::FragmentRenderer;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shape of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `[...]`, may be absent
    Optional,
    /// `{...}`, or a single token
    Mandatory,
    /// A literal `*`, may be absent
    Star,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
}

impl ArgSpec {
    pub fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Optional,
        }
    }

    pub fn mandatory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Mandatory,
        }
    }

    pub fn star(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ArgKind::Star,
        }
    }
}

/// Hooks a construct implements to take part in rendering.
pub trait Handler {
    /// Compute derived sub-structure once, right after parsing.
    fn postprocess_parsed_node(&self, _node: &Node) -> Result<Option<Derived>> {
        Ok(None)
    }

    /// Whether the output depends on whole-document state.
    fn delayed_render(&self) -> bool {
        false
    }

    /// Register deferred side effects during the first pass.
    fn prepare_delayed_render(
        &self,
        _node: &Node,
        _renderer: &dyn FragmentRenderer,
        _ctx: &mut RenderContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String>;
}

/// How a construct produces output.
#[derive(Clone)]
pub enum SpecRender {
    /// A fixed replacement string, escaped by the backend
    Replacement(String),
    Handler(Rc<dyn Handler>),
}

impl fmt::Debug for SpecRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecRender::Replacement(s) => f.debug_tuple("Replacement").field(s).finish(),
            SpecRender::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Description of one macro, environment or specials sequence.
#[derive(Debug, Clone)]
pub struct ConstructSpec {
    pub kind: InvocationKind,
    pub name: String,
    pub arguments: Vec<ArgSpec>,
    /// Whether the construct renders as a block rather than inline content
    pub is_block_level: bool,
    pub render: SpecRender,
}

impl ConstructSpec {
    pub fn macro_handler(name: &str, arguments: Vec<ArgSpec>, handler: Rc<dyn Handler>) -> Self {
        Self {
            kind: InvocationKind::Macro,
            name: name.to_string(),
            arguments,
            is_block_level: false,
            render: SpecRender::Handler(handler),
        }
    }

    pub fn environment(name: &str, arguments: Vec<ArgSpec>, handler: Rc<dyn Handler>) -> Self {
        Self {
            kind: InvocationKind::Environment,
            name: name.to_string(),
            arguments,
            is_block_level: true,
            render: SpecRender::Handler(handler),
        }
    }

    pub fn replacement(kind: InvocationKind, name: &str, value: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            arguments: Vec::new(),
            is_block_level: false,
            render: SpecRender::Replacement(value.to_string()),
        }
    }

    pub fn block_level(mut self, is_block_level: bool) -> Self {
        self.is_block_level = is_block_level;
        self
    }

    pub fn handler(&self) -> Option<&Rc<dyn Handler>> {
        match &self.render {
            SpecRender::Handler(h) => Some(h),
            SpecRender::Replacement(_) => None,
        }
    }
}

/// Registry of construct specs keyed by kind and name.
#[derive(Debug, Default)]
pub struct SpecRegistry {
    specs: HashMap<(InvocationKind, String), ConstructSpec>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard text-level constructs installed.
    pub fn with_standard_specs() -> Self {
        let mut registry = Self::new();
        for spec in standard_specs() {
            let registered = registry.register(spec);
            debug_assert!(registered.is_ok(), "duplicate standard construct: {:?}", registered);
        }
        registry
    }

    /// Add a spec; a second definition of the same construct is an error.
    pub fn register(&mut self, spec: ConstructSpec) -> std::result::Result<(), ConfigError> {
        let key = (spec.kind, spec.name.clone());
        if self.specs.contains_key(&key) {
            return Err(ConfigError::DuplicateConstruct(spec.name));
        }
        self.specs.insert(key, spec);
        Ok(())
    }

    pub fn get(&self, kind: InvocationKind, name: &str) -> Option<&ConstructSpec> {
        self.specs.get(&(kind, name.to_string()))
    }

    /// Specials names, longest first, for greedy matching.
    pub fn specials(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .specs
            .keys()
            .filter(|(kind, _)| *kind == InvocationKind::Specials)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        names
    }
}

/// Wraps its argument in one or more semantic text formats.
struct TextFormatHandler {
    formats: Vec<&'static str>,
}

impl Handler for TextFormatHandler {
    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("text format without arguments"));
        };
        let content = inv.required_nodes("text", node.pos)?;
        let rendered = crate::render::render_nodelist(renderer, content, ctx, Some(false))?;
        Ok(renderer.render_text_format(&self.formats, rendered))
    }
}

fn standard_specs() -> Vec<ConstructSpec> {
    use InvocationKind::{Macro, Specials};

    let mut specs = vec![
        ConstructSpec::replacement(Specials, "~", "\u{a0}"),
        ConstructSpec::replacement(Specials, "--", "\u{2013}"),
        ConstructSpec::replacement(Specials, "---", "\u{2014}"),
        ConstructSpec::replacement(Specials, "``", "\u{201c}"),
        ConstructSpec::replacement(Specials, "''", "\u{201d}"),
    ];
    for (name, value) in [
        ("%", "%"),
        ("&", "&"),
        ("#", "#"),
        ("$", "$"),
        ("_", "_"),
        ("{", "{"),
        ("}", "}"),
        (" ", " "),
        ("\\", "\n"),
        ("textbackslash", "\\"),
        ("LaTeX", "LaTeX"),
        ("TeX", "TeX"),
    ] {
        specs.push(ConstructSpec::replacement(Macro, name, value));
    }
    for (name, formats) in [
        ("emph", vec!["emph"]),
        ("textit", vec!["textit"]),
        ("textbf", vec!["textbf"]),
        ("texttt", vec!["texttt"]),
    ] {
        specs.push(ConstructSpec::macro_handler(
            name,
            vec![ArgSpec::mandatory("text")],
            Rc::new(TextFormatHandler { formats }),
        ));
    }
    specs
}
