//! Rendering core: node dispatch, paragraph assembly and the delayed-render
//! protocol.
//!
//! Output backends implement [`FragmentRenderer`]; the free functions in this
//! module walk the node tree and call into the backend for every primitive.

pub mod html;
pub mod text;

pub use self::html::{HtmlOptions, HtmlRenderer, LinkTargetBlank};
pub use self::text::{TextOptions, TextRenderer};

use crate::ast::{MathDisplay, Node, NodeKind, NodeList};
use crate::context::{Document, RenderContext, RenderPhase};
use crate::error::{ParseError, RenderError, Result};
use crate::feature::floats::FloatInstance;
use crate::feature::graphics::GraphicsResource;
use crate::spec::{Handler, SpecRender};
use std::collections::HashMap;
use tracing::trace;

/// One rendered paragraph-level piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paragraph {
    /// Inline content that forms a paragraph of its own
    Inline(String),
    /// A block-level construct, emitted as is
    Block(String),
}

/// Label of an enumeration item.
#[derive(Debug, Clone)]
pub enum Label {
    /// Plain text, escaped by the backend
    Text(String),
    /// Parsed content, e.g. a custom item tag
    Nodes(NodeList),
}

/// An output backend.
///
/// Primitives that receive a [`NodeList`] render it themselves with
/// [`render_nodelist`]; all others receive already rendered content.
pub trait FragmentRenderer {
    /// Whether blank lines split content into paragraphs by default.
    fn use_paragraphs(&self) -> bool {
        true
    }

    /// Whether inert markers can stand in for delayed content, allowing a
    /// single render pass.
    fn supports_delayed_markers(&self) -> bool {
        false
    }

    /// Emit literal text, escaped for the output format.
    fn render_value(&self, value: &str) -> String;

    fn render_join(&self, parts: Vec<String>) -> String {
        parts.concat()
    }

    fn render_join_blocks(&self, blocks: Vec<String>) -> String {
        blocks.concat()
    }

    fn render_join_as_paragraphs(&self, paragraphs: Vec<Paragraph>) -> String;

    /// Wrap content in a block that conveys document structure only.
    fn render_semantic_block(
        &self,
        content: String,
        role: &str,
        annotations: &[&str],
        target_id: Option<&str>,
    ) -> String;

    /// Explicit empty output, kept visible for diagnostics.
    fn render_nothing(&self, annotations: &[&str]) -> String;

    /// Inert placeholder for malformed but recoverable content.
    fn render_empty_error_placeholder(&self, debug: &str) -> String;

    fn render_verbatim(&self, value: &str, annotations: &[&str]) -> String;

    fn render_text_format(&self, formats: &[&str], content: String) -> String;

    /// Math is emitted verbatim, delimiters included.
    fn render_math_content(
        &self,
        delimiters: &(String, String),
        source: &str,
        display: MathDisplay,
    ) -> String {
        let annotation = format!("{}-math", display.as_str());
        self.render_verbatim(
            &format!("{}{}{}", delimiters.0, source, delimiters.1),
            &[annotation.as_str()],
        )
    }

    /// A link to `href`, which is either an external URL or `#anchor`.
    fn render_link(
        &self,
        ref_type: &str,
        href: &str,
        display: &NodeList,
        ctx: &mut RenderContext<'_>,
        annotations: &[&str],
    ) -> Result<String>;

    /// An enumeration; `label` and `target_ids` take the 1-based item index.
    fn render_enumeration(
        &self,
        items: &[NodeList],
        label: &dyn Fn(usize) -> Label,
        target_ids: Option<&dyn Fn(usize) -> String>,
        ctx: &mut RenderContext<'_>,
        annotations: &[&str],
        nested_depth: usize,
    ) -> Result<String>;

    /// A heading of level 1 to 6.
    fn render_heading(
        &self,
        content: &NodeList,
        ctx: &mut RenderContext<'_>,
        level: u8,
        target_id: Option<&str>,
        inline: bool,
        annotations: &[&str],
    ) -> Result<String>;

    fn render_float(&self, float: &FloatInstance, ctx: &mut RenderContext<'_>) -> Result<String>;

    fn render_graphics_block(&self, graphic: &GraphicsResource) -> String;

    fn render_delayed_marker(&self, _key: u64) -> String {
        String::new()
    }

    /// Stand-in for delayed content during the first of two passes.
    fn render_delayed_dummy_placeholder(&self, key: u64) -> String;

    /// Replace the markers in `content` with their resolved values.
    fn replace_delayed_markers(&self, content: &str, _values: &HashMap<u64, String>) -> String {
        content.to_string()
    }
}

/// Render a node list.
///
/// `use_paragraphs` overrides the renderer's default. Without paragraphs a
/// blank line in the list is an error.
pub fn render_nodelist(
    renderer: &dyn FragmentRenderer,
    nodes: &NodeList,
    ctx: &mut RenderContext<'_>,
    use_paragraphs: Option<bool>,
) -> Result<String> {
    let use_paragraphs = use_paragraphs.unwrap_or_else(|| renderer.use_paragraphs());

    if !use_paragraphs {
        let mut parts = Vec::with_capacity(nodes.len());
        for node in nodes {
            parts.push(render_node(renderer, node, ctx)?);
        }
        return Ok(renderer.render_join(parts));
    }

    let doc = ctx.document();
    let mut paragraphs = Vec::new();

    for segment in nodes.split_at(Node::is_paragraph_break, false) {
        if segment.is_whitespace() {
            continue;
        }

        let mut inline = Vec::new();
        for node in &segment {
            if is_block_node(node, doc) {
                push_inline(renderer, &mut paragraphs, std::mem::take(&mut inline));
                paragraphs.push(Paragraph::Block(render_node(renderer, node, ctx)?));
            } else {
                inline.push(render_node(renderer, node, ctx)?);
            }
        }
        push_inline(renderer, &mut paragraphs, inline);
    }

    Ok(renderer.render_join_as_paragraphs(paragraphs))
}

/// Close an inline run; runs rendering to whitespace only are dropped.
fn push_inline(
    renderer: &dyn FragmentRenderer,
    paragraphs: &mut Vec<Paragraph>,
    parts: Vec<String>,
) {
    let content = renderer.render_join(parts);
    if !content.trim().is_empty() {
        paragraphs.push(Paragraph::Inline(content));
    }
}

fn is_block_node(node: &Node, doc: &Document) -> bool {
    node.invocation()
        .and_then(|(kind, inv)| doc.specs().get(kind, &inv.name))
        .map(|spec| spec.is_block_level)
        .unwrap_or(false)
}

/// Render a single node by its type.
pub fn render_node(
    renderer: &dyn FragmentRenderer,
    node: &Node,
    ctx: &mut RenderContext<'_>,
) -> Result<String> {
    trace!(node = node.id.0, line = node.pos.line, "Rendering node");
    match &node.kind {
        NodeKind::Chars(text) => Ok(renderer.render_value(text)),
        NodeKind::Comment(_) => Ok(String::new()),
        NodeKind::Group { nodes, .. } => render_nodelist(renderer, nodes, ctx, Some(false)),
        NodeKind::Macro(_) | NodeKind::Environment(_) | NodeKind::Specials(_) => {
            if node.is_paragraph_break() {
                return Err(ParseError::ParagraphBreakNotAllowed { pos: node.pos }.into());
            }
            render_invocable(renderer, node, ctx)
        }
        NodeKind::Math {
            delimiters,
            display,
            source,
        } => Ok(renderer.render_math_content(delimiters, source, *display)),
    }
}

fn unknown_construct(node: &Node) -> crate::Error {
    ParseError::Syntax {
        pos: node.pos,
        message: "construct is not defined in this document".to_string(),
    }
    .into()
}

fn handler_for<'d>(node: &Node, doc: &'d Document) -> Result<&'d dyn Handler> {
    let (kind, inv) = node.invocation().ok_or_else(|| unknown_construct(node))?;
    let spec = doc.specs().get(kind, &inv.name).ok_or_else(|| unknown_construct(node))?;
    spec.handler()
        .map(|h| h.as_ref())
        .ok_or_else(|| unknown_construct(node))
}

/// Render a macro, environment or specials node through its construct spec.
pub fn render_invocable(
    renderer: &dyn FragmentRenderer,
    node: &Node,
    ctx: &mut RenderContext<'_>,
) -> Result<String> {
    let doc = ctx.document();
    let (kind, inv) = node.invocation().ok_or_else(|| unknown_construct(node))?;
    let spec = doc.specs().get(kind, &inv.name).ok_or_else(|| unknown_construct(node))?;

    let handler = match &spec.render {
        SpecRender::Replacement(value) => return Ok(renderer.render_value(value)),
        SpecRender::Handler(handler) => handler.as_ref(),
    };

    if !handler.delayed_render() {
        return handler.render(node, renderer, ctx);
    }

    match ctx.phase() {
        RenderPhase::FirstPass => {
            let key = match ctx.delayed.key_for(node.id) {
                Some(key) => key,
                None => {
                    handler.prepare_delayed_render(node, renderer, ctx)?;
                    ctx.delayed.register(node)
                }
            };
            if renderer.supports_delayed_markers() {
                Ok(renderer.render_delayed_marker(key))
            } else {
                Ok(renderer.render_delayed_dummy_placeholder(key))
            }
        }
        RenderPhase::SecondPass => ctx
            .delayed
            .resolved(node.id)
            .cloned()
            .ok_or_else(|| RenderError::MissingDelayedContent(node.id.0).into()),
        RenderPhase::Resolving => {
            handler.prepare_delayed_render(node, renderer, ctx)?;
            handler.render(node, renderer, ctx)
        }
    }
}

/// Compute the final content of every delayed node registered so far.
///
/// Returns the values by delayed key and records them by node id for a
/// second pass.
pub(crate) fn resolve_delayed(
    renderer: &dyn FragmentRenderer,
    ctx: &mut RenderContext<'_>,
) -> Result<HashMap<u64, String>> {
    let previous = ctx.phase;
    ctx.phase = RenderPhase::Resolving;

    let pending = ctx.delayed.take_pending();
    let mut values = HashMap::with_capacity(pending.len());
    for (key, node) in pending {
        let handler = handler_for(&node, ctx.document())?;
        let content = handler.render(&node, renderer, ctx)?;
        trace!(key, node = node.id.0, "Resolved delayed content");
        ctx.delayed.set_resolved(node.id, content.clone());
        values.insert(key, content);
    }

    ctx.phase = previous;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn render_html(source: &str) -> Result<String> {
        let doc = Document::new(Vec::new())?;
        let nodes = doc.parse(source)?;
        doc.render(&nodes, &HtmlRenderer::default())
    }

    #[test]
    fn test_paragraphs_are_wrapped() {
        let html = render_html("One \\emph{two}.\n\nThree & four").unwrap();
        assert_eq!(
            html,
            "<p>One <span class=\"emph\">two</span>.</p>\n<p>Three &amp; four</p>"
        );
    }

    #[test]
    fn test_leading_whitespace_paragraph_is_dropped() {
        let html = render_html("\n\n   \n\nText").unwrap();
        assert_eq!(html, "<p>Text</p>");
    }

    #[test]
    fn test_paragraph_break_without_paragraphs_is_error() {
        let doc = Document::new(Vec::new()).unwrap();
        let nodes = doc.parse("a\n\nb").unwrap();
        let err = doc
            .render_with(&HtmlRenderer::default(), |r, ctx| {
                render_nodelist(r, &nodes, ctx, Some(false))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError::ParagraphBreakNotAllowed { .. })
        ));
    }

    #[test]
    fn test_replacement_and_math() {
        let html = render_html("a~b $x<y$").unwrap();
        assert_eq!(
            html,
            "<p>a\u{a0}b <span class=\"inline-math\">$x&lt;y$</span></p>"
        );
    }

    #[test]
    fn test_line_break_macro() {
        assert_eq!(render_html("a\\\\b").unwrap(), "<p>a\nb</p>");
    }

    #[test]
    fn test_text_paragraphs() {
        let doc = Document::new(Vec::new()).unwrap();
        let nodes = doc.parse("First\nline.\n\nSecond --- last.").unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "First\nline.\n\nSecond \u{2014} last.");
    }
}
