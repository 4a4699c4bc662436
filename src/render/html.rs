//! HTML backend.

use crate::ast::NodeList;
use crate::context::RenderContext;
use crate::error::{RenderError, Result};
use crate::feature::floats::FloatInstance;
use crate::feature::graphics::{GraphicsKind, GraphicsResource};
use crate::render::{render_nodelist, FragmentRenderer, Label, Paragraph};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static DELAYED_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<FRAG:DLYD:(\d+)\s*/>").unwrap());

/// When links get `target="_blank"`.
#[derive(Debug, Clone, Copy, Default)]
pub enum LinkTargetBlank {
    #[default]
    Never,
    /// External links only; `#anchor` links never open a new tab
    External,
    /// Decided per URL
    Custom(fn(&str) -> bool),
}

/// Configuration for HTML rendering.
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    pub link_target_blank: LinkTargetBlank,
    /// Inserted between blocks.
    pub blocks_joiner: String,
    /// Whether a run-in heading is followed by a space.
    pub inline_heading_add_space: bool,
    pub graphics_raster_magnification: f64,
    pub graphics_vector_magnification: f64,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            link_target_blank: LinkTargetBlank::Never,
            blocks_joiner: "\n".to_string(),
            inline_heading_add_space: true,
            graphics_raster_magnification: 1.0,
            graphics_vector_magnification: 1.0,
        }
    }
}

/// Renders fragments to HTML, using markers for delayed content.
#[derive(Debug, Clone, Default)]
pub struct HtmlRenderer {
    options: HtmlOptions,
}

impl HtmlRenderer {
    pub fn new(options: HtmlOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HtmlOptions {
        &self.options
    }

    fn link_target_blank(&self, href: &str) -> bool {
        match self.options.link_target_blank {
            LinkTargetBlank::Never => false,
            LinkTargetBlank::External => !href.starts_with('#'),
            LinkTargetBlank::Custom(decide) => decide(href),
        }
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Opening tag; attributes keep their order and `class` comes last.
fn open_tag(name: &str, attrs: &[(&str, &str)], classes: &[&str]) -> String {
    let mut s = format!("<{}", name);
    for (attr, value) in attrs {
        s.push_str(&format!(" {}=\"{}\"", attr, escape_html(value)));
    }
    if !classes.is_empty() {
        s.push_str(&format!(" class=\"{}\"", escape_html(&classes.join(" "))));
    }
    s.push('>');
    s
}

fn wrap_in_tag(name: &str, content: &str, attrs: &[(&str, &str)], classes: &[&str]) -> String {
    format!("{}{}</{}>", open_tag(name, attrs, classes), content, name)
}

fn id_attr(target_id: Option<&str>) -> Vec<(&str, &str)> {
    target_id.map(|id| vec![("id", id)]).unwrap_or_default()
}

/// HTML comments may not contain `--`.
fn comment_safe(s: &str) -> String {
    s.replace("--", "- - ")
}

fn heading_tag(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("h1"),
        2 => Some("h2"),
        3 => Some("h3"),
        // run-in headings may sit inside <p>, which cannot hold <h4>
        4..=6 => Some("span"),
        _ => None,
    }
}

impl FragmentRenderer for HtmlRenderer {
    fn supports_delayed_markers(&self) -> bool {
        true
    }

    fn render_value(&self, value: &str) -> String {
        escape_html(value)
    }

    fn render_join_blocks(&self, blocks: Vec<String>) -> String {
        blocks.join(&self.options.blocks_joiner)
    }

    fn render_join_as_paragraphs(&self, paragraphs: Vec<Paragraph>) -> String {
        let blocks = paragraphs
            .into_iter()
            .map(|p| match p {
                Paragraph::Inline(content) => format!("<p>{}</p>", content.trim()),
                Paragraph::Block(content) => content,
            })
            .collect();
        self.render_join_blocks(blocks)
    }

    fn render_semantic_block(
        &self,
        content: String,
        role: &str,
        annotations: &[&str],
        target_id: Option<&str>,
    ) -> String {
        let attrs = id_attr(target_id);
        if matches!(role, "section" | "main" | "article") {
            return wrap_in_tag(role, &content, &attrs, annotations);
        }
        let mut classes = vec![role];
        classes.extend_from_slice(annotations);
        wrap_in_tag("div", &content, &attrs, &classes)
    }

    fn render_nothing(&self, annotations: &[&str]) -> String {
        format!("<!-- {} -->", comment_safe(&annotations.join(" ")))
    }

    fn render_empty_error_placeholder(&self, debug: &str) -> String {
        format!(
            "<span class=\"empty-error-placeholder\"><!-- {} -->(?)</span>",
            comment_safe(debug)
        )
    }

    fn render_verbatim(&self, value: &str, annotations: &[&str]) -> String {
        let classes: &[&str] = if annotations.is_empty() { &["verbatim"] } else { annotations };
        wrap_in_tag("span", &escape_html(value), &[], classes)
    }

    fn render_text_format(&self, formats: &[&str], content: String) -> String {
        wrap_in_tag("span", &content, &[], formats)
    }

    fn render_link(
        &self,
        ref_type: &str,
        href: &str,
        display: &NodeList,
        ctx: &mut RenderContext<'_>,
        annotations: &[&str],
    ) -> Result<String> {
        let content = render_nodelist(self, display, ctx, Some(false))?;
        let mut attrs = vec![("href", href)];
        if self.link_target_blank(href) {
            attrs.push(("target", "_blank"));
        }
        let href_class = format!("href-{}", ref_type);
        let mut classes = vec![href_class.as_str()];
        classes.extend_from_slice(annotations);
        Ok(wrap_in_tag("a", &content, &attrs, &classes))
    }

    fn render_enumeration(
        &self,
        items: &[NodeList],
        label: &dyn Fn(usize) -> Label,
        target_ids: Option<&dyn Fn(usize) -> String>,
        ctx: &mut RenderContext<'_>,
        annotations: &[&str],
        _nested_depth: usize,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            let n = j + 1;
            // explicitly inline content is not split into paragraphs
            let use_paragraphs = item
                .first()
                .map_or(true, |node| node.state.is_block_level != Some(false));
            let content = render_nodelist(self, item, ctx, Some(use_paragraphs))?;

            let tag = match label(n) {
                Label::Text(text) => self.render_value(&text),
                Label::Nodes(nodes) => render_nodelist(self, &nodes, ctx, Some(false))?,
            };
            let target_id = target_ids.map(|f| f(n));
            parts.push(wrap_in_tag("dt", &tag, &id_attr(target_id.as_deref()), &[]));
            parts.push(wrap_in_tag("dd", &content, &[], &[]));
        }

        let mut classes = vec!["enumeration"];
        classes.extend_from_slice(annotations);
        Ok(wrap_in_tag("dl", &self.render_join(parts), &[], &classes))
    }

    fn render_heading(
        &self,
        content: &NodeList,
        ctx: &mut RenderContext<'_>,
        level: u8,
        target_id: Option<&str>,
        inline: bool,
        annotations: &[&str],
    ) -> Result<String> {
        let tag = heading_tag(level).ok_or(RenderError::InvalidHeadingLevel(level))?;

        let level_class = format!("heading-level-{}", level);
        let mut classes: Vec<&str> = annotations.to_vec();
        classes.push(&level_class);
        if inline {
            classes.push("heading-inline");
        }

        let rendered = render_nodelist(self, content, ctx, Some(false))?;
        let mut html = wrap_in_tag(tag, &rendered, &id_attr(target_id), &classes);
        if inline && self.options.inline_heading_add_space {
            html.push(' ');
        }
        Ok(html)
    }

    fn render_float(&self, float: &FloatInstance, ctx: &mut RenderContext<'_>) -> Result<String> {
        let mut caption_parts = Vec::new();
        if let Some(formatted) = &float.formatted_counter {
            let number = render_nodelist(self, formatted, ctx, Some(false))?;
            let label = self.render_join(vec![
                self.render_value(&float.caption_name),
                "&nbsp;".to_string(),
                number,
            ]);
            caption_parts.push(wrap_in_tag("span", &label, &[], &["float-number"]));
        } else if float.caption.is_some() {
            caption_parts.push(wrap_in_tag(
                "span",
                &self.render_value(&float.caption_name),
                &[],
                &["float-no-number"],
            ));
        }
        if let Some(caption) = &float.caption {
            caption_parts.push(": ".to_string());
            caption_parts.push(render_nodelist(self, caption, ctx, Some(false))?);
        }

        let contents = render_nodelist(self, &float.content, ctx, Some(true))?;
        let mut blocks = vec![self.render_semantic_block(contents, "float-contents", &[], None)];
        if !caption_parts.is_empty() {
            let caption = wrap_in_tag("span", &self.render_join(caption_parts), &[], &[]);
            blocks.push(wrap_in_tag("figcaption", &caption, &[], &["float-caption-content"]));
        }

        let type_class = format!("float-{}", float.float_type);
        Ok(wrap_in_tag(
            "figure",
            &self.render_join_blocks(blocks),
            &id_attr(float.target_id.as_deref()),
            &["float", type_class.as_str()],
        ))
    }

    fn render_graphics_block(&self, graphic: &GraphicsResource) -> String {
        let mut style = Vec::new();
        if let Some((width, height)) = graphic.physical_dimensions {
            let magnification = match graphic.kind {
                Some(GraphicsKind::Raster) => self.options.graphics_raster_magnification,
                Some(GraphicsKind::Vector) => self.options.graphics_vector_magnification,
                None => 1.0,
            };
            if let Some(width) = width {
                style.push(format!("width:{:.6}pt", width * magnification));
            }
            if let Some(height) = height {
                style.push(format!("height:{:.6}pt", height * magnification));
            }
        }

        let style = style.join(";");
        let mut attrs = Vec::new();
        if !style.is_empty() {
            attrs.push(("style", style.as_str()));
        }
        attrs.push(("src", graphic.src.as_str()));
        open_tag("img", &attrs, &[])
    }

    fn render_delayed_marker(&self, key: u64) -> String {
        format!("<FRAG:DLYD:{}/>", key)
    }

    fn render_delayed_dummy_placeholder(&self, key: u64) -> String {
        format!("<!-- delayed:{} -->", key)
    }

    fn replace_delayed_markers(&self, content: &str, values: &HashMap<u64, String>) -> String {
        DELAYED_MARKER
            .replace_all(content, |caps: &Captures| {
                caps[1]
                    .parse::<u64>()
                    .ok()
                    .and_then(|key| values.get(&key))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Document;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">&</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_open_tag_puts_class_last() {
        assert_eq!(
            open_tag("a", &[("href", "#x"), ("target", "_blank")], &["href-ref", "ref"]),
            "<a href=\"#x\" target=\"_blank\" class=\"href-ref ref\">"
        );
    }

    #[test]
    fn test_marker_substitution() {
        let renderer = HtmlRenderer::default();
        let content = format!("a{}b{}c", renderer.render_delayed_marker(1), "<FRAG:DLYD:2 />");
        let values = HashMap::from([(1, "X".to_string()), (2, "Y".to_string())]);
        assert_eq!(renderer.replace_delayed_markers(&content, &values), "aXbYc");
    }

    #[test]
    fn test_semantic_blocks() {
        let renderer = HtmlRenderer::default();
        assert_eq!(
            renderer.render_semantic_block("x".into(), "section", &["intro"], Some("s1")),
            "<section id=\"s1\" class=\"intro\">x</section>"
        );
        assert_eq!(
            renderer.render_semantic_block("x".into(), "endnotes", &[], None),
            "<div class=\"endnotes\">x</div>"
        );
    }

    #[test]
    fn test_placeholders_are_comment_safe() {
        let renderer = HtmlRenderer::default();
        assert_eq!(renderer.render_nothing(&["a--b"]), "<!-- a- - b -->");
        assert_eq!(
            renderer.render_empty_error_placeholder("bad"),
            "<span class=\"empty-error-placeholder\"><!-- bad -->(?)</span>"
        );
    }

    #[test]
    fn test_external_links_open_in_new_tab() {
        let doc = Document::new(Vec::new()).unwrap();
        let display = doc.parse_inline("site").unwrap();
        let renderer = HtmlRenderer::new(HtmlOptions {
            link_target_blank: LinkTargetBlank::External,
            ..HtmlOptions::default()
        });
        let html = doc
            .render_with(&renderer, |r, ctx| {
                let external = r.render_link("url", "https://x.org/?a&b", &display, ctx, &[])?;
                let local = r.render_link("ref", "#sec-1", &display, ctx, &[])?;
                Ok(format!("{} {}", external, local))
            })
            .unwrap();
        assert_eq!(
            html,
            "<a href=\"https://x.org/?a&amp;b\" target=\"_blank\" class=\"href-url\">site</a> \
             <a href=\"#sec-1\" class=\"href-ref\">site</a>"
        );
    }

    #[test]
    fn test_bad_heading_level() {
        let doc = Document::new(Vec::new()).unwrap();
        let content = doc.parse_inline("x").unwrap();
        let err = doc
            .render_with(&HtmlRenderer::default(), |r, ctx| {
                r.render_heading(&content, ctx, 0, None, false, &[])
            })
            .unwrap_err();
        assert!(matches!(err, crate::Error::Render(RenderError::InvalidHeadingLevel(0))));
    }
}
