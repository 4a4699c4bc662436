//! Plain text backend.

use crate::ast::NodeList;
use crate::context::RenderContext;
use crate::error::{RenderError, Result};
use crate::feature::floats::FloatInstance;
use crate::feature::graphics::GraphicsResource;
use crate::render::{render_nodelist, FragmentRenderer, Label, Paragraph};

const PAGE_WIDTH: usize = 80;

/// Configuration for text rendering.
#[derive(Debug, Clone)]
pub struct TextOptions {
    /// Append `<url>` to the display text of external links.
    pub display_href_urls: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            display_href_urls: true,
        }
    }
}

/// Renders fragments to plain text. Delayed content needs two passes.
#[derive(Debug, Clone, Default)]
pub struct TextRenderer {
    options: TextOptions,
}

impl TextRenderer {
    pub fn new(options: TextOptions) -> Self {
        Self { options }
    }
}

/// Append `punct` unless the text already ends in punctuation.
fn add_punctuation(text: &str, punct: char) -> String {
    match text.trim_end().chars().last() {
        Some('.' | ',' | ':' | ';' | '?' | '!') => text.to_string(),
        _ => format!("{}{}", text, punct),
    }
}

fn underline(text: &str, c: char) -> String {
    format!("{}\n{}", text, c.to_string().repeat(text.chars().count()))
}

impl FragmentRenderer for TextRenderer {
    fn render_value(&self, value: &str) -> String {
        value.to_string()
    }

    fn render_join_blocks(&self, blocks: Vec<String>) -> String {
        blocks.join("\n")
    }

    fn render_join_as_paragraphs(&self, paragraphs: Vec<Paragraph>) -> String {
        paragraphs
            .into_iter()
            .map(|p| match p {
                Paragraph::Inline(content) => content.trim().to_string(),
                Paragraph::Block(content) => content,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn render_semantic_block(
        &self,
        content: String,
        _role: &str,
        _annotations: &[&str],
        _target_id: Option<&str>,
    ) -> String {
        content
    }

    fn render_nothing(&self, _annotations: &[&str]) -> String {
        String::new()
    }

    fn render_empty_error_placeholder(&self, _debug: &str) -> String {
        String::new()
    }

    fn render_verbatim(&self, value: &str, _annotations: &[&str]) -> String {
        value.to_string()
    }

    fn render_text_format(&self, _formats: &[&str], content: String) -> String {
        content
    }

    fn render_link(
        &self,
        _ref_type: &str,
        href: &str,
        display: &NodeList,
        ctx: &mut RenderContext<'_>,
        _annotations: &[&str],
    ) -> Result<String> {
        let content = render_nodelist(self, display, ctx, Some(false))?;
        if self.options.display_href_urls && !href.starts_with('#') {
            return Ok(format!("{} <{}>", content, href));
        }
        Ok(content)
    }

    fn render_enumeration(
        &self,
        items: &[NodeList],
        label: &dyn Fn(usize) -> Label,
        _target_ids: Option<&dyn Fn(usize) -> String>,
        ctx: &mut RenderContext<'_>,
        annotations: &[&str],
        nested_depth: usize,
    ) -> Result<String> {
        let mut rendered = Vec::with_capacity(items.len());
        for (j, item) in items.iter().enumerate() {
            let content = render_nodelist(self, item, ctx, Some(true))?;
            let tag = match label(j + 1) {
                Label::Text(text) => self.render_value(&text),
                Label::Nodes(nodes) => render_nodelist(self, &nodes, ctx, Some(false))?,
            };
            let tag = format!("{}{}", " ".repeat(4 * nested_depth), tag);
            rendered.push((tag, content));
        }

        let width = rendered
            .iter()
            .map(|(tag, _)| tag.chars().count())
            .max()
            .unwrap_or(0);
        let blocks = rendered
            .into_iter()
            .map(|(tag, content)| {
                let line = self.render_join(vec![
                    self.render_value(&format!("{:>w$} ", tag, w = width + 2)),
                    content,
                ]);
                self.render_semantic_block(line, "enumeration", annotations, None)
            })
            .collect();
        Ok(self.render_join_blocks(blocks))
    }

    fn render_heading(
        &self,
        content: &NodeList,
        ctx: &mut RenderContext<'_>,
        level: u8,
        _target_id: Option<&str>,
        _inline: bool,
        _annotations: &[&str],
    ) -> Result<String> {
        let text = render_nodelist(self, content, ctx, Some(false))?;
        match level {
            1 => Ok(underline(&text, '=')),
            2 => Ok(underline(&text, '-')),
            3 => Ok(underline(&text, '~')),
            4 => Ok(format!("{}  ", add_punctuation(&text, ':'))),
            5 => Ok(format!("    {}  ", add_punctuation(&text, ':'))),
            6 => Ok(format!("        {}  ", add_punctuation(&text, ':'))),
            _ => Err(RenderError::InvalidHeadingLevel(level).into()),
        }
    }

    fn render_float(&self, float: &FloatInstance, ctx: &mut RenderContext<'_>) -> Result<String> {
        let mut caption_parts = Vec::new();
        if let Some(formatted) = &float.formatted_counter {
            let number = render_nodelist(self, formatted, ctx, Some(false))?;
            caption_parts.push(format!("{} {}", float.caption_name, number));
        } else if float.caption.is_some() {
            caption_parts.push(float.caption_name.clone());
        }
        if let Some(caption) = &float.caption {
            caption_parts.push(": ".to_string());
            caption_parts.push(render_nodelist(self, caption, ctx, Some(false))?);
        }

        let mut blocks = vec![render_nodelist(self, &float.content, ctx, Some(true))?];
        if !caption_parts.is_empty() {
            blocks.push(self.render_join(caption_parts));
        }

        let separator = "─".repeat(PAGE_WIDTH);
        Ok(format!("{}\n{}\n{}", separator, self.render_join_blocks(blocks), separator))
    }

    fn render_graphics_block(&self, graphic: &GraphicsResource) -> String {
        format!("{:^w$}", format!("[{}]", graphic.src), w = PAGE_WIDTH)
    }

    fn render_delayed_dummy_placeholder(&self, _key: u64) -> String {
        "#DELAYED#".to_string()
    }
}
