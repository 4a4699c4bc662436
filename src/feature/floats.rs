//! Floats: `figure` and `table` environments with an optional `\caption`.

use crate::ast::{Derived, FloatParts, Node, NodeList};
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext};
use crate::counter::CounterFormatter;
use crate::error::{ParseError, Result};
use crate::feature::refs::{restore_label_target, set_label_target, LabelTarget, RefText};
use crate::render::FragmentRenderer;
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::collections::HashMap;
use std::rc::Rc;

/// A kind of float, e.g. figures.
#[derive(Debug, Clone)]
pub struct FloatType {
    /// Environment name, also used in target ids
    pub name: String,
    /// Name shown before the number, e.g. "Figure"
    pub caption_name: String,
    pub counter: CounterFormatter,
}

impl FloatType {
    pub fn new(name: &str, caption_name: &str, counter: CounterFormatter) -> Self {
        Self {
            name: name.to_string(),
            caption_name: caption_name.to_string(),
            counter,
        }
    }
}

/// A float as handed to the renderer.
#[derive(Debug, Clone)]
pub struct FloatInstance {
    pub float_type: String,
    pub caption_name: String,
    /// Set for numbered floats only
    pub number: Option<usize>,
    pub formatted_counter: Option<NodeList>,
    pub target_id: Option<String>,
    pub caption: Option<NodeList>,
    pub content: NodeList,
}

/// Floats feature.
#[derive(Debug, Clone)]
pub struct FloatsFeature {
    types: Vec<FloatType>,
}

impl FloatsFeature {
    pub fn new(types: Vec<FloatType>) -> Self {
        Self { types }
    }
}

impl Default for FloatsFeature {
    fn default() -> Self {
        Self::new(vec![
            FloatType::new("figure", "Figure", CounterFormatter::from_name_or_template("arabic")),
            FloatType::new("table", "Table", CounterFormatter::from_name_or_template("arabic")),
        ])
    }
}

impl Feature for FloatsFeature {
    fn name(&self) -> &'static str {
        FloatsRenderManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        let mut specs: Vec<ConstructSpec> = self
            .types
            .iter()
            .map(|float_type| {
                ConstructSpec::environment(
                    &float_type.name,
                    Vec::new(),
                    Rc::new(FloatHandler {
                        float_type: float_type.clone(),
                    }),
                )
            })
            .collect();
        specs.push(ConstructSpec::macro_handler(
            "caption",
            vec![ArgSpec::mandatory("text")],
            Rc::new(CaptionHandler),
        ));
        specs
    }

    fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
        managers.insert(FloatsRenderManager::default());
        Ok(())
    }
}

/// Per-type float counters.
#[derive(Debug, Default)]
pub struct FloatsRenderManager {
    counters: HashMap<String, usize>,
}

impl FeatureManager for FloatsRenderManager {
    const NAME: &'static str = "floats";
}

impl FloatsRenderManager {
    pub fn step(&mut self, float_type: &str) -> usize {
        let counter = self.counters.entry(float_type.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Split a float body into its caption and the remaining content.
pub fn split_float(body: &NodeList) -> Result<FloatParts> {
    let mut caption = None;
    let mut content = Vec::with_capacity(body.len());
    let mut has_label = false;

    for node in body {
        if node.is_macro("caption") {
            if caption.is_some() {
                let message = "a float may only have one ‘\\caption’";
                return Err(ParseError::malformed(node.pos, message).into());
            }
            let Some((_, inv)) = node.invocation() else {
                continue;
            };
            let text = inv.required_nodes("text", node.pos)?;
            has_label |= text.iter().any(|n| n.is_macro("label"));
            caption = Some(text.clone());
            continue;
        }
        has_label |= node.is_macro("label");
        content.push(node.clone());
    }

    Ok(FloatParts {
        caption,
        content: NodeList::new(content),
        has_label,
    })
}

struct FloatHandler {
    float_type: FloatType,
}

impl Handler for FloatHandler {
    fn postprocess_parsed_node(&self, node: &Node) -> Result<Option<Derived>> {
        match node.invocation().and_then(|(_, inv)| inv.body.as_ref()) {
            Some(body) => Ok(Some(Derived::Float(split_float(body)?))),
            None => Ok(None),
        }
    }

    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("float without body"));
        };
        let Derived::Float(parts) = node.derived_or_try_init(|| {
            let body = inv.body.clone().unwrap_or_default();
            Ok(Derived::Float(split_float(&body)?))
        })?
        else {
            return Ok(renderer.render_empty_error_placeholder("float parts"));
        };

        let name = &self.float_type.name;
        let mut instance = FloatInstance {
            float_type: name.clone(),
            caption_name: self.float_type.caption_name.clone(),
            number: None,
            formatted_counter: None,
            target_id: None,
            caption: parts.caption.clone(),
            content: parts.content.clone(),
        };

        if parts.caption.is_none() && !parts.has_label {
            return renderer.render_float(&instance, ctx);
        }

        let number = ctx.manager_mut::<FloatsRenderManager>()?.step(name);
        let formatted = self.float_type.counter.format(number);
        let target_id = format!("{}-{}", name, number);
        instance.number = Some(number);
        instance.formatted_counter = Some(ctx.document().parse_inline(&formatted)?);
        instance.target_id = Some(target_id.clone());

        let previous = set_label_target(
            ctx,
            LabelTarget {
                href: format!("#{}", target_id),
                text: RefText::Source(formatted),
            },
        );
        let rendered = renderer.render_float(&instance, ctx)?;
        restore_label_target(ctx, previous);
        Ok(rendered)
    }
}

/// `\caption` outside a float body.
struct CaptionHandler;

impl Handler for CaptionHandler {
    fn render(
        &self,
        node: &Node,
        _renderer: &dyn FragmentRenderer,
        _ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        Err(ParseError::malformed(node.pos, "‘\\caption’ outside of a float").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feature::{GraphicsFeature, RefsFeature};
    use crate::render::{HtmlRenderer, TextRenderer};
    use pretty_assertions::assert_eq;

    fn document() -> Document {
        Document::new(vec![
            Box::new(RefsFeature::default()),
            Box::new(FloatsFeature::default()),
            Box::new(GraphicsFeature::default()),
        ])
        .unwrap()
    }

    fn separator() -> String {
        "─".repeat(80)
    }

    #[test]
    fn test_labelled_figure_html() {
        let doc = document();
        let nodes = doc
            .parse(
                "\\begin{figure}\\includegraphics{a.png}\\caption{A cat.}\\label{figure:cat}\\end{figure}\n\
                 See \\ref{figure:cat}.",
            )
            .unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert_eq!(
            html,
            "<figure id=\"figure-1\" class=\"float float-figure\">\
             <div class=\"float-contents\"><img src=\"a.png\"></div>\n\
             <figcaption class=\"float-caption-content\"><span>\
             <span class=\"float-number\">Figure&nbsp;1</span>: A cat.</span></figcaption>\
             </figure>\n\
             <p>See <a href=\"#figure-1\" class=\"href-ref ref-figure\">1</a>.</p>"
        );
    }

    #[test]
    fn test_types_are_counted_separately() {
        let doc = document();
        let nodes = doc
            .parse(
                "\\begin{figure}A\\caption{One}\\end{figure}\n\
                 \\begin{table}B\\caption{Two}\\end{table}\n\
                 \\begin{figure}C\\caption{Three}\\end{figure}",
            )
            .unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        let sep = separator();
        assert_eq!(
            text,
            format!(
                "{sep}\nA\nFigure 1: One\n{sep}\n\n\
                 {sep}\nB\nTable 1: Two\n{sep}\n\n\
                 {sep}\nC\nFigure 2: Three\n{sep}"
            )
        );
    }

    #[test]
    fn test_plain_float_is_unnumbered() {
        let doc = document();
        let nodes = doc
            .parse("\\begin{figure}Plain content\\end{figure}")
            .unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        let sep = separator();
        assert_eq!(text, format!("{sep}\nPlain content\n{sep}"));
    }

    #[test]
    fn test_two_captions_are_malformed() {
        let doc = document();
        let err = doc
            .parse("\\begin{figure}\\caption{a}\\caption{b}\\end{figure}")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedConstruct { .. })));
    }

    #[test]
    fn test_caption_outside_float() {
        let doc = document();
        let nodes = doc.parse("\\caption{x}").unwrap();
        let err = doc.render(&nodes, &TextRenderer::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedConstruct { .. })));
    }

    #[test]
    fn test_counters_step_per_type() {
        let mut mgr = FloatsRenderManager::default();
        assert_eq!(mgr.step("figure"), 1);
        assert_eq!(mgr.step("table"), 1);
        assert_eq!(mgr.step("figure"), 2);
    }
}
