//! Cross-references: `\label`, `\ref` and `\hyperref`.

use crate::ast::{Node, NodeList};
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext, ResourceInfo};
use crate::error::{ParseError, Position, Result};
use crate::render::FragmentRenderer;
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Display text of a reference.
#[derive(Debug, Clone)]
pub enum RefText {
    /// Source text, parsed when the reference is rendered
    Source(String),
    /// Ready-made content
    Nodes(NodeList),
}

impl RefText {
    fn to_nodes(&self, doc: &Document) -> Result<NodeList> {
        match self {
            RefText::Source(source) => doc.parse_inline(source),
            RefText::Nodes(nodes) => Ok(nodes.clone()),
        }
    }
}

/// A resolvable reference target.
#[derive(Debug, Clone)]
pub struct RefInstance {
    pub ref_type: Option<String>,
    pub target: String,
    pub text: RefText,
    pub href: String,
}

/// Resolves references that are not labelled in the document itself.
pub trait RefResolver {
    fn resolve(
        &self,
        ref_type: Option<&str>,
        target: &str,
        resource_info: &ResourceInfo,
    ) -> Option<RefInstance>;
}

/// What a `\label` currently attaches to.
#[derive(Debug, Clone)]
pub struct LabelTarget {
    pub href: String,
    pub text: RefText,
}

/// Split `type:target` into its optional type and the target.
pub fn split_ref_target(value: &str) -> (Option<String>, String) {
    match value.split_once(':') {
        Some((ref_type, target)) => (Some(ref_type.to_string()), target.to_string()),
        None => (None, value.to_string()),
    }
}

/// References feature.
#[derive(Default)]
pub struct RefsFeature {
    resolver: Option<Rc<dyn RefResolver>>,
}

impl RefsFeature {
    pub fn new(resolver: Option<Rc<dyn RefResolver>>) -> Self {
        Self { resolver }
    }

    pub fn set_resolver(&mut self, resolver: Rc<dyn RefResolver>) {
        if self.resolver.is_some() {
            warn!("Replacing the external reference resolver");
        }
        self.resolver = Some(resolver);
    }
}

impl Feature for RefsFeature {
    fn name(&self) -> &'static str {
        RefsDocumentManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        vec![
            ConstructSpec::macro_handler(
                "ref",
                vec![ArgSpec::mandatory("ref_target")],
                Rc::new(RefHandler),
            ),
            ConstructSpec::macro_handler(
                "hyperref",
                vec![ArgSpec::optional("ref_target"), ArgSpec::mandatory("display_text")],
                Rc::new(RefHandler),
            ),
            ConstructSpec::macro_handler(
                "label",
                vec![ArgSpec::mandatory("label")],
                Rc::new(LabelHandler),
            ),
        ]
    }

    fn setup_document(&self, managers: &mut Managers) -> Result<()> {
        managers.insert(RefsDocumentManager {
            resolver: self.resolver.clone(),
        });
        Ok(())
    }

    fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
        managers.insert(RefsRenderManager::default());
        Ok(())
    }
}

pub struct RefsDocumentManager {
    resolver: Option<Rc<dyn RefResolver>>,
}

impl FeatureManager for RefsDocumentManager {
    const NAME: &'static str = "refs";
}

/// References labelled during this pass.
#[derive(Debug, Default)]
pub struct RefsRenderManager {
    labels: HashMap<(Option<String>, String), RefInstance>,
    current_target: Option<LabelTarget>,
}

impl FeatureManager for RefsRenderManager {
    const NAME: &'static str = "refs";
}

impl RefsRenderManager {
    /// Register a reference target. The first registration of a
    /// `(type, target)` pair wins.
    pub fn register_reference(&mut self, instance: RefInstance) -> bool {
        let key = (instance.ref_type.clone(), instance.target.clone());
        if self.labels.contains_key(&key) {
            return false;
        }
        debug!(
            ref_type = ?instance.ref_type,
            target = %instance.target,
            href = %instance.href,
            "Registered reference"
        );
        self.labels.insert(key, instance);
        true
    }

    /// Set what subsequent `\label`s attach to, returning the previous
    /// target.
    pub fn replace_label_target(&mut self, target: Option<LabelTarget>) -> Option<LabelTarget> {
        std::mem::replace(&mut self.current_target, target)
    }

    pub fn label_target(&self) -> Option<&LabelTarget> {
        self.current_target.as_ref()
    }

    fn local(&self, ref_type: Option<&str>, target: &str) -> Option<&RefInstance> {
        self.labels
            .get(&(ref_type.map(str::to_string), target.to_string()))
    }
}

/// Look a reference up locally, then through the external resolver.
pub fn get_ref(
    ctx: &RenderContext<'_>,
    ref_type: Option<&str>,
    target: &str,
    pos: Position,
) -> Result<RefInstance> {
    if let Some(instance) = ctx.manager::<RefsRenderManager>()?.local(ref_type, target) {
        return Ok(instance.clone());
    }

    let doc = ctx.document();
    let resolver = doc.manager::<RefsDocumentManager>()?.resolver.as_ref();
    if let Some(instance) =
        resolver.and_then(|r| r.resolve(ref_type, target, doc.resource_info()))
    {
        return Ok(instance);
    }

    let target = match ref_type {
        Some(ref_type) => format!("{}:{}", ref_type, target),
        None => target.to_string(),
    };
    Err(ParseError::RefNotFound { pos, target }.into())
}

/// Set the label target of a numbered construct, if references are
/// installed. Returns the previous target for restoring.
pub fn set_label_target(ctx: &mut RenderContext<'_>, target: LabelTarget) -> Option<LabelTarget> {
    ctx.try_manager_mut::<RefsRenderManager>()
        .and_then(|mgr| mgr.replace_label_target(Some(target)))
}

/// Restore a label target saved by [`set_label_target`].
pub fn restore_label_target(ctx: &mut RenderContext<'_>, previous: Option<LabelTarget>) {
    if let Some(mgr) = ctx.try_manager_mut::<RefsRenderManager>() {
        mgr.replace_label_target(previous);
    }
}

/// `\ref{type:target}` and `\hyperref[type:target]{display}`.
///
/// Always delayed: the target may be labelled further down.
struct RefHandler;

impl Handler for RefHandler {
    fn delayed_render(&self) -> bool {
        true
    }

    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("reference without arguments"));
        };
        let value = inv.required_nodes("ref_target", node.pos)?.as_chars()?;
        let (ref_type, target) = split_ref_target(value.trim());

        let instance = get_ref(ctx, ref_type.as_deref(), &target, node.pos)?;
        let display = match inv.argument_nodes("display_text") {
            Some(display) => display.clone(),
            None => instance.text.to_nodes(ctx.document())?,
        };

        let annotation = match &ref_type {
            Some(ref_type) => format!("ref-{}", ref_type),
            None => "ref".to_string(),
        };
        renderer.render_link("ref", &instance.href, &display, ctx, &[annotation.as_str()])
    }
}

/// `\label{type:target}`, attaching to the current heading or float.
struct LabelHandler;

impl Handler for LabelHandler {
    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("label without arguments"));
        };
        let value = inv.required_nodes("label", node.pos)?.as_chars()?;
        let (ref_type, target) = split_ref_target(value.trim());

        let mgr = ctx.manager_mut::<RefsRenderManager>()?;
        let Some(label_target) = mgr.label_target().cloned() else {
            return Err(ParseError::malformed(
                node.pos,
                format!("‘\\label{{{}}}’ is not inside a heading or float", value.trim()),
            )
            .into());
        };
        mgr.register_reference(RefInstance {
            ref_type,
            target,
            text: label_target.text,
            href: label_target.href,
        });
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feature::headings::HeadingsFeature;
    use crate::render::{HtmlRenderer, TextRenderer};
    use pretty_assertions::assert_eq;

    struct FixedResolver;

    impl RefResolver for FixedResolver {
        fn resolve(
            &self,
            ref_type: Option<&str>,
            target: &str,
            _info: &ResourceInfo,
        ) -> Option<RefInstance> {
            (target == "intro" || target == "ext").then(|| RefInstance {
                ref_type: ref_type.map(str::to_string),
                target: target.to_string(),
                text: RefText::Source("External".to_string()),
                href: format!("https://example.org/{}", target),
            })
        }
    }

    fn document(resolver: Option<Rc<dyn RefResolver>>) -> Document {
        Document::new(vec![
            Box::new(HeadingsFeature::default()),
            Box::new(RefsFeature::new(resolver)),
        ])
        .unwrap()
    }

    #[test]
    fn test_forward_reference_with_markers() {
        let doc = document(None);
        let nodes = doc
            .parse("See \\ref{sec:later}.\n\n\\section{First}\n\\section{Later}\\label{sec:later}")
            .unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert!(html.starts_with(
            "<p>See <a href=\"#sec-2\" class=\"href-ref ref-sec\">2</a>.</p>"
        ));
        assert!(!html.contains("DLYD"));
    }

    #[test]
    fn test_forward_reference_in_two_passes() {
        let doc = document(None);
        let nodes = doc
            .parse("See \\ref{sec:later}.\n\n\\section{Later}\\label{sec:later}")
            .unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "See 1.\n\nLater\n=====");
    }

    #[test]
    fn test_local_label_wins_over_resolver() {
        let doc = document(Some(Rc::new(FixedResolver)));
        let nodes = doc
            .parse("\\section{Intro}\\label{intro} \\ref{intro} \\ref{ext}")
            .unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert!(html.contains("<a href=\"#sec-1\" class=\"href-ref ref\">1</a>"));
        assert!(html.contains(
            "<a href=\"https://example.org/ext\" class=\"href-ref ref\">External</a>"
        ));
    }

    #[test]
    fn test_hyperref_display_text() {
        let doc = document(None);
        let nodes = doc
            .parse("\\section{A}\\label{a} \\hyperref[a]{the \\emph{first} one}")
            .unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert!(html.contains(
            "<a href=\"#sec-1\" class=\"href-ref ref\">the <span class=\"emph\">first</span> one</a>"
        ));
    }

    #[test]
    fn test_missing_target_is_parse_error() {
        let doc = document(None);
        let nodes = doc.parse("x \\ref{nowhere}").unwrap();
        let err = doc.render(&nodes, &HtmlRenderer::default()).unwrap_err();
        match err {
            Error::Parse(ParseError::RefNotFound { pos, target }) => {
                assert_eq!(target, "nowhere");
                assert_eq!(pos.column, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_label_outside_target_is_error() {
        let doc = document(None);
        let nodes = doc.parse("\\label{x}").unwrap();
        let err = doc.render(&nodes, &HtmlRenderer::default()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MalformedConstruct { .. })));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut mgr = RefsRenderManager::default();
        let make = |href: &str| RefInstance {
            ref_type: None,
            target: "t".to_string(),
            text: RefText::Source("x".to_string()),
            href: href.to_string(),
        };
        assert!(mgr.register_reference(make("#one")));
        assert!(!mgr.register_reference(make("#two")));
        assert_eq!(mgr.local(None, "t").map(|r| r.href.as_str()), Some("#one"));
    }
}
