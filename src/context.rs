//! Document setup and per-render state.
//!
//! A [`Document`] is built once from a list of [`Feature`]s. It owns the
//! construct registry, the node id allocator and the document-scoped feature
//! managers. Every render creates a fresh [`RenderContext`] holding the
//! render-scoped managers and the delayed-render registry.

use crate::ast::{Node, NodeId, NodeIdAllocator, NodeList, ParsingState};
use crate::error::{ConfigError, Result};
use crate::parser::parse_fragment;
use crate::render::{self, FragmentRenderer};
use crate::spec::SpecRegistry;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

/// A manager type that can be stored in a [`Managers`] map.
pub trait FeatureManager: Any {
    /// Name of the feature owning this manager.
    const NAME: &'static str;
}

/// Feature managers keyed by feature name.
#[derive(Default)]
pub struct Managers {
    inner: HashMap<&'static str, Box<dyn Any>>,
}

impl Managers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a manager, replacing any previous one of the same feature.
    pub fn insert<M: FeatureManager>(&mut self, manager: M) {
        self.inner.insert(M::NAME, Box::new(manager));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn get<M: FeatureManager>(&self) -> Result<&M> {
        self.try_get::<M>()
            .ok_or_else(|| ConfigError::MissingFeature(M::NAME.to_string()).into())
    }

    pub fn get_mut<M: FeatureManager>(&mut self) -> Result<&mut M> {
        self.try_get_mut::<M>()
            .ok_or_else(|| ConfigError::MissingFeature(M::NAME.to_string()).into())
    }

    pub fn try_get<M: FeatureManager>(&self) -> Option<&M> {
        self.inner.get(M::NAME).and_then(|m| m.downcast_ref::<M>())
    }

    pub fn try_get_mut<M: FeatureManager>(&mut self) -> Option<&mut M> {
        self.inner.get_mut(M::NAME).and_then(|m| m.downcast_mut::<M>())
    }
}

/// A pluggable unit of document semantics.
pub trait Feature {
    /// Stable name used to look up the feature's managers.
    fn name(&self) -> &'static str;

    /// Constructs this feature adds to the document's registry.
    fn construct_specs(&self) -> Vec<crate::spec::ConstructSpec> {
        Vec::new()
    }

    /// Install the document-scoped manager.
    ///
    /// Called once, in feature order, so later features may extend the
    /// managers of earlier ones.
    fn setup_document(&self, _managers: &mut Managers) -> Result<()> {
        Ok(())
    }

    /// Install a fresh render-scoped manager for one render pass.
    fn setup_render(&self, _doc: &Document, _managers: &mut Managers) -> Result<()> {
        Ok(())
    }
}

/// Context handed to external providers along with every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Path of the source the document was read from, if any
    pub source_path: Option<PathBuf>,
}

impl ResourceInfo {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: Some(path.into()),
        }
    }
}

/// A document: installed features, construct registry and managers.
pub struct Document {
    features: Vec<Box<dyn Feature>>,
    managers: Managers,
    specs: SpecRegistry,
    ids: NodeIdAllocator,
    resource_info: ResourceInfo,
}

impl Document {
    /// Set up a document from its features.
    ///
    /// Duplicate feature names or constructs defined twice are configuration
    /// errors.
    pub fn new(features: Vec<Box<dyn Feature>>) -> Result<Self> {
        let mut specs = SpecRegistry::with_standard_specs();
        let mut managers = Managers::new();
        let mut seen: Vec<&'static str> = Vec::new();

        for feature in &features {
            let name = feature.name();
            if seen.contains(&name) {
                return Err(ConfigError::DuplicateFeature(name.to_string()).into());
            }
            seen.push(name);
            for spec in feature.construct_specs() {
                specs.register(spec)?;
            }
        }
        for feature in &features {
            feature.setup_document(&mut managers)?;
        }

        debug!(features = ?seen, "Document set up");

        Ok(Self {
            features,
            managers,
            specs,
            ids: NodeIdAllocator::new(),
            resource_info: ResourceInfo::default(),
        })
    }

    pub fn with_resource_info(mut self, resource_info: ResourceInfo) -> Self {
        self.resource_info = resource_info;
        self
    }

    /// Parse block-level source against this document's constructs.
    pub fn parse(&self, source: &str) -> Result<NodeList> {
        parse_fragment(source, &self.specs, &self.ids, ParsingState::block())
    }

    /// Parse inline source, e.g. counter values or reference text.
    pub fn parse_inline(&self, source: &str) -> Result<NodeList> {
        parse_fragment(source, &self.specs, &self.ids, ParsingState::inline())
    }

    /// A synthetic text node with a fresh identity.
    pub fn text_node(&self, text: &str, like: &Node) -> Node {
        Node::chars(
            self.ids.allocate(),
            text,
            like.pos,
            ParsingState {
                is_block_level: Some(false),
                ..like.state
            },
        )
    }

    pub fn specs(&self) -> &SpecRegistry {
        &self.specs
    }

    pub fn resource_info(&self) -> &ResourceInfo {
        &self.resource_info
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name() == name)
    }

    /// Document-scoped manager of a feature.
    pub fn manager<M: FeatureManager>(&self) -> Result<&M> {
        self.managers.get::<M>()
    }

    pub fn try_manager<M: FeatureManager>(&self) -> Option<&M> {
        self.managers.try_get::<M>()
    }

    fn new_render_context(&self, phase: RenderPhase) -> Result<RenderContext<'_>> {
        let mut managers = Managers::new();
        for feature in &self.features {
            feature.setup_render(self, &mut managers)?;
        }
        Ok(RenderContext {
            doc: self,
            managers,
            delayed: DelayedRegistry::default(),
            phase,
        })
    }

    /// Run `render_fn` inside a render context and resolve delayed content.
    ///
    /// With a marker-capable renderer this is a single pass followed by
    /// marker substitution. Otherwise the content is rendered twice, the
    /// second pass reading delayed content computed after the first.
    pub fn render_with<F>(&self, renderer: &dyn FragmentRenderer, render_fn: F) -> Result<String>
    where
        F: Fn(&dyn FragmentRenderer, &mut RenderContext<'_>) -> Result<String>,
    {
        let mut ctx = self.new_render_context(RenderPhase::FirstPass)?;
        debug!(markers = renderer.supports_delayed_markers(), "Render pass started");
        let content = render_fn(renderer, &mut ctx)?;

        if ctx.delayed.is_empty() {
            debug!("Render finished without delayed content");
            return Ok(content);
        }

        let values = render::resolve_delayed(renderer, &mut ctx)?;

        if renderer.supports_delayed_markers() {
            debug!(count = values.len(), "Substituting delayed markers");
            return Ok(renderer.replace_delayed_markers(&content, &values));
        }

        let resolved = ctx.delayed.into_resolved();
        let mut second = self.new_render_context(RenderPhase::SecondPass)?;
        second.delayed.resolved = resolved;
        debug!("Second render pass started");
        render_fn(renderer, &mut second)
    }

    /// Render a node list with the renderer's default paragraph mode.
    pub fn render(&self, nodes: &NodeList, renderer: &dyn FragmentRenderer) -> Result<String> {
        self.render_with(renderer, |r, ctx| render::render_nodelist(r, nodes, ctx, None))
    }
}

/// Where a render currently stands in the delayed-render protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    /// The only pass with markers, or the first of two passes
    FirstPass,
    /// Computing delayed content once the first pass is complete
    Resolving,
    /// Second pass of two, reading precomputed delayed content
    SecondPass,
}

/// Nodes awaiting delayed rendering, and content already resolved.
#[derive(Debug, Default)]
pub struct DelayedRegistry {
    next_key: u64,
    pending: BTreeMap<u64, Node>,
    keys: HashMap<NodeId, u64>,
    resolved: HashMap<NodeId, String>,
}

impl DelayedRegistry {
    /// Key already allocated for this node in the current pass.
    pub fn key_for(&self, id: NodeId) -> Option<u64> {
        self.keys.get(&id).copied()
    }

    /// Allocate a key for a node; a node registered twice keeps its key.
    pub fn register(&mut self, node: &Node) -> u64 {
        if let Some(key) = self.key_for(node.id) {
            return key;
        }
        self.next_key += 1;
        let key = self.next_key;
        self.pending.insert(key, node.clone());
        self.keys.insert(node.id, key);
        debug!(key, node = node.id.0, "Registered delayed render");
        key
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.keys.is_empty()
    }

    /// Pending nodes in key order, leaving the registry's keys intact.
    pub fn take_pending(&mut self) -> BTreeMap<u64, Node> {
        std::mem::take(&mut self.pending)
    }

    pub fn set_resolved(&mut self, id: NodeId, content: String) {
        self.resolved.insert(id, content);
    }

    pub fn resolved(&self, id: NodeId) -> Option<&String> {
        self.resolved.get(&id)
    }

    fn into_resolved(self) -> HashMap<NodeId, String> {
        self.resolved
    }
}

/// State of one render: render-scoped managers and delayed content.
pub struct RenderContext<'d> {
    doc: &'d Document,
    managers: Managers,
    pub(crate) delayed: DelayedRegistry,
    pub(crate) phase: RenderPhase,
}

impl<'d> RenderContext<'d> {
    pub fn document(&self) -> &'d Document {
        self.doc
    }

    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Render-scoped manager of a feature.
    pub fn manager<M: FeatureManager>(&self) -> Result<&M> {
        self.managers.get::<M>()
    }

    pub fn manager_mut<M: FeatureManager>(&mut self) -> Result<&mut M> {
        self.managers.get_mut::<M>()
    }

    pub fn try_manager_mut<M: FeatureManager>(&mut self) -> Option<&mut M> {
        self.managers.try_get_mut::<M>()
    }

    pub fn has_manager(&self, name: &str) -> bool {
        self.managers.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Counter(usize);

    impl FeatureManager for Counter {
        const NAME: &'static str = "counter";
    }

    struct CounterFeature;

    impl Feature for CounterFeature {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
            managers.insert(Counter(0));
            Ok(())
        }
    }

    #[test]
    fn test_missing_manager_is_config_error() {
        let managers = Managers::new();
        let err = managers.get::<Counter>().err().unwrap();
        assert!(
            matches!(err, Error::Config(ConfigError::MissingFeature(name)) if name == "counter")
        );
    }

    #[test]
    fn test_duplicate_feature_is_rejected() {
        let err = Document::new(vec![Box::new(CounterFeature), Box::new(CounterFeature)])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::DuplicateFeature(_))));
    }

    #[test]
    fn test_render_managers_are_fresh_per_render() {
        let doc = Document::new(vec![Box::new(CounterFeature)]).unwrap();
        let renderer = crate::render::text::TextRenderer::default();
        for _ in 0..2 {
            let out = doc
                .render_with(&renderer, |_, ctx| {
                    let counter = ctx.manager_mut::<Counter>()?;
                    counter.0 += 1;
                    Ok(counter.0.to_string())
                })
                .unwrap();
            assert_eq!(out, "1");
        }
    }

    #[test]
    fn test_delayed_registry_keeps_key_per_node() {
        let doc = Document::new(Vec::new()).unwrap();
        let nodes = doc.parse("x").unwrap();
        let mut registry = DelayedRegistry::default();
        let a = registry.register(&nodes[0]);
        let b = registry.register(&nodes[0]);
        assert_eq!(a, b);
        assert_eq!(registry.take_pending().len(), 1);
    }
}
