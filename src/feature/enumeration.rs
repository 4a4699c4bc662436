//! Enumeration environments: `itemize`, `enumerate` and custom ones.

use crate::ast::{Derived, EnumerationItem, Node, NodeList};
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext};
use crate::counter::CounterFormatter;
use crate::error::{ParseError, Result};
use crate::render::{FragmentRenderer, Label};
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::collections::HashMap;
use std::rc::Rc;

/// An enumeration environment and its default tag template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationEnvironment {
    pub name: String,
    /// Template such as `1.`, `(a)` or `•`
    pub template: String,
    pub annotations: Vec<String>,
}

impl EnumerationEnvironment {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            annotations: Vec::new(),
        }
    }
}

/// Enumeration feature.
#[derive(Debug, Clone)]
pub struct EnumerationFeature {
    environments: Vec<EnumerationEnvironment>,
}

impl EnumerationFeature {
    pub fn new(environments: Vec<EnumerationEnvironment>) -> Self {
        Self { environments }
    }
}

impl Default for EnumerationFeature {
    fn default() -> Self {
        Self::new(vec![
            EnumerationEnvironment::new("itemize", "•"),
            EnumerationEnvironment::new("enumerate", "1."),
        ])
    }
}

impl Feature for EnumerationFeature {
    fn name(&self) -> &'static str {
        EnumerationRenderManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        let mut specs: Vec<ConstructSpec> = self
            .environments
            .iter()
            .map(|env| {
                ConstructSpec::environment(
                    &env.name,
                    vec![ArgSpec::optional("tag_template")],
                    Rc::new(EnumerationHandler {
                        counter: CounterFormatter::from_template(&env.template),
                        annotations: env.annotations.clone(),
                    }),
                )
            })
            .collect();
        specs.push(ConstructSpec::macro_handler(
            "item",
            vec![ArgSpec::optional("custom_tag")],
            Rc::new(ItemHandler),
        ));
        specs
    }

    fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
        managers.insert(EnumerationRenderManager::default());
        Ok(())
    }
}

/// Tracks how deeply enumerations are nested while rendering.
#[derive(Debug, Default)]
pub struct EnumerationRenderManager {
    depth: usize,
}

impl FeatureManager for EnumerationRenderManager {
    const NAME: &'static str = "enumeration";
}

/// Split an environment body into items at each `\item`.
///
/// Whitespace before the first `\item` is skipped; any other content that
/// does not start with `\item` is malformed.
pub fn split_items(body: &NodeList) -> Result<Vec<EnumerationItem>> {
    let mut items = Vec::new();
    for (j, segment) in body.split_at(|n| n.is_macro("item"), true).into_iter().enumerate() {
        let Some(first) = segment.first() else {
            continue;
        };
        if j == 0 && segment.is_whitespace() {
            continue;
        }
        if !first.is_macro("item") {
            return Err(ParseError::malformed(
                first.pos,
                "expected ‘\\item’ in enumeration environment",
            )
            .into());
        }
        let mut nodes = segment.into_vec();
        let item = nodes.remove(0);
        items.push(EnumerationItem {
            item,
            content: NodeList::new(nodes),
        });
    }
    Ok(items)
}

struct EnumerationHandler {
    counter: CounterFormatter,
    annotations: Vec<String>,
}

impl Handler for EnumerationHandler {
    fn postprocess_parsed_node(&self, node: &Node) -> Result<Option<Derived>> {
        match node.invocation().and_then(|(_, inv)| inv.body.as_ref()) {
            Some(body) => Ok(Some(Derived::Enumeration(split_items(body)?))),
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
            return Ok(renderer.render_empty_error_placeholder("enumeration without body"));
        };
        let Derived::Enumeration(items) = node.derived_or_try_init(|| {
            let body = inv.body.clone().unwrap_or_default();
            Ok(Derived::Enumeration(split_items(&body)?))
        })?
        else {
            return Ok(renderer.render_empty_error_placeholder("enumeration items"));
        };

        let counter = match inv.argument_chars("tag_template")? {
            Some(template) => CounterFormatter::from_template(&template),
            None => self.counter.clone(),
        };

        let mut custom_tags: HashMap<usize, NodeList> = HashMap::new();
        for (j, item) in items.iter().enumerate() {
            if let Some((_, item_inv)) = item.item.invocation() {
                if let Some(tag) = item_inv.argument_nodes("custom_tag") {
                    custom_tags.insert(j + 1, tag.clone());
                }
            }
        }

        let label = |n: usize| match custom_tags.get(&n) {
            Some(tag) => Label::Nodes(tag.clone()),
            None => Label::Text(counter.format(n)),
        };
        let contents: Vec<NodeList> = items.iter().map(|i| i.content.clone()).collect();
        let annotations: Vec<&str> = self.annotations.iter().map(String::as_str).collect();

        let depth = {
            let mgr = ctx.manager_mut::<EnumerationRenderManager>()?;
            mgr.depth += 1;
            mgr.depth - 1
        };
        let rendered =
            renderer.render_enumeration(&contents, &label, None, ctx, &annotations, depth);
        ctx.manager_mut::<EnumerationRenderManager>()?.depth = depth;
        rendered
    }
}

/// `\item` outside an enumeration body.
struct ItemHandler;

impl Handler for ItemHandler {
    fn render(
        &self,
        node: &Node,
        _renderer: &dyn FragmentRenderer,
        _ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        Err(ParseError::malformed(node.pos, "‘\\item’ outside of an enumeration").into())
    }
}
