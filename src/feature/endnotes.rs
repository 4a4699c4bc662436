//! Endnotes: independently numbered categories of footnote-like notes.

use crate::ast::{Node, NodeId, NodeList};
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext};
use crate::counter::{CounterFormatter, CounterStyle};
use crate::error::{ConfigError, Result};
use crate::render::{FragmentRenderer, Label};
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// A named, independently numbered collection of endnotes.
#[derive(Debug, Clone)]
pub struct EndnoteCategory {
    pub name: String,
    /// Maps the 1-based number to source text for the endnote mark
    pub counter: CounterFormatter,
    pub heading_title: String,
    /// Macro (without backslash) adding an endnote of this category
    pub command: Option<String>,
}

impl EndnoteCategory {
    pub fn new(name: &str, counter: CounterFormatter, heading_title: &str) -> Self {
        Self {
            name: name.to_string(),
            counter,
            heading_title: heading_title.to_string(),
            command: None,
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    /// The usual `\footnote` category.
    pub fn footnote() -> Self {
        Self::new(
            "footnote",
            CounterFormatter::from_style(CounterStyle::Alph),
            "Footnotes",
        )
        .with_command("footnote")
    }
}

/// Identity under which an endnote is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndnoteKey {
    Node(NodeId),
    /// An explicit `(prefix, key)` pair, as used by citations
    Named(Option<String>, String),
}

/// A registered endnote.
#[derive(Debug)]
pub struct EndnoteInstance {
    pub category: String,
    pub number: usize,
    /// Parsed counter value, e.g. `a` or `[3]`
    pub formatted_counter: NodeList,
    pub content: NodeList,
    pub ref_label: Option<(Option<String>, String)>,
}

/// Endnotes feature.
#[derive(Debug, Clone)]
pub struct EndnotesFeature {
    categories: Vec<EndnoteCategory>,
}

impl EndnotesFeature {
    pub fn new(categories: Vec<EndnoteCategory>) -> Self {
        Self { categories }
    }
}

impl Default for EndnotesFeature {
    fn default() -> Self {
        Self::new(vec![EndnoteCategory::footnote()])
    }
}

impl Feature for EndnotesFeature {
    fn name(&self) -> &'static str {
        EndnotesDocumentManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        self.categories
            .iter()
            .filter_map(|cat| {
                cat.command.as_ref().map(|command| {
                    ConstructSpec::macro_handler(
                        command,
                        vec![ArgSpec::mandatory("endnote_content")],
                        Rc::new(EndnoteHandler {
                            category: cat.name.clone(),
                        }),
                    )
                })
            })
            .collect()
    }

    fn setup_document(&self, managers: &mut Managers) -> Result<()> {
        let mut manager = EndnotesDocumentManager::default();
        for cat in &self.categories {
            manager.add_category(cat.clone())?;
        }
        managers.insert(manager);
        Ok(())
    }

    fn setup_render(&self, doc: &Document, managers: &mut Managers) -> Result<()> {
        let categories = doc.manager::<EndnotesDocumentManager>()?.categories.clone();
        managers.insert(EndnotesRenderManager::new(categories));
        Ok(())
    }
}

/// Registered categories, shared by all render passes.
#[derive(Debug, Default)]
pub struct EndnotesDocumentManager {
    categories: Vec<Rc<EndnoteCategory>>,
    /// Listing heading titles by source, parsed once for all passes
    titles: RefCell<HashMap<String, NodeList>>,
}

impl FeatureManager for EndnotesDocumentManager {
    const NAME: &'static str = "endnotes";
}

impl EndnotesDocumentManager {
    /// Register a further category; names must be unique.
    pub fn add_category(&mut self, category: EndnoteCategory) -> Result<()> {
        if self.category(&category.name).is_some() {
            return Err(ConfigError::DuplicateCategory(category.name).into());
        }
        self.categories.push(Rc::new(category));
        Ok(())
    }

    pub fn category(&self, name: &str) -> Option<&Rc<EndnoteCategory>> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn categories(&self) -> &[Rc<EndnoteCategory>] {
        &self.categories
    }

    /// Parsed heading title for the endnotes listing.
    pub fn title(&self, doc: &Document, source: &str) -> Result<NodeList> {
        if let Some(nodes) = self.titles.borrow().get(source) {
            return Ok(nodes.clone());
        }
        let nodes = doc.parse_inline(source)?;
        self.titles
            .borrow_mut()
            .insert(source.to_string(), nodes.clone());
        Ok(nodes)
    }
}

/// Per-pass endnote counters and registrations.
#[derive(Debug)]
pub struct EndnotesRenderManager {
    categories: Vec<Rc<EndnoteCategory>>,
    endnotes: HashMap<String, Vec<Rc<EndnoteInstance>>>,
    instances: HashMap<EndnoteKey, Rc<EndnoteInstance>>,
}

impl FeatureManager for EndnotesRenderManager {
    const NAME: &'static str = "endnotes";
}

impl EndnotesRenderManager {
    fn new(categories: Vec<Rc<EndnoteCategory>>) -> Self {
        let endnotes = categories
            .iter()
            .map(|c| (c.name.clone(), Vec::new()))
            .collect();
        Self {
            categories,
            endnotes,
            instances: HashMap::new(),
        }
    }

    /// Register an endnote, or return the one already registered under
    /// `key`.
    ///
    /// Numbers start at 1 per category and follow first registration order.
    pub fn add_endnote(
        &mut self,
        doc: &Document,
        category: &str,
        content: NodeList,
        key: EndnoteKey,
        ref_label: Option<(Option<String>, String)>,
    ) -> Result<Rc<EndnoteInstance>> {
        if let Some(existing) = self.instances.get(&key) {
            return Ok(Rc::clone(existing));
        }

        let cat = self
            .categories
            .iter()
            .find(|c| c.name == category)
            .ok_or_else(|| ConfigError::UnknownCategory(category.to_string()))?;
        let list = self
            .endnotes
            .get_mut(category)
            .ok_or_else(|| ConfigError::UnknownCategory(category.to_string()))?;

        let number = list.len() + 1;
        let formatted_counter = doc.parse_inline(&cat.counter.format(number))?;
        let endnote = Rc::new(EndnoteInstance {
            category: category.to_string(),
            number,
            formatted_counter,
            content,
            ref_label,
        });
        list.push(Rc::clone(&endnote));
        self.instances.insert(key, Rc::clone(&endnote));

        debug!(category, number, "Registered endnote");
        Ok(endnote)
    }

    pub fn endnotes(&self, category: &str) -> &[Rc<EndnoteInstance>] {
        self.endnotes.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Categories with the endnotes registered this pass, in registration
    /// order.
    fn snapshot(&self) -> Vec<(Rc<EndnoteCategory>, Vec<Rc<EndnoteInstance>>)> {
        self.categories
            .iter()
            .map(|c| (Rc::clone(c), self.endnotes(&c.name).to_vec()))
            .collect()
    }
}

/// Anchor of an endnote in the listing.
pub fn endnote_anchor(endnote: &EndnoteInstance) -> String {
    format!("{}-{}", endnote.category, endnote.number)
}

/// The in-text mark: the counter value linked to the endnote.
pub fn render_endnote_mark(
    endnote: &EndnoteInstance,
    renderer: &dyn FragmentRenderer,
    ctx: &mut RenderContext<'_>,
) -> Result<String> {
    renderer.render_link(
        "endnote",
        &format!("#{}", endnote_anchor(endnote)),
        &endnote.formatted_counter,
        ctx,
        &["endnote", endnote.category.as_str()],
    )
}

/// Options for [`render_endnotes`].
#[derive(Debug, Clone)]
pub struct EndnotesOptions {
    pub target_id: String,
    pub annotations: Vec<String>,
    /// Heading level for per-category headings, none if `None`
    pub include_headings_at_level: Option<u8>,
    /// Give per-category headings the id `<target_id>-<category>`
    pub set_headings_target_ids: bool,
    pub heading_title: Option<String>,
    pub heading_level: u8,
}

impl Default for EndnotesOptions {
    fn default() -> Self {
        Self {
            target_id: "endnotes".to_string(),
            annotations: Vec::new(),
            include_headings_at_level: None,
            set_headings_target_ids: false,
            heading_title: None,
            heading_level: 1,
        }
    }
}

fn render_category(
    category: &EndnoteCategory,
    endnotes: &[Rc<EndnoteInstance>],
    renderer: &dyn FragmentRenderer,
    ctx: &mut RenderContext<'_>,
) -> Result<String> {
    let items: Vec<NodeList> = endnotes.iter().map(|e| e.content.clone()).collect();
    let label = |n: usize| match endnotes.get(n - 1) {
        Some(e) => Label::Nodes(e.formatted_counter.clone()),
        None => Label::Text(String::new()),
    };
    let target_id = |n: usize| format!("{}-{}", category.name, n);
    let annotation = format!("{}-list", category.name);

    renderer.render_enumeration(
        &items,
        &label,
        Some(&target_id),
        ctx,
        &[annotation.as_str()],
        0,
    )
}

/// Render all endnotes registered so far in this pass.
///
/// Categories without endnotes are skipped; with no endnotes at all the
/// renderer's explicit "nothing" is returned.
pub fn render_endnotes(
    renderer: &dyn FragmentRenderer,
    ctx: &mut RenderContext<'_>,
    options: &EndnotesOptions,
) -> Result<String> {
    let doc = ctx.document();
    let titles = doc.manager::<EndnotesDocumentManager>()?;
    let snapshot = ctx.manager::<EndnotesRenderManager>()?.snapshot();

    let mut blocks = Vec::new();
    for (category, endnotes) in snapshot.iter().filter(|(_, e)| !e.is_empty()) {
        if let Some(level) = options.include_headings_at_level {
            let title = titles.title(doc, &category.heading_title)?;
            let heading_id = options
                .set_headings_target_ids
                .then(|| format!("{}-{}", options.target_id, category.name));
            blocks.push(renderer.render_heading(
                &title,
                ctx,
                level,
                heading_id.as_deref(),
                false,
                &[],
            )?);
        }
        blocks.push(render_category(category, endnotes, renderer, ctx)?);
    }

    if blocks.is_empty() {
        return Ok(renderer.render_nothing(&["no-endnotes"]));
    }

    if let Some(title) = &options.heading_title {
        let title = titles.title(doc, title)?;
        blocks.insert(
            0,
            renderer.render_heading(&title, ctx, options.heading_level, None, false, &[])?,
        );
    }

    let annotations: Vec<&str> = options.annotations.iter().map(String::as_str).collect();
    Ok(renderer.render_semantic_block(
        renderer.render_join_blocks(blocks),
        "endnotes",
        &annotations,
        Some(&options.target_id),
    ))
}

/// `\footnote{...}` and similar commands.
struct EndnoteHandler {
    category: String,
}

impl Handler for EndnoteHandler {
    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("endnote without arguments"));
        };
        let content = inv.required_nodes("endnote_content", node.pos)?.clone();
        let doc = ctx.document();
        let endnote = ctx.manager_mut::<EndnotesRenderManager>()?.add_endnote(
            doc,
            &self.category,
            content,
            EndnoteKey::Node(node.id),
            None,
        )?;
        render_endnote_mark(&endnote, renderer, ctx)
    }
}
