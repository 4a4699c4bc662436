//! Citations backed by an external provider, numbered as endnotes.

use crate::ast::{CiteItem, Derived, Node, NodeList};
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext, ResourceInfo};
use crate::counter::{CounterFormatter, CounterStyle};
use crate::error::{ConfigError, ParseError, Result};
use crate::feature::endnotes::{
    endnote_anchor, EndnoteCategory, EndnoteInstance, EndnoteKey, EndnotesDocumentManager,
    EndnotesRenderManager,
};
use crate::render::{render_nodelist, FragmentRenderer};
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Name of the endnote category holding citations.
pub const CITATION_CATEGORY: &str = "citation";

/// Source of citation text.
pub trait CitationProvider {
    /// Full text of the citation, as LaTeX-like source.
    fn full_text(
        &self,
        prefix: Option<&str>,
        key: &str,
        resource_info: &ResourceInfo,
    ) -> Result<String>;
}

/// How citation marks are formatted.
#[derive(Debug, Clone)]
pub struct CitationsOptions {
    /// Formatter for the number inside the delimiters
    pub counter: CounterFormatter,
    pub delimiters: (String, String),
    /// Between the number and the optional extra text, as in `[3; p. 4]`
    pub separator: String,
    /// List citations as endnotes; otherwise the full text is inlined
    pub use_endnotes: bool,
}

impl Default for CitationsOptions {
    fn default() -> Self {
        Self {
            counter: CounterFormatter::from_style(CounterStyle::Arabic),
            delimiters: ("[".to_string(), "]".to_string()),
            separator: "; ".to_string(),
            use_endnotes: true,
        }
    }
}

/// Citations feature, providing `\cite[extra]{key1,prefix:key2}`.
pub struct CitationsFeature {
    provider: Rc<dyn CitationProvider>,
    options: CitationsOptions,
}

impl CitationsFeature {
    pub fn new(provider: Rc<dyn CitationProvider>, options: CitationsOptions) -> Self {
        Self { provider, options }
    }

    pub fn set_provider(&mut self, provider: Rc<dyn CitationProvider>) {
        warn!("Replacing the citation provider");
        self.provider = provider;
    }
}

impl Feature for CitationsFeature {
    fn name(&self) -> &'static str {
        CitationsDocumentManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        vec![cite_construct()]
    }

    fn setup_document(&self, managers: &mut Managers) -> Result<()> {
        if self.options.use_endnotes {
            let inner = self.options.counter.clone();
            let (open, close) = self.options.delimiters.clone();
            let category = EndnoteCategory::new(
                CITATION_CATEGORY,
                CounterFormatter::custom(move |n| format!("{}{}{}", open, inner.format(n), close)),
                "References",
            );
            managers
                .get_mut::<EndnotesDocumentManager>()
                .map_err(|_| ConfigError::MissingFeature("endnotes".to_string()))?
                .add_category(category)?;
        }
        managers.insert(CitationsDocumentManager {
            provider: Rc::clone(&self.provider),
            options: self.options.clone(),
            parsed: RefCell::default(),
        });
        Ok(())
    }

    fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
        managers.insert(CitationsRenderManager::default());
        Ok(())
    }
}

/// The `\cite` construct.
///
/// Without the citations feature installed, citations render as their
/// bare keys.
pub fn cite_construct() -> ConstructSpec {
    ConstructSpec::macro_handler(
        "cite",
        vec![ArgSpec::optional("cite_pre_text"), ArgSpec::mandatory("citekey")],
        Rc::new(CiteHandler),
    )
}

/// Only registers `\cite`, for documents without a citation provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct CiteKeysFeature;

impl Feature for CiteKeysFeature {
    fn name(&self) -> &'static str {
        "cite-keys"
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        vec![cite_construct()]
    }
}

pub struct CitationsDocumentManager {
    provider: Rc<dyn CitationProvider>,
    options: CitationsOptions,
    /// Parsed citation text by `(prefix, key)`, together with its source.
    /// Reused for as long as the provider returns the same source, so the
    /// nodes keep their ids from one pass to the next.
    parsed: RefCell<HashMap<(Option<String>, String), (String, NodeList)>>,
}

impl FeatureManager for CitationsDocumentManager {
    const NAME: &'static str = "citations";
}

/// A citation registered as an endnote, with its bare counter value.
#[derive(Debug, Clone)]
pub struct CitationEndnote {
    pub endnote: Rc<EndnoteInstance>,
    /// Counter without delimiters, e.g. `3` for `[3]`
    pub inner_counter: NodeList,
}

/// Per-pass citation cache keyed by `(prefix, key)`.
#[derive(Debug, Default)]
pub struct CitationsRenderManager {
    endnotes: HashMap<(Option<String>, String), CitationEndnote>,
}

impl FeatureManager for CitationsRenderManager {
    const NAME: &'static str = "citations";
}

fn citation_content(doc: &Document, prefix: Option<&str>, key: &str) -> Result<NodeList> {
    let manager = doc.manager::<CitationsDocumentManager>()?;
    let text = manager.provider.full_text(prefix, key, doc.resource_info())?;
    debug!(prefix, key, "Fetched citation text");

    let cache_key = (prefix.map(str::to_string), key.to_string());
    if let Some((source, nodes)) = manager.parsed.borrow().get(&cache_key) {
        if *source == text {
            return Ok(nodes.clone());
        }
    }
    let nodes = doc.parse_inline(&text)?;
    manager
        .parsed
        .borrow_mut()
        .insert(cache_key, (text, nodes.clone()));
    Ok(nodes)
}

/// The endnote for a citation, fetching its text on first use in this pass.
fn citation_endnote(ctx: &mut RenderContext<'_>, item: &CiteItem) -> Result<CitationEndnote> {
    let doc = ctx.document();
    let cache_key = (item.prefix.clone(), item.key.clone());
    if let Some(cached) = ctx.manager::<CitationsRenderManager>()?.endnotes.get(&cache_key) {
        return Ok(cached.clone());
    }

    let content = citation_content(doc, item.prefix.as_deref(), &item.key)?;
    let endnote = ctx.manager_mut::<EndnotesRenderManager>()?.add_endnote(
        doc,
        CITATION_CATEGORY,
        content,
        EndnoteKey::Named(item.prefix.clone(), item.key.clone()),
        Some(cache_key.clone()),
    )?;
    let options = &doc.manager::<CitationsDocumentManager>()?.options;
    let inner_counter = doc.parse_inline(&options.counter.format(endnote.number))?;

    let citation = CitationEndnote {
        endnote,
        inner_counter,
    };
    ctx.manager_mut::<CitationsRenderManager>()?
        .endnotes
        .insert(cache_key, citation.clone());
    Ok(citation)
}

/// Split a comma-separated key list into citation items.
///
/// A `prefix:key` item has its prefix trimmed and lowercased.
pub fn parse_cite_keys(keys: &str) -> Vec<CiteItem> {
    keys.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| match k.split_once(':') {
            Some((prefix, key)) => CiteItem {
                prefix: Some(prefix.trim().to_lowercase()),
                key: key.to_string(),
            },
            None => CiteItem {
                prefix: None,
                key: k.to_string(),
            },
        })
        .collect()
}

struct CiteHandler;

impl Handler for CiteHandler {
    fn postprocess_parsed_node(&self, node: &Node) -> Result<Option<Derived>> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(None);
        };
        let keys = inv
            .argument_chars("citekey")?
            .ok_or_else(|| ParseError::MissingArgument {
                pos: node.pos,
                construct: inv.name.clone(),
                argument: "citekey".to_string(),
            })?;
        Ok(Some(Derived::Citation {
            extra: inv.argument_nodes("cite_pre_text").cloned(),
            items: parse_cite_keys(&keys),
        }))
    }

    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some(Derived::Citation { extra, items }) = node.derived() else {
            return Ok(renderer.render_empty_error_placeholder("citation was not parsed"));
        };
        let doc = ctx.document();

        let Some(manager) = doc.try_manager::<CitationsDocumentManager>() else {
            let parts = items
                .iter()
                .map(|item| {
                    let text = match &item.prefix {
                        Some(prefix) => format!("[{}:{}]", prefix, item.key),
                        None => format!("[{}]", item.key),
                    };
                    renderer.render_text_format(&["cite"], renderer.render_value(&text))
                })
                .collect();
            return Ok(renderer.render_join(parts));
        };
        let options = &manager.options;

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            let (shown, endnote) = if options.use_endnotes {
                let citation = citation_endnote(ctx, item)?;
                (citation.inner_counter, Some(citation.endnote))
            } else {
                (citation_content(doc, item.prefix.as_deref(), &item.key)?, None)
            };

            let mut mark = vec![doc.text_node(&options.delimiters.0, node)];
            mark.extend(shown.iter().cloned());
            if let Some(extra) = extra {
                mark.push(doc.text_node(&options.separator, node));
                mark.extend(extra.iter().cloned());
            }
            mark.push(doc.text_node(&options.delimiters.1, node));
            let mark = NodeList::new(mark);

            parts.push(match endnote {
                Some(endnote) => renderer.render_link(
                    "endnote",
                    &format!("#{}", endnote_anchor(&endnote)),
                    &mark,
                    ctx,
                    &["endnote", CITATION_CATEGORY],
                )?,
                None => render_nodelist(renderer, &mark, ctx, Some(false))?,
            });
        }
        Ok(renderer.render_join(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feature::endnotes::{render_endnotes, EndnotesFeature, EndnotesOptions};
    use crate::render::{HtmlRenderer, TextRenderer};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    /// Returns `Text for <key>.` and counts queries.
    #[derive(Default)]
    struct CountingProvider {
        calls: Cell<usize>,
    }

    impl CitationProvider for CountingProvider {
        fn full_text(
            &self,
            prefix: Option<&str>,
            key: &str,
            _info: &ResourceInfo,
        ) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            let prefix = prefix.map(|p| format!("{}:", p)).unwrap_or_default();
            Ok(format!("Text for {}{}.", prefix, key))
        }
    }

    fn document(provider: Rc<CountingProvider>, options: CitationsOptions) -> Document {
        Document::new(vec![
            Box::new(EndnotesFeature::default()),
            Box::new(CitationsFeature::new(provider, options)),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_cite_keys() {
        assert_eq!(
            parse_cite_keys(" arXiv :1234.5678, knuth84 ,,"),
            vec![
                CiteItem {
                    prefix: Some("arxiv".into()),
                    key: "1234.5678".into()
                },
                CiteItem {
                    prefix: None,
                    key: "knuth84".into()
                },
            ]
        );
    }

    #[test]
    fn test_repeated_citation_queries_provider_once() {
        let provider = Rc::new(CountingProvider::default());
        let doc = document(Rc::clone(&provider), CitationsOptions::default());
        let nodes = doc.parse("A \\cite{x} B \\cite{y} C \\cite{x}").unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert_eq!(provider.calls.get(), 2);
        assert_eq!(
            html,
            "<p>A <a href=\"#citation-1\" class=\"href-endnote endnote citation\">[1]</a> \
             B <a href=\"#citation-2\" class=\"href-endnote endnote citation\">[2]</a> \
             C <a href=\"#citation-1\" class=\"href-endnote endnote citation\">[1]</a></p>"
        );
    }

    #[test]
    fn test_citation_with_extra_text() {
        let provider = Rc::new(CountingProvider::default());
        let doc = document(provider, CitationsOptions::default());
        let nodes = doc.parse("\\cite[Theorem 4]{a}").unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "[1; Theorem 4]");
    }

    #[test]
    fn test_citations_are_listed_as_endnotes() {
        let provider = Rc::new(CountingProvider::default());
        let doc = document(provider, CitationsOptions::default());
        let nodes = doc.parse("See \\cite{doi:10/x}.").unwrap();
        let text = doc
            .render_with(&TextRenderer::default(), |r, ctx| {
                render_nodelist(r, &nodes, ctx, None)?;
                render_endnotes(r, ctx, &EndnotesOptions::default())
            })
            .unwrap();
        assert_eq!(text, "  [1] Text for doi:10/x.");
    }

    #[test]
    fn test_inline_citations_without_endnotes() {
        let provider = Rc::new(CountingProvider::default());
        let options = CitationsOptions {
            use_endnotes: false,
            ..CitationsOptions::default()
        };
        let doc = Document::new(vec![Box::new(CitationsFeature::new(provider, options))]).unwrap();
        let nodes = doc.parse("\\cite{k}").unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "[Text for k.]");
    }

    #[test]
    fn test_citations_require_endnotes() {
        let provider = Rc::new(CountingProvider::default());
        let err = Document::new(vec![Box::new(CitationsFeature::new(
            provider,
            CitationsOptions::default(),
        ))])
        .err()
        .unwrap();
        assert!(
            matches!(err, Error::Config(ConfigError::MissingFeature(name)) if name == "endnotes")
        );
    }

    #[test]
    fn test_cite_without_citations_feature() {
        let doc = Document::new(vec![Box::new(CiteKeysFeature)]).unwrap();
        let nodes = doc.parse("\\cite{arXiv:1, k}").unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert_eq!(
            html,
            "<p><span class=\"cite\">[arxiv:1]</span><span class=\"cite\">[k]</span></p>"
        );
    }
}
