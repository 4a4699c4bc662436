//! # fragdoc
//!
//! Render LaTeX-like document fragments to HTML and plain text, with the
//! document semantics that need more than a single walk over the tree:
//! numbered enumerations, endnotes, citations, cross-references, headings
//! and floats.
//!
//! ## Features
//!
//! - **Enumerations**: `itemize`, `enumerate` and custom environments with tag
//!   templates such as `(1)`, `a.` or `I.`, and per-item custom tags
//! - **Endnotes**: independently numbered categories, `\footnote` by default
//! - **Citations**: `\cite[extra]{key1, prefix:key2}` backed by a citation
//!   provider, e.g. a BibTeX bibliography
//! - **Cross-references**: `\label`, `\ref` and `\hyperref`, forward
//!   references included
//! - **Headings**: `\section` to `\subsubparagraph`, numbered and labelable
//! - **Floats and graphics**: `figure`/`table` with `\caption`, and
//!   `\includegraphics`
//!
//! ## Quick Start
//!
//! ```rust
//! use fragdoc::{standard_features, Document, HtmlRenderer};
//!
//! let doc = Document::new(standard_features()).unwrap();
//! let nodes = doc
//!     .parse("\\section{Intro}\\label{sec:intro}\nSee \\ref{sec:intro}.")
//!     .unwrap();
//! let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
//! assert!(html.contains("<a href=\"#sec-1\""));
//! ```
//!
//! ## Rendering strategies
//!
//! References and citations may point further down the document, so their
//! output is computed once the whole fragment has been seen:
//!
//! - Backends supporting delayed markers (HTML) render once, emitting inert
//!   markers that are substituted at the end.
//! - Other backends (plain text) render twice; the second pass reads the
//!   content computed after the first.
//!
//! Counters are reset for every pass, so both strategies number identically.
//!
//! ## Configuration
//!
//! Features can be configured from TOML, see [`DocumentConfig`]:
//!
//! ```text
//! [[endnotes.categories]]
//! name = "footnote"
//! counter = "fnsymbol"
//! heading = "Notes"
//! command = "footnote"
//!
//! [citations]
//! bibliography = "refs.bib"
//! ```

pub mod ast;
pub mod bibtex;
pub mod config;
pub mod context;
pub mod counter;
pub mod error;
pub mod feature;
pub mod parser;
pub mod render;
pub mod spec;

// Convenience re-exports
pub use ast::{Node, NodeId, NodeKind, NodeList};
pub use bibtex::{BibEntry, BibtexProvider};
pub use config::{DocumentConfig, Providers};
pub use context::{Document, Feature, FeatureManager, RenderContext, RenderPhase, ResourceInfo};
pub use counter::{CounterFormatter, CounterStyle};
pub use error::{ConfigError, Error, ParseError, Position, RenderError, Result};
pub use feature::endnotes::{render_endnotes, EndnotesOptions};
pub use feature::standard_features;
pub use render::{
    render_nodelist, FragmentRenderer, HtmlOptions, HtmlRenderer, LinkTargetBlank, TextOptions,
    TextRenderer,
};

/// Render `nodes` followed by the listing of all endnotes they produced.
pub fn render_with_endnotes(
    doc: &Document,
    nodes: &NodeList,
    renderer: &dyn FragmentRenderer,
    options: &EndnotesOptions,
) -> Result<String> {
    doc.render_with(renderer, |r, ctx| {
        let body = render_nodelist(r, nodes, ctx, None)?;
        let endnotes = render_endnotes(r, ctx, options)?;
        Ok(r.render_join_blocks(vec![body, endnotes]))
    })
}

/// Parse and render source to HTML with the standard features.
///
/// # Example
///
/// ```rust
/// let html = fragdoc::render_html("Some \\emph{text}.").unwrap();
/// assert_eq!(html, "<p>Some <span class=\"emph\">text</span>.</p>");
/// ```
pub fn render_html(source: &str) -> Result<String> {
    let doc = Document::new(standard_features())?;
    let nodes = doc.parse(source)?;
    doc.render(&nodes, &HtmlRenderer::default())
}

/// Parse and render source to plain text with the standard features.
pub fn render_text(source: &str) -> Result<String> {
    let doc = Document::new(standard_features())?;
    let nodes = doc.parse(source)?;
    doc.render(&nodes, &TextRenderer::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::cite::{CitationProvider, CitationsFeature, CitationsOptions};
    use crate::feature::{EndnotesFeature, EnumerationFeature, HeadingsFeature, RefsFeature};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    const SOURCE: &str = "\\section{Intro}
See \\ref{sec:results} and \\cite{knuth}.\\footnote{A note.}

\\begin{enumerate}
\\item First \\cite{knuth}
\\item[(*)] Second
\\end{enumerate}

\\section{Results}\\label{sec:results}
Done.";

    #[derive(Default)]
    struct CountingProvider {
        calls: Cell<usize>,
    }

    impl CitationProvider for CountingProvider {
        fn full_text(
            &self,
            _prefix: Option<&str>,
            key: &str,
            _info: &ResourceInfo,
        ) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("Entry {}.", key))
        }
    }

    fn document(provider: Rc<CountingProvider>) -> Document {
        Document::new(vec![
            Box::new(EndnotesFeature::default()),
            Box::new(CitationsFeature::new(provider, CitationsOptions::default())),
            Box::new(EnumerationFeature::default()),
            Box::new(HeadingsFeature::default()),
            Box::new(RefsFeature::default()),
        ])
        .unwrap()
    }

    #[test]
    fn test_full_pipeline_html() {
        let provider = Rc::new(CountingProvider::default());
        let doc = document(Rc::clone(&provider));
        let nodes = doc.parse(SOURCE).unwrap();
        let html = render_with_endnotes(
            &doc,
            &nodes,
            &HtmlRenderer::default(),
            &EndnotesOptions::default(),
        )
        .unwrap();

        assert_eq!(provider.calls.get(), 1);
        assert_eq!(
            html,
            "<h1 id=\"sec-1\" class=\"heading-level-1\">Intro</h1>\n\
             <p>See <a href=\"#sec-2\" class=\"href-ref ref-sec\">2</a> and \
             <a href=\"#citation-1\" class=\"href-endnote endnote citation\">[1]</a>.\
             <a href=\"#footnote-1\" class=\"href-endnote endnote footnote\">a</a></p>\n\
             <dl class=\"enumeration\">\
             <dt>1.</dt><dd><p>First <a href=\"#citation-1\" class=\"href-endnote endnote citation\">[1]</a></p></dd>\
             <dt>(*)</dt><dd><p>Second</p></dd></dl>\n\
             <h1 id=\"sec-2\" class=\"heading-level-1\">Results</h1>\n\
             <p>Done.</p>\n\
             <div id=\"endnotes\" class=\"endnotes\">\
             <dl class=\"enumeration footnote-list\"><dt id=\"footnote-1\">a</dt><dd><p>A note.</p></dd></dl>\n\
             <dl class=\"enumeration citation-list\"><dt id=\"citation-1\">[1]</dt><dd>Entry knuth.</dd></dl>\
             </div>"
        );
    }

    #[test]
    fn test_two_pass_text_numbers_like_markers() {
        let provider = Rc::new(CountingProvider::default());
        let doc = document(Rc::clone(&provider));
        let nodes = doc.parse(SOURCE).unwrap();
        let text = render_with_endnotes(
            &doc,
            &nodes,
            &TextRenderer::default(),
            &EndnotesOptions::default(),
        )
        .unwrap();

        // one query per pass
        assert_eq!(provider.calls.get(), 2);
        assert_eq!(
            text,
            "Intro\n=====\n\n\
             See 2 and [1].a\n\n   \
             1. First [1]\n  (*) Second\n\n\
             Results\n=======\n\n\
             Done.\n  \
             a A note.\n  [1] Entry knuth."
        );
    }

    /// Citation text pointing back into the document.
    struct CrossRefProvider;

    impl CitationProvider for CrossRefProvider {
        fn full_text(
            &self,
            _prefix: Option<&str>,
            _key: &str,
            _info: &ResourceInfo,
        ) -> Result<String> {
            Ok("See section \\ref{sec:a}.".to_string())
        }
    }

    fn cross_ref_document(options: CitationsOptions) -> Document {
        Document::new(vec![
            Box::new(EndnotesFeature::default()),
            Box::new(CitationsFeature::new(Rc::new(CrossRefProvider), options)),
            Box::new(HeadingsFeature::default()),
            Box::new(RefsFeature::default()),
        ])
        .unwrap()
    }

    #[test]
    fn test_ref_inside_citation_text_in_both_strategies() {
        let doc = cross_ref_document(CitationsOptions::default());
        let nodes = doc.parse("\\section{A}\\label{sec:a}\nX \\cite{k}.").unwrap();
        let options = EndnotesOptions::default();

        let html = render_with_endnotes(&doc, &nodes, &HtmlRenderer::default(), &options).unwrap();
        assert!(html.contains(
            "<dd>See section <a href=\"#sec-1\" class=\"href-ref ref-sec\">1</a>.</dd>"
        ));

        let text = render_with_endnotes(&doc, &nodes, &TextRenderer::default(), &options).unwrap();
        assert!(text.ends_with("\n  [1] See section 1."), "{}", text);
    }

    #[test]
    fn test_ref_inside_inline_citation_text_in_two_passes() {
        let doc = cross_ref_document(CitationsOptions {
            use_endnotes: false,
            ..CitationsOptions::default()
        });
        let nodes = doc.parse("\\section{A}\\label{sec:a}\nX \\cite{k}.").unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "A\n=\n\nX [See section 1.].");
    }

    #[test]
    fn test_ref_inside_endnotes_heading_in_two_passes() {
        let doc = Document::new(vec![
            Box::new(EndnotesFeature::default()),
            Box::new(HeadingsFeature::default()),
            Box::new(RefsFeature::default()),
        ])
        .unwrap();
        let nodes = doc.parse("\\section{A}\\label{sec:a}\nX.\\footnote{N.}").unwrap();
        let options = EndnotesOptions {
            heading_title: Some("Notes on \\ref{sec:a}".to_string()),
            heading_level: 2,
            ..EndnotesOptions::default()
        };
        let text = render_with_endnotes(&doc, &nodes, &TextRenderer::default(), &options).unwrap();
        assert!(text.ends_with("\nNotes on 1\n----------\n  a N."), "{}", text);
    }

    #[test]
    fn test_render_html_convenience() {
        let html = render_html("\\begin{itemize}\\item x\\end{itemize}").unwrap();
        assert_eq!(html, "<dl class=\"enumeration\"><dt>•</dt><dd><p>x</p></dd></dl>");
    }

    #[test]
    fn test_render_text_reports_missing_ref() {
        let err = render_text("See \\ref{nowhere}.").unwrap_err();
        assert!(matches!(
            err,
            Error::Parse(ParseError::RefNotFound { target, .. }) if target == "nowhere"
        ));
    }

    #[test]
    fn test_unknown_macro_is_parse_error() {
        let err = render_html("\\frobnicate{x}").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::Syntax { .. })));
    }
}
