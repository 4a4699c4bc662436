//! Document configuration, loadable from TOML.
//!
//! ```toml
//! [[endnotes.categories]]
//! name = "footnote"
//! counter = "alph"
//! heading = "Footnotes"
//! command = "footnote"
//!
//! [citations]
//! counter = "arabic"
//! delimiters = ["[", "]"]
//! bibliography = "refs.bib"
//! ```
//!
//! Every table is optional; missing tables keep the standard setup.

use crate::bibtex::BibtexProvider;
use crate::context::{Document, Feature};
use crate::counter::CounterFormatter;
use crate::error::{ConfigError, Result};
use crate::feature::cite::{CitationProvider, CitationsFeature, CitationsOptions, CiteKeysFeature};
use crate::feature::endnotes::{EndnoteCategory, EndnotesFeature};
use crate::feature::enumeration::{EnumerationEnvironment, EnumerationFeature};
use crate::feature::floats::{FloatType, FloatsFeature};
use crate::feature::graphics::{GraphicsFeature, GraphicsProvider};
use crate::feature::headings::{HeadingsFeature, SectionCommand, MAX_LEVEL};
use crate::feature::refs::{RefResolver, RefsFeature};
use serde::Deserialize;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::debug;

/// External collaborators injected into the features.
#[derive(Clone, Default)]
pub struct Providers {
    pub citations: Option<Rc<dyn CitationProvider>>,
    pub refs: Option<Rc<dyn RefResolver>>,
    pub graphics: Option<Rc<dyn GraphicsProvider>>,
}

/// Which features a document has, and how they are set up.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentConfig {
    pub endnotes: EndnotesConfig,
    pub citations: CitationsConfig,
    pub refs: ToggleConfig,
    pub headings: HeadingsConfig,
    pub enumerations: EnumerationsConfig,
    pub floats: FloatsConfig,
    pub graphics: ToggleConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EndnotesConfig {
    pub categories: Vec<CategoryConfig>,
}

impl Default for EndnotesConfig {
    fn default() -> Self {
        Self {
            categories: vec![CategoryConfig {
                name: "footnote".to_string(),
                counter: "alph".to_string(),
                heading: "Footnotes".to_string(),
                command: Some("footnote".to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CategoryConfig {
    pub name: String,
    /// Standard formatter name or tag template
    pub counter: String,
    pub heading: String,
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CitationsConfig {
    pub enabled: bool,
    /// Standard formatter name
    pub counter: String,
    pub delimiters: (String, String),
    pub separator: String,
    pub use_endnotes: bool,
    /// BibTeX file used when no citation provider is injected
    pub bibliography: Option<PathBuf>,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            counter: "arabic".to_string(),
            delimiters: ("[".to_string(), "]".to_string()),
            separator: "; ".to_string(),
            use_endnotes: true,
            bibliography: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ToggleConfig {
    pub enabled: bool,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HeadingsConfig {
    pub enabled: bool,
    /// Commands for levels 1 upwards
    pub levels: Option<Vec<LevelConfig>>,
}

impl Default for HeadingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    pub command: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EnumerationsConfig {
    pub environments: Vec<EnvironmentConfig>,
}

impl Default for EnumerationsConfig {
    fn default() -> Self {
        Self {
            environments: vec![
                EnvironmentConfig {
                    name: "itemize".to_string(),
                    template: "•".to_string(),
                },
                EnvironmentConfig {
                    name: "enumerate".to_string(),
                    template: "1.".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FloatsConfig {
    pub types: Vec<FloatTypeConfig>,
}

impl Default for FloatsConfig {
    fn default() -> Self {
        Self {
            types: vec![
                FloatTypeConfig {
                    name: "figure".to_string(),
                    caption_name: "Figure".to_string(),
                    counter: "arabic".to_string(),
                },
                FloatTypeConfig {
                    name: "table".to_string(),
                    caption_name: "Table".to_string(),
                    counter: "arabic".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FloatTypeConfig {
    pub name: String,
    pub caption_name: String,
    pub counter: String,
}

impl DocumentConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: DocumentConfig = toml::from_str(source).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Build the feature list, in dependency order.
    pub fn into_features(self, providers: Providers) -> Result<Vec<Box<dyn Feature>>> {
        let mut features: Vec<Box<dyn Feature>> = Vec::new();

        let citation_provider = if self.citations.enabled {
            match (providers.citations, &self.citations.bibliography) {
                (Some(provider), _) => Some(provider),
                (None, Some(path)) => {
                    Some(Rc::new(BibtexProvider::from_file(path)?) as Rc<dyn CitationProvider>)
                }
                (None, None) => None,
            }
        } else {
            None
        };
        let citations_need_endnotes = citation_provider.is_some() && self.citations.use_endnotes;

        if !self.endnotes.categories.is_empty() || citations_need_endnotes {
            let categories = self
                .endnotes
                .categories
                .into_iter()
                .map(|cat| {
                    let category = EndnoteCategory::new(
                        &cat.name,
                        CounterFormatter::from_name_or_template(&cat.counter),
                        &cat.heading,
                    );
                    match &cat.command {
                        Some(command) => category.with_command(command),
                        None => category,
                    }
                })
                .collect();
            features.push(Box::new(EndnotesFeature::new(categories)));
        }

        match citation_provider {
            Some(provider) => {
                let options = CitationsOptions {
                    counter: CounterFormatter::from_name(&self.citations.counter)?,
                    delimiters: self.citations.delimiters,
                    separator: self.citations.separator,
                    use_endnotes: self.citations.use_endnotes,
                };
                features.push(Box::new(CitationsFeature::new(provider, options)));
            }
            None if self.citations.enabled => {
                debug!("No citation provider, citations render as keys");
                features.push(Box::new(CiteKeysFeature));
            }
            None => {}
        }

        if !self.enumerations.environments.is_empty() {
            let environments = self
                .enumerations
                .environments
                .iter()
                .map(|env| EnumerationEnvironment::new(&env.name, &env.template))
                .collect();
            features.push(Box::new(EnumerationFeature::new(environments)));
        }

        if self.headings.enabled {
            let headings = match self.headings.levels {
                Some(levels) if levels.len() > usize::from(MAX_LEVEL) => {
                    return Err(ConfigError::Invalid(format!(
                        "at most {} heading levels are supported, got {}",
                        MAX_LEVEL,
                        levels.len()
                    ))
                    .into());
                }
                Some(levels) => HeadingsFeature::new(
                    levels
                        .iter()
                        .map(|l| SectionCommand::new(&l.command, l.inline))
                        .collect(),
                ),
                None => HeadingsFeature::default(),
            };
            features.push(Box::new(headings));
        }

        if self.refs.enabled {
            features.push(Box::new(RefsFeature::new(providers.refs)));
        }

        if !self.floats.types.is_empty() {
            let types = self
                .floats
                .types
                .iter()
                .map(|t| {
                    FloatType::new(
                        &t.name,
                        &t.caption_name,
                        CounterFormatter::from_name_or_template(&t.counter),
                    )
                })
                .collect();
            features.push(Box::new(FloatsFeature::new(types)));
        }

        if self.graphics.enabled {
            let graphics = match providers.graphics {
                Some(provider) => GraphicsFeature::new(provider),
                None => GraphicsFeature::default(),
            };
            features.push(Box::new(graphics));
        }

        Ok(features)
    }

    /// Set up a document with this configuration.
    pub fn build_document(self, providers: Providers) -> Result<Document> {
        Document::new(self.into_features(providers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResourceInfo;
    use crate::error::Error;
    use crate::render::TextRenderer;
    use pretty_assertions::assert_eq;

    struct EchoProvider;

    impl CitationProvider for EchoProvider {
        fn full_text(
            &self,
            _prefix: Option<&str>,
            key: &str,
            _info: &ResourceInfo,
        ) -> Result<String> {
            Ok(format!("Entry {}.", key))
        }
    }

    fn feature_names(features: &[Box<dyn Feature>]) -> Vec<&'static str> {
        features.iter().map(|f| f.name()).collect()
    }

    #[test]
    fn test_default_features() {
        let features = DocumentConfig::default().into_features(Providers::default()).unwrap();
        assert_eq!(
            feature_names(&features),
            vec!["endnotes", "cite-keys", "enumeration", "headings", "refs", "floats", "graphics"]
        );
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(DocumentConfig::from_toml_str("").unwrap(), DocumentConfig::default());
    }

    #[test]
    fn test_toml_tables() {
        let config = DocumentConfig::from_toml_str(
            r#"
[[endnotes.categories]]
name = "remark"
counter = "(i)"
heading = "Remarks"
command = "remark"

[citations]
delimiters = ["(", ")"]
separator = ", "

[graphics]
enabled = false

[[enumerations.environments]]
name = "steps"
template = "Step 1:"
"#,
        )
        .unwrap();
        assert_eq!(config.endnotes.categories[0].counter, "(i)");
        assert_eq!(config.citations.delimiters, ("(".to_string(), ")".to_string()));
        assert_eq!(config.citations.counter, "arabic");
        assert!(!config.graphics.enabled);
        assert_eq!(config.enumerations.environments.len(), 1);
    }

    #[test]
    fn test_configured_document_renders() {
        let config = DocumentConfig::from_toml_str(
            r#"
[citations]
delimiters = ["(", ")"]

[[enumerations.environments]]
name = "steps"
template = "Step 1:"
"#,
        )
        .unwrap();
        let doc = config
            .build_document(Providers {
                citations: Some(Rc::new(EchoProvider)),
                ..Providers::default()
            })
            .unwrap();
        let nodes = doc
            .parse("\\begin{steps}\\item Go\\cite{k}\\end{steps}")
            .unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "  Step 1: Go(1)");
    }

    #[test]
    fn test_unknown_citation_counter() {
        let config = DocumentConfig::from_toml_str("[citations]\ncounter = \"(1)\"").unwrap();
        let err = config
            .into_features(Providers {
                citations: Some(Rc::new(EchoProvider)),
                ..Providers::default()
            })
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::UnknownCounterFormatter(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let err = DocumentConfig::from_toml_str("[citations]\nenabled = 3").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Toml(_))));
        let err = DocumentConfig::from_toml_str("[unknown]").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Toml(_))));
    }

    #[test]
    fn test_too_many_heading_levels() {
        let levels = (0..7)
            .map(|i| format!("{{ command = \"h{}\" }}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let config =
            DocumentConfig::from_toml_str(&format!("[headings]\nlevels = [{}]", levels)).unwrap();
        let err = config.into_features(Providers::default()).err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_bibliography_is_io_error() {
        let config =
            DocumentConfig::from_toml_str("[citations]\nbibliography = \"/nonexistent.bib\"")
                .unwrap();
        let err = config.into_features(Providers::default()).err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
