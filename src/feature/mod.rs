//! Pluggable document features.
//!
//! Each feature contributes constructs to the document's registry and owns a
//! document-scoped manager (configuration, shared registries) and/or a
//! render-scoped manager (counters and caches reset on every render pass).

pub mod cite;
pub mod endnotes;
pub mod enumeration;
pub mod floats;
pub mod graphics;
pub mod headings;
pub mod refs;

pub use self::cite::{CitationProvider, CitationsFeature, CitationsOptions, CiteKeysFeature};
pub use self::endnotes::{
    EndnoteCategory, EndnoteInstance, EndnoteKey, EndnotesFeature, EndnotesOptions,
};
pub use self::enumeration::{EnumerationEnvironment, EnumerationFeature};
pub use self::floats::{FloatInstance, FloatType, FloatsFeature};
pub use self::graphics::{
    GraphicsFeature, GraphicsKind, GraphicsProvider, GraphicsResource, SimplePathProvider,
};
pub use self::headings::{HeadingsFeature, SectionCommand};
pub use self::refs::{LabelTarget, RefInstance, RefResolver, RefText, RefsFeature};

use crate::context::Feature;

/// The standard feature set without external providers.
pub fn standard_features() -> Vec<Box<dyn Feature>> {
    vec![
        Box::new(EndnotesFeature::default()),
        Box::new(EnumerationFeature::default()),
        Box::new(HeadingsFeature::default()),
        Box::new(RefsFeature::default()),
        Box::new(FloatsFeature::default()),
        Box::new(GraphicsFeature::default()),
    ]
}
