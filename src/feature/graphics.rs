//! `\includegraphics` and graphics resource providers.

use crate::ast::{Derived, Node};
use crate::context::{Feature, FeatureManager, Managers, RenderContext, ResourceInfo};
use crate::error::{ParseError, Result};
use crate::render::FragmentRenderer;
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::rc::Rc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphicsKind {
    Raster,
    Vector,
}

/// An embeddable image.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsResource {
    /// Path or URL of the image
    pub src: String,
    pub kind: Option<GraphicsKind>,
    pub dpi: Option<f64>,
    /// Width and height in pixels
    pub pixel_dimensions: Option<(u32, u32)>,
    /// Width and height in points (1pt = 1/72 inch)
    pub physical_dimensions: Option<(Option<f64>, Option<f64>)>,
}

impl GraphicsResource {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            kind: None,
            dpi: None,
            pixel_dimensions: None,
            physical_dimensions: None,
        }
    }
}

/// Looks up the image behind an `\includegraphics` path.
pub trait GraphicsProvider {
    fn resolve(&self, path: &str, resource_info: &ResourceInfo) -> Result<GraphicsResource>;
}

/// Uses the path as the image source, without any metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePathProvider;

impl GraphicsProvider for SimplePathProvider {
    fn resolve(&self, path: &str, _resource_info: &ResourceInfo) -> Result<GraphicsResource> {
        Ok(GraphicsResource::new(path))
    }
}

/// Graphics feature.
pub struct GraphicsFeature {
    provider: Rc<dyn GraphicsProvider>,
}

impl GraphicsFeature {
    pub fn new(provider: Rc<dyn GraphicsProvider>) -> Self {
        Self { provider }
    }

    pub fn set_provider(&mut self, provider: Rc<dyn GraphicsProvider>) {
        warn!("Replacing graphics provider");
        self.provider = provider;
    }
}

impl Default for GraphicsFeature {
    fn default() -> Self {
        Self::new(Rc::new(SimplePathProvider))
    }
}

impl Feature for GraphicsFeature {
    fn name(&self) -> &'static str {
        GraphicsManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        vec![ConstructSpec::macro_handler(
            "includegraphics",
            vec![
                ArgSpec::optional("graphics_options"),
                ArgSpec::mandatory("graphics_path"),
            ],
            Rc::new(IncludeGraphicsHandler),
        )
        .block_level(true)]
    }

    fn setup_document(&self, managers: &mut Managers) -> Result<()> {
        managers.insert(GraphicsManager {
            provider: Rc::clone(&self.provider),
        });
        Ok(())
    }
}

/// Holds the document's graphics provider.
pub struct GraphicsManager {
    provider: Rc<dyn GraphicsProvider>,
}

impl FeatureManager for GraphicsManager {
    const NAME: &'static str = "graphics";
}

impl GraphicsManager {
    pub fn resource(&self, path: &str, resource_info: &ResourceInfo) -> Result<GraphicsResource> {
        self.provider.resolve(path, resource_info)
    }
}

fn graphics_args(node: &Node) -> Result<Derived> {
    let Some((_, inv)) = node.invocation() else {
        return Err(
            ParseError::malformed(node.pos, "‘\\includegraphics’ without arguments").into(),
        );
    };
    Ok(Derived::Graphics {
        options: inv.argument_chars("graphics_options")?.unwrap_or_default(),
        path: inv.required_nodes("graphics_path", node.pos)?.as_chars()?.trim().to_string(),
    })
}

struct IncludeGraphicsHandler;

impl Handler for IncludeGraphicsHandler {
    fn postprocess_parsed_node(&self, node: &Node) -> Result<Option<Derived>> {
        graphics_args(node).map(Some)
    }

    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Derived::Graphics { options, path } = node.derived_or_try_init(|| graphics_args(node))?
        else {
            return Ok(renderer.render_empty_error_placeholder("graphics arguments"));
        };
        if !options.trim().is_empty() {
            return Err(ParseError::malformed(
                node.pos,
                format!("graphics options are not supported: ‘{}’", options),
            )
            .into());
        }

        let doc = ctx.document();
        let resource = doc.manager::<GraphicsManager>()?.resource(path, doc.resource_info())?;
        Ok(renderer.render_graphics_block(&resource))
    }
}
