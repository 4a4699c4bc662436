//! Sectioning commands, `\section` to `\subsubparagraph`.

use crate::ast::Node;
use crate::context::{Document, Feature, FeatureManager, Managers, RenderContext};
use crate::error::Result;
use crate::feature::refs::{set_label_target, LabelTarget, RefText};
use crate::render::FragmentRenderer;
use crate::spec::{ArgSpec, ConstructSpec, Handler};
use std::rc::Rc;

/// Deepest heading level.
pub const MAX_LEVEL: u8 = 6;

/// The command producing headings of one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCommand {
    pub command: String,
    /// Run-in heading, rendered inside the following paragraph
    pub inline: bool,
}

impl SectionCommand {
    pub fn new(command: &str, inline: bool) -> Self {
        Self {
            command: command.to_string(),
            inline,
        }
    }
}

/// Headings feature; `commands[0]` is level 1.
#[derive(Debug, Clone)]
pub struct HeadingsFeature {
    commands: Vec<SectionCommand>,
}

impl HeadingsFeature {
    /// Commands for levels 1 upwards; at most six are used.
    pub fn new(commands: Vec<SectionCommand>) -> Self {
        Self { commands }
    }
}

impl Default for HeadingsFeature {
    fn default() -> Self {
        Self::new(vec![
            SectionCommand::new("section", false),
            SectionCommand::new("subsection", false),
            SectionCommand::new("subsubsection", false),
            SectionCommand::new("paragraph", true),
            SectionCommand::new("subparagraph", true),
            SectionCommand::new("subsubparagraph", true),
        ])
    }
}

impl Feature for HeadingsFeature {
    fn name(&self) -> &'static str {
        HeadingsRenderManager::NAME
    }

    fn construct_specs(&self) -> Vec<ConstructSpec> {
        self.commands
            .iter()
            .zip(1..=MAX_LEVEL)
            .map(|(cmd, level)| {
                ConstructSpec::macro_handler(
                    &cmd.command,
                    vec![ArgSpec::star("star"), ArgSpec::mandatory("text")],
                    Rc::new(HeadingHandler {
                        level,
                        inline: cmd.inline,
                    }),
                )
                .block_level(!cmd.inline)
            })
            .collect()
    }

    fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
        managers.insert(HeadingsRenderManager::default());
        Ok(())
    }
}

/// Per-level section counters.
#[derive(Debug, Default)]
pub struct HeadingsRenderManager {
    counters: [usize; MAX_LEVEL as usize],
}

impl FeatureManager for HeadingsRenderManager {
    const NAME: &'static str = "headings";
}

impl HeadingsRenderManager {
    /// Step the counter of `level`, resetting deeper levels, and return the
    /// full number, e.g. `[1, 2]` for the second subsection of section 1.
    pub fn step(&mut self, level: u8) -> Vec<usize> {
        let idx = usize::from(level.clamp(1, MAX_LEVEL)) - 1;
        self.counters[idx] += 1;
        for deeper in &mut self.counters[idx + 1..] {
            *deeper = 0;
        }
        self.counters[..=idx].to_vec()
    }
}

struct HeadingHandler {
    level: u8,
    inline: bool,
}

impl Handler for HeadingHandler {
    fn render(
        &self,
        node: &Node,
        renderer: &dyn FragmentRenderer,
        ctx: &mut RenderContext<'_>,
    ) -> Result<String> {
        let Some((_, inv)) = node.invocation() else {
            return Ok(renderer.render_empty_error_placeholder("heading without arguments"));
        };
        let content = inv.required_nodes("text", node.pos)?;
        let starred = inv.argument("star").is_some_and(|a| a.was_provided());

        let target_id = if starred {
            None
        } else {
            let number = ctx.manager_mut::<HeadingsRenderManager>()?.step(self.level);
            let dotted: Vec<String> = number.iter().map(usize::to_string).collect();
            let target_id = format!("sec-{}", dotted.join("-"));
            set_label_target(
                ctx,
                LabelTarget {
                    href: format!("#{}", target_id),
                    text: RefText::Source(dotted.join(".")),
                },
            );
            Some(target_id)
        };

        renderer.render_heading(
            content,
            ctx,
            self.level,
            target_id.as_deref(),
            self.inline,
            &[],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, RenderError};
    use crate::render::{HtmlRenderer, TextRenderer};
    use pretty_assertions::assert_eq;

    fn document() -> Document {
        Document::new(vec![Box::new(HeadingsFeature::default())]).unwrap()
    }

    #[test]
    fn test_counters_reset_deeper_levels() {
        let mut mgr = HeadingsRenderManager::default();
        assert_eq!(mgr.step(1), vec![1]);
        assert_eq!(mgr.step(2), vec![1, 1]);
        assert_eq!(mgr.step(2), vec![1, 2]);
        assert_eq!(mgr.step(1), vec![2]);
        assert_eq!(mgr.step(2), vec![2, 1]);
    }

    #[test]
    fn test_html_headings() {
        let doc = document();
        let nodes = doc
            .parse("\\section{Intro}\n\\subsection*{Aside}\n\n\\paragraph{Note.} Body text.")
            .unwrap();
        let html = doc.render(&nodes, &HtmlRenderer::default()).unwrap();
        assert_eq!(
            html,
            "<h1 id=\"sec-1\" class=\"heading-level-1\">Intro</h1>\n\
             <h2 class=\"heading-level-2\">Aside</h2>\n\
             <p><span id=\"sec-1-0-0-1\" class=\"heading-level-4 heading-inline\">Note.</span>  Body text.</p>"
        );
    }

    #[test]
    fn test_text_headings() {
        let doc = document();
        let nodes = doc
            .parse("\\section{Intro}\n\n\\subsection{More}\n\n\\paragraph{Run-in} text")
            .unwrap();
        let text = doc.render(&nodes, &TextRenderer::default()).unwrap();
        assert_eq!(text, "Intro\n=====\n\nMore\n----\n\nRun-in:   text");
    }

    struct DeepHeadings;

    impl Feature for DeepHeadings {
        fn name(&self) -> &'static str {
            "deep"
        }

        fn construct_specs(&self) -> Vec<ConstructSpec> {
            vec![ConstructSpec::macro_handler(
                "deep",
                vec![ArgSpec::mandatory("text")],
                Rc::new(HeadingHandler {
                    level: 7,
                    inline: false,
                }),
            )]
        }

        fn setup_render(&self, _doc: &Document, managers: &mut Managers) -> Result<()> {
            managers.insert(HeadingsRenderManager::default());
            Ok(())
        }
    }

    #[test]
    fn test_bad_heading_level() {
        let doc = Document::new(vec![Box::new(DeepHeadings)]).unwrap();
        let nodes = doc.parse("\\deep{x}").unwrap();
        let err = doc.render(&nodes, &HtmlRenderer::default()).unwrap_err();
        assert!(matches!(err, Error::Render(RenderError::InvalidHeadingLevel(7))));
    }
}
