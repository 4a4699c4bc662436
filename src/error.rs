//! Error types for the fragdoc library.

use std::fmt;
use thiserror::Error;

/// Result type alias for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset into the source
    pub offset: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column (in characters)
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Structural errors. These always abort the current render pass.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error at {pos}: {message}")]
    Syntax { pos: Position, message: String },

    #[error("Unexpected end of input at {pos}: {message}")]
    UnexpectedEof { pos: Position, message: String },

    #[error("Malformed construct at {pos}: {message}")]
    MalformedConstruct { pos: Position, message: String },

    #[error("Missing argument ‘{argument}’ to ‘{construct}’ at {pos}")]
    MissingArgument {
        pos: Position,
        construct: String,
        argument: String,
    },

    #[error("Reference target not found at {pos}: ‘{target}’")]
    RefNotFound { pos: Position, target: String },

    #[error("Paragraph break not allowed here ({pos})")]
    ParagraphBreakNotAllowed { pos: Position },
}

impl ParseError {
    /// Shorthand for a [`ParseError::MalformedConstruct`].
    pub fn malformed(pos: Position, message: impl Into<String>) -> Self {
        ParseError::MalformedConstruct {
            pos,
            message: message.into(),
        }
    }

    /// Position of the offending node.
    pub fn position(&self) -> Position {
        match self {
            ParseError::Syntax { pos, .. }
            | ParseError::UnexpectedEof { pos, .. }
            | ParseError::MalformedConstruct { pos, .. }
            | ParseError::MissingArgument { pos, .. }
            | ParseError::RefNotFound { pos, .. }
            | ParseError::ParagraphBreakNotAllowed { pos } => *pos,
        }
    }
}

/// Setup errors, raised before any rendering starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Feature ‘{0}’ is not installed in this document")]
    MissingFeature(String),

    #[error("Feature ‘{0}’ was registered more than once")]
    DuplicateFeature(String),

    #[error("Endnote category ‘{0}’ is already registered")]
    DuplicateCategory(String),

    #[error("Construct ‘{0}’ is defined by more than one feature")]
    DuplicateConstruct(String),

    #[error("Unknown endnote category: {0}")]
    UnknownCategory(String),

    #[error("Unknown counter formatter: {0}")]
    UnknownCounterFormatter(String),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by renderers or external collaborators.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Bad heading level {0}, expected 1..6")]
    InvalidHeadingLevel(u8),

    #[error("No resolved content for delayed node #{0}")]
    MissingDelayedContent(u64),

    #[error("Provider error: {0}")]
    Provider(String),
}
