//! Prompt templates.
//!
//! A template is tokenized once into literal text and typed placeholders,
//! then rendered against a [`Context`](crate::Context) and an output history.
//!
//! Recognized placeholders:
//! - `{{name}}` - context variable
//! - `{{output[-N]}}` - the N-th most recent output (N >= 1)
//! - `{{output[-N].a.b}}` - a field path into a structured output

mod parser;
mod resolver;

use thiserror::Error;

pub use parser::{Placeholder, PlaceholderKind, Segment, Template};
pub use resolver::resolve;

/// Errors raised while parsing or rendering a template.
///
/// Every variant carries the byte offset of the offending placeholder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("unknown context variable '{name}' at offset {at}")]
    UnknownVariable { name: String, at: usize },

    #[error("output[-{back}] at offset {at} is out of range (history has {len} entries)")]
    HistoryOutOfRange { back: usize, len: usize, at: usize },

    #[error("field access on text output {reference} at offset {at}")]
    FieldAccessOnText { reference: String, at: usize },

    #[error("{reference} is not an object (offset {at})")]
    NotAnObject { reference: String, at: usize },

    #[error("missing field {reference} at offset {at}")]
    MissingField { reference: String, at: usize },

    #[error("unrecognized placeholder '{{{{{text}}}}}' at offset {at}")]
    InvalidPlaceholder { text: String, at: usize },

    #[error("unterminated placeholder at offset {at}")]
    UnterminatedPlaceholder { at: usize },
}

impl ResolutionError {
    /// Byte offset of the placeholder in the template source.
    pub fn offset(&self) -> usize {
        match self {
            Self::UnknownVariable { at, .. }
            | Self::HistoryOutOfRange { at, .. }
            | Self::FieldAccessOnText { at, .. }
            | Self::NotAnObject { at, .. }
            | Self::MissingField { at, .. }
            | Self::InvalidPlaceholder { at, .. }
            | Self::UnterminatedPlaceholder { at } => *at,
        }
    }

    /// Whether the template itself is malformed, as opposed to failing
    /// against a particular context or history.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlaceholder { .. } | Self::UnterminatedPlaceholder { .. }
        )
    }
}
