//! Error type for the rendering pipeline.

use crate::math::MathError;
use crate::template::TemplateError;

/// Errors surfaced while turning lesson source into HTML.
///
/// All variants are fatal for the document being rendered; there is no
/// partial-output recovery path.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Unbalanced block-structure markers.
    #[error("block structure: {0}")]
    Structure(String),

    /// Malformed YAML in a metadata blockquote.
    #[error("metadata block: {0}")]
    Metadata(#[from] serde_yaml::Error),

    /// Malformed template source in a block tag or indented block.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Malformed math expression in inline code.
    #[error(transparent)]
    Math(#[from] MathError),
}
