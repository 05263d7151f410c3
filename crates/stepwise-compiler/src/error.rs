//! Error type for the compilation pipeline.

use stepwise_renderer::{RenderError, TemplateError};

/// Errors surfaced while compiling one lesson document.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The rendering stage failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Template evaluation failed during DOM post-processing.
    #[error(transparent)]
    Template(#[from] TemplateError),
}
