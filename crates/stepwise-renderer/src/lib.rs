//! Markdown-to-HTML rendering for interactive lesson documents.
//!
//! Lesson source is standard markdown plus a handful of course-specific
//! constructs: `::: ` block markers, `---` step boundaries, blockquote front
//! matter, `[[...]]` blanks, `${...}` variables, emoji shortcodes, and inline
//! code interpreted as math. This crate turns one source document into HTML
//! plus its extracted metadata; DOM post-processing and output assembly live
//! in the compiler crate on top.

pub mod blocks;
pub mod doc;
pub mod error;
pub mod inline;
pub mod math;
pub mod preprocess;
pub mod renderer;
pub mod template;

pub use doc::{Document, Step};
pub use error::RenderError;
pub use math::{Latex2MathMl, MathEngine, MathError};
pub use renderer::{RenderOutcome, StepRenderer, render_document};
pub use template::{TagTemplate, TemplateContext, TemplateEngine, TemplateError};
