//! Math-notation conversion for inline code spans.
//!
//! Inline code in lesson source is math, not code. The [`MathEngine`] trait is
//! the conversion seam; [`Latex2MathMl`] is the built-in backend. Converted
//! markup then goes through a fixed set of presentation fix-up passes.

use std::sync::LazyLock;

use regex::Regex;

/// Error from the math-markup converter.
#[derive(Debug, thiserror::Error)]
#[error("math expression: {0}")]
pub struct MathError(pub String);

/// Converts a math expression string to markup.
pub trait MathEngine: Send + Sync {
    /// Convert in "bare" mode: inline display, no block chrome.
    fn render_bare(&self, expr: &str) -> Result<String, MathError>;
}

/// MathML backend based on the `latex2mathml` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct Latex2MathMl;

impl MathEngine for Latex2MathMl {
    fn render_bare(&self, expr: &str) -> Result<String, MathError> {
        latex2mathml::latex_to_mathml(expr, latex2mathml::DisplayStyle::Inline)
            .map_err(|e| MathError(e.to_string()))
    }
}

/// Hyphen-minus operators rendered with the true minus glyph.
static MINUS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("<mo>-</mo>").unwrap());

/// Stray accent operators produced for bare apostrophes/backticks.
static ACCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("<mo>[\u{02CA}\u{02CB}\u{00B4}\u{0060}]</mo>").unwrap());

/// Spacing inserted before prime marks collapses away.
static PRIME_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<mspace[^>]*/>\s*(<mo>\u{2032}</mo>)").unwrap());

/// Single-character operators get an explicit `value` attribute.
static MO_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new("<mo>([^<&])</mo>").unwrap());

/// Apply presentation fix-ups to converted math markup.
#[must_use]
pub fn polish(markup: &str) -> String {
    let out = MINUS_RE.replace_all(markup, "<mo>\u{2212}</mo>");
    let out = ACCENT_RE.replace_all(&out, "");
    let out = PRIME_SPACE_RE.replace_all(&out, "$1");
    MO_VALUE_RE
        .replace_all(&out, r#"<mo value="$1">$1</mo>"#)
        .into_owned()
}
