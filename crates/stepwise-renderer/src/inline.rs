//! Inline extensions applied to markdown text runs.
//!
//! Each extension is an independent rewrite rule; the rules run in a fixed
//! order so that bound variables are consumed before plain variables.
//! Input text is already HTML-escaped by the renderer.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `[[solution]]` or `[[choice|choice|...]]` fill-in-blank markers.
static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap());

/// `${expr}{name}` bound-variable markers.
static BOUND_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}\{([^{}]+)\}").unwrap());

/// `${expr}` plain variable markers.
static VAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}").unwrap());

/// `:shortcode:` emoji names.
static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":([a-z0-9_+-]+):").unwrap());

/// Quote-escape a value that goes into a double-quoted attribute.
/// Text is already entity-escaped, only quotes remain.
fn attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// Expand all inline extensions in one text run.
#[must_use]
pub fn expand(text: &str) -> String {
    let out = replace_blanks(text);
    let out = replace_bound_vars(&out);
    let out = replace_vars(&out);
    replace_emoji(&out)
}

/// `[[a|b|c]]` becomes a multiple-choice blank, `[[x]]` a free-text blank.
fn replace_blanks(text: &str) -> String {
    BLANK_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let body = &caps[1];
            if body.contains('|') {
                format!(r#"<x-blank choices="{}"></x-blank>"#, attr(body))
            } else {
                format!(r#"<x-blank-input solution="{}"></x-blank-input>"#, attr(body))
            }
        })
        .into_owned()
}

/// `${expr}{name}` becomes a variable-binding element displaying the bare
/// expression, so the plain-variable rule below cannot re-match it.
fn replace_bound_vars(text: &str) -> String {
    BOUND_VAR_RE
        .replace_all(text, |caps: &Captures<'_>| {
            format!(r#"<x-var bind="{}">{}</x-var>"#, attr(&caps[2]), &caps[1])
        })
        .into_owned()
}

/// `${expr}` becomes a styled span displaying the expression.
fn replace_vars(text: &str) -> String {
    VAR_RE
        .replace_all(text, r#"<span class="var">$1</span>"#)
        .into_owned()
}

/// `:name:` shorthands become inline emoji images with a codepoint-derived
/// asset path. Unknown names pass through unchanged.
fn replace_emoji(text: &str) -> String {
    EMOJI_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let Some(emoji) = emojis::get_by_shortcode(&caps[1]) else {
                return caps[0].to_owned();
            };
            let mut codepoints = String::new();
            for (i, c) in emoji.as_str().chars().enumerate() {
                if i > 0 {
                    codepoints.push('-');
                }
                write!(codepoints, "{:x}", u32::from(c)).unwrap();
            }
            format!(
                r#"<img class="emoji" width="20" height="20" src="/images/emoji/{codepoints}.png" alt="{}">"#,
                attr(emoji.name())
            )
        })
        .into_owned()
}
