//! Source-level text rewrites applied before tokenization.
//!
//! Each rewrite is an independent rule; rules run in a fixed order and leave
//! unmatched text untouched.

use std::sync::LazyLock;

use regex::Regex;

/// Relative image references in inline CSS and raw HTML attributes.
static IMAGE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(url\(|src="|href="|background=")images/"#).unwrap()
});

/// Bare timing/animation attributes that the HTML stage would reject.
/// The leading character class keeps already-prefixed `data-when=` intact.
static BARE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w-])(when|delay|animation)=").unwrap());

/// Rewrite raw lesson source before it reaches the block parser.
///
/// 1. `images/...` references become absolute paths under the document's
///    resource namespace.
/// 2. `when=`/`delay=`/`animation=` are renamed to their `data-` form so the
///    markdown-to-HTML step does not see unrecognized raw attributes.
#[must_use]
pub fn rewrite(source: &str, doc_id: &str) -> String {
    let with_paths =
        IMAGE_REF_RE.replace_all(source, format!("${{1}}/resources/{doc_id}/images/"));
    BARE_ATTR_RE
        .replace_all(&with_paths, "${1}data-${2}=")
        .into_owned()
}
