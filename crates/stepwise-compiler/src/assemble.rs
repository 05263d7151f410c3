//! Final output assembly from the post-processed DOM.

use indexmap::IndexMap;
use kuchikikiki::NodeRef;

/// Serialize a node to its outer HTML.
#[must_use]
pub fn outer_html(node: &NodeRef) -> String {
    let mut buf = Vec::new();
    if node.serialize(&mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// The document's body content, without the html/head/body wrapper the
/// parser adds.
#[must_use]
pub fn body_html(root: &NodeRef) -> String {
    let Ok(body) = root.select_first("body") else {
        return String::new();
    };
    let mut out = String::new();
    for child in body.as_node().children() {
        out.push_str(&outer_html(&child));
    }
    out
}

/// Per-step HTML fragments keyed by step id, in document order.
#[must_use]
pub fn step_fragments(root: &NodeRef) -> IndexMap<String, String> {
    let mut fragments = IndexMap::new();
    if let Ok(matches) = root.select("x-step") {
        for step in matches {
            let id = step.attributes.borrow().get("id").map(ToOwned::to_owned);
            let Some(id) = id else {
                continue;
            };
            fragments.insert(id, outer_html(step.as_node()));
        }
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuchikikiki::traits::TendrilSink;
    use pretty_assertions::assert_eq;

    fn parse(html: &str) -> NodeRef {
        kuchikikiki::parse_html().one(html)
    }

    #[test]
    fn test_body_html_strips_wrapper() {
        let root = parse("<p>a</p><p>b</p>");
        assert_eq!(body_html(&root), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_step_fragments_keyed_and_ordered() {
        let root = parse(
            r#"<x-step id="intro"><p>a</p></x-step><x-step id="next"><p>b</p></x-step>"#,
        );
        let fragments = step_fragments(&root);
        let keys: Vec<&String> = fragments.keys().collect();
        assert_eq!(keys, ["intro", "next"]);
        assert_eq!(
            fragments["intro"],
            r#"<x-step id="intro"><p>a</p></x-step>"#
        );
    }

    #[test]
    fn test_step_without_id_skipped() {
        let root = parse("<x-step><p>a</p></x-step>");
        assert!(step_fragments(&root).is_empty());
    }
}
