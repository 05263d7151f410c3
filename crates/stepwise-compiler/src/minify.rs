//! Conservative HTML minification.
//!
//! A single scan that drops comments and collapses whitespace runs in text
//! content to one space. Tag internals (and therefore attribute values) and
//! `<pre>` content pass through untouched. The pass is idempotent.

/// Minify serialized HTML.
#[must_use]
pub fn minify(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pre_depth = 0usize;
    let mut in_tag = false;
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if !in_tag {
            if rest.starts_with("<!--") {
                i += rest.find("-->").map_or(rest.len(), |end| end + 3);
                continue;
            }
            if rest.starts_with("<pre>") || rest.starts_with("<pre ") {
                pre_depth += 1;
            } else if rest.starts_with("</pre>") {
                pre_depth = pre_depth.saturating_sub(1);
            }
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        if in_tag {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '"' || c == '\'' => quote = Some(c),
                None if c == '>' => in_tag = false,
                None => {}
            }
            out.push(c);
            i += c.len_utf8();
        } else if c == '<' {
            in_tag = true;
            out.push(c);
            i += 1;
        } else if pre_depth == 0 && c.is_ascii_whitespace() {
            // Single-byte whitespace, safe to advance bytewise.
            while i < html.len() && html.as_bytes()[i].is_ascii_whitespace() {
                i += 1;
            }
            out.push(' ');
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_comments_removed() {
        assert_eq!(minify("<p>a</p><!-- note --><p>b</p>"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(minify("<p>a\n\n   b</p>"), "<p>a b</p>");
    }

    #[test]
    fn test_attribute_values_untouched() {
        let html = r#"<x-blank-input solution="two  words"></x-blank-input>"#;
        assert_eq!(minify(html), html);
    }

    #[test]
    fn test_attribute_whitespace_kept_while_text_collapses() {
        assert_eq!(
            minify("<x-blank choices=\"a b|c  d\">pick\n\none</x-blank>"),
            "<x-blank choices=\"a b|c  d\">pick one</x-blank>"
        );
    }

    #[test]
    fn test_quoted_angle_bracket_does_not_end_tag() {
        assert_eq!(
            minify("<img alt=\"a > b\">  x"),
            "<img alt=\"a > b\"> x"
        );
    }

    #[test]
    fn test_pre_content_preserved() {
        let html = "<pre><code>a\n  b</code></pre>";
        assert_eq!(minify(html), html);
    }

    #[test]
    fn test_whitespace_after_pre_collapsed() {
        assert_eq!(
            minify("<pre>a\nb</pre>\n\n<p>c</p>"),
            "<pre>a\nb</pre> <p>c</p>"
        );
    }

    #[test]
    fn test_unterminated_comment_dropped() {
        assert_eq!(minify("<p>a</p><!-- open"), "<p>a</p>");
    }

    #[test]
    fn test_idempotent() {
        let once = minify("<p a=\"x  y\">a\n  b</p>  <!-- c -->");
        assert_eq!(minify(&once), once);
    }
}
