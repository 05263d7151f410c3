//! Block-structure parser.
//!
//! A line-oriented stack machine that rewrites `::: ` markers into templated
//! HTML open/close tags. Content between markers stays untouched and keeps
//! its markdown semantics inside the opened tag.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RenderError;
use crate::template::{TemplateContext, TemplateEngine};

/// Numeric `width` attribute inside a column specifier.
static WIDTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"width\s*[=:]\s*"?(\d+)"#).unwrap());

/// Kind of open container on the nesting stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BlockKind {
    /// A templated tag opened from an arbitrary specifier.
    Anonymous,
    /// A `<div class="row">` wrapping one or more columns.
    ColumnGroup,
    /// A `<div class="tabs">` wrapping one or more tab panes.
    TabGroup,
}

/// One open block: its kind plus the exact text that closes it.
#[derive(Clone, Debug)]
struct OpenBlock {
    kind: BlockKind,
    close: String,
}

/// Tracks ``` and ~~~ fences so markers inside code blocks pass through
/// verbatim. A fence closes only on the same delimiter with at least the
/// opening run length.
#[derive(Debug, Default)]
struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    fn update(&mut self, line: &str) {
        let trimmed = line.trim_start();
        let delim = match trimmed.chars().next() {
            Some(c @ ('`' | '~')) => c,
            _ => return,
        };
        let run = trimmed.chars().take_while(|&c| c == delim).count();
        if run < 3 {
            return;
        }
        match self.open {
            None => self.open = Some((delim, run)),
            Some((open_delim, open_run)) if delim == open_delim && run >= open_run => {
                self.open = None;
            }
            Some(_) => {}
        }
    }

    fn in_fence(&self) -> bool {
        self.open.is_some()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Does the specifier start with `word` as a whole keyword?
///
/// `column width=200` and `column(width=320)` match `column`; `columns`
/// does not, and `table` does not match `tab`.
fn has_keyword(spec: &str, word: &str) -> bool {
    spec.strip_prefix(word)
        .is_some_and(|rest| !rest.chars().next().is_some_and(is_name_char))
}

/// Expand block markers in the preprocessed source.
///
/// Returns the source with every marker line replaced by open/close tag text.
/// Fails with [`RenderError::Structure`] on a close marker with nothing open,
/// or when blocks remain open at end of input.
pub fn expand(
    source: &str,
    engine: &dyn TemplateEngine,
    ctx: &TemplateContext,
) -> Result<String, RenderError> {
    let mut output = String::with_capacity(source.len());
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut fence = FenceTracker::default();

    for (idx, line) in source.lines().enumerate() {
        let line_num = idx + 1;
        fence.update(line);

        let marker = if fence.in_fence() {
            None
        } else {
            line.trim_start().strip_prefix(":::")
        };
        match marker {
            Some(spec) => {
                let spec = spec.trim();
                if spec.is_empty() {
                    let block = stack.pop().ok_or_else(|| {
                        RenderError::Structure(format!(
                            "line {line_num}: close marker with no open block"
                        ))
                    })?;
                    output.push('\n');
                    output.push_str(&block.close);
                } else if has_keyword(spec, "column") {
                    open_grouped(
                        &mut output,
                        &mut stack,
                        BlockKind::ColumnGroup,
                        r#"<div class="row">"#,
                        &column_open(&spec["column".len()..]),
                    );
                } else if has_keyword(spec, "tab") {
                    open_grouped(
                        &mut output,
                        &mut stack,
                        BlockKind::TabGroup,
                        r#"<div class="tabs">"#,
                        r#"<div class="tab">"#,
                    );
                } else {
                    let (open, close) = engine.render_tag(spec, ctx)?;
                    stack.push(OpenBlock {
                        kind: BlockKind::Anonymous,
                        close,
                    });
                    output.push_str(&open);
                    output.push('\n');
                }
            }
            None => output.push_str(line),
        }
        output.push('\n');
    }

    if let Some(block) = stack.last() {
        return Err(RenderError::Structure(format!(
            "unclosed block at end of input (expected `{}`)",
            block.close
        )));
    }
    Ok(output)
}

/// Open a pane in a column/tab group, continuing the group when the innermost
/// open block already is one of the same kind.
fn open_grouped(
    output: &mut String,
    stack: &mut Vec<OpenBlock>,
    kind: BlockKind,
    wrapper_open: &str,
    pane_open: &str,
) {
    if stack.last().is_some_and(|b| b.kind == kind) {
        // Close the previous pane, stay inside the same wrapper.
        output.push_str("</div>\n");
        output.push_str(pane_open);
    } else {
        stack.push(OpenBlock {
            kind,
            // Pane plus wrapper close in one compound unit.
            close: "</div></div>".to_owned(),
        });
        output.push_str(wrapper_open);
        output.push('\n');
        output.push_str(pane_open);
    }
    output.push('\n');
}

/// Build a column open tag, turning a numeric `width` attribute into an
/// inline style.
fn column_open(rest: &str) -> String {
    match WIDTH_RE.captures(rest) {
        Some(caps) => format!(r#"<div class="column" style="width: {}px">"#, &caps[1]),
        None => r#"<div class="column">"#.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TagTemplate;
    use pretty_assertions::assert_eq;

    fn expand_str(source: &str) -> Result<String, RenderError> {
        expand(source, &TagTemplate, &TemplateContext::new("."))
    }

    #[test]
    fn test_plain_lines_pass_through() {
        let out = expand_str("Hello\n\nWorld").unwrap();
        assert_eq!(out, "Hello\n\nWorld\n");
    }

    #[test]
    fn test_anonymous_block_renders_through_template() {
        let out = expand_str("::: x-quiz(data-marks=2)\ncontent\n:::").unwrap();
        assert!(out.contains(r#"<x-quiz data-marks="2">"#));
        assert!(out.contains("content"));
        assert!(out.contains("</x-quiz>"));
    }

    #[test]
    fn test_close_without_open_fails() {
        let err = expand_str("text\n:::").unwrap_err();
        assert!(matches!(err, RenderError::Structure(msg) if msg.contains("line 2")));
    }

    #[test]
    fn test_unclosed_block_fails() {
        let err = expand_str("::: x-quiz\ncontent").unwrap_err();
        assert!(matches!(err, RenderError::Structure(msg) if msg.contains("unclosed")));
    }

    #[test]
    fn test_two_columns_share_one_row() {
        let out = expand_str(
            "::: column width=200\nleft\n::: column width=200\nright\n:::",
        )
        .unwrap();
        assert_eq!(out.matches(r#"<div class="row">"#).count(), 1);
        assert_eq!(
            out.matches(r#"<div class="column" style="width: 200px">"#)
                .count(),
            2
        );
        // One pane close between columns, one compound close at the end.
        assert_eq!(out.matches("</div>").count(), 3);
    }

    #[test]
    fn test_column_without_width() {
        let out = expand_str("::: column\nbody\n:::").unwrap();
        assert!(out.contains(r#"<div class="column">"#));
    }

    #[test]
    fn test_column_width_paren_syntax() {
        let out = expand_str("::: column(width=320)\nbody\n:::").unwrap();
        assert!(out.contains(r#"style="width: 320px""#));
    }

    #[test]
    fn test_tabs_share_one_wrapper() {
        let out = expand_str("::: tab\none\n::: tab\ntwo\n:::").unwrap();
        assert_eq!(out.matches(r#"<div class="tabs">"#).count(), 1);
        assert_eq!(out.matches(r#"<div class="tab">"#).count(), 2);
    }

    #[test]
    fn test_nested_blocks_unwind_in_order() {
        let out = expand_str("::: x-outer\n::: x-inner\nbody\n:::\n:::").unwrap();
        let inner_close = out.find("</x-inner>").unwrap();
        let outer_close = out.find("</x-outer>").unwrap();
        assert!(inner_close < outer_close);
    }

    #[test]
    fn test_markers_inside_code_fence_ignored() {
        let out = expand_str("```\n::: not-a-block\n```").unwrap();
        assert!(out.contains("::: not-a-block"));
    }

    #[test]
    fn test_markers_inside_tilde_fence_ignored() {
        let out = expand_str("~~~\n::: not-a-block\n~~~").unwrap();
        assert!(out.contains("::: not-a-block"));
    }

    #[test]
    fn test_fence_close_requires_matching_length() {
        let out = expand_str("````\n```\n::: still-fenced\n````").unwrap();
        assert!(out.contains("::: still-fenced"));
    }

    #[test]
    fn test_backtick_fence_inside_tilde_fence_ignored() {
        let out = expand_str("~~~\n```\n::: still-fenced\n~~~").unwrap();
        assert!(out.contains("::: still-fenced"));
    }

    #[test]
    fn test_table_specifier_is_not_a_tab_group() {
        let out = expand_str("::: table(border=1)\ncell\n:::").unwrap();
        assert!(out.contains(r#"<table border="1">"#));
        assert!(out.contains("</table>"));
        assert!(!out.contains(r#"class="tabs""#));
    }

    #[test]
    fn test_columns_specifier_is_not_a_column_group() {
        let out = expand_str("::: columns\nbody\n:::").unwrap();
        assert!(out.contains("<columns>"));
        assert!(!out.contains(r#"class="row""#));
    }

    #[test]
    fn test_malformed_tag_specifier_fails() {
        let err = expand_str("::: x-quiz(open\n:::").unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }
}
