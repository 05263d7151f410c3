//! Templated-HTML evaluation.
//!
//! Block markers, indented template blocks, and attribute brace-groups are all
//! written in a compact tag dialect (`tag#id.class(attr="value") text`). The
//! [`TemplateEngine`] trait is the seam the pipeline talks to; [`TagTemplate`]
//! is the built-in evaluator.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Per-call configuration handed to the template engine.
#[derive(Clone, Debug)]
pub struct TemplateContext {
    /// Directory the lesson source was loaded from.
    pub base_dir: PathBuf,
}

impl TemplateContext {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Error type for template evaluation.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Syntactically invalid template source.
    #[error("template line {line}: {message}")]
    Parse { line: usize, message: String },

    /// A `+name(...)` call with no matching `mixin name(...)` definition.
    #[error("unknown mixin `{0}`")]
    UnknownMixin(String),
}

impl TemplateError {
    fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Evaluates template-language text to HTML.
///
/// Implementations must be stateless across calls; all per-call state travels
/// in the source text and [`TemplateContext`].
pub trait TemplateEngine: Send + Sync {
    /// Render a template block (possibly multi-line, indentation-nested).
    fn render(&self, source: &str, ctx: &TemplateContext) -> Result<String, TemplateError>;

    /// Synthesize an open/close tag pair from a single tag specifier.
    ///
    /// The open half includes any inline text from the specifier.
    fn render_tag(
        &self,
        spec: &str,
        ctx: &TemplateContext,
    ) -> Result<(String, String), TemplateError>;
}

/// HTML void elements that never receive a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Built-in evaluator for the tag dialect.
///
/// Supported syntax:
/// - `tag#id.class1.class2(attr="v", n=3, flag) inline text`
/// - a specifier starting with `.`, `#` or `(` defaults the tag to `div`
/// - indentation nesting (children indented deeper than their parent)
/// - `| text` literal text lines, `<...` raw HTML lines
/// - `mixin name(a, b)` definitions with `#{a}` interpolation, called as
///   `+name("x", 2)`
#[derive(Clone, Copy, Debug, Default)]
pub struct TagTemplate;

impl TemplateEngine for TagTemplate {
    fn render(&self, source: &str, _ctx: &TemplateContext) -> Result<String, TemplateError> {
        let (mixins, lines) = collect_mixins(source)?;
        render_lines(&lines, &mixins)
    }

    fn render_tag(
        &self,
        spec: &str,
        _ctx: &TemplateContext,
    ) -> Result<(String, String), TemplateError> {
        let tag = parse_tag_spec(spec.trim(), 1)?;
        let mut open = tag.open_tag();
        if !tag.text.is_empty() {
            open.push_str(&escape_text(&tag.text));
        }
        let close = if tag.is_void() {
            String::new()
        } else {
            format!("</{}>", tag.name)
        };
        Ok((open, close))
    }
}

/// One line of template source, with its indent depth resolved.
#[derive(Clone, Debug)]
struct SourceLine {
    number: usize,
    indent: usize,
    content: String,
}

/// A parsed `mixin name(params)` definition.
#[derive(Clone, Debug)]
struct Mixin {
    params: Vec<String>,
    body: Vec<SourceLine>,
}

/// A parsed tag specifier.
#[derive(Clone, Debug)]
struct TagSpec {
    name: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
    text: String,
}

impl TagSpec {
    fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    fn open_tag(&self) -> String {
        let mut out = String::with_capacity(16);
        out.push('<');
        out.push_str(&self.name);
        if let Some(id) = &self.id {
            write!(out, r#" id="{}""#, escape_attr(id)).unwrap();
        }
        if !self.classes.is_empty() {
            write!(out, r#" class="{}""#, escape_attr(&self.classes.join(" "))).unwrap();
        }
        for (key, value) in &self.attrs {
            match value {
                Some(value) => write!(out, r#" {key}="{}""#, escape_attr(value)).unwrap(),
                None => write!(out, " {key}").unwrap(),
            }
        }
        out.push('>');
        out
    }
}

fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

fn escape_text(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 2 } else { 1 })
        .sum()
}

/// Split mixin definitions out of the source, returning them alongside the
/// remaining renderable lines.
fn collect_mixins(source: &str) -> Result<(HashMap<String, Mixin>, Vec<SourceLine>), TemplateError> {
    let mut mixins = HashMap::new();
    let mut lines = Vec::new();
    let mut pending: Option<(String, Mixin, usize)> = None;

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let indent = indent_of(raw);
        let content = raw.trim().to_owned();

        if let Some((name, mixin, def_indent)) = &mut pending {
            if indent > *def_indent {
                mixin.body.push(SourceLine {
                    number,
                    indent: indent - *def_indent - 1,
                    content,
                });
                continue;
            }
            let (name, mixin) = (name.clone(), mixin.clone());
            mixins.insert(name, mixin);
            pending = None;
        }

        if let Some(rest) = content.strip_prefix("mixin ") {
            let (name, params) = parse_mixin_header(rest, number)?;
            pending = Some((
                name,
                Mixin {
                    params,
                    body: Vec::new(),
                },
                indent,
            ));
        } else {
            lines.push(SourceLine {
                number,
                indent,
                content,
            });
        }
    }
    if let Some((name, mixin, _)) = pending {
        mixins.insert(name, mixin);
    }
    Ok((mixins, lines))
}

fn parse_mixin_header(rest: &str, line: usize) -> Result<(String, Vec<String>), TemplateError> {
    let rest = rest.trim();
    let (name, params) = match rest.find('(') {
        Some(open) => {
            let close = rest
                .rfind(')')
                .ok_or_else(|| TemplateError::parse(line, "unclosed mixin parameter list"))?;
            let params = rest[open + 1..close]
                .split(',')
                .map(|p| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .collect();
            (rest[..open].trim().to_owned(), params)
        }
        None => (rest.to_owned(), Vec::new()),
    };
    if name.is_empty() {
        return Err(TemplateError::parse(line, "mixin without a name"));
    }
    Ok((name, params))
}

fn render_lines(
    lines: &[SourceLine],
    mixins: &HashMap<String, Mixin>,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    // Stack of (indent, close tag) for open elements.
    let mut open: Vec<(usize, String)> = Vec::new();

    for line in lines {
        while open.last().is_some_and(|(indent, _)| line.indent <= *indent) {
            if let Some((_, close)) = open.pop() {
                out.push_str(&close);
            }
        }

        if let Some(text) = line.content.strip_prefix('|') {
            out.push_str(&escape_text(text.trim_start()));
        } else if line.content.starts_with('<') {
            out.push_str(&line.content);
        } else if let Some(call) = line.content.strip_prefix('+') {
            out.push_str(&render_mixin_call(call, line.number, mixins)?);
        } else {
            let tag = parse_tag_spec(&line.content, line.number)?;
            out.push_str(&tag.open_tag());
            if !tag.text.is_empty() {
                out.push_str(&escape_text(&tag.text));
            }
            if !tag.is_void() {
                open.push((line.indent, format!("</{}>", tag.name)));
            }
        }
    }
    while let Some((_, close)) = open.pop() {
        out.push_str(&close);
    }
    Ok(out)
}

fn render_mixin_call(
    call: &str,
    line: usize,
    mixins: &HashMap<String, Mixin>,
) -> Result<String, TemplateError> {
    let call = call.trim();
    let (name, args) = match call.find('(') {
        Some(open) => {
            let close = call
                .rfind(')')
                .ok_or_else(|| TemplateError::parse(line, "unclosed mixin argument list"))?;
            (call[..open].trim(), parse_call_args(&call[open + 1..close]))
        }
        None => (call, Vec::new()),
    };
    let mixin = mixins
        .get(name)
        .ok_or_else(|| TemplateError::UnknownMixin(name.to_owned()))?;

    let body: Vec<SourceLine> = mixin
        .body
        .iter()
        .map(|body_line| {
            let mut content = body_line.content.clone();
            for (param, arg) in mixin.params.iter().zip(&args) {
                content = content.replace(&format!("#{{{param}}}"), arg);
            }
            SourceLine {
                number: line,
                indent: body_line.indent,
                content,
            }
        })
        .collect();
    render_lines(&body, mixins)
}

/// Split a mixin argument list on top-level commas, unquoting string literals.
fn parse_call_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in args.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => quote = Some(c),
                ',' => {
                    out.push(current.trim().to_owned());
                    current = String::new();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() || !out.is_empty() {
        out.push(current.trim().to_owned());
    }
    out
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_tag_spec(spec: &str, line: usize) -> Result<TagSpec, TemplateError> {
    let mut chars = spec.char_indices().peekable();
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if is_name_char(c) {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }

    let mut tag = TagSpec {
        name: if name.is_empty() { "div".to_owned() } else { name },
        id: None,
        classes: Vec::new(),
        attrs: Vec::new(),
        text: String::new(),
    };

    while let Some(&(idx, c)) = chars.peek() {
        match c {
            '.' | '#' => {
                chars.next();
                let mut word = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if is_name_char(n) {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if word.is_empty() {
                    return Err(TemplateError::parse(line, format!("empty `{c}` selector")));
                }
                if c == '.' {
                    tag.classes.push(word);
                } else {
                    tag.id = Some(word);
                }
            }
            '(' => {
                chars.next();
                let rest = &spec[idx + 1..];
                let close = find_attr_close(rest)
                    .ok_or_else(|| TemplateError::parse(line, "unclosed attribute list"))?;
                parse_attrs(&rest[..close], &mut tag.attrs);
                // Skip past the attribute list and its closing paren.
                while let Some(&(i, _)) = chars.peek() {
                    if i <= idx + close {
                        chars.next();
                    } else {
                        break;
                    }
                }
                chars.next();
            }
            ' ' | '\t' => {
                tag.text = spec[idx..].trim().to_owned();
                break;
            }
            _ => {
                return Err(TemplateError::parse(
                    line,
                    format!("unexpected `{c}` in tag specifier"),
                ));
            }
        }
    }
    Ok(tag)
}

/// Index of the closing paren of an attribute list, honoring quotes.
fn find_attr_close(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                ')' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

/// Parse `key="value" key=3 flag` pairs, comma or space separated.
fn parse_attrs(list: &str, out: &mut Vec<(String, Option<String>)>) {
    let mut chars = list.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(' ' | '\t' | ',')) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if is_name_char(c) || c == ':' {
                key.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if key.is_empty() {
            break;
        }
        if chars.peek() == Some(&'=') {
            chars.next();
            let value = match chars.peek() {
                Some(&q @ ('"' | '\'')) => {
                    chars.next();
                    let mut value = String::new();
                    for c in chars.by_ref() {
                        if c == q {
                            break;
                        }
                        value.push(c);
                    }
                    value
                }
                _ => {
                    let mut value = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == ' ' || c == '\t' || c == ',' {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                    value
                }
            };
            out.push((key, Some(value)));
        } else {
            out.push((key, None));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> TemplateContext {
        TemplateContext::new(".")
    }

    fn render(source: &str) -> String {
        TagTemplate.render(source, &ctx()).unwrap()
    }

    #[test]
    fn test_render_tag_plain() {
        let (open, close) = TagTemplate.render_tag("quiz", &ctx()).unwrap();
        assert_eq!(open, "<quiz>");
        assert_eq!(close, "</quiz>");
    }

    #[test]
    fn test_render_tag_with_id_classes_attrs() {
        let (open, close) = TagTemplate
            .render_tag(r#"x-quiz#q1.wide.boxed(data-marks=3)"#, &ctx())
            .unwrap();
        assert_eq!(
            open,
            r#"<x-quiz id="q1" class="wide boxed" data-marks="3">"#
        );
        assert_eq!(close, "</x-quiz>");
    }

    #[test]
    fn test_render_tag_defaults_to_div() {
        let (open, close) = TagTemplate.render_tag(".red#box", &ctx()).unwrap();
        assert_eq!(open, r#"<div id="box" class="red">"#);
        assert_eq!(close, "</div>");
    }

    #[test]
    fn test_render_tag_inline_text() {
        let (open, _) = TagTemplate.render_tag("button.next Continue", &ctx()).unwrap();
        assert_eq!(open, r#"<button class="next">Continue"#);
    }

    #[test]
    fn test_render_tag_void_element() {
        let (open, close) = TagTemplate.render_tag(r#"img(src="x.png")"#, &ctx()).unwrap();
        assert_eq!(open, r#"<img src="x.png">"#);
        assert_eq!(close, "");
    }

    #[test]
    fn test_render_tag_unclosed_attrs_fails() {
        let err = TagTemplate.render_tag("div(width=3", &ctx()).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_render_nested_block() {
        let out = render("div.outer\n  p.inner Hello\n  p Bye");
        assert_eq!(
            out,
            r#"<div class="outer"><p class="inner">Hello</p><p>Bye</p></div>"#
        );
    }

    #[test]
    fn test_render_text_and_raw_lines() {
        let out = render("div\n  | plain & text\n  <hr>");
        assert_eq!(out, "<div>plain &amp; text<hr></div>");
    }

    #[test]
    fn test_render_boolean_attribute() {
        let out = render("input(type=\"checkbox\" checked)");
        assert_eq!(out, r#"<input type="checkbox" checked>"#);
    }

    #[test]
    fn test_attr_value_with_spaces() {
        let out = render(r#"div(title="two words")"#);
        assert_eq!(out, r#"<div title="two words">"#.to_owned() + "</div>");
    }

    #[test]
    fn test_mixin_definition_and_call() {
        let source = "mixin badge(label)\n  span.badge #{label}\n+badge(\"New\")";
        assert_eq!(render(source), r#"<span class="badge">New</span>"#);
    }

    #[test]
    fn test_mixin_produces_no_output_without_call() {
        let source = "mixin badge(label)\n  span.badge #{label}";
        assert_eq!(render(source), "");
    }

    #[test]
    fn test_unknown_mixin_fails() {
        let err = TagTemplate.render("+nope", &ctx()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownMixin(name) if name == "nope"));
    }

    #[test]
    fn test_attr_value_escaped() {
        let out = render(r#"div(title="a<b")"#);
        assert!(out.contains("a&lt;b"));
    }
}
