//! Markdown event renderer with lesson semantics.
//!
//! Drives pulldown-cmark events and reinterprets a handful of constructs:
//! links carry glossary/biography/navigation meaning, inline code is math,
//! blockquotes are front matter, horizontal rules are step boundaries, and
//! indented code blocks are templated HTML.

use std::collections::BTreeSet;
use std::fmt::Write;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::blocks;
use crate::doc::{Document, parse_meta};
use crate::error::RenderError;
use crate::inline;
use crate::math::{self, MathEngine};
use crate::preprocess;
use crate::template::{TemplateContext, TemplateEngine};

/// Everything the renderer produced for one document.
#[derive(Clone, Debug)]
pub struct RenderOutcome {
    /// Rendered HTML, with the final step element left open (the DOM stage
    /// appends the balancing close tag).
    pub html: String,
    /// Document metadata and ordered step records.
    pub doc: Document,
    /// Glossary identifiers referenced anywhere in the document.
    pub gloss: BTreeSet<String>,
    /// Biography identifiers referenced anywhere in the document.
    pub bios: BTreeSet<String>,
}

/// State of an open code block.
struct CodeBlock {
    indented: bool,
    lang: Option<String>,
    content: String,
}

/// Event-driven renderer; all state is local to one compilation call.
pub struct StepRenderer<'a> {
    engine: &'a dyn TemplateEngine,
    math: &'a dyn MathEngine,
    ctx: &'a TemplateContext,
    output: String,
    doc: Document,
    gloss: BTreeSet<String>,
    bios: BTreeSet<String>,
    /// Template fragments accumulated before the first step boundary.
    preamble: String,
    link_close: Vec<String>,
    /// Open heading: level plus content buffer.
    heading: Option<(u8, String)>,
    code: Option<CodeBlock>,
    quote_depth: usize,
    quote_buf: String,
    image_alt: Option<String>,
    pending_image: Option<(String, String)>,
}

fn heading_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn escape_text(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn escape_attr(text: &str) -> String {
    html_escape::encode_double_quoted_attribute(text).into_owned()
}

impl<'a> StepRenderer<'a> {
    #[must_use]
    pub fn new(
        engine: &'a dyn TemplateEngine,
        math: &'a dyn MathEngine,
        ctx: &'a TemplateContext,
    ) -> Self {
        Self {
            engine,
            math,
            ctx,
            output: String::with_capacity(4096),
            doc: Document::default(),
            gloss: BTreeSet::new(),
            bios: BTreeSet::new(),
            preamble: String::new(),
            link_close: Vec::new(),
            heading: None,
            code: None,
            quote_depth: 0,
            quote_buf: String::new(),
            image_alt: None,
            pending_image: None,
        }
    }

    /// Route already-rendered inline markup to the active sink.
    ///
    /// Markup never reaches the title buffer (the title is plain text) or a
    /// metadata blockquote.
    fn push_inline(&mut self, content: &str) {
        match &mut self.heading {
            Some((1, _)) => {}
            Some((_, buf)) => buf.push_str(content),
            None => {
                if self.quote_depth == 0 {
                    self.output.push_str(content);
                }
            }
        }
    }

    pub fn process_event(&mut self, event: Event<'_>) -> Result<(), RenderError> {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => {
                self.text(&text);
                Ok(())
            }
            Event::Code(code) => self.inline_code(&code),
            Event::Html(html) | Event::InlineHtml(html) => {
                if self.quote_depth == 0 {
                    self.output.push_str(&html);
                }
                Ok(())
            }
            Event::SoftBreak => {
                self.soft_break();
                Ok(())
            }
            Event::HardBreak => {
                self.push_inline("<br>");
                Ok(())
            }
            Event::Rule => {
                self.step_boundary();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) -> Result<(), RenderError> {
        match tag {
            Tag::Paragraph => {
                if self.quote_depth == 0 {
                    self.output.push_str("<p>");
                }
            }
            Tag::Heading { level, .. } => {
                self.heading = Some((heading_num(level), String::new()));
            }
            Tag::BlockQuote(_) => {
                if self.quote_depth == 0 {
                    self.quote_buf.clear();
                }
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                let (indented, lang) = match kind {
                    CodeBlockKind::Indented => (true, None),
                    CodeBlockKind::Fenced(info) => {
                        let lang = info.split_whitespace().next().unwrap_or("");
                        (false, (!lang.is_empty()).then(|| lang.to_owned()))
                    }
                };
                self.code = Some(CodeBlock {
                    indented,
                    lang,
                    content: String::new(),
                });
            }
            Tag::List(start) => match start {
                Some(1) => self.output.push_str("<ol>"),
                Some(n) => write!(self.output, r#"<ol start="{n}">"#).unwrap(),
                None => self.output.push_str("<ul>"),
            },
            Tag::Item => self.output.push_str("<li>"),
            Tag::Emphasis => self.push_inline("<em>"),
            Tag::Strong => self.push_inline("<strong>"),
            Tag::Strikethrough => self.push_inline("<s>"),
            Tag::Link { dest_url, .. } => self.link_start(&dest_url),
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image_alt = Some(String::new());
                self.pending_image = Some((dest_url.to_string(), title.to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    fn end_tag(&mut self, tag: TagEnd) -> Result<(), RenderError> {
        match tag {
            TagEnd::Paragraph => {
                if self.quote_depth == 0 {
                    self.output.push_str("</p>");
                } else {
                    self.quote_buf.push('\n');
                }
            }
            TagEnd::Heading(_) => {
                if let Some((level, buf)) = self.heading.take() {
                    if level == 1 {
                        self.doc.title = Some(buf.trim().to_owned());
                    } else {
                        write!(self.output, "<h{level}>{}</h{level}>", buf.trim()).unwrap();
                    }
                }
            }
            TagEnd::BlockQuote(_) => {
                self.quote_depth -= 1;
                if self.quote_depth == 0 {
                    let text = std::mem::take(&mut self.quote_buf);
                    let meta = parse_meta(&text)?;
                    self.doc.merge_meta(meta);
                }
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    self.code_block(code)?;
                }
            }
            TagEnd::List(ordered) => self
                .output
                .push_str(if ordered { "</ol>" } else { "</ul>" }),
            TagEnd::Item => self.output.push_str("</li>"),
            TagEnd::Emphasis => self.push_inline("</em>"),
            TagEnd::Strong => self.push_inline("</strong>"),
            TagEnd::Strikethrough => self.push_inline("</s>"),
            TagEnd::Link => {
                if let Some(close) = self.link_close.pop() {
                    self.push_inline(&close);
                }
            }
            TagEnd::Image => {
                let alt = self.image_alt.take().unwrap_or_default();
                if let Some((src, title)) = self.pending_image.take() {
                    let title_attr = if title.is_empty() {
                        String::new()
                    } else {
                        format!(r#" title="{}""#, escape_attr(&title))
                    };
                    write!(
                        self.output,
                        r#"<img src="{}"{title_attr} alt="{}">"#,
                        escape_attr(&src),
                        escape_attr(&alt)
                    )
                    .unwrap();
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// A link target decides the element: glossary and biography references,
    /// in-step navigation targets, step jumps, or plain external links.
    fn link_start(&mut self, dest_url: &str) {
        let dest = html_escape::decode_html_entities(dest_url).into_owned();
        let (open, close) = if let Some(id) = dest.strip_prefix("gloss:") {
            self.gloss.insert(id.to_owned());
            (
                format!(r#"<x-gloss xid="{}">"#, escape_attr(id)),
                "</x-gloss>",
            )
        } else if let Some(id) = dest.strip_prefix("bio:") {
            self.bios.insert(id.to_owned());
            (format!(r#"<x-bio xid="{}">"#, escape_attr(id)), "</x-bio>")
        } else if let Some(id) = dest.strip_prefix("target:") {
            (
                format!(r#"<span class="step-target" data-to="{}">"#, escape_attr(id)),
                "</span>",
            )
        } else if let Some(step) = dest.strip_prefix("->") {
            (
                format!(r#"<x-goto target="{}">"#, escape_attr(step.trim())),
                "</x-goto>",
            )
        } else {
            (
                format!(
                    r#"<a href="{}" target="_blank" rel="noopener">"#,
                    escape_attr(&dest)
                ),
                "</a>",
            )
        };
        self.push_inline(&open);
        self.link_close.push(close.to_owned());
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = &mut self.code {
            code.content.push_str(text);
        } else if let Some(alt) = &mut self.image_alt {
            alt.push_str(text);
        } else if self.quote_depth > 0 {
            self.quote_buf.push_str(text);
        } else if let Some((level, buf)) = &mut self.heading {
            if *level == 1 {
                buf.push_str(text);
            } else {
                buf.push_str(&escape_text(text));
            }
        } else {
            let escaped = escape_text(text);
            self.output.push_str(&inline::expand(&escaped));
        }
    }

    /// Inline code is math notation: decode entities, convert, polish.
    fn inline_code(&mut self, code: &str) -> Result<(), RenderError> {
        if self.quote_depth > 0 {
            self.quote_buf.push_str(code);
            return Ok(());
        }
        if let Some((1, buf)) = &mut self.heading {
            buf.push_str(code);
            return Ok(());
        }
        let decoded = html_escape::decode_html_entities(code).into_owned();
        let markup = self.math.render_bare(&decoded)?;
        let html = format!(r#"<span class="math">{}</span>"#, math::polish(&markup));
        self.push_inline(&html);
        Ok(())
    }

    fn soft_break(&mut self) {
        if self.quote_depth > 0 {
            self.quote_buf.push('\n');
        } else if let Some((_, buf)) = &mut self.heading {
            buf.push(' ');
        } else {
            self.output.push('\n');
        }
    }

    /// A horizontal rule starts a new step. The close tag is omitted before
    /// the very first step since nothing precedes it. A rule inside a
    /// metadata blockquote is not a boundary.
    fn step_boundary(&mut self) {
        if self.quote_depth > 0 {
            return;
        }
        if !self.doc.steps.is_empty() {
            self.output.push_str("</x-step>");
        }
        self.output.push_str("<x-step>");
        self.doc.push_step();
    }

    /// Indented blocks are templated HTML; before the first step boundary
    /// they only feed the shared template preamble.
    fn code_block(&mut self, code: CodeBlock) -> Result<(), RenderError> {
        if code.indented {
            if self.doc.steps.is_empty() {
                self.preamble.push_str(&code.content);
                self.preamble.push('\n');
            } else {
                let source = format!("{}\n{}", self.preamble, code.content);
                let html = self.engine.render(&source, self.ctx)?;
                self.output.push_str(&html);
            }
        } else if let Some(lang) = code.lang {
            write!(
                self.output,
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                escape_attr(&lang),
                escape_text(&code.content)
            )
            .unwrap();
        } else {
            write!(
                self.output,
                "<pre><code>{}</code></pre>",
                escape_text(&code.content)
            )
            .unwrap();
        }
        Ok(())
    }

    /// Finish rendering and hand back the accumulated outcome.
    #[must_use]
    pub fn finish(self) -> RenderOutcome {
        RenderOutcome {
            html: self.output,
            doc: self.doc,
            gloss: self.gloss,
            bios: self.bios,
        }
    }
}

/// Render one preprocessed-and-tokenized lesson document.
///
/// Runs the text preprocessor, the block-structure parser, and the markdown
/// event loop. The returned HTML still carries an unbalanced final step
/// element; the DOM post-processing stage closes it.
pub fn render_document(
    doc_id: &str,
    source: &str,
    engine: &dyn TemplateEngine,
    math: &dyn MathEngine,
    ctx: &TemplateContext,
) -> Result<RenderOutcome, RenderError> {
    let rewritten = preprocess::rewrite(source, doc_id);
    let expanded = blocks::expand(&rewritten, engine, ctx)?;
    tracing::debug!(doc_id, bytes = expanded.len(), "rendering lesson source");

    let parser = Parser::new_ext(&expanded, Options::ENABLE_STRIKETHROUGH);
    let mut renderer = StepRenderer::new(engine, math, ctx);
    for event in parser {
        renderer.process_event(event)?;
    }
    let outcome = renderer.finish();
    tracing::debug!(
        steps = outcome.doc.steps.len(),
        gloss = outcome.gloss.len(),
        bios = outcome.bios.len(),
        "rendered lesson"
    );
    Ok(outcome)
}
