//! Lesson compiler.
//!
//! Drives the full pipeline for one document: markdown rendering (in the
//! renderer crate), DOM post-processing, and output assembly. The result is
//! minified body HTML, per-step fragments, the step/metadata records, and the
//! sets of glossary and biography identifiers the document references.

pub mod assemble;
pub mod dom;
pub mod error;
pub mod minify;

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use kuchikikiki::traits::TendrilSink;
use stepwise_renderer::{
    Document, Latex2MathMl, MathEngine, TagTemplate, TemplateContext, TemplateEngine,
    render_document,
};

pub use error::CompileError;

/// Everything produced for one compiled document.
#[derive(Clone, Debug)]
pub struct CompileResult {
    /// Minified body HTML for the whole document.
    pub html: String,
    /// Document metadata and ordered step records.
    pub data: Document,
    /// Glossary identifiers referenced in the document.
    pub gloss: BTreeSet<String>,
    /// Biography identifiers referenced in the document.
    pub bios: BTreeSet<String>,
    /// Per-step HTML fragments keyed by step id, in document order.
    pub steps: IndexMap<String, String>,
}

/// Compile one lesson document with the built-in template and math engines.
pub fn compile(doc_id: &str, source: &str, source_dir: &Path) -> Result<CompileResult, CompileError> {
    let ctx = TemplateContext::new(source_dir);
    compile_with(doc_id, source, &TagTemplate, &Latex2MathMl, &ctx)
}

/// Compile one lesson document with injected engines.
///
/// All state is local to this call; compiling different documents from
/// different threads is safe.
pub fn compile_with(
    doc_id: &str,
    source: &str,
    engine: &dyn TemplateEngine,
    math: &dyn MathEngine,
    ctx: &TemplateContext,
) -> Result<CompileResult, CompileError> {
    let outcome = render_document(doc_id, source, engine, math, ctx)?;
    let mut doc = outcome.doc;
    let mut html = outcome.html;
    // The renderer leaves the last step element open.
    if !doc.steps.is_empty() {
        html.push_str("</x-step>");
    }

    let root = kuchikikiki::parse_html().one(html);
    dom::expand_attribute_blocks(&root, engine, ctx)?;
    dom::hoist_parent_classes(&root);
    dom::assign_step_attributes(&root, &mut doc);

    let mut steps = assemble::step_fragments(&root);
    for fragment in steps.values_mut() {
        *fragment = minify::minify(fragment);
    }
    let html = minify::minify(&assemble::body_html(&root));
    tracing::debug!(doc_id, steps = steps.len(), bytes = html.len(), "compiled lesson");

    Ok(CompileResult {
        html,
        data: doc,
        gloss: outcome.gloss,
        bios: outcome.bios,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile_str(source: &str) -> CompileResult {
        compile("course", source, Path::new(".")).unwrap()
    }

    #[test]
    fn test_full_document() {
        let source = "\
# Circles

> color: teal

---

> id: intro
> goals: circle-def

A [circle](gloss:circle) is round.

---

The [inventor](bio:euclid) knew that too.
";
        let result = compile_str(source);
        assert_eq!(result.data.title.as_deref(), Some("Circles"));
        assert_eq!(
            result.data.extra.get("color"),
            Some(&serde_json::Value::from("teal"))
        );
        assert_eq!(result.data.steps.len(), 2);
        assert_eq!(result.data.steps[0].id.as_deref(), Some("intro"));
        assert_eq!(result.data.steps[1].id.as_deref(), Some("step-1"));
        assert!(result.gloss.contains("circle"));
        assert!(result.bios.contains("euclid"));

        let keys: Vec<&String> = result.steps.keys().collect();
        assert_eq!(keys, ["intro", "step-1"]);
        assert!(result.steps["intro"].contains(r#"goals="circle-def""#));
        assert!(result.html.contains(r#"<x-step goals="circle-def" id="intro">"#));
    }

    #[test]
    fn test_step_elements_balanced() {
        let result = compile_str("---\n\none\n\n---\n\ntwo");
        assert_eq!(result.html.matches("<x-step").count(), 2);
        assert_eq!(result.html.matches("</x-step>").count(), 2);
    }

    #[test]
    fn test_title_only_document() {
        let result = compile_str("# Just a Title");
        assert_eq!(result.data.title.as_deref(), Some("Just a Title"));
        assert!(result.data.steps.is_empty());
        assert!(result.steps.is_empty());
        assert!(!result.html.contains("<x-step"));
    }

    #[test]
    fn test_attribute_block_applied_through_pipeline() {
        let result = compile_str("---\n\n{.theorem} Every circle is round.");
        assert!(result.html.contains(r#"<p class="theorem">"#));
    }

    #[test]
    fn test_step_class_from_front_matter() {
        let result = compile_str("---\n\n> class: wide\n\ncontent");
        assert!(result.html.contains(r#"class="wide""#));
    }

    #[test]
    fn test_structure_error_propagates() {
        let err = compile("course", ":::\n", Path::new(".")).unwrap_err();
        assert!(matches!(err, CompileError::Render(_)));
    }

    #[test]
    fn test_output_is_minified() {
        let result = compile_str("---\n\nfirst\n\n\nsecond");
        assert!(!result.html.contains("\n\n"));
    }

    #[test]
    fn test_duplicate_references_collapse() {
        let result =
            compile_str("---\n\n[a](gloss:axis) [a](gloss:axis) [b](bio:bohr) [b](bio:bohr)");
        assert_eq!(result.gloss.len(), 1);
        assert_eq!(result.bios.len(), 1);
    }
}
