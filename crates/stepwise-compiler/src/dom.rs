//! DOM post-processing passes over the rendered HTML.
//!
//! Three passes run in order: attribute-block expansion, `parent` class
//! hoisting, and step attribute assignment. Each pass collects its targets
//! before mutating so the tree is never modified during traversal.

use std::sync::LazyLock;

use kuchikikiki::NodeRef;
use kuchikikiki::traits::TendrilSink;
use regex::Regex;
use stepwise_renderer::{Document, TemplateContext, TemplateEngine};

use crate::error::CompileError;

/// A `{tag#id.class(attrs)}` group at the start of a text node.
static ATTR_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([^{}]+)\}[ \t]*").unwrap());

/// Parse an HTML fragment and return its first element.
fn first_fragment_element(html: &str) -> Option<NodeRef> {
    let doc = kuchikikiki::parse_html().one(html);
    let body = doc.select_first("body").ok()?;
    let element = body.as_node().children().find(|c| c.as_element().is_some())?;
    element.detach();
    Some(element)
}

/// Expand attribute blocks: a `{...}` group at the start of an element's
/// first text node restyles that element.
///
/// A specifier resolving to `div` (the default tag) merges its id, classes
/// and attributes into the existing element; any other tag name replaces the
/// element, keeping its children.
pub fn expand_attribute_blocks(
    root: &NodeRef,
    engine: &dyn TemplateEngine,
    ctx: &TemplateContext,
) -> Result<(), CompileError> {
    let nodes: Vec<NodeRef> = root.inclusive_descendants().collect();
    // Children before parents, so nested groups resolve inside out.
    for node in nodes.iter().rev() {
        if node.as_element().is_none() {
            continue;
        }
        let Some(first) = node.first_child() else {
            continue;
        };
        let Some(text) = first.as_text() else {
            continue;
        };
        let captured = {
            let content = text.borrow();
            ATTR_BLOCK_RE
                .captures(&content)
                .map(|caps| (caps[1].to_owned(), caps[0].len()))
        };
        let Some((spec, matched_len)) = captured else {
            continue;
        };
        if apply_spec(node, &spec, engine, ctx)? {
            let mut content = text.borrow_mut();
            let rest = content[matched_len..].to_owned();
            *content = rest;
        }
    }
    Ok(())
}

/// Apply one brace-group specifier; returns whether it took effect.
///
/// Context-sensitive tags (`td` and friends) can vanish when the synthesized
/// fragment is parsed outside their required ancestors; in that case the
/// text is left intact rather than silently dropped.
fn apply_spec(
    node: &NodeRef,
    spec: &str,
    engine: &dyn TemplateEngine,
    ctx: &TemplateContext,
) -> Result<bool, CompileError> {
    let (open, close) = engine.render_tag(spec, ctx)?;
    let Some(parsed) = first_fragment_element(&format!("{open}{close}")) else {
        return Ok(false);
    };
    let Some(parsed_el) = parsed.as_element() else {
        return Ok(false);
    };

    if parsed_el.name.local.as_ref() == "div" {
        let Some(el) = node.as_element() else {
            return Ok(false);
        };
        let parsed_attrs = parsed_el.attributes.borrow();
        let mut attrs = el.attributes.borrow_mut();
        for (name, attr) in &parsed_attrs.map {
            let key = name.local.as_ref();
            if key == "class" {
                let merged = match attrs.get("class") {
                    Some(existing) => format!("{existing} {}", attr.value),
                    None => attr.value.clone(),
                };
                attrs.insert("class", merged);
            } else {
                attrs.insert(key, attr.value.clone());
            }
        }
    } else {
        while let Some(child) = node.first_child() {
            parsed.append(child);
        }
        node.insert_after(parsed);
        node.detach();
    }
    Ok(true)
}

/// Hoist `parent` attributes: their value becomes extra classes on the
/// element's parent, and the attribute itself is removed.
pub fn hoist_parent_classes(root: &NodeRef) {
    let targets: Vec<NodeRef> = match root.select("[parent]") {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    };
    for node in targets {
        let Some(el) = node.as_element() else {
            continue;
        };
        let Some(value) = el.attributes.borrow_mut().remove("parent").map(|a| a.value) else {
            continue;
        };
        let Some(parent) = node.parent() else {
            continue;
        };
        let Some(parent_el) = parent.as_element() else {
            continue;
        };
        let mut attrs = parent_el.attributes.borrow_mut();
        let merged = match attrs.get("class") {
            Some(existing) => format!("{existing} {value}"),
            None => value,
        };
        attrs.insert("class", merged);
    }
}

/// Pair step elements with their metadata records, in document order.
///
/// Steps without an explicit id get `step-<index>`; the defaulted id is
/// written back into the record so output data and markup agree. Goals and
/// extra classes from the front matter land on the element.
pub fn assign_step_attributes(root: &NodeRef, doc: &mut Document) {
    let nodes: Vec<NodeRef> = match root.select("x-step") {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    };
    for (index, (node, step)) in nodes.iter().zip(doc.steps.iter_mut()).enumerate() {
        let Some(el) = node.as_element() else {
            continue;
        };
        let id = step.id.clone().unwrap_or_else(|| format!("step-{index}"));
        step.id = Some(id.clone());
        let mut attrs = el.attributes.borrow_mut();
        attrs.insert("id", id);
        if let Some(goals) = &step.goals {
            attrs.insert("goals", goals.clone());
        }
        if let Some(class) = &step.class {
            let merged = match attrs.get("class") {
                Some(existing) => format!("{existing} {class}"),
                None => class.clone(),
            };
            attrs.insert("class", merged);
        }
    }
}
