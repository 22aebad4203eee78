//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Operates on the owned tree from [`crate::xml`]. Comments and processing
//! instructions are already dropped by the parser. `InclusiveNamespaces`
//! prefix lists are not supported; every namespace is rendered only where it
//! is visibly used.

use std::collections::{BTreeMap, BTreeSet};

use crate::xml::{local_part, Element, Node};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalizes `element` as an apex node.
///
/// `inherited` lists the namespace declarations in scope from the element's
/// ancestors (outermost first); later entries shadow earlier ones.
#[must_use]
pub fn canonicalize(element: &Element, inherited: &[(String, String)]) -> String {
    let mut scope: BTreeMap<String, String> = BTreeMap::new();
    for (prefix, uri) in inherited {
        scope.insert(prefix.clone(), uri.clone());
    }

    let mut out = String::new();
    write_element(element, &scope, &BTreeMap::new(), &mut out);
    out
}

fn write_element(
    el: &Element,
    parent_scope: &BTreeMap<String, String>,
    rendered: &BTreeMap<String, String>,
    out: &mut String,
) {
    let mut scope = parent_scope.clone();
    for (prefix, uri) in el.namespace_decls() {
        scope.insert(prefix.to_string(), uri.to_string());
    }

    let mut utilized: BTreeSet<&str> = BTreeSet::new();
    utilized.insert(el.prefix().unwrap_or(""));
    for (name, _) in regular_attributes(el) {
        if let Some((prefix, _)) = name.split_once(':') {
            if prefix != "xml" {
                utilized.insert(prefix);
            }
        }
    }

    let mut now_rendered = rendered.clone();
    let mut ns_nodes: Vec<(&str, String)> = Vec::new();
    for prefix in utilized {
        let uri = scope.get(prefix).cloned().unwrap_or_default();
        let current = rendered.get(prefix).map_or("", String::as_str);
        if uri != current {
            now_rendered.insert(prefix.to_string(), uri.clone());
            ns_nodes.push((prefix, uri));
        }
    }

    let mut attrs: Vec<(&str, &str, &str, &str)> = regular_attributes(el)
        .map(|(name, value)| {
            let ns = match name.split_once(':') {
                Some(("xml", _)) => XML_NS,
                Some((prefix, _)) => scope.get(prefix).map_or("", String::as_str),
                None => "",
            };
            (ns, local_part(name), name, value)
        })
        .collect();
    attrs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    out.push('<');
    out.push_str(&el.name);
    for (prefix, uri) in &ns_nodes {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attr(uri, out);
        out.push('"');
    }
    for (_, _, name, value) in &attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');

    for node in &el.children {
        match node {
            Node::Element(child) => write_element(child, &scope, &now_rendered, out),
            Node::Text(text) => escape_text(text, out),
        }
    }

    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn regular_attributes(el: &Element) -> impl Iterator<Item = (&str, &str)> {
    el.attributes
        .iter()
        .filter(|(name, _)| name != "xmlns" && !name.starts_with("xmlns:"))
        .map(|(name, value)| (name.as_str(), value.as_str()))
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
