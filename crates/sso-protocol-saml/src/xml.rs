//! Minimal XML element tree.
//!
//! SAML messages are small, so they are parsed into an owned tree with
//! `quick-xml` and inspected by local name. Qualified names and namespace
//! declarations are kept exactly as written; the canonicalizer needs them.
//!
//! Documents containing a DOCTYPE are rejected outright, which rules out
//! entity expansion and external entity attacks.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SamlError, SamlResult};

/// In-scope namespace declarations as `(prefix, uri)`, outermost first.
/// The default namespace uses the empty prefix.
pub type NamespaceScope = Vec<(String, String)>;

/// A node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Child element.
    Element(Element),
    /// Character data (entity references resolved, CDATA merged).
    Text(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `saml:Assertion`.
    pub name: String,
    /// Attributes in document order, namespace declarations included.
    pub attributes: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element with no attributes or children.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a text node.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Returns the prefix of the qualified name, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Returns the local part of the qualified name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Returns an attribute value by qualified name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Returns the first child element with the given local name.
    #[must_use]
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name() == local)
    }

    /// Iterates over child elements with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |el| el.local_name() == local)
    }

    /// Returns the first descendant (depth first) with the given local name.
    #[must_use]
    pub fn descendant(&self, local: &str) -> Option<&Element> {
        for el in self.elements() {
            if el.local_name() == local {
                return Some(el);
            }
            if let Some(found) = el.descendant(local) {
                return Some(found);
            }
        }
        None
    }

    /// Returns the concatenated text of direct text children, trimmed.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(text) = node {
                out.push_str(text);
            }
        }
        out.trim().to_string()
    }

    /// Returns the text of the named child, if the child exists.
    #[must_use]
    pub fn child_text(&self, local: &str) -> Option<String> {
        self.child(local).map(Element::text)
    }

    /// Iterates over the namespace declarations made on this element.
    pub fn namespace_decls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(key, value)| {
            if key == "xmlns" {
                Some(("", value.as_str()))
            } else {
                key.strip_prefix("xmlns:")
                    .map(|prefix| (prefix, value.as_str()))
            }
        })
    }

    /// Finds every element whose `ID` attribute equals `id`, together with
    /// the namespace declarations inherited from its ancestors.
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Vec<(&Element, NamespaceScope)> {
        let mut found = Vec::new();
        collect_by_id(self, id, &mut Vec::new(), &mut found);
        found
    }

    /// Returns a mutable reference to the first element with the given `ID`.
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.attr("ID") == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(el) => el.find_by_id_mut(id),
            Node::Text(_) => None,
        })
    }

    /// Serializes the element, preserving names and attribute order.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&quick_xml::escape::escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(el) => el.write_xml(out),
                Node::Text(text) => out.push_str(&quick_xml::escape::escape(text.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Returns the local part of a qualified name.
#[must_use]
pub fn local_part(name: &str) -> &str {
    name.split_once(':').map_or(name, |(_, local)| local)
}

fn collect_by_id<'a>(
    el: &'a Element,
    id: &str,
    scope: &mut NamespaceScope,
    found: &mut Vec<(&'a Element, NamespaceScope)>,
) {
    if el.attr("ID") == Some(id) {
        found.push((el, scope.clone()));
    }

    let depth = scope.len();
    scope.extend(
        el.namespace_decls()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string())),
    );
    for child in el.elements() {
        collect_by_id(child, id, scope, found);
    }
    scope.truncate(depth);
}

/// Parses a document into its root element.
///
/// # Errors
///
/// Returns `XmlParse` for malformed input, a DOCTYPE, or content outside
/// the root element.
pub fn parse(xml: &str) -> SamlResult<Element> {
    let normalized: Cow<'_, str> = if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    };

    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(start_element(&start)?),
            Event::Empty(start) => {
                let el = start_element(&start)?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|_| SamlError::XmlParse("CDATA is not UTF-8".to_string()))?;
                push_text(&mut stack, text)?;
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse("DOCTYPE is not allowed".to_string()));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn start_element(start: &BytesStart<'_>) -> SamlResult<Element> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| SamlError::XmlParse("element name is not UTF-8".to_string()))?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| SamlError::XmlParse("attribute name is not UTF-8".to_string()))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> SamlResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
        return Ok(());
    }
    if root.is_some() {
        return Err(SamlError::XmlParse("multiple root elements".to_string()));
    }
    *root = Some(el);
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> SamlResult<()> {
    let Some(parent) = stack.last_mut() else {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(SamlError::XmlParse("text outside the root element".to_string()));
    };

    if let Some(Node::Text(previous)) = parent.children.last_mut() {
        previous.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
    Ok(())
}
