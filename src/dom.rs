//! Owned HTML tree used by the chapter pipeline.
//!
//! Fragments are parsed with `scraper` (html5ever) and copied into plain
//! `Element`/`Node` values so they can be edited in place and written back out
//! as well-formed XML.

use scraper::{ElementRef, Html};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum XmlError {
    #[error("element name is not a valid XML name: {0:?}")]
    InvalidElementName(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Parses an HTML document or fragment and returns its `<html>` root.
pub fn parse_html(html: &str) -> Element {
    let document = Html::parse_document(html);
    convert_element(document.root_element())
}

fn convert_element(source: ElementRef<'_>) -> Element {
    let value = source.value();
    let mut element = Element::new(value.name());
    for (name, attr_value) in value.attrs() {
        if !is_xml_name(name) || element.attr(name).is_some() {
            continue;
        }
        element.attrs.push((name.to_owned(), attr_value.to_owned()));
    }

    for child in source.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                element.children.push(Node::Text(String::from(&**text)))
            }
            scraper::Node::Comment(comment) => {
                element.children.push(Node::Comment(String::from(&**comment)))
            }
            scraper::Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    element.children.push(Node::Element(convert_element(child_ref)));
                }
            }
            _ => {}
        }
    }

    element
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn child_elements(&self) -> impl DoubleEndedIterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Concatenated text of this element's direct text children.
    pub fn own_text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Pre-order walk over this element and every element below it.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    pub fn find(&self, mut predicate: impl FnMut(&Element) -> bool) -> Option<&Element> {
        self.descendants().find(|element| predicate(*element))
    }

    pub fn find_by_id(&self, name: &str, id: &str) -> Option<&Element> {
        self.find(|element| element.is(name) && element.attr("id") == Some(id))
    }

    /// Visits this element and all descendants in pre-order, mutably.
    pub fn visit_mut(&mut self, visitor: &mut impl FnMut(&mut Element)) {
        visitor(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.visit_mut(visitor);
            }
        }
    }

    /// Serializes this element as XML.
    ///
    /// Characters XML 1.0 does not allow are dropped from text, attribute
    /// values and comments. Element names that are not XML names are an error.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut out = String::new();
        self.write_xml(&mut out)?;
        Ok(out)
    }

    fn write_xml(&self, out: &mut String) -> Result<(), XmlError> {
        if !is_xml_name(&self.name) {
            return Err(XmlError::InvalidElementName(self.name.clone()));
        }

        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if let Some(namespace) = foreign_namespace(&self.name)
            && self.attr("xmlns").is_none()
        {
            out.push_str(" xmlns=\"");
            out.push_str(namespace);
            out.push('"');
        }

        if self.children.is_empty() || VOID_ELEMENTS.iter().any(|void| self.is(void)) {
            out.push_str("/>");
            return Ok(());
        }

        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_xml(out)?,
                Node::Text(text) => out.push_str(&escape_text(text)),
                Node::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(&sanitize_comment(comment));
                    out.push_str("-->");
                }
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
        Ok(())
    }
}

fn foreign_namespace(name: &str) -> Option<&'static str> {
    match name {
        "svg" => Some(SVG_NAMESPACE),
        "math" => Some(MATHML_NAMESPACE),
        _ => None,
    }
}

fn sanitize_comment(comment: &str) -> String {
    let mut out = comment.chars().filter(|&c| is_xml_char(c)).collect::<String>();
    while out.contains("--") {
        out = out.replace("--", "- -");
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        self.stack.extend(current.child_elements().rev());
        Some(current)
    }
}

/// XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}

/// HTML escaping including both quote characters, for text spliced into
/// package documents.
pub fn escape_html(input: &str) -> String {
    escape_attr(input).replace('\'', "&#x27;")
}
