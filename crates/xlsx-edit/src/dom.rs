//! Owned, mutable XML tree for a single package part.
//!
//! Parts are parsed with `quick-xml` into [`XmlDocument`], mutated in place and serialized back
//! with the same crate. Anything the tree does not model (declaration, comments, processing
//! instructions, doctype) is carried through as raw `quick-xml` events so an untouched region of
//! a part serializes the way it was read.
//!
//! Element and attribute names keep their original prefix. Lookups by *local* name ignore the
//! prefix so `<x:row>` and `<row>` are treated alike, matching how SpreadsheetML producers differ
//! in namespace declaration style.

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("xml escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("{0}")]
    Malformed(&'static str),
}

/// A child of an [`XmlElement`].
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    /// Unescaped character data.
    Text(String),
    CData(String),
    /// Comments and processing instructions, kept verbatim.
    Other(Event<'static>),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Qualified name as written in the part (`x:row`, `row`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Qualify `local` with this element's prefix.
    ///
    /// New children must share their parent's namespace; reusing the prefix keeps them in it
    /// without introducing a namespace declaration.
    pub fn qualify(&self, local: &str) -> String {
        match self.prefix() {
            Some(prefix) => format!("{prefix}:{local}"),
            None => local.to_string(),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Attribute by exact qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First attribute whose local name matches, ignoring the prefix (`r:id` matches `id`).
    /// Namespace declarations never match.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|(k, _)| !is_namespace_decl(k))
            .find(|(k, _)| local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Returns `true` when the attribute was present.
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(k, _)| k != name);
        before != self.attributes.len()
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn elements_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |el| el.local_name() == local)
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.local_name() == local)
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.local_name() == local)
    }

    /// Index into [`Self::children`] of the first child element with the given local name.
    pub fn position(&self, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|node| node.as_element().is_some_and(|el| el.local_name() == local))
    }

    pub fn insert_element(&mut self, index: usize, element: XmlElement) {
        self.children.insert(index, XmlNode::Element(element));
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Remove every child element with the given local name. Returns how many were removed.
    pub fn remove_elements(&mut self, local: &str) -> usize {
        let before = self.children.len();
        self.children
            .retain(|node| node.as_element().map_or(true, |el| el.local_name() != local));
        before - self.children.len()
    }

    /// Concatenated character data of this element and all of its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) | XmlNode::CData(text) => out.push_str(text),
                XmlNode::Element(el) => el.collect_text(out),
                XmlNode::Other(_) => {}
            }
        }
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.clear();
        self.children.push(XmlNode::Text(text.into()));
    }

    fn from_start(e: &BytesStart<'_>) -> Result<Self, DomError> {
        let name = std::str::from_utf8(e.name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn write_to(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), DomError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write_to(writer)?,
                XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
                XmlNode::CData(text) => writer.write_event(Event::CData(BytesCData::new(text)))?,
                XmlNode::Other(event) => writer.write_event(event.clone())?,
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// A parsed package part.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    prolog: Vec<Event<'static>>,
    root: XmlElement,
    epilog: Vec<Event<'static>>,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, DomError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(XmlElement::from_start(&e)?),
                Event::Empty(e) => {
                    let el = XmlElement::from_start(&e)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or(DomError::Malformed("unbalanced end tag"))?;
                    attach(&mut stack, &mut root, el)?;
                }
                Event::Text(e) => match stack.last_mut() {
                    Some(parent) => {
                        let text = e.unescape()?.into_owned();
                        parent.children.push(XmlNode::Text(text));
                    }
                    None if root.is_some() => epilog.push(Event::Text(e.into_owned())),
                    None => prolog.push(Event::Text(e.into_owned())),
                },
                Event::CData(e) => match stack.last_mut() {
                    Some(parent) => {
                        let text = std::str::from_utf8(&*e)?.to_string();
                        parent.children.push(XmlNode::CData(text));
                    }
                    None => return Err(DomError::Malformed("character data outside root element")),
                },
                Event::Eof => break,
                other => {
                    let other = other.into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Other(other)),
                        None if root.is_some() => epilog.push(other),
                        None => prolog.push(other),
                    }
                }
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(DomError::Malformed("unexpected end of document"));
        }
        let root = root.ok_or(DomError::Malformed("document has no root element"))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DomError> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.prolog {
            writer.write_event(event.clone())?;
        }
        self.root.write_to(&mut writer)?;
        for event in &self.epilog {
            writer.write_event(event.clone())?;
        }
        Ok(writer.into_inner())
    }
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
) -> Result<(), DomError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlNode::Element(el));
            Ok(())
        }
        None if root.is_some() => Err(DomError::Malformed("multiple root elements")),
        None => {
            *root = Some(el);
            Ok(())
        }
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}
