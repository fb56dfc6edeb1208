//! Response normalization for the QNAP CGI XML responses.
//!
//! The device firmware is not consistent about its schema: an element that
//! usually repeats may appear once, optional elements come and go between
//! firmware versions and every value arrives as text. [`normalize`] turns a
//! raw body into a [`Document`] with a predictable shape: every element whose
//! name is listed as repeatable is always a [`Value::List`], everything else
//! is exposed exactly as it occurred.

use crate::client::QnapError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::mem;

/// Key under which text content of an element with children is stored
const TEXT_KEY: &str = "#text";

/// A single normalized value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Element without text or children (`<tag/>`)
    Empty,
    /// Text content, trimmed of surrounding whitespace
    Text(String),
    /// Element with children and/or attributes
    Map(Document),
    /// Repeated element, or an element declared repeatable
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Map(document) => Some(document),
            _ => None,
        }
    }

    /// Views the value as a sequence: lists as-is, [`Value::Empty`] as no
    /// items and any other value as a single item.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            Value::Empty => &[],
            other => std::slice::from_ref(other),
        }
    }
}

/// Ordered collection of named values.
///
/// Attributes are stored with an `@` prefix, mixed text content under `#text`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Text of a child element, `None` when missing or empty
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Child sub-document, `None` when missing or not a nested element
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Document> {
        self.get(name).and_then(Value::as_document)
    }

    /// Follows a chain of nested elements, e.g. `["func", "ownContent"]`
    #[must_use]
    pub fn path(&self, names: &[&str]) -> Option<&Document> {
        names
            .iter()
            .try_fold(self, |document, name| document.child(name))
    }

    /// Items of a repeatable element. A missing element yields no items.
    #[must_use]
    pub fn list(&self, name: &str) -> &[Value] {
        self.get(name).map_or(&[], Value::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child elements in document order, for callers exploring responses
    /// without a fixed schema
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Adds a value, turning a second occurrence of `name` into a list.
    fn insert(&mut self, name: String, value: Value, repeatable: bool) {
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, Value::List(items))) => items.push(value),
            Some((_, existing)) => {
                let first = mem::replace(existing, Value::Empty);
                *existing = Value::List(vec![first, value]);
            }
            None if repeatable => self.entries.push((name, Value::List(vec![value]))),
            None => self.entries.push((name, value)),
        }
    }
}

/// Element being assembled while its children are read
struct Frame {
    name: String,
    document: Document,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, QnapError> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| QnapError::Parse(e.to_string()))?
            .to_string();

        let mut document = Document::default();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| QnapError::Parse(e.to_string()))?;
            let key = std::str::from_utf8(attribute.key.as_ref())
                .map_err(|e| QnapError::Parse(e.to_string()))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| QnapError::Parse(e.to_string()))?;
            document.insert(format!("@{key}"), text_value(&value), false);
        }

        Ok(Self {
            name,
            document,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let Self {
            name,
            mut document,
            text,
        } = self;
        let text = text.trim();

        let value = if document.is_empty() {
            text_value(text)
        } else {
            if !text.is_empty() {
                document.insert(TEXT_KEY.to_string(), Value::Text(text.to_string()), false);
            }
            Value::Map(document)
        };
        (name, value)
    }
}

fn text_value(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        Value::Empty
    } else {
        Value::Text(text.to_string())
    }
}

/// Parses `body` and returns the contents of its root element.
///
/// Every element named in `repeatable` is materialized as a [`Value::List`]
/// regardless of how many times it occurred, at any depth.
///
/// # Errors
///
/// Returns [`QnapError::Parse`] if the body is not well-formed XML or has no
/// root element.
pub fn normalize(body: &str, repeatable: &[&str]) -> Result<Document, QnapError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader
            .read_event()
            .map_err(|e| QnapError::Parse(format!("at position {}: {e}", reader.buffer_position())))?
        {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Frame::open(&start)?.close();
                attach(&mut stack, &mut root, name, value, repeatable)?;
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| QnapError::Parse("unexpected closing tag".into()))?;
                let (name, value) = frame.close();
                attach(&mut stack, &mut root, name, value, repeatable)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| QnapError::Parse(e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                let data = data.into_inner();
                let text =
                    std::str::from_utf8(&data).map_err(|e| QnapError::Parse(e.to_string()))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(frame) = stack.last() {
        return Err(QnapError::Parse(format!("unclosed element <{}>", frame.name)));
    }

    match root {
        Some(Value::Map(document)) => Ok(document),
        Some(_) => Ok(Document::default()),
        None => Err(QnapError::Parse("document has no root element".into())),
    }
}

fn attach(
    stack: &mut [Frame],
    root: &mut Option<Value>,
    name: String,
    value: Value,
    repeatable: &[&str],
) -> Result<(), QnapError> {
    match stack.last_mut() {
        Some(parent) => {
            let is_repeatable = repeatable.contains(&name.as_str());
            parent.document.insert(name, value, is_repeatable);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(value);
            Ok(())
        }
        None => Err(QnapError::Parse(format!(
            "multiple root elements, second is <{name}>"
        ))),
    }
}
