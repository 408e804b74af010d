// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! In-memory element tree of a project document.

/// Attribute name that marks an element as a reference to a stored sample block.
pub const BLOCK_ID_ATTR: &str = "blockid";

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i32),
    Bool(bool),
    LongLong(i64),
    Double(f64),
}

impl Value {
    /// Integer view of the value, for either integer width.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::LongLong(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::LongLong(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

/// A named element with ordered attributes and child elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, Value)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Set an attribute, replacing an existing one of the same name in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// The block id this element refers to, if it carries one. An id written
    /// as a decimal string counts as well.
    pub fn block_id(&self) -> Option<i64> {
        match self.attr(BLOCK_ID_ATTR)? {
            Value::Str(s) => s.trim().parse().ok(),
            other => other.as_i64(),
        }
    }

    fn collect_block_ids(&self, out: &mut Vec<i64>) {
        if let Some(id) = self.block_id() {
            out.push(id);
        }
        for child in &self.children {
            child.collect_block_ids(out);
        }
    }

    fn visit_block_refs_mut<E, F>(&mut self, f: &mut F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut i64) -> std::result::Result<(), E>,
    {
        if let Some(mut id) = self.block_id() {
            f(&mut id)?;
            self.set_attr(BLOCK_ID_ATTR, Value::LongLong(id));
        }
        for child in &mut self.children {
            child.visit_block_refs_mut(f)?;
        }
        Ok(())
    }
}

/// A complete project document: a single root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// All block ids referenced anywhere in the tree, in document order.
    ///
    /// Duplicates are kept: a block shared by several clips appears once per
    /// reference.
    pub fn block_ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        self.root.collect_block_ids(&mut ids);
        ids
    }

    /// Visit every element carrying a block id, at any depth, letting the
    /// callback rewrite the id. The first error stops the walk.
    pub fn visit_block_refs_mut<E, F>(&mut self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(&mut i64) -> std::result::Result<(), E>,
    {
        self.root.visit_block_refs_mut(&mut f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(
            Element::new("project")
                .with_attr("rate", 44100.0)
                .with_child(
                    Element::new("wavetrack").with_child(
                        Element::new("waveclip").with_child(
                            Element::new("sequence")
                                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, 7i64))
                                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, 9i64)),
                        ),
                    ),
                )
                .with_child(Element::new("group").with_attr(BLOCK_ID_ATTR, 7i32)),
        )
    }

    #[test]
    fn test_block_ids_any_depth() {
        assert_eq!(sample().block_ids(), vec![7, 9, 7]);
    }

    #[test]
    fn test_visit_rewrites_ids() {
        let mut doc = sample();
        doc.visit_block_refs_mut(|id| {
            *id += 100;
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(doc.block_ids(), vec![107, 109, 107]);
    }

    #[test]
    fn test_visit_stops_on_error() {
        let mut doc = sample();
        let mut seen = 0;
        let result = doc.visit_block_refs_mut(|id| {
            seen += 1;
            if *id == 9 { Err("stop") } else { Ok(()) }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_set_attr_replaces_in_place() {
        let mut el = Element::new("a").with_attr("x", 1i32).with_attr("y", 2i32);
        el.set_attr("x", "one");
        assert_eq!(el.attributes[0], ("x".to_string(), Value::Str("one".into())));
        assert_eq!(el.attributes.len(), 2);
    }

    #[test]
    fn test_string_block_ids() {
        let mut doc = Document::new(
            Element::new("sequence")
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, "12"))
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, " 40 "))
                .with_child(Element::new("waveblock").with_attr(BLOCK_ID_ATTR, "silence")),
        );
        assert_eq!(doc.block_ids(), vec![12, 40]);

        doc.visit_block_refs_mut(|id| {
            *id += 1;
            Ok::<_, ()>(())
        })
        .unwrap();
        assert_eq!(doc.block_ids(), vec![13, 41]);
        assert_eq!(doc.root.children[0].attr(BLOCK_ID_ATTR), Some(&Value::LongLong(13)));
        assert_eq!(
            doc.root.children[2].attr(BLOCK_ID_ATTR),
            Some(&Value::Str("silence".into()))
        );
    }
}
