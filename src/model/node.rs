//! Tree nodes: elements with named attributes and children, and attributed text.
//!
//! Offsets are the unit of addressing inside an element: a child element takes
//! one offset, a text node takes one offset per character. Structural edits
//! keep the text-merge invariant: two adjacent text siblings with identical
//! attribute sets are always merged into one node, which never changes the
//! offsets of surrounding content.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{ModelError, Result};

pub type Attributes = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase")]
pub enum Node {
    Element(Element),
    Text(Text),
}

impl Node {
    pub fn element(name: &str, children: Vec<Node>) -> Node {
        Node::Element(Element {
            name: name.to_string(),
            attrs: Attributes::new(),
            children,
        })
    }

    pub fn text(data: &str) -> Node {
        Node::Text(Text {
            data: data.to_string(),
            attrs: Attributes::new(),
        })
    }

    /// How many offsets this node occupies in its parent.
    pub fn offset_size(&self) -> u32 {
        match self {
            Node::Element(_) => 1,
            Node::Text(text) => text.data.chars().count() as u32,
        }
    }

    pub fn attrs(&self) -> &Attributes {
        match self {
            Node::Element(element) => &element.attrs,
            Node::Text(text) => &text.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Node::Element(element) => &mut element.attrs,
            Node::Text(text) => &mut text.attrs,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attrs().get(key)
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(text) => Some(text),
            Node::Element(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub data: String,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attrs: Attributes,
}

impl Text {
    fn char_len(&self) -> u32 {
        self.data.chars().count() as u32
    }

    fn byte_at(&self, chars: u32) -> usize {
        self.data
            .char_indices()
            .nth(chars as usize)
            .map(|(i, _)| i)
            .unwrap_or(self.data.len())
    }

    /// Splits off and returns the tail starting at the given character offset.
    fn split_off_chars(&mut self, chars: u32) -> Text {
        let at = self.byte_at(chars);
        Text {
            data: self.data.split_off(at),
            attrs: self.attrs.clone(),
        }
    }
}

impl Element {
    pub fn new(name: &str) -> Element {
        Element {
            name: name.to_string(),
            attrs: Attributes::new(),
            children: Vec::new(),
        }
    }

    /// An empty copy carrying this element's name and attributes.
    pub fn shell(&self) -> Element {
        Element {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            children: Vec::new(),
        }
    }

    pub fn max_offset(&self) -> u32 {
        self.children.iter().map(Node::offset_size).sum()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Iterates children with the offset each one starts at.
    pub fn child_spans(&self) -> impl Iterator<Item = (u32, &Node)> {
        let mut offset = 0;
        self.children.iter().map(move |child| {
            let start = offset;
            offset += child.offset_size();
            (start, child)
        })
    }

    /// The node covering the given offset, with the offset it starts at.
    pub fn child_at_offset(&self, offset: u32) -> Option<(u32, &Node)> {
        self.child_spans()
            .find(|(start, child)| *start <= offset && offset < start + child.offset_size())
    }

    /// The child element starting exactly at the given offset.
    pub fn element_at_offset(&self, offset: u32) -> Option<&Element> {
        match self.child_at_offset(offset) {
            Some((start, Node::Element(element))) if start == offset => Some(element),
            _ => None,
        }
    }

    pub fn element_at_offset_mut(&mut self, offset: u32) -> Option<&mut Element> {
        let mut cursor = 0;
        for child in &mut self.children {
            let size = child.offset_size();
            if cursor == offset {
                return child.as_element_mut();
            }
            if cursor > offset {
                return None;
            }
            cursor += size;
        }
        None
    }

    /// Concatenated text content of direct text children, for assertions.
    pub fn text_content(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| child.as_text().map(|text| text.data.as_str()))
            .collect()
    }

    /// Child index and remaining character offset for an offset boundary.
    /// An offset landing inside a text node yields a non-zero inner offset.
    fn index_at(&self, offset: u32) -> Result<(usize, u32)> {
        let mut cursor = 0;
        for (index, child) in self.children.iter().enumerate() {
            let size = child.offset_size();
            if offset < cursor + size {
                return Ok((index, offset - cursor));
            }
            cursor += size;
        }
        if offset == cursor {
            Ok((self.children.len(), 0))
        } else {
            Err(ModelError::OffsetOutOfBounds {
                offset,
                max: cursor,
            })
        }
    }

    /// Splits the text node covering the offset, so the offset falls between
    /// children. No-op when the offset is already a child boundary.
    fn split_boundary(&mut self, offset: u32) -> Result<()> {
        let (index, inner) = self.index_at(offset)?;
        if inner == 0 {
            return Ok(());
        }
        let tail = match &mut self.children[index] {
            Node::Text(text) => Node::Text(text.split_off_chars(inner)),
            // inner > 0 can only happen inside a text node
            Node::Element(_) => return Err(ModelError::OffsetOutOfBounds {
                offset,
                max: self.max_offset(),
            }),
        };
        self.children.insert(index + 1, tail);
        Ok(())
    }

    pub fn insert_children(&mut self, offset: u32, nodes: Vec<Node>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.split_boundary(offset)?;
        let (index, _) = self.index_at(offset)?;
        self.children.splice(index..index, nodes);
        normalize(&mut self.children);
        Ok(())
    }

    /// Removes and returns the children covering `[offset, offset + how_many)`,
    /// splitting text nodes at both boundaries.
    pub fn extract_children(&mut self, offset: u32, how_many: u32) -> Result<Vec<Node>> {
        if how_many == 0 {
            return Ok(Vec::new());
        }
        let max = self.max_offset();
        if offset + how_many > max {
            return Err(ModelError::OffsetOutOfBounds {
                offset: offset + how_many,
                max,
            });
        }
        self.split_boundary(offset)?;
        self.split_boundary(offset + how_many)?;
        let (start, _) = self.index_at(offset)?;
        let (end, _) = self.index_at(offset + how_many)?;
        let mut extracted: Vec<Node> = self.children.drain(start..end).collect();
        normalize(&mut self.children);
        normalize(&mut extracted);
        Ok(extracted)
    }

    /// Sets or removes an attribute on every child covered by the offset range,
    /// checking the previous value first. Text nodes are split at the range
    /// boundaries so partial text runs can carry their own attributes.
    pub fn update_attribute_in(
        &mut self,
        start: u32,
        end: u32,
        key: &str,
        old_value: &Option<Value>,
        new_value: &Option<Value>,
    ) -> Result<()> {
        let max = self.max_offset();
        if end > max || start > end {
            return Err(ModelError::OffsetOutOfBounds { offset: end, max });
        }
        if start == end {
            return Ok(());
        }
        self.split_boundary(start)?;
        self.split_boundary(end)?;
        let (from, _) = self.index_at(start)?;
        let (to, _) = self.index_at(end)?;
        for child in &self.children[from..to] {
            if child.attribute(key) != old_value.as_ref() {
                return Err(ModelError::AttributeMismatch {
                    key: key.to_string(),
                });
            }
        }
        for child in &mut self.children[from..to] {
            match new_value {
                Some(value) => {
                    child.attrs_mut().insert(key.to_string(), value.clone());
                }
                None => {
                    child.attrs_mut().remove(key);
                }
            }
        }
        normalize(&mut self.children);
        Ok(())
    }
}

/// Total offset size of a node sequence.
pub fn nodes_offset_size(nodes: &[Node]) -> u32 {
    nodes.iter().map(Node::offset_size).sum()
}

/// Merges adjacent text siblings with identical attribute sets and drops
/// empty text nodes. Preserves offsets.
pub(crate) fn normalize(children: &mut Vec<Node>) {
    children.retain(|child| match child {
        Node::Text(text) => !text.data.is_empty(),
        Node::Element(_) => true,
    });
    let mut index = 1;
    while index < children.len() {
        let merge = match (&children[index - 1], &children[index]) {
            (Node::Text(left), Node::Text(right)) => left.attrs == right.attrs,
            _ => false,
        };
        if merge {
            let Node::Text(right) = children.remove(index) else {
                unreachable!()
            };
            let Node::Text(left) = &mut children[index - 1] else {
                unreachable!()
            };
            left.data.push_str(&right.data);
        } else {
            index += 1;
        }
    }
}
