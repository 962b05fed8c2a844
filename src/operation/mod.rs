//! The operation algebra: atomic, invertible, serializable tree mutations.
//!
//! Every operation carries the document version it was authored against and
//! enough data to construct its own exact inverse. A remove is a move whose
//! target lies in the graveyard root; merge is a composed move (content out,
//! emptied element to the graveyard), and split is its mirror image.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    Document, GRAVEYARD, ModelError, Node, Position, Range, Result, nodes_offset_size,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Operation {
    Insert(InsertOperation),
    Move(MoveOperation),
    Rename(RenameOperation),
    Attribute(AttributeOperation),
    RootAttribute(RootAttributeOperation),
    Marker(MarkerOperation),
    Split(SplitOperation),
    Merge(MergeOperation),
    NoOp(NoOperation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOperation {
    pub position: Position,
    pub nodes: Vec<Node>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOperation {
    pub source: Position,
    pub how_many: u32,
    pub target: Position,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOperation {
    /// Points at the renamed element.
    pub position: Position,
    pub old_name: String,
    pub new_name: String,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeOperation {
    pub range: Range,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootAttributeOperation {
    pub root: String,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerOperation {
    pub name: String,
    pub old_range: Option<Range>,
    pub new_range: Option<Range>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOperation {
    /// Inside the element being split; content after it moves out.
    pub split_position: Position,
    pub how_many: u32,
    /// Where the new (or revived) element lands, in the split element's parent.
    pub insertion_position: Position,
    /// Set when undoing a merge: the element is taken from the graveyard
    /// instead of cloning the split element's shell.
    pub graveyard_position: Option<Position>,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOperation {
    /// First position inside the merged element.
    pub source_position: Position,
    pub how_many: u32,
    /// Where the merged content lands, inside the merge target element.
    pub target_position: Position,
    /// Where the emptied element goes in the graveyard.
    pub graveyard_position: Position,
    pub base_version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoOperation {
    pub base_version: u64,
}

impl SplitOperation {
    /// Insertion slot right after the split element; the split element sits at
    /// the next-to-last component of the split position's path.
    pub fn insertion_after(split_position: &Position) -> Position {
        let parent = split_position.parent_path().to_vec();
        Position::new(&split_position.root, parent).shifted(1)
    }

    /// First position inside the new element, in post-insert coordinates.
    pub fn move_target(&self) -> Position {
        self.insertion_position.nested(0)
    }
}

impl MergeOperation {
    /// Position of the merged element itself (the parent of `source_position`).
    pub fn merged_element_position(&self) -> Position {
        Position::new(
            &self.source_position.root,
            self.source_position.parent_path().to_vec(),
        )
    }
}

impl Operation {
    pub fn no_op(base_version: u64) -> Operation {
        Operation::NoOp(NoOperation { base_version })
    }

    pub fn base_version(&self) -> u64 {
        match self {
            Operation::Insert(op) => op.base_version,
            Operation::Move(op) => op.base_version,
            Operation::Rename(op) => op.base_version,
            Operation::Attribute(op) => op.base_version,
            Operation::RootAttribute(op) => op.base_version,
            Operation::Marker(op) => op.base_version,
            Operation::Split(op) => op.base_version,
            Operation::Merge(op) => op.base_version,
            Operation::NoOp(op) => op.base_version,
        }
    }

    pub fn set_base_version(&mut self, version: u64) {
        match self {
            Operation::Insert(op) => op.base_version = version,
            Operation::Move(op) => op.base_version = version,
            Operation::Rename(op) => op.base_version = version,
            Operation::Attribute(op) => op.base_version = version,
            Operation::RootAttribute(op) => op.base_version = version,
            Operation::Marker(op) => op.base_version = version,
            Operation::Split(op) => op.base_version = version,
            Operation::Merge(op) => op.base_version = version,
            Operation::NoOp(op) => op.base_version = version,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert(_) => "insert",
            Operation::Move(op) if op.is_remove() => "remove",
            Operation::Move(_) => "move",
            Operation::Rename(_) => "rename",
            Operation::Attribute(_) => "attribute",
            Operation::RootAttribute(_) => "rootAttribute",
            Operation::Marker(_) => "marker",
            Operation::Split(_) => "split",
            Operation::Merge(_) => "merge",
            Operation::NoOp(_) => "noop",
        }
    }

    /// The exact inverse; applying an operation and then its inverse restores
    /// a structurally equal document.
    pub fn reversed(&self) -> Operation {
        let next = self.base_version() + 1;
        match self {
            Operation::Insert(op) => Operation::Move(MoveOperation {
                source: op.position.clone(),
                how_many: nodes_offset_size(&op.nodes),
                target: Position::new(GRAVEYARD, vec![0]),
                base_version: next,
            }),
            Operation::Move(op) => {
                let moved_start = op
                    .target
                    .transformed_by_deletion(&op.source, op.how_many)
                    .unwrap_or_else(|| op.target.clone());
                let restore = op
                    .source
                    .transformed_by_insertion(&op.target, op.how_many, true);
                Operation::Move(MoveOperation {
                    source: moved_start,
                    how_many: op.how_many,
                    target: restore,
                    base_version: next,
                })
            }
            Operation::Rename(op) => Operation::Rename(RenameOperation {
                position: op.position.clone(),
                old_name: op.new_name.clone(),
                new_name: op.old_name.clone(),
                base_version: next,
            }),
            Operation::Attribute(op) => Operation::Attribute(AttributeOperation {
                range: op.range.clone(),
                key: op.key.clone(),
                old_value: op.new_value.clone(),
                new_value: op.old_value.clone(),
                base_version: next,
            }),
            Operation::RootAttribute(op) => Operation::RootAttribute(RootAttributeOperation {
                root: op.root.clone(),
                key: op.key.clone(),
                old_value: op.new_value.clone(),
                new_value: op.old_value.clone(),
                base_version: next,
            }),
            Operation::Marker(op) => Operation::Marker(MarkerOperation {
                name: op.name.clone(),
                old_range: op.new_range.clone(),
                new_range: op.old_range.clone(),
                base_version: next,
            }),
            Operation::Split(op) => Operation::Merge(MergeOperation {
                source_position: op.insertion_position.nested(0),
                how_many: op.how_many,
                target_position: op.split_position.clone(),
                graveyard_position: Position::new(GRAVEYARD, vec![0]),
                base_version: next,
            }),
            Operation::Merge(op) => Operation::Split(SplitOperation {
                split_position: op.target_position.clone(),
                how_many: op.how_many,
                insertion_position: op.merged_element_position(),
                graveyard_position: Some(op.graveyard_position.clone()),
                base_version: next,
            }),
            Operation::NoOp(_) => Operation::no_op(next),
        }
    }

    /// Wire form for the synchronization protocol.
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|err| ModelError::Serialization(err.to_string()))
    }

    pub fn from_json(value: Value) -> Result<Operation> {
        serde_json::from_value(value).map_err(|err| ModelError::Serialization(err.to_string()))
    }

    /// Structural mutation of the document; called from [`Document::apply`]
    /// only, after the base version check.
    pub(crate) fn execute(&self, doc: &mut Document) -> Result<()> {
        match self {
            Operation::Insert(op) => doc.insert_nodes(&op.position, op.nodes.clone()),
            Operation::Move(op) => doc.move_nodes(&op.source, op.how_many, &op.target),
            Operation::Rename(op) => doc.rename_element(&op.position, &op.old_name, &op.new_name),
            Operation::Attribute(op) => {
                doc.change_attribute(&op.range, &op.key, &op.old_value, &op.new_value)
            }
            Operation::RootAttribute(op) => {
                doc.change_root_attribute(&op.root, &op.key, &op.old_value, &op.new_value)
            }
            Operation::Marker(op) => doc.change_marker(&op.name, &op.old_range, &op.new_range),
            Operation::Split(op) => execute_split(op, doc),
            Operation::Merge(op) => execute_merge(op, doc),
            Operation::NoOp(_) => Ok(()),
        }
    }
}

impl MoveOperation {
    /// A move into the graveyard is a remove: non-destructive delete.
    pub fn is_remove(&self) -> bool {
        self.target.root == GRAVEYARD && self.source.root != GRAVEYARD
    }

    pub fn source_range(&self) -> Range {
        Range::from_position_and_shift(&self.source, self.how_many)
    }
}

fn execute_split(op: &SplitOperation, doc: &mut Document) -> Result<()> {
    let shell = match &op.graveyard_position {
        Some(position) => {
            let node = doc.extract_single(position)?;
            match node {
                Node::Element(element) => element,
                Node::Text(_) => return Err(ModelError::BadRange),
            }
        }
        None => doc.parent_element(&op.split_position)?.shell(),
    };
    doc.insert_nodes(&op.insertion_position, vec![Node::Element(shell)])?;
    let split_at = op
        .split_position
        .transformed_by_insertion(&op.insertion_position, 1, false);
    doc.move_nodes(&split_at, op.how_many, &op.move_target())
}

fn execute_merge(op: &MergeOperation, doc: &mut Document) -> Result<()> {
    doc.move_nodes(&op.source_position, op.how_many, &op.target_position)?;
    let element = op.merged_element_position();
    doc.move_nodes(&element, 1, &op.graveyard_position)
}
