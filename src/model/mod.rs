//! Document model: the attributed tree, positions into it, and the document
//! aggregate owning roots, version, history and markers.
//!
//! Structural mutation goes through operations only; feature code uses the
//! writer from [`crate::batch`] so every change lands in the history. The
//! graveyard root keeps removed subtrees around, which lets a remove be an
//! ordinary move and makes its inverse exact.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::trace;

use crate::batch::Batch;
use crate::history::History;
use crate::operation::Operation;

pub mod node;
pub mod position;

pub use node::{Attributes, Element, Node, Text, nodes_offset_size};
pub use position::{Position, PositionRelation, Range};

/// Root holding removed subtrees; never part of the visible document.
pub const GRAVEYARD: &str = "$graveyard";

/// Default content root created with every document.
pub const MAIN_ROOT: &str = "main";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("operation base version {operation} does not match document version {document}")]
    VersionMismatch { operation: u64, document: u64 },
    #[error("offset {offset} is out of bounds (max {max})")]
    OffsetOutOfBounds { offset: u32, max: u32 },
    #[error("path {path:?} in root `{root}` does not resolve to an element")]
    PositionOutOfBounds { root: String, path: Vec<u32> },
    #[error("unknown root `{0}`")]
    UnknownRoot(String),
    #[error("root `{0}` already exists")]
    RootExists(String),
    #[error("unknown marker `{0}`")]
    UnknownMarker(String),
    #[error("marker `{0}` already exists")]
    MarkerExists(String),
    #[error("marker `{0}` is not at its expected range")]
    MarkerMismatch(String),
    #[error("attribute `{key}` does not have the expected old value")]
    AttributeMismatch { key: String },
    #[error("rename target is not an element named `{0}`")]
    RenameMismatch(String),
    #[error("range is not flat or is inverted")]
    BadRange,
    #[error("history range {from}..{to} is out of bounds")]
    HistoryGap { from: u64, to: u64 },
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("wire serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Structural change notification; a fixed, typed channel set consumed by
/// converters and the sync harness via [`Document::take_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    NodesInserted { position: Position, how_many: u32 },
    NodesMoved { source: Position, target: Position, how_many: u32 },
    NodesRemoved { position: Position, how_many: u32 },
    NodeRenamed { position: Position, old_name: String, new_name: String },
    AttributeChanged { range: Range, key: String },
    RootAttributeChanged { root: String, key: String },
    MarkerChanged { name: String },
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    roots: BTreeMap<String, Element>,
    version: u64,
    history: History,
    markers: BTreeMap<String, Range>,
    selection: Option<Range>,
    events: Vec<ChangeEvent>,
    pub(crate) undo_stack: Vec<Batch>,
    pub(crate) active_batch: Option<Batch>,
    pub(crate) batch_depth: u32,
}

impl Document {
    pub fn new() -> Document {
        let mut roots = BTreeMap::new();
        roots.insert(MAIN_ROOT.to_string(), Element::new("$root"));
        roots.insert(GRAVEYARD.to_string(), Element::new("$root"));
        Document {
            roots,
            ..Document::default()
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn root(&self, name: &str) -> Result<&Element> {
        self.roots
            .get(name)
            .ok_or_else(|| ModelError::UnknownRoot(name.to_string()))
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Adds a detached content root. Root management is an aggregate-level
    /// mutation, not an operation: it is neither undoable nor synced.
    pub fn add_root(&mut self, name: &str) -> Result<()> {
        if self.roots.contains_key(name) {
            return Err(ModelError::RootExists(name.to_string()));
        }
        self.roots.insert(name.to_string(), Element::new("$root"));
        Ok(())
    }

    pub fn detach_root(&mut self, name: &str) -> Result<()> {
        if name == MAIN_ROOT || name == GRAVEYARD {
            return Err(ModelError::UnknownRoot(name.to_string()));
        }
        self.roots
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ModelError::UnknownRoot(name.to_string()))
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub(crate) fn set_selection(&mut self, range: Option<Range>) {
        self.selection = range;
    }

    /// Drains the structural change notifications queued since the last call.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn marker(&self, name: &str) -> Option<&Range> {
        self.markers.get(name)
    }

    pub fn markers_intersecting<'a>(
        &'a self,
        range: &'a Range,
    ) -> impl Iterator<Item = (&'a str, &'a Range)> {
        self.markers
            .iter()
            .filter(|(_, held)| held.intersection(range).is_some())
            .map(|(name, held)| (name.as_str(), held))
    }

    /// The single application entry point: checks the version ordering
    /// invariant, mutates the tree, records the operation and bumps the
    /// version. Any failure here means the caller sequenced operations
    /// incorrectly and the document must not be used further.
    pub fn apply(&mut self, op: &Operation) -> Result<()> {
        if op.base_version() != self.version {
            return Err(ModelError::VersionMismatch {
                operation: op.base_version(),
                document: self.version,
            });
        }
        trace!(kind = op.kind(), version = self.version, "applying operation");
        op.execute(self)?;
        self.history.record(op.clone())?;
        self.version += 1;
        if let Some(batch) = self.active_batch.as_mut() {
            batch.operations.push(op.clone());
        }
        Ok(())
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Structural equality of visible content: every root except the
    /// graveyard. Used by convergence checks.
    pub fn content_equals(&self, other: &Document) -> bool {
        let visible = |doc: &Document| {
            doc.roots
                .iter()
                .filter(|(name, _)| name.as_str() != GRAVEYARD)
                .map(|(name, root)| (name.clone(), root.clone()))
                .collect::<BTreeMap<_, _>>()
        };
        visible(self) == visible(other) && self.markers == other.markers
    }

    // -- tree resolution ---------------------------------------------------

    fn bad_position(&self, position: &Position) -> ModelError {
        ModelError::PositionOutOfBounds {
            root: position.root.clone(),
            path: position.path.clone(),
        }
    }

    fn element_at_path<'a>(&'a self, root: &str, path: &[u32]) -> Result<&'a Element> {
        let mut current = self.root(root)?;
        for &offset in path {
            current = current.element_at_offset(offset).ok_or_else(|| {
                ModelError::PositionOutOfBounds {
                    root: root.to_string(),
                    path: path.to_vec(),
                }
            })?;
        }
        Ok(current)
    }

    fn element_at_path_mut<'a>(&'a mut self, root: &str, path: &[u32]) -> Result<&'a mut Element> {
        let mut current = self
            .roots
            .get_mut(root)
            .ok_or_else(|| ModelError::UnknownRoot(root.to_string()))?;
        for &offset in path {
            current = current.element_at_offset_mut(offset).ok_or_else(|| {
                ModelError::PositionOutOfBounds {
                    root: root.to_string(),
                    path: path.to_vec(),
                }
            })?;
        }
        Ok(current)
    }

    /// The element a position points into.
    pub fn parent_element(&self, position: &Position) -> Result<&Element> {
        self.element_at_path(&position.root, position.parent_path())
    }

    fn parent_element_mut(&mut self, position: &Position) -> Result<&mut Element> {
        let root = position.root.clone();
        let path = position.parent_path().to_vec();
        self.element_at_path_mut(&root, &path)
    }

    /// The node starting at a position, if any, with read-only access.
    pub fn node_at(&self, position: &Position) -> Result<Option<&Node>> {
        let parent = self.parent_element(position)?;
        Ok(parent
            .child_at_offset(position.offset())
            .filter(|(start, _)| *start == position.offset())
            .map(|(_, node)| node))
    }

    /// Consecutive runs of one attribute's value across a flat range, used by
    /// the writer to build attribute operations with matching old values.
    pub fn attribute_runs(
        &self,
        range: &Range,
        key: &str,
    ) -> Result<Vec<(Range, Option<Value>)>> {
        if !range.is_flat() {
            return Err(ModelError::BadRange);
        }
        let parent = self.parent_element(&range.start)?;
        let (from, to) = (range.start.offset(), range.end.offset());
        let mut runs: Vec<(u32, u32, Option<Value>)> = Vec::new();
        for (start, child) in parent.child_spans() {
            let end = start + child.offset_size();
            if end <= from || start >= to {
                continue;
            }
            let clipped = (start.max(from), end.min(to));
            let value = child.attribute(key).cloned();
            match runs.last_mut() {
                Some((_, run_end, run_value)) if *run_end == clipped.0 && *run_value == value => {
                    *run_end = clipped.1;
                }
                _ => runs.push((clipped.0, clipped.1, value)),
            }
        }
        Ok(runs
            .into_iter()
            .map(|(start, end, value)| {
                (
                    Range::new(range.start.with_offset(start), range.start.with_offset(end)),
                    value,
                )
            })
            .collect())
    }

    // -- structural primitives (operation application only) ----------------

    pub(crate) fn insert_nodes(&mut self, position: &Position, nodes: Vec<Node>) -> Result<()> {
        let how_many = nodes_offset_size(&nodes);
        let parent = self.parent_element_mut(position)?;
        parent.insert_children(position.offset(), nodes)?;
        for range in self.live_ranges() {
            *range = range.adjusted_by_insertion(position, how_many);
        }
        self.events.push(ChangeEvent::NodesInserted {
            position: position.clone(),
            how_many,
        });
        Ok(())
    }

    /// Marker and selection ranges are live: every structural primitive maps
    /// them so they keep pointing at the same content. The transform rules
    /// for marker operations rely on this mapping being applied.
    fn live_ranges(&mut self) -> impl Iterator<Item = &mut Range> {
        self.markers
            .values_mut()
            .chain(self.selection.as_mut())
    }

    pub(crate) fn move_nodes(
        &mut self,
        source: &Position,
        how_many: u32,
        target: &Position,
    ) -> Result<()> {
        if how_many == 0 {
            return Ok(());
        }
        // a target inside the moved content would orphan the subtree
        let landing = target
            .transformed_by_deletion(source, how_many)
            .ok_or(ModelError::BadRange)?;
        let source_parent = self.parent_element_mut(source)?;
        let extracted = source_parent.extract_children(source.offset(), how_many)?;
        let target_parent = self.parent_element_mut(&landing)?;
        target_parent.insert_children(landing.offset(), extracted)?;
        for range in self.live_ranges() {
            *range = range.adjusted_by_move(source, target, how_many);
        }
        let event = if target.root == GRAVEYARD && source.root != GRAVEYARD {
            ChangeEvent::NodesRemoved {
                position: source.clone(),
                how_many,
            }
        } else {
            ChangeEvent::NodesMoved {
                source: source.clone(),
                target: target.clone(),
                how_many,
            }
        };
        self.events.push(event);
        Ok(())
    }

    pub(crate) fn rename_element(
        &mut self,
        position: &Position,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let offset = position.offset();
        let parent = self.parent_element_mut(position)?;
        let element = parent
            .element_at_offset_mut(offset)
            .ok_or_else(|| ModelError::RenameMismatch(old_name.to_string()))?;
        if element.name != old_name {
            return Err(ModelError::RenameMismatch(old_name.to_string()));
        }
        element.name = new_name.to_string();
        self.events.push(ChangeEvent::NodeRenamed {
            position: position.clone(),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    pub(crate) fn change_attribute(
        &mut self,
        range: &Range,
        key: &str,
        old_value: &Option<Value>,
        new_value: &Option<Value>,
    ) -> Result<()> {
        if !range.is_flat() {
            return Err(ModelError::BadRange);
        }
        let parent = self.parent_element_mut(&range.start)?;
        parent.update_attribute_in(
            range.start.offset(),
            range.end.offset(),
            key,
            old_value,
            new_value,
        )?;
        self.events.push(ChangeEvent::AttributeChanged {
            range: range.clone(),
            key: key.to_string(),
        });
        Ok(())
    }

    pub(crate) fn change_root_attribute(
        &mut self,
        root: &str,
        key: &str,
        old_value: &Option<Value>,
        new_value: &Option<Value>,
    ) -> Result<()> {
        let element = self
            .roots
            .get_mut(root)
            .ok_or_else(|| ModelError::UnknownRoot(root.to_string()))?;
        if element.attrs.get(key) != old_value.as_ref() {
            return Err(ModelError::AttributeMismatch {
                key: key.to_string(),
            });
        }
        match new_value {
            Some(value) => {
                element.attrs.insert(key.to_string(), value.clone());
            }
            None => {
                element.attrs.remove(key);
            }
        }
        self.events.push(ChangeEvent::RootAttributeChanged {
            root: root.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    pub(crate) fn change_marker(
        &mut self,
        name: &str,
        old_range: &Option<Range>,
        new_range: &Option<Range>,
    ) -> Result<()> {
        match (old_range, self.markers.get(name)) {
            (Some(expected), Some(held)) if expected == held => {}
            (Some(_), Some(_)) => return Err(ModelError::MarkerMismatch(name.to_string())),
            (Some(_), None) => return Err(ModelError::UnknownMarker(name.to_string())),
            (None, Some(_)) => return Err(ModelError::MarkerExists(name.to_string())),
            (None, None) => {}
        }
        match new_range {
            Some(range) => {
                self.markers.insert(name.to_string(), range.clone());
            }
            None => {
                self.markers.remove(name);
            }
        }
        self.events.push(ChangeEvent::MarkerChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Pulls a single node out of the tree, for split operations reviving a
    /// previously merged element from the graveyard.
    pub(crate) fn extract_single(&mut self, position: &Position) -> Result<Node> {
        let parent = self.parent_element_mut(position)?;
        let mut nodes = parent.extract_children(position.offset(), 1)?;
        nodes.pop().ok_or_else(|| self.bad_position(position))
    }
}
