//! Change sessions: the writer API that turns edit intents into operations.
//!
//! Feature code never builds operations by hand. It opens a change session on
//! the document and uses the writer, which reads the current tree state to
//! fill in the bookkeeping every operation carries (old values, sizes,
//! graveyard slots) and applies each operation immediately. All operations
//! issued in one session form a batch, the unit of undo.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Document, GRAVEYARD, ModelError, Node, Position, Range, Result};
use crate::operation::{
    AttributeOperation, InsertOperation, MarkerOperation, MergeOperation, MoveOperation, Operation,
    RenameOperation, RootAttributeOperation, SplitOperation,
};
use crate::transform::{TransformSetsOptions, transform_sets};

/// A group of operations applied together; undo reverts whole batches.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub operations: Vec<Operation>,
    pub is_undoable: bool,
    /// Remote batches replay reconciled history; they never become undoable.
    pub is_local: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSpec {
    pub is_undoable: bool,
    pub is_local: bool,
}

impl Default for BatchSpec {
    fn default() -> BatchSpec {
        BatchSpec {
            is_undoable: true,
            is_local: true,
        }
    }
}

impl BatchSpec {
    /// For changes that must not land on the undo stack, like applying a
    /// remote delta or loading initial content.
    pub fn transparent() -> BatchSpec {
        BatchSpec {
            is_undoable: false,
            is_local: false,
        }
    }
}

impl Document {
    /// Opens an undoable change session. Nested calls join the outermost
    /// session's batch.
    pub fn change<T>(&mut self, build: impl FnOnce(&mut Writer<'_>) -> Result<T>) -> Result<T> {
        self.change_with(BatchSpec::default(), build)
    }

    pub fn change_with<T>(
        &mut self,
        spec: BatchSpec,
        build: impl FnOnce(&mut Writer<'_>) -> Result<T>,
    ) -> Result<T> {
        if self.batch_depth == 0 {
            self.active_batch = Some(Batch {
                id: Uuid::new_v4(),
                operations: Vec::new(),
                is_undoable: spec.is_undoable,
                is_local: spec.is_local,
            });
        }
        self.batch_depth += 1;
        let result = build(&mut Writer { doc: self });
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            if let Some(batch) = self.active_batch.take() {
                if result.is_ok() && batch.is_undoable && batch.is_local && !batch.operations.is_empty() {
                    self.undo_stack.push(batch);
                }
            }
        }
        result
    }

    /// Reverts the most recent undoable batch. Each operation's inverse is
    /// transformed over everything that happened since the operation, so undo
    /// removes exactly that batch's effect and leaves later changes alone.
    pub fn undo_last(&mut self) -> Result<()> {
        let batch = self.undo_stack.pop().ok_or(ModelError::NothingToUndo)?;
        debug!(batch = %batch.id, operations = batch.operations.len(), "undoing batch");
        for op in batch.operations.iter().rev() {
            let version = op.base_version();
            let snapshot = self.history().clone();
            let tail = snapshot.get_operations(version + 1, self.version())?.to_vec();
            let (transformed, _) = transform_sets(
                vec![op.reversed()],
                tail,
                &TransformSetsOptions {
                    a_is_strong: false,
                    pad_with_no_ops: false,
                    relations: HashMap::new(),
                    history_a: None,
                    history_b: Some(&snapshot),
                },
            );
            let undoing_version = self.version();
            for inverse in &transformed {
                self.apply(inverse)?;
            }
            self.history_mut().mark_undone(version, undoing_version);
        }
        Ok(())
    }
}

/// Issues operations against the document inside a change session.
pub struct Writer<'a> {
    doc: &'a mut Document,
}

impl Writer<'_> {
    fn next(&self) -> u64 {
        self.doc.version()
    }

    fn issue(&mut self, op: Operation) -> Result<()> {
        self.doc.apply(&op)
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    pub fn insert(&mut self, position: &Position, nodes: Vec<Node>) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        let base_version = self.next();
        self.issue(Operation::Insert(InsertOperation {
            position: position.clone(),
            nodes,
            base_version,
        }))
    }

    pub fn insert_text(&mut self, position: &Position, text: &str) -> Result<()> {
        self.insert(position, vec![Node::text(text)])
    }

    pub fn insert_element(&mut self, position: &Position, name: &str) -> Result<()> {
        self.insert(position, vec![Node::element(name, Vec::new())])
    }

    /// Removes a flat range by moving it to the graveyard.
    pub fn remove(&mut self, range: &Range) -> Result<()> {
        if !range.is_flat() {
            return Err(ModelError::BadRange);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        let base_version = self.next();
        self.issue(Operation::Move(MoveOperation {
            source: range.start.clone(),
            how_many: range.flat_size(),
            target: Position::new(GRAVEYARD, vec![0]),
            base_version,
        }))
    }

    pub fn move_range(&mut self, range: &Range, target: &Position) -> Result<()> {
        if !range.is_flat() {
            return Err(ModelError::BadRange);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        let base_version = self.next();
        self.issue(Operation::Move(MoveOperation {
            source: range.start.clone(),
            how_many: range.flat_size(),
            target: target.clone(),
            base_version,
        }))
    }

    pub fn rename(&mut self, position: &Position, new_name: &str) -> Result<()> {
        let old_name = match self.doc.node_at(position)? {
            Some(Node::Element(element)) => element.name.clone(),
            _ => return Err(ModelError::RenameMismatch(new_name.to_string())),
        };
        if old_name == new_name {
            return Ok(());
        }
        let base_version = self.next();
        self.issue(Operation::Rename(RenameOperation {
            position: position.clone(),
            old_name,
            new_name: new_name.to_string(),
            base_version,
        }))
    }

    pub fn set_attribute(&mut self, range: &Range, key: &str, value: Value) -> Result<()> {
        self.update_attribute(range, key, Some(value))
    }

    pub fn remove_attribute(&mut self, range: &Range, key: &str) -> Result<()> {
        self.update_attribute(range, key, None)
    }

    /// One attribute operation per run of equal old values, so every
    /// operation's old value check holds.
    fn update_attribute(
        &mut self,
        range: &Range,
        key: &str,
        new_value: Option<Value>,
    ) -> Result<()> {
        let runs = self.doc.attribute_runs(range, key)?;
        for (run, old_value) in runs {
            if old_value == new_value {
                continue;
            }
            let base_version = self.next();
            self.issue(Operation::Attribute(AttributeOperation {
                range: run,
                key: key.to_string(),
                old_value,
                new_value: new_value.clone(),
                base_version,
            }))?;
        }
        Ok(())
    }

    pub fn set_root_attribute(
        &mut self,
        root: &str,
        key: &str,
        new_value: Option<Value>,
    ) -> Result<()> {
        let old_value = self.doc.root(root)?.attrs.get(key).cloned();
        if old_value == new_value {
            return Ok(());
        }
        let base_version = self.next();
        self.issue(Operation::RootAttribute(RootAttributeOperation {
            root: root.to_string(),
            key: key.to_string(),
            old_value,
            new_value,
            base_version,
        }))
    }

    pub fn add_marker(&mut self, name: &str, range: &Range) -> Result<()> {
        if self.doc.marker(name).is_some() {
            return Err(ModelError::MarkerExists(name.to_string()));
        }
        let base_version = self.next();
        self.issue(Operation::Marker(MarkerOperation {
            name: name.to_string(),
            old_range: None,
            new_range: Some(range.clone()),
            base_version,
        }))
    }

    pub fn update_marker(&mut self, name: &str, range: &Range) -> Result<()> {
        let old_range = self
            .doc
            .marker(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownMarker(name.to_string()))?;
        let base_version = self.next();
        self.issue(Operation::Marker(MarkerOperation {
            name: name.to_string(),
            old_range: Some(old_range),
            new_range: Some(range.clone()),
            base_version,
        }))
    }

    pub fn remove_marker(&mut self, name: &str) -> Result<()> {
        let old_range = self
            .doc
            .marker(name)
            .cloned()
            .ok_or_else(|| ModelError::UnknownMarker(name.to_string()))?;
        let base_version = self.next();
        self.issue(Operation::Marker(MarkerOperation {
            name: name.to_string(),
            old_range: Some(old_range),
            new_range: None,
            base_version,
        }))
    }

    /// Splits the element the position points into; everything after the
    /// position moves into a fresh element right after it.
    pub fn split(&mut self, position: &Position) -> Result<()> {
        let how_many = self.doc.parent_element(position)?.max_offset() - position.offset();
        let base_version = self.next();
        self.issue(Operation::Split(SplitOperation {
            split_position: position.clone(),
            how_many,
            insertion_position: SplitOperation::insertion_after(position),
            graveyard_position: None,
            base_version,
        }))
    }

    /// Merges the element after the position into the element before it.
    /// The emptied element goes to the graveyard.
    pub fn merge(&mut self, position: &Position) -> Result<()> {
        let offset = position.offset();
        if offset == 0 {
            return Err(ModelError::BadRange);
        }
        let (left_size, right_size) = {
            let parent = self.doc.parent_element(position)?;
            let left = parent
                .element_at_offset(offset - 1)
                .ok_or(ModelError::BadRange)?;
            let right = parent.element_at_offset(offset).ok_or(ModelError::BadRange)?;
            (left.max_offset(), right.max_offset())
        };
        let base_version = self.next();
        self.issue(Operation::Merge(MergeOperation {
            source_position: position.nested(0),
            how_many: right_size,
            target_position: position.shifted(-1).nested(left_size),
            graveyard_position: Position::new(GRAVEYARD, vec![0]),
            base_version,
        }))
    }

    /// Wraps a flat range in a new element with the given name.
    pub fn wrap(&mut self, range: &Range, name: &str) -> Result<()> {
        if !range.is_flat() {
            return Err(ModelError::BadRange);
        }
        let how_many = range.flat_size();
        self.insert_element(&range.end, name)?;
        let base_version = self.next();
        self.issue(Operation::Move(MoveOperation {
            source: range.start.clone(),
            how_many,
            target: range.end.nested(0),
            base_version,
        }))
    }

    /// Replaces the element at the position with its children.
    pub fn unwrap(&mut self, position: &Position) -> Result<()> {
        let how_many = match self.doc.node_at(position)? {
            Some(Node::Element(element)) => element.max_offset(),
            _ => return Err(ModelError::BadRange),
        };
        let base_version = self.next();
        self.issue(Operation::Move(MoveOperation {
            source: position.nested(0),
            how_many,
            target: position.clone(),
            base_version,
        }))?;
        self.remove(&Range::from_position_and_shift(
            &position.shifted(how_many as i64),
            1,
        ))
    }

    /// Selection is editor state, not content: no operation is issued and
    /// the change is neither undoable nor synchronized.
    pub fn set_selection(&mut self, range: Option<Range>) {
        self.doc.set_selection(range);
    }
}
