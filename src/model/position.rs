//! Positions and ranges: transient offset-path coordinates into the tree.
//!
//! A position is a value, not a handle: it names a spot between nodes as an
//! offset path from a named root and goes stale the moment content around it
//! moves. Every mapping method returns a fresh value; nothing here aliases
//! tree state, so transforming one position can never corrupt another.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub root: String,
    pub path: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRelation {
    Before,
    Same,
    After,
    /// Positions in different roots are not comparable.
    Different,
}

impl Position {
    pub fn new(root: &str, path: Vec<u32>) -> Position {
        debug_assert!(!path.is_empty(), "a position needs a parent to point into");
        Position {
            root: root.to_string(),
            path,
        }
    }

    /// Offset in the immediate parent.
    pub fn offset(&self) -> u32 {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn parent_path(&self) -> &[u32] {
        &self.path[..self.path.len() - 1]
    }

    /// Position inside the node this position points at, at the given offset.
    pub fn nested(&self, offset: u32) -> Position {
        let mut path = self.path.clone();
        path.push(offset);
        Position {
            root: self.root.clone(),
            path,
        }
    }

    /// Same parent, different offset.
    pub fn with_offset(&self, offset: u32) -> Position {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            *last = offset;
        }
        Position {
            root: self.root.clone(),
            path,
        }
    }

    pub fn shifted(&self, delta: i64) -> Position {
        self.with_offset((self.offset() as i64 + delta) as u32)
    }

    pub fn same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root
            && self.path.len() == other.path.len()
            && self.parent_path() == other.parent_path()
    }

    /// Lexicographic path comparison; a shorter path that is a prefix of a
    /// longer one comes first (the ancestor boundary precedes its interior).
    pub fn compare(&self, other: &Position) -> PositionRelation {
        if self.root != other.root {
            return PositionRelation::Different;
        }
        for (a, b) in self.path.iter().zip(other.path.iter()) {
            if a < b {
                return PositionRelation::Before;
            }
            if a > b {
                return PositionRelation::After;
            }
        }
        match self.path.len().cmp(&other.path.len()) {
            std::cmp::Ordering::Less => PositionRelation::Before,
            std::cmp::Ordering::Equal => PositionRelation::Same,
            std::cmp::Ordering::Greater => PositionRelation::After,
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::After
    }

    pub fn is_equal(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Same
    }

    /// Maps this position over an insertion of `how_many` offsets at `at`.
    /// `shift_on_equal` decides which side of the inserted content a position
    /// exactly at the insertion point ends up on.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: u32,
        shift_on_equal: bool,
    ) -> Position {
        let mut out = self.clone();
        if self.root != at.root {
            return out;
        }
        let level = at.path.len() - 1;
        if self.path.len() < at.path.len() || self.path[..level] != at.path[..level] {
            return out;
        }
        let shifts = if self.path.len() == at.path.len() {
            at.offset() < self.path[level] || (at.offset() == self.path[level] && shift_on_equal)
        } else {
            // the insertion shifts an ancestor of this position
            at.offset() <= self.path[level]
        };
        if shifts {
            out.path[level] += how_many;
        }
        out
    }

    /// Maps this position over a deletion of `how_many` offsets at `at`.
    /// Returns `None` when the position was inside the deleted content.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: u32) -> Option<Position> {
        let mut out = self.clone();
        if self.root != at.root {
            return Some(out);
        }
        let level = at.path.len() - 1;
        if self.path.len() < at.path.len() || self.path[..level] != at.path[..level] {
            return Some(out);
        }
        if self.path.len() == at.path.len() {
            if at.offset() < self.path[level] {
                if at.offset() + how_many > self.path[level] {
                    return None;
                }
                out.path[level] -= how_many;
            }
        } else if at.offset() <= self.path[level] {
            if at.offset() + how_many > self.path[level] {
                return None;
            }
            out.path[level] -= how_many;
        }
        Some(out)
    }

    /// Rebases a position inside the moved content onto the move target.
    pub fn combined_with(&self, source: &Position, target: &Position) -> Position {
        let level = source.path.len() - 1;
        let mut path = target.path.clone();
        let last = path.len() - 1;
        path[last] = target.offset() + (self.path[level] - source.offset());
        path.extend_from_slice(&self.path[level + 1..]);
        Position {
            root: target.root.clone(),
            path,
        }
    }

    /// Maps this position over a move of `how_many` offsets from `source` to
    /// `target` (target given in pre-move coordinates).
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: u32,
        shift_on_equal: bool,
    ) -> Position {
        if how_many == 0 {
            return self.clone();
        }
        let landing = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        match self.transformed_by_deletion(source, how_many) {
            None => self.combined_with(source, &landing),
            Some(position) => position.transformed_by_insertion(&landing, how_many, shift_on_equal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Range {
        debug_assert!(
            !start.is_after(&end),
            "range start must not be after its end"
        );
        Range { start, end }
    }

    pub fn collapsed(at: Position) -> Range {
        Range {
            start: at.clone(),
            end: at,
        }
    }

    /// Flat range spanning `how_many` offsets after `start`.
    pub fn from_position_and_shift(start: &Position, how_many: u32) -> Range {
        Range {
            start: start.clone(),
            end: start.shifted(how_many as i64),
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start.is_equal(&self.end)
    }

    /// Both ends share a parent.
    pub fn is_flat(&self) -> bool {
        self.start.same_parent_as(&self.end)
    }

    /// Offset span of a flat range.
    pub fn flat_size(&self) -> u32 {
        self.end.offset() - self.start.offset()
    }

    /// Strict interior containment.
    pub fn contains_position(&self, position: &Position) -> bool {
        self.start.is_before(position) && position.is_before(&self.end)
    }

    /// Containment allowing boundary equality.
    pub fn contains_range(&self, other: &Range) -> bool {
        !self.start.is_after(&other.start)
            && !other.end.is_after(&self.end)
            && self.start.compare(&other.start) != PositionRelation::Different
            && self.end.compare(&other.end) != PositionRelation::Different
    }

    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if self.start.compare(&other.start) == PositionRelation::Different {
            return None;
        }
        let start = if self.start.is_before(&other.start) {
            &other.start
        } else {
            &self.start
        };
        let end = if self.end.is_after(&other.end) {
            &other.end
        } else {
            &self.end
        };
        if start.is_before(end) {
            Some(Range::new(start.clone(), end.clone()))
        } else {
            None
        }
    }

    /// Parts of this range not covered by `other`, in document order.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        if self.intersection(other).is_none() {
            return vec![self.clone()];
        }
        let mut parts = Vec::new();
        if self.start.is_before(&other.start) {
            parts.push(Range::new(self.start.clone(), other.start.clone()));
        }
        if other.end.is_before(&self.end) {
            parts.push(Range::new(other.end.clone(), self.end.clone()));
        }
        parts
    }

    /// Maps the range over an insertion. With `spread` an interior insertion
    /// splits the range in two; without it the range expands to keep covering
    /// its content plus the inserted part.
    pub fn transformed_by_insertion(
        &self,
        at: &Position,
        how_many: u32,
        spread: bool,
    ) -> Vec<Range> {
        if spread && self.contains_position(at) {
            let moved = at.transformed_by_insertion(at, how_many, true);
            return vec![
                Range::new(self.start.clone(), at.clone()),
                Range::new(
                    moved,
                    self.end.transformed_by_insertion(at, how_many, false),
                ),
            ];
        }
        if self.is_collapsed() {
            let start = self.start.transformed_by_insertion(at, how_many, false);
            return vec![Range::collapsed(start)];
        }
        vec![Range::new(
            self.start.transformed_by_insertion(at, how_many, true),
            self.end.transformed_by_insertion(at, how_many, false),
        )]
    }

    /// Maps the range over a deletion; `None` when it was fully deleted.
    /// Endpoints inside the deleted content clamp to the deletion point.
    pub fn transformed_by_deletion(&self, at: &Position, how_many: u32) -> Option<Range> {
        let start = self.start.transformed_by_deletion(at, how_many);
        let end = self.end.transformed_by_deletion(at, how_many);
        match (start, end) {
            (None, None) => None,
            (start, end) => Some(Range::new(
                start.unwrap_or_else(|| at.clone()),
                end.unwrap_or_else(|| at.clone()),
            )),
        }
    }

    /// Single-range mapping over an insertion, for live ranges held by the
    /// document (markers, selection). Interior insertions grow the range.
    pub fn adjusted_by_insertion(&self, at: &Position, how_many: u32) -> Range {
        let mut pieces = self.transformed_by_insertion(at, how_many, false);
        match pieces.pop() {
            Some(piece) => piece,
            None => self.clone(),
        }
    }

    /// Single-range mapping over a move, for live ranges held by the document.
    /// Endpoints inside the moved content follow it; the rest stay put.
    pub fn adjusted_by_move(&self, source: &Position, target: &Position, how_many: u32) -> Range {
        Range {
            start: self.start.transformed_by_move(source, target, how_many, false),
            end: self.end.transformed_by_move(source, target, how_many, false),
        }
    }

    /// Maps the range over a move. The result can be several ranges: the part
    /// that stayed put and the part carried to the move target.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: u32,
        spread: bool,
    ) -> Vec<Range> {
        if how_many == 0 {
            return vec![self.clone()];
        }
        let moved = Range::from_position_and_shift(source, how_many);
        let landing = target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| target.clone());
        if moved.contains_range(self) {
            return vec![Range::new(
                self.start.combined_with(source, &landing),
                self.end.combined_with(source, &landing),
            )];
        }
        if !(self.is_flat() && self.start.same_parent_as(source)) {
            // mixed depths: interval arithmetic does not apply, map endpoints
            return vec![Range::new(
                self.start.transformed_by_move(source, target, how_many, false),
                self.end.transformed_by_move(source, target, how_many, false),
            )];
        }
        let mut out = Vec::new();
        for part in self.difference(&moved) {
            let Some(shifted) = part.transformed_by_deletion(source, how_many) else {
                continue;
            };
            out.extend(shifted.transformed_by_insertion(&landing, how_many, spread));
        }
        if let Some(common) = self.intersection(&moved) {
            out.push(Range::new(
                common.start.combined_with(source, &landing),
                common.end.combined_with(source, &landing),
            ));
        }
        if out.is_empty() {
            out.push(Range::collapsed(
                self.start
                    .transformed_by_deletion(source, how_many)
                    .unwrap_or_else(|| landing.clone()),
            ));
        }
        out
    }
}
