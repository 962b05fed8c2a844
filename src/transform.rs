//! Operational transformation: rebasing concurrent operations onto each other
//! so that every client converges on the same tree.
//!
//! The central contract is the diamond law: for concurrent `a` and `b` based
//! on the same version, applying `a` then `transform(b, a)` yields the same
//! visible content as applying `b` then `transform(a, b)`. A transform may
//! fan one operation out into several (an attribute change split around a
//! concurrent insertion, a move broken into pieces), so the result is always
//! a list. Ties between equally valid outcomes are broken by the context: one
//! side is strong, the other yields.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::history::History;
use crate::model::{GRAVEYARD, Position, Range, nodes_offset_size};
use crate::operation::{
    AttributeOperation, InsertOperation, MergeOperation, MoveOperation, Operation, RenameOperation,
    SplitOperation,
};

/// Recorded intention between two specific operations, used instead of the
/// strength tie-break when both sides know how the operations were related
/// when they were created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `a`'s content belongs before `b`'s.
    InsertBefore,
    /// `a`'s content belongs after `b`'s.
    InsertAfter,
}

impl Relation {
    /// The same relation seen from the other operation's side.
    pub fn flipped(self) -> Relation {
        match self {
            Relation::InsertBefore => Relation::InsertAfter,
            Relation::InsertAfter => Relation::InsertBefore,
        }
    }
}

/// Everything a single pairwise transform is allowed to know beyond the two
/// operations themselves.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// Whether `a` wins ties. Derived from client registration order during
    /// synchronization: the later-registered client is strong.
    pub a_is_strong: bool,
    /// Whether `a` was later canceled by an inverse in its own history.
    pub a_was_undone: bool,
    /// Whether `b` was later canceled by an inverse in its own history.
    /// A removal that was undone must not swallow concurrent content.
    pub b_was_undone: bool,
    pub relation: Option<Relation>,
}

/// Transforms `a` so it applies after `b`. Both must be based on the same
/// document version; the results are based right after `b`.
pub fn transform(a: Operation, b: &Operation, ctx: &TransformContext) -> Vec<Operation> {
    let base = b.base_version() + 1;
    if ctx.a_was_undone {
        // a cancelled operation contributes nothing on another timeline; the
        // inverse that cancelled it travels in the same set and is suppressed
        // with it
        return vec![Operation::no_op(base)];
    }
    let mut out = match a {
        Operation::NoOp(_) => vec![a],
        Operation::Insert(op) => transform_insert(op, b, ctx),
        Operation::Attribute(op) => transform_attribute(op, b, ctx),
        Operation::RootAttribute(op) => transform_root_attribute(op, b, ctx),
        Operation::Rename(op) => transform_rename(op, b, ctx),
        Operation::Marker(op) => transform_marker(op, b, ctx),
        Operation::Move(op) => transform_move(op, b, ctx),
        Operation::Split(op) => transform_split(op, b, ctx),
        Operation::Merge(op) => transform_merge(op, b, ctx),
    };
    for (index, op) in out.iter_mut().enumerate() {
        op.set_base_version(base + index as u64);
    }
    out
}

// -- structural effects ------------------------------------------------------

/// Primitive tree effects of one operation, in application order. Split and
/// merge decompose into the same moves their execution performs, so mapping
/// positions over an operation means folding them over its effects.
enum Effect {
    Insert {
        at: Position,
        how_many: u32,
    },
    Move {
        source: Position,
        target: Position,
        how_many: u32,
    },
}

impl Effect {
    fn map_position(&self, position: &Position, shift_on_equal: bool) -> Position {
        match self {
            Effect::Insert { at, how_many } => {
                position.transformed_by_insertion(at, *how_many, shift_on_equal)
            }
            Effect::Move {
                source,
                target,
                how_many,
            } => position.transformed_by_move(source, target, *how_many, shift_on_equal),
        }
    }

    fn map_range(&self, range: &Range, spread: bool) -> Vec<Range> {
        match self {
            Effect::Insert { at, how_many } => range.transformed_by_insertion(at, *how_many, spread),
            Effect::Move {
                source,
                target,
                how_many,
            } => range.transformed_by_move(source, target, *how_many, spread),
        }
    }

    /// Live-range mapping, identical to what [`crate::model::Document`]
    /// applies to markers and the selection when the effect executes.
    fn adjust_range(&self, range: &Range) -> Range {
        match self {
            Effect::Insert { at, how_many } => range.adjusted_by_insertion(at, *how_many),
            Effect::Move {
                source,
                target,
                how_many,
            } => range.adjusted_by_move(source, target, *how_many),
        }
    }

    fn is_remove(&self) -> bool {
        matches!(
            self,
            Effect::Move { source, target, .. }
                if target.root == GRAVEYARD && source.root != GRAVEYARD
        )
    }
}

fn effects_of(op: &Operation) -> Vec<Effect> {
    match op {
        Operation::Insert(op) => vec![Effect::Insert {
            at: op.position.clone(),
            how_many: nodes_offset_size(&op.nodes),
        }],
        Operation::Move(op) => vec![Effect::Move {
            source: op.source.clone(),
            target: op.target.clone(),
            how_many: op.how_many,
        }],
        Operation::Split(op) => {
            let first = match &op.graveyard_position {
                Some(graveyard) => Effect::Move {
                    source: graveyard.clone(),
                    target: op.insertion_position.clone(),
                    how_many: 1,
                },
                None => Effect::Insert {
                    at: op.insertion_position.clone(),
                    how_many: 1,
                },
            };
            let split_at = op
                .split_position
                .transformed_by_insertion(&op.insertion_position, 1, false);
            vec![
                first,
                Effect::Move {
                    source: split_at,
                    target: op.move_target(),
                    how_many: op.how_many,
                },
            ]
        }
        Operation::Merge(op) => vec![
            Effect::Move {
                source: op.source_position.clone(),
                target: op.target_position.clone(),
                how_many: op.how_many,
            },
            Effect::Move {
                source: op.merged_element_position(),
                target: op.graveyard_position.clone(),
                how_many: 1,
            },
        ],
        _ => Vec::new(),
    }
}

fn map_position(position: &Position, effects: &[Effect]) -> Position {
    let mut out = position.clone();
    for effect in effects {
        out = effect.map_position(&out, false);
    }
    out
}

/// Maps the position of a single node (a one-offset range) so it follows the
/// node through concurrent moves.
fn map_node_position(position: &Position, effects: &[Effect]) -> Position {
    let mut range = Range::from_position_and_shift(position, 1);
    for effect in effects {
        if let Some(first) = effect.map_range(&range, false).into_iter().next() {
            range = first;
        }
    }
    range.start
}

/// The element a split operation splits.
fn split_element(op: &SplitOperation) -> Position {
    Position::new(
        &op.split_position.root,
        op.split_position.parent_path().to_vec(),
    )
}

// -- per-kind rules ----------------------------------------------------------

fn transform_insert(
    mut op: InsertOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    if let Operation::Insert(other) = b {
        let shift_on_equal = if op.position.is_equal(&other.position) {
            match ctx.relation {
                Some(Relation::InsertBefore) => false,
                Some(Relation::InsertAfter) => true,
                None => !ctx.a_is_strong,
            }
        } else {
            false
        };
        op.position = op.position.transformed_by_insertion(
            &other.position,
            nodes_offset_size(&other.nodes),
            shift_on_equal,
        );
    } else {
        op.position = map_position(&op.position, &effects_of(b));
    }
    vec![Operation::Insert(op)]
}

fn transform_attribute(
    op: AttributeOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    let key = op.key.clone();
    let new_value = op.new_value.clone();
    let remake = move |range: Range, old_value: Option<serde_json::Value>| {
        Operation::Attribute(AttributeOperation {
            range,
            key: key.clone(),
            old_value,
            new_value: new_value.clone(),
            base_version: 0,
        })
    };
    if let Operation::Attribute(other) = b {
        if other.key == op.key {
            if let Some(common) = op.range.intersection(&other.range) {
                let mut out: Vec<Operation> = op
                    .range
                    .difference(&other.range)
                    .into_iter()
                    .map(|range| remake(range, op.old_value.clone()))
                    .collect();
                if ctx.a_is_strong && op.new_value != other.new_value {
                    // overwrite the overlap, whose value b already changed
                    out.push(remake(common, other.new_value.clone()));
                }
                if out.is_empty() {
                    out.push(Operation::no_op(0));
                }
                return out;
            }
        }
        return vec![Operation::Attribute(op)];
    }
    let effects = effects_of(b);
    if effects.is_empty() {
        return vec![Operation::Attribute(op)];
    }
    let was_in_graveyard = op.range.start.root == GRAVEYARD;
    let mut ranges = vec![op.range.clone()];
    for effect in &effects {
        ranges = ranges
            .iter()
            .flat_map(|range| effect.map_range(range, true))
            .collect();
    }
    let out: Vec<Operation> = ranges
        .into_iter()
        .filter(|range| !range.is_collapsed())
        .filter(|range| {
            // pieces that fell into the graveyard no longer matter, unless
            // the removal that put them there is itself undone
            ctx.b_was_undone || was_in_graveyard || range.start.root != GRAVEYARD
        })
        .map(|range| remake(range, op.old_value.clone()))
        .collect();
    if out.is_empty() {
        vec![Operation::no_op(0)]
    } else {
        out
    }
}

fn transform_root_attribute(
    mut op: crate::operation::RootAttributeOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    if let Operation::RootAttribute(other) = b {
        if other.root == op.root && other.key == op.key {
            if !ctx.a_is_strong || op.new_value == other.new_value {
                return vec![Operation::no_op(0)];
            }
            op.old_value = other.new_value.clone();
        }
    }
    vec![Operation::RootAttribute(op)]
}

fn transform_rename(
    mut op: RenameOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    match b {
        Operation::Rename(other) if other.position.is_equal(&op.position) => {
            if !ctx.a_is_strong || op.new_name == other.new_name {
                return vec![Operation::no_op(0)];
            }
            op.old_name = other.new_name.clone();
            vec![Operation::Rename(op)]
        }
        Operation::Split(other)
            if other.graveyard_position.is_none()
                && other.split_position.root == op.position.root
                && other.split_position.parent_path() == op.position.path.as_slice() =>
        {
            // the split cloned the renamed element's shell under the old
            // name, so both halves need the rename
            let clone_rename = RenameOperation {
                position: other.insertion_position.clone(),
                old_name: op.old_name.clone(),
                new_name: op.new_name.clone(),
                base_version: 0,
            };
            op.position = map_node_position(&op.position, &effects_of(b));
            vec![Operation::Rename(op), Operation::Rename(clone_rename)]
        }
        _ => {
            op.position = map_node_position(&op.position, &effects_of(b));
            vec![Operation::Rename(op)]
        }
    }
}

fn transform_marker(
    mut op: crate::operation::MarkerOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    if let Operation::Marker(other) = b {
        if other.name == op.name {
            if !ctx.a_is_strong || op.new_range == other.new_range {
                return vec![Operation::no_op(0)];
            }
            op.old_range = other.new_range.clone();
            return vec![Operation::Marker(op)];
        }
    }
    // both ranges follow the document's live-range adjustment, so the old
    // range still matches what the receiving document holds
    for effect in &effects_of(b) {
        op.old_range = op.old_range.map(|range| effect.adjust_range(&range));
        op.new_range = op.new_range.map(|range| effect.adjust_range(&range));
    }
    vec![Operation::Marker(op)]
}

fn transform_move(op: MoveOperation, b: &Operation, ctx: &TransformContext) -> Vec<Operation> {
    let op_is_remove = op.is_remove();
    // a range covering an element that gets split keeps covering both halves
    let swallow = match b {
        Operation::Split(other) => Some(Range::from_position_and_shift(&split_element(other), 1)),
        _ => None,
    };
    let target_ties = match b {
        Operation::Move(other) => op.target.is_equal(&other.target),
        Operation::Insert(other) => op.target.is_equal(&other.position),
        _ => false,
    };
    let shift_target = target_ties && !ctx.a_is_strong;

    let mut ranges = vec![op.source_range()];
    let mut target = op.target.clone();
    for (index, effect) in effects_of(b).iter().enumerate() {
        let swallow_here = if index == 0 { swallow.as_ref() } else { None };
        let mut next = Vec::new();
        for range in &ranges {
            if let Some(element) = swallow_here {
                if range.contains_range(element) {
                    next.push(Range::new(
                        effect.map_position(&range.start, false),
                        effect.map_position(&range.end, true),
                    ));
                    continue;
                }
            }
            match effect {
                Effect::Insert { at, how_many } => {
                    // a source range grows over concurrent interior insertions
                    next.extend(range.transformed_by_insertion(at, *how_many, false));
                }
                Effect::Move {
                    source,
                    target: fx_target,
                    how_many,
                } => {
                    next.extend(transform_move_range(
                        range,
                        source,
                        fx_target,
                        *how_many,
                        effect.is_remove(),
                        op_is_remove,
                        ctx,
                    ));
                }
            }
        }
        ranges = next;
        target = effect.map_position(&target, shift_target);
    }
    ranges.retain(|range| !range.is_collapsed());
    if ranges.is_empty() {
        return vec![Operation::no_op(0)];
    }
    make_move_ops(ranges, target)
}

/// One move-like effect of `b` applied to one source range of `a`.
fn transform_move_range(
    range: &Range,
    source: &Position,
    fx_target: &Position,
    how_many: u32,
    fx_is_remove: bool,
    op_is_remove: bool,
    ctx: &TransformContext,
) -> Vec<Range> {
    let moved = Range::from_position_and_shift(source, how_many);
    let mut out = Vec::new();
    if moved.contains_range(range) {
        if fx_is_remove && !ctx.b_was_undone {
            // the content is already in the graveyard; nothing left to move
            return out;
        }
        if ctx.b_was_undone || op_is_remove || ctx.a_is_strong {
            out.extend(range.transformed_by_move(source, fx_target, how_many, false));
        }
        return out;
    }
    if range.start.same_parent_as(source) && range.intersection(&moved).is_some() {
        for part in range.difference(&moved) {
            out.extend(part.transformed_by_move(source, fx_target, how_many, false));
        }
        if let Some(common) = range.intersection(&moved) {
            let follow = ctx.b_was_undone || (!fx_is_remove && (op_is_remove || ctx.a_is_strong));
            if follow {
                out.extend(common.transformed_by_move(source, fx_target, how_many, false));
            }
        }
        return out;
    }
    if range.contains_range(&moved)
        && !range.start.same_parent_as(source)
        && !fx_is_remove
        && !ctx.b_was_undone
        && (op_is_remove || ctx.a_is_strong)
    {
        // content escaped from deeper inside the range; chase it to where it
        // landed so a removal's intent covers it
        let landing = fx_target
            .transformed_by_deletion(source, how_many)
            .unwrap_or_else(|| fx_target.clone());
        out.extend(range.transformed_by_move(source, fx_target, how_many, false));
        if !range.contains_position(&landing) {
            out.push(Range::from_position_and_shift(&landing, how_many));
        }
        return out;
    }
    range.transformed_by_move(source, fx_target, how_many, false)
}

/// Builds one move per range, remapping the later ranges and advancing the
/// target over each emitted move so the pieces land in order.
fn make_move_ops(ranges: Vec<Range>, target: Position) -> Vec<Operation> {
    let mut out = Vec::new();
    let mut queue = ranges;
    let mut target = target;
    while !queue.is_empty() {
        let range = queue.remove(0);
        if range.is_collapsed() {
            continue;
        }
        let how_many = range.flat_size();
        let source = range.start.clone();
        for rest in &mut queue {
            if let Some(mapped) = rest
                .transformed_by_move(&source, &target, how_many, false)
                .into_iter()
                .next()
            {
                *rest = mapped;
            }
        }
        let landing = target
            .transformed_by_deletion(&source, how_many)
            .unwrap_or_else(|| target.clone());
        out.push(Operation::Move(MoveOperation {
            source,
            how_many,
            target: target.clone(),
            base_version: 0,
        }));
        target = landing.shifted(how_many as i64);
    }
    if out.is_empty() {
        vec![Operation::no_op(0)]
    } else {
        out
    }
}

fn transform_split(
    mut op: SplitOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    let element = split_element(&op);
    match b {
        Operation::Split(other) if other.split_position.is_equal(&op.split_position) => {
            return vec![Operation::no_op(0)];
        }
        Operation::Merge(other)
            if other.merged_element_position().is_equal(&element) && !ctx.b_was_undone =>
        {
            // the element being split was merged away; the merge wins
            return vec![Operation::no_op(0)];
        }
        Operation::Move(other)
            if other.is_remove()
                && !ctx.b_was_undone
                && other
                    .source_range()
                    .contains_range(&Range::from_position_and_shift(&element, 1)) =>
        {
            return vec![Operation::no_op(0)];
        }
        _ => {}
    }
    let effects = effects_of(b);
    let mut pieces = vec![Range::from_position_and_shift(&op.split_position, op.how_many)];
    for effect in &effects {
        pieces = pieces
            .iter()
            .flat_map(|piece| effect.map_range(piece, false))
            .collect();
    }
    let position = map_position(&op.split_position, &effects);
    let chosen = pieces
        .iter()
        .find(|piece| piece.start.is_equal(&position))
        .or_else(|| pieces.iter().find(|piece| !piece.is_collapsed()))
        .or_else(|| pieces.first());
    match chosen {
        Some(piece) => {
            op.split_position = piece.start.clone();
            op.how_many = piece.flat_size();
        }
        None => {
            op.split_position = position;
            op.how_many = 0;
        }
    }
    op.insertion_position = SplitOperation::insertion_after(&op.split_position);
    op.graveyard_position = op
        .graveyard_position
        .as_ref()
        .map(|graveyard| map_position(graveyard, &effects));
    vec![Operation::Split(op)]
}

fn transform_merge(
    mut op: MergeOperation,
    b: &Operation,
    ctx: &TransformContext,
) -> Vec<Operation> {
    let element = op.merged_element_position();
    match b {
        Operation::Merge(other) if other.merged_element_position().is_equal(&element) => {
            if op.target_position.is_equal(&other.target_position) || !ctx.a_is_strong {
                return vec![Operation::no_op(0)];
            }
            // both merged the same element into different targets; re-route
            // the content b already moved instead of merging again
            let effects = effects_of(b);
            return vec![Operation::Move(MoveOperation {
                source: map_position(&op.source_position, &effects),
                how_many: op.how_many,
                target: map_position(&op.target_position, &effects),
                base_version: 0,
            })];
        }
        Operation::Split(other)
            if other.graveyard_position.is_none()
                && other.split_position.root == element.root
                && other.split_position.parent_path() == element.path.as_slice() =>
        {
            // the merged element was split in two; merge both halves, left
            // half first, then the clone which slides into the same slot
            let front = op.how_many - other.how_many;
            let second_target = op.target_position.shifted(front as i64);
            let first = MergeOperation {
                source_position: op.source_position.clone(),
                how_many: front,
                target_position: op.target_position.clone(),
                graveyard_position: op.graveyard_position.clone(),
                base_version: 0,
            };
            let second = MergeOperation {
                source_position: op.source_position.clone(),
                how_many: other.how_many,
                target_position: second_target,
                graveyard_position: Position::new(GRAVEYARD, vec![0]),
                base_version: 0,
            };
            return vec![Operation::Merge(first), Operation::Merge(second)];
        }
        Operation::Move(other)
            if other.is_remove()
                && !ctx.b_was_undone
                && other
                    .source_range()
                    .contains_range(&Range::from_position_and_shift(&element, 1)) =>
        {
            return vec![Operation::no_op(0)];
        }
        _ => {}
    }
    let effects = effects_of(b);
    let mut pieces = vec![Range::from_position_and_shift(&op.source_position, op.how_many)];
    for effect in &effects {
        pieces = pieces
            .iter()
            .flat_map(|piece| effect.map_range(piece, false))
            .collect();
    }
    let position = map_position(&op.source_position, &effects);
    let chosen = pieces
        .iter()
        .find(|piece| piece.start.is_equal(&position))
        .or_else(|| pieces.iter().find(|piece| !piece.is_collapsed()))
        .or_else(|| pieces.first());
    match chosen {
        Some(piece) => {
            op.source_position = piece.start.clone();
            op.how_many = piece.flat_size();
        }
        None => {
            op.source_position = position;
            op.how_many = 0;
        }
    }
    let target_ties =
        matches!(b, Operation::Merge(other) if op.target_position.is_equal(&other.target_position));
    let shift_target = target_ties && !ctx.a_is_strong;
    for effect in &effects {
        op.target_position = effect.map_position(&op.target_position, shift_target);
        op.graveyard_position = effect.map_position(&op.graveyard_position, false);
    }
    vec![Operation::Merge(op)]
}

// -- set-level transformation ------------------------------------------------

/// Options for [`transform_sets`].
#[derive(Debug, Clone, Default)]
pub struct TransformSetsOptions<'a> {
    /// Whether the `a` side wins ties.
    pub a_is_strong: bool,
    /// Pad the shorter transformed side with no-ops so both documents end
    /// at the same version, which the sync protocol requires.
    pub pad_with_no_ops: bool,
    /// Recorded relations between `(a index, b index)` pairs of the input
    /// sets, consulted instead of the strength tie-break where present.
    pub relations: HashMap<(usize, usize), Relation>,
    /// History of the document that produced the `a` set, for undo flags.
    pub history_a: Option<&'a History>,
    /// History of the document that produced the `b` set, for undo flags.
    pub history_b: Option<&'a History>,
}

/// An operation in flight through the set transformation, remembering which
/// input it came from and whether that input was undone.
#[derive(Debug, Clone)]
struct Tagged {
    op: Operation,
    origin: usize,
    undone: bool,
}

/// Transforms two concurrent operation sets against each other. Returns
/// `(a', b')`: `a'` applies after the `b` set, `b'` after the `a` set, with
/// base versions renumbered to follow the respective set.
pub fn transform_sets(
    ops_a: Vec<Operation>,
    ops_b: Vec<Operation>,
    options: &TransformSetsOptions<'_>,
) -> (Vec<Operation>, Vec<Operation>) {
    let base = ops_a
        .first()
        .map(Operation::base_version)
        .or_else(|| ops_b.first().map(Operation::base_version));
    let len_a = ops_a.len() as u64;
    let len_b = ops_b.len() as u64;
    trace!(len_a, len_b, "transforming operation sets");

    let tag = |ops: Vec<Operation>, history: Option<&History>| -> Vec<Tagged> {
        let versions: HashSet<u64> = ops.iter().map(Operation::base_version).collect();
        ops.into_iter()
            .enumerate()
            .map(|(origin, op)| {
                // an operation counts as undone only when the inverse that
                // cancelled it travels in the same set, and vice versa; a
                // lone inverse still has to carry the undo to other clients
                let version = op.base_version();
                let undone = history.is_some_and(|h| {
                    h.undoing_version_of(version)
                        .is_some_and(|undoing| versions.contains(&undoing))
                        || h.undone_version_of(version)
                            .is_some_and(|undone| versions.contains(&undone))
                });
                Tagged { undone, origin, op }
            })
            .collect()
    };
    let tagged_a = tag(ops_a, options.history_a);
    let tagged_b = tag(ops_b, options.history_b);

    let (out_a, out_b) = transform_tagged(tagged_a, tagged_b, options);
    let mut a: Vec<Operation> = out_a.into_iter().map(|tagged| tagged.op).collect();
    let mut b: Vec<Operation> = out_b.into_iter().map(|tagged| tagged.op).collect();

    if options.pad_with_no_ops {
        let a_side_total = len_a + b.len() as u64;
        let b_side_total = len_b + a.len() as u64;
        for _ in b_side_total..a_side_total {
            a.push(Operation::no_op(0));
        }
        for _ in a_side_total..b_side_total {
            b.push(Operation::no_op(0));
        }
    }
    if let Some(base) = base {
        for (index, op) in a.iter_mut().enumerate() {
            op.set_base_version(base + len_b + index as u64);
        }
        for (index, op) in b.iter_mut().enumerate() {
            op.set_base_version(base + len_a + index as u64);
        }
    }
    (a, b)
}

/// Recursive diamond sweep: a head operation of one side is transformed over
/// the whole other side, then the rest over the updated other side.
fn transform_tagged(
    a: Vec<Tagged>,
    b: Vec<Tagged>,
    options: &TransformSetsOptions<'_>,
) -> (Vec<Tagged>, Vec<Tagged>) {
    if a.is_empty() || b.is_empty() {
        return (a, b);
    }
    if a.len() == 1 && b.len() == 1 {
        return transform_pair(&a[0], &b[0], options);
    }
    if a.len() > 1 {
        let mut rest = a;
        let head = vec![rest.remove(0)];
        let (head_out, b_mid) = transform_tagged(head, b, options);
        let (rest_out, b_out) = transform_tagged(rest, b_mid, options);
        let mut a_out = head_out;
        a_out.extend(rest_out);
        (a_out, b_out)
    } else {
        let mut rest = b;
        let head = vec![rest.remove(0)];
        let (a_mid, head_out) = transform_tagged(a, head, options);
        let (a_out, rest_out) = transform_tagged(a_mid, rest, options);
        let mut b_out = head_out;
        b_out.extend(rest_out);
        (a_out, b_out)
    }
}

fn transform_pair(
    a: &Tagged,
    b: &Tagged,
    options: &TransformSetsOptions<'_>,
) -> (Vec<Tagged>, Vec<Tagged>) {
    let relation = options.relations.get(&(a.origin, b.origin)).copied();
    let ctx_a = TransformContext {
        a_is_strong: options.a_is_strong,
        a_was_undone: a.undone,
        b_was_undone: b.undone,
        relation,
    };
    let ctx_b = TransformContext {
        a_is_strong: !options.a_is_strong,
        a_was_undone: b.undone,
        b_was_undone: a.undone,
        relation: relation.map(Relation::flipped),
    };
    let retag = |ops: Vec<Operation>, origin: usize, undone: bool| -> Vec<Tagged> {
        ops.into_iter()
            .map(|op| Tagged { op, origin, undone })
            .collect()
    };
    let a_out = retag(transform(a.op.clone(), &b.op, &ctx_a), a.origin, a.undone);
    let b_out = retag(transform(b.op.clone(), &a.op, &ctx_b), b.origin, b.undone);
    (a_out, b_out)
}
