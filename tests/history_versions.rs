use doc_ot::{Document, MAIN_ROOT, ModelError, Operation, Position};

fn pos(path: &[u32]) -> Position {
    Position::new(MAIN_ROOT, path.to_vec())
}

fn seeded() -> Document {
    let mut doc = Document::new();
    doc.change(|writer| {
        writer.insert_element(&pos(&[0]), "paragraph")?;
        writer.insert_text(&pos(&[0, 0]), "Foo")
    })
    .unwrap();
    doc
}

#[test]
fn every_operation_bumps_the_version_by_one() {
    let doc = seeded();
    assert_eq!(doc.version(), 2);
    assert_eq!(doc.history().version(), 2);
    assert_eq!(doc.history().operation_at(0).unwrap().kind(), "insert");
}

#[test]
fn stale_base_version_is_rejected() {
    let mut doc = seeded();
    let stale = doc.history().operation_at(0).unwrap().clone();
    assert_eq!(
        doc.apply(&stale),
        Err(ModelError::VersionMismatch {
            operation: 0,
            document: 2,
        })
    );
}

#[test]
fn future_base_version_is_rejected() {
    let mut doc = seeded();
    let mut op = doc.history().operation_at(1).unwrap().clone();
    op.set_base_version(5);
    assert!(matches!(
        doc.apply(&op),
        Err(ModelError::VersionMismatch { operation: 5, .. })
    ));
}

#[test]
fn history_slices_by_version_range() {
    let doc = seeded();
    let ops = doc.history().get_operations(1, 2).unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind(), "insert");
    assert_eq!(
        doc.history().get_operations(1, 9).unwrap_err(),
        ModelError::HistoryGap { from: 1, to: 9 }
    );
}

#[test]
fn undo_records_which_version_undid_which() {
    let mut doc = seeded();
    doc.change(|writer| writer.rename(&pos(&[0]), "heading"))
        .unwrap();
    doc.undo_last().unwrap();
    assert!(doc.history().is_undone(2));
    assert_eq!(doc.history().undoing_version_of(2), Some(3));
    assert_eq!(doc.history().undone_version_of(3), Some(2));
    assert_eq!(doc.history().undone_version_of(2), None);
    assert!(!doc.history().is_undone(0));
}

#[test]
fn undo_with_empty_stack_fails() {
    let mut doc = Document::new();
    assert_eq!(doc.undo_last(), Err(ModelError::NothingToUndo));
}

#[test]
fn undone_inverses_are_recorded_like_any_operation() {
    let mut doc = seeded();
    doc.change(|writer| writer.rename(&pos(&[0]), "heading"))
        .unwrap();
    doc.undo_last().unwrap();
    assert_eq!(doc.version(), 4);
    assert_eq!(doc.history().operation_at(3).unwrap().kind(), "rename");
}

#[test]
fn no_op_still_occupies_a_version() {
    let mut doc = seeded();
    doc.apply(&Operation::no_op(2)).unwrap();
    assert_eq!(doc.version(), 3);
    assert_eq!(doc.history().operation_at(2).unwrap().kind(), "noop");
}
