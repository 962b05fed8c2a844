use doc_ot::{Collaboration, Document, GRAVEYARD, MAIN_ROOT, Position, Range};
use serde_json::json;

fn pos(path: &[u32]) -> Position {
    Position::new(MAIN_ROOT, path.to_vec())
}

fn range(from: &[u32], to: &[u32]) -> Range {
    Range::new(pos(from), pos(to))
}

fn pair_on(text: &str) -> Collaboration {
    let mut collab = Collaboration::new();
    collab.add_client("alice");
    collab.add_client("bob");
    let text = text.to_string();
    collab
        .seed(move |writer| {
            writer.insert_element(&pos(&[0]), "paragraph")?;
            writer.insert_text(&pos(&[0, 0]), &text)
        })
        .unwrap();
    collab
}

fn paragraph_text(doc: &Document) -> String {
    doc.root(MAIN_ROOT)
        .unwrap()
        .element_at_offset(0)
        .unwrap()
        .text_content()
}

#[test]
fn concurrent_edge_inserts_converge() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.insert_text(&pos(&[0, 0]), "X"))
        .unwrap();
    collab
        .edit(1, |writer| writer.insert_text(&pos(&[0, 3]), "Y"))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    assert_eq!(paragraph_text(collab.document(0)), "XFooY");
    assert_eq!(paragraph_text(collab.document(1)), "XFooY");
}

#[test]
fn attribute_on_concurrently_removed_text_disappears() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.remove(&range(&[0, 0], &[0, 3])))
        .unwrap();
    collab
        .edit(1, |writer| {
            writer.set_attribute(&range(&[0, 0], &[0, 3]), "bold", json!(true))
        })
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    for index in 0..2 {
        let paragraph = collab
            .document(index)
            .root(MAIN_ROOT)
            .unwrap()
            .element_at_offset(0)
            .unwrap();
        assert_eq!(paragraph.child_count(), 0);
    }
}

#[test]
fn undoing_a_batch_restores_the_empty_paragraph() {
    let mut doc = Document::new();
    doc.change(|writer| writer.insert_element(&pos(&[0]), "paragraph"))
        .unwrap();
    doc.change(|writer| {
        writer.insert_text(&pos(&[0, 0]), "Foo")?;
        writer.set_attribute(&range(&[0, 0], &[0, 3]), "bold", json!(true))
    })
    .unwrap();
    doc.undo_last().unwrap();
    let paragraph = doc.root(MAIN_ROOT).unwrap().element_at_offset(0).unwrap();
    assert_eq!(paragraph.child_count(), 0);
    assert!(paragraph.attrs.is_empty());
}

#[test]
fn move_into_concurrently_removed_range_lands_in_the_graveyard() {
    let mut collab = Collaboration::new();
    collab.add_client("alice");
    collab.add_client("bob");
    collab
        .seed(|writer| {
            writer.insert_element(&pos(&[0]), "paragraph")?;
            writer.insert_text(&pos(&[0, 0]), "Foo")?;
            writer.insert_element(&pos(&[1]), "note")
        })
        .unwrap();
    collab
        .edit(0, |writer| {
            writer.move_range(&range(&[1], &[2]), &pos(&[0, 1]))
        })
        .unwrap();
    collab
        .edit(1, |writer| writer.remove(&range(&[0, 0], &[0, 3])))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    for index in 0..2 {
        let doc = collab.document(index);
        let root = doc.root(MAIN_ROOT).unwrap();
        assert_eq!(root.max_offset(), 1);
        assert_eq!(root.element_at_offset(0).unwrap().max_offset(), 0);
        let buried = doc
            .root(GRAVEYARD)
            .unwrap()
            .children
            .iter()
            .any(|node| node.as_element().is_some_and(|element| element.name == "note"));
        assert!(buried, "the note survives only in the graveyard");
    }
}

#[test]
fn undone_removal_does_not_swallow_concurrent_changes() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.remove(&range(&[0, 0], &[0, 3])))
        .unwrap();
    collab.undo(0).unwrap();
    collab
        .edit(1, |writer| {
            writer.set_attribute(&range(&[0, 0], &[0, 3]), "bold", json!(true))
        })
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    for index in 0..2 {
        let doc = collab.document(index);
        assert_eq!(paragraph_text(doc), "Foo");
        let runs = doc.attribute_runs(&range(&[0, 0], &[0, 3]), "bold").unwrap();
        let values: Vec<Option<serde_json::Value>> =
            runs.iter().map(|(_, value)| value.clone()).collect();
        assert_eq!(values, vec![Some(json!(true))]);
    }
}

#[test]
fn undone_insert_is_suppressed_at_the_receiver() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.insert_text(&pos(&[0, 0]), "X"))
        .unwrap();
    collab.undo(0).unwrap();
    collab
        .edit(1, |writer| writer.insert_text(&pos(&[0, 3]), "Y"))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    for index in 0..2 {
        assert_eq!(paragraph_text(collab.document(index)), "FooY");
    }
    // the cancelled insert and its inverse arrive as no-ops, so the receiver
    // never plays the insert-then-remove detour
    let receiver = collab.document(1);
    assert_eq!(receiver.history().operation_at(3).unwrap().kind(), "noop");
    assert_eq!(receiver.history().operation_at(4).unwrap().kind(), "noop");
}

#[test]
fn undo_of_an_already_synced_edit_still_propagates() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.insert_text(&pos(&[0, 0]), "X"))
        .unwrap();
    collab.sync().unwrap();
    assert_eq!(paragraph_text(collab.document(1)), "XFoo");
    collab.undo(0).unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    for index in 0..2 {
        assert_eq!(paragraph_text(collab.document(index)), "Foo");
    }
}

#[test]
fn three_clients_converge_in_registration_order() {
    let mut collab = Collaboration::new();
    collab.add_client("alice");
    collab.add_client("bob");
    collab.add_client("carol");
    collab
        .seed(|writer| writer.insert_element(&pos(&[0]), "paragraph"))
        .unwrap();
    for (index, letter) in ["a", "b", "c"].iter().enumerate() {
        collab
            .edit(index, |writer| writer.insert_text(&pos(&[0, 0]), letter))
            .unwrap();
    }
    collab.sync().unwrap();
    assert!(collab.converged());
    // all three inserted at the same spot; later-registered clients win ties
    assert_eq!(paragraph_text(collab.document(0)), "cba");
}

#[test]
fn markers_converge_with_concurrent_structure_changes() {
    let mut collab = pair_on("Hello");
    collab
        .edit(0, |writer| {
            writer.add_marker("comment", &range(&[0, 1], &[0, 4]))
        })
        .unwrap();
    collab
        .edit(1, |writer| writer.insert_text(&pos(&[0, 0]), "XY"))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    assert_eq!(
        collab.document(0).marker("comment"),
        Some(&range(&[0, 3], &[0, 6]))
    );
}

#[test]
fn multiple_rounds_keep_converging() {
    let mut collab = pair_on("Foo");
    collab
        .edit(0, |writer| writer.insert_text(&pos(&[0, 3]), "!"))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    collab
        .edit(0, |writer| writer.remove(&range(&[0, 0], &[0, 1])))
        .unwrap();
    collab
        .edit(1, |writer| writer.insert_text(&pos(&[0, 4]), "?"))
        .unwrap();
    collab.sync().unwrap();
    assert!(collab.converged());
    assert_eq!(paragraph_text(collab.document(1)), "oo!?");
}
