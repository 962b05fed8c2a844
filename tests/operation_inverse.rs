use doc_ot::{Document, MAIN_ROOT, Operation, Position, Range};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::json;

fn pos(path: &[u32]) -> Position {
    Position::new(MAIN_ROOT, path.to_vec())
}

fn range(from: &[u32], to: &[u32]) -> Range {
    Range::new(pos(from), pos(to))
}

fn two_paragraphs() -> Document {
    let mut doc = Document::new();
    doc.change(|writer| {
        writer.insert_element(&pos(&[0]), "paragraph")?;
        writer.insert_text(&pos(&[0, 0]), "Foo")?;
        writer.insert_element(&pos(&[1]), "paragraph")?;
        writer.insert_text(&pos(&[1, 0]), "Bar")
    })
    .unwrap();
    doc
}

fn assert_undo_restores(mut doc: Document, edit: impl FnOnce(&mut doc_ot::Writer<'_>) -> doc_ot::model::Result<()>) {
    let before = doc.clone();
    doc.change(edit).unwrap();
    doc.undo_last().unwrap();
    assert!(doc.content_equals(&before));
}

#[test]
fn insert_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.insert_text(&pos(&[0, 1]), "XYZ")
    });
}

#[test]
fn remove_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.remove(&range(&[0, 0], &[0, 3]))
    });
}

#[test]
fn move_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.move_range(&range(&[0, 1], &[0, 3]), &pos(&[1, 0]))
    });
}

#[test]
fn rename_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.rename(&pos(&[1]), "heading")
    });
}

#[test]
fn attribute_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.set_attribute(&range(&[0, 1], &[0, 3]), "bold", json!(true))
    });
}

#[test]
fn root_attribute_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.set_root_attribute(MAIN_ROOT, "dir", Some(json!("rtl")))
    });
}

#[test]
fn marker_undo() {
    let mut doc = two_paragraphs();
    doc.change(|writer| writer.add_marker("comment", &range(&[0, 0], &[0, 2])))
        .unwrap();
    let before = doc.clone();
    doc.change(|writer| writer.update_marker("comment", &range(&[1, 0], &[1, 3])))
        .unwrap();
    doc.undo_last().unwrap();
    assert!(doc.content_equals(&before));

    doc.change(|writer| writer.remove_marker("comment")).unwrap();
    doc.undo_last().unwrap();
    assert!(doc.content_equals(&before));
}

#[test]
fn split_undo() {
    assert_undo_restores(two_paragraphs(), |writer| writer.split(&pos(&[0, 1])));
}

#[test]
fn merge_undo_revives_the_merged_element() {
    let mut doc = two_paragraphs();
    doc.change(|writer| writer.set_attribute(&range(&[1], &[2]), "align", json!("right")))
        .unwrap();
    let before = doc.clone();
    doc.change(|writer| writer.merge(&pos(&[1]))).unwrap();
    doc.undo_last().unwrap();
    // the revived element must be the original, attributes included
    assert!(doc.content_equals(&before));
}

#[test]
fn wrap_and_unwrap_undo() {
    assert_undo_restores(two_paragraphs(), |writer| {
        writer.wrap(&range(&[0, 0], &[0, 3]), "span")
    });
    let mut doc = two_paragraphs();
    doc.change(|writer| writer.wrap(&range(&[0, 0], &[0, 3]), "span"))
        .unwrap();
    assert_undo_restores(doc, |writer| writer.unwrap(&pos(&[0, 0])));
}

#[test]
fn reversed_kinds_mirror_each_other() {
    let doc = two_paragraphs();
    let insert = doc.history().operation_at(1).unwrap();
    assert_eq!(insert.kind(), "insert");
    assert_eq!(insert.reversed().kind(), "remove");

    let split = {
        let mut doc = doc.clone();
        doc.change(|writer| writer.split(&pos(&[0, 1]))).unwrap();
        doc.history().operation_at(4).unwrap().clone()
    };
    assert_eq!(split.kind(), "split");
    assert_eq!(split.reversed().kind(), "merge");
    assert_eq!(split.reversed().reversed().kind(), "split");
}

#[test]
fn reversed_base_version_follows_the_operation() {
    let doc = two_paragraphs();
    let op = doc.history().operation_at(2).unwrap();
    assert_eq!(op.reversed().base_version(), op.base_version() + 1);
}

#[test]
fn wire_round_trip_preserves_operations() {
    let mut doc = two_paragraphs();
    doc.change(|writer| {
        writer.set_attribute(&range(&[0, 0], &[0, 2]), "bold", json!(true))?;
        writer.add_marker("m", &range(&[1, 0], &[1, 1]))?;
        writer.rename(&pos(&[1]), "heading")?;
        writer.set_root_attribute(MAIN_ROOT, "lang", Some(json!("en")))?;
        writer.split(&pos(&[0, 1]))?;
        writer.merge(&pos(&[1]))?;
        writer.remove(&range(&[0, 0], &[0, 1]))
    })
    .unwrap();
    for version in 0..doc.version() {
        let op = doc.history().operation_at(version).unwrap();
        let round_tripped = Operation::from_json(op.to_json().unwrap()).unwrap();
        assert_eq!(&round_tripped, op);
    }
}

// -- inverse law over generated edit batches ---------------------------------

#[derive(Clone, Debug)]
enum EditSpec {
    Insert { at: usize, text: String },
    Remove { at: usize, len: usize },
    Style { at: usize, len: usize },
}

fn edit_specs() -> impl Strategy<Value = Vec<EditSpec>> {
    vec(
        prop_oneof![
            (any::<prop::sample::Index>(), "[a-z]{1,4}")
                .prop_map(|(at, text)| EditSpec::Insert { at: at.index(64), text }),
            (any::<prop::sample::Index>(), 1usize..4).prop_map(|(at, len)| EditSpec::Remove {
                at: at.index(64),
                len,
            }),
            (any::<prop::sample::Index>(), 1usize..5).prop_map(|(at, len)| EditSpec::Style {
                at: at.index(64),
                len,
            }),
        ],
        0..6,
    )
}

fn realize(writer: &mut doc_ot::Writer<'_>, specs: &[EditSpec]) -> doc_ot::model::Result<()> {
    for spec in specs {
        let size = writer
            .document()
            .root(MAIN_ROOT)?
            .element_at_offset(0)
            .map(|paragraph| paragraph.max_offset())
            .unwrap_or(0) as usize;
        match spec {
            EditSpec::Insert { at, text } => {
                let at = at % (size + 1);
                writer.insert_text(&pos(&[0, at as u32]), text)?;
            }
            EditSpec::Remove { at, len } => {
                if size == 0 {
                    continue;
                }
                let at = at % size;
                let len = (*len).min(size - at);
                writer.remove(&range(&[0, at as u32], &[0, (at + len) as u32]))?;
            }
            EditSpec::Style { at, len } => {
                if size == 0 {
                    continue;
                }
                let at = at % size;
                let len = (*len).min(size - at);
                if len > 0 {
                    writer.set_attribute(
                        &range(&[0, at as u32], &[0, (at + len) as u32]),
                        "bold",
                        json!(true),
                    )?;
                }
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, ..ProptestConfig::default() })]

    #[test]
    fn undo_reverts_any_edit_batch(specs in edit_specs()) {
        let mut doc = Document::new();
        doc.change(|writer| {
            writer.insert_element(&pos(&[0]), "paragraph")?;
            writer.insert_text(&pos(&[0, 0]), "Hello world")
        })
        .unwrap();
        let before = doc.clone();
        doc.change(|writer| realize(writer, &specs)).unwrap();
        if doc.version() == before.version() {
            return Ok(());
        }
        doc.undo_last().unwrap();
        prop_assert!(doc.content_equals(&before));
    }
}
