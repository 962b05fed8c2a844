use doc_ot::{Collaboration, MAIN_ROOT, Position, Range};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_json::json;

fn pos(path: &[u32]) -> Position {
    Position::new(MAIN_ROOT, path.to_vec())
}

fn range(from: &[u32], to: &[u32]) -> Range {
    Range::new(pos(from), pos(to))
}

#[derive(Clone, Debug)]
enum EditSpec {
    Insert { at: usize, text: String },
    Remove { at: usize, len: usize },
    Style { at: usize, len: usize, on: bool },
}

fn edit_specs() -> impl Strategy<Value = Vec<EditSpec>> {
    vec(
        prop_oneof![
            (any::<prop::sample::Index>(), "[a-z]{1,3}")
                .prop_map(|(at, text)| EditSpec::Insert { at: at.index(64), text }),
            (any::<prop::sample::Index>(), 1usize..4).prop_map(|(at, len)| EditSpec::Remove {
                at: at.index(64),
                len,
            }),
            (any::<prop::sample::Index>(), 1usize..5, any::<bool>()).prop_map(
                |(at, len, on)| EditSpec::Style {
                    at: at.index(64),
                    len,
                    on,
                }
            ),
        ],
        0..5,
    )
}

/// Clamps a spec against the client's current paragraph and applies it; a
/// spec that no longer fits the shrunken content is skipped.
fn realize(collab: &mut Collaboration, client: usize, spec: &EditSpec) {
    let size = collab
        .document(client)
        .root(MAIN_ROOT)
        .unwrap()
        .element_at_offset(0)
        .unwrap()
        .max_offset() as usize;
    match spec {
        EditSpec::Insert { at, text } => {
            let at = (at % (size + 1)) as u32;
            collab
                .edit(client, |writer| writer.insert_text(&pos(&[0, at]), text))
                .unwrap();
        }
        EditSpec::Remove { at, len } => {
            if size == 0 {
                return;
            }
            let at = at % size;
            let len = (*len).min(size - at);
            if len == 0 {
                return;
            }
            let (from, to) = (at as u32, (at + len) as u32);
            collab
                .edit(client, |writer| writer.remove(&range(&[0, from], &[0, to])))
                .unwrap();
        }
        EditSpec::Style { at, len, on } => {
            if size == 0 {
                return;
            }
            let at = at % size;
            let len = (*len).min(size - at);
            if len == 0 {
                return;
            }
            let (from, to) = (at as u32, (at + len) as u32);
            collab
                .edit(client, |writer| {
                    if *on {
                        writer.set_attribute(&range(&[0, from], &[0, to]), "bold", json!(true))
                    } else {
                        writer.remove_attribute(&range(&[0, from], &[0, to]), "bold")
                    }
                })
                .unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, ..ProptestConfig::default() })]

    #[test]
    fn two_clients_converge(alice in edit_specs(), bob in edit_specs()) {
        let mut collab = Collaboration::new();
        collab.add_client("alice");
        collab.add_client("bob");
        collab
            .seed(|writer| {
                writer.insert_element(&pos(&[0]), "paragraph")?;
                writer.insert_text(&pos(&[0, 0]), "Hello world")
            })
            .unwrap();
        for spec in &alice {
            realize(&mut collab, 0, spec);
        }
        for spec in &bob {
            realize(&mut collab, 1, spec);
        }
        collab.sync().unwrap();
        prop_assert!(collab.converged());
    }

    #[test]
    fn convergence_survives_a_second_round(alice in edit_specs(), bob in edit_specs()) {
        let mut collab = Collaboration::new();
        collab.add_client("alice");
        collab.add_client("bob");
        collab
            .seed(|writer| {
                writer.insert_element(&pos(&[0]), "paragraph")?;
                writer.insert_text(&pos(&[0, 0]), "Hello world")
            })
            .unwrap();
        for (first, second) in alice.iter().zip(bob.iter()) {
            realize(&mut collab, 0, first);
            realize(&mut collab, 1, second);
            collab.sync().unwrap();
            prop_assert!(collab.converged());
        }
    }
}
