// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Codec tests against realistic project trees.

use cadenza_doc::{BLOCK_ID_ATTR, Document, Element, Value, decode, encode};
use proptest::prelude::*;

fn project_with_blocks(ids: &[i64]) -> Document {
    let sequence = ids.iter().fold(Element::new("sequence"), |seq, id| {
        seq.with_child(
            Element::new("waveblock")
                .with_attr("start", 0i64)
                .with_attr(BLOCK_ID_ATTR, *id),
        )
    });
    Document::new(
        Element::new("project")
            .with_attr("version", "1.3.0")
            .with_attr("rate", 48000.0)
            .with_attr("snapto", false)
            .with_child(
                Element::new("wavetrack")
                    .with_attr("name", "Audio 1")
                    .with_attr("channel", 0i32)
                    .with_child(Element::new("waveclip").with_child(sequence)),
            ),
    )
}

/// Verify a typical project survives the codec and its block references are
/// found where the engine expects them.
#[test]
fn test_project_document() {
    let doc = project_with_blocks(&[1, 2, 2, 5]);
    let stored = encode(&doc).unwrap();
    let back = decode(&stored).unwrap();

    assert_eq!(back, doc);
    assert_eq!(back.block_ids(), vec![1, 2, 2, 5]);
    assert_eq!(back.root.attr("version"), Some(&Value::Str("1.3.0".into())));
}

/// Verify rewritten references are what gets re-encoded.
#[test]
fn test_remap_then_reencode() {
    let mut doc = project_with_blocks(&[1, 2]);
    doc.visit_block_refs_mut(|id| {
        *id *= 10;
        Ok::<_, std::convert::Infallible>(())
    })
    .unwrap();

    let back = decode(&encode(&doc).unwrap()).unwrap();
    assert_eq!(back.block_ids(), vec![10, 20]);
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-z ]{0,12}".prop_map(Value::Str),
        any::<i32>().prop_map(Value::Int),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::LongLong),
        (-1.0e9f64..1.0e9).prop_map(Value::Double),
    ]
}

fn arb_element() -> impl Strategy<Value = Element> {
    let leaf = ("[a-z]{1,8}", prop::collection::vec(("[a-z]{1,8}", arb_value()), 0..4)).prop_map(
        |(name, attributes)| Element {
            name,
            attributes,
            children: Vec::new(),
        },
    );
    leaf.prop_recursive(4, 32, 4, |inner| {
        (
            "[a-z]{1,8}",
            prop::collection::vec(("[a-z]{1,8}", arb_value()), 0..4),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|(name, attributes, children)| Element {
                name,
                attributes,
                children,
            })
    })
}

proptest! {
    /// Any tree decodes to itself.
    #[test]
    fn prop_tree_survives_codec(root in arb_element()) {
        let doc = Document::new(root);
        let stored = encode(&doc).unwrap();
        prop_assert_eq!(decode(&stored).unwrap(), doc);
    }
}
