// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for canonical-id wire-format roundtripping and hashing.

use mf_core::{CanonicalId, NodeKind};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn node_kind() -> impl Strategy<Value = NodeKind> {
    prop_oneof![
        Just(NodeKind::Input),
        Just(NodeKind::Artifact),
        Just(NodeKind::Producer),
    ]
}

fn qualified_name_segment() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,12}"
}

fn qualified_name() -> impl Strategy<Value = String> {
    prop::collection::vec(qualified_name_segment(), 1..4).prop_map(|segs| segs.join("."))
}

fn index_map() -> impl Strategy<Value = BTreeMap<String, u64>> {
    prop::collection::btree_map(qualified_name_segment(), 0u64..1000, 0..4)
}

proptest! {
    /// Parsing the wire form of any constructible id always returns the
    /// original id, regardless of index insertion order or count.
    #[test]
    fn wire_format_roundtrips(kind in node_kind(), name in qualified_name(), indices in index_map()) {
        let id = CanonicalId::with_indices(kind, name, indices);
        let wire = id.as_wire();
        let parsed = CanonicalId::parse(&wire).unwrap();
        prop_assert_eq!(parsed, id);
    }

    /// Two ids built from the same fields but differing insertion order into
    /// their index maps compare equal and serialize identically.
    #[test]
    fn index_insertion_order_does_not_affect_wire_form(
        kind in node_kind(),
        name in qualified_name(),
        indices in index_map(),
    ) {
        let forward = CanonicalId::with_indices(kind, name.clone(), indices.clone());
        let reversed: BTreeMap<String, u64> = indices.into_iter().rev().collect();
        let backward = CanonicalId::with_indices(kind, name, reversed);
        prop_assert_eq!(forward.as_wire(), backward.as_wire());
    }

    /// Changing any single index value changes the wire form, so distinct
    /// fan-out instances never collide on their canonical id.
    #[test]
    fn distinct_index_values_yield_distinct_wire_forms(
        name in qualified_name_segment(),
        a in 0u64..500,
        b in 0u64..500,
    ) {
        prop_assume!(a != b);
        let id_a = CanonicalId::with_indices(
            NodeKind::Artifact,
            name.clone(),
            BTreeMap::from([("segment".to_string(), a)]),
        );
        let id_b = CanonicalId::with_indices(
            NodeKind::Artifact,
            name,
            BTreeMap::from([("segment".to_string(), b)]),
        );
        prop_assert_ne!(id_a.as_wire(), id_b.as_wire());
    }
}
