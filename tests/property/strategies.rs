//! Proptest strategies for variant trees.

#![allow(dead_code)]

use hvmlrt::variant::{MoveVariant, Variant};
use proptest::prelude::*;

/// A movable variant: everything except dynamic and native values.
pub fn movable_variant() -> impl Strategy<Value = Variant> {
    let leaf = prop_oneof![
        Just(Variant::Undefined),
        Just(Variant::Null),
        any::<bool>().prop_map(Variant::Boolean),
        any::<i64>().prop_map(Variant::LongInt),
        any::<u64>().prop_map(Variant::ULongInt),
        (-1e12f64..1e12).prop_map(Variant::Number),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Variant::string),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Variant::byte_seq),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6)
                .prop_map(|v| Variant::array(v)),
            proptest::collection::vec(("[a-z]{1,8}", inner.clone()), 0..6)
                .prop_map(|entries| Variant::object(entries)),
            proptest::collection::vec(inner, 0..6).prop_map(|v| Variant::tuple(v)),
        ]
    })
}

/// A JSON-expressible move variant for codec payloads.
pub fn json_move_variant() -> impl Strategy<Value = MoveVariant> {
    let leaf = prop_oneof![
        Just(MoveVariant::Null),
        any::<bool>().prop_map(MoveVariant::Boolean),
        any::<i64>().prop_map(MoveVariant::LongInt),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(MoveVariant::string),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(MoveVariant::Array),
            proptest::collection::vec(("[a-z]{1,8}", inner), 0..6).prop_map(|entries| {
                // duplicate keys would not round-trip through a JSON map
                let mut seen = std::collections::BTreeSet::new();
                MoveVariant::Object(
                    entries
                        .into_iter()
                        .filter(|(k, _)| seen.insert(k.clone()))
                        .map(|(k, v)| (k.into_boxed_str(), v))
                        .collect(),
                )
            }),
        ]
    })
}
