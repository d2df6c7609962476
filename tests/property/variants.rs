//! Variant-model properties: heap accounting, move round-trips,
//! displace identity.

use super::strategies::movable_variant;
use hvmlrt::variant::{move_in, move_out, stats, Variant};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Creating then releasing any value tree restores every per-type
    /// counter and the byte totals.
    #[test]
    fn prop_stats_restore_after_release(v in movable_variant()) {
        let before = stats();
        {
            let copy = v.clone_deep();
            let another = copy.clone_deep();
            let _ = another.type_name();
        }
        prop_assert_eq!(stats(), before);
    }

    /// A full move-heap round trip preserves structure and lands with a
    /// fresh refcount.
    #[test]
    fn prop_move_roundtrip_deep_equal(v in movable_variant()) {
        let expected = v.clone_deep();
        let mv = move_in(v).unwrap();
        let back = move_out(mv);
        prop_assert_eq!(&back, &expected);
        prop_assert_eq!(back.refcount(), 1);
    }

    /// Displace replaces contents while the destination handle survives.
    #[test]
    fn prop_displace_preserves_identity(elems in proptest::collection::vec(any::<i64>(), 0..8)) {
        let dst = Variant::array(vec![Variant::LongInt(-1)]);
        let alias = dst.clone();
        let src = Variant::array(elems.iter().copied().map(Variant::LongInt).collect::<Vec<_>>());

        dst.displace(&src).unwrap();

        prop_assert!(dst.ptr_eq(&alias));
        prop_assert_eq!(alias.size().unwrap(), elems.len());
        for (i, n) in elems.iter().enumerate() {
            prop_assert_eq!(alias.get(i).unwrap(), Variant::LongInt(*n));
        }
    }

    /// Serialization is stable under deep cloning.
    #[test]
    fn prop_clone_deep_serializes_identically(v in movable_variant()) {
        prop_assert_eq!(v.serialize(), v.clone_deep().serialize());
    }
}
