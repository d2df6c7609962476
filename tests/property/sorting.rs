//! Sorting properties: idempotence and stability over equal keys.

use hvmlrt::interp::{Coroutine, Stack};
use hvmlrt::msg::MsgQueue;
use hvmlrt::varmgr::VarMgr;
use hvmlrt::variant::Variant;
use hvmlrt::vdom::{Document, ElementBuilder};
use proptest::prelude::*;
use std::sync::Arc;

fn sort_doc(arr: Variant, dir: &str) {
    let root = ElementBuilder::new("sort")
        .attr_value("on", arr)
        .attr("against", "n")
        .attr(dir, "")
        .build();
    let doc = Document::new(root);
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().expect("sort runs");
}

fn keys_of(arr: &Variant) -> Vec<i64> {
    (0..arr.size().unwrap())
        .map(|i| {
            arr.get(i)
                .unwrap()
                .get_by_key("n")
                .unwrap()
                .cast_to_longint(false)
                .unwrap()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_sort_orders_and_is_idempotent(ns in proptest::collection::vec(-1000i64..1000, 0..20)) {
        let arr = Variant::array(
            ns.iter()
                .map(|n| Variant::object(vec![("n", Variant::LongInt(*n))]))
                .collect::<Vec<_>>(),
        );

        sort_doc(arr.clone(), "ascendingly");
        let once = keys_of(&arr);
        let mut expected = ns.clone();
        expected.sort();
        prop_assert_eq!(&once, &expected);

        sort_doc(arr.clone(), "ascendingly");
        prop_assert_eq!(keys_of(&arr), once);
    }

    #[test]
    fn prop_sort_desc_reverses_asc(ns in proptest::collection::vec(-1000i64..1000, 0..20)) {
        let make = || Variant::array(
            ns.iter()
                .map(|n| Variant::object(vec![("n", Variant::LongInt(*n))]))
                .collect::<Vec<_>>(),
        );
        let asc = make();
        let desc = make();
        sort_doc(asc.clone(), "ascendingly");
        sort_doc(desc.clone(), "descendingly");

        let mut reversed = keys_of(&desc);
        reversed.reverse();
        prop_assert_eq!(keys_of(&asc), reversed);
    }

    /// Equal keys keep their original relative order.
    #[test]
    fn prop_sort_stable(tags in proptest::collection::vec(0i64..3, 1..16)) {
        let arr = Variant::array(
            tags.iter()
                .enumerate()
                .map(|(i, n)| {
                    Variant::object(vec![
                        ("n", Variant::LongInt(*n)),
                        ("seq", Variant::LongInt(i as i64)),
                    ])
                })
                .collect::<Vec<_>>(),
        );
        sort_doc(arr.clone(), "ascendingly");

        let mut last: Option<(i64, i64)> = None;
        for i in 0..arr.size().unwrap() {
            let m = arr.get(i).unwrap();
            let n = m.get_by_key("n").unwrap().cast_to_longint(false).unwrap();
            let seq = m.get_by_key("seq").unwrap().cast_to_longint(false).unwrap();
            if let Some((ln, lseq)) = last {
                prop_assert!(n > ln || (n == ln && seq > lseq));
            }
            last = Some((n, seq));
        }
    }
}
