//! Message codec properties: serialize-then-parse yields an equal
//! message, clones compare equal.

use super::strategies::json_move_variant;
use hvmlrt::msg::codec::{parse, serialize};
use hvmlrt::msg::{compare_messages, ElementType, Message, MsgTarget};
use proptest::prelude::*;

fn any_target() -> impl Strategy<Value = MsgTarget> {
    prop_oneof![
        Just(MsgTarget::Session),
        Just(MsgTarget::Workspace),
        Just(MsgTarget::PlainWindow),
        Just(MsgTarget::TabbedWindow),
        Just(MsgTarget::Tabpage),
        Just(MsgTarget::Dom),
        Just(MsgTarget::Thread),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_event_roundtrip(
        target in any_target(),
        target_value in any::<u64>(),
        event in "[a-zA-Z]{1,12}(:[a-zA-Z0-9-]{1,12})?",
        data in json_move_variant(),
    ) {
        let msg = Message::event(target, target_value, &event).with_ejson_data(data);
        let parsed = parse(&serialize(&msg)).unwrap();
        prop_assert_eq!(compare_messages(&msg, &parsed), 0);
    }

    #[test]
    fn prop_request_roundtrip(
        target_value in any::<u64>(),
        op in "[a-zA-Z]{1,16}",
        req_id in "[a-zA-Z0-9-]{1,16}",
        element in "[a-zA-Z][a-zA-Z0-9 .#-]{0,20}",
    ) {
        let msg = Message::request(MsgTarget::Dom, target_value, &op, &req_id)
            .with_element(ElementType::Css, element.trim())
            .with_property("textContent");
        let parsed = parse(&serialize(&msg)).unwrap();
        prop_assert_eq!(compare_messages(&msg, &parsed), 0);
    }

    #[test]
    fn prop_response_roundtrip(
        req_id in "[a-zA-Z0-9-]{1,16}",
        ret_code in 100u32..600,
        result_value in any::<u64>(),
    ) {
        let msg = Message::response(&req_id, ret_code, result_value);
        let parsed = parse(&serialize(&msg)).unwrap();
        prop_assert_eq!(compare_messages(&msg, &parsed), 0);
    }

    /// A clone is semantically equal and stays equal after reserializing.
    #[test]
    fn prop_clone_semantically_equal(data in json_move_variant()) {
        let msg = Message::event(MsgTarget::Thread, 1, "clone:test").with_ejson_data(data);
        let cloned = msg.clone();
        prop_assert_eq!(compare_messages(&msg, &cloned), 0);
        prop_assert_eq!(serialize(&msg), serialize(&cloned));
    }
}
