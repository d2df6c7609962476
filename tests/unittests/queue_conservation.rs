//! Queue conservation: over a queue's lifetime, appends equal takeaways
//! plus the holding count, and destroy discards exactly what was held.

use hvmlrt::atom::{self, Bucket};
use hvmlrt::msg::{
    create_move_buffer, destroy_move_buffer, move_message, Message, MoveBufferFlags, MsgTarget,
};

#[test]
fn test_appends_balance_takeaways_and_discards() {
    let ep = atom::intern(Bucket::Endpoint, "edpt://localhost/conservation/q");
    let queue = create_move_buffer(ep, MoveBufferFlags::default(), 32).unwrap();

    let mut appends = 0usize;
    for i in 0..7 {
        let msg = Message::event(MsgTarget::Thread, i, "tick");
        appends += move_message(atom::Atom::INVALID, ep, &msg);
    }
    assert_eq!(appends, 7);

    let mut takeaways = 0usize;
    for _ in 0..3 {
        assert!(queue.take_away(0).is_some());
        takeaways += 1;
    }

    let holding = queue.count();
    assert_eq!(appends, takeaways + holding);

    let discarded = destroy_move_buffer(ep).unwrap();
    assert_eq!(discarded, holding);
    assert_eq!(appends, takeaways + discarded);
}

#[test]
fn test_mixed_types_all_counted() {
    let ep = atom::intern(Bucket::Endpoint, "edpt://localhost/conservation/mixed");
    let queue = create_move_buffer(ep, MoveBufferFlags::default(), 32).unwrap();

    queue.append(Message::request(MsgTarget::Session, 0, "load", "r1"));
    queue.append(Message::response("r1", 200, 0));
    queue.append(Message::event(MsgTarget::Dom, 0, "change:attached"));
    queue.append(Message::event(MsgTarget::Dom, 0, "expired:t").with_timer_id("t"));
    queue.append(Message::void());

    assert_eq!(queue.count(), 5);
    assert_eq!(destroy_move_buffer(ep).unwrap(), 5);
}
