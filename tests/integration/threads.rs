//! Cross-instance messaging: one instance per OS thread, events moved
//! and broadcast through the move-buffer registry.

use hvmlrt::atom::Atom;
use hvmlrt::instance::{
    cleanup, init, inst_create_move_buffer, inst_destroy_move_buffer,
    inst_holding_messages_count, inst_move_message, inst_take_away_message, MODULE_VARIANT,
};
use hvmlrt::msg::{Message, MsgTarget, MsgType, MOVE_BUFFER_BROADCAST};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const NR_THREADS: usize = 10;

fn wait_for_message(deadline: Duration) -> Option<Message> {
    let until = Instant::now() + deadline;
    loop {
        if inst_holding_messages_count().unwrap() > 0 {
            return inst_take_away_message(0).unwrap();
        }
        if Instant::now() >= until {
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_broadcast_reaches_every_instance() {
    init(MODULE_VARIANT, "cn.test.threads", "main").unwrap();
    let main_atom = inst_create_move_buffer(MOVE_BUFFER_BROADCAST, 16).unwrap();

    let (ready_tx, ready_rx) = mpsc::channel::<Atom>();
    let mut handles = Vec::new();

    for nr in 0..NR_THREADS {
        let ready_tx = ready_tx.clone();
        handles.push(std::thread::spawn(move || {
            let runner = format!("thread{}", nr);
            init(MODULE_VARIANT, "cn.test.threads", &runner).unwrap();
            let atom = inst_create_move_buffer(MOVE_BUFFER_BROADCAST, 16).unwrap();
            ready_tx.send(atom).unwrap();

            // wait for the broadcast, then echo it back to main
            let msg = wait_for_message(Duration::from_secs(5)).expect("broadcast arrives");
            assert_eq!(msg.ty, MsgType::Event);
            assert_eq!(msg.target, MsgTarget::Thread);
            assert_eq!(msg.target_value, 1);
            assert_eq!(msg.event_name(), Some("test"));

            inst_move_message(main_atom, &msg);

            let discarded = inst_destroy_move_buffer().unwrap();
            cleanup();
            discarded
        }));
    }

    // all instances registered before the broadcast goes out
    let mut others = Vec::new();
    for _ in 0..NR_THREADS {
        others.push(ready_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert!(others.iter().all(|a| a.is_valid()));

    let event = Message::event(MsgTarget::Thread, 1, "test");
    let delivered = inst_move_message(Atom::INVALID, &event);
    assert_eq!(delivered, NR_THREADS);

    // every thread echoes exactly one message back
    let mut echoes = 0;
    while echoes < NR_THREADS {
        let msg = wait_for_message(Duration::from_secs(5)).expect("echo arrives");
        assert_eq!(msg.event_name(), Some("test"));
        assert_eq!(msg.target_value, 1);
        echoes += 1;
    }

    for h in handles {
        assert_eq!(h.join().unwrap(), 0);
    }

    inst_destroy_move_buffer().unwrap();
    cleanup();
}

#[test]
fn test_targeted_move_between_two_instances() {
    init(MODULE_VARIANT, "cn.test.threads", "pair-a").unwrap();
    let a = inst_create_move_buffer(Default::default(), 16).unwrap();

    let (atom_tx, atom_rx) = mpsc::channel::<Atom>();
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let handle = std::thread::spawn(move || {
        init(MODULE_VARIANT, "cn.test.threads", "pair-b").unwrap();
        let b = inst_create_move_buffer(Default::default(), 16).unwrap();
        atom_tx.send(b).unwrap();

        let msg = wait_for_message(Duration::from_secs(5)).expect("message arrives");
        assert_eq!(msg.event_name(), Some("ping"));
        // payloads survive the hop without aliasing
        let data = msg.data.as_ref().unwrap().to_variant();
        assert_eq!(data.get_by_key("n").unwrap().cast_to_longint(false).unwrap(), 7);

        inst_move_message(a, &Message::event(MsgTarget::Thread, 2, "pong"));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        inst_destroy_move_buffer().unwrap();
        cleanup();
    });

    let b = atom_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let payload = hvmlrt::MoveVariant::Object(vec![(Box::from("n"), hvmlrt::MoveVariant::LongInt(7))]);
    let msg = Message::event(MsgTarget::Thread, 2, "ping").with_ejson_data(payload);
    assert_eq!(inst_move_message(b, &msg), 1);

    let reply = wait_for_message(Duration::from_secs(5)).expect("pong arrives");
    assert_eq!(reply.event_name(), Some("pong"));

    done_tx.send(()).unwrap();
    handle.join().unwrap();

    inst_destroy_move_buffer().unwrap();
    cleanup();
}

#[test]
fn test_destroy_move_buffer_reports_pending() {
    init(MODULE_VARIANT, "cn.test.threads", "pending-count").unwrap();
    let me = inst_create_move_buffer(Default::default(), 16).unwrap();

    for i in 0..3 {
        let msg = Message::event(MsgTarget::Thread, i, "queued");
        assert_eq!(inst_move_message(me, &msg), 1);
    }
    assert_eq!(inst_holding_messages_count().unwrap(), 3);
    assert_eq!(inst_destroy_move_buffer().unwrap(), 3);
    cleanup();
}
