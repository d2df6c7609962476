//! Whole-pipeline scenarios: documents driving iterate, sort, and erase
//! against document variables and the DOM boundary.

use crate::common::{probe, ScriptedDom};
use hvmlrt::interp::{Coroutine, Stack};
use hvmlrt::msg::MsgQueue;
use hvmlrt::varmgr::VarMgr;
use hvmlrt::variant::Variant;
use hvmlrt::vdom::{Document, ElementBuilder};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn run(root: hvmlrt::vdom::ElementRef) -> Coroutine {
    let doc = Document::new(root);
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().expect("document runs");
    co
}

#[test]
fn test_iterate_over_document_variable() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let root = ElementBuilder::new("body")
        .child(
            ElementBuilder::new("iterate")
                .attr("on", "$list")
                .attr("by", "RANGE: FROM 0")
                .child(probe(&seen)),
        )
        .build();

    let doc = Document::new(root);
    doc.variables
        .add(
            "list",
            Variant::array(vec![
                Variant::LongInt(3),
                Variant::LongInt(1),
                Variant::LongInt(2),
            ]),
        )
        .unwrap();
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    assert!(co.stack.except.is_none());
    assert_eq!(
        &*seen.borrow(),
        &[Variant::LongInt(3), Variant::LongInt(1), Variant::LongInt(2)]
    );
}

#[test]
fn test_sort_document_variable_both_directions() {
    for (dir, expected) in [("ascendingly", [1, 2, 3]), ("descendingly", [3, 2, 1])] {
        let arr = Variant::array(vec![
            Variant::object(vec![("n", Variant::LongInt(2))]),
            Variant::object(vec![("n", Variant::LongInt(1))]),
            Variant::object(vec![("n", Variant::LongInt(3))]),
        ]);
        let root = ElementBuilder::new("body")
            .child(
                ElementBuilder::new("sort")
                    .attr_value("on", arr.clone())
                    .attr("against", "n")
                    .attr(dir, ""),
            )
            .build();
        run(root);

        let got: Vec<i64> = (0..3)
            .map(|i| {
                arr.get(i)
                    .unwrap()
                    .get_by_key("n")
                    .unwrap()
                    .cast_to_longint(false)
                    .unwrap()
            })
            .collect();
        assert_eq!(got, expected, "direction {}", dir);
    }
}

#[test]
fn test_erase_attr_sets_question_to_match_count() {
    let dom = ScriptedDom::with_matches(vec![101, 102, 103]);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let root = ElementBuilder::new("body")
        .child(
            ElementBuilder::new("erase")
                .attr("on", "div.item")
                .attr("at", "attr.class"),
        )
        .child(probe(&seen))
        .build();

    let doc = Document::new(root);
    let stack =
        Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new()).with_dom(dom.clone());
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    // ? carries the number of removed attributes to the next sibling
    assert_eq!(&*seen.borrow(), &[Variant::ULongInt(3)]);
    let removed = dom.removed_attrs.borrow();
    assert_eq!(removed.len(), 3);
    assert!(removed.iter().all(|(_, name)| name == "class"));
}

#[test]
fn test_except_event_reaches_observer() {
    // a failing sort raises WrongDataType; an except observer catches it
    let hits = Rc::new(RefCell::new(0u32));
    let flag = hits.clone();

    let root = ElementBuilder::new("div")
        .child(
            ElementBuilder::new("observe")
                .attr("on", "$list")
                .attr("for", "except:WrongDataType")
                .child(ElementBuilder::new("div").attr_expr(
                    "probe",
                    Rc::new(move |_s: &mut Stack| {
                        *flag.borrow_mut() += 1;
                        Ok(Variant::Undefined)
                    }),
                )),
        )
        .child(
            ElementBuilder::new("sort").attr_value("on", Variant::string("unsortable")),
        )
        .build();

    let doc = Document::new(root);
    doc.variables.add("list", Variant::array(vec![])).unwrap();
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    // the exception is consumed by the observer, so the run settles
    let _ = co.run();
    assert_eq!(*hits.borrow(), 1);
}

#[test]
fn test_varmgr_change_event_round_trip() {
    // observing a document variable for change:attached; binding a new
    // entry into it produces exactly one delivery
    let hits = Rc::new(RefCell::new(0u32));
    let flag = hits.clone();

    let root = ElementBuilder::new("div")
        .child(
            ElementBuilder::new("observe")
                .attr("on", "$store")
                .attr("for", "change:attached")
                .child(ElementBuilder::new("div").attr_expr(
                    "probe",
                    Rc::new(move |_s: &mut Stack| {
                        *flag.borrow_mut() += 1;
                        Ok(Variant::Undefined)
                    }),
                )),
        )
        .build();

    let doc = Document::new(root);
    doc.variables
        .add("store", Variant::object(Vec::<(String, Variant)>::new()))
        .unwrap();
    let queue = Arc::new(MsgQueue::new());
    let stack = Stack::new(Rc::clone(&doc), Arc::clone(&queue), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    // rebinding "store" itself fires GROW on the manager object
    doc.variables.add("fresh", Variant::LongInt(1)).unwrap();
    // no observer for "fresh": nothing delivered
    co.drain_events();
    assert_eq!(*hits.borrow(), 0);

    doc.variables
        .add("store", Variant::object(vec![("k", Variant::LongInt(1))]))
        .unwrap();
    co.drain_events();
    // rebinding an existing container displaces rather than attaches
    assert_eq!(*hits.borrow(), 0);

    doc.variables.remove("store", false).unwrap();
    doc.variables
        .add("store", Variant::object(Vec::<(String, Variant)>::new()))
        .unwrap();
    co.drain_events();
    assert_eq!(*hits.borrow(), 1);
}
