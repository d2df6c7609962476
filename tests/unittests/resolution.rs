//! Name resolution across a running document: frame temporaries beat
//! element scopes beat document variables beat instance variables.

use hvmlrt::interp::{Coroutine, Stack};
use hvmlrt::msg::MsgQueue;
use hvmlrt::varmgr::VarMgr;
use hvmlrt::variant::Variant;
use hvmlrt::vdom::{Document, ElementBuilder};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[test]
fn test_resolution_inside_running_document() {
    let observed: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    // outer binds a temp "x"; the inner probe must see the temp, not the
    // document binding
    let record = observed.clone();
    let root = ElementBuilder::new("div")
        .child(
            ElementBuilder::new("outer")
                .attr_expr(
                    "bind",
                    Rc::new(|stack: &mut Stack| {
                        stack.bind_temp_var("x", Variant::string("temp"))?;
                        Ok(Variant::Undefined)
                    }),
                )
                .child(ElementBuilder::new("inner").attr_expr(
                    "probe",
                    Rc::new(move |stack: &mut Stack| {
                        let v = stack.find_named_var("x")?;
                        record.borrow_mut().push(v.stringify());
                        Ok(Variant::Undefined)
                    }),
                )),
        )
        .build();

    let doc = Document::new(root);
    doc.variables.add("x", Variant::string("document")).unwrap();

    let inst_vars = VarMgr::new();
    inst_vars.add("x", Variant::string("instance")).unwrap();

    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), inst_vars);
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    assert_eq!(&*observed.borrow(), &["temp".to_string()]);
}

#[test]
fn test_scope_variables_visible_to_descendants() {
    let observed: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let record = observed.clone();

    let root = ElementBuilder::new("section")
        .child(ElementBuilder::new("p").attr_expr(
            "probe",
            Rc::new(move |stack: &mut Stack| {
                let v = stack.find_named_var("title")?;
                record.borrow_mut().push(v.stringify());
                Ok(Variant::Undefined)
            }),
        ))
        .build();

    root.scope_variables()
        .add("title", Variant::string("from-scope"))
        .unwrap();

    let doc = Document::new(root);
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    assert_eq!(&*observed.borrow(), &["from-scope".to_string()]);
}

#[test]
fn test_missing_name_is_entity_not_found() {
    let hit = Rc::new(RefCell::new(None));
    let record = hit.clone();
    let root = ElementBuilder::new("div")
        .attr_expr(
            "probe",
            Rc::new(move |stack: &mut Stack| {
                *record.borrow_mut() = Some(stack.find_named_var("nowhere").unwrap_err().kind);
                Ok(Variant::Undefined)
            }),
        )
        .build();
    let doc = Document::new(root);
    let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
    let mut co = Coroutine::new(stack);
    co.run().unwrap();

    assert_eq!(*hit.borrow(), Some(hvmlrt::ErrorKind::EntityNotFound));
}
