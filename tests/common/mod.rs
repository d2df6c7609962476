//! Shared test helpers.

#![allow(dead_code)]

use hvmlrt::interp::Stack;
use hvmlrt::variant::Variant;
use hvmlrt::vdom::{DomHandle, DomSink, ElementBuilder};
use std::cell::RefCell;
use std::rc::Rc;

/// A probe element whose attribute expression records the `$?` it sees.
pub fn probe(seen: &Rc<RefCell<Vec<Variant>>>) -> ElementBuilder {
    let seen = seen.clone();
    ElementBuilder::new("div").attr_expr(
        "probe",
        Rc::new(move |stack: &mut Stack| {
            seen.borrow_mut().push(stack.get_question());
            Ok(Variant::Undefined)
        }),
    )
}

/// Scripted DOM double: a fixed selector→handles table plus a record of
/// every mutation.
pub struct ScriptedDom {
    pub matches: Vec<DomHandle>,
    pub erased: RefCell<Vec<DomHandle>>,
    pub removed_attrs: RefCell<Vec<(DomHandle, String)>>,
}

impl ScriptedDom {
    pub fn with_matches(matches: Vec<DomHandle>) -> Rc<ScriptedDom> {
        Rc::new(ScriptedDom {
            matches,
            erased: RefCell::new(Vec::new()),
            removed_attrs: RefCell::new(Vec::new()),
        })
    }
}

impl DomSink for ScriptedDom {
    fn select(&self, _css: &str) -> Vec<DomHandle> {
        self.matches.clone()
    }
    fn erase_element(&self, h: DomHandle) -> bool {
        self.erased.borrow_mut().push(h);
        true
    }
    fn remove_attribute(&self, h: DomHandle, name: &str) -> bool {
        self.removed_attrs.borrow_mut().push((h, name.to_string()));
        true
    }
}
