//! Per-tag element op tables.

pub mod erase;
pub mod fallback;
pub mod iterate;
pub mod observe;
pub mod sort;
pub mod structural;

use crate::vdom::{ElementRef, Node};
use std::rc::Rc;

/// Shared child-cursor semantics: `None` starts at the first child, a
/// visited index resumes at the next sibling; reaching the end resets the
/// cursor so a rerun restarts the walk. Content and comment nodes are
/// skipped.
pub(crate) fn select_next_child(pos: &ElementRef, curr: &mut Option<usize>) -> Option<ElementRef> {
    let children = pos.children.borrow();
    let mut idx = match *curr {
        None => 0,
        Some(i) => i + 1,
    };
    while idx < children.len() {
        if let Node::Element(el) = &children[idx] {
            *curr = Some(idx);
            return Some(Rc::clone(el));
        }
        idx += 1;
    }
    *curr = None;
    None
}
