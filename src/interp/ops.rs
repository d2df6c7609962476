//! Element op tables and the tag registry.

use super::elements;
use super::Stack;
use crate::error::Result;
use crate::vdom::ElementRef;

/// The four hooks defining an element's runtime behaviour.
///
/// `after_pushed` runs right after the frame is created and typically
/// builds the frame context from the element's attributes.
/// `select_child` picks the next child to visit, or `None` when the
/// element is done with this pass. When `on_popping` returns false the
/// frame stays and `rerun` prepares the next pass; `rerun` returning
/// false abandons the frame.
pub trait ElementOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()>;
    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>>;
    fn rerun(&self, stack: &mut Stack) -> Result<bool>;
    fn on_popping(&self, stack: &mut Stack) -> Result<bool>;
}

/// Resolve the op table for a tag. Unknown tags get the fallback
/// (generic element) ops.
pub fn ops_for_tag(tag: &str) -> &'static dyn ElementOps {
    match tag {
        "hvml" => elements::structural::hvml_ops(),
        "head" => elements::structural::head_ops(),
        "body" => elements::structural::body_ops(),
        "iterate" => elements::iterate::ops(),
        "sort" => elements::sort::ops(),
        "erase" => elements::erase::ops(),
        "observe" => elements::observe::observe_ops(),
        "forget" => elements::observe::forget_ops(),
        _ => elements::fallback::ops(),
    }
}

/// The generic-element op table, also used when dispatching an observer
/// subtree.
pub fn fallback_ops() -> &'static dyn ElementOps {
    elements::fallback::ops()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tags_resolve() {
        // distinct tables for distinct tags
        let it = ops_for_tag("iterate") as *const dyn ElementOps;
        let so = ops_for_tag("sort") as *const dyn ElementOps;
        assert!(!std::ptr::addr_eq(it, so));
    }

    #[test]
    fn test_unknown_tag_gets_fallback() {
        let a = ops_for_tag("totally-custom") as *const dyn ElementOps;
        let b = fallback_ops() as *const dyn ElementOps;
        assert!(std::ptr::addr_eq(a, b));
    }
}
