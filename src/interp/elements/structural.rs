//! Structural elements: hvml, head, body.
//!
//! These drive the document-mode state machine and otherwise behave like
//! generic containers. Mode transitions only apply when the stack runs a
//! full document; fragments keep their fixed InBody mode.

use super::select_next_child;
use crate::error::Result;
use crate::interp::ops::ElementOps;
use crate::interp::{DocMode, Stack};
use crate::vdom::ElementRef;
use std::rc::Rc;

struct StructCtxt {
    curr: Option<usize>,
}

fn generic_after_pushed(stack: &mut Stack) {
    if let Some(frame) = stack.top_frame_mut() {
        frame.ctxt = Some(Box::new(StructCtxt { curr: None }));
    }
}

fn generic_select_child(stack: &mut Stack) -> Result<Option<ElementRef>> {
    if stack.back_anchor.is_some() {
        return Ok(None);
    }
    let pos = match stack.top_frame() {
        Some(f) => Rc::clone(&f.pos),
        None => return Ok(None),
    };
    let Some(mut ctxt) = stack.take_ctxt::<StructCtxt>() else {
        return Ok(None);
    };
    let next = select_next_child(&pos, &mut ctxt.curr);
    stack.put_ctxt(ctxt);
    Ok(next)
}

// ── hvml ──────────────────────────────────────────────────────────────

struct HvmlOps;
static HVML: HvmlOps = HvmlOps;

pub fn hvml_ops() -> &'static dyn ElementOps {
    &HVML
}

impl ElementOps for HvmlOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.mode == DocMode::BeforeHvml {
            stack.transit_mode(DocMode::BeforeHead)?;
        }
        generic_after_pushed(stack);
        Ok(())
    }

    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>> {
        generic_select_child(stack)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, stack: &mut Stack) -> Result<bool> {
        if stack.mode == DocMode::AfterBody {
            stack.transit_mode(DocMode::AfterHvml)?;
        }
        Ok(true)
    }
}

// ── head ──────────────────────────────────────────────────────────────

struct HeadOps;
static HEAD: HeadOps = HeadOps;

pub fn head_ops() -> &'static dyn ElementOps {
    &HEAD
}

impl ElementOps for HeadOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.mode == DocMode::BeforeHead {
            stack.transit_mode(DocMode::InHead)?;
        }
        generic_after_pushed(stack);
        Ok(())
    }

    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>> {
        generic_select_child(stack)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, stack: &mut Stack) -> Result<bool> {
        if stack.mode == DocMode::InHead {
            stack.transit_mode(DocMode::AfterHead)?;
        }
        Ok(true)
    }
}

// ── body ──────────────────────────────────────────────────────────────

struct BodyOps;
static BODY: BodyOps = BodyOps;

pub fn body_ops() -> &'static dyn ElementOps {
    &BODY
}

impl ElementOps for BodyOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        // a document without a head jumps straight past it
        if stack.mode == DocMode::BeforeHead {
            stack.transit_mode(DocMode::AfterHead)?;
        }
        if stack.mode == DocMode::AfterHead {
            stack.transit_mode(DocMode::InBody)?;
        }
        generic_after_pushed(stack);
        Ok(())
    }

    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>> {
        generic_select_child(stack)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, stack: &mut Stack) -> Result<bool> {
        if stack.mode == DocMode::InBody {
            stack.transit_mode(DocMode::AfterBody)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::interp::{Coroutine, DocMode, Stack};
    use crate::msg::MsgQueue;
    use crate::varmgr::VarMgr;
    use crate::vdom::{Document, ElementBuilder};
    use std::sync::Arc;

    #[test]
    fn test_full_document_mode_chain() {
        let root = ElementBuilder::new("hvml")
            .child(ElementBuilder::new("head"))
            .child(ElementBuilder::new("body"))
            .build();
        let doc = Document::new(root);
        let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
        let mut co = Coroutine::new(stack);
        co.run().unwrap();
        assert_eq!(co.stack.mode, DocMode::AfterHvml);
    }

    #[test]
    fn test_headless_document() {
        let root = ElementBuilder::new("hvml")
            .child(ElementBuilder::new("body"))
            .build();
        let doc = Document::new(root);
        let stack = Stack::new(doc, Arc::new(MsgQueue::new()), VarMgr::new());
        let mut co = Coroutine::new(stack);
        co.run().unwrap();
        assert_eq!(co.stack.mode, DocMode::AfterHvml);
    }
}
