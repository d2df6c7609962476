//! The generic-element op table.
//!
//! Unknown tags evaluate their attributes into the frame's attribute
//! map, visit their element children in document order, and pop. This is
//! also the table used to run an observer subtree on event dispatch.

use super::select_next_child;
use crate::error::Result;
use crate::interp::ops::ElementOps;
use crate::interp::{eval_attr, Stack};
use crate::vdom::ElementRef;
use std::rc::Rc;

struct GenericCtxt {
    curr: Option<usize>,
}

pub(crate) struct FallbackOps;

static OPS: FallbackOps = FallbackOps;

pub fn ops() -> &'static dyn ElementOps {
    &OPS
}

impl ElementOps for FallbackOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        let pos = match stack.top_frame() {
            Some(f) => Rc::clone(&f.pos),
            None => return Ok(()),
        };
        for attr in &pos.attrs {
            if &*attr.name == "silently" {
                continue;
            }
            let val = eval_attr(stack, &attr.value)?;
            if let Some(frame) = stack.top_frame() {
                frame.attr_vars.set_by_key(&attr.name, val)?;
            }
        }
        if let Some(frame) = stack.top_frame_mut() {
            frame.ctxt = Some(Box::new(GenericCtxt { curr: None }));
        }
        Ok(())
    }

    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>> {
        let my_index = stack.frames.len().saturating_sub(1);
        if stack.back_anchor == Some(my_index) {
            stack.back_anchor = None;
        }
        if stack.back_anchor.is_some() {
            return Ok(None);
        }
        let pos = match stack.top_frame() {
            Some(f) => Rc::clone(&f.pos),
            None => return Ok(None),
        };
        let Some(mut ctxt) = stack.take_ctxt::<GenericCtxt>() else {
            return Ok(None);
        };
        let next = select_next_child(&pos, &mut ctxt.curr);
        stack.put_ctxt(ctxt);
        Ok(next)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(true)
    }
}
