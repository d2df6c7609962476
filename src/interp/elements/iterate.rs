//! The iterate element.
//!
//! Two looping regimes, mutually exclusive:
//!
//! - rule-driven (`by="RANGE: FROM 0"`): a registered executor supplies
//!   begin/next/value; the loop variable `?` takes each value and `%`
//!   counts iterations. A NotExists from `next` ends the loop cleanly.
//! - guarded (`with` / `onlyif` / `while`): `onlyif` guards at the top of
//!   each pass, `with` produces the pass value, `while` guards at the
//!   bottom. `nosetotail` feeds the finished pass's `?` back into `$<`.

use super::select_next_child;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::{executor_for_rule, IterExecutor};
use crate::interp::ops::ElementOps;
use crate::interp::{eval_attr, Stack};
use crate::variant::Variant;
use crate::vdom::{AttrValue, ElementRef};
use std::rc::Rc;

#[derive(Default)]
struct IterateCtxt {
    on: Option<Variant>,
    onlyif_attr: Option<AttrValue>,
    while_attr: Option<AttrValue>,
    with_attr: Option<AttrValue>,
    rule_attr: Option<AttrValue>,
    exec: Option<Box<dyn IterExecutor>>,
    rule: String,
    curr: Option<usize>,
    stop: bool,
    with_set: bool,
    by_set: bool,
    nosetotail: bool,
}

struct IterateOps;
static OPS: IterateOps = IterateOps;

pub fn ops() -> &'static dyn ElementOps {
    &OPS
}

fn check_stop(val: &Variant) -> bool {
    match val {
        Variant::Undefined | Variant::Null => true,
        Variant::Boolean(b) => !b,
        _ => false,
    }
}

/// Evaluate a guard attribute to a truth value; 0 means stop.
fn check_guard(stack: &mut Stack, attr: &AttrValue, force: bool) -> Result<bool> {
    let val = eval_attr(stack, attr)?;
    let i = val.cast_to_longint(force)?;
    Ok(i == 0)
}

fn re_eval_with(stack: &mut Stack, attr: &AttrValue) -> Result<bool> {
    let val = eval_attr(stack, attr)?;
    if check_stop(&val) {
        return Ok(true);
    }
    stack.set_question(val)?;
    Ok(false)
}

fn walk_attrs(stack: &mut Stack, ctxt: &mut IterateCtxt) -> Result<()> {
    let pos = Rc::clone(&stack.top_frame().expect("frame exists").pos);
    let tag = &*pos.tag;
    for attr in &pos.attrs {
        match &*attr.name {
            "on" => {
                if ctxt.on.is_some() {
                    return Err(Error::duplicated_attr(tag, "on"));
                }
                let val = eval_attr(stack, &attr.value)?;
                if val.is_undefined() {
                    return Err(Error::invalid_attr_value(tag, "on"));
                }
                stack.set_input(val.clone())?;
                ctxt.on = Some(val);
            }
            "by" => {
                if ctxt.with_set {
                    return Err(Error::with_detail(
                        ErrorKind::Unsupported,
                        "attribute 'by' conflicts with 'onlyif/while/with'",
                    ));
                }
                if ctxt.rule_attr.is_some() {
                    return Err(Error::duplicated_attr(tag, "by"));
                }
                ctxt.rule_attr = Some(attr.value.clone());
                ctxt.by_set = true;
            }
            "onlyif" => {
                if ctxt.by_set {
                    return Err(Error::with_detail(
                        ErrorKind::Unsupported,
                        "attribute 'onlyif' conflicts with 'by'",
                    ));
                }
                if ctxt.onlyif_attr.is_some() {
                    return Err(Error::duplicated_attr(tag, "onlyif"));
                }
                ctxt.onlyif_attr = Some(attr.value.clone());
                ctxt.with_set = true;
            }
            "while" => {
                if ctxt.by_set {
                    return Err(Error::with_detail(
                        ErrorKind::Unsupported,
                        "attribute 'while' conflicts with 'by'",
                    ));
                }
                if ctxt.while_attr.is_some() {
                    return Err(Error::duplicated_attr(tag, "while"));
                }
                ctxt.while_attr = Some(attr.value.clone());
                ctxt.with_set = true;
            }
            "with" => {
                if ctxt.with_attr.is_some() {
                    return Err(Error::duplicated_attr(tag, "with"));
                }
                ctxt.with_attr = Some(attr.value.clone());
                ctxt.with_set = true;
            }
            "nosetotail" => ctxt.nosetotail = true,
            "silently" => {}
            other => {
                return Err(Error::with_detail(
                    ErrorKind::NotImplemented,
                    format!("attribute '{}' for element <{}>", other, tag),
                ));
            }
        }
    }
    Ok(())
}

fn begin_by_rule(stack: &mut Stack, ctxt: &mut IterateCtxt) -> Result<()> {
    let on = ctxt
        .on
        .clone()
        .ok_or_else(|| Error::argument_missed("attribute 'on' for element <iterate>"))?;

    let with = match &ctxt.with_attr {
        Some(attr) => eval_attr(stack, attr)?,
        None => Variant::Undefined,
    };

    let rule = match &ctxt.rule_attr {
        Some(attr) => {
            let val = eval_attr(stack, attr)?;
            val.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| Error::invalid_value("'by' rule must be a string"))?
        }
        None => String::from("RANGE: FROM 0"),
    };

    let factory = executor_for_rule(&rule)?;
    let mut exec = factory(on, with)?;
    let has_first = exec.begin(&rule)?;
    if !has_first {
        ctxt.stop = true;
        return Ok(());
    }

    let value = exec.value()?;
    stack.set_question(value.clone())?;
    stack.set_input(value)?;

    ctxt.rule = rule;
    ctxt.exec = Some(exec);
    Ok(())
}

fn begin_with(stack: &mut Stack, ctxt: &mut IterateCtxt) -> Result<()> {
    if ctxt.on.is_none() && ctxt.with_attr.is_none() {
        return Err(Error::argument_missed(
            "attribute 'on' for element <iterate>",
        ));
    }

    if let Some(onlyif) = ctxt.onlyif_attr.clone() {
        if check_guard(stack, &onlyif, true)? {
            ctxt.stop = true;
            return Ok(());
        }
    }

    let with = ctxt
        .with_attr
        .clone()
        .ok_or_else(|| Error::argument_missed("attribute 'with' for element <iterate>"))?;
    if re_eval_with(stack, &with)? {
        ctxt.stop = true;
    }
    Ok(())
}

impl ElementOps for IterateOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.except.is_some() {
            return Ok(());
        }

        let mut ctxt = IterateCtxt::default();
        walk_attrs(stack, &mut ctxt)?;

        if !ctxt.by_set && !ctxt.with_set {
            ctxt.by_set = true;
        }

        if ctxt.by_set {
            begin_by_rule(stack, &mut ctxt)?;
        } else {
            begin_with(stack, &mut ctxt)?;
        }

        if let Some(frame) = stack.top_frame_mut() {
            frame.ctxt = Some(Box::new(ctxt));
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
        let Some(mut ctxt) = stack.take_ctxt::<IterateCtxt>() else {
            return Ok(None);
        };
        let next = if ctxt.stop {
            None
        } else {
            select_next_child(&pos, &mut ctxt.curr)
        };
        stack.put_ctxt(ctxt);
        Ok(next)
    }

    fn rerun(&self, stack: &mut Stack) -> Result<bool> {
        let Some(mut ctxt) = stack.take_ctxt::<IterateCtxt>() else {
            return Ok(false);
        };
        let keep = rerun_inner(stack, &mut ctxt);
        stack.put_ctxt(ctxt);
        keep
    }

    fn on_popping(&self, stack: &mut Stack) -> Result<bool> {
        if stack.except.is_some() {
            return Ok(true);
        }
        let Some(mut ctxt) = stack.take_ctxt::<IterateCtxt>() else {
            return Ok(true);
        };
        let done = on_popping_inner(stack, &mut ctxt);
        stack.put_ctxt(ctxt);
        done
    }
}

fn on_popping_inner(stack: &mut Stack, ctxt: &mut IterateCtxt) -> Result<bool> {
    if !ctxt.by_set {
        // guarded loop: `while` at the bottom, `%` counts finished passes
        if ctxt.stop {
            return Ok(true);
        }
        if let Some(while_attr) = ctxt.while_attr.clone() {
            if check_guard(stack, &while_attr, false)? {
                ctxt.stop = true;
                return Ok(true);
            }
        }
        stack.inc_percent()?;
        return Ok(false);
    }

    let Some(exec) = ctxt.exec.as_mut() else {
        return Ok(true);
    };
    match exec.next(Some(&ctxt.rule)) {
        Ok(true) => Ok(false),
        Ok(false) => Ok(true),
        Err(e) if e.kind == ErrorKind::NotExists => {
            crate::error::clear_error();
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

fn rerun_inner(stack: &mut Stack, ctxt: &mut IterateCtxt) -> Result<bool> {
    if !ctxt.by_set {
        if ctxt.nosetotail {
            let q = stack.get_question();
            stack.set_input(q)?;
        }
        if let Some(onlyif) = ctxt.onlyif_attr.clone() {
            if check_guard(stack, &onlyif, true)? {
                ctxt.stop = true;
                return Ok(true);
            }
        }
        let with = ctxt
            .with_attr
            .clone()
            .ok_or_else(|| Error::argument_missed("attribute 'with' for element <iterate>"))?;
        if re_eval_with(stack, &with)? {
            ctxt.stop = true;
        }
        return Ok(true);
    }

    stack.inc_percent()?;
    let Some(exec) = ctxt.exec.as_ref() else {
        return Ok(false);
    };
    let value = exec.value()?;
    stack.set_question(value.clone())?;
    stack.set_input(value)?;
    Ok(true)
}
