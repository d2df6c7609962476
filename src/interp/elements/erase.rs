//! The erase element.
//!
//! Dispatches on the type of `on`:
//! - string: a CSS selector resolved through the stack's DomSink. With no
//!   `at`, matching elements are erased; with `at` starting in `attr.`,
//!   that attribute is removed from each match. Any other `at` is
//!   InvalidValue.
//! - object: `at` lists `.key` tokens to remove, otherwise clear;
//! - array/set: `at` is an index `[n]`, otherwise clear;
//! - native: delegates to the entity's eraser.
//!
//! `?` is set to the number of removals.

use crate::error::{Error, ErrorKind, Result};
use crate::interp::ops::ElementOps;
use crate::interp::{eval_attr, Stack};
use crate::variant::Variant;
use crate::vdom::ElementRef;
use std::rc::Rc;

struct EraseOps;
static OPS: EraseOps = EraseOps;

pub fn ops() -> &'static dyn ElementOps {
    &OPS
}

const ATTR_PREFIX: &str = "attr.";

fn selector_erase(stack: &Stack, selector: &str, at: Option<&Variant>) -> Result<u64> {
    let handles = stack.dom.select(selector);
    match at {
        None => {
            let mut removed = 0;
            for h in handles {
                if stack.dom.erase_element(h) {
                    removed += 1;
                }
            }
            Ok(removed)
        }
        Some(at) => {
            let s_at = at
                .as_str()
                .ok_or_else(|| Error::invalid_value("'at' must be a string"))?;
            let name = s_at.strip_prefix(ATTR_PREFIX).ok_or_else(|| {
                Error::invalid_value("'at' must start with 'attr.' or be absent")
            })?;
            let mut removed = 0;
            for h in handles {
                if stack.dom.remove_attribute(h, name) {
                    removed += 1;
                }
            }
            Ok(removed)
        }
    }
}

fn object_erase(on: &Variant, at: Option<&Variant>, silently: bool) -> Result<u64> {
    match at {
        Some(at) => {
            let s_at = at
                .as_str()
                .ok_or_else(|| Error::invalid_value("'at' must be a string"))?;
            let mut removed = 0;
            for token in s_at.split_whitespace() {
                if let Some(key) = token.strip_prefix('.') {
                    if !key.is_empty() && on.remove_by_key(key, true)? {
                        removed += 1;
                    }
                }
            }
            let _ = silently;
            Ok(removed)
        }
        None => Ok(on.clear()? as u64),
    }
}

fn parse_index(at: &Variant) -> Result<usize> {
    let s = at
        .as_str()
        .ok_or_else(|| Error::invalid_value("'at' must be a string"))?;
    let inner = s
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| Error::invalid_value("'at' must be an index '[n]'"))?;
    inner
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::invalid_value("bad index in 'at'"))
}

fn array_erase(on: &Variant, at: Option<&Variant>) -> Result<u64> {
    match at {
        Some(at) => {
            let idx = parse_index(at)?;
            on.array_remove(idx)?;
            Ok(1)
        }
        None => Ok(on.clear()? as u64),
    }
}

fn set_erase(on: &Variant, at: Option<&Variant>) -> Result<u64> {
    match at {
        Some(at) => {
            let idx = parse_index(at)?;
            on.set_remove(idx)?;
            Ok(1)
        }
        None => Ok(on.clear()? as u64),
    }
}

fn native_erase(on: &Variant, silently: bool) -> Result<u64> {
    let Variant::Native(nv) = on else {
        return Ok(0);
    };
    match nv.ops.eraser {
        Some(eraser) => {
            let v = eraser(&nv.entity, silently)?;
            v.cast_to_ulongint(true)
        }
        None => Ok(0),
    }
}

impl ElementOps for EraseOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.except.is_some() {
            return Ok(());
        }
        let pos = Rc::clone(&stack.top_frame().expect("frame exists").pos);
        let tag = &*pos.tag;

        let mut on: Option<Variant> = None;
        let mut at: Option<Variant> = None;

        for attr in &pos.attrs {
            match &*attr.name {
                "on" => {
                    if on.is_some() {
                        return Err(Error::duplicated_attr(tag, "on"));
                    }
                    let val = eval_attr(stack, &attr.value)?;
                    if val.is_undefined() {
                        return Err(Error::invalid_attr_value(tag, "on"));
                    }
                    on = Some(val);
                }
                "at" => {
                    if at.is_some() {
                        return Err(Error::duplicated_attr(tag, "at"));
                    }
                    at = Some(eval_attr(stack, &attr.value)?);
                }
                "silently" => {}
                other => {
                    return Err(Error::with_detail(
                        ErrorKind::NotImplemented,
                        format!("attribute '{}' for element <{}>", other, tag),
                    ));
                }
            }
        }

        let on = on.ok_or_else(|| Error::invalid_value("`on` not specified"))?;
        let silently = stack.top_frame().map(|f| f.silently).unwrap_or(false);

        let removed = match &on {
            Variant::String(_) => selector_erase(stack, on.as_str().unwrap_or(""), at.as_ref())?,
            Variant::Object(_) => object_erase(&on, at.as_ref(), silently)?,
            Variant::Array(_) => array_erase(&on, at.as_ref())?,
            Variant::Set(_) => set_erase(&on, at.as_ref())?,
            Variant::Native(_) => native_erase(&on, silently)?,
            _ => 0,
        };

        stack.set_question(Variant::ULongInt(removed))?;
        Ok(())
    }

    fn select_child(&self, _stack: &mut Stack) -> Result<Option<ElementRef>> {
        Ok(None)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(true)
    }
}
