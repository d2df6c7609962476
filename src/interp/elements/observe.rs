//! The observe and forget elements.
//!
//! `observe on=… for="type:subtype"` registers interest; the element's
//! children do not run now but are replayed whenever a matching event is
//! dispatched to the coroutine. Observers keep the coroutine alive in
//! WAIT after the document pass. `forget` removes matching registrations.

use crate::error::{Error, ErrorKind, Result};
use crate::interp::ops::ElementOps;
use crate::interp::{eval_attr, ObserveSource, Stack, StackObserver};
use crate::variant::Variant;
use crate::vdom::{AttrValue, ElementRef};
use std::rc::Rc;
use std::sync::Arc;

struct ObserveOps;
static OBSERVE: ObserveOps = ObserveOps;

pub fn observe_ops() -> &'static dyn ElementOps {
    &OBSERVE
}

struct ForgetOps;
static FORGET: ForgetOps = ForgetOps;

pub fn forget_ops() -> &'static dyn ElementOps {
    &FORGET
}

struct ObserveArgs {
    /// The raw `on` attribute and its evaluated value; a string keeps the
    /// name for manager-level observation.
    source: ObserveSource,
    source_name: Option<String>,
    event: String,
}

fn collect_args(stack: &mut Stack, tag: &str) -> Result<ObserveArgs> {
    let pos = Rc::clone(&stack.top_frame().expect("frame exists").pos);

    let mut on_val: Option<Variant> = None;
    let mut on_name: Option<String> = None;
    let mut event: Option<String> = None;

    for attr in &pos.attrs {
        match &*attr.name {
            "on" => {
                if on_val.is_some() {
                    return Err(Error::duplicated_attr(tag, "on"));
                }
                if let AttrValue::Literal(lit) = &attr.value {
                    if let Some(name) = lit.strip_prefix('$') {
                        on_name = Some(name.to_string());
                    }
                }
                let val = eval_attr(stack, &attr.value)?;
                if val.is_undefined() {
                    return Err(Error::invalid_attr_value(tag, "on"));
                }
                on_val = Some(val);
            }
            "for" => {
                if event.is_some() {
                    return Err(Error::duplicated_attr(tag, "for"));
                }
                let val = eval_attr(stack, &attr.value)?;
                event = val.as_str().map(|s| s.to_string());
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

    let on = on_val.ok_or_else(|| Error::argument_missed("attribute 'on'"))?;
    let event = event.ok_or_else(|| Error::argument_missed("attribute 'for'"))?;

    // a `$name` reference observes the manager entry by name, which
    // stays valid across rebinding; only anonymous values are tracked by
    // identity
    let source = if let Some(n) = &on_name {
        ObserveSource::Named(Box::from(&**n))
    } else if let Some(s) = on.as_str() {
        ObserveSource::Named(Box::from(s))
    } else {
        ObserveSource::Variant(on)
    };
    Ok(ObserveArgs {
        source,
        source_name: on_name,
        event,
    })
}

/// Register a manager-level observer when the source is a named document
/// or instance variable, so container mutations reach this stack's
/// queue.
fn observe_in_managers(stack: &Stack, name: &str, event: &str) {
    let queue = Arc::clone(&stack.queue);
    if stack.doc.variables.get(name).is_ok() {
        stack.doc.variables.observe(name, event, queue);
    } else if stack.inst_vars.get(name).is_ok() {
        stack.inst_vars.observe(name, event, queue);
    }
}

fn forget_in_managers(stack: &Stack, name: &str, event: &str) {
    if stack.doc.variables.get(name).is_ok() {
        stack.doc.variables.forget(name, event, &stack.queue);
    } else if stack.inst_vars.get(name).is_ok() {
        stack.inst_vars.forget(name, event, &stack.queue);
    }
}

impl ElementOps for ObserveOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.except.is_some() {
            return Ok(());
        }
        let pos = Rc::clone(&stack.top_frame().expect("frame exists").pos);
        let args = collect_args(stack, "observe")?;

        let (event_type, sub_type) = match args.event.split_once(':') {
            Some((t, s)) => (Box::from(t), Some(Box::from(s))),
            None => (Box::from(&*args.event), None),
        };

        // only manager-translated events need a manager-level record
        let manager_event =
            args.event.starts_with("change:") || args.event.starts_with("except:");
        if manager_event {
            if let Some(name) = &args.source_name {
                observe_in_managers(stack, name, &args.event);
            }
        }

        stack.observers.push(StackObserver {
            source: args.source,
            event_type,
            sub_type,
            pos,
        });
        Ok(())
    }

    fn select_child(&self, _stack: &mut Stack) -> Result<Option<ElementRef>> {
        // children run only on event dispatch
        Ok(None)
    }

    fn rerun(&self, _stack: &mut Stack) -> Result<bool> {
        Ok(false)
    }

    fn on_popping(&self, _stack: &mut Stack) -> Result<bool> {
        // the registration outlives the frame
        Ok(true)
    }
}

impl ElementOps for ForgetOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.except.is_some() {
            return Ok(());
        }
        let args = collect_args(stack, "forget")?;

        let (event_type, sub_type) = match args.event.split_once(':') {
            Some((t, s)) => (t.to_string(), Some(s.to_string())),
            None => (args.event.clone(), None),
        };

        if args.event.starts_with("change:") || args.event.starts_with("except:") {
            if let Some(name) = &args.source_name {
                forget_in_managers(stack, name, &args.event);
            }
        }

        let before = stack.observers.len();
        stack.observers.retain(|o| {
            if &*o.event_type != event_type {
                return true;
            }
            if o.sub_type.as_deref() != sub_type.as_deref() {
                return true;
            }
            match (&o.source, &args.source) {
                (ObserveSource::Named(a), ObserveSource::Named(b)) => a != b,
                (ObserveSource::Variant(a), ObserveSource::Variant(b)) => !a.ptr_eq(b),
                _ => true,
            }
        });
        let removed = before - stack.observers.len();
        stack.set_question(Variant::ULongInt(removed as u64))?;
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
