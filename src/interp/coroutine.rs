//! The coroutine: frame-stack engine, suspension, and event dispatch.
//!
//! A coroutine runs its document to completion, then either exits or —
//! when observers registered interest — moves to WAIT and is driven by
//! messages from its instance queue. Timers post into the same queue;
//! delivery happens only at checkpoints, never preemptively.

use super::ops::{fallback_ops, ops_for_tag, ElementOps};
use super::{Frame, ObserveSource, Stack, SymbolVar, NR_SYMBOLS};
use crate::error::{Error, Result};
use crate::msg::{Message, MsgType};
use crate::variant::Variant;
use crate::vdom::ElementRef;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    Ready,
    Run,
    Wait,
    Exited,
}

pub struct Coroutine {
    pub stack: Stack,
    pub state: CoroutineState,
}

pub(crate) fn fresh_symbols() -> [Variant; NR_SYMBOLS] {
    [
        Variant::Undefined,                                // ?
        Variant::Undefined,                                // <
        Variant::Undefined,                                // @
        Variant::object(Vec::<(String, Variant)>::new()),  // !
        Variant::Undefined,                                // :
        Variant::Undefined,                                // =
        Variant::LongInt(0),                               // %
    ]
}

/// Create and push a frame for `element`, then run its `after_pushed`.
/// Child frames inherit `?`, `<`, the silently flag of the attribute, and
/// the EDOM target.
fn push_element(
    stack: &mut Stack,
    element: ElementRef,
    ops_override: Option<&'static dyn ElementOps>,
) {
    let mut symbols = fresh_symbols();
    let mut edom_target = None;
    if let Some(parent) = stack.frames.last() {
        symbols[SymbolVar::Question as usize] =
            parent.symbols[SymbolVar::Question as usize].clone();
        symbols[SymbolVar::LessThan as usize] =
            parent.symbols[SymbolVar::LessThan as usize].clone();
        edom_target = parent.edom_target;
    }
    let silently = element.attr("silently").is_some();
    let ops = ops_override.unwrap_or_else(|| ops_for_tag(&element.tag));

    stack.frames.push(Frame {
        pos: element,
        ctxt: None,
        ops,
        symbols,
        attr_vars: Variant::object(Vec::<(String, Variant)>::new()),
        silently,
        edom_target,
    });

    if stack.except.is_none() {
        if let Err(e) = ops.after_pushed(stack) {
            record_error(stack, e);
        }
    }
}

/// Pop the top frame, propagating its `?` into the parent. The frame
/// context's Drop acts as the destroy hook.
fn pop_top(stack: &mut Stack) {
    if let Some(frame) = stack.frames.pop() {
        if stack.back_anchor == Some(stack.frames.len()) {
            stack.back_anchor = None;
        }
        let result = frame.symbols[SymbolVar::Question as usize].clone();
        if let Some(parent) = stack.frames.last_mut() {
            parent.symbols[SymbolVar::Question as usize] = result;
        }
    }
}

/// A hook failure becomes either a benign default (silently frames) or
/// the stack exception. The thread error slot tracks it either way.
fn record_error(stack: &mut Stack, err: Error) {
    crate::error::set_last_error(err.clone());
    let silently = stack.top_frame().map(|f| f.silently).unwrap_or(false);
    if silently {
        debug!(error = %err, "error suppressed by silently");
        crate::error::clear_error();
        let _ = stack.set_question(Variant::Undefined);
    } else {
        stack.except = Some(err);
    }
}

/// Drive the stack until it returns to `base` depth.
fn run_to_base(stack: &mut Stack, base: usize) {
    while stack.frames.len() > base {
        if stack.except.is_some() {
            // unwinding: every frame still gets its on_popping
            let ops = stack.top_frame().map(|f| f.ops);
            if let Some(ops) = ops {
                let _ = ops.on_popping(stack);
            }
            pop_top(stack);
            continue;
        }

        let ops = match stack.top_frame() {
            Some(f) => f.ops,
            None => break,
        };

        match ops.select_child(stack) {
            Ok(Some(child)) => push_element(stack, child, None),
            Ok(None) => match ops.on_popping(stack) {
                Ok(true) => pop_top(stack),
                Ok(false) => match ops.rerun(stack) {
                    Ok(true) => {}
                    Ok(false) => pop_top(stack),
                    Err(e) => record_error(stack, e),
                },
                Err(e) => record_error(stack, e),
            },
            Err(e) => record_error(stack, e),
        }
    }
}

impl Coroutine {
    pub fn new(stack: Stack) -> Coroutine {
        Coroutine {
            stack,
            state: CoroutineState::Ready,
        }
    }

    /// Execute the document from the root. On return the coroutine is in
    /// WAIT (observers registered) or EXITED.
    pub fn run(&mut self) -> Result<()> {
        debug_assert!(self.state == CoroutineState::Ready);
        self.state = CoroutineState::Run;

        let root = Rc::clone(&self.stack.doc.root);
        push_element(&mut self.stack, root, None);
        run_to_base(&mut self.stack, 0);

        self.settle();
        match &self.stack.except {
            Some(e) if self.state == CoroutineState::Exited => Err(e.clone()),
            _ => Ok(()),
        }
    }

    /// After a pass: WAIT when observers keep the coroutine alive,
    /// EXITED otherwise. An unconsumed exception fires `except:<Name>`
    /// at matching observers before deciding.
    fn settle(&mut self) {
        if let Some(err) = self.stack.except.take() {
            let name = err.kind.name();
            let handled = self.dispatch_event_inner(None, "except", Some(name));
            if !handled {
                warn!(except = name, "coroutine exited with unobserved exception");
                self.stack.except = Some(err);
                self.exit();
                return;
            }
        }
        if self.stack.observers.is_empty() {
            self.exit();
        } else {
            self.state = CoroutineState::Wait;
        }
    }

    /// Terminate: run cancel routines in reverse and mark EXITED.
    pub fn exit(&mut self) {
        if self.state != CoroutineState::Exited {
            self.stack.run_cancels();
            self.state = CoroutineState::Exited;
        }
    }

    /// Deliver one message at a checkpoint.
    pub fn handle_message(&mut self, msg: Message) {
        if self.state == CoroutineState::Exited {
            return;
        }
        if msg.ty != MsgType::Event {
            // requests and responses belong to the host side
            return;
        }
        if let Some(id) = msg.timer_id.as_deref() {
            if let Some(hub) = &self.stack.timers {
                hub.processed(id);
            }
        }
        let Some(event) = msg.event_name().map(|s| s.to_string()) else {
            return;
        };
        let (ty, sub) = match event.split_once(':') {
            Some((t, s)) => (t.to_string(), Some(s.to_string())),
            None => (event, None),
        };
        self.dispatch_event(&msg, &ty, sub.as_deref());
    }

    fn dispatch_event(&mut self, msg: &Message, ty: &str, sub: Option<&str>) {
        let _ = self.dispatch_event_inner(Some(msg), ty, sub);
    }

    /// Run the subtree of every matching observer. Returns whether any
    /// observer matched.
    fn dispatch_event_inner(&mut self, msg: Option<&Message>, ty: &str, sub: Option<&str>) -> bool {
        let matched: Vec<(ElementRef, Option<Variant>)> = self
            .stack
            .observers
            .iter()
            .filter(|o| observer_matches(&self.stack, o, msg, ty, sub))
            .map(|o| {
                let payload = msg
                    .and_then(|m| m.data.as_ref())
                    .map(|d| d.to_variant());
                (Rc::clone(&o.pos), payload)
            })
            .collect();

        if matched.is_empty() {
            return false;
        }

        let prev = self.state;
        self.state = CoroutineState::Run;
        for (pos, payload) in matched {
            let base = self.stack.frames.len();
            // the observer container runs with the generic ops so the
            // observe element does not re-register itself
            push_element(&mut self.stack, pos, Some(fallback_ops()));
            if let Some(payload) = payload {
                let _ = self.stack.set_question(payload);
            }
            run_to_base(&mut self.stack, base);
        }
        if self.state != CoroutineState::Exited {
            self.state = prev;
        }
        if let Some(err) = self.stack.except.take() {
            warn!(except = err.kind.name(), "exception while dispatching event");
        }
        true
    }

    /// Service timers and messages until `duration` elapses or the
    /// coroutine exits. The loop sleeps on the queue's wake channel and
    /// never busy-waits.
    pub fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.state == CoroutineState::Exited {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            if let Some(hub) = &self.stack.timers {
                hub.process_due(now);
            }
            let next_timer = self
                .stack
                .timers
                .as_ref()
                .and_then(|h| h.next_deadline())
                .unwrap_or(deadline);
            let wait_until = next_timer.min(deadline);
            let wait = wait_until.saturating_duration_since(now).max(Duration::from_millis(1));

            if self.stack.queue.wait_message(wait) {
                self.drain_events();
            }
        }
    }

    /// Dispatch every queued event; requests/responses stay queued for
    /// the host.
    pub fn drain_events(&mut self) {
        loop {
            let total = self.stack.queue.count();
            let mut idx = None;
            for i in 0..total {
                if let Some(m) = self.stack.queue.retrieve(i) {
                    if m.ty == MsgType::Event {
                        idx = Some(i);
                        break;
                    }
                }
            }
            let Some(i) = idx else { break };
            let Some(msg) = self.stack.queue.take_away(i) else {
                break;
            };
            self.handle_message(msg);
        }
    }
}

fn observer_matches(
    stack: &Stack,
    obs: &super::StackObserver,
    msg: Option<&Message>,
    ty: &str,
    sub: Option<&str>,
) -> bool {
    if &*obs.event_type != ty {
        return false;
    }
    if let Some(want) = obs.sub_type.as_deref() {
        if sub != Some(want) {
            return false;
        }
    }
    // exception events match on name alone
    if ty == "except" {
        return true;
    }
    let is_timer_event = msg.is_some_and(|m| m.timer_id.is_some());
    let element_name = msg
        .and_then(|m| m.element.as_ref())
        .and_then(|e| e.as_str());
    match &obs.source {
        ObserveSource::Named(name) => {
            if is_timer_event {
                &**name == crate::timer::TIMERS_VAR_NAME
            } else {
                element_name == Some(&**name)
            }
        }
        ObserveSource::Variant(v) => {
            if is_timer_event {
                stack
                    .timers
                    .as_ref()
                    .map(|h| h.timers_var().ptr_eq(v))
                    .unwrap_or(false)
            } else if let Some(name) = element_name {
                stack
                    .doc
                    .variables
                    .get(name)
                    .map(|dv| dv.ptr_eq(v))
                    .or_else(|_| stack.inst_vars.get(name).map(|iv| iv.ptr_eq(v)))
                    .unwrap_or(false)
            } else {
                false
            }
        }
    }
}
