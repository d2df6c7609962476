//! Timers and the `$TIMERS` document variable.
//!
//! Timers are registered indirectly: `$TIMERS` is a set keyed by `id`,
//! and the hub's post-listener on that set translates grow/shrink/change
//! into create/destroy/reconfigure on the timer map. A firing timer posts
//! an `expired:<id>` event into the owning coroutine's queue. At most one
//! delivery per timer is outstanding: re-fires while the previous message
//! is undispatched are dropped.

use crate::msg::{Message, MsgQueue, MsgTarget};
use crate::variant::{Op, Variant, OP_ALL};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const TIMERS_VAR_NAME: &str = "TIMERS";
const KEY_ID: &str = "id";
const KEY_INTERVAL: &str = "interval";
const KEY_ACTIVE: &str = "active";
const ACTIVE_YES: &str = "yes";
pub const EVENT_EXPIRED: &str = "expired";

struct TimerRec {
    interval: Duration,
    oneshot: bool,
    next_fire: Option<Instant>,
    /// Set while an expiry message is outstanding; cleared by
    /// `processed`.
    fired: bool,
}

struct HubInner {
    timers: FxHashMap<Box<str>, TimerRec>,
    queue: Arc<MsgQueue>,
}

/// The per-coroutine timer hub. Owned by the stack; never shared across
/// threads.
pub struct TimerHub {
    inner: Rc<RefCell<HubInner>>,
    timers_var: Variant,
}

impl TimerHub {
    /// Create the hub and bind the `$TIMERS` set into `doc_vars`.
    pub fn init(doc_vars: &crate::varmgr::VarMgr, queue: Arc<MsgQueue>) -> crate::error::Result<TimerHub> {
        let timers_var = Variant::set_by_keys(Some(vec![KEY_ID]), Vec::new());
        doc_vars.add(TIMERS_VAR_NAME, timers_var.clone())?;

        let inner = Rc::new(RefCell::new(HubInner {
            timers: FxHashMap::default(),
            queue,
        }));

        let weak: Weak<RefCell<HubInner>> = Rc::downgrade(&inner);
        timers_var.register_post_listener(
            OP_ALL,
            Rc::new(move |_src, op, args: &[Variant]| {
                let Some(inner) = weak.upgrade() else {
                    return true;
                };
                match op {
                    Op::Grow => on_grow(&inner, &args[0]),
                    Op::Shrink => on_shrink(&inner, &args[0]),
                    // args are [old, new] for a displaced member
                    Op::Change => {
                        if let Some(new_member) = args.last() {
                            on_change(&inner, new_member);
                        }
                    }
                }
                true
            }),
        )?;

        Ok(TimerHub { inner, timers_var })
    }

    /// The `$TIMERS` set bound into the document.
    pub fn timers_var(&self) -> Variant {
        self.timers_var.clone()
    }

    pub fn set_interval(&self, id: &str, ms: u64) {
        if let Some(rec) = self.inner.borrow_mut().timers.get_mut(id) {
            rec.interval = Duration::from_millis(ms);
        }
    }

    pub fn start(&self, id: &str) {
        start_rec(&self.inner, id, false);
    }

    pub fn start_oneshot(&self, id: &str) {
        start_rec(&self.inner, id, true);
    }

    pub fn stop(&self, id: &str) {
        if let Some(rec) = self.inner.borrow_mut().timers.get_mut(id) {
            rec.next_fire = None;
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.inner
            .borrow()
            .timers
            .get(id)
            .is_some_and(|r| r.next_fire.is_some())
    }

    pub fn destroy(&self, id: &str) {
        self.inner.borrow_mut().timers.remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().timers.is_empty()
    }

    /// The earliest pending deadline, for the runloop's sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .timers
            .values()
            .filter_map(|r| r.next_fire)
            .min()
    }

    /// Fire every due timer: post its expiry event and reschedule.
    /// Returns the number of events posted.
    pub fn process_due(&self, now: Instant) -> usize {
        let mut inner = self.inner.borrow_mut();
        let mut posted = 0;
        let mut messages = Vec::new();
        for (id, rec) in inner.timers.iter_mut() {
            let Some(due) = rec.next_fire else { continue };
            if due > now {
                continue;
            }
            if rec.oneshot {
                rec.next_fire = None;
            } else {
                rec.next_fire = Some(now + rec.interval);
            }
            if rec.fired {
                // previous delivery still outstanding, drop this fire
                continue;
            }
            rec.fired = true;
            let event = format!("{}:{}", EVENT_EXPIRED, id);
            messages.push(
                Message::event(MsgTarget::Dom, 0, &event).with_timer_id(id),
            );
            posted += 1;
        }
        let queue = Arc::clone(&inner.queue);
        drop(inner);
        for msg in messages {
            queue.append(msg);
        }
        posted
    }

    /// Mark a timer's outstanding delivery as handled, re-arming it.
    pub fn processed(&self, id: &str) {
        if let Some(rec) = self.inner.borrow_mut().timers.get_mut(id) {
            rec.fired = false;
        }
    }

    /// Stop everything; invoked from the coroutine's cancel list.
    pub fn shutdown(&self) {
        for rec in self.inner.borrow_mut().timers.values_mut() {
            rec.next_fire = None;
        }
    }

    /// A cancel routine suitable for the stack's cancel list: stops
    /// every timer when teardown runs it.
    pub fn make_canceller(&self) -> Box<dyn FnOnce()> {
        let inner = Rc::clone(&self.inner);
        Box::new(move || {
            for rec in inner.borrow_mut().timers.values_mut() {
                rec.next_fire = None;
            }
        })
    }
}

fn start_rec(inner: &Rc<RefCell<HubInner>>, id: &str, oneshot: bool) {
    if let Some(rec) = inner.borrow_mut().timers.get_mut(id) {
        rec.oneshot = oneshot;
        rec.next_fire = Some(Instant::now() + rec.interval);
    }
}

fn member_id(member: &Variant) -> Option<String> {
    member
        .get_by_key(KEY_ID)
        .ok()
        .and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn member_interval(member: &Variant) -> Option<u64> {
    member
        .get_by_key(KEY_INTERVAL)
        .ok()
        .and_then(|v| v.cast_to_ulongint(true).ok())
}

fn member_active(member: &Variant) -> Option<bool> {
    member
        .get_by_key(KEY_ACTIVE)
        .ok()
        .map(|v| v.as_str() == Some(ACTIVE_YES))
}

fn on_grow(inner: &Rc<RefCell<HubInner>>, member: &Variant) {
    let Some(id) = member_id(member) else { return };
    let interval = member_interval(member).unwrap_or(0);
    debug!(id = %id, interval, "timer created");
    inner.borrow_mut().timers.insert(
        Box::from(&*id),
        TimerRec {
            interval: Duration::from_millis(interval),
            oneshot: false,
            next_fire: None,
            fired: false,
        },
    );
    if member_active(member) == Some(true) {
        start_rec(inner, &id, false);
    }
}

fn on_shrink(inner: &Rc<RefCell<HubInner>>, member: &Variant) {
    if let Some(id) = member_id(member) {
        debug!(id = %id, "timer destroyed");
        inner.borrow_mut().timers.remove(&*id);
    }
}

fn on_change(inner: &Rc<RefCell<HubInner>>, member: &Variant) {
    let Some(id) = member_id(member) else { return };
    if !inner.borrow().timers.contains_key(&*id) {
        on_grow(inner, member);
        return;
    }
    if let Some(interval) = member_interval(member) {
        if let Some(rec) = inner.borrow_mut().timers.get_mut(&*id) {
            let new = Duration::from_millis(interval);
            if rec.interval != new {
                rec.interval = new;
            }
        }
    }
    let currently_active = inner
        .borrow()
        .timers
        .get(&*id)
        .is_some_and(|r| r.next_fire.is_some());
    let next_active = member_active(member).unwrap_or(currently_active);
    if next_active {
        start_rec(inner, &id, false);
    } else if let Some(rec) = inner.borrow_mut().timers.get_mut(&*id) {
        rec.next_fire = None;
    }
}
