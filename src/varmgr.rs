//! Scoped variable manager.
//!
//! A `VarMgr` is an object variant (name → variant) plus observer records.
//! Three post-listeners on the object translate container mutations into
//! semantic `change:attached|detached|displaced` events, delivered as
//! messages to each matching observer's instance queue before the
//! mutation returns to user code.

use crate::error::{Error, Result};
use crate::msg::{Message, MsgQueue, MsgTarget};
use crate::variant::{ListenerId, Op, Variant, OP_CHANGE, OP_GROW, OP_SHRINK};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

pub const EVENT_ATTACHED: &str = "change:attached";
pub const EVENT_DETACHED: &str = "change:detached";
pub const EVENT_DISPLACED: &str = "change:displaced";
pub const EVENT_EXCEPT_PREFIX: &str = "except:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarEventKind {
    Attached,
    Detached,
    Displaced,
    Except,
}

impl VarEventKind {
    /// Map an event name (`change:attached`, `except:ZeroDivision`, …) to
    /// its kind. Unknown names default to Attached, as the original does.
    pub fn from_event(event: &str) -> VarEventKind {
        if event == EVENT_ATTACHED {
            VarEventKind::Attached
        } else if event == EVENT_DETACHED {
            VarEventKind::Detached
        } else if event == EVENT_DISPLACED {
            VarEventKind::Displaced
        } else if event.starts_with(EVENT_EXCEPT_PREFIX) {
            VarEventKind::Except
        } else {
            VarEventKind::Attached
        }
    }

    fn event_name(self) -> &'static str {
        match self {
            VarEventKind::Attached => EVENT_ATTACHED,
            VarEventKind::Detached => EVENT_DETACHED,
            VarEventKind::Displaced => EVENT_DISPLACED,
            VarEventKind::Except => EVENT_EXCEPT_PREFIX,
        }
    }
}

struct VarObserver {
    name: Box<str>,
    kind: VarEventKind,
    queue: Arc<MsgQueue>,
}

struct VarMgrInner {
    object: Variant,
    observers: RefCell<Vec<VarObserver>>,
    listener_ids: RefCell<Vec<ListenerId>>,
}

/// The scoped variable manager. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct VarMgr {
    inner: Rc<VarMgrInner>,
}

impl Default for VarMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl VarMgr {
    pub fn new() -> VarMgr {
        let inner = Rc::new(VarMgrInner {
            object: Variant::object(Vec::<(String, Variant)>::new()),
            observers: RefCell::new(Vec::new()),
            listener_ids: RefCell::new(Vec::new()),
        });

        // the listeners hold weak back-references so observers cannot
        // keep the manager alive
        for (mask, kind) in [
            (OP_GROW, VarEventKind::Attached),
            (OP_SHRINK, VarEventKind::Detached),
            (OP_CHANGE, VarEventKind::Displaced),
        ] {
            let weak: Weak<VarMgrInner> = Rc::downgrade(&inner);
            let id = inner
                .object
                .register_post_listener(
                    mask,
                    Rc::new(move |_src, _op: Op, args: &[Variant]| {
                        if let Some(inner) = weak.upgrade() {
                            if let Some(name) = args.first().and_then(|k| {
                                k.as_str().map(|s| s.to_string())
                            }) {
                                dispatch_change(&inner, &name, kind);
                            }
                        }
                        true
                    }),
                )
                .expect("varmgr object accepts listeners");
            inner.listener_ids.borrow_mut().push(id);
        }

        VarMgr { inner }
    }

    /// The backing object; what `observe` against a named variable
    /// actually watches.
    pub fn object(&self) -> Variant {
        self.inner.object.clone()
    }

    /// Bind `name`. Binding undefined removes. Replacing a container
    /// binding of the same type displaces in place so dependents keep
    /// their handle.
    pub fn add(&self, name: &str, value: Variant) -> Result<()> {
        if value.is_undefined() {
            self.remove(name, true)?;
            return Ok(());
        }
        match self.inner.object.get_by_key(name) {
            Ok(existing)
                if existing.is_container()
                    && existing.variant_type() == value.variant_type() =>
            {
                existing.displace(&value)?;
                // the object listener fires on the member, not the map;
                // report the displacement against the bound name
                dispatch_change(&self.inner, name, VarEventKind::Displaced);
                Ok(())
            }
            _ => self.inner.object.set_by_key(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Result<Variant> {
        self.inner
            .object
            .get_by_key(name)
            .map_err(|_| Error::not_found(name))
    }

    pub fn remove(&self, name: &str, silently: bool) -> Result<bool> {
        self.inner.object.remove_by_key(name, silently)
    }

    /// Record an observer: events about `name` of the given kind go to
    /// `queue`. Duplicate registrations collapse.
    pub fn observe(&self, name: &str, event: &str, queue: Arc<MsgQueue>) {
        let kind = VarEventKind::from_event(event);
        let mut observers = self.inner.observers.borrow_mut();
        let exists = observers.iter().any(|o| {
            &*o.name == name && o.kind == kind && Arc::ptr_eq(&o.queue, &queue)
        });
        if !exists {
            observers.push(VarObserver {
                name: Box::from(name),
                kind,
                queue,
            });
        }
    }

    /// Remove a matching observer record. Returns whether one existed.
    pub fn forget(&self, name: &str, event: &str, queue: &Arc<MsgQueue>) -> bool {
        let kind = VarEventKind::from_event(event);
        let mut observers = self.inner.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|o| {
            !(&*o.name == name && o.kind == kind && Arc::ptr_eq(&o.queue, queue))
        });
        observers.len() != before
    }

    /// Deliver an `except:<name>` event to observers of `name`.
    pub fn dispatch_except(&self, name: &str, except: &str) {
        let event = format!("{}{}", EVENT_EXCEPT_PREFIX, except);
        for o in self.inner.observers.borrow().iter() {
            if &*o.name == name && o.kind == VarEventKind::Except {
                let msg = Message::event(MsgTarget::Dom, 0, &event)
                    .with_element(crate::msg::ElementType::Id, name);
                o.queue.append(msg);
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }
}

impl Drop for VarMgrInner {
    fn drop(&mut self) {
        for id in self.listener_ids.borrow().iter() {
            self.object.revoke_listener(*id);
        }
    }
}

fn dispatch_change(inner: &VarMgrInner, name: &str, kind: VarEventKind) {
    for o in inner.observers.borrow().iter() {
        if &*o.name == name && o.kind == kind {
            let msg = Message::event(MsgTarget::Dom, 0, kind.event_name())
                .with_element(crate::msg::ElementType::Id, name);
            o.queue.append(msg);
        }
    }
}
