//! Container operations: get/set/insert/remove/clear/displace for array,
//! object, set, and tuple variants.
//!
//! Every mutation fires pre-listeners first (any veto aborts with the
//! container untouched), then applies, then fires post-listeners in
//! registration order.

use super::listener::{Listener, ListenerFn, ListenerId, Op, OpMask};
use super::Variant;
use crate::error::{Error, ErrorKind, Result};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

impl Variant {
    fn listeners_snapshot(&self) -> Vec<Listener> {
        match self {
            Variant::Array(a) => a.borrow().listeners.clone(),
            Variant::Object(o) => o.borrow().listeners.clone(),
            Variant::Set(s) => s.borrow().listeners.clone(),
            Variant::Tuple(t) => t.borrow().listeners.clone(),
            _ => Vec::new(),
        }
    }

    fn push_listener(&self, listener: Listener) -> Result<ListenerId> {
        let id = listener.id;
        match self {
            Variant::Array(a) => a.borrow_mut().listeners.push(listener),
            Variant::Object(o) => o.borrow_mut().listeners.push(listener),
            Variant::Set(s) => s.borrow_mut().listeners.push(listener),
            Variant::Tuple(t) => t.borrow_mut().listeners.push(listener),
            _ => return Err(Error::wrong_data_type("container", self.type_name())),
        }
        Ok(id)
    }

    /// Register a pre-listener: runs before the mutation, may veto it.
    pub fn register_pre_listener(&self, ops: OpMask, callback: ListenerFn) -> Result<ListenerId> {
        self.push_listener(Listener {
            id: next_listener_id(),
            ops,
            post: false,
            callback,
        })
    }

    /// Register a post-listener: runs after the mutation, return ignored.
    pub fn register_post_listener(&self, ops: OpMask, callback: ListenerFn) -> Result<ListenerId> {
        self.push_listener(Listener {
            id: next_listener_id(),
            ops,
            post: true,
            callback,
        })
    }

    pub fn revoke_listener(&self, id: ListenerId) -> bool {
        let remove = |ls: &mut Vec<Listener>| {
            let before = ls.len();
            ls.retain(|l| l.id != id);
            ls.len() != before
        };
        match self {
            Variant::Array(a) => remove(&mut a.borrow_mut().listeners),
            Variant::Object(o) => remove(&mut o.borrow_mut().listeners),
            Variant::Set(s) => remove(&mut s.borrow_mut().listeners),
            Variant::Tuple(t) => remove(&mut t.borrow_mut().listeners),
            _ => false,
        }
    }

    /// Run pre-listeners for `op`; false means some listener vetoed.
    fn fire_pre(&self, op: Op, args: &[Variant]) -> bool {
        for l in self.listeners_snapshot() {
            if !l.post && l.ops.contains(op) && !(l.callback)(self, op, args) {
                return false;
            }
        }
        true
    }

    fn fire_post(&self, op: Op, args: &[Variant]) {
        for l in self.listeners_snapshot() {
            if l.post && l.ops.contains(op) {
                let _ = (l.callback)(self, op, args);
            }
        }
    }

    fn vetoed() -> Error {
        Error::with_detail(ErrorKind::AccessDenied, "mutation vetoed by pre-listener")
    }
}

// ── Indexed access ────────────────────────────────────────────────────

impl Variant {
    /// Element count of a container.
    pub fn size(&self) -> Result<usize> {
        match self {
            Variant::Array(a) => Ok(a.borrow().elems.len()),
            Variant::Object(o) => Ok(o.borrow().entries.len()),
            Variant::Set(s) => Ok(s.borrow().members.len()),
            Variant::Tuple(t) => Ok(t.borrow().elems.len()),
            _ => Err(Error::wrong_data_type("container", self.type_name())),
        }
    }

    /// Get by index (array, set, tuple; objects by entry order).
    pub fn get(&self, idx: usize) -> Result<Variant> {
        let found = match self {
            Variant::Array(a) => a.borrow().elems.get(idx).cloned(),
            Variant::Set(s) => s.borrow().members.get(idx).cloned(),
            Variant::Tuple(t) => t.borrow().elems.get(idx).cloned(),
            Variant::Object(o) => o.borrow().entries.get_index(idx).map(|(_, v)| v.clone()),
            _ => return Err(Error::wrong_data_type("container", self.type_name())),
        };
        found.ok_or_else(|| Error::bad_index(idx as i64, self.size().unwrap_or(0)))
    }

    pub fn get_by_key(&self, key: &str) -> Result<Variant> {
        match self {
            Variant::Object(o) => o
                .borrow()
                .entries
                .get(key)
                .cloned()
                .ok_or_else(|| Error::no_such_key(key)),
            _ => Err(Error::wrong_data_type("object", self.type_name())),
        }
    }

    /// Replace the element at `idx` (array, tuple). Fires CHANGE.
    pub fn set(&self, idx: usize, value: Variant) -> Result<()> {
        let old = self.get(idx)?;
        if !self.fire_pre(Op::Change, &[old.clone(), value.clone()]) {
            return Err(Self::vetoed());
        }
        match self {
            Variant::Array(a) => a.borrow_mut().elems[idx] = value.clone(),
            Variant::Tuple(t) => t.borrow_mut().elems[idx] = value.clone(),
            _ => return Err(Error::wrong_data_type("array or tuple", self.type_name())),
        }
        self.fire_post(Op::Change, &[old, value]);
        Ok(())
    }
}

// ── Array ─────────────────────────────────────────────────────────────

impl Variant {
    fn as_array_elems(&self) -> Result<&std::rc::Rc<std::cell::RefCell<super::ArrayData>>> {
        match self {
            Variant::Array(a) => Ok(a),
            _ => Err(Error::wrong_data_type("array", self.type_name())),
        }
    }

    pub fn array_append(&self, value: Variant) -> Result<()> {
        let a = self.as_array_elems()?;
        if !self.fire_pre(Op::Grow, &[value.clone()]) {
            return Err(Self::vetoed());
        }
        a.borrow_mut().elems.push(value.clone());
        self.fire_post(Op::Grow, &[value]);
        Ok(())
    }

    pub fn array_prepend(&self, value: Variant) -> Result<()> {
        self.array_insert_before(0, value)
    }

    pub fn array_insert_before(&self, idx: usize, value: Variant) -> Result<()> {
        let a = self.as_array_elems()?;
        let len = a.borrow().elems.len();
        if idx > len {
            return Err(Error::bad_index(idx as i64, len));
        }
        if !self.fire_pre(Op::Grow, &[value.clone()]) {
            return Err(Self::vetoed());
        }
        a.borrow_mut().elems.insert(idx, value.clone());
        self.fire_post(Op::Grow, &[value]);
        Ok(())
    }

    pub fn array_insert_after(&self, idx: usize, value: Variant) -> Result<()> {
        self.array_insert_before(idx + 1, value)
    }

    pub fn array_remove(&self, idx: usize) -> Result<Variant> {
        let a = self.as_array_elems()?;
        let len = a.borrow().elems.len();
        if idx >= len {
            return Err(Error::bad_index(idx as i64, len));
        }
        let old = a.borrow().elems[idx].clone();
        if !self.fire_pre(Op::Shrink, &[old.clone()]) {
            return Err(Self::vetoed());
        }
        a.borrow_mut().elems.remove(idx);
        self.fire_post(Op::Shrink, &[old.clone()]);
        Ok(old)
    }

    /// Sort the array in place with a caller-supplied comparator. Stable.
    /// Listeners observe a single CHANGE.
    pub fn array_sort(&self, mut cmp: impl FnMut(&Variant, &Variant) -> std::cmp::Ordering) -> Result<()> {
        let a = self.as_array_elems()?;
        if !self.fire_pre(Op::Change, &[]) {
            return Err(Self::vetoed());
        }
        // sort on a detached buffer so comparators may inspect the array
        let mut elems = std::mem::take(&mut a.borrow_mut().elems);
        elems.sort_by(&mut cmp);
        a.borrow_mut().elems = elems;
        self.fire_post(Op::Change, &[]);
        Ok(())
    }
}

// ── Object ────────────────────────────────────────────────────────────

impl Variant {
    fn as_object_entries(&self) -> Result<&std::rc::Rc<std::cell::RefCell<super::ObjectData>>> {
        match self {
            Variant::Object(o) => Ok(o),
            _ => Err(Error::wrong_data_type("object", self.type_name())),
        }
    }

    /// Bind `key` to `value`. New keys fire GROW, replacements CHANGE.
    pub fn set_by_key(&self, key: &str, value: Variant) -> Result<()> {
        let o = self.as_object_entries()?;
        let old = o.borrow().entries.get(key).cloned();
        let k = Variant::string(key);
        match old {
            Some(old) => {
                if !self.fire_pre(Op::Change, &[k.clone(), old.clone(), value.clone()]) {
                    return Err(Self::vetoed());
                }
                o.borrow_mut().entries.insert(Box::from(key), value.clone());
                self.fire_post(Op::Change, &[k, old, value]);
            }
            None => {
                if !self.fire_pre(Op::Grow, &[k.clone(), value.clone()]) {
                    return Err(Self::vetoed());
                }
                o.borrow_mut().entries.insert(Box::from(key), value.clone());
                self.fire_post(Op::Grow, &[k, value]);
            }
        }
        Ok(())
    }

    /// Remove `key`. Missing keys error unless `silently`.
    pub fn remove_by_key(&self, key: &str, silently: bool) -> Result<bool> {
        let o = self.as_object_entries()?;
        let old = o.borrow().entries.get(key).cloned();
        let old = match old {
            Some(v) => v,
            None if silently => return Ok(false),
            None => return Err(Error::no_such_key(key)),
        };
        let k = Variant::string(key);
        if !self.fire_pre(Op::Shrink, &[k.clone(), old.clone()]) {
            return Err(Self::vetoed());
        }
        o.borrow_mut().entries.shift_remove(key);
        self.fire_post(Op::Shrink, &[k, old]);
        Ok(true)
    }

    pub fn object_keys(&self) -> Result<Vec<String>> {
        let o = self.as_object_entries()?;
        Ok(o.borrow().entries.keys().map(|k| k.to_string()).collect())
    }
}

// ── Set ───────────────────────────────────────────────────────────────

fn set_member_key(unique_by: Option<&[Box<str>]>, v: &Variant) -> String {
    match unique_by {
        None => v.serialize(),
        Some(keys) => {
            let mut out = String::new();
            for k in keys {
                match v.get_by_key(k) {
                    Ok(field) => out.push_str(&field.stringify()),
                    Err(_) => out.push_str("undefined"),
                }
                out.push('\u{1f}');
            }
            out
        }
    }
}

impl Variant {
    fn as_set_members(&self) -> Result<&std::rc::Rc<std::cell::RefCell<super::SetData>>> {
        match self {
            Variant::Set(s) => Ok(s),
            _ => Err(Error::wrong_data_type("set", self.type_name())),
        }
    }

    fn set_find_by_member_key(&self, value: &Variant) -> Result<Option<usize>> {
        let s = self.as_set_members()?;
        let data = s.borrow();
        let key = set_member_key(data.unique_by.as_deref(), value);
        Ok(data
            .members
            .iter()
            .position(|m| set_member_key(data.unique_by.as_deref(), m) == key))
    }

    /// Add a member; an existing member with the same unique key is
    /// displaced (single CHANGE), otherwise the set grows.
    pub fn set_add(&self, value: Variant) -> Result<()> {
        let s = self.as_set_members()?;
        match self.set_find_by_member_key(&value)? {
            Some(idx) => {
                let old = s.borrow().members[idx].clone();
                if !self.fire_pre(Op::Change, &[old.clone(), value.clone()]) {
                    return Err(Self::vetoed());
                }
                s.borrow_mut().members[idx] = value.clone();
                self.fire_post(Op::Change, &[old, value]);
            }
            None => {
                if !self.fire_pre(Op::Grow, &[value.clone()]) {
                    return Err(Self::vetoed());
                }
                s.borrow_mut().members.push(value.clone());
                self.fire_post(Op::Grow, &[value]);
            }
        }
        Ok(())
    }

    /// Add a member, rejecting unique-key duplicates with DuplicateKey.
    pub fn set_add_unique(&self, value: Variant) -> Result<()> {
        if self.set_find_by_member_key(&value)?.is_some() {
            return Err(Error::new(ErrorKind::DuplicateKey));
        }
        self.set_add(value)
    }

    pub fn set_remove(&self, idx: usize) -> Result<Variant> {
        let s = self.as_set_members()?;
        let len = s.borrow().members.len();
        if idx >= len {
            return Err(Error::bad_index(idx as i64, len));
        }
        let old = s.borrow().members[idx].clone();
        if !self.fire_pre(Op::Shrink, &[old.clone()]) {
            return Err(Self::vetoed());
        }
        s.borrow_mut().members.remove(idx);
        self.fire_post(Op::Shrink, &[old.clone()]);
        Ok(old)
    }

    /// Sort the members in place. Stable; single CHANGE.
    pub fn set_sort(&self, mut cmp: impl FnMut(&Variant, &Variant) -> std::cmp::Ordering) -> Result<()> {
        let s = self.as_set_members()?;
        if !self.fire_pre(Op::Change, &[]) {
            return Err(Self::vetoed());
        }
        let mut members = std::mem::take(&mut s.borrow_mut().members);
        members.sort_by(&mut cmp);
        s.borrow_mut().members = members;
        self.fire_post(Op::Change, &[]);
        Ok(())
    }
}

// ── Clear & displace ──────────────────────────────────────────────────

impl Variant {
    /// Remove every element. Fires SHRINK once per removed element, so
    /// shrink listeners observe each departure. Returns the count.
    pub fn clear(&self) -> Result<usize> {
        match self {
            Variant::Array(_) => {
                let mut n = 0;
                while self.size()? > 0 {
                    self.array_remove(self.size()? - 1)?;
                    n += 1;
                }
                Ok(n)
            }
            Variant::Set(_) => {
                let mut n = 0;
                while self.size()? > 0 {
                    self.set_remove(self.size()? - 1)?;
                    n += 1;
                }
                Ok(n)
            }
            Variant::Object(_) => {
                let keys = self.object_keys()?;
                let mut n = 0;
                for k in keys {
                    if self.remove_by_key(&k, true)? {
                        n += 1;
                    }
                }
                Ok(n)
            }
            _ => Err(Error::wrong_data_type("container", self.type_name())),
        }
    }

    /// Replace this container's contents with those of `src`, keeping
    /// this container's identity. Listeners observe a single CHANGE with
    /// `[src]` as the argument.
    pub fn displace(&self, src: &Variant) -> Result<()> {
        if !self.fire_pre(Op::Change, &[src.clone()]) {
            return Err(Self::vetoed());
        }
        match (self, src) {
            (Variant::Array(dst), Variant::Array(s)) => {
                let new = s.borrow().elems.clone();
                dst.borrow_mut().elems = new;
            }
            (Variant::Object(dst), Variant::Object(s)) => {
                let new = s.borrow().entries.clone();
                dst.borrow_mut().entries = new;
            }
            (Variant::Set(dst), Variant::Set(s)) => {
                let new = s.borrow().members.clone();
                dst.borrow_mut().members = new;
            }
            (Variant::Tuple(dst), Variant::Tuple(s)) => {
                let new = s.borrow().elems.clone();
                dst.borrow_mut().elems = new;
            }
            _ => {
                return Err(Error::wrong_data_type(
                    self.type_name(),
                    src.type_name(),
                ))
            }
        }
        self.fire_post(Op::Change, &[src.clone()]);
        Ok(())
    }
}
