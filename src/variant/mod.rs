//! The polymorphic variant value model.
//!
//! A `Variant` is either an immediate (undefined, null, boolean, the
//! numeric types) or a handle to a refcounted payload (strings, byte
//! sequences, dynamic and native values, containers). Containers use
//! interior mutability so `displace` can swap contents while every
//! outstanding handle keeps observing the same value.

pub mod container;
pub mod heap;
pub mod listener;
pub mod move_heap;

pub use heap::{stats, HeapStats, VALUE_BASE_SIZE};
pub use listener::{Listener, ListenerFn, ListenerId, Op, OpMask, OP_ALL, OP_CHANGE, OP_GROW, OP_SHRINK};
pub use move_heap::{move_heap_stats, move_in, move_out, MoveVariant};

use crate::error::{Error, ErrorKind, Result};
use indexmap::IndexMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Type tags, also the index into heap statistics arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VariantType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    LongInt = 4,
    ULongInt = 5,
    LongDouble = 6,
    String = 7,
    ByteSeq = 8,
    Dynamic = 9,
    Native = 10,
    Array = 11,
    Object = 12,
    Set = 13,
    Tuple = 14,
}

/// Owned string payload. Dropping it settles the heap accounting.
pub struct StringData {
    pub s: Box<str>,
    counted_len: usize,
}

impl Drop for StringData {
    fn drop(&mut self) {
        heap::on_free(VariantType::String, self.counted_len);
    }
}

/// Owned byte-sequence payload.
pub struct BytesData {
    pub b: Box<[u8]>,
}

impl Drop for BytesData {
    fn drop(&mut self) {
        heap::on_free(VariantType::ByteSeq, self.b.len());
    }
}

/// A getter/setter pair exposed as a value.
pub type DynamicFn = fn(&[Variant]) -> Result<Variant>;

pub struct DynamicVal {
    pub getter: DynamicFn,
    pub setter: Option<DynamicFn>,
}

impl Drop for DynamicVal {
    fn drop(&mut self) {
        heap::on_free(VariantType::Dynamic, 0);
    }
}

/// Operation table for native (opaque entity) values.
pub struct NativeOps {
    /// Called by the erase element; returns the number of removals.
    pub eraser: Option<fn(&Rc<dyn Any>, bool) -> Result<Variant>>,
}

pub struct NativeVal {
    pub entity: Rc<dyn Any>,
    pub ops: &'static NativeOps,
}

impl Drop for NativeVal {
    fn drop(&mut self) {
        heap::on_free(VariantType::Native, 0);
    }
}

pub struct ArrayData {
    pub elems: Vec<Variant>,
    pub(crate) listeners: Vec<Listener>,
}

impl Drop for ArrayData {
    fn drop(&mut self) {
        heap::on_free(VariantType::Array, 0);
    }
}

pub struct ObjectData {
    pub entries: IndexMap<Box<str>, Variant>,
    pub(crate) listeners: Vec<Listener>,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        heap::on_free(VariantType::Object, 0);
    }
}

pub struct SetData {
    /// Member field names that form the unique key; `None` keys the whole
    /// member value.
    pub unique_by: Option<Vec<Box<str>>>,
    pub members: Vec<Variant>,
    pub(crate) listeners: Vec<Listener>,
}

impl Drop for SetData {
    fn drop(&mut self) {
        heap::on_free(VariantType::Set, 0);
    }
}

pub struct TupleData {
    pub elems: Vec<Variant>,
    pub(crate) listeners: Vec<Listener>,
}

impl Drop for TupleData {
    fn drop(&mut self) {
        heap::on_free(VariantType::Tuple, 0);
    }
}

/// The variant value.
#[derive(Clone)]
pub enum Variant {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    LongDouble(f64),
    String(Rc<StringData>),
    ByteSeq(Rc<BytesData>),
    Dynamic(Rc<DynamicVal>),
    Native(Rc<NativeVal>),
    Array(Rc<RefCell<ArrayData>>),
    Object(Rc<RefCell<ObjectData>>),
    Set(Rc<RefCell<SetData>>),
    Tuple(Rc<RefCell<TupleData>>),
}

// ── Constructors ──────────────────────────────────────────────────────

impl Variant {
    pub fn boolean(b: bool) -> Variant {
        Variant::Boolean(b)
    }

    pub fn number(n: f64) -> Variant {
        Variant::Number(n)
    }

    pub fn longint(n: i64) -> Variant {
        Variant::LongInt(n)
    }

    pub fn ulongint(n: u64) -> Variant {
        Variant::ULongInt(n)
    }

    pub fn longdouble(n: f64) -> Variant {
        Variant::LongDouble(n)
    }

    pub fn string(s: impl Into<String>) -> Variant {
        let s: Box<str> = s.into().into_boxed_str();
        let len = s.len();
        heap::on_alloc(VariantType::String, len);
        Variant::String(Rc::new(StringData { s, counted_len: len }))
    }

    /// String constructor for literal storage: the value is tracked but
    /// its bytes are not charged to the heap.
    pub fn string_static(s: &'static str) -> Variant {
        heap::on_alloc(VariantType::String, 0);
        Variant::String(Rc::new(StringData {
            s: Box::from(s),
            counted_len: 0,
        }))
    }

    pub fn byte_seq(b: impl Into<Vec<u8>>) -> Variant {
        let b: Box<[u8]> = b.into().into_boxed_slice();
        heap::on_alloc(VariantType::ByteSeq, b.len());
        Variant::ByteSeq(Rc::new(BytesData { b }))
    }

    pub fn dynamic(getter: DynamicFn, setter: Option<DynamicFn>) -> Variant {
        heap::on_alloc(VariantType::Dynamic, 0);
        Variant::Dynamic(Rc::new(DynamicVal { getter, setter }))
    }

    pub fn native(entity: Rc<dyn Any>, ops: &'static NativeOps) -> Variant {
        heap::on_alloc(VariantType::Native, 0);
        Variant::Native(Rc::new(NativeVal { entity, ops }))
    }

    pub fn array(elems: impl Into<Vec<Variant>>) -> Variant {
        heap::on_alloc(VariantType::Array, 0);
        Variant::Array(Rc::new(RefCell::new(ArrayData {
            elems: elems.into(),
            listeners: Vec::new(),
        })))
    }

    pub fn object<K, I>(entries: I) -> Variant
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Variant)>,
    {
        heap::on_alloc(VariantType::Object, 0);
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into().into_boxed_str(), v))
            .collect();
        Variant::Object(Rc::new(RefCell::new(ObjectData {
            entries,
            listeners: Vec::new(),
        })))
    }

    /// Set keyed by the given member field names; `None` keys whole
    /// values. Initial members violating uniqueness overwrite earlier
    /// ones.
    pub fn set_by_keys(
        unique_by: Option<Vec<&str>>,
        members: impl IntoIterator<Item = Variant>,
    ) -> Variant {
        heap::on_alloc(VariantType::Set, 0);
        let set = Variant::Set(Rc::new(RefCell::new(SetData {
            unique_by: unique_by.map(|ks| ks.into_iter().map(Box::from).collect()),
            members: Vec::new(),
            listeners: Vec::new(),
        })));
        for m in members {
            // uniqueness established here; listener list is still empty
            let _ = set.set_add(m);
        }
        set
    }

    pub fn tuple(elems: impl Into<Vec<Variant>>) -> Variant {
        heap::on_alloc(VariantType::Tuple, 0);
        Variant::Tuple(Rc::new(RefCell::new(TupleData {
            elems: elems.into(),
            listeners: Vec::new(),
        })))
    }
}

// ── Type inspection ───────────────────────────────────────────────────

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Undefined => VariantType::Undefined,
            Variant::Null => VariantType::Null,
            Variant::Boolean(_) => VariantType::Boolean,
            Variant::Number(_) => VariantType::Number,
            Variant::LongInt(_) => VariantType::LongInt,
            Variant::ULongInt(_) => VariantType::ULongInt,
            Variant::LongDouble(_) => VariantType::LongDouble,
            Variant::String(_) => VariantType::String,
            Variant::ByteSeq(_) => VariantType::ByteSeq,
            Variant::Dynamic(_) => VariantType::Dynamic,
            Variant::Native(_) => VariantType::Native,
            Variant::Array(_) => VariantType::Array,
            Variant::Object(_) => VariantType::Object,
            Variant::Set(_) => VariantType::Set,
            Variant::Tuple(_) => VariantType::Tuple,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.variant_type() {
            VariantType::Undefined => "undefined",
            VariantType::Null => "null",
            VariantType::Boolean => "boolean",
            VariantType::Number => "number",
            VariantType::LongInt => "longint",
            VariantType::ULongInt => "ulongint",
            VariantType::LongDouble => "longdouble",
            VariantType::String => "string",
            VariantType::ByteSeq => "bsequence",
            VariantType::Dynamic => "dynamic",
            VariantType::Native => "native",
            VariantType::Array => "array",
            VariantType::Object => "object",
            VariantType::Set => "set",
            VariantType::Tuple => "tuple",
        }
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Variant::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, Variant::Boolean(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Variant::String(_))
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, Variant::Object(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(_))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        matches!(self, Variant::Set(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Variant::Array(_) | Variant::Object(_) | Variant::Set(_) | Variant::Tuple(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Variant::Number(_)
                | Variant::LongInt(_)
                | Variant::ULongInt(_)
                | Variant::LongDouble(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(&s.s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::ByteSeq(b) => Some(&b.b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Identity comparison: do the two handles point at the same payload?
    pub fn ptr_eq(&self, other: &Variant) -> bool {
        match (self, other) {
            (Variant::String(a), Variant::String(b)) => Rc::ptr_eq(a, b),
            (Variant::ByteSeq(a), Variant::ByteSeq(b)) => Rc::ptr_eq(a, b),
            (Variant::Dynamic(a), Variant::Dynamic(b)) => Rc::ptr_eq(a, b),
            (Variant::Native(a), Variant::Native(b)) => Rc::ptr_eq(a, b),
            (Variant::Array(a), Variant::Array(b)) => Rc::ptr_eq(a, b),
            (Variant::Object(a), Variant::Object(b)) => Rc::ptr_eq(a, b),
            (Variant::Set(a), Variant::Set(b)) => Rc::ptr_eq(a, b),
            (Variant::Tuple(a), Variant::Tuple(b)) => Rc::ptr_eq(a, b),
            (Variant::Undefined, Variant::Undefined) => true,
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(a), Variant::Boolean(b)) => a == b,
            _ => false,
        }
    }

    /// The payload refcount. Immediates report 1.
    pub fn refcount(&self) -> usize {
        match self {
            Variant::String(r) => Rc::strong_count(r),
            Variant::ByteSeq(r) => Rc::strong_count(r),
            Variant::Dynamic(r) => Rc::strong_count(r),
            Variant::Native(r) => Rc::strong_count(r),
            Variant::Array(r) => Rc::strong_count(r),
            Variant::Object(r) => Rc::strong_count(r),
            Variant::Set(r) => Rc::strong_count(r),
            Variant::Tuple(r) => Rc::strong_count(r),
            _ => 1,
        }
    }
}

// ── Dynamic values ────────────────────────────────────────────────────

impl Variant {
    /// Invoke a dynamic value's getter.
    pub fn call_getter(&self, args: &[Variant]) -> Result<Variant> {
        match self {
            Variant::Dynamic(d) => (d.getter)(args),
            _ => Err(Error::wrong_data_type("dynamic", self.type_name())),
        }
    }

    /// Invoke a dynamic value's setter. Values without one report
    /// AccessDenied.
    pub fn call_setter(&self, args: &[Variant]) -> Result<Variant> {
        match self {
            Variant::Dynamic(d) => match d.setter {
                Some(setter) => setter(args),
                None => Err(Error::with_detail(
                    ErrorKind::AccessDenied,
                    "dynamic value has no setter",
                )),
            },
            _ => Err(Error::wrong_data_type("dynamic", self.type_name())),
        }
    }
}

// ── Numeric casts ─────────────────────────────────────────────────────

impl Variant {
    /// Collapse the value to a double. Strings parse leniently; values
    /// with no numeric interpretation become 0.
    pub fn numberify(&self) -> f64 {
        match self {
            Variant::Undefined | Variant::Null => 0.0,
            Variant::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Variant::Number(n) | Variant::LongDouble(n) => *n,
            Variant::LongInt(n) => *n as f64,
            Variant::ULongInt(n) => *n as f64,
            Variant::String(s) => s.s.trim().parse::<f64>().unwrap_or(0.0),
            Variant::ByteSeq(b) => b.b.len() as f64,
            _ => 0.0,
        }
    }

    /// Cast to a signed long integer. With `force`, non-numeric values
    /// collapse through `numberify`; without it they are rejected.
    pub fn cast_to_longint(&self, force: bool) -> Result<i64> {
        match self {
            Variant::Boolean(b) => Ok(*b as i64),
            Variant::LongInt(n) => Ok(*n),
            Variant::ULongInt(n) => Ok(*n as i64),
            Variant::Number(n) | Variant::LongDouble(n) => Ok(*n as i64),
            Variant::String(s) if force => Ok(s.s.trim().parse::<f64>().unwrap_or(0.0) as i64),
            Variant::Undefined | Variant::Null if force => Ok(0),
            _ => Err(Error::wrong_data_type("number", self.type_name())),
        }
    }

    pub fn cast_to_ulongint(&self, force: bool) -> Result<u64> {
        let v = self.cast_to_longint(force)?;
        if v < 0 {
            return Err(Error::invalid_value("negative value"));
        }
        Ok(v as u64)
    }
}

// ── Deep operations ───────────────────────────────────────────────────

impl Variant {
    /// Recursive structural clone: containers are copied, immutable
    /// payloads share their handle.
    pub fn clone_deep(&self) -> Variant {
        match self {
            Variant::Array(a) => {
                Variant::array(a.borrow().elems.iter().map(|v| v.clone_deep()).collect::<Vec<_>>())
            }
            Variant::Object(o) => Variant::object(
                o.borrow()
                    .entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone_deep()))
                    .collect::<Vec<_>>(),
            ),
            Variant::Set(s) => {
                let data = s.borrow();
                let keys: Option<Vec<&str>> = data
                    .unique_by
                    .as_ref()
                    .map(|ks| ks.iter().map(|k| &**k).collect());
                Variant::set_by_keys(
                    keys,
                    data.members.iter().map(|v| v.clone_deep()).collect::<Vec<_>>(),
                )
            }
            Variant::Tuple(t) => {
                Variant::tuple(t.borrow().elems.iter().map(|v| v.clone_deep()).collect::<Vec<_>>())
            }
            other => other.clone(),
        }
    }

    /// Render the value as text. Containers render as eJSON; strings
    /// render bare (not quoted).
    pub fn stringify(&self) -> String {
        match self {
            Variant::String(s) => s.s.to_string(),
            other => other.serialize(),
        }
    }

    /// Serialize to eJSON text. Strings are quoted here, unlike
    /// `stringify`.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_ejson(&mut out);
        out
    }

    fn write_ejson(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            Variant::Undefined => out.push_str("undefined"),
            Variant::Null => out.push_str("null"),
            Variant::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Variant::Number(n) | Variant::LongDouble(n) => {
                let _ = write!(out, "{}", n);
            }
            Variant::LongInt(n) => {
                let _ = write!(out, "{}", n);
            }
            Variant::ULongInt(n) => {
                let _ = write!(out, "{}", n);
            }
            Variant::String(s) => {
                let _ = write!(out, "{}", serde_json::Value::from(s.s.to_string()));
            }
            Variant::ByteSeq(b) => {
                out.push_str("bx");
                for byte in b.b.iter() {
                    let _ = write!(out, "{:02x}", byte);
                }
            }
            Variant::Dynamic(_) => out.push_str("<dynamic>"),
            Variant::Native(_) => out.push_str("<native>"),
            Variant::Array(a) => {
                out.push('[');
                for (i, v) in a.borrow().elems.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    v.write_ejson(out);
                }
                out.push(']');
            }
            Variant::Object(o) => {
                out.push('{');
                for (i, (k, v)) in o.borrow().entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}:", serde_json::Value::from(k.to_string()));
                    v.write_ejson(out);
                }
                out.push('}');
            }
            Variant::Set(s) => {
                out.push('[');
                for (i, v) in s.borrow().members.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    v.write_ejson(out);
                }
                out.push(']');
            }
            Variant::Tuple(t) => {
                out.push('[');
                for (i, v) in t.borrow().elems.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    v.write_ejson(out);
                }
                out.push(']');
            }
        }
    }

    /// Build a variant from a parsed JSON value.
    pub fn from_json(value: &serde_json::Value) -> Variant {
        match value {
            serde_json::Value::Null => Variant::Null,
            serde_json::Value::Bool(b) => Variant::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Variant::LongInt(i)
                } else if let Some(u) = n.as_u64() {
                    Variant::ULongInt(u)
                } else {
                    Variant::Number(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Variant::string(s.clone()),
            serde_json::Value::Array(items) => {
                Variant::array(items.iter().map(Variant::from_json).collect::<Vec<_>>())
            }
            serde_json::Value::Object(map) => Variant::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Variant::from_json(v)))
                    .collect::<Vec<_>>(),
            ),
        }
    }
}

/// Structural (deep) equality.
impl PartialEq for Variant {
    fn eq(&self, other: &Variant) -> bool {
        match (self, other) {
            (Variant::Undefined, Variant::Undefined) => true,
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(a), Variant::Boolean(b)) => a == b,
            (Variant::String(a), Variant::String(b)) => a.s == b.s,
            (Variant::ByteSeq(a), Variant::ByteSeq(b)) => a.b == b.b,
            (Variant::Dynamic(a), Variant::Dynamic(b)) => Rc::ptr_eq(a, b),
            (Variant::Native(a), Variant::Native(b)) => Rc::ptr_eq(a, b),
            (Variant::Array(a), Variant::Array(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().elems == b.borrow().elems
            }
            (Variant::Object(a), Variant::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.entries.len() == b.entries.len()
                    && a.entries
                        .iter()
                        .zip(b.entries.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            (Variant::Set(a), Variant::Set(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().members == b.borrow().members
            }
            (Variant::Tuple(a), Variant::Tuple(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().elems == b.borrow().elems
            }
            // distinct numeric representations compare by value
            (a, b) if a.is_numeric() && b.is_numeric() => a.numberify() == b.numberify(),
            _ => false,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}
