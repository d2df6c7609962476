//! The move heap: the hand-off arena for cross-thread variant transfer.
//!
//! Instance heaps are thread-local and their values are not Send. A value
//! crossing threads transits through `MoveVariant`, an owned Send tree
//! accounted in a single process-wide heap behind one mutex. Values whose
//! refcount is 1 move in place (their payload is consumed); shared
//! descendants are deep-cloned and the source left intact, so source-side
//! releases after a move are no-ops.

use super::heap::HeapStats;
use super::{Variant, VariantType};
use crate::error::{Error, Result};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// A variant in the move heap: fully owned, Send, no listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveVariant {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    LongDouble(f64),
    String(Box<str>),
    ByteSeq(Box<[u8]>),
    Array(Vec<MoveVariant>),
    Object(Vec<(Box<str>, MoveVariant)>),
    Set {
        unique_by: Option<Vec<Box<str>>>,
        members: Vec<MoveVariant>,
    },
    Tuple(Vec<MoveVariant>),
}

impl MoveVariant {
    pub fn string(s: impl Into<String>) -> MoveVariant {
        MoveVariant::String(s.into().into_boxed_str())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MoveVariant::String(s) => Some(s),
            _ => None,
        }
    }

    fn variant_type(&self) -> VariantType {
        match self {
            MoveVariant::Undefined => VariantType::Undefined,
            MoveVariant::Null => VariantType::Null,
            MoveVariant::Boolean(_) => VariantType::Boolean,
            MoveVariant::Number(_) => VariantType::Number,
            MoveVariant::LongInt(_) => VariantType::LongInt,
            MoveVariant::ULongInt(_) => VariantType::ULongInt,
            MoveVariant::LongDouble(_) => VariantType::LongDouble,
            MoveVariant::String(_) => VariantType::String,
            MoveVariant::ByteSeq(_) => VariantType::ByteSeq,
            MoveVariant::Array(_) => VariantType::Array,
            MoveVariant::Object(_) => VariantType::Object,
            MoveVariant::Set { .. } => VariantType::Set,
            MoveVariant::Tuple(_) => VariantType::Tuple,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            MoveVariant::String(s) => s.len(),
            MoveVariant::ByteSeq(b) => b.len(),
            _ => 0,
        }
    }

    /// Deep-copy an instance-heap variant into an owned Send tree
    /// without touching move-heap accounting; the counterpart of
    /// `to_variant` for building message payloads. Dynamic and native
    /// values are rejected.
    pub fn from_variant(v: &Variant) -> Result<MoveVariant> {
        match v {
            Variant::Undefined => Ok(MoveVariant::Undefined),
            Variant::Null => Ok(MoveVariant::Null),
            Variant::Boolean(b) => Ok(MoveVariant::Boolean(*b)),
            Variant::Number(n) => Ok(MoveVariant::Number(*n)),
            Variant::LongInt(n) => Ok(MoveVariant::LongInt(*n)),
            Variant::ULongInt(n) => Ok(MoveVariant::ULongInt(*n)),
            Variant::LongDouble(n) => Ok(MoveVariant::LongDouble(*n)),
            Variant::String(s) => Ok(MoveVariant::String(Box::from(&*s.s))),
            Variant::ByteSeq(b) => Ok(MoveVariant::ByteSeq(Box::from(&*b.b))),
            Variant::Array(a) => Ok(MoveVariant::Array(
                a.borrow()
                    .elems
                    .iter()
                    .map(MoveVariant::from_variant)
                    .collect::<Result<_>>()?,
            )),
            Variant::Object(o) => Ok(MoveVariant::Object(
                o.borrow()
                    .entries
                    .iter()
                    .map(|(k, val)| Ok((k.clone(), MoveVariant::from_variant(val)?)))
                    .collect::<Result<_>>()?,
            )),
            Variant::Set(s) => {
                let data = s.borrow();
                Ok(MoveVariant::Set {
                    unique_by: data.unique_by.clone(),
                    members: data
                        .members
                        .iter()
                        .map(MoveVariant::from_variant)
                        .collect::<Result<_>>()?,
                })
            }
            Variant::Tuple(t) => Ok(MoveVariant::Tuple(
                t.borrow()
                    .elems
                    .iter()
                    .map(MoveVariant::from_variant)
                    .collect::<Result<_>>()?,
            )),
            Variant::Dynamic(_) | Variant::Native(_) => {
                Err(Error::wrong_data_type("movable value", v.type_name()))
            }
        }
    }

    /// Rebuild an instance-heap variant from this value without touching
    /// move-heap accounting. Message payloads land through this;
    /// `move_out` is the accounted mirror of `move_in`.
    pub fn to_variant(&self) -> Variant {
        match self {
            MoveVariant::Undefined => Variant::Undefined,
            MoveVariant::Null => Variant::Null,
            MoveVariant::Boolean(b) => Variant::Boolean(*b),
            MoveVariant::Number(n) => Variant::Number(*n),
            MoveVariant::LongInt(n) => Variant::LongInt(*n),
            MoveVariant::ULongInt(n) => Variant::ULongInt(*n),
            MoveVariant::LongDouble(n) => Variant::LongDouble(*n),
            MoveVariant::String(s) => Variant::string(s.to_string()),
            MoveVariant::ByteSeq(b) => Variant::byte_seq(b.to_vec()),
            MoveVariant::Array(items) => {
                Variant::array(items.iter().map(|i| i.to_variant()).collect::<Vec<_>>())
            }
            MoveVariant::Object(entries) => Variant::object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_variant()))
                    .collect::<Vec<_>>(),
            ),
            MoveVariant::Set { unique_by, members } => {
                let keys: Option<Vec<&str>> = unique_by
                    .as_ref()
                    .map(|ks| ks.iter().map(|k| &**k).collect());
                Variant::set_by_keys(
                    keys,
                    members.iter().map(|m| m.to_variant()).collect::<Vec<_>>(),
                )
            }
            MoveVariant::Tuple(items) => {
                Variant::tuple(items.iter().map(|i| i.to_variant()).collect::<Vec<_>>())
            }
        }
    }

    fn is_tracked(&self) -> bool {
        matches!(
            self,
            MoveVariant::String(_)
                | MoveVariant::ByteSeq(_)
                | MoveVariant::Array(_)
                | MoveVariant::Object(_)
                | MoveVariant::Set { .. }
                | MoveVariant::Tuple(_)
        )
    }
}

fn move_heap() -> &'static Mutex<HeapStats> {
    static HEAP: OnceLock<Mutex<HeapStats>> = OnceLock::new();
    HEAP.get_or_init(|| Mutex::new(HeapStats::new()))
}

/// Snapshot of the move heap statistics.
pub fn move_heap_stats() -> HeapStats {
    move_heap().lock().unwrap().clone()
}

fn charge(stats: &mut MutexGuard<'_, HeapStats>, mv: &MoveVariant) {
    if mv.is_tracked() {
        stats.track_alloc(mv.variant_type(), mv.data_len());
    }
}

fn discharge_tree(stats: &mut MutexGuard<'_, HeapStats>, mv: &MoveVariant) {
    if mv.is_tracked() {
        stats.track_free(mv.variant_type(), mv.data_len());
    }
    match mv {
        MoveVariant::Array(items) | MoveVariant::Tuple(items) => {
            for v in items {
                discharge_tree(stats, v);
            }
        }
        MoveVariant::Object(entries) => {
            for (_, v) in entries {
                discharge_tree(stats, v);
            }
        }
        MoveVariant::Set { members, .. } => {
            for v in members {
                discharge_tree(stats, v);
            }
        }
        _ => {}
    }
}

fn convert_in(stats: &mut MutexGuard<'_, HeapStats>, v: Variant) -> Result<MoveVariant> {
    let mv = match v {
        Variant::Undefined => MoveVariant::Undefined,
        Variant::Null => MoveVariant::Null,
        Variant::Boolean(b) => MoveVariant::Boolean(b),
        Variant::Number(n) => MoveVariant::Number(n),
        Variant::LongInt(n) => MoveVariant::LongInt(n),
        Variant::ULongInt(n) => MoveVariant::ULongInt(n),
        Variant::LongDouble(n) => MoveVariant::LongDouble(n),
        Variant::String(rc) => match Rc::try_unwrap(rc) {
            Ok(mut data) => {
                // move in place: the consumed payload settles the
                // instance-heap accounting through its Drop
                let s = std::mem::take(&mut data.s);
                drop(data);
                MoveVariant::String(s)
            }
            Err(rc) => MoveVariant::String(Box::from(&*rc.s)),
        },
        Variant::ByteSeq(rc) => match Rc::try_unwrap(rc) {
            Ok(mut data) => {
                let b = std::mem::take(&mut data.b);
                drop(data);
                MoveVariant::ByteSeq(b)
            }
            Err(rc) => MoveVariant::ByteSeq(Box::from(&*rc.b)),
        },
        Variant::Array(rc) => match Rc::try_unwrap(rc) {
            Ok(cell) => {
                let mut data = cell.into_inner();
                let elems = std::mem::take(&mut data.elems);
                drop(data);
                MoveVariant::Array(
                    elems
                        .into_iter()
                        .map(|e| convert_in(stats, e))
                        .collect::<Result<_>>()?,
                )
            }
            Err(rc) => clone_in(stats, &Variant::Array(rc))?,
        },
        Variant::Object(rc) => match Rc::try_unwrap(rc) {
            Ok(cell) => {
                let mut data = cell.into_inner();
                let entries = std::mem::take(&mut data.entries);
                drop(data);
                MoveVariant::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| Ok((k, convert_in(stats, v)?)))
                        .collect::<Result<_>>()?,
                )
            }
            Err(rc) => clone_in(stats, &Variant::Object(rc))?,
        },
        Variant::Set(rc) => match Rc::try_unwrap(rc) {
            Ok(cell) => {
                let mut data = cell.into_inner();
                let unique_by = data.unique_by.take();
                let members = std::mem::take(&mut data.members);
                drop(data);
                MoveVariant::Set {
                    unique_by,
                    members: members
                        .into_iter()
                        .map(|m| convert_in(stats, m))
                        .collect::<Result<_>>()?,
                }
            }
            Err(rc) => clone_in(stats, &Variant::Set(rc))?,
        },
        Variant::Tuple(rc) => match Rc::try_unwrap(rc) {
            Ok(cell) => {
                let mut data = cell.into_inner();
                let elems = std::mem::take(&mut data.elems);
                drop(data);
                MoveVariant::Tuple(
                    elems
                        .into_iter()
                        .map(|e| convert_in(stats, e))
                        .collect::<Result<_>>()?,
                )
            }
            Err(rc) => clone_in(stats, &Variant::Tuple(rc))?,
        },
        Variant::Dynamic(_) | Variant::Native(_) => {
            return Err(Error::wrong_data_type("movable value", v.type_name()));
        }
    };
    charge(stats, &mv);
    Ok(mv)
}

/// Deep-clone a shared value into the move heap, leaving the source
/// untouched.
fn clone_in(stats: &mut MutexGuard<'_, HeapStats>, v: &Variant) -> Result<MoveVariant> {
    let mv = match v {
        Variant::Undefined => MoveVariant::Undefined,
        Variant::Null => MoveVariant::Null,
        Variant::Boolean(b) => MoveVariant::Boolean(*b),
        Variant::Number(n) => MoveVariant::Number(*n),
        Variant::LongInt(n) => MoveVariant::LongInt(*n),
        Variant::ULongInt(n) => MoveVariant::ULongInt(*n),
        Variant::LongDouble(n) => MoveVariant::LongDouble(*n),
        Variant::String(s) => MoveVariant::String(Box::from(&*s.s)),
        Variant::ByteSeq(b) => MoveVariant::ByteSeq(Box::from(&*b.b)),
        Variant::Array(a) => MoveVariant::Array(
            a.borrow()
                .elems
                .iter()
                .map(|e| {
                    let mv = clone_in(stats, e)?;
                    charge(stats, &mv);
                    Ok(mv)
                })
                .collect::<Result<_>>()?,
        ),
        Variant::Object(o) => MoveVariant::Object(
            o.borrow()
                .entries
                .iter()
                .map(|(k, val)| {
                    let mv = clone_in(stats, val)?;
                    charge(stats, &mv);
                    Ok((k.clone(), mv))
                })
                .collect::<Result<_>>()?,
        ),
        Variant::Set(s) => {
            let data = s.borrow();
            MoveVariant::Set {
                unique_by: data.unique_by.clone(),
                members: data
                    .members
                    .iter()
                    .map(|m| {
                        let mv = clone_in(stats, m)?;
                        charge(stats, &mv);
                        Ok(mv)
                    })
                    .collect::<Result<_>>()?,
            }
        }
        Variant::Tuple(t) => MoveVariant::Tuple(
            t.borrow()
                .elems
                .iter()
                .map(|e| {
                    let mv = clone_in(stats, e)?;
                    charge(stats, &mv);
                    Ok(mv)
                })
                .collect::<Result<_>>()?,
        ),
        Variant::Dynamic(_) | Variant::Native(_) => {
            return Err(Error::wrong_data_type("movable value", v.type_name()));
        }
    };
    Ok(mv)
}

fn convert_out(stats: &mut MutexGuard<'_, HeapStats>, mv: MoveVariant) -> Variant {
    if mv.is_tracked() {
        stats.track_free(mv.variant_type(), mv.data_len());
    }
    match mv {
        MoveVariant::Undefined => Variant::Undefined,
        MoveVariant::Null => Variant::Null,
        MoveVariant::Boolean(b) => Variant::Boolean(b),
        MoveVariant::Number(n) => Variant::Number(n),
        MoveVariant::LongInt(n) => Variant::LongInt(n),
        MoveVariant::ULongInt(n) => Variant::ULongInt(n),
        MoveVariant::LongDouble(n) => Variant::LongDouble(n),
        MoveVariant::String(s) => Variant::string(String::from(s)),
        MoveVariant::ByteSeq(b) => Variant::byte_seq(Vec::from(b)),
        MoveVariant::Array(items) => Variant::array(
            items
                .into_iter()
                .map(|i| convert_out(stats, i))
                .collect::<Vec<_>>(),
        ),
        MoveVariant::Object(entries) => Variant::object(
            entries
                .into_iter()
                .map(|(k, v)| (String::from(k), convert_out(stats, v)))
                .collect::<Vec<_>>(),
        ),
        MoveVariant::Set { unique_by, members } => {
            let keys: Option<Vec<String>> =
                unique_by.map(|ks| ks.into_iter().map(String::from).collect());
            let set = Variant::set_by_keys(
                keys.as_ref()
                    .map(|ks| ks.iter().map(|k| k.as_str()).collect()),
                Vec::new(),
            );
            for m in members {
                let _ = set.set_add(convert_out(stats, m));
            }
            set
        }
        MoveVariant::Tuple(items) => Variant::tuple(
            items
                .into_iter()
                .map(|i| convert_out(stats, i))
                .collect::<Vec<_>>(),
        ),
    }
}

/// Transfer a variant from the current instance heap into the move heap.
///
/// Holds the move-heap mutex for the duration of this single top-level
/// transfer. Dynamic and native values cannot cross threads and are
/// rejected with WrongDataType.
pub fn move_in(v: Variant) -> Result<MoveVariant> {
    let mut stats = move_heap().lock().unwrap();
    convert_in(&mut stats, v)
}

/// Transfer a move-heap value into the current instance heap.
pub fn move_out(mv: MoveVariant) -> Variant {
    let mut stats = move_heap().lock().unwrap();
    convert_out(&mut stats, mv)
}

/// Release an in-transit value without landing it in any instance heap
/// (an abandoned transfer).
pub fn discard(mv: MoveVariant) {
    let mut stats = move_heap().lock().unwrap();
    discharge_tree(&mut stats, &mv);
}
