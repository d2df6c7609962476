//! The sort element.
//!
//! Sorts `on` (array or set) in place. `against` names member keys for
//! nested objects, space separated; the comparator walks the key list.
//! A key whose sampled values are numeric compares numerified, otherwise
//! values are stringified and compared under the case policy. The sort is
//! stable; `?` is set to the sorted container.

use super::select_next_child;
use crate::error::{Error, Result};
use crate::interp::ops::ElementOps;
use crate::interp::{eval_attr, Stack};
use crate::variant::Variant;
use crate::vdom::ElementRef;
use std::cmp::Ordering;
use std::rc::Rc;

struct SortKey {
    key: Option<String>,
    by_number: bool,
}

struct SortCtxt {
    curr: Option<usize>,
}

struct SortOps;
static OPS: SortOps = SortOps;

pub fn ops() -> &'static dyn ElementOps {
    &OPS
}

fn split_keys(against: &str) -> Vec<SortKey> {
    against
        .split_whitespace()
        .map(|k| SortKey {
            key: Some(k.to_string()),
            by_number: false,
        })
        .collect()
}

fn sorts_as_number(v: &Variant) -> bool {
    v.is_numeric()
}

/// Decide number-vs-string per key by sampling the container.
fn infer_key_kinds(keys: &mut [SortKey], members: &[Variant]) {
    for key in keys.iter_mut() {
        match &key.key {
            None => {
                if let Some(first) = members.first() {
                    key.by_number = sorts_as_number(first);
                }
            }
            Some(k) => {
                for m in members {
                    if m.is_object() {
                        if let Ok(v) = m.get_by_key(k) {
                            key.by_number = sorts_as_number(&v);
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn compare_raw(l: &Variant, r: &Variant, by_number: bool, casesensitively: bool) -> Ordering {
    if by_number {
        l.numberify()
            .partial_cmp(&r.numberify())
            .unwrap_or(Ordering::Equal)
    } else {
        let ls = l.stringify();
        let rs = r.stringify();
        if casesensitively {
            ls.cmp(&rs)
        } else {
            ls.to_lowercase().cmp(&rs.to_lowercase())
        }
    }
}

fn compare_members(
    l: &Variant,
    r: &Variant,
    keys: &[SortKey],
    ascendingly: bool,
    casesensitively: bool,
) -> Ordering {
    for key in keys {
        let ord = match &key.key {
            None => compare_raw(l, r, key.by_number, casesensitively),
            Some(k) => {
                let lv = if l.is_object() {
                    l.get_by_key(k).unwrap_or(Variant::Undefined)
                } else {
                    Variant::Undefined
                };
                let rv = if r.is_object() {
                    r.get_by_key(k).unwrap_or(Variant::Undefined)
                } else {
                    Variant::Undefined
                };
                compare_raw(&lv, &rv, key.by_number, casesensitively)
            }
        };
        let ord = if ascendingly { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn members_of(on: &Variant) -> Result<Vec<Variant>> {
    let n = on.size()?;
    (0..n).map(|i| on.get(i)).collect()
}

impl ElementOps for SortOps {
    fn after_pushed(&self, stack: &mut Stack) -> Result<()> {
        if stack.except.is_some() {
            return Ok(());
        }
        let pos = Rc::clone(&stack.top_frame().expect("frame exists").pos);
        let tag = &*pos.tag;

        let mut on: Option<Variant> = None;
        let mut against: Option<String> = None;
        let mut ascendingly = true;
        let mut casesensitively = true;

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
                "against" => {
                    if against.is_some() {
                        return Err(Error::duplicated_attr(tag, "against"));
                    }
                    let val = eval_attr(stack, &attr.value)?;
                    against = val.as_str().map(|s| s.to_string());
                }
                "ascendingly" | "asc" => ascendingly = true,
                "descendingly" | "desc" => ascendingly = false,
                "casesensitively" => casesensitively = true,
                "caseinsensitively" => casesensitively = false,
                "silently" => {}
                other => {
                    return Err(Error::with_detail(
                        crate::error::ErrorKind::NotImplemented,
                        format!("attribute '{}' for element <{}>", other, tag),
                    ));
                }
            }
        }

        let on = on.ok_or_else(|| Error::argument_missed("attribute 'on' for element <sort>"))?;

        let members = members_of(&on)?;
        if members.len() > 1 {
            let mut keys = match &against {
                Some(a) => split_keys(a),
                None => Vec::new(),
            };
            if keys.is_empty() {
                keys.push(SortKey {
                    key: None,
                    by_number: false,
                });
            }
            infer_key_kinds(&mut keys, &members);

            let cmp = |l: &Variant, r: &Variant| {
                compare_members(l, r, &keys, ascendingly, casesensitively)
            };
            if on.is_array() {
                on.array_sort(cmp)?;
            } else if on.is_set() {
                on.set_sort(cmp)?;
            } else {
                return Err(Error::wrong_data_type("array or set", on.type_name()));
            }
        }

        stack.set_question(on)?;
        if let Some(frame) = stack.top_frame_mut() {
            frame.ctxt = Some(Box::new(SortCtxt { curr: None }));
        }
        Ok(())
    }

    fn select_child(&self, stack: &mut Stack) -> Result<Option<ElementRef>> {
        if stack.back_anchor.is_some() {
            return Ok(None);
        }
        let pos = match stack.top_frame() {
            Some(f) => Rc::clone(&f.pos),
            None => return Ok(None),
        };
        let Some(mut ctxt) = stack.take_ctxt::<SortCtxt>() else {
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
