//! Rule-driven iteration executors.
//!
//! An `iterate` element with `by="NAME: …"` delegates its loop to a
//! registered executor. Executors are process-wide; registering a name
//! twice fails. The built-in RANGE executor iterates container indices:
//! `RANGE: FROM a [TO b] [ADVANCE s]`.

use crate::error::{Error, ErrorKind, Result};
use crate::variant::Variant;
use rustc_hash::FxHashMap;
use std::sync::{Mutex, OnceLock};

/// One live iteration over a value.
pub trait IterExecutor {
    /// Position on the first item. False when the iteration is empty.
    fn begin(&mut self, rule: &str) -> Result<bool>;
    /// Advance. False (or a NotExists error) ends the loop.
    fn next(&mut self, rule: Option<&str>) -> Result<bool>;
    /// The current item.
    fn value(&self) -> Result<Variant>;
}

/// Builds an executor instance for one `iterate` run. `on` is the value
/// iterated, `with` the evaluated `with` attribute (undefined if absent).
pub type ExecutorFactory = fn(on: Variant, with: Variant) -> Result<Box<dyn IterExecutor>>;

fn registry() -> &'static Mutex<FxHashMap<Box<str>, ExecutorFactory>> {
    static REGISTRY: OnceLock<Mutex<FxHashMap<Box<str>, ExecutorFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = FxHashMap::default();
        map.insert(Box::from("RANGE"), range_factory as ExecutorFactory);
        Mutex::new(map)
    })
}

/// Register an executor under `name`. An existing name is rejected with
/// EntityExists.
pub fn register_executor(name: &str, factory: ExecutorFactory) -> Result<()> {
    let mut reg = registry().lock().unwrap();
    if reg.contains_key(name) {
        return Err(Error::with_detail(
            ErrorKind::EntityExists,
            format!("executor '{}' already registered", name),
        ));
    }
    reg.insert(Box::from(name), factory);
    Ok(())
}

/// Resolve the executor named by a rule string (`"RANGE: FROM 0"`).
pub fn executor_for_rule(rule: &str) -> Result<ExecutorFactory> {
    let name = rule.split(':').next().unwrap_or("").trim();
    let reg = registry().lock().unwrap();
    reg.get(name).copied().ok_or_else(|| {
        Error::with_detail(ErrorKind::BadExecutor, format!("no executor for rule '{}'", rule))
    })
}

// ── RANGE ─────────────────────────────────────────────────────────────

struct RangeExecutor {
    on: Variant,
    idx: i64,
    to: i64,
    advance: i64,
}

fn range_factory(on: Variant, _with: Variant) -> Result<Box<dyn IterExecutor>> {
    if !on.is_container() {
        return Err(Error::wrong_data_type("container", on.type_name()));
    }
    Ok(Box::new(RangeExecutor {
        on,
        idx: 0,
        to: 0,
        advance: 1,
    }))
}

fn parse_range_rule(rule: &str, len: i64) -> Result<(i64, i64, i64)> {
    // grammar: RANGE: FROM a [TO b] [ADVANCE s]
    let body = rule
        .split_once(':')
        .map(|(_, b)| b)
        .unwrap_or(rule)
        .trim();
    let tokens: Vec<&str> = body.split_whitespace().collect();

    let mut from = 0i64;
    let mut to = len - 1;
    let mut advance = 1i64;

    let mut i = 0;
    while i < tokens.len() {
        let keyword = tokens[i].to_ascii_uppercase();
        let operand = tokens.get(i + 1).ok_or_else(|| {
            Error::with_detail(ErrorKind::BadExecutor, format!("'{}' needs an operand", keyword))
        })?;
        let n: i64 = operand.parse().map_err(|_| {
            Error::with_detail(
                ErrorKind::BadExecutor,
                format!("bad operand '{}' for '{}'", operand, keyword),
            )
        })?;
        match keyword.as_str() {
            "FROM" => from = n,
            "TO" => to = n,
            "ADVANCE" => advance = n,
            _ => {
                return Err(Error::with_detail(
                    ErrorKind::BadExecutor,
                    format!("unknown keyword '{}'", keyword),
                ))
            }
        }
        i += 2;
    }

    if advance == 0 {
        return Err(Error::invalid_value("ADVANCE must not be zero"));
    }
    if advance < 0 && to == len - 1 && from == 0 {
        // descending with defaults walks from the end
        from = len - 1;
        to = 0;
    }
    Ok((from, to, advance))
}

impl RangeExecutor {
    fn in_range(&self) -> bool {
        if self.advance > 0 {
            self.idx <= self.to
        } else {
            self.idx >= self.to
        }
    }
}

impl IterExecutor for RangeExecutor {
    fn begin(&mut self, rule: &str) -> Result<bool> {
        let len = self.on.size()? as i64;
        let (from, to, advance) = parse_range_rule(rule, len)?;
        self.idx = from;
        self.to = to.min(len - 1);
        self.advance = advance;
        Ok(len > 0 && self.idx >= 0 && self.in_range())
    }

    fn next(&mut self, _rule: Option<&str>) -> Result<bool> {
        self.idx += self.advance;
        let len = self.on.size()? as i64;
        if self.idx < 0 || self.idx >= len || !self.in_range() {
            return Err(Error::new(ErrorKind::NotExists));
        }
        Ok(true)
    }

    fn value(&self) -> Result<Variant> {
        self.on.get(self.idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(on: Variant, rule: &str) -> Vec<Variant> {
        let factory = executor_for_rule(rule).unwrap();
        let mut exec = factory(on, Variant::Undefined).unwrap();
        let mut out = Vec::new();
        if exec.begin(rule).unwrap() {
            loop {
                out.push(exec.value().unwrap());
                match exec.next(Some(rule)) {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) if e.kind == ErrorKind::NotExists => break,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }
        out
    }

    #[test]
    fn test_range_from_zero() {
        let arr = Variant::array(vec![
            Variant::LongInt(3),
            Variant::LongInt(1),
            Variant::LongInt(2),
        ]);
        let vals = drive(arr, "RANGE: FROM 0");
        assert_eq!(
            vals,
            vec![Variant::LongInt(3), Variant::LongInt(1), Variant::LongInt(2)]
        );
    }

    #[test]
    fn test_range_from_to_advance() {
        let arr = Variant::array((0..10).map(Variant::LongInt).collect::<Vec<_>>());
        let vals = drive(arr, "RANGE: FROM 1 TO 7 ADVANCE 3");
        assert_eq!(
            vals,
            vec![Variant::LongInt(1), Variant::LongInt(4), Variant::LongInt(7)]
        );
    }

    #[test]
    fn test_range_empty_container() {
        let vals = drive(Variant::array(vec![]), "RANGE: FROM 0");
        assert!(vals.is_empty());
    }

    #[test]
    fn test_range_rejects_zero_advance() {
        let arr = Variant::array(vec![Variant::LongInt(1)]);
        let factory = executor_for_rule("RANGE: FROM 0").unwrap();
        let mut exec = factory(arr, Variant::Undefined).unwrap();
        assert!(exec.begin("RANGE: FROM 0 ADVANCE 0").is_err());
    }

    #[test]
    fn test_range_rejects_non_container() {
        let factory = executor_for_rule("RANGE: FROM 0").unwrap();
        assert!(factory(Variant::LongInt(5), Variant::Undefined).is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = register_executor("RANGE", range_factory).unwrap_err();
        assert_eq!(err.kind, ErrorKind::EntityExists);
    }

    #[test]
    fn test_unknown_rule() {
        let err = executor_for_rule("NOPE: x").unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadExecutor);
    }
}
