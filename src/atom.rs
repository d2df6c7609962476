//! Process-wide interned atoms.
//!
//! Atoms identify endpoints and exception names across threads. The table
//! is bucketed so that unrelated vocabularies cannot collide; atom value 0
//! is reserved (invalid atom / broadcast target).

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Atom buckets. Each bucket has its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Default,
    Except,
    Endpoint,
}

/// An interned string handle. Copyable, comparable, stable for the life of
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u64);

impl Atom {
    pub const INVALID: Atom = Atom(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

struct AtomTable {
    by_name: FxHashMap<(Bucket, Box<str>), Atom>,
    by_atom: Vec<(Bucket, Arc<str>)>,
}

fn table() -> &'static Mutex<AtomTable> {
    static TABLE: OnceLock<Mutex<AtomTable>> = OnceLock::new();
    TABLE.get_or_init(|| {
        Mutex::new(AtomTable {
            by_name: FxHashMap::default(),
            by_atom: Vec::new(),
        })
    })
}

/// Intern `s` in `bucket`, returning its atom. Idempotent.
pub fn intern(bucket: Bucket, s: &str) -> Atom {
    let mut t = table().lock().unwrap();
    if let Some(&atom) = t.by_name.get(&(bucket, Box::from(s))) {
        return atom;
    }
    let atom = Atom((t.by_atom.len() + 1) as u64);
    t.by_atom.push((bucket, Arc::from(s)));
    t.by_name.insert((bucket, Box::from(s)), atom);
    atom
}

/// Look up an atom without interning. Returns `Atom::INVALID` if absent.
pub fn lookup(bucket: Bucket, s: &str) -> Atom {
    let t = table().lock().unwrap();
    t.by_name
        .get(&(bucket, Box::from(s)))
        .copied()
        .unwrap_or(Atom::INVALID)
}

/// Resolve an atom back to its string. `None` for invalid/unknown atoms.
pub fn resolve(atom: Atom) -> Option<Arc<str>> {
    if !atom.is_valid() {
        return None;
    }
    let t = table().lock().unwrap();
    t.by_atom
        .get((atom.0 - 1) as usize)
        .map(|(_, s)| Arc::clone(s))
}
