//! Per-thread variant heap statistics.
//!
//! Every allocated variant payload (strings, byte sequences, dynamics,
//! natives, containers) is tracked in the heap of the thread that created
//! it: a value count and a byte estimate per type. Immediate values
//! (undefined, null, booleans, numerics) have no payload and are not
//! tracked; the move protocol transfers accounting between an instance
//! heap and the process-wide move heap explicitly.

use super::VariantType;
use std::cell::RefCell;

pub const NR_VARIANT_TYPES: usize = 15;

/// Fixed per-value overhead used in byte estimates, alongside any owned
/// data bytes (string/byte-sequence contents).
pub const VALUE_BASE_SIZE: usize = 32;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub nr_values: [usize; NR_VARIANT_TYPES],
    pub sz_mem: [usize; NR_VARIANT_TYPES],
    pub nr_total_values: usize,
    pub sz_total_mem: usize,
}

impl HeapStats {
    pub fn new() -> Self {
        HeapStats::default()
    }

    pub fn track_alloc(&mut self, ty: VariantType, data_len: usize) {
        let sz = VALUE_BASE_SIZE + data_len;
        self.nr_values[ty as usize] += 1;
        self.sz_mem[ty as usize] += sz;
        self.nr_total_values += 1;
        self.sz_total_mem += sz;
    }

    pub fn track_free(&mut self, ty: VariantType, data_len: usize) {
        let sz = VALUE_BASE_SIZE + data_len;
        self.nr_values[ty as usize] = self.nr_values[ty as usize].saturating_sub(1);
        self.sz_mem[ty as usize] = self.sz_mem[ty as usize].saturating_sub(sz);
        self.nr_total_values = self.nr_total_values.saturating_sub(1);
        self.sz_total_mem = self.sz_total_mem.saturating_sub(sz);
    }
}

thread_local! {
    static HEAP: RefCell<HeapStats> = RefCell::new(HeapStats::new());
}

/// Record an allocation in the current thread's heap.
pub(crate) fn on_alloc(ty: VariantType, data_len: usize) {
    HEAP.with(|h| h.borrow_mut().track_alloc(ty, data_len));
}

/// Record a release in the current thread's heap.
pub(crate) fn on_free(ty: VariantType, data_len: usize) {
    HEAP.with(|h| h.borrow_mut().track_free(ty, data_len));
}

/// Snapshot the current thread's heap statistics.
pub fn stats() -> HeapStats {
    HEAP.with(|h| h.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_alloc_free_roundtrip() {
        let mut s = HeapStats::new();
        let before = s.clone();
        s.track_alloc(VariantType::String, 5);
        assert_eq!(s.nr_values[VariantType::String as usize], 1);
        assert_eq!(s.sz_mem[VariantType::String as usize], VALUE_BASE_SIZE + 5);
        s.track_free(VariantType::String, 5);
        assert_eq!(s, before);
    }

    #[test]
    fn test_totals_follow_per_type() {
        let mut s = HeapStats::new();
        s.track_alloc(VariantType::Array, 0);
        s.track_alloc(VariantType::Object, 0);
        assert_eq!(s.nr_total_values, 2);
        assert_eq!(s.sz_total_mem, 2 * VALUE_BASE_SIZE);
    }
}
