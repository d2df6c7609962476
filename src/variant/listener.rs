//! Container mutation listeners.
//!
//! A listener is a (operation mask, callback) pair registered either pre
//! or post. Pre-listeners run before the mutation and may veto it by
//! returning false; post-listeners run after, in registration order, and
//! their return value is ignored.

use super::Variant;
use std::rc::Rc;

/// Container operations a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Grow,
    Shrink,
    Change,
}

/// Bitmask of operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpMask(pub u8);

pub const OP_GROW: OpMask = OpMask(1 << 0);
pub const OP_SHRINK: OpMask = OpMask(1 << 1);
pub const OP_CHANGE: OpMask = OpMask(1 << 2);
pub const OP_ALL: OpMask = OpMask(0b111);

impl OpMask {
    pub fn contains(self, op: Op) -> bool {
        let bit = match op {
            Op::Grow => OP_GROW.0,
            Op::Shrink => OP_SHRINK.0,
            Op::Change => OP_CHANGE.0,
        };
        self.0 & bit != 0
    }
}

impl std::ops::BitOr for OpMask {
    type Output = OpMask;
    fn bitor(self, rhs: OpMask) -> OpMask {
        OpMask(self.0 | rhs.0)
    }
}

/// Callback signature: (container, operation, arguments) -> keep-going.
///
/// Argument conventions per operation:
/// - array/tuple: Grow `[new]`, Shrink `[old]`, Change `[old, new]`
/// - object: Grow `[key, new]`, Shrink `[key, old]`, Change `[key, old, new]`
/// - set: Grow `[new]`, Shrink `[old]`, Change `[old, new]`
/// - displace: Change with `[source]`
pub type ListenerFn = Rc<dyn Fn(&Variant, Op, &[Variant]) -> bool>;

/// Handle returned from registration, used to revoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(pub u64);

#[derive(Clone)]
pub struct Listener {
    pub id: ListenerId,
    pub ops: OpMask,
    pub post: bool,
    pub callback: ListenerFn,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<listener:{} {} mask={:#b}>",
            self.id.0,
            if self.post { "post" } else { "pre" },
            self.ops.0
        )
    }
}
