//! The process-wide move-buffer registry.
//!
//! Each instance that wants cross-thread messaging registers its message
//! queue here under its endpoint atom. `move_message` routes a message to
//! one registered queue, or — with target 0 and an event message — clones
//! it to every other registered instance whose buffer opted into
//! broadcast.

use super::{Message, MsgQueue, MsgType};
use crate::atom::Atom;
use crate::error::{Error, ErrorKind, Result};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveBufferFlags(pub u32);

pub const MOVE_BUFFER_BROADCAST: MoveBufferFlags = MoveBufferFlags(1 << 0);

impl MoveBufferFlags {
    pub fn has_broadcast(self) -> bool {
        self.0 & MOVE_BUFFER_BROADCAST.0 != 0
    }
}

impl std::ops::BitOr for MoveBufferFlags {
    type Output = MoveBufferFlags;
    fn bitor(self, rhs: MoveBufferFlags) -> MoveBufferFlags {
        MoveBufferFlags(self.0 | rhs.0)
    }
}

struct Entry {
    flags: MoveBufferFlags,
    #[allow(dead_code)]
    max_hint: usize,
    queue: Arc<MsgQueue>,
}

fn registry() -> &'static Mutex<FxHashMap<u64, Arc<Entry>>> {
    static REGISTRY: OnceLock<Mutex<FxHashMap<u64, Arc<Entry>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()))
}

/// Register `endpoint`'s queue. Fails with Duplicated when the endpoint
/// is already registered.
pub fn create_move_buffer(endpoint: Atom, flags: MoveBufferFlags, max_hint: usize) -> Result<Arc<MsgQueue>> {
    if !endpoint.is_valid() {
        return Err(Error::invalid_value("invalid endpoint atom"));
    }
    let mut reg = registry().lock().unwrap();
    if reg.contains_key(&endpoint.0) {
        return Err(Error::new(ErrorKind::Duplicated));
    }
    let queue = Arc::new(MsgQueue::new());
    reg.insert(
        endpoint.0,
        Arc::new(Entry {
            flags,
            max_hint,
            queue: Arc::clone(&queue),
        }),
    );
    debug!(endpoint = endpoint.0, "move buffer created");
    Ok(queue)
}

/// Deregister `endpoint`, draining its queue. Returns the number of
/// discarded messages.
pub fn destroy_move_buffer(endpoint: Atom) -> Result<usize> {
    let entry = registry()
        .lock()
        .unwrap()
        .remove(&endpoint.0)
        .ok_or_else(|| Error::new(ErrorKind::EntityNotFound))?;
    let discarded = entry.queue.drain();
    debug!(endpoint = endpoint.0, discarded, "move buffer destroyed");
    Ok(discarded)
}

/// The registered queue for `endpoint`, if any.
pub fn registered_queue(endpoint: Atom) -> Option<Arc<MsgQueue>> {
    registry()
        .lock()
        .unwrap()
        .get(&endpoint.0)
        .map(|e| Arc::clone(&e.queue))
}

/// Route `msg`.
///
/// With `target == Atom::INVALID` and an event message, the message is
/// cloned once per registered instance (other than the sender) whose
/// buffer has the broadcast flag. Otherwise the message lands in the
/// target instance's queue. Returns how many instances received it.
pub fn move_message(from: Atom, target: Atom, msg: &Message) -> usize {
    if !target.is_valid() {
        if msg.ty != MsgType::Event {
            return 0;
        }
        let recipients: Vec<Arc<Entry>> = {
            let reg = registry().lock().unwrap();
            reg.iter()
                .filter(|(atom, e)| **atom != from.0 && e.flags.has_broadcast())
                .map(|(_, e)| Arc::clone(e))
                .collect()
        };
        for entry in &recipients {
            entry.queue.append(msg.clone());
        }
        debug!(from = from.0, n = recipients.len(), "event broadcast");
        return recipients.len();
    }

    match registered_queue(target) {
        Some(queue) => {
            queue.append(msg.clone());
            1
        }
        None => 0,
    }
}
