//! Per-instance message queue.
//!
//! Five lists (requests, responses, events, timer events, miscellaneous)
//! behind one read-write lock, plus a condvar-based wake channel so the
//! owning runloop can sleep until a message arrives. Appenders may run on
//! any thread; consumption happens on the owner's thread.

use super::{Message, MsgType};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

#[derive(Default, Debug)]
struct Lists {
    requests: VecDeque<Message>,
    responses: VecDeque<Message>,
    events: VecDeque<Message>,
    timer_events: VecDeque<Message>,
    misc: VecDeque<Message>,
}

impl Lists {
    fn len(&self) -> usize {
        self.requests.len()
            + self.responses.len()
            + self.events.len()
            + self.timer_events.len()
            + self.misc.len()
    }
}

#[derive(Debug)]
pub struct MsgQueue {
    lists: RwLock<Lists>,
    nr_msgs: Mutex<usize>,
    wake: Condvar,
}

impl Default for MsgQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgQueue {
    pub fn new() -> MsgQueue {
        MsgQueue {
            lists: RwLock::new(Lists::default()),
            nr_msgs: Mutex::new(0),
            wake: Condvar::new(),
        }
    }

    fn list_for(msg: &Message) -> fn(&mut Lists) -> &mut VecDeque<Message> {
        match msg.ty {
            MsgType::Request => |l| &mut l.requests,
            MsgType::Response => |l| &mut l.responses,
            MsgType::Event => {
                // timer events go to the timer list only when the message
                // carries the timer-id field
                if msg.timer_id.is_some() {
                    |l| &mut l.timer_events
                } else {
                    |l| &mut l.events
                }
            }
            MsgType::Void => |l| &mut l.misc,
        }
    }

    pub fn append(&self, msg: Message) {
        let pick = Self::list_for(&msg);
        pick(&mut self.lists.write().unwrap()).push_back(msg);
        *self.nr_msgs.lock().unwrap() += 1;
        self.wake.notify_all();
    }

    pub fn prepend(&self, msg: Message) {
        let pick = Self::list_for(&msg);
        pick(&mut self.lists.write().unwrap()).push_front(msg);
        *self.nr_msgs.lock().unwrap() += 1;
        self.wake.notify_all();
    }

    pub fn count(&self) -> usize {
        *self.nr_msgs.lock().unwrap()
    }

    /// Read-only view of the message at `idx`. Messages are indexed
    /// request lists first, then responses, events, timer events, and
    /// miscellaneous, FIFO within each list.
    pub fn retrieve(&self, idx: usize) -> Option<Message> {
        let lists = self.lists.read().unwrap();
        let mut i = idx;
        for list in [
            &lists.requests,
            &lists.responses,
            &lists.events,
            &lists.timer_events,
            &lists.misc,
        ] {
            if i < list.len() {
                return list.get(i).cloned();
            }
            i -= list.len();
        }
        None
    }

    /// Remove and return the message at `idx` (same ordering as
    /// `retrieve`).
    pub fn take_away(&self, idx: usize) -> Option<Message> {
        let mut lists = self.lists.write().unwrap();
        let mut i = idx;
        let mut taken = None;
        if i < lists.requests.len() {
            taken = lists.requests.remove(i);
        } else {
            i -= lists.requests.len();
            if i < lists.responses.len() {
                taken = lists.responses.remove(i);
            } else {
                i -= lists.responses.len();
                if i < lists.events.len() {
                    taken = lists.events.remove(i);
                } else {
                    i -= lists.events.len();
                    if i < lists.timer_events.len() {
                        taken = lists.timer_events.remove(i);
                    } else {
                        i -= lists.timer_events.len();
                        if i < lists.misc.len() {
                            taken = lists.misc.remove(i);
                        }
                    }
                }
            }
        }
        drop(lists);
        if taken.is_some() {
            *self.nr_msgs.lock().unwrap() -= 1;
        }
        taken
    }

    /// Remove the pending response matching `request_id`, regardless of
    /// intervening events.
    pub fn take_response_for(&self, request_id: &str) -> Option<Message> {
        let mut lists = self.lists.write().unwrap();
        let pos = lists
            .responses
            .iter()
            .position(|m| m.request_id_str() == Some(request_id))?;
        let msg = lists.responses.remove(pos);
        drop(lists);
        if msg.is_some() {
            *self.nr_msgs.lock().unwrap() -= 1;
        }
        msg
    }

    /// Drain every list, releasing the payloads. Returns how many
    /// messages were discarded.
    pub fn drain(&self) -> usize {
        let mut lists = self.lists.write().unwrap();
        let n = lists.len();
        let _drained = std::mem::take(&mut *lists);
        drop(lists);
        *self.nr_msgs.lock().unwrap() = 0;
        n
    }

    /// Block until a message is available or the timeout lapses. Returns
    /// true when a message is waiting.
    pub fn wait_message(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.nr_msgs.lock().unwrap();
        loop {
            if *count > 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _res) = self.wake.wait_timeout(count, deadline - now).unwrap();
            count = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::MsgTarget;
    use super::*;

    #[test]
    fn test_append_classifies_by_type() {
        let q = MsgQueue::new();
        q.append(Message::request(MsgTarget::Session, 0, "load", "r1"));
        q.append(Message::event(MsgTarget::Dom, 0, "change:attached"));
        q.append(Message::event(MsgTarget::Dom, 0, "expired:clock").with_timer_id("clock"));
        q.append(Message::void());
        assert_eq!(q.count(), 4);

        // index order: requests, responses, events, timer events, misc
        assert_eq!(q.retrieve(0).unwrap().ty, MsgType::Request);
        assert_eq!(q.retrieve(1).unwrap().event_name(), Some("change:attached"));
        assert_eq!(q.retrieve(2).unwrap().timer_id.as_deref(), Some("clock"));
        assert_eq!(q.retrieve(3).unwrap().ty, MsgType::Void);
    }

    #[test]
    fn test_take_away_removes() {
        let q = MsgQueue::new();
        q.append(Message::event(MsgTarget::Thread, 1, "a"));
        q.append(Message::event(MsgTarget::Thread, 2, "b"));
        let first = q.take_away(0).unwrap();
        assert_eq!(first.event_name(), Some("a"));
        assert_eq!(q.count(), 1);
        assert!(q.take_away(5).is_none());
    }

    #[test]
    fn test_response_matching_skips_events() {
        let q = MsgQueue::new();
        q.append(Message::event(MsgTarget::Thread, 1, "noise"));
        q.append(Message::response("r9", 200, 0));
        q.append(Message::event(MsgTarget::Thread, 1, "more-noise"));

        let res = q.take_response_for("r9").unwrap();
        assert_eq!(res.ret_code, 200);
        assert!(q.take_response_for("r9").is_none());
        assert_eq!(q.count(), 2);
    }

    #[test]
    fn test_drain_counts() {
        let q = MsgQueue::new();
        for i in 0..3 {
            q.append(Message::event(MsgTarget::Thread, i, "e"));
        }
        assert_eq!(q.drain(), 3);
        assert_eq!(q.count(), 0);
    }

    #[test]
    fn test_wait_message_timeout() {
        let q = MsgQueue::new();
        assert!(!q.wait_message(Duration::from_millis(10)));
        q.append(Message::void());
        assert!(q.wait_message(Duration::from_millis(10)));
    }

    #[test]
    fn test_fifo_within_list() {
        let q = MsgQueue::new();
        q.append(Message::event(MsgTarget::Thread, 1, "first"));
        q.append(Message::event(MsgTarget::Thread, 1, "second"));
        q.prepend(Message::event(MsgTarget::Thread, 1, "zeroth"));
        assert_eq!(q.take_away(0).unwrap().event_name(), Some("zeroth"));
        assert_eq!(q.take_away(0).unwrap().event_name(), Some("first"));
        assert_eq!(q.take_away(0).unwrap().event_name(), Some("second"));
    }
}
