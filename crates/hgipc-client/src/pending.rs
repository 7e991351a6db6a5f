//! FIFO table of calls awaiting their response.
//!
//! The hub answers requests in the order it received them and responses
//! carry no id, so the oldest slot always owns the next Response or Fault.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;

use hgipc_variant::Variant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::state::lock;

pub(crate) type Reply = Result<Variant>;

/// One-shot result slot for a sent request.
pub(crate) struct Slot {
    id: u64,
    tx: SyncSender<Reply>,
}

impl Slot {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Deliver the result. A caller that already timed out dropped its
    /// receiver; the reply is discarded then.
    pub(crate) fn complete(self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            debug!(call = self.id, "discarding response for abandoned call");
        }
    }
}

#[derive(Default)]
pub(crate) struct PendingCalls {
    inner: Mutex<Queue>,
}

#[derive(Default)]
struct Queue {
    next_id: u64,
    slots: VecDeque<Slot>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a slot; its position is the order the request goes on the wire.
    pub(crate) fn push(&self) -> (u64, Receiver<Reply>) {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut queue = lock(&self.inner);
        queue.next_id = queue.next_id.wrapping_add(1);
        let id = queue.next_id;
        queue.slots.push_back(Slot { id, tx });
        (id, rx)
    }

    /// Take the oldest slot.
    pub(crate) fn pop_front(&self) -> Option<Slot> {
        lock(&self.inner).slots.pop_front()
    }

    /// Remove a slot whose request never made it onto the wire.
    pub(crate) fn withdraw(&self, id: u64) {
        let mut queue = lock(&self.inner);
        if let Some(pos) = queue.slots.iter().position(|slot| slot.id == id) {
            queue.slots.remove(pos);
        }
    }

    /// Fail every outstanding call with `NotConnected`. Returns how many.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<Slot> = lock(&self.inner).slots.drain(..).collect();
        let count = drained.len();
        for slot in drained {
            slot.complete(Err(Error::not_connected()));
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).slots.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConnectionError;

    use super::*;

    #[test]
    fn slots_complete_in_send_order() {
        let pending = PendingCalls::new();
        let (first, rx1) = pending.push();
        let (second, rx2) = pending.push();
        assert!(first < second);

        pending
            .pop_front()
            .unwrap()
            .complete(Ok(Variant::Integer(1)));
        pending
            .pop_front()
            .unwrap()
            .complete(Ok(Variant::Integer(2)));

        assert_eq!(rx1.recv().unwrap().unwrap(), Variant::Integer(1));
        assert_eq!(rx2.recv().unwrap().unwrap(), Variant::Integer(2));
        assert!(pending.pop_front().is_none());
    }

    #[test]
    fn abandoned_slot_still_consumes_its_response() {
        let pending = PendingCalls::new();
        let (_, rx1) = pending.push();
        let (_, rx2) = pending.push();
        drop(rx1);

        pending.pop_front().unwrap().complete(Ok(Variant::from("late")));
        pending.pop_front().unwrap().complete(Ok(Variant::from("mine")));

        assert_eq!(rx2.recv().unwrap().unwrap(), Variant::from("mine"));
    }

    #[test]
    fn withdraw_removes_only_that_slot() {
        let pending = PendingCalls::new();
        let (a, _rx_a) = pending.push();
        let (b, _rx_b) = pending.push();
        let (c, _rx_c) = pending.push();

        pending.withdraw(b);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.pop_front().unwrap().id(), a);
        assert_eq!(pending.pop_front().unwrap().id(), c);
    }

    #[test]
    fn fail_all_reports_not_connected() {
        let pending = PendingCalls::new();
        let (_, rx1) = pending.push();
        let (_, rx2) = pending.push();

        assert_eq!(pending.fail_all(), 2);
        assert_eq!(pending.len(), 0);
        for rx in [rx1, rx2] {
            assert!(matches!(
                rx.recv().unwrap(),
                Err(Error::Connection(ConnectionError::NotConnected))
            ));
        }
    }
}
