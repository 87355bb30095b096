//! Events delivered to the host through `poll_events`.
//!
//! Backed by the same unbounded MPSC channel used for control messages
//! (`crossbeam_channel`): network and audio threads both push events, the
//! host drains them from whichever thread calls `poll_events`.

use crate::endpoint::Id;

#[derive(Debug, Clone)]
pub enum Event {
    SourceAdded { id: Id },
    SourceRemoved { id: Id },
    SinkAdded { id: Id },
    SinkRemoved { id: Id },
    StreamStart { id: Id },
    StreamStop { id: Id },
    StreamStateChanged { id: Id, active: bool },
    FormatChange { id: Id },
    Ping { id: Id, rtt_seconds: f64 },
    Invite { id: Id, token: u32 },
    Uninvite { id: Id },
    InviteDeclined { id: Id },
    InviteTimeout { id: Id },
    BufferOverrun { id: Id },
    BufferUnderrun { id: Id },
    BlockDropped { id: Id, sequence: u32 },
    BlockResent { id: Id, sequence: u32 },
    BlockLost { id: Id, sequence: u32 },
    Xrun { id: Id },
}

pub struct EventQueue {
    sender: crossbeam_channel::Sender<Event>,
    receiver: crossbeam_channel::Receiver<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> crossbeam_channel::Sender<Event> {
        self.sender.clone()
    }

    pub fn push(&self, event: Event) {
        // Unbounded channel: send only fails if every receiver was
        // dropped, which can't happen while `self` is alive.
        let _ = self.sender.send(event);
    }

    /// Drain up to `max` pending events into `out`, returning the count
    /// drained.
    pub fn poll(&self, out: &mut Vec<Event>, max: usize) -> usize {
        let mut n = 0;
        while n < max {
            match self.receiver.try_recv() {
                Ok(event) => {
                    out.push(event);
                    n += 1;
                }
                Err(_) => break,
            }
        }
        n
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_drains_in_order_up_to_max() {
        let q = EventQueue::new();
        q.push(Event::SourceAdded { id: 1 });
        q.push(Event::SourceAdded { id: 2 });
        q.push(Event::SourceAdded { id: 3 });

        let mut out = Vec::new();
        let n = q.poll(&mut out, 2);
        assert_eq!(n, 2);
        assert_eq!(out.len(), 2);

        let mut rest = Vec::new();
        q.poll(&mut rest, 10);
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn poll_on_empty_queue_returns_zero() {
        let q = EventQueue::new();
        let mut out = Vec::new();
        assert_eq!(q.poll(&mut out, 10), 0);
        assert!(out.is_empty());
    }
}
