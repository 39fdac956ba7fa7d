//! Bounded per-class FIFO holding packets awaiting transmission.

use crate::packet::Packet;
use std::collections::VecDeque;

/// Default per-class queue limit, in packets.
pub const DEFAULT_QLIMIT: usize = 50;

/// Tail-drop FIFO attached to each leaf class.
///
/// Ordering within a class is strictly arrival order; the scheduler only
/// ever looks at the head packet when computing deadlines.
#[derive(Debug)]
pub struct ClassQueue {
    packets: VecDeque<Packet>,
    limit: usize,
}

impl ClassQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            limit,
        }
    }

    /// Append a packet, handing it back when the queue is at its limit so
    /// the caller can account for the drop.
    pub fn try_push(&mut self, packet: Packet) -> Result<(), Packet> {
        if self.packets.len() >= self.limit {
            return Err(packet);
        }
        self.packets.push_back(packet);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn front(&self) -> Option<&Packet> {
        self.packets.front()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Drop every queued packet, returning how many packets and bytes went.
    pub fn purge(&mut self) -> (u64, u64) {
        let packets = self.packets.len() as u64;
        let bytes = self.packets.iter().map(|p| p.len() as u64).sum();
        self.packets.clear();
        (packets, bytes)
    }
}

impl Default for ClassQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QLIMIT)
    }
}
