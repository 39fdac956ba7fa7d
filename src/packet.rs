//! Packet representation shared by the classifier and the scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

static PACKET_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Maximum payload size handled by the scheduler (standard Ethernet MTU).
pub const MAX_PACKET_SIZE: usize = 1500;

/// Lightweight representation of a frame travelling through the scheduler.
///
/// Each [`Packet`] captures its payload bytes and the flow identifier the
/// [`FlowClassifier`](crate::FlowClassifier) maps onto a class. Service
/// curves are charged by payload length, so the length is the only field
/// the scheduling core ever inspects.
#[derive(Debug, Clone)]
pub struct Packet {
    pub flow_id: u64,
    pub id: u64,
    data: Vec<u8>,
}

impl Packet {
    /// Create a packet from payload bytes, truncating at the MTU.
    pub fn new(flow_id: u64, payload: &[u8]) -> Packet {
        let len = payload.len().min(MAX_PACKET_SIZE);
        Packet {
            flow_id,
            id: PACKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: payload[..len].to_vec(),
        }
    }

    /// Create a zero-filled packet of the given size, for load generation.
    pub fn synthetic(flow_id: u64, len: usize) -> Packet {
        Packet {
            flow_id,
            id: PACKET_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: vec![0; len.min(MAX_PACKET_SIZE)],
        }
    }

    /// Borrow the payload as a slice.
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes, the unit every service curve is charged in.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
