//! Counters and snapshot types reported by the scheduler.
//!
//! Snapshots are plain serde-serializable structs so callers can log them,
//! dump them as JSON, or diff them between polls without touching the
//! scheduler's internal state.

use crate::curve::ServiceCurve;
use serde::{Deserialize, Serialize};

/// Packet and byte counter pair, incremented together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketCounter {
    pub packets: u64,
    pub bytes: u64,
}

impl PacketCounter {
    pub fn add(&mut self, bytes: u64) {
        self.packets += 1;
        self.bytes += bytes;
    }
}

/// Point-in-time view of a single class.
///
/// Curve fields are read back from the fixed-point tables, so rates can be
/// off by a few bit/s from what was configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassStats {
    pub realtime: Option<ServiceCurve>,
    pub linkshare: Option<ServiceCurve>,
    /// Bytes sent on behalf of this class or its descendants.
    pub total: u64,
    /// Bytes sent by this class under the real-time criterion.
    pub cumul: u64,
    pub eligible: u64,
    pub deadline: u64,
    pub virtual_time: u64,
    pub queue_length: usize,
    pub queue_limit: usize,
    pub xmit: PacketCounter,
    pub drops: PacketCounter,
    pub period: u32,
    pub vt_period: u32,
    pub parent_period: u32,
    /// Activations outstanding in this subtree; 0 or 1 for a leaf.
    pub active_count: u32,
}

/// Aggregate view of one scheduler instance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub classes: usize,
    /// Packets currently queued across all leaves.
    pub backlog: u64,
    pub xmit: PacketCounter,
    pub drops: PacketCounter,
}
