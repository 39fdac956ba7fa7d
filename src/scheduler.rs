//! Hierarchical fair service curve scheduler.
//!
//! Classes form a tree rooted at the link. A leaf with a real-time curve
//! is guaranteed its service no matter what the rest of the hierarchy
//! does; bandwidth beyond the guarantees is distributed by descending the
//! tree along smallest virtual times. Each dequeue serves the most urgent
//! due real-time deadline first and falls back to the link-sharing walk
//! when no real-time class is due, so the link stays busy whenever any
//! link-sharing class is backlogged.

use crate::class::{Class, ClassArena, ClassId, ClassOpts, MAX_CLASSES};
use crate::clock::Clock;
use crate::curve::{InternalCurve, RuntimeCurve, ServiceCurve};
use crate::error::SchedError;
use crate::lists::{ByEligible, ByVirtual, OrderedList};
use crate::packet::Packet;
use crate::queue::DEFAULT_QLIMIT;
use crate::stats::{ClassStats, PacketCounter, SchedulerStats};
use std::sync::Arc;
use tracing::{debug, trace};

/// One scheduler instance, driving one link.
pub struct HfscScheduler {
    arena: ClassArena,
    root: ClassId,
    /// Real-time backlogged classes, ordered by eligible time.
    eligible: OrderedList,
    clock: Arc<dyn Clock>,
    frequency: u64,
    link_bps: u64,
    /// Packets queued across all leaves.
    backlog: u64,
    xmit: PacketCounter,
    drops: PacketCounter,
    /// Class chosen by the last poll, consumed by the next dequeue.
    polled: Option<ClassId>,
}

impl HfscScheduler {
    /// Attach a scheduler to a link of the given bandwidth. The root class
    /// is created along with it, sharing out the whole link.
    pub fn new(link_bps: u64, clock: Arc<dyn Clock>) -> HfscScheduler {
        let frequency = clock.frequency();
        let mut arena = ClassArena::new();
        let fsc = InternalCurve::convert(&ServiceCurve::linear(link_bps), frequency);
        let root = arena.insert(|id| Class::new(id, None, None, Some(fsc), DEFAULT_QLIMIT));
        debug!(link_bps, frequency, "hfsc attached");
        HfscScheduler {
            arena,
            root,
            eligible: OrderedList::default(),
            clock,
            frequency,
            link_bps,
            backlog: 0,
            xmit: PacketCounter::default(),
            drops: PacketCounter::default(),
            polled: None,
        }
    }

    pub fn root(&self) -> ClassId {
        self.root
    }

    pub fn link_bandwidth(&self) -> u64 {
        self.link_bps
    }

    /// Packets queued across all classes.
    pub fn backlog(&self) -> u64 {
        self.backlog
    }

    /// Handles of every live class, the root included.
    pub fn classes(&self) -> Vec<ClassId> {
        self.arena.ids()
    }

    /// Create a class under `parent`.
    ///
    /// A backlogged leaf parent is purged first: its queued packets belong
    /// to a FIFO that ceases to exist once the class turns interior.
    pub fn create_class(
        &mut self,
        parent: ClassId,
        opts: ClassOpts,
    ) -> Result<ClassId, SchedError> {
        if self.arena.len() >= MAX_CLASSES {
            return Err(SchedError::OutOfMemory);
        }
        if !self.arena.contains(parent) {
            return Err(SchedError::UnknownClass);
        }
        if self.arena[parent].is_leaf() && self.arena[parent].has_backlog() {
            self.purge_class(parent);
        }

        let rsc = self.convert(opts.realtime);
        let fsc = self.convert(opts.linkshare);
        let qlimit = opts.qlimit.unwrap_or(DEFAULT_QLIMIT);
        let id = self
            .arena
            .insert(|id| Class::new(id, Some(parent), rsc, fsc, qlimit));
        self.arena[parent].children += 1;
        debug!(class = ?id, parent = ?parent, "class created");
        Ok(id)
    }

    /// Remove a childless, non-root class, dropping whatever it has queued.
    pub fn destroy_class(&mut self, id: ClassId) -> Result<(), SchedError> {
        if !self.arena.contains(id) {
            return Err(SchedError::UnknownClass);
        }
        if id == self.root || self.arena[id].children > 0 {
            return Err(SchedError::Busy);
        }
        self.purge_class(id);
        let Some(class) = self.arena.remove(id) else {
            return Err(SchedError::UnknownClass);
        };
        if let Some(parent) = class.parent {
            self.arena[parent].children -= 1;
        }
        if self.polled == Some(id) {
            self.polled = None;
        }
        debug!(class = ?id, "class destroyed");
        Ok(())
    }

    /// Replace a class's curves or queue limit.
    ///
    /// The class queue is drained first so packets admitted under the old
    /// guarantees do not carry them over; the runtime curves are then
    /// re-anchored at the present so history under the old curves does not
    /// distort the new ones.
    pub fn modify_class(&mut self, id: ClassId, opts: ClassOpts) -> Result<(), SchedError> {
        if !self.arena.contains(id) {
            return Err(SchedError::UnknownClass);
        }
        self.purge_class(id);

        let now = self.clock.now();
        if let Some(sc) = opts.realtime {
            let rsc = self.convert(Some(sc));
            let class = &mut self.arena[id];
            class.rsc = rsc;
            match rsc {
                Some(isc) => {
                    class.deadline = RuntimeCurve::anchored(isc, now, class.cumul);
                    class.eligible = class.deadline;
                    if isc.is_convex() {
                        class.eligible.drop_first_segment();
                    }
                }
                None => {
                    class.deadline = RuntimeCurve::flat();
                    class.eligible = RuntimeCurve::flat();
                }
            }
        }
        if let Some(sc) = opts.linkshare {
            let fsc = self.convert(Some(sc));
            let class = &mut self.arena[id];
            class.fsc = fsc;
            class.vt_curve = match fsc {
                Some(isc) => RuntimeCurve::anchored(isc, class.vt, class.total),
                None => RuntimeCurve::flat(),
            };
        }
        if let Some(qlimit) = opts.qlimit {
            self.arena[id].queue.set_limit(qlimit);
        }
        debug!(class = ?id, "class modified");
        Ok(())
    }

    /// Queue a packet on a leaf class.
    pub fn enqueue(&mut self, id: ClassId, packet: Packet) -> Result<(), SchedError> {
        if !self.arena.contains(id) {
            return Err(SchedError::UnknownClass);
        }
        let len = packet.len() as u64;
        if !self.arena[id].is_leaf() {
            self.arena[id].drops.add(len);
            self.drops.add(len);
            trace!(class = ?id, len, "drop on interior class");
            return Err(SchedError::NotLeaf);
        }
        if self.arena[id].queue.try_push(packet).is_err() {
            self.arena[id].drops.add(len);
            self.drops.add(len);
            trace!(class = ?id, len, "tail drop");
            return Err(SchedError::QueueFull);
        }
        self.backlog += 1;
        if self.arena[id].queue.len() == 1 {
            self.set_active(id, len);
        }
        Ok(())
    }

    /// Pick the next class to serve and look at its head packet without
    /// removing it. The choice is remembered, and the next [`dequeue`]
    /// serves exactly this packet.
    ///
    /// [`dequeue`]: HfscScheduler::dequeue
    pub fn poll(&mut self) -> Option<&Packet> {
        if self.backlog == 0 {
            return None;
        }
        let now = self.clock.now();
        let (id, _) = self.select(now)?;
        self.polled = Some(id);
        self.arena[id].queue.front()
    }

    /// Remove and return the next packet, or `None` when nothing is ready.
    ///
    /// With only real-time classes backlogged the scheduler is not work
    /// conserving: until some eligible time arrives this returns `None`
    /// even though packets are queued.
    pub fn dequeue(&mut self) -> Option<Packet> {
        if self.backlog == 0 {
            return None;
        }
        let now = self.clock.now();

        let (id, realtime) = match self.polled.take() {
            Some(id) => {
                // Re-decide the criterion at removal time; the clock may
                // have passed the class's eligible time since the poll.
                let class = &self.arena[id];
                (id, class.rsc.is_some() && class.e <= now)
            }
            None => self.select(now)?,
        };

        let packet = self.arena[id]
            .queue
            .pop()
            .expect("selected class must have a queued packet");
        let len = packet.len() as u64;
        self.backlog -= 1;
        self.arena[id].xmit.add(len);
        self.xmit.add(len);
        if realtime {
            self.arena[id].cumul += len;
        }

        match self.arena[id].queue.front().map(|next| next.len() as u64) {
            Some(next_len) => {
                if self.arena[id].rsc.is_some() {
                    if realtime {
                        self.update_ed(id, next_len);
                    } else {
                        self.update_d(id, next_len);
                    }
                }
            }
            None => self.set_passive(id),
        }
        self.update_vt(id, len);

        trace!(class = ?id, len, realtime, "dequeue");
        Some(packet)
    }

    /// Drop every queued packet in every class.
    pub fn purge(&mut self) {
        for id in self.arena.ids() {
            self.purge_class(id);
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            classes: self.arena.len(),
            backlog: self.backlog,
            xmit: self.xmit,
            drops: self.drops,
        }
    }

    pub fn class_stats(&self, id: ClassId) -> Result<ClassStats, SchedError> {
        let class = self.arena.get(id).ok_or(SchedError::UnknownClass)?;
        Ok(ClassStats {
            realtime: class.rsc.map(|isc| isc.to_service_curve(self.frequency)),
            linkshare: class.fsc.map(|isc| isc.to_service_curve(self.frequency)),
            total: class.total,
            cumul: class.cumul,
            eligible: class.e,
            deadline: class.d,
            virtual_time: class.vt,
            queue_length: class.queue.len(),
            queue_limit: class.queue.limit(),
            xmit: class.xmit,
            drops: class.drops,
            period: class.period,
            vt_period: class.vt_period,
            parent_period: class.parent_period,
            active_count: class.active_count,
        })
    }

    fn convert(&self, sc: Option<ServiceCurve>) -> Option<InternalCurve> {
        match sc {
            Some(sc) if !sc.is_zero() => Some(InternalCurve::convert(&sc, self.frequency)),
            _ => None,
        }
    }

    /// Two-criteria selection: a due real-time deadline wins outright,
    /// otherwise descend the tree along smallest virtual times.
    fn select(&self, now: u64) -> Option<(ClassId, bool)> {
        if let Some(id) = self.eligible.min_deadline_due(&self.arena, now) {
            return Some((id, true));
        }
        let mut cl = self.root;
        while !self.arena[cl].is_leaf() {
            cl = self.arena[cl].act_list.head()?;
        }
        Some((cl, false))
    }

    /// A leaf went from empty to backlogged.
    fn set_active(&mut self, id: ClassId, len: u64) {
        if self.arena[id].rsc.is_some() {
            let now = self.clock.now();
            self.init_ed(id, len, now);
        }
        if self.arena[id].fsc.is_some() {
            self.init_vt(id);
        }
        self.arena[id].period += 1;
    }

    /// A leaf drained its last packet.
    fn set_passive(&mut self, id: ClassId) {
        if self.arena[id].rsc.is_some() {
            self.eligible.remove::<ByEligible>(&mut self.arena, id);
        }
        if self.arena[id].fsc.is_none() {
            return;
        }
        let mut cl = id;
        loop {
            let Some(parent) = self.arena[cl].parent else {
                break;
            };
            // Guard against a class that is already passive.
            if self.arena[cl].active_count == 0 {
                break;
            }
            self.arena[cl].active_count -= 1;
            if self.arena[cl].active_count > 0 {
                break;
            }
            let mut act = self.arena[parent].act_list;
            act.remove::<ByVirtual>(&mut self.arena, cl);
            self.arena[parent].act_list = act;
            cl = parent;
        }
    }

    /// Fold the real-time curves forward to the new backlog period and
    /// compute the head packet's eligible time and deadline.
    fn init_ed(&mut self, id: ClassId, next_len: u64, now: u64) {
        {
            let class = &mut self.arena[id];
            let Some(rsc) = class.rsc else { return };
            class.deadline.min_with(&rsc, now, class.cumul);

            // The eligible curve follows the deadline curve, except that a
            // convex curve owes nothing ahead of schedule: eligibility then
            // tracks the second slope alone.
            class.eligible = class.deadline;
            if rsc.is_convex() {
                class.eligible.drop_first_segment();
            }

            class.e = class.eligible.y2x(class.cumul);
            class.d = class.deadline.y2x(class.cumul + next_len);
        }
        self.eligible.insert::<ByEligible>(&mut self.arena, id);
    }

    /// Recompute eligible time and deadline after a real-time send.
    fn update_ed(&mut self, id: ClassId, next_len: u64) {
        {
            let class = &mut self.arena[id];
            class.e = class.eligible.y2x(class.cumul);
            class.d = class.deadline.y2x(class.cumul + next_len);
        }
        self.eligible.reposition::<ByEligible>(&mut self.arena, id);
    }

    /// A link-sharing send leaves the eligible time alone; only the
    /// deadline tracks the head packet.
    fn update_d(&mut self, id: ClassId, next_len: u64) {
        let class = &mut self.arena[id];
        class.d = class.deadline.y2x(class.cumul + next_len);
    }

    /// Walk from a freshly active leaf to the root, activating every idle
    /// ancestor and seeding virtual times among the already active
    /// siblings.
    fn init_vt(&mut self, id: ClassId) {
        let mut cl = id;
        loop {
            let Some(parent) = self.arena[cl].parent else {
                break;
            };

            // Stop once the walk reaches a subtree that is already active.
            let was_active = self.arena[cl].active_count;
            self.arena[cl].active_count += 1;
            if was_active > 0 {
                break;
            }

            let parent_idle = self.arena[parent].active_count == 0;
            let parent_vt_period = self.arena[parent].vt_period;

            {
                let class = &mut self.arena[cl];
                // A parent gone idle starts a fresh virtual-time scale, as
                // does a new backlog period of the parent.
                if parent_idle || class.parent_period != parent_vt_period {
                    class.vt = 0;
                    if let Some(fsc) = class.fsc {
                        class.vt_curve = RuntimeCurve::anchored(fsc, 0, class.total);
                    }
                }
            }

            // Seed vt midway between the slowest and fastest active
            // siblings. Within the same parent period vt never moves
            // backwards.
            if let (Some(min_id), Some(max_id)) = (
                self.arena[parent].act_list.head(),
                self.arena[parent].act_list.tail(),
            ) {
                let seed =
                    ((self.arena[min_id].vt as u128 + self.arena[max_id].vt as u128) / 2) as u64;
                let class = &mut self.arena[cl];
                if class.parent_period != parent_vt_period || seed > class.vt {
                    class.vt = seed;
                }
            }

            {
                let class = &mut self.arena[cl];
                if let Some(fsc) = class.fsc {
                    class.vt_curve.min_with(&fsc, class.vt, class.total);
                }
                class.vt_period += 1;
                class.parent_period = parent_vt_period;
                if parent_idle {
                    // The parent is about to open a new period of its own.
                    class.parent_period += 1;
                }
            }

            let mut act = self.arena[parent].act_list;
            act.insert::<ByVirtual>(&mut self.arena, cl);
            self.arena[parent].act_list = act;

            cl = parent;
        }
    }

    /// Charge a send to the link-sharing ledger of the leaf and all its
    /// ancestors, advancing virtual times.
    fn update_vt(&mut self, id: ClassId, len: u64) {
        let mut cl = id;
        loop {
            let Some(parent) = self.arena[cl].parent else {
                break;
            };
            {
                let class = &mut self.arena[cl];
                class.total += len;
                if class.fsc.is_some() {
                    class.vt = class.vt_curve.y2x(class.total);
                }
            }
            // A class that just went passive is off its parent's list and
            // keeps its vt for the next activation.
            if self.arena[cl].fsc.is_some() && self.arena[cl].act_link.linked {
                let mut act = self.arena[parent].act_list;
                act.reposition::<ByVirtual>(&mut self.arena, cl);
                self.arena[parent].act_list = act;
            }
            cl = parent;
        }
    }

    /// Drop a class's whole queue, counting the loss against it.
    fn purge_class(&mut self, id: ClassId) {
        let (packets, bytes) = self.arena[id].queue.purge();
        if packets == 0 {
            return;
        }
        {
            let class = &mut self.arena[id];
            class.drops.packets += packets;
            class.drops.bytes += bytes;
        }
        self.drops.packets += packets;
        self.drops.bytes += bytes;
        self.backlog -= packets;
        self.set_passive(id);
        if self.polled == Some(id) {
            self.polled = None;
        }
        debug!(class = ?id, packets, bytes, "queue purged");
    }
}

impl std::fmt::Debug for HfscScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfscScheduler")
            .field("link_bps", &self.link_bps)
            .field("classes", &self.arena.len())
            .field("backlog", &self.backlog)
            .finish()
    }
}
