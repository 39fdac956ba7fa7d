//! Class table and per-class scheduling state.
//!
//! Classes live in a slot arena addressed by generational handles, so a
//! destroyed class invalidates every handle that pointed at it instead of
//! silently aliasing whatever reuses the slot. The intrusive list links are
//! stored here; the list operations themselves live in [`crate::lists`].

use crate::curve::{InternalCurve, RuntimeCurve, ServiceCurve};
use crate::lists::{ListLink, OrderedList};
use crate::queue::ClassQueue;
use crate::stats::PacketCounter;
use std::ops::{Index, IndexMut};

/// Upper bound on classes per scheduler instance, root included.
pub const MAX_CLASSES: usize = 64;

/// Stable handle to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    pub(crate) slot: u16,
    pub(crate) gen: u16,
}

/// Parameters for creating or modifying a class.
///
/// On create, `None` and an all-zero curve both leave that criterion
/// unconfigured: no real-time guarantee, or no share of excess bandwidth.
/// On modify, `None` keeps the current curve while an all-zero one removes
/// it. `qlimit` of `None` keeps the default limit on create and the
/// current one on modify.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassOpts {
    pub realtime: Option<ServiceCurve>,
    pub linkshare: Option<ServiceCurve>,
    pub qlimit: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct Class {
    pub id: ClassId,
    pub parent: Option<ClassId>,
    /// Children currently attached, active or not.
    pub children: u32,

    pub rsc: Option<InternalCurve>,
    pub fsc: Option<InternalCurve>,

    /// Runtime curve answering "when may the head packet start".
    pub eligible: RuntimeCurve,
    /// Runtime curve answering "when must the head packet be done".
    pub deadline: RuntimeCurve,
    /// Runtime curve mapping subtree bytes to virtual time.
    pub vt_curve: RuntimeCurve,

    /// Bytes sent by this class or its descendants, the link-sharing ledger.
    pub total: u64,
    /// Bytes this leaf has sent under the real-time criterion.
    pub cumul: u64,
    pub e: u64,
    pub d: u64,
    pub vt: u64,

    /// Backlogged periods this class has been through.
    pub period: u32,
    pub vt_period: u32,
    /// Parent's `vt_period` the last time this class went active.
    pub parent_period: u32,
    /// Activations outstanding in this subtree; 0 or 1 for a leaf.
    pub active_count: u32,

    /// This class's active children, ordered by virtual time.
    pub act_list: OrderedList,
    /// Link in the parent's active list.
    pub act_link: ListLink,
    /// Link in the scheduler's eligible list.
    pub el_link: ListLink,

    pub queue: ClassQueue,
    pub xmit: PacketCounter,
    pub drops: PacketCounter,
}

impl Class {
    pub fn new(
        id: ClassId,
        parent: Option<ClassId>,
        rsc: Option<InternalCurve>,
        fsc: Option<InternalCurve>,
        qlimit: usize,
    ) -> Class {
        // Runtime curves start as the configured curve anchored at the
        // origin; the first activation folds the anchor forward from there.
        let deadline = rsc
            .map(|isc| RuntimeCurve::anchored(isc, 0, 0))
            .unwrap_or_else(RuntimeCurve::flat);
        let vt_curve = fsc
            .map(|isc| RuntimeCurve::anchored(isc, 0, 0))
            .unwrap_or_else(RuntimeCurve::flat);
        Class {
            id,
            parent,
            children: 0,
            rsc,
            fsc,
            eligible: deadline,
            deadline,
            vt_curve,
            total: 0,
            cumul: 0,
            e: 0,
            d: 0,
            vt: 0,
            period: 0,
            vt_period: 0,
            parent_period: 0,
            active_count: 0,
            act_list: OrderedList::default(),
            act_link: ListLink::default(),
            el_link: ListLink::default(),
            queue: ClassQueue::new(qlimit),
            xmit: PacketCounter::default(),
            drops: PacketCounter::default(),
        }
    }

    /// Only leaves carry traffic; interior classes exist to shape their
    /// children's shares.
    pub fn is_leaf(&self) -> bool {
        self.children == 0
    }

    pub fn has_backlog(&self) -> bool {
        !self.queue.is_empty()
    }
}

/// Slot arena holding every class of one scheduler instance.
#[derive(Debug, Default)]
pub(crate) struct ClassArena {
    slots: Vec<Option<Class>>,
    gens: Vec<u16>,
    free: Vec<u16>,
    live: usize,
}

impl ClassArena {
    pub fn new() -> ClassArena {
        ClassArena {
            slots: Vec::with_capacity(MAX_CLASSES),
            gens: Vec::with_capacity(MAX_CLASSES),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Live classes, not allocated slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn insert(&mut self, build: impl FnOnce(ClassId) -> Class) -> ClassId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(None);
                self.gens.push(0);
                (self.slots.len() - 1) as u16
            }
        };
        let id = ClassId {
            slot,
            gen: self.gens[slot as usize],
        };
        self.slots[slot as usize] = Some(build(id));
        self.live += 1;
        id
    }

    /// Take a class out, retiring its generation so stale handles miss.
    pub fn remove(&mut self, id: ClassId) -> Option<Class> {
        if !self.contains(id) {
            return None;
        }
        let slot = id.slot as usize;
        let class = self.slots[slot].take();
        if class.is_some() {
            self.gens[slot] = self.gens[slot].wrapping_add(1);
            self.free.push(id.slot);
            self.live -= 1;
        }
        class
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.gens.get(id.slot as usize) == Some(&id.gen)
            && self.slots[id.slot as usize].is_some()
    }

    pub fn get(&self, id: ClassId) -> Option<&Class> {
        if self.gens.get(id.slot as usize) != Some(&id.gen) {
            return None;
        }
        self.slots[id.slot as usize].as_ref()
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut Class> {
        if self.gens.get(id.slot as usize) != Some(&id.gen) {
            return None;
        }
        self.slots[id.slot as usize].as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Handles of all live classes, for walks that mutate as they go.
    pub fn ids(&self) -> Vec<ClassId> {
        self.iter().map(|class| class.id).collect()
    }
}

impl Index<ClassId> for ClassArena {
    type Output = Class;

    fn index(&self, id: ClassId) -> &Class {
        self.get(id).expect("linked class slot must be live")
    }
}

impl IndexMut<ClassId> for ClassArena {
    fn index_mut(&mut self, id: ClassId) -> &mut Class {
        self.get_mut(id).expect("linked class slot must be live")
    }
}
