//! Intrusive ordered lists threaded through the class arena.
//!
//! The scheduler keeps one eligible list ordered by eligible time and, per
//! parent, a list of active children ordered by virtual time. Both are
//! doubly linked through fields stored in the classes themselves, so a
//! class moves between positions without allocation. Keys only ever grow
//! while an entry is linked, which is what makes the short reposition scan
//! correct.

use crate::class::{Class, ClassArena, ClassId};

/// A class's links within one list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ListLink {
    pub prev: Option<ClassId>,
    pub next: Option<ClassId>,
    pub linked: bool,
}

/// Head and tail of one ordered list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct OrderedList {
    head: Option<ClassId>,
    tail: Option<ClassId>,
}

/// Selects which key and which link fields an operation works on.
pub(crate) trait ListOrder {
    fn key(class: &Class) -> u64;
    fn link(class: &Class) -> &ListLink;
    fn link_mut(class: &mut Class) -> &mut ListLink;
}

/// Eligible-time order, for the scheduler-wide eligible list.
pub(crate) enum ByEligible {}

impl ListOrder for ByEligible {
    fn key(class: &Class) -> u64 {
        class.e
    }
    fn link(class: &Class) -> &ListLink {
        &class.el_link
    }
    fn link_mut(class: &mut Class) -> &mut ListLink {
        &mut class.el_link
    }
}

/// Virtual-time order, for each parent's active-children list.
pub(crate) enum ByVirtual {}

impl ListOrder for ByVirtual {
    fn key(class: &Class) -> u64 {
        class.vt
    }
    fn link(class: &Class) -> &ListLink {
        &class.act_link
    }
    fn link_mut(class: &mut Class) -> &mut ListLink {
        &mut class.act_link
    }
}

impl OrderedList {
    pub fn head(&self) -> Option<ClassId> {
        self.head
    }

    pub fn tail(&self) -> Option<ClassId> {
        self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert keeping ascending key order; equal keys stay behind the
    /// entries already present, so ties serve in arrival order.
    pub fn insert<O: ListOrder>(&mut self, arena: &mut ClassArena, id: ClassId) {
        let key = O::key(&arena[id]);

        // Keys mostly grow over time, so appending is the common case.
        if self.tail.map_or(true, |tail| O::key(&arena[tail]) <= key) {
            self.link_last::<O>(arena, id);
            return;
        }

        let mut cursor = self.head;
        while let Some(cur) = cursor {
            if O::key(&arena[cur]) > key {
                self.link_before::<O>(arena, id, cur);
                return;
            }
            cursor = O::link(&arena[cur]).next;
        }
        self.link_last::<O>(arena, id);
    }

    /// Unlink an entry; a no-op when it is not linked.
    pub fn remove<O: ListOrder>(&mut self, arena: &mut ClassArena, id: ClassId) {
        let ListLink { prev, next, linked } = *O::link(&arena[id]);
        if !linked {
            return;
        }
        match prev {
            Some(p) => O::link_mut(&mut arena[p]).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => O::link_mut(&mut arena[n]).prev = prev,
            None => self.tail = prev,
        }
        *O::link_mut(&mut arena[id]) = ListLink::default();
    }

    /// Restore order after an entry's key grew. When the follower is not
    /// smaller the entry is already in place; otherwise it moves tailward,
    /// landing after any entries with the same key.
    pub fn reposition<O: ListOrder>(&mut self, arena: &mut ClassArena, id: ClassId) {
        let key = O::key(&arena[id]);
        let Some(next) = O::link(&arena[id]).next else {
            return;
        };
        if key <= O::key(&arena[next]) {
            return;
        }

        self.remove::<O>(arena, id);
        // Everything before the old successor is already smaller; scan
        // from there.
        let mut cursor = Some(next);
        while let Some(cur) = cursor {
            if O::key(&arena[cur]) > key {
                self.link_before::<O>(arena, id, cur);
                return;
            }
            cursor = O::link(&arena[cur]).next;
        }
        self.link_last::<O>(arena, id);
    }

    /// Earliest-deadline class among those whose eligible time has come.
    ///
    /// The list is ordered by eligible time, so the due entries form a
    /// prefix. The first class seen wins deadline ties.
    pub fn min_deadline_due(&self, arena: &ClassArena, now: u64) -> Option<ClassId> {
        let mut best: Option<ClassId> = None;
        let mut cursor = self.head;
        while let Some(cur) = cursor {
            let class = &arena[cur];
            if class.e > now {
                break;
            }
            if best.map_or(true, |b| class.d < arena[b].d) {
                best = Some(cur);
            }
            cursor = class.el_link.next;
        }
        best
    }

    fn link_last<O: ListOrder>(&mut self, arena: &mut ClassArena, id: ClassId) {
        let prev = self.tail;
        if let Some(tail) = prev {
            O::link_mut(&mut arena[tail]).next = Some(id);
        } else {
            self.head = Some(id);
        }
        *O::link_mut(&mut arena[id]) = ListLink {
            prev,
            next: None,
            linked: true,
        };
        self.tail = Some(id);
    }

    fn link_before<O: ListOrder>(
        &mut self,
        arena: &mut ClassArena,
        id: ClassId,
        before: ClassId,
    ) {
        let prev = O::link(&arena[before]).prev;
        O::link_mut(&mut arena[before]).prev = Some(id);
        match prev {
            Some(p) => O::link_mut(&mut arena[p]).next = Some(id),
            None => self.head = Some(id),
        }
        *O::link_mut(&mut arena[id]) = ListLink {
            prev,
            next: Some(before),
            linked: true,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::queue::DEFAULT_QLIMIT;

    fn class_with(arena: &mut ClassArena, e: u64, d: u64) -> ClassId {
        let id = arena.insert(|id| Class::new(id, None, None, None, DEFAULT_QLIMIT));
        let class = &mut arena[id];
        class.e = e;
        class.d = d;
        id
    }

    fn order(list: &OrderedList, arena: &ClassArena) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut cursor = list.head();
        while let Some(cur) = cursor {
            out.push(cur);
            cursor = arena[cur].el_link.next;
        }
        out
    }

    #[test]
    fn insert_keeps_ascending_key_order() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let b = class_with(&mut arena, 20, 0);
        let a = class_with(&mut arena, 10, 0);
        let c = class_with(&mut arena, 30, 0);
        list.insert::<ByEligible>(&mut arena, b);
        list.insert::<ByEligible>(&mut arena, a);
        list.insert::<ByEligible>(&mut arena, c);
        assert_eq!(order(&list, &arena), vec![a, b, c]);
    }

    #[test]
    fn equal_keys_serve_in_arrival_order() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let first = class_with(&mut arena, 10, 0);
        let second = class_with(&mut arena, 10, 0);
        list.insert::<ByEligible>(&mut arena, first);
        list.insert::<ByEligible>(&mut arena, second);
        assert_eq!(order(&list, &arena), vec![first, second]);
    }

    #[test]
    fn remove_relinks_head_middle_and_tail() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let ids: Vec<_> = (0..4)
            .map(|i| class_with(&mut arena, i * 10, 0))
            .collect();
        for &id in &ids {
            list.insert::<ByEligible>(&mut arena, id);
        }
        list.remove::<ByEligible>(&mut arena, ids[1]);
        assert_eq!(order(&list, &arena), vec![ids[0], ids[2], ids[3]]);
        list.remove::<ByEligible>(&mut arena, ids[3]);
        assert_eq!(order(&list, &arena), vec![ids[0], ids[2]]);
        list.remove::<ByEligible>(&mut arena, ids[0]);
        assert_eq!(order(&list, &arena), vec![ids[2]]);
        // Removing an unlinked entry changes nothing.
        list.remove::<ByEligible>(&mut arena, ids[0]);
        assert_eq!(order(&list, &arena), vec![ids[2]]);
    }

    #[test]
    fn reposition_moves_only_past_smaller_keys() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let a = class_with(&mut arena, 10, 0);
        let b = class_with(&mut arena, 20, 0);
        let c = class_with(&mut arena, 30, 0);
        for &id in &[a, b, c] {
            list.insert::<ByEligible>(&mut arena, id);
        }

        // Key grows but stays below the follower: no movement.
        arena[a].e = 15;
        list.reposition::<ByEligible>(&mut arena, a);
        assert_eq!(order(&list, &arena), vec![a, b, c]);

        // Key overtakes one entry.
        arena[a].e = 25;
        list.reposition::<ByEligible>(&mut arena, a);
        assert_eq!(order(&list, &arena), vec![b, a, c]);

        // Key matching the follower stays put, keeping service order.
        arena[a].e = 30;
        list.reposition::<ByEligible>(&mut arena, a);
        assert_eq!(order(&list, &arena), vec![b, a, c]);

        // Key past everything moves to the tail.
        arena[b].e = 99;
        list.reposition::<ByEligible>(&mut arena, b);
        assert_eq!(order(&list, &arena), vec![a, c, b]);
    }

    #[test]
    fn min_deadline_scans_only_the_due_prefix() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let a = class_with(&mut arena, 10, 500);
        let b = class_with(&mut arena, 20, 300);
        let c = class_with(&mut arena, 90, 100);
        for &id in &[a, b, c] {
            list.insert::<ByEligible>(&mut arena, id);
        }
        // c has the smallest deadline but is not yet eligible.
        assert_eq!(list.min_deadline_due(&arena, 50), Some(b));
        // Nothing is due before the first eligible time.
        assert_eq!(list.min_deadline_due(&arena, 5), None);
        // Once due, c wins.
        assert_eq!(list.min_deadline_due(&arena, 100), Some(c));
    }

    #[test]
    fn min_deadline_keeps_the_earlier_class_on_ties() {
        let mut arena = ClassArena::new();
        let mut list = OrderedList::default();
        let first = class_with(&mut arena, 10, 400);
        let second = class_with(&mut arena, 20, 400);
        list.insert::<ByEligible>(&mut arena, first);
        list.insert::<ByEligible>(&mut arena, second);
        assert_eq!(list.min_deadline_due(&arena, 50), Some(first));
    }

    #[test]
    fn virtual_order_uses_its_own_links() {
        let mut arena = ClassArena::new();
        let mut act = OrderedList::default();
        let a = class_with(&mut arena, 0, 0);
        let b = class_with(&mut arena, 0, 0);
        arena[a].vt = 70;
        arena[b].vt = 40;
        act.insert::<ByVirtual>(&mut arena, a);
        act.insert::<ByVirtual>(&mut arena, b);
        assert_eq!(act.head(), Some(b));
        // The eligible links stay untouched.
        assert!(!arena[a].el_link.linked);
        assert!(arena[a].act_link.linked);
    }
}
