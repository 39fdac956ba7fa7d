//! Maps packet flows onto leaf classes.
//!
//! Classification is a plain flow-id table with an optional catch-all
//! class. It answers only "which class", never whether that class still
//! exists; the scheduler rejects stale handles on enqueue.

use crate::class::ClassId;
use crate::packet::Packet;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct FlowClassifier {
    rules: HashMap<u64, ClassId>,
    default: Option<ClassId>,
}

impl FlowClassifier {
    pub fn new() -> FlowClassifier {
        FlowClassifier::default()
    }

    /// Route a flow to a class, replacing any earlier rule for it.
    pub fn bind(&mut self, flow_id: u64, class: ClassId) {
        self.rules.insert(flow_id, class);
    }

    pub fn unbind(&mut self, flow_id: u64) -> Option<ClassId> {
        self.rules.remove(&flow_id)
    }

    /// Class receiving flows no rule matches.
    pub fn set_default(&mut self, class: Option<ClassId>) {
        self.default = class;
    }

    pub fn default_class(&self) -> Option<ClassId> {
        self.default
    }

    /// Pick the class for a packet, falling back to the default class.
    pub fn classify(&self, packet: &Packet) -> Option<ClassId> {
        self.rules.get(&packet.flow_id).copied().or(self.default)
    }

    /// Drop every rule pointing at a class, typically because it was
    /// destroyed.
    pub fn forget_class(&mut self, class: ClassId) {
        self.rules.retain(|_, bound| *bound != class);
        if self.default == Some(class) {
            self.default = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.default.is_none()
    }
}
