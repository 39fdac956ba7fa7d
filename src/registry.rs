//! Attached interfaces and their schedulers.
//!
//! The registry is the process-wide table mapping interface names to
//! running scheduler instances, the way a kernel would key its disciplines
//! by device. Each interface bundles the scheduler with its classifier and
//! the class-name table built from the configuration.

use crate::class::{ClassId, ClassOpts};
use crate::classifier::FlowClassifier;
use crate::clock::Clock;
use crate::config::InterfaceConfig;
use crate::error::{ConfigError, SchedError};
use crate::packet::Packet;
use crate::scheduler::HfscScheduler;
use crate::stats::SchedulerStats;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Name the implicit root class answers to in configurations.
pub const ROOT_CLASS: &str = "root";

/// One attached interface.
pub struct Interface {
    pub scheduler: HfscScheduler,
    pub classifier: FlowClassifier,
    /// Class handles by configured name, `"root"` included.
    pub classes: HashMap<String, ClassId>,
}

impl Interface {
    /// Build a scheduler, classifier and name table from a configuration.
    pub fn from_config(
        config: &InterfaceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Interface, ConfigError> {
        let mut scheduler = HfscScheduler::new(config.bandwidth, clock);
        let mut classifier = FlowClassifier::new();
        let mut classes = HashMap::new();
        classes.insert(ROOT_CLASS.to_string(), scheduler.root());

        for spec in &config.classes {
            if classes.contains_key(&spec.name) {
                return Err(ConfigError::DuplicateClass(spec.name.clone()));
            }
            let parent = match &spec.parent {
                None => scheduler.root(),
                Some(name) => *classes
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownParent(name.clone()))?,
            };
            let id = scheduler.create_class(
                parent,
                ClassOpts {
                    realtime: spec.realtime,
                    linkshare: spec.linkshare,
                    qlimit: spec.qlimit,
                },
            )?;
            for &flow in &spec.flows {
                classifier.bind(flow, id);
            }
            if spec.default {
                classifier.set_default(Some(id));
            }
            classes.insert(spec.name.clone(), id);
        }

        Ok(Interface {
            scheduler,
            classifier,
            classes,
        })
    }

    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.classes.get(name).copied()
    }

    /// Classify and queue a packet in one step.
    pub fn enqueue_packet(&mut self, packet: Packet) -> Result<(), SchedError> {
        let class = self
            .classifier
            .classify(&packet)
            .ok_or(SchedError::UnknownClass)?;
        self.scheduler.enqueue(class, packet)
    }

    /// Destroy a class by name, dropping its classifier rules with it.
    pub fn destroy_class(&mut self, name: &str) -> Result<(), SchedError> {
        let id = self.class_id(name).ok_or(SchedError::UnknownClass)?;
        self.scheduler.destroy_class(id)?;
        self.classifier.forget_class(id);
        self.classes.remove(name);
        Ok(())
    }
}

/// Process-wide table of attached interfaces.
pub struct SchedulerRegistry {
    clock: Arc<dyn Clock>,
    interfaces: Mutex<HashMap<String, Arc<Mutex<Interface>>>>,
}

impl SchedulerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> SchedulerRegistry {
        SchedulerRegistry {
            clock,
            interfaces: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a configured interface and hand back its running instance.
    pub fn attach(&self, config: &InterfaceConfig) -> Result<Arc<Mutex<Interface>>, ConfigError> {
        let mut interfaces = self.interfaces.lock();
        if interfaces.contains_key(&config.interface) {
            return Err(ConfigError::AlreadyAttached(config.interface.clone()));
        }
        let interface = Arc::new(Mutex::new(Interface::from_config(
            config,
            self.clock.clone(),
        )?));
        interfaces.insert(config.interface.clone(), interface.clone());
        info!(interface = %config.interface, bandwidth = config.bandwidth, "interface attached");
        Ok(interface)
    }

    /// Detach an interface, dropping whatever it still has queued.
    pub fn detach(&self, name: &str) -> Result<(), ConfigError> {
        let removed = self.interfaces.lock().remove(name);
        let Some(interface) = removed else {
            return Err(ConfigError::UnknownInterface(name.to_string()));
        };
        interface.lock().scheduler.purge();
        info!(interface = %name, "interface detached");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<Interface>>> {
        self.interfaces.lock().get(name).cloned()
    }

    pub fn interfaces(&self) -> Vec<String> {
        self.interfaces.lock().keys().cloned().collect()
    }

    /// Scheduler counters of every attached interface.
    pub fn stats(&self) -> HashMap<String, SchedulerStats> {
        self.interfaces
            .lock()
            .iter()
            .map(|(name, iface)| (name.clone(), iface.lock().scheduler.stats()))
            .collect()
    }
}
