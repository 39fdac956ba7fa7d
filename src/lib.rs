pub mod classifier;
pub mod clock;
pub mod config;
pub mod curve;
pub mod error;
pub mod packet;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod stats;

mod class;
mod lists;

// Re-export the types a user of the scheduler touches every day.
pub use class::{ClassId, ClassOpts, MAX_CLASSES};
pub use classifier::FlowClassifier;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ClassSpec, InterfaceConfig};
pub use curve::ServiceCurve;
pub use error::{ConfigError, SchedError};
pub use packet::Packet;
pub use queue::DEFAULT_QLIMIT;
pub use registry::{Interface, SchedulerRegistry, ROOT_CLASS};
pub use scheduler::HfscScheduler;
pub use stats::{ClassStats, PacketCounter, SchedulerStats};
