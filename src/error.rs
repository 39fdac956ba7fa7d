//! Error types shared by the scheduler and its configuration layer.

use thiserror::Error;

/// Errors returned by scheduler operations.
///
/// `QueueFull` and `NotLeaf` are counted as drops on the target class;
/// every variant leaves the scheduler fully usable and rejects the
/// operation without any other state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedError {
    /// The class table reached its fixed capacity.
    #[error("class table is full")]
    OutOfMemory,
    /// The class still has children, or is the root class.
    #[error("class is busy")]
    Busy,
    /// The class queue is at its packet limit; the packet was dropped.
    #[error("class queue is full")]
    QueueFull,
    /// Packets can only be queued to leaf classes; the packet was dropped.
    #[error("class has children")]
    NotLeaf,
    /// The id does not name a live class of this scheduler.
    #[error("unknown class")]
    UnknownClass,
}

/// Errors produced while applying an interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("duplicate class name {0:?}")]
    DuplicateClass(String),
    #[error("unknown parent class {0:?}")]
    UnknownParent(String),
    #[error("interface {0:?} is already attached")]
    AlreadyAttached(String),
    #[error("interface {0:?} is not attached")]
    UnknownInterface(String),
    #[error("configuration does not parse: {0}")]
    Parse(String),
    #[error("scheduler rejected the configuration: {0}")]
    Sched(#[from] SchedError),
}
