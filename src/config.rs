//! Declarative interface configuration.
//!
//! A JSON document names an interface, its link bandwidth, and the class
//! tree with per-class curves and flow bindings. Parsing is plain serde;
//! turning a configuration into a running scheduler happens in
//! [`crate::registry`].

use crate::curve::ServiceCurve;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// One class of the configured tree.
///
/// Classes refer to their parent by name, so a tree is written
/// parents-first. A missing parent means the class sits directly under
/// the root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub realtime: Option<ServiceCurve>,
    #[serde(default)]
    pub linkshare: Option<ServiceCurve>,
    /// Queue limit in packets.
    #[serde(default)]
    pub qlimit: Option<usize>,
    /// Flow ids routed to this class.
    #[serde(default)]
    pub flows: Vec<u64>,
    /// Marks the class that receives unmatched flows.
    #[serde(default)]
    pub default: bool,
}

/// Scheduler configuration for one interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub interface: String,
    /// Link bandwidth in bits per second.
    pub bandwidth: u64,
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
}

impl InterfaceConfig {
    pub fn from_json(text: &str) -> Result<InterfaceConfig, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
