// Core data types for the render device registry
//
// Device identity, the "follow the OS default" sentinel, topology events
// delivered by platform providers, and the immutable snapshots the
// registry publishes to readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::devices::DeviceError;

/// Id of the synthetic "follow the OS default" device
pub const DEFAULT_DEVICE_ID: &str = "0";

/// Display name of the synthetic "follow the OS default" device
pub const DEFAULT_DEVICE_NAME: &str = "Default";

/// A render device as reported by the platform provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Stable, platform-assigned identifier
    pub id: String,
    /// Human-readable name; may collide across devices
    pub name: String,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The sentinel that always occupies slot zero of the device list
    pub fn default_device() -> Self {
        Self::new(DEFAULT_DEVICE_ID, DEFAULT_DEVICE_NAME)
    }

    pub fn is_default_sentinel(&self) -> bool {
        self.id == DEFAULT_DEVICE_ID
    }
}

/// Direction of an audio endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFlow {
    Render,
    Capture,
    All,
}

/// Role the OS default was changed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Console,
    Multimedia,
    Communications,
}

/// Endpoint state reported with a state-change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Active,
    Disabled,
    NotPresent,
    Unplugged,
}

/// Opaque property identifier carried by property-change notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyKey {
    pub format_id: String,
    pub property_id: u32,
}

impl PropertyKey {
    pub fn new(format_id: impl Into<String>, property_id: u32) -> Self {
        Self {
            format_id: format_id.into(),
            property_id,
        }
    }
}

/// Topology notifications delivered by a device provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyEvent {
    DeviceAdded {
        device_id: String,
    },
    DeviceRemoved {
        device_id: String,
    },
    DeviceStateChanged {
        device_id: String,
        new_state: DeviceState,
    },
    DefaultDeviceChanged {
        flow: DataFlow,
        role: Role,
        /// None when the OS no longer has a default for this flow/role
        device_id: Option<String>,
    },
    PropertyChanged {
        device_id: String,
        key: PropertyKey,
    },
}

impl TopologyEvent {
    /// Whether this event can change the set of devices or the OS default
    pub fn affects_topology(&self) -> bool {
        !matches!(self, TopologyEvent::PropertyChanged { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TopologyEvent::DeviceAdded { .. } => "device_added",
            TopologyEvent::DeviceRemoved { .. } => "device_removed",
            TopologyEvent::DeviceStateChanged { .. } => "device_state_changed",
            TopologyEvent::DefaultDeviceChanged { .. } => "default_device_changed",
            TopologyEvent::PropertyChanged { .. } => "property_changed",
        }
    }
}

/// Immutable view of the registry produced by one completed refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    /// Sentinel first, then provider enumeration order
    pub devices: Vec<Device>,
    /// The OS-reported default device (or the sentinel when unknown)
    pub current: Device,
    /// Incremented on every published snapshot
    pub generation: u64,
    pub refreshed_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Snapshot holding only the sentinel, used before initialization
    pub fn sentinel_only() -> Self {
        Self {
            devices: vec![Device::default_device()],
            current: Device::default_device(),
            generation: 0,
            refreshed_at: Utc::now(),
        }
    }

    /// Snapshot published once the registry has entered the failed state
    pub fn unavailable(generation: u64) -> Self {
        Self {
            devices: Vec::new(),
            current: Device::default_device(),
            generation,
            refreshed_at: Utc::now(),
        }
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name.clone()).collect()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.devices.iter().any(|d| d.name == name)
    }
}

/// Change notifications broadcast to interested clients
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Initialized(Arc<RegistrySnapshot>),
    Refreshed(Arc<RegistrySnapshot>),
    /// A refresh failed; the previous snapshot is retained
    RefreshFailed(DeviceError),
    /// Initialization failed; the registry is terminally unavailable
    Unavailable(DeviceError),
}

/// Result of a single `DeviceRegistry::refresh` call
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new snapshot was published
    Refreshed { generation: u64, device_count: usize },
    /// Enumeration failed; the previous snapshot is still current
    Retained(DeviceError),
    /// Registry is not ready (uninitialized or failed); nothing was done
    Skipped,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

/// Refresh bookkeeping exposed for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub refreshes: u64,
    pub failed_refreshes: u64,
    pub events_handled: u64,
    pub events_ignored: u64,
    pub consumers_reset: u64,
    pub last_error: Option<String>,
}
