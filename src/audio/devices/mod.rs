// Audio devices module - Render device registry and hot-plug tracking
//
// This module keeps a consistent view of the host's render devices while
// platform notifications mutate it from foreign threads:
// - error: Device error taxonomy
// - provider: Platform device provider abstraction and subscriptions
// - enumeration: Sentinel-first device list construction
// - device_registry: Device list, current device, lookups and refresh
// - notifications: Topology event dispatch into the registry
// - consumer: Consumer bindings reconciled on every refresh
// - initialization: Startup state machine and bootstrap
// - monitor: Polling watcher for providers without notifications
// - memory_provider: Scriptable in-memory provider
// - cpal_provider: cpal-backed provider (feature "cpal-provider")

pub mod error;
pub mod provider;
pub mod enumeration;
pub mod device_registry;
pub mod notifications;
pub mod consumer;
pub mod initialization;
pub mod monitor;
pub mod memory_provider;

#[cfg(feature = "cpal-provider")]
pub mod cpal_provider;

// Re-export main public API
pub use device_registry::DeviceRegistry;
pub use error::{DeviceError, Result};
pub use provider::{DeviceProvider, Subscription, TopologyEventSink};
pub use notifications::NotificationListener;
pub use consumer::{ConsumerBinding, ConsumerId, SelectedDevice};
pub use initialization::{bootstrap, Bootstrap, InitState, InitializationGuard};
pub use monitor::{diff_topology, PollingWatcher, TopologyView};
pub use memory_provider::InMemoryProvider;

#[cfg(feature = "cpal-provider")]
pub use cpal_provider::CpalProvider;
