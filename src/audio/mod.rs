// Audio module - render device registry for audio-consuming clients
//
// - types: Device identity, topology events, registry snapshots
// - devices: Registry, providers, notifications and consumer bindings

pub mod types;
pub mod devices;

// Re-export commonly used types for easier imports
pub use types::{
    DataFlow, Device, DeviceState, PropertyKey, RefreshOutcome, RefreshStats, RegistryEvent,
    RegistrySnapshot, Role, TopologyEvent, DEFAULT_DEVICE_ID, DEFAULT_DEVICE_NAME,
};

pub use devices::{
    bootstrap, Bootstrap, ConsumerBinding, ConsumerId, DeviceError, DeviceProvider,
    DeviceRegistry, InMemoryProvider, InitState, InitializationGuard, NotificationListener,
    PollingWatcher, SelectedDevice, Subscription, TopologyEventSink,
};

#[cfg(feature = "cpal-provider")]
pub use devices::CpalProvider;
