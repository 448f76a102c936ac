// Scriptable in-memory device provider.
//
// Stands in for a platform audio subsystem in tests and headless
// embeddings: the device list, OS default and failure modes are set by
// hand, and topology events are delivered synchronously on the calling
// thread, the way a platform invokes its callback thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use uuid::Uuid;

use super::provider::{DeviceProvider, Subscription, TopologyEventSink};
use crate::audio::types::{DataFlow, Device, Role, TopologyEvent};

#[derive(Default)]
struct ProviderState {
    devices: Vec<Device>,
    default_id: Option<String>,
    enumeration_failure: Option<String>,
    default_failure: Option<String>,
    backend_failure: Option<String>,
    subscribe_failure: Option<String>,
}

type SinkMap = HashMap<Uuid, Arc<dyn TopologyEventSink>>;

/// Scriptable provider; events reach subscribers on the calling thread.
///
/// ```
/// use std::sync::Arc;
/// use audio_device_registry::{Device, DeviceRegistry, InMemoryProvider, RegistryConfig};
///
/// let provider = Arc::new(InMemoryProvider::with_devices(
///     vec![Device::new("a", "Speakers (A)"), Device::new("b", "Headset (B)")],
///     Some("a"),
/// ));
/// let registry = DeviceRegistry::new(provider.clone(), RegistryConfig::default());
/// registry.initialize().unwrap();
///
/// provider.unplug("a");
/// assert_eq!(registry.device_names(), ["Default", "Headset (B)"]);
/// ```
#[derive(Default)]
pub struct InMemoryProvider {
    state: Mutex<ProviderState>,
    sinks: Arc<Mutex<SinkMap>>,
    enumeration_calls: AtomicU64,
}

impl InMemoryProvider {
    /// A provider with no devices and no default
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>, default_id: Option<&str>) -> Self {
        let provider = Self::new();
        {
            let mut state = provider.state.lock();
            state.devices = devices;
            state.default_id = default_id.map(str::to_string);
        }
        provider
    }

    // === Silent state changes (no notification) ===

    pub fn set_devices(&self, devices: Vec<Device>) {
        self.state.lock().devices = devices;
    }

    pub fn set_default(&self, device_id: Option<&str>) {
        self.state.lock().default_id = device_id.map(str::to_string);
    }

    /// Make enumeration fail with `message` until cleared with None
    pub fn set_enumeration_failure(&self, message: Option<&str>) {
        self.state.lock().enumeration_failure = message.map(str::to_string);
    }

    pub fn set_default_failure(&self, message: Option<&str>) {
        self.state.lock().default_failure = message.map(str::to_string);
    }

    pub fn set_backend_failure(&self, message: Option<&str>) {
        self.state.lock().backend_failure = message.map(str::to_string);
    }

    pub fn set_subscribe_failure(&self, message: Option<&str>) {
        self.state.lock().subscribe_failure = message.map(str::to_string);
    }

    // === State changes that notify subscribers ===

    /// Add a device and announce it
    pub fn plug(&self, device: Device) {
        let device_id = device.id.clone();
        self.state.lock().devices.push(device);
        self.emit(TopologyEvent::DeviceAdded { device_id });
    }

    /// Remove a device and announce it. If it was the OS default, the first
    /// remaining device becomes the default (none if the list is empty) and
    /// that change is announced too.
    pub fn unplug(&self, device_id: &str) -> bool {
        let (removed, new_default) = {
            let mut state = self.state.lock();
            let before = state.devices.len();
            state.devices.retain(|d| d.id != device_id);
            let removed = state.devices.len() != before;

            let mut new_default = None;
            if removed && state.default_id.as_deref() == Some(device_id) {
                state.default_id = state.devices.first().map(|d| d.id.clone());
                new_default = Some(state.default_id.clone());
            }
            (removed, new_default)
        };

        if removed {
            self.emit(TopologyEvent::DeviceRemoved {
                device_id: device_id.to_string(),
            });
        }
        if let Some(default_id) = new_default {
            self.emit(TopologyEvent::DefaultDeviceChanged {
                flow: DataFlow::Render,
                role: Role::Multimedia,
                device_id: default_id,
            });
        }
        removed
    }

    /// Change the OS default and announce it
    pub fn make_default(&self, device_id: &str) {
        self.set_default(Some(device_id));
        self.emit(TopologyEvent::DefaultDeviceChanged {
            flow: DataFlow::Render,
            role: Role::Multimedia,
            device_id: Some(device_id.to_string()),
        });
    }

    /// Deliver `event` to every subscriber on the current thread
    pub fn emit(&self, event: TopologyEvent) {
        let sinks: Vec<_> = self.sinks.lock().values().cloned().collect();
        for sink in sinks {
            sink.handle_topology_event(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Number of device enumerations served so far
    pub fn enumeration_calls(&self) -> u64 {
        self.enumeration_calls.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for InMemoryProvider {
    fn enumerate_active_render_devices(&self) -> Result<Vec<Device>> {
        self.enumeration_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        match &state.enumeration_failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(state.devices.clone()),
        }
    }

    fn default_render_device(&self) -> Result<Option<Device>> {
        let state = self.state.lock();
        if let Some(message) = &state.default_failure {
            return Err(anyhow!("{}", message));
        }
        Ok(state
            .default_id
            .as_ref()
            .and_then(|id| state.devices.iter().find(|d| &d.id == id).cloned()))
    }

    fn probe_backend(&self) -> Result<()> {
        match &self.state.lock().backend_failure {
            Some(message) => Err(anyhow!("{}", message)),
            None => Ok(()),
        }
    }

    fn subscribe(&self, sink: Arc<dyn TopologyEventSink>) -> Result<Subscription> {
        if let Some(message) = &self.state.lock().subscribe_failure {
            return Err(anyhow!("{}", message));
        }

        let id = Uuid::new_v4();
        self.sinks.lock().insert(id, sink);

        let sinks = Arc::downgrade(&self.sinks);
        Ok(Subscription::new(id, move || {
            if let Some(sinks) = sinks.upgrade() {
                sinks.lock().remove(&id);
            }
        }))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
