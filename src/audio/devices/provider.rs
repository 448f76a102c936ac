// Platform device provider abstraction
//
// The registry never talks to a platform audio API directly. Whatever
// enumerates render endpoints on the host (WASAPI, CoreAudio, cpal, a test
// double) implements `DeviceProvider`, and delivers hot-plug events to a
// `TopologyEventSink` on whatever thread it likes.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::audio::types::{DataFlow, Device, DeviceState, PropertyKey, Role, TopologyEvent};

/// Receiver of topology notifications.
///
/// Providers may invoke this from their own callback threads, concurrently
/// with application threads using the registry.
pub trait TopologyEventSink: Send + Sync {
    fn handle_topology_event(&self, event: TopologyEvent);

    // Callback-shaped adapters for providers that mirror a platform ABI.

    fn device_state_changed(&self, device_id: &str, new_state: DeviceState) {
        self.handle_topology_event(TopologyEvent::DeviceStateChanged {
            device_id: device_id.to_string(),
            new_state,
        });
    }

    fn device_added(&self, device_id: &str) {
        self.handle_topology_event(TopologyEvent::DeviceAdded {
            device_id: device_id.to_string(),
        });
    }

    fn device_removed(&self, device_id: &str) {
        self.handle_topology_event(TopologyEvent::DeviceRemoved {
            device_id: device_id.to_string(),
        });
    }

    fn default_device_changed(&self, flow: DataFlow, role: Role, device_id: Option<&str>) {
        self.handle_topology_event(TopologyEvent::DefaultDeviceChanged {
            flow,
            role,
            device_id: device_id.map(str::to_string),
        });
    }

    fn property_changed(&self, device_id: &str, key: PropertyKey) {
        self.handle_topology_event(TopologyEvent::PropertyChanged {
            device_id: device_id.to_string(),
            key,
        });
    }
}

/// Capability the registry requires from the host audio subsystem
pub trait DeviceProvider: Send + Sync {
    /// Active render-capable devices, in the order the platform reports them
    fn enumerate_active_render_devices(&self) -> Result<Vec<Device>>;

    /// The OS default render device, if there is one
    fn default_render_device(&self) -> Result<Option<Device>>;

    /// Check that an output backend can actually be constructed
    fn probe_backend(&self) -> Result<()>;

    /// Start delivering topology events to `sink` until the handle is dropped
    fn subscribe(&self, sink: Arc<dyn TopologyEventSink>) -> Result<Subscription>;

    /// Provider name for logging (e.g. "cpal", "in-memory")
    fn name(&self) -> &'static str;
}

/// Registration handle returned by [`DeviceProvider::subscribe`].
///
/// Dropping it (or calling [`Subscription::release`]) unregisters the sink.
pub struct Subscription {
    id: Uuid,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(id: Uuid, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release
    pub fn noop() -> Self {
        Self {
            id: Uuid::new_v4(),
            release: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(release) = self.release.take() {
            crate::device_debug!("Releasing provider subscription {}", self.id);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.release.is_some())
            .finish()
    }
}
