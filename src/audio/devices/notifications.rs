// Hot-plug notification handling
//
// Providers call into the listener from their own callback threads. Every
// topology event triggers exactly one registry refresh; property-change
// events carry nothing the registry tracks and are dropped.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::device_registry::DeviceRegistry;
use super::provider::TopologyEventSink;
use crate::audio::types::{RefreshOutcome, TopologyEvent};

/// Forwards provider notifications into a [`DeviceRegistry`].
///
/// Holds only a weak reference, so a provider keeping the listener alive
/// never keeps the registry alive.
#[derive(Clone)]
pub struct NotificationListener {
    registry: Weak<DeviceRegistry>,
}

impl NotificationListener {
    pub fn new(registry: &Arc<DeviceRegistry>) -> Self {
        Self::from_weak(Arc::downgrade(registry))
    }

    pub(crate) fn from_weak(registry: Weak<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Single entry point for all topology events.
    ///
    /// Returns the refresh outcome, or None when the event was ignored or
    /// the registry is gone.
    pub fn dispatch(&self, event: TopologyEvent) -> Option<RefreshOutcome> {
        let Some(registry) = self.registry.upgrade() else {
            debug!("Dropping {} event: registry no longer exists", event.kind());
            return None;
        };

        match &event {
            TopologyEvent::PropertyChanged { device_id, .. } => {
                crate::device_debug!("Ignoring property change on {}", device_id);
                registry.record_event(false);
                None
            }
            TopologyEvent::DeviceAdded { device_id }
            | TopologyEvent::DeviceRemoved { device_id }
            | TopologyEvent::DeviceStateChanged { device_id, .. } => {
                debug!("🔔 {} ({})", event.kind(), device_id);
                registry.record_event(true);
                Some(registry.refresh())
            }
            TopologyEvent::DefaultDeviceChanged {
                flow,
                role,
                device_id,
            } => {
                debug!(
                    "🔔 {} ({:?}/{:?} -> {:?})",
                    event.kind(),
                    flow,
                    role,
                    device_id
                );
                registry.record_event(true);
                Some(registry.refresh())
            }
        }
    }
}

impl TopologyEventSink for NotificationListener {
    fn handle_topology_event(&self, event: TopologyEvent) {
        self.dispatch(event);
    }
}

impl fmt::Debug for NotificationListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationListener")
            .field("registry_alive", &(self.registry.strong_count() > 0))
            .finish()
    }
}
