// Render device registry and public API
//
// Owns the enumerated device list, the OS-default ("current") device and
// the set of registered consumers. State is published as immutable
// snapshots: a refresh builds a new snapshot under the refresh lock and
// swaps it in whole, so readers see either the previous or the next list
// and never a partial rebuild.

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::consumer::{ConsumerBinding, ConsumerId};
use super::enumeration::{self, Enumeration};
use super::error::{DeviceError, Result};
use super::initialization::{self, Begin, InitState, InitializationGuard};
use super::notifications::NotificationListener;
use super::provider::{DeviceProvider, Subscription};
use crate::audio::types::{
    Device, RefreshOutcome, RefreshStats, RegistryEvent, RegistrySnapshot, DEFAULT_DEVICE_ID,
    DEFAULT_DEVICE_NAME,
};
use crate::config::RegistryConfig;

#[derive(Default)]
struct ConsumerList {
    next_id: u64,
    entries: Vec<(ConsumerId, Weak<dyn ConsumerBinding>)>,
}

/// Audio render device registry with hot-plug reconciliation
pub struct DeviceRegistry {
    provider: Option<Arc<dyn DeviceProvider>>,
    /// Cause recorded when the registry was built without a provider
    unavailable_cause: Option<DeviceError>,
    config: RegistryConfig,
    guard: InitializationGuard,
    /// Serializes initialize/refresh; held while consumers are reconciled
    refresh_lock: Mutex<()>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    consumers: Mutex<ConsumerList>,
    subscription: Mutex<Option<Subscription>>,
    /// Subscription released by `shutdown` from inside a consumer hook
    pending_release: Mutex<Option<Subscription>>,
    /// Thread currently running consumer hooks
    hook_thread: Mutex<Option<ThreadId>>,
    stats: Mutex<RefreshStats>,
    events: broadcast::Sender<RegistryEvent>,
    self_ref: Weak<DeviceRegistry>,
}

impl DeviceRegistry {
    /// Create an uninitialized registry backed by `provider`
    pub fn new(provider: Arc<dyn DeviceProvider>, config: RegistryConfig) -> Arc<Self> {
        Self::build(Some(provider), None, config)
    }

    /// Create a registry that will fail initialization with `cause`
    pub fn unavailable(config: RegistryConfig, cause: DeviceError) -> Arc<Self> {
        Self::build(None, Some(cause), config)
    }

    fn build(
        provider: Option<Arc<dyn DeviceProvider>>,
        unavailable_cause: Option<DeviceError>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new_cyclic(|self_ref| Self {
            provider,
            unavailable_cause,
            config,
            guard: InitializationGuard::new(),
            refresh_lock: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::sentinel_only())),
            consumers: Mutex::new(ConsumerList::default()),
            subscription: Mutex::new(None),
            pending_release: Mutex::new(None),
            hook_thread: Mutex::new(None),
            stats: Mutex::new(RefreshStats::default()),
            events,
            self_ref: self_ref.clone(),
        })
    }

    /// Probe the provider, populate the device list and subscribe to
    /// hot-plug notifications.
    ///
    /// Any failure is terminal: the registry enters the failed state and the
    /// same error is returned by every later call.
    pub fn initialize(&self) -> Result<()> {
        {
            let _refresh = self.refresh_lock.lock();
            match self.guard.begin() {
                Begin::Probe => {}
                Begin::AlreadyReady => return Ok(()),
                Begin::AlreadyFailed(e) => return Err(e),
            }

            match self.populate() {
                Ok(snapshot) => {
                    self.guard.mark_ready();
                    let _ = self.events.send(RegistryEvent::Initialized(snapshot));
                }
                Err(e) => return Err(self.enter_failed(e)),
            }
        }

        // Outside the refresh lock: a provider may deliver events while subscribing
        let Some(provider) = self.provider.clone() else {
            return Ok(());
        };
        let listener = Arc::new(NotificationListener::from_weak(self.self_ref.clone()));
        match provider.subscribe(listener) {
            Ok(subscription) => {
                info!(
                    "✅ Subscribed to {} device notifications ({})",
                    provider.name(),
                    subscription.id()
                );
                *self.subscription.lock() = Some(subscription);
                // Changes between the first enumeration and the subscription
                // produced no event; pick them up now
                let outcome = {
                    let _refresh = self.refresh_lock.lock();
                    self.refresh_locked(true)
                };
                self.release_pending();
                if let RefreshOutcome::Refreshed { generation, .. } = outcome {
                    info!("🔄 Caught up with device changes made during startup (generation {})", generation);
                }
                Ok(())
            }
            Err(e) => {
                let _refresh = self.refresh_lock.lock();
                Err(self.enter_failed(DeviceError::provider(
                    e.context("subscribing to device notifications"),
                )))
            }
        }
    }

    /// First enumeration; caller holds the refresh lock
    fn populate(&self) -> Result<Arc<RegistrySnapshot>> {
        let provider = match &self.provider {
            Some(provider) => provider.clone(),
            None => {
                return Err(self.unavailable_cause.clone().unwrap_or_else(|| {
                    DeviceError::ProviderUnavailable("no device provider".into())
                }))
            }
        };
        if self.config.disable_audio {
            return Err(DeviceError::Disabled);
        }

        let probed_default = initialization::probe(provider.as_ref())?;
        let mut found = enumeration::enumerate(provider.as_ref()).map_err(|e| match e {
            DeviceError::EnumerationFailed(msg) => DeviceError::ProviderUnavailable(msg),
            other => other,
        })?;
        if found.default_device.is_none()
            && found.devices.iter().any(|d| d.id == probed_default.id)
        {
            found.default_device = Some(probed_default);
        }

        if self.config.log_device_dump {
            let default_id = found.default_device.as_ref().map(|d| d.id.as_str());
            info!(
                "Audio Devices\n{}",
                enumeration::format_device_dump(&found.devices, default_id)
            );
        }

        let snapshot = self.publish(found);
        self.reconcile_consumers(&snapshot);
        Ok(snapshot)
    }

    fn enter_failed(&self, err: DeviceError) -> DeviceError {
        let err = self.guard.mark_failed(err);
        error!("❌ Audio device registry unavailable: {}", err);

        let generation = self.snapshot.read().generation + 1;
        *self.snapshot.write() = Arc::new(RegistrySnapshot::unavailable(generation));
        self.stats.lock().last_error = Some(err.to_string());
        let _ = self.events.send(RegistryEvent::Unavailable(err.clone()));
        err
    }

    /// Re-enumerate devices, update the current device and reconcile every
    /// registered consumer.
    ///
    /// Calls are serialized; a concurrent caller blocks until the running
    /// refresh completes. A failed enumeration keeps the previous snapshot.
    pub fn refresh(&self) -> RefreshOutcome {
        let outcome = {
            let _refresh = self.refresh_lock.lock();
            self.refresh_locked(false)
        };
        self.release_pending();
        outcome
    }

    /// Caller holds the refresh lock. With `only_if_changed`, an enumeration
    /// matching the published snapshot is `Skipped` without a new generation.
    fn refresh_locked(&self, only_if_changed: bool) -> RefreshOutcome {
        if !self.guard.is_ready() {
            crate::device_debug!("Refresh skipped: registry is {:?}", self.guard.state());
            return RefreshOutcome::Skipped;
        }
        let Some(provider) = self.provider.as_ref() else {
            return RefreshOutcome::Skipped;
        };

        match enumeration::enumerate(provider.as_ref()) {
            Ok(found) if only_if_changed && self.is_published(&found) => {
                crate::device_debug!("Device list unchanged, nothing to publish");
                RefreshOutcome::Skipped
            }
            Ok(found) => {
                let snapshot = self.publish(found);
                let resets = self.reconcile_consumers(&snapshot);
                {
                    let mut stats = self.stats.lock();
                    stats.refreshes += 1;
                    stats.consumers_reset += resets;
                }
                info!(
                    "🔄 Refreshed audio devices: {} device(s), current: {}",
                    snapshot.devices.len() - 1,
                    snapshot.current.name
                );
                let outcome = RefreshOutcome::Refreshed {
                    generation: snapshot.generation,
                    device_count: snapshot.devices.len(),
                };
                let _ = self.events.send(RegistryEvent::Refreshed(snapshot));
                outcome
            }
            Err(e) => {
                warn!("⚠️ Device refresh failed, keeping previous device list: {}", e);
                {
                    let mut stats = self.stats.lock();
                    stats.failed_refreshes += 1;
                    stats.last_error = Some(e.to_string());
                }
                let _ = self.events.send(RegistryEvent::RefreshFailed(e.clone()));
                RefreshOutcome::Retained(e)
            }
        }
    }

    /// Build and swap in the next snapshot; caller holds the refresh lock
    fn publish(&self, found: Enumeration) -> Arc<RegistrySnapshot> {
        let previous = self.snapshot();
        let current = resolve_current(&found, &previous.current);
        let snapshot = Arc::new(RegistrySnapshot {
            devices: found.devices,
            current,
            generation: previous.generation + 1,
            refreshed_at: Utc::now(),
        });
        *self.snapshot.write() = snapshot.clone();
        snapshot
    }

    fn is_published(&self, found: &Enumeration) -> bool {
        let current = self.snapshot();
        current.devices == found.devices && resolve_current(found, &current.current) == current.current
    }

    /// Reset consumers whose device vanished, re-confirm the rest.
    /// Returns the number of resets.
    fn reconcile_consumers(&self, snapshot: &RegistrySnapshot) -> u64 {
        let live: Vec<Arc<dyn ConsumerBinding>> = {
            let mut consumers = self.consumers.lock();
            consumers.entries.retain(|(_, weak)| weak.strong_count() > 0);
            consumers
                .entries
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        *self.hook_thread.lock() = Some(thread::current().id());
        let mut resets = 0;
        for consumer in live {
            let selected = consumer.selected_device_name();
            if snapshot.contains_name(&selected) {
                consumer.device_still_valid();
            } else {
                info!(
                    "Selected device {:?} is gone, falling back to {}",
                    selected, DEFAULT_DEVICE_NAME
                );
                consumer.set_selected_device_name(DEFAULT_DEVICE_NAME);
                resets += 1;
            }
        }
        *self.hook_thread.lock() = None;
        resets
    }

    /// Map a display name to a device id (case-insensitive, first match wins)
    pub fn lookup_device_id(&self, device_name: &str) -> Result<String> {
        // The sentinel resolves in every state, failed included
        if device_name == DEFAULT_DEVICE_NAME {
            return Ok(DEFAULT_DEVICE_ID.to_string());
        }
        if self.guard.is_failed() {
            return Err(DeviceError::DeviceNotFound(device_name.to_string()));
        }

        let wanted = device_name.to_lowercase();
        self.snapshot()
            .devices
            .iter()
            .filter(|d| !d.is_default_sentinel())
            .find(|d| d.name.to_lowercase() == wanted)
            .map(|d| d.id.clone())
            .ok_or_else(|| DeviceError::DeviceNotFound(device_name.to_string()))
    }

    /// Map a device id to its display name (exact match)
    pub fn lookup_device_name(&self, device_id: &str) -> Result<String> {
        if device_id == DEFAULT_DEVICE_ID {
            return Ok(DEFAULT_DEVICE_NAME.to_string());
        }
        if self.guard.is_failed() {
            return Err(DeviceError::DeviceNotFound(device_id.to_string()));
        }

        self.snapshot()
            .devices
            .iter()
            .filter(|d| !d.is_default_sentinel())
            .find(|d| d.id == device_id)
            .map(|d| d.name.clone())
            .ok_or_else(|| DeviceError::DeviceNotFound(device_id.to_string()))
    }

    /// Track `consumer` for reconciliation; the registry keeps only a weak reference
    pub fn register_consumer(&self, consumer: Arc<dyn ConsumerBinding>) -> ConsumerId {
        let mut consumers = self.consumers.lock();
        let id = ConsumerId(consumers.next_id);
        consumers.next_id += 1;
        consumers.entries.push((id, Arc::downgrade(&consumer)));
        crate::device_debug!("➕ Registered consumer {:?} (total: {})", id, consumers.entries.len());
        id
    }

    pub fn unregister_consumer(&self, id: ConsumerId) -> bool {
        let mut consumers = self.consumers.lock();
        let before = consumers.entries.len();
        consumers.entries.retain(|(entry, _)| *entry != id);
        consumers.entries.len() != before
    }

    /// Number of registered consumers that are still alive
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .lock()
            .entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Listener that forwards topology events into this registry
    pub fn listener(&self) -> NotificationListener {
        NotificationListener::from_weak(self.self_ref.clone())
    }

    /// Receive change notifications from now on
    pub fn subscribe_changes(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Release the provider subscription; no further hot-plug events arrive
    ///
    /// Called from a consumer hook, the release completes once the running
    /// refresh lets go of the refresh lock.
    pub fn shutdown(&self) {
        let subscription = self.subscription.lock().take();
        let Some(subscription) = subscription else {
            return;
        };
        if *self.hook_thread.lock() == Some(thread::current().id()) {
            // Releasing can join a watcher thread that waits on the refresh lock
            crate::device_debug!("Deferring release of {} until refresh completes", subscription.id());
            *self.pending_release.lock() = Some(subscription);
            return;
        }
        info!("🛑 Releasing device notifications ({})", subscription.id());
        subscription.release();
    }

    fn release_pending(&self) {
        let pending = self.pending_release.lock().take();
        if let Some(subscription) = pending {
            info!("🛑 Releasing device notifications ({})", subscription.id());
            subscription.release();
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().clone()
    }

    /// Devices for presentation: sentinel first (empty once failed)
    pub fn devices(&self) -> Vec<Device> {
        self.snapshot().devices.clone()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.snapshot().device_names()
    }

    pub fn current_device(&self) -> Device {
        self.snapshot().current.clone()
    }

    pub fn current_device_id(&self) -> String {
        self.snapshot().current.id.clone()
    }

    pub fn current_device_name(&self) -> String {
        self.snapshot().current.name.clone()
    }

    pub fn state(&self) -> InitState {
        self.guard.state()
    }

    pub fn is_failed(&self) -> bool {
        self.guard.is_failed()
    }

    /// The error that put the registry into the failed state
    pub fn failure(&self) -> Option<DeviceError> {
        self.guard.failure()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats.lock().clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn record_event(&self, handled: bool) {
        let mut stats = self.stats.lock();
        if handled {
            stats.events_handled += 1;
        } else {
            stats.events_ignored += 1;
        }
    }
}

/// The OS default when known; otherwise keep the previous current device
/// if it is still enumerated, else fall back to the sentinel.
fn resolve_current(found: &Enumeration, previous: &Device) -> Device {
    if let Some(default) = &found.default_device {
        return default.clone();
    }
    found
        .devices
        .iter()
        .find(|d| d.id == previous.id)
        .cloned()
        .unwrap_or_else(Device::default_device)
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("state", &self.guard.state())
            .field("snapshot", &self.snapshot())
            .field("consumers", &self.consumer_count())
            .finish()
    }
}
