use audio_device_registry::{
    ConsumerBinding, Device, DeviceError, DeviceProvider, DeviceRegistry, InMemoryProvider,
    InitState, RefreshOutcome, RegistryConfig, RegistryEvent, SelectedDevice, Subscription,
    TopologyEventSink, DEFAULT_DEVICE_ID, DEFAULT_DEVICE_NAME,
};
use parking_lot::Mutex;
use std::sync::Arc;

type StartupChange = Box<dyn FnOnce(&InMemoryProvider) + Send>;

/// Provider whose device list changes while the registry subscribes,
/// before the sink is registered, so no event reports the change
struct ChangingDuringSubscribe {
    inner: Arc<InMemoryProvider>,
    change: Mutex<Option<StartupChange>>,
}

impl ChangingDuringSubscribe {
    fn new(inner: Arc<InMemoryProvider>, change: impl FnOnce(&InMemoryProvider) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner,
            change: Mutex::new(Some(Box::new(change))),
        })
    }
}

impl DeviceProvider for ChangingDuringSubscribe {
    fn enumerate_active_render_devices(&self) -> anyhow::Result<Vec<Device>> {
        self.inner.enumerate_active_render_devices()
    }

    fn default_render_device(&self) -> anyhow::Result<Option<Device>> {
        self.inner.default_render_device()
    }

    fn probe_backend(&self) -> anyhow::Result<()> {
        self.inner.probe_backend()
    }

    fn subscribe(&self, sink: Arc<dyn TopologyEventSink>) -> anyhow::Result<Subscription> {
        if let Some(change) = self.change.lock().take() {
            change(&self.inner);
        }
        self.inner.subscribe(sink)
    }

    fn name(&self) -> &'static str {
        "changing"
    }
}

/// Test the registry lifecycle against a scripted provider
#[cfg(test)]
mod device_registry_tests {
    use super::*;

    fn speakers_and_headset() -> Arc<InMemoryProvider> {
        Arc::new(InMemoryProvider::with_devices(
            vec![
                Device::new("{a}", "Speakers (A)"),
                Device::new("{b}", "Headset (B)"),
            ],
            Some("{a}"),
        ))
    }

    fn create_test_registry(provider: &Arc<InMemoryProvider>) -> Arc<DeviceRegistry> {
        let registry = DeviceRegistry::new(provider.clone(), RegistryConfig::default());
        registry
            .initialize()
            .expect("Failed to initialize test registry");
        registry
    }

    #[test]
    fn test_initialize_populates_devices_and_current() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        assert_eq!(registry.state(), InitState::Ready);
        assert_eq!(
            registry.device_names(),
            ["Default", "Speakers (A)", "Headset (B)"]
        );
        assert_eq!(registry.current_device_name(), "Speakers (A)");
        assert_eq!(registry.current_device_id(), "{a}");
        assert!(registry.is_subscribed());
        assert_eq!(provider.subscriber_count(), 1);
    }

    #[test]
    fn test_removal_scenario_resets_consumer_to_default() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        let player = SelectedDevice::with_selection("Speakers (A)");
        registry.register_consumer(player.clone());

        // Removing the default also moves the OS default to the headset
        provider.unplug("{a}");

        assert_eq!(registry.device_names(), ["Default", "Headset (B)"]);
        assert_eq!(registry.current_device_name(), "Headset (B)");
        assert_eq!(player.selected_device_name(), DEFAULT_DEVICE_NAME);
        assert_eq!(player.resets(), 1);
    }

    #[test]
    fn test_surviving_selection_is_reconfirmed_not_changed() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        let player = SelectedDevice::with_selection("Headset (B)");
        registry.register_consumer(player.clone());

        provider.plug(Device::new("{c}", "HDMI Output"));

        assert_eq!(player.selected_device_name(), "Headset (B)");
        assert_eq!(player.reconfirmations(), 1);
        assert_eq!(player.resets(), 0);
    }

    #[test]
    fn test_sentinel_lookups_never_touch_provider() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);
        provider.set_enumeration_failure(Some("device enumerator lost"));

        assert_eq!(
            registry.lookup_device_id(DEFAULT_DEVICE_NAME).unwrap(),
            DEFAULT_DEVICE_ID
        );
        assert_eq!(
            registry.lookup_device_name(DEFAULT_DEVICE_ID).unwrap(),
            DEFAULT_DEVICE_NAME
        );
    }

    #[test]
    fn test_lookup_by_name_is_case_insensitive() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        assert_eq!(registry.lookup_device_id("headset (b)").unwrap(), "{b}");
        assert_eq!(registry.lookup_device_id("SPEAKERS (A)").unwrap(), "{a}");
    }

    #[test]
    fn test_lookup_by_id_is_exact() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        assert_eq!(registry.lookup_device_name("{b}").unwrap(), "Headset (B)");
        assert_eq!(
            registry.lookup_device_name("{B}"),
            Err(DeviceError::DeviceNotFound("{B}".to_string()))
        );
    }

    #[test]
    fn test_lookup_miss_is_recoverable_error() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        let err = registry.lookup_device_id("Bluetooth Speaker").unwrap_err();
        assert_eq!(
            err,
            DeviceError::DeviceNotFound("Bluetooth Speaker".to_string())
        );
        assert!(!err.is_fatal());
        // Registry still fully usable afterwards
        assert!(registry.refresh().is_refreshed());
    }

    #[test]
    fn test_lookup_reflects_latest_refresh() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        provider.unplug("{b}");
        assert!(matches!(
            registry.lookup_device_id("Headset (B)"),
            Err(DeviceError::DeviceNotFound(_))
        ));
        assert!(matches!(
            registry.lookup_device_name("{b}"),
            Err(DeviceError::DeviceNotFound(_))
        ));
    }

    /// Known weak invariant: duplicate display names resolve to the first
    /// device in enumeration order.
    #[test]
    fn test_duplicate_names_resolve_to_first_match() {
        let provider = Arc::new(InMemoryProvider::with_devices(
            vec![
                Device::new("usb-1", "USB Audio"),
                Device::new("usb-2", "usb audio"),
            ],
            Some("usb-2"),
        ));
        let registry = create_test_registry(&provider);

        assert_eq!(registry.devices().len(), 3);
        assert_eq!(registry.lookup_device_id("USB Audio").unwrap(), "usb-1");
        assert_eq!(registry.lookup_device_id("usb audio").unwrap(), "usb-1");
        assert_eq!(registry.lookup_device_name("usb-2").unwrap(), "usb audio");
    }

    #[test]
    fn test_enumeration_order_is_preserved() {
        let provider = Arc::new(InMemoryProvider::with_devices(
            vec![
                Device::new("z", "Zeta"),
                Device::new("m", "Mu"),
                Device::new("a", "Alpha"),
            ],
            Some("a"),
        ));
        let registry = create_test_registry(&provider);

        assert_eq!(registry.device_names(), ["Default", "Zeta", "Mu", "Alpha"]);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);
        let before = registry.snapshot();

        provider.set_enumeration_failure(Some("AUDCLNT_E_SERVICE_NOT_RUNNING"));
        let outcome = registry.refresh();

        assert!(matches!(
            outcome,
            RefreshOutcome::Retained(DeviceError::EnumerationFailed(_))
        ));
        assert_eq!(registry.snapshot(), before);
        assert_eq!(registry.stats().failed_refreshes, 1);
        assert!(registry
            .stats()
            .last_error
            .unwrap()
            .contains("AUDCLNT_E_SERVICE_NOT_RUNNING"));

        provider.set_enumeration_failure(None);
        assert!(registry.refresh().is_refreshed());
        assert_eq!(registry.snapshot().generation, before.generation + 1);
    }

    #[test]
    fn test_failed_refresh_leaves_consumers_alone() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);
        let player = SelectedDevice::with_selection("Speakers (A)");
        registry.register_consumer(player.clone());

        provider.set_enumeration_failure(Some("transient"));
        registry.refresh();

        assert_eq!(player.selected_device_name(), "Speakers (A)");
        assert_eq!(player.reconfirmations(), 0);
    }

    #[test]
    fn test_missing_default_keeps_current_if_still_present() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        provider.set_default(None);
        registry.refresh();
        assert_eq!(registry.current_device_name(), "Speakers (A)");

        provider.set_default_failure(Some("query failed"));
        provider.set_devices(vec![Device::new("{b}", "Headset (B)")]);
        registry.refresh();
        assert_eq!(registry.current_device_id(), DEFAULT_DEVICE_ID);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        let first = registry.snapshot();
        registry.refresh();
        registry.refresh();
        let third = registry.snapshot();

        assert_eq!(first.devices, third.devices);
        assert_eq!(first.current, third.current);
        assert_eq!(third.generation, first.generation + 2);
    }

    #[test]
    fn test_initialize_twice_is_ok() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        assert!(registry.initialize().is_ok());
        assert_eq!(provider.subscriber_count(), 1);
    }

    #[test]
    fn test_refresh_before_initialize_is_skipped() {
        let provider = speakers_and_headset();
        let registry = DeviceRegistry::new(provider.clone(), RegistryConfig::default());

        assert_eq!(registry.refresh(), RefreshOutcome::Skipped);
        assert_eq!(registry.device_names(), ["Default"]);
        assert_eq!(provider.enumeration_calls(), 0);
    }

    #[test]
    fn test_shutdown_releases_subscription() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        registry.shutdown();
        assert!(!registry.is_subscribed());
        assert_eq!(provider.subscriber_count(), 0);

        // No more hot-plug tracking, explicit refresh still works
        provider.unplug("{b}");
        assert_eq!(registry.devices().len(), 3);
        assert!(registry.refresh().is_refreshed());
        assert_eq!(registry.devices().len(), 2);
    }

    #[test]
    fn test_dropping_registry_releases_subscription() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);
        assert_eq!(provider.subscriber_count(), 1);

        drop(registry);
        assert_eq!(provider.subscriber_count(), 0);
        // Events after teardown are harmless
        provider.plug(Device::new("{c}", "HDMI Output"));
    }

    #[test]
    fn test_device_added_while_subscribing_is_picked_up() {
        let inner = Arc::new(InMemoryProvider::with_devices(
            vec![Device::new("spk", "Speakers")],
            Some("spk"),
        ));
        let provider = ChangingDuringSubscribe::new(inner.clone(), |p| {
            p.plug(Device::new("usb", "USB DAC"))
        });
        let registry = DeviceRegistry::new(provider, RegistryConfig::default());

        registry.initialize().expect("Failed to initialize test registry");

        assert_eq!(inner.subscriber_count(), 1);
        assert_eq!(registry.device_names(), ["Default", "Speakers", "USB DAC"]);
        assert_eq!(registry.lookup_device_id("USB DAC").unwrap(), "usb");
    }

    #[test]
    fn test_device_removed_while_subscribing_resets_consumer() {
        let inner = speakers_and_headset();
        let provider = ChangingDuringSubscribe::new(inner.clone(), |p| {
            p.unplug("{a}");
        });
        let registry = DeviceRegistry::new(provider, RegistryConfig::default());
        let player = SelectedDevice::with_selection("Speakers (A)");
        registry.register_consumer(player.clone());

        registry.initialize().expect("Failed to initialize test registry");

        assert_eq!(registry.device_names(), ["Default", "Headset (B)"]);
        assert_eq!(registry.current_device_name(), "Headset (B)");
        assert_eq!(player.selected_device_name(), DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn test_quiet_startup_publishes_one_generation() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);

        // The post-subscribe check re-enumerates but publishes nothing new
        assert_eq!(provider.enumeration_calls(), 2);
        assert_eq!(registry.snapshot().generation, 1);
        assert_eq!(registry.stats().refreshes, 0);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast() {
        let provider = speakers_and_headset();
        let registry = create_test_registry(&provider);
        let mut changes = registry.subscribe_changes();

        provider.plug(Device::new("{c}", "HDMI Output"));

        match changes.recv().await.unwrap() {
            RegistryEvent::Refreshed(snapshot) => {
                assert_eq!(snapshot.devices.len(), 4);
                assert!(snapshot.contains_name("HDMI Output"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        provider.set_enumeration_failure(Some("gone"));
        registry.refresh();
        assert!(matches!(
            changes.recv().await.unwrap(),
            RegistryEvent::RefreshFailed(DeviceError::EnumerationFailed(_))
        ));
    }
}
