// cpal-backed device provider
//
// cpal exposes no stable endpoint ids and no change notifications, so
// devices are identified as "<host>:<name>" and hot-plug events come from
// a PollingWatcher.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;
use std::time::Duration;

use super::monitor::PollingWatcher;
use super::provider::{DeviceProvider, Subscription, TopologyEventSink};
use crate::audio::types::Device;
use crate::config::RegistryConfig;

#[derive(Debug, Clone)]
pub struct CpalProvider {
    poll_interval: Duration,
}

impl CpalProvider {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }

    fn device_id(host: &cpal::Host, name: &str) -> String {
        format!("{}:{}", host.id().name(), name)
    }

    fn describe(host: &cpal::Host, device: &cpal::Device) -> Result<Device> {
        let name = device.name().context("reading output device name")?;
        Ok(Device::new(Self::device_id(host, &name), name))
    }
}

impl DeviceProvider for CpalProvider {
    fn enumerate_active_render_devices(&self) -> Result<Vec<Device>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();
        for device in host
            .output_devices()
            .context("enumerating output devices")?
        {
            match Self::describe(&host, &device) {
                Ok(device) => devices.push(device),
                // Devices vanishing mid-enumeration are skipped
                Err(e) => crate::device_debug!("Skipping unreadable output device: {:#}", e),
            }
        }
        Ok(devices)
    }

    fn default_render_device(&self) -> Result<Option<Device>> {
        let host = cpal::default_host();
        match host.default_output_device() {
            Some(device) => Ok(Some(Self::describe(&host, &device)?)),
            None => Ok(None),
        }
    }

    fn probe_backend(&self) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?;
        let config = device
            .default_output_config()
            .context("querying default output stream config")?;
        crate::device_debug!(
            "Backend probe OK: {} Hz, {} channel(s)",
            config.sample_rate().0,
            config.channels()
        );
        Ok(())
    }

    fn subscribe(&self, sink: Arc<dyn TopologyEventSink>) -> Result<Subscription> {
        let watcher = PollingWatcher::spawn(Arc::new(self.clone()), sink, self.poll_interval)?;
        Ok(Subscription::new(uuid::Uuid::new_v4(), move || drop(watcher)))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}
