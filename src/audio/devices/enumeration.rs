// Device list construction
//
// Turns a raw provider enumeration into the registry's device list:
// sentinel first, provider order preserved, duplicate ids collapsed.

use std::collections::HashSet;

use tracing::warn;

use super::error::{DeviceError, Result};
use super::provider::DeviceProvider;
use crate::audio::types::Device;

/// One consistent read of the provider: device list plus OS default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Sentinel first, then the active render devices
    pub devices: Vec<Device>,
    /// OS default if the provider reported one that is also enumerated
    pub default_device: Option<Device>,
}

/// Query the provider for active devices and the OS default.
///
/// A failed device enumeration is an error; a failed default query only
/// leaves `default_device` empty.
pub fn enumerate(provider: &dyn DeviceProvider) -> Result<Enumeration> {
    crate::device_debug!("Enumerating render devices via {}", provider.name());

    let reported = provider
        .enumerate_active_render_devices()
        .map_err(DeviceError::enumeration)?;
    let devices = build_device_list(reported);

    let default_device = match provider.default_render_device() {
        Ok(Some(default)) => {
            if devices.iter().skip(1).any(|d| d.id == default.id) {
                Some(default)
            } else {
                warn!(
                    "Default device {} ({}) is not in the active enumeration",
                    default.name, default.id
                );
                None
            }
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Default render device query failed: {:#}", e);
            None
        }
    };

    for (i, device) in devices.iter().enumerate() {
        crate::device_debug!("  {}: {} ({})", i, device.name, device.id);
    }

    Ok(Enumeration {
        devices,
        default_device,
    })
}

/// Prepend the sentinel and drop repeated ids (first occurrence wins)
pub fn build_device_list(reported: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::with_capacity(reported.len());
    let mut devices = Vec::with_capacity(reported.len() + 1);
    devices.push(Device::default_device());

    for device in reported {
        if device.is_default_sentinel() {
            warn!(
                "Provider reported a device with the reserved id {:?} ({}), skipping",
                device.id, device.name
            );
            continue;
        }
        if !seen.insert(device.id.clone()) {
            crate::device_debug!("Skipping duplicate device id {}", device.id);
            continue;
        }
        devices.push(device);
    }

    devices
}

/// Human-readable listing, `*` marking the OS default
pub fn format_device_dump(devices: &[Device], default_id: Option<&str>) -> String {
    let mut dump = String::new();
    for device in devices.iter().filter(|d| !d.is_default_sentinel()) {
        let marker = if Some(device.id.as_str()) == default_id {
            " *"
        } else {
            ""
        };
        dump.push_str(&format!("{} | {}{}\n", device.id, device.name, marker));
    }
    dump
}
