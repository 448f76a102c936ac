use anyhow::{Context, Result};
use crossbeam::channel::{self, Sender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::provider::{DeviceProvider, TopologyEventSink};
use crate::audio::types::{DataFlow, Device, DeviceState, Role, TopologyEvent};

/// Polling device watcher for providers without native notifications
///
/// A background thread:
/// - Re-enumerates devices and the OS default on a fixed interval
/// - Diffs the result against the previous poll
/// - Emits the matching topology events to the sink
#[derive(Debug)]
pub struct PollingWatcher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    polls: Arc<AtomicU64>,
}

/// Devices (in provider order) and default id observed by one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyView {
    pub devices: Vec<Device>,
    pub default_id: Option<String>,
}

impl TopologyView {
    pub fn capture(provider: &dyn DeviceProvider) -> Result<Self> {
        let devices = provider.enumerate_active_render_devices()?;
        // A failing default query reads as "no default"
        let default_id = provider.default_render_device().ok().flatten().map(|d| d.id);
        Ok(Self {
            devices,
            default_id,
        })
    }
}

/// Events that turn `previous` into `next`: removals, then additions, then
/// a default change.
///
/// With the same set of ids, a rename or reorder is reported as a state
/// change of the first device that differs, so the registry re-enumerates.
pub fn diff_topology(previous: &TopologyView, next: &TopologyView) -> Vec<TopologyEvent> {
    let before: HashSet<&str> = previous.devices.iter().map(|d| d.id.as_str()).collect();
    let after: HashSet<&str> = next.devices.iter().map(|d| d.id.as_str()).collect();

    let mut events = Vec::new();
    for device in previous.devices.iter().filter(|d| !after.contains(d.id.as_str())) {
        events.push(TopologyEvent::DeviceRemoved {
            device_id: device.id.clone(),
        });
    }
    for device in next.devices.iter().filter(|d| !before.contains(d.id.as_str())) {
        events.push(TopologyEvent::DeviceAdded {
            device_id: device.id.clone(),
        });
    }
    if events.is_empty() {
        let moved = previous
            .devices
            .iter()
            .zip(&next.devices)
            .find(|(old, new)| old != new)
            .map(|(_, new)| new);
        if let Some(device) = moved {
            events.push(TopologyEvent::DeviceStateChanged {
                device_id: device.id.clone(),
                new_state: DeviceState::Active,
            });
        }
    }
    if previous.default_id != next.default_id {
        events.push(TopologyEvent::DefaultDeviceChanged {
            flow: DataFlow::Render,
            role: Role::Multimedia,
            device_id: next.default_id.clone(),
        });
    }
    events
}

impl PollingWatcher {
    /// Start polling `provider` every `interval`, reporting changes to `sink`
    pub fn spawn(
        provider: Arc<dyn DeviceProvider>,
        sink: Arc<dyn TopologyEventSink>,
        interval: Duration,
    ) -> Result<Self> {
        let baseline = TopologyView::capture(provider.as_ref()).unwrap_or_else(|e| {
            warn!("Initial device poll failed: {:#}", e);
            TopologyView::default()
        });

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let is_running = Arc::new(AtomicBool::new(true));
        let polls = Arc::new(AtomicU64::new(0));

        let running = is_running.clone();
        let poll_count = polls.clone();
        let handle = std::thread::Builder::new()
            .name("device-watcher".to_string())
            .spawn(move || {
                info!("🔍 Device watcher started ({:?} interval)", interval);
                let ticker = channel::tick(interval);
                let mut previous = baseline;

                loop {
                    crossbeam::select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            poll_count.fetch_add(1, Ordering::Relaxed);
                            match TopologyView::capture(provider.as_ref()) {
                                Ok(next) => {
                                    for event in diff_topology(&previous, &next) {
                                        debug!("🔔 Watcher detected {}", event.kind());
                                        sink.handle_topology_event(event);
                                    }
                                    previous = next;
                                }
                                Err(e) => debug!("Device poll failed: {:#}", e),
                            }
                        }
                    }
                }

                running.store(false, Ordering::SeqCst);
                info!("🛑 Device watcher stopped");
            })
            .context("spawning device watcher thread")?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            is_running,
            polls,
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Polls performed so far
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// Stop the watcher thread and wait for it to exit
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            // A sink dropping its own subscription runs this on the watcher thread
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
