// Consumer bindings
//
// Audio-consuming clients (players) own their device selection. The
// registry only reads it, resets it to the sentinel when the device went
// away, or asks the consumer to re-confirm it when it is still valid.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::types::DEFAULT_DEVICE_NAME;

/// Contract a consumer satisfies so the registry can reconcile its selection.
///
/// Hooks are invoked on whichever thread performed the refresh, while the
/// registry's refresh lock is held: implementations must not call
/// `DeviceRegistry::refresh` from inside them. `DeviceRegistry::shutdown`
/// is allowed; the subscription is released once the refresh finishes.
/// Marshaling to a UI thread is the implementor's job.
pub trait ConsumerBinding: Send + Sync {
    fn selected_device_name(&self) -> String;

    fn set_selected_device_name(&self, name: &str);

    /// The current selection survived a refresh
    fn device_still_valid(&self);
}

/// Handle returned by `DeviceRegistry::register_consumer`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(pub(crate) u64);

type ReconfirmCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A player's output-device slot.
///
/// Starts on the sentinel ("follow the OS default").
pub struct SelectedDevice {
    name: Mutex<String>,
    reconfirmations: AtomicU64,
    resets: AtomicU64,
    on_reconfirm: Mutex<Option<ReconfirmCallback>>,
}

impl SelectedDevice {
    pub fn new() -> Arc<Self> {
        Self::with_selection(DEFAULT_DEVICE_NAME)
    }

    pub fn with_selection(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name.into()),
            reconfirmations: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            on_reconfirm: Mutex::new(None),
        })
    }

    /// Select a device by name (the registry validates it on the next refresh)
    pub fn select(&self, name: impl Into<String>) {
        *self.name.lock() = name.into();
    }

    /// Invoke `callback` with the selection whenever the registry re-confirms it
    pub fn on_reconfirm(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_reconfirm.lock() = Some(Box::new(callback));
    }

    /// Times the registry reported the selection as still valid
    pub fn reconfirmations(&self) -> u64 {
        self.reconfirmations.load(Ordering::SeqCst)
    }

    /// Times the registry had to change the selection
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

impl ConsumerBinding for SelectedDevice {
    fn selected_device_name(&self) -> String {
        self.name.lock().clone()
    }

    fn set_selected_device_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn device_still_valid(&self) {
        self.reconfirmations.fetch_add(1, Ordering::SeqCst);
        let name = self.selected_device_name();
        if let Some(callback) = self.on_reconfirm.lock().as_ref() {
            callback(&name);
        }
    }
}

impl fmt::Debug for SelectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedDevice")
            .field("name", &*self.name.lock())
            .field("reconfirmations", &self.reconfirmations())
            .field("resets", &self.resets())
            .finish()
    }
}
