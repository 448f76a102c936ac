// One-time startup of the device registry
//
// Uninitialized -> Probing -> {Ready | Failed}. Failed is terminal for a
// registry instance; retrying means building a new registry.

use std::fmt;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use super::device_registry::DeviceRegistry;
use super::error::{DeviceError, Result};
use super::provider::DeviceProvider;
use crate::audio::types::Device;
use crate::config::RegistryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InitState {
    Uninitialized,
    Probing,
    Ready,
    Failed,
}

/// What a caller of [`InitializationGuard::begin`] should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// State moved to `Probing`; run the probe and report back
    Probe,
    AlreadyReady,
    /// Terminal failure recorded earlier
    AlreadyFailed(DeviceError),
}

/// Startup state machine shared by a registry and its readers
pub struct InitializationGuard {
    inner: Mutex<GuardInner>,
}

struct GuardInner {
    state: InitState,
    failure: Option<DeviceError>,
}

impl InitializationGuard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                state: InitState::Uninitialized,
                failure: None,
            }),
        }
    }

    pub fn state(&self) -> InitState {
        self.inner.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == InitState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state() == InitState::Failed
    }

    pub fn failure(&self) -> Option<DeviceError> {
        self.inner.lock().failure.clone()
    }

    pub fn begin(&self) -> Begin {
        let mut inner = self.inner.lock();
        match inner.state {
            InitState::Uninitialized => {
                inner.state = InitState::Probing;
                Begin::Probe
            }
            InitState::Ready => Begin::AlreadyReady,
            InitState::Failed => Begin::AlreadyFailed(
                inner
                    .failure
                    .clone()
                    .unwrap_or_else(|| DeviceError::ProviderUnavailable("unknown".into())),
            ),
            // Callers serialize initialization, so a second prober never gets here
            InitState::Probing => Begin::AlreadyFailed(DeviceError::ProviderUnavailable(
                "initialization already in progress".into(),
            )),
        }
    }

    pub fn mark_ready(&self) {
        let mut inner = self.inner.lock();
        if inner.state == InitState::Probing {
            inner.state = InitState::Ready;
        }
    }

    /// Enter the terminal failed state, keeping the first recorded cause
    pub fn mark_failed(&self, err: DeviceError) -> DeviceError {
        let mut inner = self.inner.lock();
        inner.state = InitState::Failed;
        inner.failure.get_or_insert(err).clone()
    }
}

impl Default for InitializationGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InitializationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InitializationGuard")
            .field("state", &inner.state)
            .field("failure", &inner.failure)
            .finish()
    }
}

/// Check that the provider can serve a registry: a default render device
/// exists and an output backend can be constructed.
///
/// Returns the OS default device on success.
pub fn probe(provider: &dyn DeviceProvider) -> Result<Device> {
    let default = provider
        .default_render_device()
        .map_err(DeviceError::provider)?
        .ok_or(DeviceError::NoDefaultDevice)?;

    provider.probe_backend().map_err(DeviceError::backend)?;

    Ok(default)
}

/// A registry plus the outcome of its initialization
#[derive(Debug)]
pub struct Bootstrap {
    pub registry: Arc<DeviceRegistry>,
    pub status: Result<()>,
}

/// Build and initialize a registry.
///
/// `factory` creates the platform provider; it is not called when audio is
/// disabled by configuration. Failures never panic: the returned registry
/// is then in the failed state and `status` carries the cause.
pub fn bootstrap<F>(config: RegistryConfig, factory: F) -> Bootstrap
where
    F: FnOnce() -> AnyResult<Arc<dyn DeviceProvider>>,
{
    if config.disable_audio {
        info!("Audio disabled by configuration");
        let registry = DeviceRegistry::unavailable(config, DeviceError::Disabled);
        let status = registry.initialize();
        return Bootstrap { registry, status };
    }

    let registry = match factory() {
        Ok(provider) => {
            info!("Using {} device provider", provider.name());
            DeviceRegistry::new(provider, config)
        }
        Err(e) => {
            error!("Failed to create audio device provider: {:#}", e);
            DeviceRegistry::unavailable(config, DeviceError::provider(e))
        }
    };

    let status = registry.initialize();
    Bootstrap { registry, status }
}
