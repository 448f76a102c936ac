// Registry configuration
//
// Loaded from JSON (file or string) with every field optional, then
// optionally patched from the environment.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that administratively disables audio ("1"/"true")
pub const DISABLE_AUDIO_ENV: &str = "AUDIO_REGISTRY_DISABLE_AUDIO";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Audio is administratively disabled; initialization fails without probing
    pub disable_audio: bool,

    /// Log the enumerated devices at info level after initialization
    pub log_device_dump: bool,

    /// Polling cadence for providers without native notifications
    pub poll_interval_ms: u64,

    /// Capacity of the registry change broadcast channel
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            disable_audio: false,
            log_device_dump: true,
            poll_interval_ms: 1000,
            event_capacity: 64,
        }
    }
}

impl RegistryConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid registry configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry config {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Apply `AUDIO_REGISTRY_DISABLE_AUDIO` on top of the loaded values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(DISABLE_AUDIO_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.disable_audio = true,
                "0" | "false" | "no" => self.disable_audio = false,
                other => {
                    tracing::warn!("Ignoring {}={:?}: not a boolean", DISABLE_AUDIO_ENV, other)
                }
            }
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
