// Device registry error taxonomy
//
// Init-time failures collapse into the registry's terminal failed state.
// Lookup misses and transient enumeration errors are per-call and
// recoverable.

/// Errors that can occur during device registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Audio is disabled by configuration")]
    Disabled,

    #[error("Audio device provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("No default render device")]
    NoDefaultDevice,

    #[error("Audio backend construction failed: {0}")]
    BackendConstructionFailed(String),

    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("The specified audio device doesn't exist: {0}")]
    DeviceNotFound(String),
}

impl DeviceError {
    /// Whether this error puts the registry into its terminal failed state
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DeviceError::Disabled
                | DeviceError::ProviderUnavailable(_)
                | DeviceError::NoDefaultDevice
                | DeviceError::BackendConstructionFailed(_)
        )
    }

    pub(crate) fn provider(err: anyhow::Error) -> Self {
        DeviceError::ProviderUnavailable(format!("{:#}", err))
    }

    pub(crate) fn backend(err: anyhow::Error) -> Self {
        DeviceError::BackendConstructionFailed(format!("{:#}", err))
    }

    pub(crate) fn enumeration(err: anyhow::Error) -> Self {
        DeviceError::EnumerationFailed(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
