// Audio output device registry.
//
// Discovers the host's render devices through a `DeviceProvider`, tracks
// the OS default, and keeps registered consumers pointed at devices that
// still exist while hot-plug notifications arrive from platform threads.

pub mod log;
pub mod config;
pub mod audio;

pub use audio::*;
pub use config::RegistryConfig;
