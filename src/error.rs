use thiserror::Error;

/// Failures reading the physical wheel. Never fatal: the poller substitutes
/// neutral input and keeps ticking.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no G29/Logitech wheel found")]
    Unavailable,

    #[error("wheel '{0}' disconnected")]
    Disconnected(String),

    #[error("input backend failed to initialize: {0}")]
    Init(String),
}

#[derive(Debug, Error)]
pub enum VirtualControllerError {
    #[error("virtual controller unavailable: {0}")]
    Unavailable(String),

    #[error("virtual controller driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("input injection failed: {0}")]
    Injection(String),
}
