use derive_more::derive::{Display, Error};

use crate::resources::Resource;

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
#[derive(Debug, Display, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free sampling lane, program space, transfer channel, or interrupt line.
    /// Claims are all-or-nothing, so the caller may report this and retry.
    #[display("No free {_0} is available")]
    ResourceExhausted(#[error(not(source))] Resource),

    /// The frame failed the address or data inversion check.
    #[display("Malformed NEC frame 0x{raw:08X}")]
    MalformedFrame { raw: u32 },

    /// Rejected before any hardware claim was attempted.
    #[display("Invalid configuration: {_0}")]
    InvalidConfiguration(#[error(not(source))] ConfigError),

    /// The capture was cancelled before the transfer filled the buffer.
    #[display("Capture cancelled before the trigger fired or the buffer filled")]
    HardwareTimeout,

    /// A claim was returned to a slot that already holds a resource.
    #[display("{_0} slot is already occupied")]
    ReleaseConflict(#[error(not(source))] Resource),

    /// `set_notifications(.., true)` was called twice without a disable in between.
    #[display("Notifications are already enabled for this decoder")]
    NotificationAlreadyEnabled,

    // `embassy_executor::SpawnError` does not implement `core::error::Error`, so
    // `#[error(not(source))]` keeps `derive_more` from treating it as a source.
    #[cfg(target_os = "none")]
    #[display("{_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),
}

/// Why a configuration was rejected.
#[expect(missing_docs, reason = "The variants are self-explanatory.")]
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[display("pin count must be one of 1, 2, 4, 8, 16, 32")]
    PinCount,
    #[display("pin {_0} is not a GPIO")]
    PinOutOfRange(u8),
    #[display("pin {_0} is not wired to this sampling block")]
    PinUnavailable(u8),
    #[display("clock divider is outside 1.0..=65536.0")]
    DividerOutOfRange,
    #[display("capture buffer has no room for a single word")]
    EmptyBuffer,
    #[display("pin index {_0} is beyond the captured pin count")]
    PinIndex(u8),
    #[display("capture session was already released")]
    SessionReleased,
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfiguration(err)
    }
}

#[cfg(target_os = "none")]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        Self::TaskSpawn(err)
    }
}
