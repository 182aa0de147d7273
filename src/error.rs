//! Unified error types for the RailBoard firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level control loop's error handling uniform.  All variants are `Copy`
//! so they can be passed around without allocation.
//!
//! Note the deliberate asymmetry in the relay path: an out-of-range channel
//! index is *not* an error (permissive-drop, the call is a silent no-op),
//! while an unreachable expander chip *is* — the driver must never claim a
//! state change that did not reach the hardware.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A relay/expander driver operation failed.
    Driver(DriverError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(e) => write!(f, "driver: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Relay / expander driver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The expander chip backing this channel did not respond on the bus.
    /// The channel's commanded state is left unchanged.
    ExpanderUnavailable { chip: u8 },
    /// An I2C transaction failed mid-write.
    BusFault,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExpanderUnavailable { chip } => {
                write!(f, "expander #{} unreachable", chip + 1)
            }
            Self::BusFault => write!(f, "I2C bus fault"),
        }
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
