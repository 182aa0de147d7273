//! Port traits — the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ BoardService (domain)
//! ```
//!
//! Driven adapters (expander bank, GPIO inputs, status LED, observer hub,
//! NVS, clock) implement these traits.  The
//! [`BoardService`](super::service::BoardService) consumes them via
//! generics at call sites, so the domain core never touches hardware
//! directly and the whole service runs under host tests with mocks.

use crate::app::snapshot::StateSnapshot;
use crate::config::BoardConfig;
use crate::error::DriverError;
use crate::pins::NUM_CHANNELS;

// ───────────────────────────────────────────────────────────────
// Relay expander port (domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port onto the 24 expander output lines.
///
/// `write_line` changes one line level; the relay driver composes two
/// writes around a pulse delay to fire a coil.  Implementations must not
/// buffer — a returned `Ok` means the level reached the chip.
pub trait ExpanderPort {
    fn write_line(&mut self, chip: u8, line: u8, level: bool) -> Result<(), DriverError>;

    /// Whether the given expander chip responded during the last probe.
    fn is_reachable(&self, chip: u8) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Digital input port (hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: raw levels of the twelve opto-isolated inputs.
pub trait InputPort {
    fn sample_inputs(&mut self) -> [bool; NUM_CHANNELS];
}

// ───────────────────────────────────────────────────────────────
// Status LED port (domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Single-pixel RGB output for the indicator state machine.
pub trait StatusLedPort {
    fn set_rgb(&mut self, r: u8, g: u8, b: u8);
}

// ───────────────────────────────────────────────────────────────
// Observer broadcast port (domain → connected clients)
// ───────────────────────────────────────────────────────────────

/// Fan-out side of the synchronization protocol.  Transport identity is
/// opaque to the core; it only needs the listener count and "send to all".
pub trait BroadcastSink {
    fn broadcast(&mut self, snapshot: &StateSnapshot);

    /// Number of currently attached observers (feeds the indicator rules).
    fn observer_count(&self) -> usize;

    /// Reap dead connections.  Called once per tick, before anything else.
    fn cleanup(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Persistence port (domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Loads and persists board configuration plus network credentials.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait PersistencePort {
    /// Load configuration from persistent storage.
    /// Returns [`BoardConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<BoardConfig, ConfigError>;

    /// Validate and persist mapping + timer configuration.
    fn save(&mut self, config: &BoardConfig) -> Result<(), ConfigError>;

    /// Persist station credentials (separate namespace; applied on the
    /// next boot by the provisioning layer).
    fn save_credentials(&mut self, ssid: &str, pass: &str) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (monotonic uptime + wall clock)
// ───────────────────────────────────────────────────────────────

/// Time queries for timers, pattern phases, and snapshot stamping.
pub trait ClockPort {
    /// Milliseconds since boot, monotonic.
    fn uptime_ms(&self) -> u64;

    /// `HH:MM:SS` wall-clock string, or a placeholder before time sync.
    fn timestamp(&self) -> heapless::String<24>;

    /// Whether the wall clock has been synchronized (SNTP).
    fn is_synced(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`PersistencePort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
