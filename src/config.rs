//! Persisted board configuration.
//!
//! Only the input→relay mappings and the per-channel auto-off timers
//! survive a restart (plus WiFi credentials, which live in a separate
//! NVS namespace owned by the provisioning layer).  Runtime channel
//! state — relay positions, raw input levels, running timers — is
//! deliberately volatile: the board always boots with every relay
//! forced off and no retained deadlines.

use serde::{Deserialize, Serialize};

use crate::pins::NUM_CHANNELS;

/// Configuration persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Which relay a rising edge on each input toggles.  `None` leaves
    /// the input unmapped (observable on the wire as `-1`).
    pub input_mapping: [Option<u8>; NUM_CHANNELS],

    /// Auto-off delay per relay in seconds; 0 disables the timer.
    pub auto_off_secs: [u32; NUM_CHANNELS],

    /// Cooperative control loop period (milliseconds).
    pub tick_interval_ms: u32,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            input_mapping: [None; NUM_CHANNELS],
            auto_off_secs: [0; NUM_CHANNELS],
            tick_interval_ms: 10,
        }
    }
}

impl BoardConfig {
    /// Wire/persistence encoding of one mapping slot (`-1` = unmapped).
    pub fn mapping_as_i8(&self, input: usize) -> i8 {
        match self.input_mapping.get(input).copied().flatten() {
            Some(out) => out as i8,
            None => -1,
        }
    }
}
