//! Channel state model.
//!
//! One [`Channel`] per input/output pair, owned exclusively by the
//! [`ChannelStore`].  The store is plain data — it never touches
//! hardware.  All mutation flows through the relay driver, the input
//! scanner, the auto-off sweep, or the command handler, which the
//! control loop serialises onto a single logical thread.

use crate::config::BoardConfig;
use crate::pins::NUM_CHANNELS;

/// Runtime state of one input/output channel pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct Channel {
    /// Current commanded relay state.
    pub relay_on: bool,
    /// Latest observed input level (updated on edges only).
    pub input_raw: bool,
    /// Previous raw sample — edge-detection scratch, updated every tick.
    pub input_raw_prev: bool,
    /// Relay toggled by a rising edge on this input, if mapped.
    pub input_mapping: Option<u8>,
    /// Auto-off delay in seconds; 0 disables the timer.
    pub auto_off_secs: u32,
    /// Uptime at which the relay last turned on.  Present iff the relay
    /// is on and was switched through the driver's on-path; cleared on
    /// turn-off and absent after a restart.
    pub relay_on_since_ms: Option<u64>,
}

/// The twelve channel records plus bulk queries over them.
pub struct ChannelStore {
    channels: [Channel; NUM_CHANNELS],
}

impl ChannelStore {
    /// Build the store from persisted configuration.  Runtime state is
    /// zeroed: every relay off, no retained timers, inputs low.
    pub fn from_config(config: &BoardConfig) -> Self {
        let mut channels = [Channel::default(); NUM_CHANNELS];
        for (ch, slot) in channels.iter_mut().enumerate() {
            slot.input_mapping = config.input_mapping[ch].filter(|&m| (m as usize) < NUM_CHANNELS);
            slot.auto_off_secs = config.auto_off_secs[ch];
        }
        Self { channels }
    }

    pub fn get(&self, ch: usize) -> Option<&Channel> {
        self.channels.get(ch)
    }

    pub fn get_mut(&mut self, ch: usize) -> Option<&mut Channel> {
        self.channels.get_mut(ch)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Relay bookkeeping after a successful coil pulse.  Returns whether
    /// the logical state actually changed.
    pub fn record_relay(&mut self, ch: usize, on: bool, now_ms: u64) -> bool {
        let Some(slot) = self.channels.get_mut(ch) else {
            return false;
        };
        let changed = slot.relay_on != on;
        slot.relay_on = on;
        slot.relay_on_since_ms = on.then_some(now_ms);
        changed
    }

    pub fn relay_on(&self, ch: usize) -> bool {
        self.channels.get(ch).is_some_and(|c| c.relay_on)
    }

    pub fn any_relay_on(&self) -> bool {
        self.channels.iter().any(|c| c.relay_on)
    }

    /// Update an input mapping.  The target has already been range-checked
    /// by the command handler; `None` unmaps the input.
    pub fn set_mapping(&mut self, input: usize, output: Option<u8>) {
        if let Some(slot) = self.channels.get_mut(input) {
            slot.input_mapping = output;
        }
    }

    pub fn set_auto_off(&mut self, ch: usize, secs: u32) {
        if let Some(slot) = self.channels.get_mut(ch) {
            slot.auto_off_secs = secs;
        }
    }

    /// Seconds until the auto-off timer fires, rounded up.  0 whenever the
    /// relay is off, no timer is configured, or no deadline is running —
    /// recomputed on demand for snapshots, never stored.
    pub fn remaining_auto_off_secs(&self, ch: usize, now_ms: u64) -> u32 {
        let Some(slot) = self.channels.get(ch) else {
            return 0;
        };
        if !slot.relay_on || slot.auto_off_secs == 0 {
            return 0;
        }
        let Some(since) = slot.relay_on_since_ms else {
            return 0;
        };
        let total_ms = u64::from(slot.auto_off_secs) * 1000;
        let elapsed_ms = now_ms.saturating_sub(since);
        if elapsed_ms >= total_ms {
            return 0;
        }
        ((total_ms - elapsed_ms).div_ceil(1000)) as u32
    }

    /// Persisted view of the store (mapping + timers).
    pub fn to_config(&self, tick_interval_ms: u32) -> BoardConfig {
        let mut config = BoardConfig {
            tick_interval_ms,
            ..BoardConfig::default()
        };
        for (ch, slot) in self.channels.iter().enumerate() {
            config.input_mapping[ch] = slot.input_mapping;
            config.auto_off_secs[ch] = slot.auto_off_secs;
        }
        config
    }
}
