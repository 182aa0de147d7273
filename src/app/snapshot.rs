//! Outbound full-state snapshot.
//!
//! Every broadcast carries the complete observable state — per-channel
//! inputs, relay positions, mappings, timers, live remaining seconds —
//! plus expander health and the wall clock.  Observers never poll; they
//! reconstruct their entire view from any single message.

use serde::Serialize;

use crate::app::ports::ClockPort;
use crate::channels::ChannelStore;
use crate::pins::NUM_CHANNELS;

/// One full-state message as serialised to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    /// Raw input levels (edge-tracked).
    pub inputs: [bool; NUM_CHANNELS],
    /// Commanded relay states.
    pub outputs: [bool; NUM_CHANNELS],
    /// Input→relay mapping per channel; -1 = unmapped.
    pub mappings: [i8; NUM_CHANNELS],
    /// Configured auto-off delays (seconds; 0 = disabled).
    pub timers: [u32; NUM_CHANNELS],
    /// Seconds left on each running auto-off timer (0 when idle).
    pub remaining: [u32; NUM_CHANNELS],
    /// Reachability of the two relay expander chips.
    pub expanders: [bool; 2],
    /// Wall-clock stamp, `HH:MM:SS` once synced.
    pub time: heapless::String<24>,
    /// Whether the wall clock is SNTP-synced.
    pub ntp: bool,
}

impl StateSnapshot {
    /// Assemble the current observable state.  `remaining` is computed
    /// here, on demand — it is never stored anywhere.
    pub fn capture(store: &ChannelStore, expanders: [bool; 2], clock: &impl ClockPort) -> Self {
        let now_ms = clock.uptime_ms();
        let mut snap = Self {
            inputs: [false; NUM_CHANNELS],
            outputs: [false; NUM_CHANNELS],
            mappings: [-1; NUM_CHANNELS],
            timers: [0; NUM_CHANNELS],
            remaining: [0; NUM_CHANNELS],
            expanders,
            time: clock.timestamp(),
            ntp: clock.is_synced(),
        };
        for (ch, slot) in store.iter().enumerate() {
            snap.inputs[ch] = slot.input_raw;
            snap.outputs[ch] = slot.relay_on;
            snap.mappings[ch] = slot.input_mapping.map_or(-1, |m| m as i8);
            snap.timers[ch] = slot.auto_off_secs;
            snap.remaining[ch] = store.remaining_auto_off_secs(ch, now_ms);
        }
        snap
    }

    /// JSON wire encoding.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;

    struct FixedClock {
        now_ms: u64,
        synced: bool,
    }

    impl ClockPort for FixedClock {
        fn uptime_ms(&self) -> u64 {
            self.now_ms
        }
        fn timestamp(&self) -> heapless::String<24> {
            let mut s = heapless::String::new();
            let _ = s.push_str(if self.synced { "12:34:56" } else { "--:--:--" });
            s
        }
        fn is_synced(&self) -> bool {
            self.synced
        }
    }

    #[test]
    fn capture_reflects_store_state() {
        let mut cfg = BoardConfig::default();
        cfg.input_mapping[3] = Some(7);
        cfg.auto_off_secs[7] = 60;
        let mut store = ChannelStore::from_config(&cfg);
        store.record_relay(7, true, 0);

        let clock = FixedClock { now_ms: 30_000, synced: true };
        let snap = StateSnapshot::capture(&store, [true, true], &clock);

        assert!(snap.outputs[7]);
        assert_eq!(snap.mappings[3], 7);
        assert_eq!(snap.mappings[0], -1);
        assert_eq!(snap.timers[7], 60);
        assert_eq!(snap.remaining[7], 30);
        assert!(snap.ntp);
        assert_eq!(snap.time.as_str(), "12:34:56");
    }

    #[test]
    fn json_contains_wire_fields() {
        let store = ChannelStore::from_config(&BoardConfig::default());
        let clock = FixedClock { now_ms: 0, synced: false };
        let json = StateSnapshot::capture(&store, [true, false], &clock).to_json();

        assert!(json.contains("\"inputs\""));
        assert!(json.contains("\"outputs\""));
        assert!(json.contains("\"mappings\""));
        assert!(json.contains("\"timers\""));
        assert!(json.contains("\"remaining\""));
        assert!(json.contains("\"expanders\":[true,false]"));
        assert!(json.contains("\"ntp\":false"));
    }
}
