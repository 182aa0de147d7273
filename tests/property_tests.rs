//! Property and fuzz-style tests for the control core.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32
//! targets.  On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::cell::Cell;

use proptest::prelude::*;

use railboard::app::commands::Command;
use railboard::app::ports::{
    BroadcastSink, ClockPort, ConfigError, ExpanderPort, InputPort, PersistencePort,
    StatusLedPort,
};
use railboard::app::service::BoardService;
use railboard::app::snapshot::StateSnapshot;
use railboard::config::BoardConfig;
use railboard::indicator::{evaluate, IndicatorMachine, IndicatorState, StatusSignals};
use railboard::{DriverError, NUM_CHANNELS};

// ── Minimal mocks ─────────────────────────────────────────────

struct Hw {
    inputs: [bool; NUM_CHANNELS],
    reachable: [bool; 2],
}

impl Hw {
    fn new() -> Self {
        Self {
            inputs: [false; NUM_CHANNELS],
            reachable: [true, true],
        }
    }
}

impl ExpanderPort for Hw {
    fn write_line(&mut self, chip: u8, _line: u8, _level: bool) -> Result<(), DriverError> {
        if self.reachable[chip as usize] {
            Ok(())
        } else {
            Err(DriverError::ExpanderUnavailable { chip })
        }
    }
    fn is_reachable(&self, chip: u8) -> bool {
        self.reachable[chip as usize]
    }
}

impl InputPort for Hw {
    fn sample_inputs(&mut self) -> [bool; NUM_CHANNELS] {
        self.inputs
    }
}

impl StatusLedPort for Hw {
    fn set_rgb(&mut self, _r: u8, _g: u8, _b: u8) {}
}

struct Clock(Cell<u64>);

impl ClockPort for Clock {
    fn uptime_ms(&self) -> u64 {
        self.0.get()
    }
    fn timestamp(&self) -> heapless::String<24> {
        heapless::String::new()
    }
    fn is_synced(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct Sink {
    count: usize,
}

impl BroadcastSink for Sink {
    fn broadcast(&mut self, _snapshot: &StateSnapshot) {
        self.count += 1;
    }
    fn observer_count(&self) -> usize {
        0
    }
}

#[derive(Default)]
struct Persist;

impl PersistencePort for Persist {
    fn load(&self) -> Result<BoardConfig, ConfigError> {
        Ok(BoardConfig::default())
    }
    fn save(&mut self, _config: &BoardConfig) -> Result<(), ConfigError> {
        Ok(())
    }
    fn save_credentials(&mut self, _ssid: &str, _pass: &str) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// `relay_on_since_ms` must be present exactly when the relay is on.
fn assert_on_since_invariant(service: &BoardService) {
    for (ch, slot) in service.store().iter().enumerate() {
        assert_eq!(
            slot.relay_on,
            slot.relay_on_since_ms.is_some(),
            "channel {ch}: relay_on and relay_on_since_ms out of step"
        );
    }
}

// ── Command fuzzing ───────────────────────────────────────────

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (0u8..24).prop_map(|ch| Command::Toggle { ch }),
        (0u8..24, any::<bool>()).prop_map(|(ch, val)| Command::Set { ch, val }),
        (0u8..24, -5i16..24).prop_map(|(input, output)| Command::Map { input, output }),
        (0u8..24, 0u32..100_000).prop_map(|(ch, secs)| Command::Timer { ch, secs }),
        Just(Command::Alloff),
    ]
}

proptest! {
    /// Arbitrary command storms never panic, never violate the
    /// on/on-since invariant, and acknowledge every single command.
    #[test]
    fn command_storm_keeps_invariants(cmds in proptest::collection::vec(arb_command(), 1..60)) {
        let mut service = BoardService::new(&BoardConfig::default());
        let mut hw = Hw::new();
        let clock = Clock(Cell::new(0));
        let mut sink = Sink::default();
        let mut persist = Persist;

        let total = cmds.len();
        for cmd in cmds {
            clock.0.set(clock.0.get() + 7);
            let outcome = service.handle_command(cmd, &mut hw, &clock, &mut sink, &mut persist);
            prop_assert!(!outcome.restart_requested);
            assert_on_since_invariant(&service);
        }
        prop_assert_eq!(sink.count, total, "ack-always: one broadcast per command");
    }

    /// Same storm with a dead expander chip: errors degrade to no state
    /// change, never to inconsistent bookkeeping.
    #[test]
    fn command_storm_with_dead_chip(cmds in proptest::collection::vec(arb_command(), 1..40)) {
        let mut service = BoardService::new(&BoardConfig::default());
        let mut hw = Hw::new();
        hw.reachable[1] = false;
        let clock = Clock(Cell::new(0));
        let mut sink = Sink::default();
        let mut persist = Persist;

        for cmd in cmds {
            let _ = service.handle_command(cmd, &mut hw, &clock, &mut sink, &mut persist);
            assert_on_since_invariant(&service);
            // Channels 9-12 live on the dead chip and can never turn on.
            for ch in 8..NUM_CHANNELS {
                prop_assert!(!service.store().relay_on(ch));
            }
        }
    }
}

// ── Auto-off timing ───────────────────────────────────────────

proptest! {
    /// The timer fires in exactly the first tick at or past the
    /// deadline, and `remaining` never increases while the relay is on.
    #[test]
    fn auto_off_fires_at_deadline(
        secs in 1u32..600,
        step_ms in 1u64..5_000,
    ) {
        let mut config = BoardConfig::default();
        config.auto_off_secs[0] = secs;
        let mut service = BoardService::new(&config);
        let mut hw = Hw::new();
        let clock = Clock(Cell::new(0));
        let mut sink = Sink::default();

        service.set_relay(&mut hw, &clock, 0, true).unwrap();
        let deadline = u64::from(secs) * 1000;
        let mut last_remaining = u32::MAX;

        loop {
            clock.0.set(clock.0.get() + step_ms);
            service.tick(&mut hw, &clock, &mut sink);
            let now = clock.0.get();

            if now >= deadline {
                prop_assert!(!service.store().relay_on(0), "deadline passed at {now}");
                prop_assert_eq!(service.store().remaining_auto_off_secs(0, now), 0);
                break;
            }
            prop_assert!(service.store().relay_on(0), "fired early at {now}");
            let remaining = service.store().remaining_auto_off_secs(0, now);
            prop_assert!(remaining <= last_remaining);
            prop_assert!(remaining >= 1);
            last_remaining = remaining;
        }
    }

    /// A disabled timer never fires no matter how long the relay is on.
    #[test]
    fn zero_timer_never_fires(hours in 1u64..2_000) {
        let mut service = BoardService::new(&BoardConfig::default());
        let mut hw = Hw::new();
        let clock = Clock(Cell::new(0));
        let mut sink = Sink::default();

        service.set_relay(&mut hw, &clock, 3, true).unwrap();
        clock.0.set(hours * 3_600_000);
        service.tick(&mut hw, &clock, &mut sink);
        prop_assert!(service.store().relay_on(3));
    }
}

// ── Edge detection ────────────────────────────────────────────

proptest! {
    /// Relay toggles equal rising edges of the mapped input exactly;
    /// the previous-sample register always tracks the last sample.
    #[test]
    fn toggle_count_equals_rising_edges(levels in proptest::collection::vec(any::<bool>(), 1..80)) {
        let mut config = BoardConfig::default();
        config.input_mapping[4] = Some(8);
        let mut service = BoardService::new(&config);
        let mut hw = Hw::new();
        let clock = Clock(Cell::new(0));
        let mut sink = Sink::default();

        let mut prev = false;
        let mut rising = 0u32;
        for level in levels {
            if level && !prev {
                rising += 1;
            }
            prev = level;

            hw.inputs[4] = level;
            service.tick(&mut hw, &clock, &mut sink);
            prop_assert_eq!(service.store().get(4).unwrap().input_raw_prev, level);
        }
        // Odd number of toggles leaves the relay on.
        prop_assert_eq!(service.store().relay_on(8), rising % 2 == 1);
    }
}

// ── Indicator rendering ───────────────────────────────────────

fn arb_state() -> impl Strategy<Value = IndicatorState> {
    prop_oneof![
        Just(IndicatorState::Booting),
        Just(IndicatorState::ProvisioningOnly),
        Just(IndicatorState::Connecting),
        Just(IndicatorState::Ready),
        Just(IndicatorState::RelayActive),
        Just(IndicatorState::HardwareError),
        Just(IndicatorState::Maintenance),
        Just(IndicatorState::ObserverConnected),
    ]
}

proptest! {
    /// `render` is a pure function of `now - entered_at`: equal inputs
    /// give equal pixels, and shifting both ends by the same offset
    /// changes nothing.
    #[test]
    fn render_is_phase_absolute(
        state in arb_state(),
        entered in 0u64..1_000_000,
        delta in 0u64..1_000_000,
        shift in 0u64..1_000_000,
    ) {
        let mut a = IndicatorMachine::new();
        a.set_state(state, entered);
        let mut b = IndicatorMachine::new();
        b.set_state(state, entered + shift);

        prop_assert_eq!(a.render(entered + delta), a.render(entered + delta));
        prop_assert_eq!(a.render(entered + delta), b.render(entered + shift + delta));
    }

    /// The priority list always yields exactly one of its six outputs,
    /// and relay activity always outranks observers.
    #[test]
    fn evaluation_is_total_and_ordered(
        hardware_ok in any::<bool>(),
        any_relay_on in any::<bool>(),
        observers in 0usize..4,
        network_connected in any::<bool>(),
        time_synced in any::<bool>(),
    ) {
        let signals = StatusSignals {
            hardware_ok,
            any_relay_on,
            observers,
            network_connected,
            time_synced,
        };
        let state = evaluate(&signals);

        if !hardware_ok {
            prop_assert_eq!(state, IndicatorState::HardwareError);
        } else if any_relay_on {
            prop_assert_eq!(state, IndicatorState::RelayActive);
        } else if observers > 0 {
            prop_assert_eq!(state, IndicatorState::ObserverConnected);
        } else {
            prop_assert!(matches!(
                state,
                IndicatorState::Ready
                    | IndicatorState::ConnectedNoTimeSync
                    | IndicatorState::ProvisioningOnly
            ));
        }
    }
}
