//! Board service — the hexagonal core.
//!
//! [`BoardService`] owns the channel store and the indicator machine and
//! implements the three coupled behaviours on top of them: the relay
//! driver (bistable pulse semantics), the per-tick input scan + auto-off
//! sweep, and the synchronization command dispatch with its broadcast
//! policy.  All I/O flows through port traits injected at call sites,
//! making the entire service testable with mock adapters.
//!
//! ```text
//!   InputPort ──▶ ┌────────────────────────────┐ ──▶ BroadcastSink
//!                 │        BoardService         │
//! ExpanderPort ◀──│  channels · indicator ·     │
//! StatusLedPort ◀─│  relay pulses · auto-off    │
//!                 └────────────────────────────┘
//! ```
//!
//! Concurrency contract: every entry point below must be called from one
//! logical thread of control.  The control loop drains the command
//! mailbox between ticks, so command handling never interleaves with a
//! tick; the service itself carries no locking.

use log::{debug, info, warn};

use crate::app::commands::Command;
use crate::app::ports::{
    BroadcastSink, ClockPort, ExpanderPort, InputPort, PersistencePort, StatusLedPort,
};
use crate::app::snapshot::StateSnapshot;
use crate::channels::ChannelStore;
use crate::config::BoardConfig;
use crate::drivers::hw_init;
use crate::error::{DriverError, Result};
use crate::indicator::{evaluate, IndicatorMachine, IndicatorState, StatusSignals};
use crate::pins::{NUM_CHANNELS, RELAY_LINES, RELAY_PULSE_MS};

/// What a dispatched command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Whether any channel or configuration state actually changed.
    pub mutated: bool,
    /// Set by the credentials command: the process must restart now.
    pub restart_requested: bool,
}

/// The control core: channel bookkeeping, relay pulsing, edge-triggered
/// toggles, auto-off enforcement, indicator priority, and the
/// change-triggered observer broadcast.
pub struct BoardService {
    store: ChannelStore,
    indicator: IndicatorMachine,
    tick_interval_ms: u32,

    // Collaborator signals, cached between trigger events.
    network_connected: bool,
    time_synced: bool,
    observers: usize,
}

impl BoardService {
    /// Construct from persisted configuration.  Runtime state starts
    /// zeroed; call [`startup_reset`](Self::startup_reset) before the
    /// first tick to force the physical relays into agreement.
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            store: ChannelStore::from_config(config),
            indicator: IndicatorMachine::new(),
            tick_interval_ms: config.tick_interval_ms,
            network_connected: false,
            time_synced: false,
            observers: 0,
        }
    }

    // ── Relay driver ──────────────────────────────────────────

    /// Drive one relay to `on` with a momentary coil pulse.
    ///
    /// Out-of-range `ch` is a silent no-op (`Ok(false)`), matching the
    /// permissive command policy.  An unreachable expander chip returns
    /// [`DriverError::ExpanderUnavailable`] and leaves the commanded
    /// state untouched — the driver never claims a change that did not
    /// reach the hardware.  On success returns whether the logical state
    /// flipped; re-commanding the current state still pulses the coil
    /// and, when on, restarts the auto-off clock.
    pub fn set_relay(
        &mut self,
        hw: &mut impl ExpanderPort,
        clock: &impl ClockPort,
        ch: usize,
        on: bool,
    ) -> Result<bool> {
        let Some(lines) = RELAY_LINES.get(ch) else {
            return Ok(false);
        };

        if !hw.is_reachable(lines.chip) {
            warn!("relay {}: expander #{} not ready", ch + 1, lines.chip + 1);
            self.refresh_indicator(hw, clock);
            return Err(DriverError::ExpanderUnavailable { chip: lines.chip }.into());
        }

        // Bistable latch: power only flows while changing state.  The
        // pulse blocks the tick for its duration by design; it is never
        // queued, coalesced, or cancelled.
        let line = if on { lines.set_line } else { lines.reset_line };
        hw.write_line(lines.chip, line, true)?;
        hw_init::pulse_delay_ms(RELAY_PULSE_MS);
        hw.write_line(lines.chip, line, false)?;

        let changed = self.store.record_relay(ch, on, clock.uptime_ms());
        info!("relay {}: {}", ch + 1, if on { "ON" } else { "OFF" });

        self.refresh_indicator(hw, clock);
        Ok(changed)
    }

    /// Flip one relay.
    pub fn toggle_relay(
        &mut self,
        hw: &mut impl ExpanderPort,
        clock: &impl ClockPort,
        ch: usize,
    ) -> Result<bool> {
        let desired = !self.store.relay_on(ch);
        self.set_relay(hw, clock, ch, desired)
    }

    /// Force every relay's RESET coil once at boot.  All reset lines are
    /// raised together, held for one pulse width, then dropped — a bulk
    /// reset over parallel lines instead of twelve serial pulses.
    pub fn startup_reset(&mut self, hw: &mut impl ExpanderPort) {
        for lines in &RELAY_LINES {
            if hw.is_reachable(lines.chip) {
                if let Err(e) = hw.write_line(lines.chip, lines.reset_line, true) {
                    warn!("startup reset: {}", e);
                }
            }
        }
        hw_init::pulse_delay_ms(RELAY_PULSE_MS);
        for lines in &RELAY_LINES {
            if hw.is_reachable(lines.chip) {
                if let Err(e) = hw.write_line(lines.chip, lines.reset_line, false) {
                    warn!("startup reset: {}", e);
                }
            }
        }
        info!("all relays reset");
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cooperative tick: observer cleanup → indicator render →
    /// input scan (may toggle relays) → auto-off sweep (may turn relays
    /// off) → broadcast, but only if something observable changed.
    pub fn tick(
        &mut self,
        hw: &mut (impl ExpanderPort + InputPort + StatusLedPort),
        clock: &impl ClockPort,
        sink: &mut impl BroadcastSink,
    ) {
        sink.cleanup();

        let (r, g, b) = self.indicator.render(clock.uptime_ms());
        hw.set_rgb(r, g, b);

        let mut changed = self.scan_inputs(hw, clock);
        changed |= self.sweep_auto_off(hw, clock);

        if changed {
            self.broadcast(hw, clock, sink);
        }
    }

    /// Sample all inputs and act on edges.  Rising edge: record the
    /// level and toggle the mapped relay (impulse-switch semantics).
    /// Falling edge: record only.  `input_raw_prev` is updated
    /// unconditionally — this is sampling, not event capture, and edges
    /// faster than the tick period are lost by design.
    fn scan_inputs(
        &mut self,
        hw: &mut (impl ExpanderPort + InputPort),
        clock: &impl ClockPort,
    ) -> bool {
        let levels = hw.sample_inputs();
        let mut changed = false;

        for ch in 0..NUM_CHANNELS {
            let current = levels[ch];
            let Some(slot) = self.store.get_mut(ch) else {
                continue;
            };
            let prev = slot.input_raw_prev;
            slot.input_raw_prev = current;

            if current && !prev {
                slot.input_raw = true;
                changed = true;
                debug!("input {}: rising edge", ch + 1);
                let mapping = slot.input_mapping;
                if let Some(out) = mapping {
                    if (out as usize) < NUM_CHANNELS {
                        if let Err(e) = self.toggle_relay(hw, clock, out as usize) {
                            warn!("input {}: relay {} toggle failed: {}", ch + 1, out + 1, e);
                        }
                    }
                }
            } else if !current && prev {
                slot.input_raw = false;
                changed = true;
            }
        }
        changed
    }

    /// Turn off every relay whose auto-off deadline has elapsed.
    fn sweep_auto_off(&mut self, hw: &mut impl ExpanderPort, clock: &impl ClockPort) -> bool {
        let now_ms = clock.uptime_ms();
        let mut changed = false;

        for ch in 0..NUM_CHANNELS {
            let Some(slot) = self.store.get(ch) else {
                continue;
            };
            if !slot.relay_on || slot.auto_off_secs == 0 {
                continue;
            }
            let Some(since) = slot.relay_on_since_ms else {
                continue;
            };
            let total_ms = u64::from(slot.auto_off_secs) * 1000;
            if now_ms.saturating_sub(since) >= total_ms {
                info!("auto-off: relay {} after {} s", ch + 1, slot.auto_off_secs);
                match self.set_relay(hw, clock, ch, false) {
                    Ok(_) => changed = true,
                    Err(e) => warn!("auto-off relay {}: {}", ch + 1, e),
                }
            }
        }
        changed
    }

    // ── Command dispatch ──────────────────────────────────────

    /// Dispatch one decoded observer command.
    ///
    /// Invalid channel indices are permissive no-ops.  Every non-terminal
    /// command — including provable no-ops — ends with a full-state
    /// broadcast as acknowledgment.  The credentials command is terminal:
    /// it persists, flags the restart, and skips the acknowledgment
    /// (the restart preempts it).
    pub fn handle_command(
        &mut self,
        cmd: Command,
        hw: &mut impl ExpanderPort,
        clock: &impl ClockPort,
        sink: &mut impl BroadcastSink,
        persist: &mut impl PersistencePort,
    ) -> CommandOutcome {
        let mut mutated = false;
        let mut restart = false;

        match cmd {
            Command::Toggle { ch } => {
                mutated = self
                    .toggle_relay(hw, clock, ch as usize)
                    .unwrap_or_else(|e| {
                        warn!("toggle relay {}: {}", ch + 1, e);
                        false
                    });
            }

            Command::Set { ch, val } => {
                mutated = self
                    .set_relay(hw, clock, ch as usize, val)
                    .unwrap_or_else(|e| {
                        warn!("set relay {}: {}", ch + 1, e);
                        false
                    });
            }

            Command::Map { input, output } => {
                let output_valid = (-1..NUM_CHANNELS as i16).contains(&output);
                if (input as usize) < NUM_CHANNELS && output_valid {
                    let mapping = u8::try_from(output).ok();
                    self.store.set_mapping(input as usize, mapping);
                    match mapping {
                        Some(out) => info!("mapping: input {} -> relay {}", input + 1, out + 1),
                        None => info!("mapping: input {} cleared", input + 1),
                    }
                    self.persist(persist);
                    mutated = true;
                }
            }

            Command::Timer { ch, secs } => {
                if (ch as usize) < NUM_CHANNELS {
                    self.store.set_auto_off(ch as usize, secs);
                    info!("auto-off relay {}: {} s", ch + 1, secs);
                    self.persist(persist);
                    mutated = true;
                }
            }

            Command::Alloff => {
                info!("all relays off");
                for ch in 0..NUM_CHANNELS {
                    if self.store.relay_on(ch) {
                        match self.set_relay(hw, clock, ch, false) {
                            Ok(c) => mutated |= c,
                            Err(e) => warn!("all-off relay {}: {}", ch + 1, e),
                        }
                    }
                }
            }

            Command::Wifi { ssid, pass } => {
                info!("station credentials updated: '{}'", ssid);
                if let Err(e) = persist.save_credentials(&ssid, &pass) {
                    warn!("credential save failed: {}", e);
                }
                self.indicator
                    .set_state(IndicatorState::Booting, clock.uptime_ms());
                mutated = true;
                restart = true;
            }
        }

        if !restart {
            self.broadcast(hw, clock, sink);
        }

        CommandOutcome {
            mutated,
            restart_requested: restart,
        }
    }

    // ── Collaborator signal hooks ─────────────────────────────

    /// Observer attach/detach notification from the hub.
    pub fn on_observer_count(
        &mut self,
        count: usize,
        hw: &impl ExpanderPort,
        clock: &impl ClockPort,
    ) {
        if count != self.observers {
            self.observers = count;
            self.refresh_indicator(hw, clock);
        }
    }

    /// Uplink connectivity change from the provisioning layer.
    pub fn on_network_status(
        &mut self,
        connected: bool,
        hw: &impl ExpanderPort,
        clock: &impl ClockPort,
    ) {
        if connected != self.network_connected {
            self.network_connected = connected;
            self.refresh_indicator(hw, clock);
        }
    }

    /// First successful SNTP sync.
    pub fn on_time_synced(&mut self, hw: &impl ExpanderPort, clock: &impl ClockPort) {
        if !self.time_synced {
            self.time_synced = true;
            info!("wall clock synchronized");
            self.refresh_indicator(hw, clock);
        }
    }

    /// Explicitly park the indicator in a transitional state (Booting,
    /// Connecting, ConfigError, Maintenance).  It stays there until the
    /// next trigger event re-evaluates the priority list.
    pub fn set_indicator(&mut self, state: IndicatorState, clock: &impl ClockPort) {
        self.indicator.set_state(state, clock.uptime_ms());
    }

    /// Leave any transitional state and re-run the priority list now.
    /// Called once at the end of boot, after provisioning settles.
    pub fn refresh_status(&mut self, hw: &impl ExpanderPort, clock: &impl ClockPort) {
        self.refresh_indicator(hw, clock);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn indicator_state(&self) -> IndicatorState {
        self.indicator.state()
    }

    /// Capture the current observable state for broadcast.
    pub fn snapshot(&self, hw: &impl ExpanderPort, clock: &impl ClockPort) -> StateSnapshot {
        StateSnapshot::capture(
            &self.store,
            [hw.is_reachable(0), hw.is_reachable(1)],
            clock,
        )
    }

    // ── Internal ──────────────────────────────────────────────

    fn broadcast(
        &self,
        hw: &impl ExpanderPort,
        clock: &impl ClockPort,
        sink: &mut impl BroadcastSink,
    ) {
        let snap = self.snapshot(hw, clock);
        sink.broadcast(&snap);
    }

    /// Re-run the priority list against fresh signals.  Called on relay
    /// changes, observer attach/detach, connectivity and time-sync
    /// transitions — not every tick, so explicitly parked states persist.
    fn refresh_indicator(&mut self, hw: &impl ExpanderPort, clock: &impl ClockPort) {
        let signals = StatusSignals {
            hardware_ok: hw.is_reachable(0) || hw.is_reachable(1),
            any_relay_on: self.store.any_relay_on(),
            observers: self.observers,
            network_connected: self.network_connected,
            time_synced: self.time_synced,
        };
        self.indicator.set_state(evaluate(&signals), clock.uptime_ms());
    }

    fn persist(&self, persist: &mut impl PersistencePort) {
        let cfg = self.store.to_config(self.tick_interval_ms);
        if let Err(e) = persist.save(&cfg) {
            warn!("config save failed: {}", e);
        }
    }
}
