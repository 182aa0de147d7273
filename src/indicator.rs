//! Status indicator state machine.
//!
//! A single RGB pixel communicates the device condition through colour
//! and motion.  Each [`IndicatorState`] maps to exactly one entry in a
//! static pattern table; adding a state means adding a table row, no
//! branching elsewhere.
//!
//! Rendering is non-blocking and phase-absolute: every pattern is a pure
//! function of `now - entered_at`, so [`IndicatorMachine::render`] can be
//! called at any cadence at or above the tick period without drift.  No
//! timers or threads are involved.
//!
//! | State               | Colour  | Pattern             |
//! |---------------------|---------|---------------------|
//! | Booting             | white   | fast blink (200 ms) |
//! | ProvisioningOnly    | yellow  | slow pulse (2 s)    |
//! | Connecting          | blue    | blink (400 ms)      |
//! | ConnectedNoTimeSync | cyan    | solid               |
//! | Ready               | green   | solid               |
//! | RelayActive         | green   | slow blink (2 s)    |
//! | HardwareError       | red     | fast blink (400 ms) |
//! | ConfigError         | red     | solid               |
//! | Maintenance         | magenta | fast pulse (500 ms) |
//! | ObserverConnected   | green   | 50 ms flash every 3 s |

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

const COL_OFF: Rgb = (0, 0, 0);
const COL_WHITE: Rgb = (255, 255, 255);
const COL_GREEN: Rgb = (0, 255, 0);
const COL_RED: Rgb = (255, 0, 0);
const COL_BLUE: Rgb = (0, 0, 255);
const COL_CYAN: Rgb = (0, 255, 255);
const COL_YELLOW: Rgb = (255, 180, 0);
const COL_MAGENTA: Rgb = (255, 0, 255);

// ---------------------------------------------------------------------------
// States and patterns
// ---------------------------------------------------------------------------

/// Device-level conditions the indicator can express.  Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndicatorState {
    Off = 0,
    Booting = 1,
    /// Fallback: no uplink, only the provisioning access point is up.
    ProvisioningOnly = 2,
    Connecting = 3,
    ConnectedNoTimeSync = 4,
    Ready = 5,
    RelayActive = 6,
    HardwareError = 7,
    ConfigError = 8,
    Maintenance = 9,
    ObserverConnected = 10,
}

impl IndicatorState {
    pub const COUNT: usize = 11;
}

/// Waveform shape for one pattern-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Constant colour, full brightness.
    Solid,
    /// Square wave, 50 % duty cycle over `period_ms`.
    Blink,
    /// Triangular brightness ramp 0→1→0, squared for perceptual gamma.
    Pulse,
    /// Colour for the first `on_ms` of each cycle, off for the rest.
    Flash,
}

/// One row of the pattern table.
#[derive(Debug, Clone, Copy)]
pub struct PatternDef {
    pub color: Rgb,
    pub kind: PatternKind,
    pub period_ms: u16,
    /// Flash only: duration of the visible burst.
    pub on_ms: u16,
}

const fn solid(color: Rgb) -> PatternDef {
    PatternDef { color, kind: PatternKind::Solid, period_ms: 0, on_ms: 0 }
}

const fn blink(color: Rgb, period_ms: u16) -> PatternDef {
    PatternDef { color, kind: PatternKind::Blink, period_ms, on_ms: 0 }
}

const fn pulse(color: Rgb, period_ms: u16) -> PatternDef {
    PatternDef { color, kind: PatternKind::Pulse, period_ms, on_ms: 0 }
}

const fn flash(color: Rgb, period_ms: u16, on_ms: u16) -> PatternDef {
    PatternDef { color, kind: PatternKind::Flash, period_ms, on_ms }
}

/// Static state→pattern mapping, indexed by `IndicatorState as usize`.
static PATTERNS: [PatternDef; IndicatorState::COUNT] = [
    solid(COL_OFF),                // Off
    blink(COL_WHITE, 200),         // Booting
    pulse(COL_YELLOW, 2000),       // ProvisioningOnly
    blink(COL_BLUE, 400),          // Connecting
    solid(COL_CYAN),               // ConnectedNoTimeSync
    solid(COL_GREEN),              // Ready
    blink(COL_GREEN, 2000),        // RelayActive
    blink(COL_RED, 400),           // HardwareError
    solid(COL_RED),                // ConfigError
    pulse(COL_MAGENTA, 500),       // Maintenance
    flash(COL_GREEN, 3000, 50),    // ObserverConnected
];

pub fn pattern_for(state: IndicatorState) -> &'static PatternDef {
    &PATTERNS[state as usize]
}

// ---------------------------------------------------------------------------
// Priority evaluation
// ---------------------------------------------------------------------------

/// Condition inputs for the priority rules, recomputed from the live
/// system whenever a trigger event fires.  Keeping this a plain struct
/// decouples the machine from how the signals are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSignals {
    /// At least one relay expander chip answers on the bus.
    pub hardware_ok: bool,
    pub any_relay_on: bool,
    pub observers: usize,
    pub network_connected: bool,
    pub time_synced: bool,
}

/// First-match-wins priority list.  This is deliberately not a free-form
/// transition graph: the highest-ranked active condition owns the pixel.
pub fn evaluate(signals: &StatusSignals) -> IndicatorState {
    if !signals.hardware_ok {
        IndicatorState::HardwareError
    } else if signals.any_relay_on {
        IndicatorState::RelayActive
    } else if signals.observers > 0 {
        IndicatorState::ObserverConnected
    } else if signals.network_connected && signals.time_synced {
        IndicatorState::Ready
    } else if signals.network_connected {
        IndicatorState::ConnectedNoTimeSync
    } else {
        IndicatorState::ProvisioningOnly
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Holds the current state and the phase origin for pattern rendering.
pub struct IndicatorMachine {
    current: IndicatorState,
    entered_at_ms: u64,
}

impl IndicatorMachine {
    pub fn new() -> Self {
        Self {
            current: IndicatorState::Off,
            entered_at_ms: 0,
        }
    }

    pub fn state(&self) -> IndicatorState {
        self.current
    }

    /// Switch states.  Re-entering the current state is a no-op so an
    /// unchanged condition never restarts the waveform mid-cycle.
    pub fn set_state(&mut self, state: IndicatorState, now_ms: u64) {
        if state == self.current {
            return;
        }
        log::debug!("indicator: {:?} -> {:?}", self.current, state);
        self.current = state;
        self.entered_at_ms = now_ms;
    }

    /// Current pixel colour for wall-clock `now_ms`.  Pure in
    /// `now_ms - entered_at_ms`; call it as often as you like.
    pub fn render(&self, now_ms: u64) -> Rgb {
        let def = pattern_for(self.current);
        let elapsed = now_ms.saturating_sub(self.entered_at_ms);

        match def.kind {
            PatternKind::Solid => def.color,
            PatternKind::Blink => {
                let period = u64::from(def.period_ms.max(1));
                if elapsed % period < period / 2 {
                    def.color
                } else {
                    COL_OFF
                }
            }
            PatternKind::Pulse => {
                let period = u64::from(def.period_ms.max(1));
                let phase = (elapsed % period) as f32 / period as f32;
                // Triangle 0→1→0, then squared for a smoother visual ramp.
                let triangle = if phase < 0.5 {
                    phase * 2.0
                } else {
                    (1.0 - phase) * 2.0
                };
                let brightness = triangle * triangle;
                scale(def.color, (brightness * 255.0) as u8)
            }
            PatternKind::Flash => {
                let period = u64::from(def.period_ms.max(1));
                if elapsed % period < u64::from(def.on_ms) {
                    def.color
                } else {
                    COL_OFF
                }
            }
        }
    }
}

fn scale((r, g, b): Rgb, brightness: u8) -> Rgb {
    let br = u16::from(brightness);
    (
        ((u16::from(r) * br) / 255) as u8,
        ((u16::from(g) * br) / 255) as u8,
        ((u16::from(b) * br) / 255) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_hardware_error_beats_everything() {
        let s = StatusSignals {
            hardware_ok: false,
            any_relay_on: true,
            observers: 3,
            network_connected: true,
            time_synced: true,
        };
        assert_eq!(evaluate(&s), IndicatorState::HardwareError);
    }

    #[test]
    fn priority_relay_active_beats_observers() {
        let s = StatusSignals {
            hardware_ok: true,
            any_relay_on: true,
            observers: 2,
            network_connected: true,
            time_synced: true,
        };
        assert_eq!(evaluate(&s), IndicatorState::RelayActive);
    }

    #[test]
    fn priority_observer_beats_ready() {
        let s = StatusSignals {
            hardware_ok: true,
            any_relay_on: false,
            observers: 1,
            network_connected: true,
            time_synced: true,
        };
        assert_eq!(evaluate(&s), IndicatorState::ObserverConnected);
    }

    #[test]
    fn priority_time_sync_splits_connected_states() {
        let mut s = StatusSignals {
            hardware_ok: true,
            network_connected: true,
            time_synced: true,
            ..Default::default()
        };
        assert_eq!(evaluate(&s), IndicatorState::Ready);
        s.time_synced = false;
        assert_eq!(evaluate(&s), IndicatorState::ConnectedNoTimeSync);
    }

    #[test]
    fn priority_falls_back_to_provisioning() {
        let s = StatusSignals {
            hardware_ok: true,
            ..Default::default()
        };
        assert_eq!(evaluate(&s), IndicatorState::ProvisioningOnly);
    }

    #[test]
    fn render_is_deterministic() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::ProvisioningOnly, 1_000);
        assert_eq!(m.render(1_700), m.render(1_700));
    }

    #[test]
    fn blink_alternates_across_half_period() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::Booting, 0); // white blink, 200 ms
        assert_eq!(m.render(0), COL_WHITE);
        assert_eq!(m.render(99), COL_WHITE);
        assert_eq!(m.render(100), COL_OFF);
        assert_eq!(m.render(199), COL_OFF);
        assert_eq!(m.render(200), COL_WHITE);
    }

    #[test]
    fn pulse_peaks_mid_cycle_and_rests_at_edges() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::Maintenance, 0); // magenta pulse, 500 ms
        assert_eq!(m.render(0), COL_OFF);
        assert_eq!(m.render(250), COL_MAGENTA);
        // Quarter cycle: triangle 0.5, squared → 25 % brightness.
        let (r, _, b) = m.render(125);
        assert!(r > 56 && r < 70, "gamma-dimmed red was {r}");
        assert_eq!(r, b);
    }

    #[test]
    fn flash_is_short_burst_long_rest() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::ObserverConnected, 0); // 50 ms per 3 s
        assert_eq!(m.render(10), COL_GREEN);
        assert_eq!(m.render(49), COL_GREEN);
        assert_eq!(m.render(50), COL_OFF);
        assert_eq!(m.render(2_999), COL_OFF);
        assert_eq!(m.render(3_020), COL_GREEN);
    }

    #[test]
    fn same_state_set_preserves_phase_origin() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::Booting, 0);
        // 150 ms in: second half of the 200 ms cycle → off.
        m.set_state(IndicatorState::Booting, 150);
        assert_eq!(m.render(150), COL_OFF);
    }

    #[test]
    fn state_change_resets_phase_origin() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::Booting, 0);
        m.set_state(IndicatorState::Connecting, 150);
        // Fresh cycle for the new state: first half → blue on.
        assert_eq!(m.render(150), COL_BLUE);
    }

    #[test]
    fn render_tolerates_clock_before_entry() {
        let mut m = IndicatorMachine::new();
        m.set_state(IndicatorState::Booting, 500);
        // Callers with a stale clock must not wrap the phase.
        assert_eq!(m.render(400), COL_WHITE);
    }
}
