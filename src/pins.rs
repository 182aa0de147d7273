//! GPIO / peripheral pin assignments for the RailBoard main board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.
//!
//! Board topology: twelve opto-isolated AC inputs land directly on ESP32
//! GPIOs (fast edge detection); twelve bistable relays are driven through
//! two MCP23017 I/O expanders on the I2C bus, one SET and one RESET coil
//! line each (24 expander lines total).

/// Number of input/output channel pairs on the board.
pub const NUM_CHANNELS: usize = 12;

// ---------------------------------------------------------------------------
// I2C bus (MCP23017 expanders)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 11;
pub const I2C_SCL_GPIO: i32 = 12;

/// I2C addresses of the two expander chips.
/// Chip 0 (0x20) carries relays 1–8, chip 1 (0x21) carries relays 9–12.
pub const EXPANDER_ADDRS: [u8; 2] = [0x20, 0x21];

// ---------------------------------------------------------------------------
// Digital inputs (opto-coupler outputs, directly on ESP32 GPIOs)
// ---------------------------------------------------------------------------

pub const INPUT_GPIOS: [i32; NUM_CHANNELS] = [4, 5, 6, 7, 15, 16, 17, 18, 8, 3, 9, 10];

// ---------------------------------------------------------------------------
// Relay coil mapping on the expanders
// ---------------------------------------------------------------------------

/// Expander chip/line pair driving one relay's SET and RESET coils.
/// Lines 0–7 are port A, lines 8–15 are port B.
#[derive(Debug, Clone, Copy)]
pub struct RelayLines {
    /// Index into [`EXPANDER_ADDRS`].
    pub chip: u8,
    /// Expander line pulsed to latch the relay ON.
    pub set_line: u8,
    /// Expander line pulsed to latch the relay OFF.
    pub reset_line: u8,
}

/// SET on port A, RESET on the same bit of port B, per the board layout.
pub const RELAY_LINES: [RelayLines; NUM_CHANNELS] = [
    // Chip 0 (0x20): relays 1–8
    RelayLines { chip: 0, set_line: 0, reset_line: 8 },
    RelayLines { chip: 0, set_line: 1, reset_line: 9 },
    RelayLines { chip: 0, set_line: 2, reset_line: 10 },
    RelayLines { chip: 0, set_line: 3, reset_line: 11 },
    RelayLines { chip: 0, set_line: 4, reset_line: 12 },
    RelayLines { chip: 0, set_line: 5, reset_line: 13 },
    RelayLines { chip: 0, set_line: 6, reset_line: 14 },
    RelayLines { chip: 0, set_line: 7, reset_line: 15 },
    // Chip 1 (0x21): relays 9–12 (lines 4–7 / 12–15 spare)
    RelayLines { chip: 1, set_line: 0, reset_line: 8 },
    RelayLines { chip: 1, set_line: 1, reset_line: 9 },
    RelayLines { chip: 1, set_line: 2, reset_line: 10 },
    RelayLines { chip: 1, set_line: 3, reset_line: 11 },
];

/// Coil pulse width for the bistable relays.  The latch needs power only
/// while changing state; 50 ms is comfortably above the coil minimum.
pub const RELAY_PULSE_MS: u16 = 50;

// ---------------------------------------------------------------------------
// RGB status LED (discrete LEDs on LEDC PWM channels)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 38;
pub const LED_G_GPIO: i32 = 39;
pub const LED_B_GPIO: i32 = 40;

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// LEDC frequency for the RGB status LED (1 kHz).
pub const LED_PWM_FREQ_HZ: u32 = 1_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_table_covers_every_channel() {
        assert_eq!(RELAY_LINES.len(), NUM_CHANNELS);
        assert_eq!(INPUT_GPIOS.len(), NUM_CHANNELS);
    }

    #[test]
    fn relay_lines_are_valid_expander_lines() {
        for rl in &RELAY_LINES {
            assert!((rl.chip as usize) < EXPANDER_ADDRS.len());
            assert!(rl.set_line < 16);
            assert!(rl.reset_line < 16);
            assert_ne!(rl.set_line, rl.reset_line);
        }
    }

    #[test]
    fn set_and_reset_pair_on_same_port_bit() {
        // Layout invariant: RESET is the port-B twin of the SET line.
        for rl in &RELAY_LINES {
            assert_eq!(rl.reset_line, rl.set_line + 8);
        }
    }

    #[test]
    fn input_gpios_are_unique() {
        for (i, a) in INPUT_GPIOS.iter().enumerate() {
            for b in &INPUT_GPIOS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
