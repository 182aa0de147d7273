//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the MCP23017 expander bank and exposes it, the input GPIOs, and
//! the RGB status LED through [`ExpanderPort`], [`InputPort`] and
//! [`StatusLedPort`].  This is the only module in the system that
//! composes actual board hardware; on non-espidf targets the underlying
//! `hw_init` helpers are simulation stubs and the I2C bus is whatever
//! mock the caller injects.

use embedded_hal::i2c::I2c;

use crate::app::ports::{ExpanderPort, InputPort, StatusLedPort};
use crate::drivers::hw_init;
use crate::drivers::mcp23017::ExpanderBank;
use crate::error::DriverError;
use crate::pins::{self, NUM_CHANNELS};

/// Concrete adapter that combines all board hardware behind port traits.
pub struct BoardAdapter<I2C> {
    bank: ExpanderBank<I2C>,
    /// Global indicator brightness divisor (0–255).  The board sits in a
    /// cabinet; full drive is blinding at close range.
    brightness: u8,
}

impl<I2C: I2c> BoardAdapter<I2C> {
    pub fn new(bus: I2C, brightness: u8) -> Self {
        Self {
            bank: ExpanderBank::new(bus, pins::EXPANDER_ADDRS),
            brightness,
        }
    }

    /// Probe and configure both expander chips.
    pub fn init(&mut self) {
        self.bank.init();
    }
}

// ── ExpanderPort implementation ───────────────────────────────

impl<I2C: I2c> ExpanderPort for BoardAdapter<I2C> {
    fn write_line(&mut self, chip: u8, line: u8, level: bool) -> Result<(), DriverError> {
        self.bank.write_line(chip, line, level)
    }

    fn is_reachable(&self, chip: u8) -> bool {
        self.bank.is_ready(chip)
    }
}

// ── InputPort implementation ──────────────────────────────────

impl<I2C: I2c> InputPort for BoardAdapter<I2C> {
    fn sample_inputs(&mut self) -> [bool; NUM_CHANNELS] {
        let mut levels = [false; NUM_CHANNELS];
        for (slot, gpio) in levels.iter_mut().zip(pins::INPUT_GPIOS) {
            *slot = hw_init::gpio_read(gpio);
        }
        levels
    }
}

// ── StatusLedPort implementation ──────────────────────────────

impl<I2C: I2c> StatusLedPort for BoardAdapter<I2C> {
    fn set_rgb(&mut self, r: u8, g: u8, b: u8) {
        let dim = |v: u8| ((u16::from(v) * u16::from(self.brightness)) >> 8) as u8;
        hw_init::ledc_set(hw_init::LEDC_CH_LED_R, dim(r));
        hw_init::ledc_set(hw_init::LEDC_CH_LED_G, dim(g));
        hw_init::ledc_set(hw_init::LEDC_CH_LED_B, dim(b));
    }
}
