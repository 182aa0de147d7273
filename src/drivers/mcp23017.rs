//! MCP23017 I/O expander bank driver.
//!
//! The relay coils hang off two MCP23017 chips sharing one I2C bus:
//! chip 0 (0x20) drives relays 1–8, chip 1 (0x21) drives relays 9–12.
//! Every line is an output; SET coils sit on port A, RESET coils on the
//! matching bit of port B.
//!
//! The driver is generic over [`embedded_hal::i2c::I2c`], so it runs
//! against the real `esp-idf-hal` I2C master on target and a mock bus
//! under host tests.  Output latches are shadowed in RAM — the chip is
//! write-only in this design, one register write per line change.
//!
//! A chip that fails its probe is marked not-ready and every later write
//! to it is refused; the board keeps operating on the surviving chip.

use embedded_hal::i2c::I2c;
use log::{error, info};

use crate::error::DriverError;

// MCP23017 register map (BANK=0 addressing).
const REG_IODIRA: u8 = 0x00;
const REG_IODIRB: u8 = 0x01;
const REG_OLATA: u8 = 0x14;
const REG_OLATB: u8 = 0x15;

/// Per-chip bookkeeping: bus address, probe result, OLAT shadow.
#[derive(Debug, Clone, Copy)]
struct Chip {
    addr: u8,
    ready: bool,
    olat: [u8; 2],
}

/// Both expander chips behind one bus handle.
pub struct ExpanderBank<I2C> {
    bus: I2C,
    chips: [Chip; 2],
}

impl<I2C: I2c> ExpanderBank<I2C> {
    pub fn new(bus: I2C, addrs: [u8; 2]) -> Self {
        let chip = |addr| Chip {
            addr,
            ready: false,
            olat: [0; 2],
        };
        Self {
            bus,
            chips: [chip(addrs[0]), chip(addrs[1])],
        }
    }

    /// Probe and configure both chips: every line an output, all low.
    /// A chip that does not respond is marked unreachable and skipped;
    /// at least one reachable chip is not required here — the indicator
    /// surfaces a total outage separately.
    pub fn init(&mut self) {
        for idx in 0..self.chips.len() {
            let addr = self.chips[idx].addr;
            match self.probe_chip(idx) {
                Ok(()) => {
                    self.chips[idx].ready = true;
                    self.chips[idx].olat = [0; 2];
                    info!("expander #{} (0x{:02X}) ready", idx + 1, addr);
                }
                Err(_) => {
                    self.chips[idx].ready = false;
                    error!("expander #{} (0x{:02X}) NOT FOUND", idx + 1, addr);
                }
            }
        }
    }

    /// Whether the chip answered during [`init`](Self::init).
    pub fn is_ready(&self, chip: u8) -> bool {
        self.chips
            .get(chip as usize)
            .is_some_and(|c| c.ready)
    }

    /// Drive one output line (0–7 = port A, 8–15 = port B).
    pub fn write_line(&mut self, chip: u8, line: u8, level: bool) -> Result<(), DriverError> {
        let idx = chip as usize;
        if idx >= self.chips.len() || line >= 16 {
            return Err(DriverError::BusFault);
        }
        if !self.chips[idx].ready {
            return Err(DriverError::ExpanderUnavailable { chip });
        }

        let port = (line / 8) as usize;
        let bit = 1u8 << (line % 8);
        let mut olat = self.chips[idx].olat[port];
        if level {
            olat |= bit;
        } else {
            olat &= !bit;
        }

        let reg = if port == 0 { REG_OLATA } else { REG_OLATB };
        self.write_reg(idx, reg, olat)?;
        self.chips[idx].olat[port] = olat;
        Ok(())
    }

    /// Direction + latch setup; any NAK marks the chip dead.
    fn probe_chip(&mut self, idx: usize) -> Result<(), DriverError> {
        for reg in [REG_IODIRA, REG_IODIRB, REG_OLATA, REG_OLATB] {
            self.write_reg(idx, reg, 0x00)?;
        }
        Ok(())
    }

    fn write_reg(&mut self, idx: usize, reg: u8, value: u8) -> Result<(), DriverError> {
        let addr = self.chips[idx].addr;
        self.bus
            .write(addr, &[reg, value])
            .map_err(|_| DriverError::BusFault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    /// Records register writes; addresses listed in `dead` never ACK.
    struct MockBus {
        writes: Vec<(u8, u8, u8)>, // (addr, reg, value)
        dead: Vec<u8>,
    }

    impl MockBus {
        fn new() -> Self {
            Self {
                writes: Vec::new(),
                dead: Vec::new(),
            }
        }
    }

    impl ErrorType for MockBus {
        type Error = ErrorKind;
    }

    impl I2c for MockBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.dead.contains(&address) {
                return Err(ErrorKind::NoAcknowledge(
                    embedded_hal::i2c::NoAcknowledgeSource::Address,
                ));
            }
            for op in operations {
                if let Operation::Write(bytes) = op {
                    assert_eq!(bytes.len(), 2, "register writes are [reg, value]");
                    self.writes.push((address, bytes[0], bytes[1]));
                }
            }
            Ok(())
        }
    }

    fn bank() -> ExpanderBank<MockBus> {
        let mut bank = ExpanderBank::new(MockBus::new(), [0x20, 0x21]);
        bank.init();
        bank
    }

    #[test]
    fn init_configures_both_chips_as_outputs() {
        let bank = bank();
        assert!(bank.is_ready(0));
        assert!(bank.is_ready(1));
        let iodir: Vec<_> = bank
            .bus
            .writes
            .iter()
            .filter(|(_, reg, _)| *reg == REG_IODIRA || *reg == REG_IODIRB)
            .collect();
        assert_eq!(iodir.len(), 4);
        assert!(iodir.iter().all(|(_, _, v)| *v == 0x00));
    }

    #[test]
    fn dead_chip_is_marked_unreachable() {
        let mut bus = MockBus::new();
        bus.dead.push(0x21);
        let mut bank = ExpanderBank::new(bus, [0x20, 0x21]);
        bank.init();
        assert!(bank.is_ready(0));
        assert!(!bank.is_ready(1));
        assert!(matches!(
            bank.write_line(1, 0, true),
            Err(DriverError::ExpanderUnavailable { chip: 1 })
        ));
    }

    #[test]
    fn write_line_sets_single_bit_in_shadow() {
        let mut bank = bank();
        bank.bus.writes.clear();

        bank.write_line(0, 2, true).unwrap();
        assert_eq!(bank.bus.writes.last(), Some(&(0x20, REG_OLATA, 0b0000_0100)));

        // Second line on the same port keeps the first bit.
        bank.write_line(0, 5, true).unwrap();
        assert_eq!(bank.bus.writes.last(), Some(&(0x20, REG_OLATA, 0b0010_0100)));

        bank.write_line(0, 2, false).unwrap();
        assert_eq!(bank.bus.writes.last(), Some(&(0x20, REG_OLATA, 0b0010_0000)));
    }

    #[test]
    fn port_b_lines_target_olatb() {
        let mut bank = bank();
        bank.bus.writes.clear();
        bank.write_line(1, 9, true).unwrap();
        assert_eq!(bank.bus.writes.last(), Some(&(0x21, REG_OLATB, 0b0000_0010)));
    }

    #[test]
    fn invalid_chip_or_line_is_a_bus_fault() {
        let mut bank = bank();
        assert!(matches!(bank.write_line(2, 0, true), Err(DriverError::BusFault)));
        assert!(matches!(bank.write_line(0, 16, true), Err(DriverError::BusFault)));
    }
}
