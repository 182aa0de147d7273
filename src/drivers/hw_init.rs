//! One-shot hardware peripheral initialization.
//!
//! Configures the twelve opto-input GPIOs and the LEDC timer/channels
//! for the RGB status LED using raw ESP-IDF sys calls.  Called once from
//! `main()` before the control loop starts.  The I2C master for the
//! relay expanders is constructed separately in `main()` via
//! `esp-idf-hal` and handed to the board adapter.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    LedcInitFailed,
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed => write!(f, "LEDC timer/channel config failed"),
        }
    }
}

// ── LEDC channel assignments ──────────────────────────────────

pub const LEDC_CH_LED_R: u32 = 0;
pub const LEDC_CH_LED_G: u32 = 1;
pub const LEDC_CH_LED_B: u32 = 2;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the control loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_ledc()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    let mut pin_mask: u64 = 0;
    for gpio in pins::INPUT_GPIOS {
        pin_mask |= 1u64 << gpio;
    }

    let cfg = gpio_config_t {
        pin_bit_mask: pin_mask,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        // Opto-coupler outputs are push-pull; no internal pulls needed.
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        ..Default::default()
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    info!("hw_init: {} input GPIOs configured", pins::INPUT_GPIOS.len());
    Ok(())
}

/// Read one raw input level.  Main-loop context only.
#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    unsafe { gpio_get_level(pin) != 0 }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── LEDC (RGB status LED) ─────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    let timer_cfg = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        duty_resolution: pins::PWM_RESOLUTION_BITS,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        freq_hz: pins::LED_PWM_FREQ_HZ,
        clk_cfg: ledc_clk_cfg_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    if unsafe { ledc_timer_config(&timer_cfg) } != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed);
    }

    let led_channels = [
        (LEDC_CH_LED_R, pins::LED_R_GPIO),
        (LEDC_CH_LED_G, pins::LED_G_GPIO),
        (LEDC_CH_LED_B, pins::LED_B_GPIO),
    ];
    for (channel, gpio) in led_channels {
        let ch_cfg = ledc_channel_config_t {
            gpio_num: gpio,
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel,
            intr_type: ledc_intr_type_t_LEDC_INTR_DISABLE,
            timer_sel: ledc_timer_t_LEDC_TIMER_0,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        };
        if unsafe { ledc_channel_config(&ch_cfg) } != ESP_OK as i32 {
            return Err(HwInitError::LedcInitFailed);
        }
    }
    info!("hw_init: LEDC configured (R/G/B on CH0-2)");
    Ok(())
}

/// Set one LEDC channel's 8-bit duty.  Main-loop context only.
#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(duty));
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

// ── Blocking pulse delay ──────────────────────────────────────

/// Block for the relay coil pulse width.  On target this parks the main
/// task in FreeRTOS; the simulation backend returns immediately instead
/// of sleeping through the coil hold time.
#[cfg(target_os = "espidf")]
pub fn pulse_delay_ms(ms: u16) {
    esp_idf_hal::delay::FreeRtos::delay_ms(u32::from(ms));
}

#[cfg(not(target_os = "espidf"))]
pub fn pulse_delay_ms(_ms: u16) {}
