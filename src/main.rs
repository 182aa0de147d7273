//! RailBoard Firmware — Main Entry Point
//!
//! Hexagonal architecture around a single cooperative tick loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  BoardAdapter        NvsAdapter      BoardClock                │
//! │  (Expander+Input     (Persistence)   (Clock)                   │
//! │   +StatusLed)                                                  │
//! │  WifiAdapter         WsHub                                     │
//! │  (Provisioning)      (BroadcastSink)                           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              BoardService (pure logic)                 │    │
//! │  │  channels · relay pulses · auto-off · indicator        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Loop order each tick: drain notifications → drain command mailbox
//! (commands never interleave with a tick) → `service.tick()` (cleanup,
//! indicator render, input scan, auto-off sweep, change broadcast) →
//! WiFi poll → watchdog feed → sleep one tick interval.
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use log::{info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use esp_idf_svc::wifi::EspWifi;

use railboard::adapters::hardware::BoardAdapter;
use railboard::adapters::nvs::NvsAdapter;
use railboard::adapters::time::BoardClock;
use railboard::adapters::wifi::WifiAdapter;
use railboard::adapters::ws_hub::WsHub;
use railboard::app::commands::Command;
use railboard::app::ports::{BroadcastSink, PersistencePort};
use railboard::app::service::BoardService;
use railboard::config::BoardConfig;
use railboard::drivers::hw_init;
use railboard::drivers::watchdog::Watchdog;
use railboard::events::{self, Event};
use railboard::indicator::IndicatorState;

/// Indicator brightness divisor — the board lives in a cabinet.
const LED_BRIGHTNESS: u8 = 20;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("=== RailBoard v{} ===", env!("CARGO_PKG_VERSION"));
    info!("12-channel relay I/O, 2x MCP23017");

    if let Err(e) = hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // The watchdog is not armed yet, so park explicitly.
        log::error!("HAL init failed: {} — halting", e);
        loop {
            FreeRtos::delay_ms(1_000);
        }
    }
    let watchdog = Watchdog::new();
    let clock = BoardClock::new();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let (config, config_ok) = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            (cfg, true)
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            (BoardConfig::default(), false)
        }
    };

    // ── 3. Board hardware: I2C bus + expander bank ────────────
    let peripherals = Peripherals::take()?;
    let i2c_cfg = I2cConfig::new().baudrate(Hertz(400_000));
    // GPIO assignments mirror pins::I2C_SDA_GPIO / I2C_SCL_GPIO.
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio11,
        peripherals.pins.gpio12,
        &i2c_cfg,
    )?;
    let mut board = BoardAdapter::new(i2c, LED_BRIGHTNESS);
    board.init();

    // ── 4. Control core ───────────────────────────────────────
    let mut service = BoardService::new(&config);
    service.set_indicator(
        if config_ok {
            IndicatorState::Booting
        } else {
            IndicatorState::ConfigError
        },
        &clock,
    );
    service.startup_reset(&mut board);

    // ── 5. WiFi bring-up (AP always; STA when provisioned) ────
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;

    let mut wifi = WifiAdapter::new();
    wifi.attach_driver(esp_wifi);
    let provisioned = match nvs.load_credentials() {
        Some((ssid, pass)) => match wifi.set_credentials(&ssid, &pass) {
            Ok(()) => true,
            Err(e) => {
                warn!("stored credentials invalid: {}", e);
                false
            }
        },
        None => false,
    };
    if provisioned {
        service.set_indicator(IndicatorState::Connecting, &clock);
    }
    if let Err(e) = wifi.start() {
        warn!("WiFi start failed: {}", e);
    }
    service.on_network_status(wifi.is_connected(), &board, &clock);

    // ── 6. SNTP (only useful with an uplink) ──────────────────
    let sntp = if wifi.is_connected() {
        match EspSntp::new_default() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("SNTP start failed: {}", e);
                None
            }
        }
    } else {
        None
    };
    let mut sntp_synced = false;

    // ── 7. Observer hub ───────────────────────────────────────
    let mut hub = WsHub::start().map_err(|e| anyhow!("observer hub failed: {e}"))?;

    service.refresh_status(&board, &clock);
    info!("System ready. Entering control loop.");

    // ── 8. Control loop ───────────────────────────────────────
    let tick_ms = config.tick_interval_ms;

    loop {
        // First completed SNTP sync becomes a one-shot notification.
        if !sntp_synced {
            if let Some(s) = sntp.as_ref() {
                if s.get_sync_status() == SyncStatus::Completed {
                    sntp_synced = true;
                    let _ = events::push_event(Event::TimeSynced);
                }
            }
        }

        // Collaborator notifications from callback contexts.
        events::drain_events(|event| match event {
            Event::ObserverConnected => {
                service.on_observer_count(hub.observer_count(), &board, &clock);
                // The newcomer needs its first full snapshot right away.
                let snap = service.snapshot(&board, &clock);
                hub.broadcast(&snap);
            }
            Event::ObserverDisconnected => {
                service.on_observer_count(hub.observer_count(), &board, &clock);
            }
            Event::TimeSynced => service.on_time_synced(&board, &clock),
            Event::NetworkConnected => service.on_network_status(true, &board, &clock),
            Event::NetworkLost => service.on_network_status(false, &board, &clock),
        });

        // Observer commands, serialized strictly between ticks.
        while let Some(frame) = events::pop_frame() {
            let Some(cmd) = Command::decode(&frame) else {
                continue; // malformed: dropped, no acknowledgment
            };
            let outcome = service.handle_command(cmd, &mut board, &clock, &mut hub, &mut nvs);
            if outcome.restart_requested {
                warn!("credentials changed — restarting in 1 s");
                FreeRtos::delay_ms(1_000);
                unsafe {
                    esp_idf_svc::sys::esp_restart();
                }
            }
        }

        service.tick(&mut board, &clock, &mut hub);

        wifi.poll();
        watchdog.feed();
        FreeRtos::delay_ms(tick_ms);
    }
}
