//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements                         | Connects to               |
//! |------------|------------------------------------|---------------------------|
//! | `hardware` | ExpanderPort, InputPort,           | MCP23017 bank over I2C,   |
//! |            | StatusLedPort                      | ESP32 GPIO, LEDC PWM      |
//! | `nvs`      | PersistencePort                    | NVS / in-memory store     |
//! | `time`     | ClockPort                          | ESP32 system timer + SNTP |
//! | `wifi`     | (provisioning collaborator)        | ESP-IDF WiFi AP+STA       |
//! | `ws_hub`   | BroadcastSink                      | WebSocket observer fan-out|

pub mod hardware;
pub mod nvs;
pub mod time;
pub mod wifi;
pub mod ws_hub;
