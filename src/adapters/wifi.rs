//! WiFi provisioning adapter (AP + optional STA).
//!
//! The board always raises its own access point so an installer can
//! reach the UI with zero infrastructure; when station credentials are
//! stored it additionally joins the site network.  The control core is
//! deliberately ignorant of all of this — it only consumes the
//! `is_connected()` signal for the indicator priority rules.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via
//!   `esp_idf_svc::wifi::EspWifi` (mixed AP+STA configuration).
//! - **all other targets**: simulation stubs for host-side tests.

use core::fmt;
use log::{info, warn};

/// SSID the setup access point advertises.
pub const AP_SSID: &str = "RailBoard-Setup";
/// WPA2 key for the setup access point.
pub const AP_PASS: &str = "railboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    InvalidSsid,
    InvalidPassword,
    DriverFailed,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::DriverFailed => write!(f, "WiFi driver operation failed"),
        }
    }
}

// ── Validation ────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

// ── Adapter ───────────────────────────────────────────────────

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    sta_connected: bool,
    #[cfg(target_os = "espidf")]
    driver: Option<esp_idf_svc::wifi::EspWifi<'static>>,
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            sta_connected: false,
            #[cfg(target_os = "espidf")]
            driver: None,
        }
    }

    /// Store validated station credentials for the next `start()`.
    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|()| WifiError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| WifiError::InvalidPassword)?;
        Ok(())
    }

    /// Hand over the platform driver (espidf only; built in `main`).
    #[cfg(target_os = "espidf")]
    pub fn attach_driver(&mut self, driver: esp_idf_svc::wifi::EspWifi<'static>) {
        self.driver = Some(driver);
    }

    /// Bring up the access point, plus the station link when credentials
    /// are present.  A failed station join leaves the AP running — the
    /// board must stay reachable for reconfiguration.
    pub fn start(&mut self) -> Result<(), WifiError> {
        if self.ssid.is_empty() {
            info!("WiFi: no station credentials, AP-only mode");
        } else {
            info!("WiFi: AP + station mode, joining '{}'", self.ssid);
        }

        match self.platform_start() {
            Ok(joined) => {
                self.sta_connected = joined;
                if joined {
                    info!("WiFi: station connected");
                } else if !self.ssid.is_empty() {
                    warn!("WiFi: station join failed, staying in AP-only mode");
                }
                Ok(())
            }
            Err(e) => {
                self.sta_connected = false;
                Err(e)
            }
        }
    }

    /// Whether the station uplink is currently established.
    pub fn is_connected(&self) -> bool {
        self.sta_connected
    }

    /// Re-check the station link; pushes connectivity events on change.
    pub fn poll(&mut self) {
        let now = self.platform_is_connected();
        if now != self.sta_connected {
            self.sta_connected = now;
            let event = if now {
                crate::events::Event::NetworkConnected
            } else {
                warn!("WiFi: station link lost");
                crate::events::Event::NetworkLost
            };
            let _ = crate::events::push_event(event);
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    /// Returns whether the station link came up.
    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<bool, WifiError> {
        use esp_idf_svc::wifi::{
            AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration,
        };

        let Some(wifi) = self.driver.as_mut() else {
            return Err(WifiError::DriverFailed);
        };

        let ap = AccessPointConfiguration {
            ssid: AP_SSID.try_into().map_err(|_| WifiError::InvalidSsid)?,
            password: AP_PASS.try_into().map_err(|_| WifiError::InvalidPassword)?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        };

        let config = if self.ssid.is_empty() {
            Configuration::AccessPoint(ap)
        } else {
            Configuration::Mixed(
                ClientConfiguration {
                    ssid: self.ssid.as_str().try_into().map_err(|_| WifiError::InvalidSsid)?,
                    password: self
                        .password
                        .as_str()
                        .try_into()
                        .map_err(|_| WifiError::InvalidPassword)?,
                    auth_method: if self.password.is_empty() {
                        AuthMethod::None
                    } else {
                        AuthMethod::WPA2Personal
                    },
                    ..Default::default()
                },
                ap,
            )
        };

        wifi.set_configuration(&config)
            .map_err(|_| WifiError::DriverFailed)?;
        wifi.start().map_err(|_| WifiError::DriverFailed)?;
        info!("WiFi: AP '{}' up", AP_SSID);

        if self.ssid.is_empty() {
            return Ok(false);
        }
        // Join attempt is best-effort: a failure leaves the AP running.
        if let Err(e) = wifi.connect() {
            warn!("WiFi: connect failed ({})", e);
            return Ok(false);
        }
        Ok(wifi.is_connected().unwrap_or(false))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<bool, WifiError> {
        info!("WiFi(sim): AP '{}' up", AP_SSID);
        // Simulation joins whenever credentials are present.
        Ok(!self.ssid.is_empty())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|w| w.is_connected().unwrap_or(false))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sta_connected
    }
}
