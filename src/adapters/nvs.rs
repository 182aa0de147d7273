//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`PersistencePort`]: the mapping/timer configuration lives
//! as one postcard blob in the `railboard` namespace; station
//! credentials live as separate keys in the `auth` namespace (on ESP32
//! that namespace sits on the encrypted NVS partition, so WiFi secrets
//! never rest in plaintext flash).
//!
//! All values are range-validated before persisting — a compromised
//! observer connection must not be able to plant an out-of-range mapping
//! or an absurd timer.  Invalid values are rejected, not clamped.
//!
//! The non-espidf backend is an in-memory map for host tests.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{ConfigError, PersistencePort};
use crate::config::BoardConfig;
use crate::pins::NUM_CHANNELS;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "railboard";
const CONFIG_KEY: &str = "boardcfg";

const CRED_NAMESPACE: &str = "auth";
const CRED_SSID_KEY: &str = "ssid";
const CRED_PASS_KEY: &str = "pass";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

/// One week — nothing on a DIN rail needs a longer auto-off.
const MAX_AUTO_OFF_SECS: u32 = 7 * 24 * 3600;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }

    /// Stored station credentials, if any (for WiFi bring-up at boot).
    pub fn load_credentials(&self) -> Option<(heapless::String<32>, heapless::String<64>)> {
        let mut ssid_buf = [0u8; 32];
        let mut pass_buf = [0u8; 64];
        let ssid_len = self.read_blob(CRED_NAMESPACE, CRED_SSID_KEY, &mut ssid_buf)?;
        let pass_len = self
            .read_blob(CRED_NAMESPACE, CRED_PASS_KEY, &mut pass_buf)
            .unwrap_or(0);

        let ssid = core::str::from_utf8(&ssid_buf[..ssid_len]).ok()?;
        let pass = core::str::from_utf8(&pass_buf[..pass_len]).ok()?;
        if ssid.is_empty() {
            return None;
        }
        let mut s = heapless::String::new();
        let mut p = heapless::String::new();
        s.push_str(ssid).ok()?;
        p.push_str(pass).ok()?;
        Some((s, p))
    }

    // ── Blob primitives ───────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Option<usize> {
        let store = self.store.borrow();
        let data = store.get(&format!("{}::{}", namespace, key))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Some(len)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.store
            .borrow_mut()
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Option<usize> {
        Self::with_nvs_handle(namespace, false, |handle| {
            let key_c = c_key(key);
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_blob(
                    handle,
                    key_c.as_ptr() as *const _,
                    buf.as_mut_ptr() as *mut _,
                    &mut size,
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(size)
        })
        .ok()
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        Self::with_nvs_handle(namespace, true, |handle| {
            let key_c = c_key(key);
            let ret = unsafe {
                nvs_set_blob(
                    handle,
                    key_c.as_ptr() as *const _,
                    data.as_ptr() as *const _,
                    data.len(),
                )
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|rc| {
            warn!("NVS write error {} ({}::{})", rc, namespace, key);
            ConfigError::IoError
        })
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns_c = c_key(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let mut handle: nvs_handle_t = 0;
        let ret = unsafe { nvs_open(ns_c.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

/// NVS keys/namespaces are limited to 15 bytes + NUL.
#[cfg(target_os = "espidf")]
fn c_key(s: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = s.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

// ── Validation ────────────────────────────────────────────────

fn validate_config(cfg: &BoardConfig) -> Result<(), ConfigError> {
    for mapping in cfg.input_mapping.iter().flatten() {
        if (*mapping as usize) >= NUM_CHANNELS {
            return Err(ConfigError::ValidationFailed(
                "input_mapping target must be a valid channel",
            ));
        }
    }
    for secs in &cfg.auto_off_secs {
        if *secs > MAX_AUTO_OFF_SECS {
            return Err(ConfigError::ValidationFailed(
                "auto_off_secs must be at most 7 days",
            ));
        }
    }
    if !(5..=1000).contains(&cfg.tick_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "tick_interval_ms must be 5–1000",
        ));
    }
    Ok(())
}

// ── PersistencePort ───────────────────────────────────────────

impl PersistencePort for NvsAdapter {
    fn load(&self) -> Result<BoardConfig, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Some(len) => {
                let cfg: BoardConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            None => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(BoardConfig::default())
            }
        }
    }

    fn save(&mut self, config: &BoardConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }

    fn save_credentials(&mut self, ssid: &str, pass: &str) -> Result<(), ConfigError> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(ConfigError::ValidationFailed("ssid must be 1–32 bytes"));
        }
        if pass.len() > 64 {
            return Err(ConfigError::ValidationFailed("pass must be at most 64 bytes"));
        }
        self.write_blob(CRED_NAMESPACE, CRED_SSID_KEY, ssid.as_bytes())?;
        self.write_blob(CRED_NAMESPACE, CRED_PASS_KEY, pass.as_bytes())?;
        info!("NvsAdapter: station credentials saved (SSID '{}')", ssid);
        Ok(())
    }
}
