//! Board clock adapter.
//!
//! Implements [`ClockPort`] for the ESP32-S3 platform:
//!
//! - **`target_os = "espidf"`** — monotonic uptime from
//!   `esp_timer_get_time()` (microsecond precision); wall clock from
//!   `gettimeofday` once SNTP has landed a plausible epoch.
//! - **all other targets** — `std::time::Instant` uptime, never-synced
//!   wall clock, for host-side tests and simulation.

use crate::app::ports::ClockPort;

/// Reject obviously unsynced wall time (anything before 2020-01-01).
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

const UNSYNCED_STAMP: &str = "--:--:--";

pub struct BoardClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for BoardClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn wall_time_secs(&self) -> Option<i64> {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        // SAFETY: plain libc-style call writing into a local.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        (tv.tv_sec >= EPOCH_2020).then_some(tv.tv_sec as i64)
    }
}

impl ClockPort for BoardClock {
    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(target_os = "espidf")]
    fn timestamp(&self) -> heapless::String<24> {
        use core::fmt::Write;

        let mut out = heapless::String::new();
        let Some(secs) = self.wall_time_secs() else {
            let _ = out.push_str(UNSYNCED_STAMP);
            return out;
        };

        let t = secs as esp_idf_svc::sys::time_t;
        let mut tm: esp_idf_svc::sys::tm = unsafe { core::mem::zeroed() };
        // SAFETY: localtime_r writes into the provided tm; thread-safe variant.
        if unsafe { esp_idf_svc::sys::localtime_r(&t, &mut tm) }.is_null() {
            let _ = out.push_str(UNSYNCED_STAMP);
            return out;
        }
        let _ = write!(out, "{:02}:{:02}:{:02}", tm.tm_hour, tm.tm_min, tm.tm_sec);
        out
    }

    #[cfg(not(target_os = "espidf"))]
    fn timestamp(&self) -> heapless::String<24> {
        let mut out = heapless::String::new();
        let _ = out.push_str(UNSYNCED_STAMP);
        out
    }

    #[cfg(target_os = "espidf")]
    fn is_synced(&self) -> bool {
        self.wall_time_secs().is_some()
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_synced(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic() {
        let clock = BoardClock::new();
        let a = clock.uptime_ms();
        let b = clock.uptime_ms();
        assert!(b >= a);
    }

    #[test]
    fn host_clock_reports_unsynced() {
        let clock = BoardClock::new();
        assert!(!clock.is_synced());
        assert_eq!(clock.timestamp().as_str(), "--:--:--");
    }
}
