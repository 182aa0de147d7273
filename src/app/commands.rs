//! Inbound commands of the synchronization protocol.
//!
//! Wire format is a flat JSON object tagged by `cmd`:
//!
//! ```json
//! {"cmd":"toggle","ch":3}
//! {"cmd":"set","ch":0,"val":true}
//! {"cmd":"map","input":2,"output":7}     // output -1 unmaps
//! {"cmd":"timer","ch":5,"secs":900}
//! {"cmd":"wifi","ssid":"...","pass":"..."}
//! {"cmd":"alloff"}
//! ```
//!
//! Decode failures (missing/mistyped `cmd`, wrong field types, oversized
//! strings) drop the frame silently — no mutation, no acknowledgment.
//! Range checks on indices happen later, in the dispatch layer, which is
//! equally permissive but does acknowledge.

use serde::Deserialize;

/// A decoded observer command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum Command {
    /// Flip one relay.
    Toggle { ch: u8 },
    /// Drive one relay to an explicit state.
    Set { ch: u8, val: bool },
    /// Map an input to an output relay; `output: -1` clears the mapping.
    /// Decoded wider than the wire's `int8` so an out-of-range target is
    /// range-dropped by dispatch (with acknowledgment) instead of being
    /// rejected here as malformed.
    Map { input: u8, output: i16 },
    /// Configure a channel's auto-off delay; 0 disables it.
    Timer { ch: u8, secs: u32 },
    /// Store new station credentials and restart.  Terminal.
    Wifi {
        ssid: heapless::String<32>,
        pass: heapless::String<64>,
    },
    /// Turn off every relay that is currently on.
    Alloff,
}

impl Command {
    /// Decode a raw frame.  `None` means the frame was malformed and has
    /// been dropped per the permissive-drop policy.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        match serde_json::from_slice(payload) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                log::debug!("malformed command dropped: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_command_kind() {
        assert_eq!(
            Command::decode(br#"{"cmd":"toggle","ch":3}"#),
            Some(Command::Toggle { ch: 3 })
        );
        assert_eq!(
            Command::decode(br#"{"cmd":"set","ch":0,"val":true}"#),
            Some(Command::Set { ch: 0, val: true })
        );
        assert_eq!(
            Command::decode(br#"{"cmd":"map","input":2,"output":-1}"#),
            Some(Command::Map { input: 2, output: -1 })
        );
        // Out-of-range targets still decode; dispatch range-drops them.
        assert_eq!(
            Command::decode(br#"{"cmd":"map","input":2,"output":200}"#),
            Some(Command::Map { input: 2, output: 200 })
        );
        assert_eq!(
            Command::decode(br#"{"cmd":"timer","ch":5,"secs":900}"#),
            Some(Command::Timer { ch: 5, secs: 900 })
        );
        assert_eq!(Command::decode(br#"{"cmd":"alloff"}"#), Some(Command::Alloff));
    }

    #[test]
    fn decodes_wifi_credentials() {
        let cmd = Command::decode(br#"{"cmd":"wifi","ssid":"plant-net","pass":"hunter22"}"#);
        let Some(Command::Wifi { ssid, pass }) = cmd else {
            panic!("expected wifi command, got {cmd:?}");
        };
        assert_eq!(ssid.as_str(), "plant-net");
        assert_eq!(pass.as_str(), "hunter22");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        assert_eq!(
            Command::decode(br#"{"cmd":"toggle","ch":1,"origin":"ui"}"#),
            Some(Command::Toggle { ch: 1 })
        );
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert_eq!(Command::decode(b"not json"), None);
        assert_eq!(Command::decode(br#"{"ch":3}"#), None); // no cmd tag
        assert_eq!(Command::decode(br#"{"cmd":"reboot"}"#), None); // unknown tag
        assert_eq!(Command::decode(br#"{"cmd":"toggle","ch":"three"}"#), None);
        assert_eq!(Command::decode(br#"{"cmd":"toggle"}"#), None); // missing field
    }

    #[test]
    fn oversized_ssid_is_dropped() {
        let long = "x".repeat(40);
        let frame = format!(r#"{{"cmd":"wifi","ssid":"{long}","pass":"12345678"}}"#);
        assert_eq!(Command::decode(frame.as_bytes()), None);
    }
}
