//! Transport→control-loop plumbing.
//!
//! Two static, allocation-free queues bridge callback contexts (WebSocket
//! handler task, SNTP callback, WiFi events) into the single-threaded
//! control loop:
//!
//! - a lock-free SPSC ring of [`Event`] notifications (payload-free), and
//! - a bounded mailbox of raw command frames awaiting JSON decode.
//!
//! The loop drains both between ticks, which is what guarantees command
//! handling never interleaves with a tick in progress.
//!
//! ```text
//! ┌──────────────┐  Event / frame   ┌──────────────┐
//! │ ws handler   │────────────────▶│              │
//! │ sntp cb      │────────────────▶│  Control loop │
//! │ wifi events  │────────────────▶│  (consumer)   │
//! └──────────────┘                  └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Maximum number of pending notifications.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 16;

/// Largest accepted inbound command frame.
pub const MAX_FRAME_LEN: usize = 512;

/// Mailbox depth for raw command frames.
const FRAME_DEPTH: usize = 8;

/// Payload-free notifications from callback contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// An observer attached; it has already been sent its first snapshot.
    ObserverConnected = 0,
    ObserverDisconnected = 1,
    /// SNTP completed its first successful sync.
    TimeSynced = 2,
    NetworkConnected = 3,
    NetworkLost = 4,
}

// ── Lock-free SPSC ring ───────────────────────────────────────
//
// Callback contexts write (produce), the control loop reads (consume).
// Atomic head/tail indices over a static byte buffer; no locking.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: one producer side (callback context), one consumer (main loop);
// the acquire/release pairing on head/tail serialises buffer access.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push a notification.  Lock-free; returns `false` when the ring is
/// full and the event was dropped.
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Ring full — drop.
    }

    // SAFETY: single producer; slot `head` is not visible to the consumer
    // until the store below publishes it.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next notification (main loop only).
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    // SAFETY: single consumer; the acquire load above ordered this read
    // after the producer's buffer write.
    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending notifications into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::ObserverConnected),
        1 => Some(Event::ObserverDisconnected),
        2 => Some(Event::TimeSynced),
        3 => Some(Event::NetworkConnected),
        4 => Some(Event::NetworkLost),
        _ => None,
    }
}

// ── Command frame mailbox ─────────────────────────────────────

/// Raw inbound frame, exactly as received from the transport.
pub type CommandFrame = heapless::Vec<u8, MAX_FRAME_LEN>;

/// Inbound frames: transport callback → control loop.
static FRAME_MAILBOX: Channel<CriticalSectionRawMutex, CommandFrame, FRAME_DEPTH> = Channel::new();

/// Enqueue a raw command frame.  Oversized or overflowing frames are
/// dropped — the permissive-drop policy applies before decode, too.
pub fn push_frame(data: &[u8]) -> bool {
    let Ok(frame) = CommandFrame::from_slice(data) else {
        log::warn!("command frame over {} bytes dropped", MAX_FRAME_LEN);
        return false;
    };
    if FRAME_MAILBOX.try_send(frame).is_err() {
        log::warn!("command mailbox full, frame dropped");
        return false;
    }
    true
}

/// Take the next pending frame, if any (main loop only).
pub fn pop_frame() -> Option<CommandFrame> {
    FRAME_MAILBOX.try_receive().ok()
}

#[cfg(test)]
mod tests {
    // Links the std critical-section implementation for the mailbox.
    use critical_section as _;

    use super::*;

    // The statics are shared across the test binary; run everything in
    // one test to keep the queues' state deterministic.
    #[test]
    fn ring_and_mailbox_fifo_and_overflow() {
        while pop_event().is_some() {}
        while pop_frame().is_some() {}

        assert!(push_event(Event::ObserverConnected));
        assert!(push_event(Event::TimeSynced));
        assert_eq!(pop_event(), Some(Event::ObserverConnected));
        assert_eq!(pop_event(), Some(Event::TimeSynced));
        assert_eq!(pop_event(), None);

        // Ring holds CAP-1 entries; the next push reports a drop.
        for _ in 0..EVENT_QUEUE_CAP - 1 {
            assert!(push_event(Event::NetworkLost));
        }
        assert!(!push_event(Event::NetworkLost));
        let mut drained = 0;
        drain_events(|_| drained += 1);
        assert_eq!(drained, EVENT_QUEUE_CAP - 1);

        assert!(push_frame(br#"{"cmd":"alloff"}"#));
        let frame = pop_frame().unwrap();
        assert_eq!(frame.as_slice(), br#"{"cmd":"alloff"}"#);
        assert!(pop_frame().is_none());

        // Oversized frames never enter the mailbox.
        let big = [b'x'; MAX_FRAME_LEN + 1];
        assert!(!push_frame(&big));
        assert!(pop_frame().is_none());
    }
}
