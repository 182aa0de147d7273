//! Observer hub — WebSocket fan-out for the synchronization protocol.
//!
//! Implements [`BroadcastSink`].  On target this owns the embedded HTTP
//! server's `/ws` endpoint: inbound frames go straight into the command
//! mailbox (decoded later, inside the control loop), connects and
//! disconnects surface as [`Event`]s, and broadcasts fan out to every
//! attached client through detached senders.  A freshly connected
//! observer is served by the connect event: the loop reacts with a
//! broadcast, so the newcomer holds a full snapshot within one drain.
//!
//! The non-espidf backend records broadcasts and lets tests script the
//! observer count.

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::BroadcastSink;
use crate::app::snapshot::StateSnapshot;
#[cfg(target_os = "espidf")]
use crate::events::{self, Event};

#[cfg(target_os = "espidf")]
use std::sync::{Arc, Mutex};

#[cfg(target_os = "espidf")]
type SenderList =
    Arc<Mutex<Vec<(i32, esp_idf_svc::http::server::ws::EspHttpWsDetachedSender)>>>;

pub struct WsHub {
    #[cfg(target_os = "espidf")]
    _server: esp_idf_svc::http::server::EspHttpServer<'static>,
    #[cfg(target_os = "espidf")]
    senders: SenderList,

    #[cfg(not(target_os = "espidf"))]
    sim_observers: usize,
    #[cfg(not(target_os = "espidf"))]
    sim_broadcasts: Vec<StateSnapshot>,
}

#[cfg(target_os = "espidf")]
impl WsHub {
    /// Start the HTTP server and register the `/ws` endpoint.
    pub fn start() -> Result<Self, esp_idf_svc::sys::EspError> {
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};
        use esp_idf_svc::sys::EspError;

        let mut server = EspHttpServer::new(&Configuration::default())?;
        let senders: SenderList = Arc::new(Mutex::new(Vec::new()));
        let handler_senders = Arc::clone(&senders);

        server.ws_handler("/ws", move |ws| -> Result<(), EspError> {
            if ws.is_new() {
                match ws.create_detached_sender() {
                    Ok(sender) => {
                        handler_senders.lock().unwrap().push((ws.session(), sender));
                        info!("observer #{} connected", ws.session());
                        let _ = events::push_event(Event::ObserverConnected);
                    }
                    Err(e) => warn!("observer attach failed: {}", e),
                }
                return Ok(());
            }

            if ws.is_closed() {
                handler_senders
                    .lock()
                    .unwrap()
                    .retain(|(session, _)| *session != ws.session());
                info!("observer #{} disconnected", ws.session());
                let _ = events::push_event(Event::ObserverDisconnected);
                return Ok(());
            }

            // First recv with an empty buffer reports the frame length.
            let (_frame_type, len) = ws.recv(&mut [])?;
            if len > events::MAX_FRAME_LEN {
                warn!("observer frame of {} bytes dropped", len);
                return Ok(());
            }
            let mut buf = vec![0u8; len];
            ws.recv(buf.as_mut_slice())?;
            // Text frames arrive NUL-terminated.
            if buf.last() == Some(&0) {
                buf.pop();
            }
            let _ = events::push_frame(&buf);
            Ok(())
        })?;

        info!("observer hub listening on /ws");
        Ok(Self {
            _server: server,
            senders,
        })
    }
}

#[cfg(not(target_os = "espidf"))]
impl WsHub {
    pub fn start() -> Result<Self, core::convert::Infallible> {
        info!("observer hub (sim): started");
        Ok(Self {
            sim_observers: 0,
            sim_broadcasts: Vec::new(),
        })
    }

    /// Simulation: script the number of attached observers.
    pub fn sim_set_observers(&mut self, count: usize) {
        self.sim_observers = count;
    }

    /// Simulation: broadcasts recorded so far.
    pub fn sim_broadcasts(&self) -> &[StateSnapshot] {
        &self.sim_broadcasts
    }
}

impl BroadcastSink for WsHub {
    #[cfg(target_os = "espidf")]
    fn broadcast(&mut self, snapshot: &StateSnapshot) {
        use esp_idf_svc::ws::FrameType;

        let json = snapshot.to_json();
        let mut senders = self.senders.lock().unwrap();
        senders.retain_mut(|(session, sender)| {
            match sender.send(FrameType::Text(false), json.as_bytes()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("observer #{}: send failed ({}), dropping", session, e);
                    false
                }
            }
        });
    }

    #[cfg(not(target_os = "espidf"))]
    fn broadcast(&mut self, snapshot: &StateSnapshot) {
        self.sim_broadcasts.push(snapshot.clone());
    }

    #[cfg(target_os = "espidf")]
    fn observer_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    #[cfg(not(target_os = "espidf"))]
    fn observer_count(&self) -> usize {
        self.sim_observers
    }

    #[cfg(target_os = "espidf")]
    fn cleanup(&mut self) {
        self.senders
            .lock()
            .unwrap()
            .retain(|(_, sender)| !sender.is_closed());
    }

    #[cfg(not(target_os = "espidf"))]
    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::ClockPort;
    use crate::channels::ChannelStore;
    use crate::config::BoardConfig;

    struct ZeroClock;
    impl ClockPort for ZeroClock {
        fn uptime_ms(&self) -> u64 {
            0
        }
        fn timestamp(&self) -> heapless::String<24> {
            heapless::String::new()
        }
        fn is_synced(&self) -> bool {
            false
        }
    }

    #[test]
    fn sim_hub_records_broadcasts() {
        let mut hub = WsHub::start().unwrap();
        assert_eq!(hub.observer_count(), 0);
        hub.sim_set_observers(2);
        assert_eq!(hub.observer_count(), 2);

        let store = ChannelStore::from_config(&BoardConfig::default());
        let snap = StateSnapshot::capture(&store, [true, true], &ZeroClock);
        hub.broadcast(&snap);
        assert_eq!(hub.sim_broadcasts().len(), 1);
        assert_eq!(hub.sim_broadcasts()[0], snap);
    }
}
