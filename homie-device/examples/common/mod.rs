//! Wires a synchronous `rumqttc` client up to the [`MqttSession`] port these examples depend on.
//!
//! `homie-device` never talks to a broker itself; an embedder supplies whatever client it likes.
//! This adapter uses `rumqttc`'s blocking `Client`/`Connection` pair (not the async one) and drives
//! the connection's event iterator from a background thread, so callbacks always arrive from a
//! thread distinct from whichever one is calling into the engine, per `MqttSession`'s contract.

use homie_protocol::{MqttEventHandler, MqttSession, Qos, SessionError};
use rumqttc::{Client, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex};
use std::thread;

fn qos(q: Qos) -> QoS {
    match q {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

pub struct RumqttcSession {
    client: Client,
    connection: Option<Connection>,
    handler: Arc<Mutex<Option<Arc<dyn MqttEventHandler>>>>,
}

impl RumqttcSession {
    pub fn new(mut mqttoptions: MqttOptions) -> Self {
        mqttoptions.set_keep_alive(std::time::Duration::from_secs(5));
        let (client, connection) = Client::new(mqttoptions, 10);
        RumqttcSession {
            client,
            connection: Some(connection),
            handler: Arc::new(Mutex::new(None)),
        }
    }

    fn spawn_event_loop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };
        let handler = self.handler.clone();
        thread::spawn(move || {
            for notification in connection.iter() {
                let handler = handler.lock().unwrap().clone();
                let Some(handler) = handler else { continue };
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        handler.on_connect(ack.session_present, false);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Ok(payload) = std::str::from_utf8(&publish.payload) {
                            handler.on_message(&publish.topic, payload);
                        }
                    }
                    Ok(_) => {}
                    Err(_) => {
                        handler.on_offline();
                        break;
                    }
                }
            }
        });
    }
}

impl MqttSession for RumqttcSession {
    fn set_event_handler(&mut self, handler: Option<Arc<dyn MqttEventHandler>>) {
        *self.handler.lock().unwrap() = handler;
    }

    fn open_with_will(
        &mut self,
        _will_topic: &str,
        _will_payload: &str,
        _will_qos: Qos,
        _will_retain: bool,
    ) -> Result<(), SessionError> {
        // rumqttc only accepts a will baked into `MqttOptions` before the client is created, so
        // the caller bakes it in with `with_last_will` ahead of `RumqttcSession::new` instead of
        // us doing anything with the parameters here.
        self.spawn_event_loop();
        Ok(())
    }

    fn open(&mut self) -> Result<(), SessionError> {
        self.spawn_event_loop();
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &str, q: Qos, retain: bool) -> Result<(), SessionError> {
        self.client
            .publish(topic, qos(q), retain, payload.as_bytes().to_vec())
            .map_err(|e| SessionError::new(e.to_string()))
    }

    fn subscribe(&mut self, topic: &str, q: Qos) -> Result<(), SessionError> {
        self.client
            .subscribe(topic, qos(q))
            .map_err(|e| SessionError::new(e.to_string()))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        self.client
            .unsubscribe(topic)
            .map_err(|e| SessionError::new(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

/// Builds the will up front, since `rumqttc` needs it baked into `MqttOptions` before connecting.
pub fn with_last_will(mut mqttoptions: MqttOptions, topic: &str, payload: &str, q: Qos, retain: bool) -> MqttOptions {
    mqttoptions.set_last_will(LastWill::new(topic, payload.as_bytes().to_vec(), qos(q), retain));
    mqttoptions
}
