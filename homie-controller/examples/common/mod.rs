//! Wires a synchronous `rumqttc` client up to the [`MqttSession`] port these examples depend on.
//! See the equivalent adapter in `homie-device`'s examples for the reasoning behind driving the
//! connection from a background thread.

use homie_protocol::{MqttEventHandler, MqttSession, Qos, SessionError};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
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
        // The controller role never requests a will; present for trait conformance only.
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
