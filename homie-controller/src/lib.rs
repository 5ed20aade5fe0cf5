//! A library for discovering and controlling devices implementing the
//! [Homie 3.0.0](https://homieiot.github.io/specification/) convention over MQTT.
//!
//! [`HomieController`] drives an application-supplied [`MqttSession`] and assembles the retained
//! attributes it observes into a [`Device`] tree. Assembly is silent: a device stays invisible to
//! the application until every attribute the convention requires has been observed (see
//! [`Device::has_required_attributes`]) and `$state` has reached `ready`, at which point
//! [`ControllerEventHandler::on_device_discovered`] fires exactly once. Every subsequent change is
//! reported through the finer-grained `on_*_changed` callbacks.

pub mod model;
pub mod values;

pub use model::{Device, Node, Property};
pub use values::{Color, ColorFormat, ColorHSV, ColorRGB, EnumValue, Value, ValueError};

pub use homie_protocol::Datatype;

use homie_protocol::{topic, DeviceState, MqttEventHandler, MqttSession, Qos, SessionError, Topic, DEFAULT_BASE_TOPIC};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

const QOS: Qos = 1;

/// An error constructing or driving a [`HomieController`].
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Callbacks delivered as the controller's view of the bus changes.
///
/// All methods default to doing nothing, so an application only needs to implement the ones it
/// cares about. A device's snapshot is passed by reference rather than threaded field-by-field,
/// since most applications want to read more than one attribute once something has changed.
pub trait ControllerEventHandler: Send + Sync {
    /// A `$broadcast/<level>` message arrived. Broadcasts aren't associated with any device, so
    /// they are forwarded unconditionally, without waiting for any device to be discovered.
    fn on_broadcast(&self, _level: &str, _payload: &str) {}

    /// `device` has just become fully known: every attribute the convention requires is present
    /// and `$state` is `ready`. Fired exactly once per device, never alongside another callback
    /// for the same message.
    fn on_device_discovered(&self, _device: &Device) {}

    /// A device-level attribute of an already-discovered device changed.
    fn on_device_changed(&self, _device: &Device) {}

    /// A node-level attribute of an already-discovered device's node changed.
    fn on_node_changed(&self, _device: &Device, _node_id: &str, _index: Option<u32>) {}

    /// A property's metadata (name, datatype, unit, format, settable) changed.
    fn on_property_changed(&self, _device: &Device, _node_id: &str, _index: Option<u32>, _property_id: &str) {}

    /// A property's value changed.
    fn on_property_value_changed(
        &self,
        _device: &Device,
        _node_id: &str,
        _index: Option<u32>,
        _property_id: &str,
        _value: &str,
    ) {
    }
}

/// What kind of thing changed about an already-discovered device, once a message has been
/// ingested into the model. Drives which `ControllerEventHandler` method `handle_change` calls.
enum Change {
    Device,
    Node {
        node_id: String,
        index: Option<u32>,
    },
    Property {
        node_id: String,
        index: Option<u32>,
        property_id: String,
    },
    PropertyValue {
        node_id: String,
        index: Option<u32>,
        property_id: String,
        value: String,
    },
}

struct State {
    session: Box<dyn MqttSession>,
    base_topic: String,
    devices: HashMap<String, Device>,
    /// Device IDs for which `on_device_discovered` has already fired.
    discovered: HashSet<String>,
    handler: Option<Arc<dyn ControllerEventHandler>>,
    subscribed: bool,
}

impl State {
    fn device_mut(&mut self, device_id: &str) -> &mut Device {
        self.devices
            .entry(device_id.to_owned())
            .or_insert_with(|| Device::new(device_id))
    }
}

/// The controller-role engine. Implements [`MqttEventHandler`] so it can be installed directly as
/// its own session's callback sink.
pub struct ControllerEngine {
    inner: Mutex<State>,
}

impl ControllerEngine {
    fn wildcard_topic(base_topic: &str) -> String {
        format!("{}#", base_topic)
    }

    /// Applies a device-attribute topic to the model.
    fn ingest_device_attribute(device: &mut Device, attr: &str, payload: &str) {
        match attr {
            "homie" => device.homie_version = Some(payload.to_owned()),
            "name" => device.name = Some(payload.to_owned()),
            "state" => device.state = DeviceState::from_wire(payload),
            "localip" => device.local_ip = Some(payload.to_owned()),
            "mac" => device.mac = Some(payload.to_owned()),
            "fw/name" => device.firmware_name = Some(payload.to_owned()),
            "fw/version" => device.firmware_version = Some(payload.to_owned()),
            "implementation" => device.implementation = Some(payload.to_owned()),
            "nodes" => {
                let mut ids = Vec::new();
                if !payload.is_empty() {
                    for entry in payload.split(',') {
                        let (id, arrayed) = match entry.strip_suffix("[]") {
                            Some(id) => (id, true),
                            None => (entry, false),
                        };
                        device.node_mut(id, arrayed);
                        ids.push(id.to_owned());
                    }
                }
                device.nodes_list = Some(ids);
            }
            "stats/interval" => {
                if let Ok(secs) = payload.parse() {
                    device.stats_interval = Some(Duration::from_secs(secs));
                }
            }
            "stats" => {}
            _ => {
                if let Some(stat_id) = attr.strip_prefix("stats/") {
                    device.stats.insert(stat_id.to_owned(), payload.to_owned());
                } else {
                    device.extra_attributes.insert(attr.to_owned(), payload.to_owned());
                }
            }
        }
    }

    fn ingest_node_attribute(device: &mut Device, node_id: &str, index: Option<u32>, attr: &str, payload: &str) {
        let node = device.node_mut(node_id, false);
        match attr {
            "name" => match index {
                Some(idx) => {
                    node.index_names.insert(idx, payload.to_owned());
                }
                None => node.name = Some(payload.to_owned()),
            },
            "type" => node.node_type = Some(payload.to_owned()),
            "array" => {
                if let Some(range) = topic::parse_array_range(payload) {
                    node.array = Some(range);
                }
            }
            _ => {}
        }
    }

    fn ingest_property_attribute(
        device: &mut Device,
        node_id: &str,
        property_id: &str,
        attr: &str,
        payload: &str,
    ) {
        let property = device.node_mut(node_id, false).property_mut(property_id);
        match attr {
            "name" => property.name = Some(payload.to_owned()),
            "settable" => property.settable = payload == "true",
            "unit" => property.unit = Some(payload.to_owned()),
            "datatype" => property.datatype = Some(homie_protocol::Datatype::from_wire(payload)),
            "format" => property.format = Some(payload.to_owned()),
            _ => {}
        }
    }

    /// Applies the discovery-gating rule and, if warranted, calls out to the handler.
    ///
    /// Before discovery the device is assembled silently: no callback fires at all, even though
    /// the model has already been updated, since there is nothing yet for an application to act
    /// on. The message that completes discovery fires `on_device_discovered` alone; `change` is
    /// not also reported for that message, since the whole device is new as far as the
    /// application is concerned.
    fn handle_change(&self, device_id: &str, change: Change) {
        let (handler, snapshot, just_discovered) = {
            let mut state = self.inner.lock().unwrap();
            let Some(device) = state.devices.get(device_id) else {
                return;
            };
            let already_discovered = state.discovered.contains(device_id);
            let just_discovered = !already_discovered
                && device.has_required_attributes()
                && device.state == DeviceState::Ready;
            if just_discovered {
                state.discovered.insert(device_id.to_owned());
            } else if !already_discovered {
                return;
            }
            (state.handler.clone(), device.clone(), just_discovered)
        };
        let Some(handler) = handler else {
            return;
        };
        if just_discovered {
            handler.on_device_discovered(&snapshot);
            return;
        }
        match change {
            Change::Device => handler.on_device_changed(&snapshot),
            Change::Node { node_id, index } => handler.on_node_changed(&snapshot, &node_id, index),
            Change::Property {
                node_id,
                index,
                property_id,
            } => handler.on_property_changed(&snapshot, &node_id, index, &property_id),
            Change::PropertyValue {
                node_id,
                index,
                property_id,
                value,
            } => handler.on_property_value_changed(&snapshot, &node_id, index, &property_id, &value),
        }
    }
}

impl MqttEventHandler for ControllerEngine {
    fn on_connect(&self, _session_present: bool, _is_reconnect: bool) {
        log::info!("controller session connected, subscribing to base topic");
        let mut state = self.inner.lock().unwrap();
        let topic = Self::wildcard_topic(&state.base_topic);
        if let Err(e) = state.session.subscribe(&topic, QOS) {
            log::error!("failed to subscribe: {}", e);
        } else {
            state.subscribed = true;
        }
    }

    fn on_message(&self, topic_str: &str, payload: &str) {
        let base_topic = self.inner.lock().unwrap().base_topic.clone();
        let Some(parsed) = topic::parse(&base_topic, topic_str) else {
            return;
        };

        match parsed {
            Topic::Broadcast { level } => {
                let handler = self.inner.lock().unwrap().handler.clone();
                if let Some(handler) = handler {
                    handler.on_broadcast(&level, payload);
                }
            }
            Topic::DeviceAttribute { device_id, attr } => {
                {
                    let mut state = self.inner.lock().unwrap();
                    let device = state.device_mut(&device_id);
                    Self::ingest_device_attribute(device, &attr, payload);
                }
                self.handle_change(&device_id, Change::Device);
            }
            Topic::NodeAttribute {
                device_id,
                node_id,
                index,
                attr,
            } => {
                {
                    let mut state = self.inner.lock().unwrap();
                    let device = state.device_mut(&device_id);
                    Self::ingest_node_attribute(device, &node_id, index, &attr, payload);
                }
                self.handle_change(&device_id, Change::Node { node_id, index });
            }
            Topic::PropertyAttribute {
                device_id,
                node_id,
                index,
                property_id,
                attr,
            } => {
                {
                    let mut state = self.inner.lock().unwrap();
                    let device = state.device_mut(&device_id);
                    Self::ingest_property_attribute(device, &node_id, &property_id, &attr, payload);
                }
                self.handle_change(
                    &device_id,
                    Change::Property {
                        node_id,
                        index,
                        property_id,
                    },
                );
            }
            Topic::PropertyValue {
                device_id,
                node_id,
                index,
                property_id,
            } => {
                {
                    let mut state = self.inner.lock().unwrap();
                    let device = state.device_mut(&device_id);
                    device
                        .node_mut(&node_id, false)
                        .property_mut(&property_id)
                        .set_value(index, payload);
                }
                self.handle_change(
                    &device_id,
                    Change::PropertyValue {
                        node_id,
                        index,
                        property_id,
                        value: payload.to_owned(),
                    },
                );
            }
            Topic::PropertySet { .. } => {
                // Commands flow controller-to-device; the controller never originates or acts on
                // one observed on the bus.
            }
        }
    }

    fn on_closing(&self) {
        log::info!("controller session closing, unsubscribing");
        let mut state = self.inner.lock().unwrap();
        if state.subscribed {
            let topic = Self::wildcard_topic(&state.base_topic);
            if let Err(e) = state.session.unsubscribe(&topic) {
                log::error!("failed to unsubscribe: {}", e);
            }
            state.subscribed = false;
        }
    }
}

/// A handle to a running controller-role engine.
#[derive(Clone)]
pub struct HomieController {
    engine: Arc<ControllerEngine>,
}

impl HomieController {
    /// Builds a controller-role engine over `session`, watching every device under `base_topic`
    /// (`homie/` if `None`).
    pub fn new(session: Box<dyn MqttSession>, base_topic: Option<&str>) -> Result<Self, ControllerError> {
        let base_topic = base_topic.unwrap_or(DEFAULT_BASE_TOPIC).to_owned();
        let engine = Arc::new(ControllerEngine {
            inner: Mutex::new(State {
                session,
                base_topic,
                devices: HashMap::new(),
                discovered: HashSet::new(),
                handler: None,
                subscribed: false,
            }),
        });

        let handler: Arc<dyn MqttEventHandler> = engine.clone();
        {
            let mut state = engine.inner.lock().unwrap();
            state.session.set_event_handler(Some(handler));
        }
        {
            let mut state = engine.inner.lock().unwrap();
            state.session.open()?;
        }

        Ok(HomieController { engine })
    }

    /// Installs the callback sink for discovery and change events, replacing any previous one.
    pub fn set_event_handler(&self, handler: Option<Arc<dyn ControllerEventHandler>>) {
        self.engine.inner.lock().unwrap().handler = handler;
    }

    /// Returns a snapshot of every device that has reached the `discovered` state.
    pub fn get_discovered_devices(&self) -> Vec<Device> {
        let state = self.engine.inner.lock().unwrap();
        state
            .discovered
            .iter()
            .filter_map(|id| state.devices.get(id).cloned())
            .collect()
    }

    /// Returns a snapshot of `device_id`, if it has reached the `discovered` state.
    pub fn get_discovered_device(&self, device_id: &str) -> Option<Device> {
        let state = self.engine.inner.lock().unwrap();
        if state.discovered.contains(device_id) {
            state.devices.get(device_id).cloned()
        } else {
            None
        }
    }

    pub fn is_connected(&self) -> bool {
        self.engine.inner.lock().unwrap().session.is_connected()
    }

    /// Publishes a `.../set` command for a settable property, addressing a single instance of an
    /// arrayed node when `index` is given. This is how a controller actually drives a device, as
    /// opposed to merely observing it; the command is not retained, since a stale command
    /// replayed to a late subscriber would be actioned twice.
    pub fn set(&self, device_id: &str, node_id: &str, property_id: &str, index: Option<u32>, value: &str) {
        let mut state = self.engine.inner.lock().unwrap();
        let node_segment = topic::node_segment(node_id, index);
        let topic = format!("{}{}/{}/{}/set", state.base_topic, device_id, node_segment, property_id);
        if let Err(e) = state.session.publish(&topic, value, QOS, false) {
            log::error!("failed to publish set command: {}", e);
        }
    }

    /// Runs the orderly shutdown sequence: unsubscribes from the base topic.
    pub fn shutdown(&self) {
        self.engine.on_closing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSession {
        subscribed: Arc<StdMutex<Vec<String>>>,
        unsubscribed: Arc<StdMutex<Vec<String>>>,
        published: Arc<StdMutex<Vec<(String, String, Qos, bool)>>>,
        connected: bool,
    }

    impl RecordingSession {
        fn new() -> (
            Box<dyn MqttSession>,
            Arc<StdMutex<Vec<String>>>,
            Arc<StdMutex<Vec<String>>>,
        ) {
            let (session, subscribed, unsubscribed, _) = Self::new_with_published();
            (session, subscribed, unsubscribed)
        }

        fn new_with_published() -> (
            Box<dyn MqttSession>,
            Arc<StdMutex<Vec<String>>>,
            Arc<StdMutex<Vec<String>>>,
            Arc<StdMutex<Vec<(String, String, Qos, bool)>>>,
        ) {
            let subscribed = Arc::new(StdMutex::new(Vec::new()));
            let unsubscribed = Arc::new(StdMutex::new(Vec::new()));
            let published = Arc::new(StdMutex::new(Vec::new()));
            let session = Box::new(RecordingSession {
                subscribed: subscribed.clone(),
                unsubscribed: unsubscribed.clone(),
                published: published.clone(),
                connected: false,
            });
            (session, subscribed, unsubscribed, published)
        }
    }

    impl MqttSession for RecordingSession {
        fn set_event_handler(&mut self, _handler: Option<Arc<dyn MqttEventHandler>>) {}

        fn open_with_will(
            &mut self,
            _will_topic: &str,
            _will_payload: &str,
            _will_qos: Qos,
            _will_retain: bool,
        ) -> Result<(), SessionError> {
            self.connected = true;
            Ok(())
        }

        fn open(&mut self) -> Result<(), SessionError> {
            self.connected = true;
            Ok(())
        }

        fn publish(&mut self, topic: &str, payload: &str, qos: Qos, retain: bool) -> Result<(), SessionError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_owned(), payload.to_owned(), qos, retain));
            Ok(())
        }

        fn subscribe(&mut self, topic: &str, _qos: Qos) -> Result<(), SessionError> {
            self.subscribed.lock().unwrap().push(topic.to_owned());
            Ok(())
        }

        fn unsubscribe(&mut self, topic: &str) -> Result<(), SessionError> {
            self.unsubscribed.lock().unwrap().push(topic.to_owned());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct RecordingHandler {
        discovered: Arc<StdMutex<Vec<String>>>,
        property_values: Arc<StdMutex<Vec<(String, String, String)>>>,
        broadcasts: Arc<StdMutex<Vec<(String, String)>>>,
    }

    impl ControllerEventHandler for RecordingHandler {
        fn on_broadcast(&self, level: &str, payload: &str) {
            self.broadcasts
                .lock()
                .unwrap()
                .push((level.to_owned(), payload.to_owned()));
        }

        fn on_device_discovered(&self, device: &Device) {
            self.discovered.lock().unwrap().push(device.id.clone());
        }

        fn on_property_value_changed(
            &self,
            device: &Device,
            node_id: &str,
            _index: Option<u32>,
            property_id: &str,
            value: &str,
        ) {
            self.property_values.lock().unwrap().push((
                format!("{}/{}/{}", device.id, node_id, property_id),
                value.to_owned(),
                device.state.as_str().to_owned(),
            ));
        }
    }

    fn publish_minimal_device(engine: &ControllerEngine) {
        for (topic, payload) in [
            ("homie/testdevice/$homie", "3.0.0"),
            ("homie/testdevice/$name", "Test device"),
            ("homie/testdevice/$nodes", "testnode"),
            ("homie/testdevice/testnode/$name", "Test node"),
            ("homie/testdevice/testnode/$type", "light"),
            ("homie/testdevice/testnode/$properties", "intensity"),
            ("homie/testdevice/testnode/intensity/$name", "Intensity"),
            ("homie/testdevice/testnode/intensity/$datatype", "integer"),
            ("homie/testdevice/testnode/intensity/$settable", "true"),
            ("homie/testdevice/testnode/intensity", "50"),
            ("homie/testdevice/$state", "ready"),
        ] {
            engine.on_message(topic, payload);
        }
    }

    #[test]
    fn subscribes_to_wildcard_on_connect() {
        let (session, subscribed, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        controller.engine.on_connect(false, false);
        assert_eq!(subscribed.lock().unwrap().clone(), vec!["homie/#".to_owned()]);
    }

    #[test]
    fn assembly_is_silent_until_ready() {
        let (session, _, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        let discovered = Arc::new(StdMutex::new(Vec::new()));
        let handler = Arc::new(RecordingHandler {
            discovered: discovered.clone(),
            property_values: Arc::new(StdMutex::new(Vec::new())),
            broadcasts: Arc::new(StdMutex::new(Vec::new())),
        });
        controller.set_event_handler(Some(handler));

        controller.engine.on_message("homie/testdevice/$homie", "3.0.0");
        controller.engine.on_message("homie/testdevice/$name", "Test device");
        controller.engine.on_message("homie/testdevice/$nodes", "testnode");
        assert!(discovered.lock().unwrap().is_empty());
        assert!(controller.get_discovered_device("testdevice").is_none());
    }

    #[test]
    fn discovery_fires_once_when_structurally_complete_and_ready() {
        let (session, _, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        let discovered = Arc::new(StdMutex::new(Vec::new()));
        let handler = Arc::new(RecordingHandler {
            discovered: discovered.clone(),
            property_values: Arc::new(StdMutex::new(Vec::new())),
            broadcasts: Arc::new(StdMutex::new(Vec::new())),
        });
        controller.set_event_handler(Some(handler));

        publish_minimal_device(&controller.engine);

        assert_eq!(discovered.lock().unwrap().clone(), vec!["testdevice".to_owned()]);
        let device = controller.get_discovered_device("testdevice").unwrap();
        assert_eq!(device.name.as_deref(), Some("Test device"));
        assert_eq!(
            device.nodes["testnode"].properties["intensity"].raw_value(None),
            Some("50")
        );
    }

    #[test]
    fn live_update_after_discovery_emits_property_value_changed() {
        let (session, _, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        let property_values = Arc::new(StdMutex::new(Vec::new()));
        let handler = Arc::new(RecordingHandler {
            discovered: Arc::new(StdMutex::new(Vec::new())),
            property_values: property_values.clone(),
            broadcasts: Arc::new(StdMutex::new(Vec::new())),
        });
        controller.set_event_handler(Some(handler));
        publish_minimal_device(&controller.engine);

        controller.engine.on_message("homie/testdevice/testnode/intensity", "75");

        let seen = property_values.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(
                "testdevice/testnode/intensity".to_owned(),
                "75".to_owned(),
                "ready".to_owned()
            )]
        );
    }

    #[test]
    fn broadcast_is_forwarded_without_any_device() {
        let (session, _, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        let broadcasts = Arc::new(StdMutex::new(Vec::new()));
        let handler = Arc::new(RecordingHandler {
            discovered: Arc::new(StdMutex::new(Vec::new())),
            property_values: Arc::new(StdMutex::new(Vec::new())),
            broadcasts: broadcasts.clone(),
        });
        controller.set_event_handler(Some(handler));

        controller.engine.on_message("homie/$broadcast/alert", "fire");

        assert_eq!(
            broadcasts.lock().unwrap().clone(),
            vec![("alert".to_owned(), "fire".to_owned())]
        );
    }

    #[test]
    fn arrayed_node_requires_array_attribute_for_discovery() {
        let (session, _, _) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        let discovered = Arc::new(StdMutex::new(Vec::new()));
        let handler = Arc::new(RecordingHandler {
            discovered: discovered.clone(),
            property_values: Arc::new(StdMutex::new(Vec::new())),
            broadcasts: Arc::new(StdMutex::new(Vec::new())),
        });
        controller.set_event_handler(Some(handler));

        for (topic, payload) in [
            ("homie/testdevice/$homie", "3.0.0"),
            ("homie/testdevice/$name", "Test device"),
            ("homie/testdevice/$nodes", "testnode[]"),
            ("homie/testdevice/testnode/$name", "Test node"),
            ("homie/testdevice/testnode/$type", "light"),
            ("homie/testdevice/testnode/$properties", "intensity"),
            ("homie/testdevice/testnode/intensity/$name", "Intensity"),
            ("homie/testdevice/testnode/intensity/$datatype", "integer"),
            ("homie/testdevice/$state", "ready"),
        ] {
            controller.engine.on_message(topic, payload);
        }
        assert!(discovered.lock().unwrap().is_empty());

        controller
            .engine
            .on_message("homie/testdevice/testnode/$array", "1-2");
        assert_eq!(discovered.lock().unwrap().clone(), vec!["testdevice".to_owned()]);
    }

    #[test]
    fn shutdown_unsubscribes() {
        let (session, _, unsubscribed) = RecordingSession::new();
        let controller = HomieController::new(session, None).unwrap();
        controller.engine.on_connect(false, false);
        controller.shutdown();
        assert_eq!(unsubscribed.lock().unwrap().clone(), vec!["homie/#".to_owned()]);
    }

    #[test]
    fn set_publishes_unretained_command_to_the_matching_property() {
        let (session, _, _, published) = RecordingSession::new_with_published();
        let controller = HomieController::new(session, None).unwrap();

        controller.set("testdevice", "testnode", "intensity", None, "42");
        controller.set("testdevice", "testnode", "intensity", Some(2), "7");

        let published = published.lock().unwrap().clone();
        assert_eq!(
            published,
            vec![
                ("homie/testdevice/testnode/intensity/set".to_owned(), "42".to_owned(), 1, false),
                ("homie/testdevice/testnode_2/intensity/set".to_owned(), "7".to_owned(), 1, false),
            ]
        );
    }
}
