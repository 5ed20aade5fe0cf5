//! A library for advertising [Homie 3.0.0](https://homieiot.github.io/specification/) devices
//! over MQTT.
//!
//! [`HomieDevice`] drives an application-supplied [`MqttSession`] through the device-role publish
//! sequence: on connect it emits a device's full retained description in the order the convention
//! requires, ending with `$state=ready`; afterwards [`HomieDevice::notify_property_changed`]
//! republishes a single property, and incoming `.../set` commands are routed to the matching
//! property's setter. On an orderly shutdown it republishes `$state=disconnected` and
//! unsubscribes.

pub mod model;

pub use model::{BasicDevice, BasicNode, BasicProperty, Device, FnStat, Node, NodeArray, Property, Stat};

use homie_protocol::{
    is_valid_id, is_valid_node_id, is_valid_segment, topic, DeviceState, MqttEventHandler,
    MqttSession, Qos, SessionError, Topic, DEFAULT_BASE_TOPIC,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const QOS: Qos = 1;

/// An error constructing or driving a [`HomieDevice`].
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no devices given")]
    NoDevices,

    #[error("invalid device id {0:?}")]
    InvalidDeviceId(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

struct State {
    session: Box<dyn MqttSession>,
    base_topic: String,
    devices: Vec<Arc<dyn Device>>,
    /// Whether the `+/+/set` wildcard is currently subscribed, for each device, by index into
    /// `devices`. Tracked so `on_closing` unsubscribes exactly what was subscribed.
    subscribed: Vec<bool>,
}

impl State {
    fn device(&self, device_id: &str) -> Option<&Arc<dyn Device>> {
        self.devices.iter().find(|d| d.id() == device_id)
    }

    fn set_topic(&self, device_id: &str) -> String {
        format!("{}{}/+/+/set", self.base_topic, device_id)
    }

    fn publish_retained(&mut self, topic: &str, payload: impl AsRef<str>) -> Result<(), SessionError> {
        self.session.publish(topic, payload.as_ref(), QOS, true)
    }

    /// Emits the full retained description of `device`, per the canonical publish order, and
    /// subscribes to its `set` wildcard. Leaves `$state` at `init` until the very end, where the
    /// device's real current state is published.
    fn publish_device(&mut self, index: usize) -> Result<(), SessionError> {
        let device = self.devices[index].clone();
        let base = format!("{}{}/", self.base_topic, device.id());

        self.publish_retained(&format!("{}$state", base), DeviceState::Init.as_str())?;
        self.publish_retained(&format!("{}$homie", base), homie_protocol::HOMIE_VERSION)?;
        self.publish_retained(&format!("{}$name", base), device.name())?;
        if let Some(ip) = device.local_ip() {
            self.publish_retained(&format!("{}$localip", base), ip)?;
        }
        if let Some(mac) = device.mac() {
            self.publish_retained(&format!("{}$mac", base), mac)?;
        }
        self.publish_retained(&format!("{}$fw/name", base), device.firmware_name())?;
        self.publish_retained(&format!("{}$fw/version", base), device.firmware_version())?;

        let nodes = device.nodes();
        let nodes_list = topic::format_nodes_list(
            nodes.iter().map(|n| (n.id(), n.array().is_arrayed())),
        );
        self.publish_retained(&format!("{}$nodes", base), nodes_list)?;

        self.publish_retained(&format!("{}$implementation", base), device.implementation())?;

        let stats = device.stats();
        let stats_list = stats.iter().map(|s| s.id()).collect::<Vec<_>>().join(",");
        self.publish_retained(&format!("{}$stats", base), stats_list)?;
        self.publish_retained(
            &format!("{}$stats/interval", base),
            (device.stats_interval_ms() / 1000).to_string(),
        )?;
        for stat in &stats {
            self.publish_retained(&format!("{}$stats/{}", base, stat.id()), stat.value())?;
        }

        for (attr, value) in device.extra_attributes() {
            self.publish_retained(&format!("{}${}", base, attr), value)?;
        }

        for node in &nodes {
            self.publish_node(&base, node.as_ref())?;
        }

        self.session.subscribe(&self.set_topic(device.id()), QOS)?;
        self.subscribed[index] = true;

        self.publish_retained(&format!("{}$state", base), device.state().as_str())?;
        Ok(())
    }

    fn publish_node(&mut self, device_base: &str, node: &dyn Node) -> Result<(), SessionError> {
        let node_base = format!("{}{}/", device_base, node.id());
        self.publish_retained(&format!("{}$name", node_base), node.name())?;
        self.publish_retained(&format!("{}$type", node_base), node.node_type())?;

        let properties = node.properties();
        let properties_list = properties.iter().map(|p| p.id()).collect::<Vec<_>>().join(",");
        self.publish_retained(&format!("{}$properties", node_base), properties_list)?;

        match node.array() {
            NodeArray::Single => {
                for property in &properties {
                    self.publish_property_meta(device_base, node.id(), property.as_ref())?;
                    self.publish_property_value(device_base, node.id(), None, property.as_ref())?;
                }
            }
            NodeArray::Range(lo, hi) => {
                self.publish_retained(
                    &format!("{}$array", node_base),
                    topic::format_array_range(lo, hi),
                )?;
                for index in lo..=hi {
                    if let Some(name) = node.index_name(index) {
                        self.publish_retained(
                            &format!("{}{}_{}/$name", device_base, node.id(), index),
                            name,
                        )?;
                    }
                }
                for property in &properties {
                    self.publish_property_meta(device_base, node.id(), property.as_ref())?;
                    for index in lo..=hi {
                        self.publish_property_value(device_base, node.id(), Some(index), property.as_ref())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Publishes a property's attributes. Emitted once per property regardless of array size,
    /// since metadata does not vary by instance.
    fn publish_property_meta(
        &mut self,
        device_base: &str,
        node_id: &str,
        property: &dyn Property,
    ) -> Result<(), SessionError> {
        let meta_base = format!("{}{}/{}/", device_base, node_id, property.id());
        self.publish_retained(&format!("{}$name", meta_base), property.name())?;
        self.publish_retained(
            &format!("{}$settable", meta_base),
            property.settable().to_string(),
        )?;
        if let Some(unit) = property.unit() {
            self.publish_retained(&format!("{}$unit", meta_base), unit)?;
        }
        self.publish_retained(&format!("{}$datatype", meta_base), property.datatype().as_str())?;
        if let Some(format) = property.format() {
            self.publish_retained(&format!("{}$format", meta_base), format)?;
        }
        Ok(())
    }

    fn publish_property_value(
        &mut self,
        device_base: &str,
        node_id: &str,
        index: Option<u32>,
        property: &dyn Property,
    ) -> Result<(), SessionError> {
        let value_topic = format!(
            "{}{}/{}",
            device_base,
            topic::node_segment(node_id, index),
            property.id()
        );
        self.publish_retained(&value_topic, property.value(index))
    }
}

/// The device-role engine. Implements [`MqttEventHandler`] so it can be installed directly as its
/// own session's callback sink; all mutable state lives behind `inner`, per the serialization
/// discipline the port's documentation describes.
pub struct DeviceEngine {
    inner: Mutex<State>,
}

impl DeviceEngine {
    fn republish_all(&self) {
        let mut state = self.inner.lock().unwrap();
        for index in 0..state.devices.len() {
            if let Err(e) = state.publish_device(index) {
                log::error!("failed to publish device: {}", e);
            }
        }
    }

}

impl MqttEventHandler for DeviceEngine {
    fn on_connect(&self, _session_present: bool, _is_reconnect: bool) {
        log::info!("device session connected, (re)publishing all devices");
        self.republish_all();
    }

    fn on_message(&self, topic_str: &str, payload: &str) {
        let base_topic = self.inner.lock().unwrap().base_topic.clone();
        let Some(parsed) = topic::parse(&base_topic, topic_str) else {
            return;
        };
        let Topic::PropertySet {
            device_id,
            node_id,
            index,
            property_id,
        } = parsed
        else {
            return;
        };

        let mut state = self.inner.lock().unwrap();
        let Some(device) = state.device(&device_id).cloned() else {
            return;
        };
        drop(state);

        let Some(node) = device.nodes().into_iter().find(|n| n.id() == node_id) else {
            return;
        };
        let in_range = match (node.array(), index) {
            (NodeArray::Single, None) => true,
            (NodeArray::Range(lo, hi), Some(idx)) => idx >= lo && idx <= hi,
            _ => false,
        };
        if !in_range {
            return;
        }
        let Some(property) = node.properties().into_iter().find(|p| p.id() == property_id) else {
            return;
        };
        if !property.settable() {
            return;
        }
        property.set_value(index, payload);
    }

    fn on_closing(&self) {
        log::info!("device session closing, publishing disconnected");
        let mut state = self.inner.lock().unwrap();
        for index in 0..state.devices.len() {
            let device = state.devices[index].clone();
            let topic = format!("{}{}/$state", state.base_topic, device.id());
            if let Err(e) = state.publish_retained(&topic, DeviceState::Disconnected.as_str()) {
                log::error!("failed to publish disconnected state: {}", e);
            }
            if state.subscribed[index] {
                let set_topic = state.set_topic(device.id());
                if let Err(e) = state.session.unsubscribe(&set_topic) {
                    log::error!("failed to unsubscribe: {}", e);
                }
                state.subscribed[index] = false;
            }
        }
    }
}

/// A handle to a running device-role engine.
///
/// Dropping the last `HomieDevice` handle does not by itself publish `disconnected`; call
/// [`HomieDevice::shutdown`] (or have the embedding application invoke `on_closing` on the
/// session, which it owns) to run the orderly shutdown sequence before tearing the connection
/// down.
#[derive(Clone)]
pub struct HomieDevice {
    engine: Arc<DeviceEngine>,
}

impl HomieDevice {
    /// Builds a device-role engine over `session`, advertising every device in `devices`.
    ///
    /// The connection's Last-Will-and-Testament is pegged to `devices[0]`: MQTT supports exactly
    /// one will per connection, so when multiple devices share a session only the first is
    /// protected by it.
    pub fn new(
        mut session: Box<dyn MqttSession>,
        devices: Vec<Arc<dyn Device>>,
        base_topic: Option<&str>,
    ) -> Result<Self, DeviceError> {
        if devices.is_empty() {
            return Err(DeviceError::NoDevices);
        }
        for device in &devices {
            if !is_valid_id(device.id()) {
                return Err(DeviceError::InvalidDeviceId(device.id().to_owned()));
            }
            for node in device.nodes() {
                if !is_valid_node_id(node.id()) {
                    return Err(DeviceError::InvalidDeviceId(format!(
                        "{}/{}",
                        device.id(),
                        node.id()
                    )));
                }
                for property in node.properties() {
                    if !is_valid_segment(property.id()) {
                        return Err(DeviceError::InvalidDeviceId(format!(
                            "{}/{}/{}",
                            device.id(),
                            node.id(),
                            property.id()
                        )));
                    }
                }
            }
        }

        let base_topic = base_topic.unwrap_or(DEFAULT_BASE_TOPIC).to_owned();
        let subscribed = vec![false; devices.len()];
        let engine = Arc::new(DeviceEngine {
            inner: Mutex::new(State {
                session,
                base_topic: base_topic.clone(),
                devices: devices.clone(),
                subscribed,
            }),
        });

        let handler: Arc<dyn MqttEventHandler> = engine.clone();
        {
            let mut state = engine.inner.lock().unwrap();
            state.session.set_event_handler(Some(handler));
        }

        let will_topic = format!("{}{}/$state", base_topic, devices[0].id());
        {
            let mut state = engine.inner.lock().unwrap();
            state
                .session
                .open_with_will(&will_topic, DeviceState::Lost.as_str(), QOS, true)?;
        }

        Ok(HomieDevice { engine })
    }

    /// Republishes the current value of a property, as §4.2's `notify_property_changed`
    /// contract: retained, QoS 1. Silently ignored if any id fails to resolve, since the
    /// application may race an in-flight topology change against its own model.
    pub fn notify_property_changed(&self, device_id: &str, node_id: &str, property_id: &str) {
        self.notify_property_changed_at(device_id, node_id, property_id, None);
    }

    /// As [`HomieDevice::notify_property_changed`], but republishes a single arrayed instance.
    pub fn notify_property_changed_at(
        &self,
        device_id: &str,
        node_id: &str,
        property_id: &str,
        index: Option<u32>,
    ) {
        let mut state = self.engine.inner.lock().unwrap();
        let Some(device) = state.device(device_id).cloned() else {
            return;
        };
        let Some(node) = device.nodes().into_iter().find(|n| n.id() == node_id) else {
            return;
        };
        let Some(property) = node.properties().into_iter().find(|p| p.id() == property_id) else {
            return;
        };

        let device_base = format!("{}{}/", state.base_topic, device_id);
        match (node.array(), index) {
            (NodeArray::Single, None) => {
                let topic = format!("{}{}/{}", device_base, node_id, property_id);
                let value = property.value(None);
                if let Err(e) = state.publish_retained(&topic, value) {
                    log::error!("failed to republish property: {}", e);
                }
            }
            (NodeArray::Range(lo, hi), Some(idx)) if idx >= lo && idx <= hi => {
                let topic = format!(
                    "{}{}/{}",
                    device_base,
                    topic::node_segment(node_id, Some(idx)),
                    property_id
                );
                let value = property.value(Some(idx));
                if let Err(e) = state.publish_retained(&topic, value) {
                    log::error!("failed to republish property: {}", e);
                }
            }
            (NodeArray::Range(lo, hi), None) => {
                for idx in lo..=hi {
                    let topic = format!(
                        "{}{}/{}",
                        device_base,
                        topic::node_segment(node_id, Some(idx)),
                        property_id
                    );
                    let value = property.value(Some(idx));
                    if let Err(e) = state.publish_retained(&topic, value) {
                        log::error!("failed to republish property: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    /// Republishes a device's `$state`, reading it back from [`Device::state`]. Call this after
    /// changing a device's state (e.g. to `sleeping` or `alert`) mid-session; unlike a property
    /// value, `$state` has no per-call argument here since the model is the source of truth.
    /// Silently ignored if `device_id` does not resolve.
    pub fn notify_state_changed(&self, device_id: &str) {
        let mut state = self.engine.inner.lock().unwrap();
        let Some(device) = state.device(device_id).cloned() else {
            return;
        };
        let topic = format!("{}{}/$state", state.base_topic, device_id);
        let value = device.state().as_str();
        if let Err(e) = state.publish_retained(&topic, value) {
            log::error!("failed to republish state: {}", e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.engine.inner.lock().unwrap().session.is_connected()
    }

    /// Runs the orderly shutdown sequence: publishes `$state=disconnected` for every device and
    /// unsubscribes. Equivalent to the session delivering `on_closing`, callable directly by
    /// applications that tear down their own `HomieDevice` without going through the session.
    pub fn shutdown(&self) {
        self.engine.on_closing();
    }
}
