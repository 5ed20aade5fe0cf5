//! The device-side domain model: capability interfaces the publisher drives, plus basic
//! convenience implementations that store their state in memory.
//!
//! The engine depends only on the accessors declared here; an application is free to implement
//! [`Device`], [`Node`] and [`Property`] directly over its own hardware state instead of using the
//! `Basic*` types, in which case `notify_property_changed` becomes the only synchronization point
//! between the application's mutations and what gets published.

use homie_protocol::{Datatype, DeviceState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Whether a node is a single instance or an arrayed range of instances.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeArray {
    Single,
    /// An arrayed node, instantiated at addresses `<node>_<lo>` through `<node>_<hi>` inclusive.
    Range(u32, u32),
}

impl NodeArray {
    pub fn is_arrayed(&self) -> bool {
        matches!(self, NodeArray::Range(..))
    }

    pub fn range(&self) -> Option<(u32, u32)> {
        match self {
            NodeArray::Range(lo, hi) => Some((*lo, *hi)),
            NodeArray::Single => None,
        }
    }
}

/// A [device](https://homieiot.github.io/specification/#devices) advertised by this process.
pub trait Device: Send + Sync {
    /// The subtopic ID of the device. Must follow the Homie
    /// [ID format](https://homieiot.github.io/specification/#topic-ids).
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// The device's current lifecycle state. The publisher is the only thing that may observe
    /// this change mid-session (between `ready`/`sleeping`/`alert`); the caller is responsible for
    /// keeping it consistent with whatever it last asked the publisher to announce.
    fn state(&self) -> DeviceState;

    fn local_ip(&self) -> Option<String> {
        None
    }

    fn mac(&self) -> Option<String> {
        None
    }

    fn firmware_name(&self) -> &str {
        "homie-device"
    }

    fn firmware_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn implementation(&self) -> &str {
        "homie-rs"
    }

    /// The interval, in milliseconds, at which `stats()` should be considered fresh. Published on
    /// the wire in seconds.
    fn stats_interval_ms(&self) -> u64 {
        60_000
    }

    /// The device's [stats](https://homieiot.github.io/specification/#stats-node), e.g. uptime.
    fn stats(&self) -> Vec<Arc<dyn Stat>> {
        Vec::new()
    }

    /// Arbitrary extension attributes beyond the ones Homie 3.0.0 itself defines, as
    /// `(attribute, value)` pairs. The attribute name is published as-is under `$<attribute>`.
    fn extra_attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn nodes(&self) -> Vec<Arc<dyn Node>>;
}

/// A [node](https://homieiot.github.io/specification/#nodes) of a device.
pub trait Node: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn node_type(&self) -> &str;

    fn array(&self) -> NodeArray {
        NodeArray::Single
    }

    /// A per-index name override for an arrayed node's instance `index`, if the model supplies
    /// one. Published as `<node>_<index>/$name` before any property values, only when present.
    fn index_name(&self, _index: u32) -> Option<String> {
        None
    }

    fn properties(&self) -> Vec<Arc<dyn Property>>;
}

/// A [property](https://homieiot.github.io/specification/#properties) of a node.
pub trait Property: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn datatype(&self) -> Datatype;

    fn settable(&self) -> bool {
        false
    }

    fn unit(&self) -> Option<String> {
        None
    }

    fn format(&self) -> Option<String> {
        None
    }

    /// The current value, as the raw wire string. `index` is `Some` only for an arrayed node's
    /// property. The engine never interprets this string; it publishes exactly what is returned.
    fn value(&self, index: Option<u32>) -> String;

    /// Invoked when a `.../set` command is routed to this property. The engine does not validate
    /// `value` against `datatype`; that is the application's responsibility. The default
    /// implementation does nothing, appropriate for a read-only property.
    fn set_value(&self, _index: Option<u32>, _value: &str) {}
}

/// A [stat](https://homieiot.github.io/specification/#stats-node), published under
/// `$stats/<id>`.
pub trait Stat: Send + Sync {
    fn id(&self) -> &str;

    fn value(&self) -> String;
}

/// A `Stat` with a fixed ID and a value computed fresh on every publish, e.g. for uptime.
pub struct FnStat {
    id: String,
    compute: Box<dyn Fn() -> String + Send + Sync>,
}

impl FnStat {
    pub fn new(id: &str, compute: impl Fn() -> String + Send + Sync + 'static) -> Self {
        FnStat {
            id: id.to_owned(),
            compute: Box::new(compute),
        }
    }
}

impl Stat for FnStat {
    fn id(&self) -> &str {
        &self.id
    }

    fn value(&self) -> String {
        (self.compute)()
    }
}

/// A convenience [`Device`] implementation which stores its attributes in memory.
pub struct BasicDevice {
    id: String,
    name: String,
    state: Mutex<DeviceState>,
    local_ip: Option<String>,
    mac: Option<String>,
    firmware_name: String,
    firmware_version: String,
    implementation: String,
    stats_interval_ms: u64,
    stats: Vec<Arc<dyn Stat>>,
    extra_attributes: Vec<(String, String)>,
    nodes: Vec<Arc<dyn Node>>,
}

impl BasicDevice {
    pub fn new(id: &str, name: &str) -> Self {
        BasicDevice {
            id: id.to_owned(),
            name: name.to_owned(),
            state: Mutex::new(DeviceState::Init),
            local_ip: None,
            mac: None,
            firmware_name: "homie-device".to_owned(),
            firmware_version: env!("CARGO_PKG_VERSION").to_owned(),
            implementation: "homie-rs".to_owned(),
            stats_interval_ms: 60_000,
            stats: Vec::new(),
            extra_attributes: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn with_network(mut self, local_ip: impl Into<String>, mac: impl Into<String>) -> Self {
        self.local_ip = Some(local_ip.into());
        self.mac = Some(mac.into());
        self
    }

    pub fn with_firmware(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.firmware_name = name.into();
        self.firmware_version = version.into();
        self
    }

    pub fn with_implementation(mut self, implementation: impl Into<String>) -> Self {
        self.implementation = implementation.into();
        self
    }

    pub fn with_stats_interval_ms(mut self, interval_ms: u64) -> Self {
        self.stats_interval_ms = interval_ms;
        self
    }

    pub fn with_stat(mut self, stat: Arc<dyn Stat>) -> Self {
        self.stats.push(stat);
        self
    }

    pub fn with_extra_attribute(mut self, attr: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_attributes.push((attr.into(), value.into()));
        self
    }

    pub fn with_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Updates the device's lifecycle state. This does not by itself publish anything; the
    /// publisher reads it back via [`Device::state`] whenever it (re)announces the device.
    pub fn set_state(&self, state: DeviceState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Device for BasicDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap()
    }

    fn local_ip(&self) -> Option<String> {
        self.local_ip.clone()
    }

    fn mac(&self) -> Option<String> {
        self.mac.clone()
    }

    fn firmware_name(&self) -> &str {
        &self.firmware_name
    }

    fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    fn implementation(&self) -> &str {
        &self.implementation
    }

    fn stats_interval_ms(&self) -> u64 {
        self.stats_interval_ms
    }

    fn stats(&self) -> Vec<Arc<dyn Stat>> {
        self.stats.clone()
    }

    fn extra_attributes(&self) -> Vec<(String, String)> {
        self.extra_attributes.clone()
    }

    fn nodes(&self) -> Vec<Arc<dyn Node>> {
        self.nodes.clone()
    }
}

/// A convenience [`Node`] implementation which stores its attributes in memory.
pub struct BasicNode {
    id: String,
    name: String,
    node_type: String,
    array: NodeArray,
    index_names: HashMap<u32, String>,
    properties: Vec<Arc<dyn Property>>,
}

impl BasicNode {
    pub fn new(id: &str, name: &str, node_type: &str, properties: Vec<Arc<dyn Property>>) -> Self {
        BasicNode {
            id: id.to_owned(),
            name: name.to_owned(),
            node_type: node_type.to_owned(),
            array: NodeArray::Single,
            index_names: HashMap::new(),
            properties,
        }
    }

    pub fn arrayed(mut self, lo: u32, hi: u32) -> Self {
        assert!(lo <= hi, "arrayed node range must have lo <= hi");
        self.array = NodeArray::Range(lo, hi);
        self
    }

    pub fn with_index_name(mut self, index: u32, name: impl Into<String>) -> Self {
        self.index_names.insert(index, name.into());
        self
    }
}

impl Node for BasicNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn array(&self) -> NodeArray {
        self.array
    }

    fn index_name(&self, index: u32) -> Option<String> {
        self.index_names.get(&index).cloned()
    }

    fn properties(&self) -> Vec<Arc<dyn Property>> {
        self.properties.clone()
    }
}

/// A convenience [`Property`] implementation which stores its value(s) in memory.
///
/// Values are keyed by instance index (`None` for a non-arrayed property), so a single
/// `BasicProperty` can back either shape depending on how its owning node is declared.
pub struct BasicProperty {
    id: String,
    name: String,
    datatype: Datatype,
    settable: bool,
    unit: Option<String>,
    format: Option<String>,
    values: Mutex<HashMap<Option<u32>, String>>,
    on_set: Option<Box<dyn Fn(Option<u32>, &str) + Send + Sync>>,
}

impl BasicProperty {
    pub fn new(
        id: &str,
        name: &str,
        datatype: Datatype,
        settable: bool,
        unit: Option<&str>,
        format: Option<&str>,
    ) -> Self {
        BasicProperty {
            id: id.to_owned(),
            name: name.to_owned(),
            datatype,
            settable,
            unit: unit.map(|s| s.to_owned()),
            format: format.map(|s| s.to_owned()),
            values: Mutex::new(HashMap::new()),
            on_set: None,
        }
    }

    pub fn with_value(self, value: impl ToString) -> Self {
        self.values
            .lock()
            .unwrap()
            .insert(None, value.to_string());
        self
    }

    pub fn with_value_at(self, index: u32, value: impl ToString) -> Self {
        self.values
            .lock()
            .unwrap()
            .insert(Some(index), value.to_string());
        self
    }

    pub fn with_setter(
        mut self,
        on_set: impl Fn(Option<u32>, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_set = Some(Box::new(on_set));
        self
    }

    /// Updates the in-memory value for `index`. Does not publish anything by itself; call
    /// `HomieDevice::notify_property_changed` afterwards to announce the change.
    pub fn set_stored_value(&self, index: Option<u32>, value: impl ToString) {
        self.values.lock().unwrap().insert(index, value.to_string());
    }
}

impl Property for BasicProperty {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn datatype(&self) -> Datatype {
        self.datatype
    }

    fn settable(&self) -> bool {
        self.settable
    }

    fn unit(&self) -> Option<String> {
        self.unit.clone()
    }

    fn format(&self) -> Option<String> {
        self.format.clone()
    }

    fn value(&self, index: Option<u32>) -> String {
        self.values
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }

    fn set_value(&self, index: Option<u32>, value: &str) {
        self.set_stored_value(index, value);
        if let Some(on_set) = &self.on_set {
            on_set(index, value);
        }
    }
}
