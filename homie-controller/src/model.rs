//! The discovered-device tree the controller builds up from retained MQTT traffic.

use crate::values::{ColorFormat, EnumValue, Value, ValueError};
use homie_protocol::{Datatype, DeviceState};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::time::Duration;

/// A [property](https://homieiot.github.io/specification/#properties) of a discovered node.
///
/// `name` and `datatype` are required by the convention but may not yet be known while discovery
/// is still underway; see [`Property::has_required_attributes`].
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    /// The subtopic ID of the property. Unique per node.
    pub id: String,

    pub name: Option<String>,

    pub datatype: Option<Datatype>,

    /// Whether the property can be set by the controller. `false` unless observed otherwise.
    pub settable: bool,

    pub unit: Option<String>,

    /// The format of the property. Required for `enum` and `color` datatypes.
    pub format: Option<String>,

    /// The property's current value(s), keyed by array instance index (`None` for a
    /// non-arrayed node).
    values: HashMap<Option<u32>, String>,
}

impl Property {
    pub(crate) fn new(id: &str) -> Self {
        Property {
            id: id.to_owned(),
            name: None,
            datatype: None,
            settable: false,
            unit: None,
            format: None,
            values: HashMap::new(),
        }
    }

    pub(crate) fn set_value(&mut self, index: Option<u32>, value: &str) {
        self.values.insert(index, value.to_owned());
    }

    /// The raw wire value at `index`, if known.
    pub fn raw_value(&self, index: Option<u32>) -> Option<&str> {
        self.values.get(&index).map(String::as_str)
    }

    /// Returns whether the required attributes of the property (`name`, `datatype`) are known.
    pub fn has_required_attributes(&self) -> bool {
        self.name.is_some() && self.datatype.is_some()
    }

    /// Parses the value at `index` as `T`, failing if the value is unknown or doesn't match the
    /// property's observed datatype/format.
    pub fn value<T: Value>(&self, index: Option<u32>) -> Result<T, ValueError> {
        T::valid_for(self.datatype, &self.format)?;
        match self.raw_value(index) {
            None => Err(ValueError::Unknown),
            Some(value) => value.parse().map_err(|_| ValueError::ParseFailed {
                value: value.to_owned(),
                datatype: T::datatype(),
            }),
        }
    }

    /// If the datatype is `color`, the colour format (`rgb` or `hsv`).
    pub fn color_format(&self) -> Result<ColorFormat, ValueError> {
        if let Some(actual) = self.datatype {
            if actual != Datatype::Color {
                return Err(ValueError::WrongDatatype {
                    expected: Datatype::Color,
                    actual,
                });
            }
        }
        match &self.format {
            None => Err(ValueError::Unknown),
            Some(format) => format.parse(),
        }
    }

    /// If the datatype is `enum`, the possible values as declared in `$format`.
    pub fn enum_values(&self) -> Result<Vec<&str>, ValueError> {
        EnumValue::valid_for(self.datatype, &self.format)?;
        match &self.format {
            None => Err(ValueError::Unknown),
            Some(format) => {
                if format.is_empty() {
                    Err(ValueError::WrongFormat {
                        format: String::new(),
                    })
                } else {
                    Ok(format.split(',').collect())
                }
            }
        }
    }

    /// The numeric range declared in `$format`, for `integer`/`float` properties.
    pub fn range<T: Value + Copy>(&self) -> Result<RangeInclusive<T>, ValueError> {
        T::valid_for(self.datatype, &self.format)?;
        match &self.format {
            None => Err(ValueError::Unknown),
            Some(format) => {
                if let [Ok(start), Ok(end)] = format
                    .splitn(2, ':')
                    .map(|part| part.parse())
                    .collect::<Vec<_>>()
                    .as_slice()
                {
                    Ok(RangeInclusive::new(*start, *end))
                } else {
                    Err(ValueError::WrongFormat {
                        format: format.clone(),
                    })
                }
            }
        }
    }
}

/// A [node](https://homieiot.github.io/specification/#nodes) of a discovered device.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// The subtopic ID of the node. Unique per device.
    pub id: String,

    pub name: Option<String>,

    pub node_type: Option<String>,

    /// The array range, once `$array` has been observed. `$nodes` tells us a node is declared
    /// arrayed before `$array` itself arrives; [`Node::declared_arrayed`] tracks that signal so
    /// completeness can require `$array` only for nodes that actually need it.
    pub array: Option<(u32, u32)>,

    declared_arrayed: bool,

    /// Per-index `$name` overrides for an arrayed node's instances.
    pub index_names: HashMap<u32, String>,

    /// The node's properties, keyed by ID.
    pub properties: HashMap<String, Property>,
}

impl Node {
    pub(crate) fn new(id: &str, declared_arrayed: bool) -> Self {
        Node {
            id: id.to_owned(),
            name: None,
            node_type: None,
            array: None,
            declared_arrayed,
            index_names: HashMap::new(),
            properties: HashMap::new(),
        }
    }

    pub(crate) fn property_mut(&mut self, id: &str) -> &mut Property {
        self.properties
            .entry(id.to_owned())
            .or_insert_with(|| Property::new(id))
    }

    /// Returns whether the node is currently known to be arrayed, either because `$array` has
    /// already been parsed or because `$nodes` declared it with a `[]` suffix.
    pub fn is_arrayed(&self) -> bool {
        self.array.is_some() || self.declared_arrayed
    }

    /// Returns whether the required attributes of the node and all its properties are known.
    pub fn has_required_attributes(&self) -> bool {
        self.name.is_some()
            && self.node_type.is_some()
            && !self.properties.is_empty()
            && self
                .properties
                .values()
                .all(Property::has_required_attributes)
            && (!self.declared_arrayed || self.array.is_some())
    }
}

/// A Homie [device](https://homieiot.github.io/specification/#devices) which has been observed on
/// the bus, whether or not it has yet reached the `discovered` state (see
/// [`crate::HomieController`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    /// The subtopic ID of the device. Unique per base topic.
    pub id: String,

    /// The version of the Homie convention the device implements, once `$homie` is observed.
    pub homie_version: Option<String>,

    pub name: Option<String>,

    /// The device's lifecycle state. `Unknown` until `$state` is first observed.
    pub state: DeviceState,

    pub implementation: Option<String>,

    pub local_ip: Option<String>,

    pub mac: Option<String>,

    pub firmware_name: Option<String>,

    pub firmware_version: Option<String>,

    /// The device's advertised stats refresh interval.
    pub stats_interval: Option<Duration>,

    /// Stat values, keyed by stat ID, as raw wire strings (`$stats/<id>`).
    pub stats: HashMap<String, String>,

    /// The node IDs last declared by `$nodes`, in the order they were listed. Used to detect when
    /// `$nodes` itself changes the device's topology.
    pub(crate) nodes_list: Option<Vec<String>>,

    /// The device's nodes, keyed by ID.
    pub nodes: HashMap<String, Node>,

    /// Attributes observed under this device's topic tree that the convention does not define.
    pub extra_attributes: HashMap<String, String>,
}

impl Device {
    pub(crate) fn new(id: &str) -> Self {
        Device {
            id: id.to_owned(),
            homie_version: None,
            name: None,
            state: DeviceState::Unknown,
            implementation: None,
            local_ip: None,
            mac: None,
            firmware_name: None,
            firmware_version: None,
            stats_interval: None,
            stats: HashMap::new(),
            nodes_list: None,
            nodes: HashMap::new(),
            extra_attributes: HashMap::new(),
        }
    }

    pub(crate) fn node_mut(&mut self, id: &str, declared_arrayed: bool) -> &mut Node {
        let node = self
            .nodes
            .entry(id.to_owned())
            .or_insert_with(|| Node::new(id, declared_arrayed));
        // A node may be touched by another subtopic before `$nodes` is processed, in arbitrary
        // order during a retained storm; once arrayed, always arrayed.
        if declared_arrayed {
            node.declared_arrayed = true;
        }
        node
    }

    /// Returns whether every attribute §3 requires for completeness has been observed: `$homie`,
    /// `$name`, `$state`, `$nodes`, and the same recursively for every node and property.
    pub fn has_required_attributes(&self) -> bool {
        self.homie_version.is_some()
            && self.name.is_some()
            && self.state != DeviceState::Unknown
            && self.nodes_list.is_some()
            && self.nodes.values().all(Node::has_required_attributes)
    }
}
