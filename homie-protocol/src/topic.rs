//! Parsing and formatting of Homie topics under a configurable base prefix.
//!
//! Canonical shapes, after the base prefix has been stripped (see §4.1 of the convention this
//! crate implements):
//!
//! - `$broadcast/<level>`
//! - `<device>/$<attr>` (`<attr>` may itself contain `/`, e.g. `$fw/name`, `$stats/uptime`)
//! - `<device>/<node>[_<idx>]/$<attr>`
//! - `<device>/<node>[_<idx>]/<prop>/$<attr>`
//! - `<device>/<node>[_<idx>]/<prop>`
//! - `<device>/<node>[_<idx>]/<prop>/set`

use std::fmt::Write;

/// A topic parsed from under a Homie base prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Topic {
    Broadcast {
        level: String,
    },
    DeviceAttribute {
        device_id: String,
        attr: String,
    },
    NodeAttribute {
        device_id: String,
        node_id: String,
        index: Option<u32>,
        attr: String,
    },
    PropertyAttribute {
        device_id: String,
        node_id: String,
        index: Option<u32>,
        property_id: String,
        attr: String,
    },
    PropertyValue {
        device_id: String,
        node_id: String,
        index: Option<u32>,
        property_id: String,
    },
    PropertySet {
        device_id: String,
        node_id: String,
        index: Option<u32>,
        property_id: String,
    },
}

/// Splits a node topic segment such as `temp_3` into its base ID and instance index.
///
/// Returns `None` if the segment doesn't match `<id>_<digits>`; the caller decides whether that
/// shape is actually meaningful, since the underscore is only an array delimiter if the node was
/// declared as arrayed in the first place.
pub fn split_array_suffix(segment: &str) -> Option<(&str, u32)> {
    let underscore = segment.rfind('_')?;
    let (base, suffix) = (&segment[..underscore], &segment[underscore + 1..]);
    if base.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = suffix.parse().ok()?;
    Some((base, index))
}

/// Parses `topic` as a Homie topic under `base` (which should end in `/`, e.g. `"homie/"`).
///
/// Parsing is defensive per the convention's own resilience stance on ingest: any shape that
/// doesn't match exactly one of the grammar productions above returns `None` rather than an
/// error, so that malformed or unrelated traffic on the same broker is silently ignored.
pub fn parse(base: &str, topic: &str) -> Option<Topic> {
    let rest = topic.strip_prefix(base)?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    if parts[0] == "$broadcast" {
        return match parts.as_slice() {
            ["$broadcast", level] => Some(Topic::Broadcast {
                level: (*level).to_owned(),
            }),
            _ => None,
        };
    }

    let device_id = parts[0].to_owned();
    if parts.len() < 2 {
        return None;
    }

    if let Some(attr) = parts[1].strip_prefix('$') {
        // Device attribute; the attribute name may itself contain further `/`-separated parts
        // (`$fw/name`, `$stats/uptime`).
        let mut full_attr = attr.to_owned();
        for part in &parts[2..] {
            full_attr.push('/');
            full_attr.push_str(part);
        }
        return Some(Topic::DeviceAttribute {
            device_id,
            attr: full_attr,
        });
    }

    if parts.len() < 3 {
        return None;
    }
    let (node_id, index) = match split_array_suffix(parts[1]) {
        Some((base, idx)) => (base.to_owned(), Some(idx)),
        None => (parts[1].to_owned(), None),
    };

    if let Some(attr) = parts[2].strip_prefix('$') {
        let mut full_attr = attr.to_owned();
        for part in &parts[3..] {
            full_attr.push('/');
            full_attr.push_str(part);
        }
        return Some(Topic::NodeAttribute {
            device_id,
            node_id,
            index,
            attr: full_attr,
        });
    }

    let property_id = parts[2].to_owned();
    match parts.len() {
        3 => Some(Topic::PropertyValue {
            device_id,
            node_id,
            index,
            property_id,
        }),
        4 if parts[3] == "set" => Some(Topic::PropertySet {
            device_id,
            node_id,
            index,
            property_id,
        }),
        4 => parts[3].strip_prefix('$').map(|attr| Topic::PropertyAttribute {
            device_id,
            node_id,
            index,
            property_id,
            attr: attr.to_owned(),
        }),
        _ => None,
    }
}

/// Formats a node's topic segment, appending `_<idx>` if an instance index is given.
pub fn node_segment(node_id: &str, index: Option<u32>) -> String {
    match index {
        Some(idx) => format!("{}_{}", node_id, idx),
        None => node_id.to_owned(),
    }
}

/// Formats the `$nodes` payload: comma-joined IDs, with arrayed nodes suffixed `[]`.
pub fn format_nodes_list<'a>(nodes: impl Iterator<Item = (&'a str, bool)>) -> String {
    let mut out = String::new();
    for (i, (id, arrayed)) in nodes.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(id);
        if arrayed {
            out.push_str("[]");
        }
    }
    out
}

/// Formats an `$array` payload from an inclusive range.
pub fn format_array_range(lo: u32, hi: u32) -> String {
    let mut out = String::new();
    write!(out, "{}-{}", lo, hi).unwrap();
    out
}

/// Parses an `$array` payload (`<lo>-<hi>`), requiring `lo <= hi`.
pub fn parse_array_range(s: &str) -> Option<(u32, u32)> {
    let (lo, hi) = s.split_once('-')?;
    let lo: u32 = lo.parse().ok()?;
    let hi: u32 = hi.parse().ok()?;
    if lo <= hi {
        Some((lo, hi))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "homie/";

    #[test]
    fn parses_broadcast() {
        assert_eq!(
            parse(BASE, "homie/$broadcast/alert"),
            Some(Topic::Broadcast {
                level: "alert".to_owned()
            })
        );
    }

    #[test]
    fn parses_device_attribute() {
        assert_eq!(
            parse(BASE, "homie/testdevice/$state"),
            Some(Topic::DeviceAttribute {
                device_id: "testdevice".to_owned(),
                attr: "state".to_owned(),
            })
        );
    }

    #[test]
    fn parses_nested_device_attribute() {
        assert_eq!(
            parse(BASE, "homie/testdevice/$fw/name"),
            Some(Topic::DeviceAttribute {
                device_id: "testdevice".to_owned(),
                attr: "fw/name".to_owned(),
            })
        );
        assert_eq!(
            parse(BASE, "homie/testdevice/$stats/interval"),
            Some(Topic::DeviceAttribute {
                device_id: "testdevice".to_owned(),
                attr: "stats/interval".to_owned(),
            })
        );
    }

    #[test]
    fn parses_node_attribute() {
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode/$name"),
            Some(Topic::NodeAttribute {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: None,
                attr: "name".to_owned(),
            })
        );
    }

    #[test]
    fn parses_indexed_node_attribute() {
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode_3/$name"),
            Some(Topic::NodeAttribute {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: Some(3),
                attr: "name".to_owned(),
            })
        );
    }

    #[test]
    fn parses_property_value() {
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode/intensity"),
            Some(Topic::PropertyValue {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: None,
                property_id: "intensity".to_owned(),
            })
        );
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode_2/intensity"),
            Some(Topic::PropertyValue {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: Some(2),
                property_id: "intensity".to_owned(),
            })
        );
    }

    #[test]
    fn parses_property_set() {
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode/intensity/set"),
            Some(Topic::PropertySet {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: None,
                property_id: "intensity".to_owned(),
            })
        );
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode_1/intensity/set"),
            Some(Topic::PropertySet {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: Some(1),
                property_id: "intensity".to_owned(),
            })
        );
    }

    #[test]
    fn parses_property_attribute() {
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode/intensity/$settable"),
            Some(Topic::PropertyAttribute {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: None,
                property_id: "intensity".to_owned(),
                attr: "settable".to_owned(),
            })
        );
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode_2/intensity/$datatype"),
            Some(Topic::PropertyAttribute {
                device_id: "testdevice".to_owned(),
                node_id: "testnode".to_owned(),
                index: Some(2),
                property_id: "intensity".to_owned(),
                attr: "datatype".to_owned(),
            })
        );
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert_eq!(parse(BASE, "other/testdevice/$state"), None);
    }

    #[test]
    fn rejects_empty_segments() {
        assert_eq!(parse(BASE, "homie//testnode/intensity"), None);
        assert_eq!(parse(BASE, "homie/testdevice//intensity"), None);
    }

    #[test]
    fn rejects_unexpected_arity() {
        assert_eq!(parse(BASE, "homie/testdevice"), None);
        assert_eq!(
            parse(BASE, "homie/testdevice/testnode/intensity/set/extra"),
            None
        );
        assert_eq!(parse(BASE, "homie/testdevice/testnode/intensity/other"), None);
    }

    #[test]
    fn array_suffix_requires_digits() {
        assert_eq!(split_array_suffix("temp_3"), Some(("temp", 3)));
        assert_eq!(split_array_suffix("temp_abc"), None);
        assert_eq!(split_array_suffix("temp"), None);
        assert_eq!(split_array_suffix("temp_"), None);
        assert_eq!(split_array_suffix("_3"), None);
    }

    #[test]
    fn formats_nodes_list() {
        assert_eq!(
            format_nodes_list(vec![("lamp", false), ("temp", true)].into_iter()),
            "lamp,temp[]"
        );
        assert_eq!(format_nodes_list(std::iter::empty()), "");
    }

    #[test]
    fn array_range_round_trips() {
        assert_eq!(format_array_range(1, 3), "1-3");
        assert_eq!(parse_array_range("1-3"), Some((1, 3)));
        assert_eq!(parse_array_range("3-1"), None);
        assert_eq!(parse_array_range("abc"), None);
    }
}
