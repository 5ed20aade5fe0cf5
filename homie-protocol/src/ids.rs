//! Validation of Homie [topic IDs](https://homieiot.github.io/specification/#topic-ids).

/// Returns whether `id` is a non-empty Homie topic ID: lowercase letters, digits and hyphens only.
///
/// This is the strict form required for `device_id`; node and property IDs are checked with the
/// looser [`is_valid_segment`] since the convention does not actually require every implementation
/// to restrict itself to `[a-z0-9-]+` for those, only that they round-trip through a topic segment
/// cleanly.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Returns whether `segment` is usable as a single MQTT topic segment: non-empty, no `/`, and not
/// starting with `$` (which is reserved for attribute topics).
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/') && !segment.starts_with('$')
}

/// Returns whether `id` is usable as a node ID: a valid segment which additionally contains no
/// `_`, since an underscore on the wire delimits the array instance index.
pub fn is_valid_node_id(id: &str) -> bool {
    is_valid_segment(id) && !id.contains('_')
}
