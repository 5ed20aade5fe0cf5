//! `homie-protocol` holds the parts of the [Homie convention](https://homieiot.github.io/) that
//! are identical on both sides of the wire: the topic grammar, the `$state`/`$datatype` enum
//! codecs, topic ID validation, and the abstract MQTT session port that both
//! [`homie-device`](https://docs.rs/homie-device) and
//! [`homie-controller`](https://docs.rs/homie-controller) consume.
//!
//! Neither role re-derives this grammar independently; both depend on this crate so that anything
//! a device publishes is guaranteed to parse back into an equivalent tree on the controller side.

pub mod datatype;
pub mod ids;
pub mod session;
pub mod state;
pub mod topic;

pub use datatype::Datatype;
pub use ids::{is_valid_id, is_valid_node_id, is_valid_segment};
pub use session::{MqttEventHandler, MqttSession, Qos, SessionError};
pub use state::DeviceState;
pub use topic::Topic;

/// The version of the Homie convention this crate implements.
pub const HOMIE_VERSION: &str = "3.0.0";

/// The default base topic prefix, as used when none is given explicitly.
pub const DEFAULT_BASE_TOPIC: &str = "homie/";
