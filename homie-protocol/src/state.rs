use std::fmt::{self, Display, Formatter};

/// The state of a Homie device according to the Homie
/// [device lifecycle](https://homieiot.github.io/specification/#device-lifecycle).
///
/// As with [`crate::Datatype`], parsing never fails: an ecosystem extension state falls back to
/// `Unknown` rather than raising an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeviceState {
    Init,
    Ready,
    Disconnected,
    Sleeping,
    Lost,
    Alert,
    /// A `$state` string which doesn't match any of the above.
    Unknown,
}

impl DeviceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Sleeping => "sleeping",
            Self::Lost => "lost",
            Self::Alert => "alert",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a `$state` wire string, falling back to `Unknown` rather than failing.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "init" => Self::Init,
            "ready" => Self::Ready,
            "disconnected" => Self::Disconnected,
            "sleeping" => Self::Sleeping,
            "lost" => Self::Lost,
            "alert" => Self::Alert,
            _ => Self::Unknown,
        }
    }
}

impl Display for DeviceState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Into<Vec<u8>> for DeviceState {
    fn into(self) -> Vec<u8> {
        self.as_str().into()
    }
}
