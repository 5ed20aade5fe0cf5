use std::fmt::{self, Display, Formatter};

/// The data type of a Homie [property](https://homieiot.github.io/specification/#properties).
///
/// Unlike most wire enums, parsing a `Datatype` never fails: a string the convention doesn't
/// define falls back to `Unknown` rather than raising an error, since a controller may be talking
/// to a device which implements an ecosystem extension it doesn't know about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Datatype {
    Integer,
    Float,
    Boolean,
    String,
    Enum,
    Color,
    /// A `$datatype` string which doesn't match any of the above.
    Unknown,
}

impl Datatype {
    /// The wire representation of this datatype, or `"unknown"` if it has none.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Enum => "enum",
            Self::Color => "color",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a `$datatype` wire string, falling back to `Unknown` rather than failing.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "enum" => Self::Enum,
            "color" => Self::Color,
            _ => Self::Unknown,
        }
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Into<Vec<u8>> for Datatype {
    fn into(self) -> Vec<u8> {
        self.as_str().into()
    }
}
