//! Typed access to a discovered property's value, mirroring the `$datatype`/`$format` pair a
//! device publishes for it.

use homie_protocol::Datatype;
use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// An error parsing or validating a property [`Value`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ValueError {
    #[error("value not yet known")]
    Unknown,
    #[error("expected value of type {expected} but was {actual}")]
    WrongDatatype { expected: Datatype, actual: Datatype },
    #[error("invalid or unexpected format {format:?}")]
    WrongFormat { format: String },
    #[error("parsing {value:?} as datatype {datatype} failed")]
    ParseFailed { value: String, datatype: Datatype },
}

/// A type a Homie property value can be parsed into.
pub trait Value: ToString + FromStr {
    fn datatype() -> Datatype;

    /// Checks whether this value type may be read from a property with the given observed
    /// `datatype`/`format`. The default only checks `datatype`, since most types don't constrain
    /// `format` further; [`Color`] overrides this to also check the `rgb`/`hsv` tag.
    fn valid_for(datatype: Option<Datatype>, _format: &Option<String>) -> Result<(), ValueError> {
        if let Some(actual) = datatype {
            if actual != Self::datatype() {
                return Err(ValueError::WrongDatatype {
                    expected: Self::datatype(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl Value for i64 {
    fn datatype() -> Datatype {
        Datatype::Integer
    }
}

impl Value for f64 {
    fn datatype() -> Datatype {
        Datatype::Float
    }
}

impl Value for bool {
    fn datatype() -> Datatype {
        Datatype::Boolean
    }
}

impl Value for String {
    fn datatype() -> Datatype {
        Datatype::String
    }
}

/// The format of a [colour](https://homieiot.github.io/specification/#color) property, either RGB
/// or HSV.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColorFormat {
    RGB,
    HSV,
}

impl ColorFormat {
    fn as_str(&self) -> &'static str {
        match self {
            Self::RGB => "rgb",
            Self::HSV => "hsv",
        }
    }
}

impl FromStr for ColorFormat {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb" => Ok(Self::RGB),
            "hsv" => Ok(Self::HSV),
            _ => Err(ValueError::WrongFormat {
                format: s.to_owned(),
            }),
        }
    }
}

impl Display for ColorFormat {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Color: Value {
    fn format() -> ColorFormat;
}

impl<T: Color> Value for T {
    fn datatype() -> Datatype {
        Datatype::Color
    }

    fn valid_for(datatype: Option<Datatype>, format: &Option<String>) -> Result<(), ValueError> {
        if let Some(actual) = datatype {
            if actual != Datatype::Color {
                return Err(ValueError::WrongDatatype {
                    expected: Datatype::Color,
                    actual,
                });
            }
        }
        if let Some(format) = format {
            if format.as_str() != Self::format().as_str() {
                return Err(ValueError::WrongFormat {
                    format: format.clone(),
                });
            }
        }
        Ok(())
    }
}

/// An error parsing a [`Color`] from a string.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to parse color")]
pub struct ParseColorError();

impl From<ParseIntError> for ParseColorError {
    fn from(_: ParseIntError) -> Self {
        ParseColorError()
    }
}

/// A [colour](https://homieiot.github.io/specification/#color) in red-green-blue format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColorRGB {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorRGB {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        ColorRGB { r, g, b }
    }
}

impl Display for ColorRGB {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for ColorRGB {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(',').collect();
        if let [r, g, b] = parts.as_slice() {
            Ok(ColorRGB {
                r: r.parse()?,
                g: g.parse()?,
                b: b.parse()?,
            })
        } else {
            Err(ParseColorError())
        }
    }
}

impl Color for ColorRGB {
    fn format() -> ColorFormat {
        ColorFormat::RGB
    }
}

/// A [colour](https://homieiot.github.io/specification/#color) in hue-saturation-value format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColorHSV {
    pub h: u16,
    pub s: u8,
    pub v: u8,
}

impl ColorHSV {
    /// Constructs a new HSV colour. Panics if any component is out of range.
    pub fn new(h: u16, s: u8, v: u8) -> Self {
        assert!(h <= 360);
        assert!(s <= 100);
        assert!(v <= 100);
        ColorHSV { h, s, v }
    }
}

impl Display for ColorHSV {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{},{},{}", self.h, self.s, self.v)
    }
}

impl FromStr for ColorHSV {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(',').collect();
        if let [h, s, v] = parts.as_slice() {
            Ok(ColorHSV {
                h: h.parse()?,
                s: s.parse()?,
                v: v.parse()?,
            })
        } else {
            Err(ParseColorError())
        }
    }
}

impl Color for ColorHSV {
    fn format() -> ColorFormat {
        ColorFormat::HSV
    }
}

/// The value of an [enum](https://homieiot.github.io/specification/#enum) property: an opaque
/// wire string, valid membership of which is checked separately against the property's `$format`
/// via [`crate::model::Property::enum_values`].
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EnumValue(String);

impl EnumValue {
    pub fn new(value: impl Into<String>) -> Self {
        EnumValue(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EnumValue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EnumValue {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(ValueError::ParseFailed {
                value: s.to_owned(),
                datatype: Datatype::Enum,
            })
        } else {
            Ok(EnumValue(s.to_owned()))
        }
    }
}

impl Value for EnumValue {
    fn datatype() -> Datatype {
        Datatype::Enum
    }
}
