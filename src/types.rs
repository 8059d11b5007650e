use derive_more::Display;
use serde::Deserialize;
use std::convert::TryFrom;
use std::str::FromStr;

/// Byte order of a scalar field type.
///
/// `Native` means "not decided yet": it is replaced by the trace's native
/// byte order when the type is canonicalized.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize)]
#[serde(try_from = "String")]
pub enum ByteOrder {
    #[default]
    #[display(fmt = "native")]
    Native,
    #[display(fmt = "le")]
    LittleEndian,
    #[display(fmt = "be")]
    BigEndian,
    #[display(fmt = "network")]
    Network,
}

impl ByteOrder {
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, ByteOrder::Native)
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(ByteOrder::Native),
            "le" | "little" | "little-endian" => Ok(ByteOrder::LittleEndian),
            "be" | "big" | "big-endian" => Ok(ByteOrder::BigEndian),
            "network" => Ok(ByteOrder::Network),
            _ => Err(format!("Unrecognized byte order '{s}'")),
        }
    }
}

impl TryFrom<String> for ByteOrder {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ByteOrder::from_str(&s)
    }
}

/// Text encoding of string fields and of integers used as characters.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize)]
#[serde(try_from = "String")]
pub enum StringEncoding {
    #[display(fmt = "none")]
    None,
    #[default]
    #[display(fmt = "UTF8")]
    Utf8,
    #[display(fmt = "ASCII")]
    Ascii,
}

impl FromStr for StringEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(StringEncoding::None),
            "utf8" | "utf-8" => Ok(StringEncoding::Utf8),
            "ascii" => Ok(StringEncoding::Ascii),
            _ => Err(format!("Unrecognized string encoding '{s}'")),
        }
    }
}

impl TryFrom<String> for StringEncoding {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StringEncoding::from_str(&s)
    }
}

/// Preferred display base of an integer type, only used by metadata emission.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize)]
#[serde(try_from = "String")]
pub enum DisplayBase {
    #[display(fmt = "binary")]
    Binary,
    #[display(fmt = "octal")]
    Octal,
    #[default]
    #[display(fmt = "decimal")]
    Decimal,
    #[display(fmt = "hexadecimal")]
    Hexadecimal,
}

impl FromStr for DisplayBase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "2" | "b" | "bin" | "binary" => Ok(DisplayBase::Binary),
            "8" | "o" | "oct" | "octal" => Ok(DisplayBase::Octal),
            "10" | "d" | "dec" | "decimal" => Ok(DisplayBase::Decimal),
            "16" | "x" | "hex" | "hexadecimal" => Ok(DisplayBase::Hexadecimal),
            _ => Err(format!("Unrecognized display base '{s}'")),
        }
    }
}

impl TryFrom<String> for DisplayBase {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        DisplayBase::from_str(&s)
    }
}
