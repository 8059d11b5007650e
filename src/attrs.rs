use crate::error::Error;
use derive_more::{Display, From};
use serde::Deserialize;
use std::str::FromStr;

/// Scalar stored in an attribute store: event class metadata and trace environment.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, From, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    #[display(fmt = "{_0}")]
    Integer(i64),
    #[display(fmt = "\"{_0}\"")]
    String(String),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_owned())
    }
}

impl AttrValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttrValue::Integer(v) => Some(*v),
            AttrValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Integer(_) => None,
            AttrValue::String(s) => Some(s),
        }
    }
}

/// Ordered name -> scalar map. Insertion order is kept, it is the order
/// in which metadata emission renders the entries.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
    frozen: bool,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, a replaced entry keeps its position.
    pub fn set(&mut self, name: &str, value: AttrValue) -> Result<(), Error> {
        if self.frozen {
            return Err(Error::AlreadyFrozen("attribute store"));
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_owned(), value)),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(n, _)| n.as_str())
    }

    pub fn value_at(&self, index: usize) -> Option<&AttrValue> {
        self.entries.get(index).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Attribute keys an event class recognizes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum EventClassAttrKey {
    #[display(fmt = "id")]
    Id,
    #[display(fmt = "name")]
    Name,
    #[display(fmt = "loglevel")]
    LogLevel,
    #[display(fmt = "model.emf.uri")]
    ModelEmfUri,
    /// Set by the stream class on attachment, never by callers
    #[display(fmt = "stream_id")]
    StreamId,
}

impl EventClassAttrKey {
    pub fn expects_integer(&self) -> bool {
        matches!(
            self,
            EventClassAttrKey::Id | EventClassAttrKey::LogLevel | EventClassAttrKey::StreamId
        )
    }
}

impl FromStr for EventClassAttrKey {
    type Err = Error;

    /// Only the caller-settable keys parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(EventClassAttrKey::Id),
            "name" => Ok(EventClassAttrKey::Name),
            "loglevel" => Ok(EventClassAttrKey::LogLevel),
            "model.emf.uri" => Ok(EventClassAttrKey::ModelEmfUri),
            _ => Err(Error::invalid_argument(format!(
                "'{s}' is not a recognized event class attribute"
            ))),
        }
    }
}

/// Keys of the flattened view of an event, see [`crate::event::Event::attr_kvs`].
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum EventAttrKey {
    #[display(fmt = "event.name")]
    Name,
    #[display(fmt = "event.timestamp")]
    Timestamp,

    #[display(fmt = "event.internal.ctf.stream_id")]
    StreamId,
    #[display(fmt = "event.internal.ctf.id")]
    Id,
    #[display(fmt = "event.internal.ctf.log_level")]
    LogLevel,

    #[display(fmt = "event.internal.ctf.header.{_0}")]
    Header(String),
    #[display(fmt = "event.internal.ctf.specific_context.{_0}")]
    SpecificContext(String),

    #[display(fmt = "event.{_0}")]
    Field(String),
}

/// Scalar value in the flattened view of an event.
#[derive(Clone, PartialEq, Debug, Display, From)]
pub enum AttrVal {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
}

impl From<&str> for AttrVal {
    fn from(s: &str) -> Self {
        AttrVal::String(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn store_keeps_insertion_order() {
        let mut a = Attributes::new();
        a.set("id", (-1_i64).into()).unwrap();
        a.set("name", "E".into()).unwrap();
        a.set("id", 4_i64.into()).unwrap();
        assert_eq!(a.count(), 2);
        assert_eq!(a.name_at(0), Some("id"));
        assert_eq!(a.value_at(0), Some(&AttrValue::Integer(4)));
        assert_eq!(a.get("name").and_then(AttrValue::as_str), Some("E"));
        assert_eq!(a.name_at(2), None);
    }

    #[test]
    fn frozen_store_rejects_writes() {
        let mut a = Attributes::new();
        a.freeze();
        assert_eq!(
            a.set("id", 0_i64.into()),
            Err(Error::AlreadyFrozen("attribute store"))
        );
    }

    #[test]
    fn event_class_keys() {
        assert_eq!(
            EventClassAttrKey::from_str("model.emf.uri"),
            Ok(EventClassAttrKey::ModelEmfUri)
        );
        assert!(EventClassAttrKey::from_str("stream_id").is_err());
        assert!(EventClassAttrKey::from_str("color").is_err());
        assert!(EventClassAttrKey::LogLevel.expects_integer());
        assert_eq!(EventClassAttrKey::ModelEmfUri.to_string(), "model.emf.uri");
    }

    #[test]
    fn event_attr_key_display() {
        assert_eq!(
            EventAttrKey::Header("id".to_owned()).to_string(),
            "event.internal.ctf.header.id"
        );
        assert_eq!(EventAttrKey::Field("x.y".to_owned()).to_string(), "event.x.y");
    }
}
