use crate::attrs::{AttrValue, Attributes, EventClassAttrKey};
use crate::error::Error;
use crate::field_type::FieldType;
use crate::ident::validate_identifier;
use crate::stream_class::StreamClassKey;
use crate::types::ByteOrder;
use crate::validation::EventTypes;
use std::str::FromStr;
use tracing::debug;

/// Value of the `id` attribute while no id has been assigned
pub const UNSET_ID: i64 = -1;

/// Declares the context and payload layout plus the metadata of one kind of event.
///
/// An event class is configured while unattached, then handed over to
/// [`crate::stream_class::StreamClass::add_event_class`], which freezes it and
/// returns the shared, read-only instance events are created from.
#[derive(Clone, Debug)]
pub struct EventClass {
    payload_type: FieldType,
    context_type: Option<FieldType>,
    attributes: Attributes,
    stream_class: Option<StreamClassKey>,
    frozen: bool,
}

impl EventClass {
    pub fn create(name: &str) -> Result<Self, Error> {
        validate_identifier(name)?;
        let mut attributes = Attributes::new();
        attributes.set(&EventClassAttrKey::Id.to_string(), UNSET_ID.into())?;
        attributes.set(&EventClassAttrKey::Name.to_string(), name.into())?;
        Ok(Self {
            payload_type: FieldType::structure(),
            context_type: None,
            attributes,
            stream_class: None,
            frozen: false,
        })
    }

    pub fn name(&self) -> &str {
        self.attributes
            .get(&EventClassAttrKey::Name.to_string())
            .and_then(AttrValue::as_str)
            .unwrap_or_default()
    }

    /// `None` while the id is unset
    pub fn id(&self) -> Option<u64> {
        self.integer_attribute(EventClassAttrKey::Id)
            .and_then(|id| u64::try_from(id).ok())
    }

    pub fn stream_id(&self) -> Option<u64> {
        self.integer_attribute(EventClassAttrKey::StreamId)
            .and_then(|id| u64::try_from(id).ok())
    }

    pub fn loglevel(&self) -> Option<i64> {
        self.integer_attribute(EventClassAttrKey::LogLevel)
    }

    pub fn emf_uri(&self) -> Option<&str> {
        self.attributes
            .get(&EventClassAttrKey::ModelEmfUri.to_string())
            .and_then(AttrValue::as_str)
    }

    fn integer_attribute(&self, key: EventClassAttrKey) -> Option<i64> {
        self.attributes
            .get(&key.to_string())
            .and_then(AttrValue::as_integer)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_attached(&self) -> bool {
        self.stream_class.is_some()
    }

    /// Weak back-reference to the owning stream class
    pub fn stream_class(&self) -> Option<StreamClassKey> {
        self.stream_class
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::AlreadyFrozen("event class"))
        } else {
            Ok(())
        }
    }

    /// Set one of `id`, `name`, `loglevel` or `model.emf.uri`.
    ///
    /// `id` accepts `-1` to mark the id as unset again.
    pub fn set_attribute(&mut self, name: &str, value: AttrValue) -> Result<(), Error> {
        self.check_mutable()?;
        let key = EventClassAttrKey::from_str(name)?;
        if key.expects_integer() != value.as_integer().is_some() {
            return Err(Error::invalid_argument(format!(
                "Attribute '{key}' expects {} value, got {value}",
                if key.expects_integer() {
                    "an integer"
                } else {
                    "a string"
                }
            )));
        }
        match (key, &value) {
            (EventClassAttrKey::Id, AttrValue::Integer(id)) if *id < UNSET_ID => {
                return Err(Error::out_of_range(id, "Event class id must be positive"))
            }
            (EventClassAttrKey::Name, AttrValue::String(n)) => validate_identifier(n)?,
            _ => (),
        }
        self.attributes.set(&key.to_string(), value)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.count()
    }

    pub fn attribute_name(&self, index: usize) -> Option<&str> {
        self.attributes.name_at(index)
    }

    pub fn attribute_value(&self, index: usize) -> Option<&AttrValue> {
        self.attributes.value_at(index)
    }

    /// Ids are immutable once the class is attached to a stream class.
    pub fn set_id(&mut self, id: i64) -> Result<(), Error> {
        if self.is_attached() {
            return Err(Error::AlreadyAttached {
                event_class: self.name().to_owned(),
            });
        }
        if id < 0 {
            return Err(Error::out_of_range(id, "Event class id must be positive"));
        }
        self.set_attribute(&EventClassAttrKey::Id.to_string(), id.into())
    }

    pub fn set_loglevel(&mut self, loglevel: i64) -> Result<(), Error> {
        self.set_attribute(&EventClassAttrKey::LogLevel.to_string(), loglevel.into())
    }

    pub fn set_emf_uri(&mut self, uri: &str) -> Result<(), Error> {
        self.set_attribute(&EventClassAttrKey::ModelEmfUri.to_string(), uri.into())
    }

    pub fn payload_type(&self) -> &FieldType {
        &self.payload_type
    }

    pub fn context_type(&self) -> Option<&FieldType> {
        self.context_type.as_ref()
    }

    pub fn set_payload_type(&mut self, ty: &FieldType) -> Result<(), Error> {
        self.check_mutable()?;
        require_structure(ty, "payload")?;
        self.payload_type = ty.clone();
        Ok(())
    }

    pub fn set_context_type(&mut self, ty: &FieldType) -> Result<(), Error> {
        self.check_mutable()?;
        require_structure(ty, "context")?;
        self.context_type = Some(ty.clone());
        Ok(())
    }

    /// Append a member to the payload structure.
    pub fn add_field(&mut self, ty: &FieldType, name: &str) -> Result<(), Error> {
        self.check_mutable()?;
        self.payload_type.structure_add_field(ty, name)
    }

    pub fn field_count(&self) -> usize {
        self.payload_type
            .as_structure()
            .map(|s| s.len())
            .unwrap_or_default()
    }

    pub fn field_type_by_name(&self, name: &str) -> Option<&FieldType> {
        self.payload_type
            .as_structure()
            .and_then(|s| s.field_type_by_name(name))
    }

    /// Replace every `Native` byte order in the payload and context types.
    pub fn set_native_byte_order(&mut self, byte_order: ByteOrder) -> Result<(), Error> {
        self.check_mutable()?;
        self.payload_type.set_native_byte_order(byte_order)?;
        if let Some(ctx) = self.context_type.as_mut() {
            ctx.set_native_byte_order(byte_order)?;
        }
        Ok(())
    }

    pub(crate) fn types(&self) -> EventTypes {
        EventTypes {
            context: self.context_type.clone(),
            payload: self.payload_type.clone(),
        }
    }

    /// Record the owning stream class. Only done once, by the stream class.
    pub(crate) fn attach(&mut self, key: StreamClassKey, stream_id: Option<u64>) -> Result<(), Error> {
        if let Some(id) = stream_id {
            let id = i64::try_from(id)
                .map_err(|_| Error::out_of_range(id, "Stream class id does not fit an attribute"))?;
            self.attributes
                .set(&EventClassAttrKey::StreamId.to_string(), id.into())?;
        }
        self.stream_class = Some(key);
        self.freeze();
        Ok(())
    }

    pub(crate) fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        debug!(event_class = self.name(), "Freezing event class");
        self.payload_type.freeze();
        if let Some(ctx) = self.context_type.as_ref() {
            ctx.freeze();
        }
        self.attributes.freeze();
        self.frozen = true;
    }
}

fn require_structure(ty: &FieldType, role: &str) -> Result<(), Error> {
    if ty.is_structure() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "Event class {role} type must be a structure, not a {}",
            ty.id()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_seeds_attributes() {
        let ec = EventClass::create("sched_switch").unwrap();
        assert_eq!(ec.name(), "sched_switch");
        assert_eq!(ec.id(), None);
        assert_eq!(ec.attribute("id"), Some(&AttrValue::Integer(-1)));
        assert_eq!(ec.attribute_count(), 2);
        assert_eq!(ec.attribute_name(1), Some("name"));
        assert!(ec.payload_type().is_structure());
        assert_eq!(ec.field_count(), 0);
        assert!(ec.context_type().is_none());
        assert!(EventClass::create("not an ident").is_err());
        assert!(EventClass::create("").is_err());
    }

    #[test]
    fn attribute_validation() {
        let mut ec = EventClass::create("E").unwrap();
        ec.set_attribute("id", 3_i64.into()).unwrap();
        assert_eq!(ec.id(), Some(3));
        ec.set_attribute("id", (-1_i64).into()).unwrap();
        assert_eq!(ec.id(), None);
        assert!(matches!(
            ec.set_attribute("id", (-5_i64).into()),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            ec.set_attribute("id", "three".into()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ec.set_attribute("model.emf.uri", 1_i64.into()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ec.set_attribute("stream_id", 1_i64.into()),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ec.set_attribute("color", "red".into()),
            Err(Error::InvalidArgument(_))
        ));
        ec.set_loglevel(13).unwrap();
        ec.set_emf_uri("http://example.com/model").unwrap();
        assert_eq!(ec.loglevel(), Some(13));
        assert_eq!(ec.emf_uri(), Some("http://example.com/model"));
        assert!(matches!(ec.set_id(-1), Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn payload_and_context_must_be_structures() {
        let mut ec = EventClass::create("E").unwrap();
        let int = FieldType::integer(32).unwrap();
        assert!(matches!(
            ec.set_payload_type(&int),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ec.set_context_type(&int),
            Err(Error::InvalidArgument(_))
        ));
        ec.add_field(&int, "x").unwrap();
        assert!(ec.add_field(&int, "x").is_err());
        assert_eq!(ec.field_count(), 1);
        assert_eq!(ec.field_type_by_name("x"), Some(&int));
        ec.set_context_type(&FieldType::structure()).unwrap();
        assert!(ec.context_type().is_some());
    }

    #[test]
    fn attachment_freezes() {
        let mut ec = EventClass::create("E").unwrap();
        let int = FieldType::integer(32).unwrap();
        ec.add_field(&int, "x").unwrap();
        ec.attach(StreamClassKey::next(), Some(2)).unwrap();
        assert!(ec.is_frozen());
        assert!(ec.is_attached());
        assert!(ec.payload_type().is_frozen());
        assert!(int.is_frozen());
        assert_eq!(ec.stream_id(), Some(2));
        assert!(matches!(ec.set_id(1), Err(Error::AlreadyAttached { .. })));
        assert_eq!(
            ec.add_field(&FieldType::string(), "s"),
            Err(Error::AlreadyFrozen("event class"))
        );
        assert_eq!(
            ec.set_loglevel(1),
            Err(Error::AlreadyFrozen("event class"))
        );
        assert_eq!(
            ec.set_payload_type(&FieldType::structure()),
            Err(Error::AlreadyFrozen("event class"))
        );
    }

    #[test]
    fn native_byte_order() {
        let mut ec = EventClass::create("E").unwrap();
        ec.add_field(&FieldType::integer(32).unwrap(), "x").unwrap();
        ec.set_native_byte_order(ByteOrder::BigEndian).unwrap();
        assert_eq!(
            ec.field_type_by_name("x").unwrap().byte_order(),
            Some(ByteOrder::BigEndian)
        );
    }
}
