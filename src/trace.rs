use crate::attrs::{AttrValue, Attributes};
use crate::clock::Clock;
use crate::error::Error;
use crate::event::Event;
use crate::event_class::EventClass;
use crate::field_type::FieldType;
use crate::ident::validate_identifier;
use crate::stream_class::{StreamClass, StreamClassKey, TraceLink};
use crate::types::ByteOrder;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// CTF packet magic number
pub const CTF_MAGIC: u32 = 0xC1FC_1FC1;

/// Root of the model: owns the stream classes, the clocks and the trace environment.
#[derive(Debug)]
pub struct Trace {
    uuid: Uuid,
    native_byte_order: ByteOrder,
    packet_header_type: Option<FieldType>,
    environment: Attributes,
    clocks: Vec<Arc<Clock>>,
    stream_classes: Vec<StreamClass>,
    frozen: bool,
}

impl Trace {
    pub fn create() -> Result<Self, Error> {
        Ok(Self {
            uuid: Uuid::new_v4(),
            native_byte_order: ByteOrder::host(),
            packet_header_type: Some(default_packet_header_type()?),
            environment: Attributes::new(),
            clocks: Vec::new(),
            stream_classes: Vec::new(),
            frozen: false,
        })
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::AlreadyFrozen("trace"))
        } else {
            Ok(())
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn set_uuid(&mut self, uuid: Uuid) -> Result<(), Error> {
        self.check_mutable()?;
        self.uuid = uuid;
        Ok(())
    }

    pub fn native_byte_order(&self) -> ByteOrder {
        self.native_byte_order
    }

    /// `Native` is refused, the trace is what decides what native means.
    pub fn set_native_byte_order(&mut self, byte_order: ByteOrder) -> Result<(), Error> {
        self.check_mutable()?;
        if byte_order.is_native() {
            return Err(Error::invalid_argument(
                "A trace's native byte order must be little, big or network endian",
            ));
        }
        self.native_byte_order = byte_order;
        Ok(())
    }

    pub fn packet_header_type(&self) -> Option<&FieldType> {
        self.packet_header_type.as_ref()
    }

    pub fn set_packet_header_type(&mut self, ty: Option<&FieldType>) -> Result<(), Error> {
        self.check_mutable()?;
        if let Some(t) = ty {
            if !t.is_structure() {
                return Err(Error::invalid_argument(format!(
                    "Packet header type must be a structure, not a {}",
                    t.id()
                )));
            }
        }
        self.packet_header_type = ty.cloned();
        Ok(())
    }

    pub fn environment(&self) -> &Attributes {
        &self.environment
    }

    pub fn environment_field(&self, name: &str) -> Option<&AttrValue> {
        self.environment.get(name)
    }

    pub fn set_environment_field(&mut self, name: &str, value: AttrValue) -> Result<(), Error> {
        self.check_mutable()?;
        validate_identifier(name)?;
        self.environment.set(name, value)
    }

    pub fn clocks(&self) -> &[Arc<Clock>] {
        &self.clocks
    }

    pub fn clock_by_name(&self, name: &str) -> Option<&Arc<Clock>> {
        self.clocks.iter().find(|c| c.name() == name)
    }

    pub fn add_clock(&mut self, clock: Arc<Clock>) -> Result<(), Error> {
        self.check_mutable()?;
        if self.clock_by_name(clock.name()).is_some() {
            return Err(Error::invalid_argument(format!(
                "Trace already has a clock named '{}'",
                clock.name()
            )));
        }
        self.clocks.push(clock);
        Ok(())
    }

    /// Take ownership of `stream_class`, assigning it the next free id if it has none.
    ///
    /// The first stream class freezes the trace.
    pub fn add_stream_class(&mut self, mut stream_class: StreamClass) -> Result<StreamClassKey, Error> {
        let id = match stream_class.id() {
            Some(id) if self.stream_class_by_id(id).is_some() => {
                return Err(Error::invalid_argument(format!(
                    "Trace already has a stream class with id {id}"
                )))
            }
            Some(id) => id,
            None => self
                .stream_classes
                .iter()
                .filter_map(StreamClass::id)
                .max()
                .map(|max| max.saturating_add(1))
                .unwrap_or(0),
        };
        if let Some(clock) = stream_class.clock() {
            match self.clock_by_name(clock.name()) {
                Some(known) if known.as_ref() != clock.as_ref() => {
                    return Err(Error::invalid_argument(format!(
                        "Trace already has a different clock named '{}'",
                        clock.name()
                    )))
                }
                Some(_) => (),
                None if self.frozen => {
                    return Err(Error::AlreadyFrozen("trace"));
                }
                None => self.clocks.push(Arc::clone(clock)),
            }
        }

        self.freeze();
        stream_class.assign_id(id);
        stream_class.link_trace(TraceLink {
            uuid: self.uuid,
            native_byte_order: self.native_byte_order,
            packet_header_type: self.packet_header_type.clone(),
        });
        let key = stream_class.key();
        debug!(stream_class = stream_class.name(), id, "Added stream class");
        self.stream_classes.push(stream_class);
        Ok(key)
    }

    pub fn stream_class_count(&self) -> usize {
        self.stream_classes.len()
    }

    pub fn stream_classes(&self) -> &[StreamClass] {
        &self.stream_classes
    }

    pub fn stream_class(&self, key: StreamClassKey) -> Option<&StreamClass> {
        self.stream_classes.iter().find(|s| s.key() == key)
    }

    pub fn stream_class_mut(&mut self, key: StreamClassKey) -> Option<&mut StreamClass> {
        self.stream_classes.iter_mut().find(|s| s.key() == key)
    }

    pub fn stream_class_by_id(&self, id: u64) -> Option<&StreamClass> {
        self.stream_classes.iter().find(|s| s.id() == Some(id))
    }

    /// Create an event through the stream class `event_class` is attached to.
    pub fn create_event(&mut self, event_class: &Arc<EventClass>) -> Result<Event, Error> {
        let not_attached = || Error::NotAttached {
            event_class: event_class.name().to_owned(),
        };
        let key = event_class.stream_class().ok_or_else(not_attached)?;
        self.stream_class_mut(key)
            .ok_or_else(not_attached)?
            .create_event(event_class)
    }

    fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        debug!(uuid = %self.uuid, "Freezing trace");
        if let Some(ty) = self.packet_header_type.as_ref() {
            ty.freeze();
        }
        self.environment.freeze();
        self.frozen = true;
    }
}

fn default_packet_header_type() -> Result<FieldType, Error> {
    let mut header = FieldType::structure();
    header.structure_add_field(&FieldType::integer(32)?, "magic")?;
    header.structure_add_field(&FieldType::array(&FieldType::integer(8)?, 16), "uuid")?;
    header.structure_add_field(&FieldType::integer(32)?, "stream_id")?;
    Ok(header)
}
