use crate::clock::Clock;
use crate::error::Error;
use crate::event::Event;
use crate::event_class::EventClass;
use crate::field_type::FieldType;
use crate::ident::validate_identifier;
use crate::types::ByteOrder;
use crate::validation::{validate_class_types, EventTypes, StreamTypes, ValidationInput};
use derive_more::{Display, Into};
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Process-unique identity of a stream class.
///
/// Event classes hold this instead of a reference to their stream class,
/// it never keeps the stream class alive.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Into)]
pub struct StreamClassKey(u64);

impl StreamClassKey {
    pub(crate) fn next() -> Self {
        static NEXT_KEY: AtomicU64 = AtomicU64::new(0);
        StreamClassKey(NEXT_KEY.fetch_add(1, SeqCst))
    }
}

/// What a stream class needs to know about the trace it was added to
#[derive(Clone, Debug)]
pub(crate) struct TraceLink {
    pub(crate) uuid: Uuid,
    pub(crate) native_byte_order: ByteOrder,
    pub(crate) packet_header_type: Option<FieldType>,
}

/// A refused [`StreamClass::add_event_class`]. The event class is handed
/// back so its types can be fixed and the attachment retried.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct AttachError {
    pub error: Error,
    pub event_class: EventClass,
}

impl AttachError {
    pub fn into_event_class(self) -> EventClass {
        self.event_class
    }
}

impl From<AttachError> for Error {
    fn from(e: AttachError) -> Self {
        e.error
    }
}

#[derive(Debug)]
struct AttachedEventClass {
    class: Arc<EventClass>,
    /// Canonical types, once validated
    canonical: Option<EventTypes>,
}

#[derive(Debug)]
pub struct StreamClass {
    key: StreamClassKey,
    name: String,
    id: Option<u64>,
    clock: Option<Arc<Clock>>,
    types: StreamTypes,
    /// Canonical types, once validated
    canonical: Option<StreamTypes>,
    event_classes: Vec<AttachedEventClass>,
    next_event_id: u64,
    frozen: bool,
    trace: Option<TraceLink>,
}

impl StreamClass {
    pub fn create(name: &str) -> Result<Self, Error> {
        validate_identifier(name)?;
        Ok(Self {
            key: StreamClassKey::next(),
            name: name.to_owned(),
            id: None,
            clock: None,
            types: StreamTypes {
                packet_context: Some(default_packet_context_type()?),
                event_header: default_event_header_type()?,
                event_context: None,
            },
            canonical: None,
            event_classes: Vec::new(),
            next_event_id: 0,
            frozen: false,
            trace: None,
        })
    }

    pub fn key(&self) -> StreamClassKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn trace_uuid(&self) -> Option<Uuid> {
        self.trace.as_ref().map(|t| t.uuid)
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::AlreadyFrozen("stream class"))
        } else {
            Ok(())
        }
    }

    /// Ids are immutable once an event class was attached or the stream class joined a trace.
    pub fn set_id(&mut self, id: u64) -> Result<(), Error> {
        self.check_mutable()?;
        if !self.event_classes.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Stream class '{}' already has event classes, its id cannot change",
                self.name
            )));
        }
        if self.trace.is_some() {
            return Err(Error::invalid_argument(format!(
                "Stream class '{}' belongs to a trace, its id cannot change",
                self.name
            )));
        }
        self.id = Some(id);
        Ok(())
    }

    pub(crate) fn assign_id(&mut self, id: u64) {
        self.id = Some(id);
    }

    pub fn clock(&self) -> Option<&Arc<Clock>> {
        self.clock.as_ref()
    }

    /// Use `clock` for this stream and map it into the timestamp members
    /// of the event header and packet context that do not map a clock yet.
    pub fn set_clock(&mut self, clock: Arc<Clock>) -> Result<(), Error> {
        self.check_mutable()?;
        map_clock(&mut self.types.event_header, &["timestamp"], &clock)?;
        if let Some(ctx) = self.types.packet_context.as_mut() {
            map_clock(ctx, &["timestamp_begin", "timestamp_end"], &clock)?;
        }
        self.clock = Some(clock);
        self.canonical = None;
        Ok(())
    }

    pub fn packet_context_type(&self) -> Option<&FieldType> {
        self.types.packet_context.as_ref()
    }

    pub fn event_header_type(&self) -> &FieldType {
        &self.types.event_header
    }

    pub fn event_context_type(&self) -> Option<&FieldType> {
        self.types.event_context.as_ref()
    }

    pub fn set_packet_context_type(&mut self, ty: Option<&FieldType>) -> Result<(), Error> {
        self.check_type(ty, "packet context")?;
        self.types.packet_context = ty.cloned();
        Ok(())
    }

    /// Every event carries a header, it can be replaced but not removed.
    pub fn set_event_header_type(&mut self, ty: &FieldType) -> Result<(), Error> {
        self.check_type(Some(ty), "event header")?;
        self.types.event_header = ty.clone();
        Ok(())
    }

    pub fn set_event_context_type(&mut self, ty: Option<&FieldType>) -> Result<(), Error> {
        self.check_type(ty, "event context")?;
        self.types.event_context = ty.cloned();
        Ok(())
    }

    fn check_type(&mut self, ty: Option<&FieldType>, role: &str) -> Result<(), Error> {
        self.check_mutable()?;
        if let Some(t) = ty {
            if !t.is_structure() {
                return Err(Error::invalid_argument(format!(
                    "Stream class {role} type must be a structure, not a {}",
                    t.id()
                )));
            }
        }
        self.canonical = None;
        Ok(())
    }

    /// Attach `event_class` to this stream class.
    ///
    /// The class gets the next free id if it has none, is checked against
    /// this stream class's types, frozen and returned as the shared instance
    /// events are created from. A refused class is handed back untouched
    /// inside the [`AttachError`].
    pub fn add_event_class(
        &mut self,
        mut event_class: EventClass,
    ) -> Result<Arc<EventClass>, AttachError> {
        let (id, canonical) = match self.check_attachable(&event_class) {
            Ok(checked) => checked,
            Err(error) => return Err(AttachError { error, event_class }),
        };
        if let Err(error) = self.attach(&mut event_class, id) {
            return Err(AttachError { error, event_class });
        }
        self.next_event_id = self.next_event_id.max(id.saturating_add(1));
        let class = Arc::new(event_class);
        debug!(
            stream_class = %self.name,
            event_class = class.name(),
            id,
            "Attached event class"
        );
        self.event_classes.push(AttachedEventClass {
            class: Arc::clone(&class),
            canonical: Some(canonical),
        });
        Ok(class)
    }

    /// Checks that leave `event_class` unchanged, yields the id it will get
    /// and its canonical types.
    fn check_attachable(&self, event_class: &EventClass) -> Result<(u64, EventTypes), Error> {
        if event_class.is_attached() {
            return Err(Error::AlreadyAttached {
                event_class: event_class.name().to_owned(),
            });
        }
        if self.event_class_by_name(event_class.name()).is_some() {
            return Err(Error::invalid_argument(format!(
                "Stream class '{}' already has an event class named '{}'",
                self.name,
                event_class.name()
            )));
        }
        let id = match event_class.id() {
            Some(id) if self.event_class_by_id(id).is_some() => {
                return Err(Error::invalid_argument(format!(
                    "Stream class '{}' already has an event class with id {id}",
                    self.name
                )))
            }
            Some(id) => id,
            None => {
                let mut id = self.next_event_id;
                while self.event_class_by_id(id).is_some() {
                    id += 1;
                }
                id
            }
        };
        if i64::try_from(id).is_err() {
            return Err(Error::out_of_range(id, "No event class id left"));
        }
        if let Some(stream_id) = self.id {
            if i64::try_from(stream_id).is_err() {
                return Err(Error::out_of_range(
                    stream_id,
                    "Stream class id does not fit an attribute",
                ));
            }
        }

        let output = validate_class_types(ValidationInput {
            native_byte_order: self.trace.as_ref().map(|t| t.native_byte_order),
            packet_header: self
                .trace
                .as_ref()
                .and_then(|t| t.packet_header_type.as_ref()),
            stream: self.canonical.as_ref().unwrap_or(&self.types),
            stream_valid: self.canonical.is_some(),
            event: &event_class.types(),
            event_valid: false,
        })?;
        Ok((id, output.event))
    }

    fn attach(&self, event_class: &mut EventClass, id: u64) -> Result<(), Error> {
        if event_class.id().is_none() {
            let signed = i64::try_from(id)
                .map_err(|_| Error::out_of_range(id, "No event class id left"))?;
            event_class.set_id(signed)?;
        }
        event_class.attach(self.key, self.id)
    }

    pub fn event_class_count(&self) -> usize {
        self.event_classes.len()
    }

    pub fn event_class(&self, index: usize) -> Option<&Arc<EventClass>> {
        self.event_classes.get(index).map(|e| &e.class)
    }

    pub fn event_classes(&self) -> impl Iterator<Item = &Arc<EventClass>> + '_ {
        self.event_classes.iter().map(|e| &e.class)
    }

    pub fn event_class_by_id(&self, id: u64) -> Option<&Arc<EventClass>> {
        self.event_classes()
            .find(|ec| ec.id() == Some(id))
    }

    pub fn event_class_by_name(&self, name: &str) -> Option<&Arc<EventClass>> {
        self.event_classes().find(|ec| ec.name() == name)
    }

    /// Run the assembly protocol for one event of `event_class`.
    ///
    /// The class types are validated (reusing earlier canonical results),
    /// the header, context and payload fields are built from the canonical
    /// types, and this stream class is frozen.
    pub fn create_event(&mut self, event_class: &Arc<EventClass>) -> Result<Event, Error> {
        if event_class.stream_class() != Some(self.key) {
            return Err(Error::NotAttached {
                event_class: event_class.name().to_owned(),
            });
        }
        let index = self
            .event_classes
            .iter()
            .position(|e| Arc::ptr_eq(&e.class, event_class))
            .ok_or_else(|| Error::NotAttached {
                event_class: event_class.name().to_owned(),
            })?;

        let attached = &self.event_classes[index];
        let class_types = attached.class.types();
        let output = validate_class_types(ValidationInput {
            native_byte_order: self.trace.as_ref().map(|t| t.native_byte_order),
            packet_header: self
                .trace
                .as_ref()
                .and_then(|t| t.packet_header_type.as_ref()),
            stream: self.canonical.as_ref().unwrap_or(&self.types),
            stream_valid: self.canonical.is_some(),
            event: attached.canonical.as_ref().unwrap_or(&class_types),
            event_valid: attached.canonical.is_some(),
        })
        .map_err(|e| {
            warn!(
                stream_class = %self.name,
                event_class = event_class.name(),
                err = %e,
                "Event class types failed validation"
            );
            e
        })?;

        let event = Event::assemble(
            Arc::clone(event_class),
            self.key,
            self.clock.clone(),
            &output,
        )?;

        self.canonical = Some(output.stream);
        self.event_classes[index].canonical = Some(output.event);
        self.freeze();
        Ok(event)
    }

    pub(crate) fn link_trace(&mut self, link: TraceLink) {
        self.trace = Some(link);
        self.canonical = None;
        for e in self.event_classes.iter_mut() {
            e.canonical = None;
        }
    }

    fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        debug!(stream_class = %self.name, "Freezing stream class");
        self.types.event_header.freeze();
        for ty in [&self.types.packet_context, &self.types.event_context]
            .into_iter()
            .flatten()
        {
            ty.freeze();
        }
        self.frozen = true;
    }
}

fn map_clock(ty: &mut FieldType, members: &[&str], clock: &Arc<Clock>) -> Result<(), Error> {
    for name in members {
        let needs_mapping = ty
            .as_structure()
            .and_then(|s| s.field_type_by_name(name))
            .and_then(FieldType::as_integer)
            .map(|int| int.mapped_clock().is_none())
            .unwrap_or(false);
        if !needs_mapping {
            continue;
        }
        if let Some(member) = ty.structure_field_type_mut(name)? {
            if member.is_frozen() {
                *member = member.copy();
            }
            member.integer_set_mapped_clock(Arc::clone(clock))?;
        }
    }
    Ok(())
}

fn default_event_header_type() -> Result<FieldType, Error> {
    let mut header = FieldType::structure();
    header.structure_add_field(&FieldType::integer(32)?, "id")?;
    header.structure_add_field(&FieldType::integer(64)?, "timestamp")?;
    Ok(header)
}

fn default_packet_context_type() -> Result<FieldType, Error> {
    let mut ctx = FieldType::structure();
    for name in [
        "timestamp_begin",
        "timestamp_end",
        "content_size",
        "packet_size",
        "events_discarded",
    ] {
        ctx.structure_add_field(&FieldType::integer(64)?, name)?;
    }
    Ok(ctx)
}
