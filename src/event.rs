use crate::attrs::{AttrVal, EventAttrKey};
use crate::clock::Clock;
use crate::error::Error;
use crate::event_class::EventClass;
use crate::field::{Field, FieldValue, IntegerValue};
use crate::stream_class::StreamClassKey;
use crate::validation::ValidationOutput;
use std::sync::Arc;
use tracing::debug;

const HEADER_ID: &str = "id";
const HEADER_TIMESTAMP: &str = "timestamp";

/// One emission of an event class: header, optional context and payload fields.
///
/// Events are only built by [`crate::stream_class::StreamClass::create_event`]
/// (or [`crate::trace::Trace::create_event`]) from the canonical types
/// of their class.
#[derive(Debug)]
pub struct Event {
    class: Arc<EventClass>,
    stream_class: StreamClassKey,
    clock: Option<Arc<Clock>>,
    header: Field,
    context: Option<Field>,
    payload: Field,
    frozen: bool,
}

impl Event {
    pub(crate) fn assemble(
        class: Arc<EventClass>,
        stream_class: StreamClassKey,
        clock: Option<Arc<Clock>>,
        types: &ValidationOutput,
    ) -> Result<Self, Error> {
        let header = Field::create(&types.stream.event_header)?;
        let context = types
            .event
            .context
            .as_ref()
            .map(Field::create)
            .transpose()?;
        let payload = Field::create(&types.event.payload)?;
        debug!(event_class = class.name(), "Created event");
        Ok(Self {
            class,
            stream_class,
            clock,
            header,
            context,
            payload,
            frozen: false,
        })
    }

    pub fn event_class(&self) -> &Arc<EventClass> {
        &self.class
    }

    pub fn stream_class(&self) -> StreamClassKey {
        self.stream_class
    }

    /// The clock of the stream class the event was created from
    pub fn clock(&self) -> Option<&Arc<Clock>> {
        self.clock.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::AlreadyFrozen("event"))
        } else {
            Ok(())
        }
    }

    pub fn header(&self) -> &Field {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Field {
        &mut self.header
    }

    pub fn context(&self) -> Option<&Field> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut Field> {
        self.context.as_mut()
    }

    pub fn payload(&self) -> &Field {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Field {
        &mut self.payload
    }

    pub fn payload_field(&self, name: &str) -> Result<&Field, Error> {
        self.payload.field_by_name(name)
    }

    pub fn payload_field_mut(&mut self, name: &str) -> Result<&mut Field, Error> {
        self.payload.field_by_name_mut(name)
    }

    pub fn payload_field_by_index(&self, index: usize) -> Result<&Field, Error> {
        self.payload.field_by_index(index)
    }

    pub fn set_payload_field(&mut self, name: &str, field: Field) -> Result<(), Error> {
        self.check_mutable()?;
        self.payload.set_field_by_name(name, field)
    }

    pub fn set_header(&mut self, header: Field) -> Result<(), Error> {
        self.check_mutable()?;
        replace_checked(&mut self.header, header, "header")
    }

    pub fn set_context(&mut self, context: Field) -> Result<(), Error> {
        self.check_mutable()?;
        match self.context.as_mut() {
            Some(current) => replace_checked(current, context, "context"),
            None => Err(Error::invalid_argument(
                "The event class declares no context",
            )),
        }
    }

    pub fn set_payload(&mut self, payload: Field) -> Result<(), Error> {
        self.check_mutable()?;
        replace_checked(&mut self.payload, payload, "payload")
    }

    /// Fill the header `id` and `timestamp` members that are still unset.
    ///
    /// `id` comes from the event class, `timestamp` from the current time of
    /// the clock mapped by the member's type. A timestamp without mapped
    /// clock is left alone.
    pub fn populate_header(&mut self) -> Result<(), Error> {
        self.check_mutable()?;
        let header = &mut self.header;
        if header.field_type().as_structure().is_none() {
            return Ok(());
        }

        if let Ok(id_field) = header.field_by_name_mut(HEADER_ID) {
            if id_field.is_set() {
                debug!(event_class = self.class.name(), "Header id already set");
            } else if let Some(id) = self.class.id() {
                set_integer(id_field, IntegerValue::Unsigned(id))
                    .map_err(|e| e.within(HEADER_ID))?;
            }
        }

        if let Ok(ts_field) = header.field_by_name_mut(HEADER_TIMESTAMP) {
            let clock = ts_field
                .field_type()
                .integer_like()
                .and_then(|int| int.mapped_clock().cloned());
            match clock {
                _ if ts_field.is_set() => {
                    debug!(event_class = self.class.name(), "Header timestamp already set")
                }
                Some(clock) => {
                    let cycles = clock.current_time()?;
                    set_integer(ts_field, IntegerValue::Signed(cycles))
                        .map_err(|e| e.within(HEADER_TIMESTAMP))?;
                }
                None => debug!(
                    event_class = self.class.name(),
                    "Header timestamp maps no clock, leaving it unset"
                ),
            }
        }
        Ok(())
    }

    /// Check that header, context and payload are completely set.
    pub fn validate(&self) -> Result<(), Error> {
        self.header.validate().map_err(|e| e.within("header"))?;
        if let Some(c) = self.context.as_ref() {
            c.validate().map_err(|e| e.within("context"))?;
        }
        self.payload.validate().map_err(|e| e.within("payload"))
    }

    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.header.freeze();
        if let Some(c) = self.context.as_mut() {
            c.freeze();
        }
        self.payload.freeze();
        self.frozen = true;
    }

    /// Populate the header, validate and freeze. The event is then ready for serialization.
    pub fn finalize(&mut self) -> Result<(), Error> {
        self.populate_header()?;
        self.validate()?;
        self.freeze();
        Ok(())
    }

    /// Deep copy of the fields. The copy is not frozen.
    pub fn copy(&self) -> Event {
        Event {
            class: Arc::clone(&self.class),
            stream_class: self.stream_class,
            clock: self.clock.clone(),
            header: self.header.copy(),
            context: self.context.as_ref().map(Field::copy),
            payload: self.payload.copy(),
            frozen: false,
        }
    }

    /// Flattened view of the event: class metadata plus one entry per set
    /// scalar of the header, context and payload.
    pub fn attr_kvs(&self) -> Vec<(EventAttrKey, AttrVal)> {
        let mut attrs = vec![(EventAttrKey::Name, self.class.name().into())];
        if let Some(ts) = self
            .header
            .field_by_name(HEADER_TIMESTAMP)
            .ok()
            .and_then(Field::integer_value)
        {
            attrs.push((EventAttrKey::Timestamp, integer_val(ts)));
        }
        if let Some(id) = self.class.stream_id() {
            attrs.push((EventAttrKey::StreamId, id.into()));
        }
        if let Some(id) = self.class.id() {
            attrs.push((EventAttrKey::Id, id.into()));
        }
        if let Some(ll) = self.class.loglevel() {
            attrs.push((EventAttrKey::LogLevel, ll.into()));
        }

        attrs.extend(
            FieldToAttrKeysGen::generate(&self.header)
                .into_iter()
                .map(|(k, v)| (EventAttrKey::Header(k), v)),
        );
        if let Some(c) = self.context.as_ref() {
            attrs.extend(
                FieldToAttrKeysGen::generate(c)
                    .into_iter()
                    .map(|(k, v)| (EventAttrKey::SpecificContext(k), v)),
            );
        }
        attrs.extend(
            FieldToAttrKeysGen::generate(&self.payload)
                .into_iter()
                .map(|(k, v)| (EventAttrKey::Field(k), v)),
        );
        attrs
    }
}

/// Replace a whole scope. The replacement must have the declared type and not be frozen.
fn replace_checked(current: &mut Field, field: Field, role: &str) -> Result<(), Error> {
    if current.field_type() != field.field_type() {
        return Err(Error::invalid_argument(format!(
            "Field type does not match the {role} type"
        )));
    }
    field.check_insertable()?;
    *current = field;
    Ok(())
}

/// Store `value` according to the signedness of the field's type.
fn set_integer(field: &mut Field, value: IntegerValue) -> Result<(), Error> {
    let signed = match field.field_type().integer_like() {
        Some(int) => int.is_signed(),
        None => return Ok(()),
    };
    match (value, signed) {
        (IntegerValue::Unsigned(v), false) => field.set_unsigned_integer_value(v),
        (IntegerValue::Signed(v), true) => field.set_signed_integer_value(v),
        (IntegerValue::Unsigned(v), true) => {
            let v = i64::try_from(v)
                .map_err(|_| Error::out_of_range(v, "Does not fit a signed header member"))?;
            field.set_signed_integer_value(v)
        }
        (IntegerValue::Signed(v), false) => {
            let v = u64::try_from(v)
                .map_err(|_| Error::out_of_range(v, "Does not fit an unsigned header member"))?;
            field.set_unsigned_integer_value(v)
        }
    }
}

fn integer_val(v: IntegerValue) -> AttrVal {
    match v {
        IntegerValue::Signed(v) => v.into(),
        IntegerValue::Unsigned(v) => v.into(),
    }
}

/// Flattens a field tree into `<possibly.nested.key>` / value pairs.
///
/// Structure members and variant options contribute their name, array and
/// sequence elements their index. Unset scalars are skipped.
#[derive(Debug, Default)]
struct FieldToAttrKeysGen {
    // Invariant: none of the entries contain a '.', field names are identifiers
    attr_key_stack: Vec<String>,
    attrs: Vec<(String, AttrVal)>,
}

impl FieldToAttrKeysGen {
    fn generate(root_field: &Field) -> Vec<(String, AttrVal)> {
        let mut gen = Self::default();
        gen.generate_inner(root_field);
        gen.attrs
    }

    fn generate_inner(&mut self, field: &Field) {
        match field.value() {
            FieldValue::Structure(children) => {
                let names = field
                    .field_type()
                    .as_structure()
                    .map(|s| s.fields())
                    .unwrap_or_default();
                for (member, child) in names.iter().zip(children.iter()) {
                    self.nested(member.name().to_owned(), child);
                }
            }
            FieldValue::Array(children) | FieldValue::Sequence(Some(children)) => {
                for (i, child) in children.iter().enumerate() {
                    self.nested(i.to_string(), child);
                }
            }
            FieldValue::Sequence(None) => (),
            FieldValue::Variant(_) => {
                if let (Ok(Some((_, name))), Ok(Some(child))) =
                    (field.variant_current_option(), field.variant_current_field())
                {
                    self.nested(name.to_owned(), child);
                }
            }
            FieldValue::Integer(Some(v)) => self.push(integer_val(*v)),
            FieldValue::Enumeration(Some(v)) => {
                self.push(integer_val(*v));
                // Enums get an extra `.label` attr when the value maps to exactly one label
                if let Ok([label]) = field.enumeration_labels().as_deref() {
                    let key = format!("{}.label", self.key());
                    self.attrs.push((key, (*label).into()));
                }
            }
            FieldValue::FloatingPoint(Some(v)) => self.push((*v).into()),
            FieldValue::String(Some(s)) => self.push(s.clone().into()),
            FieldValue::Integer(None)
            | FieldValue::Enumeration(None)
            | FieldValue::FloatingPoint(None)
            | FieldValue::String(None) => (),
        }
    }

    fn nested(&mut self, component: String, child: &Field) {
        self.attr_key_stack.push(component);
        self.generate_inner(child);
        let _ = self.attr_key_stack.pop();
    }

    fn key(&self) -> String {
        self.attr_key_stack.join(".")
    }

    fn push(&mut self, val: AttrVal) {
        let key = self.key();
        self.attrs.push((key, val));
    }
}
