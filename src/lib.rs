//! # Overview
//!
//! An in-memory model of CTF (Common Trace Format) trace metadata and event
//! contents, as a trace writer sees it:
//! * Trace (packet header layout, native byte order, UUID, environment, clocks)
//!   - One or more stream classes (packet context, event header, event context layouts)
//!     * Event classes (name, id, log level, context and payload layouts)
//!       - Events, the per-occurrence field values of one event class
//!
//! Field types describe layouts, fields hold values conforming to a field type.
//! Everything is mutable until it is frozen: a field type when the first field is
//! created from it, an event class when it is attached to a stream class, a stream
//! class when the first event is created from it, and a trace when the first
//! stream class is added to it.
//!
//! Sequence lengths and variant tags are references to other fields, by name.
//! They are resolved when an event class is attached and again when an event is
//! created, against canonical copies of the types in which the references are
//! replaced by resolved [`FieldPath`](field_path::FieldPath)s and `native` byte
//! orders by the trace's native byte order.
//!
//! # Event Attrs Mappings
//!
//! [`Event::attr_kvs`](event::Event::attr_kvs) flattens an event into key/values:
//! * event.name
//! * event.timestamp
//!   - from the event header `timestamp` member
//! * event.internal.ctf.stream_id
//! * event.internal.ctf.id
//! * event.internal.ctf.log_level
//! * event.internal.ctf.header.<possibly.nested.fields>
//! * event.internal.ctf.specific_context.<possibly.nested.fields>
//! * event.<possibly.nested.fields>
//!
//! # Mapping Conventions
//!
//! ## Enumerations
//!
//! Enumeration fields are given an Attr for the integer value and possibly one
//! Attr for the label mapping. Values are allowed to have no label mapping, or
//! have many label mappings (mappings are allowed to overlap).
//! Enumeration values with multiple label mappings omit the `.label` Attr.
//!
//! Example: `my_enum` has value 5 and a single label mapping "RUNNING"
//! * event.my_enum = 5
//! * event.my_enum.label = "RUNNING"
//!
//! Example: `my_enum` has value 1 and no label mapping
//! * event.my_enum = 1
//!
//! ## Arrays and sequences
//!
//! Elements are keyed by their index: `event.samples.0`, `event.samples.1`, ...
//!
//! ## Variants
//!
//! Only the selected option is mapped, keyed by its name: `event.payload.B`.
#![deny(warnings, clippy::all)]

pub mod attrs;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod event_class;
pub mod field;
pub mod field_path;
pub mod field_type;
pub mod ident;
pub mod metadata;
pub mod opts;
pub mod prelude;
pub mod stream_class;
pub mod trace;
pub mod tracing;
pub mod types;
pub mod validation;

pub use crate::clock::Clock;
pub use crate::config::IrConfig;
pub use crate::error::Error;
pub use crate::event::Event;
pub use crate::event_class::EventClass;
pub use crate::field::Field;
pub use crate::field_type::FieldType;
pub use crate::metadata::MetadataWriter;
pub use crate::opts::IrOpts;
pub use crate::stream_class::StreamClass;
pub use crate::trace::Trace;
