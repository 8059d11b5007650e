pub use crate::attrs::{AttrVal, AttrValue, Attributes, EventAttrKey, EventClassAttrKey};
pub use crate::clock::Clock;
pub use crate::config::IrConfig;
pub use crate::error::Error;
pub use crate::event::Event;
pub use crate::event_class::EventClass;
pub use crate::field::{Field, IntegerValue};
pub use crate::field_path::{FieldPath, FieldPathItem, Scope};
pub use crate::field_type::{FieldType, FieldTypeId, IntegerRange};
pub use crate::metadata::MetadataWriter;
pub use crate::opts::IrOpts;
pub use crate::stream_class::{AttachError, StreamClass, StreamClassKey};
pub use crate::trace::Trace;
pub use crate::types::{ByteOrder, DisplayBase, StringEncoding};
