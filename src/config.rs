use crate::attrs::AttrValue;
use crate::clock::Clock;
use crate::error::Error;
use crate::event_class::EventClass;
use crate::field_type::{FieldType, IntegerRange};
use crate::opts::IrOpts;
use crate::stream_class::StreamClass;
use crate::trace::Trace;
use crate::types::{ByteOrder, DisplayBase, StringEncoding};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Environment variable naming the configuration file, used when `--config` isn't given.
pub const CONFIG_ENV_VAR: &str = "CTF_IR_CONFIG";

/// Declarative description of a trace: its environment, clocks, stream classes
/// and their event classes.
#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IrConfig {
    pub trace: TraceConfig,
    pub clocks: Vec<ClockConfig>,
    pub stream_classes: Vec<StreamClassConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TraceConfig {
    /// Trace UUID. A random one is generated when not provided.
    pub uuid: Option<Uuid>,

    /// Native byte order of the trace, defaults to the host's.
    pub byte_order: Option<ByteOrder>,

    /// Trace environment entries, integers or strings
    pub env: BTreeMap<String, AttrValue>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ClockConfig {
    pub name: String,
    pub description: Option<String>,

    /// Frequency in Hz, defaults to 1 GHz
    pub frequency: Option<u64>,
    pub precision: Option<u64>,
    pub offset_s: i64,
    pub offset: i64,
    pub absolute: bool,

    /// Clock UUID. When not provided, one is derived from the trace UUID and the clock name.
    pub uuid: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StreamClassConfig {
    pub name: String,

    /// Stream class id, assigned by the trace when not provided
    pub id: Option<u64>,

    /// Name of one of the `[[clocks]]` entries
    pub clock: Option<String>,

    /// Packet context members, replacing the default packet context
    pub packet_context: Option<Vec<FieldConfig>>,

    /// Event header members, replacing the default `{ id, timestamp }` header
    pub event_header: Option<Vec<FieldConfig>>,

    pub event_context: Option<Vec<FieldConfig>>,

    pub event_classes: Vec<EventClassConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EventClassConfig {
    pub name: String,

    /// Event class id, assigned by the stream class when not provided
    pub id: Option<u64>,
    pub loglevel: Option<i64>,
    pub model_emf_uri: Option<String>,
    pub context: Option<Vec<FieldConfig>>,
    pub fields: Vec<FieldConfig>,
}

/// A named structure member.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldTypeConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FieldTypeConfig {
    #[serde(rename_all = "kebab-case")]
    Integer {
        size: u32,
        #[serde(default)]
        signed: bool,
        byte_order: Option<ByteOrder>,
        base: Option<DisplayBase>,
        encoding: Option<StringEncoding>,
        align: Option<u32>,
        /// Name of the clock this integer holds values of
        map_clock: Option<String>,
    },
    #[serde(rename_all = "kebab-case")]
    FloatingPoint {
        exponent_digits: Option<u32>,
        mantissa_digits: Option<u32>,
        byte_order: Option<ByteOrder>,
        align: Option<u32>,
    },
    Enumeration {
        container: Box<FieldTypeConfig>,
        mappings: Vec<MappingConfig>,
    },
    String {
        encoding: Option<StringEncoding>,
    },
    Structure {
        #[serde(default)]
        fields: Vec<FieldConfig>,
    },
    Array {
        element: Box<FieldTypeConfig>,
        length: u64,
    },
    Sequence {
        element: Box<FieldTypeConfig>,
        /// Reference to the length field
        length: String,
    },
    Variant {
        /// Reference to the tag field
        tag: String,
        options: Vec<VariantOptionConfig>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MappingConfig {
    pub label: String,
    pub lower: i64,
    /// Defaults to `lower`
    pub upper: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RangeConfig {
    pub lower: i64,
    pub upper: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct VariantOptionConfig {
    pub name: String,

    /// Tag values selecting this option. When empty, the option is selected
    /// by the tag enumeration's mapping of the same name.
    #[serde(default)]
    pub ranges: Vec<RangeConfig>,

    #[serde(flatten)]
    pub ty: FieldTypeConfig,
}

impl IrConfig {
    pub fn load_merge_with_opts(opts: IrOpts) -> Result<Self, Box<dyn std::error::Error>> {
        let mut cfg = if let Some(cfg_path) = &opts.config_file {
            Self::try_from_file(cfg_path)?
        } else if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
            Self::try_from_file(Path::new(&env_path))?
        } else {
            Self::default()
        };

        cfg.trace.uuid = opts.trace_uuid.or(cfg.trace.uuid);
        cfg.trace.byte_order = opts.byte_order.or(cfg.trace.byte_order);

        Ok(cfg)
    }

    pub fn try_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        debug!(path = %path.display(), "Loading configuration");
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Build the described trace. Event classes are attached after their stream
    /// class joined the trace, so they validate against the trace's layout.
    pub fn build_trace(&self) -> Result<Trace, Error> {
        let mut trace = Trace::create()?;
        if let Some(uuid) = self.trace.uuid {
            trace.set_uuid(uuid)?;
        }
        if let Some(byte_order) = self.trace.byte_order {
            trace.set_native_byte_order(byte_order)?;
        }
        for (name, value) in self.trace.env.iter() {
            trace.set_environment_field(name, value.clone())?;
        }
        for clock_cfg in self.clocks.iter() {
            let clock = clock_cfg.build(trace.uuid())?;
            trace.add_clock(Arc::new(clock))?;
        }

        for sc_cfg in self.stream_classes.iter() {
            let stream_class = sc_cfg.build(trace.clocks())?;
            let key = trace.add_stream_class(stream_class)?;
            for ec_cfg in sc_cfg.event_classes.iter() {
                let event_class = ec_cfg.build(trace.clocks())?;
                trace
                    .stream_class_mut(key)
                    .ok_or_else(|| {
                        Error::invalid_argument(format!(
                            "Stream class '{}' is missing from the trace",
                            sc_cfg.name
                        ))
                    })?
                    .add_event_class(event_class)?;
            }
        }

        Ok(trace)
    }
}

impl ClockConfig {
    pub fn build(&self, trace_uuid: Uuid) -> Result<Clock, Error> {
        let uuid = self
            .uuid
            .unwrap_or_else(|| Uuid::new_v5(&trace_uuid, self.name.as_bytes()));
        let mut clock = Clock::new(&self.name)?
            .with_offset_s(self.offset_s)
            .with_offset(self.offset)
            .with_absolute(self.absolute)
            .with_uuid(uuid);
        if let Some(description) = &self.description {
            clock = clock.with_description(description);
        }
        if let Some(frequency) = self.frequency {
            clock = clock.with_frequency(frequency)?;
        }
        if let Some(precision) = self.precision {
            clock = clock.with_precision(precision);
        }
        Ok(clock)
    }
}

impl StreamClassConfig {
    pub fn build(&self, clocks: &[Arc<Clock>]) -> Result<StreamClass, Error> {
        let mut sc = StreamClass::create(&self.name)?;
        if let Some(id) = self.id {
            sc.set_id(id)?;
        }
        if let Some(fields) = &self.packet_context {
            sc.set_packet_context_type(Some(&build_structure(fields, clocks)?))?;
        }
        if let Some(fields) = &self.event_header {
            sc.set_event_header_type(&build_structure(fields, clocks)?)?;
        }
        if let Some(fields) = &self.event_context {
            sc.set_event_context_type(Some(&build_structure(fields, clocks)?))?;
        }
        // After the types, so the clock maps into the configured header
        if let Some(name) = &self.clock {
            sc.set_clock(Arc::clone(lookup_clock(clocks, name)?))?;
        }
        Ok(sc)
    }
}

impl EventClassConfig {
    pub fn build(&self, clocks: &[Arc<Clock>]) -> Result<EventClass, Error> {
        let mut ec = EventClass::create(&self.name)?;
        if let Some(id) = self.id {
            let id = i64::try_from(id).map_err(|_| {
                Error::out_of_range(id, "Event class ids must fit in a signed 64-bit integer")
            })?;
            ec.set_id(id)?;
        }
        if let Some(loglevel) = self.loglevel {
            ec.set_loglevel(loglevel)?;
        }
        if let Some(uri) = &self.model_emf_uri {
            ec.set_emf_uri(uri)?;
        }
        if let Some(fields) = &self.context {
            ec.set_context_type(&build_structure(fields, clocks)?)?;
        }
        for field in self.fields.iter() {
            ec.add_field(&field.ty.build(clocks)?, &field.name)?;
        }
        Ok(ec)
    }
}

impl FieldTypeConfig {
    pub fn build(&self, clocks: &[Arc<Clock>]) -> Result<FieldType, Error> {
        Ok(match self {
            FieldTypeConfig::Integer {
                size,
                signed,
                byte_order,
                base,
                encoding,
                align,
                map_clock,
            } => {
                let mut ty = if *signed {
                    FieldType::signed_integer(*size)?
                } else {
                    FieldType::integer(*size)?
                };
                if let Some(bo) = byte_order {
                    ty.set_byte_order(*bo)?;
                }
                if let Some(base) = base {
                    ty.integer_set_base(*base)?;
                }
                if let Some(encoding) = encoding {
                    ty.integer_set_encoding(*encoding)?;
                }
                if let Some(align) = align {
                    ty.set_alignment(*align)?;
                }
                if let Some(name) = map_clock {
                    ty.integer_set_mapped_clock(Arc::clone(lookup_clock(clocks, name)?))?;
                }
                ty
            }
            FieldTypeConfig::FloatingPoint {
                exponent_digits,
                mantissa_digits,
                byte_order,
                align,
            } => {
                let mut ty = FieldType::floating_point();
                if let Some(digits) = exponent_digits {
                    ty.floating_point_set_exponent_digits(*digits)?;
                }
                if let Some(digits) = mantissa_digits {
                    ty.floating_point_set_mantissa_digits(*digits)?;
                }
                if let Some(bo) = byte_order {
                    ty.set_byte_order(*bo)?;
                }
                if let Some(align) = align {
                    ty.set_alignment(*align)?;
                }
                ty
            }
            FieldTypeConfig::Enumeration {
                container,
                mappings,
            } => {
                let container = container.build(clocks)?;
                let signed = container
                    .as_integer()
                    .map(|i| i.is_signed())
                    .unwrap_or(false);
                let mut ty = FieldType::enumeration(&container)?;
                for m in mappings.iter() {
                    let upper = m.upper.unwrap_or(m.lower);
                    if signed {
                        ty.enumeration_add_mapping_signed(&m.label, m.lower, upper)?;
                    } else {
                        ty.enumeration_add_mapping_unsigned(
                            &m.label,
                            non_negative(m.lower)?,
                            non_negative(upper)?,
                        )?;
                    }
                }
                ty
            }
            FieldTypeConfig::String { encoding } => {
                let mut ty = FieldType::string();
                if let Some(encoding) = encoding {
                    ty.string_set_encoding(*encoding)?;
                }
                ty
            }
            FieldTypeConfig::Structure { fields } => build_structure(fields, clocks)?,
            FieldTypeConfig::Array { element, length } => {
                FieldType::array(&element.build(clocks)?, *length)
            }
            FieldTypeConfig::Sequence { element, length } => {
                FieldType::sequence(&element.build(clocks)?, length)?
            }
            FieldTypeConfig::Variant { tag, options } => {
                let mut ty = FieldType::variant(tag)?;
                for opt in options.iter() {
                    let ranges = opt
                        .ranges
                        .iter()
                        .map(RangeConfig::to_range)
                        .collect::<Result<Vec<_>, _>>()?;
                    ty.variant_add_option(&opt.ty.build(clocks)?, &opt.name, ranges)?;
                }
                ty
            }
        })
    }
}

impl RangeConfig {
    /// Negative lower bounds make a signed range, others an unsigned one.
    pub fn to_range(&self) -> Result<IntegerRange, Error> {
        let upper = self.upper.unwrap_or(self.lower);
        if self.lower < 0 {
            IntegerRange::signed(self.lower, upper)
        } else {
            IntegerRange::unsigned(non_negative(self.lower)?, non_negative(upper)?)
        }
    }
}

fn build_structure(fields: &[FieldConfig], clocks: &[Arc<Clock>]) -> Result<FieldType, Error> {
    let mut ty = FieldType::structure();
    for field in fields.iter() {
        ty.structure_add_field(&field.ty.build(clocks)?, &field.name)?;
    }
    Ok(ty)
}

fn lookup_clock<'a>(clocks: &'a [Arc<Clock>], name: &str) -> Result<&'a Arc<Clock>, Error> {
    clocks
        .iter()
        .find(|c| c.name() == name)
        .ok_or_else(|| Error::invalid_argument(format!("Unknown clock '{name}'")))
}

fn non_negative(value: i64) -> Result<u64, Error> {
    u64::try_from(value)
        .map_err(|_| Error::out_of_range(value, "Expected a non-negative integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataWriter;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const TRACE_UUID: &str = "a1b2c3d4-0000-4000-8000-0123456789ab";

    const SMALL_CONFIG: &str = r#"
[trace]
uuid = "a1b2c3d4-0000-4000-8000-0123456789ab"
byte-order = "big-endian"

[trace.env]
hostname = "box"
tracer_major = 2

[[clocks]]
name = "monotonic"
description = "Monotonic clock"
frequency = 1000000
offset-s = 10
"#;

    const FULL_CONFIG: &str = r#"
[trace]
uuid = "a1b2c3d4-0000-4000-8000-0123456789ab"
byte-order = "le"

[[clocks]]
name = "monotonic"

[[stream-classes]]
name = "kernel"
id = 3
clock = "monotonic"

[[stream-classes.event-classes]]
name = "sched_switch"
loglevel = 4

[[stream-classes.event-classes.fields]]
name = "kind"
type = "enumeration"
container = { type = "integer", size = 8 }
mappings = [
    { label = "A", lower = 0 },
    { label = "B", lower = 1, upper = 9 },
]

[[stream-classes.event-classes.fields]]
name = "payload"
type = "variant"
tag = "kind"
options = [
    { name = "A", type = "integer", size = 16, signed = true },
    { name = "B", type = "string" },
]

[[stream-classes.event-classes.fields]]
name = "len"
type = "integer"
size = 32

[[stream-classes.event-classes.fields]]
name = "samples"
type = "sequence"
length = "len"
element = { type = "floating-point", exponent-digits = 11, mantissa-digits = 53 }

[[stream-classes.event-classes]]
name = "irq"
id = 7
context = [ { name = "cpu", type = "integer", size = 8, base = "hex" } ]
fields = [ { name = "vec", type = "array", length = 4, element = { type = "integer", size = 8 } } ]
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn small_config() {
        let f = write_config(SMALL_CONFIG);
        let path = f.path();

        let cfg = IrConfig::load_merge_with_opts(IrOpts {
            config_file: Some(path.to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        env::set_var(CONFIG_ENV_VAR, path);
        let env_cfg = IrConfig::load_merge_with_opts(Default::default()).unwrap();
        env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(cfg, env_cfg);

        assert_eq!(
            cfg,
            IrConfig {
                trace: TraceConfig {
                    uuid: Some(Uuid::parse_str(TRACE_UUID).unwrap()),
                    byte_order: Some(ByteOrder::BigEndian),
                    env: [
                        ("hostname".to_owned(), AttrValue::String("box".to_owned())),
                        ("tracer_major".to_owned(), AttrValue::Integer(2)),
                    ]
                    .into_iter()
                    .collect(),
                },
                clocks: vec![ClockConfig {
                    name: "monotonic".to_owned(),
                    description: Some("Monotonic clock".to_owned()),
                    frequency: Some(1_000_000),
                    offset_s: 10,
                    ..Default::default()
                }],
                stream_classes: Vec::new(),
            }
        );
    }

    #[test]
    fn cli_options_override_the_file() {
        let f = write_config(SMALL_CONFIG);
        let uuid = Uuid::new_v4();
        let cfg = IrConfig::load_merge_with_opts(IrOpts {
            config_file: Some(f.path().to_path_buf()),
            trace_uuid: Some(uuid),
            byte_order: Some(ByteOrder::LittleEndian),
        })
        .unwrap();
        assert_eq!(cfg.trace.uuid, Some(uuid));
        assert_eq!(cfg.trace.byte_order, Some(ByteOrder::LittleEndian));
        assert_eq!(cfg.clocks.len(), 1);
    }

    #[test]
    fn build_small_trace() {
        let cfg: IrConfig = toml::from_str(SMALL_CONFIG).unwrap();
        let trace = cfg.build_trace().unwrap();
        let trace_uuid = Uuid::parse_str(TRACE_UUID).unwrap();
        assert_eq!(trace.uuid(), trace_uuid);
        assert_eq!(trace.native_byte_order(), ByteOrder::BigEndian);
        assert_eq!(
            trace.environment_field("tracer_major"),
            Some(&AttrValue::Integer(2))
        );

        let clock = trace.clock_by_name("monotonic").unwrap();
        assert_eq!(clock.frequency(), 1_000_000);
        assert_eq!(clock.offset_s(), 10);
        assert_eq!(
            clock.uuid(),
            Some(Uuid::new_v5(&trace_uuid, b"monotonic"))
        );
        assert!(!trace.is_frozen());
    }

    #[test]
    fn build_full_trace() {
        let cfg: IrConfig = toml::from_str(FULL_CONFIG).unwrap();
        let mut trace = cfg.build_trace().unwrap();
        assert!(trace.is_frozen());

        let sc = trace.stream_class_by_id(3).unwrap();
        assert_eq!(sc.event_class_count(), 2);
        let mapped = sc
            .event_header_type()
            .as_structure()
            .unwrap()
            .field_type_by_name("timestamp")
            .unwrap()
            .as_integer()
            .unwrap()
            .mapped_clock()
            .map(|c| c.name().to_owned());
        assert_eq!(mapped.as_deref(), Some("monotonic"));

        let switch = Arc::clone(sc.event_class_by_name("sched_switch").unwrap());
        assert_eq!(switch.id(), Some(0));
        assert_eq!(switch.stream_id(), Some(3));
        assert_eq!(switch.loglevel(), Some(4));
        assert_eq!(switch.field_count(), 4);
        let irq = Arc::clone(sc.event_class_by_id(7).unwrap());
        assert_eq!(irq.name(), "irq");
        assert!(irq.context_type().is_some());

        let mut event = trace.create_event(&switch).unwrap();
        event
            .payload_field_mut("kind")
            .unwrap()
            .set_unsigned_integer_value(3)
            .unwrap();
        let payload = event.payload_field_mut("payload").unwrap();
        payload.set_variant_tag_unsigned(3).unwrap();
        assert_eq!(payload.variant_current_option().unwrap(), Some((1, "B")));
        assert!(trace.create_event(&irq).is_ok());

        let metadata = MetadataWriter::new(&trace).to_string();
        assert!(metadata.contains("map = clock.monotonic.value;"));
        assert!(metadata.contains("name = \"sched_switch\";"));
    }

    #[test]
    fn unknown_clock_is_refused() {
        let cfg: IrConfig = toml::from_str(
            r#"
[[stream-classes]]
name = "s"
clock = "missing"
"#,
        )
        .unwrap();
        assert_eq!(
            cfg.build_trace().unwrap_err(),
            Error::InvalidArgument("Unknown clock 'missing'".to_owned())
        );
    }

    #[test]
    fn negative_unsigned_mapping_is_refused() {
        let cfg: IrConfig = toml::from_str(
            r#"
[[stream-classes]]
name = "s"

[[stream-classes.event-classes]]
name = "e"
fields = [ { name = "k", type = "enumeration", container = { type = "integer", size = 8 }, mappings = [ { label = "X", lower = -1 } ] } ]
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.build_trace(),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn unresolvable_reference_refuses_the_event_class() {
        let cfg: IrConfig = toml::from_str(
            r#"
[[stream-classes]]
name = "s"

[[stream-classes.event-classes]]
name = "e"
fields = [ { name = "seq", type = "sequence", length = "nope", element = { type = "string" } } ]
"#,
        )
        .unwrap();
        assert!(matches!(
            cfg.build_trace(),
            Err(Error::ValidationFailure(_))
        ));
    }
}
