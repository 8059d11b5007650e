//! TSDL (CTF 1.8 metadata) emission.

use crate::attrs::{AttrValue, Attributes};
use crate::clock::Clock;
use crate::event_class::EventClass;
use crate::field_type::FieldType;
use crate::stream_class::StreamClass;
use crate::trace::Trace;
use std::fmt::{self, Write};

const INDENT: &str = "\t";

/// Renders the metadata of a trace through its `Display` implementation.
///
/// TSDL selects a variant option by matching the tag's enumeration label
/// against the option name. Options selected by explicit integer ranges
/// have no TSDL form; their ranges are written as a comment after the
/// option, and a reader will only select them if the tag is an
/// enumeration with matching labels.
///
/// ```
/// # use ctf_ir::prelude::*;
/// let trace = Trace::create().unwrap();
/// let tsdl = MetadataWriter::new(&trace).to_string();
/// assert!(tsdl.starts_with("/* CTF 1.8 */"));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct MetadataWriter<'a> {
    trace: &'a Trace,
}

impl<'a> MetadataWriter<'a> {
    pub fn new(trace: &'a Trace) -> Self {
        Self { trace }
    }

    fn write_trace(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "trace {{")?;
        writeln!(f, "{INDENT}major = 1;")?;
        writeln!(f, "{INDENT}minor = 8;")?;
        writeln!(f, "{INDENT}uuid = \"{}\";", self.trace.uuid())?;
        writeln!(f, "{INDENT}byte_order = {};", self.trace.native_byte_order())?;
        if let Some(header) = self.trace.packet_header_type() {
            write!(f, "{INDENT}packet.header := ")?;
            write_type(f, header, 1)?;
            writeln!(f, ";")?;
        }
        writeln!(f, "}};\n")
    }

    fn write_env(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env = self.trace.environment();
        if env.count() == 0 {
            return Ok(());
        }
        writeln!(f, "env {{")?;
        write_attributes(f, env)?;
        writeln!(f, "}};\n")
    }
}

impl<'a> fmt::Display for MetadataWriter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/* CTF 1.8 */\n")?;
        self.write_trace(f)?;
        self.write_env(f)?;
        for clock in self.trace.clocks() {
            write_clock(f, clock)?;
        }
        for sc in self.trace.stream_classes() {
            write_stream_class(f, sc)?;
            for ec in sc.event_classes() {
                write_event_class(f, ec)?;
            }
        }
        Ok(())
    }
}

fn write_clock<W: Write>(f: &mut W, clock: &Clock) -> fmt::Result {
    writeln!(f, "clock {{")?;
    writeln!(f, "{INDENT}name = {};", clock.name())?;
    if let Some(uuid) = clock.uuid() {
        writeln!(f, "{INDENT}uuid = \"{uuid}\";")?;
    }
    if let Some(desc) = clock.description() {
        writeln!(f, "{INDENT}description = \"{}\";", escape(desc))?;
    }
    writeln!(f, "{INDENT}freq = {};", clock.frequency())?;
    writeln!(f, "{INDENT}precision = {};", clock.precision())?;
    writeln!(f, "{INDENT}offset_s = {};", clock.offset_s())?;
    writeln!(f, "{INDENT}offset = {};", clock.offset())?;
    writeln!(
        f,
        "{INDENT}absolute = {};",
        if clock.is_absolute() { "TRUE" } else { "FALSE" }
    )?;
    writeln!(f, "}};\n")
}

fn write_stream_class<W: Write>(f: &mut W, sc: &StreamClass) -> fmt::Result {
    writeln!(f, "stream {{")?;
    if let Some(id) = sc.id() {
        writeln!(f, "{INDENT}id = {id};")?;
    }
    let scopes = [
        ("event.header", Some(sc.event_header_type())),
        ("packet.context", sc.packet_context_type()),
        ("event.context", sc.event_context_type()),
    ];
    for (scope, ty) in scopes {
        if let Some(ty) = ty {
            write!(f, "{INDENT}{scope} := ")?;
            write_type(f, ty, 1)?;
            writeln!(f, ";")?;
        }
    }
    writeln!(f, "}};\n")
}

/// Event class attributes are rendered in store order.
pub fn write_event_class<W: Write>(f: &mut W, ec: &EventClass) -> fmt::Result {
    writeln!(f, "event {{")?;
    write_attributes(f, ec.attributes())?;
    if let Some(ctx) = ec.context_type() {
        write!(f, "{INDENT}context := ")?;
        write_type(f, ctx, 1)?;
        writeln!(f, ";")?;
    }
    write!(f, "{INDENT}fields := ")?;
    write_type(f, ec.payload_type(), 1)?;
    writeln!(f, ";")?;
    writeln!(f, "}};\n")
}

fn write_attributes<W: Write>(f: &mut W, attrs: &Attributes) -> fmt::Result {
    for (name, value) in attrs.iter() {
        match value {
            AttrValue::Integer(v) => writeln!(f, "{INDENT}{name} = {v};")?,
            AttrValue::String(s) => writeln!(f, "{INDENT}{name} = \"{}\";", escape(s))?,
        }
    }
    Ok(())
}

/// Write the declaration of `ty`, without trailing `;`. Nested lines use `indent + 1` tabs.
pub fn write_type<W: Write>(f: &mut W, ty: &FieldType, indent: usize) -> fmt::Result {
    if let Some(int) = ty.as_integer() {
        write!(
            f,
            "integer {{ size = {}; align = {}; signed = {}; encoding = {}; base = {}; byte_order = {};",
            int.size(),
            int.alignment(),
            if int.is_signed() { "true" } else { "false" },
            int.encoding(),
            int.base(),
            int.byte_order()
        )?;
        if let Some(clock) = int.mapped_clock() {
            write!(f, " map = clock.{}.value;", clock.name())?;
        }
        write!(f, " }}")
    } else if let Some(fp) = ty.as_floating_point() {
        write!(
            f,
            "floating_point {{ exp_dig = {}; mant_dig = {}; byte_order = {}; align = {}; }}",
            fp.exponent_digits(),
            fp.mantissa_digits(),
            fp.byte_order(),
            fp.alignment()
        )
    } else if let Some(e) = ty.as_enumeration() {
        write!(f, "enum : ")?;
        write_type(f, e.container(), indent)?;
        writeln!(f, " {{")?;
        for m in e.mappings() {
            writeln!(
                f,
                "{}\"{}\" = {},",
                INDENT.repeat(indent + 1),
                escape(m.label()),
                m.range()
            )?;
        }
        write!(f, "{}}}", INDENT.repeat(indent))
    } else if let Some(s) = ty.as_string() {
        write!(f, "string {{ encoding = {}; }}", s.encoding())
    } else if let Some(st) = ty.as_structure() {
        writeln!(f, "struct {{")?;
        for member in st.fields() {
            write_member(f, member.field_type(), member.name(), indent + 1)?;
            writeln!(f)?;
        }
        write!(f, "{}}} align({})", INDENT.repeat(indent), ty.alignment())
    } else if let Some(v) = ty.as_variant() {
        writeln!(f, "variant <{}> {{", v.tag_field_name())?;
        for opt in v.options() {
            write_member(f, opt.field_type(), opt.name(), indent + 1)?;
            if !opt.ranges().is_empty() {
                let ranges: Vec<String> = opt.ranges().iter().map(ToString::to_string).collect();
                write!(f, " /* {} in {} */", v.tag_field_name(), ranges.join(", "))?;
            }
            writeln!(f)?;
        }
        write!(f, "{}}}", INDENT.repeat(indent))
    } else {
        // Arrays and sequences only exist as named members
        let mut suffix = String::new();
        let element = collect_suffix(ty, &mut suffix);
        write_type(f, element, indent)?;
        write!(f, " {suffix}")
    }
}

/// One member declaration, without the line break.
fn write_member<W: Write>(f: &mut W, ty: &FieldType, name: &str, indent: usize) -> fmt::Result {
    let mut suffix = String::new();
    let element = collect_suffix(ty, &mut suffix);
    write!(f, "{}", INDENT.repeat(indent))?;
    write_type(f, element, indent)?;
    write!(f, " {name}{suffix};")
}

/// Strip arrays and sequences down to their element type, collecting the `[..]` suffixes.
fn collect_suffix<'t>(ty: &'t FieldType, suffix: &mut String) -> &'t FieldType {
    let mut cur = ty;
    loop {
        if let Some(a) = cur.as_array() {
            suffix.push_str(&format!("[{}]", a.length()));
            cur = a.element_type();
        } else if let Some(s) = cur.as_sequence() {
            suffix.push_str(&format!("[{}]", s.length_field_name()));
            cur = s.element_type();
        } else {
            return cur;
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
