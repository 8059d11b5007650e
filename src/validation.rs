//! Joint validation of the types of a trace / stream class / event class chain.
//!
//! Validation never touches the caller's types. Each scope that is not
//! already known to be valid is deep-copied, the copy gets the trace's
//! native byte order and its sequence length and variant tag references
//! resolved to [`FieldPath`]s, and the frozen copies are handed back as the
//! canonical types that events are instantiated from.

use crate::error::Error;
use crate::field_path::{FieldPath, FieldPathItem, Scope};
use crate::field_type::{FieldType, IntegerRange, StructureType};
use crate::types::ByteOrder;
use tracing::debug;

/// Types owned by a stream class, every event has a header
#[derive(Clone, Debug)]
pub struct StreamTypes {
    pub packet_context: Option<FieldType>,
    pub event_header: FieldType,
    pub event_context: Option<FieldType>,
}

/// Types owned by an event class
#[derive(Clone, Debug)]
pub struct EventTypes {
    pub context: Option<FieldType>,
    pub payload: FieldType,
}

#[derive(Debug)]
pub struct ValidationInput<'a> {
    /// `None` when the stream class does not belong to a trace yet, the host byte order is used
    pub native_byte_order: Option<ByteOrder>,
    pub packet_header: Option<&'a FieldType>,
    pub stream: &'a StreamTypes,
    /// The stream types are canonical output of an earlier validation
    pub stream_valid: bool,
    pub event: &'a EventTypes,
    /// The event types are canonical output of an earlier validation
    pub event_valid: bool,
}

#[derive(Clone, Debug)]
pub struct ValidationOutput {
    pub packet_header: Option<FieldType>,
    pub stream: StreamTypes,
    pub event: EventTypes,
}

pub fn validate_class_types(input: ValidationInput<'_>) -> Result<ValidationOutput, Error> {
    let byte_order = input.native_byte_order.unwrap_or_else(ByteOrder::host);
    let mut v = Validator {
        byte_order,
        roots: Vec::new(),
    };

    let packet_header = v.scope(Scope::TracePacketHeader, input.packet_header, false)?;
    let stream = StreamTypes {
        packet_context: v.scope(
            Scope::StreamPacketContext,
            input.stream.packet_context.as_ref(),
            input.stream_valid,
        )?,
        event_header: v.required_scope(
            Scope::StreamEventHeader,
            &input.stream.event_header,
            input.stream_valid,
        )?,
        event_context: v.scope(
            Scope::StreamEventContext,
            input.stream.event_context.as_ref(),
            input.stream_valid,
        )?,
    };
    let context = v.scope(
        Scope::EventContext,
        input.event.context.as_ref(),
        input.event_valid,
    )?;
    let payload = v.required_scope(Scope::EventFields, &input.event.payload, input.event_valid)?;

    debug!(%byte_order, "Validated class types");
    Ok(ValidationOutput {
        packet_header,
        stream,
        event: EventTypes { context, payload },
    })
}

struct Validator {
    byte_order: ByteOrder,
    /// Canonical roots of the scopes validated so far, in layout order
    roots: Vec<(Scope, FieldType)>,
}

impl Validator {
    fn scope(
        &mut self,
        scope: Scope,
        ty: Option<&FieldType>,
        valid: bool,
    ) -> Result<Option<FieldType>, Error> {
        ty.map(|t| self.required_scope(scope, t, valid)).transpose()
    }

    fn required_scope(
        &mut self,
        scope: Scope,
        ty: &FieldType,
        valid: bool,
    ) -> Result<FieldType, Error> {
        if valid {
            self.roots.push((scope, ty.clone()));
            return Ok(ty.clone());
        }
        let canonical = self.canonicalize(scope, ty).map_err(|e| match e {
            Error::ValidationFailure(msg) => Error::validation(format!("Scope {scope}: {msg}")),
            e => e,
        })?;
        self.roots.push((scope, canonical.clone()));
        Ok(canonical)
    }

    fn canonicalize(&self, scope: Scope, ty: &FieldType) -> Result<FieldType, Error> {
        if !ty.is_structure() {
            return Err(Error::validation(format!(
                "Root type must be a structure, not a {}",
                ty.id()
            )));
        }
        ty.validate()?;
        let mut copy = ty.copy();
        copy.set_native_byte_order(self.byte_order)?;

        let fixups = {
            let mut resolver = Resolver {
                scope,
                earlier: &self.roots,
                root: &copy,
                path: Vec::new(),
                enclosing: Vec::new(),
                fixups: Vec::new(),
            };
            resolver.walk(&copy)?;
            resolver.fixups
        };
        for fixup in fixups {
            let node = node_mut(&mut copy, &fixup.node)?;
            match fixup.target {
                Target::SequenceLength(path) => node.set_sequence_length_path(path)?,
                Target::VariantTag(path, ranges) => node.set_variant_tag_path(path, ranges)?,
            }
        }
        copy.freeze();
        Ok(copy)
    }
}

enum Target {
    SequenceLength(FieldPath),
    /// Resolved tag plus, per option, the ranges derived from the tag enumeration
    VariantTag(FieldPath, Vec<Vec<IntegerRange>>),
}

struct Fixup {
    /// Location of the sequence or variant type within its scope root
    node: Vec<FieldPathItem>,
    target: Target,
}

struct Enclosing<'a> {
    /// Length of the path up to and including the structure itself
    depth: usize,
    structure: &'a StructureType,
    member: usize,
}

struct Resolver<'a> {
    scope: Scope,
    earlier: &'a [(Scope, FieldType)],
    root: &'a FieldType,
    path: Vec<FieldPathItem>,
    enclosing: Vec<Enclosing<'a>>,
    fixups: Vec<Fixup>,
}

impl<'a> Resolver<'a> {
    fn walk(&mut self, ty: &'a FieldType) -> Result<(), Error> {
        if let Some(st) = ty.as_structure() {
            let depth = self.path.len();
            for (i, member) in st.fields().iter().enumerate() {
                self.enclosing.push(Enclosing {
                    depth,
                    structure: st,
                    member: i,
                });
                self.path.push(FieldPathItem::Index(i));
                self.walk(member.field_type())
                    .map_err(|e| annotate(e, member.name()))?;
                self.path.pop();
                self.enclosing.pop();
            }
        } else if let Some(arr) = ty.as_array() {
            self.path.push(FieldPathItem::CurrentArrayElement);
            self.walk(arr.element_type())?;
            self.path.pop();
        } else if let Some(seq) = ty.as_sequence() {
            let (path, target) = self.resolve(seq.length_field_name())?;
            match target.as_integer() {
                Some(int) if !int.is_signed() => (),
                _ => {
                    return Err(Error::validation(format!(
                        "Sequence length '{}' must be an unsigned integer, not a {}",
                        seq.length_field_name(),
                        target.id()
                    )))
                }
            }
            self.fixups.push(Fixup {
                node: self.path.clone(),
                target: Target::SequenceLength(path),
            });
            self.path.push(FieldPathItem::CurrentArrayElement);
            self.walk(seq.element_type())?;
            self.path.pop();
        } else if let Some(var) = ty.as_variant() {
            let (path, target) = self.resolve(var.tag_field_name())?;
            if target.integer_like().is_none() {
                return Err(Error::validation(format!(
                    "Variant tag '{}' must be an integer or an enumeration, not a {}",
                    var.tag_field_name(),
                    target.id()
                )));
            }
            let mut derived = Vec::with_capacity(var.options().len());
            for opt in var.options() {
                if !opt.ranges().is_empty() {
                    derived.push(Vec::new());
                    continue;
                }
                let ranges: Vec<IntegerRange> = target
                    .as_enumeration()
                    .map(|e| {
                        e.mappings()
                            .iter()
                            .filter(|m| m.label() == opt.name())
                            .map(|m| m.range())
                            .collect()
                    })
                    .unwrap_or_default();
                if ranges.is_empty() {
                    return Err(Error::validation(format!(
                        "Variant option '{}' is not selected by any value of tag '{}'",
                        opt.name(),
                        var.tag_field_name()
                    )));
                }
                derived.push(ranges);
            }
            self.fixups.push(Fixup {
                node: self.path.clone(),
                target: Target::VariantTag(path, derived),
            });
            for (i, opt) in var.options().iter().enumerate() {
                self.path.push(FieldPathItem::Index(i));
                self.walk(opt.field_type())?;
                self.path.pop();
            }
        }
        Ok(())
    }

    /// Resolve a sequence length or variant tag reference from the current position.
    fn resolve(&self, reference: &str) -> Result<(FieldPath, &'a FieldType), Error> {
        let not_found = || {
            Error::validation(format!(
                "Cannot resolve field reference '{reference}' from {}",
                FieldPath::new(self.scope, self.path.clone())
            ))
        };

        if let Some((scope, rest)) = Scope::strip_prefix(reference) {
            if scope > self.scope {
                return Err(Error::validation(format!(
                    "Field reference '{reference}' targets {scope}, which is laid out after {}",
                    self.scope
                )));
            }
            let root = if scope == self.scope {
                Some(self.root)
            } else {
                self.earlier
                    .iter()
                    .find(|(s, _)| *s == scope)
                    .map(|(_, t)| t)
            };
            return root
                .and_then(|r| lookup(r, rest))
                .map(|(items, ty)| (FieldPath::new(scope, items), ty))
                .ok_or_else(not_found);
        }

        let mut components = reference.splitn(2, '.');
        let first = components.next().unwrap_or(reference);
        let rest = components.next();
        for enc in self.enclosing.iter().rev() {
            let index = match enc.structure.index_of(first) {
                Some(i) if i < enc.member => i,
                _ => continue,
            };
            let member = enc.structure.fields()[index].field_type();
            let (tail, ty) = match rest {
                Some(rest) => match lookup(member, rest) {
                    Some(found) => found,
                    None => continue,
                },
                None => (Vec::new(), member),
            };
            let mut items = self.path[..enc.depth].to_vec();
            items.push(FieldPathItem::Index(index));
            items.extend(tail);
            return Ok((FieldPath::new(self.scope, items), ty));
        }

        self.earlier
            .iter()
            .rev()
            .find_map(|(scope, root)| {
                lookup(root, reference).map(|(items, ty)| (FieldPath::new(*scope, items), ty))
            })
            .ok_or_else(not_found)
    }
}

/// Follow dotted member names through nested structures.
fn lookup<'t>(root: &'t FieldType, reference: &str) -> Option<(Vec<FieldPathItem>, &'t FieldType)> {
    let mut items = Vec::new();
    let mut cur = root;
    for name in reference.split('.') {
        let st = cur.as_structure()?;
        let i = st.index_of(name)?;
        items.push(FieldPathItem::Index(i));
        cur = st.fields()[i].field_type();
    }
    Some((items, cur))
}

fn node_mut<'t>(root: &'t mut FieldType, items: &[FieldPathItem]) -> Result<&'t mut FieldType, Error> {
    let mut cur = root;
    for item in items {
        let index = match item {
            FieldPathItem::Index(i) => *i,
            FieldPathItem::CurrentArrayElement => 0,
        };
        let mut children = cur.children_mut()?;
        if index >= children.len() {
            unreachable!("Collected path does not match the canonical type");
        }
        cur = children.swap_remove(index);
    }
    Ok(cur)
}

fn annotate(e: Error, member: &str) -> Error {
    match e {
        Error::ValidationFailure(msg) if !msg.starts_with("Member") => {
            Error::validation(format!("Member '{member}': {msg}"))
        }
        e => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::FieldTypeId;
    use pretty_assertions::assert_eq;

    fn uint(size: u32) -> FieldType {
        FieldType::integer(size).unwrap()
    }

    fn header() -> FieldType {
        let mut h = FieldType::structure();
        h.structure_add_field(&uint(32), "id").unwrap();
        h.structure_add_field(&uint(64), "timestamp").unwrap();
        h
    }

    fn stream_types() -> StreamTypes {
        StreamTypes {
            packet_context: None,
            event_header: header(),
            event_context: None,
        }
    }

    fn run(payload: FieldType) -> Result<ValidationOutput, Error> {
        let stream = stream_types();
        let event = EventTypes {
            context: None,
            payload,
        };
        validate_class_types(ValidationInput {
            native_byte_order: Some(ByteOrder::BigEndian),
            packet_header: None,
            stream: &stream,
            stream_valid: false,
            event: &event,
            event_valid: false,
        })
    }

    #[test]
    fn sequence_length_resolves_to_preceding_sibling() {
        let mut p = FieldType::structure();
        p.structure_add_field(&uint(8), "len").unwrap();
        p.structure_add_field(&FieldType::sequence(&uint(8), "len").unwrap(), "data")
            .unwrap();
        let out = run(p.clone()).unwrap();

        let canonical = out.event.payload;
        assert!(canonical.is_frozen());
        assert!(!p.is_frozen());
        let seq = canonical
            .as_structure()
            .unwrap()
            .field_type_by_name("data")
            .unwrap();
        assert_eq!(
            seq.as_sequence().unwrap().length_field_path().unwrap(),
            &FieldPath::new(Scope::EventFields, vec![FieldPathItem::Index(0)])
        );
        // The caller's type is left unresolved
        let original = p.as_structure().unwrap().field_type_by_name("data").unwrap();
        assert_eq!(original.as_sequence().unwrap().length_field_path(), None);
    }

    #[test]
    fn native_byte_order_is_applied_to_copies() {
        let mut p = FieldType::structure();
        p.structure_add_field(&uint(8), "x").unwrap();
        let out = run(p.clone()).unwrap();
        let x = out
            .event
            .payload
            .as_structure()
            .unwrap()
            .field_type_by_name("x")
            .unwrap()
            .byte_order();
        assert_eq!(x, Some(ByteOrder::BigEndian));
        assert!(p.has_native_byte_order());
        assert!(!out.stream.event_header.has_native_byte_order());
    }

    #[test]
    fn references_must_precede_and_exist() {
        let mut p = FieldType::structure();
        p.structure_add_field(&FieldType::sequence(&uint(8), "len").unwrap(), "data")
            .unwrap();
        p.structure_add_field(&uint(8), "len").unwrap();
        assert!(matches!(run(p), Err(Error::ValidationFailure(_))));

        let mut p = FieldType::structure();
        p.structure_add_field(&FieldType::signed_integer(8).unwrap(), "len")
            .unwrap();
        p.structure_add_field(&FieldType::sequence(&uint(8), "len").unwrap(), "data")
            .unwrap();
        assert!(matches!(run(p), Err(Error::ValidationFailure(_))));
    }

    #[test]
    fn relative_reference_falls_back_to_earlier_scopes() {
        let mut p = FieldType::structure();
        p.structure_add_field(&FieldType::sequence(&uint(8), "id").unwrap(), "data")
            .unwrap();
        let out = run(p).unwrap();
        let seq = out
            .event
            .payload
            .as_structure()
            .unwrap()
            .field(0)
            .unwrap()
            .field_type()
            .clone();
        assert_eq!(
            seq.as_sequence()
                .unwrap()
                .length_field_path()
                .unwrap()
                .to_string(),
            "stream.event.header[0]"
        );
    }

    #[test]
    fn absolute_reference_and_nested_lookup() {
        let mut inner = FieldType::structure();
        inner.structure_add_field(&uint(16), "n").unwrap();
        let mut p = FieldType::structure();
        p.structure_add_field(&inner, "hdr").unwrap();
        p.structure_add_field(
            &FieldType::sequence(&uint(8), "event.fields.hdr.n").unwrap(),
            "a",
        )
        .unwrap();
        p.structure_add_field(&FieldType::sequence(&uint(8), "hdr.n").unwrap(), "b")
            .unwrap();
        let out = run(p).unwrap();
        let st = out.event.payload.as_structure().unwrap().clone();
        for name in ["a", "b"] {
            let path = st
                .field_type_by_name(name)
                .unwrap()
                .as_sequence()
                .unwrap()
                .length_field_path()
                .unwrap()
                .to_string();
            assert_eq!(path, "event.fields[0][0]");
        }
    }

    #[test]
    fn variant_options_derive_ranges_from_tag_enumeration() {
        let mut tag = FieldType::enumeration(&uint(8)).unwrap();
        tag.enumeration_add_mapping_unsigned("num", 0, 0).unwrap();
        tag.enumeration_add_mapping_unsigned("text", 1, 2).unwrap();
        let mut var = FieldType::variant("tag").unwrap();
        var.variant_add_option(&uint(32), "num", Vec::new()).unwrap();
        var.variant_add_option(&FieldType::string(), "text", Vec::new())
            .unwrap();
        let mut p = FieldType::structure();
        p.structure_add_field(&tag, "tag").unwrap();
        p.structure_add_field(&var, "v").unwrap();

        let out = run(p).unwrap();
        let v = out
            .event
            .payload
            .as_structure()
            .unwrap()
            .field_type_by_name("v")
            .unwrap()
            .clone();
        let vt = v.as_variant().unwrap();
        assert_eq!(vt.option_index_for_unsigned(2), Some(1));
        assert_eq!(vt.option_index_for_unsigned(0), Some(0));
        assert_eq!(vt.tag_field_path().unwrap().to_string(), "event.fields[0]");
        assert_eq!(
            vt.option(0).unwrap().field_type().id(),
            FieldTypeId::Integer
        );
    }

    #[test]
    fn variant_option_without_selecting_value_fails() {
        let mut var = FieldType::variant("tag").unwrap();
        var.variant_add_option(&uint(32), "num", Vec::new()).unwrap();
        let mut p = FieldType::structure();
        p.structure_add_field(&uint(8), "tag").unwrap();
        p.structure_add_field(&var, "v").unwrap();
        assert!(matches!(run(p), Err(Error::ValidationFailure(_))));
    }

    #[test]
    fn non_structure_roots_are_refused() {
        let stream = StreamTypes {
            packet_context: None,
            event_header: uint(8),
            event_context: None,
        };
        let event = EventTypes {
            context: None,
            payload: FieldType::structure(),
        };
        let res = validate_class_types(ValidationInput {
            native_byte_order: None,
            packet_header: None,
            stream: &stream,
            stream_valid: false,
            event: &event,
            event_valid: false,
        });
        assert!(matches!(res, Err(Error::ValidationFailure(_))));
    }
}
