//! Field types describe the binary layout of fields.
//!
//! A [`FieldType`] is a cheap, clonable handle onto a shared descriptor. Handles
//! cloned from one another observe the same frozen state, so once a type is
//! frozen (directly, by instantiating a [`crate::field::Field`] from it, or
//! by freezing an ancestor class) every holder sees an immutable type.
//!
//! Mutation of an unfrozen handle is copy-on-write: if the descriptor is
//! shared with other handles, the mutating handle first gets its own copy.
//! A type that something else already references is therefore never changed
//! under its feet.

use crate::clock::Clock;
use crate::error::Error;
use crate::ident::validate_field_reference;
use crate::types::{ByteOrder, DisplayBase, StringEncoding};
use derive_more::Display;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;
use tracing::debug;

pub use kinds::{
    ArrayType, EnumerationMapping, EnumerationType, FloatingPointType, IntegerRange, IntegerType,
    SequenceType, StringType, StructureField, StructureType, VariantOption, VariantType,
    MAX_INTEGER_SIZE,
};

mod kinds;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum FieldTypeId {
    #[display(fmt = "integer")]
    Integer,
    #[display(fmt = "floating point")]
    FloatingPoint,
    #[display(fmt = "enumeration")]
    Enumeration,
    #[display(fmt = "string")]
    String,
    #[display(fmt = "structure")]
    Structure,
    #[display(fmt = "array")]
    Array,
    #[display(fmt = "sequence")]
    Sequence,
    #[display(fmt = "variant")]
    Variant,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum FieldTypeKind {
    Integer(IntegerType),
    FloatingPoint(FloatingPointType),
    Enumeration(EnumerationType),
    String(StringType),
    Structure(StructureType),
    Array(ArrayType),
    Sequence(SequenceType),
    Variant(VariantType),
}

#[derive(Debug)]
struct FieldTypeData {
    frozen: AtomicBool,
    kind: FieldTypeKind,
}

impl Clone for FieldTypeData {
    fn clone(&self) -> Self {
        Self {
            frozen: AtomicBool::new(self.frozen.load(SeqCst)),
            kind: self.kind.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldType(Arc<FieldTypeData>);

/// Deep structural equality, the check used when a caller supplies a field for a declared slot.
impl PartialEq for FieldType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.kind == other.0.kind
    }
}

impl FieldType {
    fn from_kind(kind: FieldTypeKind) -> Self {
        FieldType(Arc::new(FieldTypeData {
            frozen: AtomicBool::new(false),
            kind,
        }))
    }

    /// Unsigned integer of `size` bits
    pub fn integer(size: u32) -> Result<Self, Error> {
        Ok(Self::from_kind(FieldTypeKind::Integer(IntegerType::new(
            size,
        )?)))
    }

    pub fn signed_integer(size: u32) -> Result<Self, Error> {
        let mut int = IntegerType::new(size)?;
        int.signed = true;
        Ok(Self::from_kind(FieldTypeKind::Integer(int)))
    }

    /// IEEE 754 single precision, see the `floating_point_set_*` setters for other layouts
    pub fn floating_point() -> Self {
        Self::from_kind(FieldTypeKind::FloatingPoint(FloatingPointType::default()))
    }

    pub fn enumeration(container: &FieldType) -> Result<Self, Error> {
        if container.as_integer().is_none() {
            return Err(Error::invalid_argument(format!(
                "Enumeration container must be an integer type, not a {}",
                container.id()
            )));
        }
        Ok(Self::from_kind(FieldTypeKind::Enumeration(
            EnumerationType {
                container: container.clone(),
                mappings: Vec::new(),
            },
        )))
    }

    pub fn string() -> Self {
        Self::from_kind(FieldTypeKind::String(StringType::default()))
    }

    pub fn structure() -> Self {
        Self::from_kind(FieldTypeKind::Structure(StructureType::default()))
    }

    pub fn array(element: &FieldType, length: u64) -> Self {
        Self::from_kind(FieldTypeKind::Array(ArrayType {
            element: element.clone(),
            length,
        }))
    }

    /// `length_field_name` refers to an unsigned integer field laid out before the sequence.
    pub fn sequence(element: &FieldType, length_field_name: &str) -> Result<Self, Error> {
        validate_field_reference(length_field_name)?;
        Ok(Self::from_kind(FieldTypeKind::Sequence(SequenceType {
            element: element.clone(),
            length_field_name: length_field_name.to_owned(),
            length_field_path: None,
        })))
    }

    /// `tag_field_name` refers to an integer or enumeration field laid out before the variant.
    pub fn variant(tag_field_name: &str) -> Result<Self, Error> {
        validate_field_reference(tag_field_name)?;
        Ok(Self::from_kind(FieldTypeKind::Variant(VariantType {
            tag_field_name: tag_field_name.to_owned(),
            tag_field_path: None,
            options: Vec::new(),
        })))
    }

    pub fn id(&self) -> FieldTypeId {
        match &self.0.kind {
            FieldTypeKind::Integer(_) => FieldTypeId::Integer,
            FieldTypeKind::FloatingPoint(_) => FieldTypeId::FloatingPoint,
            FieldTypeKind::Enumeration(_) => FieldTypeId::Enumeration,
            FieldTypeKind::String(_) => FieldTypeId::String,
            FieldTypeKind::Structure(_) => FieldTypeId::Structure,
            FieldTypeKind::Array(_) => FieldTypeId::Array,
            FieldTypeKind::Sequence(_) => FieldTypeId::Sequence,
            FieldTypeKind::Variant(_) => FieldTypeId::Variant,
        }
    }

    pub(crate) fn kind(&self) -> &FieldTypeKind {
        &self.0.kind
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.load(SeqCst)
    }

    pub fn is_structure(&self) -> bool {
        matches!(self.0.kind, FieldTypeKind::Structure(_))
    }

    /// Whether two handles refer to the very same descriptor
    pub fn ptr_eq(&self, other: &FieldType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_integer(&self) -> Option<&IntegerType> {
        match &self.0.kind {
            FieldTypeKind::Integer(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_floating_point(&self) -> Option<&FloatingPointType> {
        match &self.0.kind {
            FieldTypeKind::FloatingPoint(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&EnumerationType> {
        match &self.0.kind {
            FieldTypeKind::Enumeration(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringType> {
        match &self.0.kind {
            FieldTypeKind::String(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&StructureType> {
        match &self.0.kind {
            FieldTypeKind::Structure(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match &self.0.kind {
            FieldTypeKind::Array(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceType> {
        match &self.0.kind {
            FieldTypeKind::Sequence(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantType> {
        match &self.0.kind {
            FieldTypeKind::Variant(t) => Some(t),
            _ => None,
        }
    }

    /// Integer view of an integer or of an enumeration's container
    pub fn integer_like(&self) -> Option<&IntegerType> {
        match &self.0.kind {
            FieldTypeKind::Integer(t) => Some(t),
            FieldTypeKind::Enumeration(t) => Some(t.container_integer()),
            _ => None,
        }
    }

    /// Byte order of scalar types, `None` for strings and composites
    pub fn byte_order(&self) -> Option<ByteOrder> {
        match &self.0.kind {
            FieldTypeKind::Integer(t) => Some(t.byte_order),
            FieldTypeKind::FloatingPoint(t) => Some(t.byte_order),
            FieldTypeKind::Enumeration(t) => Some(t.container_integer().byte_order),
            _ => None,
        }
    }

    pub fn alignment(&self) -> u32 {
        match &self.0.kind {
            FieldTypeKind::Integer(t) => t.alignment,
            FieldTypeKind::FloatingPoint(t) => t.alignment,
            FieldTypeKind::Enumeration(t) => t.container_integer().alignment,
            FieldTypeKind::String(_) => 8,
            FieldTypeKind::Structure(t) => t
                .fields
                .iter()
                .map(|f| f.ty.alignment())
                .max()
                .unwrap_or(1),
            FieldTypeKind::Array(t) => t.element.alignment(),
            FieldTypeKind::Sequence(t) => t.element.alignment(),
            FieldTypeKind::Variant(_) => 1,
        }
    }

    fn kind_mut(&mut self) -> Result<&mut FieldTypeKind, Error> {
        if self.is_frozen() {
            return Err(Error::AlreadyFrozen("field type"));
        }
        Ok(&mut Arc::make_mut(&mut self.0).kind)
    }

    fn integer_mut(&mut self) -> Result<&mut IntegerType, Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Integer(t) => Ok(t),
            _ => Err(Error::invalid_argument(format!(
                "Expected an integer type, not a {id}"
            ))),
        }
    }

    fn floating_point_mut(&mut self) -> Result<&mut FloatingPointType, Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::FloatingPoint(t) => Ok(t),
            _ => Err(Error::invalid_argument(format!(
                "Expected a floating point type, not a {id}"
            ))),
        }
    }

    pub fn integer_set_signed(&mut self, signed: bool) -> Result<(), Error> {
        self.integer_mut()?.signed = signed;
        Ok(())
    }

    pub fn integer_set_size(&mut self, size: u32) -> Result<(), Error> {
        self.integer_mut()?.set_size(size)
    }

    pub fn integer_set_base(&mut self, base: DisplayBase) -> Result<(), Error> {
        self.integer_mut()?.base = base;
        Ok(())
    }

    pub fn integer_set_encoding(&mut self, encoding: StringEncoding) -> Result<(), Error> {
        self.integer_mut()?.encoding = encoding;
        Ok(())
    }

    pub fn integer_set_mapped_clock(&mut self, clock: Arc<Clock>) -> Result<(), Error> {
        self.integer_mut()?.mapped_clock = Some(clock);
        Ok(())
    }

    /// Supported layouts are IEEE 754 single (8/24) and double (11/53) precision.
    pub fn floating_point_set_exponent_digits(&mut self, digits: u32) -> Result<(), Error> {
        if digits != 8 && digits != 11 {
            return Err(Error::invalid_argument(format!(
                "Unsupported exponent digit count {digits}"
            )));
        }
        self.floating_point_mut()?.exponent_digits = digits;
        Ok(())
    }

    pub fn floating_point_set_mantissa_digits(&mut self, digits: u32) -> Result<(), Error> {
        if digits != 24 && digits != 53 {
            return Err(Error::invalid_argument(format!(
                "Unsupported mantissa digit count {digits}"
            )));
        }
        self.floating_point_mut()?.mantissa_digits = digits;
        Ok(())
    }

    pub fn string_set_encoding(&mut self, encoding: StringEncoding) -> Result<(), Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::String(t) => {
                t.encoding = encoding;
                Ok(())
            }
            _ => Err(Error::invalid_argument(format!(
                "Expected a string type, not a {id}"
            ))),
        }
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) -> Result<(), Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Integer(t) => t.byte_order = byte_order,
            FieldTypeKind::FloatingPoint(t) => t.byte_order = byte_order,
            FieldTypeKind::Enumeration(t) => t.container.set_byte_order(byte_order)?,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "A {id} type has no byte order"
                )))
            }
        }
        Ok(())
    }

    pub fn set_alignment(&mut self, alignment: u32) -> Result<(), Error> {
        if !alignment.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "Alignment must be a power of two, got {alignment}"
            )));
        }
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Integer(t) => t.alignment = alignment,
            FieldTypeKind::FloatingPoint(t) => t.alignment = alignment,
            _ => {
                return Err(Error::invalid_argument(format!(
                    "Alignment of a {id} type is derived"
                )))
            }
        }
        Ok(())
    }

    pub fn enumeration_add_mapping_unsigned(
        &mut self,
        label: &str,
        lower: u64,
        upper: u64,
    ) -> Result<(), Error> {
        let range = IntegerRange::unsigned(lower, upper)?;
        self.enumeration_add_mapping(label, range)
    }

    pub fn enumeration_add_mapping_signed(
        &mut self,
        label: &str,
        lower: i64,
        upper: i64,
    ) -> Result<(), Error> {
        let range = IntegerRange::signed(lower, upper)?;
        self.enumeration_add_mapping(label, range)
    }

    fn enumeration_add_mapping(&mut self, label: &str, range: IntegerRange) -> Result<(), Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Enumeration(t) => t.add_mapping(label, range),
            _ => Err(Error::invalid_argument(format!(
                "Expected an enumeration type, not a {id}"
            ))),
        }
    }

    pub fn structure_add_field(&mut self, ty: &FieldType, name: &str) -> Result<(), Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Structure(t) => t.add_field(name, ty.clone()),
            _ => Err(Error::invalid_argument(format!(
                "Expected a structure type, not a {id}"
            ))),
        }
    }

    /// Mutable access to a member's type, for ancestors adjusting their own layouts.
    pub(crate) fn structure_field_type_mut(
        &mut self,
        name: &str,
    ) -> Result<Option<&mut FieldType>, Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Structure(t) => Ok(t
                .fields
                .iter_mut()
                .find(|f| f.name == name)
                .map(|f| &mut f.ty)),
            _ => Err(Error::invalid_argument(format!(
                "Expected a structure type, not a {id}"
            ))),
        }
    }

    /// Add an option selected by tag values within `ranges`.
    ///
    /// With no ranges, the option is selected through the enumeration
    /// mapping of the same label once the tag reference is resolved.
    pub fn variant_add_option(
        &mut self,
        ty: &FieldType,
        name: &str,
        ranges: Vec<IntegerRange>,
    ) -> Result<(), Error> {
        let id = self.id();
        match self.kind_mut()? {
            FieldTypeKind::Variant(t) => t.add_option(name, ty.clone(), ranges),
            _ => Err(Error::invalid_argument(format!(
                "Expected a variant type, not a {id}"
            ))),
        }
    }

    pub(crate) fn set_sequence_length_path(
        &mut self,
        path: crate::field_path::FieldPath,
    ) -> Result<(), Error> {
        match self.kind_mut()? {
            FieldTypeKind::Sequence(t) => {
                t.length_field_path = Some(path);
                Ok(())
            }
            _ => unreachable!("Resolved a sequence length for a non-sequence type"),
        }
    }

    pub(crate) fn set_variant_tag_path(
        &mut self,
        path: crate::field_path::FieldPath,
        derived_ranges: Vec<Vec<IntegerRange>>,
    ) -> Result<(), Error> {
        match self.kind_mut()? {
            FieldTypeKind::Variant(t) => {
                t.tag_field_path = Some(path);
                for (opt, ranges) in t.options.iter_mut().zip(derived_ranges) {
                    if opt.ranges.is_empty() {
                        opt.ranges = ranges;
                    }
                }
                Ok(())
            }
            _ => unreachable!("Resolved a variant tag for a non-variant type"),
        }
    }

    /// Child type handles in layout order, used by the generic walkers.
    pub(crate) fn children_mut(&mut self) -> Result<Vec<&mut FieldType>, Error> {
        Ok(match self.kind_mut()? {
            FieldTypeKind::Enumeration(t) => vec![&mut t.container],
            FieldTypeKind::Structure(t) => t.fields.iter_mut().map(|f| &mut f.ty).collect(),
            FieldTypeKind::Array(t) => vec![&mut t.element],
            FieldTypeKind::Sequence(t) => vec![&mut t.element],
            FieldTypeKind::Variant(t) => t.options.iter_mut().map(|o| &mut o.ty).collect(),
            _ => Vec::new(),
        })
    }

    fn children(&self) -> Vec<&FieldType> {
        match &self.0.kind {
            FieldTypeKind::Enumeration(t) => vec![&t.container],
            FieldTypeKind::Structure(t) => t.fields.iter().map(|f| &f.ty).collect(),
            FieldTypeKind::Array(t) => vec![&t.element],
            FieldTypeKind::Sequence(t) => vec![&t.element],
            FieldTypeKind::Variant(t) => t.options.iter().map(|o| &o.ty).collect(),
            _ => Vec::new(),
        }
    }

    /// Make this type and every type reachable from it immutable. Idempotent.
    pub fn freeze(&self) {
        if self.is_frozen() {
            return;
        }
        for child in self.children() {
            child.freeze();
        }
        debug!(kind = %self.id(), "Freezing field type");
        self.0.frozen.store(true, SeqCst);
    }

    /// Deep copy. The copy is unfrozen and shares nothing with the original
    /// except mapped clocks.
    pub fn copy(&self) -> FieldType {
        let kind = match &self.0.kind {
            FieldTypeKind::Integer(t) => FieldTypeKind::Integer(t.clone()),
            FieldTypeKind::FloatingPoint(t) => FieldTypeKind::FloatingPoint(t.clone()),
            FieldTypeKind::String(t) => FieldTypeKind::String(t.clone()),
            FieldTypeKind::Enumeration(t) => FieldTypeKind::Enumeration(EnumerationType {
                container: t.container.copy(),
                mappings: t.mappings.clone(),
            }),
            FieldTypeKind::Structure(t) => FieldTypeKind::Structure(StructureType {
                fields: t
                    .fields
                    .iter()
                    .map(|f| StructureField {
                        name: f.name.clone(),
                        ty: f.ty.copy(),
                    })
                    .collect(),
            }),
            FieldTypeKind::Array(t) => FieldTypeKind::Array(ArrayType {
                element: t.element.copy(),
                length: t.length,
            }),
            FieldTypeKind::Sequence(t) => FieldTypeKind::Sequence(SequenceType {
                element: t.element.copy(),
                length_field_name: t.length_field_name.clone(),
                length_field_path: t.length_field_path.clone(),
            }),
            FieldTypeKind::Variant(t) => FieldTypeKind::Variant(VariantType {
                tag_field_name: t.tag_field_name.clone(),
                tag_field_path: t.tag_field_path.clone(),
                options: t
                    .options
                    .iter()
                    .map(|o| VariantOption {
                        name: o.name.clone(),
                        ty: o.ty.copy(),
                        ranges: o.ranges.clone(),
                    })
                    .collect(),
            }),
        };
        Self::from_kind(kind)
    }

    /// Whether this type or a descendant still has a `Native` byte order.
    pub fn has_native_byte_order(&self) -> bool {
        self.byte_order().map(|b| b.is_native()).unwrap_or(false)
            || self.children().iter().any(|c| c.has_native_byte_order())
    }

    /// Replace every `Native` byte order in this type tree by `byte_order`.
    ///
    /// Frozen descendants that need the change are replaced by unfrozen copies.
    pub fn set_native_byte_order(&mut self, byte_order: ByteOrder) -> Result<(), Error> {
        if byte_order.is_native() {
            return Err(Error::invalid_argument(
                "The native byte order must be little, big or network endian",
            ));
        }
        if !self.has_native_byte_order() {
            return Ok(());
        }
        match self.kind_mut()? {
            FieldTypeKind::Integer(t) => t.byte_order = byte_order,
            FieldTypeKind::FloatingPoint(t) => t.byte_order = byte_order,
            _ => (),
        }
        for child in self.children_mut()? {
            if !child.has_native_byte_order() {
                continue;
            }
            if child.is_frozen() {
                *child = child.copy();
            }
            child.set_native_byte_order(byte_order)?;
        }
        Ok(())
    }

    /// Check the type can be instantiated.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.0.kind {
            FieldTypeKind::Integer(_) | FieldTypeKind::FloatingPoint(_) => Ok(()),
            FieldTypeKind::String(_) => Ok(()),
            FieldTypeKind::Enumeration(t) => {
                if t.mappings.is_empty() {
                    return Err(Error::validation("Enumeration type has no mappings"));
                }
                let container = t.container_integer();
                if let Some(m) = t.mappings.iter().find(|m| !container.fits_range(&m.range)) {
                    return Err(Error::validation(format!(
                        "Enumeration mapping '{}' does not fit its {}-bit container",
                        m.label,
                        container.size()
                    )));
                }
                Ok(())
            }
            FieldTypeKind::Structure(t) => {
                for f in t.fields.iter() {
                    f.ty.validate().map_err(|e| match e {
                        Error::ValidationFailure(msg) => {
                            Error::validation(format!("Member '{}': {msg}", f.name))
                        }
                        e => e,
                    })?;
                }
                Ok(())
            }
            FieldTypeKind::Array(t) => t.element.validate(),
            FieldTypeKind::Sequence(t) => t.element.validate(),
            FieldTypeKind::Variant(t) => {
                if t.options.is_empty() {
                    return Err(Error::validation(format!(
                        "Variant type tagged by '{}' has no options",
                        t.tag_field_name
                    )));
                }
                for o in t.options.iter() {
                    o.ty.validate()?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uint(size: u32) -> FieldType {
        FieldType::integer(size).unwrap()
    }

    #[test]
    fn frozen_type_rejects_structural_changes() {
        let mut s = FieldType::structure();
        s.structure_add_field(&uint(8), "a").unwrap();
        s.freeze();
        assert!(s.is_frozen());
        assert_eq!(
            s.structure_add_field(&uint(8), "b"),
            Err(Error::AlreadyFrozen("field type"))
        );
        let mut i = uint(8);
        i.freeze();
        assert_eq!(
            i.set_byte_order(ByteOrder::BigEndian),
            Err(Error::AlreadyFrozen("field type"))
        );
        assert_eq!(i.integer_set_size(16), Err(Error::AlreadyFrozen("field type")));
    }

    #[test]
    fn freeze_is_transitive_and_visible_through_shared_handles() {
        let member = uint(32);
        let mut s = FieldType::structure();
        s.structure_add_field(&member, "x").unwrap();
        let alias = s.clone();
        s.freeze();
        assert!(alias.is_frozen());
        assert!(member.is_frozen());
    }

    #[test]
    fn mutation_of_a_shared_unfrozen_type_does_not_leak() {
        let mut a = FieldType::structure();
        a.structure_add_field(&uint(8), "x").unwrap();
        let b = a.clone();
        a.structure_add_field(&uint(8), "y").unwrap();
        assert_eq!(a.as_structure().unwrap().len(), 2);
        assert_eq!(b.as_structure().unwrap().len(), 1);
    }

    #[test]
    fn kind_mismatch_is_invalid_argument() {
        let mut s = FieldType::string();
        assert!(matches!(
            s.integer_set_signed(true),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            s.structure_add_field(&uint(8), "x"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FieldType::enumeration(&FieldType::string()).is_err());
        assert!(FieldType::sequence(&uint(8), "").is_err());
    }

    #[test]
    fn structure_member_names() {
        let mut s = FieldType::structure();
        s.structure_add_field(&uint(8), "a").unwrap();
        assert!(s.structure_add_field(&uint(8), "a").is_err());
        assert!(s.structure_add_field(&uint(8), "int").is_err());
        assert!(s.structure_add_field(&uint(8), "1a").is_err());
    }

    #[test]
    fn deep_equality() {
        let mut a = FieldType::structure();
        a.structure_add_field(&uint(8), "x").unwrap();
        let mut b = FieldType::structure();
        b.structure_add_field(&uint(8), "x").unwrap();
        assert_eq!(a, b);
        b.structure_add_field(&FieldType::string(), "s").unwrap();
        assert_ne!(a, b);
        let mut c = FieldType::structure();
        c.structure_add_field(&uint(16), "x").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn copy_is_deep_and_unfrozen() {
        let mut s = FieldType::structure();
        s.structure_add_field(&uint(8), "x").unwrap();
        s.freeze();
        let c = s.copy();
        assert_eq!(c, s);
        assert!(!c.ptr_eq(&s));
        assert!(!c.is_frozen());
        let member = c.as_structure().unwrap().field_type_by_name("x").unwrap();
        assert!(!member.is_frozen());
    }

    #[test]
    fn enumeration_mappings_must_fit() {
        let container = uint(2);
        let mut e = FieldType::enumeration(&container).unwrap();
        assert!(e.validate().is_err());
        e.enumeration_add_mapping_unsigned("A", 0, 1).unwrap();
        e.enumeration_add_mapping_unsigned("B", 2, 3).unwrap();
        assert!(matches!(
            e.enumeration_add_mapping_unsigned("C", 4, 4),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            e.enumeration_add_mapping_signed("D", -1, 0),
            Err(Error::InvalidArgument(_))
        ));
        e.validate().unwrap();
        let labels: Vec<&str> = e.as_enumeration().unwrap().labels_for_unsigned(3).collect();
        assert_eq!(labels, vec!["B"]);
    }

    #[test]
    fn native_byte_order_propagates_into_unset_descendants() {
        let mut be = uint(16);
        be.set_byte_order(ByteOrder::BigEndian).unwrap();
        let frozen_native = uint(32);
        frozen_native.freeze();
        let mut s = FieldType::structure();
        s.structure_add_field(&be, "be").unwrap();
        s.structure_add_field(&frozen_native, "n").unwrap();
        s.structure_add_field(&FieldType::array(&uint(8), 4), "arr")
            .unwrap();
        assert!(s.has_native_byte_order());

        s.set_native_byte_order(ByteOrder::LittleEndian).unwrap();
        assert!(!s.has_native_byte_order());
        let st = s.as_structure().unwrap();
        assert_eq!(
            st.field_type_by_name("be").unwrap().byte_order(),
            Some(ByteOrder::BigEndian)
        );
        assert_eq!(
            st.field_type_by_name("n").unwrap().byte_order(),
            Some(ByteOrder::LittleEndian)
        );
        // The frozen original was replaced, not mutated
        assert_eq!(frozen_native.byte_order(), Some(ByteOrder::Native));
        assert!(s.set_native_byte_order(ByteOrder::Native).is_err());
    }

    #[test]
    fn variant_validation() {
        let mut v = FieldType::variant("tag").unwrap();
        assert!(v.validate().is_err());
        v.variant_add_option(&uint(8), "a", vec![IntegerRange::unsigned(0, 0).unwrap()])
            .unwrap();
        assert!(v
            .variant_add_option(&uint(8), "a", Vec::new())
            .is_err());
        v.validate().unwrap();
        let vt = v.as_variant().unwrap();
        assert_eq!(vt.option_index_for_unsigned(0), Some(0));
        assert_eq!(vt.option_index_for_signed(-1), None);
    }

    #[test]
    fn alignment() {
        let mut s = FieldType::structure();
        assert_eq!(s.alignment(), 1);
        s.structure_add_field(&uint(3), "bits").unwrap();
        s.structure_add_field(&uint(32), "word").unwrap();
        assert_eq!(s.alignment(), 8);
        let mut i = uint(32);
        assert!(i.set_alignment(3).is_err());
        i.set_alignment(32).unwrap();
        assert_eq!(i.alignment(), 32);
    }
}
