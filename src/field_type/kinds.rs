use crate::clock::Clock;
use crate::error::Error;
use crate::field_path::FieldPath;
use crate::field_type::FieldType;
use crate::ident::validate_identifier;
use crate::types::{ByteOrder, DisplayBase, StringEncoding};
use std::fmt;
use std::sync::Arc;

pub const MAX_INTEGER_SIZE: u32 = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct IntegerType {
    pub(crate) size: u32,
    pub(crate) signed: bool,
    pub(crate) byte_order: ByteOrder,
    pub(crate) base: DisplayBase,
    pub(crate) encoding: StringEncoding,
    pub(crate) alignment: u32,
    pub(crate) mapped_clock: Option<Arc<Clock>>,
}

impl IntegerType {
    pub(crate) fn new(size: u32) -> Result<Self, Error> {
        check_integer_size(size)?;
        Ok(Self {
            size,
            signed: false,
            byte_order: ByteOrder::Native,
            base: DisplayBase::Decimal,
            encoding: StringEncoding::None,
            alignment: default_integer_alignment(size),
            mapped_clock: None,
        })
    }

    pub(crate) fn set_size(&mut self, size: u32) -> Result<(), Error> {
        check_integer_size(size)?;
        self.size = size;
        Ok(())
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn base(&self) -> DisplayBase {
        self.base
    }

    pub fn encoding(&self) -> StringEncoding {
        self.encoding
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    pub fn mapped_clock(&self) -> Option<&Arc<Clock>> {
        self.mapped_clock.as_ref()
    }

    pub fn fits_signed(&self, value: i64) -> bool {
        if self.size >= MAX_INTEGER_SIZE {
            return true;
        }
        let min = -(1_i64 << (self.size - 1));
        let max = (1_i64 << (self.size - 1)) - 1;
        (min..=max).contains(&value)
    }

    pub fn fits_unsigned(&self, value: u64) -> bool {
        self.size >= MAX_INTEGER_SIZE || value <= (1_u64 << self.size) - 1
    }

    pub(crate) fn fits_range(&self, range: &IntegerRange) -> bool {
        match range {
            IntegerRange::Unsigned { lower, upper } => {
                !self.signed && self.fits_unsigned(*lower) && self.fits_unsigned(*upper)
            }
            IntegerRange::Signed { lower, upper } => {
                self.signed && self.fits_signed(*lower) && self.fits_signed(*upper)
            }
        }
    }
}

fn check_integer_size(size: u32) -> Result<(), Error> {
    if size == 0 || size > MAX_INTEGER_SIZE {
        Err(Error::invalid_argument(format!(
            "Integer size must be within 1..={MAX_INTEGER_SIZE} bits, got {size}"
        )))
    } else {
        Ok(())
    }
}

fn default_integer_alignment(size: u32) -> u32 {
    if size % 8 == 0 {
        8
    } else {
        1
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatingPointType {
    pub(crate) exponent_digits: u32,
    pub(crate) mantissa_digits: u32,
    pub(crate) byte_order: ByteOrder,
    pub(crate) alignment: u32,
}

impl Default for FloatingPointType {
    /// IEEE 754 single precision
    fn default() -> Self {
        Self {
            exponent_digits: 8,
            mantissa_digits: 24,
            byte_order: ByteOrder::Native,
            alignment: 8,
        }
    }
}

impl FloatingPointType {
    pub fn exponent_digits(&self) -> u32 {
        self.exponent_digits
    }

    pub fn mantissa_digits(&self) -> u32 {
        self.mantissa_digits
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }
}

/// Inclusive range of integer values, used by enumeration mappings and variant options.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IntegerRange {
    Unsigned { lower: u64, upper: u64 },
    Signed { lower: i64, upper: i64 },
}

impl IntegerRange {
    pub fn unsigned(lower: u64, upper: u64) -> Result<Self, Error> {
        if lower > upper {
            return Err(Error::invalid_argument(format!(
                "Range lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        Ok(IntegerRange::Unsigned { lower, upper })
    }

    pub fn signed(lower: i64, upper: i64) -> Result<Self, Error> {
        if lower > upper {
            return Err(Error::invalid_argument(format!(
                "Range lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        Ok(IntegerRange::Signed { lower, upper })
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, IntegerRange::Signed { .. })
    }

    pub fn contains_unsigned(&self, value: u64) -> bool {
        match self {
            IntegerRange::Unsigned { lower, upper } => (*lower..=*upper).contains(&value),
            IntegerRange::Signed { lower, upper } => i64::try_from(value)
                .map(|v| (*lower..=*upper).contains(&v))
                .unwrap_or(false),
        }
    }

    pub fn contains_signed(&self, value: i64) -> bool {
        match self {
            IntegerRange::Signed { lower, upper } => (*lower..=*upper).contains(&value),
            IntegerRange::Unsigned { lower, upper } => u64::try_from(value)
                .map(|v| (*lower..=*upper).contains(&v))
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for IntegerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegerRange::Unsigned { lower, upper } if lower == upper => write!(f, "{lower}"),
            IntegerRange::Unsigned { lower, upper } => write!(f, "{lower} ... {upper}"),
            IntegerRange::Signed { lower, upper } if lower == upper => write!(f, "{lower}"),
            IntegerRange::Signed { lower, upper } => write!(f, "{lower} ... {upper}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumerationMapping {
    pub(crate) label: String,
    pub(crate) range: IntegerRange,
}

impl EnumerationMapping {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn range(&self) -> IntegerRange {
        self.range
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumerationType {
    pub(crate) container: FieldType,
    pub(crate) mappings: Vec<EnumerationMapping>,
}

impl EnumerationType {
    pub fn container(&self) -> &FieldType {
        &self.container
    }

    /// The container is checked to be an integer type when the enumeration is built.
    pub fn container_integer(&self) -> &IntegerType {
        self.container
            .as_integer()
            .unwrap_or_else(|| unreachable!("Enumeration container is not an integer type"))
    }

    pub fn mappings(&self) -> &[EnumerationMapping] {
        &self.mappings
    }

    pub fn labels_for_unsigned(&self, value: u64) -> impl Iterator<Item = &str> + '_ {
        self.mappings
            .iter()
            .filter(move |m| m.range.contains_unsigned(value))
            .map(|m| m.label.as_str())
    }

    pub fn labels_for_signed(&self, value: i64) -> impl Iterator<Item = &str> + '_ {
        self.mappings
            .iter()
            .filter(move |m| m.range.contains_signed(value))
            .map(|m| m.label.as_str())
    }

    pub(crate) fn add_mapping(&mut self, label: &str, range: IntegerRange) -> Result<(), Error> {
        if label.is_empty() {
            return Err(Error::invalid_argument("Enumeration label cannot be empty"));
        }
        let container = self.container_integer();
        if range.is_signed() != container.is_signed() {
            return Err(Error::invalid_argument(format!(
                "Mapping '{label}' signedness does not match the container type"
            )));
        }
        if !container.fits_range(&range) {
            return Err(Error::out_of_range(
                range,
                format!(
                    "Mapping '{label}' does not fit a {}-bit container",
                    container.size()
                ),
            ));
        }
        self.mappings.push(EnumerationMapping {
            label: label.to_owned(),
            range,
        });
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StringType {
    pub(crate) encoding: StringEncoding,
}

impl StringType {
    pub fn encoding(&self) -> StringEncoding {
        self.encoding
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructureField {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
}

impl StructureField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct StructureType {
    pub(crate) fields: Vec<StructureField>,
}

impl StructureType {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[StructureField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&StructureField> {
        self.fields.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_type_by_name(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }

    pub(crate) fn add_field(&mut self, name: &str, ty: FieldType) -> Result<(), Error> {
        validate_identifier(name)?;
        if self.index_of(name).is_some() {
            return Err(Error::invalid_argument(format!(
                "Structure already has a field named '{name}'"
            )));
        }
        self.fields.push(StructureField {
            name: name.to_owned(),
            ty,
        });
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrayType {
    pub(crate) element: FieldType,
    pub(crate) length: u64,
}

impl ArrayType {
    pub fn element_type(&self) -> &FieldType {
        &self.element
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

#[derive(Clone, Debug)]
pub struct SequenceType {
    pub(crate) element: FieldType,
    pub(crate) length_field_name: String,
    pub(crate) length_field_path: Option<FieldPath>,
}

impl SequenceType {
    pub fn element_type(&self) -> &FieldType {
        &self.element
    }

    pub fn length_field_name(&self) -> &str {
        &self.length_field_name
    }

    /// Only present on canonical types, see [`crate::validation`]
    pub fn length_field_path(&self) -> Option<&FieldPath> {
        self.length_field_path.as_ref()
    }
}

/// The resolved path is derived data, it does not take part in equality.
impl PartialEq for SequenceType {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element && self.length_field_name == other.length_field_name
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariantOption {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) ranges: Vec<IntegerRange>,
}

impl VariantOption {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    /// Tag values selecting this option. Empty until canonicalization when
    /// the option is selected by an enumeration label of the same name.
    pub fn ranges(&self) -> &[IntegerRange] {
        &self.ranges
    }
}

#[derive(Clone, Debug)]
pub struct VariantType {
    pub(crate) tag_field_name: String,
    pub(crate) tag_field_path: Option<FieldPath>,
    pub(crate) options: Vec<VariantOption>,
}

impl VariantType {
    pub fn tag_field_name(&self) -> &str {
        &self.tag_field_name
    }

    pub fn tag_field_path(&self) -> Option<&FieldPath> {
        self.tag_field_path.as_ref()
    }

    pub fn options(&self) -> &[VariantOption] {
        &self.options
    }

    pub fn option(&self, index: usize) -> Option<&VariantOption> {
        self.options.get(index)
    }

    pub fn option_index_for_unsigned(&self, tag: u64) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.ranges.iter().any(|r| r.contains_unsigned(tag)))
    }

    pub fn option_index_for_signed(&self, tag: i64) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.ranges.iter().any(|r| r.contains_signed(tag)))
    }

    pub(crate) fn add_option(
        &mut self,
        name: &str,
        ty: FieldType,
        ranges: Vec<IntegerRange>,
    ) -> Result<(), Error> {
        validate_identifier(name)?;
        if self.options.iter().any(|o| o.name == name) {
            return Err(Error::invalid_argument(format!(
                "Variant already has an option named '{name}'"
            )));
        }
        self.options.push(VariantOption {
            name: name.to_owned(),
            ty,
            ranges,
        });
        Ok(())
    }
}

impl PartialEq for VariantType {
    fn eq(&self, other: &Self) -> bool {
        self.tag_field_name == other.tag_field_name && self.options == other.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bounds() {
        let mut u8_t = IntegerType::new(8).unwrap();
        assert!(u8_t.fits_unsigned(255));
        assert!(!u8_t.fits_unsigned(256));
        u8_t.signed = true;
        assert!(u8_t.fits_signed(-128));
        assert!(u8_t.fits_signed(127));
        assert!(!u8_t.fits_signed(128));
        assert!(!u8_t.fits_signed(-129));

        let u64_t = IntegerType::new(64).unwrap();
        assert!(u64_t.fits_unsigned(u64::MAX));
        assert!(IntegerType::new(0).is_err());
        assert!(IntegerType::new(65).is_err());
        assert_eq!(IntegerType::new(5).unwrap().alignment(), 1);
    }

    #[test]
    fn range_membership_across_signedness() {
        let r = IntegerRange::signed(-2, 5).unwrap();
        assert!(r.contains_unsigned(5));
        assert!(!r.contains_unsigned(u64::MAX));
        assert!(r.contains_signed(-2));
        let u = IntegerRange::unsigned(0, 3).unwrap();
        assert!(!u.contains_signed(-1));
        assert!(u.contains_signed(3));
        assert!(IntegerRange::unsigned(4, 3).is_err());
        assert_eq!(u.to_string(), "0 ... 3");
        assert_eq!(IntegerRange::signed(-1, -1).unwrap().to_string(), "-1");
    }
}
