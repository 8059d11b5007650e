//! Field values: runtime instances of [`FieldType`]s.
//!
//! A [`Field`] owns its descendants outright. Structure and array members are
//! materialized eagerly when the field is created; sequence elements are built
//! when the length is bound and variant options when a tag first selects them.

use crate::error::Error;
use crate::field_type::{FieldType, FieldTypeId, FieldTypeKind, IntegerType};
use derive_more::Display;

/// Raw value of an integer or enumeration field, tagged with the signedness of its type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum IntegerValue {
    Signed(i64),
    Unsigned(u64),
}

#[derive(Debug)]
pub(crate) struct VariantValue {
    /// One slot per option, filled the first time the option is selected
    options: Vec<Option<Field>>,
    current: Option<usize>,
    tag: Option<IntegerValue>,
}

#[derive(Debug)]
pub(crate) enum FieldValue {
    Integer(Option<IntegerValue>),
    Enumeration(Option<IntegerValue>),
    FloatingPoint(Option<f64>),
    String(Option<String>),
    Structure(Vec<Field>),
    Array(Vec<Field>),
    /// `None` until a length is bound
    Sequence(Option<Vec<Field>>),
    Variant(VariantValue),
}

#[derive(Debug)]
pub struct Field {
    ty: FieldType,
    frozen: bool,
    value: FieldValue,
}

impl Field {
    /// Instantiate `ty`. The type is frozen as a side effect.
    pub fn create(ty: &FieldType) -> Result<Self, Error> {
        ty.validate()?;
        let field = Self::instantiate(ty)?;
        ty.freeze();
        Ok(field)
    }

    fn instantiate(ty: &FieldType) -> Result<Self, Error> {
        let value = match ty.kind() {
            FieldTypeKind::Integer(_) => FieldValue::Integer(None),
            FieldTypeKind::Enumeration(_) => FieldValue::Enumeration(None),
            FieldTypeKind::FloatingPoint(_) => FieldValue::FloatingPoint(None),
            FieldTypeKind::String(_) => FieldValue::String(None),
            FieldTypeKind::Structure(t) => FieldValue::Structure(instantiate_all(
                t.fields().iter().map(|f| f.field_type()),
                t.len(),
            )?),
            FieldTypeKind::Array(t) => {
                let len = element_count(t.length())?;
                FieldValue::Array(instantiate_all(
                    std::iter::repeat(t.element_type()).take(len),
                    len,
                )?)
            }
            FieldTypeKind::Sequence(_) => FieldValue::Sequence(None),
            FieldTypeKind::Variant(t) => FieldValue::Variant(VariantValue {
                options: t.options().iter().map(|_| None).collect(),
                current: None,
                tag: None,
            }),
        };
        Ok(Self {
            ty: ty.clone(),
            frozen: false,
            value,
        })
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn id(&self) -> FieldTypeId {
        self.ty.id()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Whether every required value in this field tree has been set.
    pub fn is_set(&self) -> bool {
        match &self.value {
            FieldValue::Integer(v) | FieldValue::Enumeration(v) => v.is_some(),
            FieldValue::FloatingPoint(v) => v.is_some(),
            FieldValue::String(v) => v.is_some(),
            FieldValue::Structure(children) | FieldValue::Array(children) => {
                children.iter().all(Field::is_set)
            }
            FieldValue::Sequence(elements) => elements
                .as_ref()
                .map(|e| e.iter().all(Field::is_set))
                .unwrap_or(false),
            FieldValue::Variant(v) => v
                .current
                .and_then(|i| v.options[i].as_ref())
                .map(Field::is_set)
                .unwrap_or(false),
        }
    }

    /// Like [`Field::is_set`], reporting the first unset descendant as an
    /// `UnsetField` error whose path is relative to this field.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.value {
            FieldValue::Structure(children) => {
                let st = self.struct_type();
                for (f, member) in children.iter().zip(st.fields()) {
                    f.validate().map_err(|e| e.within(member.name()))?;
                }
                Ok(())
            }
            FieldValue::Array(children) | FieldValue::Sequence(Some(children)) => {
                for (i, f) in children.iter().enumerate() {
                    f.validate().map_err(|e| e.within(&format!("[{i}]")))?;
                }
                Ok(())
            }
            FieldValue::Variant(v) => {
                let selected = v.current.and_then(|i| v.options[i].as_ref().map(|f| (i, f)));
                match selected {
                    Some((i, f)) => {
                        let name = self
                            .ty
                            .as_variant()
                            .and_then(|t| t.option(i))
                            .map(|o| o.name().to_owned())
                            .unwrap_or_default();
                        f.validate().map_err(|e| e.within(&name))
                    }
                    None => Err(Error::unset("")),
                }
            }
            _ if self.is_set() => Ok(()),
            _ => Err(Error::unset("")),
        }
    }

    /// Clear every value in this tree. Variants keep their materialized
    /// options for reuse; sequences are truncated to zero elements.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.check_mutable()?;
        match &mut self.value {
            FieldValue::Integer(v) | FieldValue::Enumeration(v) => *v = None,
            FieldValue::FloatingPoint(v) => *v = None,
            FieldValue::String(v) => *v = None,
            FieldValue::Structure(children) | FieldValue::Array(children) => {
                for c in children.iter_mut() {
                    c.reset()?;
                }
            }
            FieldValue::Sequence(elements) => *elements = Some(Vec::new()),
            FieldValue::Variant(v) => {
                v.current = None;
                v.tag = None;
            }
        }
        Ok(())
    }

    /// Make this tree read-only. Idempotent.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        match &mut self.value {
            FieldValue::Structure(children)
            | FieldValue::Array(children)
            | FieldValue::Sequence(Some(children)) => {
                children.iter_mut().for_each(Field::freeze);
            }
            FieldValue::Variant(v) => v.options.iter_mut().flatten().for_each(Field::freeze),
            _ => (),
        }
        self.frozen = true;
    }

    /// Deep copy sharing only the (frozen) types. The copy is never frozen.
    pub fn copy(&self) -> Field {
        let value = match &self.value {
            FieldValue::Integer(v) => FieldValue::Integer(*v),
            FieldValue::Enumeration(v) => FieldValue::Enumeration(*v),
            FieldValue::FloatingPoint(v) => FieldValue::FloatingPoint(*v),
            FieldValue::String(v) => FieldValue::String(v.clone()),
            FieldValue::Structure(c) => FieldValue::Structure(c.iter().map(Field::copy).collect()),
            FieldValue::Array(c) => FieldValue::Array(c.iter().map(Field::copy).collect()),
            FieldValue::Sequence(c) => {
                FieldValue::Sequence(c.as_ref().map(|c| c.iter().map(Field::copy).collect()))
            }
            FieldValue::Variant(v) => FieldValue::Variant(VariantValue {
                options: v
                    .options
                    .iter()
                    .map(|o| o.as_ref().map(Field::copy))
                    .collect(),
                current: v.current,
                tag: v.tag,
            }),
        };
        Field {
            ty: self.ty.clone(),
            frozen: false,
            value,
        }
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::AlreadyFrozen("field"))
        } else {
            Ok(())
        }
    }

    fn kind_mismatch(&self, expected: &str) -> Error {
        Error::invalid_argument(format!(
            "Expected {expected} field, not a {} field",
            self.ty.id()
        ))
    }

    fn struct_type(&self) -> &crate::field_type::StructureType {
        self.ty
            .as_structure()
            .unwrap_or_else(|| unreachable!("Structure field with a non-structure type"))
    }

    fn integer_type(&self) -> Result<&IntegerType, Error> {
        self.ty
            .integer_like()
            .ok_or_else(|| self.kind_mismatch("an integer or enumeration"))
    }

    fn integer_slot(&mut self) -> &mut Option<IntegerValue> {
        match &mut self.value {
            FieldValue::Integer(v) | FieldValue::Enumeration(v) => v,
            _ => unreachable!("Integer type with a non-integer value"),
        }
    }

    /// Current value of an integer or enumeration field, regardless of signedness
    pub fn integer_value(&self) -> Option<IntegerValue> {
        match &self.value {
            FieldValue::Integer(v) | FieldValue::Enumeration(v) => *v,
            _ => None,
        }
    }

    pub fn signed_integer_value(&self) -> Result<i64, Error> {
        if !self.integer_type()?.is_signed() {
            return Err(Error::invalid_argument("Field has an unsigned integer type"));
        }
        match self.integer_value() {
            Some(IntegerValue::Signed(v)) => Ok(v),
            _ => Err(Error::unset("")),
        }
    }

    pub fn set_signed_integer_value(&mut self, value: i64) -> Result<(), Error> {
        self.check_mutable()?;
        let int = self.integer_type()?;
        if !int.is_signed() {
            return Err(Error::invalid_argument("Field has an unsigned integer type"));
        }
        if !int.fits_signed(value) {
            return Err(Error::out_of_range(
                value,
                format!("Does not fit a signed {}-bit integer", int.size()),
            ));
        }
        *self.integer_slot() = Some(IntegerValue::Signed(value));
        Ok(())
    }

    pub fn unsigned_integer_value(&self) -> Result<u64, Error> {
        if self.integer_type()?.is_signed() {
            return Err(Error::invalid_argument("Field has a signed integer type"));
        }
        match self.integer_value() {
            Some(IntegerValue::Unsigned(v)) => Ok(v),
            _ => Err(Error::unset("")),
        }
    }

    pub fn set_unsigned_integer_value(&mut self, value: u64) -> Result<(), Error> {
        self.check_mutable()?;
        let int = self.integer_type()?;
        if int.is_signed() {
            return Err(Error::invalid_argument("Field has a signed integer type"));
        }
        if !int.fits_unsigned(value) {
            return Err(Error::out_of_range(
                value,
                format!("Does not fit an unsigned {}-bit integer", int.size()),
            ));
        }
        *self.integer_slot() = Some(IntegerValue::Unsigned(value));
        Ok(())
    }

    /// Labels of the enumeration mappings containing the current value
    pub fn enumeration_labels(&self) -> Result<Vec<&str>, Error> {
        let enum_type = self
            .ty
            .as_enumeration()
            .ok_or_else(|| self.kind_mismatch("an enumeration"))?;
        match self.integer_value() {
            Some(IntegerValue::Signed(v)) => Ok(enum_type.labels_for_signed(v).collect()),
            Some(IntegerValue::Unsigned(v)) => Ok(enum_type.labels_for_unsigned(v).collect()),
            None => Err(Error::unset("")),
        }
    }

    pub fn floating_point_value(&self) -> Result<f64, Error> {
        match &self.value {
            FieldValue::FloatingPoint(Some(v)) => Ok(*v),
            FieldValue::FloatingPoint(None) => Err(Error::unset("")),
            _ => Err(self.kind_mismatch("a floating point")),
        }
    }

    pub fn set_floating_point_value(&mut self, value: f64) -> Result<(), Error> {
        self.check_mutable()?;
        match &mut self.value {
            FieldValue::FloatingPoint(v) => {
                *v = Some(value);
                Ok(())
            }
            _ => Err(self.kind_mismatch("a floating point")),
        }
    }

    pub fn string_value(&self) -> Result<&str, Error> {
        match &self.value {
            FieldValue::String(Some(s)) => Ok(s),
            FieldValue::String(None) => Err(Error::unset("")),
            _ => Err(self.kind_mismatch("a string")),
        }
    }

    fn string_slot(&mut self) -> Result<&mut Option<String>, Error> {
        self.check_mutable()?;
        if self.ty.as_string().is_none() {
            return Err(self.kind_mismatch("a string"));
        }
        match &mut self.value {
            FieldValue::String(s) => Ok(s),
            _ => unreachable!("String type with a non-string value"),
        }
    }

    pub fn set_string_value(&mut self, value: &str) -> Result<(), Error> {
        *self.string_slot()? = Some(value.to_owned());
        Ok(())
    }

    /// Append to the current value. An unset string is treated as empty.
    pub fn append_string(&mut self, value: &str) -> Result<(), Error> {
        self.string_slot()?
            .get_or_insert_with(String::new)
            .push_str(value);
        Ok(())
    }

    /// Append at most `len` bytes of `value`, never splitting a character.
    pub fn append_string_len(&mut self, value: &str, len: usize) -> Result<(), Error> {
        let mut end = len.min(value.len());
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.append_string(&value[..end])
    }

    /// Set the value to the empty string.
    pub fn clear_string(&mut self) -> Result<(), Error> {
        *self.string_slot()? = Some(String::new());
        Ok(())
    }

    fn children(&self) -> Option<&[Field]> {
        match &self.value {
            FieldValue::Structure(c) | FieldValue::Array(c) => Some(c),
            FieldValue::Sequence(c) => Some(c.as_deref().unwrap_or(&[])),
            _ => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut [Field]> {
        match &mut self.value {
            FieldValue::Structure(c) | FieldValue::Array(c) => Some(c),
            FieldValue::Sequence(c) => Some(c.as_deref_mut().unwrap_or(&mut [])),
            _ => None,
        }
    }

    /// Number of members, elements or bound sequence elements
    pub fn field_count(&self) -> Result<usize, Error> {
        self.children()
            .map(<[Field]>::len)
            .ok_or_else(|| self.kind_mismatch("a structure, array or sequence"))
    }

    pub fn field_by_index(&self, index: usize) -> Result<&Field, Error> {
        let children = self
            .children()
            .ok_or_else(|| self.kind_mismatch("a structure, array or sequence"))?;
        let len = children.len();
        children
            .get(index)
            .ok_or_else(|| Error::out_of_range(index, format!("Field has {len} children")))
    }

    pub fn field_by_index_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        let mismatch = self.kind_mismatch("a structure, array or sequence");
        let children = self.children_mut().ok_or(mismatch)?;
        let len = children.len();
        children
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range(index, format!("Field has {len} children")))
    }

    fn member_index(&self, name: &str) -> Result<usize, Error> {
        let st = self
            .ty
            .as_structure()
            .ok_or_else(|| self.kind_mismatch("a structure"))?;
        st.index_of(name)
            .ok_or_else(|| Error::invalid_argument(format!("No member named '{name}'")))
    }

    pub fn field_by_name(&self, name: &str) -> Result<&Field, Error> {
        let i = self.member_index(name)?;
        self.field_by_index(i)
    }

    pub fn field_by_name_mut(&mut self, name: &str) -> Result<&mut Field, Error> {
        let i = self.member_index(name)?;
        self.field_by_index_mut(i)
    }

    /// Replace a structure member. The replacement's type must be equal to
    /// the declared one and it must not be frozen.
    pub fn set_field_by_name(&mut self, name: &str, field: Field) -> Result<(), Error> {
        self.check_mutable()?;
        field.check_insertable()?;
        let i = self.member_index(name)?;
        let declared = self.struct_type().fields()[i].field_type();
        if declared != field.field_type() {
            return Err(Error::invalid_argument(format!(
                "Field type does not match the declared type of member '{name}'"
            )));
        }
        match &mut self.value {
            FieldValue::Structure(children) => children[i] = field,
            _ => unreachable!("Structure type with a non-structure value"),
        }
        Ok(())
    }

    /// A mutable tree never holds frozen descendants.
    pub(crate) fn check_insertable(&self) -> Result<(), Error> {
        if self.frozen {
            Err(Error::invalid_argument(
                "A frozen field cannot be placed into a mutable field tree, copy it first",
            ))
        } else {
            Ok(())
        }
    }

    /// `None` until a length is bound
    pub fn sequence_length(&self) -> Result<Option<u64>, Error> {
        match &self.value {
            FieldValue::Sequence(e) => Ok(e.as_ref().map(|e| e.len() as u64)),
            _ => Err(self.kind_mismatch("a sequence")),
        }
    }

    /// Bind the length, rebuilding `length` fresh unset elements. Prior elements are discarded.
    pub fn set_sequence_length(&mut self, length: u64) -> Result<(), Error> {
        self.check_mutable()?;
        let seq = self
            .ty
            .as_sequence()
            .ok_or_else(|| self.kind_mismatch("a sequence"))?;
        let len = element_count(length)?;
        let elements =
            instantiate_all(std::iter::repeat(seq.element_type()).take(len), len)?;
        match &mut self.value {
            FieldValue::Sequence(e) => *e = Some(elements),
            _ => unreachable!("Sequence type with a non-sequence value"),
        }
        Ok(())
    }

    pub fn set_variant_tag_unsigned(&mut self, tag: u64) -> Result<(), Error> {
        let index = self.variant_option_index(|t| t.option_index_for_unsigned(tag), tag)?;
        self.select_variant_option(index, IntegerValue::Unsigned(tag))
    }

    pub fn set_variant_tag_signed(&mut self, tag: i64) -> Result<(), Error> {
        let index = self.variant_option_index(|t| t.option_index_for_signed(tag), tag)?;
        self.select_variant_option(index, IntegerValue::Signed(tag))
    }

    fn variant_option_index<F, T>(&self, find: F, tag: T) -> Result<usize, Error>
    where
        F: FnOnce(&crate::field_type::VariantType) -> Option<usize>,
        T: std::fmt::Display,
    {
        self.check_mutable()?;
        let variant = self
            .ty
            .as_variant()
            .ok_or_else(|| self.kind_mismatch("a variant"))?;
        find(variant).ok_or_else(|| {
            Error::validation(format!(
                "Tag {tag} does not select any option of the variant tagged by '{}'",
                variant.tag_field_name()
            ))
        })
    }

    fn select_variant_option(&mut self, index: usize, tag: IntegerValue) -> Result<(), Error> {
        let option_type = self
            .ty
            .as_variant()
            .and_then(|t| t.option(index))
            .map(|o| o.field_type().clone())
            .unwrap_or_else(|| unreachable!("Selected option index out of bounds"));
        let v = match &mut self.value {
            FieldValue::Variant(v) => v,
            _ => unreachable!("Variant type with a non-variant value"),
        };
        if v.options[index].is_none() {
            v.options[index] = Some(Field::instantiate(&option_type)?);
        }
        v.current = Some(index);
        v.tag = Some(tag);
        Ok(())
    }

    fn variant_value(&self) -> Result<&VariantValue, Error> {
        match &self.value {
            FieldValue::Variant(v) => Ok(v),
            _ => Err(self.kind_mismatch("a variant")),
        }
    }

    pub fn variant_tag_unsigned(&self) -> Result<u64, Error> {
        match self.variant_value()?.tag {
            Some(IntegerValue::Unsigned(t)) => Ok(t),
            Some(IntegerValue::Signed(t)) => u64::try_from(t)
                .map_err(|_| Error::out_of_range(t, "Tag was selected as a negative value")),
            None => Err(Error::unset("")),
        }
    }

    pub fn variant_tag_signed(&self) -> Result<i64, Error> {
        match self.variant_value()?.tag {
            Some(IntegerValue::Signed(t)) => Ok(t),
            Some(IntegerValue::Unsigned(t)) => i64::try_from(t)
                .map_err(|_| Error::out_of_range(t, "Tag does not fit a signed 64-bit integer")),
            None => Err(Error::unset("")),
        }
    }

    /// Index and name of the selected option
    pub fn variant_current_option(&self) -> Result<Option<(usize, &str)>, Error> {
        let v = self.variant_value()?;
        Ok(v.current.and_then(|i| {
            self.ty
                .as_variant()
                .and_then(|t| t.option(i))
                .map(|o| (i, o.name()))
        }))
    }

    pub fn variant_current_field(&self) -> Result<Option<&Field>, Error> {
        let v = self.variant_value()?;
        Ok(v.current.and_then(|i| v.options[i].as_ref()))
    }

    pub fn variant_current_field_mut(&mut self) -> Result<Option<&mut Field>, Error> {
        let mismatch = self.kind_mismatch("a variant");
        match &mut self.value {
            FieldValue::Variant(v) => Ok(match v.current {
                Some(i) => v.options[i].as_mut(),
                None => None,
            }),
            _ => Err(mismatch),
        }
    }
}

fn element_count(length: u64) -> Result<usize, Error> {
    usize::try_from(length)
        .map_err(|_| Error::AllocationFailure(format!("{length} elements")))
}

fn instantiate_all<'a, I>(types: I, count: usize) -> Result<Vec<Field>, Error>
where
    I: Iterator<Item = &'a FieldType>,
{
    let mut fields = Vec::new();
    fields
        .try_reserve_exact(count)
        .map_err(|e| Error::AllocationFailure(format!("{count} child fields, {e}")))?;
    for ty in types {
        fields.push(Field::instantiate(ty)?);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::IntegerRange;
    use pretty_assertions::assert_eq;

    fn uint(size: u32) -> FieldType {
        FieldType::integer(size).unwrap()
    }

    fn sint(size: u32) -> FieldType {
        FieldType::signed_integer(size).unwrap()
    }

    fn color_enum() -> FieldType {
        let mut e = FieldType::enumeration(&uint(8)).unwrap();
        e.enumeration_add_mapping_unsigned("RED", 0, 0).unwrap();
        e.enumeration_add_mapping_unsigned("GREEN", 1, 1).unwrap();
        e.enumeration_add_mapping_unsigned("WARM", 0, 0).unwrap();
        e
    }

    fn variant_type() -> FieldType {
        let mut v = FieldType::variant("tag").unwrap();
        v.variant_add_option(&uint(8), "small", vec![IntegerRange::unsigned(0, 9).unwrap()])
            .unwrap();
        v.variant_add_option(
            &FieldType::string(),
            "text",
            vec![IntegerRange::unsigned(10, 10).unwrap()],
        )
        .unwrap();
        v
    }

    fn nested_type() -> FieldType {
        let mut inner = FieldType::structure();
        inner.structure_add_field(&sint(32), "a").unwrap();
        inner
            .structure_add_field(&FieldType::array(&uint(8), 2), "arr")
            .unwrap();
        let mut outer = FieldType::structure();
        outer.structure_add_field(&uint(8), "len").unwrap();
        outer.structure_add_field(&inner, "inner").unwrap();
        outer
            .structure_add_field(&FieldType::sequence(&FieldType::string(), "len").unwrap(), "seq")
            .unwrap();
        outer.structure_add_field(&variant_type(), "var").unwrap();
        outer
    }

    fn all_kinds() -> Vec<FieldType> {
        vec![
            uint(8),
            FieldType::floating_point(),
            color_enum(),
            FieldType::string(),
            nested_type(),
            FieldType::array(&uint(8), 3),
            FieldType::sequence(&uint(8), "len").unwrap(),
            variant_type(),
        ]
    }

    #[test]
    fn fresh_fields_are_unset() {
        for ty in all_kinds() {
            let f = Field::create(&ty).unwrap();
            assert!(!f.is_set(), "{} field", ty.id());
            assert!(matches!(f.validate(), Err(Error::UnsetField { .. })));
        }
    }

    #[test]
    fn empty_structure_and_array_are_set() {
        assert!(Field::create(&FieldType::structure()).unwrap().is_set());
        assert!(Field::create(&FieldType::array(&uint(8), 0)).unwrap().is_set());
    }

    #[test]
    fn create_freezes_the_type() {
        let ty = nested_type();
        assert!(!ty.is_frozen());
        let _f = Field::create(&ty).unwrap();
        assert!(ty.is_frozen());
    }

    #[test]
    fn create_refuses_invalid_types() {
        let e = FieldType::enumeration(&uint(8)).unwrap();
        assert!(matches!(
            Field::create(&e),
            Err(Error::ValidationFailure(_))
        ));
        assert!(!e.is_frozen());
    }

    #[test]
    fn integer_bounds() {
        let mut u = Field::create(&uint(8)).unwrap();
        u.set_unsigned_integer_value(255).unwrap();
        assert!(matches!(
            u.set_unsigned_integer_value(256),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(u.unsigned_integer_value(), Ok(255));
        assert!(matches!(
            u.set_signed_integer_value(1),
            Err(Error::InvalidArgument(_))
        ));

        let mut s = Field::create(&sint(8)).unwrap();
        s.set_signed_integer_value(-128).unwrap();
        s.set_signed_integer_value(127).unwrap();
        assert!(matches!(
            s.set_signed_integer_value(128),
            Err(Error::OutOfRange { .. })
        ));
        assert_eq!(s.signed_integer_value(), Ok(127));
        assert!(s.unsigned_integer_value().is_err());

        let mut full = Field::create(&uint(64)).unwrap();
        full.set_unsigned_integer_value(u64::MAX).unwrap();
    }

    #[test]
    fn enumeration_labels() {
        let mut f = Field::create(&color_enum()).unwrap();
        assert_eq!(f.enumeration_labels(), Err(Error::unset("")));
        f.set_unsigned_integer_value(0).unwrap();
        assert_eq!(f.enumeration_labels(), Ok(vec!["RED", "WARM"]));
        f.set_unsigned_integer_value(7).unwrap();
        assert_eq!(f.enumeration_labels(), Ok(vec![]));
        assert!(f.is_set());
    }

    #[test]
    fn strings() {
        let mut f = Field::create(&FieldType::string()).unwrap();
        f.append_string("ab").unwrap();
        f.append_string_len("cdef", 2).unwrap();
        assert_eq!(f.string_value(), Ok("abcd"));
        f.append_string_len("é", 1).unwrap();
        assert_eq!(f.string_value(), Ok("abcd"));
        f.clear_string().unwrap();
        assert_eq!(f.string_value(), Ok(""));
        assert!(f.is_set());
        f.set_string_value("x").unwrap();
        assert_eq!(f.string_value(), Ok("x"));
        assert!(f.set_floating_point_value(1.0).is_err());
    }

    #[test]
    fn structure_access_and_validation_path() {
        let mut f = Field::create(&nested_type()).unwrap();
        assert_eq!(f.field_count(), Ok(4));
        f.field_by_name_mut("len")
            .unwrap()
            .set_unsigned_integer_value(0)
            .unwrap();
        assert_eq!(
            f.validate(),
            Err(Error::UnsetField {
                path: "inner.a".to_owned()
            })
        );
        let inner = f.field_by_name_mut("inner").unwrap();
        inner
            .field_by_name_mut("a")
            .unwrap()
            .set_signed_integer_value(-3)
            .unwrap();
        inner
            .field_by_name_mut("arr")
            .unwrap()
            .field_by_index_mut(0)
            .unwrap()
            .set_unsigned_integer_value(1)
            .unwrap();
        assert_eq!(
            f.validate(),
            Err(Error::UnsetField {
                path: "inner.arr[1]".to_owned()
            })
        );
        assert!(f.field_by_name("nope").is_err());
        assert!(matches!(
            f.field_by_index(4),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn set_field_by_name_checks_type() {
        let mut f = Field::create(&nested_type()).unwrap();
        let mut len = Field::create(&uint(8)).unwrap();
        len.set_unsigned_integer_value(3).unwrap();
        f.set_field_by_name("len", len).unwrap();
        assert_eq!(
            f.field_by_name("len").unwrap().unsigned_integer_value(),
            Ok(3)
        );
        let wrong = Field::create(&uint(16)).unwrap();
        assert!(matches!(
            f.set_field_by_name("len", wrong),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn frozen_member_replacement_is_refused() {
        let mut ty = FieldType::structure();
        ty.structure_add_field(&uint(8), "a").unwrap();
        ty.structure_add_field(&uint(8), "b").unwrap();
        let mut f = Field::create(&ty).unwrap();
        f.field_by_name_mut("a")
            .unwrap()
            .set_unsigned_integer_value(1)
            .unwrap();

        let mut b = Field::create(&uint(8)).unwrap();
        b.set_unsigned_integer_value(2).unwrap();
        b.freeze();
        f.set_field_by_name("b", b.copy()).unwrap();
        assert!(matches!(
            f.set_field_by_name("b", b),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            f.field_by_name("b").unwrap().unsigned_integer_value(),
            Ok(2)
        );
        assert!(!f.field_by_name("b").unwrap().is_frozen());

        f.reset().unwrap();
        assert!(!f.field_by_name("a").unwrap().is_set());
        assert!(!f.field_by_name("b").unwrap().is_set());
    }

    #[test]
    fn sequence_resize_rebuilds_elements() {
        let mut f = Field::create(&FieldType::sequence(&uint(8), "len").unwrap()).unwrap();
        assert_eq!(f.sequence_length(), Ok(None));
        f.set_sequence_length(3).unwrap();
        for i in 0..3 {
            f.field_by_index_mut(i)
                .unwrap()
                .set_unsigned_integer_value(i as u64)
                .unwrap();
        }
        assert!(f.is_set());
        f.set_sequence_length(1).unwrap();
        assert_eq!(f.field_count(), Ok(1));
        assert!(!f.field_by_index(0).unwrap().is_set());

        f.set_sequence_length(0).unwrap();
        assert!(f.is_set());
        f.validate().unwrap();

        f.set_sequence_length(2).unwrap();
        assert!(!f.is_set());
        f.reset().unwrap();
        assert_eq!(f.sequence_length(), Ok(Some(0)));
        assert_eq!(f.field_count(), Ok(0));
        assert!(f.is_set());
        f.validate().unwrap();
    }

    #[test]
    fn variant_selection_reuses_children() {
        let mut f = Field::create(&variant_type()).unwrap();
        assert_eq!(f.variant_current_field().unwrap().map(|_| ()), None);
        assert!(matches!(
            f.set_variant_tag_unsigned(11),
            Err(Error::ValidationFailure(_))
        ));

        f.set_variant_tag_unsigned(3).unwrap();
        f.variant_current_field_mut()
            .unwrap()
            .unwrap()
            .set_unsigned_integer_value(7)
            .unwrap();
        assert!(f.is_set());

        // Another tag within the same option's range keeps the child
        f.set_variant_tag_unsigned(4).unwrap();
        assert_eq!(
            f.variant_current_field()
                .unwrap()
                .unwrap()
                .unsigned_integer_value(),
            Ok(7)
        );
        assert_eq!(f.variant_tag_unsigned(), Ok(4));

        f.set_variant_tag_unsigned(10).unwrap();
        assert_eq!(f.variant_current_option().unwrap(), Some((1, "text")));
        assert_eq!(
            f.validate(),
            Err(Error::UnsetField {
                path: "text".to_owned()
            })
        );

        f.reset().unwrap();
        assert!(!f.is_set());
        f.set_variant_tag_unsigned(0).unwrap();
        assert_eq!(
            f.variant_current_field()
                .unwrap()
                .unwrap()
                .unsigned_integer_value(),
            Ok(7)
        );
    }

    #[test]
    fn copy_is_independent() {
        let mut f = Field::create(&nested_type()).unwrap();
        f.field_by_name_mut("seq")
            .unwrap()
            .set_sequence_length(1)
            .unwrap();
        f.field_by_name_mut("var")
            .unwrap()
            .set_variant_tag_unsigned(1)
            .unwrap();
        f.freeze();

        let mut c = f.copy();
        assert!(!c.is_frozen());
        c.field_by_name_mut("len")
            .unwrap()
            .set_unsigned_integer_value(9)
            .unwrap();
        c.field_by_name_mut("seq")
            .unwrap()
            .field_by_index_mut(0)
            .unwrap()
            .set_string_value("hi")
            .unwrap();
        c.field_by_name_mut("var")
            .unwrap()
            .variant_current_field_mut()
            .unwrap()
            .unwrap()
            .set_unsigned_integer_value(2)
            .unwrap();

        assert!(!f.field_by_name("len").unwrap().is_set());
        assert!(!f
            .field_by_name("seq")
            .unwrap()
            .field_by_index(0)
            .unwrap()
            .is_set());
        assert!(!f
            .field_by_name("var")
            .unwrap()
            .variant_current_field()
            .unwrap()
            .unwrap()
            .is_set());
    }

    #[test]
    fn frozen_fields_reject_mutation() {
        let mut f = Field::create(&nested_type()).unwrap();
        f.field_by_name_mut("var")
            .unwrap()
            .set_variant_tag_unsigned(0)
            .unwrap();
        f.freeze();
        f.freeze();
        assert!(f.is_frozen());
        let frozen = Error::AlreadyFrozen("field");
        assert_eq!(
            f.field_by_name_mut("len")
                .unwrap()
                .set_unsigned_integer_value(1),
            Err(frozen.clone())
        );
        assert_eq!(
            f.field_by_name_mut("seq").unwrap().set_sequence_length(1),
            Err(frozen.clone())
        );
        assert_eq!(
            f.field_by_name_mut("var")
                .unwrap()
                .variant_current_field_mut()
                .unwrap()
                .unwrap()
                .set_unsigned_integer_value(1),
            Err(frozen.clone())
        );
        assert_eq!(
            f.field_by_name_mut("var")
                .unwrap()
                .set_variant_tag_unsigned(10),
            Err(frozen.clone())
        );
        assert_eq!(f.reset(), Err(frozen));

        let mut s = Field::create(&FieldType::string()).unwrap();
        s.freeze();
        assert_eq!(s.append_string("x"), Err(Error::AlreadyFrozen("field")));
        let mut fp = Field::create(&FieldType::floating_point()).unwrap();
        fp.freeze();
        assert_eq!(
            fp.set_floating_point_value(0.5),
            Err(Error::AlreadyFrozen("field"))
        );
    }
}
