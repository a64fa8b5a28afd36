// This module lowers SemanticTypes to LLVM types. Every type has a value form (what lives
// in SSA registers) and a data form (what is stored in memory and written through return
// slots and SoA output pointers); the two only differ for booleans, which are i1 as values
// and i8 in memory. Homogeneous tuples lower to arrays and heterogeneous tuples to
// literal structs; complex numbers lower to a two-float struct. Argument lowering
// flattens composites into their primitive parts. The module also hosts the aggregate
// helpers (extract, insert, undef) that the argument packer, the calling conventions and
// the wrapper synthesizer share, and the value/data conversions applied on every store
// and load.

//! Lowering of semantic types to LLVM types.

use crate::core::error::{CompileError, CompileResult};
use crate::core::types::SemanticType;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{AggregateValueEnum, BasicValueEnum, IntValue};
use inkwell::IntPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Value,
    Data,
}

/// Maps semantic types to their native LLVM representation.
#[derive(Debug, Clone, Copy)]
pub struct DataModel<'ctx> {
    context: &'ctx Context,
}

impl<'ctx> DataModel<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Register representation of `ty`.
    pub fn value_type(&self, ty: &SemanticType) -> CompileResult<BasicTypeEnum<'ctx>> {
        self.lower(ty, Form::Value)
    }

    /// In-memory representation of `ty`.
    pub fn data_type(&self, ty: &SemanticType) -> CompileResult<BasicTypeEnum<'ctx>> {
        self.lower(ty, Form::Data)
    }

    /// Type written through a return slot or output pointer.
    pub fn return_type(&self, ty: &SemanticType) -> CompileResult<BasicTypeEnum<'ctx>> {
        self.data_type(ty)
    }

    /// Primitive parameter types `ty` occupies when passed as an argument.
    pub fn argument_types(&self, ty: &SemanticType) -> CompileResult<Vec<BasicTypeEnum<'ctx>>> {
        let mut parts = Vec::new();
        self.flatten_into(ty, &mut parts)?;
        Ok(parts)
    }

    fn lower(&self, ty: &SemanticType, form: Form) -> CompileResult<BasicTypeEnum<'ctx>> {
        let ctx = self.context;
        let lowered = match ty {
            SemanticType::Boolean => match form {
                Form::Value => ctx.bool_type().as_basic_type_enum(),
                Form::Data => ctx.i8_type().as_basic_type_enum(),
            },
            SemanticType::Integer { bits, .. } => match bits {
                8 => ctx.i8_type().as_basic_type_enum(),
                16 => ctx.i16_type().as_basic_type_enum(),
                32 => ctx.i32_type().as_basic_type_enum(),
                64 => ctx.i64_type().as_basic_type_enum(),
                128 => ctx.i128_type().as_basic_type_enum(),
                _ => return Err(unrepresentable(ty)),
            },
            SemanticType::Float { bits } => match bits {
                16 => ctx.f16_type().as_basic_type_enum(),
                32 => ctx.f32_type().as_basic_type_enum(),
                64 => ctx.f64_type().as_basic_type_enum(),
                _ => return Err(unrepresentable(ty)),
            },
            SemanticType::Complex { .. } => {
                let part = self.complex_part(ty)?;
                ctx.struct_type(&[part, part], false).as_basic_type_enum()
            }
            SemanticType::UniTuple { element, count } => {
                let count = u32::try_from(*count).map_err(|_| unrepresentable(ty))?;
                self.lower(element, form)?.array_type(count).as_basic_type_enum()
            }
            SemanticType::Tuple(elements) => {
                let fields = elements
                    .iter()
                    .map(|e| self.lower(e, form))
                    .collect::<CompileResult<Vec<_>>>()?;
                ctx.struct_type(&fields, false).as_basic_type_enum()
            }
            SemanticType::Opaque(_) => return Err(unrepresentable(ty)),
        };
        Ok(lowered)
    }

    fn complex_part(&self, ty: &SemanticType) -> CompileResult<BasicTypeEnum<'ctx>> {
        match ty {
            SemanticType::Complex { bits: 64 } => Ok(self.context.f32_type().as_basic_type_enum()),
            SemanticType::Complex { bits: 128 } => Ok(self.context.f64_type().as_basic_type_enum()),
            _ => Err(unrepresentable(ty)),
        }
    }

    fn flatten_into(
        &self,
        ty: &SemanticType,
        parts: &mut Vec<BasicTypeEnum<'ctx>>,
    ) -> CompileResult<()> {
        match ty {
            SemanticType::Complex { .. } => {
                let part = self.complex_part(ty)?;
                parts.extend([part, part]);
            }
            SemanticType::UniTuple { .. } | SemanticType::Tuple(_) => {
                for element in ty.tuple_elements().unwrap_or_default() {
                    self.flatten_into(element, parts)?;
                }
            }
            _ => parts.push(self.value_type(ty)?),
        }
        Ok(())
    }

    /// Bytes stored for a scalar `ty`, `None` for tuples and opaque types.
    pub fn store_size(ty: &SemanticType) -> Option<u64> {
        match ty {
            SemanticType::Boolean => Some(1),
            SemanticType::Integer { bits, .. }
            | SemanticType::Float { bits }
            | SemanticType::Complex { bits } => Some(u64::from(*bits).div_ceil(8)),
            _ => None,
        }
    }

    /// Whether value and data forms of `ty` differ.
    pub fn has_distinct_data_form(ty: &SemanticType) -> bool {
        match ty {
            SemanticType::Boolean => true,
            SemanticType::UniTuple { element, .. } => Self::has_distinct_data_form(element),
            SemanticType::Tuple(elements) => elements.iter().any(Self::has_distinct_data_form),
            _ => false,
        }
    }

    /// Convert a value-form `value` of type `ty` to its data form.
    pub fn as_data(
        &self,
        builder: &Builder<'ctx>,
        ty: &SemanticType,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        if !Self::has_distinct_data_form(ty) {
            return Ok(value);
        }
        match ty {
            SemanticType::Boolean => {
                let bit = int_value(value)?;
                Ok(builder
                    .build_int_z_extend(bit, self.context.i8_type(), "")?
                    .into())
            }
            _ => self.convert_elements(builder, ty, value, Form::Data),
        }
    }

    /// Convert a data-form `value` of type `ty` to its value form.
    pub fn from_data(
        &self,
        builder: &Builder<'ctx>,
        ty: &SemanticType,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        if !Self::has_distinct_data_form(ty) {
            return Ok(value);
        }
        match ty {
            SemanticType::Boolean => {
                let byte = int_value(value)?;
                let zero = self.context.i8_type().const_zero();
                Ok(builder
                    .build_int_compare(IntPredicate::NE, byte, zero, "")?
                    .into())
            }
            _ => self.convert_elements(builder, ty, value, Form::Value),
        }
    }

    fn convert_elements(
        &self,
        builder: &Builder<'ctx>,
        ty: &SemanticType,
        value: BasicValueEnum<'ctx>,
        target: Form,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        let mut converted = undef(self.lower(ty, target)?)?;
        for (i, element) in ty.tuple_elements().unwrap_or_default().into_iter().enumerate() {
            let index = i as u32;
            let part = extract_value(builder, value, index)?;
            let part = match target {
                Form::Data => self.as_data(builder, element, part)?,
                Form::Value => self.from_data(builder, element, part)?,
            };
            converted = insert_value(builder, converted, part, index)?;
        }
        Ok(converted)
    }
}

fn unrepresentable(ty: &SemanticType) -> CompileError {
    CompileError::UnrepresentableType { ty: ty.to_string() }
}

fn int_value(value: BasicValueEnum<'_>) -> CompileResult<IntValue<'_>> {
    match value {
        BasicValueEnum::IntValue(v) => Ok(v),
        other => Err(CompileError::InvalidValue {
            reason: format!("expected an integer, found {:?}", other.get_type()),
        }),
    }
}

/// Extract element `index` from a struct or array value.
pub fn extract_value<'ctx>(
    builder: &Builder<'ctx>,
    aggregate: BasicValueEnum<'ctx>,
    index: u32,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let name = format!("extracted.{index}");
    match aggregate {
        BasicValueEnum::StructValue(v) => Ok(builder.build_extract_value(v, index, &name)?),
        BasicValueEnum::ArrayValue(v) => Ok(builder.build_extract_value(v, index, &name)?),
        other => Err(CompileError::InvalidValue {
            reason: format!(
                "cannot extract element {index} from {:?}",
                other.get_type()
            ),
        }),
    }
}

/// Insert `value` at `index` into a struct or array value.
pub fn insert_value<'ctx>(
    builder: &Builder<'ctx>,
    aggregate: BasicValueEnum<'ctx>,
    value: BasicValueEnum<'ctx>,
    index: u32,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let inserted = match aggregate {
        BasicValueEnum::StructValue(v) => builder.build_insert_value(v, value, index, "")?,
        BasicValueEnum::ArrayValue(v) => builder.build_insert_value(v, value, index, "")?,
        other => {
            return Err(CompileError::InvalidValue {
                reason: format!("cannot insert element {index} into {:?}", other.get_type()),
            })
        }
    };
    Ok(match inserted {
        AggregateValueEnum::ArrayValue(v) => v.into(),
        AggregateValueEnum::StructValue(v) => v.into(),
    })
}

/// Undefined value of an aggregate type, the seed for `insert_value` chains.
pub fn undef(ty: BasicTypeEnum<'_>) -> CompileResult<BasicValueEnum<'_>> {
    match ty {
        BasicTypeEnum::StructType(t) => Ok(t.get_undef().into()),
        BasicTypeEnum::ArrayType(t) => Ok(t.get_undef().into()),
        other => Err(CompileError::InvalidValue {
            reason: format!("{other:?} is not an aggregate type"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_lowering() {
        let context = Context::create();
        let model = DataModel::new(&context);

        assert_eq!(
            model.value_type(&SemanticType::int32()).unwrap(),
            context.i32_type().as_basic_type_enum()
        );
        assert_eq!(
            model.value_type(&SemanticType::float64()).unwrap(),
            context.f64_type().as_basic_type_enum()
        );
        assert_eq!(
            model.value_type(&SemanticType::Boolean).unwrap(),
            context.bool_type().as_basic_type_enum()
        );
        assert_eq!(
            model.data_type(&SemanticType::Boolean).unwrap(),
            context.i8_type().as_basic_type_enum()
        );
    }

    #[test]
    fn test_tuple_lowering() {
        let context = Context::create();
        let model = DataModel::new(&context);

        let pair = SemanticType::uni_tuple(SemanticType::int32(), 2);
        assert_eq!(
            model.return_type(&pair).unwrap(),
            context.i32_type().array_type(2).as_basic_type_enum()
        );

        let mixed = SemanticType::Tuple(vec![SemanticType::int32(), SemanticType::Boolean]);
        let expected = context.struct_type(
            &[
                context.i32_type().as_basic_type_enum(),
                context.i8_type().as_basic_type_enum(),
            ],
            false,
        );
        assert_eq!(
            model.data_type(&mixed).unwrap(),
            expected.as_basic_type_enum()
        );
    }

    #[test]
    fn test_argument_flattening() {
        let context = Context::create();
        let model = DataModel::new(&context);
        let f32_ty = context.f32_type().as_basic_type_enum();
        let i64_ty = context.i64_type().as_basic_type_enum();

        assert_eq!(
            model.argument_types(&SemanticType::Complex { bits: 64 }).unwrap(),
            vec![f32_ty, f32_ty]
        );

        let nested = SemanticType::Tuple(vec![
            SemanticType::int(64),
            SemanticType::uni_tuple(SemanticType::float32(), 2),
        ]);
        assert_eq!(
            model.argument_types(&nested).unwrap(),
            vec![i64_ty, f32_ty, f32_ty]
        );
    }

    #[test]
    fn test_unrepresentable_types() {
        let context = Context::create();
        let model = DataModel::new(&context);

        for ty in [
            SemanticType::int(7),
            SemanticType::float(128),
            SemanticType::Complex { bits: 32 },
            SemanticType::Opaque("pyobject".to_string()),
            SemanticType::Tuple(vec![SemanticType::int32(), SemanticType::float(80)]),
        ] {
            let err = model.value_type(&ty).unwrap_err();
            assert!(matches!(err, CompileError::UnrepresentableType { .. }), "{ty}");
        }
    }

    #[test]
    fn test_distinct_data_form() {
        assert!(DataModel::has_distinct_data_form(&SemanticType::Boolean));
        assert!(DataModel::has_distinct_data_form(&SemanticType::Tuple(vec![
            SemanticType::int32(),
            SemanticType::Boolean,
        ])));
        assert!(!DataModel::has_distinct_data_form(&SemanticType::uni_tuple(
            SemanticType::float32(),
            3
        )));
    }
}
