// This module moves front-end argument values across native parameter lists. An ArgPacker
// is built from the argument types of one function and knows how each lowers: scalars map
// to one parameter, tuples and complex numbers to the sequence of their primitive parts.
// as_arguments flattens values for a call, from_arguments rebuilds the composite values
// from incoming parameters with insertvalue chains, and assign_names gives the parameters
// stable `arg.<name>` / `arg.<name>.<j>` names.

//! Argument packing between semantic values and flat native parameters.
//!
//! Composite arguments (tuples, complex numbers) travel as their primitive
//! parts in native parameter lists. [`ArgPacker`] flattens semantic values
//! into those parts for a call and rebuilds them from a function's incoming
//! parameters.

use super::data_model::{extract_value, insert_value, undef, DataModel};
use crate::core::error::{CompileError, CompileResult};
use crate::core::types::SemanticType;
use inkwell::builder::Builder;
use inkwell::types::BasicTypeEnum;
use inkwell::values::BasicValueEnum;

/// Packs and unpacks the arguments of one function signature.
pub struct ArgPacker<'ctx> {
    model: DataModel<'ctx>,
    argtypes: Vec<SemanticType>,
    /// Flattened parameter types per semantic argument.
    parts: Vec<Vec<BasicTypeEnum<'ctx>>>,
}

impl<'ctx> ArgPacker<'ctx> {
    pub fn new(model: DataModel<'ctx>, argtypes: &[SemanticType]) -> CompileResult<Self> {
        let parts = argtypes
            .iter()
            .map(|ty| model.argument_types(ty))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(Self {
            model,
            argtypes: argtypes.to_vec(),
            parts,
        })
    }

    /// Native parameter types of all arguments, in order.
    pub fn argument_types(&self) -> Vec<BasicTypeEnum<'ctx>> {
        self.parts.iter().flatten().copied().collect()
    }

    /// Number of native parameters the arguments occupy.
    pub fn native_count(&self) -> usize {
        self.parts.iter().map(Vec::len).sum()
    }

    /// Flatten semantic argument values into native call arguments.
    pub fn as_arguments(
        &self,
        builder: &Builder<'ctx>,
        values: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<Vec<BasicValueEnum<'ctx>>> {
        if values.len() != self.argtypes.len() {
            return Err(CompileError::InvalidValue {
                reason: format!(
                    "expected {} arguments, got {}",
                    self.argtypes.len(),
                    values.len()
                ),
            });
        }
        let mut flat = Vec::with_capacity(self.native_count());
        for (ty, value) in self.argtypes.iter().zip(values) {
            flatten_value(builder, ty, *value, &mut flat)?;
        }
        Ok(flat)
    }

    /// Rebuild semantic argument values from native parameters.
    pub fn from_arguments(
        &self,
        builder: &Builder<'ctx>,
        flat: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<Vec<BasicValueEnum<'ctx>>> {
        if flat.len() != self.native_count() {
            return Err(CompileError::InvalidValue {
                reason: format!(
                    "expected {} native parameters, got {}",
                    self.native_count(),
                    flat.len()
                ),
            });
        }
        let mut remaining = flat.iter().copied();
        self.argtypes
            .iter()
            .map(|ty| self.rebuild_value(builder, ty, &mut remaining))
            .collect()
    }

    /// Name the native parameters after their semantic arguments.
    ///
    /// Single-part arguments become `arg.<name>`, multi-part ones
    /// `arg.<name>.<part>`.
    pub fn assign_names(&self, params: &[BasicValueEnum<'ctx>], names: &[String]) {
        let mut params = params.iter();
        for (parts, name) in self.parts.iter().zip(names) {
            if parts.len() == 1 {
                if let Some(param) = params.next() {
                    param.set_name(&format!("arg.{name}"));
                }
                continue;
            }
            for part in 0..parts.len() {
                if let Some(param) = params.next() {
                    param.set_name(&format!("arg.{name}.{part}"));
                }
            }
        }
    }

    fn rebuild_value(
        &self,
        builder: &Builder<'ctx>,
        ty: &SemanticType,
        remaining: &mut impl Iterator<Item = BasicValueEnum<'ctx>>,
    ) -> CompileResult<BasicValueEnum<'ctx>> {
        match ty {
            SemanticType::Complex { .. } => {
                let mut aggregate = undef(self.model.value_type(ty)?)?;
                for index in 0..2 {
                    let part = next_part(remaining, ty)?;
                    aggregate = insert_value(builder, aggregate, part, index)?;
                }
                Ok(aggregate)
            }
            _ => match ty.tuple_elements() {
                Some(elements) => {
                    let mut aggregate = undef(self.model.value_type(ty)?)?;
                    for (index, element) in elements.into_iter().enumerate() {
                        let part = self.rebuild_value(builder, element, remaining)?;
                        aggregate = insert_value(builder, aggregate, part, index as u32)?;
                    }
                    Ok(aggregate)
                }
                None => next_part(remaining, ty),
            },
        }
    }
}

fn next_part<'ctx>(
    remaining: &mut impl Iterator<Item = BasicValueEnum<'ctx>>,
    ty: &SemanticType,
) -> CompileResult<BasicValueEnum<'ctx>> {
    remaining.next().ok_or_else(|| CompileError::InvalidValue {
        reason: format!("missing native parameter for {ty}"),
    })
}

fn flatten_value<'ctx>(
    builder: &Builder<'ctx>,
    ty: &SemanticType,
    value: BasicValueEnum<'ctx>,
    flat: &mut Vec<BasicValueEnum<'ctx>>,
) -> CompileResult<()> {
    match ty {
        SemanticType::Complex { .. } => {
            flat.push(extract_value(builder, value, 0)?);
            flat.push(extract_value(builder, value, 1)?);
        }
        _ => match ty.tuple_elements() {
            Some(elements) => {
                for (index, element) in elements.into_iter().enumerate() {
                    let part = extract_value(builder, value, index as u32)?;
                    flatten_value(builder, element, part, flat)?;
                }
            }
            None => flat.push(value),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;
    use inkwell::types::{BasicMetadataTypeEnum, BasicType};

    #[test]
    fn test_argument_types_are_flattened_in_order() {
        let context = Context::create();
        let model = DataModel::new(&context);
        let packer = ArgPacker::new(
            model,
            &[
                SemanticType::int32(),
                SemanticType::Complex { bits: 128 },
                SemanticType::Boolean,
            ],
        )
        .unwrap();

        let f64_ty = context.f64_type().as_basic_type_enum();
        assert_eq!(
            packer.argument_types(),
            vec![
                context.i32_type().as_basic_type_enum(),
                f64_ty,
                f64_ty,
                context.bool_type().as_basic_type_enum(),
            ]
        );
        assert_eq!(packer.native_count(), 4);
    }

    #[test]
    fn test_round_trip_through_ir() {
        let context = Context::create();
        let model = DataModel::new(&context);
        let argtypes = [
            SemanticType::uni_tuple(SemanticType::int32(), 2),
            SemanticType::float32(),
        ];
        let packer = ArgPacker::new(model, &argtypes).unwrap();

        let module = context.create_module("packer");
        let params: Vec<BasicMetadataTypeEnum> = packer
            .argument_types()
            .into_iter()
            .map(Into::into)
            .collect();
        let fn_type = context.void_type().fn_type(&params, false);
        let function = module.add_function("take", fn_type, None);
        let builder = context.create_builder();
        builder.position_at_end(context.append_basic_block(function, "entry"));

        let flat = function.get_params();
        packer.assign_names(&flat, &["pair".to_string(), "scale".to_string()]);
        let values = packer.from_arguments(&builder, &flat).unwrap();
        assert_eq!(values.len(), 2);
        assert!(values[0].is_array_value());

        let again = packer.as_arguments(&builder, &values).unwrap();
        assert_eq!(again.len(), 3);
        builder.build_return(None).unwrap();
        assert!(function.verify(false));

        let ir = module.print_to_string().to_string();
        assert!(ir.contains("%arg.pair.0"));
        assert!(ir.contains("%arg.pair.1"));
        assert!(ir.contains("%arg.scale"));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let context = Context::create();
        let packer = ArgPacker::new(DataModel::new(&context), &[SemanticType::int32()]).unwrap();
        let builder = context.create_builder();
        let err = packer.from_arguments(&builder, &[]).unwrap_err();
        assert!(matches!(err, CompileError::InvalidValue { .. }));
    }
}
