// This module implements the two calling conventions soawrap bridges. The internal
// convention is the one used between front-end compiled functions: the callee receives a
// hidden return slot pointer followed by the flattened arguments, writes its (possibly
// tuple) result through the slot and returns an i32 status code. The structure-of-arrays
// (SoA) convention is the C/C++ facing one: one output pointer per tuple element (or a
// single one for a scalar) followed by the flattened arguments, returning void. Both
// implement the CallingConvention trait (native signature, argument selection and
// decoration, value return). Carrying user exceptions or status codes (StatusConvention)
// and calling through the convention (CallableConvention) are capabilities only the
// internal convention has. The CallConv enum is the runtime-selected closed set; it checks
// ConventionKind::supports before dispatching, so an unsupported operation fails with
// UnsupportedOperation before any IR is emitted.

//! Internal and structure-of-arrays calling conventions.
//!
//! A function under the SoA convention has the C prototype
//!
//! ```text
//! void name(T1 *out0, ..., TN *outN, <flattened arguments>...);
//! ```
//!
//! where `T1..TN` are the data types of the return tuple's elements, or a
//! single `T *out0` for a scalar return.

use super::arg_packer::ArgPacker;
use super::data_model::{extract_value, DataModel};
pub use crate::core::convention::{ConventionKind, Operation};
use crate::core::error::{CompileError, CompileResult};
use crate::core::types::SemanticType;
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::{
    BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue,
};
use inkwell::AddressSpace;

/// Status codes returned by internal-convention functions.
pub mod status {
    pub const OK: i32 = 0;
    pub const ERROR: i32 = -1;
    pub const NONE: i32 = -2;
    pub const STOP_ITERATION: i32 = -3;
    /// First user exception code; exception `n` is reported as `USER_EXCEPTION + n`.
    pub const USER_EXCEPTION: i32 = 1;
}

/// Native parameter and return layout of a function under one convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionSignature<'ctx> {
    pub kind: ConventionKind,
    /// Pointee types of the leading pointer parameters.
    pub outputs: Vec<BasicTypeEnum<'ctx>>,
    /// Flattened argument types following the pointers.
    pub arguments: Vec<BasicTypeEnum<'ctx>>,
    /// Native return type, `None` for void.
    pub ret: Option<BasicTypeEnum<'ctx>>,
}

impl<'ctx> ConventionSignature<'ctx> {
    /// Number of leading pointer parameters.
    pub fn return_arity(&self) -> usize {
        self.outputs.len()
    }

    pub fn param_types(&self, context: &'ctx Context) -> Vec<BasicMetadataTypeEnum<'ctx>> {
        let ptr = context.ptr_type(AddressSpace::default());
        self.outputs
            .iter()
            .map(|_| BasicMetadataTypeEnum::from(ptr))
            .chain(self.arguments.iter().map(|&ty| BasicMetadataTypeEnum::from(ty)))
            .collect()
    }

    pub fn fn_type(&self, context: &'ctx Context) -> FunctionType<'ctx> {
        let params = self.param_types(context);
        match self.ret {
            Some(ret) => ret.fn_type(&params, false),
            None => context.void_type().fn_type(&params, false),
        }
    }
}

/// The parameters after the leading `return_arity` pointers.
///
/// `return_arity` must come from the same signature computation that
/// produced `native_args`.
pub fn select_runtime_arguments<T>(native_args: &[T], return_arity: usize) -> &[T] {
    debug_assert!(
        return_arity <= native_args.len(),
        "return arity {return_arity} exceeds {} native parameters",
        native_args.len()
    );
    &native_args[return_arity..]
}

/// Result of calling an internal-convention function.
#[derive(Debug, Clone, Copy)]
pub struct CallResult<'ctx> {
    pub status: IntValue<'ctx>,
    pub value: BasicValueEnum<'ctx>,
}

/// Operations every convention provides.
pub trait CallingConvention<'ctx> {
    fn kind(&self) -> ConventionKind;

    fn data_model(&self) -> DataModel<'ctx>;

    /// Native layout of a function returning `restype` and taking `argtypes`.
    fn native_signature(
        &self,
        restype: &SemanticType,
        argtypes: &[SemanticType],
    ) -> CompileResult<ConventionSignature<'ctx>>;

    /// Number of leading pointer parameters for `restype`.
    fn return_arity(&self, restype: &SemanticType) -> usize;

    /// LLVM type of the function described by `native_signature`.
    fn function_type(
        &self,
        restype: &SemanticType,
        argtypes: &[SemanticType],
    ) -> CompileResult<FunctionType<'ctx>> {
        let signature = self.native_signature(restype, argtypes)?;
        Ok(signature.fn_type(self.data_model().context()))
    }

    /// The flattened front-end arguments of `func`.
    fn get_arguments(
        &self,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
    ) -> Vec<BasicValueEnum<'ctx>> {
        let params = func.get_params();
        select_runtime_arguments(&params, self.return_arity(restype)).to_vec()
    }

    /// Set parameter names and attributes.
    fn decorate_function(
        &self,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        arg_names: &[String],
    ) -> CompileResult<()>;

    /// Return `value` from `func` at the builder's position.
    fn return_value(
        &self,
        builder: &Builder<'ctx>,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<()>;
}

/// Conventions that can carry a status code out of a function.
pub trait StatusConvention<'ctx>: CallingConvention<'ctx> {
    fn return_user_exc(&self, builder: &Builder<'ctx>, exc_id: u32) -> CompileResult<()>;

    fn return_status_propagate(
        &self,
        builder: &Builder<'ctx>,
        status: IntValue<'ctx>,
    ) -> CompileResult<()>;
}

/// Conventions generated code can call through.
pub trait CallableConvention<'ctx>: CallingConvention<'ctx> {
    fn call_function(
        &self,
        builder: &Builder<'ctx>,
        callee: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        args: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<CallResult<'ctx>>;
}

fn pointer_param<'ctx>(
    func: FunctionValue<'ctx>,
    index: usize,
) -> CompileResult<PointerValue<'ctx>> {
    match func.get_nth_param(index as u32) {
        Some(BasicValueEnum::PointerValue(ptr)) => Ok(ptr),
        other => Err(CompileError::InvalidValue {
            reason: format!("parameter {index} is not a pointer: {other:?}"),
        }),
    }
}

fn enum_attribute(context: &Context, name: &str, value: u64) -> Option<Attribute> {
    let kind = Attribute::get_named_enum_kind_id(name);
    (kind != 0).then(|| context.create_enum_attribute(kind, value))
}

/// The convention between front-end compiled functions.
#[derive(Debug, Clone, Copy)]
pub struct InternalCallConv<'ctx> {
    model: DataModel<'ctx>,
}

impl<'ctx> InternalCallConv<'ctx> {
    pub fn new(model: DataModel<'ctx>) -> Self {
        Self { model }
    }

    fn status_value(&self, code: i32) -> IntValue<'ctx> {
        self.model
            .context()
            .i32_type()
            .const_int(code as u64, true)
    }

    fn alloca_in_entry(
        &self,
        func: FunctionValue<'ctx>,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> CompileResult<PointerValue<'ctx>> {
        let entry = func
            .get_first_basic_block()
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "caller has no entry block".to_string(),
            })?;
        let builder = self.model.context().create_builder();
        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }
        Ok(builder.build_alloca(ty, name)?)
    }
}

impl<'ctx> CallingConvention<'ctx> for InternalCallConv<'ctx> {
    fn kind(&self) -> ConventionKind {
        ConventionKind::Internal
    }

    fn data_model(&self) -> DataModel<'ctx> {
        self.model
    }

    fn native_signature(
        &self,
        restype: &SemanticType,
        argtypes: &[SemanticType],
    ) -> CompileResult<ConventionSignature<'ctx>> {
        let packer = ArgPacker::new(self.model, argtypes)?;
        Ok(ConventionSignature {
            kind: ConventionKind::Internal,
            outputs: vec![self.model.return_type(restype)?],
            arguments: packer.argument_types(),
            ret: Some(self.model.context().i32_type().as_basic_type_enum()),
        })
    }

    fn return_arity(&self, _restype: &SemanticType) -> usize {
        1
    }

    fn decorate_function(
        &self,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        arg_names: &[String],
    ) -> CompileResult<()> {
        pointer_param(func, 0)?.set_name("retptr");
        let packer = ArgPacker::new(self.model, argtypes)?;
        packer.assign_names(&self.get_arguments(func, restype), arg_names);
        Ok(())
    }

    fn return_value(
        &self,
        builder: &Builder<'ctx>,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<()> {
        let retptr = pointer_param(func, 0)?;
        let data = self.model.as_data(builder, restype, value)?;
        builder.build_store(retptr, data)?;
        builder.build_return(Some(&self.status_value(status::OK)))?;
        Ok(())
    }
}

impl<'ctx> StatusConvention<'ctx> for InternalCallConv<'ctx> {
    fn return_user_exc(&self, builder: &Builder<'ctx>, exc_id: u32) -> CompileResult<()> {
        let code = i32::try_from(exc_id)
            .ok()
            .and_then(|id| status::USER_EXCEPTION.checked_add(id))
            .ok_or_else(|| CompileError::InvalidValue {
                reason: format!("exception id {exc_id} does not fit a status code"),
            })?;
        builder.build_return(Some(&self.status_value(code)))?;
        Ok(())
    }

    fn return_status_propagate(
        &self,
        builder: &Builder<'ctx>,
        status: IntValue<'ctx>,
    ) -> CompileResult<()> {
        builder.build_return(Some(&status))?;
        Ok(())
    }
}

impl<'ctx> CallableConvention<'ctx> for InternalCallConv<'ctx> {
    fn call_function(
        &self,
        builder: &Builder<'ctx>,
        callee: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        args: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<CallResult<'ctx>> {
        let caller = builder
            .get_insert_block()
            .and_then(|block| block.get_parent())
            .ok_or_else(|| CompileError::InvalidValue {
                reason: "builder is not positioned inside a function".to_string(),
            })?;

        let retty = self.model.return_type(restype)?;
        let retptr = self.alloca_in_entry(caller, retty, "retptr")?;
        builder.build_store(retptr, retty.const_zero())?;

        let packer = ArgPacker::new(self.model, argtypes)?;
        let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = vec![retptr.into()];
        call_args.extend(
            packer
                .as_arguments(builder, args)?
                .into_iter()
                .map(BasicMetadataValueEnum::from),
        );

        let call = builder.build_call(callee, &call_args, "status")?;
        let status = match call.try_as_basic_value().left() {
            Some(BasicValueEnum::IntValue(code)) => code,
            _ => {
                return Err(CompileError::InvalidValue {
                    reason: "internal callee does not return a status code".to_string(),
                })
            }
        };

        let data = builder.build_load(retty, retptr, "retval")?;
        let value = self.model.from_data(builder, restype, data)?;
        Ok(CallResult { status, value })
    }
}

/// The structure-of-arrays convention.
#[derive(Debug, Clone, Copy)]
pub struct SoaCallConv<'ctx> {
    model: DataModel<'ctx>,
}

impl<'ctx> SoaCallConv<'ctx> {
    pub fn new(model: DataModel<'ctx>) -> Self {
        Self { model }
    }

    fn shape_error(restype: &SemanticType, reason: String) -> CompileError {
        CompileError::UnsupportedReturnShape {
            ty: restype.to_string(),
            reason,
        }
    }

    /// Leaf types written through the output pointers, in order.
    pub fn return_leaves<'t>(&self, restype: &'t SemanticType) -> CompileResult<Vec<&'t SemanticType>> {
        let leaves = restype.tuple_elements().unwrap_or_else(|| vec![restype]);
        if let Some(nested) = leaves.iter().find(|leaf| leaf.is_tuple()) {
            return Err(Self::shape_error(
                restype,
                format!("nested tuple element {nested} cannot be returned through a single pointer"),
            ));
        }
        Ok(leaves)
    }
}

impl<'ctx> CallingConvention<'ctx> for SoaCallConv<'ctx> {
    fn kind(&self) -> ConventionKind {
        ConventionKind::StructureOfArrays
    }

    fn data_model(&self) -> DataModel<'ctx> {
        self.model
    }

    fn native_signature(
        &self,
        restype: &SemanticType,
        argtypes: &[SemanticType],
    ) -> CompileResult<ConventionSignature<'ctx>> {
        let outputs = self
            .return_leaves(restype)?
            .into_iter()
            .map(|leaf| {
                self.model.return_type(leaf).map_err(|err| match err {
                    CompileError::UnrepresentableType { ty } => {
                        Self::shape_error(restype, format!("{ty} has no native representation"))
                    }
                    other => other,
                })
            })
            .collect::<CompileResult<Vec<_>>>()?;
        let packer = ArgPacker::new(self.model, argtypes)?;
        Ok(ConventionSignature {
            kind: ConventionKind::StructureOfArrays,
            outputs,
            arguments: packer.argument_types(),
            ret: None,
        })
    }

    fn return_arity(&self, restype: &SemanticType) -> usize {
        restype.return_arity()
    }

    fn decorate_function(
        &self,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        arg_names: &[String],
    ) -> CompileResult<()> {
        let context = self.model.context();
        let leaves = self.return_leaves(restype)?;
        for (index, leaf) in leaves.iter().enumerate() {
            let out = pointer_param(func, index)?;
            out.set_name(&format!("out.{index}"));

            let loc = AttributeLoc::Param(index as u32);
            let mut attributes = vec![enum_attribute(context, "noalias", 0)];
            if let Some(size) = DataModel::store_size(leaf) {
                attributes.push(enum_attribute(context, "dereferenceable", size));
            }
            for attribute in attributes.into_iter().flatten() {
                func.add_attribute(loc, attribute);
            }
        }

        let packer = ArgPacker::new(self.model, argtypes)?;
        packer.assign_names(&self.get_arguments(func, restype), arg_names);
        Ok(())
    }

    /// Scatter `value` into the output pointers and return void.
    fn return_value(
        &self,
        builder: &Builder<'ctx>,
        func: FunctionValue<'ctx>,
        restype: &SemanticType,
        value: BasicValueEnum<'ctx>,
    ) -> CompileResult<()> {
        match restype.tuple_elements() {
            Some(elements) => {
                for (index, element) in elements.into_iter().enumerate() {
                    let part = extract_value(builder, value, index as u32)?;
                    let data = self.model.as_data(builder, element, part)?;
                    builder.build_store(pointer_param(func, index)?, data)?;
                }
            }
            None => {
                let data = self.model.as_data(builder, restype, value)?;
                builder.build_store(pointer_param(func, 0)?, data)?;
            }
        }
        builder.build_return(None)?;
        Ok(())
    }
}

/// A runtime-selected calling convention.
#[derive(Debug, Clone, Copy)]
pub enum CallConv<'ctx> {
    Internal(InternalCallConv<'ctx>),
    Soa(SoaCallConv<'ctx>),
}

impl<'ctx> CallConv<'ctx> {
    pub fn new(kind: ConventionKind, model: DataModel<'ctx>) -> Self {
        match kind {
            ConventionKind::Internal => Self::Internal(InternalCallConv::new(model)),
            ConventionKind::StructureOfArrays => Self::Soa(SoaCallConv::new(model)),
        }
    }

    pub fn kind(&self) -> ConventionKind {
        self.convention().kind()
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.kind().supports(operation)
    }

    /// The operations every convention provides.
    pub fn convention(&self) -> &dyn CallingConvention<'ctx> {
        match self {
            Self::Internal(cc) => cc,
            Self::Soa(cc) => cc,
        }
    }

    fn status_convention(
        &self,
        operation: Operation,
    ) -> CompileResult<&dyn StatusConvention<'ctx>> {
        self.kind().require(operation)?;
        match self {
            Self::Internal(cc) => Ok(cc),
            Self::Soa(cc) => Err(cc.kind().unsupported(operation)),
        }
    }

    fn callable_convention(&self) -> CompileResult<&dyn CallableConvention<'ctx>> {
        self.kind().require(Operation::CallFunction)?;
        match self {
            Self::Internal(cc) => Ok(cc),
            Self::Soa(cc) => Err(cc.kind().unsupported(Operation::CallFunction)),
        }
    }

    pub fn native_signature(
        &self,
        restype: &SemanticType,
        argtypes: &[SemanticType],
    ) -> CompileResult<ConventionSignature<'ctx>> {
        let signature = self.convention().native_signature(restype, argtypes)?;
        log::debug!(
            "{} signature of {}({}): {} outputs, {} arguments",
            self.kind(),
            restype,
            argtypes.len(),
            signature.outputs.len(),
            signature.arguments.len()
        );
        Ok(signature)
    }

    pub fn return_user_exc(&self, builder: &Builder<'ctx>, exc_id: u32) -> CompileResult<()> {
        self.status_convention(Operation::ReturnUserException)?
            .return_user_exc(builder, exc_id)
    }

    pub fn return_status_propagate(
        &self,
        builder: &Builder<'ctx>,
        status: IntValue<'ctx>,
    ) -> CompileResult<()> {
        self.status_convention(Operation::PropagateStatus)?
            .return_status_propagate(builder, status)
    }

    pub fn call_function(
        &self,
        builder: &Builder<'ctx>,
        callee: FunctionValue<'ctx>,
        restype: &SemanticType,
        argtypes: &[SemanticType],
        args: &[BasicValueEnum<'ctx>],
    ) -> CompileResult<CallResult<'ctx>> {
        self.callable_convention()?
            .call_function(builder, callee, restype, argtypes, args)
    }
}
