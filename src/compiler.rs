// This module is the compilation orchestrator. compile_function is the front-end: it
// creates the internal-convention definition of a function from a typed signature and a
// body closure that emits IR from the already unpacked argument values, then finalizes it
// in its own library. load_function_ir does the same for textual IR that already follows
// the internal convention. compile_asm_soa turns a compiled function into target assembly,
// either wrapped in a structure-of-arrays entry point or unchanged. Every entry point takes
// the CompilationSession, so all code generation happens under the compiler lock.

//! Function compilation and assembly output.

use crate::core::descriptor::FunctionDescriptor;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::core::types::{SemanticType, Signature};
use crate::llvm::arg_packer::ArgPacker;
use crate::llvm::calling_convention::{CallConv, ConventionKind};
use crate::llvm::codegen::{CodeLibrary, Codegen};
use crate::llvm::wrapper::soa_wrap_function;
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::types::AnyType;
use inkwell::values::{BasicValueEnum, FunctionValue};

/// Calling convention of the emitted entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    /// Wrap in a structure-of-arrays entry point.
    #[default]
    Soa,
    /// Emit the internal-convention library unchanged.
    Internal,
}

/// A finalized library together with the function it defines.
pub struct CompiledFunction<'a, 'ctx> {
    pub library: CodeLibrary<'a, 'ctx>,
    pub fndesc: FunctionDescriptor,
}

impl<'a, 'ctx> CompiledFunction<'a, 'ctx> {
    pub fn restype(&self) -> &SemanticType {
        self.fndesc.restype()
    }
}

/// Assembly text of a compiled entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledAsm {
    pub asm: String,
    pub restype: SemanticType,
}

/// State handed to a function body while it is emitted.
pub struct FunctionBody<'b, 'ctx> {
    context: &'ctx Context,
    builder: &'b Builder<'ctx>,
    function: FunctionValue<'ctx>,
    args: Vec<BasicValueEnum<'ctx>>,
    convention: &'b CallConv<'ctx>,
}

impl<'b, 'ctx> FunctionBody<'b, 'ctx> {
    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// Builder positioned in the function, in the entry block at first.
    pub fn builder(&self) -> &'b Builder<'ctx> {
        self.builder
    }

    pub fn function(&self) -> FunctionValue<'ctx> {
        self.function
    }

    /// Argument values in value form, composites already rebuilt.
    pub fn args(&self) -> &[BasicValueEnum<'ctx>] {
        &self.args
    }

    pub fn append_block(&self, name: &str) -> BasicBlock<'ctx> {
        self.context.append_basic_block(self.function, name)
    }

    /// Terminate the current block by raising user exception `exc_id`.
    pub fn raise_user_exc(&self, exc_id: u32) -> CompileResult<()> {
        self.convention.return_user_exc(self.builder, exc_id)
    }
}

/// Compile `body` as the internal-convention function `name`.
///
/// `body` emits IR at the builder position and returns the value-form
/// result, which is stored through the return slot with status OK.
pub fn compile_function<'a, 'ctx, F>(
    session: &CompilationSession<'_>,
    codegen: &'a Codegen<'ctx>,
    name: &str,
    signature: Signature,
    arg_names: &[String],
    body: F,
) -> CompileResult<CompiledFunction<'a, 'ctx>>
where
    F: FnOnce(&FunctionBody<'_, 'ctx>) -> CompileResult<BasicValueEnum<'ctx>>,
{
    let fndesc = FunctionDescriptor::new(name, signature, arg_names)?;
    let context = codegen.context();
    let model = codegen.data_model();
    let internal = CallConv::new(ConventionKind::Internal, model);
    let restype = fndesc.restype();
    let argtypes = fndesc.argtypes();

    let native = internal.native_signature(restype, argtypes)?;
    let module = codegen.create_module(name);
    let function = module.add_function(fndesc.llvm_func_name(), native.fn_type(context), None);
    internal
        .convention()
        .decorate_function(function, restype, argtypes, fndesc.arg_names())?;

    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(function, "entry"));
    let packer = ArgPacker::new(model, argtypes)?;
    let args = packer.from_arguments(&builder, &internal.convention().get_arguments(function, restype))?;

    let value = body(&FunctionBody {
        context,
        builder: &builder,
        function,
        args,
        convention: &internal,
    })?;
    internal
        .convention()
        .return_value(&builder, function, restype, value)?;

    let mut library = codegen.create_library(name, fndesc.llvm_func_name());
    library.add_ir_module(module)?;
    library.finalize(session)?;

    session.record_function_compiled(name);
    log::info!("compiled {name} as {}", fndesc.llvm_func_name());
    Ok(CompiledFunction { library, fndesc })
}

/// Load textual IR defining `name` under the internal convention.
///
/// The function is looked up by `symbol`, or by the mangled internal
/// symbol when none is given, and must have the internal-convention type
/// of `signature`.
pub fn load_function_ir<'a, 'ctx>(
    session: &CompilationSession<'_>,
    codegen: &'a Codegen<'ctx>,
    name: &str,
    signature: Signature,
    ir: &str,
    symbol: Option<&str>,
) -> CompileResult<CompiledFunction<'a, 'ctx>> {
    let mut fndesc = FunctionDescriptor::new(name, signature, &[])?;
    if let Some(symbol) = symbol {
        fndesc = fndesc.with_llvm_name(symbol);
    }

    let module = codegen.parse_ir(name, ir)?;
    let function = module
        .get_function(fndesc.llvm_func_name())
        .filter(|f| f.count_basic_blocks() > 0)
        .ok_or_else(|| CompileError::FunctionNotFound {
            name: fndesc.llvm_func_name().to_string(),
        })?;

    let internal = CallConv::new(ConventionKind::Internal, codegen.data_model());
    let expected = internal
        .convention()
        .function_type(fndesc.restype(), fndesc.argtypes())?;
    if function.get_type() != expected {
        return Err(CompileError::InvalidSignature {
            input: fndesc.signature().to_string(),
            reason: format!(
                "{} has type {}, expected {}",
                fndesc.llvm_func_name(),
                function.get_type().print_to_string().to_string(),
                expected.print_to_string().to_string()
            ),
        });
    }

    let mut library = codegen.create_library(name, fndesc.llvm_func_name());
    library.add_ir_module(module)?;
    library.finalize(session)?;

    session.record_function_compiled(name);
    log::info!("loaded {name} from IR as {}", fndesc.llvm_func_name());
    Ok(CompiledFunction { library, fndesc })
}

/// Assembly of `compiled` under the requested `output` convention.
pub fn compile_asm_soa(
    session: &CompilationSession<'_>,
    compiled: &CompiledFunction<'_, '_>,
    output: Output,
) -> CompileResult<CompiledAsm> {
    let asm = match output {
        Output::Soa => soa_wrap_function(session, &compiled.library, &compiled.fndesc)?.get_asm_str()?,
        Output::Internal => compiled.library.get_asm_str()?,
    };
    session.record_asm_emitted(asm.len());
    Ok(CompiledAsm {
        asm,
        restype: compiled.restype().clone(),
    })
}

/// Linked IR of `compiled` under the requested `output` convention.
pub fn compile_llvm_soa(
    session: &CompilationSession<'_>,
    compiled: &CompiledFunction<'_, '_>,
    output: Output,
) -> CompileResult<String> {
    match output {
        Output::Soa => soa_wrap_function(session, &compiled.library, &compiled.fndesc)?.get_llvm_str(),
        Output::Internal => compiled.library.get_llvm_str(),
    }
}
