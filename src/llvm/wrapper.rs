// This module synthesizes structure-of-arrays entry points. Given a finalized library that
// defines a function under the internal convention, soa_wrap_function builds a second
// library, named after the first with a `_function_` suffix, that links against the
// original without owning it. Its single module declares the internal function by symbol
// and defines the wrapper, named after the original library, with the SoA signature. The
// wrapper rebuilds composite arguments from its flattened parameters, calls the internal
// function through the internal convention, drops the returned status and scatters the
// result into the output pointers before returning void. The new library is finalized
// before it is returned; on any failure the partially built library is dropped.

//! Structure-of-arrays wrapper synthesis.

use super::arg_packer::ArgPacker;
use super::calling_convention::{CallConv, ConventionKind};
use super::codegen::{CodeLibrary, Codegen};
use crate::core::descriptor::FunctionDescriptor;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use inkwell::module::{Linkage, Module};

/// Name of the module holding the wrapper function.
pub const WRAPPER_MODULE_NAME: &str = "soa.wrapper";

/// Name of the library a wrapper of `library_name` is built in.
pub fn wrapper_library_name(library_name: &str) -> String {
    format!("{library_name}_function_")
}

/// Wrap the function `fndesc` of the finalized `library` in an SoA entry point.
///
/// The returned library is finalized, its entry point is named after
/// `library` and it borrows `library` for the code of the wrapped function.
pub fn soa_wrap_function<'a, 'ctx>(
    session: &CompilationSession<'_>,
    library: &'a CodeLibrary<'a, 'ctx>,
    fndesc: &FunctionDescriptor,
) -> CompileResult<CodeLibrary<'a, 'ctx>> {
    let codegen = library.codegen();
    let entry_name = library.name();
    let internal_symbol = fndesc.llvm_func_name();
    if internal_symbol == entry_name {
        return Err(CompileError::Link {
            library: wrapper_library_name(entry_name),
            reason: format!("wrapper symbol {entry_name} collides with the wrapped function"),
        });
    }

    let mut wrapper_library = codegen.create_library(&wrapper_library_name(entry_name), entry_name);
    wrapper_library.add_linking_library(library)?;

    let module = build_wrapper_module(codegen, fndesc, entry_name)?;
    wrapper_library.add_ir_module(module)?;
    wrapper_library.finalize(session)?;

    session.record_wrapper_synthesized(entry_name);
    log::info!(
        "wrapped {} ({}) as {}",
        internal_symbol,
        fndesc.signature(),
        wrapper_library.name()
    );
    Ok(wrapper_library)
}

/// Module declaring the internal function of `fndesc` and defining its SoA
/// wrapper `entry_name`.
///
/// The module only declares the wrapped function; it resolves once linked
/// with the library defining it.
pub fn build_wrapper_module<'ctx>(
    codegen: &Codegen<'ctx>,
    fndesc: &FunctionDescriptor,
    entry_name: &str,
) -> CompileResult<Module<'ctx>> {
    let context = codegen.context();
    let model = codegen.data_model();
    let internal = CallConv::new(ConventionKind::Internal, model);
    let soa = CallConv::new(ConventionKind::StructureOfArrays, model);
    let restype = fndesc.restype();
    let argtypes = fndesc.argtypes();
    let internal_symbol = fndesc.llvm_func_name();

    // Shape errors surface here, before any IR exists.
    let soa_signature = soa.native_signature(restype, argtypes)?;
    let internal_signature = internal.native_signature(restype, argtypes)?;

    let module = codegen.create_module(WRAPPER_MODULE_NAME);
    let callee = module.add_function(
        internal_symbol,
        internal_signature.fn_type(context),
        Some(Linkage::External),
    );
    let wrapper = module.add_function(entry_name, soa_signature.fn_type(context), None);
    soa.convention()
        .decorate_function(wrapper, restype, argtypes, fndesc.arg_names())?;

    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(wrapper, "entry"));

    let packer = ArgPacker::new(model, argtypes)?;
    let flat = soa.convention().get_arguments(wrapper, restype);
    let args = packer.from_arguments(&builder, &flat)?;

    let result = internal.call_function(&builder, callee, restype, argtypes, &args)?;
    // The return slot is zeroed, so a failing callee scatters zeros.
    log::debug!("status of {internal_symbol} is discarded by {entry_name}");

    soa.convention()
        .return_value(&builder, wrapper, restype, result.value)?;

    log::trace!(
        "wrapper module for {}:\n{}",
        fndesc.name(),
        module.print_to_string().to_string()
    );
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::CompilerLock;
    use crate::core::types::Signature;
    use crate::llvm::codegen::BuildOptions;
    use inkwell::context::Context;
    use inkwell::OptimizationLevel;

    const ADDSUB: &str = r#"
define i32 @__internal_addsub_i32_i32(ptr %retptr, i32 %a, i32 %b) {
entry:
  %sum = add i32 %a, %b
  %diff = sub i32 %a, %b
  %0 = insertvalue [2 x i32] undef, i32 %sum, 0
  %1 = insertvalue [2 x i32] %0, i32 %diff, 1
  store [2 x i32] %1, ptr %retptr
  ret i32 0
}
"#;

    fn addsub_descriptor() -> FunctionDescriptor {
        let signature: Signature = "UniTuple(int32 x 2)(int32, int32)".parse().unwrap();
        FunctionDescriptor::new("addsub", signature, &["a".to_string(), "b".to_string()])
            .unwrap()
    }

    #[test]
    fn test_wrapper_module_shape() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen =
            Codegen::new(&context, BuildOptions::native(OptimizationLevel::None)).unwrap();

        let mut library = codegen.library_from_ir("addsub", ADDSUB).unwrap();
        library.finalize(&session).unwrap();

        let wrapped = soa_wrap_function(&session, &library, &addsub_descriptor()).unwrap();
        assert_eq!(wrapped.name(), "addsub_function_");
        assert_eq!(wrapped.entry_name(), "addsub");
        assert_eq!(wrapped.defined_functions(), vec!["addsub".to_string()]);
        assert_eq!(
            wrapped.declared_functions(),
            vec!["__internal_addsub_i32_i32".to_string()]
        );

        let ir = wrapped.get_llvm_str().unwrap();
        assert!(ir.contains("define void @addsub("));
        assert!(ir.contains("%out.0"));
        assert!(ir.contains("%out.1"));
        assert!(ir.contains("%arg.a"));
        assert!(ir.contains("dereferenceable(4)"));
        // The callee body comes from the linked library, not the wrapper module.
        assert!(ir.contains("define i32 @__internal_addsub_i32_i32("));
        assert_eq!(ir.matches("define i32 @__internal_addsub_i32_i32(").count(), 1);
        assert!(!wrapped
            .defined_functions()
            .contains(&"__internal_addsub_i32_i32".to_string()));

        let stats = session.stats();
        assert_eq!(stats.wrappers_synthesized, vec!["addsub".to_string()]);
    }

    #[test]
    fn test_nested_return_rejected_before_ir() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let mut library = codegen.library_from_ir("addsub", ADDSUB).unwrap();
        library.finalize(&session).unwrap();

        let signature: Signature = "Tuple(int32, UniTuple(int32 x 2))(int32, int32)"
            .parse()
            .unwrap();
        let fndesc = FunctionDescriptor::new("addsub", signature, &[])
            .unwrap()
            .with_llvm_name("__internal_addsub_i32_i32");
        let err = soa_wrap_function(&session, &library, &fndesc).err().unwrap();
        assert!(matches!(err, CompileError::UnsupportedReturnShape { .. }));
        assert!(session.stats().wrappers_synthesized.is_empty());
    }

    #[test]
    fn test_symbol_collision() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let mut library = codegen.library_from_ir("addsub", ADDSUB).unwrap();
        library.finalize(&session).unwrap();

        let fndesc = addsub_descriptor().with_llvm_name("addsub");
        let err = soa_wrap_function(&session, &library, &fndesc).err().unwrap();
        assert!(matches!(err, CompileError::Link { .. }));
    }
}
