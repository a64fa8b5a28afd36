//! soawrap - structure-of-arrays calling-convention wrappers for LLVM IR.
//!
//! Functions compiled under the internal convention return their (possibly
//! tuple) result through a hidden return slot together with an `i32`
//! status code. Native callers cannot consume either, so soawrap generates
//! an entry point per function that returns `void` and writes each return
//! component through its own output pointer:
//!
//! ```text
//! i32  @__internal_addsub_i32_i32(ptr %retptr, i32 %a, i32 %b)
//! void @addsub(ptr %out.0, ptr %out.1, i32 %arg.a, i32 %arg.b)
//! ```
//!
//! # Primary Usage
//!
//! ```ignore
//! use inkwell::context::Context;
//! use soawrap::compiler::{compile_asm_soa, load_function_ir, Output};
//! use soawrap::core::CompilerLock;
//! use soawrap::llvm::{BuildOptions, Codegen};
//!
//! let session = CompilerLock::global().acquire();
//! let context = Context::create();
//! let codegen = Codegen::new(&context, BuildOptions::default())?;
//! let signature = "UniTuple(int32 x 2)(int32, int32)".parse()?;
//! let compiled = load_function_ir(&session, &codegen, "addsub", signature, ir, None)?;
//! let asm = compile_asm_soa(&session, &compiled, Output::Soa)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, semantic types, function descriptors, compiler lock
//! - [`llvm`] - Type lowering, calling conventions, code generation, wrappers
//! - [`compiler`] - Front-end entry points and assembly output

pub mod compiler;
pub mod core;
pub mod llvm;

pub use crate::compiler::{
    compile_asm_soa, compile_function, compile_llvm_soa, load_function_ir, CompiledAsm,
    CompiledFunction, FunctionBody, Output,
};
pub use crate::core::{
    CompilationSession, CompileError, CompileResult, CompilerLock, FunctionDescriptor,
    SemanticType, SessionStats, Signature,
};
pub use crate::llvm::{
    soa_wrap_function, BuildOptions, CallConv, CodeLibrary, Codegen, ConventionKind,
    Operation, TargetSpec,
};
