//! LLVM side of soawrap.
//!
//! Type lowering, argument packing, the two calling conventions, the code
//! generator with its libraries, and the SoA wrapper synthesizer.
//!
//! # Example
//! ```ignore
//! use soawrap::core::CompilerLock;
//! use soawrap::llvm::{soa_wrap_function, BuildOptions, Codegen};
//!
//! let session = CompilerLock::global().acquire();
//! let codegen = Codegen::new(&context, BuildOptions::default())?;
//! let mut library = codegen.library_from_ir("addsub", ir)?;
//! library.finalize(&session)?;
//! let wrapper = soa_wrap_function(&session, &library, &fndesc)?;
//! println!("{}", wrapper.get_asm_str()?);
//! ```

pub mod arg_packer;
pub mod calling_convention;
pub mod codegen;
pub mod data_model;
pub mod wrapper;

pub use arg_packer::ArgPacker;
pub use calling_convention::{
    select_runtime_arguments, CallConv, CallResult, CallableConvention, CallingConvention,
    ConventionKind, ConventionSignature, InternalCallConv, Operation, SoaCallConv,
    StatusConvention,
};
pub use codegen::{BuildOptions, CodeLibrary, Codegen, TargetSpec};
pub use data_model::DataModel;
pub use wrapper::{build_wrapper_module, soa_wrap_function};
