// This module gathers the LLVM-independent infrastructure of soawrap: the error type
// shared by every stage, the convention kinds with their capability table, the semantic
// type vocabulary with its signature parser, the descriptors of compiled functions, and
// the compiler lock / compilation session that serializes access to the code generator.

//! Core soawrap infrastructure.
//!
//! # Key Components
//!
//! - `convention`: [`ConventionKind`] and [`Operation`]
//! - `error`: [`CompileError`] and [`CompileResult`]
//! - `types`: [`SemanticType`] and [`Signature`]
//! - `descriptor`: [`FunctionDescriptor`]
//! - `session`: [`CompilerLock`] and [`CompilationSession`]

pub mod convention;
pub mod descriptor;
pub mod error;
pub mod session;
pub mod types;

pub use convention::{ConventionKind, Operation};
pub use descriptor::FunctionDescriptor;
pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, CompilerLock, SessionStats};
pub use types::{SemanticType, Signature};
