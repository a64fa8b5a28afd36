// This module defines the error type shared by every stage of soawrap using the thiserror
// crate. CompileError covers the two deliberate design rejections of the SoA convention
// (unsupported return shapes and unsupported operations such as carrying a status code or
// exception across the boundary), type lowering failures, signature parsing failures, and
// the failures of the LLVM collaborators: IR construction, target machine creation, IR
// parsing, linking, unresolved symbols, verification, optimization and assembly emission.
// Each variant carries the context needed for a useful message. CompileResult<T> is the
// convenience alias used throughout the crate.

//! Error types for soawrap.
//!
//! Using thiserror for idiomatic error handling.

use super::convention::{ConventionKind, Operation};
use thiserror::Error;

/// Main error type for signature computation, wrapping and code generation.
#[derive(Error, Debug)]
pub enum CompileError {
    /// The return type cannot be expressed as a flat set of output pointers.
    #[error("Unsupported return shape {ty}: {reason}")]
    UnsupportedReturnShape { ty: String, reason: String },

    /// The convention was never meant to support this operation.
    #[error("The {convention} calling convention does not support {operation}")]
    UnsupportedOperation {
        convention: ConventionKind,
        operation: Operation,
    },

    #[error("Type {ty} has no native representation")]
    UnrepresentableType { ty: String },

    #[error("Invalid signature '{input}': {reason}")]
    InvalidSignature { input: String, reason: String },

    #[error("Function not found: {name}")]
    FunctionNotFound { name: String },

    #[error("IR construction failed: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("Invalid LLVM value: {reason}")]
    InvalidValue { reason: String },

    #[error("Target error: {reason}")]
    Target { reason: String },

    #[error("Failed to parse IR for {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("Linking {library} failed: {reason}")]
    Link { library: String, reason: String },

    #[error("Unresolved symbols in {library}: {}", .symbols.join(", "))]
    UnresolvedSymbols {
        library: String,
        symbols: Vec<String>,
    },

    #[error("Verification of {library} failed: {reason}")]
    Verification { library: String, reason: String },

    #[error("Optimizing {library} failed: {reason}")]
    Optimization { library: String, reason: String },

    #[error("Code emission failed: {reason}")]
    Emission { reason: String },

    #[error("Library {name} is already finalized")]
    LibraryFinalized { name: String },

    #[error("Library {name} must be finalized first")]
    LibraryNotFinalized { name: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
