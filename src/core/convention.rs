// This module describes calling conventions as data, independent of any IR. ConventionKind
// is the closed set of conventions soawrap knows and Operation the set of things a
// convention may be asked to do. ConventionKind::supports is the capability table: the
// structure-of-arrays convention has no status channel, so user exceptions, status
// propagation and calling through it are unsupported, and require turns that into an
// UnsupportedOperation error.

//! Convention kinds and their capabilities.

use super::error::{CompileError, CompileResult};
use std::fmt;

/// The closed set of supported conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConventionKind {
    Internal,
    StructureOfArrays,
}

/// Operations a convention may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    NativeSignature,
    DecorateFunction,
    ReturnValue,
    ReturnUserException,
    PropagateStatus,
    CallFunction,
}

impl ConventionKind {
    /// Capability table.
    pub const fn supports(self, operation: Operation) -> bool {
        !matches!(
            (self, operation),
            (
                ConventionKind::StructureOfArrays,
                Operation::ReturnUserException | Operation::PropagateStatus | Operation::CallFunction
            )
        )
    }

    /// Fail with `UnsupportedOperation` unless `operation` is supported.
    pub fn require(self, operation: Operation) -> CompileResult<()> {
        if self.supports(operation) {
            Ok(())
        } else {
            Err(self.unsupported(operation))
        }
    }

    pub(crate) fn unsupported(self, operation: Operation) -> CompileError {
        CompileError::UnsupportedOperation {
            convention: self,
            operation,
        }
    }
}

impl fmt::Display for ConventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConventionKind::Internal => write!(f, "internal"),
            ConventionKind::StructureOfArrays => write!(f, "structure-of-arrays"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::NativeSignature => "native signature computation",
            Operation::DecorateFunction => "argument decoration",
            Operation::ReturnValue => "value return",
            Operation::ReturnUserException => "user exception return",
            Operation::PropagateStatus => "status propagation",
            Operation::CallFunction => "calling a function through it",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require() {
        assert!(ConventionKind::Internal.require(Operation::CallFunction).is_ok());
        let err = ConventionKind::StructureOfArrays
            .require(Operation::PropagateStatus)
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedOperation {
                convention: ConventionKind::StructureOfArrays,
                operation: Operation::PropagateStatus,
            }
        ));
    }
}
