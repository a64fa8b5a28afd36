// This module defines FunctionDescriptor, the immutable description of a compiled
// front-end function that the wrapper synthesizer consumes: its source-level name, the
// argument names and types, the return type and the symbol the function is defined under
// in its library. Internal symbols are mangled from the name and the argument type codes
// so overloads of one source function get distinct, stable entry points.

//! Descriptors of compiled functions.

use super::error::{CompileError, CompileResult};
use super::types::{SemanticType, Signature};

/// Everything the wrapper needs to know about a compiled function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    name: String,
    signature: Signature,
    arg_names: Vec<String>,
    llvm_func_name: String,
}

impl FunctionDescriptor {
    /// Describe `name` with the mangled internal symbol.
    ///
    /// Missing argument names default to `arg0`, `arg1`, ...
    pub fn new(name: &str, signature: Signature, arg_names: &[String]) -> CompileResult<Self> {
        let arg_names = if arg_names.is_empty() {
            (0..signature.argtypes.len()).map(|i| format!("arg{i}")).collect()
        } else if arg_names.len() == signature.argtypes.len() {
            arg_names.to_vec()
        } else {
            return Err(CompileError::InvalidSignature {
                input: signature.to_string(),
                reason: format!(
                    "{} argument names given for {} arguments",
                    arg_names.len(),
                    signature.argtypes.len()
                ),
            });
        };
        let llvm_func_name = mangle_symbol(name, &signature.argtypes);
        Ok(Self {
            name: name.to_string(),
            signature,
            arg_names,
            llvm_func_name,
        })
    }

    /// Use an existing symbol instead of the mangled one.
    pub fn with_llvm_name(mut self, symbol: impl Into<String>) -> Self {
        self.llvm_func_name = symbol.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn restype(&self) -> &SemanticType {
        &self.signature.restype
    }

    pub fn argtypes(&self) -> &[SemanticType] {
        &self.signature.argtypes
    }

    pub fn arg_names(&self) -> &[String] {
        &self.arg_names
    }

    /// Symbol of the internal-convention definition.
    pub fn llvm_func_name(&self) -> &str {
        &self.llvm_func_name
    }
}

/// `__internal_<name>_<arg codes>`, or `__internal_<name>` without arguments.
pub fn mangle_symbol(name: &str, argtypes: &[SemanticType]) -> String {
    let mut symbol = format!("__internal_{name}");
    for ty in argtypes {
        symbol.push('_');
        symbol.push_str(&ty.mangle());
    }
    symbol
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangled_symbol() {
        let signature: Signature = "UniTuple(int32 x 2)(int32, int32)".parse().unwrap();
        let fndesc = FunctionDescriptor::new("addsub", signature, &[]).unwrap();
        assert_eq!(fndesc.llvm_func_name(), "__internal_addsub_i32_i32");
        assert_eq!(fndesc.arg_names(), ["arg0", "arg1"]);

        let signature = Signature::new(SemanticType::float64(), vec![]);
        let fndesc = FunctionDescriptor::new("constant", signature, &[]).unwrap();
        assert_eq!(fndesc.llvm_func_name(), "__internal_constant");
    }

    #[test]
    fn test_symbol_override() {
        let signature = Signature::new(SemanticType::int32(), vec![SemanticType::int32()]);
        let fndesc = FunctionDescriptor::new("unary_foo", signature, &["x".to_string()])
            .unwrap()
            .with_llvm_name("unary_foo_impl");
        assert_eq!(fndesc.llvm_func_name(), "unary_foo_impl");
        assert_eq!(fndesc.name(), "unary_foo");
    }

    #[test]
    fn test_argument_name_count_mismatch() {
        let signature = Signature::new(SemanticType::int32(), vec![SemanticType::int32()]);
        let names = ["x".to_string(), "y".to_string()];
        let err = FunctionDescriptor::new("f", signature, &names).unwrap_err();
        assert!(matches!(err, CompileError::InvalidSignature { .. }));
    }
}
