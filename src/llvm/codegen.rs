// This module drives LLVM for soawrap. A Codegen owns the target machine built from the
// BuildOptions (triple, CPU, features, optimization level, fast-math) and creates modules
// stamped with the target's triple and data layout. A CodeLibrary is the unit of
// compilation and linking: it collects IR modules, keeps non-owning links to other
// finalized libraries and, on finalize, links everything into a single module, rejects
// unresolved declarations, applies fast-math attributes, verifies and runs the new pass
// manager pipeline. Finalized libraries can print their linked IR or emit target assembly
// through the target machine. All LLVM targets are initialized once per process.

//! Code generator and code libraries.

use super::data_model::DataModel;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use inkwell::attributes::AttributeLoc;
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::values::FunctionValue;
use inkwell::OptimizationLevel;
use std::sync::Once;

static INIT_TARGETS: Once = Once::new();

const FASTMATH_ATTRIBUTES: [&str; 5] = [
    "unsafe-fp-math",
    "no-nans-fp-math",
    "no-infs-fp-math",
    "no-signed-zeros-fp-math",
    "approx-func-fp-math",
];

fn initialize_targets() {
    INIT_TARGETS.call_once(|| {
        Target::initialize_all(&InitializationConfig::default());
        log::debug!("LLVM targets initialized");
    });
}

/// Target selection for code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub triple: String,
    pub cpu: String,
    pub features: String,
}

impl TargetSpec {
    /// The host machine.
    pub fn native() -> Self {
        initialize_targets();
        Self {
            triple: TargetMachine::get_default_triple()
                .as_str()
                .to_string_lossy()
                .into_owned(),
            cpu: TargetMachine::get_host_cpu_name()
                .to_string_lossy()
                .into_owned(),
            features: TargetMachine::get_host_cpu_features()
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// A generic CPU of the given triple.
    pub fn from_triple(triple: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            cpu: String::new(),
            features: String::new(),
        }
    }

    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = cpu.into();
        self
    }

    pub fn with_features(mut self, features: impl Into<String>) -> Self {
        self.features = features.into();
        self
    }
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self::native()
    }
}

/// Options forwarded to the code generator.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub opt_level: OptimizationLevel,
    /// Relax IEEE semantics on every defined function.
    pub fastmath: bool,
    pub target: TargetSpec,
}

impl BuildOptions {
    /// Options for the host with the given optimization level.
    pub fn native(opt_level: OptimizationLevel) -> Self {
        Self {
            opt_level,
            fastmath: false,
            target: TargetSpec::native(),
        }
    }

    pub fn with_fastmath(mut self, fastmath: bool) -> Self {
        self.fastmath = fastmath;
        self
    }

    pub fn with_target(mut self, target: TargetSpec) -> Self {
        self.target = target;
        self
    }

    /// New pass manager pipeline for the optimization level.
    pub fn pass_pipeline(&self) -> Option<&'static str> {
        match self.opt_level {
            OptimizationLevel::None => None,
            OptimizationLevel::Less => Some("default<O1>"),
            OptimizationLevel::Default => Some("default<O2>"),
            OptimizationLevel::Aggressive => Some("default<O3>"),
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::native(OptimizationLevel::Default)
    }
}

/// Owns the target machine and creates modules and libraries for it.
pub struct Codegen<'ctx> {
    context: &'ctx Context,
    options: BuildOptions,
    triple: TargetTriple,
    machine: TargetMachine,
}

impl<'ctx> Codegen<'ctx> {
    pub fn new(context: &'ctx Context, options: BuildOptions) -> CompileResult<Self> {
        initialize_targets();

        let spec = &options.target;
        let triple = TargetTriple::create(&spec.triple);
        let target = Target::from_triple(&triple).map_err(|e| CompileError::Target {
            reason: format!("{}: {}", spec.triple, e.to_string_lossy()),
        })?;
        let machine = target
            .create_target_machine(
                &triple,
                &spec.cpu,
                &spec.features,
                options.opt_level,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or_else(|| CompileError::Target {
                reason: format!(
                    "cannot create a target machine for {} (cpu '{}')",
                    spec.triple, spec.cpu
                ),
            })?;

        log::debug!(
            "codegen for {} cpu={} opt={:?} fastmath={}",
            spec.triple,
            spec.cpu,
            options.opt_level,
            options.fastmath
        );

        Ok(Self {
            context,
            options,
            triple,
            machine,
        })
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn data_model(&self) -> DataModel<'ctx> {
        DataModel::new(self.context)
    }

    pub fn target_machine(&self) -> &TargetMachine {
        &self.machine
    }

    /// Empty module for this target.
    pub fn create_module(&self, name: &str) -> Module<'ctx> {
        let module = self.context.create_module(name);
        self.prepare_module(&module);
        module
    }

    fn prepare_module(&self, module: &Module<'ctx>) {
        module.set_triple(&self.triple);
        module.set_data_layout(&self.machine.get_target_data().get_data_layout());
    }

    /// Empty library whose entry point is `entry_name`.
    pub fn create_library(&self, name: &str, entry_name: &str) -> CodeLibrary<'_, 'ctx> {
        CodeLibrary {
            codegen: self,
            name: name.to_string(),
            entry_name: entry_name.to_string(),
            modules: Vec::new(),
            linking: Vec::new(),
            linked: None,
        }
    }

    /// Parse textual IR into a module for this target.
    pub fn parse_ir(&self, name: &str, ir: &str) -> CompileResult<Module<'ctx>> {
        let buffer = MemoryBuffer::create_from_memory_range_copy(ir.as_bytes(), name);
        let module = self
            .context
            .create_module_from_ir(buffer)
            .map_err(|e| CompileError::Parse {
                name: name.to_string(),
                reason: e.to_string_lossy().into_owned(),
            })?;
        self.prepare_module(&module);
        Ok(module)
    }

    /// Library holding the parsed textual IR, with entry point `name`.
    pub fn library_from_ir(&self, name: &str, ir: &str) -> CompileResult<CodeLibrary<'_, 'ctx>> {
        let mut library = self.create_library(name, name);
        library.add_ir_module(self.parse_ir(name, ir)?)?;
        Ok(library)
    }
}

/// A set of IR modules linked and optimized together.
pub struct CodeLibrary<'a, 'ctx> {
    codegen: &'a Codegen<'ctx>,
    name: String,
    entry_name: String,
    modules: Vec<Module<'ctx>>,
    /// Finalized libraries whose code is linked in, not owned.
    linking: Vec<&'a CodeLibrary<'a, 'ctx>>,
    linked: Option<Module<'ctx>>,
}

impl<'a, 'ctx> CodeLibrary<'a, 'ctx> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbol of the library's entry function.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    pub fn codegen(&self) -> &'a Codegen<'ctx> {
        self.codegen
    }

    pub fn is_finalized(&self) -> bool {
        self.linked.is_some()
    }

    pub fn add_ir_module(&mut self, module: Module<'ctx>) -> CompileResult<()> {
        self.ensure_open()?;
        log::trace!(
            "adding module {} to {}:\n{}",
            module.get_name().to_string_lossy(),
            self.name,
            module.print_to_string().to_string()
        );
        self.modules.push(module);
        Ok(())
    }

    /// Link the code of a finalized `library` into this one on finalize.
    pub fn add_linking_library(&mut self, library: &'a CodeLibrary<'a, 'ctx>) -> CompileResult<()> {
        self.ensure_open()?;
        if !library.is_finalized() {
            return Err(CompileError::LibraryNotFinalized {
                name: library.name.clone(),
            });
        }
        self.linking.push(library);
        Ok(())
    }

    fn ensure_open(&self) -> CompileResult<()> {
        if self.is_finalized() {
            return Err(CompileError::LibraryFinalized {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Link, check, optimize and seal the library.
    pub fn finalize(&mut self, session: &CompilationSession<'_>) -> CompileResult<()> {
        self.ensure_open()?;
        let linked = self.link()?;

        let unresolved: Vec<String> = linked
            .get_functions()
            .filter(|f| f.count_basic_blocks() == 0)
            .map(function_name)
            .filter(|name| !name.starts_with("llvm."))
            .collect();
        if !unresolved.is_empty() {
            return Err(CompileError::UnresolvedSymbols {
                library: self.name.clone(),
                symbols: unresolved,
            });
        }

        let options = self.codegen.options();
        if options.fastmath {
            self.apply_fastmath(&linked);
        }

        linked.verify().map_err(|e| CompileError::Verification {
            library: self.name.clone(),
            reason: e.to_string_lossy().into_owned(),
        })?;

        if let Some(pipeline) = options.pass_pipeline() {
            log::debug!("running {pipeline} on {}", self.name);
            linked
                .run_passes(pipeline, self.codegen.target_machine(), PassBuilderOptions::create())
                .map_err(|e| CompileError::Optimization {
                    library: self.name.clone(),
                    reason: e.to_string_lossy().into_owned(),
                })?;
        }

        log::trace!(
            "finalized {}:\n{}",
            self.name,
            linked.print_to_string().to_string()
        );
        let defined = linked
            .get_functions()
            .filter(|f| f.count_basic_blocks() > 0)
            .count();
        session.record_library_finalized(&self.name, defined);
        log::debug!("finalized {} with {defined} functions", self.name);

        self.linked = Some(linked);
        Ok(())
    }

    fn link(&self) -> CompileResult<Module<'ctx>> {
        let linked = self.codegen.create_module(&self.name);
        let link_error = |source: &str, reason: String| CompileError::Link {
            library: self.name.clone(),
            reason: format!("{source}: {reason}"),
        };

        for module in &self.modules {
            let source = module.get_name().to_string_lossy().into_owned();
            linked
                .link_in_module(module.clone())
                .map_err(|e| link_error(&source, e.to_string_lossy().into_owned()))?;
        }
        for library in &self.linking {
            let module = library.linked_module().ok_or_else(|| CompileError::LibraryNotFinalized {
                name: library.name.clone(),
            })?;
            linked
                .link_in_module(module.clone())
                .map_err(|e| link_error(&library.name, e.to_string_lossy().into_owned()))?;
        }
        Ok(linked)
    }

    fn apply_fastmath(&self, module: &Module<'ctx>) {
        let context = self.codegen.context();
        for function in module.get_functions().filter(|f| f.count_basic_blocks() > 0) {
            for key in FASTMATH_ATTRIBUTES {
                let attribute = context.create_string_attribute(key, "true");
                function.add_attribute(AttributeLoc::Function, attribute);
            }
        }
    }

    /// Functions defined by this library's own modules.
    pub fn defined_functions(&self) -> Vec<String> {
        self.own_functions(|f| f.count_basic_blocks() > 0)
    }

    /// Functions only declared by this library's own modules.
    pub fn declared_functions(&self) -> Vec<String> {
        self.own_functions(|f| f.count_basic_blocks() == 0)
    }

    fn own_functions(&self, keep: impl Fn(&FunctionValue<'ctx>) -> bool) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|m| m.get_functions())
            .filter(|f| keep(f))
            .map(function_name)
            .collect()
    }

    /// The linked module, once finalized.
    ///
    /// This is the emission-time merge: it holds copies of the code of every
    /// linked library next to this library's own modules, which stay
    /// untouched (see [`defined_functions`](Self::defined_functions)).
    pub fn linked_module(&self) -> Option<&Module<'ctx>> {
        self.linked.as_ref()
    }

    fn require_linked(&self) -> CompileResult<&Module<'ctx>> {
        self.linked
            .as_ref()
            .ok_or_else(|| CompileError::LibraryNotFinalized {
                name: self.name.clone(),
            })
    }

    /// Textual IR of the linked module, dependencies included.
    pub fn get_llvm_str(&self) -> CompileResult<String> {
        Ok(self.require_linked()?.print_to_string().to_string())
    }

    /// Target assembly of the linked module, dependencies included.
    pub fn get_asm_str(&self) -> CompileResult<String> {
        let module = self.require_linked()?;
        let buffer = self
            .codegen
            .target_machine()
            .write_to_memory_buffer(module, FileType::Assembly)
            .map_err(|e| CompileError::Emission {
                reason: e.to_string_lossy().into_owned(),
            })?;
        Ok(String::from_utf8_lossy(buffer.as_slice()).into_owned())
    }
}

fn function_name(function: FunctionValue<'_>) -> String {
    function.get_name().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::CompilerLock;

    const ADD_ONE: &str = r#"
define i32 @add_one(i32 %x) {
entry:
  %r = add i32 %x, 1
  ret i32 %r
}
"#;

    const CALLS_ADD_ONE: &str = r#"
declare i32 @add_one(i32)

define i32 @add_two(i32 %x) {
entry:
  %a = call i32 @add_one(i32 %x)
  %b = call i32 @add_one(i32 %a)
  ret i32 %b
}
"#;

    #[test]
    fn test_pass_pipeline() {
        let mut options = BuildOptions::native(OptimizationLevel::None);
        assert_eq!(options.pass_pipeline(), None);
        options.opt_level = OptimizationLevel::Aggressive;
        assert_eq!(options.pass_pipeline(), Some("default<O3>"));
    }

    #[test]
    fn test_unknown_triple() {
        let context = Context::create();
        let options = BuildOptions::native(OptimizationLevel::None)
            .with_target(TargetSpec::from_triple("nonsense-unknown-nowhere"));
        let err = Codegen::new(&context, options).err().unwrap();
        assert!(matches!(err, CompileError::Target { .. }));
    }

    #[test]
    fn test_parse_error() {
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();
        let err = codegen.library_from_ir("broken", "define i32 @f( {").err().unwrap();
        assert!(matches!(err, CompileError::Parse { .. }));
    }

    #[test]
    fn test_finalize_and_link() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let mut base = codegen.library_from_ir("add_one", ADD_ONE).unwrap();
        base.finalize(&session).unwrap();
        assert!(base.is_finalized());
        assert_eq!(base.defined_functions(), vec!["add_one".to_string()]);

        let mut user = codegen.create_library("add_two", "add_two");
        user.add_ir_module(codegen.parse_ir("add_two", CALLS_ADD_ONE).unwrap())
            .unwrap();
        user.add_linking_library(&base).unwrap();
        assert_eq!(user.declared_functions(), vec!["add_one".to_string()]);
        user.finalize(&session).unwrap();

        let ir = user.get_llvm_str().unwrap();
        assert!(ir.contains("@add_two"));
        assert!(ir.contains("define"));
        assert_eq!(session.stats().libraries_finalized, 2);
    }

    #[test]
    fn test_missing_dependency_is_unresolved() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let mut user = codegen.library_from_ir("add_two", CALLS_ADD_ONE).unwrap();
        let err = user.finalize(&session).unwrap_err();
        match err {
            CompileError::UnresolvedSymbols { symbols, .. } => {
                assert_eq!(symbols, vec!["add_one".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!user.is_finalized());
    }

    #[test]
    fn test_library_state_checks() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let open = codegen.library_from_ir("add_one", ADD_ONE).unwrap();
        assert!(matches!(
            open.get_asm_str(),
            Err(CompileError::LibraryNotFinalized { .. })
        ));

        let mut other = codegen.create_library("other", "other");
        assert!(matches!(
            other.add_linking_library(&open),
            Err(CompileError::LibraryNotFinalized { .. })
        ));

        let mut done = codegen.library_from_ir("add_one", ADD_ONE).unwrap();
        done.finalize(&session).unwrap();
        assert!(matches!(
            done.add_ir_module(codegen.create_module("late")),
            Err(CompileError::LibraryFinalized { .. })
        ));
        assert!(matches!(
            done.finalize(&session),
            Err(CompileError::LibraryFinalized { .. })
        ));
    }

    #[test]
    fn test_asm_emission() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let codegen = Codegen::new(&context, BuildOptions::default()).unwrap();

        let mut library = codegen.library_from_ir("add_one", ADD_ONE).unwrap();
        library.finalize(&session).unwrap();
        let asm = library.get_asm_str().unwrap();
        assert!(asm.contains("add_one"));
    }

    #[test]
    fn test_fastmath_attributes() {
        let lock = CompilerLock::new();
        let session = lock.acquire();
        let context = Context::create();
        let options = BuildOptions::native(OptimizationLevel::None).with_fastmath(true);
        let codegen = Codegen::new(&context, options).unwrap();

        let mut library = codegen.library_from_ir("add_one", ADD_ONE).unwrap();
        library.finalize(&session).unwrap();
        assert!(library.get_llvm_str().unwrap().contains("\"no-nans-fp-math\"=\"true\""));
    }
}
