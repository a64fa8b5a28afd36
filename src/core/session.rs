// This module provides the process-wide compiler lock and the compilation session that
// proves it is held. LLVM's target registry, the code generator and their global type and
// metadata tables are not safe for concurrent mutation from several in-flight
// compilations, so front-end compilation, wrapping and finalization all take a
// &CompilationSession. A session can only be created by acquiring a CompilerLock, and the
// lock is released when the session is dropped. The session also records statistics
// (functions compiled, wrappers synthesized, libraries finalized, assembly emitted) with a
// Display report used by the driver in verbose mode.

//! Compiler lock and compilation session management.
//!
//! Holding a [`CompilationSession`] is holding the compiler lock; every
//! operation that touches the code generator takes the session by reference.

use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

static GLOBAL_COMPILER_LOCK: CompilerLock = CompilerLock::new();

/// Mutual exclusion around the whole compile pipeline.
pub struct CompilerLock {
    inner: Mutex<()>,
}

impl CompilerLock {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(()),
        }
    }

    /// The lock shared by every compilation in this process.
    pub fn global() -> &'static CompilerLock {
        &GLOBAL_COMPILER_LOCK
    }

    /// Block until the lock is free and open a session holding it.
    pub fn acquire(&self) -> CompilationSession<'_> {
        let guard = self.inner.lock();
        log::trace!("compiler lock acquired");
        CompilationSession {
            _guard: guard,
            stats: RefCell::new(SessionStats::default()),
        }
    }

    /// Open a session only if no other compilation is in flight.
    pub fn try_acquire(&self) -> Option<CompilationSession<'_>> {
        self.inner.try_lock().map(|guard| CompilationSession {
            _guard: guard,
            stats: RefCell::new(SessionStats::default()),
        })
    }
}

impl Default for CompilerLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A compilation critical section.
///
/// Sessions are synchronous and confined to one thread; they keep no state
/// between compilations besides statistics.
pub struct CompilationSession<'lock> {
    _guard: MutexGuard<'lock, ()>,

    /// Session statistics for reporting.
    stats: RefCell<SessionStats>,
}

impl<'lock> CompilationSession<'lock> {
    /// Record that a front-end function was compiled.
    pub fn record_function_compiled(&self, name: &str) {
        self.stats.borrow_mut().functions_compiled.push(name.to_string());
    }

    /// Record that an SoA wrapper was synthesized.
    pub fn record_wrapper_synthesized(&self, name: &str) {
        self.stats.borrow_mut().wrappers_synthesized.push(name.to_string());
    }

    /// Record that a library was finalized with the given number of functions.
    pub fn record_library_finalized(&self, name: &str, functions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.libraries_finalized += 1;
        *stats.finalized_functions.entry(name.to_string()).or_insert(0) += functions;
    }

    /// Record emitted assembly text.
    pub fn record_asm_emitted(&self, bytes: usize) {
        self.stats.borrow_mut().asm_bytes += bytes;
    }

    /// Snapshot of the compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Front-end functions compiled, in order.
    pub functions_compiled: Vec<String>,

    /// Wrappers synthesized, in order.
    pub wrappers_synthesized: Vec<String>,

    /// Number of libraries finalized.
    pub libraries_finalized: usize,

    /// Defined functions per finalized library.
    pub finalized_functions: HashMap<String, usize>,

    /// Total size of emitted assembly text in bytes.
    pub asm_bytes: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled.len())?;
        writeln!(f, "  Wrappers synthesized: {}", self.wrappers_synthesized.len())?;
        writeln!(f, "  Libraries finalized: {}", self.libraries_finalized)?;
        writeln!(f, "  Assembly emitted: {} bytes", self.asm_bytes)?;

        if !self.finalized_functions.is_empty() {
            writeln!(f, "  Library breakdown:")?;
            let mut sorted: Vec<_> = self.finalized_functions.iter().collect();
            sorted.sort();
            for (library, count) in sorted {
                writeln!(f, "    {library}: {count} functions")?;
            }
        }

        Ok(())
    }
}
