//! Vela compiler core
//!
//! Takes a validated [`vela_ast::Program`] through type checking, match
//! compilation and concurrency lowering down to a backend-agnostic SSA IR.
//!
//! ## Architecture
//!
//! Each stage consumes the previous stage's output and returns a new one:
//!
//! - **Desugaring**: pipelines become ordinary calls
//! - **Type Checker**: declaration collection, trait conformance and
//!   bidirectional inference over function bodies, producing a typed tree
//! - **Pattern-Match Compiler**: exhaustiveness, reachability and decision trees
//! - **Concurrency Lowering**: async state machines and parallel task graphs
//! - **Lowering**: monomorphized SSA IR with explicit spawn, join and await
//!
//! All per-unit tables live in one [`UnitContext`] passed explicitly through
//! the stages; nothing is global apart from the immutable builtin prelude.

pub mod builtins;
pub mod checker;
pub mod concurrency;
pub mod context;
pub mod desugaring;
pub mod error;
pub mod ir;
pub mod lowering;
pub mod patterns;
pub mod traits;
pub mod typed_ast;
pub mod types;
pub mod unification;

// Re-export public API
pub use checker::TypeChecker;
pub use concurrency::{AsyncStateMachine, ConcurrencyInfo, TaskGraph, TaskNode};
pub use context::{SymbolTable, UnitContext};
pub use desugaring::DesugaringVisitor;
pub use error::{CompileError, Diagnostics};
pub use ir::IrModule;
pub use patterns::DecisionTree;
pub use traits::{Resolution, TraitRegistry};
pub use typed_ast::TypedProgram;
pub use types::{Substitution, Type, TypeVarId};
pub use unification::Unifier;

use indexmap::IndexMap;
use tracing::{debug, instrument};
use vela_ast::Program;

/// Options for one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Stop recording diagnostics after this many
    pub max_errors: Option<usize>,
    /// Lower only what this function reaches. All non-generic functions otherwise.
    pub entry: Option<String>,
    /// Default unconstrained integer literals to `int`
    pub default_int_literals: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_errors: None,
            entry: None,
            default_int_literals: true,
        }
    }
}

/// Typed program plus the unit tables and diagnostics produced by checking
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub program: TypedProgram,
    pub context: UnitContext,
    pub diagnostics: Diagnostics,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Everything a backend needs from one unit
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub module: IrModule,
    /// Task graphs keyed by function name
    pub task_graphs: IndexMap<String, TaskGraph>,
    /// State machines of async functions keyed by function name
    pub state_machines: IndexMap<String, AsyncStateMachine>,
}

/// Type check a program and compile its matches
#[instrument(skip_all, fields(items = program.items.len()))]
pub fn check_program(program: &Program, options: &CompilerOptions) -> CheckResult {
    let desugared = DesugaringVisitor::desugar_program(program.clone());

    let mut context = UnitContext::new();
    let (mut typed, mut diagnostics) = TypeChecker::new(&mut context, options).check_program(&desugared);

    let pattern_diagnostics = patterns::compile_matches(&mut typed, &context);
    diagnostics.extend(pattern_diagnostics);
    if let Some(limit) = options.max_errors {
        diagnostics.errors.truncate(limit);
    }

    debug!(
        functions = typed.functions.len(),
        errors = diagnostics.len(),
        "checked program"
    );
    CheckResult {
        program: typed,
        context,
        diagnostics,
    }
}

/// Run every stage and produce IR. Code is only generated for error-free units.
#[instrument(skip_all)]
pub fn compile_program(program: &Program, options: &CompilerOptions) -> Result<CompiledUnit, Diagnostics> {
    let CheckResult {
        program: mut typed,
        context,
        diagnostics,
    } = check_program(program, options);
    if !diagnostics.is_empty() {
        return Err(diagnostics);
    }

    let concurrency = concurrency::lower_concurrency(&mut typed).map_err(|mut diagnostics| {
        if let Some(limit) = options.max_errors {
            diagnostics.errors.truncate(limit);
        }
        diagnostics
    })?;

    let module = lowering::lower_program(&typed, &context, &concurrency, options)?;
    debug!(functions = module.functions.len(), "lowered program");

    Ok(CompiledUnit {
        module,
        task_graphs: concurrency.graphs,
        state_machines: concurrency.state_machines,
    })
}

#[cfg(test)]
mod tests;
