//! Type checker core components
//!
//! This module implements the main type checking logic, including:
//! - Declaration collection and trait conformance
//! - Bidirectional inference over function bodies
//! - Statement and control-flow checking
//! - Pattern type checking for destructuring

pub mod declarations;
pub mod expressions;
pub mod functions;
pub mod patterns;
pub mod statements;

pub use declarations::PendingBody;
pub use functions::BodyChecker;

use crate::context::UnitContext;
use crate::error::{CompileError, Diagnostics};
use crate::typed_ast::TypedProgram;
use crate::CompilerOptions;
use indexmap::IndexSet;
use tracing::{debug, instrument};
use vela_ast::Program;

/// Main type checker that orchestrates the entire type checking process
pub struct TypeChecker<'a> {
    pub(crate) ctx: &'a mut UnitContext,
    pub(crate) options: &'a CompilerOptions,
    diagnostics: Diagnostics,
    /// Errors reported, including those past `max_errors`
    reported: usize,
    /// Declarations whose signatures failed to resolve
    pub(crate) poisoned: IndexSet<String>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(ctx: &'a mut UnitContext, options: &'a CompilerOptions) -> Self {
        Self {
            ctx,
            options,
            diagnostics: Diagnostics::new(),
            reported: 0,
            poisoned: IndexSet::new(),
        }
    }

    /// Record an error and keep going
    pub(crate) fn report(&mut self, error: impl Into<CompileError>) {
        self.reported += 1;
        if let Some(limit) = self.options.max_errors {
            if self.diagnostics.len() >= limit {
                return;
            }
        }
        self.diagnostics.push(error);
    }

    pub fn error_count(&self) -> usize {
        self.reported
    }

    /// Check a whole program: collect every declaration, then every body
    #[instrument(skip_all)]
    pub fn check_program(mut self, program: &Program) -> (TypedProgram, Diagnostics) {
        let pending = self.collect_declarations(program);
        debug!(
            classes = self.ctx.classes.len(),
            enums = self.ctx.enums.len(),
            functions = self.ctx.functions.len(),
            bodies = pending.len(),
            "collected declarations"
        );

        let mut typed = TypedProgram::default();
        for body in pending {
            if let Some(function) = self.check_body(body) {
                typed.functions.push(function);
            }
        }
        (typed, self.diagnostics)
    }
}
