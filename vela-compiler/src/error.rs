//! Error types for the Vela compiler
//!
//! Every stage reports through miette diagnostics. Errors are grouped by the
//! stage that raises them and collected into [`Diagnostics`].

use crate::types::Type;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;
use vela_ast::Span;

/// Any error raised while compiling a unit
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unification(#[from] UnificationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Trait(#[from] TraitError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lowering(#[from] LoweringError),
}

/// Unification errors
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum UnificationError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    #[diagnostic(
        code(vela::typecheck::type_mismatch),
        help("The types {expected} and {found} cannot be unified")
    )]
    TypeMismatch {
        expected: Type,
        found: Type,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
    },

    #[error("Infinite type: {var} occurs in {ty}")]
    #[diagnostic(
        code(vela::typecheck::infinite_type),
        help("A value cannot contain itself; check recursive uses of this expression")
    )]
    InfiniteType {
        var: Type,
        ty: Type,
        #[label("{var} would create an infinite type")]
        span: Option<SourceSpan>,
    },

    #[error("Arity mismatch: {what} expects {expected}, found {found}")]
    #[diagnostic(code(vela::typecheck::arity_mismatch))]
    ArityMismatch {
        what: String,
        expected: usize,
        found: usize,
        #[label("expected {expected}, found {found}")]
        span: Option<SourceSpan>,
    },
}

/// Trait resolution and coherence errors
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum TraitError {
    #[error("Trait not satisfied: {ty} does not implement {trait_name}")]
    #[diagnostic(
        code(vela::typecheck::trait_not_satisfied),
        help("Add an implementation block: impl {trait_name} for {ty}")
    )]
    TraitNotSatisfied {
        trait_name: String,
        ty: Type,
        #[label("{ty} must implement {trait_name}")]
        span: Option<SourceSpan>,
    },

    #[error("Ambiguous implementation of {trait_name} for {ty}: {candidates}")]
    #[diagnostic(
        code(vela::typecheck::ambiguous_trait_impl),
        help("No single implementation is more specific than the others")
    )]
    AmbiguousTraitImpl {
        trait_name: String,
        ty: Type,
        candidates: String,
        #[label("ambiguous trait requirement")]
        span: Option<SourceSpan>,
    },

    #[error("{ty} does not satisfy trait {trait_name}: method {method} {reason}")]
    #[diagnostic(code(vela::typecheck::does_not_satisfy_trait))]
    DoesNotSatisfyTrait {
        ty: String,
        trait_name: String,
        method: String,
        reason: String,
        #[label("declared to implement {trait_name}")]
        span: Option<SourceSpan>,
    },

    #[error("Conflicting implementation: {trait_name} is already implemented for {target}")]
    #[diagnostic(
        code(vela::typecheck::conflicting_impl),
        help("Each trait can only be implemented once per type pattern")
    )]
    ConflictingImpl {
        trait_name: String,
        target: String,
        #[label("conflicting implementation")]
        span: Option<SourceSpan>,
        #[label("previous implementation")]
        previous: Option<SourceSpan>,
    },
}

/// Name resolution and statement-level errors raised by the checker
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum CheckError {
    #[error("Unbound identifier: {name}")]
    #[diagnostic(code(vela::typecheck::unbound_identifier))]
    UnboundIdentifier {
        name: String,
        #[label("not found in this scope")]
        span: Option<SourceSpan>,
    },

    #[error("Unknown type: {name}")]
    #[diagnostic(code(vela::typecheck::unknown_type))]
    UnknownType {
        name: String,
        #[label("unknown type")]
        span: Option<SourceSpan>,
    },

    #[error("Could not infer the type of {what}: {ty}")]
    #[diagnostic(
        code(vela::typecheck::unresolved_type),
        help("Add a type annotation")
    )]
    UnresolvedType {
        what: String,
        ty: Type,
        #[label("type must be known here")]
        span: Option<SourceSpan>,
    },

    #[error("Not a function: values of type {ty} cannot be called")]
    #[diagnostic(code(vela::typecheck::not_a_function))]
    NotAFunction {
        ty: Type,
        #[label("called here")]
        span: Option<SourceSpan>,
    },

    #[error("Unknown field {field} on {ty}")]
    #[diagnostic(code(vela::typecheck::unknown_field))]
    UnknownField {
        ty: Type,
        field: String,
        #[label("no such field")]
        span: Option<SourceSpan>,
    },

    #[error("Missing field {field} in {class_name} literal")]
    #[diagnostic(code(vela::typecheck::missing_field))]
    MissingField {
        class_name: String,
        field: String,
        #[label("field {field} not initialised")]
        span: Option<SourceSpan>,
    },

    #[error("Unknown method {method} on {ty}")]
    #[diagnostic(code(vela::typecheck::unknown_method))]
    UnknownMethod {
        ty: Type,
        method: String,
        #[label("no such method")]
        span: Option<SourceSpan>,
    },

    #[error("Unknown variant: {name}")]
    #[diagnostic(code(vela::typecheck::unknown_variant))]
    UnknownVariant {
        name: String,
        #[label("unknown or ambiguous variant")]
        span: Option<SourceSpan>,
    },

    #[error("Duplicate definition of {name}")]
    #[diagnostic(code(vela::typecheck::duplicate_definition))]
    DuplicateDefinition {
        name: String,
        #[label("already defined")]
        span: Option<SourceSpan>,
    },

    #[error("Cannot assign to immutable binding {name}")]
    #[diagnostic(
        code(vela::typecheck::assign_to_immutable),
        help("Declare it with `auto` or a type instead of `const`")
    )]
    AssignToImmutable {
        name: String,
        #[label("assignment to immutable binding")]
        span: Option<SourceSpan>,
    },

    #[error("Cannot assign to captured variable {name}")]
    #[diagnostic(
        code(vela::typecheck::assign_to_captured_variable),
        help("Lambdas capture variables by value")
    )]
    AssignToCapturedVariable {
        name: String,
        #[label("captured by value")]
        span: Option<SourceSpan>,
    },

    #[error("Invalid assignment target")]
    #[diagnostic(
        code(vela::typecheck::invalid_assignment_target),
        help("Only variables, fields and list elements can be assigned")
    )]
    InvalidAssignmentTarget {
        #[label("cannot assign to this expression")]
        span: Option<SourceSpan>,
    },

    #[error("`{keyword}` outside of a loop")]
    #[diagnostic(code(vela::typecheck::invalid_control_flow))]
    InvalidControlFlow {
        keyword: String,
        #[label("not inside a loop")]
        span: Option<SourceSpan>,
    },

    #[error("Function {function} may finish without returning a {ret}")]
    #[diagnostic(code(vela::typecheck::missing_return))]
    MissingReturn {
        function: String,
        ret: Type,
        #[label("missing return")]
        span: Option<SourceSpan>,
    },
}

/// Pattern-match compilation errors
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("Non-exhaustive match: {witness} is not covered")]
    #[diagnostic(
        code(vela::patterns::non_exhaustive),
        help("Add an arm for {witness} or a wildcard `_` arm")
    )]
    NonExhaustiveMatch {
        witness: String,
        #[label("pattern {witness} not covered")]
        span: Option<SourceSpan>,
    },

    #[error("Unreachable match arm {arm}")]
    #[diagnostic(
        code(vela::patterns::unreachable_arm),
        help("Earlier arms already cover every value this arm matches")
    )]
    UnreachableArm {
        arm: usize,
        #[label("unreachable pattern")]
        span: Option<SourceSpan>,
    },
}

/// Errors raised while building state machines and task graphs
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum ConcurrencyError {
    #[error("`await` outside of an async function")]
    #[diagnostic(
        code(vela::concurrency::await_outside_async),
        help("Mark the enclosing function `async`; lambdas cannot await")
    )]
    AwaitOutsideAsync {
        #[label("await here")]
        span: Option<SourceSpan>,
    },

    #[error("`await` inside a parallel arm")]
    #[diagnostic(
        code(vela::concurrency::await_in_parallel_arm),
        help("Return the task from the arm instead; it is awaited inside the arm's task")
    )]
    AwaitInParallelArm {
        #[label("await here")]
        span: Option<SourceSpan>,
    },

    #[error("Parallel arm assigns to captured variable {name}")]
    #[diagnostic(code(vela::concurrency::parallel_arm_assigns_capture))]
    ParallelArmAssignsCapture {
        name: String,
        #[label("assignment to captured variable")]
        span: Option<SourceSpan>,
    },

    #[error("Task graph of {function} contains a cycle")]
    #[diagnostic(code(vela::concurrency::cyclic_task_graph))]
    CyclicTaskGraph {
        function: String,
        #[label("in this function")]
        span: Option<SourceSpan>,
    },
}

/// Errors raised while monomorphizing and lowering to IR
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum LoweringError {
    #[error("Entry function {name} not found")]
    #[diagnostic(
        code(vela::lowering::unknown_entry),
        help("The entry must be a non-generic function of this unit")
    )]
    UnknownEntry { name: String },

    #[error("No implementation of {trait_name}.{method} for {ty}")]
    #[diagnostic(code(vela::lowering::unresolved_trait_method))]
    UnresolvedTraitMethod {
        trait_name: String,
        method: String,
        ty: Type,
        #[label("called here")]
        span: Option<SourceSpan>,
    },

    #[error("Function {name} has no checked body")]
    #[diagnostic(code(vela::lowering::missing_body))]
    MissingBody {
        name: String,
        #[label("called here")]
        span: Option<SourceSpan>,
    },
}

/// Marker returned when a declaration cannot be checked any further.
///
/// The error that caused it has already been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort;

/// Collected diagnostics for a compilation unit
#[derive(Error, Diagnostic, Debug, Clone, Default, PartialEq)]
#[error("compilation failed with {} error(s)", .errors.len())]
#[diagnostic(code(vela::compile::failed))]
pub struct Diagnostics {
    #[related]
    pub errors: Vec<CompileError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: impl Into<CompileError>) {
        self.errors.push(error.into());
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.errors.iter()
    }

    /// Diagnostic codes in reporting order, e.g. `vela::typecheck::type_mismatch`
    pub fn codes(&self) -> Vec<String> {
        self.errors
            .iter()
            .filter_map(|error| error.code().map(|code| code.to_string()))
            .collect()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.codes().iter().any(|candidate| candidate == code)
    }
}

impl IntoIterator for Diagnostics {
    type Item = CompileError;
    type IntoIter = std::vec::IntoIter<CompileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Helper function to convert AST spans to miette SourceSpans
pub fn to_source_span(span: Option<Span>) -> Option<SourceSpan> {
    span.map(|s| SourceSpan::new(s.start.into(), s.end.saturating_sub(s.start)))
}

/// Shorthand for the common case of a known span
pub(crate) fn at(span: Span) -> Option<SourceSpan> {
    to_source_span(Some(span))
}
