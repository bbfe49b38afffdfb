//! Integration tests for the Vela compiler core
//!
//! Programs are built with `vela_ast::builder` and driven through the public
//! entry points. Lowered code is executed by the evaluator in [`harness`].

mod harness;

// Type system
mod test_inference;
mod test_unification;

// Traits and diagnostics
mod test_checker_errors;
mod test_traits;

// Pattern matching
mod test_patterns;

mod test_determinism;
mod test_lowering;
