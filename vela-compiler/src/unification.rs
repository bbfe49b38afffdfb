//! Type unification for Vela
//!
//! Structural unification over [`Type`] with an occurs check. Bindings are
//! recorded in the unit's [`Substitution`]; a failed unification leaves the
//! substitution exactly as it was.

use crate::error::{at, UnificationError};
use crate::types::{GenericParamInfo, Scheme, Substitution, Type, TypeVarGenerator, TypeVarId};
use indexmap::IndexMap;
use tracing::trace;
use vela_ast::Span;

/// Result type for unification operations
pub type UnificationResult<T = ()> = Result<T, UnificationError>;

/// Why a component-wise unification failed
enum Failure {
    Mismatch,
    Arity {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    Occurs {
        var: TypeVarId,
        ty: Type,
    },
}

/// Unifies types against one substitution
pub struct Unifier<'s> {
    substitution: &'s mut Substitution,
}

impl<'s> Unifier<'s> {
    pub fn new(substitution: &'s mut Substitution) -> Self {
        Self { substitution }
    }

    /// Make `expected` and `found` equal, extending the substitution.
    ///
    /// Constructor mismatches are reported with the whole types, not the
    /// innermost component that failed.
    pub fn unify(&mut self, expected: &Type, found: &Type, span: Span) -> UnificationResult {
        let mark = self.substitution.len();
        match self.unify_inner(expected, found) {
            Ok(()) => Ok(()),
            Err(failure) => {
                self.substitution.truncate(mark);
                Err(match failure {
                    Failure::Mismatch => UnificationError::TypeMismatch {
                        expected: self.substitution.apply(expected),
                        found: self.substitution.apply(found),
                        span: at(span),
                    },
                    Failure::Arity {
                        what,
                        expected,
                        found,
                    } => UnificationError::ArityMismatch {
                        what: what.to_string(),
                        expected,
                        found,
                        span: at(span),
                    },
                    Failure::Occurs { var, ty } => UnificationError::InfiniteType {
                        var: Type::Variable(var),
                        ty: self.substitution.apply(&ty),
                        span: at(span),
                    },
                })
            }
        }
    }

    fn unify_inner(&mut self, left: &Type, right: &Type) -> Result<(), Failure> {
        let left = self.substitution.shallow_resolve(left);
        let right = self.substitution.shallow_resolve(right);

        match (&left, &right) {
            (Type::Variable(a), Type::Variable(b)) if a == b => Ok(()),
            (Type::Variable(var), other) | (other, Type::Variable(var)) => self.bind(*var, other),

            (Type::Primitive(a), Type::Primitive(b)) if a == b => Ok(()),
            (Type::Generic(a), Type::Generic(b)) if a == b => Ok(()),

            (Type::List(a), Type::List(b)) => self.unify_inner(a, b),

            (Type::Tuple(a), Type::Tuple(b)) => {
                if a.len() != b.len() {
                    return Err(Failure::Arity {
                        what: "tuple",
                        expected: a.len(),
                        found: b.len(),
                    });
                }
                a.iter()
                    .zip(b.iter())
                    .try_for_each(|(a, b)| self.unify_inner(a, b))
            }

            (
                Type::Function {
                    params: a_params,
                    ret: a_ret,
                },
                Type::Function {
                    params: b_params,
                    ret: b_ret,
                },
            ) => {
                if a_params.len() != b_params.len() {
                    return Err(Failure::Arity {
                        what: "function parameters",
                        expected: a_params.len(),
                        found: b_params.len(),
                    });
                }
                a_params
                    .iter()
                    .zip(b_params.iter())
                    .try_for_each(|(a, b)| self.unify_inner(a, b))?;
                self.unify_inner(a_ret, b_ret)
            }

            (
                Type::Nominal {
                    name: a_name,
                    args: a_args,
                },
                Type::Nominal {
                    name: b_name,
                    args: b_args,
                },
            ) if a_name == b_name && a_args.len() == b_args.len() => a_args
                .iter()
                .zip(b_args.iter())
                .try_for_each(|(a, b)| self.unify_inner(a, b)),

            _ => Err(Failure::Mismatch),
        }
    }

    fn bind(&mut self, var: TypeVarId, ty: &Type) -> Result<(), Failure> {
        let resolved = self.substitution.apply(ty);
        if resolved.contains_var(var) {
            return Err(Failure::Occurs { var, ty: resolved });
        }
        trace!(var = var.0, ty = %resolved, "bind type variable");
        self.substitution.insert(var, resolved);
        Ok(())
    }
}

/// Unify `expected` with `found` under `substitution`
pub fn unify(
    substitution: &mut Substitution,
    expected: &Type,
    found: &Type,
    span: Span,
) -> UnificationResult {
    Unifier::new(substitution).unify(expected, found, span)
}

/// Abstract a declaration's type over its generic parameters
pub fn generalize(generics: &[GenericParamInfo], ty: Type) -> Scheme {
    Scheme {
        generics: generics.to_vec(),
        ty,
    }
}

/// A scheme specialised with fresh variables
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    pub ty: Type,
    /// One fresh variable per generic parameter, in declaration order
    pub type_args: Vec<Type>,
    /// Trait obligations carried over from the generic bounds
    pub obligations: Vec<(Type, String)>,
}

/// Replace each generic parameter with a fresh variable.
///
/// Bounds on the parameters become deferred trait obligations on the
/// corresponding variables.
pub fn instantiate(scheme: &Scheme, vars: &mut TypeVarGenerator) -> Instantiation {
    let mut mapping = IndexMap::new();
    let mut obligations = Vec::new();
    for generic in &scheme.generics {
        let var = vars.fresh();
        for bound in &generic.bounds {
            obligations.push((var.clone(), bound.clone()));
        }
        mapping.insert(generic.name.clone(), var);
    }
    Instantiation {
        ty: scheme.ty.substitute_generics(&mapping),
        type_args: mapping.into_values().collect(),
        obligations,
    }
}
