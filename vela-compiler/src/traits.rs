//! Trait declarations, implementations and resolution
//!
//! Implementations are keyed by a target *type pattern*: a concrete head
//! (`int`, `Circle`), a generic-headed type (`list<T>`) or a bare generic
//! (`T`, a blanket impl). Resolution picks the most specific applicable
//! implementation and reports ambiguity instead of guessing.

use crate::error::{at, TraitError};
use crate::types::{GenericParamInfo, Type};
use indexmap::IndexMap;
use tracing::trace;
use vela_ast::Span;

/// Guard against runaway recursion through blanket impls
const MAX_RESOLUTION_DEPTH: usize = 32;

/// Method signature as declared by a trait, class or impl
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    pub name: String,
    /// The method's own generic parameters, after those of its owner
    pub generics: Vec<GenericParamInfo>,
    /// Parameters excluding the implicit receiver
    pub params: Vec<Type>,
    pub ret: Type,
    pub is_async: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitInfo {
    pub name: String,
    /// Signatures may mention `Self`
    pub methods: IndexMap<String, MethodSignature>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImplId(pub usize);

/// Where an implementation came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImplSource {
    Builtin,
    /// `class Circle : Drawable`; the methods live on the class
    Class(String),
    /// A free-standing `impl Trait for Type` block
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImplInfo {
    pub id: ImplId,
    pub trait_name: String,
    pub generics: Vec<GenericParamInfo>,
    pub target: Type,
    pub source: ImplSource,
    /// Methods provided by an `impl` block, in terms of the impl's generics
    pub methods: IndexMap<String, MethodSignature>,
    pub span: Span,
}

impl ImplInfo {
    /// Name used for the impl's methods in typed and lowered code
    pub fn display_name(&self) -> String {
        format!("<{} as {}>", self.target, self.trait_name)
    }
}

/// A matched implementation with its generic parameters bound
#[derive(Debug, Clone, PartialEq)]
pub struct ImplMatch {
    pub impl_id: ImplId,
    pub bindings: IndexMap<String, Type>,
}

impl ImplMatch {
    /// Bindings in the impl's generic parameter order
    pub fn type_args(&self, info: &ImplInfo) -> Vec<Type> {
        info.generics
            .iter()
            .map(|generic| {
                self.bindings
                    .get(&generic.name)
                    .cloned()
                    .unwrap_or_else(|| Type::generic(generic.name.clone()))
            })
            .collect()
    }
}

/// Outcome of resolving `(type, trait)`
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Impl(ImplMatch),
    /// Satisfied by a bound on a generic parameter in scope
    Bound,
    /// The type is not known well enough yet
    Deferred,
    Missing,
    Ambiguous(Vec<ImplId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchOutcome {
    Yes,
    No,
    Unknown,
}

impl MatchOutcome {
    fn and(self, other: MatchOutcome) -> MatchOutcome {
        match (self, other) {
            (MatchOutcome::No, _) | (_, MatchOutcome::No) => MatchOutcome::No,
            (MatchOutcome::Unknown, _) | (_, MatchOutcome::Unknown) => MatchOutcome::Unknown,
            _ => MatchOutcome::Yes,
        }
    }
}

/// Trait and implementation tables for one compilation unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraitRegistry {
    traits: IndexMap<String, TraitInfo>,
    impls: Vec<ImplInfo>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trait(&mut self, info: TraitInfo) {
        self.traits.insert(info.name.clone(), info);
    }

    pub fn get_trait(&self, name: &str) -> Option<&TraitInfo> {
        self.traits.get(name)
    }

    pub fn get_trait_mut(&mut self, name: &str) -> Option<&mut TraitInfo> {
        self.traits.get_mut(name)
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.contains_key(name)
    }

    pub fn traits(&self) -> impl Iterator<Item = &TraitInfo> {
        self.traits.values()
    }

    pub fn get_impl(&self, id: ImplId) -> Option<&ImplInfo> {
        self.impls.get(id.0)
    }

    pub fn impls(&self) -> impl Iterator<Item = &ImplInfo> {
        self.impls.iter()
    }

    pub fn impls_of<'a>(&'a self, trait_name: &'a str) -> impl Iterator<Item = &'a ImplInfo> {
        self.impls
            .iter()
            .filter(move |info| info.trait_name == trait_name)
    }

    /// Traits that declare a method with this name
    pub fn traits_with_method(&self, method: &str) -> Vec<&TraitInfo> {
        self.traits
            .values()
            .filter(|info| info.methods.contains_key(method))
            .collect()
    }

    /// Register an implementation, rejecting a second impl with the same target pattern
    pub fn add_impl(
        &mut self,
        trait_name: &str,
        generics: Vec<GenericParamInfo>,
        target: Type,
        source: ImplSource,
        methods: IndexMap<String, MethodSignature>,
        span: Span,
    ) -> Result<ImplId, TraitError> {
        let id = ImplId(self.impls.len());
        let candidate = ImplInfo {
            id,
            trait_name: trait_name.to_string(),
            generics,
            target,
            source,
            methods,
            span,
        };

        if let Some(existing) = self
            .impls_of(trait_name)
            .find(|existing| is_instance_of(&candidate, existing) && is_instance_of(existing, &candidate))
        {
            return Err(TraitError::ConflictingImpl {
                trait_name: trait_name.to_string(),
                target: candidate.target.to_string(),
                span: at(span),
                previous: at(existing.span),
            });
        }

        trace!(trait_name, target = %candidate.target, "register impl");
        self.impls.push(candidate);
        Ok(id)
    }

    /// Resolve `(ty, trait_name)`.
    ///
    /// `ty` must already have the current substitution applied. `in_scope`
    /// lists the generic parameters (and their bounds) visible at the use site.
    pub fn resolve(&self, ty: &Type, trait_name: &str, in_scope: &[GenericParamInfo]) -> Resolution {
        self.resolve_at_depth(ty, trait_name, in_scope, 0)
    }

    fn resolve_at_depth(
        &self,
        ty: &Type,
        trait_name: &str,
        in_scope: &[GenericParamInfo],
        depth: usize,
    ) -> Resolution {
        if depth > MAX_RESOLUTION_DEPTH {
            return Resolution::Missing;
        }
        if matches!(ty, Type::Variable(_)) {
            return Resolution::Deferred;
        }
        if let Type::Generic(name) = ty {
            let bounded = in_scope
                .iter()
                .any(|generic| &generic.name == name && generic.bounds.iter().any(|b| b == trait_name));
            if bounded {
                return Resolution::Bound;
            }
        }

        let mut applicable: Vec<(&ImplInfo, IndexMap<String, Type>)> = Vec::new();
        let mut undecided = false;

        for info in self.impls_of(trait_name) {
            let mut bindings = IndexMap::new();
            match match_pattern(&info.target, ty, &info.generics, &mut bindings) {
                MatchOutcome::No => continue,
                MatchOutcome::Unknown => {
                    undecided = true;
                    continue;
                }
                MatchOutcome::Yes => {}
            }

            let mut satisfied = true;
            for generic in &info.generics {
                let Some(bound_ty) = bindings.get(&generic.name) else {
                    continue;
                };
                for bound in &generic.bounds {
                    match self.resolve_at_depth(bound_ty, bound, in_scope, depth + 1) {
                        Resolution::Impl(_) | Resolution::Bound | Resolution::Ambiguous(_) => {}
                        Resolution::Deferred => undecided = true,
                        Resolution::Missing => satisfied = false,
                    }
                }
            }
            if satisfied {
                applicable.push((info, bindings));
            }
        }

        if undecided {
            return Resolution::Deferred;
        }

        let most_specific: Vec<&(&ImplInfo, IndexMap<String, Type>)> = applicable
            .iter()
            .filter(|(candidate, _)| {
                applicable.iter().all(|(other, _)| {
                    other.id == candidate.id || is_more_specific(candidate, other)
                })
            })
            .collect();

        match (applicable.len(), most_specific.as_slice()) {
            (0, _) => Resolution::Missing,
            (_, [(info, bindings)]) => Resolution::Impl(ImplMatch {
                impl_id: info.id,
                bindings: bindings.clone(),
            }),
            _ => Resolution::Ambiguous(applicable.iter().map(|(info, _)| info.id).collect()),
        }
    }

    /// Render impl ids for an ambiguity diagnostic
    pub fn describe_impls(&self, ids: &[ImplId]) -> String {
        ids.iter()
            .filter_map(|id| self.get_impl(*id))
            .map(|info| format!("impl {} for {}", info.trait_name, info.target))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// True when `a`'s target is an instance of `b`'s target pattern
fn is_instance_of(a: &ImplInfo, b: &ImplInfo) -> bool {
    let mut bindings = IndexMap::new();
    match_pattern(&b.target, &a.target, &b.generics, &mut bindings) == MatchOutcome::Yes
}

/// `a` is strictly more specific than `b`
pub fn is_more_specific(a: &ImplInfo, b: &ImplInfo) -> bool {
    is_instance_of(a, b) && !is_instance_of(b, a)
}

/// One-way match of an impl target pattern against a type.
///
/// Only the pattern's own generic parameters bind. A variable in `ty` that a
/// non-generic part of the pattern would have to inspect gives `Unknown`.
fn match_pattern(
    pattern: &Type,
    ty: &Type,
    params: &[GenericParamInfo],
    bindings: &mut IndexMap<String, Type>,
) -> MatchOutcome {
    if let Type::Generic(name) = pattern {
        if params.iter().any(|param| &param.name == name) {
            return match bindings.get(name) {
                Some(existing) if existing == ty => MatchOutcome::Yes,
                Some(existing) if existing.has_vars() || ty.has_vars() => MatchOutcome::Unknown,
                Some(_) => MatchOutcome::No,
                None => {
                    bindings.insert(name.clone(), ty.clone());
                    MatchOutcome::Yes
                }
            };
        }
    }

    match (pattern, ty) {
        (_, Type::Variable(_)) => MatchOutcome::Unknown,
        (Type::Primitive(a), Type::Primitive(b)) if a == b => MatchOutcome::Yes,
        (Type::Generic(a), Type::Generic(b)) if a == b => MatchOutcome::Yes,
        (Type::List(a), Type::List(b)) => match_pattern(a, b, params, bindings),
        (Type::Tuple(a), Type::Tuple(b)) if a.len() == b.len() => match_all(a, b, params, bindings),
        (
            Type::Function {
                params: a_params,
                ret: a_ret,
            },
            Type::Function {
                params: b_params,
                ret: b_ret,
            },
        ) if a_params.len() == b_params.len() => match_all(a_params, b_params, params, bindings)
            .and(match_pattern(a_ret, b_ret, params, bindings)),
        (
            Type::Nominal {
                name: a_name,
                args: a_args,
            },
            Type::Nominal {
                name: b_name,
                args: b_args,
            },
        ) if a_name == b_name && a_args.len() == b_args.len() => {
            match_all(a_args, b_args, params, bindings)
        }
        _ => MatchOutcome::No,
    }
}

fn match_all(
    patterns: &[Type],
    types: &[Type],
    params: &[GenericParamInfo],
    bindings: &mut IndexMap<String, Type>,
) -> MatchOutcome {
    patterns
        .iter()
        .zip(types.iter())
        .fold(MatchOutcome::Yes, |outcome, (pattern, ty)| {
            outcome.and(match_pattern(pattern, ty, params, bindings))
        })
}
