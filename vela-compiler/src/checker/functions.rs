//! Function body checking
//!
//! A [`BodyChecker`] owns the per-body state: lexical scopes, locals,
//! deferred trait obligations and the lambda and loop context. Once the body
//! has been walked, literals are defaulted, obligations are settled and the
//! final substitution is applied to every type in the typed tree.

use super::declarations::PendingBody;
use super::TypeChecker;
use crate::builtins::{NULLABLE_TRAIT, NUM_TRAIT};
use crate::context::{Binding, LocalId, SymbolTable};
use crate::error::{at, Abort, CheckError, CompileError, TraitError, UnificationError};
use crate::traits::Resolution;
use crate::typed_ast::{
    AssignTarget, Callee, LocalInfo, TypedBlock, TypedExpression, TypedExpressionKind,
    TypedFunction, TypedPattern, TypedPatternKind, TypedStatementKind,
};
use crate::types::{GenericParamInfo, Substitution, Type, TypeVarId};
use crate::unification::unify;
use tracing::{debug, trace};
use vela_ast::Span;

/// A trait requirement waiting for its type to become known
#[derive(Debug, Clone)]
pub(crate) struct Obligation {
    pub ty: Type,
    pub trait_name: String,
    pub span: Span,
    /// Raised by a literal; left unreported when still undecided
    pub literal: bool,
}

/// Locals visible to a lambda body that were bound outside it
#[derive(Debug, Clone)]
pub(crate) struct LambdaFrame {
    /// Scope depth of the lambda's parameters
    pub scope_depth: usize,
    pub captures: Vec<LocalId>,
}

pub struct BodyChecker<'c, 'a> {
    pub(crate) checker: &'c mut TypeChecker<'a>,
    pub(crate) name: String,
    pub(crate) symbols: SymbolTable,
    pub(crate) locals: Vec<LocalInfo>,
    pub(crate) generics: Vec<GenericParamInfo>,
    pub(crate) self_type: Option<Type>,
    pub(crate) obligations: Vec<Obligation>,
    pub(crate) literal_vars: Vec<TypeVarId>,
    pub(crate) return_types: Vec<Type>,
    pub(crate) lambda_frames: Vec<LambdaFrame>,
    pub(crate) loop_depth: usize,
    /// Errors reported while checking this body
    pub(crate) errors: usize,
    /// Uses a declaration whose signature failed to resolve
    pub(crate) tainted: bool,
}

impl<'a> TypeChecker<'a> {
    /// Check one queued body. `None` when checking was aborted.
    pub(crate) fn check_body(&mut self, pending: PendingBody<'_>) -> Option<TypedFunction> {
        let name = pending.key.to_string();
        let poisoned = self.poisoned.contains(&name);
        let definition = pending.definition;
        debug!(function = %name, "checking body");

        let mut body = BodyChecker::new(self, name.clone(), pending.generics.clone(), pending.self_type.clone());
        body.tainted = poisoned;

        let self_param = pending.self_type.as_ref().map(|self_type| {
            let local = body.define_local("self", self_type.clone(), false, definition.span);
            (local, self_type.clone())
        });
        let params = definition
            .parameters
            .iter()
            .zip(pending.params.iter())
            .map(|(param, ty)| (body.define_local(&param.name.name, ty.clone(), true, param.span), ty.clone()))
            .collect();

        body.return_types.push(pending.ret.clone());
        let expected = (!pending.ret.is_void()).then_some(&pending.ret);
        let checked = body.check_block(&definition.body, expected);

        let typed_body = match checked {
            Ok(block) => block,
            Err(Abort) => {
                debug!(function = %name, "aborted body");
                return None;
            }
        };

        if !pending.ret.is_void() && typed_body.value().is_none() && !typed_body.diverges {
            body.report(CheckError::MissingReturn {
                function: name.clone(),
                ret: pending.ret.clone(),
                span: at(definition.name.span),
            });
        }

        let mut function = TypedFunction {
            key: pending.key,
            generics: pending.generics,
            self_param,
            params,
            ret: pending.ret,
            is_async: definition.is_async,
            body: typed_body,
            locals: Vec::new(),
            has_errors: false,
            span: definition.span,
        };
        body.finish(&mut function).ok()?;
        Some(function)
    }
}

impl<'c, 'a> BodyChecker<'c, 'a> {
    pub fn new(
        checker: &'c mut TypeChecker<'a>,
        name: String,
        generics: Vec<GenericParamInfo>,
        self_type: Option<Type>,
    ) -> Self {
        Self {
            checker,
            name,
            symbols: SymbolTable::new(),
            locals: Vec::new(),
            generics,
            self_type,
            obligations: Vec::new(),
            literal_vars: Vec::new(),
            return_types: Vec::new(),
            lambda_frames: Vec::new(),
            loop_depth: 0,
            errors: 0,
            tainted: false,
        }
    }

    pub(crate) fn report(&mut self, error: impl Into<CompileError>) {
        self.errors += 1;
        self.checker.report(error);
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.errors > 0 || self.tainted
    }

    pub(crate) fn fresh_var(&mut self) -> Type {
        self.checker.ctx.fresh_var()
    }

    pub(crate) fn apply(&self, ty: &Type) -> Type {
        self.checker.ctx.apply(ty)
    }

    /// Unify and record a failure. `Ok(false)` means a recoverable mismatch.
    pub(crate) fn unify(&mut self, expected: &Type, found: &Type, span: Span) -> Result<bool, Abort> {
        match unify(&mut self.checker.ctx.substitution, expected, found, span) {
            Ok(()) => Ok(true),
            Err(error @ UnificationError::InfiniteType { .. }) => {
                self.report(error);
                Err(Abort)
            }
            Err(error) => {
                self.report(error);
                Ok(false)
            }
        }
    }

    pub(crate) fn define_local(&mut self, name: &str, ty: Type, mutable: bool, span: Span) -> LocalId {
        let local = LocalId(self.locals.len() as u32);
        self.locals.push(LocalInfo {
            name: name.to_string(),
            ty: ty.clone(),
            mutable,
            span,
        });
        self.symbols.define(
            name,
            Binding {
                local,
                ty,
                mutable,
                span,
            },
        );
        local
    }

    /// Look a name up, recording captures for every lambda it crosses
    pub(crate) fn lookup_local(&mut self, name: &str) -> Option<Binding> {
        let (depth, binding) = self.symbols.lookup_scoped(name)?;
        let binding = binding.clone();
        for frame in &mut self.lambda_frames {
            if depth < frame.scope_depth && !frame.captures.contains(&binding.local) {
                frame.captures.push(binding.local);
            }
        }
        Some(binding)
    }

    /// True when `name` resolves outside the innermost lambda
    pub(crate) fn is_captured(&self, name: &str) -> bool {
        match (self.symbols.lookup_scoped(name), self.lambda_frames.last()) {
            (Some((depth, _)), Some(frame)) => depth < frame.scope_depth,
            _ => false,
        }
    }

    pub(crate) fn require_trait(&mut self, ty: &Type, trait_name: &str, span: Span) {
        self.obligations.push(Obligation {
            ty: ty.clone(),
            trait_name: trait_name.to_string(),
            span,
            literal: false,
        });
    }

    /// Type of an integer literal: a fresh variable that must be numeric
    pub(crate) fn literal_var(&mut self, span: Span) -> Type {
        let var = self.fresh_var();
        if let Some(id) = var.as_variable() {
            self.literal_vars.push(id);
        }
        self.obligations.push(Obligation {
            ty: var.clone(),
            trait_name: NUM_TRAIT.to_string(),
            span,
            literal: true,
        });
        var
    }

    /// Type of `null`: a fresh variable that must be a reference type.
    /// Left unconstrained it is reported as unresolved, not as a trait failure.
    pub(crate) fn null_var(&mut self, span: Span) -> Type {
        let var = self.fresh_var();
        self.obligations.push(Obligation {
            ty: var.clone(),
            trait_name: NULLABLE_TRAIT.to_string(),
            span,
            literal: true,
        });
        var
    }

    /// Placeholder for an expression that failed to check
    pub(crate) fn error_expression(&mut self, span: Span) -> TypedExpression {
        let ty = self.fresh_var();
        TypedExpression::new(TypedExpressionKind::Tuple(Vec::new()), ty, span)
    }

    /// Settle every obligation whose type is now known.
    ///
    /// On the final pass anything still deferred is an error.
    pub(crate) fn process_obligations(&mut self, final_pass: bool) -> Result<(), Abort> {
        let pending = std::mem::take(&mut self.obligations);
        for obligation in pending {
            let ty = self.apply(&obligation.ty);
            let resolution = self
                .checker
                .ctx
                .traits
                .resolve(&ty, &obligation.trait_name, &self.generics);
            trace!(trait_name = %obligation.trait_name, ty = %ty, ?resolution, "obligation");
            match resolution {
                Resolution::Impl(_) | Resolution::Bound => {}
                Resolution::Deferred if !final_pass => self.obligations.push(obligation),
                Resolution::Deferred => {
                    if !obligation.literal && !self.has_errors() {
                        self.report(TraitError::TraitNotSatisfied {
                            trait_name: obligation.trait_name,
                            ty,
                            span: at(obligation.span),
                        });
                    }
                }
                Resolution::Missing => {
                    self.report(TraitError::TraitNotSatisfied {
                        trait_name: obligation.trait_name,
                        ty,
                        span: at(obligation.span),
                    });
                }
                Resolution::Ambiguous(candidates) => {
                    let candidates = self.checker.ctx.traits.describe_impls(&candidates);
                    self.report(TraitError::AmbiguousTraitImpl {
                        trait_name: obligation.trait_name,
                        ty,
                        candidates,
                        span: at(obligation.span),
                    });
                    return Err(Abort);
                }
            }
        }
        Ok(())
    }

    /// Default literals, settle obligations and write final types into the tree
    fn finish(mut self, function: &mut TypedFunction) -> Result<(), Abort> {
        self.process_obligations(false)?;
        if self.checker.options.default_int_literals {
            for var in std::mem::take(&mut self.literal_vars) {
                let ty = self.apply(&Type::Variable(var));
                if ty.as_variable().is_some() {
                    trace!(var = var.0, "default literal to int");
                    self.unify(&ty, &Type::int(), Span::default())?;
                }
            }
        }
        self.process_obligations(true)?;

        let substitution = self.checker.ctx.substitution.clone();
        let mut zonker = Zonker {
            substitution: &substitution,
            unresolved: None,
        };
        zonker.block(&mut function.body);
        function.ret = zonker.ty(&function.ret);
        for (_, ty) in function.params.iter_mut().chain(function.self_param.iter_mut()) {
            *ty = zonker.ty(ty);
        }
        function.locals = std::mem::take(&mut self.locals);
        for local in &mut function.locals {
            local.ty = substitution.apply(&local.ty);
            if zonker.unresolved.is_none() && local.ty.has_vars() {
                zonker.unresolved = Some((format!("local {}", local.name), local.ty.clone(), local.span));
            }
        }

        if let Some((what, ty, span)) = zonker.unresolved.take() {
            if !self.has_errors() {
                self.report(CheckError::UnresolvedType {
                    what,
                    ty,
                    span: at(span),
                });
            }
        }
        function.has_errors = self.has_errors();
        debug!(function = %self.name, errors = self.errors, "checked body");
        Ok(())
    }
}

/// True when control cannot continue past this expression
pub(crate) fn diverges(expression: &TypedExpression) -> bool {
    match &expression.kind {
        TypedExpressionKind::Block(block) => block.diverges,
        TypedExpressionKind::If {
            then_block,
            else_block: Some(else_block),
            ..
        } => then_block.diverges && else_block.diverges,
        TypedExpressionKind::Match(matched) => {
            !matched.arms.is_empty() && matched.arms.iter().all(|arm| diverges(&arm.body))
        }
        _ => false,
    }
}

/// Applies the final substitution to a typed body, remembering the first leftover variable
struct Zonker<'s> {
    substitution: &'s Substitution,
    unresolved: Option<(String, Type, Span)>,
}

impl Zonker<'_> {
    fn ty(&self, ty: &Type) -> Type {
        self.substitution.apply(ty)
    }

    fn types(&self, types: &mut [Type]) {
        for ty in types {
            *ty = self.ty(ty);
        }
    }

    fn block(&mut self, block: &mut TypedBlock) {
        block.ty = self.ty(&block.ty);
        for statement in &mut block.statements {
            match &mut statement.kind {
                TypedStatementKind::Let { value, .. } => self.expression(value),
                TypedStatementKind::Assign { target, value } => {
                    match target {
                        AssignTarget::Local(_) => {}
                        AssignTarget::Field { object, .. } => self.expression(object),
                        AssignTarget::Index { target, index } => {
                            self.expression(target);
                            self.expression(index);
                        }
                    }
                    self.expression(value);
                }
                TypedStatementKind::Expression(expression) => self.expression(expression),
                TypedStatementKind::Return(value) => {
                    if let Some(value) = value {
                        self.expression(value);
                    }
                }
                TypedStatementKind::While { condition, body } => {
                    self.expression(condition);
                    self.block(body);
                }
                TypedStatementKind::For { iterable, body, .. } => {
                    self.expression(iterable);
                    self.block(body);
                }
                TypedStatementKind::Break | TypedStatementKind::Continue => {}
            }
        }
    }

    fn expression(&mut self, expression: &mut TypedExpression) {
        expression.ty = self.ty(&expression.ty);
        if self.unresolved.is_none() && expression.ty.has_vars() {
            self.unresolved = Some(("expression".to_string(), expression.ty.clone(), expression.span));
        }

        match &mut expression.kind {
            TypedExpressionKind::Integer(_)
            | TypedExpressionKind::Float(_)
            | TypedExpressionKind::Boolean(_)
            | TypedExpressionKind::String(_)
            | TypedExpressionKind::Null
            | TypedExpressionKind::Local(_) => {}
            TypedExpressionKind::FunctionRef { type_args, .. } => self.types(type_args),
            TypedExpressionKind::List(elements) | TypedExpressionKind::Tuple(elements) => {
                elements.iter_mut().for_each(|element| self.expression(element));
            }
            TypedExpressionKind::Binary { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            TypedExpressionKind::Unary { operand, .. } => self.expression(operand),
            TypedExpressionKind::Call { callee, arguments } => {
                match callee {
                    Callee::Function { type_args, .. }
                    | Callee::Method { type_args, .. }
                    | Callee::ImplMethod { type_args, .. }
                    | Callee::Builtin { type_args, .. } => self.types(type_args),
                    Callee::TraitMethod { .. } => {}
                    Callee::Value(value) => self.expression(value),
                }
                arguments.iter_mut().for_each(|argument| self.expression(argument));
            }
            TypedExpressionKind::FieldAccess { object, .. } => self.expression(object),
            TypedExpressionKind::Index { target, index } => {
                self.expression(target);
                self.expression(index);
            }
            TypedExpressionKind::Lambda(lambda) => self.expression(&mut lambda.body),
            TypedExpressionKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.expression(condition);
                self.block(then_block);
                if let Some(else_block) = else_block {
                    self.block(else_block);
                }
            }
            TypedExpressionKind::Match(matched) => {
                self.expression(&mut matched.scrutinee);
                for arm in &mut matched.arms {
                    self.pattern(&mut arm.pattern);
                    if let Some(guard) = &mut arm.guard {
                        self.expression(guard);
                    }
                    self.expression(&mut arm.body);
                }
            }
            TypedExpressionKind::Block(block) => self.block(block),
            TypedExpressionKind::Object { fields, .. } | TypedExpressionKind::Variant { fields, .. } => {
                fields.iter_mut().for_each(|field| self.expression(field));
            }
            TypedExpressionKind::Await { task, .. } => self.expression(task),
            TypedExpressionKind::Parallel { arms, .. } => {
                arms.iter_mut().for_each(|arm| self.expression(&mut arm.expression));
            }
        }
    }

    fn pattern(&mut self, pattern: &mut TypedPattern) {
        pattern.ty = self.ty(&pattern.ty);
        match &mut pattern.kind {
            TypedPatternKind::Wildcard | TypedPatternKind::Binding(_) | TypedPatternKind::Literal(_) => {}
            TypedPatternKind::Tuple(fields)
            | TypedPatternKind::Variant { fields, .. }
            | TypedPatternKind::Class { fields, .. } => {
                fields.iter_mut().for_each(|field| self.pattern(field));
            }
        }
    }
}
