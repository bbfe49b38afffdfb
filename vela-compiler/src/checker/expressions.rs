//! Expression inference
//!
//! Bidirectional: [`BodyChecker::synth`] builds a type bottom-up,
//! [`BodyChecker::check`] pushes an expected type down into literals,
//! lambdas, blocks and branches and unifies whatever comes back.

use super::functions::{diverges, BodyChecker, LambdaFrame};
use crate::builtins::{lookup_builtin_call, ADD_TRAIT, EQ_TRAIT, NULLABLE_TRAIT, NUM_TRAIT, ORD_TRAIT};
use crate::context::{generic_mapping, LocalId};
use crate::desugaring::DesugaringVisitor;
use crate::error::{at, Abort, CheckError, TraitError, UnificationError};
use crate::traits::{MethodSignature, Resolution};
use crate::typed_ast::{
    Callee, TypedBlock, TypedExpression, TypedExpressionKind, TypedLambda, TypedMatch,
    TypedMatchArm, TypedParallelArm, TypedStatement, TypedStatementKind,
};
use crate::types::{GenericParamInfo, Type, SELF_TYPE};
use crate::unification::instantiate;
use indexmap::IndexMap;
use vela_ast::{
    BinaryOperation, BinaryOperator, Expression, ExpressionKind, FieldAccess, FunctionCall,
    IfExpression, IndexExpression, Lambda, MatchArm, MatchExpression, MethodCall, ObjectLiteral,
    ParallelBlock, Span, UnaryOperation, UnaryOperator, VariantPath,
};

type Checked<T = TypedExpression> = Result<T, Abort>;

/// Parameters and return type of a function type
fn split_function(ty: &Type) -> (Vec<Type>, Type) {
    match ty {
        Type::Function { params, ret } => (params.clone(), (**ret).clone()),
        other => (Vec::new(), other.clone()),
    }
}

/// The type of an async function used as a value: calling it yields a task
fn async_value_type(ty: Type) -> Type {
    match ty {
        Type::Function { params, ret } => Type::function(params, Type::task(*ret)),
        other => other,
    }
}

impl BodyChecker<'_, '_> {
    pub fn synth(&mut self, expression: &Expression) -> Checked {
        self.infer(expression, None)
    }

    pub fn check(&mut self, expression: &Expression, expected: &Type) -> Checked {
        let typed = self.infer(expression, Some(expected))?;
        self.unify(expected, &typed.ty, expression.span)?;
        Ok(typed)
    }

    fn infer(&mut self, expression: &Expression, expected: Option<&Type>) -> Checked {
        let span = expression.span;
        match &expression.kind {
            ExpressionKind::Integer(value) => {
                let ty = self.literal_var(span);
                Ok(TypedExpression::new(TypedExpressionKind::Integer(*value), ty, span))
            }
            ExpressionKind::Float(value) => Ok(TypedExpression::new(
                TypedExpressionKind::Float(*value),
                Type::float(),
                span,
            )),
            ExpressionKind::Boolean(value) => Ok(TypedExpression::new(
                TypedExpressionKind::Boolean(*value),
                Type::bool(),
                span,
            )),
            ExpressionKind::String(value) => Ok(TypedExpression::new(
                TypedExpressionKind::String(value.clone()),
                Type::str(),
                span,
            )),
            ExpressionKind::Null => {
                let ty = self.null_var(span);
                Ok(TypedExpression::new(TypedExpressionKind::Null, ty, span))
            }
            ExpressionKind::Identifier(identifier) => self.infer_identifier(&identifier.name, span),
            ExpressionKind::List(elements) => {
                let element_ty = match expected.map(|ty| self.apply(ty)) {
                    Some(Type::List(element)) => *element,
                    _ => self.fresh_var(),
                };
                let elements = elements
                    .iter()
                    .map(|element| self.check(element, &element_ty))
                    .collect::<Checked<Vec<_>>>()?;
                Ok(TypedExpression::new(
                    TypedExpressionKind::List(elements),
                    Type::list(element_ty),
                    span,
                ))
            }
            ExpressionKind::Tuple(elements) => {
                let expected_elements = match expected.map(|ty| self.apply(ty)) {
                    Some(Type::Tuple(types)) if types.len() == elements.len() => Some(types),
                    _ => None,
                };
                let elements = elements
                    .iter()
                    .enumerate()
                    .map(|(index, element)| match &expected_elements {
                        Some(types) => self.check(element, &types[index]),
                        None => self.synth(element),
                    })
                    .collect::<Checked<Vec<_>>>()?;
                let ty = Type::Tuple(elements.iter().map(|element| element.ty.clone()).collect());
                Ok(TypedExpression::new(TypedExpressionKind::Tuple(elements), ty, span))
            }
            ExpressionKind::Binary(operation) => self.infer_binary(operation, span),
            ExpressionKind::Unary(operation) => self.infer_unary(operation, span),
            ExpressionKind::Call(call) => self.infer_call(call, span),
            ExpressionKind::MethodCall(call) => self.infer_method_call(call, span),
            ExpressionKind::FieldAccess(access) => self.infer_field_access(access, span),
            ExpressionKind::Index(index) => self.infer_index(index, span),
            ExpressionKind::Lambda(lambda) => self.infer_lambda(lambda, expected, span),
            ExpressionKind::Pipeline(_) => {
                let desugared = DesugaringVisitor::desugar_expression(expression.clone());
                self.infer(&desugared, expected)
            }
            ExpressionKind::If(if_expression) => self.infer_if(if_expression, expected, span),
            ExpressionKind::Match(matched) => self.infer_match(matched, expected, span),
            ExpressionKind::Block(block) => {
                let block = self.check_block(block, expected)?;
                let ty = block.ty.clone();
                Ok(TypedExpression::new(TypedExpressionKind::Block(block), ty, span))
            }
            ExpressionKind::Object(object) => self.infer_object(object, span),
            ExpressionKind::Variant(path) => self.infer_variant(path, &[], span),
            ExpressionKind::Await(task) => {
                let task = self.synth(task)?;
                let result = self.fresh_var();
                self.unify(&Type::task(result.clone()), &task.ty, task.span)?;
                Ok(TypedExpression::new(
                    TypedExpressionKind::Await {
                        task: Box::new(task),
                        state: None,
                    },
                    result,
                    span,
                ))
            }
            ExpressionKind::Parallel(block) => self.infer_parallel(block, span),
        }
    }

    fn note_use(&mut self, declaration: &str) {
        if self.checker.poisoned.contains(declaration) {
            self.tainted = true;
        }
    }

    /// Fresh variables for generic parameters, with their bounds as obligations
    pub(crate) fn instantiate_generics(&mut self, generics: &[GenericParamInfo], span: Span) -> Vec<Type> {
        generics
            .iter()
            .map(|generic| {
                let var = self.fresh_var();
                for bound in &generic.bounds {
                    self.require_trait(&var, bound, span);
                }
                var
            })
            .collect()
    }

    fn check_arguments(
        &mut self,
        what: &str,
        params: &[Type],
        arguments: &[Expression],
        span: Span,
    ) -> Checked<Vec<TypedExpression>> {
        if params.len() != arguments.len() {
            self.report(UnificationError::ArityMismatch {
                what: format!("{what} arguments"),
                expected: params.len(),
                found: arguments.len(),
                span: at(span),
            });
        }
        arguments
            .iter()
            .enumerate()
            .map(|(index, argument)| match params.get(index) {
                Some(param) => self.check(argument, param),
                None => self.synth(argument),
            })
            .collect()
    }

    /// Check what can still be checked after a failed lookup
    fn recover(&mut self, arguments: &[Expression], span: Span) -> Checked {
        for argument in arguments {
            self.synth(argument)?;
        }
        Ok(self.error_expression(span))
    }

    fn infer_identifier(&mut self, name: &str, span: Span) -> Checked {
        if let Some(binding) = self.lookup_local(name) {
            return Ok(TypedExpression::new(
                TypedExpressionKind::Local(binding.local),
                binding.ty,
                span,
            ));
        }
        if let Some(info) = self.checker.ctx.functions.get(name).cloned() {
            self.note_use(name);
            let instance = instantiate(&info.scheme, &mut self.checker.ctx.type_vars);
            for (ty, bound) in &instance.obligations {
                self.require_trait(ty, bound, span);
            }
            let ty = if info.is_async {
                async_value_type(instance.ty)
            } else {
                instance.ty
            };
            return Ok(TypedExpression::new(
                TypedExpressionKind::FunctionRef {
                    name: name.to_string(),
                    type_args: instance.type_args,
                },
                ty,
                span,
            ));
        }
        self.report(CheckError::UnboundIdentifier {
            name: name.to_string(),
            span: at(span),
        });
        Ok(self.error_expression(span))
    }

    fn infer_binary(&mut self, operation: &BinaryOperation, span: Span) -> Checked {
        let (left, right, ty) = match operation.operator {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = self.check(&operation.left, &Type::bool())?;
                let right = self.check(&operation.right, &Type::bool())?;
                (left, right, Type::bool())
            }
            operator => {
                let left = self.synth(&operation.left)?;
                let right = self.check(&operation.right, &left.ty)?;
                let (trait_name, ty) = match operator {
                    BinaryOperator::Add => (ADD_TRAIT, left.ty.clone()),
                    BinaryOperator::Subtract
                    | BinaryOperator::Multiply
                    | BinaryOperator::Divide
                    | BinaryOperator::Modulo
                    | BinaryOperator::Exponent => (NUM_TRAIT, left.ty.clone()),
                    // Any nullable value compares against `null` by identity.
                    BinaryOperator::Equal | BinaryOperator::NotEqual
                        if is_null(&operation.left) || is_null(&operation.right) =>
                    {
                        (NULLABLE_TRAIT, Type::bool())
                    }
                    BinaryOperator::Equal | BinaryOperator::NotEqual => (EQ_TRAIT, Type::bool()),
                    _ => (ORD_TRAIT, Type::bool()),
                };
                self.require_trait(&left.ty, trait_name, span);
                (left, right, ty)
            }
        };
        Ok(TypedExpression::new(
            TypedExpressionKind::Binary {
                operator: operation.operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn infer_unary(&mut self, operation: &UnaryOperation, span: Span) -> Checked {
        let operand = match operation.operator {
            UnaryOperator::Not => self.check(&operation.operand, &Type::bool())?,
            UnaryOperator::Minus => {
                let operand = self.synth(&operation.operand)?;
                self.require_trait(&operand.ty, NUM_TRAIT, span);
                operand
            }
        };
        let ty = operand.ty.clone();
        Ok(TypedExpression::new(
            TypedExpressionKind::Unary {
                operator: operation.operator,
                operand: Box::new(operand),
            },
            ty,
            span,
        ))
    }

    fn infer_call(&mut self, call: &FunctionCall, span: Span) -> Checked {
        match &call.callee.kind {
            ExpressionKind::Identifier(identifier) if self.symbols.lookup_scoped(&identifier.name).is_none() => {
                let name = identifier.name.as_str();
                if let Some(info) = self.checker.ctx.functions.get(name).cloned() {
                    self.note_use(name);
                    let instance = instantiate(&info.scheme, &mut self.checker.ctx.type_vars);
                    for (ty, bound) in &instance.obligations {
                        self.require_trait(ty, bound, span);
                    }
                    let (params, ret) = split_function(&instance.ty);
                    let arguments = self.check_arguments(name, &params, &call.arguments, span)?;
                    let ty = if info.is_async { Type::task(ret) } else { ret };
                    return Ok(TypedExpression::new(
                        TypedExpressionKind::Call {
                            callee: Callee::Function {
                                name: name.to_string(),
                                type_args: instance.type_args,
                                is_async: info.is_async,
                            },
                            arguments,
                        },
                        ty,
                        span,
                    ));
                }
                if let Some(builtin) = lookup_builtin_call(name, call.arguments.len()) {
                    let instance = instantiate(&builtin.scheme, &mut self.checker.ctx.type_vars);
                    for (ty, bound) in &instance.obligations {
                        self.require_trait(ty, bound, span);
                    }
                    let (params, ret) = split_function(&instance.ty);
                    let arguments = self.check_arguments(name, &params, &call.arguments, span)?;
                    return Ok(TypedExpression::new(
                        TypedExpressionKind::Call {
                            callee: Callee::Builtin {
                                builtin: builtin.builtin,
                                type_args: instance.type_args,
                            },
                            arguments,
                        },
                        ret,
                        span,
                    ));
                }
                self.report(CheckError::UnboundIdentifier {
                    name: name.to_string(),
                    span: at(call.callee.span),
                });
                self.recover(&call.arguments, span)
            }
            ExpressionKind::Variant(path) => self.infer_variant(path, &call.arguments, span),
            _ => self.infer_value_call(&call.callee, &call.arguments, span),
        }
    }

    fn infer_value_call(&mut self, callee: &Expression, arguments: &[Expression], span: Span) -> Checked {
        let callee = self.synth(callee)?;
        let (params, ret) = match self.apply(&callee.ty) {
            Type::Function { params, ret } => (params, *ret),
            var @ Type::Variable(_) => {
                let params: Vec<Type> = arguments.iter().map(|_| self.fresh_var()).collect();
                let ret = self.fresh_var();
                self.unify(&var, &Type::function(params.clone(), ret.clone()), callee.span)?;
                (params, ret)
            }
            other => {
                self.report(CheckError::NotAFunction {
                    ty: other,
                    span: at(callee.span),
                });
                return self.recover(arguments, span);
            }
        };
        let arguments = self.check_arguments("function value", &params, arguments, span)?;
        Ok(TypedExpression::new(
            TypedExpressionKind::Call {
                callee: Callee::Value(Box::new(callee)),
                arguments,
            },
            ret,
            span,
        ))
    }

    /// `Shape.Circle(r)` or a bare `Circle(r)`; `arguments` is empty for unit variants
    fn infer_variant(&mut self, path: &VariantPath, arguments: &[Expression], span: Span) -> Checked {
        let enum_name = path.enum_name.as_ref().map(|name| name.name.as_str());
        let found = self
            .checker
            .ctx
            .lookup_variant(enum_name, &path.variant.name, path.span)
            .map(|(info, variant)| (info.name.clone(), info.generics.clone(), variant.clone()));
        let (enum_name, generics, variant) = match found {
            Ok(found) => found,
            Err(error) => {
                self.report(error);
                return self.recover(arguments, span);
            }
        };

        let args = self.instantiate_generics(&generics, span);
        let mapping = generic_mapping(&generics, &args);
        let params: Vec<Type> = variant
            .fields
            .iter()
            .map(|field| field.substitute_generics(&mapping))
            .collect();
        let fields = self.check_arguments(
            &format!("{enum_name}.{}", variant.name),
            &params,
            arguments,
            span,
        )?;
        Ok(TypedExpression::new(
            TypedExpressionKind::Variant {
                enum_name: enum_name.clone(),
                variant: variant.name,
                tag: variant.tag,
                fields,
            },
            Type::nominal(enum_name, args),
            span,
        ))
    }

    fn method_call(
        &mut self,
        receiver: TypedExpression,
        callee: Callee,
        signature: &MethodSignature,
        mapping: &IndexMap<String, Type>,
        call: &MethodCall,
        span: Span,
    ) -> Checked {
        let params: Vec<Type> = signature
            .params
            .iter()
            .map(|ty| ty.substitute_generics(mapping))
            .collect();
        let ret = signature.ret.substitute_generics(mapping);
        let mut arguments = vec![receiver];
        arguments.extend(self.check_arguments(&call.method.name, &params, &call.arguments, span)?);
        let ty = if signature.is_async { Type::task(ret) } else { ret };
        Ok(TypedExpression::new(
            TypedExpressionKind::Call { callee, arguments },
            ty,
            span,
        ))
    }

    fn infer_method_call(&mut self, call: &MethodCall, span: Span) -> Checked {
        let receiver = self.synth(&call.receiver)?;
        let receiver_ty = self.apply(&receiver.ty);
        let method = call.method.name.as_str();

        match &receiver_ty {
            Type::Variable(_) => {
                self.report(CheckError::UnresolvedType {
                    what: format!("receiver of .{method}()"),
                    ty: receiver_ty.clone(),
                    span: at(call.receiver.span),
                });
                return self.recover(&call.arguments, span);
            }
            Type::Generic(name) => {
                let name = name.clone();
                return self.infer_bound_method_call(receiver, &receiver_ty, &name, call, span);
            }
            Type::Nominal { name, args } => {
                let found = self.checker.ctx.classes.get(name).and_then(|class| {
                    class
                        .methods
                        .get(method)
                        .map(|signature| (class.generics.clone(), signature.clone()))
                });
                if let Some((class_generics, signature)) = found {
                    self.note_use(&format!("{name}.{method}"));
                    let own_args = self.instantiate_generics(&signature.generics, span);
                    let mut mapping = generic_mapping(&class_generics, args);
                    mapping.extend(generic_mapping(&signature.generics, &own_args));
                    let callee = Callee::Method {
                        class: name.clone(),
                        method: method.to_string(),
                        type_args: args.iter().cloned().chain(own_args).collect(),
                        is_async: signature.is_async,
                    };
                    return self.method_call(receiver, callee, &signature, &mapping, call, span);
                }
            }
            _ => {}
        }

        self.infer_impl_method_call(receiver, &receiver_ty, call, span)
    }

    /// Method on a generic parameter, found through the parameter's bounds
    fn infer_bound_method_call(
        &mut self,
        receiver: TypedExpression,
        receiver_ty: &Type,
        generic: &str,
        call: &MethodCall,
        span: Span,
    ) -> Checked {
        let method = call.method.name.as_str();
        let bounds = self
            .generics
            .iter()
            .find(|candidate| candidate.name == generic)
            .map(|candidate| candidate.bounds.clone())
            .unwrap_or_default();
        let found = bounds.iter().find_map(|bound| {
            self.checker
                .ctx
                .traits
                .get_trait(bound)
                .and_then(|info| info.methods.get(method))
                .map(|signature| (bound.clone(), signature.clone()))
        });

        let Some((trait_name, signature)) = found else {
            self.report(CheckError::UnknownMethod {
                ty: receiver_ty.clone(),
                method: method.to_string(),
                span: at(call.method.span),
            });
            return self.recover(&call.arguments, span);
        };

        let mut mapping = IndexMap::new();
        mapping.insert(SELF_TYPE.to_string(), receiver_ty.clone());
        let callee = Callee::TraitMethod {
            trait_name,
            method: method.to_string(),
            is_async: signature.is_async,
        };
        self.method_call(receiver, callee, &signature, &mapping, call, span)
    }

    /// Method provided by an `impl` block for the receiver's type
    fn infer_impl_method_call(
        &mut self,
        receiver: TypedExpression,
        receiver_ty: &Type,
        call: &MethodCall,
        span: Span,
    ) -> Checked {
        let method = call.method.name.as_str();
        let candidates: Vec<String> = self
            .checker
            .ctx
            .traits
            .traits_with_method(method)
            .iter()
            .map(|info| info.name.clone())
            .collect();

        for trait_name in candidates {
            match self.checker.ctx.traits.resolve(receiver_ty, &trait_name, &self.generics) {
                Resolution::Impl(found) => {
                    let Some(info) = self.checker.ctx.traits.get_impl(found.impl_id).cloned() else {
                        continue;
                    };
                    let Some(signature) = info.methods.get(method).cloned() else {
                        continue;
                    };
                    self.note_use(&format!("{}.{method}", info.display_name()));
                    let impl_args = found.type_args(&info);
                    let own_args = self.instantiate_generics(&signature.generics, span);
                    let mut mapping = generic_mapping(&info.generics, &impl_args);
                    mapping.extend(generic_mapping(&signature.generics, &own_args));
                    let callee = Callee::ImplMethod {
                        impl_id: info.id,
                        method: method.to_string(),
                        type_args: impl_args.into_iter().chain(own_args).collect(),
                        is_async: signature.is_async,
                    };
                    return self.method_call(receiver, callee, &signature, &mapping, call, span);
                }
                Resolution::Ambiguous(ids) => {
                    let candidates = self.checker.ctx.traits.describe_impls(&ids);
                    self.report(TraitError::AmbiguousTraitImpl {
                        trait_name,
                        ty: receiver_ty.clone(),
                        candidates,
                        span: at(span),
                    });
                    return Err(Abort);
                }
                Resolution::Deferred => {
                    self.report(CheckError::UnresolvedType {
                        what: format!("receiver of .{method}()"),
                        ty: receiver_ty.clone(),
                        span: at(call.receiver.span),
                    });
                    return self.recover(&call.arguments, span);
                }
                Resolution::Bound | Resolution::Missing => {}
            }
        }

        self.report(CheckError::UnknownMethod {
            ty: receiver_ty.clone(),
            method: method.to_string(),
            span: at(call.method.span),
        });
        self.recover(&call.arguments, span)
    }

    fn infer_field_access(&mut self, access: &FieldAccess, span: Span) -> Checked {
        let object = self.synth(&access.object)?;
        let object_ty = self.apply(&object.ty);
        let field = access.field.name.as_str();

        if object_ty.as_variable().is_some() {
            self.report(CheckError::UnresolvedType {
                what: format!("receiver of .{field}"),
                ty: object_ty,
                span: at(access.object.span),
            });
            return Ok(self.error_expression(span));
        }
        match self.checker.ctx.field_of(&object_ty, field) {
            Some(info) => Ok(TypedExpression::new(
                TypedExpressionKind::FieldAccess {
                    object: Box::new(object),
                    field: info.name,
                    index: info.index,
                },
                info.ty,
                span,
            )),
            None => {
                self.report(CheckError::UnknownField {
                    ty: object_ty,
                    field: field.to_string(),
                    span: at(access.field.span),
                });
                Ok(self.error_expression(span))
            }
        }
    }

    fn infer_index(&mut self, index: &IndexExpression, span: Span) -> Checked {
        let target = self.synth(&index.target)?;
        let position = self.check(&index.index, &Type::int())?;
        let element = self.fresh_var();
        self.unify(&Type::list(element.clone()), &target.ty, index.target.span)?;
        Ok(TypedExpression::new(
            TypedExpressionKind::Index {
                target: Box::new(target),
                index: Box::new(position),
            },
            element,
            span,
        ))
    }

    fn infer_lambda(&mut self, lambda: &Lambda, expected: Option<&Type>, span: Span) -> Checked {
        let (expected_params, expected_ret) = match expected.map(|ty| self.apply(ty)) {
            Some(Type::Function { params, ret }) if params.len() == lambda.parameters.len() => {
                (Some(params), Some(*ret))
            }
            _ => (None, None),
        };

        self.symbols.push_scope();
        self.lambda_frames.push(LambdaFrame {
            scope_depth: self.symbols.depth(),
            captures: Vec::new(),
        });
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        let result = self.lambda_body(lambda, expected_params, expected_ret);
        self.loop_depth = saved_loop_depth;
        let captures = self
            .lambda_frames
            .pop()
            .map(|frame| frame.captures)
            .unwrap_or_default();
        self.symbols.pop_scope();

        let (params, param_types, ret, body) = result?;
        Ok(TypedExpression::new(
            TypedExpressionKind::Lambda(TypedLambda {
                params,
                captures,
                body: Box::new(body),
            }),
            Type::function(param_types, ret),
            span,
        ))
    }

    #[allow(clippy::type_complexity)]
    fn lambda_body(
        &mut self,
        lambda: &Lambda,
        expected_params: Option<Vec<Type>>,
        expected_ret: Option<Type>,
    ) -> Checked<(Vec<LocalId>, Vec<Type>, Type, TypedExpression)> {
        let mut params = Vec::new();
        let mut param_types = Vec::new();
        for (index, param) in lambda.parameters.iter().enumerate() {
            let expected = expected_params
                .as_ref()
                .and_then(|types| types.get(index))
                .cloned();
            let ty = match &param.type_annotation {
                Some(annotation) => {
                    let resolved = self.checker.ctx.resolve_annotation(
                        annotation,
                        &self.generics,
                        self.self_type.as_ref(),
                    );
                    let ty = match resolved {
                        Ok(ty) => ty,
                        Err(error) => {
                            self.report(error);
                            self.fresh_var()
                        }
                    };
                    if let Some(expected) = expected {
                        self.unify(&expected, &ty, param.span)?;
                    }
                    ty
                }
                None => match expected {
                    Some(expected) => expected,
                    None => self.fresh_var(),
                },
            };
            params.push(self.define_local(&param.name.name, ty.clone(), true, param.span));
            param_types.push(ty);
        }

        let ret = match expected_ret {
            Some(ret) => ret,
            None => self.fresh_var(),
        };
        self.return_types.push(ret.clone());
        let body = self.check(&lambda.body, &ret);
        self.return_types.pop();
        Ok((params, param_types, ret, body?))
    }

    fn infer_if(&mut self, if_expression: &IfExpression, expected: Option<&Type>, span: Span) -> Checked {
        let condition = self.check(&if_expression.condition, &Type::bool())?;

        let Some(else_branch) = &if_expression.else_branch else {
            let then_block = self.check_block(&if_expression.then_block, None)?;
            return Ok(TypedExpression::new(
                TypedExpressionKind::If {
                    condition: Box::new(condition),
                    then_block,
                    else_block: None,
                },
                Type::void(),
                span,
            ));
        };

        let then_block = self.check_block(&if_expression.then_block, expected)?;
        let branch_ty = expected
            .cloned()
            .or_else(|| (!then_block.diverges).then(|| then_block.ty.clone()));
        let else_block = self.else_block(else_branch, branch_ty.as_ref())?;
        let ty = match branch_ty {
            Some(ty) => ty,
            None => else_block.ty.clone(),
        };
        for block in [&then_block, &else_block] {
            if !block.diverges {
                self.unify(&ty, &block.ty, block.span)?;
            }
        }

        Ok(TypedExpression::new(
            TypedExpressionKind::If {
                condition: Box::new(condition),
                then_block,
                else_block: Some(else_block),
            },
            ty,
            span,
        ))
    }

    /// `else { .. }` or `else if ..`, as a block
    fn else_block(&mut self, else_branch: &Expression, expected: Option<&Type>) -> Checked<TypedBlock> {
        if let ExpressionKind::Block(block) = &else_branch.kind {
            return self.check_block(block, expected);
        }
        let expression = match expected {
            Some(expected) => self.check(else_branch, expected)?,
            None => self.synth(else_branch)?,
        };
        Ok(TypedBlock {
            ty: expression.ty.clone(),
            diverges: diverges(&expression),
            span: else_branch.span,
            statements: vec![TypedStatement {
                kind: TypedStatementKind::Expression(expression),
                span: else_branch.span,
            }],
        })
    }

    fn infer_match(&mut self, matched: &MatchExpression, expected: Option<&Type>, span: Span) -> Checked {
        let scrutinee = self.synth(&matched.scrutinee)?;
        let mut result_ty = expected.cloned();
        let mut arms = Vec::with_capacity(matched.arms.len());

        for arm in &matched.arms {
            self.symbols.push_scope();
            let checked = self.match_arm(arm, &scrutinee.ty, result_ty.as_ref());
            self.symbols.pop_scope();
            let arm = checked?;
            if result_ty.is_none() && !diverges(&arm.body) {
                result_ty = Some(arm.body.ty.clone());
            }
            arms.push(arm);
        }

        Ok(TypedExpression::new(
            TypedExpressionKind::Match(TypedMatch {
                scrutinee: Box::new(scrutinee),
                arms,
                tree: None,
            }),
            result_ty.unwrap_or_else(Type::void),
            span,
        ))
    }

    fn match_arm(&mut self, arm: &MatchArm, scrutinee_ty: &Type, expected: Option<&Type>) -> Checked<TypedMatchArm> {
        let pattern = self.check_pattern(&arm.pattern, scrutinee_ty)?;
        let guard = match &arm.guard {
            Some(guard) => Some(self.check(guard, &Type::bool())?),
            None => None,
        };
        let body = match expected {
            Some(expected) => self.check(&arm.body, expected)?,
            None => self.synth(&arm.body)?,
        };
        Ok(TypedMatchArm {
            pattern,
            guard,
            body,
            span: arm.span,
        })
    }

    fn infer_object(&mut self, object: &ObjectLiteral, span: Span) -> Checked {
        let Some(class) = self.checker.ctx.classes.get(&object.class_name.name).cloned() else {
            self.report(CheckError::UnknownType {
                name: object.class_name.name.clone(),
                span: at(object.class_name.span),
            });
            for field in &object.fields {
                self.synth(&field.value)?;
            }
            return Ok(self.error_expression(span));
        };

        let args = if object.generic_args.is_empty() {
            self.instantiate_generics(&class.generics, span)
        } else if object.generic_args.len() != class.generics.len() {
            self.report(UnificationError::ArityMismatch {
                what: format!("type {}", class.name),
                expected: class.generics.len(),
                found: object.generic_args.len(),
                span: at(object.class_name.span),
            });
            self.instantiate_generics(&class.generics, span)
        } else {
            let mut args = Vec::new();
            for annotation in &object.generic_args {
                let resolved = self.checker.ctx.resolve_annotation(
                    annotation,
                    &self.generics,
                    self.self_type.as_ref(),
                );
                match resolved {
                    Ok(ty) => args.push(ty),
                    Err(error) => {
                        self.report(error);
                        args.push(self.fresh_var());
                    }
                }
            }
            args
        };
        let ty = Type::nominal(class.name.clone(), args);

        let mut values: Vec<Option<TypedExpression>> = vec![None; class.fields.len()];
        for field in &object.fields {
            let Some(info) = self.checker.ctx.field_of(&ty, &field.name.name) else {
                self.report(CheckError::UnknownField {
                    ty: ty.clone(),
                    field: field.name.name.clone(),
                    span: at(field.name.span),
                });
                self.synth(&field.value)?;
                continue;
            };
            let value = self.check(&field.value, &info.ty)?;
            if values[info.index].is_some() {
                self.report(CheckError::DuplicateDefinition {
                    name: format!("{}.{}", class.name, info.name),
                    span: at(field.name.span),
                });
            }
            values[info.index] = Some(value);
        }

        let mut fields = Vec::with_capacity(values.len());
        let mut complete = true;
        for (name, value) in class.fields.keys().zip(values) {
            match value {
                Some(value) => fields.push(value),
                None => {
                    complete = false;
                    self.report(CheckError::MissingField {
                        class_name: class.name.clone(),
                        field: name.clone(),
                        span: at(span),
                    });
                }
            }
        }
        if !complete {
            return Ok(TypedExpression::new(TypedExpressionKind::Tuple(Vec::new()), ty, span));
        }

        Ok(TypedExpression::new(
            TypedExpressionKind::Object {
                class_name: class.name,
                fields,
            },
            ty,
            span,
        ))
    }

    fn infer_parallel(&mut self, block: &ParallelBlock, span: Span) -> Checked {
        let mut arms = Vec::with_capacity(block.tasks.len());
        let mut results = Vec::with_capacity(block.tasks.len());
        for task in &block.tasks {
            let expression = self.synth(task)?;
            let ty = self.apply(&expression.ty);
            let (awaits_task, result) = match ty.task_result() {
                Some(result) => (true, result.clone()),
                None => (false, ty.clone()),
            };
            results.push(result);
            arms.push(TypedParallelArm {
                expression,
                awaits_task,
                captures: Vec::new(),
            });
        }
        Ok(TypedExpression::new(
            TypedExpressionKind::Parallel { arms, block: None },
            Type::Tuple(results),
            span,
        ))
    }
}

fn is_null(expression: &Expression) -> bool {
    matches!(expression.kind, ExpressionKind::Null)
}
