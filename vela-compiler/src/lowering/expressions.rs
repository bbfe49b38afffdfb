//! Expression lowering

use super::builder::FunctionBuilder;
use super::Requested;
use crate::context::LocalId;
use crate::ir::{BlockId, Constant, Instruction, IrBlock, IrFunction, Op, Terminator, ValueId};
use crate::typed_ast::{Callee, TypedExpression, TypedExpressionKind, TypedLambda, TypedParallelArm};
use crate::types::Type;
use vela_ast::{BinaryOperator, Span};

impl<'p> FunctionBuilder<'_, 'p> {
    pub(super) fn lower_expression(&mut self, expression: &'p TypedExpression) -> ValueId {
        let ty = self.ty(&expression.ty);
        match &expression.kind {
            TypedExpressionKind::Integer(value) if ty.is_float() => {
                self.constant(ty, Constant::Float(*value as f64))
            }
            TypedExpressionKind::Integer(value) => self.constant(ty, Constant::Int(*value)),
            TypedExpressionKind::Float(value) => self.constant(ty, Constant::Float(*value)),
            TypedExpressionKind::Boolean(value) => self.constant(ty, Constant::Bool(*value)),
            TypedExpressionKind::String(value) => self.constant(ty, Constant::Str(value.clone())),
            TypedExpressionKind::Null => self.constant(ty, Constant::Null),
            TypedExpressionKind::Local(local) => self.read_local(*local),
            TypedExpressionKind::FunctionRef { name, type_args } => {
                self.lower_function_ref(name, type_args, ty, expression.span)
            }
            TypedExpressionKind::List(elements) => {
                let elements = self.lower_all(elements);
                self.emit(ty, Op::MakeList(elements))
            }
            TypedExpressionKind::Tuple(elements) => {
                let elements = self.lower_all(elements);
                self.emit(ty, Op::MakeTuple(elements))
            }
            TypedExpressionKind::Binary {
                operator: operator @ (BinaryOperator::And | BinaryOperator::Or),
                left,
                right,
            } => self.lower_short_circuit(*operator, left, right),
            TypedExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.lower_expression(left);
                let right = self.lower_expression(right);
                self.emit(
                    ty,
                    Op::Binary {
                        operator: *operator,
                        left,
                        right,
                    },
                )
            }
            TypedExpressionKind::Unary { operator, operand } => {
                let operand = self.lower_expression(operand);
                self.emit(
                    ty,
                    Op::Unary {
                        operator: *operator,
                        operand,
                    },
                )
            }
            TypedExpressionKind::Call { callee, arguments } => {
                self.lower_call(callee, arguments, ty, expression.span)
            }
            TypedExpressionKind::FieldAccess { object, index, .. } => {
                let object = self.lower_expression(object);
                self.emit(ty, Op::GetField { object, index: *index })
            }
            TypedExpressionKind::Index { target, index } => {
                let list = self.lower_expression(target);
                let index = self.lower_expression(index);
                self.emit(ty, Op::GetIndex { list, index })
            }
            TypedExpressionKind::Lambda(lambda) => self.lower_lambda(lambda, ty),
            TypedExpressionKind::If {
                condition,
                then_block,
                else_block,
            } => {
                let condition = self.lower_expression(condition);
                let then_target = self.new_block();
                let else_target = self.new_block();
                let join = self.new_block();
                let result = (!ty.is_void()).then(|| self.new_slot(ty.clone()));
                self.terminate(Terminator::Branch {
                    condition,
                    then_block: then_target,
                    else_block: else_target,
                });

                self.switch_to(then_target);
                let value = self.lower_block(then_block);
                if let Some(slot) = result {
                    self.emit_store(slot, value);
                }
                self.terminate(Terminator::Jump(join));

                self.switch_to(else_target);
                if let Some(else_block) = else_block {
                    let value = self.lower_block(else_block);
                    if let Some(slot) = result {
                        self.emit_store(slot, value);
                    }
                }
                self.terminate(Terminator::Jump(join));

                self.switch_to(join);
                match result {
                    Some(slot) => self.emit(ty, Op::LoadLocal(slot)),
                    None => self.unit(),
                }
            }
            TypedExpressionKind::Match(matched) => self.lower_match(matched, ty),
            TypedExpressionKind::Block(block) => self.lower_block(block),
            TypedExpressionKind::Object { class_name, fields } => {
                let fields = self.lower_all(fields);
                self.emit(
                    ty,
                    Op::MakeObject {
                        class: class_name.clone(),
                        fields,
                    },
                )
            }
            TypedExpressionKind::Variant {
                enum_name, tag, fields, ..
            } => {
                let fields = self.lower_all(fields);
                self.emit(
                    ty,
                    Op::MakeVariant {
                        enum_name: enum_name.clone(),
                        tag: *tag,
                        fields,
                    },
                )
            }
            TypedExpressionKind::Await { task, state } => {
                let task = self.lower_expression(task);
                self.lower_await(task, state.unwrap_or_default())
            }
            TypedExpressionKind::Parallel { arms, block } => {
                self.lower_parallel(arms, block.unwrap_or_default(), ty)
            }
        }
    }

    fn lower_all(&mut self, expressions: &'p [TypedExpression]) -> Vec<ValueId> {
        expressions
            .iter()
            .map(|expression| self.lower_expression(expression))
            .collect()
    }

    /// Suspend on `task`; the result is defined at the start of the resume block
    fn lower_await(&mut self, task: ValueId, state: usize) -> ValueId {
        let dest = self.fresh_value();
        let resume = self.new_block();
        self.terminate(Terminator::Await {
            task,
            dest,
            resume,
            state,
        });
        self.switch_to(resume);
        dest
    }

    fn lower_short_circuit(
        &mut self,
        operator: BinaryOperator,
        left: &'p TypedExpression,
        right: &'p TypedExpression,
    ) -> ValueId {
        let result = self.new_slot(Type::bool());
        let left = self.lower_expression(left);
        self.emit_store(result, left);

        let rhs = self.new_block();
        let join = self.new_block();
        let (then_block, else_block) = match operator {
            BinaryOperator::And => (rhs, join),
            _ => (join, rhs),
        };
        self.terminate(Terminator::Branch {
            condition: left,
            then_block,
            else_block,
        });

        self.switch_to(rhs);
        let right = self.lower_expression(right);
        self.emit_store(result, right);
        self.terminate(Terminator::Jump(join));

        self.switch_to(join);
        self.emit(Type::bool(), Op::LoadLocal(result))
    }

    fn lower_call(&mut self, callee: &'p Callee, arguments: &'p [TypedExpression], ty: Type, span: Span) -> ValueId {
        let requested = match callee {
            Callee::Builtin { builtin, .. } => {
                let args = self.lower_all(arguments);
                return self.emit(
                    ty,
                    Op::CallBuiltin {
                        builtin: *builtin,
                        args,
                    },
                );
            }
            Callee::Value(value) => {
                let callee = self.lower_expression(value);
                let args = self.lower_all(arguments);
                return self.emit(ty, Op::CallIndirect { callee, args });
            }
            Callee::Function { name, type_args, .. } => {
                let type_args = type_args.iter().map(|arg| self.ty(arg)).collect();
                self.lowering.request_function(name, type_args, span)
            }
            Callee::Method {
                class,
                method,
                type_args,
                ..
            } => {
                let type_args = type_args.iter().map(|arg| self.ty(arg)).collect();
                self.lowering.request_class_method(class, method, type_args, span)
            }
            Callee::ImplMethod {
                impl_id,
                method,
                type_args,
                ..
            } => {
                let type_args = type_args.iter().map(|arg| self.ty(arg)).collect();
                self.lowering.request_impl_method(*impl_id, method, type_args, span)
            }
            Callee::TraitMethod {
                trait_name, method, ..
            } => {
                let receiver = arguments
                    .first()
                    .map(|receiver| self.ty(&receiver.ty))
                    .unwrap_or_else(Type::void);
                self.lowering.request_trait_method(trait_name, method, &receiver, span)
            }
        };

        let args = self.lower_all(arguments);
        match requested {
            Some(Requested {
                name,
                is_async: true,
                ..
            }) => self.emit(ty, Op::SpawnAsync { function: name, args }),
            Some(Requested { name, .. }) => self.emit(ty, Op::Call { function: name, args }),
            // Reported by the request; keep the block well formed.
            None => self.unit(),
        }
    }

    /// A named function as a value. Async functions are wrapped in a thunk that spawns them.
    fn lower_function_ref(&mut self, name: &str, type_args: &[Type], ty: Type, span: Span) -> ValueId {
        let type_args = type_args.iter().map(|arg| self.ty(arg)).collect();
        let Some(requested) = self.lowering.request_function(name, type_args, span) else {
            return self.unit();
        };
        let function = if requested.is_async {
            self.spawn_thunk(&requested)
        } else {
            requested.name
        };
        self.emit(
            ty,
            Op::MakeClosure {
                function,
                captures: Vec::new(),
            },
        )
    }

    fn spawn_thunk(&mut self, requested: &Requested) -> String {
        let name = format!("{}$spawn", requested.name);
        if self.lowering.module.functions.contains_key(&name) {
            return name;
        }
        let params: Vec<(ValueId, Type)> = requested
            .params
            .iter()
            .enumerate()
            .map(|(index, ty)| (ValueId(index as u32), ty.clone()))
            .collect();
        let task = ValueId(params.len() as u32);
        let ret = Type::task(requested.ret.clone());
        let thunk = IrFunction {
            name: name.clone(),
            params: params.clone(),
            ret: ret.clone(),
            is_async: false,
            slots: Vec::new(),
            blocks: vec![IrBlock {
                id: BlockId(0),
                instructions: vec![Instruction {
                    dest: Some(task),
                    ty: ret,
                    op: Op::SpawnAsync {
                        function: requested.name.clone(),
                        args: params.iter().map(|(value, _)| *value).collect(),
                    },
                }],
                terminator: Terminator::Return(Some(task)),
            }],
            entry: BlockId(0),
        };
        self.lowering.module.functions.insert(name.clone(), thunk);
        name
    }

    /// Closure-convert a lambda: captures become leading parameters
    fn lower_lambda(&mut self, lambda: &'p TypedLambda, ty: Type) -> ValueId {
        let name = self.next_lambda_name();
        let ret = match &ty {
            Type::Function { ret, .. } => (**ret).clone(),
            _ => self.ty(&lambda.body.ty),
        };

        let function = {
            let mut nested = self.nested(name.clone());
            let params = nested.bind_nested_params(&lambda.captures, &lambda.params);
            let value = nested.lower_expression(&lambda.body);
            nested.finish_body(value, &ret);
            nested.finish(params, ret, false)
        };
        self.lowering.module.functions.insert(name.clone(), function);

        let captures = self.capture_values(&lambda.captures);
        self.emit(
            ty,
            Op::MakeClosure {
                function: name,
                captures,
            },
        )
    }

    fn capture_values(&mut self, captures: &[LocalId]) -> Vec<ValueId> {
        captures.iter().map(|local| self.read_local(*local)).collect()
    }

    /// Spawn every arm as a task in source order, then join them
    fn lower_parallel(&mut self, arms: &'p [TypedParallelArm], block: usize, ty: Type) -> ValueId {
        let results: Vec<Type> = match &ty {
            Type::Tuple(types) => types.clone(),
            _ => Vec::new(),
        };

        let mut tasks = Vec::with_capacity(arms.len());
        for (index, arm) in arms.iter().enumerate() {
            let name = format!("{}$par{block}_{index}", self.name);
            let result = results
                .get(index)
                .cloned()
                .unwrap_or_else(|| self.ty(&arm.expression.ty));

            // Arms inside duplicated match leaves are built once.
            if !self.lowering.module.functions.contains_key(&name) {
                let function = {
                    let mut nested = self.nested(name.clone());
                    let params = nested.bind_nested_params(&arm.captures, &[]);
                    let mut value = nested.lower_expression(&arm.expression);
                    if arm.awaits_task {
                        value = nested.lower_await(value, 0);
                    }
                    nested.finish_body(value, &result);
                    nested.finish(params, result.clone(), arm.awaits_task)
                };
                self.lowering.module.functions.insert(name.clone(), function);
            }

            let captures = self.capture_values(&arm.captures);
            tasks.push(self.emit(
                Type::task(result),
                Op::SpawnTask {
                    function: name,
                    captures,
                },
            ));
        }
        self.emit(ty, Op::Join(tasks))
    }
}
