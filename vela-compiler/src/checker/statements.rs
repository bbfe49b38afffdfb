//! Statement and block checking

use super::functions::{diverges, BodyChecker};
use crate::error::{at, Abort, CheckError};
use crate::typed_ast::{
    AssignTarget, TypedBlock, TypedExpressionKind, TypedStatement, TypedStatementKind,
};
use crate::types::Type;
use vela_ast::{Assignment, Block, ExpressionKind, LetBinding, Statement, StatementKind};

impl BodyChecker<'_, '_> {
    /// Check a block in its own scope.
    ///
    /// A trailing expression statement gives the block its value and is
    /// checked against `expected`. Blocks that never complete take the
    /// expected type.
    pub fn check_block(&mut self, block: &Block, expected: Option<&Type>) -> Result<TypedBlock, Abort> {
        self.symbols.push_scope();
        let result = self.block_statements(block, expected);
        self.symbols.pop_scope();
        result
    }

    fn block_statements(&mut self, block: &Block, expected: Option<&Type>) -> Result<TypedBlock, Abort> {
        let mut statements = Vec::with_capacity(block.statements.len());
        let mut value_ty = None;
        let mut block_diverges = false;

        for (index, statement) in block.statements.iter().enumerate() {
            let is_last = index + 1 == block.statements.len();
            let typed = match (&statement.kind, is_last) {
                (StatementKind::Expression(expression), true) => {
                    let expression = match expected {
                        Some(expected) => self.check(expression, expected)?,
                        None => self.synth(expression)?,
                    };
                    value_ty = Some(expression.ty.clone());
                    TypedStatement {
                        kind: TypedStatementKind::Expression(expression),
                        span: statement.span,
                    }
                }
                _ => self.check_statement(statement)?,
            };
            block_diverges |= statement_diverges(&typed);
            statements.push(typed);
            self.process_obligations(false)?;
        }

        let ty = match value_ty {
            Some(ty) => ty,
            None if block_diverges => expected.cloned().unwrap_or_else(Type::void),
            None => Type::void(),
        };
        Ok(TypedBlock {
            statements,
            ty,
            diverges: block_diverges,
            span: block.span,
        })
    }

    pub fn check_statement(&mut self, statement: &Statement) -> Result<TypedStatement, Abort> {
        let span = statement.span;
        let kind = match &statement.kind {
            StatementKind::Let(binding) => self.check_let(binding)?,
            StatementKind::Assignment(assignment) => self.check_assignment(assignment)?,
            StatementKind::Expression(expression) => {
                TypedStatementKind::Expression(self.synth(expression)?)
            }
            StatementKind::Return(value) => {
                let expected = self.return_types.last().cloned().unwrap_or_else(Type::void);
                match value {
                    Some(value) => TypedStatementKind::Return(Some(self.check(value, &expected)?)),
                    None => {
                        self.unify(&expected, &Type::void(), span)?;
                        TypedStatementKind::Return(None)
                    }
                }
            }
            StatementKind::While(while_loop) => {
                let condition = self.check(&while_loop.condition, &Type::bool())?;
                self.loop_depth += 1;
                let body = self.check_block(&while_loop.body, None);
                self.loop_depth -= 1;
                TypedStatementKind::While {
                    condition,
                    body: body?,
                }
            }
            StatementKind::For(for_loop) => {
                let iterable = self.synth(&for_loop.iterable)?;
                let element = self.fresh_var();
                self.unify(&Type::list(element.clone()), &iterable.ty, for_loop.iterable.span)?;

                self.symbols.push_scope();
                let local = self.define_local(&for_loop.variable.name, element, false, for_loop.variable.span);
                self.loop_depth += 1;
                let body = self.check_block(&for_loop.body, None);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
                TypedStatementKind::For {
                    local,
                    iterable,
                    body: body?,
                }
            }
            StatementKind::Break | StatementKind::Continue => {
                let (keyword, kind) = match &statement.kind {
                    StatementKind::Break => ("break", TypedStatementKind::Break),
                    _ => ("continue", TypedStatementKind::Continue),
                };
                if self.loop_depth == 0 {
                    self.report(CheckError::InvalidControlFlow {
                        keyword: keyword.to_string(),
                        span: at(span),
                    });
                }
                kind
            }
        };
        Ok(TypedStatement { kind, span })
    }

    fn check_let(&mut self, binding: &LetBinding) -> Result<TypedStatementKind, Abort> {
        let value = match &binding.type_annotation {
            Some(annotation) => {
                let resolved = self.checker.ctx.resolve_annotation(
                    annotation,
                    &self.generics,
                    self.self_type.as_ref(),
                );
                let declared = match resolved {
                    Ok(ty) => ty,
                    Err(error) => {
                        self.report(error);
                        self.fresh_var()
                    }
                };
                self.check(&binding.value, &declared)?
            }
            None => self.synth(&binding.value)?,
        };
        let local = self.define_local(
            &binding.name.name,
            value.ty.clone(),
            !binding.is_const,
            binding.name.span,
        );
        Ok(TypedStatementKind::Let { local, value })
    }

    fn check_assignment(&mut self, assignment: &Assignment) -> Result<TypedStatementKind, Abort> {
        let target = &assignment.target;
        match &target.kind {
            ExpressionKind::Identifier(identifier) => {
                let captured = self.is_captured(&identifier.name);
                let Some(binding) = self.lookup_local(&identifier.name) else {
                    self.report(CheckError::UnboundIdentifier {
                        name: identifier.name.clone(),
                        span: at(identifier.span),
                    });
                    let value = self.synth(&assignment.value)?;
                    return Ok(TypedStatementKind::Expression(value));
                };
                if !binding.mutable {
                    self.report(CheckError::AssignToImmutable {
                        name: identifier.name.clone(),
                        span: at(target.span),
                    });
                } else if captured {
                    self.report(CheckError::AssignToCapturedVariable {
                        name: identifier.name.clone(),
                        span: at(target.span),
                    });
                }
                let value = self.check(&assignment.value, &binding.ty)?;
                Ok(TypedStatementKind::Assign {
                    target: AssignTarget::Local(binding.local),
                    value,
                })
            }
            ExpressionKind::FieldAccess(_) => {
                let place = self.synth(target)?;
                let value = self.check(&assignment.value, &place.ty)?;
                match place.kind {
                    TypedExpressionKind::FieldAccess { object, index, .. } => {
                        Ok(TypedStatementKind::Assign {
                            target: AssignTarget::Field {
                                object: *object,
                                index,
                            },
                            value,
                        })
                    }
                    // The access failed and has been reported already.
                    _ => Ok(TypedStatementKind::Expression(value)),
                }
            }
            ExpressionKind::Index(_) => {
                let place = self.synth(target)?;
                let value = self.check(&assignment.value, &place.ty)?;
                match place.kind {
                    TypedExpressionKind::Index { target, index } => {
                        Ok(TypedStatementKind::Assign {
                            target: AssignTarget::Index {
                                target: *target,
                                index: *index,
                            },
                            value,
                        })
                    }
                    _ => Ok(TypedStatementKind::Expression(value)),
                }
            }
            _ => {
                self.report(CheckError::InvalidAssignmentTarget { span: at(target.span) });
                let value = self.synth(&assignment.value)?;
                Ok(TypedStatementKind::Expression(value))
            }
        }
    }
}

fn statement_diverges(statement: &TypedStatement) -> bool {
    match &statement.kind {
        TypedStatementKind::Return(_) | TypedStatementKind::Break | TypedStatementKind::Continue => true,
        TypedStatementKind::Expression(expression) => diverges(expression),
        _ => false,
    }
}
