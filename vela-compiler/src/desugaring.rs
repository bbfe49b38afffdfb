//! Syntactic sugar removal for Vela
//!
//! Pipelines become ordinary calls before type checking: `x |> f(a)` is
//! `f(x, a)` and `x |> f` is `f(x)`. Stages fold left to right, so
//! `x |> f |> g(1)` is `g(f(x), 1)`.
//!
//! Compound assignments become plain ones: `x += e` is `x = x + e`. The
//! target expression is evaluated once as a place and once as a value.

use vela_ast::{
    BinaryOperation, Block, ClassDefinition, Expression, ExpressionKind, FunctionCall, FunctionDefinition, ImplBlock, Item,
    ItemKind, MatchArm, ObjectField, Pipeline, Program, Statement, StatementKind,
};

/// Transformer that rewrites pipeline expressions into calls
pub struct DesugaringVisitor;

impl DesugaringVisitor {
    /// Desugar every function body of a program
    pub fn desugar_program(program: Program) -> Program {
        Program {
            items: program.items.into_iter().map(Self::desugar_item).collect(),
            span: program.span,
        }
    }

    fn desugar_item(item: Item) -> Item {
        let kind = match item.kind {
            ItemKind::Function(function) => ItemKind::Function(Self::desugar_function(function)),
            ItemKind::Class(class) => ItemKind::Class(ClassDefinition {
                methods: class.methods.into_iter().map(Self::desugar_function).collect(),
                ..class
            }),
            ItemKind::Impl(impl_block) => ItemKind::Impl(ImplBlock {
                methods: impl_block
                    .methods
                    .into_iter()
                    .map(Self::desugar_function)
                    .collect(),
                ..impl_block
            }),
            kind @ (ItemKind::Enum(_) | ItemKind::Trait(_)) => kind,
        };
        Item { kind, span: item.span }
    }

    fn desugar_function(function: FunctionDefinition) -> FunctionDefinition {
        FunctionDefinition {
            body: Self::desugar_block(function.body),
            ..function
        }
    }

    fn desugar_block(block: Block) -> Block {
        Block {
            statements: block
                .statements
                .into_iter()
                .map(Self::desugar_statement)
                .collect(),
            span: block.span,
        }
    }

    fn desugar_statement(statement: Statement) -> Statement {
        let kind = match statement.kind {
            StatementKind::Let(mut binding) => {
                binding.value = Self::desugar_expression(binding.value);
                StatementKind::Let(binding)
            }
            StatementKind::Assignment(mut assignment) => {
                assignment.target = Self::desugar_expression(assignment.target);
                assignment.value = Self::desugar_expression(assignment.value);
                if let Some(operator) = assignment.operator.take() {
                    let span = assignment.span;
                    assignment.value = Expression {
                        kind: ExpressionKind::Binary(BinaryOperation {
                            left: Box::new(assignment.target.clone()),
                            operator,
                            right: Box::new(assignment.value),
                            span,
                        }),
                        span,
                    };
                }
                StatementKind::Assignment(assignment)
            }
            StatementKind::Expression(expression) => {
                StatementKind::Expression(Box::new(Self::desugar_expression(*expression)))
            }
            StatementKind::Return(value) => {
                StatementKind::Return(value.map(|value| Box::new(Self::desugar_expression(*value))))
            }
            StatementKind::While(mut while_loop) => {
                while_loop.condition = Self::desugar_expression(while_loop.condition);
                while_loop.body = Self::desugar_block(while_loop.body);
                StatementKind::While(while_loop)
            }
            StatementKind::For(mut for_loop) => {
                for_loop.iterable = Self::desugar_expression(for_loop.iterable);
                for_loop.body = Self::desugar_block(for_loop.body);
                StatementKind::For(for_loop)
            }
            kind @ (StatementKind::Break | StatementKind::Continue) => kind,
        };
        Statement {
            kind,
            span: statement.span,
        }
    }

    fn boxed(expression: Box<Expression>) -> Box<Expression> {
        Box::new(Self::desugar_expression(*expression))
    }

    fn all(expressions: Vec<Expression>) -> Vec<Expression> {
        expressions.into_iter().map(Self::desugar_expression).collect()
    }

    /// Desugar an expression and everything nested in it
    pub fn desugar_expression(expression: Expression) -> Expression {
        let span = expression.span;
        let kind = match expression.kind {
            ExpressionKind::Pipeline(pipeline) => return Self::desugar_pipeline(pipeline),
            ExpressionKind::List(elements) => ExpressionKind::List(Self::all(elements)),
            ExpressionKind::Tuple(elements) => ExpressionKind::Tuple(Self::all(elements)),
            ExpressionKind::Binary(mut operation) => {
                operation.left = Self::boxed(operation.left);
                operation.right = Self::boxed(operation.right);
                ExpressionKind::Binary(operation)
            }
            ExpressionKind::Unary(mut operation) => {
                operation.operand = Self::boxed(operation.operand);
                ExpressionKind::Unary(operation)
            }
            ExpressionKind::Call(mut call) => {
                call.callee = Self::boxed(call.callee);
                call.arguments = Self::all(call.arguments);
                ExpressionKind::Call(call)
            }
            ExpressionKind::MethodCall(mut call) => {
                call.receiver = Self::boxed(call.receiver);
                call.arguments = Self::all(call.arguments);
                ExpressionKind::MethodCall(call)
            }
            ExpressionKind::FieldAccess(mut access) => {
                access.object = Self::boxed(access.object);
                ExpressionKind::FieldAccess(access)
            }
            ExpressionKind::Index(mut index) => {
                index.target = Self::boxed(index.target);
                index.index = Self::boxed(index.index);
                ExpressionKind::Index(index)
            }
            ExpressionKind::Lambda(mut lambda) => {
                lambda.body = Self::boxed(lambda.body);
                ExpressionKind::Lambda(lambda)
            }
            ExpressionKind::If(mut if_expression) => {
                if_expression.condition = Self::boxed(if_expression.condition);
                if_expression.then_block = Self::desugar_block(if_expression.then_block);
                if_expression.else_branch = if_expression.else_branch.map(Self::boxed);
                ExpressionKind::If(if_expression)
            }
            ExpressionKind::Match(mut matched) => {
                matched.scrutinee = Self::boxed(matched.scrutinee);
                matched.arms = matched
                    .arms
                    .into_iter()
                    .map(|arm| MatchArm {
                        guard: arm.guard.map(Self::desugar_expression),
                        body: Self::desugar_expression(arm.body),
                        ..arm
                    })
                    .collect();
                ExpressionKind::Match(matched)
            }
            ExpressionKind::Block(block) => ExpressionKind::Block(Self::desugar_block(block)),
            ExpressionKind::Object(mut object) => {
                object.fields = object
                    .fields
                    .into_iter()
                    .map(|field| ObjectField {
                        value: Self::desugar_expression(field.value),
                        ..field
                    })
                    .collect();
                ExpressionKind::Object(object)
            }
            ExpressionKind::Await(task) => ExpressionKind::Await(Self::boxed(task)),
            ExpressionKind::Parallel(mut block) => {
                block.tasks = Self::all(block.tasks);
                ExpressionKind::Parallel(block)
            }
            kind @ (ExpressionKind::Integer(_)
            | ExpressionKind::Float(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Null
            | ExpressionKind::Identifier(_)
            | ExpressionKind::Variant(_)) => kind,
        };
        Expression { kind, span }
    }

    fn desugar_pipeline(pipeline: Pipeline) -> Expression {
        let mut value = Self::desugar_expression(*pipeline.value);
        for stage in pipeline.stages {
            let stage = Self::desugar_expression(stage);
            let span = value.span.merge(stage.span);
            let kind = match stage.kind {
                ExpressionKind::Call(mut call) => {
                    call.arguments.insert(0, value);
                    call.span = span;
                    ExpressionKind::Call(call)
                }
                ExpressionKind::MethodCall(mut call) => {
                    call.arguments.insert(0, value);
                    call.span = span;
                    ExpressionKind::MethodCall(call)
                }
                kind => ExpressionKind::Call(FunctionCall {
                    callee: Box::new(Expression {
                        kind,
                        span: stage.span,
                    }),
                    arguments: vec![value],
                    span,
                }),
            };
            value = Expression { kind, span };
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ast::{FunctionCall, Identifier, Span};

    fn ident(name: &str, start: usize) -> Expression {
        Expression {
            kind: ExpressionKind::Identifier(Identifier {
                name: name.to_string(),
                span: Span::new(start, start + name.len()),
            }),
            span: Span::new(start, start + name.len()),
        }
    }

    fn call_args(expression: &Expression) -> (&Expression, &[Expression]) {
        match &expression.kind {
            ExpressionKind::Call(FunctionCall {
                callee, arguments, ..
            }) => (callee, arguments),
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_stage_becomes_single_argument_call() {
        let pipeline = Expression {
            kind: ExpressionKind::Pipeline(Pipeline {
                value: Box::new(ident("x", 0)),
                stages: vec![ident("f", 5)],
                span: Span::new(0, 6),
            }),
            span: Span::new(0, 6),
        };

        let desugared = DesugaringVisitor::desugar_expression(pipeline);
        let (callee, arguments) = call_args(&desugared);
        assert_eq!(callee, &ident("f", 5));
        assert_eq!(arguments, &[ident("x", 0)]);
    }

    #[test]
    fn test_stages_fold_left_and_prepend_the_value() {
        let stage = Expression {
            kind: ExpressionKind::Call(FunctionCall {
                callee: Box::new(ident("g", 10)),
                arguments: vec![ident("y", 12)],
                span: Span::new(10, 14),
            }),
            span: Span::new(10, 14),
        };
        let pipeline = Expression {
            kind: ExpressionKind::Pipeline(Pipeline {
                value: Box::new(ident("x", 0)),
                stages: vec![ident("f", 5), stage],
                span: Span::new(0, 14),
            }),
            span: Span::new(0, 14),
        };

        let desugared = DesugaringVisitor::desugar_expression(pipeline);
        let (callee, arguments) = call_args(&desugared);
        assert_eq!(callee, &ident("g", 10));
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[1], ident("y", 12));

        let (inner_callee, inner_arguments) = call_args(&arguments[0]);
        assert_eq!(inner_callee, &ident("f", 5));
        assert_eq!(inner_arguments, &[ident("x", 0)]);
    }

    #[test]
    fn test_compound_assignment_becomes_binary_value() {
        let statement = Statement {
            kind: StatementKind::Assignment(vela_ast::Assignment {
                target: ident("total", 0),
                operator: Some(vela_ast::BinaryOperator::Subtract),
                value: ident("step", 9),
                span: Span::new(0, 13),
            }),
            span: Span::new(0, 13),
        };

        let StatementKind::Assignment(assignment) = DesugaringVisitor::desugar_statement(statement).kind else {
            panic!("expected an assignment");
        };
        assert_eq!(assignment.operator, None);
        assert_eq!(assignment.target, ident("total", 0));
        let ExpressionKind::Binary(binary) = &assignment.value.kind else {
            panic!("expected a binary value, got {:?}", assignment.value);
        };
        assert_eq!(binary.operator, vela_ast::BinaryOperator::Subtract);
        assert_eq!(*binary.left, ident("total", 0));
        assert_eq!(*binary.right, ident("step", 9));
    }
}
