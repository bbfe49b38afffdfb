//! Typed syntax tree produced by the checker
//!
//! Every expression carries exactly one [`Type`]. Later stages annotate the
//! tree in place: match compilation fills in decision trees, concurrency
//! lowering numbers suspension points and parallel blocks.

use crate::builtins::Builtin;
use crate::context::LocalId;
use crate::patterns::DecisionTree;
use crate::traits::ImplId;
use crate::types::{GenericParamInfo, Type};
use std::fmt;
use vela_ast::{BinaryOperator, Span, UnaryOperator};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedProgram {
    pub functions: Vec<TypedFunction>,
}

impl TypedProgram {
    pub fn function(&self, key: &FunctionKey) -> Option<&TypedFunction> {
        self.functions.iter().find(|function| &function.key == key)
    }

    pub fn function_named(&self, name: &str) -> Option<&TypedFunction> {
        self.functions
            .iter()
            .find(|function| function.key.to_string() == name)
    }
}

/// Identity of a checked function body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunctionKey {
    Free(String),
    ClassMethod { class: String, method: String },
    ImplMethod { impl_id: ImplId, display: String, method: String },
}

impl FunctionKey {
    pub fn method_name(&self) -> &str {
        match self {
            FunctionKey::Free(name) => name,
            FunctionKey::ClassMethod { method, .. } | FunctionKey::ImplMethod { method, .. } => {
                method
            }
        }
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKey::Free(name) => write!(f, "{name}"),
            FunctionKey::ClassMethod { class, method } => write!(f, "{class}.{method}"),
            FunctionKey::ImplMethod {
                display, method, ..
            } => write!(f, "{display}.{method}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalInfo {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub key: FunctionKey,
    /// All generics in scope: the owner's followed by the function's own
    pub generics: Vec<GenericParamInfo>,
    /// Receiver local for methods
    pub self_param: Option<(LocalId, Type)>,
    pub params: Vec<(LocalId, Type)>,
    pub ret: Type,
    pub is_async: bool,
    pub body: TypedBlock,
    pub locals: Vec<LocalInfo>,
    /// Checking recorded errors; the body may hold partially inferred types
    pub has_errors: bool,
    pub span: Span,
}

impl TypedFunction {
    pub fn local(&self, id: LocalId) -> Option<&LocalInfo> {
        self.locals.get(id.0 as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedBlock {
    pub statements: Vec<TypedStatement>,
    /// Type of the trailing expression statement, or `void`
    pub ty: Type,
    /// Control never reaches the end of the block
    pub diverges: bool,
    pub span: Span,
}

impl TypedBlock {
    /// The trailing expression that gives the block its value
    pub fn value(&self) -> Option<&TypedExpression> {
        if self.ty.is_void() {
            return None;
        }
        match self.statements.last().map(|statement| &statement.kind) {
            Some(TypedStatementKind::Expression(expression)) => Some(expression),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedStatement {
    pub kind: TypedStatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedStatementKind {
    Let {
        local: LocalId,
        value: TypedExpression,
    },
    Assign {
        target: AssignTarget,
        value: TypedExpression,
    },
    Expression(TypedExpression),
    Return(Option<TypedExpression>),
    While {
        condition: TypedExpression,
        body: TypedBlock,
    },
    For {
        local: LocalId,
        iterable: TypedExpression,
        body: TypedBlock,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Local(LocalId),
    Field {
        object: TypedExpression,
        index: usize,
    },
    Index {
        target: TypedExpression,
        index: TypedExpression,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpression {
    pub kind: TypedExpressionKind,
    pub ty: Type,
    pub span: Span,
}

impl TypedExpression {
    pub fn new(kind: TypedExpressionKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

/// What a call invokes. Receivers of method calls are the first argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Function {
        name: String,
        type_args: Vec<Type>,
        is_async: bool,
    },
    /// Method declared on a class; `type_args` are the class's arguments
    Method {
        class: String,
        method: String,
        type_args: Vec<Type>,
        is_async: bool,
    },
    /// Method provided by an `impl` block; `type_args` bind the impl's generics
    ImplMethod {
        impl_id: ImplId,
        method: String,
        type_args: Vec<Type>,
        is_async: bool,
    },
    /// Trait method on a generic receiver, resolved at monomorphization
    TraitMethod {
        trait_name: String,
        method: String,
        is_async: bool,
    },
    Builtin {
        builtin: Builtin,
        type_args: Vec<Type>,
    },
    /// A lambda or other function-typed value
    Value(Box<TypedExpression>),
}

impl Callee {
    pub fn is_async(&self) -> bool {
        match self {
            Callee::Function { is_async, .. }
            | Callee::Method { is_async, .. }
            | Callee::ImplMethod { is_async, .. }
            | Callee::TraitMethod { is_async, .. } => *is_async,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedLambda {
    pub params: Vec<LocalId>,
    /// Enclosing locals used by the body, copied at creation
    pub captures: Vec<LocalId>,
    pub body: Box<TypedExpression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedMatchArm {
    pub pattern: TypedPattern,
    pub guard: Option<TypedExpression>,
    pub body: TypedExpression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedMatch {
    pub scrutinee: Box<TypedExpression>,
    pub arms: Vec<TypedMatchArm>,
    /// Filled in by match compilation
    pub tree: Option<DecisionTree>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedParallelArm {
    pub expression: TypedExpression,
    /// The arm produced `Task<T>`; its task awaits it before completing
    pub awaits_task: bool,
    /// Filled in by concurrency lowering
    pub captures: Vec<LocalId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedExpressionKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Null,
    Local(LocalId),
    /// A named function used as a value
    FunctionRef {
        name: String,
        type_args: Vec<Type>,
    },
    List(Vec<TypedExpression>),
    Tuple(Vec<TypedExpression>),
    Binary {
        operator: BinaryOperator,
        left: Box<TypedExpression>,
        right: Box<TypedExpression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<TypedExpression>,
    },
    Call {
        callee: Callee,
        arguments: Vec<TypedExpression>,
    },
    FieldAccess {
        object: Box<TypedExpression>,
        field: String,
        index: usize,
    },
    Index {
        target: Box<TypedExpression>,
        index: Box<TypedExpression>,
    },
    Lambda(TypedLambda),
    If {
        condition: Box<TypedExpression>,
        then_block: TypedBlock,
        else_block: Option<TypedBlock>,
    },
    Match(TypedMatch),
    Block(TypedBlock),
    Object {
        class_name: String,
        /// Field values in declaration order
        fields: Vec<TypedExpression>,
    },
    Variant {
        enum_name: String,
        variant: String,
        tag: usize,
        fields: Vec<TypedExpression>,
    },
    Await {
        task: Box<TypedExpression>,
        /// Suspension point number, assigned by concurrency lowering
        state: Option<usize>,
    },
    Parallel {
        arms: Vec<TypedParallelArm>,
        /// Index of the block within its function, assigned by concurrency lowering
        block: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedPattern {
    pub kind: TypedPatternKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Integer(value) => write!(f, "{value}"),
            LiteralValue::Float(value) => write!(f, "{value:?}"),
            LiteralValue::Boolean(value) => write!(f, "{value}"),
            LiteralValue::String(value) => write!(f, "\"{value}\""),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedPatternKind {
    Wildcard,
    Binding(LocalId),
    Literal(LiteralValue),
    Tuple(Vec<TypedPattern>),
    Variant {
        enum_name: String,
        variant: String,
        tag: usize,
        fields: Vec<TypedPattern>,
    },
    /// Sub-patterns per field in declaration order; unmentioned fields are wildcards
    Class {
        class_name: String,
        fields: Vec<TypedPattern>,
    },
}

/// Walk every expression of a block, outermost first
pub fn visit_block_expressions<'a>(block: &'a TypedBlock, visit: &mut impl FnMut(&'a TypedExpression)) {
    for statement in &block.statements {
        visit_statement_expressions(statement, visit);
    }
}

fn visit_statement_expressions<'a>(
    statement: &'a TypedStatement,
    visit: &mut impl FnMut(&'a TypedExpression),
) {
    match &statement.kind {
        TypedStatementKind::Let { value, .. } => visit_expression(value, visit),
        TypedStatementKind::Assign { target, value } => {
            match target {
                AssignTarget::Local(_) => {}
                AssignTarget::Field { object, .. } => visit_expression(object, visit),
                AssignTarget::Index { target, index } => {
                    visit_expression(target, visit);
                    visit_expression(index, visit);
                }
            }
            visit_expression(value, visit);
        }
        TypedStatementKind::Expression(expression) => visit_expression(expression, visit),
        TypedStatementKind::Return(value) => {
            if let Some(value) = value {
                visit_expression(value, visit);
            }
        }
        TypedStatementKind::While { condition, body } => {
            visit_expression(condition, visit);
            visit_block_expressions(body, visit);
        }
        TypedStatementKind::For { iterable, body, .. } => {
            visit_expression(iterable, visit);
            visit_block_expressions(body, visit);
        }
        TypedStatementKind::Break | TypedStatementKind::Continue => {}
    }
}

pub fn visit_expression<'a>(expression: &'a TypedExpression, visit: &mut impl FnMut(&'a TypedExpression)) {
    visit(expression);
    match &expression.kind {
        TypedExpressionKind::Integer(_)
        | TypedExpressionKind::Float(_)
        | TypedExpressionKind::Boolean(_)
        | TypedExpressionKind::String(_)
        | TypedExpressionKind::Null
        | TypedExpressionKind::Local(_)
        | TypedExpressionKind::FunctionRef { .. } => {}
        TypedExpressionKind::List(elements) | TypedExpressionKind::Tuple(elements) => {
            elements.iter().for_each(|element| visit_expression(element, visit));
        }
        TypedExpressionKind::Binary { left, right, .. } => {
            visit_expression(left, visit);
            visit_expression(right, visit);
        }
        TypedExpressionKind::Unary { operand, .. } => visit_expression(operand, visit),
        TypedExpressionKind::Call { callee, arguments } => {
            if let Callee::Value(value) = callee {
                visit_expression(value, visit);
            }
            arguments.iter().for_each(|argument| visit_expression(argument, visit));
        }
        TypedExpressionKind::FieldAccess { object, .. } => visit_expression(object, visit),
        TypedExpressionKind::Index { target, index } => {
            visit_expression(target, visit);
            visit_expression(index, visit);
        }
        TypedExpressionKind::Lambda(lambda) => visit_expression(&lambda.body, visit),
        TypedExpressionKind::If {
            condition,
            then_block,
            else_block,
        } => {
            visit_expression(condition, visit);
            visit_block_expressions(then_block, visit);
            if let Some(else_block) = else_block {
                visit_block_expressions(else_block, visit);
            }
        }
        TypedExpressionKind::Match(matched) => {
            visit_expression(&matched.scrutinee, visit);
            for arm in &matched.arms {
                if let Some(guard) = &arm.guard {
                    visit_expression(guard, visit);
                }
                visit_expression(&arm.body, visit);
            }
        }
        TypedExpressionKind::Block(block) => visit_block_expressions(block, visit),
        TypedExpressionKind::Object { fields, .. } | TypedExpressionKind::Variant { fields, .. } => {
            fields.iter().for_each(|field| visit_expression(field, visit));
        }
        TypedExpressionKind::Await { task, .. } => visit_expression(task, visit),
        TypedExpressionKind::Parallel { arms, .. } => {
            arms.iter()
                .for_each(|arm| visit_expression(&arm.expression, visit));
        }
    }
}

/// Mutable walk over every expression of a block, outermost first
pub fn visit_block_expressions_mut(block: &mut TypedBlock, visit: &mut impl FnMut(&mut TypedExpression)) {
    for statement in &mut block.statements {
        match &mut statement.kind {
            TypedStatementKind::Let { value, .. } => visit_expression_mut(value, visit),
            TypedStatementKind::Assign { target, value } => {
                match target {
                    AssignTarget::Local(_) => {}
                    AssignTarget::Field { object, .. } => visit_expression_mut(object, visit),
                    AssignTarget::Index { target, index } => {
                        visit_expression_mut(target, visit);
                        visit_expression_mut(index, visit);
                    }
                }
                visit_expression_mut(value, visit);
            }
            TypedStatementKind::Expression(expression) => visit_expression_mut(expression, visit),
            TypedStatementKind::Return(value) => {
                if let Some(value) = value {
                    visit_expression_mut(value, visit);
                }
            }
            TypedStatementKind::While { condition, body } => {
                visit_expression_mut(condition, visit);
                visit_block_expressions_mut(body, visit);
            }
            TypedStatementKind::For { iterable, body, .. } => {
                visit_expression_mut(iterable, visit);
                visit_block_expressions_mut(body, visit);
            }
            TypedStatementKind::Break | TypedStatementKind::Continue => {}
        }
    }
}

pub fn visit_expression_mut(expression: &mut TypedExpression, visit: &mut impl FnMut(&mut TypedExpression)) {
    visit(expression);
    match &mut expression.kind {
        TypedExpressionKind::Integer(_)
        | TypedExpressionKind::Float(_)
        | TypedExpressionKind::Boolean(_)
        | TypedExpressionKind::String(_)
        | TypedExpressionKind::Null
        | TypedExpressionKind::Local(_)
        | TypedExpressionKind::FunctionRef { .. } => {}
        TypedExpressionKind::List(elements) | TypedExpressionKind::Tuple(elements) => {
            elements
                .iter_mut()
                .for_each(|element| visit_expression_mut(element, visit));
        }
        TypedExpressionKind::Binary { left, right, .. } => {
            visit_expression_mut(left, visit);
            visit_expression_mut(right, visit);
        }
        TypedExpressionKind::Unary { operand, .. } => visit_expression_mut(operand, visit),
        TypedExpressionKind::Call { callee, arguments } => {
            if let Callee::Value(value) = callee {
                visit_expression_mut(value, visit);
            }
            arguments
                .iter_mut()
                .for_each(|argument| visit_expression_mut(argument, visit));
        }
        TypedExpressionKind::FieldAccess { object, .. } => visit_expression_mut(object, visit),
        TypedExpressionKind::Index { target, index } => {
            visit_expression_mut(target, visit);
            visit_expression_mut(index, visit);
        }
        TypedExpressionKind::Lambda(lambda) => visit_expression_mut(&mut lambda.body, visit),
        TypedExpressionKind::If {
            condition,
            then_block,
            else_block,
        } => {
            visit_expression_mut(condition, visit);
            visit_block_expressions_mut(then_block, visit);
            if let Some(else_block) = else_block {
                visit_block_expressions_mut(else_block, visit);
            }
        }
        TypedExpressionKind::Match(matched) => {
            visit_expression_mut(&mut matched.scrutinee, visit);
            for arm in &mut matched.arms {
                if let Some(guard) = &mut arm.guard {
                    visit_expression_mut(guard, visit);
                }
                visit_expression_mut(&mut arm.body, visit);
            }
        }
        TypedExpressionKind::Block(block) => visit_block_expressions_mut(block, visit),
        TypedExpressionKind::Object { fields, .. } | TypedExpressionKind::Variant { fields, .. } => {
            fields
                .iter_mut()
                .for_each(|field| visit_expression_mut(field, visit));
        }
        TypedExpressionKind::Await { task, .. } => visit_expression_mut(task, visit),
        TypedExpressionKind::Parallel { arms, .. } => {
            arms.iter_mut()
                .for_each(|arm| visit_expression_mut(&mut arm.expression, visit));
        }
    }
}
