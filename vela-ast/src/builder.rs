//! Constructors for syntax trees.
//!
//! Parser front-ends and tests build trees through these helpers. Every node
//! gets `Span::default()` unless repositioned with [`Positioned::at`].

use crate::ast::*;

/// Reposition a node at a byte range.
pub trait Positioned: Sized {
    fn set_span(&mut self, span: Span);

    fn at(mut self, start: usize, end: usize) -> Self {
        self.set_span(Span::new(start, end));
        self
    }
}

impl Positioned for Expression {
    fn set_span(&mut self, span: Span) {
        self.span = span;
    }
}

impl Positioned for Pattern {
    fn set_span(&mut self, span: Span) {
        self.span = span;
    }
}

impl Positioned for Statement {
    fn set_span(&mut self, span: Span) {
        self.span = span;
    }
}

impl Positioned for FunctionDefinition {
    fn set_span(&mut self, span: Span) {
        self.span = span;
    }
}

fn expr(kind: ExpressionKind) -> Expression {
    Expression {
        kind,
        span: Span::default(),
    }
}

fn stmt(kind: StatementKind) -> Statement {
    Statement {
        kind,
        span: Span::default(),
    }
}

fn pat(kind: PatternKind) -> Pattern {
    Pattern {
        kind,
        span: Span::default(),
    }
}

pub fn identifier(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
        span: Span::default(),
    }
}

pub fn type_identifier(name: &str) -> TypeIdentifier {
    TypeIdentifier {
        name: name.to_string(),
        span: Span::default(),
    }
}

// === TYPES ===

/// `int`, `Circle`, `T`
pub fn ty(name: &str) -> TypeAnnotation {
    ty_generic(name, vec![])
}

/// `list<int>`, `Stack<T>`
pub fn ty_generic(name: &str, generic_args: Vec<TypeAnnotation>) -> TypeAnnotation {
    TypeAnnotation::Named {
        name: type_identifier(name),
        generic_args,
        span: Span::default(),
    }
}

pub fn ty_list(element: TypeAnnotation) -> TypeAnnotation {
    ty_generic("list", vec![element])
}

pub fn ty_tuple(types: Vec<TypeAnnotation>) -> TypeAnnotation {
    TypeAnnotation::Tuple {
        types,
        span: Span::default(),
    }
}

pub fn ty_fn(params: Vec<TypeAnnotation>, return_type: TypeAnnotation) -> TypeAnnotation {
    TypeAnnotation::Function {
        params,
        return_type: Box::new(return_type),
        span: Span::default(),
    }
}

// === EXPRESSIONS ===

pub fn int(value: i64) -> Expression {
    expr(ExpressionKind::Integer(value))
}

pub fn float(value: f64) -> Expression {
    expr(ExpressionKind::Float(value))
}

pub fn boolean(value: bool) -> Expression {
    expr(ExpressionKind::Boolean(value))
}

pub fn null() -> Expression {
    expr(ExpressionKind::Null)
}

pub fn string(value: &str) -> Expression {
    expr(ExpressionKind::String(value.to_string()))
}

pub fn var(name: &str) -> Expression {
    expr(ExpressionKind::Identifier(identifier(name)))
}

pub fn list(elements: Vec<Expression>) -> Expression {
    expr(ExpressionKind::List(elements))
}

pub fn tuple(elements: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Tuple(elements))
}

pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
    expr(ExpressionKind::Binary(BinaryOperation {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        span: Span::default(),
    }))
}

pub fn unary(operator: UnaryOperator, operand: Expression) -> Expression {
    expr(ExpressionKind::Unary(UnaryOperation {
        operator,
        operand: Box::new(operand),
        span: Span::default(),
    }))
}

/// `name(args)`
pub fn call(name: &str, arguments: Vec<Expression>) -> Expression {
    call_expr(var(name), arguments)
}

/// `callee(args)` for an arbitrary callee expression
pub fn call_expr(callee: Expression, arguments: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Call(FunctionCall {
        callee: Box::new(callee),
        arguments,
        span: Span::default(),
    }))
}

pub fn method_call(receiver: Expression, method: &str, arguments: Vec<Expression>) -> Expression {
    expr(ExpressionKind::MethodCall(MethodCall {
        receiver: Box::new(receiver),
        method: identifier(method),
        arguments,
        span: Span::default(),
    }))
}

pub fn field(object: Expression, name: &str) -> Expression {
    expr(ExpressionKind::FieldAccess(FieldAccess {
        object: Box::new(object),
        field: identifier(name),
        span: Span::default(),
    }))
}

pub fn index(target: Expression, index: Expression) -> Expression {
    expr(ExpressionKind::Index(IndexExpression {
        target: Box::new(target),
        index: Box::new(index),
        span: Span::default(),
    }))
}

/// Lambda parameter with an optional annotation
pub fn lambda_param(name: &str, type_annotation: Option<TypeAnnotation>) -> LambdaParameter {
    LambdaParameter {
        name: identifier(name),
        type_annotation,
        span: Span::default(),
    }
}

pub fn lambda(parameters: Vec<LambdaParameter>, body: Expression) -> Expression {
    expr(ExpressionKind::Lambda(Lambda {
        parameters,
        body: Box::new(body),
        span: Span::default(),
    }))
}

pub fn pipeline(value: Expression, stages: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Pipeline(Pipeline {
        value: Box::new(value),
        stages,
        span: Span::default(),
    }))
}

pub fn if_else(condition: Expression, then_block: Block, else_block: Option<Block>) -> Expression {
    expr(ExpressionKind::If(IfExpression {
        condition: Box::new(condition),
        then_block,
        else_branch: else_block.map(|block| Box::new(block_expr(block))),
        span: Span::default(),
    }))
}

pub fn match_expr(scrutinee: Expression, arms: Vec<MatchArm>) -> Expression {
    expr(ExpressionKind::Match(MatchExpression {
        scrutinee: Box::new(scrutinee),
        arms,
        span: Span::default(),
    }))
}

pub fn arm(pattern: Pattern, body: Expression) -> MatchArm {
    let span = pattern.span.merge(body.span);
    MatchArm {
        pattern,
        guard: None,
        body,
        span,
    }
}

pub fn guarded_arm(pattern: Pattern, guard: Expression, body: Expression) -> MatchArm {
    let span = pattern.span.merge(body.span);
    MatchArm {
        pattern,
        guard: Some(guard),
        body,
        span,
    }
}

pub fn block_expr(block: Block) -> Expression {
    let span = block.span;
    Expression {
        kind: ExpressionKind::Block(block),
        span,
    }
}

/// `Class<args> { name = value, ... }`
pub fn object(
    class_name: &str,
    generic_args: Vec<TypeAnnotation>,
    fields: Vec<(&str, Expression)>,
) -> Expression {
    expr(ExpressionKind::Object(ObjectLiteral {
        class_name: type_identifier(class_name),
        generic_args,
        fields: fields
            .into_iter()
            .map(|(name, value)| ObjectField {
                name: identifier(name),
                value,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
    }))
}

/// `Enum.Variant`, or a bare `Variant` when `enum_name` is `None`
pub fn variant(enum_name: Option<&str>, variant: &str) -> Expression {
    expr(ExpressionKind::Variant(VariantPath {
        enum_name: enum_name.map(type_identifier),
        variant: type_identifier(variant),
        span: Span::default(),
    }))
}

pub fn await_expr(task: Expression) -> Expression {
    expr(ExpressionKind::Await(Box::new(task)))
}

pub fn parallel(tasks: Vec<Expression>) -> Expression {
    expr(ExpressionKind::Parallel(ParallelBlock {
        tasks,
        span: Span::default(),
    }))
}

// === STATEMENTS ===

pub fn block(statements: Vec<Statement>) -> Block {
    let span = statements
        .iter()
        .map(|statement| statement.span)
        .reduce(Span::merge)
        .unwrap_or_default();
    Block { statements, span }
}

/// `auto name = value`
pub fn let_auto(name: &str, value: Expression) -> Statement {
    let_binding(name, None, false, value)
}

/// `T name = value`
pub fn let_typed(name: &str, type_annotation: TypeAnnotation, value: Expression) -> Statement {
    let_binding(name, Some(type_annotation), false, value)
}

/// `const name = value`
pub fn let_const(name: &str, value: Expression) -> Statement {
    let_binding(name, None, true, value)
}

fn let_binding(
    name: &str,
    type_annotation: Option<TypeAnnotation>,
    is_const: bool,
    value: Expression,
) -> Statement {
    let span = value.span;
    stmt(StatementKind::Let(LetBinding {
        name: identifier(name),
        type_annotation,
        is_const,
        value,
        span,
    }))
}

pub fn assign(target: Expression, value: Expression) -> Statement {
    let span = target.span.merge(value.span);
    stmt(StatementKind::Assignment(Assignment {
        target,
        operator: None,
        value,
        span,
    }))
}

/// `target += value` and friends
pub fn compound_assign(target: Expression, operator: BinaryOperator, value: Expression) -> Statement {
    let span = target.span.merge(value.span);
    stmt(StatementKind::Assignment(Assignment {
        target,
        operator: Some(operator),
        value,
        span,
    }))
}

pub fn expr_stmt(expression: Expression) -> Statement {
    let span = expression.span;
    Statement {
        kind: StatementKind::Expression(Box::new(expression)),
        span,
    }
}

pub fn ret(value: Expression) -> Statement {
    let span = value.span;
    Statement {
        kind: StatementKind::Return(Some(Box::new(value))),
        span,
    }
}

pub fn ret_void() -> Statement {
    stmt(StatementKind::Return(None))
}

pub fn while_loop(condition: Expression, body: Block) -> Statement {
    stmt(StatementKind::While(WhileLoop {
        condition,
        body,
        span: Span::default(),
    }))
}

pub fn for_loop(variable: &str, iterable: Expression, body: Block) -> Statement {
    stmt(StatementKind::For(ForLoop {
        variable: identifier(variable),
        iterable,
        body,
        span: Span::default(),
    }))
}

pub fn break_stmt() -> Statement {
    stmt(StatementKind::Break)
}

pub fn continue_stmt() -> Statement {
    stmt(StatementKind::Continue)
}

// === PATTERNS ===

pub fn p_wild() -> Pattern {
    pat(PatternKind::Wildcard)
}

pub fn p_bind(name: &str) -> Pattern {
    pat(PatternKind::Binding(identifier(name)))
}

pub fn p_int(value: i64) -> Pattern {
    pat(PatternKind::Literal(LiteralPattern::Integer(value)))
}

pub fn p_float(value: f64) -> Pattern {
    pat(PatternKind::Literal(LiteralPattern::Float(value)))
}

pub fn p_bool(value: bool) -> Pattern {
    pat(PatternKind::Literal(LiteralPattern::Boolean(value)))
}

pub fn p_str(value: &str) -> Pattern {
    pat(PatternKind::Literal(LiteralPattern::String(value.to_string())))
}

pub fn p_tuple(elements: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Tuple(elements))
}

pub fn p_variant(enum_name: Option<&str>, variant: &str, fields: Vec<Pattern>) -> Pattern {
    pat(PatternKind::Variant {
        enum_name: enum_name.map(type_identifier),
        variant: type_identifier(variant),
        fields,
    })
}

/// `Class { field: pattern, shorthand }`
pub fn p_class(class_name: &str, fields: Vec<(&str, Option<Pattern>)>) -> Pattern {
    pat(PatternKind::Class {
        class_name: type_identifier(class_name),
        fields: fields
            .into_iter()
            .map(|(name, pattern)| FieldPattern {
                name: identifier(name),
                pattern,
                span: Span::default(),
            })
            .collect(),
    })
}

// === DECLARATIONS ===

pub fn param(name: &str, type_annotation: TypeAnnotation) -> Parameter {
    Parameter {
        name: identifier(name),
        type_annotation,
        span: Span::default(),
    }
}

pub fn generic_param(name: &str, bounds: &[&str]) -> GenericParam {
    GenericParam {
        name: type_identifier(name),
        bounds: bounds.iter().map(|bound| type_identifier(bound)).collect(),
        span: Span::default(),
    }
}

/// `func name(params) -> ret { body }`
pub fn func(
    name: &str,
    parameters: Vec<Parameter>,
    return_type: Option<TypeAnnotation>,
    body: Vec<Statement>,
) -> FunctionDefinition {
    FunctionDefinition {
        name: identifier(name),
        generic_params: vec![],
        parameters,
        return_type,
        is_async: false,
        body: block(body),
        span: Span::default(),
    }
}

impl FunctionDefinition {
    pub fn with_generic(mut self, name: &str, bounds: &[&str]) -> Self {
        self.generic_params.push(generic_param(name, bounds));
        self
    }

    pub fn into_async(mut self) -> Self {
        self.is_async = true;
        self
    }
}

pub fn signature(
    name: &str,
    parameters: Vec<Parameter>,
    return_type: Option<TypeAnnotation>,
) -> FunctionSignature {
    FunctionSignature {
        name: identifier(name),
        parameters,
        return_type,
        span: Span::default(),
    }
}

pub fn class(name: &str) -> ClassDefinition {
    ClassDefinition {
        name: type_identifier(name),
        generic_params: vec![],
        traits: vec![],
        fields: vec![],
        methods: vec![],
        span: Span::default(),
    }
}

impl ClassDefinition {
    pub fn with_generic(mut self, name: &str, bounds: &[&str]) -> Self {
        self.generic_params.push(generic_param(name, bounds));
        self
    }

    pub fn implementing(mut self, trait_name: &str) -> Self {
        self.traits.push(type_identifier(trait_name));
        self
    }

    pub fn with_field(mut self, name: &str, type_annotation: TypeAnnotation) -> Self {
        self.fields.push(FieldDefinition {
            name: identifier(name),
            type_annotation,
            span: Span::default(),
        });
        self
    }

    pub fn with_method(mut self, method: FunctionDefinition) -> Self {
        self.methods.push(method);
        self
    }
}

pub fn enum_def(name: &str) -> EnumDefinition {
    EnumDefinition {
        name: type_identifier(name),
        generic_params: vec![],
        variants: vec![],
        span: Span::default(),
    }
}

impl EnumDefinition {
    pub fn with_generic(mut self, name: &str, bounds: &[&str]) -> Self {
        self.generic_params.push(generic_param(name, bounds));
        self
    }

    pub fn with_variant(mut self, name: &str, fields: Vec<TypeAnnotation>) -> Self {
        self.variants.push(VariantDefinition {
            name: type_identifier(name),
            fields,
            span: Span::default(),
        });
        self
    }
}

pub fn trait_def(name: &str, methods: Vec<FunctionSignature>) -> TraitDefinition {
    TraitDefinition {
        name: type_identifier(name),
        methods,
        span: Span::default(),
    }
}

pub fn impl_block(
    trait_name: &str,
    target: TypeAnnotation,
    methods: Vec<FunctionDefinition>,
) -> ImplBlock {
    ImplBlock {
        generic_params: vec![],
        trait_name: type_identifier(trait_name),
        target,
        methods,
        span: Span::default(),
    }
}

impl ImplBlock {
    pub fn with_generic(mut self, name: &str, bounds: &[&str]) -> Self {
        self.generic_params.push(generic_param(name, bounds));
        self
    }
}

impl From<FunctionDefinition> for Item {
    fn from(definition: FunctionDefinition) -> Self {
        let span = definition.span;
        Item {
            kind: ItemKind::Function(definition),
            span,
        }
    }
}

impl From<ClassDefinition> for Item {
    fn from(definition: ClassDefinition) -> Self {
        let span = definition.span;
        Item {
            kind: ItemKind::Class(definition),
            span,
        }
    }
}

impl From<EnumDefinition> for Item {
    fn from(definition: EnumDefinition) -> Self {
        let span = definition.span;
        Item {
            kind: ItemKind::Enum(definition),
            span,
        }
    }
}

impl From<TraitDefinition> for Item {
    fn from(definition: TraitDefinition) -> Self {
        let span = definition.span;
        Item {
            kind: ItemKind::Trait(definition),
            span,
        }
    }
}

impl From<ImplBlock> for Item {
    fn from(block: ImplBlock) -> Self {
        let span = block.span;
        Item {
            kind: ItemKind::Impl(block),
            span,
        }
    }
}

pub fn program(items: Vec<Item>) -> Program {
    Program {
        items,
        span: Span::default(),
    }
}
