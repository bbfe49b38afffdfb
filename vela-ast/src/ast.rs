// Vela AST Definitions
// Abstract Syntax Tree nodes with source positions

/// Source position information for AST nodes (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Top-level program containing all items of one compilation unit
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Item>,
    pub span: Span,
}

/// Top-level declarations
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Function(FunctionDefinition),
    Class(ClassDefinition),
    Enum(EnumDefinition),
    Trait(TraitDefinition),
    Impl(ImplBlock),
}

/// Lower-case identifiers (variables, functions, fields, methods)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// Capitalised identifiers and primitive type names used in type position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeIdentifier {
    pub name: String,
    pub span: Span,
}

// === TYPE ANNOTATIONS ===

/// Type annotation as written in source
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    /// `int`, `list<T>`, `Stack<int>`, `T`
    Named {
        name: TypeIdentifier,
        generic_args: Vec<TypeAnnotation>,
        span: Span,
    },
    /// `(int, str)`
    Tuple {
        types: Vec<TypeAnnotation>,
        span: Span,
    },
    /// `fn(int, int) -> bool`
    Function {
        params: Vec<TypeAnnotation>,
        return_type: Box<TypeAnnotation>,
        span: Span,
    },
}

impl TypeAnnotation {
    pub fn span(&self) -> Span {
        match self {
            TypeAnnotation::Named { span, .. }
            | TypeAnnotation::Tuple { span, .. }
            | TypeAnnotation::Function { span, .. } => *span,
        }
    }
}

/// Generic parameter with its trait bounds: `T: Drawable + Show`
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: TypeIdentifier,
    pub bounds: Vec<TypeIdentifier>,
    pub span: Span,
}

// === DECLARATIONS ===

/// Function parameter with a required type annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub type_annotation: TypeAnnotation,
    pub span: Span,
}

/// `func` / `async func` definitions, also used for methods
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: Identifier,
    pub generic_params: Vec<GenericParam>,
    pub parameters: Vec<Parameter>,
    /// `None` means `void`
    pub return_type: Option<TypeAnnotation>,
    pub is_async: bool,
    pub body: Block,
    pub span: Span,
}

/// Function signature without body (trait methods)
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: Identifier,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub span: Span,
}

/// `class Name<T> : TraitA, TraitB { fields; methods }`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: TypeIdentifier,
    pub generic_params: Vec<GenericParam>,
    pub traits: Vec<TypeIdentifier>,
    pub fields: Vec<FieldDefinition>,
    pub methods: Vec<FunctionDefinition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: Identifier,
    pub type_annotation: TypeAnnotation,
    pub span: Span,
}

/// `enum Shape { Circle(float), Square(float), Empty }`
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDefinition {
    pub name: TypeIdentifier,
    pub generic_params: Vec<GenericParam>,
    pub variants: Vec<VariantDefinition>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantDefinition {
    pub name: TypeIdentifier,
    pub fields: Vec<TypeAnnotation>,
    pub span: Span,
}

/// `trait Drawable { func draw() -> void }`
#[derive(Debug, Clone, PartialEq)]
pub struct TraitDefinition {
    pub name: TypeIdentifier,
    pub methods: Vec<FunctionSignature>,
    pub span: Span,
}

/// `impl<T: Show> Show for list<T> { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ImplBlock {
    pub generic_params: Vec<GenericParam>,
    pub trait_name: TypeIdentifier,
    pub target: TypeAnnotation,
    pub methods: Vec<FunctionDefinition>,
    pub span: Span,
}

// === STATEMENTS ===

/// Block of statements; its value is the trailing expression statement, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Let(LetBinding),
    Assignment(Assignment),
    Expression(Box<Expression>),
    Return(Option<Box<Expression>>),
    While(WhileLoop),
    For(ForLoop),
    Break,
    Continue,
}

/// `auto x = e`, `int x = e`, `const x = e`
#[derive(Debug, Clone, PartialEq)]
pub struct LetBinding {
    pub name: Identifier,
    /// `None` = `auto`, infer from the initializer
    pub type_annotation: Option<TypeAnnotation>,
    pub is_const: bool,
    pub value: Expression,
    pub span: Span,
}

/// `target = value` where target is a variable, field or index expression
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Expression,
    /// `Some(Add)` for `+=`, `Some(Subtract)` for `-=`
    pub operator: Option<BinaryOperator>,
    pub value: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub condition: Expression,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub variable: Identifier,
    pub iterable: Expression,
    pub body: Block,
    pub span: Span,
}

// === EXPRESSIONS ===

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    /// `null`, the absent value of a class, list or string
    Null,
    Identifier(Identifier),
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Binary(BinaryOperation),
    Unary(UnaryOperation),
    Call(FunctionCall),
    MethodCall(MethodCall),
    FieldAccess(FieldAccess),
    Index(IndexExpression),
    Lambda(Lambda),
    Pipeline(Pipeline),
    If(IfExpression),
    Match(MatchExpression),
    Block(Block),
    Object(ObjectLiteral),
    Variant(VariantPath),
    Await(Box<Expression>),
    Parallel(ParallelBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic operators
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Modulo,   // %
    Exponent, // **

    // Comparison operators
    Equal,        // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=

    // Logical operators
    And, // and
    Or,  // or
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperation {
    pub left: Box<Expression>,
    pub operator: BinaryOperator,
    pub right: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Minus, // -
    Not,   // not
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperation {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
    pub span: Span,
}

/// `callee(args)`; the callee is usually an identifier or a variant path
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

/// `receiver.method(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub receiver: Box<Expression>,
    pub method: Identifier,
    pub arguments: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccess {
    pub object: Box<Expression>,
    pub field: Identifier,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpression {
    pub target: Box<Expression>,
    pub index: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaParameter {
    pub name: Identifier,
    pub type_annotation: Option<TypeAnnotation>,
    pub span: Span,
}

/// `|x, y: int| body`
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameters: Vec<LambdaParameter>,
    pub body: Box<Expression>,
    pub span: Span,
}

/// `value |> stage1 |> stage2`
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub value: Box<Expression>,
    pub stages: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpression {
    pub condition: Box<Expression>,
    pub then_block: Block,
    /// Either a `Block` expression or a nested `If`
    pub else_branch: Option<Box<Expression>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpression {
    pub scrutinee: Box<Expression>,
    pub arms: Vec<MatchArm>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expression>,
    pub body: Expression,
    pub span: Span,
}

/// `Circle { radius = 5.0 }` or `Stack<int> { items = [] }`
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLiteral {
    pub class_name: TypeIdentifier,
    pub generic_args: Vec<TypeAnnotation>,
    pub fields: Vec<ObjectField>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    pub name: Identifier,
    pub value: Expression,
    pub span: Span,
}

/// `Shape.Circle` or a bare `None`; called like a function when the variant has fields
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPath {
    pub enum_name: Option<TypeIdentifier>,
    pub variant: TypeIdentifier,
    pub span: Span,
}

/// `parallel { e1, e2, ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelBlock {
    pub tasks: Vec<Expression>,
    pub span: Span,
}

// === PATTERNS ===

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    Wildcard,
    Binding(Identifier),
    Literal(LiteralPattern),
    Tuple(Vec<Pattern>),
    Variant {
        enum_name: Option<TypeIdentifier>,
        variant: TypeIdentifier,
        fields: Vec<Pattern>,
    },
    Class {
        class_name: TypeIdentifier,
        fields: Vec<FieldPattern>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralPattern {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

/// `field: pattern`, or just `field` which binds a variable of the same name
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPattern {
    pub name: Identifier,
    pub pattern: Option<Pattern>,
    pub span: Span,
}

// === DISPLAY ===

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::fmt::Display for TypeIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeAnnotation::Named {
                name, generic_args, ..
            } => {
                write!(f, "{}", name)?;
                if !generic_args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in generic_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeAnnotation::Tuple { types, .. } => {
                write!(f, "(")?;
                for (i, ty) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, ")")
            }
            TypeAnnotation::Function {
                params,
                return_type,
                ..
            } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", return_type)
            }
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op_str = match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Exponent => "**",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        };
        write!(f, "{}", op_str)
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Minus => write!(f, "-"),
            UnaryOperator::Not => write!(f, "not "),
        }
    }
}

impl std::fmt::Display for LiteralPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LiteralPattern::Integer(value) => write!(f, "{}", value),
            LiteralPattern::Float(value) => write!(f, "{:?}", value),
            LiteralPattern::Boolean(value) => write!(f, "{}", value),
            LiteralPattern::String(value) => write!(f, "\"{}\"", value),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PatternKind::Wildcard => write!(f, "_"),
            PatternKind::Binding(name) => write!(f, "{}", name),
            PatternKind::Literal(literal) => write!(f, "{}", literal),
            PatternKind::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
            PatternKind::Variant {
                enum_name,
                variant,
                fields,
            } => {
                if let Some(enum_name) = enum_name {
                    write!(f, "{}.", enum_name)?;
                }
                write!(f, "{}", variant)?;
                if !fields.is_empty() {
                    write!(f, "(")?;
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", field)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            PatternKind::Class { class_name, fields } => {
                write!(f, "{} {{ ", class_name)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &field.pattern {
                        Some(pattern) => write!(f, "{}: {}", field.name, pattern)?,
                        None => write!(f, "{}", field.name)?,
                    }
                }
                write!(f, " }}")
            }
        }
    }
}

impl std::fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "func {}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.type_annotation)?;
        }
        write!(f, ")")?;
        if let Some(return_type) = &self.return_type {
            write!(f, " -> {}", return_type)?;
        }
        Ok(())
    }
}

impl FunctionDefinition {
    /// The signature part of this definition
    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            return_type: self.return_type.clone(),
            span: self.span,
        }
    }
}

impl Expression {
    /// True for expressions that can appear on the left of `=`
    pub fn is_place(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Identifier(_)
                | ExpressionKind::FieldAccess(_)
                | ExpressionKind::Index(_)
        )
    }
}
