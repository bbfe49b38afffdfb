//! Pattern-match compilation
//!
//! Exhaustiveness and reachability use the usefulness algorithm over pattern
//! matrices, producing a witness for the first uncovered value. Accepted
//! matches are compiled to decision trees that test each occurrence at most
//! once per path and try arms in source order.

use crate::context::{LocalId, UnitContext};
use crate::error::{at, Diagnostics, PatternError};
use crate::typed_ast::{
    visit_block_expressions_mut, LiteralValue, TypedExpressionKind, TypedMatch, TypedPattern,
    TypedPatternKind, TypedProgram,
};
use crate::types::{PrimitiveType, Type};
use std::fmt;
use tracing::{debug, instrument};
use vela_ast::Span;

/// One step from a value into one of its components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Tuple element or class field
    Field(usize),
    /// Field of an enum value already known to carry variant `tag`
    VariantField { tag: usize, index: usize },
}

/// Path from the scrutinee to a sub-value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Occurrence(pub Vec<Projection>);

impl Occurrence {
    pub fn root() -> Self {
        Self::default()
    }

    fn child(&self, projection: Projection) -> Self {
        let mut path = self.0.clone();
        path.push(projection);
        Occurrence(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBinding {
    pub local: LocalId,
    pub occurrence: Occurrence,
}

/// A constructor tested by a `Switch`
#[derive(Debug, Clone, PartialEq)]
pub enum Case {
    Variant { tag: usize, name: String },
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionTree {
    Leaf {
        arm: usize,
        bindings: Vec<PatternBinding>,
    },
    /// Bind, evaluate the arm's guard, fall through to `on_failure` if false
    Guard {
        arm: usize,
        bindings: Vec<PatternBinding>,
        on_failure: Box<DecisionTree>,
    },
    Switch {
        occurrence: Occurrence,
        cases: Vec<(Case, DecisionTree)>,
        default: Option<Box<DecisionTree>>,
    },
}

impl DecisionTree {
    /// Arms reachable from this tree, in first-seen order
    pub fn arms(&self) -> Vec<usize> {
        let mut arms = Vec::new();
        self.collect_arms(&mut arms);
        arms
    }

    fn collect_arms(&self, arms: &mut Vec<usize>) {
        match self {
            DecisionTree::Leaf { arm, .. } => {
                if !arms.contains(arm) {
                    arms.push(*arm);
                }
            }
            DecisionTree::Guard {
                arm, on_failure, ..
            } => {
                if !arms.contains(arm) {
                    arms.push(*arm);
                }
                on_failure.collect_arms(arms);
            }
            DecisionTree::Switch { cases, default, .. } => {
                for (_, tree) in cases {
                    tree.collect_arms(arms);
                }
                if let Some(default) = default {
                    default.collect_arms(arms);
                }
            }
        }
    }
}

// === MATRIX REPRESENTATION ===

#[derive(Debug, Clone, PartialEq)]
enum Constructor {
    Tuple(usize),
    Class { name: String, fields: Vec<String> },
    Variant { enum_name: String, name: String, tag: usize, arity: usize },
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Constructor {
    fn arity(&self) -> usize {
        match self {
            Constructor::Tuple(arity) | Constructor::Variant { arity, .. } => *arity,
            Constructor::Class { fields, .. } => fields.len(),
            _ => 0,
        }
    }

    /// Single-constructor types are destructured without a test
    fn is_irrefutable(&self) -> bool {
        matches!(self, Constructor::Tuple(_) | Constructor::Class { .. })
    }

    fn case(&self) -> Option<Case> {
        match self {
            Constructor::Variant { name, tag, .. } => Some(Case::Variant {
                tag: *tag,
                name: name.clone(),
            }),
            Constructor::Bool(value) => Some(Case::Bool(*value)),
            Constructor::Int(value) => Some(Case::Int(*value)),
            Constructor::Float(value) => Some(Case::Float(*value)),
            Constructor::Str(value) => Some(Case::Str(value.clone())),
            Constructor::Tuple(_) | Constructor::Class { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Pat {
    Wild(Option<LocalId>),
    Ctor(Constructor, Vec<Pat>),
}

impl Pat {
    fn wild() -> Self {
        Pat::Wild(None)
    }
}

/// A value shape not covered by the match
#[derive(Debug, Clone, PartialEq)]
enum Witness {
    Wild,
    Ctor(Constructor, Vec<Witness>),
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_list = |f: &mut fmt::Formatter<'_>, items: &[Witness]| -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        };

        match self {
            Witness::Wild => write!(f, "_"),
            Witness::Ctor(constructor, children) => match constructor {
                Constructor::Tuple(_) => {
                    write!(f, "(")?;
                    write_list(f, children)?;
                    write!(f, ")")
                }
                Constructor::Class { name, fields } => {
                    write!(f, "{name} {{ ")?;
                    for (i, (field, child)) in fields.iter().zip(children.iter()).enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{field}: {child}")?;
                    }
                    write!(f, " }}")
                }
                Constructor::Variant {
                    enum_name, name, ..
                } => {
                    write!(f, "{enum_name}.{name}")?;
                    if !children.is_empty() {
                        write!(f, "(")?;
                        write_list(f, children)?;
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Constructor::Bool(value) => write!(f, "{value}"),
                Constructor::Int(value) => write!(f, "{value}"),
                Constructor::Float(value) => write!(f, "{value:?}"),
                Constructor::Str(value) => write!(f, "\"{value}\""),
            },
        }
    }
}

/// Type-directed constructor information backed by the unit's declarations
struct Signatures<'a> {
    ctx: &'a UnitContext,
}

impl<'a> Signatures<'a> {
    /// Every constructor of a finite type; `None` for int, float and str
    fn all_constructors(&self, ty: &Type) -> Option<Vec<Constructor>> {
        match ty {
            Type::Primitive(PrimitiveType::Bool) => {
                Some(vec![Constructor::Bool(true), Constructor::Bool(false)])
            }
            Type::Tuple(elements) => Some(vec![Constructor::Tuple(elements.len())]),
            Type::Nominal { name, .. } => {
                if let Some(info) = self.ctx.enums.get(name) {
                    Some(
                        info.variants
                            .values()
                            .map(|variant| Constructor::Variant {
                                enum_name: info.name.clone(),
                                name: variant.name.clone(),
                                tag: variant.tag,
                                arity: variant.fields.len(),
                            })
                            .collect(),
                    )
                } else {
                    self.ctx.classes.get(name).map(|class| {
                        vec![Constructor::Class {
                            name: class.name.clone(),
                            fields: class.fields.keys().cloned().collect(),
                        }]
                    })
                }
            }
            _ => None,
        }
    }

    fn field_types(&self, ty: &Type, constructor: &Constructor) -> Vec<Type> {
        match (ty, constructor) {
            (Type::Tuple(elements), Constructor::Tuple(_)) => elements.clone(),
            (Type::Nominal { args, .. }, Constructor::Variant { enum_name, tag, .. }) => {
                self.ctx.variant_fields(enum_name, args, *tag)
            }
            (Type::Nominal { .. }, Constructor::Class { fields, .. }) => fields
                .iter()
                .filter_map(|field| self.ctx.field_of(ty, field).map(|info| info.ty))
                .collect(),
            _ => vec![Type::void(); constructor.arity()],
        }
    }

    fn lower_pattern(&self, pattern: &TypedPattern) -> Pat {
        match &pattern.kind {
            TypedPatternKind::Wildcard => Pat::wild(),
            TypedPatternKind::Binding(local) => Pat::Wild(Some(*local)),
            TypedPatternKind::Literal(literal) => {
                let constructor = match literal {
                    LiteralValue::Integer(value) if pattern.ty.is_float() => {
                        Constructor::Float(*value as f64)
                    }
                    LiteralValue::Integer(value) => Constructor::Int(*value),
                    LiteralValue::Float(value) => Constructor::Float(*value),
                    LiteralValue::Boolean(value) => Constructor::Bool(*value),
                    LiteralValue::String(value) => Constructor::Str(value.clone()),
                };
                Pat::Ctor(constructor, vec![])
            }
            TypedPatternKind::Tuple(elements) => Pat::Ctor(
                Constructor::Tuple(elements.len()),
                elements.iter().map(|p| self.lower_pattern(p)).collect(),
            ),
            TypedPatternKind::Variant {
                enum_name,
                variant,
                tag,
                fields,
            } => Pat::Ctor(
                Constructor::Variant {
                    enum_name: enum_name.clone(),
                    name: variant.clone(),
                    tag: *tag,
                    arity: fields.len(),
                },
                fields.iter().map(|p| self.lower_pattern(p)).collect(),
            ),
            TypedPatternKind::Class { class_name, fields } => {
                let names = self
                    .ctx
                    .classes
                    .get(class_name)
                    .map(|class| class.fields.keys().cloned().collect())
                    .unwrap_or_default();
                Pat::Ctor(
                    Constructor::Class {
                        name: class_name.clone(),
                        fields: names,
                    },
                    fields.iter().map(|p| self.lower_pattern(p)).collect(),
                )
            }
        }
    }

    // === USEFULNESS ===

    /// Is `vector` useful with respect to `rows`? Returns a witness when it is.
    fn useful(&self, rows: &[Vec<Pat>], vector: &[Pat], types: &[Type]) -> Option<Vec<Witness>> {
        let Some((head, tail)) = vector.split_first() else {
            return rows.is_empty().then(Vec::new);
        };
        let ty = &types[0];

        match head {
            Pat::Ctor(constructor, args) => {
                let rows = specialize(rows, constructor);
                let mut next: Vec<Pat> = args.clone();
                next.extend(tail.iter().cloned());
                let mut next_types = self.field_types(ty, constructor);
                next_types.extend(types[1..].iter().cloned());
                self.useful(&rows, &next, &next_types)
                    .map(|witness| rebuild(constructor, witness))
            }
            Pat::Wild(_) => {
                let used = head_constructors(rows);
                let all = self.all_constructors(ty);

                if let Some(all) = all
                    .as_ref()
                    .filter(|all| !all.is_empty() && all.iter().all(|c| used.contains(c)))
                {
                    for constructor in all {
                        let rows = specialize(rows, constructor);
                        let mut next = vec![Pat::wild(); constructor.arity()];
                        next.extend(tail.iter().cloned());
                        let mut next_types = self.field_types(ty, constructor);
                        next_types.extend(types[1..].iter().cloned());
                        if let Some(witness) = self.useful(&rows, &next, &next_types) {
                            return Some(rebuild(constructor, witness));
                        }
                    }
                    return None;
                }

                let defaults: Vec<Vec<Pat>> = rows
                    .iter()
                    .filter(|row| matches!(row.first(), Some(Pat::Wild(_))))
                    .map(|row| row[1..].to_vec())
                    .collect();
                self.useful(&defaults, tail, &types[1..]).map(|mut witness| {
                    witness.insert(0, missing_constructor(ty, all.as_deref(), &used));
                    witness
                })
            }
        }
    }

    // === DECISION TREES ===

    fn compile_rows(&self, rows: Vec<Row>, span: Span) -> Result<DecisionTree, PatternError> {
        let mut rows: Vec<Row> = rows.into_iter().map(|row| self.normalize(row)).collect();
        if rows.is_empty() {
            return Err(PatternError::NonExhaustiveMatch {
                witness: "_".to_string(),
                span: at(span),
            });
        }

        if rows[0].tests.is_empty() {
            let first = rows.remove(0);
            return Ok(if first.guarded {
                DecisionTree::Guard {
                    arm: first.arm,
                    bindings: first.bindings,
                    on_failure: Box::new(self.compile_rows(rows, span)?),
                }
            } else {
                DecisionTree::Leaf {
                    arm: first.arm,
                    bindings: first.bindings,
                }
            });
        }

        let (occurrence, ty) = {
            let test = &rows[0].tests[0];
            (test.occurrence.clone(), test.ty.clone())
        };

        let mut constructors: Vec<Constructor> = Vec::new();
        for row in &rows {
            if let Some(test) = row.test_at(&occurrence) {
                if let Pat::Ctor(constructor, _) = &test.pattern {
                    if !constructors.contains(constructor) {
                        constructors.push(constructor.clone());
                    }
                }
            }
        }

        let mut cases = Vec::new();
        for constructor in &constructors {
            let Some(case) = constructor.case() else {
                continue;
            };
            let field_types = self.field_types(&ty, constructor);
            let specialized: Vec<Row> = rows
                .iter()
                .filter_map(|row| row.specialize(&occurrence, constructor, &field_types))
                .collect();
            cases.push((case, self.compile_rows(specialized, span)?));
        }

        let covered = self
            .all_constructors(&ty)
            .is_some_and(|all| all.iter().all(|c| constructors.contains(c)));
        let default = if covered {
            None
        } else {
            let remaining: Vec<Row> = rows
                .iter()
                .filter(|row| row.test_at(&occurrence).is_none())
                .cloned()
                .collect();
            Some(Box::new(self.compile_rows(remaining, span)?))
        };

        Ok(DecisionTree::Switch {
            occurrence,
            cases,
            default,
        })
    }

    /// Drop wildcard tests (recording bindings) and expand irrefutable constructors
    fn normalize(&self, mut row: Row) -> Row {
        let mut pending = std::mem::take(&mut row.tests);
        pending.reverse();
        while let Some(test) = pending.pop() {
            match test.pattern {
                Pat::Wild(binding) => {
                    if let Some(local) = binding {
                        row.bindings.push(PatternBinding {
                            local,
                            occurrence: test.occurrence,
                        });
                    }
                }
                Pat::Ctor(constructor, children) if constructor.is_irrefutable() => {
                    let field_types = self.field_types(&test.ty, &constructor);
                    let mut expanded: Vec<Test> = children
                        .into_iter()
                        .zip(field_types)
                        .enumerate()
                        .map(|(index, (pattern, ty))| Test {
                            occurrence: test.occurrence.child(Projection::Field(index)),
                            ty,
                            pattern,
                        })
                        .collect();
                    expanded.reverse();
                    pending.extend(expanded);
                }
                pattern => row.tests.push(Test {
                    occurrence: test.occurrence,
                    ty: test.ty,
                    pattern,
                }),
            }
        }
        row
    }
}

fn head_constructors(rows: &[Vec<Pat>]) -> Vec<Constructor> {
    let mut constructors = Vec::new();
    for row in rows {
        if let Some(Pat::Ctor(constructor, _)) = row.first() {
            if !constructors.contains(constructor) {
                constructors.push(constructor.clone());
            }
        }
    }
    constructors
}

fn specialize(rows: &[Vec<Pat>], constructor: &Constructor) -> Vec<Vec<Pat>> {
    rows.iter()
        .filter_map(|row| {
            let (head, tail) = row.split_first()?;
            let mut next = match head {
                Pat::Ctor(other, args) if other == constructor => args.clone(),
                Pat::Ctor(..) => return None,
                Pat::Wild(_) => vec![Pat::wild(); constructor.arity()],
            };
            next.extend(tail.iter().cloned());
            Some(next)
        })
        .collect()
}

fn rebuild(constructor: &Constructor, mut witness: Vec<Witness>) -> Vec<Witness> {
    let rest = witness.split_off(constructor.arity().min(witness.len()));
    let mut rebuilt = vec![Witness::Ctor(constructor.clone(), witness)];
    rebuilt.extend(rest);
    rebuilt
}

/// A constructor of `ty` that no row in `used` mentions
fn missing_constructor(ty: &Type, all: Option<&[Constructor]>, used: &[Constructor]) -> Witness {
    if used.is_empty() {
        return Witness::Wild;
    }
    if let Some(all) = all {
        if let Some(missing) = all.iter().find(|c| !used.contains(c)) {
            return Witness::Ctor(missing.clone(), vec![Witness::Wild; missing.arity()]);
        }
    }
    // Open types: the first value in a fixed sequence that no arm names
    let first_unused = |mut candidates: &mut dyn Iterator<Item = Constructor>| {
        Iterator::find(&mut candidates, |candidate| !used.contains(candidate))
            .map_or(Witness::Wild, |candidate| Witness::Ctor(candidate, vec![]))
    };
    match ty {
        Type::Primitive(PrimitiveType::Int) => first_unused(&mut (0i64..).map(Constructor::Int)),
        Type::Primitive(PrimitiveType::Float) => {
            first_unused(&mut (0u32..).map(|n| Constructor::Float(f64::from(n))))
        }
        Type::Primitive(PrimitiveType::Str) => {
            first_unused(&mut (0usize..).map(|n| Constructor::Str("a".repeat(n))))
        }
        _ => Witness::Wild,
    }
}

#[derive(Debug, Clone)]
struct Test {
    occurrence: Occurrence,
    ty: Type,
    pattern: Pat,
}

#[derive(Debug, Clone)]
struct Row {
    tests: Vec<Test>,
    arm: usize,
    guarded: bool,
    bindings: Vec<PatternBinding>,
}

impl Row {
    fn test_at(&self, occurrence: &Occurrence) -> Option<&Test> {
        self.tests.iter().find(|test| &test.occurrence == occurrence)
    }

    /// The row under the assumption that `occurrence` was built by `constructor`
    fn specialize(
        &self,
        occurrence: &Occurrence,
        constructor: &Constructor,
        field_types: &[Type],
    ) -> Option<Row> {
        let Some(position) = self
            .tests
            .iter()
            .position(|test| &test.occurrence == occurrence)
        else {
            return Some(self.clone());
        };
        let Pat::Ctor(found, children) = &self.tests[position].pattern else {
            return Some(self.clone());
        };
        if found != constructor {
            return None;
        }

        let mut row = self.clone();
        row.tests.remove(position);
        let projection = |index| match constructor {
            Constructor::Variant { tag, .. } => Projection::VariantField { tag: *tag, index },
            _ => Projection::Field(index),
        };
        let children: Vec<Test> = children
            .iter()
            .cloned()
            .zip(field_types.iter().cloned())
            .enumerate()
            .map(|(index, (pattern, ty))| Test {
                occurrence: occurrence.child(projection(index)),
                ty,
                pattern,
            })
            .collect();
        for (offset, test) in children.into_iter().enumerate() {
            row.tests.insert(position + offset, test);
        }
        Some(row)
    }
}

/// Check one match expression and build its decision tree
pub fn compile_match(
    ctx: &UnitContext,
    matched: &TypedMatch,
    span: Span,
) -> Result<DecisionTree, Vec<PatternError>> {
    let signatures = Signatures { ctx };
    let scrutinee_ty = matched.scrutinee.ty.clone();
    let types = [scrutinee_ty.clone()];
    let rows: Vec<Pat> = matched
        .arms
        .iter()
        .map(|arm| signatures.lower_pattern(&arm.pattern))
        .collect();

    let mut errors = Vec::new();
    let mut unguarded: Vec<Vec<Pat>> = Vec::new();
    for (index, (arm, pattern)) in matched.arms.iter().zip(rows.iter()).enumerate() {
        if signatures
            .useful(&unguarded, std::slice::from_ref(pattern), &types)
            .is_none()
        {
            errors.push(PatternError::UnreachableArm {
                arm: index,
                span: at(arm.pattern.span),
            });
        }
        if arm.guard.is_none() {
            unguarded.push(vec![pattern.clone()]);
        }
    }

    if let Some(witness) = signatures.useful(&unguarded, &[Pat::wild()], &types) {
        let witness = witness
            .first()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "_".to_string());
        errors.push(PatternError::NonExhaustiveMatch {
            witness,
            span: at(span),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let rows = matched
        .arms
        .iter()
        .zip(rows)
        .enumerate()
        .map(|(index, (arm, pattern))| Row {
            tests: vec![Test {
                occurrence: Occurrence::root(),
                ty: scrutinee_ty.clone(),
                pattern,
            }],
            arm: index,
            guarded: arm.guard.is_some(),
            bindings: Vec::new(),
        })
        .collect();
    signatures.compile_rows(rows, span).map_err(|error| vec![error])
}

/// Compile every match in the program, recording pattern errors
#[instrument(skip_all)]
pub fn compile_matches(program: &mut TypedProgram, ctx: &UnitContext) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for function in program.functions.iter_mut().filter(|function| !function.has_errors) {
        let mut compiled = 0usize;
        visit_block_expressions_mut(&mut function.body, &mut |expression| {
            let span = expression.span;
            if let TypedExpressionKind::Match(matched) = &mut expression.kind {
                match compile_match(ctx, matched, span) {
                    Ok(tree) => {
                        matched.tree = Some(tree);
                        compiled += 1;
                    }
                    Err(errors) => errors.into_iter().for_each(|error| diagnostics.push(error)),
                }
            }
        });
        if compiled > 0 {
            debug!(function = %function.key, matches = compiled, "compiled matches");
        }
    }
    diagnostics
}
