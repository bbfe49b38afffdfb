//! Exhaustiveness, reachability and decision trees

use super::harness::{assert_checks, check};
use crate::error::{CompileError, PatternError};
use crate::typed_ast::{TypedExpressionKind, TypedStatementKind};
use crate::DecisionTree;
use vela_ast::builder::*;
use vela_ast::{BinaryOperator, Expression, Item, MatchArm, TypeAnnotation};

/// `func classify(n: <ann>) -> str { return match n { ... } }`
fn classifier(annotation: TypeAnnotation, arms: Vec<MatchArm>) -> Item {
    func(
        "classify",
        vec![param("n", annotation)],
        Some(ty("str")),
        vec![ret(match_expr(var("n"), arms))],
    )
    .into()
}

fn fizz_scrutinee() -> Expression {
    tuple(vec![
        binary(var("n"), BinaryOperator::Modulo, int(3)),
        binary(var("n"), BinaryOperator::Modulo, int(5)),
    ])
}

fn shape() -> Item {
    enum_def("Shape")
        .with_variant("Circle", vec![ty("int")])
        .with_variant("Square", vec![ty("int")])
        .into()
}

fn pattern_errors(items: Vec<Item>) -> Vec<PatternError> {
    check(items)
        .diagnostics
        .errors
        .into_iter()
        .filter_map(|error| match error {
            CompileError::Pattern(error) => Some(error),
            _ => None,
        })
        .collect()
}

fn witnesses(items: Vec<Item>) -> Vec<String> {
    pattern_errors(items)
        .into_iter()
        .filter_map(|error| match error {
            PatternError::NonExhaustiveMatch { witness, .. } => Some(witness),
            PatternError::UnreachableArm { .. } => None,
        })
        .collect()
}

#[test]
fn test_fizzbuzz_missing_fallback() {
    let fizz = func(
        "fizz",
        vec![param("n", ty("int"))],
        Some(ty("str")),
        vec![ret(match_expr(
            fizz_scrutinee(),
            vec![
                arm(p_tuple(vec![p_int(0), p_int(0)]), string("FizzBuzz")),
                arm(p_tuple(vec![p_int(0), p_wild()]), string("Fizz")),
                arm(p_tuple(vec![p_wild(), p_int(0)]), string("Buzz")),
            ],
        ))],
    );
    assert_eq!(witnesses(vec![fizz.into()]), vec!["(1, 1)"]);
}

#[test]
fn test_arm_after_wildcard_is_unreachable() {
    let errors = pattern_errors(vec![classifier(
        ty("int"),
        vec![arm(p_wild(), string("any")), arm(p_int(0), string("zero"))],
    )]);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], PatternError::UnreachableArm { arm: 1, .. }));
}

#[test]
fn test_duplicate_literal_is_unreachable() {
    let errors = pattern_errors(vec![classifier(
        ty("int"),
        vec![
            arm(p_int(1), string("one")),
            arm(p_int(1), string("uno")),
            arm(p_wild(), string("other")),
        ],
    )]);
    assert!(matches!(
        errors.as_slice(),
        [PatternError::UnreachableArm { arm: 1, .. }]
    ));
}

#[test]
fn test_missing_enum_variant() {
    let area = classifier(
        ty("Shape"),
        vec![arm(
            p_variant(Some("Shape"), "Circle", vec![p_bind("r")]),
            string("circle"),
        )],
    );
    assert_eq!(witnesses(vec![shape(), area]), vec!["Shape.Square(_)"]);
}

#[test]
fn test_missing_nullary_variant_of_generic_enum() {
    let maybe = enum_def("Maybe")
        .with_generic("T", &[])
        .with_variant("Just", vec![ty("T")])
        .with_variant("Nothing", vec![]);
    let unwrap = classifier(
        ty_generic("Maybe", vec![ty("int")]),
        vec![arm(
            p_variant(Some("Maybe"), "Just", vec![p_wild()]),
            string("something"),
        )],
    );
    assert_eq!(witnesses(vec![maybe.into(), unwrap]), vec!["Maybe.Nothing"]);
}

#[test]
fn test_missing_bool() {
    let items = vec![classifier(ty("bool"), vec![arm(p_bool(true), string("yes"))])];
    assert_eq!(witnesses(items), vec!["false"]);
}

#[test]
fn test_missing_int_is_smallest_unused() {
    let items = vec![classifier(
        ty("int"),
        vec![
            arm(p_int(0), string("zero")),
            arm(p_int(1), string("one")),
            arm(p_int(3), string("three")),
        ],
    )];
    assert_eq!(witnesses(items), vec!["2"]);
}

#[test]
fn test_missing_float_is_a_whole_number() {
    let items = vec![classifier(
        ty("float"),
        vec![
            arm(p_float(0.0), string("zero")),
            arm(p_int(1), string("one")),
        ],
    )];
    assert_eq!(witnesses(items), vec!["2.0"]);
}

#[test]
fn test_missing_str_is_a_string_literal() {
    let items = vec![classifier(
        ty("str"),
        vec![arm(p_str(""), string("empty")), arm(p_str("b"), string("bee"))],
    )];
    assert_eq!(witnesses(items), vec!["\"a\""]);
}

#[test]
fn test_guarded_arms_do_not_cover() {
    let items = vec![classifier(
        ty("int"),
        vec![guarded_arm(
            p_bind("x"),
            binary(var("x"), BinaryOperator::Greater, int(0)),
            string("positive"),
        )],
    )];
    assert_eq!(witnesses(items), vec!["_"]);
}

#[test]
fn test_class_pattern_witness_names_fields() {
    let point = class("Point")
        .with_field("x", ty("int"))
        .with_field("y", ty("int"));
    let items = vec![
        point.into(),
        classifier(
            ty("Point"),
            vec![arm(
                p_class("Point", vec![("x", Some(p_int(0))), ("y", None)]),
                string("on axis"),
            )],
        ),
    ];
    assert_eq!(witnesses(items), vec!["Point { x: 1, y: _ }"]);
}

#[test]
fn test_exhaustive_match_gets_a_decision_tree() {
    let result = assert_checks(vec![
        shape(),
        classifier(
            ty("Shape"),
            vec![
                arm(p_variant(Some("Shape"), "Circle", vec![p_wild()]), string("circle")),
                arm(p_variant(Some("Shape"), "Square", vec![p_wild()]), string("square")),
            ],
        ),
    ]);

    let classify = result
        .program
        .function_named("classify")
        .expect("checked function");
    let Some(TypedStatementKind::Return(Some(value))) =
        classify.body.statements.first().map(|statement| &statement.kind)
    else {
        panic!("expected a return statement");
    };
    let TypedExpressionKind::Match(matched) = &value.kind else {
        panic!("expected a match");
    };
    assert!(matches!(
        matched.tree,
        Some(DecisionTree::Switch { ref cases, default: None, .. }) if cases.len() == 2
    ));
}
