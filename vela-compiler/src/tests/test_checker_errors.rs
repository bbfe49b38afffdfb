//! Diagnostics reported by the type checker

use super::harness::{assert_checks, check_codes};
use crate::{check_program, CompilerOptions};
use vela_ast::builder::*;
use vela_ast::{BinaryOperator, Item, Statement, TypeAnnotation};

fn main_with(statements: Vec<Statement>) -> Vec<Item> {
    vec![func("main", vec![], None, statements).into()]
}

fn point() -> Item {
    class("Point")
        .with_field("x", ty("int"))
        .with_field("y", ty("int"))
        .into()
}

fn assert_reports(items: Vec<Item>, code: &str) {
    let codes = check_codes(items);
    assert!(
        codes.iter().any(|candidate| candidate == code),
        "expected {code}, got {codes:?}"
    );
}

#[test]
fn test_type_mismatch() {
    assert_reports(
        main_with(vec![let_typed("x", ty("int"), string("hi"))]),
        "vela::typecheck::type_mismatch",
    );
}

#[test]
fn test_operator_on_mismatched_operands() {
    assert_reports(
        main_with(vec![let_auto(
            "x",
            binary(int(1), BinaryOperator::Add, string("one")),
        )]),
        "vela::typecheck::type_mismatch",
    );
}

#[test]
fn test_unbound_identifier() {
    assert_eq!(
        check_codes(main_with(vec![expr_stmt(call("print", vec![var("missing")]))])),
        vec!["vela::typecheck::unbound_identifier"]
    );
}

#[test]
fn test_unknown_type() {
    assert_reports(
        main_with(vec![let_typed("x", ty("Nope"), int(1))]),
        "vela::typecheck::unknown_type",
    );
}

#[test]
fn test_arity_mismatch() {
    let double = func(
        "double",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![ret(binary(var("n"), BinaryOperator::Multiply, int(2)))],
    );
    let main = func(
        "main",
        vec![],
        None,
        vec![expr_stmt(call("double", vec![int(1), int(2)]))],
    );
    assert_reports(vec![double.into(), main.into()], "vela::typecheck::arity_mismatch");
}

#[test]
fn test_missing_return() {
    let broken = func("broken", vec![], Some(ty("int")), vec![let_auto("x", int(1))]);
    assert_eq!(
        check_codes(vec![broken.into()]),
        vec!["vela::typecheck::missing_return"]
    );
}

#[test]
fn test_return_in_both_branches_is_enough() {
    let sign = func(
        "sign",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![expr_stmt(if_else(
            binary(var("n"), BinaryOperator::Less, int(0)),
            block(vec![ret(int(-1))]),
            Some(block(vec![ret(int(1))])),
        ))],
    );
    assert!(check_codes(vec![sign.into()]).is_empty());
}

#[test]
fn test_assign_to_const() {
    assert_eq!(
        check_codes(main_with(vec![
            let_const("limit", int(1)),
            assign(var("limit"), int(2)),
        ])),
        vec!["vela::typecheck::assign_to_immutable"]
    );
}

#[test]
fn test_assign_to_captured_variable() {
    assert_eq!(
        check_codes(main_with(vec![
            let_auto("count", int(0)),
            let_auto(
                "bump",
                lambda(
                    vec![],
                    block_expr(block(vec![assign(var("count"), int(1))])),
                ),
            ),
        ])),
        vec!["vela::typecheck::assign_to_captured_variable"]
    );
}

#[test]
fn test_invalid_assignment_target() {
    assert_reports(
        main_with(vec![assign(int(1), int(2))]),
        "vela::typecheck::invalid_assignment_target",
    );
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(
        check_codes(main_with(vec![break_stmt()])),
        vec!["vela::typecheck::invalid_control_flow"]
    );
}

#[test]
fn test_break_inside_loop_is_fine() {
    assert!(check_codes(main_with(vec![while_loop(
        boolean(true),
        block(vec![break_stmt()]),
    )]))
    .is_empty());
}

#[test]
fn test_unknown_field_in_object_literal() {
    let mut items = main_with(vec![let_auto(
        "p",
        object(
            "Point",
            vec![],
            vec![("x", int(1)), ("y", int(2)), ("z", int(3))],
        ),
    )]);
    items.insert(0, point());
    assert_eq!(check_codes(items), vec!["vela::typecheck::unknown_field"]);
}

#[test]
fn test_missing_field_in_object_literal() {
    let mut items = main_with(vec![let_auto("p", object("Point", vec![], vec![("x", int(1))]))]);
    items.insert(0, point());
    assert_eq!(check_codes(items), vec!["vela::typecheck::missing_field"]);
}

#[test]
fn test_duplicate_function() {
    let first = func("twice", vec![], None, vec![]);
    let second = func("twice", vec![], None, vec![]);
    assert_reports(
        vec![first.into(), second.into()],
        "vela::typecheck::duplicate_definition",
    );
}

#[test]
fn test_errors_across_functions_are_all_reported() {
    let first = func("first", vec![], None, vec![let_typed("x", ty("int"), string("a"))]);
    let second = func("second", vec![], None, vec![break_stmt()]);
    let codes = check_codes(vec![first.into(), second.into()]);
    assert_eq!(
        codes,
        vec![
            "vela::typecheck::type_mismatch",
            "vela::typecheck::invalid_control_flow",
        ]
    );
}

#[test]
fn test_max_errors_truncates() {
    let program = program(main_with(vec![
        let_typed("a", ty("int"), string("a")),
        let_typed("b", ty("int"), string("b")),
        let_typed("c", ty("int"), string("c")),
    ]));
    let unlimited = check_program(&program, &CompilerOptions::default());
    assert_eq!(unlimited.diagnostics.len(), 3);

    let options = CompilerOptions {
        max_errors: Some(2),
        ..CompilerOptions::default()
    };
    let limited = check_program(&program, &options);
    assert_eq!(limited.diagnostics.len(), 2);
    assert!(!limited.is_ok());
}

#[test]
fn test_empty_list_without_context_is_unresolved() {
    let codes = check_codes(main_with(vec![let_auto("xs", list(vec![]))]));
    assert_eq!(codes, vec!["vela::typecheck::unresolved_type"]);
}

#[test]
fn test_null_without_context_is_unresolved() {
    let codes = check_codes(main_with(vec![let_auto("x", null())]));
    assert_eq!(codes, vec!["vela::typecheck::unresolved_type"]);
}

#[test]
fn test_null_is_not_an_int() {
    let codes = check_codes(main_with(vec![let_typed("x", ty("int"), null())]));
    assert_eq!(codes, vec!["vela::typecheck::trait_not_satisfied"]);
}

#[test]
fn test_null_class_reference_checks() {
    assert_checks(vec![
        point(),
        func(
            "main",
            vec![],
            None,
            vec![
                let_typed("p", ty("Point"), null()),
                let_auto("absent", binary(var("p"), BinaryOperator::Equal, null())),
            ],
        )
        .into(),
    ]);
}

#[test]
fn test_compound_assignment_to_const() {
    let codes = check_codes(main_with(vec![
        let_const("total", int(1)),
        compound_assign(var("total"), BinaryOperator::Add, int(2)),
    ]));
    assert_eq!(codes, vec!["vela::typecheck::assign_to_immutable"]);
}

#[test]
fn test_compound_assignment_needs_matching_operands() {
    assert_reports(
        main_with(vec![
            let_auto("name", string("a")),
            compound_assign(var("name"), BinaryOperator::Subtract, int(2)),
        ]),
        "vela::typecheck::type_mismatch",
    );
}

#[test]
fn test_infinite_type_stops_its_function_only() {
    // `auto f = |x| x(x)`; the later unbound name in the same body is never reached
    let looping = func(
        "looping",
        vec![],
        None,
        vec![
            let_auto(
                "f",
                lambda(vec![lambda_param("x", None)], call("x", vec![var("x")])),
            ),
            expr_stmt(call("print", vec![var("unreached")])),
        ],
    );
    let sibling = func("sibling", vec![], None, vec![expr_stmt(var("missing"))]);
    let codes = check_codes(vec![looping.into(), sibling.into()]);
    assert_eq!(
        codes,
        vec![
            "vela::typecheck::infinite_type",
            "vela::typecheck::unbound_identifier",
        ]
    );
}

#[test]
fn test_ambiguous_impl_stops_its_function_only() {
    let show = trait_def("Show", vec![signature("show", vec![], Some(ty("str")))]);
    let shows = |target: TypeAnnotation, text: &str| {
        impl_block(
            "Show",
            target,
            vec![func("show", vec![], Some(ty("str")), vec![ret(string(text))])],
        )
        .with_generic("T", &[])
    };
    let left = shows(ty_tuple(vec![ty("T"), ty("int")]), "left");
    let right = shows(ty_tuple(vec![ty("int"), ty("T")]), "right");
    let describe = func(
        "describe",
        vec![param("value", ty("T"))],
        Some(ty("str")),
        vec![ret(method_call(var("value"), "show", vec![]))],
    )
    .with_generic("T", &["Show"]);
    let main = func(
        "main",
        vec![],
        None,
        vec![
            let_typed("pair", ty_tuple(vec![ty("int"), ty("int")]), tuple(vec![int(1), int(2)])),
            expr_stmt(call("describe", vec![var("pair")])),
        ],
    );
    let sibling = func("sibling", vec![], None, vec![let_typed("x", ty("int"), string("a"))]);
    let codes = check_codes(vec![
        show.into(),
        left.into(),
        right.into(),
        describe.into(),
        main.into(),
        sibling.into(),
    ]);
    assert_eq!(
        codes,
        vec![
            "vela::typecheck::ambiguous_trait_impl",
            "vela::typecheck::type_mismatch",
        ]
    );
}
