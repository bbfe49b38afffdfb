//! Inferred types of locals

use super::harness::{assert_checks, local_type, typed_function};
use pretty_assertions::assert_eq;
use vela_ast::builder::*;
use vela_ast::{BinaryOperator, Item};

fn main_with(statements: Vec<vela_ast::Statement>) -> Vec<Item> {
    vec![func("main", vec![], None, statements).into()]
}

#[test]
fn test_literals() {
    let result = assert_checks(main_with(vec![
        let_auto("x", int(42)),
        let_auto("pi", float(2.5)),
        let_auto("name", string("vela")),
        let_auto("flag", boolean(true)),
        let_auto("numbers", list(vec![int(1), int(2), int(3)])),
        let_auto("pair", tuple(vec![int(1), string("one")])),
    ]));

    assert_eq!(local_type(&result, "main", "x"), "int");
    assert_eq!(local_type(&result, "main", "pi"), "float");
    assert_eq!(local_type(&result, "main", "name"), "str");
    assert_eq!(local_type(&result, "main", "flag"), "bool");
    assert_eq!(local_type(&result, "main", "numbers"), "list<int>");
    assert_eq!(local_type(&result, "main", "pair"), "(int, str)");
}

#[test]
fn test_literal_takes_type_from_float_operand() {
    let result = assert_checks(main_with(vec![
        let_auto("scaled", binary(float(1.5), BinaryOperator::Multiply, float(2.0))),
        let_auto("less", binary(int(1), BinaryOperator::Less, int(2))),
    ]));

    assert_eq!(local_type(&result, "main", "scaled"), "float");
    assert_eq!(local_type(&result, "main", "less"), "bool");
}

#[test]
fn test_generic_function_instantiates_per_call() {
    let id = func("id", vec![param("x", ty("T"))], Some(ty("T")), vec![ret(var("x"))])
        .with_generic("T", &[]);
    let result = assert_checks(vec![
        id.into(),
        func(
            "main",
            vec![],
            None,
            vec![
                let_auto("a", call("id", vec![int(1)])),
                let_auto("b", call("id", vec![string("s")])),
            ],
        )
        .into(),
    ]);

    assert_eq!(local_type(&result, "main", "a"), "int");
    assert_eq!(local_type(&result, "main", "b"), "str");
}

#[test]
fn test_lambda_parameter_inferred_from_map() {
    let result = assert_checks(main_with(vec![
        let_auto("numbers", list(vec![int(1), int(2), int(3)])),
        let_auto(
            "doubled",
            call(
                "map",
                vec![
                    var("numbers"),
                    lambda(
                        vec![lambda_param("n", None)],
                        binary(var("n"), BinaryOperator::Multiply, int(2)),
                    ),
                ],
            ),
        ),
    ]));

    assert_eq!(local_type(&result, "main", "doubled"), "list<int>");
    assert_eq!(local_type(&result, "main", "n"), "int");
}

#[test]
fn test_pipeline_into_sum() {
    let result = assert_checks(main_with(vec![let_auto(
        "total",
        pipeline(
            list(vec![int(1), int(2), int(3), int(4)]),
            vec![
                call(
                    "filter",
                    vec![lambda(
                        vec![lambda_param("n", Some(ty("int")))],
                        binary(var("n"), BinaryOperator::Greater, int(1)),
                    )],
                ),
                var("sum"),
            ],
        ),
    )]));

    assert_eq!(local_type(&result, "main", "total"), "int");
}

#[test]
fn test_if_expression_value() {
    let result = assert_checks(main_with(vec![
        let_typed("x", ty("int"), int(3)),
        let_auto(
            "y",
            if_else(
                binary(var("x"), BinaryOperator::Greater, int(1)),
                block(vec![expr_stmt(string("big"))]),
                Some(block(vec![expr_stmt(string("small"))])),
            ),
        ),
    ]));

    assert_eq!(local_type(&result, "main", "y"), "str");
}

#[test]
fn test_async_call_yields_task() {
    let fetch = func(
        "fetch",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![ret(binary(var("n"), BinaryOperator::Multiply, int(10)))],
    )
    .into_async();
    let result = assert_checks(vec![
        fetch.into(),
        func("main", vec![], None, vec![let_auto("task", call("fetch", vec![int(1)]))]).into(),
    ]);

    assert_eq!(local_type(&result, "main", "task"), "Task<int>");
}

#[test]
fn test_parameters_are_mutable_and_self_is_not() {
    let counter = class("Counter")
        .with_field("count", ty("int"))
        .with_method(func("get", vec![param("offset", ty("int"))], Some(ty("int")), vec![
            ret(binary(field(var("self"), "count"), BinaryOperator::Add, var("offset"))),
        ]));
    let result = assert_checks(vec![counter.into()]);

    let get = typed_function(&result, "Counter.get");
    let mutability: Vec<(&str, bool)> = get
        .locals
        .iter()
        .map(|local| (local.name.as_str(), local.mutable))
        .collect();
    assert_eq!(mutability, vec![("self", false), ("offset", true)]);
}
