//! Compiling the same program twice gives the same output

use super::harness::compile;
use pretty_assertions::assert_eq;
use vela_ast::builder::*;
use vela_ast::{BinaryOperator, Item};

fn program_items() -> Vec<Item> {
    let fetch = func(
        "fetch",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![ret(binary(var("n"), BinaryOperator::Add, int(1)))],
    )
    .into_async();
    let pair = func(
        "pair",
        vec![param("a", ty("A")), param("b", ty("B"))],
        Some(ty_tuple(vec![ty("A"), ty("B")])),
        vec![ret(tuple(vec![var("a"), var("b")]))],
    )
    .with_generic("A", &[])
    .with_generic("B", &[]);
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("p", call("pair", vec![int(1), string("one")])),
            let_auto("q", call("pair", vec![boolean(true), int(2)])),
            let_auto(
                "both",
                parallel(vec![call("fetch", vec![int(1)]), call("fetch", vec![int(2)])]),
            ),
            let_auto("scale", int(3)),
            let_auto(
                "scaled",
                call(
                    "map",
                    vec![
                        list(vec![int(1), int(2)]),
                        lambda(
                            vec![lambda_param("x", Some(ty("int")))],
                            binary(var("x"), BinaryOperator::Multiply, var("scale")),
                        ),
                    ],
                ),
            ),
            ret(call("sum", vec![var("scaled")])),
        ],
    );
    vec![fetch.into(), pair.into(), main.into()]
}

#[test]
fn test_repeated_compilation_is_identical() {
    let first = compile(program_items());
    let second = compile(program_items());

    assert_eq!(first.module.to_string(), second.module.to_string());
    assert_eq!(first.module, second.module);
    assert!(first.task_graphs.keys().eq(second.task_graphs.keys()));
    assert_eq!(first.state_machines, second.state_machines);
}

#[test]
fn test_instances_follow_first_request_order() {
    let unit = compile(program_items());
    let names: Vec<&str> = unit.module.functions.keys().map(String::as_str).collect();

    let position = |name: &str| {
        names
            .iter()
            .position(|candidate| *candidate == name)
            .unwrap_or_else(|| panic!("missing {name} in {names:?}"))
    };
    assert!(position("pair<int, str>") < position("pair<bool, int>"));
    assert!(names.contains(&"main$lambda0"));
    assert!(names.contains(&"main$par0_0"));
}
