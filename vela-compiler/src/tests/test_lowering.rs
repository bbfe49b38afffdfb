//! Lowered programs, executed by the test evaluator

use super::harness::{compile, compile_with, permutations, run, run_ordered, JoinOrder, Value};
use pretty_assertions::assert_eq;
use crate::{CompiledUnit, CompilerOptions};
use vela_ast::builder::*;
use vela_ast::{BinaryOperator, Expression, Item};

/// Every value is defined once in every lowered function
fn assert_single_definitions(unit: &CompiledUnit) {
    for (name, function) in &unit.module.functions {
        assert!(
            function.redefinitions().is_empty(),
            "{name} redefines {:?}",
            function.redefinitions()
        );
    }
}

fn compile_checked(items: Vec<Item>) -> CompiledUnit {
    let unit = compile(items);
    assert_single_definitions(&unit);
    unit
}

fn op(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
    binary(left, operator, right)
}

fn stack() -> Item {
    let items = || field(var("self"), "items");
    class("Stack")
        .with_generic("T", &[])
        .with_field("items", ty_list(ty("T")))
        .with_method(func(
            "push",
            vec![param("item", ty("T"))],
            None,
            vec![assign(items(), call("append", vec![items(), var("item")]))],
        ))
        .with_method(func(
            "pop",
            vec![],
            Some(ty("T")),
            vec![
                let_auto("n", call("len", vec![items()])),
                let_auto("last", index(items(), op(var("n"), BinaryOperator::Subtract, int(1)))),
                assign(
                    items(),
                    call(
                        "slice",
                        vec![items(), int(0), op(var("n"), BinaryOperator::Subtract, int(1))],
                    ),
                ),
                ret(var("last")),
            ],
        ))
        .into()
}

#[test]
fn test_generic_class_methods_are_monomorphized() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("s", object("Stack", vec![ty("int")], vec![("items", list(vec![]))])),
            expr_stmt(method_call(var("s"), "push", vec![int(1)])),
            expr_stmt(method_call(var("s"), "push", vec![int(2)])),
            expr_stmt(method_call(var("s"), "push", vec![int(3)])),
            ret(method_call(var("s"), "pop", vec![])),
        ],
    );
    let unit = compile_checked(vec![stack(), main.into()]);

    assert!(unit.module.function("Stack.push<int>").is_some());
    assert!(unit.module.function("Stack.pop<int>").is_some());
    assert!(unit.module.function("Stack.pop").is_none());
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(3));
}

/// `async func fetch(n: int) -> int { print(n); return n * 10 }`
fn fetch() -> Item {
    func(
        "fetch",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![
            expr_stmt(call("print", vec![var("n")])),
            ret(op(var("n"), BinaryOperator::Multiply, int(10))),
        ],
    )
    .into_async()
    .into()
}

fn parallel_fetches() -> Vec<Item> {
    let main = func(
        "main",
        vec![],
        Some(ty_tuple(vec![ty("int"), ty("int"), ty("int")])),
        vec![ret(parallel(vec![
            call("fetch", vec![int(1)]),
            call("fetch", vec![int(2)]),
            call("fetch", vec![int(3)]),
        ]))],
    );
    vec![fetch(), main.into()]
}

#[test]
fn test_parallel_results_keep_source_order() {
    let unit = compile_checked(parallel_fetches());
    let expected = Value::Tuple(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);

    let forward = run_ordered(&unit, "main", vec![], JoinOrder::Forward);
    assert_eq!(forward.value, expected);
    assert_eq!(forward.output, vec!["1", "2", "3"]);

    let reversed = run_ordered(&unit, "main", vec![], JoinOrder::Reversed);
    assert_eq!(reversed.value, expected);
    assert_eq!(reversed.output, vec!["3", "2", "1"]);
}

#[test]
fn test_parallel_results_ignore_completion_order() {
    let unit = compile_checked(parallel_fetches());
    let expected = Value::Tuple(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);

    let orders = permutations(3);
    assert_eq!(orders.len(), 6);
    for order in orders {
        let printed: Vec<String> = order.iter().map(|arm| (arm + 1).to_string()).collect();
        let execution = run_ordered(&unit, "main", vec![], JoinOrder::Permutation(order.clone()));
        assert_eq!(execution.value, expected, "completion order {order:?}");
        assert_eq!(execution.output, printed, "completion order {order:?}");
    }
}

#[test]
fn test_parallel_arms_become_task_functions() {
    let unit = compile_checked(parallel_fetches());
    for arm in ["main$par0_0", "main$par0_1", "main$par0_2"] {
        let function = unit.module.function(arm).expect("arm function");
        assert!(function.is_async, "{arm} awaits the task it starts");
        assert_eq!(function.await_states(), vec![0]);
    }
    assert!(!unit.module.function("main").expect("main").is_async);
}

#[test]
fn test_awaits_run_in_program_order() {
    let step = func(
        "step",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![expr_stmt(call("print", vec![var("n")])), ret(var("n"))],
    )
    .into_async();
    let run_fn = func(
        "run",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("a", await_expr(call("step", vec![int(1)]))),
            let_auto("b", await_expr(call("step", vec![int(2)]))),
            ret(op(var("a"), BinaryOperator::Add, var("b"))),
        ],
    )
    .into_async();
    let unit = compile_checked(vec![step.into(), run_fn.into()]);

    let execution = run(&unit, "run", vec![]);
    assert_eq!(execution.value, Value::Int(3));
    assert_eq!(execution.output, vec!["1", "2"]);
    assert_eq!(
        execution.suspensions,
        vec![("run".to_string(), 0), ("run".to_string(), 1)]
    );
}

#[test]
fn test_await_on_every_loop_iteration() {
    let step = func(
        "step",
        vec![param("n", ty("int"))],
        Some(ty("int")),
        vec![expr_stmt(call("print", vec![var("n")])), ret(var("n"))],
    )
    .into_async();
    let run_fn = func(
        "run",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("total", int(0)),
            for_loop(
                "i",
                call("range", vec![int(3)]),
                block(vec![assign(
                    var("total"),
                    op(var("total"), BinaryOperator::Add, await_expr(call("step", vec![var("i")]))),
                )]),
            ),
            ret(var("total")),
        ],
    )
    .into_async();
    let unit = compile_checked(vec![step.into(), run_fn.into()]);

    let execution = run(&unit, "run", vec![]);
    assert_eq!(execution.value, Value::Int(3));
    assert_eq!(execution.output, vec!["0", "1", "2"]);
    assert_eq!(execution.suspensions, vec![("run".to_string(), 0); 3]);
}

#[test]
fn test_closure_captures_local() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("base", int(5)),
            let_auto(
                "add",
                lambda(
                    vec![lambda_param("x", Some(ty("int")))],
                    op(var("x"), BinaryOperator::Add, var("base")),
                ),
            ),
            ret(call("add", vec![int(2)])),
        ],
    );
    let unit = compile_checked(vec![main.into()]);

    assert!(unit.module.function("main$lambda0").is_some());
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(7));
}

#[test]
fn test_list_builtins_through_pipeline() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![ret(pipeline(
            list(vec![int(1), int(2), int(3), int(4)]),
            vec![
                call(
                    "filter",
                    vec![lambda(
                        vec![lambda_param("n", Some(ty("int")))],
                        op(var("n"), BinaryOperator::Greater, int(1)),
                    )],
                ),
                call(
                    "map",
                    vec![lambda(
                        vec![lambda_param("n", Some(ty("int")))],
                        op(var("n"), BinaryOperator::Multiply, int(2)),
                    )],
                ),
                var("sum"),
            ],
        ))],
    );
    let unit = compile_checked(vec![main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(18));
}

#[test]
fn test_enum_match_selects_variant() {
    let shape = enum_def("Shape")
        .with_variant("Circle", vec![ty("int")])
        .with_variant("Rect", vec![ty("int"), ty("int")]);
    let area = func(
        "area",
        vec![param("s", ty("Shape"))],
        Some(ty("int")),
        vec![ret(match_expr(
            var("s"),
            vec![
                arm(
                    p_variant(Some("Shape"), "Circle", vec![p_bind("r")]),
                    op(
                        op(int(3), BinaryOperator::Multiply, var("r")),
                        BinaryOperator::Multiply,
                        var("r"),
                    ),
                ),
                arm(
                    p_variant(Some("Shape"), "Rect", vec![p_bind("w"), p_bind("h")]),
                    op(var("w"), BinaryOperator::Multiply, var("h")),
                ),
            ],
        ))],
    );
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![ret(op(
            call("area", vec![call_expr(variant(Some("Shape"), "Circle"), vec![int(2)])]),
            BinaryOperator::Add,
            call("area", vec![call_expr(variant(Some("Shape"), "Rect"), vec![int(3), int(3)])]),
        ))],
    );
    let unit = compile_checked(vec![shape.into(), area.into(), main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(21));
}

#[test]
fn test_fizzbuzz_decision_tree() {
    let fizz = func(
        "fizz",
        vec![param("n", ty("int"))],
        Some(ty("str")),
        vec![ret(match_expr(
            tuple(vec![
                op(var("n"), BinaryOperator::Modulo, int(3)),
                op(var("n"), BinaryOperator::Modulo, int(5)),
            ]),
            vec![
                arm(p_tuple(vec![p_int(0), p_int(0)]), string("FizzBuzz")),
                arm(p_tuple(vec![p_int(0), p_wild()]), string("Fizz")),
                arm(p_tuple(vec![p_wild(), p_int(0)]), string("Buzz")),
                arm(p_wild(), call("str", vec![var("n")])),
            ],
        ))],
    );
    let unit = compile_checked(vec![fizz.into()]);

    for (n, expected) in [(15, "FizzBuzz"), (9, "Fizz"), (10, "Buzz"), (7, "7")] {
        assert_eq!(run(&unit, "fizz", vec![Value::Int(n)]).value, Value::str(expected));
    }
}

#[test]
fn test_integer_pattern_on_float_scrutinee() {
    let describe = func(
        "describe",
        vec![param("x", ty("float"))],
        Some(ty("str")),
        vec![ret(match_expr(
            var("x"),
            vec![arm(p_int(1), string("one")), arm(p_wild(), string("other"))],
        ))],
    );
    let unit = compile_checked(vec![describe.into()]);

    assert_eq!(run(&unit, "describe", vec![Value::Float(1.0)]).value, Value::str("one"));
    assert_eq!(run(&unit, "describe", vec![Value::Float(1.5)]).value, Value::str("other"));
}

#[test]
fn test_integer_literal_in_float_context_is_a_float() {
    let half = func(
        "half",
        vec![],
        Some(ty("float")),
        vec![
            let_typed("whole", ty("float"), int(3)),
            ret(op(var("whole"), BinaryOperator::Divide, float(2.0))),
        ],
    );
    let unit = compile_checked(vec![half.into()]);
    assert_eq!(run(&unit, "half", vec![]).value, Value::Float(1.5));
}

#[test]
fn test_guard_falls_through_to_next_arm() {
    let classify = func(
        "classify",
        vec![param("n", ty("int"))],
        Some(ty("str")),
        vec![ret(match_expr(
            var("n"),
            vec![
                guarded_arm(
                    p_bind("x"),
                    op(var("x"), BinaryOperator::Less, int(0)),
                    string("negative"),
                ),
                arm(p_int(0), string("zero")),
                arm(p_wild(), string("positive")),
            ],
        ))],
    );
    let unit = compile_checked(vec![classify.into()]);

    assert_eq!(run(&unit, "classify", vec![Value::Int(-4)]).value, Value::str("negative"));
    assert_eq!(run(&unit, "classify", vec![Value::Int(0)]).value, Value::str("zero"));
    assert_eq!(run(&unit, "classify", vec![Value::Int(8)]).value, Value::str("positive"));
}

#[test]
fn test_for_loop_accumulates() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("total", int(0)),
            for_loop(
                "i",
                call("range", vec![int(5)]),
                block(vec![assign(
                    var("total"),
                    op(var("total"), BinaryOperator::Add, var("i")),
                )]),
            ),
            ret(var("total")),
        ],
    );
    let unit = compile_checked(vec![main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(10));
}

#[test]
fn test_compound_assignment_over_two_argument_range() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("total", int(0)),
            for_loop(
                "i",
                call("range", vec![int(1), int(5)]),
                block(vec![compound_assign(var("total"), BinaryOperator::Add, var("i"))]),
            ),
            compound_assign(
                var("total"),
                BinaryOperator::Subtract,
                call("len", vec![call("range", vec![int(1), int(4)])]),
            ),
            ret(var("total")),
        ],
    );
    let unit = compile_checked(vec![main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(7));
}

#[test]
fn test_null_class_reference_compares_equal_to_null() {
    let node = class("Node").with_field("value", ty("int"));
    let find = func(
        "find",
        vec![param("found", ty("bool"))],
        Some(ty("Node")),
        vec![
            expr_stmt(if_else(
                var("found"),
                block(vec![ret(object("Node", vec![], vec![("value", int(1))]))]),
                None,
            )),
            ret(null()),
        ],
    );
    let missing = func(
        "missing",
        vec![param("found", ty("bool"))],
        Some(ty("bool")),
        vec![ret(op(call("find", vec![var("found")]), BinaryOperator::Equal, null()))],
    );
    let unit = compile_checked(vec![node.into(), find.into(), missing.into()]);

    assert_eq!(run(&unit, "missing", vec![Value::Bool(false)]).value, Value::Bool(true));
    assert_eq!(run(&unit, "missing", vec![Value::Bool(true)]).value, Value::Bool(false));
}

#[test]
fn test_while_loop_with_break() {
    let main = func(
        "main",
        vec![],
        Some(ty("int")),
        vec![
            let_auto("i", int(0)),
            while_loop(
                boolean(true),
                block(vec![
                    expr_stmt(if_else(
                        op(var("i"), BinaryOperator::Equal, int(4)),
                        block(vec![break_stmt()]),
                        None,
                    )),
                    assign(var("i"), op(var("i"), BinaryOperator::Add, int(1))),
                ]),
            ),
            ret(var("i")),
        ],
    );
    let unit = compile_checked(vec![main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Int(4));
}

#[test]
fn test_logical_operators_short_circuit() {
    // Evaluating the right operand would divide by zero.
    let main = func(
        "main",
        vec![],
        Some(ty("bool")),
        vec![
            let_auto("zero", int(0)),
            ret(op(
                boolean(false),
                BinaryOperator::And,
                op(
                    op(int(1), BinaryOperator::Divide, var("zero")),
                    BinaryOperator::Equal,
                    int(0),
                ),
            )),
        ],
    );
    let unit = compile_checked(vec![main.into()]);
    assert_eq!(run(&unit, "main", vec![]).value, Value::Bool(false));
}

fn id_program() -> Vec<Item> {
    let id = func("id", vec![param("x", ty("T"))], Some(ty("T")), vec![ret(var("x"))])
        .with_generic("T", &[]);
    let unused = func("unused", vec![], Some(ty("int")), vec![ret(int(0))]);
    let main = func(
        "main",
        vec![],
        Some(ty("str")),
        vec![
            let_auto("n", call("id", vec![int(1)])),
            ret(call("id", vec![string("s")])),
        ],
    );
    vec![id.into(), unused.into(), main.into()]
}

#[test]
fn test_one_instance_per_type_argument() {
    let unit = compile_checked(id_program());
    assert!(unit.module.function("id<int>").is_some());
    assert!(unit.module.function("id<str>").is_some());
    assert!(unit.module.function("id").is_none());
    assert_eq!(run(&unit, "main", vec![]).value, Value::str("s"));
}

#[test]
fn test_entry_lowers_only_reachable_functions() {
    let options = CompilerOptions {
        entry: Some("main".to_string()),
        ..CompilerOptions::default()
    };
    let unit = compile_with(id_program(), &options).expect("compiles");
    assert!(unit.module.function("main").is_some());
    assert!(unit.module.function("unused").is_none());

    let everything = compile(id_program());
    assert!(everything.module.function("unused").is_some());
}

#[test]
fn test_unknown_entry() {
    let options = CompilerOptions {
        entry: Some("start".to_string()),
        ..CompilerOptions::default()
    };
    let errors = compile_with(id_program(), &options).expect_err("no such entry");
    let codes: Vec<String> = errors
        .iter()
        .filter_map(|error| miette::Diagnostic::code(error).map(|code| code.to_string()))
        .collect();
    assert_eq!(codes, vec!["vela::lowering::unknown_entry"]);
}
