//! Trait declarations, impls and resolution

use super::harness::{assert_checks, check_codes, compile, run, Value};
use crate::error::TraitError;
use crate::traits::{ImplSource, Resolution, TraitInfo, TraitRegistry};
use crate::types::{GenericParamInfo, Type};
use indexmap::IndexMap;
use vela_ast::builder::*;
use vela_ast::{Item, Span};

fn show_trait() -> Item {
    trait_def("Show", vec![signature("show", vec![], Some(ty("str")))]).into()
}

fn circle() -> Item {
    class("Circle")
        .implementing("Show")
        .with_field("radius", ty("int"))
        .with_method(func(
            "show",
            vec![],
            Some(ty("str")),
            vec![ret(call("str", vec![field(var("self"), "radius")]))],
        ))
        .into()
}

/// `func describe<T: Show>(value: T) -> str { return value.show() }`
fn describe() -> Item {
    func(
        "describe",
        vec![param("value", ty("T"))],
        Some(ty("str")),
        vec![ret(method_call(var("value"), "show", vec![]))],
    )
    .with_generic("T", &["Show"])
    .into()
}

fn int_show_impl() -> Item {
    impl_block(
        "Show",
        ty("int"),
        vec![func(
            "show",
            vec![],
            Some(ty("str")),
            vec![ret(binary(
                string("#"),
                vela_ast::BinaryOperator::Add,
                call("str", vec![var("self")]),
            ))],
        )],
    )
    .into()
}

#[test]
fn test_bounded_generic_dispatches_to_class_method() {
    let main = func(
        "main",
        vec![],
        Some(ty("str")),
        vec![ret(call(
            "describe",
            vec![object("Circle", vec![], vec![("radius", int(4))])],
        ))],
    );
    let unit = compile(vec![show_trait(), circle(), describe(), main.into()]);

    assert!(unit.module.function("describe<Circle>").is_some());
    assert!(unit.module.function("Circle.show").is_some());
    assert_eq!(run(&unit, "main", vec![]).value, Value::str("4"));
}

#[test]
fn test_impl_block_method_on_primitive() {
    let main = func(
        "main",
        vec![],
        Some(ty("str")),
        vec![
            let_typed("n", ty("int"), int(5)),
            ret(method_call(var("n"), "show", vec![])),
        ],
    );
    let unit = compile(vec![show_trait(), int_show_impl(), main.into()]);

    assert!(unit.module.function("<int as Show>.show").is_some());
    assert_eq!(run(&unit, "main", vec![]).value, Value::str("#5"));
}

#[test]
fn test_generic_call_resolves_impl_block_at_instantiation() {
    let main = func(
        "main",
        vec![],
        Some(ty("str")),
        vec![
            let_typed("n", ty("int"), int(12)),
            ret(call("describe", vec![var("n")])),
        ],
    );
    let unit = compile(vec![show_trait(), int_show_impl(), describe(), main.into()]);

    assert_eq!(run(&unit, "main", vec![]).value, Value::str("#12"));
}

#[test]
fn test_missing_impl_is_reported() {
    let main = func(
        "main",
        vec![],
        Some(ty("str")),
        vec![
            let_typed("flag", ty("bool"), boolean(true)),
            ret(call("describe", vec![var("flag")])),
        ],
    );
    let codes = check_codes(vec![show_trait(), describe(), main.into()]);
    assert_eq!(codes, vec!["vela::typecheck::trait_not_satisfied"]);
}

#[test]
fn test_class_missing_trait_method() {
    let square = class("Square")
        .implementing("Show")
        .with_field("side", ty("int"));
    let codes = check_codes(vec![show_trait(), square.into()]);
    assert_eq!(codes, vec!["vela::typecheck::does_not_satisfy_trait"]);
}

#[test]
fn test_conforming_class_checks() {
    assert_checks(vec![show_trait(), circle(), describe()]);
}

fn registry() -> TraitRegistry {
    let mut registry = TraitRegistry::new();
    registry.add_trait(TraitInfo {
        name: "Show".to_string(),
        methods: IndexMap::new(),
        span: Span::default(),
    });
    registry
}

fn add(registry: &mut TraitRegistry, generics: Vec<GenericParamInfo>, target: Type) -> Result<crate::traits::ImplId, TraitError> {
    registry.add_impl("Show", generics, target, ImplSource::Block, IndexMap::new(), Span::default())
}

#[test]
fn test_overlapping_impls_without_a_winner_are_ambiguous() {
    let mut registry = registry();
    let t = || vec![GenericParamInfo::new("T", vec![])];
    let left = add(&mut registry, t(), Type::Tuple(vec![Type::generic("T"), Type::int()])).unwrap();
    let right = add(&mut registry, t(), Type::Tuple(vec![Type::int(), Type::generic("T")])).unwrap();

    assert_eq!(
        registry.resolve(&Type::Tuple(vec![Type::int(), Type::int()]), "Show", &[]),
        Resolution::Ambiguous(vec![left, right])
    );
    // Only one impl applies here.
    assert!(matches!(
        registry.resolve(&Type::Tuple(vec![Type::str(), Type::int()]), "Show", &[]),
        Resolution::Impl(found) if found.impl_id == left
    ));
}

#[test]
fn test_conditional_impl_requires_element_impl() {
    let mut registry = registry();
    add(&mut registry, vec![], Type::int()).unwrap();
    let lists = add(
        &mut registry,
        vec![GenericParamInfo::new("T", vec!["Show".to_string()])],
        Type::list(Type::generic("T")),
    )
    .unwrap();

    match registry.resolve(&Type::list(Type::int()), "Show", &[]) {
        Resolution::Impl(found) => {
            assert_eq!(found.impl_id, lists);
            assert_eq!(found.bindings.get("T"), Some(&Type::int()));
        }
        other => panic!("expected the list impl, got {other:?}"),
    }
    assert_eq!(
        registry.resolve(&Type::list(Type::list(Type::int())), "Show", &[]),
        Resolution::Impl(crate::traits::ImplMatch {
            impl_id: lists,
            bindings: IndexMap::from([("T".to_string(), Type::list(Type::int()))]),
        })
    );
    assert_eq!(
        registry.resolve(&Type::list(Type::bool()), "Show", &[]),
        Resolution::Missing
    );
}

#[test]
fn test_bound_in_scope_satisfies_generic() {
    let registry = registry();
    let scope = [GenericParamInfo::new("T", vec!["Show".to_string()])];
    assert_eq!(registry.resolve(&Type::generic("T"), "Show", &scope), Resolution::Bound);
    assert_eq!(registry.resolve(&Type::generic("T"), "Show", &[]), Resolution::Missing);
}

#[test]
fn test_identical_impls_conflict() {
    let mut registry = registry();
    add(&mut registry, vec![], Type::int()).unwrap();
    let conflict = add(&mut registry, vec![], Type::int());
    assert!(matches!(conflict, Err(TraitError::ConflictingImpl { .. })));

    // Same pattern under different parameter names is still the same impl.
    add(&mut registry, vec![GenericParamInfo::new("T", vec![])], Type::list(Type::generic("T"))).unwrap();
    let renamed = add(&mut registry, vec![GenericParamInfo::new("U", vec![])], Type::list(Type::generic("U")));
    assert!(matches!(renamed, Err(TraitError::ConflictingImpl { .. })));
}
