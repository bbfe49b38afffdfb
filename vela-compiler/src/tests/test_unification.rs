//! Unification properties over generated types

use crate::error::UnificationError;
use crate::types::{Substitution, Type, TypeVarId};
use crate::unification::unify;
use proptest::prelude::*;
use vela_ast::Span;

/// Runs fewer cases during development, full cases in CI
fn proptest_config() -> ProptestConfig {
    if std::env::var("CI").is_ok() {
        ProptestConfig::default()
    } else {
        ProptestConfig {
            cases: 32,
            max_shrink_iters: 100,
            ..ProptestConfig::default()
        }
    }
}

fn var(id: u32) -> Type {
    Type::Variable(TypeVarId(id))
}

/// Types without variables
fn ground_type() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![
        Just(Type::int()),
        Just(Type::float()),
        Just(Type::bool()),
        Just(Type::str()),
    ];
    leaf.prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(Type::list),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Type::Tuple),
            (prop::collection::vec(inner.clone(), 0..3), inner)
                .prop_map(|(params, ret)| Type::function(params, ret)),
        ]
    })
}

proptest! {
    #![proptest_config(proptest_config())]
    #[test]
    fn test_ground_type_unifies_with_itself(ty in ground_type()) {
        let mut substitution = Substitution::new();
        prop_assert!(unify(&mut substitution, &ty, &ty, Span::default()).is_ok());
        prop_assert!(substitution.is_empty());
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    #[test]
    fn test_unification_is_symmetric(left in ground_type(), right in ground_type()) {
        let forward = unify(&mut Substitution::new(), &left, &right, Span::default()).is_ok();
        let backward = unify(&mut Substitution::new(), &right, &left, Span::default()).is_ok();
        prop_assert_eq!(forward, backward);
        prop_assert_eq!(forward, left == right);
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    #[test]
    fn test_variable_binds_to_any_ground_type(ty in ground_type()) {
        let mut substitution = Substitution::new();
        prop_assert!(unify(&mut substitution, &var(0), &ty, Span::default()).is_ok());
        prop_assert_eq!(substitution.apply(&var(0)), ty.clone());
        prop_assert_eq!(substitution.apply(&Type::list(var(0))), Type::list(ty));
    }
}

proptest! {
    #![proptest_config(proptest_config())]
    #[test]
    fn test_failed_unification_leaves_substitution_untouched(ty in ground_type()) {
        // The variable binds before the mismatch in the second component is found.
        let left = Type::Tuple(vec![var(0), Type::int()]);
        let right = Type::Tuple(vec![ty, Type::str()]);
        let mut substitution = Substitution::new();
        prop_assert!(unify(&mut substitution, &left, &right, Span::default()).is_err());
        prop_assert_eq!(substitution.len(), 0);
    }
}

#[test]
fn test_occurs_check_reports_infinite_type() {
    let mut substitution = Substitution::new();
    let result = unify(&mut substitution, &var(0), &Type::list(var(0)), Span::default());
    assert!(matches!(result, Err(UnificationError::InfiniteType { .. })));
    assert!(substitution.is_empty());
}

#[test]
fn test_variables_chain_through_substitution() {
    let mut substitution = Substitution::new();
    unify(&mut substitution, &var(0), &var(1), Span::default()).unwrap();
    unify(&mut substitution, &var(1), &Type::str(), Span::default()).unwrap();
    assert_eq!(substitution.apply(&var(0)), Type::str());
    assert_eq!(
        substitution.apply(&Type::function(vec![var(0)], var(1))).to_string(),
        "fn(str) -> str"
    );
}

#[test]
fn test_mismatch_reports_whole_types() {
    let mut substitution = Substitution::new();
    let error = unify(
        &mut substitution,
        &Type::list(Type::int()),
        &Type::list(Type::bool()),
        Span::default(),
    )
    .unwrap_err();
    match error {
        UnificationError::TypeMismatch { expected, found, .. } => {
            assert_eq!(expected.to_string(), "list<int>");
            assert_eq!(found.to_string(), "list<bool>");
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }
}

#[test]
fn test_tuple_length_mismatch_is_an_arity_error() {
    let result = unify(
        &mut Substitution::new(),
        &Type::Tuple(vec![Type::int(), Type::int()]),
        &Type::Tuple(vec![Type::int(), Type::int(), Type::int()]),
        Span::default(),
    );
    assert!(matches!(
        result,
        Err(UnificationError::ArityMismatch {
            expected: 2,
            found: 3,
            ..
        })
    ));
}
