//! Built-in functions and operator traits
//!
//! The prelude is built once and shared by every compilation unit. Each unit
//! copies the operator traits into its own [`TraitRegistry`].

use crate::traits::{ImplSource, TraitInfo, TraitRegistry};
use crate::types::{GenericParamInfo, Scheme, Type};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::fmt;
use vela_ast::Span;

/// Functions the backend implements directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Str,
    Len,
    Range,
    /// `range(start, end)`
    RangeBetween,
    Append,
    Slice,
    Map,
    Filter,
    Sum,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Str => "str",
            Builtin::Len => "len",
            Builtin::Range | Builtin::RangeBetween => "range",
            Builtin::Append => "append",
            Builtin::Slice => "slice",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Sum => "sum",
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinFunction {
    pub builtin: Builtin,
    pub scheme: Scheme,
}

impl BuiltinFunction {
    pub fn arity(&self) -> usize {
        match &self.scheme.ty {
            Type::Function { params, .. } => params.len(),
            _ => 0,
        }
    }
}

/// Operator traits and the primitives implementing them
pub const ADD_TRAIT: &str = "Add";
pub const NUM_TRAIT: &str = "Num";
pub const EQ_TRAIT: &str = "Eq";
pub const ORD_TRAIT: &str = "Ord";
/// Types with a `null` value: strings, lists and classes
pub const NULLABLE_TRAIT: &str = "Nullable";

lazy_static! {
    /// Overloads per name, distinguished by arity
    static ref BUILTIN_FUNCTIONS: IndexMap<&'static str, Vec<BuiltinFunction>> =
        build_builtin_functions();

    static ref BUILTIN_TRAITS: Vec<(&'static str, Vec<Type>)> = vec![
        (ADD_TRAIT, vec![Type::int(), Type::float(), Type::str()]),
        (NUM_TRAIT, vec![Type::int(), Type::float()]),
        (EQ_TRAIT, vec![Type::int(), Type::float(), Type::bool(), Type::str()]),
        (ORD_TRAIT, vec![Type::int(), Type::float(), Type::str()]),
    ];
}

pub fn lookup_builtin(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTIN_FUNCTIONS.get(name).and_then(|overloads| overloads.first())
}

/// The overload of `name` taking `arity` arguments, falling back to the
/// first overload so a wrong argument count reports against it
pub fn lookup_builtin_call(name: &str, arity: usize) -> Option<&'static BuiltinFunction> {
    let overloads = BUILTIN_FUNCTIONS.get(name)?;
    overloads
        .iter()
        .find(|overload| overload.arity() == arity)
        .or_else(|| overloads.first())
}

pub fn builtin_functions() -> impl Iterator<Item = &'static BuiltinFunction> {
    BUILTIN_FUNCTIONS.values().flatten()
}

pub fn is_builtin_trait(name: &str) -> bool {
    name == NULLABLE_TRAIT || BUILTIN_TRAITS.iter().any(|(trait_name, _)| *trait_name == name)
}

/// Install the operator traits and their primitive impls into a unit's registry
pub fn bootstrap_builtin_traits(registry: &mut TraitRegistry) {
    for (trait_name, implementors) in BUILTIN_TRAITS.iter() {
        registry.add_trait(TraitInfo {
            name: trait_name.to_string(),
            methods: IndexMap::new(),
            span: Span::default(),
        });
        for implementor in implementors {
            // Primitive targets are distinct, so these never conflict.
            let _ = registry.add_impl(
                trait_name,
                vec![],
                implementor.clone(),
                ImplSource::Builtin,
                IndexMap::new(),
                Span::default(),
            );
        }
    }

    registry.add_trait(TraitInfo {
        name: NULLABLE_TRAIT.to_string(),
        methods: IndexMap::new(),
        span: Span::default(),
    });
    let _ = registry.add_impl(
        NULLABLE_TRAIT,
        vec![],
        Type::str(),
        ImplSource::Builtin,
        IndexMap::new(),
        Span::default(),
    );
    let _ = registry.add_impl(
        NULLABLE_TRAIT,
        unbounded(&["T"]),
        Type::list(generic("T")),
        ImplSource::Builtin,
        IndexMap::new(),
        Span::default(),
    );
}

/// Every class has a `null` value
pub fn register_nullable_class(registry: &mut TraitRegistry, generics: Vec<GenericParamInfo>, target: Type) {
    // Class names are unique, so this never conflicts.
    let _ = registry.add_impl(
        NULLABLE_TRAIT,
        generics,
        target,
        ImplSource::Builtin,
        IndexMap::new(),
        Span::default(),
    );
}

fn generic(name: &str) -> Type {
    Type::generic(name)
}

fn unbounded(names: &[&str]) -> Vec<GenericParamInfo> {
    names
        .iter()
        .map(|name| GenericParamInfo::new(*name, vec![]))
        .collect()
}

fn create_builtin(
    builtin: Builtin,
    generics: Vec<GenericParamInfo>,
    params: Vec<Type>,
    ret: Type,
) -> (&'static str, BuiltinFunction) {
    (
        builtin.name(),
        BuiltinFunction {
            builtin,
            scheme: Scheme {
                generics,
                ty: Type::function(params, ret),
            },
        },
    )
}

/// Build all builtin function signatures (called once via lazy_static)
fn build_builtin_functions() -> IndexMap<&'static str, Vec<BuiltinFunction>> {
    let t = || generic("T");
    let list_t = || Type::list(generic("T"));

    [
        create_builtin(Builtin::Print, unbounded(&["T"]), vec![t()], Type::void()),
        create_builtin(Builtin::Str, unbounded(&["T"]), vec![t()], Type::str()),
        create_builtin(Builtin::Len, unbounded(&["T"]), vec![list_t()], Type::int()),
        create_builtin(Builtin::Range, vec![], vec![Type::int()], Type::list(Type::int())),
        create_builtin(
            Builtin::RangeBetween,
            vec![],
            vec![Type::int(), Type::int()],
            Type::list(Type::int()),
        ),
        create_builtin(
            Builtin::Append,
            unbounded(&["T"]),
            vec![list_t(), t()],
            list_t(),
        ),
        create_builtin(
            Builtin::Slice,
            unbounded(&["T"]),
            vec![list_t(), Type::int(), Type::int()],
            list_t(),
        ),
        create_builtin(
            Builtin::Map,
            unbounded(&["T", "U"]),
            vec![list_t(), Type::function(vec![t()], generic("U"))],
            Type::list(generic("U")),
        ),
        create_builtin(
            Builtin::Filter,
            unbounded(&["T"]),
            vec![list_t(), Type::function(vec![t()], Type::bool())],
            list_t(),
        ),
        create_builtin(
            Builtin::Sum,
            vec![GenericParamInfo::new("T", vec![NUM_TRAIT.to_string()])],
            vec![list_t()],
            t(),
        ),
    ]
    .into_iter()
    .fold(IndexMap::new(), |mut table, (name, function)| {
        table.entry(name).or_insert_with(Vec::new).push(function);
        table
    })
}
