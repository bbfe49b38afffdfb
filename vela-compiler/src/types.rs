//! Type representation for the Vela compiler
//!
//! Types are plain trees. Inference variables are resolved through a
//! [`Substitution`] owned by the unit being compiled.

use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// Type variable identifier for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeVarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Int,
    Float,
    Bool,
    Str,
    Void,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "str" => Some(Self::Str),
            "void" => Some(Self::Void),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "str",
            Self::Void => "void",
        }
    }
}

/// Name of the built-in nominal type produced by async calls
pub const TASK_TYPE: &str = "Task";

/// Name bound to the implementing type inside trait signatures
pub const SELF_TYPE: &str = "Self";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
    /// Generic parameter of the enclosing declaration, rigid during checking
    Generic(String),
    /// Classes, enums and `Task<T>`
    Nominal { name: String, args: Vec<Type> },
    Variable(TypeVarId),
}

impl Type {
    pub fn int() -> Self {
        Type::Primitive(PrimitiveType::Int)
    }

    pub fn float() -> Self {
        Type::Primitive(PrimitiveType::Float)
    }

    pub fn bool() -> Self {
        Type::Primitive(PrimitiveType::Bool)
    }

    pub fn str() -> Self {
        Type::Primitive(PrimitiveType::Str)
    }

    pub fn void() -> Self {
        Type::Primitive(PrimitiveType::Void)
    }

    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn generic(name: impl Into<String>) -> Self {
        Type::Generic(name.into())
    }

    pub fn nominal(name: impl Into<String>, args: Vec<Type>) -> Self {
        Type::Nominal {
            name: name.into(),
            args,
        }
    }

    pub fn task(result: Type) -> Self {
        Type::nominal(TASK_TYPE, vec![result])
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Void))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveType::Float))
    }

    /// Result type when this is `Task<T>`
    pub fn task_result(&self) -> Option<&Type> {
        match self {
            Type::Nominal { name, args } if name == TASK_TYPE && args.len() == 1 => args.first(),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<TypeVarId> {
        match self {
            Type::Variable(id) => Some(*id),
            _ => None,
        }
    }

    /// Check if this type contains the given type variable (for occurs check)
    pub fn contains_var(&self, target: TypeVarId) -> bool {
        match self {
            Type::Variable(id) => *id == target,
            Type::Primitive(_) | Type::Generic(_) => false,
            Type::List(element) => element.contains_var(target),
            Type::Tuple(elements) => elements.iter().any(|ty| ty.contains_var(target)),
            Type::Function { params, ret } => {
                params.iter().any(|ty| ty.contains_var(target)) || ret.contains_var(target)
            }
            Type::Nominal { args, .. } => args.iter().any(|ty| ty.contains_var(target)),
        }
    }

    /// Free inference variables in left-to-right order
    pub fn free_vars(&self) -> IndexSet<TypeVarId> {
        let mut vars = IndexSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut IndexSet<TypeVarId>) {
        match self {
            Type::Variable(id) => {
                vars.insert(*id);
            }
            Type::Primitive(_) | Type::Generic(_) => {}
            Type::List(element) => element.collect_vars(vars),
            Type::Tuple(elements) => elements.iter().for_each(|ty| ty.collect_vars(vars)),
            Type::Function { params, ret } => {
                params.iter().for_each(|ty| ty.collect_vars(vars));
                ret.collect_vars(vars);
            }
            Type::Nominal { args, .. } => args.iter().for_each(|ty| ty.collect_vars(vars)),
        }
    }

    pub fn has_vars(&self) -> bool {
        !self.free_vars().is_empty()
    }

    pub fn has_generics(&self) -> bool {
        match self {
            Type::Generic(_) => true,
            Type::Primitive(_) | Type::Variable(_) => false,
            Type::List(element) => element.has_generics(),
            Type::Tuple(elements) => elements.iter().any(Type::has_generics),
            Type::Function { params, ret } => {
                params.iter().any(Type::has_generics) || ret.has_generics()
            }
            Type::Nominal { args, .. } => args.iter().any(Type::has_generics),
        }
    }

    /// Replace generic parameters by name. Unmapped generics are left alone.
    pub fn substitute_generics(&self, mapping: &IndexMap<String, Type>) -> Type {
        if mapping.is_empty() {
            return self.clone();
        }
        match self {
            Type::Generic(name) => mapping.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Primitive(_) | Type::Variable(_) => self.clone(),
            Type::List(element) => Type::list(element.substitute_generics(mapping)),
            Type::Tuple(elements) => Type::Tuple(
                elements
                    .iter()
                    .map(|ty| ty.substitute_generics(mapping))
                    .collect(),
            ),
            Type::Function { params, ret } => Type::function(
                params
                    .iter()
                    .map(|ty| ty.substitute_generics(mapping))
                    .collect(),
                ret.substitute_generics(mapping),
            ),
            Type::Nominal { name, args } => Type::nominal(
                name.clone(),
                args.iter()
                    .map(|ty| ty.substitute_generics(mapping))
                    .collect(),
            ),
        }
    }

    /// Short name of the outermost constructor, used in diagnostics and impl keys
    pub fn head_name(&self) -> String {
        match self {
            Type::Primitive(primitive) => primitive.name().to_string(),
            Type::List(_) => "list".to_string(),
            Type::Tuple(elements) => format!("tuple{}", elements.len()),
            Type::Function { .. } => "fn".to_string(),
            Type::Generic(name) | Type::Nominal { name, .. } => name.clone(),
            Type::Variable(id) => format!("?T{}", id.0),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(primitive) => write!(f, "{}", primitive.name()),
            Type::List(element) => write!(f, "list<{element}>"),
            Type::Tuple(elements) => {
                write!(f, "(")?;
                for (i, ty) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Type::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, ty) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Generic(name) => write!(f, "{name}"),
            Type::Nominal { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Variable(id) => write!(f, "?T{}", id.0),
        }
    }
}

/// Generic parameter of a declaration together with its trait bounds
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParamInfo {
    pub name: String,
    pub bounds: Vec<String>,
}

impl GenericParamInfo {
    pub fn new(name: impl Into<String>, bounds: Vec<String>) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }
}

/// A declaration's type abstracted over its generic parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    pub generics: Vec<GenericParamInfo>,
    pub ty: Type,
}

impl Scheme {
    pub fn monomorphic(ty: Type) -> Self {
        Self {
            generics: Vec::new(),
            ty,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.generics.is_empty() {
            write!(f, "<")?;
            for (i, generic) in self.generics.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", generic.name)?;
                if !generic.bounds.is_empty() {
                    write!(f, ": {}", generic.bounds.join(" + "))?;
                }
            }
            write!(f, "> ")?;
        }
        write!(f, "{}", self.ty)
    }
}

/// Substitution mapping type variables to types
///
/// Insertion ordered so that two runs over the same unit produce identical
/// maps. Bindings are only ever added, never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    mappings: IndexMap<TypeVarId, Type>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping from type variable to type
    pub fn insert(&mut self, var_id: TypeVarId, ty: Type) {
        self.mappings.insert(var_id, ty);
    }

    /// Get the type that a variable maps to
    pub fn get(&self, var_id: TypeVarId) -> Option<&Type> {
        self.mappings.get(&var_id)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Drop every binding added after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.mappings.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TypeVarId, &Type)> {
        self.mappings.iter()
    }

    /// Apply this substitution to a type, recursively resolving variables
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Variable(id) => match self.get(*id) {
                Some(bound) => self.apply(bound),
                None => ty.clone(),
            },
            Type::Primitive(_) | Type::Generic(_) => ty.clone(),
            Type::List(element) => Type::list(self.apply(element)),
            Type::Tuple(elements) => {
                Type::Tuple(elements.iter().map(|ty| self.apply(ty)).collect())
            }
            Type::Function { params, ret } => Type::function(
                params.iter().map(|ty| self.apply(ty)).collect(),
                self.apply(ret),
            ),
            Type::Nominal { name, args } => Type::nominal(
                name.clone(),
                args.iter().map(|ty| self.apply(ty)).collect(),
            ),
        }
    }

    /// Resolve only the outermost variable chain
    pub fn shallow_resolve(&self, ty: &Type) -> Type {
        let mut current = ty;
        while let Type::Variable(id) = current {
            match self.get(*id) {
                Some(bound) => current = bound,
                None => break,
            }
        }
        current.clone()
    }
}

/// Type variable generator for creating fresh variables
#[derive(Debug, Clone, Default)]
pub struct TypeVarGenerator {
    next_id: u32,
}

impl TypeVarGenerator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    pub fn fresh_id(&mut self) -> TypeVarId {
        let var_id = TypeVarId(self.next_id);
        self.next_id += 1;
        var_id
    }

    /// Generate a fresh type variable
    pub fn fresh(&mut self) -> Type {
        Type::Variable(self.fresh_id())
    }

    /// Number of variables handed out so far
    pub fn count(&self) -> u32 {
        self.next_id
    }
}
