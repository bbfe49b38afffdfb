//! Compilation unit context and lexical scopes
//!
//! [`UnitContext`] owns every table of one compilation unit: declared
//! classes, enums, functions, traits and impls, plus the inference state. It
//! is passed explicitly through each stage.

use crate::builtins::bootstrap_builtin_traits;
use crate::error::{at, CheckError, CompileError, UnificationError};
use crate::traits::{MethodSignature, TraitRegistry};
use crate::types::{
    GenericParamInfo, PrimitiveType, Scheme, Substitution, Type, TypeVarGenerator, SELF_TYPE,
    TASK_TYPE,
};
use indexmap::IndexMap;
use vela_ast::{Span, TypeAnnotation};

/// Identifier of a local binding within one function (lambdas included)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// A name bound in a lexical scope
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub local: LocalId,
    pub ty: Type,
    pub mutable: bool,
    pub span: Span,
}

/// Stack of lexical scopes mapping identifiers to bindings
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<IndexMap<String, Binding>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![IndexMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Run `f` inside a fresh scope. The scope is popped however `f` exits.
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.push_scope();
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Current nesting depth; the outermost scope is depth 0
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Bind `name` in the innermost scope, shadowing outer bindings
    pub fn define(&mut self, name: impl Into<String>, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), binding);
        }
    }

    /// Nearest binding of `name` together with the depth of its scope
    pub fn lookup_scoped(&self, name: &str) -> Option<(usize, &Binding)> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.get(name).map(|binding| (depth, binding)))
    }

    pub fn lookup(&self, name: &str, span: Span) -> Result<&Binding, CheckError> {
        self.lookup_scoped(name)
            .map(|(_, binding)| binding)
            .ok_or_else(|| CheckError::UnboundIdentifier {
                name: name.to_string(),
                span: at(span),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub index: usize,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    pub name: String,
    pub generics: Vec<GenericParamInfo>,
    pub fields: IndexMap<String, FieldInfo>,
    pub methods: IndexMap<String, MethodSignature>,
    pub traits: Vec<String>,
    pub span: Span,
}

impl ClassInfo {
    /// The class applied to its own generic parameters
    pub fn self_type(&self) -> Type {
        Type::nominal(
            self.name.clone(),
            self.generics
                .iter()
                .map(|generic| Type::generic(generic.name.clone()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantInfo {
    pub name: String,
    pub tag: usize,
    pub fields: Vec<Type>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumInfo {
    pub name: String,
    pub generics: Vec<GenericParamInfo>,
    pub variants: IndexMap<String, VariantInfo>,
    pub span: Span,
}

impl EnumInfo {
    pub fn self_type(&self) -> Type {
        Type::nominal(
            self.name.clone(),
            self.generics
                .iter()
                .map(|generic| Type::generic(generic.name.clone()))
                .collect(),
        )
    }

    pub fn variant_by_tag(&self, tag: usize) -> Option<&VariantInfo> {
        self.variants.get_index(tag).map(|(_, variant)| variant)
    }
}

/// Map a nominal type's declared generics to its arguments
pub fn generic_mapping(generics: &[GenericParamInfo], args: &[Type]) -> IndexMap<String, Type> {
    generics
        .iter()
        .zip(args.iter())
        .map(|(generic, arg)| (generic.name.clone(), arg.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    pub scheme: Scheme,
    pub is_async: bool,
    pub span: Span,
}

/// Tables and inference state of one compilation unit
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub classes: IndexMap<String, ClassInfo>,
    pub enums: IndexMap<String, EnumInfo>,
    pub functions: IndexMap<String, FunctionInfo>,
    pub traits: TraitRegistry,
    pub substitution: Substitution,
    pub type_vars: TypeVarGenerator,
}

impl Default for UnitContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitContext {
    pub fn new() -> Self {
        let mut traits = TraitRegistry::new();
        bootstrap_builtin_traits(&mut traits);
        Self {
            classes: IndexMap::new(),
            enums: IndexMap::new(),
            functions: IndexMap::new(),
            traits,
            substitution: Substitution::new(),
            type_vars: TypeVarGenerator::new(),
        }
    }

    pub fn fresh_var(&mut self) -> Type {
        self.type_vars.fresh()
    }

    pub fn apply(&self, ty: &Type) -> Type {
        self.substitution.apply(ty)
    }

    /// True when a class, enum or trait already uses this name
    pub fn is_type_name(&self, name: &str) -> bool {
        self.classes.contains_key(name)
            || self.enums.contains_key(name)
            || self.traits.has_trait(name)
    }

    /// Find a variant, by qualified path or by bare name when only one enum declares it
    pub fn lookup_variant(
        &self,
        enum_name: Option<&str>,
        variant: &str,
        span: Span,
    ) -> Result<(&EnumInfo, &VariantInfo), CheckError> {
        let unknown = || CheckError::UnknownVariant {
            name: match enum_name {
                Some(enum_name) => format!("{enum_name}.{variant}"),
                None => variant.to_string(),
            },
            span: at(span),
        };

        match enum_name {
            Some(enum_name) => {
                let info = self.enums.get(enum_name).ok_or_else(unknown)?;
                let variant = info.variants.get(variant).ok_or_else(unknown)?;
                Ok((info, variant))
            }
            None => {
                let mut candidates = self
                    .enums
                    .values()
                    .filter_map(|info| info.variants.get(variant).map(|v| (info, v)));
                match (candidates.next(), candidates.next()) {
                    (Some(found), None) => Ok(found),
                    _ => Err(unknown()),
                }
            }
        }
    }

    /// Resolve a written type annotation.
    ///
    /// `generics` are the generic parameters in scope; `self_type` is what
    /// `Self` means at this point, if anything.
    pub fn resolve_annotation(
        &self,
        annotation: &TypeAnnotation,
        generics: &[GenericParamInfo],
        self_type: Option<&Type>,
    ) -> Result<Type, CompileError> {
        match annotation {
            TypeAnnotation::Tuple { types, .. } => Ok(Type::Tuple(
                types
                    .iter()
                    .map(|ty| self.resolve_annotation(ty, generics, self_type))
                    .collect::<Result<_, _>>()?,
            )),
            TypeAnnotation::Function {
                params,
                return_type,
                ..
            } => Ok(Type::function(
                params
                    .iter()
                    .map(|ty| self.resolve_annotation(ty, generics, self_type))
                    .collect::<Result<_, _>>()?,
                self.resolve_annotation(return_type, generics, self_type)?,
            )),
            TypeAnnotation::Named {
                name,
                generic_args,
                span,
            } => {
                let args = generic_args
                    .iter()
                    .map(|ty| self.resolve_annotation(ty, generics, self_type))
                    .collect::<Result<Vec<_>, _>>()?;
                let expect_arity = |expected: usize| -> Result<(), CompileError> {
                    if args.len() == expected {
                        Ok(())
                    } else {
                        Err(UnificationError::ArityMismatch {
                            what: format!("type {}", name.name),
                            expected,
                            found: args.len(),
                            span: at(*span),
                        }
                        .into())
                    }
                };

                if let Some(primitive) = PrimitiveType::from_name(&name.name) {
                    expect_arity(0)?;
                    return Ok(Type::Primitive(primitive));
                }
                if name.name == "list" {
                    expect_arity(1)?;
                    return Ok(Type::list(args[0].clone()));
                }
                if name.name == TASK_TYPE {
                    expect_arity(1)?;
                    return Ok(Type::task(args[0].clone()));
                }
                if generics.iter().any(|generic| generic.name == name.name) {
                    expect_arity(0)?;
                    return Ok(Type::generic(name.name.clone()));
                }
                if name.name == SELF_TYPE {
                    if let Some(self_type) = self_type {
                        expect_arity(0)?;
                        return Ok(self_type.clone());
                    }
                }
                if let Some(class) = self.classes.get(&name.name) {
                    expect_arity(class.generics.len())?;
                    return Ok(Type::nominal(name.name.clone(), args));
                }
                if let Some(info) = self.enums.get(&name.name) {
                    expect_arity(info.generics.len())?;
                    return Ok(Type::nominal(name.name.clone(), args));
                }
                Err(CheckError::UnknownType {
                    name: name.name.clone(),
                    span: at(*span),
                }
                .into())
            }
        }
    }

    /// Declared generics of a class or enum
    pub fn nominal_generics(&self, name: &str) -> Option<&[GenericParamInfo]> {
        self.classes
            .get(name)
            .map(|class| class.generics.as_slice())
            .or_else(|| self.enums.get(name).map(|info| info.generics.as_slice()))
    }

    /// Field of a class type with the class generics replaced by `ty`'s arguments
    pub fn field_of(&self, ty: &Type, field: &str) -> Option<FieldInfo> {
        let Type::Nominal { name, args } = ty else {
            return None;
        };
        let class = self.classes.get(name)?;
        let info = class.fields.get(field)?;
        let mapping = generic_mapping(&class.generics, args);
        Some(FieldInfo {
            name: info.name.clone(),
            index: info.index,
            ty: info.ty.substitute_generics(&mapping),
        })
    }

    /// Field types of an enum variant, specialised to the enum's arguments
    pub fn variant_fields(&self, enum_name: &str, args: &[Type], tag: usize) -> Vec<Type> {
        let Some(info) = self.enums.get(enum_name) else {
            return Vec::new();
        };
        let mapping = generic_mapping(&info.generics, args);
        info.variant_by_tag(tag)
            .map(|variant| {
                variant
                    .fields
                    .iter()
                    .map(|ty| ty.substitute_generics(&mapping))
                    .collect()
            })
            .unwrap_or_default()
    }
}
