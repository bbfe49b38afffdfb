//! Declaration collection
//!
//! Runs before any body is checked, in three passes:
//! 1. names of classes, enums and traits,
//! 2. fields, variants, signatures and impls,
//! 3. trait conformance of every impl.
//!
//! Bodies found along the way are queued as [`PendingBody`] values.

use super::TypeChecker;
use crate::builtins::{is_builtin_trait, register_nullable_class};
use crate::context::{ClassInfo, EnumInfo, FieldInfo, FunctionInfo, VariantInfo};
use crate::error::{at, CheckError, TraitError};
use crate::traits::{ImplId, ImplSource, MethodSignature, TraitInfo};
use crate::typed_ast::FunctionKey;
use crate::types::{GenericParamInfo, PrimitiveType, Substitution, Type, SELF_TYPE, TASK_TYPE};
use crate::unification::{generalize, unify};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};
use vela_ast::{
    ClassDefinition, EnumDefinition, FunctionDefinition, GenericParam, ImplBlock, ItemKind,
    Parameter, Program, TraitDefinition, TypeAnnotation, TypeIdentifier,
};

/// A function body waiting to be checked
#[derive(Debug, Clone)]
pub struct PendingBody<'p> {
    pub key: FunctionKey,
    pub definition: &'p FunctionDefinition,
    /// Owner generics followed by the function's own
    pub generics: Vec<GenericParamInfo>,
    /// Receiver type for methods
    pub self_type: Option<Type>,
    pub params: Vec<Type>,
    pub ret: Type,
}

fn generic_infos(params: &[GenericParam]) -> Vec<GenericParamInfo> {
    params
        .iter()
        .map(|param| {
            GenericParamInfo::new(
                param.name.name.clone(),
                param.bounds.iter().map(|bound| bound.name.clone()).collect(),
            )
        })
        .collect()
}

impl<'a> TypeChecker<'a> {
    pub(crate) fn collect_declarations<'p>(&mut self, program: &'p Program) -> Vec<PendingBody<'p>> {
        self.register_names(program);

        let mut pending = Vec::new();
        for item in &program.items {
            match &item.kind {
                ItemKind::Class(class) => pending.extend(self.collect_class(class)),
                ItemKind::Enum(definition) => self.collect_enum(definition),
                ItemKind::Trait(definition) => self.collect_trait(definition),
                ItemKind::Function(definition) => pending.extend(self.collect_function(definition)),
                ItemKind::Impl(_) => {}
            }
        }

        let mut impls = Vec::new();
        for item in &program.items {
            match &item.kind {
                ItemKind::Class(class) => impls.extend(self.register_class_impls(class)),
                ItemKind::Impl(block) => {
                    if let Some((id, bodies)) = self.collect_impl_block(block) {
                        impls.push(id);
                        pending.extend(bodies);
                    }
                }
                _ => {}
            }
        }

        for id in impls {
            self.check_conformance(id);
        }
        pending
    }

    fn register_names(&mut self, program: &Program) {
        for item in &program.items {
            match &item.kind {
                ItemKind::Class(class) => {
                    if self.claim_type_name(&class.name) {
                        let info = ClassInfo {
                            name: class.name.name.clone(),
                            generics: generic_infos(&class.generic_params),
                            fields: IndexMap::new(),
                            methods: IndexMap::new(),
                            traits: class.traits.iter().map(|t| t.name.clone()).collect(),
                            span: class.span,
                        };
                        self.ctx.classes.insert(info.name.clone(), info);
                    }
                }
                ItemKind::Enum(definition) => {
                    if self.claim_type_name(&definition.name) {
                        let info = EnumInfo {
                            name: definition.name.name.clone(),
                            generics: generic_infos(&definition.generic_params),
                            variants: IndexMap::new(),
                            span: definition.span,
                        };
                        self.ctx.enums.insert(info.name.clone(), info);
                    }
                }
                ItemKind::Trait(definition) => {
                    if self.claim_type_name(&definition.name) {
                        self.ctx.traits.add_trait(TraitInfo {
                            name: definition.name.name.clone(),
                            methods: IndexMap::new(),
                            span: definition.span,
                        });
                    }
                }
                ItemKind::Function(_) | ItemKind::Impl(_) => {}
            }
        }
    }

    fn claim_type_name(&mut self, name: &TypeIdentifier) -> bool {
        let reserved = PrimitiveType::from_name(&name.name).is_some()
            || name.name == "list"
            || name.name == TASK_TYPE
            || name.name == SELF_TYPE;
        if reserved || self.ctx.is_type_name(&name.name) {
            self.report(CheckError::DuplicateDefinition {
                name: name.name.clone(),
                span: at(name.span),
            });
            return false;
        }
        true
    }

    /// Report unknown bounds and repeated parameter names
    fn validate_generic_params(&mut self, params: &[GenericParam]) {
        let mut seen = IndexSet::new();
        for param in params {
            if !seen.insert(param.name.name.as_str()) {
                self.report(CheckError::DuplicateDefinition {
                    name: param.name.name.clone(),
                    span: at(param.name.span),
                });
            }
            for bound in &param.bounds {
                if !self.ctx.traits.has_trait(&bound.name) {
                    self.report(CheckError::UnknownType {
                        name: bound.name.clone(),
                        span: at(bound.span),
                    });
                }
            }
        }
    }

    fn validate_parameter_names(&mut self, params: &[Parameter]) {
        let mut seen = IndexSet::new();
        for param in params {
            if !seen.insert(param.name.name.as_str()) {
                self.report(CheckError::DuplicateDefinition {
                    name: param.name.name.clone(),
                    span: at(param.name.span),
                });
            }
        }
    }

    /// Resolve an annotation. On failure the owner is poisoned and a fresh variable stands in.
    fn resolve_or_poison(
        &mut self,
        annotation: &TypeAnnotation,
        generics: &[GenericParamInfo],
        self_type: Option<&Type>,
        owner: &str,
    ) -> Type {
        match self.ctx.resolve_annotation(annotation, generics, self_type) {
            Ok(ty) => ty,
            Err(error) => {
                self.report(error);
                self.poisoned.insert(owner.to_string());
                self.ctx.fresh_var()
            }
        }
    }

    fn method_signature(
        &mut self,
        definition: &FunctionDefinition,
        owner_generics: &[GenericParamInfo],
        self_type: &Type,
        owner: &str,
    ) -> MethodSignature {
        self.validate_generic_params(&definition.generic_params);
        self.validate_parameter_names(&definition.parameters);

        let own = generic_infos(&definition.generic_params);
        let all: Vec<GenericParamInfo> = owner_generics.iter().chain(own.iter()).cloned().collect();
        let params = definition
            .parameters
            .iter()
            .map(|param| self.resolve_or_poison(&param.type_annotation, &all, Some(self_type), owner))
            .collect();
        let ret = match &definition.return_type {
            Some(annotation) => self.resolve_or_poison(annotation, &all, Some(self_type), owner),
            None => Type::void(),
        };
        MethodSignature {
            name: definition.name.name.clone(),
            generics: own,
            params,
            ret,
            is_async: definition.is_async,
            span: definition.span,
        }
    }

    fn collect_class<'p>(&mut self, class: &'p ClassDefinition) -> Vec<PendingBody<'p>> {
        let Some(info) = self.ctx.classes.get(&class.name.name) else {
            return Vec::new();
        };
        if info.span != class.span {
            return Vec::new();
        }
        let generics = info.generics.clone();
        let self_type = info.self_type();
        let class_name = class.name.name.clone();
        self.validate_generic_params(&class.generic_params);

        let mut fields = IndexMap::new();
        for field in &class.fields {
            if fields.contains_key(&field.name.name) {
                self.report(CheckError::DuplicateDefinition {
                    name: format!("{class_name}.{}", field.name.name),
                    span: at(field.name.span),
                });
                continue;
            }
            let ty = self.resolve_or_poison(&field.type_annotation, &generics, Some(&self_type), &class_name);
            let index = fields.len();
            fields.insert(
                field.name.name.clone(),
                FieldInfo {
                    name: field.name.name.clone(),
                    index,
                    ty,
                },
            );
        }

        let mut methods = IndexMap::new();
        let mut pending = Vec::new();
        for method in &class.methods {
            let key = FunctionKey::ClassMethod {
                class: class_name.clone(),
                method: method.name.name.clone(),
            };
            if methods.contains_key(&method.name.name) {
                self.report(CheckError::DuplicateDefinition {
                    name: key.to_string(),
                    span: at(method.name.span),
                });
                continue;
            }
            let signature = self.method_signature(method, &generics, &self_type, &key.to_string());
            pending.push(PendingBody {
                key,
                definition: method,
                generics: generics.iter().chain(signature.generics.iter()).cloned().collect(),
                self_type: Some(self_type.clone()),
                params: signature.params.clone(),
                ret: signature.ret.clone(),
            });
            methods.insert(method.name.name.clone(), signature);
        }

        if let Some(info) = self.ctx.classes.get_mut(&class_name) {
            info.fields = fields;
            info.methods = methods;
        }
        trace!(class = %class_name, "collected class");
        pending
    }

    fn collect_enum(&mut self, definition: &EnumDefinition) {
        let Some(info) = self.ctx.enums.get(&definition.name.name) else {
            return;
        };
        if info.span != definition.span {
            return;
        }
        let generics = info.generics.clone();
        let self_type = info.self_type();
        let enum_name = definition.name.name.clone();
        self.validate_generic_params(&definition.generic_params);

        let mut variants = IndexMap::new();
        for variant in &definition.variants {
            if variants.contains_key(&variant.name.name) {
                self.report(CheckError::DuplicateDefinition {
                    name: format!("{enum_name}.{}", variant.name.name),
                    span: at(variant.name.span),
                });
                continue;
            }
            let fields = variant
                .fields
                .iter()
                .map(|field| self.resolve_or_poison(field, &generics, Some(&self_type), &enum_name))
                .collect();
            let tag = variants.len();
            variants.insert(
                variant.name.name.clone(),
                VariantInfo {
                    name: variant.name.name.clone(),
                    tag,
                    fields,
                    span: variant.span,
                },
            );
        }

        if let Some(info) = self.ctx.enums.get_mut(&enum_name) {
            info.variants = variants;
        }
    }

    fn collect_trait(&mut self, definition: &TraitDefinition) {
        let owned = self
            .ctx
            .traits
            .get_trait(&definition.name.name)
            .is_some_and(|info| info.span == definition.span);
        if !owned {
            return;
        }
        let trait_name = definition.name.name.clone();
        let self_type = Type::generic(SELF_TYPE);

        let mut methods = IndexMap::new();
        for signature in &definition.methods {
            if methods.contains_key(&signature.name.name) {
                self.report(CheckError::DuplicateDefinition {
                    name: format!("{trait_name}.{}", signature.name.name),
                    span: at(signature.name.span),
                });
                continue;
            }
            self.validate_parameter_names(&signature.parameters);
            let params = signature
                .parameters
                .iter()
                .map(|param| self.resolve_or_poison(&param.type_annotation, &[], Some(&self_type), &trait_name))
                .collect();
            let ret = match &signature.return_type {
                Some(annotation) => self.resolve_or_poison(annotation, &[], Some(&self_type), &trait_name),
                None => Type::void(),
            };
            methods.insert(
                signature.name.name.clone(),
                MethodSignature {
                    name: signature.name.name.clone(),
                    generics: Vec::new(),
                    params,
                    ret,
                    is_async: false,
                    span: signature.span,
                },
            );
        }

        if let Some(info) = self.ctx.traits.get_trait_mut(&trait_name) {
            info.methods = methods;
        }
    }

    fn collect_function<'p>(&mut self, definition: &'p FunctionDefinition) -> Option<PendingBody<'p>> {
        let name = definition.name.name.clone();
        if self.ctx.functions.contains_key(&name) {
            self.report(CheckError::DuplicateDefinition {
                name,
                span: at(definition.name.span),
            });
            return None;
        }
        self.validate_generic_params(&definition.generic_params);
        self.validate_parameter_names(&definition.parameters);

        let generics = generic_infos(&definition.generic_params);
        let params: Vec<Type> = definition
            .parameters
            .iter()
            .map(|param| self.resolve_or_poison(&param.type_annotation, &generics, None, &name))
            .collect();
        let ret = match &definition.return_type {
            Some(annotation) => self.resolve_or_poison(annotation, &generics, None, &name),
            None => Type::void(),
        };

        let scheme = generalize(&generics, Type::function(params.clone(), ret.clone()));
        debug!(function = %name, scheme = %scheme, "collected function");
        self.ctx.functions.insert(
            name.clone(),
            FunctionInfo {
                name: name.clone(),
                scheme,
                is_async: definition.is_async,
                span: definition.span,
            },
        );

        Some(PendingBody {
            key: FunctionKey::Free(name),
            definition,
            generics,
            self_type: None,
            params,
            ret,
        })
    }

    /// A trait may be implemented by user code unless it is unknown or an operator trait
    fn implementable_trait(&mut self, trait_name: &TypeIdentifier, target: &str) -> bool {
        if !self.ctx.traits.has_trait(&trait_name.name) {
            self.report(CheckError::UnknownType {
                name: trait_name.name.clone(),
                span: at(trait_name.span),
            });
            return false;
        }
        if is_builtin_trait(&trait_name.name) {
            self.report(TraitError::DoesNotSatisfyTrait {
                ty: target.to_string(),
                trait_name: trait_name.name.clone(),
                method: "<operator>".to_string(),
                reason: "is built in and cannot be reimplemented".to_string(),
                span: at(trait_name.span),
            });
            return false;
        }
        true
    }

    fn register_class_impls(&mut self, class: &ClassDefinition) -> Vec<ImplId> {
        let Some(info) = self.ctx.classes.get(&class.name.name) else {
            return Vec::new();
        };
        if info.span != class.span {
            return Vec::new();
        }
        let generics = info.generics.clone();
        let target = info.self_type();
        register_nullable_class(&mut self.ctx.traits, generics.clone(), target.clone());

        let mut ids = Vec::new();
        for trait_name in &class.traits {
            if !self.implementable_trait(trait_name, &target.to_string()) {
                continue;
            }
            match self.ctx.traits.add_impl(
                &trait_name.name,
                generics.clone(),
                target.clone(),
                ImplSource::Class(class.name.name.clone()),
                IndexMap::new(),
                class.span,
            ) {
                Ok(id) => ids.push(id),
                Err(error) => self.report(error),
            }
        }
        ids
    }

    fn collect_impl_block<'p>(&mut self, block: &'p ImplBlock) -> Option<(ImplId, Vec<PendingBody<'p>>)> {
        self.validate_generic_params(&block.generic_params);
        let generics = generic_infos(&block.generic_params);
        let target = match self.ctx.resolve_annotation(&block.target, &generics, None) {
            Ok(target) => target,
            Err(error) => {
                self.report(error);
                return None;
            }
        };
        if !self.implementable_trait(&block.trait_name, &target.to_string()) {
            return None;
        }
        let display = format!("<{} as {}>", target, block.trait_name.name);

        let mut methods = IndexMap::new();
        for method in &block.methods {
            if methods.contains_key(&method.name.name) {
                self.report(CheckError::DuplicateDefinition {
                    name: format!("{display}.{}", method.name.name),
                    span: at(method.name.span),
                });
                continue;
            }
            let owner = format!("{display}.{}", method.name.name);
            let signature = self.method_signature(method, &generics, &target, &owner);
            methods.insert(method.name.name.clone(), signature);
        }

        let id = match self.ctx.traits.add_impl(
            &block.trait_name.name,
            generics.clone(),
            target.clone(),
            ImplSource::Block,
            methods.clone(),
            block.span,
        ) {
            Ok(id) => id,
            Err(error) => {
                self.report(error);
                return None;
            }
        };

        let bodies = block
            .methods
            .iter()
            .filter_map(|method| {
                let signature = methods.get(&method.name.name)?;
                // Only the first of several same-named methods was registered.
                if signature.span != method.span {
                    return None;
                }
                Some(PendingBody {
                    key: FunctionKey::ImplMethod {
                        impl_id: id,
                        display: display.clone(),
                        method: method.name.name.clone(),
                    },
                    definition: method,
                    generics: generics.iter().chain(signature.generics.iter()).cloned().collect(),
                    self_type: Some(target.clone()),
                    params: signature.params.clone(),
                    ret: signature.ret.clone(),
                })
            })
            .collect();
        Some((id, bodies))
    }

    /// Compare an impl's methods with its trait's after replacing `Self`
    fn check_conformance(&mut self, id: ImplId) {
        let Some(info) = self.ctx.traits.get_impl(id).cloned() else {
            return;
        };
        let Some(trait_info) = self.ctx.traits.get_trait(&info.trait_name).cloned() else {
            return;
        };
        let provided = match &info.source {
            ImplSource::Class(class) => self
                .ctx
                .classes
                .get(class)
                .map(|class| class.methods.clone())
                .unwrap_or_default(),
            ImplSource::Block | ImplSource::Builtin => info.methods.clone(),
        };

        let target = info.target.to_string();
        let failure = |method: &str, reason: String| TraitError::DoesNotSatisfyTrait {
            ty: target.clone(),
            trait_name: info.trait_name.clone(),
            method: method.to_string(),
            reason,
            span: at(info.span),
        };

        let mut self_mapping = IndexMap::new();
        self_mapping.insert(SELF_TYPE.to_string(), info.target.clone());

        for (name, required) in &trait_info.methods {
            let Some(found) = provided.get(name) else {
                self.report(failure(name, "is missing".to_string()));
                continue;
            };
            if found.params.len() != required.params.len() {
                self.report(failure(
                    name,
                    format!(
                        "takes {} parameters, expected {}",
                        found.params.len(),
                        required.params.len()
                    ),
                ));
                continue;
            }
            if found.is_async != required.is_async {
                let reason = if required.is_async { "must be async" } else { "must not be async" };
                self.report(failure(name, reason.to_string()));
                continue;
            }

            let expected = Type::function(
                required
                    .params
                    .iter()
                    .map(|ty| ty.substitute_generics(&self_mapping))
                    .collect(),
                required.ret.substitute_generics(&self_mapping),
            );
            let actual = Type::function(found.params.clone(), found.ret.clone());
            let mut scratch = Substitution::new();
            if unify(&mut scratch, &expected, &actual, found.span).is_err() {
                self.report(failure(name, format!("has type {actual}, expected {expected}")));
            }
        }

        if info.source == ImplSource::Block {
            for name in provided.keys() {
                if !trait_info.methods.contains_key(name) {
                    self.report(failure(name, format!("is not declared by {}", info.trait_name)));
                }
            }
        }
    }
}
