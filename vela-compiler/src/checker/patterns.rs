//! Pattern type checking for match arms
//!
//! Patterns are checked against the scrutinee's type and bind their
//! variables as immutable locals in the arm's scope.

use super::functions::BodyChecker;
use crate::context::generic_mapping;
use crate::error::{at, Abort, CheckError, UnificationError};
use crate::typed_ast::{LiteralValue, TypedPattern, TypedPatternKind};
use crate::types::Type;
use vela_ast::{FieldPattern, LiteralPattern, Pattern, PatternKind, Span, TypeIdentifier};

impl BodyChecker<'_, '_> {
    pub fn check_pattern(&mut self, pattern: &Pattern, expected: &Type) -> Result<TypedPattern, Abort> {
        let span = pattern.span;
        let kind = match &pattern.kind {
            PatternKind::Wildcard => TypedPatternKind::Wildcard,
            PatternKind::Binding(identifier) => {
                let local = self.define_local(&identifier.name, expected.clone(), false, identifier.span);
                TypedPatternKind::Binding(local)
            }
            PatternKind::Literal(literal) => {
                let (value, ty) = match literal {
                    LiteralPattern::Integer(value) => (LiteralValue::Integer(*value), self.literal_var(span)),
                    LiteralPattern::Float(value) => (LiteralValue::Float(*value), Type::float()),
                    LiteralPattern::Boolean(value) => (LiteralValue::Boolean(*value), Type::bool()),
                    LiteralPattern::String(value) => (LiteralValue::String(value.clone()), Type::str()),
                };
                self.unify(expected, &ty, span)?;
                TypedPatternKind::Literal(value)
            }
            PatternKind::Tuple(elements) => {
                let element_types = match self.apply(expected) {
                    Type::Tuple(types) if types.len() == elements.len() => types,
                    _ => {
                        let types: Vec<Type> = elements.iter().map(|_| self.fresh_var()).collect();
                        self.unify(expected, &Type::Tuple(types.clone()), span)?;
                        types
                    }
                };
                let elements = elements
                    .iter()
                    .zip(element_types.iter())
                    .map(|(element, ty)| self.check_pattern(element, ty))
                    .collect::<Result<Vec<_>, _>>()?;
                TypedPatternKind::Tuple(elements)
            }
            PatternKind::Variant {
                enum_name,
                variant,
                fields,
            } => return self.check_variant_pattern(enum_name.as_ref(), variant, fields, expected, span),
            PatternKind::Class { class_name, fields } => {
                return self.check_class_pattern(class_name, fields, expected, span)
            }
        };
        Ok(TypedPattern {
            kind,
            ty: expected.clone(),
            span,
        })
    }

    fn wildcard(ty: Type, span: Span) -> TypedPattern {
        TypedPattern {
            kind: TypedPatternKind::Wildcard,
            ty,
            span,
        }
    }

    fn check_variant_pattern(
        &mut self,
        enum_name: Option<&TypeIdentifier>,
        variant: &TypeIdentifier,
        fields: &[Pattern],
        expected: &Type,
        span: Span,
    ) -> Result<TypedPattern, Abort> {
        let found = self
            .checker
            .ctx
            .lookup_variant(enum_name.map(|name| name.name.as_str()), &variant.name, variant.span)
            .map(|(info, variant)| (info.name.clone(), info.generics.clone(), variant.clone()));
        let (enum_name, generics, variant) = match found {
            Ok(found) => found,
            Err(error) => {
                self.report(error);
                return Ok(Self::wildcard(expected.clone(), span));
            }
        };

        let args = self.instantiate_generics(&generics, span);
        let ty = Type::nominal(enum_name.clone(), args.clone());
        self.unify(expected, &ty, span)?;

        if fields.len() != variant.fields.len() {
            self.report(UnificationError::ArityMismatch {
                what: format!("{enum_name}.{} fields", variant.name),
                expected: variant.fields.len(),
                found: fields.len(),
                span: at(span),
            });
            return Ok(Self::wildcard(expected.clone(), span));
        }

        let mapping = generic_mapping(&generics, &args);
        let fields = fields
            .iter()
            .zip(variant.fields.iter())
            .map(|(field, field_ty)| self.check_pattern(field, &field_ty.substitute_generics(&mapping)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypedPattern {
            kind: TypedPatternKind::Variant {
                enum_name,
                variant: variant.name,
                tag: variant.tag,
                fields,
            },
            ty,
            span,
        })
    }

    fn check_class_pattern(
        &mut self,
        class_name: &TypeIdentifier,
        fields: &[FieldPattern],
        expected: &Type,
        span: Span,
    ) -> Result<TypedPattern, Abort> {
        let Some(class) = self.checker.ctx.classes.get(&class_name.name).cloned() else {
            self.report(CheckError::UnknownType {
                name: class_name.name.clone(),
                span: at(class_name.span),
            });
            return Ok(Self::wildcard(expected.clone(), span));
        };

        let args = self.instantiate_generics(&class.generics, span);
        let ty = Type::nominal(class.name.clone(), args);
        self.unify(expected, &ty, span)?;

        for field in fields {
            if !class.fields.contains_key(&field.name.name) {
                self.report(CheckError::UnknownField {
                    ty: ty.clone(),
                    field: field.name.name.clone(),
                    span: at(field.name.span),
                });
            }
        }

        let mut typed_fields = Vec::with_capacity(class.fields.len());
        for name in class.fields.keys() {
            let field_ty = self
                .checker
                .ctx
                .field_of(&ty, name)
                .map(|info| info.ty)
                .unwrap_or_else(Type::void);
            let typed = match fields.iter().find(|field| &field.name.name == name) {
                Some(FieldPattern {
                    pattern: Some(pattern),
                    ..
                }) => self.check_pattern(pattern, &field_ty)?,
                Some(FieldPattern {
                    name: identifier,
                    pattern: None,
                    span,
                }) => {
                    let local = self.define_local(&identifier.name, field_ty.clone(), false, identifier.span);
                    TypedPattern {
                        kind: TypedPatternKind::Binding(local),
                        ty: field_ty,
                        span: *span,
                    }
                }
                None => Self::wildcard(field_ty, span),
            };
            typed_fields.push(typed);
        }

        Ok(TypedPattern {
            kind: TypedPatternKind::Class {
                class_name: class.name,
                fields: typed_fields,
            },
            ty,
            span,
        })
    }
}
