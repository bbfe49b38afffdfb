//! Decision trees to `Switch` and `Branch` chains
//!
//! Occurrences are projected from the scrutinee where they are needed, so
//! every value used by an arm is defined on the path that reaches it.

use super::builder::FunctionBuilder;
use crate::context::generic_mapping;
use crate::ir::{BlockId, Constant, Op, SlotId, Terminator, ValueId};
use crate::patterns::{Case, DecisionTree, Occurrence, PatternBinding, Projection};
use crate::typed_ast::TypedMatch;
use crate::types::Type;

struct MatchTarget<'p> {
    matched: &'p TypedMatch,
    scrutinee: ValueId,
    scrutinee_ty: Type,
    result: Option<SlotId>,
    join: BlockId,
}

impl<'p> FunctionBuilder<'_, 'p> {
    pub(super) fn lower_match(&mut self, matched: &'p TypedMatch, ty: Type) -> ValueId {
        let scrutinee = self.lower_expression(&matched.scrutinee);
        let scrutinee_ty = self.ty(&matched.scrutinee.ty);
        let result = (!ty.is_void()).then(|| self.new_slot(ty.clone()));
        let join = self.new_block();
        let target = MatchTarget {
            matched,
            scrutinee,
            scrutinee_ty,
            result,
            join,
        };

        match &matched.tree {
            Some(tree) => self.lower_tree(tree, &target),
            None => self.terminate(Terminator::Unreachable),
        }

        self.switch_to(join);
        match result {
            Some(slot) => self.emit(ty, Op::LoadLocal(slot)),
            None => self.unit(),
        }
    }

    fn lower_tree(&mut self, tree: &DecisionTree, target: &MatchTarget<'p>) {
        match tree {
            DecisionTree::Leaf { arm, bindings } => {
                self.bind_pattern(bindings, target);
                self.lower_arm_body(*arm, target);
            }
            DecisionTree::Guard {
                arm,
                bindings,
                on_failure,
            } => {
                self.bind_pattern(bindings, target);
                let Some(guard) = target
                    .matched
                    .arms
                    .get(*arm)
                    .and_then(|arm| arm.guard.as_ref())
                else {
                    self.lower_arm_body(*arm, target);
                    return;
                };
                let condition = self.lower_expression(guard);
                let body = self.new_block();
                let failure = self.new_block();
                self.terminate(Terminator::Branch {
                    condition,
                    then_block: body,
                    else_block: failure,
                });

                self.switch_to(body);
                self.lower_arm_body(*arm, target);

                self.switch_to(failure);
                self.lower_tree(on_failure, target);
            }
            DecisionTree::Switch {
                occurrence,
                cases,
                default,
            } => {
                let (value, value_ty) = self.project(occurrence, target);
                let tested = if cases.iter().any(|(case, _)| matches!(case, Case::Variant { .. })) {
                    self.emit(Type::int(), Op::GetTag(value))
                } else {
                    value
                };

                let case_blocks: Vec<(Constant, BlockId)> = cases
                    .iter()
                    .map(|(case, _)| (case_constant(case, &value_ty), self.new_block()))
                    .collect();
                let default_block = self.new_block();
                self.terminate(Terminator::Switch {
                    value: tested,
                    cases: case_blocks.clone(),
                    default: default_block,
                });

                for ((_, subtree), (_, block)) in cases.iter().zip(case_blocks.iter()) {
                    self.switch_to(*block);
                    self.lower_tree(subtree, target);
                }

                self.switch_to(default_block);
                match default {
                    Some(default) => self.lower_tree(default, target),
                    None => self.terminate(Terminator::Unreachable),
                }
            }
        }
    }

    fn bind_pattern(&mut self, bindings: &[PatternBinding], target: &MatchTarget<'p>) {
        for binding in bindings {
            let (value, ty) = self.project(&binding.occurrence, target);
            self.bind_local(binding.local, value, ty);
        }
    }

    fn lower_arm_body(&mut self, arm: usize, target: &MatchTarget<'p>) {
        if let Some(arm) = target.matched.arms.get(arm) {
            let value = self.lower_expression(&arm.body);
            if let Some(slot) = target.result {
                self.emit_store(slot, value);
            }
        }
        self.terminate(Terminator::Jump(target.join));
    }

    /// Load the sub-value at `occurrence` and its concrete type
    fn project(&mut self, occurrence: &Occurrence, target: &MatchTarget<'p>) -> (ValueId, Type) {
        let mut value = target.scrutinee;
        let mut ty = target.scrutinee_ty.clone();
        for projection in &occurrence.0 {
            let (op, component) = match *projection {
                Projection::Field(index) => (
                    Op::GetField {
                        object: value,
                        index,
                    },
                    self.field_type(&ty, index),
                ),
                Projection::VariantField { tag, index } => (
                    Op::GetVariantField { value, index },
                    self.variant_field_type(&ty, tag, index),
                ),
            };
            value = self.emit(component.clone(), op);
            ty = component;
        }
        (value, ty)
    }

    fn field_type(&self, ty: &Type, index: usize) -> Type {
        match ty {
            Type::Tuple(types) => types.get(index).cloned().unwrap_or_else(Type::void),
            Type::Nominal { name, args } => {
                let context = self.lowering.context();
                context
                    .classes
                    .get(name)
                    .and_then(|class| {
                        let mapping = generic_mapping(&class.generics, args);
                        class
                            .fields
                            .get_index(index)
                            .map(|(_, field)| field.ty.substitute_generics(&mapping))
                    })
                    .unwrap_or_else(Type::void)
            }
            _ => Type::void(),
        }
    }

    fn variant_field_type(&self, ty: &Type, tag: usize, index: usize) -> Type {
        match ty {
            Type::Nominal { name, args } => self
                .lowering
                .context()
                .variant_fields(name, args, tag)
                .get(index)
                .cloned()
                .unwrap_or_else(Type::void),
            _ => Type::void(),
        }
    }
}

/// The constant a case compares against. Integer cases on a float column
/// (a generic instantiated with `float`) compare as floats.
fn case_constant(case: &Case, ty: &Type) -> Constant {
    match case {
        Case::Variant { tag, .. } => Constant::Int(*tag as i64),
        Case::Bool(value) => Constant::Bool(*value),
        Case::Int(value) if ty.is_float() => Constant::Float(*value as f64),
        Case::Int(value) => Constant::Int(*value),
        Case::Float(value) => Constant::Float(*value),
        Case::Str(value) => Constant::Str(value.clone()),
    }
}
