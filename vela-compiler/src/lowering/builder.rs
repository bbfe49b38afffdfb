//! Per-function IR construction
//!
//! A [`FunctionBuilder`] lowers one instance of a checked body. Lambdas and
//! parallel arms become separate functions built by nested builders that
//! share the module state.

use super::ModuleLowering;
use crate::builtins::Builtin;
use crate::context::LocalId;
use crate::ir::{BlockId, Constant, Instruction, IrBlock, IrFunction, Op, SlotId, Terminator, ValueId};
use crate::typed_ast::{
    AssignTarget, TypedBlock, TypedExpression, TypedFunction, TypedStatement, TypedStatementKind,
};
use crate::types::Type;
use indexmap::IndexMap;
use vela_ast::BinaryOperator;

/// Where a local's current value lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LocalValue {
    Value(ValueId),
    Slot(SlotId),
}

#[derive(Debug, Clone, Copy)]
struct LoopTargets {
    continue_to: BlockId,
    break_to: BlockId,
}

#[derive(Debug, Default)]
struct PendingBlock {
    instructions: Vec<Instruction>,
    terminator: Option<Terminator>,
}

pub(crate) struct FunctionBuilder<'l, 'p> {
    pub(super) lowering: &'l mut ModuleLowering<'p>,
    pub(super) function: &'p TypedFunction,
    /// Generic parameter names to this instance's type arguments
    mapping: IndexMap<String, Type>,
    pub(super) name: String,
    blocks: Vec<PendingBlock>,
    current: BlockId,
    next_value: u32,
    slots: Vec<Type>,
    locals: IndexMap<LocalId, LocalValue>,
    loops: Vec<LoopTargets>,
    next_lambda: usize,
}

impl<'l, 'p> FunctionBuilder<'l, 'p> {
    fn new(
        lowering: &'l mut ModuleLowering<'p>,
        function: &'p TypedFunction,
        mapping: IndexMap<String, Type>,
        name: String,
    ) -> Self {
        Self {
            lowering,
            function,
            mapping,
            name,
            blocks: vec![PendingBlock::default()],
            current: BlockId(0),
            next_value: 0,
            slots: Vec::new(),
            locals: IndexMap::new(),
            loops: Vec::new(),
            next_lambda: 0,
        }
    }

    fn instance_mapping(function: &TypedFunction, type_args: &[Type]) -> IndexMap<String, Type> {
        function
            .generics
            .iter()
            .zip(type_args.iter())
            .map(|(generic, arg)| (generic.name.clone(), arg.clone()))
            .collect()
    }

    /// Concrete parameter types (receiver first) and result of an instance
    pub(crate) fn instance_signature(function: &TypedFunction, type_args: &[Type]) -> (Vec<Type>, Type) {
        let mapping = Self::instance_mapping(function, type_args);
        let params = function
            .self_param
            .iter()
            .chain(function.params.iter())
            .map(|(_, ty)| ty.substitute_generics(&mapping))
            .collect();
        (params, function.ret.substitute_generics(&mapping))
    }

    /// Lower one instance of a checked body
    pub(crate) fn lower_instance(
        lowering: &'l mut ModuleLowering<'p>,
        function: &'p TypedFunction,
        type_args: &[Type],
        name: &str,
    ) -> IrFunction {
        let mapping = Self::instance_mapping(function, type_args);
        let mut builder = Self::new(lowering, function, mapping, name.to_string());

        let params: Vec<(LocalId, Type)> = function
            .self_param
            .iter()
            .chain(function.params.iter())
            .cloned()
            .collect();
        let params = builder.bind_params(&params);

        let value = builder.lower_block(&function.body);
        let ret = builder.ty(&function.ret);
        builder.finish_body(value, &ret);
        builder.finish(params, ret, function.is_async)
    }

    /// Build a function for a lambda or parallel arm sharing this function's locals
    pub(super) fn nested(&mut self, name: String) -> FunctionBuilder<'_, 'p> {
        FunctionBuilder::new(&mut *self.lowering, self.function, self.mapping.clone(), name)
    }

    pub(super) fn next_lambda_name(&mut self) -> String {
        let name = format!("{}$lambda{}", self.name, self.next_lambda);
        self.next_lambda += 1;
        name
    }

    /// The concrete type of `ty` in this instance
    pub(super) fn ty(&self, ty: &Type) -> Type {
        ty.substitute_generics(&self.mapping)
    }

    pub(super) fn local_type(&self, local: LocalId) -> Type {
        self.function
            .local(local)
            .map(|info| self.ty(&info.ty))
            .unwrap_or_else(Type::void)
    }

    fn local_is_mutable(&self, local: LocalId) -> bool {
        self.function.local(local).is_some_and(|info| info.mutable)
    }

    // === BLOCKS AND VALUES ===

    pub(super) fn new_block(&mut self) -> BlockId {
        self.blocks.push(PendingBlock::default());
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub(super) fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub(super) fn fresh_value(&mut self) -> ValueId {
        let value = ValueId(self.next_value);
        self.next_value += 1;
        value
    }

    pub(super) fn emit(&mut self, ty: Type, op: Op) -> ValueId {
        let dest = self.fresh_value();
        self.push(Instruction {
            dest: Some(dest),
            ty,
            op,
        });
        dest
    }

    fn push(&mut self, instruction: Instruction) {
        if let Some(block) = self.blocks.get_mut(self.current.0 as usize) {
            block.instructions.push(instruction);
        }
    }

    pub(super) fn emit_store(&mut self, slot: SlotId, value: ValueId) {
        self.push(Instruction {
            dest: None,
            ty: Type::void(),
            op: Op::StoreLocal { slot, value },
        });
    }

    pub(super) fn emit_effect(&mut self, op: Op) {
        self.push(Instruction {
            dest: None,
            ty: Type::void(),
            op,
        });
    }

    pub(super) fn unit(&mut self) -> ValueId {
        self.emit(Type::void(), Op::Const(Constant::Unit))
    }

    pub(super) fn constant(&mut self, ty: Type, constant: Constant) -> ValueId {
        self.emit(ty, Op::Const(constant))
    }

    /// End the current block. Code emitted afterwards lands in a fresh block
    /// that only a later jump can reach.
    pub(super) fn terminate(&mut self, terminator: Terminator) {
        if let Some(block) = self.blocks.get_mut(self.current.0 as usize) {
            if block.terminator.is_none() {
                block.terminator = Some(terminator);
            }
        }
        let dead = self.new_block();
        self.switch_to(dead);
    }

    pub(super) fn new_slot(&mut self, ty: Type) -> SlotId {
        self.slots.push(ty);
        SlotId(self.slots.len() as u32 - 1)
    }

    // === LOCALS ===

    fn bind_params(&mut self, params: &[(LocalId, Type)]) -> Vec<(ValueId, Type)> {
        let values: Vec<(ValueId, Type)> = params
            .iter()
            .map(|(_, ty)| (self.fresh_value(), self.ty(ty)))
            .collect();
        for ((local, _), (value, ty)) in params.iter().zip(values.iter()) {
            self.bind_local(*local, *value, ty.clone());
        }
        values
    }

    /// Parameters for captured locals followed by the given ones
    pub(super) fn bind_nested_params(
        &mut self,
        captures: &[LocalId],
        params: &[LocalId],
    ) -> Vec<(ValueId, Type)> {
        let mut values = Vec::with_capacity(captures.len() + params.len());
        for local in captures {
            let ty = self.local_type(*local);
            let value = self.fresh_value();
            self.locals.insert(*local, LocalValue::Value(value));
            values.push((value, ty));
        }
        for local in params {
            let ty = self.local_type(*local);
            let value = self.fresh_value();
            self.bind_local(*local, value, ty.clone());
            values.push((value, ty));
        }
        values
    }

    /// Bind a local to a value, through a slot if it is ever reassigned
    pub(super) fn bind_local(&mut self, local: LocalId, value: ValueId, ty: Type) {
        if self.local_is_mutable(local) {
            let slot = self.new_slot(ty);
            self.emit_store(slot, value);
            self.locals.insert(local, LocalValue::Slot(slot));
        } else {
            self.locals.insert(local, LocalValue::Value(value));
        }
    }

    pub(super) fn read_local(&mut self, local: LocalId) -> ValueId {
        match self.locals.get(&local).copied() {
            Some(LocalValue::Value(value)) => value,
            Some(LocalValue::Slot(slot)) => {
                let ty = self.slots[slot.0 as usize].clone();
                self.emit(ty, Op::LoadLocal(slot))
            }
            // Only reachable for locals of code the checker never reaches.
            None => self.unit(),
        }
    }

    // === STATEMENTS ===

    /// Lower a block and return its value
    pub(super) fn lower_block(&mut self, block: &'p TypedBlock) -> ValueId {
        let value_index = block.value().map(|_| block.statements.len() - 1);
        let mut value = None;
        for (index, statement) in block.statements.iter().enumerate() {
            match (&statement.kind, Some(index) == value_index) {
                (TypedStatementKind::Expression(expression), true) => {
                    value = Some(self.lower_expression(expression));
                }
                _ => self.lower_statement(statement),
            }
        }
        match value {
            Some(value) => value,
            None => self.unit(),
        }
    }

    fn lower_statement(&mut self, statement: &'p TypedStatement) {
        match &statement.kind {
            TypedStatementKind::Let { local, value } => {
                let lowered = self.lower_expression(value);
                let ty = self.local_type(*local);
                self.bind_local(*local, lowered, ty);
            }
            TypedStatementKind::Assign { target, value } => self.lower_assignment(target, value),
            TypedStatementKind::Expression(expression) => {
                self.lower_expression(expression);
            }
            TypedStatementKind::Return(value) => {
                let value = value.as_ref().map(|value| self.lower_expression(value));
                self.terminate(Terminator::Return(value));
            }
            TypedStatementKind::While { condition, body } => {
                let header = self.new_block();
                let body_block = self.new_block();
                let exit = self.new_block();
                self.terminate(Terminator::Jump(header));

                self.switch_to(header);
                let condition = self.lower_expression(condition);
                self.terminate(Terminator::Branch {
                    condition,
                    then_block: body_block,
                    else_block: exit,
                });

                self.switch_to(body_block);
                self.loops.push(LoopTargets {
                    continue_to: header,
                    break_to: exit,
                });
                self.lower_block(body);
                self.loops.pop();
                self.terminate(Terminator::Jump(header));
                self.switch_to(exit);
            }
            TypedStatementKind::For {
                local,
                iterable,
                body,
            } => self.lower_for(*local, iterable, body),
            TypedStatementKind::Break | TypedStatementKind::Continue => {
                let Some(targets) = self.loops.last().copied() else {
                    self.terminate(Terminator::Unreachable);
                    return;
                };
                let target = match statement.kind {
                    TypedStatementKind::Break => targets.break_to,
                    _ => targets.continue_to,
                };
                self.terminate(Terminator::Jump(target));
            }
        }
    }

    fn lower_assignment(&mut self, target: &'p AssignTarget, value: &'p TypedExpression) {
        match target {
            AssignTarget::Local(local) => {
                let value = self.lower_expression(value);
                match self.locals.get(local).copied() {
                    Some(LocalValue::Slot(slot)) => self.emit_store(slot, value),
                    _ => {
                        self.locals.insert(*local, LocalValue::Value(value));
                    }
                }
            }
            AssignTarget::Field { object, index } => {
                let object = self.lower_expression(object);
                let value = self.lower_expression(value);
                self.emit_effect(Op::SetField {
                    object,
                    index: *index,
                    value,
                });
            }
            AssignTarget::Index { target, index } => {
                let list = self.lower_expression(target);
                let index = self.lower_expression(index);
                let value = self.lower_expression(value);
                self.emit_effect(Op::SetIndex { list, index, value });
            }
        }
    }

    /// `for x in list` walks the list by index held in a slot
    fn lower_for(&mut self, local: LocalId, iterable: &'p TypedExpression, body: &'p TypedBlock) {
        let list = self.lower_expression(iterable);
        let length = self.emit(
            Type::int(),
            Op::CallBuiltin {
                builtin: Builtin::Len,
                args: vec![list],
            },
        );
        let counter = self.new_slot(Type::int());
        let zero = self.constant(Type::int(), Constant::Int(0));
        self.emit_store(counter, zero);

        let header = self.new_block();
        let body_block = self.new_block();
        let latch = self.new_block();
        let exit = self.new_block();
        self.terminate(Terminator::Jump(header));

        self.switch_to(header);
        let position = self.emit(Type::int(), Op::LoadLocal(counter));
        let more = self.emit(
            Type::bool(),
            Op::Binary {
                operator: BinaryOperator::Less,
                left: position,
                right: length,
            },
        );
        self.terminate(Terminator::Branch {
            condition: more,
            then_block: body_block,
            else_block: exit,
        });

        self.switch_to(body_block);
        let element_ty = self.local_type(local);
        let element = self.emit(element_ty.clone(), Op::GetIndex { list, index: position });
        self.bind_local(local, element, element_ty);
        self.loops.push(LoopTargets {
            continue_to: latch,
            break_to: exit,
        });
        self.lower_block(body);
        self.loops.pop();
        self.terminate(Terminator::Jump(latch));

        self.switch_to(latch);
        let position = self.emit(Type::int(), Op::LoadLocal(counter));
        let one = self.constant(Type::int(), Constant::Int(1));
        let next = self.emit(
            Type::int(),
            Op::Binary {
                operator: BinaryOperator::Add,
                left: position,
                right: one,
            },
        );
        self.emit_store(counter, next);
        self.terminate(Terminator::Jump(header));
        self.switch_to(exit);
    }

    // === FINISHING ===

    /// Return the body's value from wherever control falls off the end
    pub(super) fn finish_body(&mut self, value: ValueId, ret: &Type) {
        let value = (!ret.is_void()).then_some(value);
        self.terminate(Terminator::Return(value));
    }

    /// Drop blocks nothing jumps to and renumber the rest
    pub(super) fn finish(self, params: Vec<(ValueId, Type)>, ret: Type, is_async: bool) -> IrFunction {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![BlockId(0)];
        while let Some(block) = stack.pop() {
            let index = block.0 as usize;
            if index >= reachable.len() || reachable[index] {
                continue;
            }
            reachable[index] = true;
            if let Some(terminator) = &self.blocks[index].terminator {
                stack.extend(terminator.successors());
            }
        }

        let mut renumber = IndexMap::new();
        for (index, _) in reachable.iter().enumerate().filter(|(_, reached)| **reached) {
            renumber.insert(BlockId(index as u32), BlockId(renumber.len() as u32));
        }

        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .filter(|(index, _)| reachable[*index])
            .map(|(index, pending)| {
                let mut terminator = pending.terminator.unwrap_or(Terminator::Unreachable);
                terminator.remap(&renumber);
                IrBlock {
                    id: renumber
                        .get(&BlockId(index as u32))
                        .copied()
                        .unwrap_or(BlockId(index as u32)),
                    instructions: pending.instructions,
                    terminator,
                }
            })
            .collect();

        IrFunction {
            name: self.name,
            params,
            ret,
            is_async,
            slots: self.slots,
            blocks,
            entry: BlockId(0),
        }
    }
}
