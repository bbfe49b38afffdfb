//! Backend-agnostic SSA IR
//!
//! Every [`ValueId`] is defined exactly once, either by an instruction, a
//! function parameter or the `dest` of an [`Terminator::Await`]. Mutable
//! locals live in frame slots accessed with `LoadLocal` and `StoreLocal`.
//! All types are concrete: generic code has been monomorphized.

use crate::builtins::Builtin;
use crate::types::Type;
use indexmap::{IndexMap, IndexSet};
use std::fmt;
use vela_ast::{BinaryOperator, UnaryOperator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrModule {
    pub functions: IndexMap<String, IrFunction>,
}

impl IrModule {
    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    /// Mangled instance name, e.g. `id<int>` or `Stack.pop<int>`
    pub name: String,
    pub params: Vec<(ValueId, Type)>,
    pub ret: Type,
    /// Calls start a task instead of running to completion
    pub is_async: bool,
    pub slots: Vec<Type>,
    /// Indexed by [`BlockId`]
    pub blocks: Vec<IrBlock>,
    pub entry: BlockId,
}

impl IrFunction {
    pub fn block(&self, id: BlockId) -> Option<&IrBlock> {
        self.blocks.get(id.0 as usize)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    /// Every value definition in definition order, parameters first
    pub fn definitions(&self) -> Vec<ValueId> {
        let mut definitions: Vec<ValueId> = self.params.iter().map(|(value, _)| *value).collect();
        for block in &self.blocks {
            definitions.extend(block.instructions.iter().filter_map(|instruction| instruction.dest));
            if let Terminator::Await { dest, .. } = &block.terminator {
                definitions.push(*dest);
            }
        }
        definitions
    }

    /// Values defined more than once; empty for well-formed functions
    pub fn redefinitions(&self) -> Vec<ValueId> {
        let mut seen = IndexSet::new();
        self.definitions()
            .into_iter()
            .filter(|value| !seen.insert(*value))
            .collect()
    }

    /// Suspension points in block order
    pub fn await_states(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .filter_map(|block| match &block.terminator {
                Terminator::Await { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// `None` for stores
    pub dest: Option<ValueId>,
    pub ty: Type,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Null,
    Unit,
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value:?}"),
            Constant::Bool(value) => write!(f, "{value}"),
            Constant::Str(value) => write!(f, "{value:?}"),
            Constant::Null => write!(f, "null"),
            Constant::Unit => write!(f, "()"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Const(Constant),
    /// Arithmetic and comparison; `and`/`or` are lowered to branches
    Binary {
        operator: BinaryOperator,
        left: ValueId,
        right: ValueId,
    },
    Unary {
        operator: UnaryOperator,
        operand: ValueId,
    },
    Call {
        function: String,
        args: Vec<ValueId>,
    },
    CallBuiltin {
        builtin: Builtin,
        args: Vec<ValueId>,
    },
    /// Call a closure value
    CallIndirect {
        callee: ValueId,
        args: Vec<ValueId>,
    },
    /// Closure over `function`; captures become its leading parameters
    MakeClosure {
        function: String,
        captures: Vec<ValueId>,
    },
    MakeList(Vec<ValueId>),
    MakeTuple(Vec<ValueId>),
    MakeObject {
        class: String,
        fields: Vec<ValueId>,
    },
    MakeVariant {
        enum_name: String,
        tag: usize,
        fields: Vec<ValueId>,
    },
    /// Tuple element or class field
    GetField {
        object: ValueId,
        index: usize,
    },
    SetField {
        object: ValueId,
        index: usize,
        value: ValueId,
    },
    GetTag(ValueId),
    GetVariantField {
        value: ValueId,
        index: usize,
    },
    GetIndex {
        list: ValueId,
        index: ValueId,
    },
    SetIndex {
        list: ValueId,
        index: ValueId,
        value: ValueId,
    },
    LoadLocal(SlotId),
    StoreLocal {
        slot: SlotId,
        value: ValueId,
    },
    /// Start an async function; yields its task handle
    SpawnAsync {
        function: String,
        args: Vec<ValueId>,
    },
    /// Start one arm of a parallel block
    SpawnTask {
        function: String,
        captures: Vec<ValueId>,
    },
    /// Wait for every handle, yielding the tuple of results in handle order
    Join(Vec<ValueId>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        condition: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        value: ValueId,
        cases: Vec<(Constant, BlockId)>,
        default: BlockId,
    },
    Return(Option<ValueId>),
    /// Suspend until `task` completes, then continue at `resume` with its result in `dest`
    Await {
        task: ValueId,
        dest: ValueId,
        resume: BlockId,
        state: usize,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Jump(target) => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut targets: Vec<BlockId> = cases.iter().map(|(_, target)| *target).collect();
                targets.push(*default);
                targets
            }
            Terminator::Await { resume, .. } => vec![*resume],
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }

    pub(crate) fn remap(&mut self, map: &IndexMap<BlockId, BlockId>) {
        let apply = |target: &mut BlockId| {
            if let Some(new) = map.get(target) {
                *target = *new;
            }
        };
        match self {
            Terminator::Jump(target) => apply(target),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                apply(then_block);
                apply(else_block);
            }
            Terminator::Switch { cases, default, .. } => {
                cases.iter_mut().for_each(|(_, target)| apply(target));
                apply(default);
            }
            Terminator::Await { resume, .. } => apply(resume),
            Terminator::Return(_) | Terminator::Unreachable => {}
        }
    }
}

// === DISPLAY ===

fn values(values: &[ValueId]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const(constant) => write!(f, "const {constant}"),
            Op::Binary {
                operator,
                left,
                right,
            } => write!(f, "{left} {operator} {right}"),
            Op::Unary { operator, operand } => write!(f, "{operator}{operand}"),
            Op::Call { function, args } => write!(f, "call {function}({})", values(args)),
            Op::CallBuiltin { builtin, args } => write!(f, "builtin {builtin}({})", values(args)),
            Op::CallIndirect { callee, args } => write!(f, "call_indirect {callee}({})", values(args)),
            Op::MakeClosure { function, captures } => {
                write!(f, "closure {function}[{}]", values(captures))
            }
            Op::MakeList(elements) => write!(f, "list [{}]", values(elements)),
            Op::MakeTuple(elements) => write!(f, "tuple ({})", values(elements)),
            Op::MakeObject { class, fields } => write!(f, "object {class} {{{}}}", values(fields)),
            Op::MakeVariant {
                enum_name,
                tag,
                fields,
            } => write!(f, "variant {enum_name}#{tag}({})", values(fields)),
            Op::GetField { object, index } => write!(f, "{object}.{index}"),
            Op::SetField {
                object,
                index,
                value,
            } => write!(f, "{object}.{index} = {value}"),
            Op::GetTag(value) => write!(f, "tag {value}"),
            Op::GetVariantField { value, index } => write!(f, "variant_field {value}.{index}"),
            Op::GetIndex { list, index } => write!(f, "{list}[{index}]"),
            Op::SetIndex { list, index, value } => write!(f, "{list}[{index}] = {value}"),
            Op::LoadLocal(slot) => write!(f, "load {slot}"),
            Op::StoreLocal { slot, value } => write!(f, "store {slot}, {value}"),
            Op::SpawnAsync { function, args } => write!(f, "spawn_async {function}({})", values(args)),
            Op::SpawnTask { function, captures } => {
                write!(f, "spawn_task {function}[{}]", values(captures))
            }
            Op::Join(tasks) => write!(f, "join {}", values(tasks)),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(target) => write!(f, "jump {target}"),
            Terminator::Branch {
                condition,
                then_block,
                else_block,
            } => write!(f, "branch {condition}, {then_block}, {else_block}"),
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                write!(f, "switch {value} [")?;
                for (constant, target) in cases {
                    write!(f, "{constant} => {target}, ")?;
                }
                write!(f, "_ => {default}]")
            }
            Terminator::Return(Some(value)) => write!(f, "return {value}"),
            Terminator::Return(None) => write!(f, "return"),
            Terminator::Await {
                task,
                dest,
                resume,
                state,
            } => write!(f, "{dest} = await {task} (state {state}), resume {resume}"),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_async {
            write!(f, "async ")?;
        }
        let params = self
            .params
            .iter()
            .map(|(value, ty)| format!("{value}: {ty}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "func {}({params}) -> {} {{", self.name, self.ret)?;
        for (index, ty) in self.slots.iter().enumerate() {
            writeln!(f, "  {}: {ty}", SlotId(index as u32))?;
        }
        for block in &self.blocks {
            writeln!(f, "{}:", block.id)?;
            for instruction in &block.instructions {
                match instruction.dest {
                    Some(dest) => writeln!(f, "  {dest}: {} = {}", instruction.ty, instruction.op)?,
                    None => writeln!(f, "  {}", instruction.op)?,
                }
            }
            writeln!(f, "  {}", block.terminator)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, function) in self.functions.values().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
