//! Test harness: build programs, compile them and run the resulting IR
//!
//! The evaluator is deliberately simple. Tasks are started lazily and run
//! to completion when awaited or joined, which is enough to observe result
//! order, join order and the sequence of suspension points.

use crate::builtins::Builtin;
use crate::error::CompileError;
use crate::ir::{Constant, IrModule, Op, Terminator, ValueId};
use crate::typed_ast::TypedFunction;
use crate::{check_program, compile_program, CheckResult, CompiledUnit, CompilerOptions};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use vela_ast::builder::program;
use vela_ast::{BinaryOperator, Item, UnaryOperator};

/// Upper bound on executed blocks per run
const FUEL: usize = 100_000;

// === COMPILING ===

pub fn check(items: Vec<Item>) -> CheckResult {
    check_program(&program(items), &CompilerOptions::default())
}

/// Check and fail the test with the diagnostics if there are any
pub fn assert_checks(items: Vec<Item>) -> CheckResult {
    let result = check(items);
    assert!(
        result.is_ok(),
        "expected program to check, got {:#?}",
        result.diagnostics
    );
    result
}

/// Diagnostic codes from checking alone
pub fn check_codes(items: Vec<Item>) -> Vec<String> {
    check(items).diagnostics.codes()
}

pub fn compile_with(items: Vec<Item>, options: &CompilerOptions) -> Result<CompiledUnit, Vec<CompileError>> {
    compile_program(&program(items), options).map_err(|diagnostics| diagnostics.errors)
}

pub fn compile(items: Vec<Item>) -> CompiledUnit {
    match compile_with(items, &CompilerOptions::default()) {
        Ok(unit) => unit,
        Err(errors) => panic!("expected program to compile, got {errors:#?}"),
    }
}

/// Diagnostic codes from the full pipeline
pub fn compile_codes(items: Vec<Item>) -> Vec<String> {
    match compile_program(&program(items), &CompilerOptions::default()) {
        Ok(_) => Vec::new(),
        Err(diagnostics) => diagnostics.codes(),
    }
}

pub fn typed_function<'r>(result: &'r CheckResult, name: &str) -> &'r TypedFunction {
    result
        .program
        .function_named(name)
        .unwrap_or_else(|| panic!("no checked function {name}"))
}

/// Final type of the first local called `local` in `function`
pub fn local_type(result: &CheckResult, function: &str, local: &str) -> String {
    typed_function(result, function)
        .locals
        .iter()
        .find(|info| info.name == local)
        .map(|info| info.ty.to_string())
        .unwrap_or_else(|| panic!("no local {local} in {function}"))
}

// === VALUES ===

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Vec<Value>),
    Object {
        class: String,
        fields: Rc<RefCell<Vec<Value>>>,
    },
    Variant {
        enum_name: String,
        tag: usize,
        fields: Vec<Value>,
    },
    Closure {
        function: String,
        captures: Vec<Value>,
    },
    Task(usize),
    Null,
}

impl Value {
    pub fn str(value: &str) -> Self {
        Value::Str(value.to_string())
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(values)))
    }

    fn int(&self) -> i64 {
        match self {
            Value::Int(value) => *value,
            other => panic!("expected int, got {other:?}"),
        }
    }

    fn bool(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            other => panic!("expected bool, got {other:?}"),
        }
    }

    fn elements(&self) -> Vec<Value> {
        match self {
            Value::List(values) => values.borrow().clone(),
            other => panic!("expected list, got {other:?}"),
        }
    }
}

fn join(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
            Value::List(values) => write!(f, "[{}]", join(&values.borrow())),
            Value::Tuple(values) => write!(f, "({})", join(values)),
            Value::Object { class, fields } => write!(f, "{class} {{{}}}", join(&fields.borrow())),
            Value::Variant {
                enum_name,
                tag,
                fields,
            } => write!(f, "{enum_name}#{tag}({})", join(fields)),
            Value::Closure { function, .. } => write!(f, "<closure {function}>"),
            Value::Task(id) => write!(f, "<task {id}>"),
        }
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::Int(value) => Value::Int(*value),
        Constant::Float(value) => Value::Float(*value),
        Constant::Bool(value) => Value::Bool(*value),
        Constant::Str(value) => Value::Str(value.clone()),
        Constant::Null => Value::Null,
        Constant::Unit => Value::Unit,
    }
}

// === EVALUATION ===

/// Order in which a `Join` runs the tasks it waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOrder {
    Forward,
    Reversed,
    /// Arm positions in completion order; unlisted arms run last
    Permutation(Vec<usize>),
}

impl JoinOrder {
    fn arrange(&self, ids: &[usize]) -> Vec<usize> {
        match self {
            JoinOrder::Forward => ids.to_vec(),
            JoinOrder::Reversed => ids.iter().rev().copied().collect(),
            JoinOrder::Permutation(positions) => {
                let mut order: Vec<usize> = positions.iter().filter_map(|p| ids.get(*p).copied()).collect();
                let unlisted: Vec<usize> = ids.iter().filter(|id| !order.contains(id)).copied().collect();
                order.extend(unlisted);
                order
            }
        }
    }
}

/// Every ordering of `0..n`
pub fn permutations(n: usize) -> Vec<Vec<usize>> {
    if n == 0 {
        return vec![Vec::new()];
    }
    let mut all = Vec::new();
    for rest in permutations(n - 1) {
        for position in 0..=rest.len() {
            let mut order = rest.clone();
            order.insert(position, n - 1);
            all.push(order);
        }
    }
    all
}

enum Task {
    Pending { function: String, args: Vec<Value> },
    Running,
    Done(Value),
}

/// Result of one run
#[derive(Debug)]
pub struct Execution {
    pub value: Value,
    /// Everything passed to `print`, in order
    pub output: Vec<String>,
    /// `(function, state)` for every suspension point passed
    pub suspensions: Vec<(String, usize)>,
}

pub struct Machine<'m> {
    module: &'m IrModule,
    join_order: JoinOrder,
    tasks: Vec<Task>,
    output: Vec<String>,
    suspensions: Vec<(String, usize)>,
    fuel: usize,
}

struct Frame {
    values: HashMap<ValueId, Value>,
    slots: Vec<Value>,
}

impl Frame {
    fn get(&self, value: &ValueId) -> Value {
        self.values
            .get(value)
            .cloned()
            .unwrap_or_else(|| panic!("use of undefined value {value}"))
    }

    fn all(&self, values: &[ValueId]) -> Vec<Value> {
        values.iter().map(|value| self.get(value)).collect()
    }
}

pub fn run(unit: &CompiledUnit, function: &str, args: Vec<Value>) -> Execution {
    run_ordered(unit, function, args, JoinOrder::Forward)
}

pub fn run_ordered(unit: &CompiledUnit, function: &str, args: Vec<Value>, join_order: JoinOrder) -> Execution {
    let mut machine = Machine {
        module: &unit.module,
        join_order,
        tasks: Vec::new(),
        output: Vec::new(),
        suspensions: Vec::new(),
        fuel: FUEL,
    };
    let value = machine.call(function, args);
    Execution {
        value,
        output: machine.output,
        suspensions: machine.suspensions,
    }
}

impl<'m> Machine<'m> {
    fn call(&mut self, name: &str, args: Vec<Value>) -> Value {
        let module = self.module;
        let function = module
            .function(name)
            .unwrap_or_else(|| panic!("no IR function {name}"));
        assert_eq!(function.params.len(), args.len(), "arity of {name}");

        let mut frame = Frame {
            values: function
                .params
                .iter()
                .map(|(value, _)| *value)
                .zip(args)
                .collect(),
            slots: vec![Value::Unit; function.slots.len()],
        };

        let mut current = function.entry;
        loop {
            self.fuel = self.fuel.checked_sub(1).expect("out of fuel");
            let block = function
                .block(current)
                .unwrap_or_else(|| panic!("{name} has no block {current}"));
            for instruction in &block.instructions {
                let value = self.execute(&instruction.op, &mut frame);
                if let Some(dest) = instruction.dest {
                    frame.values.insert(dest, value);
                }
            }

            current = match &block.terminator {
                Terminator::Jump(target) => *target,
                Terminator::Branch {
                    condition,
                    then_block,
                    else_block,
                } => {
                    if frame.get(condition).bool() {
                        *then_block
                    } else {
                        *else_block
                    }
                }
                Terminator::Switch {
                    value,
                    cases,
                    default,
                } => {
                    let value = frame.get(value);
                    cases
                        .iter()
                        .find(|(constant, _)| constant_value(constant) == value)
                        .map(|(_, target)| *target)
                        .unwrap_or(*default)
                }
                Terminator::Return(value) => {
                    return value.map(|value| frame.get(&value)).unwrap_or(Value::Unit);
                }
                Terminator::Await {
                    task,
                    dest,
                    resume,
                    state,
                } => {
                    self.suspensions.push((name.to_string(), *state));
                    let result = match frame.get(task) {
                        Value::Task(id) => self.force(id),
                        other => panic!("await on {other:?}"),
                    };
                    frame.values.insert(*dest, result);
                    *resume
                }
                Terminator::Unreachable => panic!("reached unreachable code in {name}"),
            };
        }
    }

    fn spawn(&mut self, function: &str, args: Vec<Value>) -> Value {
        self.tasks.push(Task::Pending {
            function: function.to_string(),
            args,
        });
        Value::Task(self.tasks.len() - 1)
    }

    fn force(&mut self, id: usize) -> Value {
        match std::mem::replace(&mut self.tasks[id], Task::Running) {
            Task::Pending { function, args } => {
                let value = self.call(&function, args);
                self.tasks[id] = Task::Done(value.clone());
                value
            }
            Task::Done(value) => {
                self.tasks[id] = Task::Done(value.clone());
                value
            }
            Task::Running => panic!("task {id} awaits itself"),
        }
    }

    fn execute(&mut self, op: &Op, frame: &mut Frame) -> Value {
        match op {
            Op::Const(constant) => constant_value(constant),
            Op::Binary {
                operator,
                left,
                right,
            } => binary(*operator, frame.get(left), frame.get(right)),
            Op::Unary { operator, operand } => match (operator, frame.get(operand)) {
                (UnaryOperator::Not, Value::Bool(value)) => Value::Bool(!value),
                (UnaryOperator::Minus, Value::Int(value)) => Value::Int(-value),
                (UnaryOperator::Minus, Value::Float(value)) => Value::Float(-value),
                (operator, value) => panic!("cannot apply {operator} to {value:?}"),
            },
            Op::Call { function, args } => {
                let args = frame.all(args);
                self.call(function, args)
            }
            Op::CallBuiltin { builtin, args } => {
                let args = frame.all(args);
                self.builtin(*builtin, args)
            }
            Op::CallIndirect { callee, args } => {
                let args = frame.all(args);
                self.call_closure(frame.get(callee), args)
            }
            Op::MakeClosure { function, captures } => Value::Closure {
                function: function.clone(),
                captures: frame.all(captures),
            },
            Op::MakeList(elements) => Value::list(frame.all(elements)),
            Op::MakeTuple(elements) => Value::Tuple(frame.all(elements)),
            Op::MakeObject { class, fields } => Value::Object {
                class: class.clone(),
                fields: Rc::new(RefCell::new(frame.all(fields))),
            },
            Op::MakeVariant {
                enum_name,
                tag,
                fields,
            } => Value::Variant {
                enum_name: enum_name.clone(),
                tag: *tag,
                fields: frame.all(fields),
            },
            Op::GetField { object, index } => match frame.get(object) {
                Value::Tuple(values) => values[*index].clone(),
                Value::Object { fields, .. } => fields.borrow()[*index].clone(),
                other => panic!("no field {index} on {other:?}"),
            },
            Op::SetField {
                object,
                index,
                value,
            } => {
                match frame.get(object) {
                    Value::Object { fields, .. } => fields.borrow_mut()[*index] = frame.get(value),
                    other => panic!("cannot set field {index} on {other:?}"),
                }
                Value::Unit
            }
            Op::GetTag(value) => match frame.get(value) {
                Value::Variant { tag, .. } => Value::Int(tag as i64),
                other => panic!("no tag on {other:?}"),
            },
            Op::GetVariantField { value, index } => match frame.get(value) {
                Value::Variant { fields, .. } => fields[*index].clone(),
                other => panic!("no variant field on {other:?}"),
            },
            Op::GetIndex { list, index } => {
                let position = frame.get(index).int() as usize;
                frame.get(list).elements()[position].clone()
            }
            Op::SetIndex { list, index, value } => {
                let position = frame.get(index).int() as usize;
                match frame.get(list) {
                    Value::List(values) => values.borrow_mut()[position] = frame.get(value),
                    other => panic!("cannot index {other:?}"),
                }
                Value::Unit
            }
            Op::LoadLocal(slot) => frame.slots[slot.0 as usize].clone(),
            Op::StoreLocal { slot, value } => {
                frame.slots[slot.0 as usize] = frame.get(value);
                Value::Unit
            }
            Op::SpawnAsync { function, args } => {
                let args = frame.all(args);
                self.spawn(function, args)
            }
            Op::SpawnTask { function, captures } => {
                let captures = frame.all(captures);
                self.spawn(function, captures)
            }
            Op::Join(handles) => {
                let ids: Vec<usize> = handles
                    .iter()
                    .map(|handle| match frame.get(handle) {
                        Value::Task(id) => id,
                        other => panic!("join on {other:?}"),
                    })
                    .collect();
                for id in self.join_order.arrange(&ids) {
                    self.force(id);
                }
                Value::Tuple(ids.into_iter().map(|id| self.force(id)).collect())
            }
        }
    }

    fn call_closure(&mut self, closure: Value, args: Vec<Value>) -> Value {
        match closure {
            Value::Closure { function, captures } => {
                let mut all = captures;
                all.extend(args);
                self.call(&function, all)
            }
            other => panic!("cannot call {other:?}"),
        }
    }

    fn builtin(&mut self, builtin: Builtin, mut args: Vec<Value>) -> Value {
        match builtin {
            Builtin::Print => {
                self.output.push(args[0].to_string());
                Value::Unit
            }
            Builtin::Str => Value::Str(args[0].to_string()),
            Builtin::Len => Value::Int(args[0].elements().len() as i64),
            Builtin::Range => Value::list((0..args[0].int()).map(Value::Int).collect()),
            Builtin::RangeBetween => Value::list((args[0].int()..args[1].int()).map(Value::Int).collect()),
            Builtin::Append => {
                let item = args.pop().unwrap_or(Value::Unit);
                let mut elements = args[0].elements();
                elements.push(item);
                Value::list(elements)
            }
            Builtin::Slice => {
                let elements = args[0].elements();
                let end = (args[2].int().max(0) as usize).min(elements.len());
                let start = (args[1].int().max(0) as usize).min(end);
                Value::list(elements[start..end].to_vec())
            }
            Builtin::Map => {
                let function = args[1].clone();
                let mapped = args[0]
                    .elements()
                    .into_iter()
                    .map(|element| self.call_closure(function.clone(), vec![element]))
                    .collect();
                Value::list(mapped)
            }
            Builtin::Filter => {
                let function = args[1].clone();
                let mut kept = Vec::new();
                for element in args[0].elements() {
                    if self.call_closure(function.clone(), vec![element.clone()]).bool() {
                        kept.push(element);
                    }
                }
                Value::list(kept)
            }
            Builtin::Sum => args[0]
                .elements()
                .into_iter()
                .reduce(|total, element| binary(BinaryOperator::Add, total, element))
                .unwrap_or(Value::Int(0)),
        }
    }
}

fn binary(operator: BinaryOperator, left: Value, right: Value) -> Value {
    use BinaryOperator::*;
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => match operator {
            Add => Value::Int(a + b),
            Subtract => Value::Int(a - b),
            Multiply => Value::Int(a * b),
            Divide => Value::Int(a / b),
            Modulo => Value::Int(a % b),
            Exponent => Value::Int(a.pow(b as u32)),
            Equal => Value::Bool(a == b),
            NotEqual => Value::Bool(a != b),
            Less => Value::Bool(a < b),
            LessEqual => Value::Bool(a <= b),
            Greater => Value::Bool(a > b),
            GreaterEqual => Value::Bool(a >= b),
            And | Or => panic!("logical operator on ints"),
        },
        (Value::Float(a), Value::Float(b)) => match operator {
            Add => Value::Float(a + b),
            Subtract => Value::Float(a - b),
            Multiply => Value::Float(a * b),
            Divide => Value::Float(a / b),
            Modulo => Value::Float(a % b),
            Exponent => Value::Float(a.powf(b)),
            Equal => Value::Bool(a == b),
            NotEqual => Value::Bool(a != b),
            Less => Value::Bool(a < b),
            LessEqual => Value::Bool(a <= b),
            Greater => Value::Bool(a > b),
            GreaterEqual => Value::Bool(a >= b),
            And | Or => panic!("logical operator on floats"),
        },
        (Value::Str(a), Value::Str(b)) => match operator {
            Add => Value::Str(a + &b),
            Equal => Value::Bool(a == b),
            NotEqual => Value::Bool(a != b),
            Less => Value::Bool(a < b),
            LessEqual => Value::Bool(a <= b),
            Greater => Value::Bool(a > b),
            GreaterEqual => Value::Bool(a >= b),
            other => panic!("{other} on strings"),
        },
        (Value::Bool(a), Value::Bool(b)) => match operator {
            Equal => Value::Bool(a == b),
            NotEqual => Value::Bool(a != b),
            other => panic!("{other} on bools"),
        },
        (left @ Value::Null, right) | (left, right @ Value::Null) => match operator {
            Equal => Value::Bool(left == right),
            NotEqual => Value::Bool(left != right),
            other => panic!("{other} on null"),
        },
        (left, right) => panic!("cannot apply {operator} to {left:?} and {right:?}"),
    }
}
