//! Concurrency lowering
//!
//! Numbers the suspension points of async functions and the `parallel`
//! blocks of every function, computes the locals each parallel arm captures,
//! and records the resulting task graph. Edges mean "must complete before".
//!
//! A function gets a graph when it is async or contains a parallel block.
//! Segment `0` starts at entry and segment `k + 1` resumes after suspension
//! `k`. Segment edges follow control flow, so both branches of an `if` can
//! lead into the same successor. Loops add no back edges: an await inside a
//! loop body is one suspension point however often it runs, and the segment
//! after the loop hangs off both the loop entry and the body's last segment.

use crate::context::LocalId;
use crate::error::{at, ConcurrencyError, Diagnostics};
use crate::typed_ast::{
    AssignTarget, Callee, TypedBlock, TypedExpression, TypedExpressionKind, TypedFunction, TypedPattern,
    TypedPatternKind, TypedProgram, TypedStatementKind,
};
use indexmap::{IndexMap, IndexSet};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, instrument, trace};
use vela_ast::{BinaryOperator, Span};

/// A node of a function's task graph
#[derive(Debug, Clone, PartialEq)]
pub enum TaskNode {
    /// Continuation segment of the function body
    Segment { index: usize },
    /// One arm of a parallel block, run as its own task
    ParallelArm {
        block: usize,
        arm: usize,
        captures: Vec<LocalId>,
    },
    /// Waits for every arm of a parallel block
    Join { block: usize, arms: usize },
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub function: String,
    pub graph: DiGraph<TaskNode, ()>,
    pub entry: NodeIndex,
}

impl TaskGraph {
    fn new(function: String) -> Self {
        let mut graph = DiGraph::new();
        let entry = graph.add_node(TaskNode::Segment { index: 0 });
        Self {
            function,
            graph,
            entry,
        }
    }

    pub fn node(&self, index: NodeIndex) -> Option<&TaskNode> {
        self.graph.node_weight(index)
    }

    pub fn segment(&self, index: usize) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|node| self.graph[*node] == TaskNode::Segment { index })
    }

    pub fn segment_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|node| matches!(node, TaskNode::Segment { .. }))
            .count()
    }

    /// Arm nodes of a parallel block in source order
    pub fn arms(&self, block: usize) -> Vec<NodeIndex> {
        let mut arms: Vec<(usize, NodeIndex)> = self
            .graph
            .node_indices()
            .filter_map(|node| match &self.graph[node] {
                TaskNode::ParallelArm { block: b, arm, .. } if *b == block => Some((*arm, node)),
                _ => None,
            })
            .collect();
        arms.sort_by_key(|(arm, _)| *arm);
        arms.into_iter().map(|(_, node)| node).collect()
    }

    pub fn join(&self, block: usize) -> Option<NodeIndex> {
        self.graph.node_indices().find(|node| {
            matches!(&self.graph[*node], TaskNode::Join { block: b, .. } if *b == block)
        })
    }

    pub fn predecessors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut predecessors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .collect();
        predecessors.sort();
        predecessors
    }

    pub fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        successors.sort();
        successors
    }

    pub fn is_acyclic(&self) -> bool {
        toposort(&self.graph, None).is_ok()
    }
}

/// Suspension layout of one async function
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncStateMachine {
    pub function: String,
    /// Continuation segments, one more than the suspension points
    pub segments: usize,
    /// Span of each `await`, indexed by suspension point
    pub suspensions: Vec<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct ConcurrencyInfo {
    pub graphs: IndexMap<String, TaskGraph>,
    pub state_machines: IndexMap<String, AsyncStateMachine>,
}

impl ConcurrencyInfo {
    pub fn graph(&self, function: &str) -> Option<&TaskGraph> {
        self.graphs.get(function)
    }

    pub fn state_machine(&self, function: &str) -> Option<&AsyncStateMachine> {
        self.state_machines.get(function)
    }
}

/// Annotate suspension points and parallel blocks in place and build task graphs
#[instrument(skip_all, fields(functions = program.functions.len()))]
pub fn lower_concurrency(program: &mut TypedProgram) -> Result<ConcurrencyInfo, Diagnostics> {
    let mut info = ConcurrencyInfo::default();
    let mut diagnostics = Diagnostics::new();

    for function in &mut program.functions {
        let name = function.key.to_string();
        let mut lowering = FunctionLowering::new(name.clone(), function.is_async);
        lowering.lower_function(function);

        if lowering.graph.is_acyclic() {
            debug!(
                function = %name,
                suspensions = lowering.suspensions.len(),
                parallel_blocks = lowering.next_block,
                "lowered concurrency"
            );
        } else {
            lowering.diagnostics.push(ConcurrencyError::CyclicTaskGraph {
                function: name.clone(),
                span: at(function.span),
            });
        }

        if function.is_async {
            info.state_machines.insert(
                name.clone(),
                AsyncStateMachine {
                    function: name.clone(),
                    segments: lowering.suspensions.len() + 1,
                    suspensions: lowering.suspensions.clone(),
                },
            );
        }
        if function.is_async || lowering.next_block > 0 {
            info.graphs.insert(name, lowering.graph);
        }
        diagnostics.extend(lowering.diagnostics);
    }

    if diagnostics.is_empty() {
        Ok(info)
    } else {
        Err(diagnostics)
    }
}

/// Locals of one parallel arm being walked
#[derive(Debug, Default)]
struct ArmScope {
    defined: IndexSet<LocalId>,
    captures: IndexSet<LocalId>,
}

struct FunctionLowering {
    is_async: bool,
    graph: TaskGraph,
    /// Nodes control may have come from at the current point
    current: Vec<NodeIndex>,
    suspensions: Vec<Span>,
    next_block: usize,
    lambda_depth: usize,
    arms: Vec<ArmScope>,
    local_names: Vec<String>,
    diagnostics: Diagnostics,
}

impl FunctionLowering {
    fn new(function: String, is_async: bool) -> Self {
        let graph = TaskGraph::new(function);
        let current = vec![graph.entry];
        Self {
            is_async,
            graph,
            current,
            suspensions: Vec::new(),
            next_block: 0,
            lambda_depth: 0,
            arms: Vec::new(),
            local_names: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    fn lower_function(&mut self, function: &mut TypedFunction) {
        self.local_names = function.locals.iter().map(|local| local.name.clone()).collect();
        self.block(&mut function.body);
    }

    fn define(&mut self, local: LocalId) {
        for arm in &mut self.arms {
            arm.defined.insert(local);
        }
    }

    fn use_local(&mut self, local: LocalId) {
        for arm in &mut self.arms {
            if !arm.defined.contains(&local) {
                arm.captures.insert(local);
            }
        }
    }

    fn define_pattern(&mut self, pattern: &TypedPattern) {
        match &pattern.kind {
            TypedPatternKind::Binding(local) => self.define(*local),
            TypedPatternKind::Tuple(fields)
            | TypedPatternKind::Variant { fields, .. }
            | TypedPatternKind::Class { fields, .. } => {
                for field in fields {
                    self.define_pattern(field);
                }
            }
            TypedPatternKind::Wildcard | TypedPatternKind::Literal(_) => {}
        }
    }

    fn merge(&mut self, mut other: Vec<NodeIndex>) {
        for node in other.drain(..) {
            if !self.current.contains(&node) {
                self.current.push(node);
            }
        }
    }

    fn block(&mut self, block: &mut TypedBlock) {
        for statement in &mut block.statements {
            match &mut statement.kind {
                TypedStatementKind::Let { local, value } => {
                    self.expression(value);
                    self.define(*local);
                }
                TypedStatementKind::Assign { target, value } => {
                    match target {
                        AssignTarget::Local(local) => {
                            self.use_local(*local);
                            if let Some(arm) = self.arms.last() {
                                if !arm.defined.contains(local) {
                                    self.diagnostics.push(ConcurrencyError::ParallelArmAssignsCapture {
                                        name: self
                                            .local_names
                                            .get(local.0 as usize)
                                            .cloned()
                                            .unwrap_or_default(),
                                        span: at(statement.span),
                                    });
                                }
                            }
                        }
                        AssignTarget::Field { object, .. } => self.expression(object),
                        AssignTarget::Index { target, index } => {
                            self.expression(target);
                            self.expression(index);
                        }
                    }
                    self.expression(value);
                }
                TypedStatementKind::Expression(expression) => self.expression(expression),
                TypedStatementKind::Return(value) => {
                    if let Some(value) = value {
                        self.expression(value);
                    }
                    self.current.clear();
                }
                TypedStatementKind::While { condition, body } => {
                    self.expression(condition);
                    let before = self.current.clone();
                    self.block(body);
                    self.merge(before);
                }
                TypedStatementKind::For {
                    local,
                    iterable,
                    body,
                } => {
                    self.expression(iterable);
                    let before = self.current.clone();
                    self.define(*local);
                    self.block(body);
                    self.merge(before);
                }
                TypedStatementKind::Break | TypedStatementKind::Continue => {}
            }
        }
    }

    fn expression(&mut self, expression: &mut TypedExpression) {
        let span = expression.span;
        match &mut expression.kind {
            TypedExpressionKind::Integer(_)
            | TypedExpressionKind::Float(_)
            | TypedExpressionKind::Boolean(_)
            | TypedExpressionKind::String(_)
            | TypedExpressionKind::Null
            | TypedExpressionKind::FunctionRef { .. } => {}
            TypedExpressionKind::Local(local) => self.use_local(*local),
            TypedExpressionKind::List(elements) | TypedExpressionKind::Tuple(elements) => {
                elements.iter_mut().for_each(|element| self.expression(element));
            }
            TypedExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                self.expression(left);
                if matches!(operator, BinaryOperator::And | BinaryOperator::Or) {
                    let skipped = self.current.clone();
                    self.expression(right);
                    self.merge(skipped);
                } else {
                    self.expression(right);
                }
            }
            TypedExpressionKind::Unary { operand, .. } => self.expression(operand),
            TypedExpressionKind::Call { callee, arguments } => {
                if let Callee::Value(value) = callee {
                    self.expression(value);
                }
                arguments.iter_mut().for_each(|argument| self.expression(argument));
            }
            TypedExpressionKind::FieldAccess { object, .. } => self.expression(object),
            TypedExpressionKind::Index { target, index } => {
                self.expression(target);
                self.expression(index);
            }
            TypedExpressionKind::Lambda(lambda) => {
                for param in &lambda.params {
                    self.define(*param);
                }
                // A lambda body runs whenever it is called, detached from this flow.
                let outer = std::mem::take(&mut self.current);
                self.lambda_depth += 1;
                self.expression(&mut lambda.body);
                self.lambda_depth -= 1;
                self.current = outer;
            }
            TypedExpressionKind::If {
                condition,
                then_block,
                else_block,
            } => {
                self.expression(condition);
                let before = self.current.clone();
                self.block(then_block);
                let then_end = std::mem::replace(&mut self.current, before);
                if let Some(else_block) = else_block {
                    self.block(else_block);
                }
                self.merge(then_end);
            }
            TypedExpressionKind::Match(matched) => {
                self.expression(&mut matched.scrutinee);
                let before = self.current.clone();
                let mut ends = Vec::new();
                for arm in &mut matched.arms {
                    self.current = before.clone();
                    self.define_pattern(&arm.pattern);
                    if let Some(guard) = &mut arm.guard {
                        self.expression(guard);
                    }
                    self.expression(&mut arm.body);
                    ends.append(&mut self.current);
                }
                self.current.clear();
                self.merge(ends);
            }
            TypedExpressionKind::Block(block) => self.block(block),
            TypedExpressionKind::Object { fields, .. } | TypedExpressionKind::Variant { fields, .. } => {
                fields.iter_mut().for_each(|field| self.expression(field));
            }
            TypedExpressionKind::Await { task, state } => {
                self.expression(task);
                *state = self.suspend(span);
            }
            TypedExpressionKind::Parallel { arms, block } => {
                let index = self.next_block;
                self.next_block += 1;
                *block = Some(index);

                let join = self.graph.graph.add_node(TaskNode::Join {
                    block: index,
                    arms: arms.len(),
                });
                let before = std::mem::take(&mut self.current);
                for (position, arm) in arms.iter_mut().enumerate() {
                    let node = self.graph.graph.add_node(TaskNode::ParallelArm {
                        block: index,
                        arm: position,
                        captures: Vec::new(),
                    });
                    for predecessor in &before {
                        self.graph.graph.add_edge(*predecessor, node, ());
                    }

                    self.arms.push(ArmScope::default());
                    self.current = vec![node];
                    self.expression(&mut arm.expression);
                    let scope = self.arms.pop().unwrap_or_default();

                    // Captures of a nested arm are captures of the enclosing arms too.
                    for local in &scope.captures {
                        self.use_local(*local);
                    }
                    arm.captures = scope.captures.into_iter().collect();
                    if let TaskNode::ParallelArm { captures, .. } = &mut self.graph.graph[node] {
                        captures.clone_from(&arm.captures);
                    }
                    self.graph.graph.add_edge(node, join, ());
                }
                trace!(block = index, arms = arms.len(), "parallel block");
                self.current = vec![join];
            }
        }
    }

    /// Allocate the next suspension point, or report why this await cannot suspend
    fn suspend(&mut self, span: Span) -> Option<usize> {
        let error = if !self.is_async || self.lambda_depth > 0 {
            Some(ConcurrencyError::AwaitOutsideAsync { span: at(span) })
        } else if !self.arms.is_empty() {
            Some(ConcurrencyError::AwaitInParallelArm { span: at(span) })
        } else {
            None
        };
        if let Some(error) = error {
            self.diagnostics.push(error);
            return None;
        }

        let state = self.suspensions.len();
        self.suspensions.push(span);
        let segment = self.graph.graph.add_node(TaskNode::Segment { index: state + 1 });
        for predecessor in self.current.drain(..) {
            self.graph.graph.add_edge(predecessor, segment, ());
        }
        self.current.push(segment);
        trace!(state, "suspension point");
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_graph_has_entry_segment() {
        let graph = TaskGraph::new("main".to_string());
        assert_eq!(graph.segment_count(), 1);
        assert_eq!(graph.segment(0), Some(graph.entry));
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph = TaskGraph::new("loop".to_string());
        let next = graph.graph.add_node(TaskNode::Segment { index: 1 });
        graph.graph.add_edge(graph.entry, next, ());
        graph.graph.add_edge(next, graph.entry, ());
        assert!(!graph.is_acyclic());
    }
}
