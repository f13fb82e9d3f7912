use crate::{
    error::{BehaviorError, BtResult},
    node::{NodeConfig, NodeCore, ReactivePolicy},
    script::EnumsTable,
    Blackboard, FromValue, NodeStatus, TreeNode, Value, WakeUpSignal,
};
use std::rc::Rc;

/// The view of its own node that a [`crate::BehaviorNode`] gets while being ticked or halted.
///
/// It gives access to the node's status, ports, blackboard and children,
/// but not to the behavior itself, so the node can't re-enter its own tick.
pub struct Context<'a> {
    core: &'a mut NodeCore,
    children: &'a mut [TreeNode],
}

impl<'a> Context<'a> {
    pub(crate) fn new(core: &'a mut NodeCore, children: &'a mut [TreeNode]) -> Self {
        Self { core, children }
    }

    pub fn status(&self) -> NodeStatus {
        self.core.status()
    }

    pub fn set_status(&mut self, status: NodeStatus) -> BtResult<()> {
        self.core.set_status(status)
    }

    pub fn reset_status(&mut self) {
        self.core.reset_status();
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn display_name(&self) -> String {
        self.core.display_name()
    }

    pub fn config(&self) -> &NodeConfig {
        self.core.config()
    }

    pub fn blackboard(&self) -> &Rc<Blackboard> {
        &self.core.config().blackboard
    }

    pub fn enums(&self) -> &EnumsTable {
        &self.core.config().enums
    }

    pub fn reactive_policy(&self) -> ReactivePolicy {
        self.core.config().reactive_policy
    }

    /// Reads an input port, converting it to `T`. `None` if the port is unset or
    /// the value can't be converted.
    pub fn get_input<T: FromValue>(&self, key: &str) -> Option<T> {
        self.core.get_input(key)
    }

    pub fn get_input_value(&self, key: &str) -> Option<Value> {
        self.core.get_input_value(key)
    }

    pub fn get_input_or_err<T: FromValue>(&self, key: &str) -> BtResult<T> {
        self.core.get_input_or_err(key)
    }

    /// The string assigned to an input port, without resolving blackboard references.
    pub fn input_port_str(&self, key: &str) -> Option<&str> {
        self.core.input_port_str(key)
    }

    pub fn set_output(&self, key: &str, value: impl Into<Value>) -> BtResult<()> {
        self.core.set_output(key, value.into())
    }

    /// Evaluates a script against this node's blackboard.
    pub fn evaluate(&self, source: &str) -> BtResult<Value> {
        self.core.evaluate(source)
    }

    pub fn children_count(&self) -> usize {
        self.children.len()
    }

    /// Status of the child at `index`, `Idle` if there is no such child.
    pub fn child_status(&self, index: usize) -> NodeStatus {
        self.children
            .get(index)
            .map_or(NodeStatus::Idle, TreeNode::status)
    }

    pub fn child(&self, index: usize) -> Option<&TreeNode> {
        self.children.get(index)
    }

    pub fn tick_child(&mut self, index: usize) -> BtResult<NodeStatus> {
        let found = self.children.len();
        match self.children.get_mut(index) {
            Some(child) => child.execute_tick(),
            None => Err(BehaviorError::WrongChildCount {
                node: self.core.display_name(),
                expected: format!("at least {}", index + 1),
                found,
            }),
        }
    }

    /// Halts a running child, or just resets it otherwise.
    pub fn halt_child(&mut self, index: usize) {
        if let Some(child) = self.children.get_mut(index) {
            if child.status() == NodeStatus::Running {
                child.halt_node();
            } else {
                child.reset_status();
            }
        }
    }

    pub fn halt_children(&mut self) {
        for index in 0..self.children.len() {
            self.halt_child(index);
        }
    }

    pub fn reset_child(&mut self, index: usize) {
        if let Some(child) = self.children.get_mut(index) {
            child.reset_status();
        }
    }

    pub fn wake_up_signal(&self) -> Option<&WakeUpSignal> {
        self.core.wake_up()
    }

    pub fn requires_wake_up(&self) -> bool {
        self.core.wake_up().is_some()
    }

    pub fn emit_wake_up_signal(&self) {
        if let Some(signal) = self.core.wake_up() {
            signal.emit_signal();
        }
    }
}
