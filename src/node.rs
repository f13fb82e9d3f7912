//! The node container that every behavior lives in.
//!
//! A [`TreeNode`] owns its [`BehaviorNode`] implementation, its children and the
//! bookkeeping shared by all node types: the status, the [`NodeConfig`] it was
//! created with, condition scripts and user callbacks. Behaviors never see the
//! container directly; they are handed a [`Context`] that exposes the parts
//! they are allowed to touch.

use crate::{
    error::{BehaviorError, BtResult},
    script::{EnumsTable, Environment, Script, ScriptCache},
    BehaviorNode, Blackboard, Context, FromValue, NodeKind, NodeStatus, NumChildren, PortBinding,
    PortSpec, Symbol, Value, WakeUpSignal,
};
use std::{
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    rc::Rc,
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

/// Scripts evaluated before a node is ticked, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreCond {
    FailureIf,
    SuccessIf,
    SkipIf,
    WhileTrue,
}

impl PreCond {
    pub const ALL: [Self; 4] = [Self::FailureIf, Self::SuccessIf, Self::SkipIf, Self::WhileTrue];

    /// The attribute name used in tree definitions
    pub fn attribute(self) -> &'static str {
        match self {
            Self::FailureIf => "_failureIf",
            Self::SuccessIf => "_successIf",
            Self::SkipIf => "_skipIf",
            Self::WhileTrue => "_while",
        }
    }

    pub fn from_attribute(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cond| cond.attribute() == name)
    }
}

/// Scripts evaluated after a node completes or is halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostCond {
    OnHalted,
    OnFailure,
    OnSuccess,
    Always,
}

impl PostCond {
    pub const ALL: [Self; 4] = [Self::OnHalted, Self::OnFailure, Self::OnSuccess, Self::Always];

    pub fn attribute(self) -> &'static str {
        match self {
            Self::OnHalted => "_onHalted",
            Self::OnFailure => "_onFailure",
            Self::OnSuccess => "_onSuccess",
            Self::Always => "_post",
        }
    }

    pub fn from_attribute(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cond| cond.attribute() == name)
    }
}

/// What the registry knows about a node type without instantiating it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeManifest {
    pub kind: NodeKind,
    pub registration_id: String,
    pub ports: Vec<PortSpec>,
}

impl NodeManifest {
    pub fn port(&self, key: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|port| port.key == key)
    }
}

/// Whether reactive composites reject a second child reporting `Running`.
///
/// This is a property of the whole tree. It is set on the [`crate::Registry`] and
/// copied into every node it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactivePolicy {
    pub sequence_single_running: bool,
    pub fallback_single_running: bool,
}

impl Default for ReactivePolicy {
    fn default() -> Self {
        Self {
            sequence_single_running: true,
            fallback_single_running: true,
        }
    }
}

/// Everything a node is constructed with.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub blackboard: Rc<Blackboard>,
    pub enums: Rc<EnumsTable>,
    pub scripts: ScriptCache,
    /// Port name to its assigned string: `{=}`, `{key}` or a literal
    pub input_ports: HashMap<Symbol, String>,
    pub output_ports: HashMap<Symbol, String>,
    pub manifest: Option<Rc<NodeManifest>>,
    pub uid: u32,
    /// Slash separated location of the node in the tree, used for filtering
    pub path: String,
    pub pre_conditions: HashMap<PreCond, String>,
    pub post_conditions: HashMap<PostCond, String>,
    pub reactive_policy: ReactivePolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::with_blackboard(Blackboard::create(None))
    }
}

impl NodeConfig {
    pub fn with_blackboard(blackboard: Rc<Blackboard>) -> Self {
        Self {
            blackboard,
            enums: Rc::default(),
            scripts: ScriptCache::default(),
            input_ports: HashMap::new(),
            output_ports: HashMap::new(),
            manifest: None,
            uid: 0,
            path: String::new(),
            pre_conditions: HashMap::new(),
            post_conditions: HashMap::new(),
            reactive_policy: ReactivePolicy::default(),
        }
    }

    pub fn input(mut self, port: impl Into<Symbol>, value: impl Into<String>) -> Self {
        self.input_ports.insert(port.into(), value.into());
        self
    }

    pub fn output(mut self, port: impl Into<Symbol>, value: impl Into<String>) -> Self {
        self.output_ports.insert(port.into(), value.into());
        self
    }

    pub fn pre_condition(mut self, cond: PreCond, script: impl Into<String>) -> Self {
        self.pre_conditions.insert(cond, script.into());
        self
    }

    pub fn post_condition(mut self, cond: PostCond, script: impl Into<String>) -> Self {
        self.post_conditions.insert(cond, script.into());
        self
    }
}

/// Identifies a status listener so that it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

/// Payload of a status-change notification.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub timestamp: Instant,
    pub uid: u32,
    pub name: &'a str,
    pub path: &'a str,
    pub previous: NodeStatus,
    pub current: NodeStatus,
}

pub type StatusListener = Box<dyn FnMut(&StatusChange)>;
/// Injected before or after `tick()`. A completed status replaces the node's own result.
pub type TickCallback = Box<dyn FnMut(&TreeNode) -> NodeStatus>;
/// Receives the status and the duration of every `tick()` call.
pub type TickMonitor = Box<dyn FnMut(&TreeNode, NodeStatus, Duration)>;

/// The state of a node that behaviors can reach through a [`Context`].
pub struct NodeCore {
    name: String,
    registration_id: String,
    kind: NodeKind,
    config: NodeConfig,
    status: NodeStatus,
    wake_up: Option<WakeUpSignal>,
    pre_scripts: Vec<(PreCond, Rc<dyn Script>)>,
    post_scripts: HashMap<PostCond, Rc<dyn Script>>,
    listeners: Vec<(ListenerId, StatusListener)>,
    next_listener: usize,
}

impl NodeCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub(crate) fn status(&self) -> NodeStatus {
        self.status
    }

    pub(crate) fn wake_up(&self) -> Option<&WakeUpSignal> {
        self.wake_up.as_ref()
    }

    /// `name`, or `name(registration id)` when the two differ.
    pub(crate) fn display_name(&self) -> String {
        if self.registration_id.is_empty() || self.registration_id == self.name {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.registration_id)
        }
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus) -> BtResult<()> {
        if status == NodeStatus::Idle {
            return Err(BehaviorError::IdleAssignment {
                node: self.display_name(),
            });
        }
        let previous = std::mem::replace(&mut self.status, status);
        if previous != status {
            self.notify(previous, status);
        }
        Ok(())
    }

    pub(crate) fn reset_status(&mut self) {
        let previous = std::mem::replace(&mut self.status, NodeStatus::Idle);
        if previous != NodeStatus::Idle {
            self.notify(previous, NodeStatus::Idle);
        }
    }

    fn notify(&mut self, previous: NodeStatus, current: NodeStatus) {
        trace!(
            node = %self.name,
            uid = self.config.uid,
            %previous,
            %current,
            "status change"
        );
        if self.listeners.is_empty() {
            return;
        }
        let change = StatusChange {
            timestamp: Instant::now(),
            uid: self.config.uid,
            name: &self.name,
            path: &self.config.path,
            previous,
            current,
        };
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    pub(crate) fn environment(&self) -> Environment {
        Environment {
            blackboard: &self.config.blackboard,
            enums: &self.config.enums,
        }
    }

    pub(crate) fn evaluate(&self, source: &str) -> BtResult<Value> {
        self.config.scripts.evaluate(&self.environment(), source)
    }

    fn run_script(&self, script: &dyn Script) -> BtResult<Value> {
        script.evaluate(&self.environment())
    }

    /// An enum name becomes its integer value, anything else stays a string.
    fn string_value(&self, s: &str) -> Value {
        match self.config.enums.get(s.trim()) {
            Some(value) => Value::Int(*value),
            None => Value::String(s.to_owned()),
        }
    }

    pub(crate) fn input_port_str(&self, key: &str) -> Option<&str> {
        self.config.input_ports.get(key).map(String::as_str)
    }

    pub(crate) fn get_input_value(&self, key: &str) -> Option<Value> {
        let Some(assigned) = self.config.input_ports.get(key) else {
            return self
                .config
                .manifest
                .as_ref()?
                .port(key)?
                .default_value()
                .cloned();
        };
        match PortBinding::parse(assigned) {
            PortBinding::Literal(literal) => Some(self.string_value(literal)),
            binding => {
                let value = self.config.blackboard.get(binding.key(key)?)?;
                Some(match value {
                    Value::String(s) => self.string_value(&s),
                    value => value,
                })
            }
        }
    }

    pub(crate) fn get_input<T: FromValue>(&self, key: &str) -> Option<T> {
        self.get_input_value(key)
            .and_then(|value| T::from_value(&value))
    }

    pub(crate) fn get_input_or_err<T: FromValue>(&self, key: &str) -> BtResult<T> {
        let value = self
            .get_input_value(key)
            .ok_or_else(|| BehaviorError::MissingPort {
                node: self.display_name(),
                port: key.to_owned(),
            })?;
        T::from_value(&value).ok_or_else(|| BehaviorError::InvalidPortValue {
            node: self.display_name(),
            port: key.to_owned(),
            value: value.to_string(),
        })
    }

    pub(crate) fn set_output(&self, key: &str, value: Value) -> BtResult<()> {
        let assigned =
            self.config
                .output_ports
                .get(key)
                .ok_or_else(|| BehaviorError::MissingOutputPort {
                    node: self.display_name(),
                    port: key.to_owned(),
                })?;
        let binding = PortBinding::parse(assigned);
        let target = binding
            .key(key)
            .ok_or_else(|| BehaviorError::InvalidOutputBinding {
                node: self.display_name(),
                port: key.to_owned(),
                binding: assigned.clone(),
            })?;
        self.config.blackboard.set(target, value)
    }
}

#[derive(Default)]
struct Hooks {
    pre_tick: Option<TickCallback>,
    post_tick: Option<TickCallback>,
    monitor: Option<TickMonitor>,
}

/// A node of a behavior tree together with its subtree.
pub struct TreeNode {
    core: NodeCore,
    behavior: Box<dyn BehaviorNode>,
    children: Vec<TreeNode>,
    hooks: Hooks,
}

impl TreeNode {
    /// Creates a node with a fresh, private blackboard and no condition scripts.
    pub fn new(name: impl Into<String>, behavior: impl BehaviorNode + 'static) -> Self {
        Self::build(name.into(), NodeConfig::default(), Box::new(behavior))
    }

    /// Creates a node from a populated config. Fails if a condition script doesn't parse.
    pub fn with_config(
        name: impl Into<String>,
        config: NodeConfig,
        behavior: Box<dyn BehaviorNode>,
    ) -> BtResult<Self> {
        let mut node = Self::build(name.into(), config, behavior);
        node.compile_conditions()?;
        Ok(node)
    }

    fn build(name: String, mut config: NodeConfig, behavior: Box<dyn BehaviorNode>) -> Self {
        let kind = behavior.kind();
        if config.manifest.is_none() {
            config.manifest = Some(Rc::new(NodeManifest {
                kind,
                registration_id: String::new(),
                ports: behavior.provided_ports(),
            }));
        }
        Self {
            core: NodeCore {
                name,
                registration_id: String::new(),
                kind,
                config,
                status: NodeStatus::Idle,
                wake_up: None,
                pre_scripts: vec![],
                post_scripts: HashMap::new(),
                listeners: vec![],
                next_listener: 0,
            },
            behavior,
            children: vec![],
            hooks: Hooks::default(),
        }
    }

    fn compile_conditions(&mut self) -> BtResult<()> {
        let scripts = self.core.config.scripts.clone();
        for cond in PreCond::ALL {
            match self.core.config.pre_conditions.get(&cond) {
                Some(source) if !source.trim().is_empty() => {
                    let script = scripts.get_or_parse(source)?;
                    self.core.pre_scripts.push((cond, script));
                }
                _ => (),
            }
        }
        for (cond, source) in &self.core.config.post_conditions {
            if !source.trim().is_empty() {
                let script = scripts.get_or_parse(source)?;
                self.core.post_scripts.insert(*cond, script);
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn registration_id(&self) -> &str {
        &self.core.registration_id
    }

    pub fn set_registration_id(&mut self, id: impl Into<String>) {
        self.core.registration_id = id.into();
    }

    pub fn display_name(&self) -> String {
        self.core.display_name()
    }

    pub fn kind(&self) -> NodeKind {
        self.core.kind
    }

    pub fn status(&self) -> NodeStatus {
        self.core.status
    }

    pub fn config(&self) -> &NodeConfig {
        &self.core.config
    }

    pub fn uid(&self) -> u32 {
        self.core.config.uid
    }

    pub fn path(&self) -> &str {
        &self.core.config.path
    }

    pub(crate) fn set_uid(&mut self, uid: u32) {
        self.core.config.uid = uid;
    }

    pub fn blackboard(&self) -> &Rc<Blackboard> {
        &self.core.config.blackboard
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [TreeNode] {
        &mut self.children
    }

    pub fn child(&self, index: usize) -> Option<&TreeNode> {
        self.children.get(index)
    }

    pub fn add_child(&mut self, child: TreeNode) -> BtResult<()> {
        if NumChildren::Finite(self.children.len()) < self.behavior.max_children() {
            self.children.push(child);
            Ok(())
        } else {
            Err(BehaviorError::TooManyNodes {
                node: self.display_name(),
            })
        }
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = TreeNode>) -> BtResult<Self> {
        for child in children {
            self.add_child(child)?;
        }
        Ok(self)
    }

    pub fn set_status(&mut self, status: NodeStatus) -> BtResult<()> {
        self.core.set_status(status)
    }

    pub fn reset_status(&mut self) {
        self.core.reset_status();
    }

    pub fn is_halted(&self) -> bool {
        self.core.status == NodeStatus::Idle
    }

    pub fn get_input<T: FromValue>(&self, key: &str) -> Option<T> {
        self.core.get_input(key)
    }

    pub fn get_input_or_err<T: FromValue>(&self, key: &str) -> BtResult<T> {
        self.core.get_input_or_err(key)
    }

    pub fn set_output(&self, key: &str, value: impl Into<Value>) -> BtResult<()> {
        self.core.set_output(key, value.into())
    }

    pub fn on_status_change(&mut self, listener: impl FnMut(&StatusChange) + 'static) -> ListenerId {
        let id = ListenerId(self.core.next_listener);
        self.core.next_listener += 1;
        self.core.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_status_listener(&mut self, id: ListenerId) -> bool {
        let before = self.core.listeners.len();
        self.core.listeners.retain(|(listener, _)| *listener != id);
        self.core.listeners.len() != before
    }

    pub fn set_pre_tick_function(&mut self, callback: impl FnMut(&TreeNode) -> NodeStatus + 'static) {
        self.hooks.pre_tick = Some(Box::new(callback));
    }

    pub fn set_post_tick_function(
        &mut self,
        callback: impl FnMut(&TreeNode) -> NodeStatus + 'static,
    ) {
        self.hooks.post_tick = Some(Box::new(callback));
    }

    pub fn set_tick_monitor(
        &mut self,
        monitor: impl FnMut(&TreeNode, NodeStatus, Duration) + 'static,
    ) {
        self.hooks.monitor = Some(Box::new(monitor));
    }

    pub fn set_wake_up_signal(&mut self, signal: WakeUpSignal) {
        self.core.wake_up = Some(signal);
    }

    pub fn requires_wake_up(&self) -> bool {
        self.core.wake_up.is_some()
    }

    pub fn emit_wake_up_signal(&self) {
        if let Some(signal) = &self.core.wake_up {
            signal.emit_signal();
        }
    }

    /// Runs one tick of this node, including condition scripts and injected callbacks.
    pub fn execute_tick(&mut self) -> BtResult<NodeStatus> {
        let previous = self.core.status;

        let status = match self.check_pre_conditions()? {
            Some(status) => status,
            None => match self.substitute_tick() {
                Some(status) => status,
                None => self.tick_behavior()?,
            },
        };

        let status = if status.is_completed() {
            self.check_post_conditions(status)?;
            self.override_result().unwrap_or(status)
        } else {
            status
        };

        if status == NodeStatus::Skipped {
            // A node that started during this tick and then skipped goes back to IDLE
            if !previous.is_active() && self.core.status.is_active() {
                self.core.reset_status();
            }
        } else {
            self.core.set_status(status)?;
        }
        Ok(status)
    }

    fn check_pre_conditions(&mut self) -> BtResult<Option<NodeStatus>> {
        for index in 0..self.core.pre_scripts.len() {
            let (cond, script) = self.core.pre_scripts[index].clone();
            let status = self.core.status;
            if !status.is_active() {
                let satisfied = self.core.run_script(&*script)?.is_truthy();
                let decided = match (cond, satisfied) {
                    (PreCond::FailureIf, true) => Some(NodeStatus::Failure),
                    (PreCond::SuccessIf, true) => Some(NodeStatus::Success),
                    (PreCond::SkipIf, true) => Some(NodeStatus::Skipped),
                    (PreCond::WhileTrue, false) => Some(NodeStatus::Skipped),
                    _ => None,
                };
                if decided.is_some() {
                    return Ok(decided);
                }
            } else if status == NodeStatus::Running
                && cond == PreCond::WhileTrue
                && !self.core.run_script(&*script)?.is_truthy()
            {
                self.halt_node();
                return Ok(Some(NodeStatus::Skipped));
            }
        }
        Ok(None)
    }

    fn substitute_tick(&mut self) -> Option<NodeStatus> {
        if self.core.status.is_completed() {
            return None;
        }
        let mut callback = self.hooks.pre_tick.take()?;
        let status = callback(self);
        self.hooks.pre_tick = Some(callback);
        if status.is_completed() {
            trace!(node = %self.core.name, %status, "tick substituted");
            Some(status)
        } else {
            None
        }
    }

    fn override_result(&mut self) -> Option<NodeStatus> {
        let mut callback = self.hooks.post_tick.take()?;
        let status = callback(self);
        self.hooks.post_tick = Some(callback);
        status.is_completed().then_some(status)
    }

    fn tick_behavior(&mut self) -> BtResult<NodeStatus> {
        let started = Instant::now();
        let status = {
            let mut ctx = Context::new(&mut self.core, &mut self.children);
            self.behavior.tick(&mut ctx)?
        };
        if let Some(mut monitor) = self.hooks.monitor.take() {
            monitor(self, status, started.elapsed());
            self.hooks.monitor = Some(monitor);
        }
        if status == NodeStatus::Idle {
            return Err(BehaviorError::IdleReturned {
                node: self.display_name(),
            });
        }
        Ok(status)
    }

    fn check_post_conditions(&mut self, status: NodeStatus) -> BtResult<()> {
        let specific = match status {
            NodeStatus::Success => Some(PostCond::OnSuccess),
            NodeStatus::Failure => Some(PostCond::OnFailure),
            _ => None,
        };
        for cond in specific.into_iter().chain([PostCond::Always]) {
            if let Some(script) = self.core.post_scripts.get(&cond).cloned() {
                self.core.run_script(&*script)?;
            }
        }
        Ok(())
    }

    /// Stops the node and its running descendants and leaves it `Idle`.
    /// Halting an idle node does nothing observable.
    pub fn halt_node(&mut self) {
        let was_running = self.core.status == NodeStatus::Running;
        if was_running {
            debug!(node = %self.core.name, uid = self.core.config.uid, "halt");
        }

        let mut ctx = Context::new(&mut self.core, &mut self.children);
        self.behavior.halt(&mut ctx);

        if was_running {
            if let Some(script) = self.core.post_scripts.get(&PostCond::OnHalted).cloned() {
                if let Err(error) = self.core.run_script(&*script) {
                    warn!(node = %self.core.name, %error, "_onHalted script failed");
                }
            }
        }
        self.core.reset_status();
    }

    /// Calls `visitor` on this node and every descendant, parents first.
    pub fn visit(&self, visitor: &mut impl FnMut(&TreeNode)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }

    pub fn visit_mut(&mut self, visitor: &mut impl FnMut(&mut TreeNode)) {
        visitor(self);
        for child in &mut self.children {
            child.visit_mut(visitor);
        }
    }
}

impl Debug for TreeNode {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.debug_struct("TreeNode")
            .field("name", &self.core.name)
            .field("kind", &self.core.kind)
            .field("status", &self.core.status)
            .field("children", &self.children)
            .finish()
    }
}
