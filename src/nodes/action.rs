//! Leaf nodes: actions and conditions.

use crate::{
    error::{BehaviorError, BtResult},
    wakeup::DeadlineTimer,
    BehaviorNode, Context, NodeKind, NodeStatus, PortBinding, PortSpec, Value,
};
use serde::{Deserialize, Serialize};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread,
    time::Duration,
};
use tracing::debug;

#[derive(Debug, Default)]
pub struct AlwaysSuccessNode;

impl BehaviorNode for AlwaysSuccessNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn tick(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        Ok(NodeStatus::Success)
    }
}

#[derive(Debug, Default)]
pub struct AlwaysFailureNode;

impl BehaviorNode for AlwaysFailureNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn tick(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        Ok(NodeStatus::Failure)
    }
}

/// Writes `value` into the entry bound to `key`.
///
/// If `value` is itself a `{reference}`, the referenced entry is copied together
/// with its port information.
#[derive(Debug, Default)]
pub struct SetBlackboardNode;

impl BehaviorNode for SetBlackboardNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new_in("value")
                .with_description("Value to be written into the output_key"),
            PortSpec::new_inout("key")
                .with_description("Name of the blackboard entry where the value should be written"),
        ]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let key: String = ctx.get_input_or_err("key")?;
        let assigned = ctx
            .input_port_str("value")
            .ok_or_else(|| BehaviorError::MissingPort {
                node: ctx.display_name(),
                port: "value".to_owned(),
            })?;

        match PortBinding::parse(assigned).key("value") {
            Some(source_key) => {
                let blackboard = ctx.blackboard();
                let source = blackboard.get_entry(source_key).ok_or_else(|| {
                    BehaviorError::InvalidPortValue {
                        node: ctx.display_name(),
                        port: "value".to_owned(),
                        value: assigned.to_owned(),
                    }
                })?;
                let (info, value) = {
                    let source = source.borrow();
                    (source.info.clone(), source.value.clone())
                };
                let destination = blackboard.create_entry(&key, &info)?;
                if !Rc::ptr_eq(&source, &destination) {
                    if let Some(value) = value {
                        destination.borrow_mut().set(value);
                    }
                }
            }
            None => {
                let value = Value::from_literal(assigned, ctx.enums());
                ctx.blackboard().set(&key, value)?;
            }
        }
        Ok(NodeStatus::Success)
    }
}

/// Removes the entry `key` from the node's blackboard.
#[derive(Debug, Default)]
pub struct UnsetBlackboardNode;

impl BehaviorNode for UnsetBlackboardNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("key").with_description("Key of the entry to remove")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let key: String = ctx.get_input_or_err("key")?;
        ctx.blackboard().unset(&key);
        Ok(NodeStatus::Success)
    }
}

/// Runs the script in `code` and succeeds.
#[derive(Debug, Default)]
pub struct ScriptNode;

impl BehaviorNode for ScriptNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("code").with_description("Piece of code that can be parsed")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let code: String = ctx.get_input_or_err("code")?;
        ctx.evaluate(&code)?;
        Ok(NodeStatus::Success)
    }
}

/// Succeeds if the boolean `condition` port holds.
#[derive(Debug, Default)]
pub struct AssertNode;

impl BehaviorNode for AssertNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("condition")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let condition: bool = ctx.get_input_or_err("condition")?;
        Ok(if condition {
            NodeStatus::Success
        } else {
            NodeStatus::Failure
        })
    }
}

pub(crate) type ActionFn = Rc<dyn Fn(&mut Context) -> BtResult<NodeStatus>>;

/// A synchronous action defined by a closure.
///
/// The closure must complete within the tick: returning `Running` is an error.
pub struct SimpleAction {
    body: ActionFn,
    ports: Vec<PortSpec>,
}

impl SimpleAction {
    pub fn new(
        body: impl Fn(&mut Context) -> BtResult<NodeStatus> + 'static,
        ports: Vec<PortSpec>,
    ) -> Self {
        Self::from_rc(Rc::new(body), ports)
    }

    pub(crate) fn from_rc(body: ActionFn, ports: Vec<PortSpec>) -> Self {
        Self { body, ports }
    }
}

impl BehaviorNode for SimpleAction {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        self.ports.clone()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if ctx.status() == NodeStatus::Idle {
            ctx.set_status(NodeStatus::Running)?;
        }
        let status = (self.body)(ctx)?;
        if status == NodeStatus::Running {
            return Err(BehaviorError::SyncActionRunning {
                node: ctx.display_name(),
            });
        }
        Ok(status)
    }
}

/// A condition defined by a closure.
pub struct SimpleCondition {
    body: ActionFn,
    ports: Vec<PortSpec>,
}

impl SimpleCondition {
    pub fn new(
        body: impl Fn(&mut Context) -> BtResult<NodeStatus> + 'static,
        ports: Vec<PortSpec>,
    ) -> Self {
        Self::from_rc(Rc::new(body), ports)
    }

    pub(crate) fn from_rc(body: ActionFn, ports: Vec<PortSpec>) -> Self {
        Self { body, ports }
    }
}

impl BehaviorNode for SimpleCondition {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        self.ports.clone()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let status = (self.body)(ctx)?;
        if status == NodeStatus::Running {
            return Err(BehaviorError::SyncActionRunning {
                node: ctx.display_name(),
            });
        }
        Ok(status)
    }
}

/// An asynchronous action split into a start, a poll and a cancel step.
///
/// Wrap it in [`Stateful`] to get a [`BehaviorNode`].
pub trait StatefulAction {
    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![]
    }

    /// Called on the first tick. Returning `Running` makes the node asynchronous.
    fn on_start(&mut self, ctx: &mut Context) -> BtResult<NodeStatus>;

    /// Called on every following tick while the node is `Running`.
    fn on_running(&mut self, ctx: &mut Context) -> BtResult<NodeStatus>;

    /// Called when a running node is halted.
    fn on_halted(&mut self, _ctx: &mut Context) {}
}

#[derive(Debug, Default)]
pub struct Stateful<T>(pub T);

impl<T> Stateful<T> {
    pub fn new(action: T) -> Self {
        Self(action)
    }
}

impl<T: StatefulAction> BehaviorNode for Stateful<T> {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        self.0.provided_ports()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        match ctx.status() {
            NodeStatus::Idle => {
                let status = self.0.on_start(ctx)?;
                if status == NodeStatus::Idle {
                    return Err(BehaviorError::IdleReturned {
                        node: ctx.display_name(),
                    });
                }
                Ok(status)
            }
            NodeStatus::Running => {
                let status = self.0.on_running(ctx)?;
                if status == NodeStatus::Idle {
                    return Err(BehaviorError::IdleReturned {
                        node: ctx.display_name(),
                    });
                }
                Ok(status)
            }
            status => Ok(status),
        }
    }

    fn halt(&mut self, ctx: &mut Context) {
        if ctx.status() == NodeStatus::Running {
            self.0.on_halted(ctx);
        }
    }
}

/// Returns `Running` for `ms` milliseconds, then `Success`.
#[derive(Debug, Default)]
pub struct SleepAction {
    timer: Option<DeadlineTimer>,
    deadline: Option<std::time::Instant>,
}

impl StatefulAction for SleepAction {
    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("ms")]
    }

    fn on_start(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let ms: u64 = ctx.get_input_or_err("ms")?;
        if ms == 0 {
            return Ok(NodeStatus::Success);
        }
        let after = Duration::from_millis(ms);
        self.deadline = Some(std::time::Instant::now() + after);
        self.timer = ctx
            .wake_up_signal()
            .map(|signal| DeadlineTimer::start(after, signal.clone()));
        Ok(NodeStatus::Running)
    }

    fn on_running(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        match self.deadline {
            Some(deadline) if std::time::Instant::now() < deadline => Ok(NodeStatus::Running),
            _ => {
                self.deadline = None;
                self.timer = None;
                Ok(NodeStatus::Success)
            }
        }
    }

    fn on_halted(&mut self, _ctx: &mut Context) {
        self.deadline = None;
        self.timer = None;
    }
}

pub(crate) type ThreadedFn =
    Arc<dyn Fn(&AtomicBool) -> Result<NodeStatus, String> + Send + Sync>;

type Slot = Arc<Mutex<Option<Result<NodeStatus, String>>>>;

/// An action whose body runs on a background thread.
///
/// The body receives a flag that is raised when the node is halted and should
/// return as soon as it sees it. Errors and panics in the body surface as
/// [`BehaviorError::AsyncActionFailed`] on the next tick.
pub struct ThreadedAction {
    body: ThreadedFn,
    ports: Vec<PortSpec>,
    halt_requested: Arc<AtomicBool>,
    result: Option<Slot>,
}

impl ThreadedAction {
    pub fn new(
        body: impl Fn(&AtomicBool) -> Result<NodeStatus, String> + Send + Sync + 'static,
        ports: Vec<PortSpec>,
    ) -> Self {
        Self::from_arc(Arc::new(body), ports)
    }

    pub(crate) fn from_arc(body: ThreadedFn, ports: Vec<PortSpec>) -> Self {
        Self {
            body,
            ports,
            halt_requested: Arc::new(AtomicBool::new(false)),
            result: None,
        }
    }

    fn spawn(&mut self, ctx: &Context) {
        let halt_requested = Arc::new(AtomicBool::new(false));
        let slot: Slot = Arc::default();
        let body = self.body.clone();
        let thread_halt = halt_requested.clone();
        let thread_slot = slot.clone();
        let signal = ctx.wake_up_signal().cloned();
        thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| body(&thread_halt)))
                .unwrap_or_else(|_| Err("panicked".to_owned()));
            *thread_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            if let Some(signal) = signal {
                signal.emit_signal();
            }
        });
        self.halt_requested = halt_requested;
        self.result = Some(slot);
    }

    fn poll(&mut self, ctx: &Context) -> BtResult<NodeStatus> {
        let Some(slot) = &self.result else {
            return Ok(NodeStatus::Running);
        };
        let finished = slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match finished {
            None => Ok(NodeStatus::Running),
            Some(result) => {
                self.result = None;
                match result {
                    Ok(NodeStatus::Idle | NodeStatus::Running) => {
                        Err(BehaviorError::AsyncActionFailed {
                            node: ctx.display_name(),
                            message: "the body must return a completed status".to_owned(),
                        })
                    }
                    Ok(status) => Ok(status),
                    Err(message) => Err(BehaviorError::AsyncActionFailed {
                        node: ctx.display_name(),
                        message,
                    }),
                }
            }
        }
    }
}

impl BehaviorNode for ThreadedAction {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        self.ports.clone()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if ctx.status() == NodeStatus::Idle {
            ctx.set_status(NodeStatus::Running)?;
            self.spawn(ctx);
        }
        self.poll(ctx)
    }

    fn halt(&mut self, ctx: &mut Context) {
        if self.result.take().is_some() {
            debug!(node = %ctx.name(), "requesting halt of threaded action");
            self.halt_requested.store(true, Ordering::SeqCst);
        }
    }
}

/// Settings of [`TestNode`], typically loaded from the `test_node_configs`
/// section of a substitution file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestNodeConfig {
    /// Status returned when the node completes
    pub return_status: NodeStatus,
    /// Script run when the node succeeds
    pub success_script: String,
    /// Script run when the node fails
    pub failure_script: String,
    /// Script run after either of them
    pub post_script: String,
    /// If non-zero, the node is asynchronous and completes after this many milliseconds
    pub async_delay: u64,
}

impl Default for TestNodeConfig {
    fn default() -> Self {
        Self {
            return_status: NodeStatus::Success,
            success_script: String::new(),
            failure_script: String::new(),
            post_script: String::new(),
            async_delay: 0,
        }
    }
}

/// A stand-in node used to substitute real ones in tests, configured by a [`TestNodeConfig`].
#[derive(Debug)]
pub struct TestNode {
    config: TestNodeConfig,
    sleep: SleepAction,
}

impl TestNode {
    pub fn new(config: TestNodeConfig) -> Self {
        Self {
            config,
            sleep: SleepAction::default(),
        }
    }

    fn complete(&self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let status = self.config.return_status;
        let script = match status {
            NodeStatus::Success => &self.config.success_script,
            NodeStatus::Failure => &self.config.failure_script,
            _ => return Ok(status),
        };
        for script in [script, &self.config.post_script] {
            if !script.trim().is_empty() {
                ctx.evaluate(script)?;
            }
        }
        Ok(status)
    }
}

impl StatefulAction for TestNode {
    fn on_start(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if self.config.async_delay == 0 {
            return self.complete(ctx);
        }
        let after = Duration::from_millis(self.config.async_delay);
        self.sleep.deadline = Some(std::time::Instant::now() + after);
        self.sleep.timer = ctx
            .wake_up_signal()
            .map(|signal| DeadlineTimer::start(after, signal.clone()));
        Ok(NodeStatus::Running)
    }

    fn on_running(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        match self.sleep.on_running(ctx)? {
            NodeStatus::Running => Ok(NodeStatus::Running),
            _ => self.complete(ctx),
        }
    }

    fn on_halted(&mut self, ctx: &mut Context) {
        self.sleep.on_halted(ctx);
    }
}
