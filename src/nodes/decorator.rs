//! Decorators: nodes with exactly one child that alter its result or when it runs.

use crate::{
    error::{BehaviorError, BtResult},
    wakeup::DeadlineTimer,
    BehaviorNode, Context, NodeKind, NodeStatus, PortBinding, PortSpec,
};
use std::{
    rc::Rc,
    time::{Duration, Instant},
};
use tracing::trace;

#[derive(Debug, Default)]
pub struct InverterNode;

impl BehaviorNode for InverterNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        ctx.set_status(NodeStatus::Running)?;
        Ok(match ctx.tick_child(0)? {
            NodeStatus::Success => {
                ctx.reset_child(0);
                NodeStatus::Failure
            }
            NodeStatus::Failure => {
                ctx.reset_child(0);
                NodeStatus::Success
            }
            status => status,
        })
    }
}

/// Turns a completed child into `forced`, passing `Running` and `Skipped` through.
fn force_status(ctx: &mut Context, forced: NodeStatus) -> BtResult<NodeStatus> {
    ctx.set_status(NodeStatus::Running)?;
    let status = ctx.tick_child(0)?;
    if status.is_completed() {
        ctx.reset_child(0);
        Ok(forced)
    } else {
        Ok(status)
    }
}

#[derive(Debug, Default)]
pub struct ForceSuccessNode;

impl BehaviorNode for ForceSuccessNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        force_status(ctx, NodeStatus::Success)
    }
}

#[derive(Debug, Default)]
pub struct ForceFailureNode;

impl BehaviorNode for ForceFailureNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        force_status(ctx, NodeStatus::Failure)
    }
}

/// Runs the child to completion once. Afterwards it returns `Skipped`, or the
/// remembered result if `thenSkip` is false.
#[derive(Debug, Default)]
pub struct RunOnceNode {
    returned: Option<NodeStatus>,
}

impl BehaviorNode for RunOnceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("thenSkip")
            .with_default(true)
            .with_description("If true, skip after the first execution, otherwise return the same status")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let skip = ctx.get_input("thenSkip").unwrap_or(true);
        if let Some(returned) = self.returned {
            return Ok(if skip { NodeStatus::Skipped } else { returned });
        }

        ctx.set_status(NodeStatus::Running)?;
        let status = ctx.tick_child(0)?;
        if status.is_completed() {
            self.returned = Some(status);
            ctx.reset_child(0);
        }
        Ok(status)
    }
}

fn start_timer(ctx: &Context, after: Duration) -> Option<DeadlineTimer> {
    ctx.wake_up_signal()
        .map(|signal| DeadlineTimer::start(after, signal.clone()))
}

/// Halts the child and fails if it is still running `ms` milliseconds after
/// the first tick.
#[derive(Debug, Default)]
pub struct TimeoutNode {
    deadline: Option<Instant>,
    timer: Option<DeadlineTimer>,
}

impl TimeoutNode {
    fn stop(&mut self) {
        self.deadline = None;
        self.timer = None;
    }
}

impl BehaviorNode for TimeoutNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("ms")
            .with_description("After a certain amount of time, halt() the child if it is still running.")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let deadline = match self.deadline {
            Some(deadline) => deadline,
            None => {
                let ms: u64 = ctx.get_input_or_err("ms")?;
                let after = Duration::from_millis(ms);
                ctx.set_status(NodeStatus::Running)?;
                if ms > 0 {
                    self.timer = start_timer(ctx, after);
                }
                let deadline = Instant::now() + after;
                self.deadline = Some(deadline);
                deadline
            }
        };

        if ctx.child_status(0) == NodeStatus::Running && Instant::now() >= deadline {
            trace!(node = %ctx.name(), "timeout expired");
            ctx.halt_child(0);
            self.stop();
            return Ok(NodeStatus::Failure);
        }

        let status = ctx.tick_child(0)?;
        if status.is_completed() {
            self.stop();
            ctx.reset_child(0);
        }
        Ok(status)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.stop();
        ctx.halt_children();
    }
}

/// Waits `ms` milliseconds before ticking the child for the first time.
#[derive(Debug, Default)]
pub struct DelayNode {
    start: Option<Instant>,
    timer: Option<DeadlineTimer>,
    delay_complete: bool,
}

impl BehaviorNode for DelayNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("ms")
            .with_description("Tick the child after a few milliseconds")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if !self.delay_complete {
            let ms: u64 = ctx.get_input_or_err("ms")?;
            let delay = Duration::from_millis(ms);
            let start = match self.start {
                Some(start) => start,
                None => {
                    ctx.set_status(NodeStatus::Running)?;
                    self.timer = start_timer(ctx, delay);
                    *self.start.insert(Instant::now())
                }
            };
            if start.elapsed() < delay {
                return Ok(NodeStatus::Running);
            }
            self.delay_complete = true;
            self.timer = None;
        }

        let status = ctx.tick_child(0)?;
        if status.is_completed() {
            self.start = None;
            self.delay_complete = false;
            ctx.reset_child(0);
        }
        Ok(status)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.start = None;
        self.timer = None;
        self.delay_complete = false;
        ctx.halt_children();
    }
}

/// The root of an instantiated subtree. It owns the subtree's root node as its
/// only child and forwards its status.
#[derive(Debug, Default)]
pub struct SubtreeNode {
    subtree_id: String,
}

impl SubtreeNode {
    pub fn new(subtree_id: impl Into<String>) -> Self {
        Self {
            subtree_id: subtree_id.into(),
        }
    }

    pub fn subtree_id(&self) -> &str {
        &self.subtree_id
    }
}

impl BehaviorNode for SubtreeNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Subtree
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if ctx.status() == NodeStatus::Idle {
            trace!(subtree = %self.subtree_id, node = %ctx.name(), "entering subtree");
            ctx.set_status(NodeStatus::Running)?;
        }
        let status = ctx.tick_child(0)?;
        if status.is_completed() {
            ctx.reset_child(0);
        }
        Ok(status)
    }
}

/// Ticks the child only if the `if` script holds, otherwise returns the status named by `else`.
#[derive(Debug, Default)]
pub struct PreconditionNode;

impl BehaviorNode for PreconditionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new_in("if"),
            PortSpec::new_in("else")
                .with_default("FAILURE")
                .with_description("Return status if condition is false"),
        ]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let script: String = ctx.get_input_or_err("if")?;
        let otherwise: NodeStatus = ctx.get_input_or_err("else")?;

        if ctx.child_status(0) == NodeStatus::Running || ctx.evaluate(&script)?.is_truthy() {
            let status = ctx.tick_child(0)?;
            if status.is_completed() {
                ctx.reset_child(0);
            }
            Ok(status)
        } else {
            Ok(otherwise)
        }
    }
}

/// Ticks the child only after the blackboard `entry` was written since the last
/// time it ran.
///
/// Otherwise it returns `Skipped` or `Running`, depending on how it was built.
#[derive(Debug)]
pub struct EntryUpdatedNode {
    if_not_updated: NodeStatus,
    sequence_id: u64,
    still_executing: bool,
}

impl EntryUpdatedNode {
    pub fn skip_unless_updated() -> Self {
        Self::new(NodeStatus::Skipped)
    }

    pub fn wait_value_update() -> Self {
        Self::new(NodeStatus::Running)
    }

    fn new(if_not_updated: NodeStatus) -> Self {
        Self {
            if_not_updated,
            sequence_id: 0,
            still_executing: false,
        }
    }

    fn entry_key<'a>(ctx: &'a Context) -> BtResult<&'a str> {
        let assigned = ctx
            .input_port_str("entry")
            .ok_or_else(|| BehaviorError::MissingPort {
                node: ctx.display_name(),
                port: "entry".to_owned(),
            })?;
        Ok(match PortBinding::parse(assigned) {
            PortBinding::Ref(key) => key,
            _ => assigned.trim(),
        })
    }
}

impl BehaviorNode for EntryUpdatedNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_inout("entry")
            .with_description("Entry to check, either as `{key}` or the bare key")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if !self.still_executing {
            let key = Self::entry_key(ctx)?;
            let Some(entry) = ctx.blackboard().get_entry(key) else {
                return Ok(self.if_not_updated);
            };
            let current = entry.borrow().sequence_id;
            if current == self.sequence_id {
                return Ok(self.if_not_updated);
            }
            self.sequence_id = current;
        }

        let status = ctx.tick_child(0)?;
        self.still_executing = status == NodeStatus::Running;
        Ok(status)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.still_executing = false;
        ctx.halt_children();
    }
}

pub(crate) type DecoratorFn = Rc<dyn Fn(NodeStatus, &mut Context) -> NodeStatus>;

/// A decorator defined by a closure receiving the child's status.
pub struct SimpleDecorator {
    body: DecoratorFn,
    ports: Vec<PortSpec>,
}

impl SimpleDecorator {
    pub fn new(
        body: impl Fn(NodeStatus, &mut Context) -> NodeStatus + 'static,
        ports: Vec<PortSpec>,
    ) -> Self {
        Self::from_rc(Rc::new(body), ports)
    }

    pub(crate) fn from_rc(body: DecoratorFn, ports: Vec<PortSpec>) -> Self {
        Self { body, ports }
    }
}

impl BehaviorNode for SimpleDecorator {
    fn kind(&self) -> NodeKind {
        NodeKind::Decorator
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        self.ports.clone()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let child_status = ctx.tick_child(0)?;
        let status = (self.body)(child_status, ctx);
        if ctx.child_status(0).is_completed() {
            ctx.reset_child(0);
        }
        Ok(status)
    }
}
