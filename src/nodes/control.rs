//! Control nodes: composites with any number of children.

use crate::{
    error::{BehaviorError, BtResult},
    BehaviorNode, Context, NodeKind, NodeStatus, PortBinding, PortSpec, Value,
};
use std::collections::HashSet;

fn idle_child(ctx: &Context, index: usize) -> BehaviorError {
    BehaviorError::IdleReturned {
        node: ctx
            .child(index)
            .map_or_else(|| ctx.display_name(), |child| child.display_name()),
    }
}

/// Ticks its children in order until one fails.
///
/// The cursor is remembered across ticks, so a child that returned `Running`
/// is resumed without re-ticking the ones before it.
/// The asynchronous variant yields `Running` after every child that succeeded
/// in a single tick, so the tree loop gets a chance to run in between.
#[derive(Debug, Default)]
pub struct SequenceNode {
    asynch: bool,
    current: usize,
    all_skipped: bool,
}

impl SequenceNode {
    pub fn asynchronous() -> Self {
        Self {
            asynch: true,
            ..Self::default()
        }
    }
}

impl BehaviorNode for SequenceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if ctx.status() == NodeStatus::Idle {
            self.all_skipped = true;
        }
        ctx.set_status(NodeStatus::Running)?;

        let count = ctx.children_count();
        while self.current < count {
            let previous = ctx.child_status(self.current);
            let status = ctx.tick_child(self.current)?;
            self.all_skipped &= status == NodeStatus::Skipped;

            match status {
                NodeStatus::Running => return Ok(NodeStatus::Running),
                NodeStatus::Failure => {
                    ctx.halt_children();
                    self.current = 0;
                    return Ok(NodeStatus::Failure);
                }
                NodeStatus::Success => {
                    self.current += 1;
                    if self.asynch
                        && previous == NodeStatus::Idle
                        && ctx.requires_wake_up()
                        && self.current < count
                    {
                        ctx.emit_wake_up_signal();
                        return Ok(NodeStatus::Running);
                    }
                }
                NodeStatus::Skipped => self.current += 1,
                NodeStatus::Idle => return Err(idle_child(ctx, self.current)),
            }
        }

        ctx.halt_children();
        self.current = 0;
        Ok(if self.all_skipped {
            NodeStatus::Skipped
        } else {
            NodeStatus::Success
        })
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.current = 0;
        ctx.halt_children();
    }
}

/// Ticks its children in order until one succeeds.
#[derive(Debug, Default)]
pub struct FallbackNode {
    asynch: bool,
    current: usize,
    all_skipped: bool,
}

impl FallbackNode {
    pub fn asynchronous() -> Self {
        Self {
            asynch: true,
            ..Self::default()
        }
    }
}

impl BehaviorNode for FallbackNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if ctx.status() == NodeStatus::Idle {
            self.all_skipped = true;
        }
        ctx.set_status(NodeStatus::Running)?;

        let count = ctx.children_count();
        while self.current < count {
            let previous = ctx.child_status(self.current);
            let status = ctx.tick_child(self.current)?;
            self.all_skipped &= status == NodeStatus::Skipped;

            match status {
                NodeStatus::Running => return Ok(NodeStatus::Running),
                NodeStatus::Success => {
                    ctx.halt_children();
                    self.current = 0;
                    return Ok(NodeStatus::Success);
                }
                NodeStatus::Failure => {
                    self.current += 1;
                    if self.asynch
                        && previous == NodeStatus::Idle
                        && ctx.requires_wake_up()
                        && self.current < count
                    {
                        ctx.emit_wake_up_signal();
                        return Ok(NodeStatus::Running);
                    }
                }
                NodeStatus::Skipped => self.current += 1,
                NodeStatus::Idle => return Err(idle_child(ctx, self.current)),
            }
        }

        ctx.halt_children();
        self.current = 0;
        Ok(if self.all_skipped {
            NodeStatus::Skipped
        } else {
            NodeStatus::Failure
        })
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.current = 0;
        ctx.halt_children();
    }
}

/// Shared loop of the reactive composites. `breaking` is the status that ends
/// the loop early, `completed` is what is returned when every child went past it.
fn tick_reactive(
    running_child: &mut Option<usize>,
    ctx: &mut Context,
    breaking: NodeStatus,
    completed: NodeStatus,
    single_running: bool,
) -> BtResult<NodeStatus> {
    if ctx.status() == NodeStatus::Idle {
        *running_child = None;
    }
    ctx.set_status(NodeStatus::Running)?;

    let mut all_skipped = true;
    for index in 0..ctx.children_count() {
        let status = ctx.tick_child(index)?;
        all_skipped &= status == NodeStatus::Skipped;

        match status {
            NodeStatus::Running => {
                // The others go back to IDLE so that they restart on the next tick
                for other in (0..ctx.children_count()).filter(|other| *other != index) {
                    ctx.halt_child(other);
                }
                match *running_child {
                    None => *running_child = Some(index),
                    Some(tracked) if single_running && tracked != index => {
                        return Err(BehaviorError::MultipleRunningChildren {
                            node: ctx.display_name(),
                        });
                    }
                    Some(_) => (),
                }
                return Ok(NodeStatus::Running);
            }
            NodeStatus::Skipped => ctx.halt_child(index),
            NodeStatus::Idle => return Err(idle_child(ctx, index)),
            status if status == breaking => {
                ctx.halt_children();
                return Ok(breaking);
            }
            _ => (),
        }
    }

    ctx.halt_children();
    Ok(if all_skipped {
        NodeStatus::Skipped
    } else {
        completed
    })
}

/// A sequence that re-evaluates every child from the first one on each tick.
///
/// Useful to keep checking conditions while an asynchronous action is running.
#[derive(Debug, Default)]
pub struct ReactiveSequenceNode {
    running_child: Option<usize>,
}

impl BehaviorNode for ReactiveSequenceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let single_running = ctx.reactive_policy().sequence_single_running;
        tick_reactive(
            &mut self.running_child,
            ctx,
            NodeStatus::Failure,
            NodeStatus::Success,
            single_running,
        )
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.running_child = None;
        ctx.halt_children();
    }
}

#[derive(Debug, Default)]
pub struct ReactiveFallbackNode {
    running_child: Option<usize>,
}

impl BehaviorNode for ReactiveFallbackNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let single_running = ctx.reactive_policy().fallback_single_running;
        tick_reactive(
            &mut self.running_child,
            ctx,
            NodeStatus::Success,
            NodeStatus::Failure,
            single_running,
        )
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.running_child = None;
        ctx.halt_children();
    }
}

/// Ticks every child until all of them completed, then fails if at least
/// `maxFailures` of them failed.
///
/// A negative `maxFailures` counts from the number of children, so `-1` means
/// "all of them".
#[derive(Debug, Default)]
pub struct ParallelAllNode {
    completed: HashSet<usize>,
    failures: usize,
}

impl ParallelAllNode {
    fn failure_threshold(max_failures: i64, children: usize) -> usize {
        if max_failures < 0 {
            (children as i64 + max_failures + 1).max(0) as usize
        } else {
            max_failures as usize
        }
    }
}

impl BehaviorNode for ParallelAllNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("maxFailures")
            .with_default(1)
            .with_description(
                "If the number of children returning FAILURE exceeds this value, \
                 ParallelAll returns FAILURE",
            )]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let max_failures: i64 = ctx.get_input_or_err("maxFailures")?;
        let count = ctx.children_count();
        let threshold = Self::failure_threshold(max_failures, count);
        if count < threshold {
            return Err(BehaviorError::ThresholdExceedsChildren {
                node: ctx.display_name(),
                children: count,
                threshold,
            });
        }

        ctx.set_status(NodeStatus::Running)?;

        let mut skipped = 0;
        for index in 0..count {
            if self.completed.contains(&index) {
                continue;
            }
            match ctx.tick_child(index)? {
                NodeStatus::Success => {
                    self.completed.insert(index);
                }
                NodeStatus::Failure => {
                    self.completed.insert(index);
                    self.failures += 1;
                }
                NodeStatus::Skipped => skipped += 1,
                NodeStatus::Running => (),
                NodeStatus::Idle => return Err(idle_child(ctx, index)),
            }
        }

        if skipped == count {
            return Ok(NodeStatus::Skipped);
        }
        if skipped + self.completed.len() >= count {
            ctx.halt_children();
            self.completed.clear();
            let failures = std::mem::take(&mut self.failures);
            return Ok(if failures >= threshold {
                NodeStatus::Failure
            } else {
                NodeStatus::Success
            });
        }
        Ok(NodeStatus::Running)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.completed.clear();
        self.failures = 0;
        ctx.halt_children();
    }
}

/// `if` the first child succeeds, tick the second, `else` the third.
///
/// With only two children, a failed condition makes the node fail.
#[derive(Debug, Default)]
pub struct IfThenElseNode {
    branch: usize,
}

impl BehaviorNode for IfThenElseNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let count = ctx.children_count();
        if count != 2 && count != 3 {
            return Err(BehaviorError::WrongChildCount {
                node: ctx.display_name(),
                expected: "2 or 3".to_owned(),
                found: count,
            });
        }

        ctx.set_status(NodeStatus::Running)?;

        if self.branch == 0 {
            match ctx.tick_child(0)? {
                NodeStatus::Running => return Ok(NodeStatus::Running),
                NodeStatus::Success => self.branch = 1,
                NodeStatus::Failure if count == 3 => self.branch = 2,
                NodeStatus::Failure => {
                    ctx.halt_children();
                    return Ok(NodeStatus::Failure);
                }
                NodeStatus::Skipped => {
                    ctx.halt_children();
                    return Ok(NodeStatus::Skipped);
                }
                NodeStatus::Idle => return Err(idle_child(ctx, 0)),
            }
        }

        let status = ctx.tick_child(self.branch)?;
        if status == NodeStatus::Running {
            return Ok(NodeStatus::Running);
        }
        ctx.halt_children();
        self.branch = 0;
        Ok(status)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.branch = 0;
        ctx.halt_children();
    }
}

/// Picks the child whose `case_N` port equals `variable`, or the last child
/// as the default.
#[derive(Debug)]
pub struct SwitchNode {
    cases: usize,
    running_child: Option<usize>,
}

impl SwitchNode {
    pub fn new(cases: usize) -> Self {
        Self {
            cases,
            running_child: None,
        }
    }

    fn case_key(index: usize) -> String {
        format!("case_{}", index + 1)
    }

    /// Literals are typed through the enum table, references keep the blackboard value.
    fn port_value(ctx: &Context, key: &str) -> Option<Value> {
        match PortBinding::parse(ctx.input_port_str(key)?) {
            PortBinding::Literal(literal) => Some(Value::from_literal(literal, ctx.enums())),
            _ => ctx.get_input_value(key),
        }
    }

    fn matching_case(&self, ctx: &Context) -> usize {
        let Some(variable) = Self::port_value(ctx, "variable") else {
            return self.cases;
        };
        (0..self.cases)
            .find(|index| {
                Self::port_value(ctx, &Self::case_key(*index)).map_or(false, |value| value == variable)
            })
            .unwrap_or(self.cases)
    }
}

impl BehaviorNode for SwitchNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Control
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        std::iter::once(PortSpec::new_in("variable"))
            .chain((0..self.cases).map(|index| PortSpec::new_in(Self::case_key(index))))
            .collect()
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let count = ctx.children_count();
        if count != self.cases + 1 {
            return Err(BehaviorError::WrongChildCount {
                node: ctx.display_name(),
                expected: (self.cases + 1).to_string(),
                found: count,
            });
        }

        let selected = self.matching_case(ctx);
        if let Some(running) = self.running_child.filter(|running| *running != selected) {
            ctx.halt_child(running);
        }

        ctx.set_status(NodeStatus::Running)?;
        let status = ctx.tick_child(selected)?;
        match status {
            NodeStatus::Skipped => self.running_child = None,
            NodeStatus::Running => self.running_child = Some(selected),
            NodeStatus::Idle => return Err(idle_child(ctx, selected)),
            _ => {
                ctx.halt_children();
                self.running_child = None;
            }
        }
        Ok(status)
    }

    fn halt(&mut self, ctx: &mut Context) {
        self.running_child = None;
        ctx.halt_children();
    }
}
