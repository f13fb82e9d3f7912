//! Instrumented nodes for tests.
//!
//! Each node hands out a [`TestProbe`] before being moved into a tree. The probe
//! shares the counters with the node, so they can be inspected and the result
//! can be changed while the tree runs.

use crate::{
    error::BtResult,
    nodes::{Stateful, StatefulAction},
    wakeup::DeadlineTimer,
    BehaviorNode, Context, NodeKind, NodeStatus,
};
use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

#[derive(Debug, Clone)]
pub struct TestProbe {
    ticks: Rc<Cell<usize>>,
    successes: Rc<Cell<usize>>,
    failures: Rc<Cell<usize>>,
    expected: Rc<Cell<NodeStatus>>,
}

impl TestProbe {
    fn new(expected: NodeStatus) -> Self {
        Self {
            ticks: Rc::default(),
            successes: Rc::default(),
            failures: Rc::default(),
            expected: Rc::new(Cell::new(expected)),
        }
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.get()
    }

    pub fn reset_tick_count(&self) {
        self.ticks.set(0);
    }

    pub fn success_count(&self) -> usize {
        self.successes.get()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.get()
    }

    pub fn set_expected_result(&self, status: NodeStatus) {
        self.expected.set(status);
    }

    fn record(&self, status: NodeStatus) -> NodeStatus {
        match status {
            NodeStatus::Success => self.successes.set(self.successes.get() + 1),
            NodeStatus::Failure => self.failures.set(self.failures.get() + 1),
            _ => (),
        }
        status
    }

    fn tick(&self) -> NodeStatus {
        self.ticks.set(self.ticks.get() + 1);
        self.record(self.expected.get())
    }
}

/// A synchronous action returning the expected result, `Success` by default.
#[derive(Debug)]
pub struct SyncActionTest {
    probe: TestProbe,
}

impl SyncActionTest {
    pub fn new(expected: NodeStatus) -> Self {
        Self {
            probe: TestProbe::new(expected),
        }
    }

    pub fn probe(&self) -> TestProbe {
        self.probe.clone()
    }
}

impl Default for SyncActionTest {
    fn default() -> Self {
        Self::new(NodeStatus::Success)
    }
}

impl BehaviorNode for SyncActionTest {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn tick(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        Ok(self.probe.tick())
    }
}

#[derive(Debug)]
pub struct ConditionTest {
    probe: TestProbe,
}

impl ConditionTest {
    pub fn new(expected: NodeStatus) -> Self {
        Self {
            probe: TestProbe::new(expected),
        }
    }

    pub fn probe(&self) -> TestProbe {
        self.probe.clone()
    }
}

impl Default for ConditionTest {
    fn default() -> Self {
        Self::new(NodeStatus::Success)
    }
}

impl BehaviorNode for ConditionTest {
    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    fn tick(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        Ok(self.probe.tick())
    }
}

/// An asynchronous action that stays `Running` for `duration` and then returns
/// the expected result. Ticks are only counted on start.
#[derive(Debug)]
pub struct AsyncActionTest {
    probe: TestProbe,
    duration: Duration,
    deadline: Option<Instant>,
    timer: Option<DeadlineTimer>,
    halts: Rc<Cell<usize>>,
}

impl AsyncActionTest {
    pub fn new(duration: Duration) -> Stateful<Self> {
        Stateful::new(Self {
            probe: TestProbe::new(NodeStatus::Success),
            duration,
            deadline: None,
            timer: None,
            halts: Rc::default(),
        })
    }

    pub fn probe(&self) -> TestProbe {
        self.probe.clone()
    }

    pub fn halt_count(&self) -> Rc<Cell<usize>> {
        self.halts.clone()
    }
}

impl StatefulAction for AsyncActionTest {
    fn on_start(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        self.probe.ticks.set(self.probe.ticks.get() + 1);
        self.deadline = Some(Instant::now() + self.duration);
        self.timer = ctx
            .wake_up_signal()
            .map(|signal| DeadlineTimer::start(self.duration, signal.clone()));
        Ok(NodeStatus::Running)
    }

    fn on_running(&mut self, _ctx: &mut Context) -> BtResult<NodeStatus> {
        match self.deadline {
            Some(deadline) if Instant::now() < deadline => Ok(NodeStatus::Running),
            _ => {
                self.deadline = None;
                self.timer = None;
                Ok(self.probe.record(self.probe.expected.get()))
            }
        }
    }

    fn on_halted(&mut self, _ctx: &mut Context) {
        self.deadline = None;
        self.timer = None;
        self.halts.set(self.halts.get() + 1);
    }
}

impl Stateful<AsyncActionTest> {
    pub fn probe(&self) -> TestProbe {
        self.0.probe()
    }

    pub fn halt_count(&self) -> Rc<Cell<usize>> {
        self.0.halt_count()
    }
}
