use super::*;
use crate::{
    error::BehaviorError,
    testing::{AsyncActionTest, ConditionTest, SyncActionTest, TestProbe},
    BehaviorNode, Blackboard, NodeConfig, NodeStatus, TreeNode, Value,
};
use std::{rc::Rc, thread::sleep, time::Duration};

fn sync(name: &str, expected: NodeStatus) -> (TreeNode, TestProbe) {
    let action = SyncActionTest::new(expected);
    let probe = action.probe();
    (TreeNode::new(name, action), probe)
}

fn condition(name: &str, expected: NodeStatus) -> (TreeNode, TestProbe) {
    let cond = ConditionTest::new(expected);
    let probe = cond.probe();
    (TreeNode::new(name, cond), probe)
}

fn parent(name: &str, behavior: impl BehaviorNode + 'static, children: Vec<TreeNode>) -> TreeNode {
    TreeNode::new(name, behavior).with_children(children).unwrap()
}

fn with_ports(name: &str, behavior: impl BehaviorNode + 'static, ports: &[(&str, &str)]) -> TreeNode {
    with_ports_on(&Blackboard::create(None), name, behavior, ports)
}

fn with_ports_on(
    blackboard: &Rc<Blackboard>,
    name: &str,
    behavior: impl BehaviorNode + 'static,
    ports: &[(&str, &str)],
) -> TreeNode {
    let config = ports
        .iter()
        .fold(NodeConfig::with_blackboard(blackboard.clone()), |config, (port, value)| {
            config.input(*port, *value)
        });
    TreeNode::with_config(name, config, Box::new(behavior)).unwrap()
}

#[test]
fn test_sequence() {
    let (a, probe_a) = sync("a", NodeStatus::Success);
    let (b, probe_b) = sync("b", NodeStatus::Success);
    let (c, probe_c) = sync("c", NodeStatus::Success);
    let mut seq = parent("seq", SequenceNode::default(), vec![a, b, c]);

    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Success);
    for probe in [&probe_a, &probe_b, &probe_c] {
        assert_eq!(probe.tick_count(), 1);
    }
    // Children are reset once the sequence completes
    assert!(seq.children().iter().all(TreeNode::is_halted));
}

#[test]
fn test_sequence_failure() {
    let (a, probe_a) = sync("a", NodeStatus::Success);
    let (b, _) = sync("b", NodeStatus::Failure);
    let (c, probe_c) = sync("c", NodeStatus::Success);
    let mut seq = parent("seq", SequenceNode::default(), vec![a, b, c]);

    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(probe_c.tick_count(), 0);

    // The cursor starts over after a failure
    seq.reset_status();
    seq.execute_tick().unwrap();
    assert_eq!(probe_a.tick_count(), 2);
}

#[test]
fn test_sequence_resumes_running_child() {
    let (a, probe_a) = sync("a", NodeStatus::Success);
    let waiting = AsyncActionTest::new(Duration::from_millis(50));
    let waiting_probe = waiting.probe();
    let (c, probe_c) = sync("c", NodeStatus::Success);
    let mut seq = parent(
        "seq",
        SequenceNode::default(),
        vec![a, TreeNode::new("wait", waiting), c],
    );

    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(probe_a.tick_count(), 1);
    assert_eq!(probe_c.tick_count(), 0);

    sleep(Duration::from_millis(60));
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(probe_a.tick_count(), 1);
    assert_eq!(waiting_probe.tick_count(), 1);
    assert_eq!(probe_c.tick_count(), 1);
}

#[test]
fn test_sequence_all_skipped() {
    let config = NodeConfig::default().pre_condition(crate::PreCond::SkipIf, "true");
    let skipped = TreeNode::with_config("skipped", config, Box::new(AlwaysFailureNode)).unwrap();
    let mut seq = parent("seq", SequenceNode::default(), vec![skipped]);
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Skipped);
    assert_eq!(seq.status(), NodeStatus::Idle);
}

#[test]
fn test_fallback() {
    let (a, probe_a) = sync("a", NodeStatus::Failure);
    let (b, probe_b) = sync("b", NodeStatus::Failure);
    let (c, probe_c) = sync("c", NodeStatus::Success);
    let mut fallback = parent("fallback", FallbackNode::default(), vec![a, b, c]);

    assert_eq!(fallback.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(probe_a.failure_count(), 1);
    assert_eq!(probe_b.failure_count(), 1);
    assert_eq!(probe_c.success_count(), 1);
    assert!(fallback.children().iter().all(TreeNode::is_halted));

    probe_c.set_expected_result(NodeStatus::Failure);
    fallback.reset_status();
    assert_eq!(fallback.execute_tick().unwrap(), NodeStatus::Failure);
}

#[test]
fn test_reactive_sequence_restarts_conditions() {
    let (check, check_probe) = condition("check", NodeStatus::Success);
    let waiting = AsyncActionTest::new(Duration::from_secs(10));
    let halts = waiting.halt_count();
    let mut seq = parent(
        "reactive",
        ReactiveSequenceNode::default(),
        vec![check, TreeNode::new("wait", waiting)],
    );

    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(check_probe.tick_count(), 2);

    // A failing condition halts the running action
    check_probe.set_expected_result(NodeStatus::Failure);
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(halts.get(), 1);
    assert!(seq.children().iter().all(TreeNode::is_halted));
}

#[test]
fn test_reactive_fallback() {
    let (check, check_probe) = condition("check", NodeStatus::Failure);
    let waiting = AsyncActionTest::new(Duration::from_secs(10));
    let halts = waiting.halt_count();
    let mut fallback = parent(
        "reactive",
        ReactiveFallbackNode::default(),
        vec![check, TreeNode::new("wait", waiting)],
    );

    assert_eq!(fallback.execute_tick().unwrap(), NodeStatus::Running);
    check_probe.set_expected_result(NodeStatus::Success);
    assert_eq!(fallback.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(halts.get(), 1);
}

#[test]
fn test_reactive_two_running_children() {
    let first = AsyncActionTest::new(Duration::ZERO);
    let mut seq = parent(
        "reactive",
        ReactiveSequenceNode::default(),
        vec![
            TreeNode::new("first", first),
            TreeNode::new("second", AsyncActionTest::new(Duration::from_secs(10))),
        ],
    );

    // First tick: "first" is running
    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Running);
    // Second tick: "first" succeeds, then "second" reports RUNNING as another child
    assert!(matches!(
        seq.execute_tick(),
        Err(BehaviorError::MultipleRunningChildren { .. })
    ));
}

#[test]
fn test_parallel_all() {
    let (a, _) = sync("a", NodeStatus::Failure);
    let (b, _) = sync("b", NodeStatus::Success);
    let waiting = TreeNode::new("wait", AsyncActionTest::new(Duration::ZERO));
    let mut parallel = parent("parallel", ParallelAllNode::default(), vec![a, b, waiting]);

    // Uses the default maxFailures = 1
    assert_eq!(parallel.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(parallel.execute_tick().unwrap(), NodeStatus::Failure);

    let children = |first: NodeStatus| {
        [
            sync("a", first).0,
            sync("b", NodeStatus::Success).0,
            sync("c", NodeStatus::Success).0,
        ]
    };
    let mut parallel = with_ports("parallel", ParallelAllNode::default(), &[("maxFailures", "1")])
        .with_children(children(NodeStatus::Success))
        .unwrap();
    assert_eq!(parallel.execute_tick().unwrap(), NodeStatus::Success);
    let mut parallel = with_ports("parallel", ParallelAllNode::default(), &[("maxFailures", "1")])
        .with_children(children(NodeStatus::Failure))
        .unwrap();
    assert_eq!(parallel.execute_tick().unwrap(), NodeStatus::Failure);

    let (a, _) = sync("a", NodeStatus::Failure);
    let (b, _) = sync("b", NodeStatus::Success);
    let mut parallel = with_ports("parallel", ParallelAllNode::default(), &[("maxFailures", "-1")])
        .with_children([a, b])
        .unwrap();
    assert_eq!(parallel.execute_tick().unwrap(), NodeStatus::Success);

    let mut parallel = with_ports("parallel", ParallelAllNode::default(), &[("maxFailures", "3")])
        .with_children([sync("a", NodeStatus::Success).0])
        .unwrap();
    assert!(matches!(
        parallel.execute_tick(),
        Err(BehaviorError::ThresholdExceedsChildren { .. })
    ));
}

#[test]
fn test_if_then_else() {
    let (cond, cond_probe) = condition("cond", NodeStatus::Success);
    let (then, then_probe) = sync("then", NodeStatus::Success);
    let (otherwise, else_probe) = sync("else", NodeStatus::Failure);
    let mut node = parent("if", IfThenElseNode::default(), vec![cond, then, otherwise]);

    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(then_probe.tick_count(), 1);

    cond_probe.set_expected_result(NodeStatus::Failure);
    node.reset_status();
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(else_probe.tick_count(), 1);

    let (cond, _) = condition("cond", NodeStatus::Success);
    let mut node = parent("if", IfThenElseNode::default(), vec![cond]);
    assert!(matches!(
        node.execute_tick(),
        Err(BehaviorError::WrongChildCount { .. })
    ));
}

#[test]
fn test_switch() {
    let children = |probes: &mut Vec<TestProbe>| {
        (0..3)
            .map(|i| {
                let (node, probe) = sync(&format!("child{i}"), NodeStatus::Success);
                probes.push(probe);
                node
            })
            .collect::<Vec<_>>()
    };

    let mut probes = vec![];
    let mut switch = with_ports(
        "switch",
        SwitchNode::new(2),
        &[("variable", "{state}"), ("case_1", "1"), ("case_2", "green")],
    )
    .with_children(children(&mut probes))
    .unwrap();

    switch.blackboard().set("state", "green").unwrap();
    assert_eq!(switch.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(probes[1].tick_count(), 1);

    switch.blackboard().set("state", 1).unwrap();
    switch.reset_status();
    switch.execute_tick().unwrap();
    assert_eq!(probes[0].tick_count(), 1);

    // No case matches: the default branch
    switch.blackboard().set("state", "red").unwrap();
    switch.reset_status();
    switch.execute_tick().unwrap();
    assert_eq!(probes[2].tick_count(), 1);

    // Values of different types never match, even if they print the same
    switch.blackboard().set("state", "1").unwrap();
    switch.reset_status();
    switch.execute_tick().unwrap();
    assert_eq!(probes[0].tick_count(), 1);
    assert_eq!(probes[2].tick_count(), 2);
}

fn waiting() -> (TreeNode, Rc<std::cell::Cell<usize>>) {
    let action = AsyncActionTest::new(Duration::from_secs(10));
    let halts = action.halt_count();
    (TreeNode::new("wait", action), halts)
}

#[test]
fn test_halt_composites_twice() {
    let mut composites = vec![];

    let (wait, halts) = waiting();
    let children = vec![TreeNode::new("first", AlwaysSuccessNode), wait];
    composites.push((parent("sequence", SequenceNode::default(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![TreeNode::new("first", AlwaysSuccessNode), wait];
    composites.push((parent("async_sequence", SequenceNode::asynchronous(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![TreeNode::new("first", AlwaysFailureNode), wait];
    composites.push((parent("fallback", FallbackNode::default(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![condition("check", NodeStatus::Success).0, wait];
    composites.push((parent("reactive_sequence", ReactiveSequenceNode::default(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![condition("check", NodeStatus::Failure).0, wait];
    composites.push((parent("reactive_fallback", ReactiveFallbackNode::default(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![wait, TreeNode::new("other", AlwaysSuccessNode)];
    composites.push((parent("parallel", ParallelAllNode::default(), children), halts));

    let (wait, halts) = waiting();
    let children = vec![
        condition("check", NodeStatus::Success).0,
        wait,
        TreeNode::new("otherwise", AlwaysSuccessNode),
    ];
    composites.push((parent("if", IfThenElseNode::default(), children), halts));

    let (wait, halts) = waiting();
    let switch = with_ports("switch", SwitchNode::new(1), &[("variable", "{unset}"), ("case_1", "1")])
        .with_children([TreeNode::new("case", AlwaysSuccessNode), wait])
        .unwrap();
    composites.push((switch, halts));

    for (mut node, halts) in composites {
        let waiting_started = |node: &TreeNode| {
            node.children()
                .iter()
                .any(|child| child.name() == "wait" && child.status() == NodeStatus::Running)
        };
        // The asynchronous sequence yields once after its first child
        for _ in 0..2 {
            if !waiting_started(&node) {
                assert_eq!(node.execute_tick().unwrap(), NodeStatus::Running);
            }
        }
        assert!(waiting_started(&node), "{} never started waiting", node.name());

        for _ in 0..2 {
            node.halt_node();
            let mut statuses = vec![];
            node.visit(&mut |node| statuses.push(node.status()));
            assert!(
                statuses.iter().all(|status| *status == NodeStatus::Idle),
                "{} left {statuses:?}",
                node.name()
            );
            assert_eq!(halts.get(), 1, "{}", node.name());
        }
    }
}

#[test]
fn test_inverter_and_force() {
    let (child, _) = sync("child", NodeStatus::Success);
    let mut inverter = parent("inverter", InverterNode, vec![child]);
    assert_eq!(inverter.execute_tick().unwrap(), NodeStatus::Failure);
    assert!(inverter.children()[0].is_halted());

    let (child, _) = sync("child", NodeStatus::Failure);
    let mut force = parent("force", ForceSuccessNode, vec![child]);
    assert_eq!(force.execute_tick().unwrap(), NodeStatus::Success);

    let (child, _) = sync("child", NodeStatus::Success);
    let mut force = parent("force", ForceFailureNode, vec![child]);
    assert_eq!(force.execute_tick().unwrap(), NodeStatus::Failure);
}

#[test]
fn test_run_once() {
    let (child, probe) = sync("child", NodeStatus::Failure);
    let mut once = parent("once", RunOnceNode::default(), vec![child]);
    assert_eq!(once.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(once.execute_tick().unwrap(), NodeStatus::Skipped);
    assert_eq!(probe.tick_count(), 1);

    let (child, probe) = sync("child", NodeStatus::Failure);
    let mut once = with_ports("once", RunOnceNode::default(), &[("thenSkip", "false")])
        .with_children([child])
        .unwrap();
    once.execute_tick().unwrap();
    once.reset_status();
    assert_eq!(once.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(probe.tick_count(), 1);
}

#[test]
fn test_timeout() {
    let waiting = AsyncActionTest::new(Duration::from_millis(300));
    let halts = waiting.halt_count();
    let mut timeout = with_ports("timeout", TimeoutNode::default(), &[("ms", "20")])
        .with_children([TreeNode::new("wait", waiting)])
        .unwrap();

    assert_eq!(timeout.execute_tick().unwrap(), NodeStatus::Running);
    sleep(Duration::from_millis(40));
    assert_eq!(timeout.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(halts.get(), 1);
    assert!(timeout.children()[0].is_halted());
}

#[test]
fn test_delay() {
    let (child, probe) = sync("child", NodeStatus::Success);
    let mut delay = with_ports("delay", DelayNode::default(), &[("ms", "20")])
        .with_children([child])
        .unwrap();

    assert_eq!(delay.execute_tick().unwrap(), NodeStatus::Running);
    assert_eq!(probe.tick_count(), 0);
    sleep(Duration::from_millis(30));
    assert_eq!(delay.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(probe.tick_count(), 1);
}

#[test]
fn test_precondition() {
    let (child, probe) = sync("child", NodeStatus::Success);
    let mut node = with_ports(
        "guard",
        PreconditionNode,
        &[("if", "armed == true"), ("else", "SKIPPED")],
    )
    .with_children([child])
    .unwrap();

    node.blackboard().set("armed", false).unwrap();
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Skipped);
    assert_eq!(probe.tick_count(), 0);

    node.blackboard().set("armed", true).unwrap();
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(probe.tick_count(), 1);
}

#[test]
fn test_skip_unless_updated() {
    let (child, probe) = sync("child", NodeStatus::Success);
    let mut node = with_ports(
        "updated",
        EntryUpdatedNode::skip_unless_updated(),
        &[("entry", "{goal}")],
    )
    .with_children([child])
    .unwrap();

    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Skipped);
    node.blackboard().set("goal", 1).unwrap();
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
    node.reset_status();
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Skipped);
    assert_eq!(probe.tick_count(), 1);
}

#[test]
fn test_set_blackboard_and_assert() {
    let blackboard = Blackboard::create(None);
    let set = with_ports_on(&blackboard, "set", SetBlackboardNode, &[("value", "42"), ("key", "answer")]);
    let copy = with_ports_on(
        &blackboard,
        "copy",
        SetBlackboardNode,
        &[("value", "{answer}"), ("key", "copied")],
    );
    let check = with_ports_on(&blackboard, "check", AssertNode, &[("condition", "{copied}")]);
    let mut seq = parent("seq", SequenceNode::default(), vec![set, copy, check]);

    assert_eq!(seq.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(blackboard.get("answer"), Some(Value::Int(42)));
    assert_eq!(blackboard.get("copied"), Some(Value::Int(42)));

    // Copies are independent entries
    blackboard.set("answer", 0).unwrap();
    assert_eq!(blackboard.get("copied"), Some(Value::Int(42)));
}

#[test]
fn test_script_and_unset() {
    let script = with_ports("script", ScriptNode, &[("code", "count := 3; count *= 2")]);
    let blackboard = script.blackboard().clone();
    let mut script = script;
    assert_eq!(script.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(blackboard.get("count"), Some(Value::Int(6)));

    let config = NodeConfig::with_blackboard(blackboard.clone()).input("key", "count");
    let mut unset = TreeNode::with_config("unset", config, Box::new(UnsetBlackboardNode)).unwrap();
    assert_eq!(unset.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(blackboard.get("count"), None);
}

#[test]
fn test_simple_nodes() {
    let action = SimpleAction::new(
        |ctx| {
            let input: i64 = ctx.get_input_or_err("input")?;
            ctx.blackboard().set("doubled", input * 2)?;
            Ok(NodeStatus::Success)
        },
        vec![crate::PortSpec::new_in("input")],
    );
    let mut node = with_ports("double", action, &[("input", "21")]);
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
    assert_eq!(node.blackboard().get("doubled"), Some(Value::Int(42)));

    let mut node = TreeNode::new("bad", SimpleCondition::new(|_| Ok(NodeStatus::Running), vec![]));
    assert!(matches!(
        node.execute_tick(),
        Err(BehaviorError::SyncActionRunning { .. })
    ));

    let decorator = SimpleDecorator::new(
        |status, _| match status {
            NodeStatus::Failure => NodeStatus::Success,
            status => status,
        },
        vec![],
    );
    let (child, _) = sync("child", NodeStatus::Failure);
    let mut node = parent("decorator", decorator, vec![child]);
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
}

#[test]
fn test_simple_decorator_restarts_child() {
    let action = AsyncActionTest::new(Duration::ZERO);
    let probe = action.probe();
    let decorator = SimpleDecorator::new(|status, _| status, vec![]);
    let mut node = parent("decorator", decorator, vec![TreeNode::new("action", action)]);

    for run in 1..=2 {
        assert_eq!(node.execute_tick().unwrap(), NodeStatus::Running);
        assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
        assert_eq!(probe.tick_count(), run);
        assert!(node.children()[0].is_halted());
        node.reset_status();
    }
}

#[test]
fn test_sleep() {
    let mut node = with_ports("sleep", Stateful::new(SleepAction::default()), &[("ms", "10")]);
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Running);
    sleep(Duration::from_millis(20));
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Success);
}

#[test]
fn test_threaded_action() {
    let action = ThreadedAction::new(|_| Ok(NodeStatus::Success), vec![]);
    let mut node = TreeNode::new("threaded", action);
    let mut status = node.execute_tick().unwrap();
    for _ in 0..100 {
        if status != NodeStatus::Running {
            break;
        }
        sleep(Duration::from_millis(10));
        status = node.execute_tick().unwrap();
    }
    assert_eq!(status, NodeStatus::Success);

    let action = ThreadedAction::new(|_| Err("broken".to_owned()), vec![]);
    let mut node = TreeNode::new("threaded", action);
    let mut result = node.execute_tick();
    for _ in 0..100 {
        if !matches!(result, Ok(NodeStatus::Running)) {
            break;
        }
        sleep(Duration::from_millis(10));
        result = node.execute_tick();
    }
    assert!(matches!(result, Err(BehaviorError::AsyncActionFailed { .. })));
}

#[test]
fn test_test_node() {
    let config = TestNodeConfig {
        return_status: NodeStatus::Failure,
        failure_script: "failed := true".to_owned(),
        post_script: "done := true".to_owned(),
        ..TestNodeConfig::default()
    };
    let mut node = TreeNode::new("test", Stateful::new(TestNode::new(config)));
    assert_eq!(node.execute_tick().unwrap(), NodeStatus::Failure);
    assert_eq!(node.blackboard().get("failed"), Some(Value::Bool(true)));
    assert_eq!(node.blackboard().get("done"), Some(Value::Bool(true)));
}
