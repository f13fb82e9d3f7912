use behavior_tree_engine::{
    error::BehaviorError,
    nodes::{ReactiveSequenceNode, SequenceNode, TimeoutNode},
    parser::load_yaml,
    testing::{AsyncActionTest, SyncActionTest, TestProbe},
    NodeConfig, NodeStatus, PortSpec, ReactivePolicy, Registry, Tree, TreeNode, Value,
};
use std::{
    thread::sleep,
    time::{Duration, Instant},
};

fn counted(name: &str, probes: &mut Vec<TestProbe>) -> TreeNode {
    let action = SyncActionTest::default();
    probes.push(action.probe());
    TreeNode::new(name, action)
}

#[test]
fn reactive_sequence_with_async_sequence() -> anyhow::Result<()> {
    let mut probes = vec![];
    let conditions = TreeNode::new("conditions", SequenceNode::default()).with_children(
        ["A", "B", "C"].map(|name| counted(name, &mut probes)),
    )?;
    let actions = TreeNode::new("actions", SequenceNode::asynchronous())
        .with_children(["D", "E", "F"].map(|name| counted(name, &mut probes)))?;
    let root = TreeNode::new("root", ReactiveSequenceNode::default())
        .with_children([conditions, actions])?;
    let mut tree = Tree::new(root);

    let mut status = tree.tick_exactly_once()?;
    let mut ticks = 1;
    while status == NodeStatus::Running {
        status = tree.tick_exactly_once()?;
        ticks += 1;
    }

    assert_eq!(status, NodeStatus::Success);
    assert_eq!(ticks, 3);
    let counts: Vec<_> = probes.iter().map(TestProbe::tick_count).collect();
    assert_eq!(counts, [3, 3, 3, 1, 1, 1]);
    Ok(())
}

const TWO_SLEEPS: &str = r#"
trees:
  main:
    type: ReactiveSequence
    children:
    - type: Sleep
      ports:
        ms: 10
    - type: Sleep
      ports:
        ms: 10000
"#;

#[test]
fn reactive_sequence_rejects_second_running_child() -> anyhow::Result<()> {
    let mut tree = load_yaml(TWO_SLEEPS, &Registry::default())?;
    assert_eq!(tree.tick_exactly_once()?, NodeStatus::Running);
    sleep(Duration::from_millis(30));
    assert!(matches!(
        tree.tick_exactly_once(),
        Err(BehaviorError::MultipleRunningChildren { .. })
    ));

    let mut registry = Registry::default();
    registry.set_reactive_policy(ReactivePolicy {
        sequence_single_running: false,
        ..ReactivePolicy::default()
    });
    let mut tree = load_yaml(TWO_SLEEPS, &registry)?;
    assert_eq!(tree.tick_exactly_once()?, NodeStatus::Running);
    sleep(Duration::from_millis(30));
    assert_eq!(tree.tick_exactly_once()?, NodeStatus::Running);
    tree.halt_tree();
    Ok(())
}

#[test]
fn pre_tick_hooks_replace_failures() -> anyhow::Result<()> {
    let source = r#"
trees:
  main:
    type: ReactiveSequence
    children:
    - type: AlwaysFailure
    - type: AlwaysFailure
    - type: Sleep
      ports:
        ms: 100
"#;
    let mut tree = load_yaml(source, &Registry::default())?;
    tree.apply_visitor_mut(|node| {
        if node.registration_id() == "AlwaysFailure" {
            node.set_pre_tick_function(|_| NodeStatus::Success);
        }
    });
    // The sleep wakes the tree up long before the interval ends
    tree.set_sleep_interval(Duration::from_secs(5));

    let started = Instant::now();
    assert_eq!(tree.tick_while_running()?, NodeStatus::Success);
    assert!(started.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[test]
fn set_blackboard_then_assert() -> anyhow::Result<()> {
    let source = r#"
trees:
  main:
    type: Sequence
    children:
    - type: SetBlackboard
      ports:
        value: 42
        key: x
    - type: Assert
      ports:
        condition: "{x}"
"#;
    let mut tree = load_yaml(source, &Registry::default())?;
    assert_eq!(tree.tick_while_running()?, NodeStatus::Success);
    let blackboard = tree.root_blackboard().unwrap();
    assert_eq!(blackboard.get("x"), Some(Value::Int(42)));
    Ok(())
}

#[test]
fn timeout_halts_slow_child() -> anyhow::Result<()> {
    let action = AsyncActionTest::new(Duration::from_millis(300));
    let halts = action.halt_count();
    let config = NodeConfig::default().input("ms", "100");
    let timeout = TreeNode::with_config("timeout", config, Box::new(TimeoutNode::default()))?
        .with_children([TreeNode::new("slow", action)])?;
    let mut tree = Tree::new(timeout);

    assert_eq!(tree.tick_exactly_once()?, NodeStatus::Running);
    sleep(Duration::from_millis(150));
    assert_eq!(tree.tick_exactly_once()?, NodeStatus::Failure);
    assert_eq!(halts.get(), 1);
    let slow = &tree.root().unwrap().children()[0];
    assert_eq!(slow.status(), NodeStatus::Idle);
    Ok(())
}

#[test]
fn custom_nodes_and_remapping() -> anyhow::Result<()> {
    let mut registry = Registry::default();
    registry.register_simple_action(
        "Double",
        |ctx| {
            let input: i64 = ctx.get_input_or_err("input")?;
            ctx.set_output("output", input * 2)?;
            Ok(NodeStatus::Success)
        },
        vec![PortSpec::new_in("input"), PortSpec::new_out("output")],
    )?;
    registry.register_scripting_enums([("SMALL", 1), ("LARGE", 100)]);

    let source = r#"
main_tree_to_execute: main
blackboard:
  size: LARGE
trees:
  main:
    type: Sequence
    children:
    - type: DoubleTwice
      ports:
        value: "{size}"
        result: "{doubled}"
    - type: Assert
      ports:
        condition: "{doubled}"
  DoubleTwice:
    type: Sequence
    children:
    - type: Double
      ports:
        input: "{value}"
        output: "{once}"
    - type: Double
      ports:
        input: "{once}"
        output: "{result}"
"#;
    let mut tree = load_yaml(source, &registry)?;
    assert_eq!(tree.tick_while_running()?, NodeStatus::Success);

    let root = tree.root_blackboard().unwrap();
    assert_eq!(root.get("doubled"), Some(Value::Int(400)));
    // Entries that are not remapped stay in the subtree
    assert_eq!(root.get("once"), None);
    assert_eq!(tree.subtrees()[1].blackboard.get("once"), Some(Value::Int(200)));
    Ok(())
}

#[test]
fn substitution_rules_from_yaml() -> anyhow::Result<()> {
    let mut registry = Registry::default();
    registry.load_substitution_rules_from_yaml(
        r#"
test_node_configs:
  SlowFailure:
    return_status: FAILURE
    async_delay: 20
    failure_script: "failed := true"
substitution_rules:
  "greet/.*": SlowFailure
"#,
    )?;

    let source = r#"
main_tree_to_execute: main
trees:
  main:
    type: Fallback
    children:
    - type: Subtree
      id: hello
      name: greet
    - type: Script
      ports:
        code: "recovered := true"
  hello:
    type: AlwaysSuccess
    name: say_hello
"#;
    let mut tree = load_yaml(source, &registry)?;
    assert_eq!(tree.tick_while_running()?, NodeStatus::Success);
    assert_eq!(
        tree.subtrees()[1].blackboard.get("failed"),
        Some(Value::Bool(true))
    );
    assert_eq!(
        tree.root_blackboard().unwrap().get("recovered"),
        Some(Value::Bool(true))
    );
    Ok(())
}

#[test]
fn status_changes_are_observable() -> anyhow::Result<()> {
    use std::{cell::RefCell, rc::Rc};

    let source = r#"
trees:
  main:
    type: Sequence
    name: root
    children:
    - type: AlwaysSuccess
      name: first
    - type: AlwaysFailure
      name: second
"#;
    let mut tree = load_yaml(source, &Registry::default())?;
    let log = Rc::new(RefCell::new(vec![]));
    tree.apply_visitor_mut(|node| {
        let log = log.clone();
        node.on_status_change(move |change| {
            log.borrow_mut()
                .push(format!("{}: {} -> {}", change.name, change.previous, change.current));
        });
    });

    assert_eq!(tree.tick_once()?, NodeStatus::Failure);
    assert_eq!(
        *log.borrow(),
        [
            "root: IDLE -> RUNNING",
            "first: IDLE -> SUCCESS",
            "second: IDLE -> FAILURE",
            "first: SUCCESS -> IDLE",
            "second: FAILURE -> IDLE",
            "root: RUNNING -> FAILURE",
            "root: FAILURE -> IDLE",
        ]
    );
    Ok(())
}
