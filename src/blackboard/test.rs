use super::*;

#[test]
fn test_set_get() {
    let bb = Blackboard::create(None);
    bb.set("x", 42).unwrap();
    assert_eq!(bb.get("x"), Some(Value::Int(42)));
    assert_eq!(bb.get("y"), None);

    bb.set("x", "hello").unwrap();
    assert_eq!(bb.get("x"), Some(Value::from("hello")));
}

#[test]
fn test_sequence_id_advances_on_write() {
    let bb = Blackboard::create(None);
    bb.set("x", 1).unwrap();
    let first = bb.get_stamped("x").unwrap();
    bb.set("x", 1).unwrap();
    let second = bb.get_stamped("x").unwrap();
    assert_eq!(first.sequence_id + 1, second.sequence_id);
    assert!(second.stamp >= first.stamp);
}

#[test]
fn test_entry_default_value() {
    let bb = Blackboard::create(None);
    let entry = bb
        .create_entry("speed", &PortSpec::new_in("speed").with_default(2.5))
        .unwrap();
    assert_eq!(entry.borrow().value, Some(Value::Float(2.5)));
    assert_eq!(bb.get("speed"), Some(Value::Float(2.5)));
    assert_eq!(bb.port_info("speed").unwrap().key, "speed");
}

#[test]
fn test_copy_into_is_exact() {
    let src = Blackboard::create(None);
    src.set("a", 1).unwrap();
    src.set("b", "two").unwrap();

    let dst = Blackboard::create(None);
    dst.set("b", "old").unwrap();
    dst.set("extra", true).unwrap();

    src.copy_into(&dst);

    assert_eq!(dst.keys(), src.keys());
    assert_eq!(dst.get("a"), Some(Value::Int(1)));
    assert_eq!(dst.get("b"), Some(Value::from("two")));
    assert_eq!(dst.get("extra"), None);

    // The copy is detached from the source
    dst.set("a", 100).unwrap();
    assert_eq!(src.get("a"), Some(Value::Int(1)));
}

#[test]
fn test_auto_remapping() {
    let parent = Blackboard::create(None);
    parent.set("k", "from parent").unwrap();

    let child = Blackboard::create(Some(&parent));
    assert_eq!(child.get("k"), None);

    child.enable_auto_remapping(true);
    assert_eq!(child.get("k"), Some(Value::from("from parent")));

    // The entry was resolved through the parent, so writes go through as well
    child.set("k", "from child").unwrap();
    assert_eq!(parent.get("k"), Some(Value::from("from child")));

    // Private keys never leave the child
    child.set("_local", 1).unwrap();
    assert_eq!(child.get("_local"), Some(Value::Int(1)));
    assert_eq!(parent.get("_local"), None);
}

#[test]
fn test_local_write_without_remapping() {
    let parent = Blackboard::create(None);
    parent.set("k", 1).unwrap();

    let child = Blackboard::create(Some(&parent));
    child.set("k", 2).unwrap();

    assert_eq!(child.get("k"), Some(Value::Int(2)));
    assert_eq!(parent.get("k"), Some(Value::Int(1)));
}

#[test]
fn test_explicit_remapping() {
    let parent = Blackboard::create(None);
    parent.set("target_pose", 10).unwrap();

    let child = Blackboard::create(Some(&parent));
    child.add_subtree_remapping("goal", "target_pose");

    assert_eq!(child.get("goal"), Some(Value::Int(10)));
    child.set("goal", 20).unwrap();
    assert_eq!(parent.get("target_pose"), Some(Value::Int(20)));

    // Creating a remapped entry creates it in the parent under the external name
    child.add_subtree_remapping("result", "answer");
    child.set("result", 42).unwrap();
    assert_eq!(parent.get("answer"), Some(Value::Int(42)));
    assert!(child.contains_local("result"));
}

#[test]
fn test_remapping_without_parent() {
    let orphan = Blackboard::create(None);
    orphan.add_subtree_remapping("goal", "target");
    assert!(matches!(
        orphan.set("goal", 1),
        Err(BehaviorError::MissingParentBlackboard { .. })
    ));

    // A parent that has been dropped counts as missing too
    let child = {
        let parent = Blackboard::create(None);
        let child = Blackboard::create(Some(&parent));
        child.enable_auto_remapping(true);
        child
    };
    assert!(child.parent().is_none());
    assert!(matches!(
        child.set("anything", 1),
        Err(BehaviorError::MissingParentBlackboard { .. })
    ));
}

#[test]
fn test_root_prefix() {
    let root = Blackboard::create(None);
    let middle = Blackboard::create(Some(&root));
    let leaf = Blackboard::create(Some(&middle));

    leaf.set("@mission", "explore").unwrap();
    assert_eq!(root.get("mission"), Some(Value::from("explore")));
    assert_eq!(middle.get("mission"), None);
    assert_eq!(leaf.get("@mission"), Some(Value::from("explore")));

    assert!(leaf.unset("@mission"));
    assert_eq!(root.get("mission"), None);
}
