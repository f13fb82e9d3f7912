use crate::{
    error::{BehaviorError, BtResult},
    Blackboard, NodeStatus, TreeNode, WakeUpSignal,
};
use regex::Regex;
use std::{fmt::Write, rc::Rc, time::Duration};
use tracing::{debug, trace};

/// An instantiated tree definition: its blackboard and the uids of its nodes in
/// construction order.
#[derive(Debug, Clone)]
pub struct Subtree {
    /// Path of the subtree instance, empty for the main tree
    pub name: String,
    /// Name of the tree definition
    pub id: String,
    pub blackboard: Rc<Blackboard>,
    pub nodes: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOption {
    /// Tick the root once, even if a node emitted the wake-up signal
    ExactlyOnce,
    /// Tick again right away as long as the wake-up signal keeps firing
    OnceUnlessWokenUp,
    /// Tick until the root is no longer `Running`
    WhileRunning,
}

/// A behavior tree ready to be ticked.
///
/// The first subtree is the main tree, and its root is the root of the whole tree.
#[derive(Debug)]
pub struct Tree {
    root: Option<TreeNode>,
    subtrees: Vec<Subtree>,
    wake_up: WakeUpSignal,
    sleep_interval: Duration,
    uid_counter: u32,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            root: None,
            subtrees: vec![],
            wake_up: WakeUpSignal::new(),
            sleep_interval: Duration::ZERO,
            uid_counter: 1,
        }
    }
}

impl Tree {
    /// Wraps a tree assembled in code. Nodes are numbered in pre-order.
    pub fn new(mut root: TreeNode) -> Self {
        let mut uid_counter = 1;
        let mut nodes = vec![];
        root.visit_mut(&mut |node| {
            node.set_uid(uid_counter);
            nodes.push(uid_counter);
            uid_counter += 1;
        });
        let main = Subtree {
            name: String::new(),
            id: root.name().to_owned(),
            blackboard: root.blackboard().clone(),
            nodes,
        };
        Self::from_parts(root, vec![main], uid_counter)
    }

    pub(crate) fn from_parts(root: TreeNode, subtrees: Vec<Subtree>, uid_counter: u32) -> Self {
        let mut tree = Self {
            root: Some(root),
            subtrees,
            uid_counter,
            ..Self::default()
        };
        tree.initialize();
        tree
    }

    /// Hands a fresh wake-up signal to every node and returns it.
    pub fn initialize(&mut self) -> WakeUpSignal {
        self.wake_up = WakeUpSignal::new();
        let signal = &self.wake_up;
        if let Some(root) = &mut self.root {
            root.visit_mut(&mut |node| node.set_wake_up_signal(signal.clone()));
        }
        debug!(subtrees = self.subtrees.len(), "tree initialized");
        self.wake_up.clone()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut TreeNode> {
        self.root.as_mut()
    }

    /// The blackboard of the main tree.
    pub fn root_blackboard(&self) -> Option<&Rc<Blackboard>> {
        self.subtrees.first().map(|subtree| &subtree.blackboard)
    }

    pub fn subtrees(&self) -> &[Subtree] {
        &self.subtrees
    }

    pub fn wake_up_signal(&self) -> &WakeUpSignal {
        &self.wake_up
    }

    /// How long [`TickOption::OnceUnlessWokenUp`] and [`TickOption::WhileRunning`]
    /// wait for the wake-up signal while the root is `Running`.
    pub fn set_sleep_interval(&mut self, interval: Duration) {
        self.sleep_interval = interval;
    }

    /// Waits up to `timeout` for the wake-up signal. Returns whether it fired.
    pub fn sleep(&self, timeout: Duration) -> bool {
        self.wake_up.wait_for(timeout)
    }

    pub fn next_uid(&mut self) -> u32 {
        let uid = self.uid_counter;
        self.uid_counter += 1;
        uid
    }

    pub fn tick_exactly_once(&mut self) -> BtResult<NodeStatus> {
        self.tick_root(TickOption::ExactlyOnce)
    }

    pub fn tick_once(&mut self) -> BtResult<NodeStatus> {
        self.tick_root(TickOption::OnceUnlessWokenUp)
    }

    pub fn tick_while_running(&mut self) -> BtResult<NodeStatus> {
        self.tick_root(TickOption::WhileRunning)
    }

    pub fn tick_root(&mut self, option: TickOption) -> BtResult<NodeStatus> {
        let root = self.root.as_mut().ok_or(BehaviorError::EmptyTree)?;

        let mut status = NodeStatus::Idle;
        while status == NodeStatus::Idle
            || (option == TickOption::WhileRunning && status == NodeStatus::Running)
        {
            status = root.execute_tick()?;

            while option != TickOption::ExactlyOnce
                && status == NodeStatus::Running
                && self.wake_up.wait_for(Duration::ZERO)
            {
                trace!("woken up, ticking again");
                status = root.execute_tick()?;
            }

            if status.is_completed() {
                root.reset_status();
            }
            if status == NodeStatus::Running {
                self.wake_up.wait_for(self.sleep_interval);
            }
        }
        Ok(status)
    }

    /// Halts every node and leaves the whole tree `Idle`.
    pub fn halt_tree(&mut self) {
        let Some(root) = &mut self.root else {
            return;
        };
        root.halt_node();
        root.visit_mut(&mut TreeNode::halt_node);
        root.reset_status();
    }

    /// Nodes whose whole path matches the regular expression `pattern`.
    pub fn get_nodes_by_path(&self, pattern: &str) -> BtResult<Vec<&TreeNode>> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        let mut ret = vec![];
        if let Some(root) = &self.root {
            collect_matching(root, &regex, &mut ret);
        }
        Ok(ret)
    }

    /// Calls `visitor` on every node, parents before their children.
    pub fn apply_visitor(&self, mut visitor: impl FnMut(&TreeNode)) {
        if let Some(root) = &self.root {
            root.visit(&mut visitor);
        }
    }

    pub fn apply_visitor_mut(&mut self, mut visitor: impl FnMut(&mut TreeNode)) {
        if let Some(root) = &mut self.root {
            root.visit_mut(&mut visitor);
        }
    }

    /// One line per node, indented by depth.
    pub fn print_tree(&self) -> String {
        let mut ret = String::new();
        if let Some(root) = &self.root {
            print_recursive(root, 0, &mut ret);
        }
        ret
    }
}

fn collect_matching<'a>(node: &'a TreeNode, regex: &Regex, ret: &mut Vec<&'a TreeNode>) {
    if regex.is_match(node.path()) {
        ret.push(node);
    }
    for child in node.children() {
        collect_matching(child, regex, ret);
    }
}

fn print_recursive(node: &TreeNode, depth: usize, out: &mut String) {
    // Writing to a String never fails
    let _ = writeln!(out, "{:indent$}{}", "", node.display_name(), indent = depth * 2);
    for child in node.children() {
        print_recursive(child, depth + 1, out);
    }
}

/// Copies the blackboards of every subtree, in the order of [`Tree::subtrees`].
pub fn blackboard_backup(tree: &Tree) -> Vec<Rc<Blackboard>> {
    tree.subtrees
        .iter()
        .map(|subtree| {
            let backup = Blackboard::create(None);
            subtree.blackboard.copy_into(&backup);
            backup
        })
        .collect()
}

/// Writes a backup taken with [`blackboard_backup`] back into the tree.
pub fn blackboard_restore(backup: &[Rc<Blackboard>], tree: &Tree) -> BtResult<()> {
    if backup.len() != tree.subtrees.len() {
        return Err(BehaviorError::BackupMismatch {
            expected: tree.subtrees.len(),
            found: backup.len(),
        });
    }
    for (saved, subtree) in backup.iter().zip(&tree.subtrees) {
        saved.copy_into(&subtree.blackboard);
    }
    Ok(())
}
