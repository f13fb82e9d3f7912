//! # behavior-tree-engine (Rust crate)
//!
//! A behavior tree execution engine with hierarchical blackboards, condition
//! scripts and cooperative asynchronous nodes.
//!
//!
//! ## Overview
//!
//! A behavior tree drives an agent by repeatedly "ticking" a tree of composable nodes.
//! Every tick is a short decision pass from the root down; a node that needs more time
//! returns `Running` and is resumed on a later tick.
//! See [BehaviorTreeCPP's documentation](https://www.behaviortree.dev/) for a thorough
//! introduction to the idea.
//!
//!
//! ## How it looks like
//!
//! You define a node by implementing the [`BehaviorNode`] trait.
//! The node gets a [`Context`] that gives access to its ports, its blackboard and its children.
//!
//! ```rust
//! use behavior_tree_engine::*;
//!
//! struct PrintArm;
//!
//! impl BehaviorNode for PrintArm {
//!     fn kind(&self) -> NodeKind {
//!         NodeKind::Action
//!     }
//!
//!     fn provided_ports(&self) -> Vec<PortSpec> {
//!         vec![PortSpec::new_in("arm")]
//!     }
//!
//!     fn tick(&mut self, ctx: &mut Context) -> error::BtResult<NodeStatus> {
//!         let arm: String = ctx.get_input_or_err("arm")?;
//!         println!("Got {arm}");
//!         Ok(NodeStatus::Success)
//!     }
//! }
//! ```
//!
//! Then you register it to a [`Registry`], which already knows the builtin nodes like
//! `Sequence` or `Fallback`, and load a tree definition written in YAML.
//!
//! ```rust
//! # use behavior_tree_engine::*;
//! # struct PrintArm;
//! # impl BehaviorNode for PrintArm {
//! #     fn kind(&self) -> NodeKind { NodeKind::Action }
//! #     fn provided_ports(&self) -> Vec<PortSpec> { vec![PortSpec::new_in("arm")] }
//! #     fn tick(&mut self, _: &mut Context) -> error::BtResult<NodeStatus> { Ok(NodeStatus::Success) }
//! # }
//! let mut registry = Registry::default();
//! registry.register("PrintArm", boxify(|| PrintArm)).unwrap();
//!
//! let source = r#"
//! trees:
//!   main:
//!     type: Sequence
//!     children:
//!     - type: PrintArm
//!       ports:
//!         arm: left_arm
//!     - type: PrintArm
//!       ports:
//!         arm: "{right}"
//! blackboard:
//!   right: right_arm
//! "#;
//!
//! let mut tree = parser::load_yaml(source, &registry).unwrap();
//! assert_eq!(tree.tick_while_running().unwrap(), NodeStatus::Success);
//! ```
//!
//!
//! ## Ports and the blackboard
//!
//! A port assigned in a tree definition is either a literal (`left_arm`), a reference to
//! a blackboard entry (`{right}`), or `{=}`, a reference to the entry with the same name
//! as the port.
//! Each subtree gets its own [`Blackboard`] whose parent is the blackboard of the
//! enclosing tree, so a subtree only sees the entries that are remapped into it.
//!
//! Keys are interned as [`Symbol`]s. If you look up the same key a lot, you can cache
//! the symbol with `Lazy`, which is re-exported from `once_cell`.
//!
//! ```rust
//! use ::behavior_tree_engine::{Blackboard, Lazy, Symbol, Value};
//!
//! static BODY_SYM: Lazy<Symbol> = Lazy::new(|| "body".into());
//!
//! let blackboard = Blackboard::create(None);
//! blackboard.set(&BODY_SYM, 42).unwrap();
//! assert_eq!(blackboard.get("body"), Some(Value::Int(42)));
//! ```
//!
//!
//! ## Condition scripts
//!
//! Any node can carry the attributes `_failureIf`, `_successIf`, `_skipIf` and `_while`,
//! evaluated before the node is ticked, and `_onSuccess`, `_onFailure`, `_post` and
//! `_onHalted`, evaluated after it completes or is halted.
//! They are written in a small expression language that reads and writes blackboard
//! entries as variables.
//!
//! ```yaml
//! trees:
//!   main:
//!     type: Sequence
//!     children:
//!     - type: Script
//!       ports:
//!         code: "battery := 10"
//!     - type: AlwaysSuccess
//!       _skipIf: "battery < 20"
//! ```
//!
//!
//! ## Asynchronous nodes
//!
//! A node returning `Running` is ticked again later. The [`Tree`] owns a
//! [`WakeUpSignal`] that asynchronous nodes emit when they have progress to report,
//! so [`Tree::tick_while_running`] doesn't have to poll blindly.
//! [`nodes::StatefulAction`] and [`nodes::ThreadedAction`] are the usual building blocks.

mod blackboard;
mod context;
pub mod error;
mod node;
pub mod nodes;
pub mod parser;
mod port;
mod registry;
pub mod script;
mod status;
mod symbol;
pub mod testing;
mod tree;
mod value;
mod wakeup;

pub use crate::{
    blackboard::{Blackboard, Entry, EntryRef, StampedValue},
    context::Context,
    error::BtResult,
    node::{
        ListenerId, NodeConfig, NodeManifest, PostCond, PreCond, ReactivePolicy, StatusChange,
        TickCallback, TickMonitor, TreeNode,
    },
    port::{is_allowed_port_name, PortBinding, PortDirection, PortSpec},
    registry::{boxify, Registry, SubstitutionRule},
    status::{NodeKind, NodeStatus, NumChildren},
    symbol::Symbol,
    tree::{blackboard_backup, blackboard_restore, Subtree, TickOption, Tree},
    value::{FromValue, Value},
    wakeup::{DeadlineTimer, WakeUpSignal},
};
pub use ::once_cell::sync::Lazy;

/// The behavior of a node. The [`TreeNode`] wrapping it takes care of status
/// bookkeeping, condition scripts and callbacks.
pub trait BehaviorNode {
    fn kind(&self) -> NodeKind;

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![]
    }

    /// Never return `Idle`.
    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus>;

    /// Stops any ongoing work. The default halts the children.
    fn halt(&mut self, ctx: &mut Context) {
        ctx.halt_children();
    }

    fn max_children(&self) -> NumChildren {
        self.kind().max_children()
    }
}
