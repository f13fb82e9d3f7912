//! Tree definitions written in YAML.
//!
//! ```yaml
//! main_tree_to_execute: main
//! blackboard:
//!   speed: 3
//! trees:
//!   main:
//!     type: Sequence
//!     children:
//!     - type: MoveTo
//!       name: approach
//!       ports:
//!         goal: "{target}"
//!     - type: Grasp
//!       name: grasp_left
//!       ports:
//!         side: left
//!       _skipIf: "speed == 0"
//!   Grasp:
//!     type: Fallback
//!     children:
//!     - type: PickUp
//!       ports:
//!         side: "{side}"
//!     - type: AlwaysFailure
//! subtree_models:
//!   Grasp:
//!     ports:
//!     - name: side
//!       direction: input
//! ```
//!
//! A node whose `type` names another tree instead of a registered node type, or
//! `type: Subtree` with an `id`, instantiates that tree as a subtree with its own
//! blackboard. Its `ports` then remap the subtree's entries into the parent.

mod loader;

use crate::{error::LoadError, PortDirection, Registry, Tree};
use serde::Deserialize;
use std::collections::BTreeMap;

pub use self::loader::{load, load_tree};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TreeDocument {
    /// Required when there is more than one tree
    pub main_tree_to_execute: Option<String>,
    /// Initial values of the main tree's blackboard
    pub blackboard: BTreeMap<String, serde_yaml::Value>,
    pub trees: BTreeMap<String, NodeDef>,
    pub subtree_models: BTreeMap<String, SubtreeModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDef {
    /// Registration id or the name of another tree
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub name: Option<String>,
    /// The tree to instantiate when `type` is `Subtree`
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub ports: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub children: Vec<NodeDef>,
    /// Everything else, i.e. condition scripts like `_skipIf` and `_autoremap`
    #[serde(flatten)]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubtreeModel {
    pub ports: Vec<SubtreePortModel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelDirection {
    Input,
    Output,
    InOut,
}

impl From<ModelDirection> for PortDirection {
    fn from(direction: ModelDirection) -> Self {
        match direction {
            ModelDirection::Input => Self::Input,
            ModelDirection::Output => Self::Output,
            ModelDirection::InOut => Self::InOut,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtreePortModel {
    pub name: String,
    #[serde(default = "default_direction")]
    pub direction: ModelDirection,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

fn default_direction() -> ModelDirection {
    ModelDirection::Input
}

/// The string form of a scalar YAML value. `None` for sequences and mappings.
pub(crate) fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value;
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

pub fn parse_yaml(source: &str) -> Result<TreeDocument, LoadError> {
    Ok(serde_yaml::from_str(source)?)
}

/// Parses a document and instantiates its main tree.
pub fn load_yaml(source: &str, registry: &Registry) -> Result<Tree, LoadError> {
    load(&parse_yaml(source)?, registry)
}
