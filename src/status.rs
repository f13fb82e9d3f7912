use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Execution status of a node.
///
/// `Idle` can only be restored by resetting a node, never assigned.
/// `Skipped` is reported to the parent but never stored as a node's own status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    #[default]
    Idle,
    /// The node should be ticked again in a later tick
    Running,
    Success,
    Failure,
    Skipped,
}

impl NodeStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Skipped)
    }

    /// Parses the names used in tree definitions and scripts, e.g. `SUCCESS` or `Failure`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_uppercase().as_str() {
            "IDLE" => Self::Idle,
            "RUNNING" => Self::Running,
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "SKIPPED" => Self::Skipped,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl Display for NodeStatus {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// The closed set of node categories. Parent attachment and child limits are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Action,
    Condition,
    Control,
    Decorator,
    Subtree,
}

impl NodeKind {
    pub fn max_children(self) -> NumChildren {
        match self {
            Self::Action | Self::Condition => NumChildren::Finite(0),
            Self::Decorator | Self::Subtree => NumChildren::Finite(1),
            Self::Control => NumChildren::Infinite,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let s = match self {
            Self::Action => "Action",
            Self::Condition => "Condition",
            Self::Control => "Control",
            Self::Decorator => "Decorator",
            Self::Subtree => "Subtree",
        };
        fmt.write_str(s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NumChildren {
    Finite(usize),
    Infinite,
}

impl PartialOrd for NumChildren {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(match (self, other) {
            (NumChildren::Finite(_), NumChildren::Infinite) => std::cmp::Ordering::Less,
            (NumChildren::Infinite, NumChildren::Finite(_)) => std::cmp::Ordering::Greater,
            (NumChildren::Finite(lhs), NumChildren::Finite(rhs)) => lhs.cmp(rhs),
            (NumChildren::Infinite, NumChildren::Infinite) => return None,
        })
    }
}
