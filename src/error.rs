use thiserror::Error;

/// Structural and protocol errors raised while building or ticking a tree.
///
/// `Failure` and `Skipped` are ordinary statuses and never show up here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BehaviorError {
    #[error("{node}: missing port [{port}]")]
    MissingPort { node: String, port: String },

    #[error("{node}: port [{port}] can't be converted from {value:?}")]
    InvalidPortValue {
        node: String,
        port: String,
        value: String,
    },

    #[error("{node}: output port [{port}] is not declared")]
    MissingOutputPort { node: String, port: String },

    #[error("{node}: output port [{port}] must be bound to a blackboard entry, got {binding:?}")]
    InvalidOutputBinding {
        node: String,
        port: String,
        binding: String,
    },

    #[error("blackboard key [{key}] requires a parent blackboard, but there is none")]
    MissingParentBlackboard { key: String },

    #[error("{node}: number of children ({children}) is less than the failure threshold ({threshold})")]
    ThresholdExceedsChildren {
        node: String,
        children: usize,
        threshold: usize,
    },

    #[error("{node}: expected {expected} children, found {found}")]
    WrongChildCount {
        node: String,
        expected: String,
        found: usize,
    },

    #[error("{node}: attempted to add too many children")]
    TooManyNodes { node: String },

    #[error("{node}: a node must never return IDLE")]
    IdleReturned { node: String },

    #[error("{node}: the status can't be set to IDLE directly, reset the node instead")]
    IdleAssignment { node: String },

    #[error("{node}: only a single child can return RUNNING")]
    MultipleRunningChildren { node: String },

    #[error("{node}: a synchronous action must never return RUNNING")]
    SyncActionRunning { node: String },

    #[error("{node}: asynchronous action failed: {message}")]
    AsyncActionFailed { node: String, message: String },

    #[error("script error in {source_text:?}: {message}")]
    Script {
        source_text: String,
        message: String,
    },

    #[error("the tree has no root node")]
    EmptyTree,

    #[error("invalid path filter: {0}")]
    InvalidPathFilter(#[from] regex::Error),

    #[error("blackboard backup holds {found} blackboards, but the tree has {expected}")]
    BackupMismatch { expected: usize, found: usize },
}

impl BehaviorError {
    pub(crate) fn script(source_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            source_text: source_text.into(),
            message: message.into(),
        }
    }
}

pub type BtResult<T> = Result<T, BehaviorError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("ID [{0}] already registered")]
    DuplicateRegistration(String),

    #[error("ID [{0}] not registered")]
    NotRegistered(String),

    #[error("{node}: [{port}] is not an allowed port name")]
    InvalidPortName { node: String, port: String },

    #[error("builtin node [{0}] can't be unregistered")]
    BuiltinNotRemovable(String),

    #[error("invalid substitution rules: {0}")]
    SubstitutionRules(#[from] serde_yaml::Error),

    #[error("invalid substitution filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

/// Errors while turning a tree definition into a [`crate::Tree`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    #[error("failed to parse tree definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("can't find a tree with name [{0}]")]
    MissingTree(String),

    #[error("no main tree to execute: set `main_tree_to_execute` or define exactly one tree")]
    AmbiguousMainTree,

    #[error("node type or subtree name not found {0:?}")]
    MissingNode(String),

    #[error("port [{port}] is assigned in the tree definition, but {node} doesn't provide it")]
    UnknownPort { node: String, port: String },

    #[error("subtree [{subtree}] defines a mandatory port [{port}] that is not remapped")]
    MandatorySubtreePort { subtree: String, port: String },

    #[error("{node}: attribute [{attribute}] must be a scalar")]
    InvalidAttribute { node: String, attribute: String },

    #[error("infinite recursion detected in subtree {node:?}")]
    InfiniteRecursion { node: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Behavior(#[from] BehaviorError),
}
