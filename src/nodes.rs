//! The builtin node library. Every node here is registered by [`crate::Registry::default`].

mod action;
mod control;
mod decorator;

pub use self::action::{
    AlwaysFailureNode, AlwaysSuccessNode, AssertNode, ScriptNode, SetBlackboardNode,
    SimpleAction, SimpleCondition, SleepAction, Stateful, StatefulAction, TestNode,
    TestNodeConfig, ThreadedAction, UnsetBlackboardNode,
};
pub(crate) use self::action::{ActionFn, ThreadedFn};
pub use self::control::{
    FallbackNode, IfThenElseNode, ParallelAllNode, ReactiveFallbackNode, ReactiveSequenceNode,
    SequenceNode, SwitchNode,
};
pub use self::decorator::{
    DelayNode, EntryUpdatedNode, ForceFailureNode, ForceSuccessNode, InverterNode,
    PreconditionNode, RunOnceNode, SimpleDecorator, SubtreeNode, TimeoutNode,
};
pub(crate) use self::decorator::DecoratorFn;

#[cfg(test)]
mod test;
