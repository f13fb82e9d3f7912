use crate::{
    error::{BtResult, LoadError, RegistryError},
    is_allowed_port_name,
    nodes::{
        ActionFn, AlwaysFailureNode, AlwaysSuccessNode, AssertNode, DecoratorFn, DelayNode,
        EntryUpdatedNode, FallbackNode, ForceFailureNode, ForceSuccessNode, IfThenElseNode,
        InverterNode, ParallelAllNode, PreconditionNode, ReactiveFallbackNode,
        ReactiveSequenceNode, RunOnceNode, ScriptNode, SequenceNode, SetBlackboardNode,
        SimpleAction, SimpleCondition, SimpleDecorator, SleepAction, Stateful, SubtreeNode,
        SwitchNode, TestNode, TestNodeConfig, ThreadedAction, ThreadedFn, TimeoutNode,
        UnsetBlackboardNode,
    },
    script::{EnumsTable, ScriptCache, ScriptParser},
    BehaviorNode, Context, NodeConfig, NodeManifest, NodeStatus, PortSpec, ReactivePolicy,
    TreeNode,
};
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    sync::{atomic::AtomicBool, Arc},
};
use tracing::{debug, warn};

pub type Builder = Box<dyn Fn() -> Box<dyn BehaviorNode>>;

pub fn boxify<T>(cons: impl (Fn() -> T) + 'static) -> Builder
where
    T: BehaviorNode + 'static,
{
    Box::new(move || Box::new(cons()))
}

/// What a node matching a substitution filter is replaced with.
#[derive(Debug, Clone, PartialEq)]
pub enum SubstitutionRule {
    /// Another registered node type
    Replace(String),
    /// A [`TestNode`] with the given behavior
    Test(TestNodeConfig),
}

struct Substitution {
    filter: String,
    pattern: Regex,
    rule: SubstitutionRule,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SubstitutionFile {
    test_node_configs: HashMap<String, TestNodeConfig>,
    substitution_rules: serde_yaml::Mapping,
}

/// The node factory: maps registration ids to builders and to the manifests
/// describing them.
///
/// It also owns what the created nodes share: the scripting enums, the script
/// cache and the reactive policy.
pub struct Registry {
    builders: HashMap<String, Builder>,
    manifests: HashMap<String, Rc<NodeManifest>>,
    builtin_ids: HashSet<String>,
    enums: Rc<EnumsTable>,
    scripts: ScriptCache,
    substitutions: Vec<Substitution>,
    reactive_policy: ReactivePolicy,
}

impl Default for Registry {
    fn default() -> Self {
        let mut ret = Self {
            builders: HashMap::new(),
            manifests: HashMap::new(),
            builtin_ids: HashSet::new(),
            enums: Rc::default(),
            scripts: ScriptCache::default(),
            substitutions: vec![],
            reactive_policy: ReactivePolicy::default(),
        };
        ret.register_builtin("Sequence", boxify(SequenceNode::default));
        ret.register_builtin("AsyncSequence", boxify(SequenceNode::asynchronous));
        ret.register_builtin("Fallback", boxify(FallbackNode::default));
        ret.register_builtin("AsyncFallback", boxify(FallbackNode::asynchronous));
        ret.register_builtin("ReactiveSequence", boxify(ReactiveSequenceNode::default));
        ret.register_builtin("ReactiveFallback", boxify(ReactiveFallbackNode::default));
        ret.register_builtin("ParallelAll", boxify(ParallelAllNode::default));
        ret.register_builtin("IfThenElse", boxify(IfThenElseNode::default));
        for cases in 2..=6 {
            ret.register_builtin(format!("Switch{cases}"), boxify(move || SwitchNode::new(cases)));
        }

        ret.register_builtin("Inverter", boxify(InverterNode::default));
        ret.register_builtin("ForceSuccess", boxify(ForceSuccessNode::default));
        ret.register_builtin("ForceFailure", boxify(ForceFailureNode::default));
        ret.register_builtin("RunOnce", boxify(RunOnceNode::default));
        ret.register_builtin("Timeout", boxify(TimeoutNode::default));
        ret.register_builtin("Delay", boxify(DelayNode::default));
        ret.register_builtin("Subtree", boxify(SubtreeNode::default));
        ret.register_builtin("Precondition", boxify(PreconditionNode::default));
        ret.register_builtin(
            "SkipUnlessUpdated",
            boxify(EntryUpdatedNode::skip_unless_updated),
        );
        ret.register_builtin(
            "WaitValueUpdate",
            boxify(EntryUpdatedNode::wait_value_update),
        );

        ret.register_builtin("AlwaysSuccess", boxify(AlwaysSuccessNode::default));
        ret.register_builtin("AlwaysFailure", boxify(AlwaysFailureNode::default));
        ret.register_builtin("SetBlackboard", boxify(SetBlackboardNode::default));
        ret.register_builtin("UnsetBlackboard", boxify(UnsetBlackboardNode::default));
        ret.register_builtin("Sleep", boxify(|| Stateful::new(SleepAction::default())));
        ret.register_builtin("Script", boxify(ScriptNode::default));
        ret.register_builtin("Assert", boxify(AssertNode::default));
        ret
    }
}

impl Registry {
    /// A registry whose condition and `Script` nodes use another script language.
    pub fn with_script_parser(parser: impl ScriptParser + 'static) -> Self {
        Self {
            scripts: ScriptCache::new(parser),
            ..Self::default()
        }
    }

    fn register_builtin(&mut self, id: impl Into<String>, builder: Builder) {
        let id = id.into();
        self.builtin_ids.insert(id.clone());
        self.insert(id, builder);
    }

    fn insert(&mut self, id: String, builder: Builder) {
        let node = builder();
        let manifest = NodeManifest {
            kind: node.kind(),
            registration_id: id.clone(),
            ports: node.provided_ports(),
        };
        self.manifests.insert(id.clone(), Rc::new(manifest));
        self.builders.insert(id, builder);
    }

    /// Registers a node type. The builder is called once right away to read the
    /// kind and the ports of the node.
    pub fn register(&mut self, id: impl Into<String>, builder: Builder) -> Result<(), RegistryError> {
        let id = id.into();
        if self.builders.contains_key(&id) {
            return Err(RegistryError::DuplicateRegistration(id));
        }
        if let Some(port) = builder()
            .provided_ports()
            .into_iter()
            .find(|port| !is_allowed_port_name(&port.key))
        {
            return Err(RegistryError::InvalidPortName {
                node: id,
                port: port.key.to_string(),
            });
        }
        debug!(id = %id, "registering node type");
        self.insert(id, builder);
        Ok(())
    }

    pub fn register_simple_action(
        &mut self,
        id: impl Into<String>,
        body: impl Fn(&mut Context) -> BtResult<NodeStatus> + 'static,
        ports: Vec<PortSpec>,
    ) -> Result<(), RegistryError> {
        let body: ActionFn = Rc::new(body);
        self.register(
            id,
            Box::new(move || Box::new(SimpleAction::from_rc(body.clone(), ports.clone()))),
        )
    }

    pub fn register_simple_condition(
        &mut self,
        id: impl Into<String>,
        body: impl Fn(&mut Context) -> BtResult<NodeStatus> + 'static,
        ports: Vec<PortSpec>,
    ) -> Result<(), RegistryError> {
        let body: ActionFn = Rc::new(body);
        self.register(
            id,
            Box::new(move || Box::new(SimpleCondition::from_rc(body.clone(), ports.clone()))),
        )
    }

    pub fn register_simple_decorator(
        &mut self,
        id: impl Into<String>,
        body: impl Fn(NodeStatus, &mut Context) -> NodeStatus + 'static,
        ports: Vec<PortSpec>,
    ) -> Result<(), RegistryError> {
        let body: DecoratorFn = Rc::new(body);
        self.register(
            id,
            Box::new(move || Box::new(SimpleDecorator::from_rc(body.clone(), ports.clone()))),
        )
    }

    pub fn register_threaded_action(
        &mut self,
        id: impl Into<String>,
        body: impl Fn(&AtomicBool) -> Result<NodeStatus, String> + Send + Sync + 'static,
        ports: Vec<PortSpec>,
    ) -> Result<(), RegistryError> {
        let body: ThreadedFn = Arc::new(body);
        self.register(
            id,
            Box::new(move || Box::new(ThreadedAction::from_arc(body.clone(), ports.clone()))),
        )
    }

    pub fn unregister(&mut self, id: &str) -> Result<(), RegistryError> {
        if self.builtin_ids.contains(id) {
            return Err(RegistryError::BuiltinNotRemovable(id.to_owned()));
        }
        if self.builders.remove(id).is_none() {
            return Err(RegistryError::NotRegistered(id.to_owned()));
        }
        self.manifests.remove(id);
        Ok(())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.builders.contains_key(id)
    }

    pub fn manifest(&self, id: &str) -> Option<&Rc<NodeManifest>> {
        self.manifests.get(id)
    }

    pub fn builtin_ids(&self) -> &HashSet<String> {
        &self.builtin_ids
    }

    /// Makes `name` usable as an integer constant in scripts and port literals.
    pub fn register_scripting_enum(&mut self, name: impl Into<String>, value: i64) {
        Rc::make_mut(&mut self.enums).insert(name.into(), value);
    }

    pub fn register_scripting_enums<S: Into<String>>(
        &mut self,
        enums: impl IntoIterator<Item = (S, i64)>,
    ) {
        let table = Rc::make_mut(&mut self.enums);
        for (name, value) in enums {
            table.insert(name.into(), value);
        }
    }

    pub fn enums(&self) -> &Rc<EnumsTable> {
        &self.enums
    }

    pub fn scripts(&self) -> &ScriptCache {
        &self.scripts
    }

    pub fn set_reactive_policy(&mut self, policy: ReactivePolicy) {
        self.reactive_policy = policy;
    }

    pub fn reactive_policy(&self) -> ReactivePolicy {
        self.reactive_policy
    }

    /// Replaces every node whose instance name, registration id or whole path
    /// matches `filter` (a regular expression for the path) when a tree is created.
    /// The first matching rule wins.
    pub fn add_substitution_rule(
        &mut self,
        filter: impl Into<String>,
        rule: SubstitutionRule,
    ) -> Result<(), RegistryError> {
        let filter = filter.into();
        let pattern = Regex::new(&format!("^(?:{filter})$"))?;
        if let Some(existing) = self.substitutions.iter_mut().find(|sub| sub.filter == filter) {
            warn!(filter = %filter, "overwriting substitution rule");
            existing.rule = rule;
            return Ok(());
        }
        self.substitutions.push(Substitution {
            filter,
            pattern,
            rule,
        });
        Ok(())
    }

    pub fn clear_substitution_rules(&mut self) {
        self.substitutions.clear();
    }

    pub fn substitution_rules(&self) -> impl Iterator<Item = (&str, &SubstitutionRule)> {
        self.substitutions
            .iter()
            .map(|sub| (sub.filter.as_str(), &sub.rule))
    }

    /// Loads rules from a document like
    ///
    /// ```yaml
    /// test_node_configs:
    ///   FailSlowly:
    ///     return_status: FAILURE
    ///     async_delay: 200
    /// substitution_rules:
    ///   "Move.*": FailSlowly
    ///   Talk: AlwaysSuccess
    /// ```
    ///
    /// A rule naming a test node config substitutes a [`TestNode`], any other
    /// name a registered node type.
    pub fn load_substitution_rules_from_yaml(&mut self, yaml: &str) -> Result<(), RegistryError> {
        let file: SubstitutionFile = serde_yaml::from_str(yaml)?;
        for (filter, target) in &file.substitution_rules {
            let (Some(filter), Some(target)) = (filter.as_str(), target.as_str()) else {
                warn!(?filter, ?target, "substitution rules must map strings to strings");
                continue;
            };
            let rule = match file.test_node_configs.get(target) {
                Some(config) => SubstitutionRule::Test(config.clone()),
                None => SubstitutionRule::Replace(target.to_owned()),
            };
            self.add_substitution_rule(filter, rule)?;
        }
        Ok(())
    }

    /// Fills the parts of a config that come from the registry.
    pub(crate) fn configure(&self, config: &mut NodeConfig) {
        config.enums = self.enums.clone();
        config.scripts = self.scripts.clone();
        config.reactive_policy = self.reactive_policy;
    }

    fn build(&self, id: &str) -> Result<Box<dyn BehaviorNode>, RegistryError> {
        self.builders
            .get(id)
            .map(|builder| builder())
            .ok_or_else(|| RegistryError::NotRegistered(id.to_owned()))
    }

    /// Creates a node, applying the substitution rules.
    pub fn instantiate(
        &self,
        name: &str,
        id: &str,
        mut config: NodeConfig,
    ) -> Result<TreeNode, LoadError> {
        self.configure(&mut config);
        let substitution = self.substitutions.iter().find(|sub| {
            sub.filter == name || sub.filter == id || sub.pattern.is_match(&config.path)
        });

        let behavior: Box<dyn BehaviorNode> = match substitution.map(|sub| &sub.rule) {
            Some(SubstitutionRule::Replace(other)) => {
                debug!(node = %name, from = %id, to = %other, "substituting node");
                config.manifest = self.manifests.get(other).cloned();
                self.build(other)?
            }
            Some(SubstitutionRule::Test(test_config)) => {
                debug!(node = %name, from = %id, "substituting test node");
                if config.manifest.is_none() {
                    config.manifest = self.manifests.get(id).cloned();
                }
                Box::new(Stateful::new(TestNode::new(test_config.clone())))
            }
            None => {
                if config.manifest.is_none() {
                    config.manifest = self.manifests.get(id).cloned();
                }
                self.build(id)?
            }
        };

        let mut node = TreeNode::with_config(name, config, behavior)?;
        node.set_registration_id(id);
        Ok(node)
    }
}
