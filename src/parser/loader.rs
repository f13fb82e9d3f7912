use super::{scalar_string, NodeDef, TreeDocument};
use crate::{
    error::LoadError, is_allowed_port_name, nodes::SubtreeNode, tree::Subtree, Blackboard,
    NodeConfig, PortBinding, PostCond, PreCond, Registry, Tree, TreeNode, Value,
};
use std::{collections::BTreeMap, rc::Rc};
use tracing::{debug, warn};

const AUTOREMAP: &str = "_autoremap";
const SUBTREE: &str = "Subtree";

/// Instantiates the main tree of a document.
///
/// The main tree is `main_tree_to_execute`, or the only tree if there is just one.
/// The `blackboard` section seeds the main tree's blackboard.
pub fn load(doc: &TreeDocument, registry: &Registry) -> Result<Tree, LoadError> {
    let main = match (&doc.main_tree_to_execute, doc.trees.keys().next()) {
        (Some(main), _) => main.as_str(),
        (None, Some(only)) if doc.trees.len() == 1 => only.as_str(),
        _ => return Err(LoadError::AmbiguousMainTree),
    };

    let blackboard = Blackboard::create(None);
    for (key, value) in &doc.blackboard {
        let literal = scalar_string(value).ok_or_else(|| LoadError::InvalidAttribute {
            node: "blackboard".to_owned(),
            attribute: key.clone(),
        })?;
        blackboard.set(key, Value::from_literal(&literal, registry.enums()))?;
    }

    load_tree(doc, registry, main, blackboard)
}

/// Instantiates the tree `name` on top of an existing blackboard.
pub fn load_tree(
    doc: &TreeDocument,
    registry: &Registry,
    name: &str,
    blackboard: Rc<Blackboard>,
) -> Result<Tree, LoadError> {
    let def = doc
        .trees
        .get(name)
        .ok_or_else(|| LoadError::MissingTree(name.to_owned()))?;

    let mut loader = Loader {
        doc,
        registry,
        subtrees: vec![Subtree {
            name: String::new(),
            id: name.to_owned(),
            blackboard,
            nodes: vec![],
        }],
        uid_counter: 1,
    };
    let top = TreeStack { name, parent: None };
    let root = loader.build_node(def, 0, "", &top)?;
    Ok(Tree::from_parts(root, loader.subtrees, loader.uid_counter))
}

/// A mechanism to detect infinite recursion. It is a linked list in call stack.
/// You can traverse the link back to enumerate all the tree names that are being
/// instantiated and check if the one to be inserted is already there.
///
/// Recursive subtrees would have to be instantiated lazily, on their first tick,
/// which would require keeping the registry and the document alive with the tree.
/// Without this check they cause a stack overflow.
struct TreeStack<'a, 'src> {
    name: &'src str,
    parent: Option<&'a TreeStack<'a, 'src>>,
}

impl<'a, 'src> TreeStack<'a, 'src> {
    fn find(&self, name: &str) -> bool {
        if self.name == name {
            true
        } else if let Some(parent) = self.parent {
            parent.find(name)
        } else {
            false
        }
    }
}

struct Loader<'src> {
    doc: &'src TreeDocument,
    registry: &'src Registry,
    subtrees: Vec<Subtree>,
    uid_counter: u32,
}

fn attribute_string(node: &str, key: &str, value: &serde_yaml::Value) -> Result<String, LoadError> {
    scalar_string(value).ok_or_else(|| LoadError::InvalidAttribute {
        node: node.to_owned(),
        attribute: key.to_owned(),
    })
}

impl<'src> Loader<'src> {
    fn next_uid(&mut self) -> u32 {
        let uid = self.uid_counter;
        self.uid_counter += 1;
        uid
    }

    /// The tree to instantiate if `def` refers to a subtree.
    fn subtree_id<'d>(&self, def: &'d NodeDef) -> Result<Option<&'d str>, LoadError> {
        if def.ty == SUBTREE {
            return def
                .id
                .as_deref()
                .map(Some)
                .ok_or_else(|| LoadError::MissingNode(format!("{SUBTREE} without an id")));
        }
        if !self.registry.is_registered(&def.ty) && self.doc.trees.contains_key(&def.ty) {
            return Ok(Some(&def.ty));
        }
        Ok(None)
    }

    fn build_node(
        &mut self,
        def: &'src NodeDef,
        subtree: usize,
        prefix: &str,
        stack: &TreeStack,
    ) -> Result<TreeNode, LoadError> {
        if let Some(id) = self.subtree_id(def)? {
            return self.build_subtree(def, id, subtree, prefix, stack);
        }

        let registry = self.registry;
        let manifest = registry
            .manifest(&def.ty)
            .cloned()
            .ok_or_else(|| LoadError::MissingNode(def.ty.clone()))?;
        let uid = self.next_uid();
        let name = def.name.clone().unwrap_or_else(|| def.ty.clone());
        let mut path = format!("{prefix}{name}");
        if name == def.ty {
            path = format!("{path}::{uid}");
        }

        let blackboard = self.subtrees[subtree].blackboard.clone();
        let mut config = NodeConfig::with_blackboard(blackboard.clone());
        config.uid = uid;
        config.path = path;
        apply_conditions(&mut config, &name, &def.attributes)?;

        for (port, value) in &def.ports {
            let value = attribute_string(&name, port, value)?;
            if let Some(cond) = PreCond::from_attribute(port) {
                config.pre_conditions.insert(cond, value);
                continue;
            }
            if let Some(cond) = PostCond::from_attribute(port) {
                config.post_conditions.insert(cond, value);
                continue;
            }
            if !is_allowed_port_name(port) {
                continue;
            }
            let spec = manifest
                .port(port)
                .ok_or_else(|| LoadError::UnknownPort {
                    node: name.clone(),
                    port: port.clone(),
                })?;

            if let Some(key) = PortBinding::parse(&value).key(port) {
                if blackboard.get_entry(key).is_none() {
                    blackboard.create_entry(key, spec)?;
                }
            }
            if spec.direction.is_input() {
                config.input_ports.insert(port.into(), value.clone());
            }
            if spec.direction.is_output() {
                config.output_ports.insert(port.into(), value);
            }
        }

        for spec in &manifest.ports {
            let Some(default) = spec.default_string() else {
                continue;
            };
            if spec.direction.is_input() {
                config
                    .input_ports
                    .entry(spec.key)
                    .or_insert_with(|| default.to_owned());
            }
            if spec.direction.is_output() && PortBinding::parse(default).key(&spec.key).is_some() {
                config
                    .output_ports
                    .entry(spec.key)
                    .or_insert_with(|| default.to_owned());
            }
        }
        config.manifest = Some(manifest);

        self.subtrees[subtree].nodes.push(uid);
        let mut node = registry.instantiate(&name, &def.ty, config)?;
        for child in &def.children {
            let child = self.build_node(child, subtree, prefix, stack)?;
            node.add_child(child)?;
        }
        Ok(node)
    }

    fn build_subtree(
        &mut self,
        def: &'src NodeDef,
        id: &'src str,
        parent: usize,
        prefix: &str,
        stack: &TreeStack,
    ) -> Result<TreeNode, LoadError> {
        let (doc, registry) = (self.doc, self.registry);
        let (tree_id, tree_def) = doc
            .trees
            .get_key_value(id)
            .ok_or_else(|| LoadError::MissingNode(id.to_owned()))?;
        if stack.find(id) {
            return Err(LoadError::InfiniteRecursion {
                node: id.to_owned(),
            });
        }

        let uid = self.next_uid();
        let instance = def.name.clone().unwrap_or_else(|| format!("{id}::{uid}"));
        let subtree_path = format!("{prefix}{instance}");

        let mut remapping = BTreeMap::new();
        for (port, value) in &def.ports {
            remapping.insert(port.as_str(), attribute_string(&instance, port, value)?);
        }
        let autoremap_attr = def
            .attributes
            .get(AUTOREMAP)
            .map(|value| attribute_string(&instance, AUTOREMAP, value))
            .transpose()?;
        let autoremap = autoremap_attr
            .or_else(|| remapping.remove(AUTOREMAP))
            .map_or(false, |value| {
                Value::from_literal(&value, registry.enums()).is_truthy()
            });

        if let Some(model) = doc.subtree_models.get(id) {
            for port in &model.ports {
                if remapping.contains_key(port.name.as_str()) {
                    continue;
                }
                match &port.default {
                    Some(default) => {
                        let default = attribute_string(&instance, &port.name, default)?;
                        remapping.insert(port.name.as_str(), default);
                    }
                    None if autoremap => (),
                    None => {
                        return Err(LoadError::MandatorySubtreePort {
                            subtree: id.to_owned(),
                            port: port.name.clone(),
                        })
                    }
                }
            }
        }

        let parent_blackboard = self.subtrees[parent].blackboard.clone();
        let blackboard = Blackboard::create(Some(&parent_blackboard));
        for (port, value) in &remapping {
            if !is_allowed_port_name(port) {
                continue;
            }
            match PortBinding::parse(value) {
                PortBinding::SameName => blackboard.add_subtree_remapping(*port, *port),
                PortBinding::Ref(external) => blackboard.add_subtree_remapping(*port, external),
                PortBinding::Literal(literal) => {
                    blackboard.enable_auto_remapping(false);
                    blackboard.set(port, Value::from_literal(literal, registry.enums()))?;
                }
            }
        }
        blackboard.enable_auto_remapping(autoremap);

        debug!(subtree = %subtree_path, id, "instantiating subtree");
        self.subtrees[parent].nodes.push(uid);
        let index = self.subtrees.len();
        self.subtrees.push(Subtree {
            name: subtree_path.clone(),
            id: id.to_owned(),
            blackboard,
            nodes: vec![],
        });

        let child_stack = TreeStack {
            name: tree_id,
            parent: Some(stack),
        };
        let root = self.build_node(tree_def, index, &format!("{subtree_path}/"), &child_stack)?;

        let mut config = NodeConfig::with_blackboard(parent_blackboard);
        config.uid = uid;
        config.path = subtree_path;
        apply_conditions(&mut config, &instance, &def.attributes)?;
        registry.configure(&mut config);

        let mut node = TreeNode::with_config(instance, config, Box::new(SubtreeNode::new(id)))?;
        node.set_registration_id(SUBTREE);
        node.add_child(root)?;
        Ok(node)
    }
}

fn apply_conditions(
    config: &mut NodeConfig,
    node: &str,
    attributes: &BTreeMap<String, serde_yaml::Value>,
) -> Result<(), LoadError> {
    for (attribute, value) in attributes {
        if let Some(cond) = PreCond::from_attribute(attribute) {
            config
                .pre_conditions
                .insert(cond, attribute_string(node, attribute, value)?);
        } else if let Some(cond) = PostCond::from_attribute(attribute) {
            config
                .post_conditions
                .insert(cond, attribute_string(node, attribute, value)?);
        } else if attribute != AUTOREMAP {
            warn!(node, attribute = %attribute, "ignoring unknown attribute");
        }
    }
    Ok(())
}
