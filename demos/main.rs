use ::behavior_tree_engine::{
    error::BtResult, nodes::SequenceNode, BehaviorNode, Context, Lazy, NodeConfig, NodeKind,
    NodeStatus, PortSpec, Symbol, Tree, TreeNode, Value,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Arm {
    name: String,
}

#[derive(Debug)]
struct Body {
    left_arm: Arm,
    right_arm: Arm,
}

struct PrintArmNode;

impl BehaviorNode for PrintArmNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("arm")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        if let Some(arm) = ctx.get_input_value("arm") {
            if let Some(arm) = arm.downcast_ref::<Arm>() {
                println!("PrintArmNode: {}", arm.name);
                return Ok(NodeStatus::Success);
            }
        }
        Ok(NodeStatus::Failure)
    }
}

struct PrintBodyNode;

impl BehaviorNode for PrintBodyNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new_in("body"),
            PortSpec::new_out("left_arm"),
            PortSpec::new_out("right_arm"),
        ]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        static LEFT_ARM_SYM: Lazy<Symbol> = Lazy::new(|| "left_arm".into());
        static RIGHT_ARM_SYM: Lazy<Symbol> = Lazy::new(|| "right_arm".into());
        let Some(body) = ctx.get_input_value("body") else {
            return Ok(NodeStatus::Failure);
        };
        let Some(body) = body.downcast_ref::<Body>() else {
            return Ok(NodeStatus::Failure);
        };
        println!("PrintBodyNode: {body:?}");
        ctx.set_output(&LEFT_ARM_SYM, Value::handle(body.left_arm.clone()))?;
        ctx.set_output(&RIGHT_ARM_SYM, Value::handle(body.right_arm.clone()))?;
        Ok(NodeStatus::Success)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let body = Body {
        left_arm: Arm {
            name: "left_arm".to_string(),
        },
        right_arm: Arm {
            name: "right_arm".to_string(),
        },
    };

    let root_config = NodeConfig::default();
    let blackboard = root_config.blackboard.clone();
    blackboard.set("body", Value::handle(body))?;

    let print_body = NodeConfig::with_blackboard(blackboard.clone())
        .input("body", "{=}")
        .output("left_arm", "{=}")
        .output("right_arm", "{=}");
    let print_left = NodeConfig::with_blackboard(blackboard.clone()).input("arm", "{left_arm}");
    let print_right = NodeConfig::with_blackboard(blackboard.clone()).input("arm", "{right_arm}");

    let print_arms = TreeNode::with_config(
        "print_arms",
        NodeConfig::with_blackboard(blackboard.clone()),
        Box::new(SequenceNode::default()),
    )?
    .with_children([
        TreeNode::with_config("print_left", print_left, Box::new(PrintArmNode))?,
        TreeNode::with_config("print_right", print_right, Box::new(PrintArmNode))?,
    ])?;
    let root = TreeNode::with_config("root", root_config, Box::new(SequenceNode::default()))?
        .with_children([
            TreeNode::with_config("print_body", print_body, Box::new(PrintBodyNode))?,
            print_arms,
        ])?;

    let mut tree = Tree::new(root);
    print!("{}", tree.print_tree());
    let result = tree.tick_while_running()?;
    println!("result: {result}");
    Ok(())
}
