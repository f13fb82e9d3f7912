use ::behavior_tree_engine::{
    boxify, error::BtResult, parser, BehaviorNode, Context, NodeKind, NodeStatus, PortSpec,
    Registry,
};
use std::fs;
use tracing_subscriber::EnvFilter;

struct PrintArmNode;

impl BehaviorNode for PrintArmNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Action
    }

    fn provided_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::new_in("arm").with_default("nobody's arm")]
    }

    fn tick(&mut self, ctx: &mut Context) -> BtResult<NodeStatus> {
        let arm: String = ctx.get_input_or_err("arm")?;
        println!("{}: got {arm}", ctx.display_name());
        Ok(NodeStatus::Success)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/tree.yaml".to_owned());
    let source = fs::read_to_string(&path)?;

    let mut registry = Registry::default();
    registry.register("PrintArmNode", boxify(|| PrintArmNode))?;

    let document = parser::parse_yaml(&source)?;
    let mut tree = parser::load(&document, &registry)?;
    if let Some(blackboard) = tree.root_blackboard() {
        blackboard.set("left", "left_arm")?;
    }
    print!("{}", tree.print_tree());

    let result = tree.tick_while_running()?;
    eprintln!("result: {result}");

    if let Some(blackboard) = tree.root_blackboard() {
        for key in blackboard.keys() {
            println!("{key} = {:?}", blackboard.get(&key));
        }
    }
    Ok(())
}
