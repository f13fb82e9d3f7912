use crate::{Symbol, Value};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char,
    combinator::{all_consuming, map, value},
    sequence::delimited,
    IResult,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PortDirection {
    Input,
    Output,
    InOut,
}

impl PortDirection {
    pub fn is_input(self) -> bool {
        !matches!(self, Self::Output)
    }

    pub fn is_output(self) -> bool {
        !matches!(self, Self::Input)
    }
}

/// Declaration of a port a node reads from or writes to.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub direction: PortDirection,
    pub key: Symbol,
    pub description: String,
    default_value: Option<Value>,
    default_string: Option<String>,
}

impl PortSpec {
    pub fn new(direction: PortDirection, key: impl Into<Symbol>) -> Self {
        Self {
            direction,
            key: key.into(),
            description: String::new(),
            default_value: None,
            default_string: None,
        }
    }

    pub fn new_in(key: impl Into<Symbol>) -> Self {
        Self::new(PortDirection::Input, key)
    }

    pub fn new_out(key: impl Into<Symbol>) -> Self {
        Self::new(PortDirection::Output, key)
    }

    pub fn new_inout(key: impl Into<Symbol>) -> Self {
        Self::new(PortDirection::InOut, key)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the default used when a tree definition leaves the port unassigned.
    /// The string form is what gets written into the node's port table.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default_string = Some(value.to_string());
        self.default_value = Some(value);
        self
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn default_string(&self) -> Option<&str> {
        self.default_string.as_deref()
    }
}

impl Default for PortSpec {
    fn default() -> Self {
        Self::new_inout("")
    }
}

/// Names that can't be used as ports: empty, the reserved attributes `id` and `name`,
/// and anything not starting with an ASCII letter (an underscore marks a reserved attribute).
pub fn is_allowed_port_name(name: &str) -> bool {
    match name {
        "" | "id" | "name" => false,
        _ => name.starts_with(|c: char| c.is_ascii_alphabetic()),
    }
}

/// How a port string assigned in a tree definition should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortBinding<'src> {
    /// `{=}`: the blackboard entry with the same name as the port
    SameName,
    /// `{key}`: the blackboard entry `key`
    Ref(&'src str),
    Literal(&'src str),
}

impl<'src> PortBinding<'src> {
    pub fn parse(src: &'src str) -> Self {
        match blackboard_pointer(src.trim()) {
            Ok((_, binding)) => binding,
            Err(_) => Self::Literal(src),
        }
    }

    /// The blackboard key this binding points to, if any.
    pub fn key(self, port: &'src str) -> Option<&'src str> {
        match self {
            Self::SameName => Some(port),
            Self::Ref(key) => Some(key),
            Self::Literal(_) => None,
        }
    }
}

fn key_name(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '@')(i)
}

fn blackboard_pointer(i: &str) -> IResult<&str, PortBinding> {
    all_consuming(alt((
        value(PortBinding::SameName, tag("{=}")),
        map(delimited(char('{'), key_name, char('}')), PortBinding::Ref),
    )))(i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn port_bindings() {
        assert_eq!(PortBinding::parse("{=}"), PortBinding::SameName);
        assert_eq!(PortBinding::parse(" {target} "), PortBinding::Ref("target"));
        assert_eq!(PortBinding::parse("{@root_key}"), PortBinding::Ref("@root_key"));
        assert_eq!(PortBinding::parse("42"), PortBinding::Literal("42"));
        assert_eq!(PortBinding::parse("{}"), PortBinding::Literal("{}"));
        assert_eq!(PortBinding::parse("{a b}"), PortBinding::Literal("{a b}"));
        assert_eq!(PortBinding::SameName.key("goal"), Some("goal"));
    }

    #[test]
    fn port_names() {
        assert!(is_allowed_port_name("goal"));
        assert!(is_allowed_port_name("case_1"));
        assert!(!is_allowed_port_name(""));
        assert!(!is_allowed_port_name("id"));
        assert!(!is_allowed_port_name("name"));
        assert!(!is_allowed_port_name("_autoremap"));
        assert!(!is_allowed_port_name("1st"));
    }

    #[test]
    fn default_string_follows_value() {
        let port = PortSpec::new_in("ms").with_default(100);
        assert_eq!(port.default_value(), Some(&Value::Int(100)));
        assert_eq!(port.default_string(), Some("100"));
    }
}
