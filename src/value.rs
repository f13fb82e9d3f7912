use crate::{script::EnumsTable, NodeStatus};
use std::{
    any::Any,
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

/// A dynamically typed blackboard value.
///
/// Host data that has no scalar representation can be stored as a `Handle`,
/// which is shared by reference and only compares equal to itself.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Handle(Rc<dyn Any>),
}

impl Value {
    pub fn handle<T: 'static>(value: T) -> Self {
        Self::Handle(Rc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Handle(any) => any.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1. } else { 0. }),
            Self::String(s) => s.trim().parse().ok(),
            Self::Handle(_) => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0. && !f.is_nan(),
            Self::String(s) => !matches!(s.trim(), "" | "false" | "0"),
            Self::Handle(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Handle(_) => "handle",
        }
    }

    /// Converts a literal from a tree definition into a value.
    ///
    /// Enum names win over everything else, then booleans, numbers and
    /// double-quoted strings are recognized. Anything else stays a string.
    pub fn from_literal(s: &str, enums: &EnumsTable) -> Self {
        let trimmed = s.trim();
        if let Some(value) = enums.get(trimmed) {
            return Self::Int(*value);
        }
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => (),
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            return Self::String(trimmed[1..trimmed.len() - 1].to_owned());
        }
        Self::String(s.to_owned())
    }
}

impl Debug for Value {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(fmt, "Bool({b})"),
            Self::Int(i) => write!(fmt, "Int({i})"),
            Self::Float(f) => write!(fmt, "Float({f})"),
            Self::String(s) => write!(fmt, "String({s:?})"),
            Self::Handle(any) => write!(fmt, "Handle({:p})", Rc::as_ptr(any)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(fmt, "{b}"),
            Self::Int(i) => write!(fmt, "{i}"),
            Self::Float(f) => write!(fmt, "{f}"),
            Self::String(s) => fmt.write_str(s),
            Self::Handle(_) => fmt.write_str("<handle>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(lhs), Self::Bool(rhs)) => lhs == rhs,
            (Self::Int(lhs), Self::Int(rhs)) => lhs == rhs,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Self::String(lhs), Self::String(rhs)) => lhs == rhs,
            (Self::Handle(lhs), Self::Handle(rhs)) => Rc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident, $conv:ty) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v as $conv)
            }
        }
    };
}

impl_from!(i32, Int, i64);
impl_from!(i64, Int, i64);
impl_from!(u32, Int, i64);
impl_from!(usize, Int, i64);
impl_from!(f32, Float, f64);
impl_from!(f64, Float, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Conversion from a blackboard value to a concrete port type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Handle(_) => None,
            _ => Some(value.is_truthy()),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0. => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i.try_into().ok())
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i.try_into().ok())
    }
}

impl FromValue for usize {
    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|i| i.try_into().ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Handle(_) => None,
            _ => Some(value.to_string()),
        }
    }
}

impl FromValue for NodeStatus {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(NodeStatus::from_name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn literal_conversion() {
        let mut enums = EnumsTable::new();
        enums.insert("RED".to_owned(), 1);

        assert_eq!(Value::from_literal("RED", &enums), Value::Int(1));
        assert_eq!(Value::from_literal("42", &enums), Value::Int(42));
        assert_eq!(Value::from_literal("1.5", &enums), Value::Float(1.5));
        assert_eq!(Value::from_literal("true", &enums), Value::Bool(true));
        assert_eq!(
            Value::from_literal("\"42\"", &enums),
            Value::String("42".to_owned())
        );
        assert_eq!(
            Value::from_literal("hello", &enums),
            Value::String("hello".to_owned())
        );
    }

    #[test]
    fn numbers_compare_loosely() {
        assert_eq!(Value::Int(3), Value::Float(3.));
        assert_ne!(Value::Int(3), Value::String("3".to_owned()));
        let handle = Value::handle(vec![1, 2, 3]);
        assert_eq!(handle, handle.clone());
        assert_ne!(handle, Value::handle(vec![1, 2, 3]));
        assert_eq!(handle.downcast_ref::<Vec<i32>>(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(42).is_truthy());
        assert!(!Value::Float(0.).is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(Value::from("yes").is_truthy());
        assert_eq!(i64::from_value(&Value::from(" 12 ")), Some(12));
        assert_eq!(
            NodeStatus::from_value(&Value::from("FAILURE")),
            Some(NodeStatus::Failure)
        );
    }
}
