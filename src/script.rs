//! Embedded scripting used by condition attributes and the `Script` family of nodes.
//!
//! The engine only relies on the [`Script`] and [`ScriptParser`] traits, so the
//! default [`ExpressionParser`] can be swapped for another language. Parsed
//! scripts are memoized by source text in a [`ScriptCache`] that is owned by the
//! [`crate::Registry`] and shared with the nodes it creates.

mod parser;

use crate::{error::BtResult, Blackboard, Value};
use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    rc::Rc,
};
use tracing::trace;

pub use self::parser::ExpressionParser;

/// Named integer constants visible to scripts and port literals.
pub type EnumsTable = HashMap<String, i64>;

/// What a script can see: the blackboard of the node running it and the enums of the registry.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub blackboard: &'a Blackboard,
    pub enums: &'a EnumsTable,
}

pub trait Script {
    fn evaluate(&self, env: &Environment) -> BtResult<Value>;
}

pub trait ScriptParser {
    fn parse(&self, source: &str) -> BtResult<Rc<dyn Script>>;
}

struct CacheInner {
    parser: Box<dyn ScriptParser>,
    scripts: RefCell<HashMap<String, Rc<dyn Script>>>,
}

/// A cache of parsed scripts keyed by their trimmed source text.
/// Clones share the same storage.
#[derive(Clone)]
pub struct ScriptCache {
    inner: Rc<CacheInner>,
}

impl ScriptCache {
    pub fn new(parser: impl ScriptParser + 'static) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                parser: Box::new(parser),
                scripts: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn get_or_parse(&self, source: &str) -> BtResult<Rc<dyn Script>> {
        let source = source.trim();
        if let Some(script) = self.inner.scripts.borrow().get(source) {
            return Ok(script.clone());
        }
        trace!(source, "parsing script");
        let script = self.inner.parser.parse(source)?;
        self.inner
            .scripts
            .borrow_mut()
            .insert(source.to_owned(), script.clone());
        Ok(script)
    }

    pub fn evaluate(&self, env: &Environment, source: &str) -> BtResult<Value> {
        self.get_or_parse(source)?.evaluate(env)
    }

    pub fn len(&self) -> usize {
        self.inner.scripts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScriptCache {
    fn default() -> Self {
        Self::new(ExpressionParser)
    }
}

impl Debug for ScriptCache {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.debug_struct("ScriptCache")
            .field("len", &self.len())
            .finish()
    }
}
