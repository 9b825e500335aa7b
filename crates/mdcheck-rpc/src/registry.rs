//! Name → handler table with register-once semantics.

use crate::error::RpcError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

pub type HandlerResult = Result<Value, RpcError>;

/// A method handler: named-parameter object in, result object out, typed
/// error on failure.
pub type Handler = Box<dyn Fn(&Map<String, Value>) -> HandlerResult + Send + Sync>;

/// The method table. Built once at server start, read-only afterwards.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
    order: Vec<String>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a method name to a handler.
    ///
    /// # Panics
    ///
    /// Panics if the name is already bound. Duplicate registration is a
    /// programming error in the startup wiring, not a runtime condition.
    pub fn register(&mut self, name: &str, handler: Handler) {
        if self.handlers.contains_key(name) {
            panic!("method {name} already registered");
        }
        self.handlers.insert(name.to_string(), handler);
        self.order.push(name.to_string());
        debug!(method = name, "registered method");
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    /// Method names in registration order.
    pub fn method_names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
