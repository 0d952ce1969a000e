//! Named accessors into the running game.
//!
//! Symbolic variables name static fields, methods and engine specials by
//! string. The registry maps those names to closures once, before any path
//! is compiled, so compiling a path only has to look them up.

use crate::compile::Value;
use crate::Error;
use crate::RC;
use std::collections::BTreeMap;
use std::fmt;

/// What a compiled precondition is evaluated against.
#[derive(Clone, Debug)]
pub struct EvalContext {
    /// The component whose entry point the path belongs to.
    pub instance: Value,
}

impl EvalContext {
    pub fn new(instance: Value) -> EvalContext {
        EvalContext { instance }
    }
}

pub type StaticGetter = RC<dyn Fn(&EvalContext) -> Result<Value, Error>>;
/// Invokes a method. Instance methods get their receiver first.
pub type Invoker = RC<dyn Fn(&EvalContext, &[Value]) -> Result<Value, Error>>;
pub type SpecialGetter = RC<dyn Fn(&EvalContext) -> Result<Value, Error>>;

#[derive(Clone, Default)]
pub struct AccessorRegistry {
    static_fields: BTreeMap<String, StaticGetter>,
    methods: BTreeMap<String, Invoker>,
    specials: BTreeMap<String, SpecialGetter>,
}

impl AccessorRegistry {
    pub fn new() -> AccessorRegistry {
        AccessorRegistry::default()
    }

    /// Register the getter of the static field with signature `T.F`.
    pub fn register_static_field<S, F>(&mut self, signature: S, getter: F)
    where
        S: Into<String>,
        F: Fn(&EvalContext) -> Result<Value, Error> + 'static,
    {
        self.static_fields.insert(signature.into(), RC::new(getter));
    }

    /// Register the method with signature `T.Name(P1;P2)`.
    pub fn register_method<S, F>(&mut self, signature: S, invoker: F)
    where
        S: Into<String>,
        F: Fn(&EvalContext, &[Value]) -> Result<Value, Error> + 'static,
    {
        self.methods.insert(signature.into(), RC::new(invoker));
    }

    /// Register the engine special variable `special:<name>`.
    pub fn register_special<S, F>(&mut self, name: S, getter: F)
    where
        S: Into<String>,
        F: Fn(&EvalContext) -> Result<Value, Error> + 'static,
    {
        self.specials.insert(name.into(), RC::new(getter));
    }

    pub fn static_field(&self, signature: &str) -> Result<StaticGetter, Error> {
        self.static_fields
            .get(signature)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("no accessor for static field {}", signature)))
    }

    pub fn method(&self, signature: &str) -> Result<Invoker, Error> {
        self.methods
            .get(signature)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("no invoker for method {}", signature)))
    }

    pub fn special(&self, name: &str) -> Result<SpecialGetter, Error> {
        self.specials
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("unexpected special variable {}", name)))
    }
}

impl fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("static_fields", &self.static_fields.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("specials", &self.specials.keys().collect::<Vec<_>>())
            .finish()
    }
}
