//! Parameter binding for actions.
//!
//! Every action carries an explicit [`Signature`]: its parameters in declared
//! order, each either required or optional with a default. [`bind`] turns a
//! positional argument list plus a named fallback source into the exact
//! argument vector the action body receives. Binding is recomputed on every
//! call because the named source (usually the acting entry) can change
//! between calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::entry::Entry;
use crate::error::{EntryError, Result};
use crate::kernel::Kernel;
use crate::value::{Map, Value};

#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    default: Option<Value>,
}
impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared parameters of an action. Required parameters must precede
/// optional ones, mirroring ordinary positional calling conventions; a
/// signature that breaks this order is refused when binding.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
    variadic: bool,
}
impl Signature {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn required(mut self, name: &str) -> Self {
        self.params.push(Param { name: name.to_string(), default: None });
        self
    }
    pub fn optional(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(Param { name: name.to_string(), default: Some(default.into()) });
        self
    }
    /// Marks the action as accepting an unbounded argument list. Such actions
    /// are rejected at dispatch time.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
    pub fn params(&self) -> &[Param] {
        &self.params
    }
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }
    /// Whether every required parameter comes before the first optional one.
    pub fn is_well_ordered(&self) -> bool {
        let first_optional = self.params.iter().position(|p| !p.required()).unwrap_or(self.params.len());
        self.params[first_optional..].iter().all(|p| !p.required())
    }
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter(|p| p.required()).map(Param::name)
    }
}
impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts: Vec<String> = self
            .params
            .iter()
            .map(|p| match &p.default {
                None => p.name.clone(),
                Some(d) => format!("{}={}", p.name, d.to_json()),
            })
            .collect();
        if self.variadic {
            parts.push("*args".to_string());
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Anything that can answer "what is the value named X", with `None` as the
/// missing signal.
pub trait NamedSource {
    fn lookup(&self, name: &str) -> Result<Option<Value>>;
}
impl NamedSource for Map {
    fn lookup(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get(name).cloned())
    }
}
impl NamedSource for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.get(name).cloned())
    }
}

/// Computes the argument list for `action_name` with the given signature.
pub fn bind(
    action_name: &str,
    signature: &Signature,
    positional: Vec<Value>,
    named: &dyn NamedSource,
) -> Result<Vec<Value>> {
    if signature.is_variadic() || !signature.is_well_ordered() {
        return Err(EntryError::UnsupportedSignature(action_name.to_string()));
    }
    let accepted = signature.params().len();
    let given = positional.len();
    if given > accepted {
        return Err(EntryError::TooManyArguments { action: action_name.to_string(), accepted, given });
    }
    let num_required = signature.required_names().count();
    let mut arguments = positional;
    // topping up the required ones not given positionally
    let mut missing = Vec::new();
    for param in signature.params().iter().take(num_required).skip(given) {
        match named.lookup(param.name())? {
            Some(value) => arguments.push(value),
            None => missing.push(param.name().to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(EntryError::MissingRequiredArgument { action: action_name.to_string(), missing });
    }
    // positionals beyond the required count have already encroached into the optionals
    let covered = given.max(num_required);
    for param in signature.params().iter().skip(covered) {
        let value = match named.lookup(param.name())? {
            Some(value) => value,
            None => param.default().cloned().unwrap_or_default(),
        };
        arguments.push(value);
    }
    debug!(action = action_name, arguments = ?arguments, "bound arguments");
    Ok(arguments)
}

/// What an action body gets to see besides its arguments.
pub struct Invocation<'a> {
    entry: &'a Arc<Entry>,
}
impl<'a> Invocation<'a> {
    pub fn new(entry: &'a Arc<Entry>) -> Self {
        Self { entry }
    }
    /// The acting entry.
    pub fn entry(&self) -> &'a Arc<Entry> {
        self.entry
    }
    pub fn kernel(&self) -> Result<Arc<Kernel>> {
        self.entry.kernel()
    }
}

pub type ActionBody = dyn Fn(&Invocation<'_>, Vec<Value>) -> Result<Value> + Send + Sync;

/// A named, callable unit of behavior with an explicit signature.
#[derive(Clone)]
pub struct Action {
    name: String,
    signature: Signature,
    doc: Option<String>,
    body: Arc<ActionBody>,
}
impl Action {
    pub fn new<F>(name: &str, signature: Signature, body: F) -> Self
    where
        F: Fn(&Invocation<'_>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self { name: name.to_string(), signature, doc: None, body: Arc::new(body) }
    }
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn signature(&self) -> &Signature {
        &self.signature
    }
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
    /// Binds against `named` and runs the body.
    pub fn invoke(&self, invocation: &Invocation<'_>, positional: Vec<Value>, named: &dyn NamedSource) -> Result<Value> {
        let arguments = bind(&self.name, &self.signature, positional, named)?;
        (self.body)(invocation, arguments)
    }
}
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Action({}({}))", self.name, self.signature)
    }
}
