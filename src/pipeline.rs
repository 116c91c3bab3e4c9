//! Pipelines: ordered calls threading a result from one step into the next.
//!
//! Execution starts at the kernel entry. Whenever a step yields something
//! other than an entry, the next step acts on the kernel entry again. Labeled
//! results are kept in a scratch entry which is overlaid on the acting entry
//! during each step, so later steps can refer to them by name.
//!
//! Text found inside sequence or mapping arguments may be a call reference:
//!
//! ```text
//! ^name                 call `name` on the acting entry
//! ^name:arg:arg         ... with arguments, split on the first delimiter
//! ^^name,arg            call `name` on the kernel entry
//! ```
//!
//! The delimiter is whichever of `: , / ; =` or a space follows the name.
//! Top-level text arguments are passed as they are, so a query such as
//! `^old,python_package` reaches `byquery` untouched. Wrap a reference in a
//! sequence to have it substituted.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::ancestry::AttributeSource;
use crate::builtin::text;
use crate::entry::Entry;
use crate::error::{EntryError, Result};
use crate::kernel::Kernel;
use crate::value::{Map, Value};

lazy_static! {
    static ref CALL_REFERENCE: Regex = Regex::new(r"^(\^{1,2})(\w+)(([:, /;=])(.*))?$").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub action: String,
    pub positional: Vec<Value>,
    pub overrides: Option<Map>,
    pub label: Option<String>,
}

impl Step {
    pub fn new(action: &str) -> Self {
        Self { action: action.to_string(), ..Self::default() }
    }
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }
    pub fn with_override(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.get_or_insert_with(Map::new).insert(key.to_string(), value.into());
        self
    }
    pub fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// A step from its data form: an action name, or a sequence
    /// `[action, positional?, overrides?, label?]`.
    pub fn from_value(value: &Value) -> Result<Step> {
        match value {
            Value::Text(action) => Ok(Step::new(action)),
            Value::List(parts) => {
                let mut parts = parts.iter();
                let action = match parts.next() {
                    Some(Value::Text(action)) => action,
                    _ => return Err(EntryError::InvalidReference(format!("pipeline step {value} does not name an action"))),
                };
                let positional = match parts.next() {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::List(positional)) => positional.clone(),
                    Some(single) => vec![single.clone()],
                };
                let overrides = match parts.next() {
                    Some(Value::Map(overrides)) => Some(overrides.clone()),
                    _ => None,
                };
                let label = parts.next().and_then(Value::as_str).map(str::to_string);
                Ok(Step { action: action.clone(), positional, overrides, label })
            }
            other => Err(EntryError::InvalidReference(format!("{other} is not a pipeline step"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
    pub fn len(&self) -> usize {
        self.steps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
    /// A pipeline from its data form: a sequence of steps, or a single step.
    pub fn from_value(value: &Value) -> Result<Pipeline> {
        match value {
            Value::List(steps) if steps.iter().all(|s| matches!(s, Value::List(_))) => {
                Ok(Pipeline { steps: steps.iter().map(Step::from_value).collect::<Result<_>>()? })
            }
            single => Ok(Pipeline { steps: vec![Step::from_value(single)?] }),
        }
    }
}

impl From<Vec<Step>> for Pipeline {
    fn from(steps: Vec<Step>) -> Self {
        Pipeline { steps }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `^`: the entry acting in the current step.
    Acting,
    /// `^^`: the kernel entry.
    Kernel,
}

/// A parsed `^name:args` call reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRef {
    pub target: Target,
    pub action: String,
    pub arguments: Vec<Value>,
}

impl CallRef {
    /// `None` when the text is not a call reference.
    pub fn parse(text: &str) -> Option<CallRef> {
        let captures = CALL_REFERENCE.captures(text)?;
        let target = if &captures[1] == "^^" { Target::Kernel } else { Target::Acting };
        let arguments = match (captures.get(4), captures.get(5)) {
            (Some(delimiter), Some(rest)) => rest.as_str().split(delimiter.as_str()).map(Value::coerce).collect(),
            _ => Vec::new(),
        };
        Some(CallRef { target, action: captures[2].to_string(), arguments })
    }
}

impl fmt::Display for CallRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let marker = match self.target {
            Target::Acting => "^",
            Target::Kernel => "^^",
        };
        write!(f, "{marker}{}", self.action)?;
        for argument in &self.arguments {
            write!(f, ":{}", text(argument))?;
        }
        Ok(())
    }
}

/// Replaces call references anywhere inside `value` by the results of the calls.
pub fn substitute(value: Value, acting: &Entry, kernel_entry: &Entry) -> Result<Value> {
    match value {
        Value::Text(candidate) => match CallRef::parse(&candidate) {
            Some(call) => {
                debug!(reference = %candidate, "substituting");
                let target = match call.target {
                    Target::Acting => acting,
                    Target::Kernel => kernel_entry,
                };
                target.call(&call.action, call.arguments, None)
            }
            None => Ok(Value::Text(candidate)),
        },
        Value::List(items) => Ok(Value::List(
            items
                .into_iter()
                .map(|item| substitute(item, acting, kernel_entry))
                .collect::<Result<_>>()?,
        )),
        Value::Map(map) => Ok(Value::Map(substitute_map(map, acting, kernel_entry)?)),
        other => Ok(other),
    }
}

fn substitute_map(map: Map, acting: &Entry, kernel_entry: &Entry) -> Result<Map> {
    map.into_iter()
        .map(|(key, value)| substitute(value, acting, kernel_entry).map(|value| (key, value)))
        .collect()
}

/// Runs `pipeline` from the kernel entry and returns the last step's result.
pub fn execute(kernel: &Kernel, pipeline: &Pipeline) -> Result<Value> {
    let kernel_entry = kernel.entry();
    let scratch = Entry::detached("runtime_entry", Map::new());
    let mut result = Value::Null;
    for (index, step) in pipeline.steps().iter().enumerate() {
        let acting = match &result {
            Value::Entry(entry) => Arc::clone(entry),
            _ => Arc::clone(&kernel_entry),
        };
        debug!(step = index, entry = %acting.name(), action = %step.action, "pipeline step");
        let previous_overlay = acting.overlay()?;
        acting.set_overlay(Some(Arc::clone(&scratch)))?;
        let outcome = run_step(&acting, &kernel_entry, step);
        acting.set_overlay(previous_overlay)?;
        result = outcome?;
        if let Some(label) = &step.label {
            scratch.set(label, result.clone())?;
        }
    }
    Ok(result)
}

fn run_step(acting: &Entry, kernel_entry: &Entry, step: &Step) -> Result<Value> {
    let positional = step
        .positional
        .iter()
        .cloned()
        .map(|argument| substitute_nested(argument, acting, kernel_entry))
        .collect::<Result<Vec<_>>>()?;
    let overrides = match &step.overrides {
        Some(overrides) => Some(
            overrides
                .iter()
                .map(|(key, value)| substitute_nested(value.clone(), acting, kernel_entry).map(|value| (key.clone(), value)))
                .collect::<Result<Map>>()?,
        ),
        None => None,
    };
    acting.call(&step.action, positional, overrides)
}

// only sequences and mappings are templates; bare scalars belong to the action
fn substitute_nested(argument: Value, acting: &Entry, kernel_entry: &Entry) -> Result<Value> {
    match argument {
        Value::List(_) | Value::Map(_) => substitute(argument, acting, kernel_entry),
        scalar => Ok(scalar),
    }
}
