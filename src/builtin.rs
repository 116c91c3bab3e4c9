//! Built-in methods every entry answers to, and the kernel's own namespace.
//!
//! Built-ins are searched last, after own and inherited behavior, so any
//! behavior unit can shadow them.

use std::path::PathBuf;
use std::sync::Arc;

use crate::behavior::BehaviorUnit;
use crate::dispatch::{Action, Signature};
use crate::entry::Entry;
use crate::error::{EntryError, Result};
use crate::pipeline::Pipeline;
use crate::value::Value;

pub const ENTRY_METHODS: &[&str] = &[
    "get",
    "dig",
    "plant",
    "pluck",
    "save",
    "remove",
    "get_name",
    "get_path",
    "own_attributes",
    "parent_names",
    "can",
    "list_own_actions",
    "help",
];

/// The built-in method called `name`, if there is one.
pub fn entry_method(name: &str) -> Option<Action> {
    let action = match name {
        "get" => Action::new(name, Signature::new().required("key").optional("default", Value::Null), |inv, args| {
            let [key, default] = arity::<2>("get", args)?;
            inv.entry().get_or(&text(&key), default)
        })
        .with_doc("Inherited lookup of a top-level attribute"),
        "dig" => Action::new(name, Signature::new().required("key_path").optional("safe", false), |inv, args| {
            let [key_path, safe] = arity::<2>("dig", args)?;
            if safe.truthy() {
                Ok(inv.entry().dig_safe(&text(&key_path))?.unwrap_or_default())
            } else {
                inv.entry().dig(&text(&key_path))
            }
        })
        .with_doc("Dotted path lookup through mappings, sequences and entries"),
        "plant" => Action::new(name, Signature::new().required("key_path").required("value"), |inv, args| {
            let [key_path, value] = arity::<2>("plant", args)?;
            inv.entry().plant(&text(&key_path), value)?;
            Ok(Value::Entry(Arc::clone(inv.entry())))
        }),
        "pluck" => Action::new(name, Signature::new().required("key_path"), |inv, args| {
            let [key_path] = arity::<1>("pluck", args)?;
            inv.entry().pluck(&text(&key_path))?;
            Ok(Value::Entry(Arc::clone(inv.entry())))
        }),
        "save" => Action::new(
            name,
            Signature::new().optional("update", Value::Null).optional("new_path", Value::Null),
            |inv, args| {
                let [update, new_path] = arity::<2>("save", args)?;
                let update = match update {
                    Value::Map(update) => Some(update),
                    Value::Null => None,
                    other => {
                        return Err(EntryError::Parse { message: format!("save expects a mapping to update with, got {other}") })
                    }
                };
                let new_path = new_path.as_str().map(PathBuf::from);
                Ok(Value::Entry(inv.entry().save_with(update, new_path.as_deref())?))
            },
        )
        .with_doc("Writes own attributes, optionally updated first or stored at a new location"),
        "remove" => Action::new(name, Signature::new(), |inv, _| Ok(Value::Bool(inv.entry().remove()?))),
        "get_name" => Action::new(name, Signature::new(), |inv, _| Ok(Value::Text(inv.entry().name()))),
        "get_path" => Action::new(name, Signature::new().optional("file_name", Value::Null), |inv, args| {
            let [file_name] = arity::<1>("get_path", args)?;
            let file_name = file_name.as_str().map(str::to_string);
            Ok(inv
                .entry()
                .get_path(file_name.as_deref())
                .map(|p| Value::Text(p.display().to_string()))
                .unwrap_or_default())
        }),
        "own_attributes" => Action::new(name, Signature::new(), |inv, _| Ok(Value::Map(inv.entry().own_attributes()?))),
        "parent_names" => Action::new(name, Signature::new(), |inv, _| {
            Ok(Value::List(inv.entry().parent_names()?.into_iter().map(Value::Text).collect()))
        }),
        "can" => Action::new(name, Signature::new().required("action_name"), |inv, args| {
            let [action_name] = arity::<1>("can", args)?;
            Ok(Value::Bool(inv.entry().can(&text(&action_name))?))
        }),
        "list_own_actions" => Action::new(name, Signature::new(), |inv, _| {
            Ok(Value::List(inv.entry().list_own_actions()?.into_iter().map(Value::Text).collect()))
        }),
        "help" => Action::new(name, Signature::new().optional("action_name", Value::Null), |inv, args| {
            let [action_name] = arity::<1>("help", args)?;
            match action_name.as_str() {
                Some(action_name) => help_on_action(inv.entry(), action_name),
                None => help_on_entry(inv.entry()),
            }
        }),
        _ => return None,
    };
    Some(action)
}

fn help_on_entry(entry: &Arc<Entry>) -> Result<Value> {
    let mut lines = vec![format!("Entry: {entry}")];
    if let Some(unit) = entry.load_behavior()? {
        if let Some(doc) = unit.doc() {
            lines.push(format!("Description: {doc}"));
        }
    }
    let parents = entry.parent_names()?;
    if !parents.is_empty() {
        lines.push(format!("Parents: {}", parents.join(", ")));
    }
    let own = entry.list_own_actions()?;
    if !own.is_empty() {
        lines.push(format!("Own actions: {}", own.join(", ")));
    }
    lines.push(format!("Built-in methods: {}", ENTRY_METHODS.join(", ")));
    Ok(Value::Text(lines.join("\n")))
}

fn help_on_action(entry: &Arc<Entry>, action_name: &str) -> Result<Value> {
    let (action, ancestry_path) = entry.reach_action(action_name)?;
    let mut lines = vec![format!("{}({})", action.name(), action.signature())];
    if ancestry_path.is_empty() {
        lines.push("Built-in method".to_string());
    } else {
        lines.push(format!("Reached via: {}", ancestry_path.join(" --> ")));
    }
    if let Some(doc) = action.doc() {
        lines.push(doc.to_string());
    }
    Ok(Value::Text(lines.join("\n")))
}

/// Actions of the kernel entry.
pub fn kernel_namespace() -> BehaviorUnit {
    BehaviorUnit::new("kernel")
        .with_doc("Finds entries by path, name or query, and hands out the core and work collections")
        .action(Action::new("version", Signature::new(), |inv, _| {
            Ok(Value::Text(inv.kernel()?.version().to_string()))
        }))
        .action(
            Action::new("bypath", Signature::new().required("path"), |inv, args| {
                let [path] = arity::<1>("bypath", args)?;
                Ok(Value::Entry(inv.kernel()?.bypath(text(&path))?))
            })
            .with_doc("The (cached) entry stored at a location"),
        )
        .action(
            Action::new("byname", Signature::new().required("name"), |inv, args| {
                let [name] = arity::<1>("byname", args)?;
                Ok(inv.kernel()?.byname(&text(&name))?.into())
            })
            .with_doc("First entry with the given name in the work or core collection"),
        )
        .action(
            Action::new(
                "byquery",
                Signature::new().required("query").optional("failover_pipeline", Value::Null),
                |inv, args| {
                    let [query, failover] = arity::<2>("byquery", args)?;
                    let failover = optional_pipeline(&failover)?;
                    Ok(inv.kernel()?.byquery(&text(&query), failover.as_ref())?.unwrap_or_default())
                },
            )
            .with_doc("First entry matching a query, produced on demand if nothing matches"),
        )
        .action(Action::new("core_collection", Signature::new(), |inv, _| {
            Ok(Value::Entry(inv.kernel()?.core_collection()?))
        }))
        .action(Action::new("work_collection", Signature::new(), |inv, _| {
            Ok(Value::Entry(inv.kernel()?.work_collection()?))
        }))
        .action(Action::new("work_root", Signature::new(), |inv, _| {
            Ok(Value::Entry(inv.kernel()?.work_root()?))
        }))
}

/// Splits a bound argument vector into exactly `N` values.
pub(crate) fn arity<const N: usize>(action_name: &str, arguments: Vec<Value>) -> Result<[Value; N]> {
    let given = arguments.len();
    arguments
        .try_into()
        .map_err(|_| EntryError::TooManyArguments { action: action_name.to_string(), accepted: N, given })
}

pub(crate) fn text(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn optional_pipeline(value: &Value) -> Result<Option<Pipeline>> {
    if value.truthy() {
        Ok(Some(Pipeline::from_value(value)?))
    } else {
        Ok(None)
    }
}

