//! Collections: entries whose `contained_entries` maps child names to
//! locations relative to the collection.
//!
//! [`walk`] is the universe every name or query lookup searches. It is lazy
//! and never cached, so each call sees children added or produced since the
//! last one.

use std::path::PathBuf;
use std::sync::Arc;

use indexmap::map::IntoIter;
use tracing::{debug, info, warn};

use crate::behavior::BehaviorUnit;
use crate::builtin::{arity, optional_pipeline, text};
use crate::dispatch::{Action, Signature};
use crate::entry::{CONTAINED_KEY, Entry, PRODUCER_RULES_KEY};
use crate::error::{EntryError, Result};
use crate::pipeline::Pipeline;
use crate::query::Query;
use crate::value::{Map, Value};

struct Frame {
    collection: Arc<Entry>,
    children: IntoIter<String, Value>,
}

/// Depth-first, pre-order traversal: a collection, then each child in
/// declared order, descending fully into child collections.
pub struct Walk {
    pending: Option<Arc<Entry>>,
    stack: Vec<Frame>,
}

impl Walk {
    fn open(collection: &Arc<Entry>) -> Result<Frame> {
        let children = match collection.get(CONTAINED_KEY)? {
            Some(Value::Map(children)) => children,
            _ => Map::new(),
        };
        debug!(collection = %collection.name(), children = children.len(), "walking contained_entries");
        Ok(Frame { collection: Arc::clone(collection), children: children.into_iter() })
    }
    fn resolve(collection: &Entry, name: &str, relative: &Value) -> Result<Arc<Entry>> {
        let relative = text(relative);
        let location = collection
            .get_path(Some(relative.as_str()))
            .unwrap_or_else(|| PathBuf::from(&relative));
        collection.kernel()?.bypath_named(location, name)
    }
}

impl Iterator for Walk {
    type Item = Result<Arc<Entry>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(collection) = self.pending.take() {
                return match Walk::open(&collection) {
                    Ok(frame) => {
                        self.stack.push(frame);
                        Some(Ok(collection))
                    }
                    Err(e) => Some(Err(e)),
                };
            }
            let frame = self.stack.last_mut()?;
            let Some((name, relative)) = frame.children.next() else {
                self.stack.pop();
                continue;
            };
            let child = match Walk::resolve(&frame.collection, &name, &relative) {
                Ok(child) => child,
                Err(e) => return Some(Err(e)),
            };
            match child.has_own(CONTAINED_KEY) {
                Ok(true) => self.pending = Some(child),
                Ok(false) => return Some(Ok(child)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

pub fn walk(root: &Arc<Entry>) -> Walk {
    Walk { pending: Some(Arc::clone(root)), stack: Vec::new() }
}

/// The first entry under `root` whose name is `name`; absence is not an error.
///
/// Names come from the cached entry objects. A child's declared name is only
/// given to its entry when the walk is the first to resolve that location, so
/// a child already fetched through [`Kernel::bypath`](crate::kernel::Kernel::bypath)
/// keeps the name taken from its directory and is not found under the
/// declared one.
pub fn byname(root: &Arc<Entry>, name: &str) -> Result<Option<Arc<Entry>>> {
    for candidate in walk(root) {
        let candidate = candidate?;
        if candidate.name() == name {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Searches `roots` in order for the first entry matching `query_text`.
///
/// When nothing matches, runs `failover` if given. Otherwise, if the query
/// has positive tags, fires the first producer rule whose tags they cover,
/// moving on to the next whenever one yields a falsy result. An error from a
/// producer ends the whole query.
pub fn byquery(
    roots: &[Arc<Entry>],
    query_text: &str,
    failover: Option<&Pipeline>,
    parent_recursion: bool,
) -> Result<Option<Value>> {
    let query = Query::parse(query_text)?;
    for root in roots {
        for candidate in walk(root) {
            let candidate = candidate?;
            if query.matches(&candidate, parent_recursion)? {
                debug!(query = query_text, found = %candidate, "byquery matched");
                return Ok(Some(Value::Entry(candidate)));
            }
        }
    }
    let Some(first_root) = roots.first() else {
        return Ok(None);
    };
    if let Some(failover) = failover {
        debug!(query = query_text, "byquery did not find anything, running the failover pipeline");
        let result = first_root.kernel()?.execute(failover)?;
        return Ok((!result.is_null()).then_some(result));
    }
    if query.positive_tags().is_empty() {
        debug!(query = query_text, "byquery did not find anything, and there are no tags to produce from");
        return Ok(None);
    }
    for root in roots {
        for candidate in walk(root) {
            let producer = candidate?;
            let rules = match producer.get(PRODUCER_RULES_KEY)? {
                Some(Value::Map(rules)) => rules,
                _ => continue,
            };
            for (action_name, offered) in rules {
                let offered = tag_list(&offered);
                if !query.satisfied_by(&offered) {
                    continue;
                }
                info!(producer = %producer.name(), action = %action_name, tags = ?offered, "firing producer rule");
                let produced = producer.call(&action_name, Vec::new(), Some(query.positive_values().clone()))?;
                if produced.truthy() {
                    return Ok(Some(produced));
                }
                warn!(producer = %producer.name(), action = %action_name, "producer rule did not work, trying the next one");
            }
        }
    }
    Ok(None)
}

fn tag_list(offered: &Value) -> Vec<String> {
    match offered {
        Value::List(tags) => tags.iter().map(text).collect(),
        Value::Text(tag) => vec![tag.clone()],
        _ => Vec::new(),
    }
}

/// Records `name -> relative` among the collection's own children and saves
/// it. The collection is left untouched if the name is taken.
pub fn attach(root: &Entry, name: &str, relative: &str) -> Result<()> {
    let mut children = match root.get_own(CONTAINED_KEY)? {
        Some(Value::Map(children)) => children,
        _ => Map::new(),
    };
    if let Some(existing) = children.get(name) {
        return Err(EntryError::DuplicateChildName { name: name.to_string(), existing: text(existing) });
    }
    children.insert(name.to_string(), Value::Text(relative.to_string()));
    root.set(CONTAINED_KEY, children)?;
    root.save()
}

/// A fresh entry stored next to the collection's attributes, attached under `name`.
pub fn new_entry(root: &Arc<Entry>, name: &str) -> Result<Arc<Entry>> {
    let location = root
        .get_path(Some(name))
        .ok_or_else(|| EntryError::Persistence(format!("collection {} has no location", root.name())))?;
    attach(root, name, name)?;
    let created = root.kernel()?.bypath_named(location, name)?;
    created.save()?;
    info!(collection = %root.name(), entry = name, "new entry");
    Ok(created)
}

/// Attaches an existing location; locations inside the collection are stored relative to it.
pub fn add_entry_path(root: &Arc<Entry>, new_entry_path: &str, new_entry_name: Option<&str>) -> Result<Arc<Entry>> {
    let path = PathBuf::from(new_entry_path);
    let relative = match root.location().and_then(|l| path.strip_prefix(l).ok()) {
        Some(inside) => inside.to_path_buf(),
        None => path.clone(),
    };
    let name = match new_entry_name {
        Some(name) => name.to_string(),
        None => relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| new_entry_path.to_string()),
    };
    attach(root, &name, &relative.display().to_string())?;
    Ok(Arc::clone(root))
}

/// Drops a child reference; the child's own storage is left alone.
pub fn remove_entry_name(root: &Arc<Entry>, old_entry_name: &str) -> Result<Arc<Entry>> {
    let mut children = match root.get_own(CONTAINED_KEY)? {
        Some(Value::Map(children)) => children,
        _ => Map::new(),
    };
    if children.shift_remove(old_entry_name).is_some() {
        root.set(CONTAINED_KEY, children)?;
    }
    root.save()?;
    Ok(Arc::clone(root))
}

/// Actions every collection answers to.
pub fn namespace() -> BehaviorUnit {
    BehaviorUnit::new("collection")
        .with_doc("This entry knows how to find, make and attach other entries")
        .action(Action::new("walk", Signature::new(), |inv, _| {
            Ok(Value::List(walk(inv.entry()).map(|e| e.map(Value::Entry)).collect::<Result<_>>()?))
        }))
        .action(
            Action::new("byname", Signature::new().required("name"), |inv, args| {
                let [name] = arity::<1>("byname", args)?;
                Ok(byname(inv.entry(), &text(&name))?.into())
            })
            .with_doc("Fetch an entry by name"),
        )
        .action(
            Action::new(
                "byquery",
                Signature::new()
                    .required("query")
                    .optional("failover_pipeline", Value::Null)
                    .optional("parent_recursion", false),
                |inv, args| {
                    let [query, failover, parent_recursion] = arity::<3>("byquery", args)?;
                    let failover = optional_pipeline(&failover)?;
                    let roots = [Arc::clone(inv.entry())];
                    Ok(byquery(&roots, &text(&query), failover.as_ref(), parent_recursion.truthy())?.unwrap_or_default())
                },
            )
            .with_doc("Fetch an entry by query, producing one on demand when nothing matches"),
        )
        .action(
            Action::new("new", Signature::new().required("name"), |inv, args| {
                let [name] = arity::<1>("new", args)?;
                Ok(Value::Entry(new_entry(inv.entry(), &text(&name))?))
            })
            .with_doc("Create a new entry with the given name and attach it to this collection"),
        )
        .action(
            Action::new(
                "add_entry_path",
                Signature::new().required("new_entry_path").optional("new_entry_name", Value::Null),
                |inv, args| {
                    let [path, name] = arity::<2>("add_entry_path", args)?;
                    let name = name.as_str().map(str::to_string);
                    Ok(Value::Entry(add_entry_path(inv.entry(), &text(&path), name.as_deref())?))
                },
            )
            .with_doc("Add an existing entry to the collection given its path"),
        )
        .action(Action::new("remove_entry_name", Signature::new().required("old_entry_name"), |inv, args| {
            let [name] = arity::<1>("remove_entry_name", args)?;
            Ok(Value::Entry(remove_entry_name(inv.entry(), &text(&name))?))
        }))
}
