//! Attribute and behavior inheritance.
//!
//! Any [`AttributeSource`] has own attributes, an optional overlay, and an
//! ordered list of parent sources. Lookups check own attributes, then the
//! overlay, then each parent depth-first, left to right; the first hit wins.
//! Actions are searched the same way, minus the overlay.
//!
//! There is no cycle detection. A parent cycle recurses without bound, so
//! declared ancestry must be acyclic.

use std::sync::Arc;

use tracing::debug;

use crate::dispatch::Action;
use crate::error::Result;
use crate::value::Value;

pub trait AttributeSource: Sized {
    fn source_name(&self) -> String;
    /// Raw own attribute, before any reference resolution.
    fn own_value(&self, key: &str) -> Result<Option<Value>>;
    /// Parents in declared order.
    fn parent_sources(&self) -> Result<Vec<Arc<Self>>>;
    /// Own behavior only.
    fn own_action(&self, action_name: &str) -> Result<Option<Action>>;
    /// Turns a reference descriptor found in this source's attributes into
    /// the value it stands for; other values come back unchanged.
    fn resolve_reference(&self, value: Value) -> Result<Value>;
    /// A source consulted after own attributes and before parents.
    fn overlay(&self) -> Result<Option<Arc<Self>>> {
        Ok(None)
    }
}

/// Inherited lookup of a top-level key.
pub fn lookup<S: AttributeSource>(source: &S, key: &str) -> Result<Option<Value>> {
    if let Some(value) = source.own_value(key)? {
        return Ok(Some(source.resolve_reference(value)?));
    }
    if let Some(overlay) = source.overlay()? {
        if let Some(value) = lookup(overlay.as_ref(), key)? {
            return Ok(Some(value));
        }
    }
    for parent in source.parent_sources()? {
        if let Some(value) = lookup(parent.as_ref(), key)? {
            debug!(entry = %source.source_name(), key, parent = %parent.source_name(), "inherited");
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Own-only lookup of a top-level key.
pub fn lookup_own<S: AttributeSource>(source: &S, key: &str) -> Result<Option<Value>> {
    match source.own_value(key)? {
        Some(value) => Ok(Some(source.resolve_reference(value)?)),
        None => Ok(None),
    }
}

/// Resolves the first segment (inherited or own-only), then descends through
/// mappings by key, sequences by index and entries by inherited lookup.
pub fn dig<S, P>(source: &S, path: &[P], parent_recursion: bool) -> Result<Option<Value>>
where
    S: AttributeSource,
    P: AsRef<str>,
{
    let Some((first, rest)) = path.split_first() else {
        return Ok(None);
    };
    let head = if parent_recursion {
        lookup(source, first.as_ref())?
    } else {
        lookup_own(source, first.as_ref())?
    };
    let mut current = match head {
        Some(value) => value,
        None => return Ok(None),
    };
    for segment in rest {
        let segment = segment.as_ref();
        current = match current {
            Value::Map(mut map) => match map.shift_remove(segment) {
                Some(value) => source.resolve_reference(value)?,
                None => return Ok(None),
            },
            Value::List(mut list) => match segment.parse::<usize>() {
                Ok(index) if index < list.len() => source.resolve_reference(list.swap_remove(index))?,
                _ => return Ok(None),
            },
            Value::Entry(entry) => match lookup(entry.as_ref(), segment)? {
                Some(value) => value,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
    }
    Ok(Some(current))
}

/// Finds an action in own behavior or, failing that, along the ancestry.
/// `ancestry_path` records the names of the sources visited on the way to
/// the one that had it.
pub fn reach_action<S: AttributeSource>(
    source: &S,
    action_name: &str,
    ancestry_path: &mut Vec<String>,
) -> Result<Option<Action>> {
    ancestry_path.push(source.source_name());
    if let Some(action) = source.own_action(action_name)? {
        return Ok(Some(action));
    }
    for parent in source.parent_sources()? {
        if let Some(action) = reach_action(parent.as_ref(), action_name, ancestry_path)? {
            return Ok(Some(action));
        }
        ancestry_path.pop();
    }
    Ok(None)
}
