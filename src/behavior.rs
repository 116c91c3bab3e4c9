//! Behavior units and how they are found.
//!
//! A behavior unit is a namespace of [`Action`]s associated with a storage
//! location. Rust code cannot be picked up from a directory at run time, so
//! the host registers units up front and the kernel asks a [`BehaviorLoader`]
//! for the unit living at a location. A loader must be safe to call more than
//! once, but each entry asks at most once and caches a miss permanently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::dispatch::Action;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct BehaviorUnit {
    name: String,
    doc: Option<String>,
    actions: IndexMap<String, Action>,
}
impl BehaviorUnit {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), doc: None, actions: IndexMap::new() }
    }
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }
    pub fn action(mut self, action: Action) -> Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
    pub fn get(&self, action_name: &str) -> Option<&Action> {
        self.actions.get(action_name)
    }
    pub fn action_names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }
}

pub trait BehaviorLoader: Send + Sync {
    /// Returns the unit called `unit_name` at `location`, or `None` when there
    /// is no code there.
    fn load_behavior_unit(&self, location: &Path, unit_name: &str) -> Result<Option<Arc<BehaviorUnit>>>;
}

/// In-process loader: units are registered against a location and unit name.
#[derive(Debug, Default)]
pub struct BehaviorRegistry {
    units: Mutex<HashMap<(PathBuf, String), Arc<BehaviorUnit>>>,
}
impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn register(&self, location: impl AsRef<Path>, unit_name: &str, unit: BehaviorUnit) -> Result<()> {
        let key = (crate::kernel::normalize(location.as_ref()), unit_name.to_string());
        self.units.lock()?.insert(key, Arc::new(unit));
        Ok(())
    }
}
impl BehaviorLoader for BehaviorRegistry {
    fn load_behavior_unit(&self, location: &Path, unit_name: &str) -> Result<Option<Arc<BehaviorUnit>>> {
        let key = (crate::kernel::normalize(location), unit_name.to_string());
        Ok(self.units.lock()?.get(&key).cloned())
    }
}
