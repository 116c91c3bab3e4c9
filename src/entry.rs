//! Entries: named, storage-backed holders of attributes and behavior.
//!
//! An entry lazily loads three things, each at most once per object lifetime:
//! its own attributes (from the storage backend), its behavior unit (from the
//! behavior loader) and its parents (from the reserved `_parent_entries`
//! attribute). Each is a [`Lazy`] so that "not looked at yet" and "looked and
//! found nothing" stay distinct; a missing behavior unit is never retried.
//!
//! Locks guarding those fields are only ever held for the duration of a read
//! or a write of the field itself, never across a call into another entry or
//! an action body. The kernel is single-actor; concurrent callers must
//! serialize access themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, warn};

use crate::ancestry::{self, AttributeSource};
use crate::behavior::BehaviorUnit;
use crate::builtin;
use crate::config::{DEFAULT_ATTRIBUTES_FILE, DEFAULT_BEHAVIOR_UNIT};
use crate::dispatch::{Action, Invocation, NamedSource};
use crate::error::{EntryError, Result};
use crate::kernel::{normalize, Kernel};
use crate::value::{Map, Value};

pub const PARENTS_KEY: &str = "_parent_entries";
pub const CONTAINED_KEY: &str = "contained_entries";
pub const PRODUCER_RULES_KEY: &str = "producer_rules";
pub const TAGS_KEY: &str = "tags";

/// Reference descriptor markers: dispatch via the kernel, dispatch via the
/// entry holding the attribute, or take the rest literally.
pub const KERNEL_REFERENCE: &str = "^";
pub const ENTRY_REFERENCE: &str = "^^";
pub const LITERAL_REFERENCE: &str = "AS^IS";

#[derive(Debug, Clone)]
pub enum Lazy<T> {
    Unloaded,
    Absent,
    Present(T),
}
impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Lazy::Unloaded
    }
}
impl<T> Lazy<T> {
    pub fn is_unloaded(&self) -> bool {
        matches!(self, Lazy::Unloaded)
    }
    pub fn present(&self) -> Option<&T> {
        match self {
            Lazy::Present(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct EntryBuilder {
    name: Option<String>,
    location: Option<PathBuf>,
    attributes_location: Option<PathBuf>,
    unit_name: Option<String>,
    kernel: Weak<Kernel>,
    attributes: Lazy<Map>,
    behavior: Lazy<Arc<BehaviorUnit>>,
    parents: Lazy<Vec<Arc<Entry>>>,
}
impl EntryBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
    /// Reads attributes from this exact document instead of one inside the location.
    pub fn attributes_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.attributes_location = Some(location.into());
        self
    }
    pub fn unit_name(mut self, unit_name: &str) -> Self {
        self.unit_name = Some(unit_name.to_string());
        self
    }
    pub fn kernel(mut self, kernel: Weak<Kernel>) -> Self {
        self.kernel = kernel;
        self
    }
    /// Preloaded own attributes; storage will not be consulted.
    pub fn attributes(mut self, attributes: Map) -> Self {
        self.attributes = Lazy::Present(attributes);
        self
    }
    /// Preloaded behavior; `None` records "no code here".
    pub fn behavior(mut self, behavior: Option<BehaviorUnit>) -> Self {
        self.behavior = match behavior {
            Some(unit) => Lazy::Present(Arc::new(unit)),
            None => Lazy::Absent,
        };
        self
    }
    /// Preresolved parents; the `_parent_entries` attribute will not be consulted.
    pub fn parents(mut self, parents: Vec<Arc<Entry>>) -> Self {
        self.parents = if parents.is_empty() { Lazy::Absent } else { Lazy::Present(parents) };
        self
    }
    pub fn build(self) -> Arc<Entry> {
        Arc::new_cyclic(|me| Entry {
            me: me.clone(),
            name: self.name,
            location: self.location,
            attributes_location: self.attributes_location,
            unit_name: self.unit_name,
            kernel: self.kernel,
            attributes: Mutex::new(self.attributes),
            behavior: Mutex::new(self.behavior),
            parents: Mutex::new(self.parents),
            overlay: Mutex::new(None),
        })
    }
}

pub struct Entry {
    me: Weak<Entry>,
    name: Option<String>,
    location: Option<PathBuf>,
    attributes_location: Option<PathBuf>,
    unit_name: Option<String>,
    kernel: Weak<Kernel>,
    attributes: Mutex<Lazy<Map>>,
    behavior: Mutex<Lazy<Arc<BehaviorUnit>>>,
    parents: Mutex<Lazy<Vec<Arc<Entry>>>>,
    overlay: Mutex<Option<Arc<Entry>>>,
}

impl Entry {
    pub fn builder() -> EntryBuilder {
        EntryBuilder::default()
    }
    /// A storage-less entry with the given own attributes and no behavior.
    pub fn detached(name: &str, attributes: Map) -> Arc<Entry> {
        Entry::builder().name(name).attributes(attributes).behavior(None).build()
    }

    // ------------- Identity -------------
    pub fn handle(&self) -> Result<Arc<Entry>> {
        self.me
            .upgrade()
            .ok_or_else(|| EntryError::InvalidReference(format!("entry {} is being dropped", self.name())))
    }
    pub fn name(&self) -> String {
        match (&self.name, &self.location) {
            (Some(name), _) => name.clone(),
            (None, Some(location)) => location
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            (None, None) => String::new(),
        }
    }
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
    /// The location, optionally joined with a relative file name. Absolute
    /// file names are returned as they are.
    pub fn get_path(&self, file_name: Option<&str>) -> Option<PathBuf> {
        match file_name {
            Some(file_name) if Path::new(file_name).is_absolute() => Some(PathBuf::from(file_name)),
            Some(file_name) => self.location.as_ref().map(|l| l.join(file_name)),
            None => self.location.clone(),
        }
    }
    pub fn kernel(&self) -> Result<Arc<Kernel>> {
        self.kernel
            .upgrade()
            .ok_or_else(|| EntryError::InvalidReference(format!("entry {} is not attached to a kernel", self.name())))
    }
    pub fn attributes_location(&self) -> Option<PathBuf> {
        if let Some(path) = &self.attributes_location {
            return Some(path.clone());
        }
        let file_name = match self.kernel.upgrade() {
            Some(kernel) => kernel.config().attributes_file.clone(),
            None => DEFAULT_ATTRIBUTES_FILE.to_string(),
        };
        self.location.as_ref().map(|l| l.join(file_name))
    }
    pub fn unit_name(&self) -> String {
        if let Some(unit_name) = &self.unit_name {
            return unit_name.clone();
        }
        match self.kernel.upgrade() {
            Some(kernel) => kernel.config().behavior_unit.clone(),
            None => DEFAULT_BEHAVIOR_UNIT.to_string(),
        }
    }

    // ------------- Attributes -------------
    fn read_attributes(&self) -> Result<Lazy<Map>> {
        let (Some(kernel), Some(path)) = (self.kernel.upgrade(), self.attributes_location()) else {
            return Ok(Lazy::Absent);
        };
        match kernel.storage().read_structured(&path)? {
            Some(Value::Map(map)) => {
                debug!(entry = %self.name(), path = %path.display(), keys = map.len(), "attributes loaded");
                Ok(Lazy::Present(map))
            }
            Some(_) => Err(EntryError::Persistence(format!(
                "attributes document {} is not a mapping",
                path.display()
            ))),
            None => {
                debug!(entry = %self.name(), path = %path.display(), "no attributes document");
                Ok(Lazy::Absent)
            }
        }
    }
    fn with_attributes<R>(&self, f: impl FnOnce(&mut Lazy<Map>) -> R) -> Result<R> {
        let mut attributes = self.attributes.lock()?;
        if attributes.is_unloaded() {
            *attributes = self.read_attributes()?;
        }
        Ok(f(&mut attributes))
    }
    fn with_attributes_mut<R>(&self, f: impl FnOnce(&mut Map) -> R) -> Result<R> {
        self.with_attributes(|attributes| {
            let mut map = match std::mem::take(attributes) {
                Lazy::Present(map) => map,
                _ => Map::new(),
            };
            let result = f(&mut map);
            *attributes = Lazy::Present(map);
            result
        })
    }
    /// Loads own attributes if needed; loading happens once per entry.
    pub fn load_attributes(&self) -> Result<()> {
        self.with_attributes(|_| ())
    }
    /// Whether a stored attribute document was found (or attributes were set).
    pub fn has_attributes(&self) -> Result<bool> {
        self.with_attributes(|attributes| matches!(attributes, Lazy::Present(_)))
    }
    pub fn own_attributes(&self) -> Result<Map> {
        self.with_attributes(|attributes| attributes.present().cloned().unwrap_or_default())
    }
    pub fn has_own(&self, key: &str) -> Result<bool> {
        self.with_attributes(|attributes| attributes.present().is_some_and(|m| m.contains_key(key)))
    }
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        ancestry::lookup(self, key)
    }
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }
    pub fn get_strict(&self, key: &str) -> Result<Value> {
        self.get(key)?
            .ok_or_else(|| EntryError::KeyNotFound { key: key.to_string(), entry: self.name() })
    }
    pub fn get_own(&self, key: &str) -> Result<Option<Value>> {
        ancestry::lookup_own(self, key)
    }
    /// Dotted path lookup, failing with `PathNotFound` on a miss.
    pub fn dig(&self, key_path: &str) -> Result<Value> {
        self.dig_safe(key_path)?
            .ok_or_else(|| EntryError::PathNotFound { path: key_path.to_string(), entry: self.name() })
    }
    /// Dotted path lookup returning `None` on a miss.
    pub fn dig_safe(&self, key_path: &str) -> Result<Option<Value>> {
        ancestry::dig(self, &split_path(key_path), true)
    }
    pub fn dig_with(&self, key_path: &[String], parent_recursion: bool) -> Result<Option<Value>> {
        ancestry::dig(self, key_path, parent_recursion)
    }
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.with_attributes_mut(|map| {
            map.insert(key.to_string(), value);
        })
    }
    /// Writes `value` at a dotted path in own attributes, creating
    /// intermediate mappings as needed.
    pub fn plant(&self, key_path: &str, value: impl Into<Value>) -> Result<()> {
        let segments = split_path(key_path);
        let value = value.into();
        self.with_attributes_mut(|map| plant_into(map, &segments, value))
    }
    /// Removes and returns the value at a dotted path in own attributes.
    pub fn pluck(&self, key_path: &str) -> Result<Option<Value>> {
        let segments = split_path(key_path);
        self.with_attributes(|attributes| match attributes {
            Lazy::Present(map) => pluck_from(map, &segments),
            _ => None,
        })
    }
    /// Merges overrides into own attributes.
    pub fn merge(&self, overrides: Map) -> Result<()> {
        self.with_attributes_mut(|map| map.extend(overrides))
    }

    /// Writes own attributes to the storage backend. Behavior and derived
    /// state are never written.
    pub fn save(&self) -> Result<()> {
        let kernel = self.kernel()?;
        let path = self
            .attributes_location()
            .ok_or_else(|| EntryError::Persistence(format!("entry {} has no location", self.name())))?;
        let attributes = self.own_attributes()?;
        kernel.storage().write_structured(&path, &Value::Map(attributes))?;
        self.with_attributes(|attributes| {
            if !matches!(attributes, Lazy::Present(_)) {
                *attributes = Lazy::Present(Map::new());
            }
        })?;
        debug!(entry = %self.name(), path = %path.display(), "attributes saved");
        Ok(())
    }
    /// Merges `update` into own attributes and saves. With `new_path`, the
    /// attributes are stored at that location instead (missing directories
    /// are created) and the entry living there is returned; this entry keeps
    /// its location and its stored document is left untouched.
    pub fn save_with(&self, update: Option<Map>, new_path: Option<&Path>) -> Result<Arc<Entry>> {
        if let Some(update) = update {
            self.merge(update)?;
        }
        let kernel = self.kernel()?;
        let new_path = match new_path {
            Some(new_path) if self.location.as_deref() != Some(&*normalize(new_path)) => new_path,
            _ => {
                self.save()?;
                return self.handle();
            }
        };
        let attributes = self.own_attributes()?;
        kernel.forget(new_path)?;
        let copy = kernel.bypath(new_path)?;
        copy.with_attributes(|stored| *stored = Lazy::Present(attributes))?;
        copy.save()?;
        info!(entry = %self.name(), new_path = %new_path.display(), "attributes saved to a new location");
        Ok(copy)
    }
    /// Deletes the stored attributes and drops the entry from the kernel cache.
    pub fn remove(&self) -> Result<bool> {
        let kernel = self.kernel()?;
        let removed = match self.attributes_location() {
            Some(path) => kernel.storage().remove_structured(&path)?,
            None => false,
        };
        if let Some(location) = &self.location {
            kernel.forget(location)?;
        }
        *self.attributes.lock()? = Lazy::Absent;
        debug!(entry = %self.name(), removed, "entry removed");
        Ok(removed)
    }

    // ------------- Behavior -------------
    /// Loads the behavior unit if needed. A miss or a loader failure is
    /// recorded as absent and never retried.
    pub fn load_behavior(&self) -> Result<Option<Arc<BehaviorUnit>>> {
        let mut behavior = self.behavior.lock()?;
        if behavior.is_unloaded() {
            *behavior = match (self.kernel.upgrade(), &self.location) {
                (Some(kernel), Some(location)) => {
                    let unit_name = self.unit_name();
                    match kernel.load_behavior(location, &unit_name) {
                        Ok(Some(unit)) => {
                            debug!(entry = %self.name(), unit = %unit_name, "behavior loaded");
                            Lazy::Present(unit)
                        }
                        Ok(None) => Lazy::Absent,
                        Err(e) => {
                            warn!(entry = %self.name(), error = %e, "behavior failed to load, treating as absent");
                            Lazy::Absent
                        }
                    }
                }
                _ => Lazy::Absent,
            };
        }
        Ok(behavior.present().cloned())
    }
    pub fn list_own_actions(&self) -> Result<Vec<String>> {
        Ok(self.load_behavior()?.map(|unit| unit.action_names()).unwrap_or_default())
    }

    // ------------- Parents -------------
    /// Parents in declared order, resolved from `_parent_entries` once.
    pub fn parents(&self) -> Result<Vec<Arc<Entry>>> {
        {
            let parents = self.parents.lock()?;
            match &*parents {
                Lazy::Present(parents) => return Ok(parents.clone()),
                Lazy::Absent => return Ok(Vec::new()),
                Lazy::Unloaded => (),
            }
        }
        // resolved without holding the lock, since references may dispatch actions
        let resolved = self.resolve_parents()?;
        let mut parents = self.parents.lock()?;
        if parents.is_unloaded() {
            *parents = if resolved.is_empty() { Lazy::Absent } else { Lazy::Present(resolved.clone()) };
        }
        Ok(parents.present().cloned().unwrap_or_default())
    }
    /// Forgets resolved parents so that the next lookup re-reads the declaration.
    pub fn reset_parents(&self) -> Result<()> {
        *self.parents.lock()? = Lazy::Unloaded;
        Ok(())
    }
    pub fn parent_names(&self) -> Result<Vec<String>> {
        Ok(self.parents()?.iter().map(|p| p.name()).collect())
    }
    fn resolve_parents(&self) -> Result<Vec<Arc<Entry>>> {
        let declared = match self.own_value(PARENTS_KEY)? {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::List(items)) if !is_reference(&items) => items,
            Some(single) => vec![single],
        };
        let mut parents = Vec::with_capacity(declared.len());
        for declaration in declared {
            let parent = match self.resolve_reference(declaration)? {
                Value::Entry(entry) => entry,
                Value::Text(path) => {
                    let path = PathBuf::from(path);
                    let path = if path.is_absolute() {
                        path
                    } else {
                        match self.location.as_ref().and_then(|l| l.parent()) {
                            Some(container) => container.join(path),
                            None => path,
                        }
                    };
                    self.kernel()?.bypath(path)?
                }
                other => {
                    return Err(EntryError::InvalidReference(format!(
                        "parent declaration {} of {} does not resolve to an entry",
                        other,
                        self.name()
                    )));
                }
            };
            parents.push(parent);
        }
        debug!(entry = %self.name(), parents = ?parents.iter().map(|p| p.name()).collect::<Vec<_>>(), "parents resolved");
        Ok(parents)
    }

    // ------------- Overlay -------------
    pub(crate) fn set_overlay(&self, overlay: Option<Arc<Entry>>) -> Result<()> {
        *self.overlay.lock()? = overlay;
        Ok(())
    }

    // ------------- Actions -------------
    /// Finds an action in own behavior, then along the ancestry, then among
    /// the built-in methods.
    pub fn reach_action(&self, action_name: &str) -> Result<(Action, Vec<String>)> {
        let mut ancestry_path = Vec::new();
        if let Some(action) = ancestry::reach_action(self, action_name, &mut ancestry_path)? {
            debug!(entry = %self.name(), action = action_name, ancestry = %ancestry_path.join(" --> "), "reached as a function");
            return Ok((action, ancestry_path));
        }
        if let Some(action) = builtin::entry_method(action_name) {
            debug!(entry = %self.name(), action = action_name, "reached as a built-in method");
            return Ok((action, Vec::new()));
        }
        Err(EntryError::ActionNotFound {
            action: action_name.to_string(),
            ancestry: ancestry_path.join(" --> "),
        })
    }
    pub fn can(&self, action_name: &str) -> Result<bool> {
        match self.reach_action(action_name) {
            Ok(_) => Ok(true),
            Err(EntryError::ActionNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
    /// Calls an own, inherited or built-in action. Overrides are merged into
    /// own attributes first so that binding and the action itself see them.
    pub fn call(&self, action_name: &str, positional: Vec<Value>, overrides: Option<Map>) -> Result<Value> {
        debug!(entry = %self.name(), action = action_name, positional = ?positional, "calling");
        if let Some(overrides) = overrides {
            self.merge(overrides)?;
        }
        let (action, _) = self.reach_action(action_name)?;
        let me = self.handle()?;
        let result = action.invoke(&Invocation::new(&me), positional, self)?;
        debug!(entry = %self.name(), action = action_name, result = %result, "called");
        Ok(result)
    }
}

impl AttributeSource for Entry {
    fn source_name(&self) -> String {
        self.name()
    }
    fn own_value(&self, key: &str) -> Result<Option<Value>> {
        self.with_attributes(|attributes| attributes.present().and_then(|m| m.get(key).cloned()))
    }
    fn parent_sources(&self) -> Result<Vec<Arc<Self>>> {
        self.parents()
    }
    fn own_action(&self, action_name: &str) -> Result<Option<Action>> {
        Ok(self.load_behavior()?.and_then(|unit| unit.get(action_name).cloned()))
    }
    fn resolve_reference(&self, value: Value) -> Result<Value> {
        let Value::List(items) = value else {
            return Ok(value);
        };
        if !is_reference(&items) {
            return Ok(Value::List(items));
        }
        let mut items = items.into_iter();
        let marker = items.next().and_then(|m| m.as_str().map(str::to_string)).unwrap_or_default();
        if marker == LITERAL_REFERENCE {
            return Ok(Value::List(items.collect()));
        }
        let action_name = match items.next() {
            Some(Value::Text(action_name)) => action_name,
            _ => {
                return Err(EntryError::InvalidReference(format!(
                    "reference in {} does not name an action",
                    self.name()
                )));
            }
        };
        let positional: Vec<Value> = items.collect();
        debug!(entry = %self.name(), marker = %marker, action = %action_name, "resolving reference");
        if marker == ENTRY_REFERENCE {
            self.call(&action_name, positional, None)
        } else {
            self.kernel()?.entry().call(&action_name, positional, None)
        }
    }
    fn overlay(&self) -> Result<Option<Arc<Self>>> {
        Ok(self.overlay.lock()?.clone())
    }
}

impl NamedSource for Entry {
    fn lookup(&self, name: &str) -> Result<Option<Value>> {
        self.get(name)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.name(), location.display()),
            None => write!(f, "{}", self.name()),
        }
    }
}
impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name())
            .field("location", &self.location)
            .finish()
    }
}

pub fn split_path(key_path: &str) -> Vec<String> {
    key_path.split('.').map(str::to_string).collect()
}

/// Whether a sequence is a reference descriptor rather than plain data.
pub fn is_reference(items: &[Value]) -> bool {
    matches!(
        items.first().and_then(Value::as_str),
        Some(KERNEL_REFERENCE) | Some(ENTRY_REFERENCE) | Some(LITERAL_REFERENCE)
    )
}

fn plant_into(map: &mut Map, segments: &[String], value: Value) {
    match segments {
        [] => (),
        [last] => {
            map.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let slot = map.entry(first.clone()).or_insert_with(|| Value::Map(Map::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(Map::new());
            }
            if let Value::Map(inner) = slot {
                plant_into(inner, rest, value);
            }
        }
    }
}

fn pluck_from(map: &mut Map, segments: &[String]) -> Option<Value> {
    let (last, init) = segments.split_last()?;
    let mut current = map;
    for segment in init {
        current = match current.get_mut(segment) {
            Some(Value::Map(inner)) => inner,
            _ => return None,
        };
    }
    current.shift_remove(last)
}
