//! The kernel: one place to create, cache and find entries.
//!
//! Within one kernel, a normalized location maps to at most one live
//! [`Entry`]; every resolution of the same location hands out the same
//! object, so mutations through one handle are visible through all of them.
//! The cache has no expiry within a run.
//!
//! The kernel is itself reachable as an entry (see [`Kernel::entry`]) whose
//! behavior is the kernel's own action namespace. Pipelines start there and
//! fall back there whenever a step yields plain data.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use seahash::SeaHasher;
use tracing::{debug, info};

use crate::behavior::{BehaviorLoader, BehaviorRegistry, BehaviorUnit};
use crate::builtin;
use crate::collection;
use crate::config::KernelConfig;
use crate::entry::{CONTAINED_KEY, Entry, PARENTS_KEY};
use crate::error::Result;
use crate::persist::{JsonFileStorage, MemoryStorage, PersistenceMode, Storage};
use crate::pipeline::{self, Pipeline};
use crate::value::{Map, Value};

pub type EntryHasher = BuildHasherDefault<SeaHasher>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How a location is turned into an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nature {
    /// A bare attribute document.
    Data,
    /// A bare behavior unit, named by the file stem.
    Behavior { unit_name: String },
    /// A directory holding an attribute document and maybe a behavior unit.
    Standard,
}

pub struct Kernel {
    me: Weak<Kernel>,
    config: KernelConfig,
    storage: Arc<dyn Storage>,
    loader: Arc<dyn BehaviorLoader>,
    collection_unit: Arc<BehaviorUnit>,
    entry_cache: Mutex<HashMap<PathBuf, Arc<Entry>, EntryHasher>>,
    entry: Arc<Entry>,
}

impl Kernel {
    pub fn new(config: KernelConfig, storage: Arc<dyn Storage>, loader: Arc<dyn BehaviorLoader>) -> Arc<Kernel> {
        Arc::new_cyclic(|me: &Weak<Kernel>| {
            let entry = Entry::builder()
                .name("kernel")
                .kernel(me.clone())
                .attributes(Map::new())
                .behavior(Some(builtin::kernel_namespace()))
                .parents(Vec::new())
                .build();
            Kernel {
                me: me.clone(),
                config,
                storage,
                loader,
                collection_unit: Arc::new(collection::namespace()),
                entry_cache: Mutex::new(HashMap::default()),
                entry,
            }
        })
    }
    /// Kernel over the storage backend named in the config, with an empty
    /// behavior registry the host can populate.
    pub fn from_config(config: KernelConfig) -> (Arc<Kernel>, Arc<BehaviorRegistry>) {
        let storage: Arc<dyn Storage> = match config.persistence {
            PersistenceMode::InMemory => Arc::new(MemoryStorage::new()),
            PersistenceMode::Files => Arc::new(JsonFileStorage::new()),
        };
        let registry = Arc::new(BehaviorRegistry::new());
        let kernel = Kernel::new(config, storage, registry.clone());
        (kernel, registry)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
    /// The kernel as an actionable entry.
    pub fn entry(&self) -> Arc<Entry> {
        Arc::clone(&self.entry)
    }
    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Behavior for `location`; the core collection carries the collection
    /// namespace, everything else is up to the loader.
    pub fn load_behavior(&self, location: &Path, unit_name: &str) -> Result<Option<Arc<BehaviorUnit>>> {
        if unit_name == self.config.behavior_unit && normalize(location) == normalize(&self.config.core_collection) {
            return Ok(Some(Arc::clone(&self.collection_unit)));
        }
        self.loader.load_behavior_unit(location, unit_name)
    }

    pub fn nature(&self, location: &Path) -> Nature {
        match location.extension().and_then(|e| e.to_str()) {
            Some("json") => Nature::Data,
            Some(extension) if extension == self.config.behavior_extension => Nature::Behavior {
                unit_name: location
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            },
            _ => Nature::Standard,
        }
    }

    /// Returns the cached entry for `location`, creating and caching it on a miss.
    pub fn bypath(&self, location: impl AsRef<Path>) -> Result<Arc<Entry>> {
        self.resolve(location.as_ref(), None)
    }
    /// Like [`Kernel::bypath`], naming the entry if it has to be created. The
    /// name is ignored on a cache hit.
    pub fn bypath_named(&self, location: impl AsRef<Path>, name: &str) -> Result<Arc<Entry>> {
        self.resolve(location.as_ref(), Some(name))
    }
    fn resolve(&self, location: &Path, name: Option<&str>) -> Result<Arc<Entry>> {
        let location = normalize(location);
        let mut cache = self.entry_cache.lock()?;
        if let Some(hit) = cache.get(&location) {
            debug!(path = %location.display(), "bypath: cache HIT");
            return Ok(Arc::clone(hit));
        }
        debug!(path = %location.display(), "bypath: cache MISS");
        let me = self.me.clone();
        let entry = match self.nature(&location) {
            Nature::Data => Entry::builder()
                .name("AdHoc_data")
                .location(location.clone())
                .attributes_location(location.clone())
                .behavior(None)
                .kernel(me)
                .build(),
            Nature::Behavior { unit_name } => Entry::builder()
                .name("AdHoc_functions")
                .location(location.parent().map(Path::to_path_buf).unwrap_or_default())
                .unit_name(&unit_name)
                .attributes(Map::new())
                .parents(Vec::new())
                .kernel(me)
                .build(),
            Nature::Standard => {
                let builder = Entry::builder().location(location.clone()).kernel(me);
                match name {
                    Some(name) => builder.name(name).build(),
                    None => builder.build(),
                }
            }
        };
        cache.insert(location, Arc::clone(&entry));
        Ok(entry)
    }
    pub fn cached(&self, location: impl AsRef<Path>) -> Result<Option<Arc<Entry>>> {
        Ok(self.entry_cache.lock()?.get(&normalize(location.as_ref())).cloned())
    }
    /// Drops a location from the cache; the next resolution builds a fresh entry.
    pub fn forget(&self, location: impl AsRef<Path>) -> Result<Option<Arc<Entry>>> {
        Ok(self.entry_cache.lock()?.remove(&normalize(location.as_ref())))
    }

    pub fn core_collection(&self) -> Result<Arc<Entry>> {
        self.bypath(&self.config.core_collection)
    }
    /// The writable root collection, initialized on first use with the core
    /// collection as its only parent and no children.
    pub fn work_collection(&self) -> Result<Arc<Entry>> {
        let work = self.bypath(&self.config.work_collection)?;
        if !work.has_attributes()? {
            let core_path = normalize(&self.config.core_collection);
            work.set(PARENTS_KEY, Value::List(vec![Value::Text(core_path.display().to_string())]))?;
            work.set(CONTAINED_KEY, Value::Map(Map::new()))?;
            work.reset_parents()?;
            work.save()?;
            info!(path = %self.config.work_collection.display(), "new empty work_collection initialized");
        }
        Ok(work)
    }
    pub fn work_root(&self) -> Result<Arc<Entry>> {
        self.work_collection()
    }
    /// Roots searched by kernel-level lookups: the work collection, then the
    /// core collection it inherits from.
    pub fn search_roots(&self) -> Result<Vec<Arc<Entry>>> {
        let work = self.work_collection()?;
        let core = self.core_collection()?;
        if Arc::ptr_eq(&work, &core) {
            Ok(vec![work])
        } else {
            Ok(vec![work, core])
        }
    }

    /// The first entry called `name` in the search roots. Subject to the same
    /// caching caveat as [`collection::byname`]: a location resolved earlier
    /// by path keeps its directory name.
    pub fn byname(&self, name: &str) -> Result<Option<Arc<Entry>>> {
        debug!(name, "kernel byname");
        for root in self.search_roots()? {
            if let Some(found) = collection::byname(&root, name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
    pub fn byquery(&self, query: &str, failover: Option<&Pipeline>) -> Result<Option<Value>> {
        debug!(query, "kernel byquery");
        collection::byquery(&self.search_roots()?, query, failover, false)
    }
    pub fn execute(&self, pipeline: &Pipeline) -> Result<Value> {
        pipeline::execute(self, pipeline)
    }
}

/// Lexical normalization: `.` dropped, `..` folded, relative paths anchored
/// at the current directory.
pub fn normalize(location: &Path) -> PathBuf {
    let anchored = if location.is_relative() {
        std::path::absolute(location).unwrap_or_else(|_| location.to_path_buf())
    } else {
        location.to_path_buf()
    };
    let mut normalized = PathBuf::new();
    for component in anchored.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
