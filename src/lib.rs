//! Entrywise – a storage-backed entry resolution and on-demand build engine.
//!
//! Everything is an *entry*: a named node stored at a location, holding
//! declarative attributes and, optionally, a unit of executable behavior.
//! Entries compose by multi-parent inheritance, live in collections, and can
//! be found by name or by a small query language. When a query finds nothing,
//! an entry advertising a matching *producer rule* is asked to build one.
//!
//! ## Modules
//! * [`kernel`] – The entry cache (one live [`entry::Entry`] per location),
//!   location natures, and the core and work collections.
//! * [`entry`] – Entries with lazily loaded attributes, behavior and parents.
//! * [`ancestry`] – Depth-first attribute and action lookup along parents.
//! * [`dispatch`] – Action signatures and argument binding.
//! * [`behavior`] – Behavior units and the loader that finds them.
//! * [`builtin`] – Methods every entry answers to, and the kernel's actions.
//! * [`collection`] – Walking collections, name and query lookup, producer
//!   fallback, and child management.
//! * [`query`] – The query language, compiled to filters.
//! * [`pipeline`] – Chained calls with labeled results and `^` call references.
//! * [`persist`] – Storage backends for attribute documents.
//! * [`config`] – Layered kernel configuration.
//! * [`cli`] – Command line tokens to pipelines.
//!
//! ## Attributes
//! Attribute values are JSON-like ([`value::Value`]). A few keys are reserved:
//! `_parent_entries` declares parents, `contained_entries` makes an entry a
//! collection, `producer_rules` advertises actions that build entries with
//! given tags, and `tags` holds an entry's own tags. A list starting with `"^"`
//! or `"^^"` is a reference: it is replaced on lookup by the result of calling
//! the named action on the kernel or on the holding entry.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use entrywise::{
//!     behavior::BehaviorRegistry, config::KernelConfig, kernel::Kernel,
//!     persist::MemoryStorage, pipeline::{Pipeline, Step},
//! };
//! let storage = Arc::new(MemoryStorage::new());
//! storage.insert("/c/work_collection/hello/data.json", serde_json::json!({"greeting": "hi"})).unwrap();
//! let kernel = Kernel::new(KernelConfig::rooted("/c"), storage, Arc::new(BehaviorRegistry::new()));
//! let result = kernel
//!     .execute(&Pipeline::new()
//!         .step(Step::new("bypath").arg("/c/work_collection/hello"))
//!         .step(Step::new("get").arg("greeting")))
//!     .unwrap();
//! assert_eq!(result.as_str(), Some("hi"));
//! ```

pub mod ancestry;
pub mod behavior;
pub mod builtin;
pub mod cli;
pub mod collection;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod kernel;
pub mod persist;
pub mod pipeline;
pub mod query;
pub mod value;

pub use entry::Entry;
pub use error::{EntryError, Result};
pub use kernel::Kernel;
pub use value::{Map, Value};
