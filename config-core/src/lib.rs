//! Typed, namespaced configuration store.
//!
//! [`ConfigManager`] holds typed entries in named partitions, falls back to
//! registered defaults, notifies observers on change, seals string and blob values
//! with AES-GCM, exports and imports JSON or binary dumps, and persists through a
//! pluggable [`Backend`].

pub mod backend;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod crypto;
mod defaults;
pub mod error;
mod manager;
mod namespace;
mod store;
pub mod value;

pub use backend::{Backend, BackendError, FlashBackend, MockBackend, RamBackend};
pub use callbacks::{CallbackId, ChangeEvent};
pub use codec::{ExportFlags, ExportFormat, ImportFlags, ImportReport};
pub use config::{CallbackDelivery, ManagerConfig};
pub use crypto::CipherAlgorithm;
pub use defaults::DefaultEntry;
pub use error::{ConfigError, Resource, Result};
pub use manager::{ConfigManager, MANIFEST_KEY, NAMESPACE_ITEM_PREFIX};
pub use namespace::{DEFAULT_NAMESPACE, NamespaceHandle};
pub use store::{EntryInfo, Payload, Record};
pub use value::{ConfigValue, Value, ValueType};
