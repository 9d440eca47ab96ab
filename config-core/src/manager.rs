//! The configuration manager context.
//!
//! A [`ConfigManager`] owns every table behind one mutex: live entries, the namespace
//! table, registered defaults, callbacks, the active value key and the bound backend.
//! Each public call takes the lock once and runs to completion, including backend
//! I/O for commit, load and auto-commit.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::callbacks::{self, CallbackId, CallbackRegistry, ChangeEvent, PendingEvent};
use crate::codec::{self, ExportFlags, ExportFormat, ImportFlags, ImportReport, Limits};
use crate::config::{CallbackDelivery, ManagerConfig};
use crate::crypto::{CipherAlgorithm, ValueCipher};
use crate::defaults::{DefaultEntry, DefaultRegistry};
use crate::error::{ConfigError, Result};
use crate::namespace::{NamespaceHandle, NamespaceTable};
use crate::store::{DEFAULT_NAMESPACE_ID, EntryInfo, EntryStore, NamespaceId, Payload, Record};
use crate::value::{ConfigValue, Value, ValueType};

/// Backend item listing the committed namespaces.
pub const MANIFEST_KEY: &str = "__meta";
/// Prefix of the backend item holding one namespace's binary dump.
pub const NAMESPACE_ITEM_PREFIX: &str = "ns:";
const MANIFEST_VERSION: u16 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u16,
    namespaces: Vec<String>,
}

fn namespace_item(name: &str) -> String {
    format!("{NAMESPACE_ITEM_PREFIX}{name}")
}

struct State {
    config: ManagerConfig,
    store: EntryStore,
    namespaces: NamespaceTable,
    defaults: DefaultRegistry,
    callbacks: CallbackRegistry,
    cipher: Option<ValueCipher>,
    backend: Option<Box<dyn Backend>>,
}

impl State {
    fn new(config: ManagerConfig) -> Self {
        Self {
            store: EntryStore::with_capacity(config.max_keys),
            namespaces: NamespaceTable::new(config.max_namespaces, config.max_key_len),
            defaults: DefaultRegistry::new(config.max_keys),
            callbacks: CallbackRegistry::new(config.max_callbacks),
            cipher: None,
            backend: None,
            config,
        }
    }

    fn limits(&self) -> Limits {
        Limits {
            max_key_len: self.config.max_key_len,
            max_value_size: self.config.max_value_size,
        }
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(ConfigError::InvalidParam("key is empty"));
        }
        if key.len() > self.config.max_key_len {
            return Err(ConfigError::KeyTooLong {
                len: key.len(),
                max: self.config.max_key_len,
            });
        }
        Ok(())
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        if value.payload_len() > self.config.max_value_size {
            return Err(ConfigError::InvalidParam("value exceeds max_value_size"));
        }
        Ok(())
    }

    fn notify(&self, ns: NamespaceId, key: &str, value: &Value, events: &mut Vec<PendingEvent>) {
        let name = self.namespaces.name_of(ns);
        if let Some(event) = self.callbacks.pending(ns, name, key, value) {
            events.push(event);
        }
    }

    fn put(
        &mut self,
        ns: NamespaceId,
        key: &str,
        value: Value,
        events: &mut Vec<PendingEvent>,
    ) -> Result<()> {
        self.check_key(key)?;
        self.check_value(&value)?;
        self.store.insert(ns, Record::plain(key, value.clone()))?;
        self.notify(ns, key, &value, events);
        Ok(())
    }

    fn put_sealed(
        &mut self,
        ns: NamespaceId,
        key: &str,
        value: Value,
        events: &mut Vec<PendingEvent>,
    ) -> Result<()> {
        self.check_key(key)?;
        self.check_value(&value)?;
        let cipher = self.cipher.as_ref().ok_or(ConfigError::NoEncryptionKey)?;
        let sealed = cipher.seal(key.as_bytes(), &value.encode())?;
        self.store
            .insert(ns, Record::sealed(key, value.value_type(), sealed))?;
        self.notify(ns, key, &value, events);
        Ok(())
    }

    /// Plaintext of a stored record, decrypting with the key active now.
    fn open(&self, record: &Record) -> Result<Value> {
        match &record.payload {
            Payload::Plain(value) => Ok(value.clone()),
            Payload::Sealed(sealed) => {
                let cipher = self.cipher.as_ref().ok_or(ConfigError::NoEncryptionKey)?;
                let plaintext = cipher
                    .open(record.key.as_bytes(), sealed)
                    .inspect_err(|_| {
                        log::warn!("entry '{}' could not be decrypted", record.key);
                    })?;
                Value::decode(record.value_type, &plaintext).map_err(|_| ConfigError::Crypto)
            }
        }
    }

    fn record(&self, ns: NamespaceId, key: &str) -> Result<&Record> {
        self.check_key(key)?;
        self.store.get(ns, key).ok_or(ConfigError::NotFound)
    }

    /// Live value, then the registered default (default namespace only), then `None`.
    fn resolve(&self, ns: NamespaceId, key: &str, expected: ValueType) -> Result<Option<Value>> {
        self.check_key(key)?;
        let value = match self.store.get(ns, key) {
            Some(record) => {
                if record.value_type != expected {
                    return Err(ConfigError::TypeMismatch {
                        expected,
                        found: record.value_type,
                    });
                }
                self.open(record)?
            }
            None => match self.defaults.get(key).filter(|_| ns == DEFAULT_NAMESPACE_ID) {
                Some(default) => default.clone(),
                None => return Ok(None),
            },
        };
        if value.value_type() != expected {
            return Err(ConfigError::TypeMismatch {
                expected,
                found: value.value_type(),
            });
        }
        Ok(Some(value))
    }

    fn fetch<T: ConfigValue>(&self, ns: NamespaceId, key: &str, inline_default: T) -> Result<T> {
        match self.resolve(ns, key, T::TYPE)? {
            Some(value) => {
                let found = value.value_type();
                T::from_value(value).ok_or(ConfigError::TypeMismatch {
                    expected: T::TYPE,
                    found,
                })
            }
            None => Ok(inline_default),
        }
    }

    fn exists(&self, ns: NamespaceId, key: &str) -> Result<bool> {
        self.check_key(key)?;
        Ok(self.store.get(ns, key).is_some())
    }

    fn remove(&mut self, ns: NamespaceId, key: &str) -> Result<()> {
        self.check_key(key)?;
        self.store
            .remove(ns, key)
            .map(|_| ())
            .ok_or(ConfigError::NotFound)
    }

    fn iterate<F>(&self, ns: NamespaceId, mut visit: F)
    where
        F: FnMut(&EntryInfo) -> ControlFlow<()>,
    {
        let namespace = self.namespaces.name_of(ns);
        for record in self.store.records_in(ns) {
            let info = EntryInfo {
                namespace: namespace.to_owned(),
                key: record.key.clone(),
                value_type: record.value_type,
                encrypted: record.is_encrypted(),
            };
            if visit(&info).is_break() {
                break;
            }
        }
    }

    fn keys(&self, ns: NamespaceId) -> Vec<String> {
        self.store
            .records_in(ns)
            .into_iter()
            .map(|record| record.key.clone())
            .collect()
    }

    fn render(&self, ns: NamespaceId, format: ExportFormat, flags: ExportFlags) -> Result<Vec<u8>> {
        let records = self
            .store
            .records_in(ns)
            .into_iter()
            .map(|record| {
                if flags.contains(ExportFlags::DECRYPT) && record.is_encrypted() {
                    Ok(Record::plain(record.key.clone(), self.open(record)?))
                } else {
                    Ok(record.clone())
                }
            })
            .collect::<Result<Vec<Record>>>()?;
        codec::encode(format, &records, flags.contains(ExportFlags::PRETTY))
    }

    fn import(
        &mut self,
        ns: NamespaceId,
        format: ExportFormat,
        flags: ImportFlags,
        data: &[u8],
        events: &mut Vec<PendingEvent>,
    ) -> Result<ImportReport> {
        let skip_errors = flags.contains(ImportFlags::SKIP_ERRORS);
        let decoded = codec::decode(format, data, &self.limits(), skip_errors)?;

        let mut scratch = self.store.clone();
        if flags.contains(ImportFlags::CLEAR) {
            scratch.clear_namespace(ns);
        }
        let mut report = ImportReport {
            applied: 0,
            skipped: decoded.skipped,
        };
        let mut applied = Vec::with_capacity(decoded.records.len());
        for record in decoded.records {
            match scratch.replace(ns, record.clone()) {
                Ok(()) => {
                    report.applied += 1;
                    applied.push(record);
                }
                Err(err) if skip_errors => {
                    log::warn!("skipping record '{}': {err}", record.key);
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        self.store = scratch;

        for record in &applied {
            match self.open(record) {
                Ok(value) => self.notify(ns, &record.key, &value, events),
                Err(_) => log::debug!(
                    "no change event for sealed record '{}' without a usable key",
                    record.key
                ),
            }
        }
        log::debug!(
            "imported {} records into '{}' ({} skipped)",
            report.applied,
            self.namespaces.name_of(ns),
            report.skipped
        );
        Ok(report)
    }

    fn commit(&mut self) -> Result<()> {
        let mut image = Vec::new();
        let mut entries = 0;
        for name in self.namespaces.names() {
            let ns = self
                .namespaces
                .find(&name)
                .ok_or(ConfigError::NotFound)?;
            let records: Vec<Record> = self.store.records_in(ns).into_iter().cloned().collect();
            entries += records.len();
            image.push((name, codec::binary::encode(&records)?));
        }
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            namespaces: image.iter().map(|(name, _)| name.clone()).collect(),
        };
        let manifest_bytes = postcard::to_allocvec(&manifest)?;

        let backend = self.backend.as_mut().ok_or(ConfigError::NoBackend)?;
        let previous = match backend.read(MANIFEST_KEY)? {
            Some(raw) => postcard::from_bytes::<Manifest>(&raw)
                .map(|old| old.namespaces)
                .unwrap_or_else(|err| {
                    log::warn!("ignoring unreadable manifest on '{}': {err}", backend.name());
                    Vec::new()
                }),
            None => Vec::new(),
        };

        for (name, bytes) in &image {
            backend.write(&namespace_item(name), bytes)?;
        }
        backend.write(MANIFEST_KEY, &manifest_bytes)?;
        for stale in previous
            .iter()
            .filter(|name| !manifest.namespaces.contains(*name))
        {
            backend.erase(&namespace_item(stale))?;
        }
        backend.commit()?;

        log::debug!(
            "committed {entries} entries in {} namespaces to '{}'",
            manifest.namespaces.len(),
            backend.name()
        );
        Ok(())
    }

    fn load(&mut self) -> Result<usize> {
        let limits = self.limits();
        let backend = self.backend.as_mut().ok_or(ConfigError::NoBackend)?;
        let raw = backend.read(MANIFEST_KEY)?.ok_or(ConfigError::NotFound)?;
        let manifest: Manifest = postcard::from_bytes(&raw)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ConfigError::format(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }

        let mut partitions = Vec::with_capacity(manifest.namespaces.len());
        for name in &manifest.namespaces {
            let bytes = backend.read(&namespace_item(name))?.ok_or_else(|| {
                ConfigError::format(format!("namespace item '{name}' is missing"))
            })?;
            let decoded = codec::binary::decode(&bytes, &limits, false)?;
            partitions.push((name.as_str(), decoded.records));
        }
        let source = backend.name().to_owned();

        let mut namespaces = self.namespaces.clone();
        let mut store = EntryStore::with_capacity(self.config.max_keys);
        let mut entries = 0;
        for (name, records) in partitions {
            let ns = namespaces.ensure(name)?;
            for record in records {
                store.replace(ns, record)?;
                entries += 1;
            }
        }
        self.namespaces = namespaces;
        self.store = store;

        log::debug!("loaded {entries} entries from '{source}'");
        Ok(entries)
    }

    fn auto_commit(&mut self) -> Result<()> {
        if self.config.auto_commit && self.backend.is_some() {
            self.commit()?;
        }
        Ok(())
    }
}

/// Typed, namespaced key-value store with pluggable persistence.
///
/// A manager starts uninitialized; every operation other than [`init`](Self::init)
/// fails with [`ConfigError::NotInit`] until it is initialized. The value is
/// `Send + Sync` and is meant to be shared, for example behind an [`Arc`].
///
/// With [`CallbackDelivery::Immediate`] change handlers run while the internal lock
/// is held, so a handler that calls back into the same manager deadlocks.
pub struct ConfigManager {
    state: Mutex<Option<State>>,
    next_handle: AtomicU32,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl ConfigManager {
    /// Create an uninitialized manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            next_handle: AtomicU32::new(1),
        }
    }

    /// Create and initialize a manager in one step.
    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        let manager = Self::new();
        manager.init(Some(config))?;
        Ok(manager)
    }

    fn read<T>(&self, op: impl FnOnce(&State) -> Result<T>) -> Result<T> {
        let guard = self.state.lock();
        let state = guard.as_ref().ok_or(ConfigError::NotInit)?;
        op(state)
    }

    fn write<T>(&self, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(ConfigError::NotInit)?;
        op(state)
    }

    /// Run a mutation of the live store, then auto-commit and deliver change events.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut State, &mut Vec<PendingEvent>) -> Result<T>,
    ) -> Result<T> {
        let mut events = Vec::new();
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(ConfigError::NotInit)?;
        let result = op(state, &mut events).and_then(|value| {
            state.auto_commit()?;
            Ok(value)
        });
        if state.config.callback_delivery == CallbackDelivery::Deferred {
            drop(guard);
        }
        callbacks::dispatch_all(&events);
        result
    }

    // Lifecycle

    /// Initialize with `config`, or the documented defaults when `None`.
    pub fn init(&self, config: Option<ManagerConfig>) -> Result<()> {
        let config = config.unwrap_or_default();
        config.validate()?;

        let mut guard = self.state.lock();
        if guard.is_some() {
            return Err(ConfigError::AlreadyInit);
        }
        log::info!(
            "config manager initialized (max_keys {}, max_namespaces {}, auto_commit {})",
            config.max_keys,
            config.max_namespaces,
            config.auto_commit
        );
        *guard = Some(State::new(config));
        Ok(())
    }

    /// Drop every entry, namespace, default, callback and the active key.
    ///
    /// The bound backend is deinitialized and unbound. State is torn down even when
    /// the backend reports a failure, which is then returned.
    pub fn deinit(&self) -> Result<()> {
        let state = self.state.lock().take().ok_or(ConfigError::NotInit)?;
        log::info!("config manager deinitialized");
        if let Some(mut backend) = state.backend {
            backend.deinit()?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_some()
    }

    pub fn config(&self) -> Result<ManagerConfig> {
        self.read(|state| Ok(state.config.clone()))
    }

    // Entries of the default namespace

    /// Store `value` under `key`, creating the entry or overwriting one of the same type.
    pub fn set<T: ConfigValue>(&self, key: &str, value: T) -> Result<()> {
        self.set_value(key, value.into_value())
    }

    pub fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.mutate(|state, events| state.put(DEFAULT_NAMESPACE_ID, key, value, events))
    }

    /// Read `key` as `T`.
    ///
    /// Resolution order is the live value, then a registered default, then
    /// `inline_default`; all three succeed. A live value of another type fails with
    /// [`ConfigError::TypeMismatch`].
    pub fn get<T: ConfigValue>(&self, key: &str, inline_default: T) -> Result<T> {
        self.read(|state| state.fetch(DEFAULT_NAMESPACE_ID, key, inline_default))
    }

    /// Untyped read of the live value or registered default.
    pub fn get_value(&self, key: &str) -> Result<Value> {
        self.read(|state| {
            let expected = match state.store.get(DEFAULT_NAMESPACE_ID, key) {
                Some(record) => record.value_type,
                None => state
                    .defaults
                    .get(key)
                    .map(Value::value_type)
                    .ok_or(ConfigError::NotFound)?,
            };
            state
                .resolve(DEFAULT_NAMESPACE_ID, key, expected)?
                .ok_or(ConfigError::NotFound)
        })
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        self.read(|state| state.exists(DEFAULT_NAMESPACE_ID, key))
    }

    pub fn get_type(&self, key: &str) -> Result<ValueType> {
        self.read(|state| Ok(state.record(DEFAULT_NAMESPACE_ID, key)?.value_type))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.mutate(|state, _| state.remove(DEFAULT_NAMESPACE_ID, key))
    }

    /// Remove every entry of the default namespace, returning how many were dropped.
    pub fn erase_all(&self) -> Result<usize> {
        self.mutate(|state, _| Ok(state.store.clear_namespace(DEFAULT_NAMESPACE_ID)))
    }

    /// Number of entries in the default namespace.
    pub fn get_count(&self) -> Result<usize> {
        self.read(|state| Ok(state.store.count_in(DEFAULT_NAMESPACE_ID)))
    }

    /// Number of entries across all namespaces.
    pub fn total_count(&self) -> Result<usize> {
        self.read(|state| Ok(state.store.len()))
    }

    /// Walk the default namespace in key order while holding the lock.
    pub fn iterate<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(&EntryInfo) -> ControlFlow<()>,
    {
        self.read(|state| {
            state.iterate(DEFAULT_NAMESPACE_ID, visit);
            Ok(())
        })
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.read(|state| Ok(state.keys(DEFAULT_NAMESPACE_ID)))
    }

    // Encryption

    /// Install the value key. Material length must match `algorithm` exactly.
    pub fn set_encryption_key(&self, material: &[u8], algorithm: CipherAlgorithm) -> Result<()> {
        let cipher = ValueCipher::new(material, algorithm)?;
        self.write(|state| {
            state.cipher = Some(cipher);
            log::info!("encryption key installed ({algorithm:?})");
            Ok(())
        })
    }

    /// Replace the active key for future writes.
    ///
    /// Existing ciphertext is not re-encrypted: reads of entries sealed under the old
    /// key fail with [`ConfigError::Crypto`] until they are written again.
    pub fn rotate_encryption_key(&self, material: &[u8], algorithm: CipherAlgorithm) -> Result<()> {
        let cipher = ValueCipher::new(material, algorithm)?;
        self.write(|state| {
            if state.cipher.is_none() {
                return Err(ConfigError::NoEncryptionKey);
            }
            state.cipher = Some(cipher);
            log::info!("encryption key rotated ({algorithm:?})");
            Ok(())
        })
    }

    pub fn clear_encryption_key(&self) -> Result<()> {
        self.write(|state| {
            if state.cipher.take().is_some() {
                log::info!("encryption key cleared");
            }
            Ok(())
        })
    }

    pub fn has_encryption_key(&self) -> Result<bool> {
        self.read(|state| Ok(state.cipher.is_some()))
    }

    pub fn set_str_encrypted(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|state, events| {
            state.put_sealed(DEFAULT_NAMESPACE_ID, key, Value::from(value), events)
        })
    }

    pub fn set_blob_encrypted(&self, key: &str, value: &[u8]) -> Result<()> {
        self.mutate(|state, events| {
            state.put_sealed(DEFAULT_NAMESPACE_ID, key, Value::from(value), events)
        })
    }

    pub fn is_encrypted(&self, key: &str) -> Result<bool> {
        self.read(|state| Ok(state.record(DEFAULT_NAMESPACE_ID, key)?.is_encrypted()))
    }

    // Defaults

    /// Register the fallback for `key`. A later registration replaces the earlier one;
    /// live values are left untouched.
    pub fn register_default(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.write(|state| {
            state.check_key(key)?;
            state.check_value(&value)?;
            state.defaults.register(key, value)
        })
    }

    /// Register several defaults; nothing is registered if any entry is rejected.
    pub fn register_defaults(&self, entries: &[DefaultEntry]) -> Result<()> {
        self.write(|state| {
            let mut registry = state.defaults.clone();
            for entry in entries {
                state.check_key(&entry.key)?;
                state.check_value(&entry.value)?;
                registry.register(&entry.key, entry.value.clone())?;
            }
            state.defaults = registry;
            Ok(())
        })
    }

    /// Overwrite the live value of `key` with its registered default.
    pub fn reset_to_default(&self, key: &str) -> Result<()> {
        self.mutate(|state, events| {
            state.check_key(key)?;
            let value = state.defaults.get(key).cloned().ok_or(ConfigError::NotFound)?;
            state
                .store
                .replace(DEFAULT_NAMESPACE_ID, Record::plain(key, value.clone()))?;
            state.notify(DEFAULT_NAMESPACE_ID, key, &value, events);
            Ok(())
        })
    }

    /// Reset every key that has a registered default, returning how many were reset.
    pub fn reset_all_to_defaults(&self) -> Result<usize> {
        self.mutate(|state, events| {
            let mut scratch = state.store.clone();
            for (key, value) in state.defaults.iter() {
                scratch.replace(DEFAULT_NAMESPACE_ID, Record::plain(key, value.clone()))?;
            }
            state.store = scratch;
            for (key, value) in state.defaults.iter() {
                state.notify(DEFAULT_NAMESPACE_ID, key, value, events);
            }
            Ok(state.defaults.len())
        })
    }

    // Callbacks

    /// Call `handler` whenever a key of the default namespace matching `pattern`
    /// changes. See [`callbacks`](crate::callbacks) for the pattern syntax.
    pub fn register_callback<F>(&self, pattern: &str, handler: F) -> Result<CallbackId>
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.write(|state| {
            state
                .callbacks
                .register(DEFAULT_NAMESPACE_ID, pattern, Arc::new(handler))
        })
    }

    pub fn ns_register_callback<F>(
        &self,
        handle: NamespaceHandle,
        pattern: &str,
        handler: F,
    ) -> Result<CallbackId>
    where
        F: Fn(&ChangeEvent<'_>) + Send + Sync + 'static,
    {
        self.write(|state| {
            let ns = state.namespaces.resolve(handle)?;
            state.callbacks.register(ns, pattern, Arc::new(handler))
        })
    }

    pub fn unregister_callback(&self, id: CallbackId) -> Result<()> {
        self.write(|state| state.callbacks.unregister(id))
    }

    // Namespaces

    /// Open `name`, creating the partition on first use.
    pub fn open_namespace(&self, name: &str) -> Result<NamespaceHandle> {
        self.write(|state| {
            let handle = NamespaceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
            state.namespaces.open(name, handle)?;
            Ok(handle)
        })
    }

    /// Invalidate `handle`. The partition and its entries stay.
    pub fn close_namespace(&self, handle: NamespaceHandle) -> Result<()> {
        self.write(|state| state.namespaces.close(handle))
    }

    /// Delete every entry of `name`. Open handles stay valid.
    pub fn erase_namespace(&self, name: &str) -> Result<usize> {
        self.mutate(|state, _| {
            let ns = state.namespaces.find(name).ok_or(ConfigError::NotFound)?;
            let removed = state.store.clear_namespace(ns);
            log::debug!("erased {removed} entries from namespace '{name}'");
            Ok(removed)
        })
    }

    pub fn namespace_open_count(&self, name: &str) -> Result<usize> {
        self.read(|state| state.namespaces.open_count(name).ok_or(ConfigError::NotFound))
    }

    pub fn namespaces(&self) -> Result<Vec<String>> {
        self.read(|state| Ok(state.namespaces.names()))
    }

    pub fn ns_set<T: ConfigValue>(&self, handle: NamespaceHandle, key: &str, value: T) -> Result<()> {
        self.ns_set_value(handle, key, value.into_value())
    }

    pub fn ns_set_value(&self, handle: NamespaceHandle, key: &str, value: Value) -> Result<()> {
        self.mutate(|state, events| {
            let ns = state.namespaces.resolve(handle)?;
            state.put(ns, key, value, events)
        })
    }

    pub fn ns_get<T: ConfigValue>(
        &self,
        handle: NamespaceHandle,
        key: &str,
        inline_default: T,
    ) -> Result<T> {
        self.read(|state| {
            let ns = state.namespaces.resolve(handle)?;
            state.fetch(ns, key, inline_default)
        })
    }

    pub fn ns_exists(&self, handle: NamespaceHandle, key: &str) -> Result<bool> {
        self.read(|state| state.exists(state.namespaces.resolve(handle)?, key))
    }

    pub fn ns_get_type(&self, handle: NamespaceHandle, key: &str) -> Result<ValueType> {
        self.read(|state| {
            let ns = state.namespaces.resolve(handle)?;
            Ok(state.record(ns, key)?.value_type)
        })
    }

    pub fn ns_delete(&self, handle: NamespaceHandle, key: &str) -> Result<()> {
        self.mutate(|state, _| {
            let ns = state.namespaces.resolve(handle)?;
            state.remove(ns, key)
        })
    }

    pub fn ns_get_count(&self, handle: NamespaceHandle) -> Result<usize> {
        self.read(|state| Ok(state.store.count_in(state.namespaces.resolve(handle)?)))
    }

    pub fn ns_iterate<F>(&self, handle: NamespaceHandle, visit: F) -> Result<()>
    where
        F: FnMut(&EntryInfo) -> ControlFlow<()>,
    {
        self.read(|state| {
            state.iterate(state.namespaces.resolve(handle)?, visit);
            Ok(())
        })
    }

    pub fn ns_keys(&self, handle: NamespaceHandle) -> Result<Vec<String>> {
        self.read(|state| Ok(state.keys(state.namespaces.resolve(handle)?)))
    }

    pub fn ns_is_encrypted(&self, handle: NamespaceHandle, key: &str) -> Result<bool> {
        self.read(|state| {
            let ns = state.namespaces.resolve(handle)?;
            Ok(state.record(ns, key)?.is_encrypted())
        })
    }

    pub fn ns_set_str_encrypted(&self, handle: NamespaceHandle, key: &str, value: &str) -> Result<()> {
        self.mutate(|state, events| {
            let ns = state.namespaces.resolve(handle)?;
            state.put_sealed(ns, key, Value::from(value), events)
        })
    }

    pub fn ns_set_blob_encrypted(
        &self,
        handle: NamespaceHandle,
        key: &str,
        value: &[u8],
    ) -> Result<()> {
        self.mutate(|state, events| {
            let ns = state.namespaces.resolve(handle)?;
            state.put_sealed(ns, key, Value::from(value), events)
        })
    }

    // Persistence

    /// Bind `backend`, running its `init` first. Live entries are kept.
    pub fn set_backend<B: Backend + 'static>(&self, mut backend: B) -> Result<()> {
        self.write(|state| {
            backend.init()?;
            log::info!("bound storage backend '{}'", backend.name());
            state.backend = Some(Box::new(backend));
            Ok(())
        })
    }

    /// Unbind the backend without deinitializing it.
    pub fn clear_backend(&self) -> Result<()> {
        self.write(|state| {
            if let Some(backend) = state.backend.take() {
                log::info!("unbound storage backend '{}'", backend.name());
            }
            Ok(())
        })
    }

    pub fn backend_name(&self) -> Result<Option<String>> {
        self.read(|state| Ok(state.backend.as_ref().map(|b| b.name().to_owned())))
    }

    /// Write every namespace to the bound backend.
    pub fn commit(&self) -> Result<()> {
        self.write(State::commit)
    }

    /// Replace all live entries with the image held by the backend.
    ///
    /// Every item is decoded before anything changes, so a failed load leaves the
    /// store as it was. Returns the number of entries restored.
    pub fn load(&self) -> Result<usize> {
        self.write(State::load)
    }

    // Export and import

    /// Exact byte length [`export`](Self::export) will produce for the same arguments.
    pub fn get_export_size(&self, format: ExportFormat, flags: ExportFlags) -> Result<usize> {
        self.read(|state| Ok(state.render(DEFAULT_NAMESPACE_ID, format, flags)?.len()))
    }

    /// Encode the default namespace into `buf`, returning the bytes written.
    pub fn export(&self, format: ExportFormat, flags: ExportFlags, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.export_to_vec(format, flags)?;
        copy_out(&bytes, buf)
    }

    pub fn export_to_vec(&self, format: ExportFormat, flags: ExportFlags) -> Result<Vec<u8>> {
        self.read(|state| state.render(DEFAULT_NAMESPACE_ID, format, flags))
    }

    /// Apply a dump to the default namespace.
    ///
    /// Without [`ImportFlags::SKIP_ERRORS`] the import is all or nothing: any
    /// malformed record leaves the live store untouched.
    pub fn import(&self, format: ExportFormat, flags: ImportFlags, data: &[u8]) -> Result<ImportReport> {
        self.mutate(|state, events| state.import(DEFAULT_NAMESPACE_ID, format, flags, data, events))
    }

    pub fn ns_get_export_size(
        &self,
        handle: NamespaceHandle,
        format: ExportFormat,
        flags: ExportFlags,
    ) -> Result<usize> {
        self.read(|state| {
            let ns = state.namespaces.resolve(handle)?;
            Ok(state.render(ns, format, flags)?.len())
        })
    }

    pub fn ns_export(
        &self,
        handle: NamespaceHandle,
        format: ExportFormat,
        flags: ExportFlags,
        buf: &mut [u8],
    ) -> Result<usize> {
        let bytes = self.ns_export_to_vec(handle, format, flags)?;
        copy_out(&bytes, buf)
    }

    pub fn ns_export_to_vec(
        &self,
        handle: NamespaceHandle,
        format: ExportFormat,
        flags: ExportFlags,
    ) -> Result<Vec<u8>> {
        self.read(|state| {
            let ns = state.namespaces.resolve(handle)?;
            state.render(ns, format, flags)
        })
    }

    pub fn ns_import(
        &self,
        handle: NamespaceHandle,
        format: ExportFormat,
        flags: ImportFlags,
        data: &[u8],
    ) -> Result<ImportReport> {
        self.mutate(|state, events| {
            let ns = state.namespaces.resolve(handle)?;
            state.import(ns, format, flags, data, events)
        })
    }
}

fn copy_out(bytes: &[u8], buf: &mut [u8]) -> Result<usize> {
    if buf.len() < bytes.len() {
        return Err(ConfigError::BufferTooSmall {
            required: bytes.len(),
            available: buf.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

macro_rules! typed_accessors {
    ($($set:ident, $get:ident, $ns_set:ident, $ns_get:ident: $arg:ty => $owned:ty;)*) => {
        impl ConfigManager {
            $(
                pub fn $set(&self, key: &str, value: $arg) -> Result<()> {
                    self.set(key, <$owned>::from(value))
                }

                pub fn $get(&self, key: &str, inline_default: $arg) -> Result<$owned> {
                    self.get(key, <$owned>::from(inline_default))
                }

                pub fn $ns_set(&self, handle: NamespaceHandle, key: &str, value: $arg) -> Result<()> {
                    self.ns_set(handle, key, <$owned>::from(value))
                }

                pub fn $ns_get(
                    &self,
                    handle: NamespaceHandle,
                    key: &str,
                    inline_default: $arg,
                ) -> Result<$owned> {
                    self.ns_get(handle, key, <$owned>::from(inline_default))
                }
            )*
        }
    };
}

typed_accessors! {
    set_i32, get_i32, ns_set_i32, ns_get_i32: i32 => i32;
    set_u32, get_u32, ns_set_u32, ns_get_u32: u32 => u32;
    set_i64, get_i64, ns_set_i64, ns_get_i64: i64 => i64;
    set_float, get_float, ns_set_float, ns_get_float: f32 => f32;
    set_bool, get_bool, ns_set_bool, ns_get_bool: bool => bool;
    set_str, get_str, ns_set_str, ns_get_str: &str => String;
    set_blob, get_blob, ns_set_blob, ns_get_blob: &[u8] => Vec<u8>;
}
