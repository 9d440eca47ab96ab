use std::collections::HashMap;

use crate::error::{ConfigError, Resource, Result};
use crate::store::{DEFAULT_NAMESPACE_ID, NamespaceId};

/// Name under which the always-present default partition can be opened.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Opaque handle returned by [`open_namespace`](crate::ConfigManager::open_namespace).
///
/// Handles are never reused for the lifetime of a manager value, so a stale handle
/// cannot silently address another partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceHandle(pub(crate) u32);

impl NamespaceHandle {
    pub const fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Partition {
    name: String,
    open_count: usize,
}

/// Partition table: slot 0 is the default namespace, the rest are created on demand.
#[derive(Debug, Clone)]
pub(crate) struct NamespaceTable {
    partitions: Vec<Option<Partition>>,
    handles: HashMap<NamespaceHandle, NamespaceId>,
    max_name_len: usize,
}

impl NamespaceTable {
    pub(crate) fn new(max_namespaces: usize, max_name_len: usize) -> Self {
        let mut partitions: Vec<Option<Partition>> =
            (0..=max_namespaces).map(|_| None).collect();
        partitions[DEFAULT_NAMESPACE_ID] = Some(Partition {
            name: DEFAULT_NAMESPACE.to_owned(),
            open_count: 0,
        });
        Self {
            partitions,
            handles: HashMap::new(),
            max_name_len,
        }
    }

    pub(crate) fn find(&self, name: &str) -> Option<NamespaceId> {
        self.partitions.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|partition| partition.name == name)
        })
    }

    /// Look up a partition by name, creating it when absent.
    pub(crate) fn ensure(&mut self, name: &str) -> Result<NamespaceId> {
        if name.is_empty() {
            return Err(ConfigError::InvalidParam("namespace name is empty"));
        }
        if name.len() > self.max_name_len {
            return Err(ConfigError::KeyTooLong {
                len: name.len(),
                max: self.max_name_len,
            });
        }
        if let Some(id) = self.find(name) {
            return Ok(id);
        }

        let id = self
            .partitions
            .iter()
            .position(Option::is_none)
            .ok_or(ConfigError::Full(Resource::Namespaces))?;
        self.partitions[id] = Some(Partition {
            name: name.to_owned(),
            open_count: 0,
        });
        log::debug!("created namespace '{name}' in slot {id}");
        Ok(id)
    }

    pub(crate) fn open(&mut self, name: &str, handle: NamespaceHandle) -> Result<NamespaceId> {
        let id = self.ensure(name)?;
        if let Some(partition) = self.partitions[id].as_mut() {
            partition.open_count += 1;
        }
        self.handles.insert(handle, id);
        Ok(id)
    }

    pub(crate) fn close(&mut self, handle: NamespaceHandle) -> Result<()> {
        let id = self
            .handles
            .remove(&handle)
            .ok_or(ConfigError::InvalidParam("namespace handle is not open"))?;
        if let Some(partition) = self.partitions[id].as_mut() {
            partition.open_count = partition.open_count.saturating_sub(1);
        }
        Ok(())
    }

    pub(crate) fn resolve(&self, handle: NamespaceHandle) -> Result<NamespaceId> {
        self.handles
            .get(&handle)
            .copied()
            .ok_or(ConfigError::InvalidParam("namespace handle is not open"))
    }

    pub(crate) fn name_of(&self, id: NamespaceId) -> &str {
        self.partitions
            .get(id)
            .and_then(Option::as_ref)
            .map_or("", |partition| partition.name.as_str())
    }

    pub(crate) fn open_count(&self, name: &str) -> Option<usize> {
        let id = self.find(name)?;
        self.partitions[id]
            .as_ref()
            .map(|partition| partition.open_count)
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.partitions
            .iter()
            .flatten()
            .map(|partition| partition.name.clone())
            .collect()
    }
}
