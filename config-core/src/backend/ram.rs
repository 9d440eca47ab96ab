use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Backend, BackendResult};

/// Volatile backend keeping items in process memory.
///
/// Clones share the same item map, so a test can keep one clone to inspect what the
/// manager committed. Contents are dropped when the manager deinitializes.
#[derive(Debug, Clone, Default)]
pub struct RamBackend {
    items: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl RamBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }

    /// Copy of one stored item.
    pub fn item(&self, key: &str) -> Option<Vec<u8>> {
        self.items.lock().get(key).cloned()
    }
}

impl Backend for RamBackend {
    fn name(&self) -> &str {
        "ram"
    }

    fn read(&mut self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> BackendResult<()> {
        self.items.lock().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn erase(&mut self, key: &str) -> BackendResult<()> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        self.items.lock().clear();
        Ok(())
    }

    fn erase_all(&mut self) -> BackendResult<()> {
        self.items.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_items() {
        let observer = RamBackend::new();
        let mut bound = observer.clone();
        bound.write("a", &[1, 2]).unwrap();

        assert_eq!(observer.item("a"), Some(vec![1, 2]));
        bound.erase("a").unwrap();
        bound.erase("a").unwrap();
        assert!(observer.is_empty());
    }

    #[test]
    fn deinit_drops_contents() {
        let mut backend = RamBackend::new();
        backend.write("a", b"x").unwrap();
        backend.deinit().unwrap();
        assert_eq!(backend.read("a").unwrap(), None);
    }
}
