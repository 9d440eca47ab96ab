use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Backend, BackendError, BackendResult};

/// Backend operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Read,
    Write,
    Erase,
    Init,
    Deinit,
    EraseAll,
    Commit,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendOp::Read => "read",
            BackendOp::Write => "write",
            BackendOp::Erase => "erase",
            BackendOp::Init => "init",
            BackendOp::Deinit => "deinit",
            BackendOp::EraseAll => "erase_all",
            BackendOp::Commit => "commit",
        };
        f.write_str(label)
    }
}

/// Number of calls observed per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounters {
    pub reads: usize,
    pub writes: usize,
    pub erases: usize,
    pub inits: usize,
    pub deinits: usize,
    pub erase_alls: usize,
    pub commits: usize,
}

#[derive(Debug, Default)]
struct MockState {
    items: BTreeMap<String, Vec<u8>>,
    counters: MockCounters,
    fail_once: HashSet<BackendOp>,
    fail_always: HashSet<BackendOp>,
}

impl MockState {
    /// Count the call and report whether an injected failure applies to it.
    fn enter(&mut self, op: BackendOp) -> BackendResult<()> {
        let counter = match op {
            BackendOp::Read => &mut self.counters.reads,
            BackendOp::Write => &mut self.counters.writes,
            BackendOp::Erase => &mut self.counters.erases,
            BackendOp::Init => &mut self.counters.inits,
            BackendOp::Deinit => &mut self.counters.deinits,
            BackendOp::EraseAll => &mut self.counters.erase_alls,
            BackendOp::Commit => &mut self.counters.commits,
        };
        *counter += 1;

        if self.fail_once.remove(&op) || self.fail_always.contains(&op) {
            return Err(BackendError::Injected(op));
        }
        Ok(())
    }
}

/// Test backend with RAM semantics, call counters and failure injection.
///
/// Clones share state: keep one clone to arm failures or inspect counters after
/// handing another to the manager.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop stored items, counters and armed failures.
    pub fn reset(&self) {
        *self.state.lock() = MockState::default();
    }

    /// Fail the next call of `op` only.
    pub fn fail_next(&self, op: BackendOp) {
        self.state.lock().fail_once.insert(op);
    }

    /// Fail every call of `op` until [`reset`](Self::reset).
    pub fn fail_always(&self, op: BackendOp) {
        self.state.lock().fail_always.insert(op);
    }

    /// Flip the bits of a stored item. Returns `false` when the item is absent.
    pub fn corrupt(&self, key: &str) -> bool {
        match self.state.lock().items.get_mut(key) {
            Some(bytes) => {
                bytes.iter_mut().for_each(|byte| *byte ^= 0xA5);
                true
            }
            None => false,
        }
    }

    pub fn counters(&self) -> MockCounters {
        self.state.lock().counters
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().items.keys().cloned().collect()
    }

    pub fn item(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().items.get(key).cloned()
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn read(&mut self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        state.enter(BackendOp::Read)?;
        Ok(state.items.get(key).cloned())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::Write)?;
        state.items.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn erase(&mut self, key: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::Erase)?;
        state.items.remove(key);
        Ok(())
    }

    fn init(&mut self) -> BackendResult<()> {
        self.state.lock().enter(BackendOp::Init)
    }

    fn deinit(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::Deinit)?;
        state.items.clear();
        Ok(())
    }

    fn erase_all(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.enter(BackendOp::EraseAll)?;
        state.items.clear();
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.state.lock().enter(BackendOp::Commit)
    }
}
