//! Persistence backends.
//!
//! The manager talks to storage through [`Backend`], a flat key space of byte items.
//! [`commit`](crate::ConfigManager::commit) writes a manifest plus one item per
//! namespace and then calls [`Backend::commit`] so backends that stage writes can
//! make them durable in one step.

mod flash;
mod mock;
mod ram;

pub use flash::{FlashBackend, FlashGeometry, FlashStats};
pub use mock::{BackendOp, MockBackend, MockCounters};
pub use ram::RamBackend;

/// Failures reported by storage implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("storage I/O failed: {0}")]
    Io(String),
    #[error("stored data is corrupted: {0}")]
    Corrupted(String),
    #[error("storage is full: {required} bytes required, {capacity} available")]
    Full { required: usize, capacity: usize },
    #[error("operation not supported by backend")]
    Unsupported,
    #[error("injected failure during {0}")]
    Injected(BackendOp),
}

pub type BackendResult<T> = core::result::Result<T, BackendError>;

/// Storage contract bound to a manager with
/// [`set_backend`](crate::ConfigManager::set_backend).
pub trait Backend: Send {
    /// Short human readable identifier used in log output.
    fn name(&self) -> &str;

    fn read(&mut self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    fn write(&mut self, key: &str, data: &[u8]) -> BackendResult<()>;

    /// Remove one item. Erasing an absent item is not an error.
    fn erase(&mut self, key: &str) -> BackendResult<()>;

    fn init(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn deinit(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn erase_all(&mut self) -> BackendResult<()> {
        Err(BackendError::Unsupported)
    }

    /// Make every write since the previous commit durable.
    fn commit(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, data: &[u8]) -> BackendResult<()> {
        (**self).write(key, data)
    }

    fn erase(&mut self, key: &str) -> BackendResult<()> {
        (**self).erase(key)
    }

    fn init(&mut self) -> BackendResult<()> {
        (**self).init()
    }

    fn deinit(&mut self) -> BackendResult<()> {
        (**self).deinit()
    }

    fn erase_all(&mut self) -> BackendResult<()> {
        (**self).erase_all()
    }

    fn commit(&mut self) -> BackendResult<()> {
        (**self).commit()
    }
}
