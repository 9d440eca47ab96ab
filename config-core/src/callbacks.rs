//! Change notification.
//!
//! A registration pairs a key pattern with a handler. Patterns containing `*`, `?` or
//! `[` are globs with [`glob::Pattern`] semantics, where `*` also spans `.`
//! separators (`net.*` matches `net.wifi.ssid`). Any other pattern matches one key
//! exactly. Handlers fire in registration order.

use std::sync::Arc;

use glob::Pattern;

use crate::error::{ConfigError, Resource, Result};
use crate::store::NamespaceId;
use crate::value::Value;

/// Notification passed to change handlers.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent<'a> {
    pub namespace: &'a str,
    pub key: &'a str,
    /// New value, in plaintext even when the entry is stored encrypted.
    pub value: &'a Value,
}

pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent<'_>) + Send + Sync>;

/// Identifier returned by a registration, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u32);

#[derive(Debug)]
enum KeyPattern {
    Exact(String),
    Glob(Pattern),
}

impl KeyPattern {
    fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(ConfigError::InvalidParam("callback pattern is empty"));
        }
        if raw.contains(['*', '?', '[']) {
            Ok(KeyPattern::Glob(Pattern::new(raw)?))
        } else {
            Ok(KeyPattern::Exact(raw.to_owned()))
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(expected) => expected == key,
            KeyPattern::Glob(pattern) => pattern.matches(key),
        }
    }
}

struct Registration {
    id: CallbackId,
    namespace: NamespaceId,
    pattern: KeyPattern,
    handler: ChangeHandler,
}

/// A change waiting to be delivered, with the handlers that matched it.
pub(crate) struct PendingEvent {
    namespace: String,
    key: String,
    value: Value,
    handlers: Vec<ChangeHandler>,
}

impl PendingEvent {
    pub(crate) fn dispatch(&self) {
        let event = ChangeEvent {
            namespace: &self.namespace,
            key: &self.key,
            value: &self.value,
        };
        for handler in &self.handlers {
            handler(&event);
        }
    }
}

pub(crate) fn dispatch_all(events: &[PendingEvent]) {
    for event in events {
        event.dispatch();
    }
}

pub(crate) struct CallbackRegistry {
    registrations: Vec<Registration>,
    capacity: usize,
    next_id: u32,
}

impl CallbackRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            registrations: Vec::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    pub(crate) fn register(
        &mut self,
        namespace: NamespaceId,
        pattern: &str,
        handler: ChangeHandler,
    ) -> Result<CallbackId> {
        let pattern = KeyPattern::parse(pattern)?;
        if self.registrations.len() >= self.capacity {
            return Err(ConfigError::Full(Resource::Callbacks));
        }
        let id = CallbackId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.registrations.push(Registration {
            id,
            namespace,
            pattern,
            handler,
        });
        Ok(id)
    }

    pub(crate) fn unregister(&mut self, id: CallbackId) -> Result<()> {
        let position = self
            .registrations
            .iter()
            .position(|registration| registration.id == id)
            .ok_or(ConfigError::NotFound)?;
        self.registrations.remove(position);
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Build the pending delivery for a change, or `None` when nothing listens.
    pub(crate) fn pending(
        &self,
        namespace: NamespaceId,
        namespace_name: &str,
        key: &str,
        value: &Value,
    ) -> Option<PendingEvent> {
        let handlers: Vec<ChangeHandler> = self
            .registrations
            .iter()
            .filter(|registration| {
                registration.namespace == namespace && registration.pattern.matches(key)
            })
            .map(|registration| Arc::clone(&registration.handler))
            .collect();
        if handlers.is_empty() {
            return None;
        }
        Some(PendingEvent {
            namespace: namespace_name.to_owned(),
            key: key.to_owned(),
            value: value.clone(),
            handlers,
        })
    }
}
