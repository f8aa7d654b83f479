//! Persistence of messages that findings point back to
use crate::error::FuzzError;
use crate::messages::HttpMessage;

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::RwLock;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

/// reference to a message held by a [`HistoryStore`]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryId(usize);

impl HistoryId {
    /// wrap a raw store-assigned identifier
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl Display for HistoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HistoryId<{}>", self.0)
    }
}

/// durable home for messages that alerts are raised against
///
/// the fuzzer is handed one at construction time; implementors must be
/// safe to call from every worker thread at once
pub trait HistoryStore: Debug + Send + Sync {
    /// store a copy of `message`, returning the reference it can be fetched by
    ///
    /// # Errors
    ///
    /// implementors return [`FuzzError::PersistenceError`] when the message
    /// couldn't be stored
    fn persist(&self, message: &HttpMessage) -> Result<HistoryId, FuzzError>;

    /// fetch a previously persisted message
    fn get(&self, id: HistoryId) -> Option<HttpMessage>;

    /// number of messages held
    fn len(&self) -> usize;

    /// `true` when nothing was persisted yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`HistoryStore`] that keeps every persisted message in memory
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    messages: RwLock<Vec<HttpMessage>>,
}

impl InMemoryHistory {
    /// create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistory {
    fn persist(&self, message: &HttpMessage) -> Result<HistoryId, FuzzError> {
        let mut guard = self.messages.write().map_err(|err| {
            warn!(%err, "history store lock is poisoned");
            FuzzError::PersistenceError {
                reason: err.to_string(),
            }
        })?;

        let id = HistoryId::new(guard.len());

        let mut stored = message.clone();
        stored.set_history_id(id);
        guard.push(stored);

        Ok(id)
    }

    fn get(&self, id: HistoryId) -> Option<HttpMessage> {
        self.messages.read().ok()?.get(id.0).cloned()
    }

    fn len(&self) -> usize {
        self.messages.read().map_or(0, |guard| guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// persisted messages come back with their history id set
    #[test]
    fn in_memory_history_round_trips_messages() -> Result<(), Box<dyn std::error::Error>> {
        let store = InMemoryHistory::new();
        assert!(store.is_empty());

        let message = HttpMessage::get("http://localhost/")?;

        let first = store.persist(&message)?;
        let second = store.persist(&message)?;

        assert_ne!(first, second);
        assert_eq!(store.len(), 2);

        let fetched = store.get(second).ok_or("missing message")?;
        assert_eq!(fetched.history_id(), Some(second));
        assert_eq!(fetched.request_header(), message.request_header());
        assert!(store.get(HistoryId::new(7)).is_none());
        Ok(())
    }
}
