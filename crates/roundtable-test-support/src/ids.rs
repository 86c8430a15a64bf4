//! Test id generator — returns session identifiers from a fixed list.

use std::sync::Mutex;

use roundtable_core::ids::SessionIdGenerator;

/// Hands out the configured identifiers in order, then `session-N`.
#[derive(Debug)]
pub struct SequenceIds {
    ids: Vec<String>,
    index: Mutex<usize>,
}

impl SequenceIds {
    /// Create a generator that yields `ids` in order.
    #[must_use]
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            index: Mutex::new(0),
        }
    }
}

impl SessionIdGenerator for SequenceIds {
    fn next_id(&self) -> String {
        let mut index = self.index.lock().unwrap();
        let id = self
            .ids
            .get(*index)
            .cloned()
            .unwrap_or_else(|| format!("session-{}", *index + 1));
        *index += 1;
        id
    }
}
