use std::collections::HashMap;

use crate::db::models::Message;
use crate::db::types::TaskKey;

/// How the dispatcher consumes the pending part of the submission log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum DrainPolicy {
    /// Every pending message is checked and gets its own audit row.
    #[default]
    Full,
    /// Only the newest pending message of each key is checked per cycle.
    UniquePerKey,
}

impl DrainPolicy {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            DrainPolicy::Full => "full",
            DrainPolicy::UniquePerKey => "unique",
        }
    }
}

/// Keeps the latest message of every task key. `pending` must be ordered
/// oldest first; the result keeps that order.
pub(crate) fn collapse_latest_per_key(pending: Vec<Message>) -> Vec<Message> {
    let mut latest: HashMap<TaskKey, usize> = HashMap::with_capacity(pending.len());
    for (index, message) in pending.iter().enumerate() {
        latest.insert(message.key(), index);
    }

    pending
        .into_iter()
        .enumerate()
        .filter(|(index, message)| latest.get(&message.key()) == Some(index))
        .map(|(_, message)| message)
        .collect()
}
