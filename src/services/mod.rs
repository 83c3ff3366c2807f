pub(crate) mod achievements;
pub(crate) mod analyzer;
pub(crate) mod checker;
pub(crate) mod external_tasks;
pub(crate) mod pending_queue;
pub(crate) mod status_transitions;
