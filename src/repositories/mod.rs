pub(crate) mod final_seeds;
pub(crate) mod groups;
pub(crate) mod health;
pub(crate) mod message_checks;
pub(crate) mod messages;
pub(crate) mod task_statuses;
