//! Persistence boundary for request handlers and the dispatcher.
//!
//! Every method is one atomic, key-scoped unit of work. Callers never see SQL.

#[cfg(test)]
pub(crate) mod memory;
mod postgres;

use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{
    FinalSeed, Group, GroupRating, Message, MessageCheck, SubmissionCheck, TaskStatus,
};
use crate::db::types::TaskKey;
use crate::services::pending_queue::collapse_latest_per_key;

pub(crate) use postgres::PgGradingStore;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// A concurrent writer won the race for the same row. Safe to retry.
    #[error("conflicting concurrent write")]
    Conflict,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let retryable = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .is_some_and(|code| {
                matches!(code.as_ref(), UNIQUE_VIOLATION | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
            });

        if retryable {
            StoreError::Conflict
        } else {
            StoreError::Database(err)
        }
    }
}

pub(crate) type StoreResult<T> = Result<T, StoreError>;

/// Runs `operation`, and once more if the first attempt lost a write race.
pub(crate) async fn retry_on_conflict<T, F, Fut>(mut operation: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    match operation().await {
        Err(StoreError::Conflict) => {
            tracing::debug!("Store conflict, retrying once");
            operation().await
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct NewSubmission<'a> {
    pub(crate) key: TaskKey,
    pub(crate) code: &'a str,
    pub(crate) ip: &'a str,
    pub(crate) student_id: Option<i32>,
    pub(crate) session_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubmitOutcome {
    pub(crate) message: Message,
    pub(crate) status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompletedCheck {
    pub(crate) status: TaskStatus,
    pub(crate) check: MessageCheck,
}

#[async_trait]
pub(crate) trait GradingStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    /// Creates the groups that do not exist yet and returns only those.
    async fn create_groups(&self, titles: &[String]) -> StoreResult<Vec<Group>>;

    async fn group(&self, id: i32) -> StoreResult<Option<Group>>;

    /// Appends a message and applies the submit transition to the key.
    async fn submit_task(&self, submission: NewSubmission<'_>) -> StoreResult<SubmitOutcome>;

    /// Applies a check result to the key without touching the queue.
    async fn check(
        &self,
        key: TaskKey,
        code: &str,
        ok: bool,
        output: Option<&str>,
        ip: &str,
    ) -> StoreResult<TaskStatus>;

    async fn task_status(&self, key: TaskKey) -> StoreResult<Option<TaskStatus>>;

    async fn statuses_by_group(&self, group_id: i32) -> StoreResult<Vec<TaskStatus>>;

    async fn delete_group_statuses(&self, group_id: i32) -> StoreResult<u64>;

    async fn group_rating(&self) -> StoreResult<Vec<GroupRating>>;

    /// Unprocessed messages, oldest first.
    async fn pending_messages(&self) -> StoreResult<Vec<Message>>;

    /// The latest pending message per key, still oldest first.
    async fn pending_messages_unique(&self) -> StoreResult<Vec<Message>> {
        Ok(collapse_latest_per_key(self.pending_messages().await?))
    }

    /// Returns false if the message was already processed.
    async fn mark_as_processed(&self, message_id: i64) -> StoreResult<bool>;

    /// Applies the check transition for `message`, appends its audit row and
    /// marks it processed, all or nothing.
    async fn complete_check(
        &self,
        message: &Message,
        ok: bool,
        output: Option<&str>,
    ) -> StoreResult<CompletedCheck>;

    /// Adds `achievement` to the key's set. `None` when the key has no status row.
    async fn record_achievement(
        &self,
        key: TaskKey,
        achievement: i32,
    ) -> StoreResult<Option<Vec<i32>>>;

    async fn record_check_achievement(&self, check_id: i64, achievement: i32)
        -> StoreResult<bool>;

    async fn clear_achievements(&self) -> StoreResult<u64>;

    /// Audit history of a key, newest first.
    async fn checks_for_task(
        &self,
        key: TaskKey,
        skip: i64,
        take: i64,
    ) -> StoreResult<Vec<SubmissionCheck>>;

    async fn final_seed(&self, group_id: i32) -> StoreResult<Option<FinalSeed>>;

    /// Fails with `Conflict` if the group already has a seed.
    async fn begin_final_test(&self, group_id: i32) -> StoreResult<FinalSeed>;

    async fn set_final_test_active(&self, group_id: i32, active: bool) -> StoreResult<FinalSeed>;

    async fn delete_final_seed(&self, group_id: i32) -> StoreResult<bool>;
}
