use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{FinalSeed, Group, GroupRating, Message, SubmissionCheck, TaskStatus};
use crate::db::types::TaskKey;
use crate::repositories::{final_seeds, groups, health, message_checks, messages, task_statuses};
use crate::services::achievements::merge_achievement;
use crate::services::status_transitions::{self, StatusWrite};
use crate::store::{
    CompletedCheck, GradingStore, NewSubmission, StoreError, StoreResult, SubmitOutcome,
};

/// PostgreSQL-backed store. Each method opens its own transaction; returning
/// early with `?` drops it, which rolls back.
#[derive(Clone)]
pub(crate) struct PgGradingStore {
    pool: PgPool,
}

impl PgGradingStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Persists the outcome of a transition against the row read under lock.
async fn write_status(
    conn: &mut PgConnection,
    current: Option<TaskStatus>,
    key: TaskKey,
    write: StatusWrite,
) -> Result<TaskStatus, sqlx::Error> {
    let exists = current.is_some();
    let row = status_transitions::apply(current, key, write);
    if exists {
        task_statuses::update(&mut *conn, &row).await?;
    } else {
        task_statuses::insert(&mut *conn, &row).await?;
    }
    Ok(row)
}

#[async_trait]
impl GradingStore for PgGradingStore {
    async fn ping(&self) -> StoreResult<()> {
        health::ping(&self.pool).await?;
        Ok(())
    }

    async fn create_groups(&self, titles: &[String]) -> StoreResult<Vec<Group>> {
        Ok(groups::insert_missing(&self.pool, titles).await?)
    }

    async fn group(&self, id: i32) -> StoreResult<Option<Group>> {
        Ok(groups::find_by_id(&self.pool, id).await?)
    }

    async fn submit_task(&self, submission: NewSubmission<'_>) -> StoreResult<SubmitOutcome> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        let message = messages::insert(
            &mut *tx,
            messages::NewMessage {
                key: submission.key,
                code: submission.code,
                ip: submission.ip,
                student_id: submission.student_id,
                session_id: submission.session_id,
                time: now,
            },
        )
        .await?;

        let current = task_statuses::find_for_update(&mut *tx, submission.key).await?;
        let write =
            status_transitions::on_submit(current.as_ref(), submission.code, submission.ip, now);
        let status = write_status(&mut *tx, current, submission.key, write).await?;

        tx.commit().await?;
        Ok(SubmitOutcome { message, status })
    }

    async fn check(
        &self,
        key: TaskKey,
        code: &str,
        ok: bool,
        output: Option<&str>,
        ip: &str,
    ) -> StoreResult<TaskStatus> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        let current = task_statuses::find_for_update(&mut *tx, key).await?;
        let write = status_transitions::on_check(current.as_ref(), code, ok, output, ip, now);
        let status = write_status(&mut *tx, current, key, write).await?;

        tx.commit().await?;
        Ok(status)
    }

    async fn task_status(&self, key: TaskKey) -> StoreResult<Option<TaskStatus>> {
        Ok(task_statuses::find(&self.pool, key).await?)
    }

    async fn statuses_by_group(&self, group_id: i32) -> StoreResult<Vec<TaskStatus>> {
        Ok(task_statuses::list_by_group(&self.pool, group_id).await?)
    }

    async fn delete_group_statuses(&self, group_id: i32) -> StoreResult<u64> {
        Ok(task_statuses::delete_by_group(&self.pool, group_id).await?)
    }

    async fn group_rating(&self) -> StoreResult<Vec<GroupRating>> {
        Ok(task_statuses::group_rating(&self.pool).await?)
    }

    async fn pending_messages(&self) -> StoreResult<Vec<Message>> {
        Ok(messages::list_pending(&self.pool).await?)
    }

    async fn mark_as_processed(&self, message_id: i64) -> StoreResult<bool> {
        Ok(messages::mark_processed(&self.pool, message_id).await?)
    }

    async fn complete_check(
        &self,
        message: &Message,
        ok: bool,
        output: Option<&str>,
    ) -> StoreResult<CompletedCheck> {
        let now = primitive_now_utc();
        let key = message.key();
        let mut tx = self.pool.begin().await?;

        let current = task_statuses::find_for_update(&mut *tx, key).await?;
        let write =
            status_transitions::on_check(current.as_ref(), &message.code, ok, output, &message.ip, now);
        let status = write_status(&mut *tx, current, key, write).await?;

        let check = message_checks::insert(
            &mut *tx,
            message_checks::NewCheck {
                message_id: message.id,
                time: now,
                status: status.status,
                output,
            },
        )
        .await?;

        if !messages::mark_processed(&mut *tx, message.id).await? {
            return Err(StoreError::NotFound("pending message"));
        }

        tx.commit().await?;
        Ok(CompletedCheck { status, check })
    }

    async fn record_achievement(
        &self,
        key: TaskKey,
        achievement: i32,
    ) -> StoreResult<Option<Vec<i32>>> {
        let mut tx = self.pool.begin().await?;

        let Some(current) = task_statuses::find_for_update(&mut *tx, key).await? else {
            return Ok(None);
        };
        let merged = merge_achievement(current.achievements(), achievement);
        if merged.as_slice() != current.achievements() {
            task_statuses::set_achievements(&mut *tx, key, &merged).await?;
        }

        tx.commit().await?;
        Ok(Some(merged))
    }

    async fn record_check_achievement(
        &self,
        check_id: i64,
        achievement: i32,
    ) -> StoreResult<bool> {
        Ok(message_checks::set_achievement(&self.pool, check_id, achievement).await?)
    }

    async fn clear_achievements(&self) -> StoreResult<u64> {
        Ok(task_statuses::clear_achievements(&self.pool).await?)
    }

    async fn checks_for_task(
        &self,
        key: TaskKey,
        skip: i64,
        take: i64,
    ) -> StoreResult<Vec<SubmissionCheck>> {
        Ok(message_checks::list_for_task(&self.pool, key, skip, take).await?)
    }

    async fn final_seed(&self, group_id: i32) -> StoreResult<Option<FinalSeed>> {
        Ok(final_seeds::find(&self.pool, group_id).await?)
    }

    async fn begin_final_test(&self, group_id: i32) -> StoreResult<FinalSeed> {
        let mut tx = self.pool.begin().await?;

        if groups::find_by_id(&mut *tx, group_id).await?.is_none() {
            return Err(StoreError::NotFound("group"));
        }
        let seed = final_seeds::insert(&mut *tx, group_id, &Uuid::new_v4().to_string()).await?;

        tx.commit().await?;
        Ok(seed)
    }

    async fn set_final_test_active(&self, group_id: i32, active: bool) -> StoreResult<FinalSeed> {
        final_seeds::set_active(&self.pool, group_id, active)
            .await?
            .ok_or(StoreError::NotFound("final seed"))
    }

    async fn delete_final_seed(&self, group_id: i32) -> StoreResult<bool> {
        Ok(final_seeds::delete(&self.pool, group_id).await?)
    }
}
