use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::{Message, MessageCheck, SubmissionCheck};
use crate::db::types::{Status, TaskKey};

pub(crate) struct NewCheck<'a> {
    pub(crate) message_id: i64,
    pub(crate) time: PrimitiveDateTime,
    pub(crate) status: Status,
    pub(crate) output: Option<&'a str>,
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    check: NewCheck<'_>,
) -> Result<MessageCheck, sqlx::Error> {
    sqlx::query_as::<_, MessageCheck>(
        "INSERT INTO message_checks (message_id, time, status, output)
         VALUES ($1, $2, $3, $4)
         RETURNING id, message_id, time, status, output, achievement",
    )
    .bind(check.message_id)
    .bind(check.time)
    .bind(check.status)
    .bind(check.output)
    .fetch_one(executor)
    .await
}

pub(crate) async fn set_achievement(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
    achievement: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE message_checks SET achievement = $2 WHERE id = $1")
        .bind(id)
        .bind(achievement)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(FromRow)]
struct SubmissionCheckRow {
    check_id: i64,
    check_time: PrimitiveDateTime,
    check_status: Status,
    check_output: Option<String>,
    check_achievement: Option<i32>,
    id: i64,
    task_id: i32,
    variant_id: i32,
    group_id: i32,
    time: PrimitiveDateTime,
    code: String,
    ip: String,
    student_id: Option<i32>,
    session_id: Option<String>,
    processed: bool,
}

impl From<SubmissionCheckRow> for SubmissionCheck {
    fn from(row: SubmissionCheckRow) -> Self {
        Self {
            check: MessageCheck {
                id: row.check_id,
                message_id: row.id,
                time: row.check_time,
                status: row.check_status,
                output: row.check_output,
                achievement: row.check_achievement,
            },
            message: Message {
                id: row.id,
                task_id: row.task_id,
                variant_id: row.variant_id,
                group_id: row.group_id,
                time: row.time,
                code: row.code,
                ip: row.ip,
                student_id: row.student_id,
                session_id: row.session_id,
                processed: row.processed,
            },
        }
    }
}

/// Audit history of one key, newest check first.
pub(crate) async fn list_for_task(
    executor: impl sqlx::PgExecutor<'_>,
    key: TaskKey,
    skip: i64,
    take: i64,
) -> Result<Vec<SubmissionCheck>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SubmissionCheckRow>(
        "SELECT mc.id AS check_id,
                mc.time AS check_time,
                mc.status AS check_status,
                mc.output AS check_output,
                mc.achievement AS check_achievement,
                m.id, m.task_id, m.variant_id, m.group_id, m.time,
                m.code, m.ip, m.student_id, m.session_id, m.processed
         FROM message_checks mc
         JOIN messages m ON m.id = mc.message_id
         WHERE m.task_id = $1 AND m.variant_id = $2 AND m.group_id = $3
         ORDER BY mc.time DESC, mc.id DESC
         OFFSET $4 LIMIT $5",
    )
    .bind(key.task)
    .bind(key.variant)
    .bind(key.group)
    .bind(skip)
    .bind(take)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(SubmissionCheck::from).collect())
}
