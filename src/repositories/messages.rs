use time::PrimitiveDateTime;

use crate::db::models::Message;
use crate::db::types::TaskKey;

pub(crate) const COLUMNS: &str =
    "id, task_id, variant_id, group_id, time, code, ip, student_id, session_id, processed";

pub(crate) struct NewMessage<'a> {
    pub(crate) key: TaskKey,
    pub(crate) code: &'a str,
    pub(crate) ip: &'a str,
    pub(crate) student_id: Option<i32>,
    pub(crate) session_id: Option<&'a str>,
    pub(crate) time: PrimitiveDateTime,
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    message: NewMessage<'_>,
) -> Result<Message, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!(
        "INSERT INTO messages (task_id, variant_id, group_id, time, code, ip, student_id, session_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {COLUMNS}"
    ))
    .bind(message.key.task)
    .bind(message.key.variant)
    .bind(message.key.group)
    .bind(message.time)
    .bind(message.code)
    .bind(message.ip)
    .bind(message.student_id)
    .bind(message.session_id)
    .fetch_one(executor)
    .await
}

/// Unprocessed messages, oldest first. Ties on `time` fall back to insertion order.
pub(crate) async fn list_pending(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as::<_, Message>(&format!(
        "SELECT {COLUMNS} FROM messages WHERE NOT processed ORDER BY time, id"
    ))
    .fetch_all(executor)
    .await
}

/// Returns false when the message was already processed or does not exist.
pub(crate) async fn mark_processed(
    executor: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE messages SET processed = TRUE WHERE id = $1 AND NOT processed")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}
