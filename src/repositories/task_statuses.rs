use crate::db::models::{GroupRating, TaskStatus};
use crate::db::types::{Status, TaskKey, EVER_ACCEPTED};

pub(crate) const COLUMNS: &str =
    "task_id, variant_id, group_id, time, code, ip, output, status, achievements";

const KEY_FILTER: &str = "task_id = $1 AND variant_id = $2 AND group_id = $3";

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    key: TaskKey,
) -> Result<Option<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(&format!(
        "SELECT {COLUMNS} FROM task_statuses WHERE {KEY_FILTER}"
    ))
    .bind(key.task)
    .bind(key.variant)
    .bind(key.group)
    .fetch_optional(executor)
    .await
}

/// Same as [`find`] but locks the row until the surrounding transaction ends.
pub(crate) async fn find_for_update(
    executor: impl sqlx::PgExecutor<'_>,
    key: TaskKey,
) -> Result<Option<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(&format!(
        "SELECT {COLUMNS} FROM task_statuses WHERE {KEY_FILTER} FOR UPDATE"
    ))
    .bind(key.task)
    .bind(key.variant)
    .bind(key.group)
    .fetch_optional(executor)
    .await
}

/// Plain insert: a concurrent insert of the same key fails with a unique violation.
pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    row: &TaskStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO task_statuses
             (task_id, variant_id, group_id, time, code, ip, output, status, achievements)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(row.task_id)
    .bind(row.variant_id)
    .bind(row.group_id)
    .bind(row.time)
    .bind(&row.code)
    .bind(&row.ip)
    .bind(&row.output)
    .bind(row.status)
    .bind(&row.achievements)
    .execute(executor)
    .await?;
    Ok(())
}

/// Overwrites the grading columns. Achievements are owned by [`set_achievements`].
pub(crate) async fn update(
    executor: impl sqlx::PgExecutor<'_>,
    row: &TaskStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "UPDATE task_statuses
         SET time = $4, code = $5, ip = $6, output = $7, status = $8
         WHERE {KEY_FILTER}"
    ))
    .bind(row.task_id)
    .bind(row.variant_id)
    .bind(row.group_id)
    .bind(row.time)
    .bind(&row.code)
    .bind(&row.ip)
    .bind(&row.output)
    .bind(row.status)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn set_achievements(
    executor: impl sqlx::PgExecutor<'_>,
    key: TaskKey,
    achievements: &[i32],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("UPDATE task_statuses SET achievements = $4 WHERE {KEY_FILTER}"))
        .bind(key.task)
        .bind(key.variant)
        .bind(key.group)
        .bind(achievements)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn clear_achievements(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE task_statuses SET achievements = NULL WHERE achievements IS NOT NULL",
    )
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn list_by_group(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
) -> Result<Vec<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(&format!(
        "SELECT {COLUMNS} FROM task_statuses
         WHERE group_id = $1
         ORDER BY variant_id, task_id"
    ))
    .bind(group_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn delete_by_group(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM task_statuses WHERE group_id = $1")
        .bind(group_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Number of ever-accepted keys per group, best first.
pub(crate) async fn group_rating(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<GroupRating>, sqlx::Error> {
    let accepted: Vec<i32> = EVER_ACCEPTED.into_iter().map(Status::code).collect();
    sqlx::query_as::<_, GroupRating>(
        "SELECT g.id AS group_id,
                g.title,
                COUNT(ts.task_id) FILTER (WHERE ts.status = ANY($1)) AS score
         FROM groups g
         LEFT JOIN task_statuses ts ON ts.group_id = g.id
         GROUP BY g.id, g.title
         ORDER BY score DESC, g.title",
    )
    .bind(accepted)
    .fetch_all(executor)
    .await
}
