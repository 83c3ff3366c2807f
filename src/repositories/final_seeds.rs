use crate::db::models::FinalSeed;

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
) -> Result<Option<FinalSeed>, sqlx::Error> {
    sqlx::query_as::<_, FinalSeed>(
        "SELECT group_id, seed, active FROM final_seeds WHERE group_id = $1",
    )
    .bind(group_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
    seed: &str,
) -> Result<FinalSeed, sqlx::Error> {
    sqlx::query_as::<_, FinalSeed>(
        "INSERT INTO final_seeds (group_id, seed, active)
         VALUES ($1, $2, TRUE)
         RETURNING group_id, seed, active",
    )
    .bind(group_id)
    .bind(seed)
    .fetch_one(executor)
    .await
}

pub(crate) async fn set_active(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
    active: bool,
) -> Result<Option<FinalSeed>, sqlx::Error> {
    sqlx::query_as::<_, FinalSeed>(
        "UPDATE final_seeds SET active = $2 WHERE group_id = $1
         RETURNING group_id, seed, active",
    )
    .bind(group_id)
    .bind(active)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn delete(
    executor: impl sqlx::PgExecutor<'_>,
    group_id: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM final_seeds WHERE group_id = $1")
        .bind(group_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}
