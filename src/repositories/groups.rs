use crate::db::models::Group;

const COLUMNS: &str = "id, title, external";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: i32,
) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>(&format!("SELECT {COLUMNS} FROM groups WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Inserts every title not yet present and returns the rows actually created.
pub(crate) async fn insert_missing(
    executor: impl sqlx::PgExecutor<'_>,
    titles: &[String],
) -> Result<Vec<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>(&format!(
        "INSERT INTO groups (title)
         SELECT DISTINCT title FROM UNNEST($1::text[]) AS input(title)
         ON CONFLICT (title) DO NOTHING
         RETURNING {COLUMNS}"
    ))
    .bind(titles)
    .fetch_all(executor)
    .await
}
