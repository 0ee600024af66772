use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Activity {
    pub id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    #[schema(example = "leave.approved")]
    pub action: String,
    pub details: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Records an activity entry. Failures are logged and swallowed so the
/// request that triggered it still succeeds.
pub async fn record(pool: &MySqlPool, user_id: u64, action: &str, details: impl Into<String>) {
    let details = details.into();
    if let Err(e) = sqlx::query(
        r#"INSERT INTO activity_logs (user_id, action, details) VALUES (?, ?, ?)"#,
    )
    .bind(user_id)
    .bind(action)
    .bind(&details)
    .execute(pool)
    .await
    {
        tracing::warn!(error = %e, user_id, action, "Failed to record activity");
    }
}

pub async fn recent(pool: &MySqlPool, limit: u32) -> Result<Vec<Activity>, sqlx::Error> {
    sqlx::query_as::<_, Activity>(
        r#"
        SELECT a.id, a.user_id, u.name AS user_name, a.action, a.details, a.created_at
        FROM activity_logs a
        LEFT JOIN users u ON u.id = a.user_id
        ORDER BY a.created_at DESC, a.id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}
