use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::leave_request::{
        LEAVE_COLUMNS, LeaveAction, LeaveRequest, LeaveRuleError, LeaveStatus, LeaveType,
        leave_records, validate_new_leave, validate_rejection_comment,
    },
    utils::{activity, body::optional_json, db_utils::paginate},
};
use actix_web::{HttpResponse, web, web::Bytes};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

/// Every field is optional at the wire level so a missing one gets a
/// readable 400 instead of a deserializer error.
#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "sick")]
    pub leave_type: Option<LeaveType>,
    #[schema(example = "2026-02-02", format = "date", value_type = String)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-02-03", format = "date", value_type = String)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "Flu")]
    pub reason: Option<String>,
}

#[derive(Default, Deserialize, ToSchema)]
pub struct LeaveDecision {
    #[schema(example = "Enjoy your break")]
    pub comment: Option<String>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by user ID
    #[schema(example = 7)]
    pub user_id: Option<u64>,
    /// Filter by leave status
    #[schema(example = "pending")]
    pub status: Option<LeaveStatus>,
    /// Filter by leave type
    #[schema(example = "paid")]
    pub leave_type: Option<LeaveType>,
    /// Pagination page number (start with 1)
    #[schema(example = 1)]
    pub page: Option<u32>,
    /// Items per page
    #[schema(example = 10)]
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Str(String),
}

#[derive(sqlx::FromRow)]
struct LeaveState {
    user_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[sqlx(try_from = "String")]
    status: LeaveStatus,
}

/// Writes every column of a [`DayRecord`](crate::model::attendance::DayRecord);
/// an existing row for the day is overwritten in full.
const UPSERT_DAY: &str = r#"
    INSERT INTO attendance
        (user_id, date, status, check_in, check_out, break_minutes, total_working_hours)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        status = VALUES(status),
        check_in = VALUES(check_in),
        check_out = VALUES(check_out),
        break_minutes = VALUES(break_minutes),
        total_working_hours = VALUES(total_working_hours)
"#;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn fetch_leave(pool: &MySqlPool, leave_id: u64) -> AppResult<LeaveRequest> {
    let sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests l JOIN users u ON u.id = l.user_id WHERE l.id = ?"
    );
    sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(leave_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch leave request"))?
        .ok_or_else(|| AppError::not_found("Leave request not found"))
}

/// Approved leave spans of one user overlapping `[from, until)`.
pub async fn approved_spans(
    pool: &MySqlPool,
    user_id: u64,
    leave_type: Option<LeaveType>,
    from: NaiveDate,
    until: NaiveDate,
) -> AppResult<Vec<(NaiveDate, NaiveDate)>> {
    let mut sql = String::from(
        r#"
        SELECT start_date, end_date
        FROM leave_requests
        WHERE user_id = ? AND status = ? AND start_date < ? AND end_date >= ?
        "#,
    );
    if leave_type.is_some() {
        sql.push_str(" AND leave_type = ?");
    }

    let mut q = sqlx::query_as::<_, (NaiveDate, NaiveDate)>(&sql)
        .bind(user_id)
        .bind(LeaveStatus::Approved.as_ref())
        .bind(until)
        .bind(from);
    if let Some(leave_type) = leave_type {
        q = q.bind(leave_type.to_string());
    }

    q.fetch_all(pool)
        .await
        .map_err(AppError::db("Failed to fetch approved leaves"))
}

async fn query_leaves(
    pool: &MySqlPool,
    user_id: Option<u64>,
    status: Option<LeaveStatus>,
    leave_type: Option<LeaveType>,
    page: Option<u32>,
    per_page: Option<u32>,
) -> AppResult<LeaveListResponse> {
    let (page, per_page, offset) = paginate(page, per_page, 10);

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(user_id) = user_id {
        where_sql.push_str(" AND l.user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(status) = status {
        where_sql.push_str(" AND l.status = ?");
        args.push(FilterValue::Str(status.to_string()));
    }
    if let Some(leave_type) = leave_type {
        where_sql.push_str(" AND l.leave_type = ?");
        args.push(FilterValue::Str(leave_type.to_string()));
    }

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests l{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(s.as_str()),
        };
    }
    let total = count_q
        .fetch_one(pool)
        .await
        .map_err(AppError::db("Failed to count leave requests"))?;

    let data_sql = format!(
        r#"
        SELECT {LEAVE_COLUMNS}
        FROM leave_requests l
        JOIN users u ON u.id = l.user_id
        {where_sql}
        ORDER BY l.created_at DESC, l.id DESC
        LIMIT ? OFFSET ?
        "#
    );
    let mut data_q = sqlx::query_as::<_, LeaveRequest>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::db("Failed to fetch leave list"))?;

    Ok(LeaveListResponse {
        data,
        page,
        per_page,
        total,
    })
}

/// Apply for leave
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Missing field, reversed range or past start date", body = Object, example = json!({
            "message": "start_date cannot be after end_date"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();
    let leave = validate_new_leave(
        payload.leave_type,
        payload.start_date,
        payload.end_date,
        payload.reason.as_deref(),
        today(),
    )?;

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (user_id, leave_type, start_date, end_date, reason, status)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(leave.leave_type.as_ref())
    .bind(leave.start_date)
    .bind(leave.end_date)
    .bind(&leave.reason)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to create leave request"))?;

    let leave_id = result.last_insert_id();
    info!(user_id = auth.user_id, leave_id, "Leave requested");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "leave.requested",
        format!(
            "{} leave {} to {}",
            leave.leave_type, leave.start_date, leave.end_date
        ),
    )
    .await;

    let created = fetch_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Created().json(created))
}

/// Approve leave (HR/Admin); marks every day of the span as Leave
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    request_body(content = LeaveDecision, description = "Optional comment"),
    responses(
        (status = 200, description = "Leave approved", body = LeaveRequest),
        (status = 400, description = "Leave request already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Bytes,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let leave_id = path.into_inner();
    let decision: LeaveDecision = optional_json(&body)?;
    let comment = decision
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut tx = pool
        .begin()
        .await
        .map_err(AppError::db("Failed to open transaction"))?;

    let state = sqlx::query_as::<_, LeaveState>(
        r#"
        SELECT user_id, start_date, end_date, status
        FROM leave_requests
        WHERE id = ?
        FOR UPDATE
        "#,
    )
    .bind(leave_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(AppError::db("Failed to fetch leave request"))?
    .ok_or_else(|| AppError::not_found("Leave request not found"))?;

    let next = state.status.apply(LeaveAction::Approve)?;

    sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, approver_id = ?, comment = ?
        WHERE id = ?
        "#,
    )
    .bind(next.as_ref())
    .bind(auth.user_id)
    .bind(&comment)
    .bind(leave_id)
    .execute(&mut *tx)
    .await
    .map_err(AppError::db("Approve leave failed"))?;

    let records = leave_records(state.user_id, state.start_date, state.end_date);
    for record in &records {
        sqlx::query(UPSERT_DAY)
            .bind(record.user_id)
            .bind(record.date)
            .bind(record.status.as_ref())
            .bind(record.check_in)
            .bind(record.check_out)
            .bind(record.break_minutes)
            .bind(record.total_working_hours)
            .execute(&mut *tx)
            .await
            .map_err(AppError::db("Failed to write leave attendance"))?;
    }
    let days = records.len();

    tx.commit()
        .await
        .map_err(AppError::db("Failed to commit leave approval"))?;

    info!(leave_id, approver = auth.user_id, days, "Leave approved");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "leave.approved",
        format!("leave #{leave_id} for user #{} ({days} days)", state.user_id),
    )
    .await;

    let leave = fetch_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Reject leave (HR/Admin); a comment is mandatory
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    request_body = LeaveDecision,
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 400, description = "Missing comment or already processed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Bytes,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let leave_id = path.into_inner();
    let decision: LeaveDecision = optional_json(&body)?;
    let comment = validate_rejection_comment(decision.comment.as_deref())?;

    let leave = fetch_leave(pool.get_ref(), leave_id).await?;
    let next = leave.status.apply(LeaveAction::Reject)?;

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, approver_id = ?, comment = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(next.as_ref())
    .bind(auth.user_id)
    .bind(&comment)
    .bind(leave_id)
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Reject leave failed"))?;

    if result.rows_affected() == 0 {
        return Err(LeaveRuleError::AlreadyProcessed.into());
    }

    info!(leave_id, approver = auth.user_id, "Leave rejected");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "leave.rejected",
        format!("leave #{leave_id} for user #{}", leave.user_id),
    )
    .await;

    let leave = fetch_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Withdraw one's own pending request
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(("leave_id" = u64, Path, description = "ID of the leave request to cancel")),
    responses(
        (status = 200, description = "Leave cancelled", body = LeaveRequest),
        (status = 400, description = "Already processed"),
        (status = 403, description = "Not the requester"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave_id = path.into_inner();
    let leave = fetch_leave(pool.get_ref(), leave_id).await?;

    if leave.user_id != auth.user_id {
        return Err(AppError::forbidden("Only the requester can cancel a leave"));
    }
    let next = leave.status.apply(LeaveAction::Cancel)?;

    let result = sqlx::query("UPDATE leave_requests SET status = ? WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(leave_id)
        .bind(LeaveStatus::Pending.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(AppError::db("Cancel leave failed"))?;

    if result.rows_affected() == 0 {
        return Err(LeaveRuleError::AlreadyProcessed.into());
    }

    activity::record(
        pool.get_ref(),
        auth.user_id,
        "leave.cancelled",
        format!("leave #{leave_id}"),
    )
    .await;

    let leave = fetch_leave(pool.get_ref(), leave_id).await?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Leave application details (requester or HR/Admin)
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "message": "Leave request not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_manager(leave.user_id)?;
    Ok(HttpResponse::Ok().json(leave))
}

/// The caller's own leave applications
#[utoipa::path(
    get,
    path = "/api/leave/me",
    params(LeaveFilter),
    responses((status = 200, description = "Paginated leave list", body = LeaveListResponse)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn my_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    let response = query_leaves(
        pool.get_ref(),
        Some(auth.user_id),
        query.status,
        query.leave_type,
        query.page,
        query.per_page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// All leave applications (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let response = query_leaves(
        pool.get_ref(),
        query.user_id,
        query.status,
        query.leave_type,
        query.page,
        query.per_page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_upsert_overwrites_every_written_column() {
        let (insert, update) = UPSERT_DAY
            .split_once("ON DUPLICATE KEY UPDATE")
            .unwrap();
        for column in [
            "status",
            "check_in",
            "check_out",
            "break_minutes",
            "total_working_hours",
        ] {
            assert!(insert.contains(column), "{column} not inserted");
            assert!(
                update.contains(&format!("{column} = VALUES({column})")),
                "{column} kept from an earlier check-in"
            );
        }
        // key columns identify the row and are never rewritten
        assert!(!update.contains("user_id"));
        assert!(!update.contains("date ="));
        assert_eq!(insert.matches('?').count(), 7);
    }
}
