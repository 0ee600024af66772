use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::attendance::{
        Attendance, AttendanceRuleError, AttendanceStatus, CheckInPlan, ensure_written,
        evaluate_check_out, plan_check_in,
    },
    model::payslip::AttendanceTally,
    utils::{
        activity,
        body::optional_json,
        period::{MonthQuery, MonthRange},
    },
};
use actix_web::{HttpResponse, web, web::Bytes};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

const ATTENDANCE_COLUMNS: &str = r#"
    a.id, a.user_id, a.date, a.check_in, a.check_out, a.break_minutes, a.status,
    a.total_working_hours
"#;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckOutReq {
    /// Unpaid break taken during the day
    #[schema(example = 60)]
    #[serde(default)]
    pub break_minutes: u32,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceFilter {
    /// Restrict to one user
    pub user_id: Option<u64>,
    /// 1-12, defaults to the current month
    pub month: Option<u32>,
    /// defaults to the current year
    pub year: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GenerateDailyReq {
    /// Day to sweep, defaults to today
    #[schema(example = "2026-01-05", value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

/// Attendance row with the owner's display fields.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceWithUser {
    pub id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub email: String,
    pub department: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>)]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>)]
    pub check_out: Option<NaiveDateTime>,
    pub break_minutes: u32,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    pub total_working_hours: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub month: u32,
    pub year: i32,
    pub data: Vec<Attendance>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttendanceReportResponse {
    pub month: u32,
    pub year: i32,
    pub data: Vec<AttendanceWithUser>,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub async fn fetch_day(
    pool: &MySqlPool,
    user_id: u64,
    date: NaiveDate,
) -> AppResult<Option<Attendance>> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance a WHERE a.user_id = ? AND a.date = ?");
    sqlx::query_as::<_, Attendance>(&sql)
        .bind(user_id)
        .bind(date)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch attendance day"))
}

/// Per-status counts for one user over a month. Weekend rows (leave spans,
/// weekend check-ins) are left out so the counts line up with working days.
pub async fn month_tally(
    pool: &MySqlPool,
    user_id: u64,
    range: &MonthRange,
) -> AppResult<AttendanceTally> {
    sqlx::query_as::<_, AttendanceTally>(
        r#"
        SELECT
            COUNT(CASE WHEN status = ? THEN 1 END) AS present,
            COUNT(CASE WHEN status = ? THEN 1 END) AS half_day,
            COUNT(CASE WHEN status = ? THEN 1 END) AS `leave`,
            COUNT(CASE WHEN status = ? THEN 1 END) AS absent
        FROM attendance
        WHERE user_id = ? AND date >= ? AND date < ?
          AND DAYOFWEEK(date) NOT IN (1, 7)
        "#,
    )
    .bind(AttendanceStatus::Present.as_ref())
    .bind(AttendanceStatus::HalfDay.as_ref())
    .bind(AttendanceStatus::Leave.as_ref())
    .bind(AttendanceStatus::Absent.as_ref())
    .bind(user_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_one(pool)
    .await
    .map_err(AppError::db("Failed to tally attendance"))
}

async fn fetch_by_id(pool: &MySqlPool, id: u64) -> AppResult<Attendance> {
    let sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance a WHERE a.id = ?");
    sqlx::query_as::<_, Attendance>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch attendance"))?
        .ok_or_else(|| AppError::not_found("Attendance record not found"))
}

/// A unique-key clash on insert means a concurrent check-in won the day.
fn insert_failure(e: sqlx::Error, user_id: u64) -> AppError {
    if is_duplicate_key(&e) {
        return AttendanceRuleError::AlreadyCheckedIn.into();
    }
    error!(error = %e, user_id, "Check-in failed");
    AppError::Internal
}

fn resolve_month(query: &MonthQuery, today: NaiveDate) -> AppResult<MonthRange> {
    query
        .resolve(today)
        .ok_or_else(|| AppError::bad_request("month must be between 1 and 12"))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = Attendance),
        (status = 400, description = "Already checked in today", body = Object, example = json!({
            "message": "Already checked in today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user_id = auth.user_id;
    let now = local_now();
    let today = now.date();

    let existing = fetch_day(pool.get_ref(), user_id, today).await?;

    let id = match plan_check_in(existing.as_ref())? {
        CheckInPlan::Insert => sqlx::query(
            r#"
            INSERT INTO attendance (user_id, date, check_in, status)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(today)
        .bind(now)
        .bind(AttendanceStatus::Present.as_ref())
        .execute(pool.get_ref())
        .await
        .map_err(|e| insert_failure(e, user_id))?
        .last_insert_id(),
        CheckInPlan::Update(id) => {
            let result = sqlx::query(
                r#"
                UPDATE attendance
                SET check_in = ?, check_out = NULL, break_minutes = 0,
                    total_working_hours = 0, status = ?
                WHERE id = ? AND check_in IS NULL
                "#,
            )
            .bind(now)
            .bind(AttendanceStatus::Present.as_ref())
            .bind(id)
            .execute(pool.get_ref())
            .await
            .map_err(AppError::db("Check-in failed"))?;

            ensure_written(result.rows_affected(), AttendanceRuleError::AlreadyCheckedIn)?;
            id
        }
    };

    info!(user_id, %today, "Checked in");
    activity::record(pool.get_ref(), user_id, "attendance.check_in", today.to_string()).await;

    let record = fetch_by_id(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body(content = CheckOutReq, description = "Optional break length"),
    responses(
        (status = 200, description = "Checked out successfully", body = Attendance),
        (status = 400, description = "No active check-in found for today", body = Object, example = json!({
            "message": "No active check-in found for today"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: Bytes,
) -> AppResult<HttpResponse> {
    let user_id = auth.user_id;
    let req: CheckOutReq = optional_json(&body)?;
    let break_minutes = req.break_minutes;
    let now = local_now();

    let existing = fetch_day(pool.get_ref(), user_id, now.date()).await?;
    let outcome = evaluate_check_out(existing.as_ref(), now, break_minutes, config.half_day_hours)?;
    let Some(record) = existing else {
        return Err(AttendanceRuleError::NotCheckedIn.into());
    };

    let result = sqlx::query(
        r#"
        UPDATE attendance
        SET check_out = ?, break_minutes = ?, total_working_hours = ?, status = ?
        WHERE id = ? AND check_in IS NOT NULL AND check_out IS NULL
        "#,
    )
    .bind(now)
    .bind(break_minutes)
    .bind(outcome.total_working_hours)
    .bind(outcome.status.as_ref())
    .bind(record.id)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Check-out failed"))?;

    ensure_written(result.rows_affected(), AttendanceRuleError::AlreadyCheckedOut)?;

    info!(
        user_id,
        hours = outcome.total_working_hours,
        status = %outcome.status,
        "Checked out"
    );
    activity::record(
        pool.get_ref(),
        user_id,
        "attendance.check_out",
        format!("{} ({}h)", record.date, outcome.total_working_hours),
    )
    .await;

    let record = fetch_by_id(pool.get_ref(), record.id).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Today's record for the caller, or null
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Today's attendance, null before check-in", body = Attendance)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let record = fetch_day(pool.get_ref(), auth.user_id, local_now().date()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// The caller's attendance for one month
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(MonthQuery),
    responses(
        (status = 200, description = "Attendance for the month", body = AttendanceListResponse),
        (status = 400, description = "Invalid month")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MonthQuery>,
) -> AppResult<HttpResponse> {
    let range = resolve_month(&query, local_now().date())?;

    let sql = format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendance a
        WHERE a.user_id = ? AND a.date >= ? AND a.date < ?
        ORDER BY a.date ASC
        "#
    );
    let data = sqlx::query_as::<_, Attendance>(&sql)
        .bind(auth.user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to fetch attendance"))?;

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        month: range.month,
        year: range.year,
        data,
    }))
}

/// Everyone's attendance for a month (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceFilter),
    responses(
        (status = 200, description = "Attendance with user details", body = AttendanceReportResponse),
        (status = 400, description = "Invalid month"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceFilter>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let month_query = MonthQuery {
        month: query.month,
        year: query.year,
    };
    let range = resolve_month(&month_query, local_now().date())?;

    let mut sql = String::from(
        r#"
        SELECT a.id, a.user_id, u.name AS user_name, u.email, u.department, a.date,
               a.check_in, a.check_out, a.break_minutes, a.status, a.total_working_hours
        FROM attendance a
        JOIN users u ON u.id = a.user_id
        WHERE a.date >= ? AND a.date < ?
        "#,
    );
    if query.user_id.is_some() {
        sql.push_str(" AND a.user_id = ?");
    }
    sql.push_str(" ORDER BY a.date DESC, u.name ASC");

    let mut data_q = sqlx::query_as::<_, AttendanceWithUser>(&sql)
        .bind(range.start)
        .bind(range.end);
    if let Some(user_id) = query.user_id {
        data_q = data_q.bind(user_id);
    }

    let data = data_q
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to fetch attendance list"))?;

    Ok(HttpResponse::Ok().json(AttendanceReportResponse {
        month: range.month,
        year: range.year,
        data,
    }))
}

/// Marks every active user without a record as absent for the day
#[utoipa::path(
    post,
    path = "/api/attendance/generate-daily",
    request_body(content = GenerateDailyReq, description = "Optional day, defaults to today"),
    responses(
        (status = 200, description = "Rows created", body = Object, example = json!({
            "date": "2026-01-05", "created": 12
        })),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn generate_daily(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: Bytes,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let req: GenerateDailyReq = optional_json(&body)?;
    let date = req.date.unwrap_or_else(|| local_now().date());

    // IGNORE: rows racing in from check-ins keep their data
    let result = sqlx::query(
        r#"
        INSERT IGNORE INTO attendance (user_id, date, status)
        SELECT u.id, ?, ?
        FROM users u
        WHERE u.status = 'active'
          AND NOT EXISTS (
              SELECT 1 FROM attendance a WHERE a.user_id = u.id AND a.date = ?
          )
        "#,
    )
    .bind(date)
    .bind(AttendanceStatus::Absent.as_ref())
    .bind(date)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Daily attendance sweep failed"))?;

    let created = result.rows_affected();
    info!(%date, created, "Daily attendance generated");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "attendance.generated",
        format!("{date}: {created} absent rows"),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "date": date,
        "created": created
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_access_token;
    use crate::error::fake_db;
    use crate::model::role::Role;
    use actix_web::{App, http::StatusCode, test};
    use sqlx::mysql::MySqlPoolOptions;

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "SERVER_ADDR" => Some("127.0.0.1:0".into()),
            "DATABASE_URL" => Some("mysql://localhost/test".into()),
            "JWT_SECRET" => Some("test-secret".into()),
            _ => None,
        })
        .unwrap()
    }

    #[::core::prelude::v1::test]
    fn concurrent_insert_reads_as_already_checked_in() {
        let err = insert_failure(fake_db::with_code("23000"), 3);
        assert_eq!(err.to_string(), "Already checked in today");

        let err = insert_failure(sqlx::Error::PoolTimedOut, 3);
        assert!(matches!(err, AppError::Internal));
    }

    #[actix_web::test]
    async fn malformed_check_out_body_is_rejected_before_any_write() {
        let config = test_config();
        // never connected: the request must fail before touching the database
        let pool = MySqlPoolOptions::new()
            .connect_lazy("mysql://nobody@127.0.0.1:1/none")
            .unwrap();
        let token = generate_access_token(
            3,
            "jane@company.com".into(),
            Role::Employee.id(),
            &config.jwt_secret,
            900,
        )
        .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(pool))
                .route("/check-out", web::post().to(check_out)),
        )
        .await;

        for body in [r#"{"break_minutes": "60"}"#, r#"{"break_minutes": -5}"#] {
            let req = test::TestRequest::post()
                .uri("/check-out")
                .insert_header(("Authorization", format!("Bearer {token}")))
                .insert_header(("Content-Type", "application/json"))
                .set_payload(body)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        }
    }
}
