use crate::{
    api::{attendance::month_tally, leave_request::approved_spans, payroll::fetch_structure},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        attendance::AttendanceStatus,
        leave_request::{LeaveStatus, days_in_year},
        payslip::{AttendanceTally, attendance_rate, working_days},
        user::UserStatus,
    },
    utils::{
        activity::{self, Activity},
        period::{MonthQuery, MonthRange},
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct AdminSummary {
    #[schema(example = 42)]
    pub active_employees: i64,
    #[schema(example = 37)]
    pub present_today: i64,
    #[schema(example = 3)]
    pub on_leave_today: i64,
    #[schema(example = 5)]
    pub pending_leaves: i64,
    /// Sum of net salary over active users' structures
    #[schema(example = 1250000.0)]
    pub total_monthly_payroll: f64,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeSummary {
    pub month: u32,
    pub year: i32,
    pub attendance: AttendanceTally,
    pub pending_leaves: i64,
    pub approved_leave_days_this_year: u32,
    /// `null` until HR sets up a salary structure
    pub net_salary: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    user_id: u64,
    user_name: String,
    department: Option<String>,
    present: i64,
    half_day: i64,
    leave: i64,
    absent: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ReportEntry {
    pub user_id: u64,
    pub user_name: String,
    pub department: Option<String>,
    #[serde(flatten)]
    pub tally: AttendanceTally,
    /// Percent of working days attended, half-days counting half
    #[schema(example = 92.5)]
    pub attendance_rate: f64,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceReport {
    pub month: u32,
    pub year: i32,
    pub working_days: u32,
    pub data: Vec<ReportEntry>,
}

#[derive(Deserialize, IntoParams)]
pub struct FeedQuery {
    /// Entries to return, 1-100 (default 20)
    pub limit: Option<u32>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn count(pool: &MySqlPool, sql: &str, binds: &[&str], context: &'static str) -> AppResult<i64> {
    let mut q = sqlx::query_scalar::<_, i64>(sql);
    for b in binds {
        q = q.bind(*b);
    }
    q.fetch_one(pool).await.map_err(AppError::db(context))
}

/// Company-wide numbers for today (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/dashboard/summary",
    responses(
        (status = 200, description = "Headline counts", body = AdminSummary),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let pool = pool.get_ref();
    let today = today().to_string();
    let active = UserStatus::Active.as_ref();

    let active_employees = count(
        pool,
        "SELECT COUNT(*) FROM users WHERE status = ?",
        &[active],
        "Failed to count active users",
    )
    .await?;

    let present_today = count(
        pool,
        r#"
        SELECT COUNT(*) FROM attendance
        WHERE date = ? AND status IN (?, ?) AND check_in IS NOT NULL
        "#,
        &[
            today.as_str(),
            AttendanceStatus::Present.as_ref(),
            AttendanceStatus::HalfDay.as_ref(),
        ],
        "Failed to count present users",
    )
    .await?;

    let on_leave_today = count(
        pool,
        "SELECT COUNT(*) FROM attendance WHERE date = ? AND status = ?",
        &[today.as_str(), AttendanceStatus::Leave.as_ref()],
        "Failed to count users on leave",
    )
    .await?;

    let pending_leaves = count(
        pool,
        "SELECT COUNT(*) FROM leave_requests WHERE status = ?",
        &[LeaveStatus::Pending.as_ref()],
        "Failed to count pending leaves",
    )
    .await?;

    let total_monthly_payroll = sqlx::query_scalar::<_, Option<f64>>(
        r#"
        SELECT SUM(s.net_salary)
        FROM salary_structures s
        JOIN users u ON u.id = s.user_id
        WHERE u.status = ?
        "#,
    )
    .bind(active)
    .fetch_one(pool)
    .await
    .map_err(AppError::db("Failed to sum payroll"))?
    .unwrap_or(0.0);

    Ok(HttpResponse::Ok().json(AdminSummary {
        active_employees,
        present_today,
        on_leave_today,
        pending_leaves,
        total_monthly_payroll,
    }))
}

/// The caller's month at a glance
#[utoipa::path(
    get,
    path = "/api/dashboard/me",
    responses((status = 200, description = "Personal summary", body = EmployeeSummary)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn my_summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let pool = pool.get_ref();
    let today = today();
    let range = MonthRange::containing(today);

    let attendance = month_tally(pool, auth.user_id, &range).await?;

    let pending_leaves = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leave_requests WHERE user_id = ? AND status = ?",
    )
    .bind(auth.user_id)
    .bind(LeaveStatus::Pending.as_ref())
    .fetch_one(pool)
    .await
    .map_err(AppError::db("Failed to count pending leaves"))?;

    let year = today.year();
    let (year_start, next_year) = match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year + 1, 1, 1),
    ) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(AppError::Internal),
    };
    let approved_leave_days_this_year: u32 = approved_spans(pool, auth.user_id, None, year_start, next_year)
        .await?
        .into_iter()
        .map(|(start, end)| days_in_year(start, end, year))
        .sum();

    let net_salary = fetch_structure(pool, auth.user_id)
        .await?
        .map(|s| s.net_salary);

    Ok(HttpResponse::Ok().json(EmployeeSummary {
        month: range.month,
        year: range.year,
        attendance,
        pending_leaves,
        approved_leave_days_this_year,
        net_salary,
    }))
}

/// Per-user attendance counts and rate for a month (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/dashboard/attendance-report",
    params(MonthQuery),
    responses(
        (status = 200, description = "Attendance report", body = AttendanceReport),
        (status = 400, description = "Invalid month"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn attendance_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MonthQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let range = query
        .resolve(today())
        .ok_or_else(|| AppError::bad_request("month must be between 1 and 12"))?;

    let rows = sqlx::query_as::<_, ReportRow>(
        r#"
        SELECT
            u.id AS user_id,
            u.name AS user_name,
            u.department,
            COUNT(CASE WHEN a.status = ? THEN 1 END) AS present,
            COUNT(CASE WHEN a.status = ? THEN 1 END) AS half_day,
            COUNT(CASE WHEN a.status = ? THEN 1 END) AS `leave`,
            COUNT(CASE WHEN a.status = ? THEN 1 END) AS absent
        FROM users u
        LEFT JOIN attendance a
            ON a.user_id = u.id AND a.date >= ? AND a.date < ?
            AND DAYOFWEEK(a.date) NOT IN (1, 7)
        WHERE u.status = ?
        GROUP BY u.id, u.name, u.department
        ORDER BY u.name ASC
        "#,
    )
    .bind(AttendanceStatus::Present.as_ref())
    .bind(AttendanceStatus::HalfDay.as_ref())
    .bind(AttendanceStatus::Leave.as_ref())
    .bind(AttendanceStatus::Absent.as_ref())
    .bind(range.start)
    .bind(range.end)
    .bind(UserStatus::Active.as_ref())
    .fetch_all(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to build attendance report"))?;

    let working = working_days(&range);
    let data = rows
        .into_iter()
        .map(|row| {
            let tally = AttendanceTally {
                present: row.present,
                half_day: row.half_day,
                leave: row.leave,
                absent: row.absent,
            };
            ReportEntry {
                user_id: row.user_id,
                user_name: row.user_name,
                department: row.department,
                attendance_rate: attendance_rate(&tally, working),
                tally,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(AttendanceReport {
        month: range.month,
        year: range.year,
        working_days: working,
        data,
    }))
}

/// Most recent activity, newest first (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/dashboard/activity",
    params(FeedQuery),
    responses(
        (status = 200, description = "Recent activity", body = [Activity]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn activity_feed(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<FeedQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let entries = activity::recent(pool.get_ref(), limit)
        .await
        .map_err(AppError::db("Failed to fetch activity feed"))?;

    Ok(HttpResponse::Ok().json(entries))
}
