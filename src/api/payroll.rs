use crate::{
    api::{attendance::month_tally, leave_request::approved_spans},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::{
        leave_request::{LeaveType, working_days_within},
        payslip::{
            PAYSLIP_COLUMNS, Payslip, attendance_ratio, payable_days, prorate, working_days,
        },
        salary_structure::{
            ComponentInput, Deduction, SALARY_COLUMNS, SalaryInput, SalaryStructure,
        },
    },
    utils::{activity, db_utils::paginate, period::MonthRange},
};
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, types::Json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct SaveStructureReq {
    #[schema(example = 50000.0)]
    pub monthly_wage: f64,
    pub components: Vec<ComponentInput>,
    #[schema(example = 12.0)]
    #[serde(default)]
    pub pf_percentage: f64,
    #[serde(default)]
    pub deductions: Vec<Deduction>,
    /// Defaults to today
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    pub effective_from: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct GeneratePayslipReq {
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct PayrollQuery {
    #[schema(example = 1)]
    pub page: Option<u32>,

    #[schema(example = 10)]
    pub per_page: Option<u32>,

    /// Only used by the HR/Admin listing
    #[schema(example = 7)]
    pub user_id: Option<u64>,

    #[schema(example = 1)]
    pub month: Option<u32>,

    #[schema(example = 2026)]
    pub year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedStructures {
    pub data: Vec<SalaryStructure>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedPayslips {
    pub data: Vec<Payslip>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

pub async fn fetch_structure(
    pool: &MySqlPool,
    user_id: u64,
) -> AppResult<Option<SalaryStructure>> {
    let sql = format!(
        "SELECT {SALARY_COLUMNS} FROM salary_structures s JOIN users u ON u.id = s.user_id WHERE s.user_id = ?"
    );
    sqlx::query_as::<_, SalaryStructure>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch salary structure"))
}

async fn fetch_payslip(pool: &MySqlPool, payslip_id: u64) -> AppResult<Payslip> {
    let sql = format!(
        "SELECT {PAYSLIP_COLUMNS} FROM payslips p JOIN users u ON u.id = p.user_id WHERE p.id = ?"
    );
    sqlx::query_as::<_, Payslip>(&sql)
        .bind(payslip_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::db("Failed to fetch payslip"))?
        .ok_or_else(|| AppError::not_found("Payslip not found"))
}

async fn ensure_user_exists(pool: &MySqlPool, user_id: u64) -> AppResult<()> {
    let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::db("Failed to look up user"))?;

    if found == 0 {
        return Err(AppError::not_found("User not found"));
    }
    Ok(())
}

async fn query_payslips(
    pool: &MySqlPool,
    user_id: Option<u64>,
    query: &PayrollQuery,
) -> AppResult<PaginatedPayslips> {
    let (page, per_page, offset) = paginate(query.page, query.per_page, 10);

    let mut where_sql = String::from(" WHERE 1=1");
    if user_id.is_some() {
        where_sql.push_str(" AND p.user_id = ?");
    }
    if query.month.is_some() {
        where_sql.push_str(" AND p.month = ?");
    }
    if query.year.is_some() {
        where_sql.push_str(" AND p.year = ?");
    }

    let count_sql = format!("SELECT COUNT(*) FROM payslips p{where_sql}");
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(user_id) = user_id {
        count_q = count_q.bind(user_id);
    }
    if let Some(month) = query.month {
        count_q = count_q.bind(month);
    }
    if let Some(year) = query.year {
        count_q = count_q.bind(year);
    }
    let total = count_q
        .fetch_one(pool)
        .await
        .map_err(AppError::db("Failed to count payslips"))?;

    let data_sql = format!(
        r#"
        SELECT {PAYSLIP_COLUMNS}
        FROM payslips p
        JOIN users u ON u.id = p.user_id
        {where_sql}
        ORDER BY p.year DESC, p.month DESC, u.name ASC
        LIMIT ? OFFSET ?
        "#
    );
    let mut data_q = sqlx::query_as::<_, Payslip>(&data_sql);
    if let Some(user_id) = user_id {
        data_q = data_q.bind(user_id);
    }
    if let Some(month) = query.month {
        data_q = data_q.bind(month);
    }
    if let Some(year) = query.year {
        data_q = data_q.bind(year);
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::db("Failed to fetch payslips"))?;

    Ok(PaginatedPayslips {
        data,
        page,
        per_page,
        total,
    })
}

/// Create or replace a user's salary structure (HR/Admin)
#[utoipa::path(
    put,
    path = "/api/payroll/structures/{user_id}",
    params(("user_id" = u64, Path, description = "Owner of the structure")),
    request_body = SaveStructureReq,
    responses(
        (status = 200, description = "Structure saved with derived fields", body = SalaryStructure),
        (status = 400, description = "Invalid input or components exceed the wage", body = Object, example = json!({
            "message": "Total of salary components (31000.00) exceeds monthly wage (30000.00)"
        })),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn save_structure(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SaveStructureReq>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let user_id = path.into_inner();
    let payload = payload.into_inner();
    let effective_from = payload
        .effective_from
        .unwrap_or_else(|| Local::now().date_naive());

    let computed = SalaryInput {
        monthly_wage: payload.monthly_wage,
        components: payload.components,
        pf_percentage: payload.pf_percentage,
        deductions: payload.deductions,
    }
    .compute()?;

    ensure_user_exists(pool.get_ref(), user_id).await?;

    sqlx::query(
        r#"
        INSERT INTO salary_structures
            (user_id, monthly_wage, yearly_wage, components, pf_percentage, employee_pf,
             employer_pf, deductions, gross_salary, total_deductions, net_salary, effective_from)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            monthly_wage = VALUES(monthly_wage),
            yearly_wage = VALUES(yearly_wage),
            components = VALUES(components),
            pf_percentage = VALUES(pf_percentage),
            employee_pf = VALUES(employee_pf),
            employer_pf = VALUES(employer_pf),
            deductions = VALUES(deductions),
            gross_salary = VALUES(gross_salary),
            total_deductions = VALUES(total_deductions),
            net_salary = VALUES(net_salary),
            effective_from = VALUES(effective_from)
        "#,
    )
    .bind(user_id)
    .bind(computed.monthly_wage)
    .bind(computed.yearly_wage)
    .bind(Json(&computed.components))
    .bind(computed.pf_percentage)
    .bind(computed.employee_pf)
    .bind(computed.employer_pf)
    .bind(Json(&computed.deductions))
    .bind(computed.gross_salary)
    .bind(computed.total_deductions)
    .bind(computed.net_salary)
    .bind(effective_from)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to save salary structure"))?;

    info!(user_id, net = computed.net_salary, "Salary structure saved");
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "payroll.structure_saved",
        format!("user #{user_id}: net {:.2}", computed.net_salary),
    )
    .await;

    let saved = fetch_structure(pool.get_ref(), user_id)
        .await?
        .ok_or(AppError::Internal)?;
    Ok(HttpResponse::Ok().json(saved))
}

/// Salary structure of a user (owner or HR/Admin)
#[utoipa::path(
    get,
    path = "/api/payroll/structures/{user_id}",
    params(("user_id" = u64, Path, description = "Owner of the structure")),
    responses(
        (status = 200, description = "Salary structure", body = SalaryStructure),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No structure for this user")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_structure(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    auth.require_self_or_manager(user_id)?;

    let structure = fetch_structure(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Salary structure not found"))?;
    Ok(HttpResponse::Ok().json(structure))
}

/// The caller's own salary structure
#[utoipa::path(
    get,
    path = "/api/payroll/structures/me",
    responses(
        (status = 200, description = "Salary structure", body = SalaryStructure),
        (status = 404, description = "No structure yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn my_structure(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let structure = fetch_structure(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Salary structure not found"))?;
    Ok(HttpResponse::Ok().json(structure))
}

/// All salary structures (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/payroll/structures",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated structures", body = PaginatedStructures),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_structures(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let (page, per_page, offset) = paginate(query.page, query.per_page, 10);

    let mut count_q = sqlx::query_scalar::<_, i64>(if query.user_id.is_some() {
        "SELECT COUNT(*) FROM salary_structures WHERE user_id = ?"
    } else {
        "SELECT COUNT(*) FROM salary_structures"
    });
    if let Some(user_id) = query.user_id {
        count_q = count_q.bind(user_id);
    }
    let total = count_q
        .fetch_one(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to count salary structures"))?;

    let filter = if query.user_id.is_some() {
        "WHERE s.user_id = ?"
    } else {
        ""
    };
    let sql = format!(
        r#"
        SELECT {SALARY_COLUMNS}
        FROM salary_structures s
        JOIN users u ON u.id = s.user_id
        {filter}
        ORDER BY u.name ASC
        LIMIT ? OFFSET ?
        "#
    );
    let mut data_q = sqlx::query_as::<_, SalaryStructure>(&sql);
    if let Some(user_id) = query.user_id {
        data_q = data_q.bind(user_id);
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await
        .map_err(AppError::db("Failed to fetch salary structures"))?;

    Ok(HttpResponse::Ok().json(PaginatedStructures {
        data,
        page,
        per_page,
        total,
    }))
}

/// Generate (or regenerate) a user's payslip for a month (HR/Admin)
#[utoipa::path(
    post,
    path = "/api/payroll/payslips",
    request_body = GeneratePayslipReq,
    responses(
        (status = 201, description = "Payslip generated", body = Payslip),
        (status = 400, description = "Invalid month"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User has no salary structure")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn generate_payslip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GeneratePayslipReq>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let range = MonthRange::new(payload.month, payload.year)
        .ok_or_else(|| AppError::bad_request("month must be between 1 and 12"))?;
    let user_id = payload.user_id;

    let structure = fetch_structure(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Salary structure not found"))?;

    let tally = month_tally(pool.get_ref(), user_id, &range).await?;
    let unpaid: u32 = approved_spans(
        pool.get_ref(),
        user_id,
        Some(LeaveType::Unpaid),
        range.start,
        range.end,
    )
    .await?
    .into_iter()
    .map(|(start, end)| working_days_within(start, end, range.start, range.end))
    .sum();

    let working = working_days(&range);
    let payable = payable_days(&tally, unpaid, working);
    let ratio = attendance_ratio(payable, working);
    let pay = prorate(structure.gross_salary, structure.total_deductions, ratio);

    sqlx::query(
        r#"
        INSERT INTO payslips
            (user_id, month, year, working_days, payable_days, attendance_ratio,
             full_net_salary, gross_salary, total_deductions, net_salary)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            working_days = VALUES(working_days),
            payable_days = VALUES(payable_days),
            attendance_ratio = VALUES(attendance_ratio),
            full_net_salary = VALUES(full_net_salary),
            gross_salary = VALUES(gross_salary),
            total_deductions = VALUES(total_deductions),
            net_salary = VALUES(net_salary),
            generated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(user_id)
    .bind(range.month)
    .bind(range.year)
    .bind(working)
    .bind(payable)
    .bind(ratio)
    .bind(structure.net_salary)
    .bind(pay.gross_salary)
    .bind(pay.total_deductions)
    .bind(pay.net_salary)
    .execute(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to save payslip"))?;

    let payslip_id = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM payslips WHERE user_id = ? AND year = ? AND month = ?",
    )
    .bind(user_id)
    .bind(range.year)
    .bind(range.month)
    .fetch_one(pool.get_ref())
    .await
    .map_err(AppError::db("Failed to fetch payslip id"))?;

    info!(
        user_id,
        month = range.month,
        year = range.year,
        payable,
        net = pay.net_salary,
        "Payslip generated"
    );
    activity::record(
        pool.get_ref(),
        auth.user_id,
        "payroll.payslip_generated",
        format!(
            "user #{user_id} {}-{:02}: {payable}/{working} days",
            range.year, range.month
        ),
    )
    .await;

    let payslip = fetch_payslip(pool.get_ref(), payslip_id).await?;
    Ok(HttpResponse::Created().json(payslip))
}

/// All payslips (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/payroll/payslips",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Paginated payslips", body = PaginatedPayslips),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payslips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let response = query_payslips(pool.get_ref(), query.user_id, &query).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// The caller's payslips
#[utoipa::path(
    get,
    path = "/api/payroll/payslips/me",
    params(PayrollQuery),
    responses((status = 200, description = "Paginated payslips", body = PaginatedPayslips)),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn my_payslips(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    let response = query_payslips(pool.get_ref(), Some(auth.user_id), &query).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Single payslip (owner or HR/Admin)
#[utoipa::path(
    get,
    path = "/api/payroll/payslips/{payslip_id}",
    params(("payslip_id" = u64, Path, description = "Payslip ID")),
    responses(
        (status = 200, description = "Payslip", body = Payslip),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Payslip not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payslip(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let payslip = fetch_payslip(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or_manager(payslip.user_id)?;
    Ok(HttpResponse::Ok().json(payslip))
}
