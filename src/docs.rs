use crate::api::attendance::{
    AttendanceListResponse, AttendanceReportResponse, AttendanceWithUser, CheckOutReq,
    GenerateDailyReq,
};
use crate::api::dashboard::{AdminSummary, AttendanceReport, EmployeeSummary, ReportEntry};
use crate::api::leave_request::{CreateLeave, LeaveDecision, LeaveFilter, LeaveListResponse};
use crate::api::payroll::{
    GeneratePayslipReq, PaginatedPayslips, PaginatedStructures, PayrollQuery, SaveStructureReq,
};
use crate::api::users::{CreateUserReq, CreatedUser, UserListResponse, UserQuery};
use crate::model::attendance::{Attendance, AttendanceStatus};
use crate::model::leave_request::{LeaveRequest, LeaveStatus, LeaveType};
use crate::model::payslip::{AttendanceTally, Payslip};
use crate::model::role::Role;
use crate::model::salary_structure::{
    ComponentInput, Computation, Deduction, SalaryComponent, SalaryStructure,
};
use crate::model::user::{User, UserStatus};
use crate::models::{ChangePasswordReq, LoginReqDto, LoginResponse, RegisterReq};
use crate::utils::activity::Activity;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM System API",
        version = "1.0.0",
        description = r#"
## Human Resource Management (HRM) System

Backend for a small company's HR operations.

### 🔹 Key Features
- **Attendance**
  - Daily check-in / check-out with break deduction and Half-Day detection
  - Daily absent sweep and monthly views
- **Leave Management**
  - Apply, approve (marks the span as Leave), reject with comment, cancel
- **Payroll**
  - Salary structures with percentage/fixed components and PF on Basic
  - Monthly payslips prorated by attendance
- **People**
  - Admin-managed users, self-service profile, dashboards and activity feed

### 🔐 Security
Everything outside `/api/auth` (except password change) needs a **JWT Bearer** access token.
Roles: **admin**, **hr**, **employee**.

### 📦 Response Format
- JSON in and out; errors are `{"message": "..."}`
- Pagination on list endpoints via `page` / `per_page`

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::change_password,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::my_attendance,
        crate::api::attendance::list_attendance,
        crate::api::attendance::generate_daily,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::payroll::save_structure,
        crate::api::payroll::get_structure,
        crate::api::payroll::my_structure,
        crate::api::payroll::list_structures,
        crate::api::payroll::generate_payslip,
        crate::api::payroll::list_payslips,
        crate::api::payroll::my_payslips,
        crate::api::payroll::get_payslip,

        crate::api::profile::get_profile,
        crate::api::profile::update_profile,

        crate::api::users::create_user,
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::update_user,
        crate::api::users::deactivate_user,

        crate::api::dashboard::summary,
        crate::api::dashboard::my_summary,
        crate::api::dashboard::attendance_report,
        crate::api::dashboard::activity_feed
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            ChangePasswordReq,
            Role,
            User,
            UserStatus,
            CreateUserReq,
            CreatedUser,
            UserQuery,
            UserListResponse,
            Attendance,
            AttendanceStatus,
            AttendanceWithUser,
            AttendanceListResponse,
            AttendanceReportResponse,
            CheckOutReq,
            GenerateDailyReq,
            LeaveRequest,
            LeaveType,
            LeaveStatus,
            CreateLeave,
            LeaveDecision,
            LeaveFilter,
            LeaveListResponse,
            Computation,
            ComponentInput,
            SalaryComponent,
            Deduction,
            SalaryStructure,
            SaveStructureReq,
            Payslip,
            GeneratePayslipReq,
            PayrollQuery,
            PaginatedStructures,
            PaginatedPayslips,
            AttendanceTally,
            AdminSummary,
            EmployeeSummary,
            ReportEntry,
            AttendanceReport,
            Activity
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and token lifecycle"),
        (name = "Attendance", description = "Attendance management APIs"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Payroll", description = "Salary structures and payslips"),
        (name = "Profile", description = "Self-service profile"),
        (name = "Users", description = "User administration"),
        (name = "Dashboard", description = "Summaries, reports and activity"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_resource_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth/login",
            "/api/attendance/check-in",
            "/api/leave/{leave_id}/approve",
            "/api/payroll/payslips",
            "/api/profile",
            "/api/users/{user_id}",
            "/api/dashboard/summary",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
