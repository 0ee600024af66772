pub mod attendance;
pub mod leave_request;
pub mod payslip;
pub mod role;
pub mod salary_structure;
pub mod user;
