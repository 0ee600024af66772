pub mod attendance;
pub mod dashboard;
pub mod leave_request;
pub mod payroll;
pub mod profile;
pub mod users;
