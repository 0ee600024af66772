use crate::model::attendance::round2;
use crate::utils::period::{MonthRange, is_working_day};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Payslip {
    pub id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    #[schema(example = 1)]
    pub month: u32,
    #[schema(example = 2026)]
    pub year: i32,
    pub working_days: u32,
    pub payable_days: f64,
    pub attendance_ratio: f64,
    pub full_net_salary: f64,
    pub gross_salary: f64,
    pub total_deductions: f64,
    pub net_salary: f64,
    #[schema(value_type = String, format = "date-time")]
    pub generated_at: DateTime<Utc>,
}

pub const PAYSLIP_COLUMNS: &str = r#"
    p.id, p.user_id, u.name AS user_name, p.month, p.year, p.working_days, p.payable_days,
    p.attendance_ratio, p.full_net_salary, p.gross_salary, p.total_deductions, p.net_salary,
    p.generated_at
"#;

/// Per-status day counts for one user over one month, weekdays only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceTally {
    pub present: i64,
    pub half_day: i64,
    pub leave: i64,
    pub absent: i64,
}

/// Monday to Friday days in the month.
pub fn working_days(range: &MonthRange) -> u32 {
    range
        .days()
        .filter(|d| is_working_day(*d))
        .count() as u32
}

/// Present + leave (minus unpaid leave) + half of each half-day, kept within the month.
pub fn payable_days(tally: &AttendanceTally, unpaid_leave_days: u32, working_days: u32) -> f64 {
    let paid_leave = (tally.leave - i64::from(unpaid_leave_days)).max(0) as f64;
    let days = tally.present as f64 + paid_leave + tally.half_day as f64 * 0.5;
    days.clamp(0.0, f64::from(working_days))
}

pub fn attendance_ratio(payable_days: f64, working_days: u32) -> f64 {
    if working_days == 0 {
        return 0.0;
    }
    payable_days / f64::from(working_days)
}

/// Attendance rate in percent: half-days count half, leave counts in full.
/// Capped at 100.
pub fn attendance_rate(tally: &AttendanceTally, working_days: u32) -> f64 {
    if working_days == 0 {
        return 0.0;
    }
    let attended = tally.present as f64 + tally.half_day as f64 * 0.5 + tally.leave as f64;
    round2((attended / f64::from(working_days) * 100.0).clamp(0.0, 100.0))
}

#[derive(Debug, PartialEq)]
pub struct ProratedPay {
    pub gross_salary: f64,
    pub total_deductions: f64,
    pub net_salary: f64,
}

pub fn prorate(gross: f64, deductions: f64, ratio: f64) -> ProratedPay {
    let gross_salary = round2(gross * ratio);
    let total_deductions = round2(deductions * ratio);
    ProratedPay {
        gross_salary,
        total_deductions,
        net_salary: round2(gross_salary - total_deductions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_days_skip_weekends() {
        // February 2026 starts on a Sunday: 20 weekdays
        let feb = MonthRange::new(2, 2026).unwrap();
        assert_eq!(working_days(&feb), 20);
        // January 2026 starts on a Thursday: 22 weekdays
        let jan = MonthRange::new(1, 2026).unwrap();
        assert_eq!(working_days(&jan), 22);
    }

    #[test]
    fn half_days_count_half_and_unpaid_leave_is_removed() {
        let tally = AttendanceTally {
            present: 15,
            half_day: 2,
            leave: 3,
            absent: 0,
        };
        assert_eq!(payable_days(&tally, 1, 20), 18.0);
    }

    #[test]
    fn payable_days_never_exceed_working_days() {
        let tally = AttendanceTally {
            present: 22,
            half_day: 0,
            leave: 4,
            absent: 0,
        };
        assert_eq!(payable_days(&tally, 0, 20), 20.0);
    }

    #[test]
    fn ratio_guard_for_empty_month() {
        assert_eq!(attendance_ratio(5.0, 0), 0.0);
        assert_eq!(attendance_ratio(15.0, 20), 0.75);
    }

    #[test]
    fn prorates_the_structure() {
        let pay = prorate(35_000.0, 3_000.0, 0.75);
        assert_eq!(
            pay,
            ProratedPay {
                gross_salary: 26_250.0,
                total_deductions: 2_250.0,
                net_salary: 24_000.0,
            }
        );
    }

    #[test]
    fn attendance_rate_in_percent() {
        let tally = AttendanceTally {
            present: 18,
            half_day: 2,
            leave: 1,
            absent: 1,
        };
        assert_eq!(attendance_rate(&tally, 22), 90.91);
        assert_eq!(attendance_rate(&tally, 0), 0.0);
    }

    #[test]
    fn absences_are_not_paid_back_by_weekday_counts() {
        // February 2026: 18 days present, 2 weekdays absent; a Sat-Sun leave
        // is not part of the weekday tally
        let tally = AttendanceTally {
            present: 18,
            half_day: 0,
            leave: 0,
            absent: 2,
        };
        let payable = payable_days(&tally, 0, 20);
        assert_eq!(payable, 18.0);
        assert_eq!(attendance_ratio(payable, 20), 0.9);
    }

    #[test]
    fn attendance_rate_is_capped() {
        let tally = AttendanceTally {
            present: 22,
            half_day: 0,
            leave: 0,
            absent: 0,
        };
        assert_eq!(attendance_rate(&tally, 20), 100.0);
    }
}
