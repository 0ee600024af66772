use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDay,
    Leave,
}

impl TryFrom<String> for AttendanceStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    pub id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date", example = "2026-01-05")]
    pub date: NaiveDate,
    #[schema(value_type = Option<String>, example = "2026-01-05T09:00:00")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, example = "2026-01-05T18:00:00")]
    pub check_out: Option<NaiveDateTime>,
    pub break_minutes: u32,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    #[schema(example = 8.0)]
    pub total_working_hours: f64,
}

/// Full contents of one (user, day) attendance row as written by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub user_id: u64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub break_minutes: u32,
    pub total_working_hours: f64,
}

impl DayRecord {
    /// A day with no clock times, e.g. Leave or Absent.
    pub fn cleared(user_id: u64, date: NaiveDate, status: AttendanceStatus) -> Self {
        Self {
            user_id,
            date,
            status,
            check_in: None,
            check_out: None,
            break_minutes: 0,
            total_working_hours: 0.0,
        }
    }
}

/// What a check-in has to do with today's row.
#[derive(Debug, PartialEq, Eq)]
pub enum CheckInPlan {
    Insert,
    /// Row exists without a check-in (daily sweep or leave), fill it in.
    Update(u64),
}

#[derive(Debug, PartialEq, Eq)]
pub enum AttendanceRuleError {
    AlreadyCheckedIn,
    NotCheckedIn,
    AlreadyCheckedOut,
    CheckOutBeforeCheckIn,
}

impl AttendanceRuleError {
    pub fn message(&self) -> &'static str {
        match self {
            AttendanceRuleError::AlreadyCheckedIn => "Already checked in today",
            AttendanceRuleError::NotCheckedIn => "No active check-in found for today",
            AttendanceRuleError::AlreadyCheckedOut => "Already checked out today",
            AttendanceRuleError::CheckOutBeforeCheckIn => "Check-out cannot be before check-in",
        }
    }
}

pub fn plan_check_in(today: Option<&Attendance>) -> Result<CheckInPlan, AttendanceRuleError> {
    match today {
        None => Ok(CheckInPlan::Insert),
        Some(record) if record.check_in.is_some() => Err(AttendanceRuleError::AlreadyCheckedIn),
        Some(record) => Ok(CheckInPlan::Update(record.id)),
    }
}

/// Guarded UPDATEs match nothing when a concurrent request got there first.
pub fn ensure_written(rows_affected: u64, lost: AttendanceRuleError) -> Result<(), AttendanceRuleError> {
    if rows_affected == 0 {
        Err(lost)
    } else {
        Ok(())
    }
}

/// Outcome of a valid check-out.
#[derive(Debug, PartialEq)]
pub struct CheckOutResult {
    pub total_working_hours: f64,
    pub status: AttendanceStatus,
}

pub fn evaluate_check_out(
    today: Option<&Attendance>,
    now: NaiveDateTime,
    break_minutes: u32,
    half_day_hours: f64,
) -> Result<CheckOutResult, AttendanceRuleError> {
    let record = today.ok_or(AttendanceRuleError::NotCheckedIn)?;
    let check_in = record.check_in.ok_or(AttendanceRuleError::NotCheckedIn)?;
    if record.check_out.is_some() {
        return Err(AttendanceRuleError::AlreadyCheckedOut);
    }
    if now < check_in {
        return Err(AttendanceRuleError::CheckOutBeforeCheckIn);
    }

    let hours = worked_hours(check_in, now, break_minutes);
    Ok(CheckOutResult {
        total_working_hours: hours,
        status: derive_status(hours, half_day_hours),
    })
}

/// `(check_out - check_in) - break`, floored at zero and rounded to 2 decimals.
pub fn worked_hours(check_in: NaiveDateTime, check_out: NaiveDateTime, break_minutes: u32) -> f64 {
    let elapsed = (check_out - check_in).num_seconds() as f64 / 3600.0;
    let hours = (elapsed - f64::from(break_minutes) / 60.0).max(0.0);
    round2(hours)
}

pub fn derive_status(hours: f64, half_day_hours: f64) -> AttendanceStatus {
    if hours < half_day_hours {
        AttendanceStatus::HalfDay
    } else {
        AttendanceStatus::Present
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn record(check_in: Option<NaiveDateTime>, check_out: Option<NaiveDateTime>) -> Attendance {
        Attendance {
            id: 11,
            user_id: 3,
            date: at(0, 0).date(),
            check_in,
            check_out,
            break_minutes: 0,
            status: AttendanceStatus::Present,
            total_working_hours: 0.0,
        }
    }

    #[test]
    fn nine_to_six_with_an_hour_break_is_eight_hours() {
        assert_eq!(worked_hours(at(9, 0), at(18, 0), 60), 8.0);
    }

    #[test]
    fn break_longer_than_shift_floors_at_zero() {
        assert_eq!(worked_hours(at(9, 0), at(9, 30), 45), 0.0);
    }

    #[test]
    fn hours_round_to_two_decimals() {
        // 7h 20m = 7.3333..
        assert_eq!(worked_hours(at(9, 0), at(16, 20), 0), 7.33);
    }

    #[test]
    fn first_check_in_inserts() {
        assert_eq!(plan_check_in(None), Ok(CheckInPlan::Insert));
    }

    #[test]
    fn swept_absent_row_is_reused() {
        let mut absent = record(None, None);
        absent.status = AttendanceStatus::Absent;
        assert_eq!(plan_check_in(Some(&absent)), Ok(CheckInPlan::Update(11)));
    }

    #[test]
    fn leave_row_is_reused_by_check_in() {
        let mut leave = record(None, None);
        leave.status = AttendanceStatus::Leave;
        assert_eq!(plan_check_in(Some(&leave)), Ok(CheckInPlan::Update(11)));
    }

    #[test]
    fn lost_races_surface_as_rule_errors() {
        assert_eq!(
            ensure_written(0, AttendanceRuleError::AlreadyCheckedIn),
            Err(AttendanceRuleError::AlreadyCheckedIn)
        );
        assert_eq!(
            ensure_written(0, AttendanceRuleError::AlreadyCheckedOut),
            Err(AttendanceRuleError::AlreadyCheckedOut)
        );
        assert_eq!(ensure_written(1, AttendanceRuleError::AlreadyCheckedOut), Ok(()));
    }

    #[test]
    fn cleared_day_has_no_clock_times() {
        let day = DayRecord::cleared(3, at(0, 0).date(), AttendanceStatus::Leave);
        assert_eq!(day.check_in, None);
        assert_eq!(day.check_out, None);
        assert_eq!(day.break_minutes, 0);
        assert_eq!(day.total_working_hours, 0.0);
    }

    #[test]
    fn second_check_in_is_rejected() {
        let existing = record(Some(at(9, 0)), None);
        assert_eq!(
            plan_check_in(Some(&existing)),
            Err(AttendanceRuleError::AlreadyCheckedIn)
        );
    }

    #[test]
    fn check_out_requires_check_in() {
        assert_eq!(
            evaluate_check_out(None, at(18, 0), 0, 4.0),
            Err(AttendanceRuleError::NotCheckedIn)
        );
        let swept = record(None, None);
        assert_eq!(
            evaluate_check_out(Some(&swept), at(18, 0), 0, 4.0),
            Err(AttendanceRuleError::NotCheckedIn)
        );
    }

    #[test]
    fn check_out_only_once() {
        let done = record(Some(at(9, 0)), Some(at(17, 0)));
        assert_eq!(
            evaluate_check_out(Some(&done), at(18, 0), 0, 4.0),
            Err(AttendanceRuleError::AlreadyCheckedOut)
        );
    }

    #[test]
    fn full_day_stays_present() {
        let open = record(Some(at(9, 0)), None);
        let result = evaluate_check_out(Some(&open), at(18, 0), 60, 4.0).unwrap();
        assert_eq!(result.total_working_hours, 8.0);
        assert_eq!(result.status, AttendanceStatus::Present);
    }

    #[test]
    fn short_day_becomes_half_day() {
        let open = record(Some(at(9, 0)), None);
        let result = evaluate_check_out(Some(&open), at(12, 0), 0, 4.0).unwrap();
        assert_eq!(result.total_working_hours, 3.0);
        assert_eq!(result.status, AttendanceStatus::HalfDay);
    }

    #[test]
    fn status_strings_match_storage() {
        assert_eq!(AttendanceStatus::HalfDay.as_ref(), "half-day");
        assert_eq!(
            "leave".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::Leave
        );
    }
}
