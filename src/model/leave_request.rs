use crate::model::attendance::{AttendanceStatus, DayRecord};
use crate::utils::period::is_working_day;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaveType {
    Paid,
    Sick,
    Unpaid,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl TryFrom<String> for LeaveType {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for LeaveStatus {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "user_id": 7,
    "user_name": "Jane Doe",
    "leave_type": "sick",
    "start_date": "2026-02-02",
    "end_date": "2026-02-03",
    "reason": "Flu",
    "status": "pending",
    "approver_id": null,
    "comment": null,
    "created_at": "2026-01-30T10:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    #[sqlx(try_from = "String")]
    pub leave_type: LeaveType,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub status: LeaveStatus,
    pub approver_id: Option<u64>,
    pub comment: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const LEAVE_COLUMNS: &str = r#"
    l.id, l.user_id, u.name AS user_name, l.leave_type, l.start_date, l.end_date,
    l.reason, l.status, l.approver_id, l.comment, l.created_at
"#;

/// Decisions that can be applied to a leave request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LeaveAction {
    Approve,
    Reject,
    Cancel,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LeaveRuleError {
    MissingField(&'static str),
    StartAfterEnd,
    StartInPast,
    SpanTooLong,
    AlreadyProcessed,
    CommentRequired,
}

impl LeaveRuleError {
    pub fn message(&self) -> String {
        match self {
            LeaveRuleError::MissingField(field) => format!("{field} is required"),
            LeaveRuleError::StartAfterEnd => "start_date cannot be after end_date".to_string(),
            LeaveRuleError::StartInPast => "start_date cannot be in the past".to_string(),
            LeaveRuleError::SpanTooLong => {
                format!("A leave request cannot span more than {MAX_LEAVE_DAYS} days")
            }
            LeaveRuleError::AlreadyProcessed => {
                "Leave request not found or already processed".to_string()
            }
            LeaveRuleError::CommentRequired => "A comment is required to reject a leave".to_string(),
        }
    }
}

impl LeaveStatus {
    /// Only pending requests move, and every move lands in a terminal state.
    pub fn apply(self, action: LeaveAction) -> Result<LeaveStatus, LeaveRuleError> {
        if self != LeaveStatus::Pending {
            return Err(LeaveRuleError::AlreadyProcessed);
        }
        Ok(match action {
            LeaveAction::Approve => LeaveStatus::Approved,
            LeaveAction::Reject => LeaveStatus::Rejected,
            LeaveAction::Cancel => LeaveStatus::Cancelled,
        })
    }
}

/// Longest span one request may cover, both ends included.
pub const MAX_LEAVE_DAYS: i64 = 366;

/// Normalized leave application, ready to insert.
#[derive(Debug, PartialEq)]
pub struct NewLeave {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

pub fn validate_new_leave(
    leave_type: Option<LeaveType>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    reason: Option<&str>,
    today: NaiveDate,
) -> Result<NewLeave, LeaveRuleError> {
    let leave_type = leave_type.ok_or(LeaveRuleError::MissingField("leave_type"))?;
    let start_date = start_date.ok_or(LeaveRuleError::MissingField("start_date"))?;
    let end_date = end_date.ok_or(LeaveRuleError::MissingField("end_date"))?;
    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(LeaveRuleError::MissingField("reason"))?;

    if start_date > end_date {
        return Err(LeaveRuleError::StartAfterEnd);
    }
    if start_date < today {
        return Err(LeaveRuleError::StartInPast);
    }
    if (end_date - start_date).num_days() + 1 > MAX_LEAVE_DAYS {
        return Err(LeaveRuleError::SpanTooLong);
    }

    Ok(NewLeave {
        leave_type,
        start_date,
        end_date,
        reason: reason.to_string(),
    })
}

/// Rejections need a reason the employee can read.
pub fn validate_rejection_comment(comment: Option<&str>) -> Result<String, LeaveRuleError> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or(LeaveRuleError::CommentRequired)
}

/// Every calendar day in `[start, end]`.
pub fn leave_days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Attendance rows an approved span writes: one Leave row per calendar day,
/// replacing whatever the day held before.
pub fn leave_records(user_id: u64, start: NaiveDate, end: NaiveDate) -> Vec<DayRecord> {
    leave_days(start, end)
        .map(|date| DayRecord::cleared(user_id, date, AttendanceStatus::Leave))
        .collect()
}

/// Working days of `[start, end]` that fall inside `[from, until)`.
pub fn working_days_within(
    start: NaiveDate,
    end: NaiveDate,
    from: NaiveDate,
    until: NaiveDate,
) -> u32 {
    leave_days(start.max(from), end)
        .take_while(|d| *d < until)
        .filter(|d| is_working_day(*d))
        .count() as u32
}

/// Days of `[start, end]` in the given calendar year.
pub fn days_in_year(start: NaiveDate, end: NaiveDate, year: i32) -> u32 {
    leave_days(start, end).filter(|d| d.year() == year).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn only_pending_transitions() {
        assert_eq!(
            LeaveStatus::Pending.apply(LeaveAction::Approve),
            Ok(LeaveStatus::Approved)
        );
        assert_eq!(
            LeaveStatus::Pending.apply(LeaveAction::Reject),
            Ok(LeaveStatus::Rejected)
        );
        assert_eq!(
            LeaveStatus::Pending.apply(LeaveAction::Cancel),
            Ok(LeaveStatus::Cancelled)
        );
        for terminal in [
            LeaveStatus::Approved,
            LeaveStatus::Rejected,
            LeaveStatus::Cancelled,
        ] {
            for action in [LeaveAction::Approve, LeaveAction::Reject, LeaveAction::Cancel] {
                assert_eq!(terminal.apply(action), Err(LeaveRuleError::AlreadyProcessed));
            }
        }
    }

    #[test]
    fn valid_application_is_normalized() {
        let today = d(2026, 3, 1);
        let leave = validate_new_leave(
            Some(LeaveType::Paid),
            Some(d(2026, 3, 2)),
            Some(d(2026, 3, 4)),
            Some("  family trip "),
            today,
        )
        .unwrap();
        assert_eq!(leave.reason, "family trip");
        assert_eq!(leave.start_date, d(2026, 3, 2));
    }

    #[test]
    fn same_day_leave_starting_today_is_allowed() {
        let today = d(2026, 3, 1);
        assert!(
            validate_new_leave(Some(LeaveType::Sick), Some(today), Some(today), Some("fever"), today)
                .is_ok()
        );
    }

    #[test]
    fn rejects_reversed_range() {
        let err = validate_new_leave(
            Some(LeaveType::Sick),
            Some(d(2026, 3, 5)),
            Some(d(2026, 3, 4)),
            Some("x"),
            d(2026, 3, 1),
        )
        .unwrap_err();
        assert_eq!(err, LeaveRuleError::StartAfterEnd);
    }

    #[test]
    fn rejects_past_start() {
        let err = validate_new_leave(
            Some(LeaveType::Sick),
            Some(d(2026, 2, 27)),
            Some(d(2026, 3, 4)),
            Some("x"),
            d(2026, 3, 1),
        )
        .unwrap_err();
        assert_eq!(err, LeaveRuleError::StartInPast);
    }

    #[test]
    fn rejects_missing_fields() {
        let today = d(2026, 3, 1);
        assert_eq!(
            validate_new_leave(None, Some(today), Some(today), Some("x"), today).unwrap_err(),
            LeaveRuleError::MissingField("leave_type")
        );
        assert_eq!(
            validate_new_leave(Some(LeaveType::Paid), Some(today), Some(today), Some("   "), today)
                .unwrap_err(),
            LeaveRuleError::MissingField("reason")
        );
    }

    #[test]
    fn rejection_needs_comment() {
        assert_eq!(
            validate_rejection_comment(Some("  ")),
            Err(LeaveRuleError::CommentRequired)
        );
        assert_eq!(validate_rejection_comment(None), Err(LeaveRuleError::CommentRequired));
        assert_eq!(
            validate_rejection_comment(Some(" overlap with release ")),
            Ok("overlap with release".to_string())
        );
    }

    #[test]
    fn span_is_inclusive_and_crosses_months() {
        let days: Vec<_> = leave_days(d(2026, 1, 30), d(2026, 2, 2)).collect();
        assert_eq!(
            days,
            vec![d(2026, 1, 30), d(2026, 1, 31), d(2026, 2, 1), d(2026, 2, 2)]
        );
        assert_eq!(leave_days(d(2026, 1, 5), d(2026, 1, 5)).count(), 1);
    }

    #[test]
    fn overlap_with_month_is_clipped() {
        // Jan 29 (Thu) - Feb 3 (Tue) against February: Sun 1 is skipped
        assert_eq!(
            working_days_within(d(2026, 1, 29), d(2026, 2, 3), d(2026, 2, 1), d(2026, 3, 1)),
            2
        );
        // entirely outside
        assert_eq!(
            working_days_within(d(2026, 4, 1), d(2026, 4, 2), d(2026, 2, 1), d(2026, 3, 1)),
            0
        );
    }

    #[test]
    fn weekend_only_leave_has_no_working_days() {
        // Sat 7 - Sun 8 February 2026
        assert_eq!(
            working_days_within(d(2026, 2, 7), d(2026, 2, 8), d(2026, 2, 1), d(2026, 3, 1)),
            0
        );
    }

    #[test]
    fn span_is_capped() {
        let today = d(2026, 3, 1);
        let year_later = d(2027, 3, 2);
        assert_eq!(
            validate_new_leave(Some(LeaveType::Unpaid), Some(today), Some(year_later), Some("x"), today)
                .unwrap_err(),
            LeaveRuleError::SpanTooLong
        );
        assert_eq!(
            validate_new_leave(
                Some(LeaveType::Unpaid),
                Some(today),
                NaiveDate::from_ymd_opt(9999, 12, 31),
                Some("x"),
                today
            )
            .unwrap_err(),
            LeaveRuleError::SpanTooLong
        );
        // 366 days inclusive is the longest allowed
        let last = d(2027, 3, 1);
        assert!(
            validate_new_leave(Some(LeaveType::Unpaid), Some(today), Some(last), Some("x"), today)
                .is_ok()
        );
    }

    #[test]
    fn approval_writes_one_cleared_leave_row_per_day() {
        let records = leave_records(7, d(2026, 2, 6), d(2026, 2, 9));
        let dates: Vec<_> = records.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![d(2026, 2, 6), d(2026, 2, 7), d(2026, 2, 8), d(2026, 2, 9)]
        );
        for record in &records {
            assert_eq!(record.user_id, 7);
            assert_eq!(record.status, AttendanceStatus::Leave);
            assert_eq!(record.check_in, None);
            assert_eq!(record.check_out, None);
            assert_eq!(record.break_minutes, 0);
            assert_eq!(record.total_working_hours, 0.0);
        }
    }

    #[test]
    fn year_overlap() {
        assert_eq!(days_in_year(d(2025, 12, 30), d(2026, 1, 2), 2026), 2);
    }
}
