use crate::error::{AppError, AppResult};
use actix_web::web::Bytes;
use serde::de::DeserializeOwned;

/// Parses a request body that may be left out entirely.
///
/// An empty (or all-whitespace) body yields `T::default()`. Anything else
/// must be valid JSON for `T`; a wrong type or a negative count is a 400,
/// never a silent default.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::attendance::CheckOutReq;
    use crate::api::leave_request::LeaveDecision;

    fn parse(raw: &'static str) -> AppResult<CheckOutReq> {
        optional_json(&Bytes::from_static(raw.as_bytes()))
    }

    #[test]
    fn empty_body_means_defaults() {
        assert_eq!(parse("").unwrap().break_minutes, 0);
        assert_eq!(parse("  \n").unwrap().break_minutes, 0);
        assert_eq!(parse("{}").unwrap().break_minutes, 0);
    }

    #[test]
    fn well_formed_body_is_read() {
        assert_eq!(parse(r#"{"break_minutes": 45}"#).unwrap().break_minutes, 45);
    }

    #[test]
    fn malformed_break_is_rejected() {
        for raw in [
            r#"{"break_minutes": "60"}"#,
            r#"{"break_minutes": -5}"#,
            r#"{"break_minutes": 1.5}"#,
            "break_minutes=60",
        ] {
            let err = parse(raw).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{raw} was accepted");
        }
    }

    #[test]
    fn decision_comment_is_optional() {
        let decision: LeaveDecision = optional_json(&Bytes::new()).unwrap();
        assert!(decision.comment.is_none());
        let decision: LeaveDecision =
            optional_json(&Bytes::from_static(br#"{"comment": "ok"}"#)).unwrap();
        assert_eq!(decision.comment.as_deref(), Some("ok"));
        assert!(optional_json::<LeaveDecision>(&Bytes::from_static(br#"{"comment": 5}"#)).is_err());
    }
}
