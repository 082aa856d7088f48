//! # Request Extraction & Validation
//!
//! The [`Validate`] trait for request DTOs and helpers that turn axum
//! rejections into [`AppError`]s.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use gigflow_core::Money;

use crate::error::AppError;

/// Business-rule checks beyond what serde enforces.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and run its [`Validate`] rules.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Parse a decimal amount string from a request body.
pub fn parse_amount(raw: &str, field: &str) -> Result<Money, AppError> {
    Money::parse(raw).map_err(|e| AppError::Validation(format!("{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Titled(String);

    impl Validate for Titled {
        fn validate(&self) -> Result<(), String> {
            if self.0.trim().is_empty() {
                return Err("title must not be empty".into());
            }
            Ok(())
        }
    }

    #[test]
    fn validation_failures_become_422() {
        let err = extract_validated_json(Ok(Json(Titled("  ".into())))).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("title")));
        assert!(extract_validated_json(Ok(Json(Titled("Logo".into())))).is_ok());
    }

    #[test]
    fn amounts_are_decimal_strings() {
        assert_eq!(parse_amount("80.00", "amount").unwrap(), Money::from_units(80));
        assert!(matches!(parse_amount("eighty", "amount"), Err(AppError::Validation(_))));
        assert!(matches!(parse_amount("-5", "amount"), Err(AppError::Validation(_))));
    }
}
