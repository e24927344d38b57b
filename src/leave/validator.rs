//! Structural checks on a leave submission, run before anything is stored.
//!
//! The validator is pure: it looks only at the draft. Whether the dates lie
//! in the past is left to the form that collects them.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

use crate::model::leave_request::LeaveType;

pub const MIN_REASON_CHARS: usize = 10;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// A submission exactly as a client sent it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveDraft {
    pub leave_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveField {
    LeaveType,
    StartDate,
    EndDate,
    Reason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    MissingField,
    InvalidRange,
    TooShort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: LeaveField,
    pub kind: ValidationKind,
    pub message: String,
}

impl ValidationError {
    fn new(field: LeaveField, kind: ValidationKind, message: &str) -> Self {
        Self {
            field,
            kind,
            message: message.to_string(),
        }
    }
}

/// Every failure found in a draft, in check order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

#[cfg(test)]
impl ValidationErrors {
    pub fn first(&self) -> &ValidationError {
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn for_field(&self, field: LeaveField) -> Option<&ValidationError> {
        self.0.iter().find(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// A draft that passed every check. Only [`validate`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLeave {
    leave_type: LeaveType,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: String,
}

impl ValidatedLeave {
    pub fn leave_type(&self) -> LeaveType {
        self.leave_type
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    #[cfg(test)]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn into_reason(self) -> String {
        self.reason
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(
    value: &Option<String>,
    field: LeaveField,
    message: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<NaiveDate> {
    let parsed = present(value).and_then(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).ok());
    if parsed.is_none() {
        errors.push(ValidationError::new(field, ValidationKind::MissingField, message));
    }
    parsed
}

pub fn validate(draft: &LeaveDraft) -> Result<ValidatedLeave, ValidationErrors> {
    let mut errors = Vec::new();

    let leave_type = present(&draft.leave_type).and_then(|v| v.parse::<LeaveType>().ok());
    if leave_type.is_none() {
        errors.push(ValidationError::new(
            LeaveField::LeaveType,
            ValidationKind::MissingField,
            "Please select a leave type",
        ));
    }

    let start_date = parse_date(
        &draft.start_date,
        LeaveField::StartDate,
        "Please select a start date",
        &mut errors,
    );
    let end_date = parse_date(
        &draft.end_date,
        LeaveField::EndDate,
        "Please select an end date",
        &mut errors,
    );

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            errors.push(ValidationError::new(
                LeaveField::EndDate,
                ValidationKind::InvalidRange,
                "End date must be after or equal to start date",
            ));
        }
    }

    let reason = draft.reason.clone().unwrap_or_default();
    if reason.chars().count() < MIN_REASON_CHARS {
        errors.push(ValidationError::new(
            LeaveField::Reason,
            ValidationKind::TooShort,
            "Reason must be at least 10 characters",
        ));
    }

    match (leave_type, start_date, end_date) {
        (Some(leave_type), Some(start_date), Some(end_date)) if errors.is_empty() => {
            Ok(ValidatedLeave {
                leave_type,
                start_date,
                end_date,
                reason,
            })
        }
        _ => Err(ValidationErrors(errors)),
    }
}
