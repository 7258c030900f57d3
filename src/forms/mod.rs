//! Typed request-input validation.
//!
//! Request bodies derive [`Validate`]; [`validate_input`] runs the derived
//! rules and folds any failures into a [`FormErrors`] map keyed by field.
//! Each form then converts into the typed value the services take.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::Role;

const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";
const REPORT_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("This field is required")]
    Required,
    #[error("Must be at least {min} characters")]
    TooShort { min: usize },
    #[error("Must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Passwords must match")]
    Mismatch,
    #[error("This username is already taken")]
    Taken,
    #[error("This code is already in use")]
    CodeInUse,
    #[error("Not a valid choice")]
    InvalidChoice,
    #[error("Invalid date, expected YYYY-MM-DD")]
    InvalidDate,
    #[error("Start date must not be after end date")]
    InvertedRange,
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<&ValidationError> for FieldError {
    fn from(error: &ValidationError) -> Self {
        let bound = |name: &str| {
            error
                .params
                .get(name)
                .and_then(Value::as_u64)
                .map(|v| v as usize)
        };
        match error.code.as_ref() {
            "required" => FieldError::Required,
            "must_match" => FieldError::Mismatch,
            "date" => FieldError::InvalidDate,
            "length" => {
                let len = error
                    .params
                    .get("value")
                    .and_then(Value::as_str)
                    .map(|v| v.chars().count());
                match (len, bound("min"), bound("max")) {
                    (Some(0), _, _) => FieldError::Required,
                    (Some(len), Some(min), _) if len < min => FieldError::TooShort { min },
                    (_, _, Some(max)) => FieldError::TooLong { max },
                    (_, Some(min), None) => FieldError::TooShort { min },
                    _ => FieldError::InvalidChoice,
                }
            }
            _ => FieldError::InvalidChoice,
        }
    }
}

/// Validation failures grouped by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<FieldError>>);

impl FormErrors {
    pub fn push(&mut self, field: &str, error: FieldError) {
        self.0.entry(field.to_string()).or_default().push(error);
    }

    pub fn single(field: &str, error: FieldError) -> Self {
        let mut errors = Self::default();
        errors.push(field, error);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[FieldError] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(value)` when nothing was recorded.
    pub fn finish<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut form_errors = FormErrors::default();
        for (field, failures) in errors.field_errors() {
            let mapped: Vec<FieldError> = failures.iter().map(FieldError::from).collect();
            // A missing value makes the other rules on that field noise.
            if mapped.contains(&FieldError::Required) {
                form_errors.push(field, FieldError::Required);
            } else {
                for error in mapped {
                    form_errors.push(field, error);
                }
            }
        }
        form_errors
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, errors) in &self.0 {
            for error in errors {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, error)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Runs the derived rules of `input`.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), FormErrors> {
    input.validate().map_err(FormErrors::from)
}

fn validation_error(code: &'static str) -> ValidationError {
    ValidationError::new(code)
}

fn validate_role(role: &str) -> Result<(), ValidationError> {
    if role.is_empty() {
        return Err(validation_error("required"));
    }
    Role::from_str(role)
        .map(|_| ())
        .map_err(|_| validation_error("invalid_choice"))
}

fn validate_loan_days<D: Borrow<i64>>(days: D) -> Result<(), ValidationError> {
    LoanDuration::from_days(*days.borrow())
        .map(|_| ())
        .ok_or_else(|| validation_error("invalid_choice"))
}

fn validate_report_date(raw: &str) -> Result<(), ValidationError> {
    parse_report_date(raw)
        .map(|_| ())
        .ok_or_else(|| validation_error("date"))
}

/// `YYYY-MM-DD` within the years reports can cover.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, REPORT_DATE_FORMAT)
        .ok()
        .filter(|date| REPORT_YEARS.contains(&date.year()))
}

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(trimmed).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default, alias = "nombre_usuario")]
    #[validate(length(min = 4, max = 150))]
    pub username: String,
    #[serde(default, alias = "contrasena")]
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn into_credentials(self) -> Result<Credentials, FormErrors> {
        let form = Self {
            username: trimmed(self.username),
            ..self
        };
        validate_input(&form)?;
        Ok(Credentials {
            username: form.username,
            password: form.password,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegistrationForm {
    #[serde(default, alias = "nombre_usuario")]
    #[validate(length(min = 4, max = 150))]
    pub username: String,
    #[serde(default, alias = "contrasena")]
    #[validate(length(min = 6))]
    pub password: String,
    #[serde(default, alias = "confirmar_contrasena")]
    #[validate(length(min = 1), must_match = "password")]
    pub confirm_password: String,
    #[serde(default, alias = "rol")]
    #[validate(custom = "validate_role")]
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl RegistrationForm {
    /// Shape checks only; username uniqueness is checked against the store.
    pub fn into_registration(self, allow_admin: bool) -> Result<Registration, FormErrors> {
        let form = Self {
            username: trimmed(self.username),
            role: trimmed(self.role),
            ..self
        };
        let mut errors = validate_input(&form).err().unwrap_or_default();

        let role = Role::from_str(&form.role).unwrap_or(Role::User);
        if role == Role::Admin && !allow_admin {
            errors.push("role", FieldError::InvalidChoice);
        }

        errors.finish(Registration {
            username: form.username,
            password: form.password,
            role,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct StateChangeForm {
    #[serde(alias = "estado_nuevo")]
    #[validate(required)]
    pub state_id: Option<i32>,
}

impl StateChangeForm {
    pub fn into_state_id(self) -> Result<i32, FormErrors> {
        validate_input(&self)?;
        self.state_id
            .ok_or_else(|| FormErrors::single("state_id", FieldError::Required))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductForm {
    #[serde(default, alias = "nombre")]
    #[validate(length(min = 1, max = 150))]
    pub name: String,
    #[serde(alias = "descripcion")]
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(alias = "codigo")]
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[serde(alias = "estado_id")]
    #[validate(required)]
    pub state_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub state_id: i32,
}

impl ProductForm {
    pub fn into_new_product(self) -> Result<NewProduct, FormErrors> {
        let form = Self {
            name: trimmed(self.name),
            description: non_blank(self.description),
            code: non_blank(self.code),
            state_id: self.state_id,
        };
        validate_input(&form)?;
        let state_id = form
            .state_id
            .ok_or_else(|| FormErrors::single("state_id", FieldError::Required))?;
        Ok(NewProduct {
            name: form.name,
            description: form.description,
            code: form.code,
            state_id,
        })
    }
}

/// Loan periods offered to borrowers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoanDuration {
    OneWeek,
    TwoWeeks,
    OneMonth,
}

impl LoanDuration {
    pub fn from_days(days: i64) -> Option<Self> {
        match days {
            7 => Some(Self::OneWeek),
            14 => Some(Self::TwoWeeks),
            30 => Some(Self::OneMonth),
            _ => None,
        }
    }

    pub fn days(self) -> i32 {
        match self {
            Self::OneWeek => 7,
            Self::TwoWeeks => 14,
            Self::OneMonth => 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoanRequestForm {
    #[serde(default, alias = "razon")]
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[serde(alias = "duracion")]
    #[validate(required, custom = "validate_loan_days")]
    pub duration_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRequest {
    pub reason: String,
    pub duration: LoanDuration,
}

impl LoanRequestForm {
    pub fn into_loan_request(self) -> Result<LoanRequest, FormErrors> {
        let form = Self {
            reason: trimmed(self.reason),
            ..self
        };
        validate_input(&form)?;
        let duration = form
            .duration_days
            .and_then(LoanDuration::from_days)
            .ok_or_else(|| FormErrors::single("duration_days", FieldError::InvalidChoice))?;
        Ok(LoanRequest {
            reason: form.reason,
            duration,
        })
    }
}

/// Query string of the report page.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReportQuery {
    #[serde(alias = "fecha_inicio")]
    #[validate(custom = "validate_report_date")]
    pub start: Option<String>,
    #[serde(alias = "fecha_fin")]
    #[validate(custom = "validate_report_date")]
    pub end: Option<String>,
    #[serde(alias = "estado")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// `None` means every state.
    pub state: Option<String>,
}

impl ReportQuery {
    /// An open end means `today`; the start must not fall after it.
    pub fn into_filter(self, today: NaiveDate) -> Result<ReportFilter, FormErrors> {
        let query = Self {
            start: non_blank(self.start),
            end: non_blank(self.end),
            state: non_blank(self.state),
        };
        validate_input(&query)?;

        let start = query.start.as_deref().and_then(parse_report_date);
        let end = query.end.as_deref().and_then(parse_report_date);
        if let Some(start) = start {
            if start > end.unwrap_or(today) {
                return Err(FormErrors::single("start", FieldError::InvertedRange));
            }
        }

        let state = query
            .state
            .filter(|s| !s.eq_ignore_ascii_case("todos") && !s.eq_ignore_ascii_case("all"));

        Ok(ReportFilter { start, end, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn registration(username: &str, password: &str, confirm: &str, role: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.into(),
            password: password.into(),
            confirm_password: confirm.into(),
            role: role.into(),
        }
    }

    fn report_query(start: Option<&str>, end: Option<&str>) -> ReportQuery {
        ReportQuery {
            start: start.map(Into::into),
            end: end.map(Into::into),
            state: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    #[test]
    fn registration_accepts_valid_input() {
        let reg = registration(" alice ", "secret1", "secret1", "student")
            .into_registration(false)
            .unwrap();
        assert_eq!(reg.username, "alice");
        assert_eq!(reg.role, Role::Student);
    }

    #[test]
    fn registration_collects_every_field_error() {
        let errors = registration("al", "abc", "abd", "pirate")
            .into_registration(false)
            .unwrap_err();
        assert_eq!(errors.get("username"), &[FieldError::TooShort { min: 4 }]);
        assert_eq!(errors.get("password"), &[FieldError::TooShort { min: 6 }]);
        assert_eq!(errors.get("confirm_password"), &[FieldError::Mismatch]);
        assert_eq!(errors.get("role"), &[FieldError::InvalidChoice]);
    }

    #[test]
    fn missing_registration_fields_are_required() {
        let errors = RegistrationForm::default()
            .into_registration(false)
            .unwrap_err();
        for field in ["username", "password", "confirm_password", "role"] {
            assert_eq!(errors.get(field), &[FieldError::Required], "{}", field);
        }
    }

    #[test]
    fn admin_role_requires_opt_in() {
        let form = registration("rootuser", "secret1", "secret1", "admin");
        assert_matches!(
            form.clone().into_registration(false),
            Err(e) if e.get("role") == [FieldError::InvalidChoice]
        );
        assert_eq!(form.into_registration(true).unwrap().role, Role::Admin);
    }

    #[test]
    fn login_requires_both_fields() {
        let errors = LoginForm {
            username: "alice".into(),
            password: String::new(),
        }
        .into_credentials()
        .unwrap_err();
        assert_eq!(errors.get("password"), &[FieldError::Required]);
        assert!(errors.get("username").is_empty());
    }

    #[test]
    fn loan_duration_must_be_offered_period() {
        let form = LoanRequestForm {
            reason: "Lab session".into(),
            duration_days: Some(10),
        };
        assert_eq!(
            form.clone().into_loan_request().unwrap_err().get("duration_days"),
            &[FieldError::InvalidChoice]
        );

        let missing = LoanRequestForm {
            duration_days: None,
            ..form.clone()
        };
        assert_eq!(
            missing.into_loan_request().unwrap_err().get("duration_days"),
            &[FieldError::Required]
        );

        let ok = LoanRequestForm {
            duration_days: Some(14),
            ..form
        }
        .into_loan_request()
        .unwrap();
        assert_eq!(ok.duration.days(), 14);
    }

    #[test]
    fn product_form_limits_lengths() {
        let form = ProductForm {
            name: "x".repeat(151),
            description: None,
            code: Some("  ".into()),
            state_id: None,
        };
        let errors = form.into_new_product().unwrap_err();
        assert_eq!(errors.get("name"), &[FieldError::TooLong { max: 150 }]);
        assert_eq!(errors.get("state_id"), &[FieldError::Required]);
        assert!(errors.get("code").is_empty());
    }

    #[test]
    fn report_query_treats_todos_as_all_states() {
        let filter = ReportQuery {
            state: Some("todos".into()),
            ..report_query(Some("2024-01-01"), Some("2024-01-31"))
        }
        .into_filter(today())
        .unwrap();
        assert_eq!(filter.state, None);
        assert_eq!(filter.start, NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn report_query_rejects_bad_dates() {
        let errors = report_query(Some("01/02/2024"), None)
            .into_filter(today())
            .unwrap_err();
        assert_eq!(errors.get("start"), &[FieldError::InvalidDate]);
    }

    #[test]
    fn report_query_rejects_dates_outside_supported_years() {
        let errors = report_query(None, Some("-262143-01-01"))
            .into_filter(today())
            .unwrap_err();
        assert_eq!(errors.get("end"), &[FieldError::InvalidDate]);
        assert!(parse_report_date("1899-12-31").is_none());
        assert!(parse_report_date("1900-01-01").is_some());
    }

    #[test]
    fn start_after_today_is_inverted_when_end_is_open() {
        let errors = report_query(Some("2024-04-01"), None)
            .into_filter(today())
            .unwrap_err();
        assert_eq!(errors.get("start"), &[FieldError::InvertedRange]);

        let filter = report_query(Some("2024-03-20"), None)
            .into_filter(today())
            .unwrap();
        assert_eq!(filter.start, Some(today()));
        assert_eq!(filter.end, None);
    }

    #[test]
    fn explicit_inverted_range_is_rejected() {
        let errors = report_query(Some("2024-02-10"), Some("2024-02-01"))
            .into_filter(today())
            .unwrap_err();
        assert_eq!(errors.get("start"), &[FieldError::InvertedRange]);
    }
}
