//! Request bodies and their validators.
//!
//! Bodies deserialize leniently (every field optional, any JSON type) so
//! that missing or malformed fields are reported per field instead of as a
//! parse failure. Only bodies that are not a JSON object are rejected
//! outright.

use entities::{NewParkingSpace, NewUser, ParkingSpaceUpdate, SpaceStatus};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ServerError;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All field errors found in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error against `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `field` already has an error.
    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Names of the rejected fields, in order.
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() { Ok(value()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<_> = self.0.iter().map(|e| e.field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)` so it can be told apart
/// from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Reads a string field. Absent and `null` give `None`; any other
/// non-string value is reported and also gives `None`.
fn text(errors: &mut ValidationErrors, field: &str, value: Option<Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            errors.add(field, "Expected a string");
            None
        }
    }
}

fn require_min_len(errors: &mut ValidationErrors, field: &str, value: Option<&str>, min: usize) {
    if errors.contains(field) {
        return;
    }
    match value {
        None => errors.add(field, "Required"),
        Some(value) if value.chars().count() < min => {
            errors.add(field, format!("Must be at least {min} characters"))
        }
        Some(_) => {}
    }
}

fn require_non_empty(errors: &mut ValidationErrors, field: &str, value: Option<&str>) {
    if !errors.contains(field) && value.is_none_or(|value| value.trim().is_empty()) {
        errors.add(field, "Required");
    }
}

fn parse_status(errors: &mut ValidationErrors, value: Option<&str>) -> Option<SpaceStatus> {
    let value = value?;
    match value.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            errors.add(
                "status",
                "Must be one of \"available\", \"occupied\", \"maintenance\"",
            );
            None
        }
    }
}

/// Loose check: one `@`, non-empty local part, dotted domain.
fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain.split_once('.').is_some_and(|(host, rest)| {
            !host.is_empty() && !rest.is_empty() && !rest.ends_with('.')
        })
}

// =============================================================================
// Authentication
// =============================================================================

/// Body of `POST /api/auth/login`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
}

/// Validated login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(self) -> Result<Credentials, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let username = text(&mut errors, "username", self.username);
        let password = text(&mut errors, "password", self.password);
        require_min_len(&mut errors, "username", username.as_deref(), MIN_USERNAME_LEN);
        require_min_len(&mut errors, "password", password.as_deref(), MIN_PASSWORD_LEN);

        errors.finish(|| Credentials {
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
        })
    }
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<Value>,
    #[serde(default)]
    pub password: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub first_name: Option<Value>,
    #[serde(default)]
    pub last_name: Option<Value>,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let username = text(&mut errors, "username", self.username);
        let password = text(&mut errors, "password", self.password);
        let email = text(&mut errors, "email", self.email);
        let first_name = text(&mut errors, "firstName", self.first_name);
        let last_name = text(&mut errors, "lastName", self.last_name);

        require_min_len(&mut errors, "username", username.as_deref(), MIN_USERNAME_LEN);
        require_min_len(&mut errors, "password", password.as_deref(), MIN_PASSWORD_LEN);

        // Forms submit untouched inputs as "".
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let email = non_blank(email);
        if email.as_deref().is_some_and(|email| !looks_like_email(email)) {
            errors.add("email", "Invalid email");
        }
        let first_name = non_blank(first_name);
        let last_name = non_blank(last_name);

        errors.finish(|| {
            let user = NewUser::new(username.unwrap_or_default(), password.unwrap_or_default())
                .with_names(first_name, last_name);
            match email {
                Some(email) => user.with_email(email),
                None => user,
            }
        })
    }
}

// =============================================================================
// Parking spaces
// =============================================================================

/// Body of `POST /api/parking/spaces`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceRequest {
    #[serde(default)]
    pub space_number: Option<Value>,
    #[serde(default)]
    pub section: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub occupied_by: Option<Value>,
}

impl CreateSpaceRequest {
    pub fn validate(self) -> Result<NewParkingSpace, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let space_number = text(&mut errors, "spaceNumber", self.space_number);
        let section = text(&mut errors, "section", self.section);
        let status = text(&mut errors, "status", self.status);
        let occupied_by = text(&mut errors, "occupiedBy", self.occupied_by);

        require_non_empty(&mut errors, "spaceNumber", space_number.as_deref());
        require_non_empty(&mut errors, "section", section.as_deref());
        let status = parse_status(&mut errors, status.as_deref());

        errors.finish(|| {
            let space = NewParkingSpace::new(
                space_number.unwrap_or_default().trim(),
                section.unwrap_or_default().trim(),
            )
            .with_status(status.unwrap_or_default());
            match occupied_by {
                Some(occupied_by) => space.with_occupied_by(occupied_by),
                None => space,
            }
        })
    }
}

/// Body of `PATCH /api/parking/spaces/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpaceRequest {
    #[serde(default)]
    pub status: Option<Value>,
    /// Absent leaves the occupant alone, `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub occupied_by: Option<Value>,
}

impl UpdateSpaceRequest {
    pub fn validate(self) -> Result<ParkingSpaceUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let status = text(&mut errors, "status", self.status);
        let status = parse_status(&mut errors, status.as_deref());

        let occupied_by = match self.occupied_by {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => Some(text(&mut errors, "occupiedBy", Some(value))),
        };

        errors.finish(|| ParkingSpaceUpdate {
            status,
            occupied_by,
        })
    }
}

/// Parses the `{id}` path segment.
pub fn parse_space_id(raw: &str) -> Result<i64, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::InvalidRequest("Invalid space ID".to_string()))
}

/// Parses and clamps the history `limit` query parameter. A blank value
/// counts as absent.
pub fn parse_history_limit(raw: Option<&str>) -> Result<u32, ServerError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(parking_store::DEFAULT_HISTORY_LIMIT);
    };
    let limit: i64 = raw
        .parse()
        .map_err(|_| ServerError::InvalidRequest("Invalid limit".to_string()))?;

    let clamped = limit.clamp(1, i64::from(parking_store::MAX_HISTORY_LIMIT));
    Ok(u32::try_from(clamped).unwrap_or(parking_store::MAX_HISTORY_LIMIT))
}
