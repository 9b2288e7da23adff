use crate::error::ValidationError;

use uuid::Uuid;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 16;

/// Checks a player name against `^[A-Za-z0-9_]{3,16}$`.
pub fn username(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::Missing("username"));
    }

    let valid_len = (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&name.len());
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_len && valid_chars {
        Ok(name.to_string())
    } else {
        Err(ValidationError::Username(name.to_string()))
    }
}

/// Key a player is stored under in the metadata document.
pub fn player_key(username: &str) -> String {
    username.trim().to_ascii_lowercase()
}

/// Accepts both the dashed and the compact (`Mojang API`) uuid form,
/// returns the dashed form.
pub fn uuid(raw: &str) -> Result<String, ValidationError> {
    Uuid::parse_str(raw.trim())
        .map(|u| u.hyphenated().to_string())
        .map_err(|_| ValidationError::Uuid(raw.to_string()))
}

/// Empty strings coming from form fields count as "not provided".
pub fn optional_uuid(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => uuid(value).map(Some),
    }
}
