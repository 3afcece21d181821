//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::config::{MAX_AVATAR_LENGTH, MAX_NICKNAME_LENGTH, MAX_TEAM_LENGTH};

/// Strip HTML-looking tags from a user-supplied string.
///
/// Nicknames and team tags are rendered verbatim by every client, so
/// `<b>Alice</b>` joins as `Alice`.
pub fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Normalize and validate a nickname: tags stripped, trimmed, 1..=20 chars.
pub fn normalize_nickname(raw: &str) -> Result<String, ValidationError> {
    let cleaned = strip_tags(raw).trim().to_owned();
    if cleaned.is_empty() {
        let mut err = ValidationError::new("nickname_empty");
        err.message = Some("Nickname must not be empty".into());
        return Err(err);
    }
    if cleaned.chars().count() > MAX_NICKNAME_LENGTH {
        let mut err = ValidationError::new("nickname_length");
        err.message =
            Some(format!("Nickname must be at most {MAX_NICKNAME_LENGTH} characters").into());
        return Err(err);
    }
    Ok(cleaned)
}

/// Validate an avatar string: at most 8 code points, tags stripped.
pub fn normalize_avatar(raw: &str) -> Result<String, ValidationError> {
    let cleaned = strip_tags(raw).trim().to_owned();
    if cleaned.chars().count() > MAX_AVATAR_LENGTH {
        let mut err = ValidationError::new("avatar_length");
        err.message =
            Some(format!("Avatar must be at most {MAX_AVATAR_LENGTH} code points").into());
        return Err(err);
    }
    Ok(cleaned)
}

/// Validate an optional team tag: at most 20 code points after cleanup,
/// empty collapses to `None`.
pub fn normalize_team(raw: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let cleaned = strip_tags(raw).trim().to_owned();
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > MAX_TEAM_LENGTH {
        let mut err = ValidationError::new("team_length");
        err.message =
            Some(format!("Team tag must be at most {MAX_TEAM_LENGTH} code points").into());
        return Err(err);
    }
    Ok(Some(cleaned))
}
