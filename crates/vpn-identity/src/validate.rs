//! Input validation for identity operations.

use vpn_core::EngineError;

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MAX_EXTERNAL_ID_LEN: usize = 128;

pub(crate) fn username(username: &str) -> Result<(), EngineError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(EngineError::invalid(format!(
            "username must be 1..={MAX_USERNAME_LEN} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(EngineError::invalid(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

pub(crate) fn email(email: &str) -> Result<(), EngineError> {
    let mut parts = email.split('@');
    let ok = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    };
    if !ok || email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::invalid("malformed email address"));
    }
    Ok(())
}

pub(crate) fn password(password: &str) -> Result<(), EngineError> {
    if password.is_empty() {
        return Err(EngineError::invalid("password is empty"));
    }
    Ok(())
}

pub(crate) fn external_id(external_id: &str) -> Result<(), EngineError> {
    if external_id.trim().is_empty() || external_id.len() > MAX_EXTERNAL_ID_LEN {
        return Err(EngineError::invalid(format!(
            "external id must be 1..={MAX_EXTERNAL_ID_LEN} characters"
        )));
    }
    Ok(())
}
