use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 39;
const MAX_EMAIL_LEN: usize = 254;
const MAX_TITLE_LEN: usize = 200;
const MAX_PROJECT_NAME_LEN: usize = 100;

fn is_valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if !name.chars().all(is_valid_username_char) {
        return Err(ApiError::bad_request(
            "Username can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err(ApiError::bad_request(
            "Username cannot start with a hyphen or underscore",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.contains(char::is_whitespace)
        && matches!(email.split_once('@'), Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.contains('@'));

    if !valid {
        return Err(ApiError::bad_request(format!("Invalid email '{email}'")));
    }
    Ok(())
}

fn validate_text(value: &str, entity: &str, max_len: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{entity} cannot be empty")));
    }
    if value.chars().count() > max_len {
        return Err(ApiError::bad_request(format!(
            "{entity} cannot exceed {max_len} characters"
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ApiError> {
    validate_text(title, "Title", MAX_TITLE_LEN)
}

pub fn validate_project_name(name: &str) -> Result<(), ApiError> {
    validate_text(name, "Project name", MAX_PROJECT_NAME_LEN)
}
