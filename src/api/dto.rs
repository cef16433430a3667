//! Request/response bodies and input validation.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordResponse {
    pub message: String,
    pub version: i64,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let len = self.username.chars().count();
        if !(4..=20).contains(&len) {
            return Err(ServiceError::Validation(
                "username must be 4 to 20 characters".into(),
            ));
        }
        validate_email(&self.email)?;
        validate_password_strength(&self.password)
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ServiceError::Validation("username and password are required".into()));
        }
        Ok(())
    }
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.old_password.is_empty() {
            return Err(ServiceError::Validation("old_password is required".into()));
        }
        validate_password_strength(&self.new_password)
    }
}

/// At least 8 characters with a digit, a letter and a symbol.
pub fn validate_password_strength(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < 8 {
        return Err(ServiceError::Validation("password must be at least 8 characters".into()));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !(has_digit && has_letter && has_special) {
        return Err(ServiceError::Validation(
            "password must contain a digit, a letter and a special character".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ServiceError::Validation("email address is invalid".into()))
    }
}
