use validator::{Validate, ValidationErrors};

use crate::error::AppError;

/// Flattens validator output into a single line, sorted by field so the
/// message is stable.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, field_errors)| {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

pub trait ValidateExt: Sized {
    fn validated(self) -> Result<Self, AppError>;
}

impl<T: Validate> ValidateExt for T {
    fn validated(self) -> Result<Self, AppError> {
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Validate)]
pub struct ClientForm {
    #[validate(length(min = 1, message = "Tax identifier is required"))]
    pub tax_id: String,
    #[validate(length(min = 1, message = "Requester name is required"))]
    pub requester_name: String,
    #[validate(length(min = 1, message = "Phone is required"))]
    pub phone: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}

impl ClientForm {
    pub fn trimmed(self) -> Self {
        Self {
            tax_id: self.tax_id.trim().to_string(),
            requester_name: self.requester_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct UserForm {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Validate)]
pub struct StaffEmailForm {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}
