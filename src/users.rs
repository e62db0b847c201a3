use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

use crate::error::{DashboardError, Result};
use crate::models::Role;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub lp_id: String,
    pub role: Role,
    pub password: String,
}

impl NewUser {
    /// Trims the text fields and rejects incomplete forms.
    pub fn validated(mut self) -> Result<Self> {
        for (field, value) in [
            ("email", &mut self.email),
            ("first name", &mut self.first_name),
            ("last name", &mut self.last_name),
            ("LP id", &mut self.lp_id),
        ] {
            *value = value.trim().to_string();
            if value.is_empty() {
                return Err(DashboardError::ValidationFailed(format!("{field} is required")));
            }
        }
        if !self.email.contains('@') {
            return Err(DashboardError::ValidationFailed(format!(
                "`{}` is not an email address",
                self.email
            )));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DashboardError::ValidationFailed(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        self.email = self.email.to_ascii_lowercase();
        Ok(self)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| DashboardError::ValidationFailed(format!("could not hash password: {err}")))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// An account may not delete itself.
pub fn ensure_not_self(actor: Uuid, target: Uuid) -> Result<()> {
    if actor == target {
        return Err(DashboardError::ValidationFailed(
            "you cannot delete your own account".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> NewUser {
        NewUser {
            email: " Dana@Example.com ".to_string(),
            first_name: "Dana".to_string(),
            last_name: "Ruiz".to_string(),
            lp_id: "LP-204".to_string(),
            role: Role::User,
            password: "hunter22".to_string(),
        }
    }

    #[test]
    fn valid_forms_are_normalised() {
        let user = form().validated().unwrap();
        assert_eq!(user.email, "dana@example.com");
    }

    #[test]
    fn blank_fields_are_rejected() {
        let mut user = form();
        user.last_name = "   ".to_string();
        let err = user.validated().unwrap_err();
        assert!(err.to_string().contains("last name"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        let mut user = form();
        user.password = "abc".to_string();
        assert!(matches!(
            user.validated(),
            Err(DashboardError::ValidationFailed(_))
        ));
    }

    #[test]
    fn hashes_verify_only_the_matching_password() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn deleting_yourself_is_refused() {
        let id = Uuid::new_v4();
        assert!(ensure_not_self(id, id).is_err());
        assert!(ensure_not_self(id, Uuid::new_v4()).is_ok());
    }
}
