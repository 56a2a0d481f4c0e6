//! Operator API configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

pub const MIN_ADMIN_TOKEN_LEN: usize = 32;

/// Bearer token guarding `/admin/billing`. Admin routes are not mounted
/// without one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    pub token: Option<SecretString>,
}

impl AdminConfig {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.token {
            Some(token) if token.expose_secret().len() < MIN_ADMIN_TOKEN_LEN => {
                Err(ValidationError::AdminTokenTooShort(MIN_ADMIN_TOKEN_LEN))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_is_rejected() {
        let config = AdminConfig {
            token: Some(SecretString::new("short".into())),
        };
        assert_eq!(config.validate(), Err(ValidationError::AdminTokenTooShort(32)));
    }

    #[test]
    fn absent_token_disables_admin_routes() {
        let config = AdminConfig::default();
        assert!(!config.is_enabled());
        assert!(config.validate().is_ok());
    }
}
