//! Validated access to single environment variables.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvVarError {
    #[error("Environment variable '{name}' not found. Set it in your .env file or environment.")]
    NotFound { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8 characters.")]
    InvalidUtf8 { name: String },

    #[error("Environment variable '{name}' is empty.")]
    Empty { name: String },
}

/// Reads environment variables, trimming whitespace and rejecting blanks.
///
/// # Examples
///
/// ```no_run
/// use server::utils::EnvUtils;
///
/// let connection_string = EnvUtils::get_validated_var("AZURE_SERVICEBUS_CONNECTION_STRING")?;
/// # Ok::<(), server::utils::EnvVarError>(())
/// ```
pub struct EnvUtils;

impl EnvUtils {
    pub fn get_validated_var(name: &str) -> Result<String, EnvVarError> {
        match std::env::var(name) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Err(EnvVarError::Empty {
                        name: name.to_string(),
                    })
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Err(std::env::VarError::NotPresent) => Err(EnvVarError::NotFound {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(EnvVarError::InvalidUtf8 {
                name: name.to_string(),
            }),
        }
    }

    /// Like [`get_validated_var`](Self::get_validated_var), but treats every
    /// failure as absence.
    pub fn get_optional_var(name: &str) -> Option<String> {
        Self::get_validated_var(name).ok()
    }
}
