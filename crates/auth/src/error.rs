use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} is not set")]
    MissingEnvVar(String),

    #[error("{0} is set but empty")]
    EmptyEnvVar(String),

    /// Keys never contain whitespace; usually a copy/paste mistake.
    #[error("API key contains whitespace or control characters")]
    InvalidKeyFormat,
}
