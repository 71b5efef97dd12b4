//! Error taxonomy shared across the dispatch core.
//!
//! Every business failure maps to exactly one variant here. The HTTP
//! layer (`dispatch-server`) is the only place
//! that turns a variant into a status code; nothing downstream of this
//! crate should assume a transport.

pub mod status;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("database error: {0}")]
    Transient(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_tagged() {
        assert_eq!(
            CoreError::not_found("number 42").to_string(),
            "not found: number 42"
        );
        assert_eq!(
            CoreError::validation("bad phone").to_string(),
            "validation failed: bad phone"
        );
    }
}
