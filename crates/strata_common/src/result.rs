//! Common result and error types for the Strata database.

/// The result type for operations that can only fail because of a bug in Strata.
///
/// User-visible contract violations (an unknown id, a malformed revision) have
/// their own error enums in the crate that detects them. `InternalError` is
/// reserved for states that the database itself should never reach.
pub type StrataResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Strata, not a caller mistake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal database error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("slot 3 lost its backup");
        assert_eq!(
            format!("{err}"),
            "internal database error: slot 3 lost its backup"
        );
    }

    #[test]
    fn err_path_keeps_message() {
        let r: StrataResult<u32> = Err(InternalError::new("bad index"));
        assert_eq!(r.unwrap_err().message, "bad index");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
