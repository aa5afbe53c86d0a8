use recollect::RecollectError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Store(#[from] RecollectError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        CliError::Usage(message.into())
    }

    /// Process exit status: 2 for bad input, 3 for a missing memory, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Json(_) => 2,
            CliError::Store(RecollectError::InvalidFilter(_)) => 2,
            CliError::Store(RecollectError::NotFound(_)) => 3,
            CliError::Store(_) | CliError::Io(_) => 1,
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::usage("bad id").exit_code(), 2);
        assert_eq!(
            CliError::from(RecollectError::NotFound("x".into())).exit_code(),
            3
        );
        assert_eq!(
            CliError::from(RecollectError::InvalidFilter("x".into())).exit_code(),
            2
        );
        assert_eq!(
            CliError::from(RecollectError::Storage("disk".into())).exit_code(),
            1
        );
    }

    #[test]
    fn test_store_errors_keep_their_message() {
        let err = CliError::from(RecollectError::NotFound("abc".into()));
        assert_eq!(err.to_string(), "Memory not found: abc");
    }
}
