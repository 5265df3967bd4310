use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Network or backend failure while talking to the review API.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
    /// A local precondition was not met. Raised before any request is sent.
    #[error("{0}")]
    Validation(String),
    #[error("stored session token was rejected")]
    SessionInvalid,
    #[error("not signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Keyring(#[from] keyring::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Inquire(#[from] inquire::error::InquireError),
    #[error(transparent)]
    InitLoggingError(#[from] tracing_subscriber::util::TryInitError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn transport(operation: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Transport {
            operation,
            message: err.to_string().replace('\n', " "),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Transport { .. })
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
