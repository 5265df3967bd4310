use crate::errors::AppError;

pub mod keyring;
pub mod memory;

/// Key the session token is persisted under.
pub const TOKEN_KEY: &str = "githubToken";

/// Where the single session token lives between runs.
pub trait AuthProvider: Send + Sync {
    fn get_token(&self) -> Result<Option<String>, AppError>;
    fn set_token(&self, token: &str) -> Result<(), AppError>;
    fn clear_token(&self) -> Result<(), AppError>;
}
