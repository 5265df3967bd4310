use std::sync::Mutex;

use super::AuthProvider;
use crate::errors::AppError;

/// Token store that lives only as long as the process. Used when the token
/// comes from the environment instead of the keyring.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    token: Mutex<Option<String>>,
}

impl MemoryAuth {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AuthProvider for MemoryAuth {
    fn get_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.slot().clone())
    }

    fn set_token(&self, token: &str) -> Result<(), AppError> {
        *self.slot() = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<(), AppError> {
        *self.slot() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_clears_token() {
        let auth = MemoryAuth::default();
        assert_eq!(auth.get_token().unwrap(), None);
        auth.set_token("abc").unwrap();
        assert_eq!(auth.get_token().unwrap().as_deref(), Some("abc"));
        auth.clear_token().unwrap();
        assert_eq!(auth.get_token().unwrap(), None);
    }
}
