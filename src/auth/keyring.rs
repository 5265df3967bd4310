use keyring::Entry;
use tracing::debug;

use super::{AuthProvider, TOKEN_KEY};
use crate::errors::AppError;

pub struct KeyringAuth {
    entry: Entry,
}

impl KeyringAuth {
    pub fn new(service: &str) -> Result<Self, AppError> {
        let entry = Entry::new(service, TOKEN_KEY)?;
        Ok(Self { entry })
    }
}

impl AuthProvider for KeyringAuth {
    fn get_token(&self) -> Result<Option<String>, AppError> {
        match self.entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_token(&self, token: &str) -> Result<(), AppError> {
        self.entry.set_password(token)?;
        debug!("stored session token in keyring");
        Ok(())
    }

    fn clear_token(&self) -> Result<(), AppError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
