use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::AuthProvider,
    backend::UserResolver,
    errors::{AppError, Result},
    models::User,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Initializing,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub token: Option<String>,
    pub user: Option<User>,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated && self.token.is_some() && self.user.is_some()
    }

    /// Fails unless authenticated requests may be issued right now.
    pub fn require_authenticated(&self) -> Result<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(AppError::NotAuthenticated)
        }
    }

    fn anonymous() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            token: None,
            user: None,
        }
    }
}

pub type SessionWatch = watch::Receiver<SessionState>;

/// Owns the process-wide session. Everything else observes it through a
/// [`SessionWatch`]; only the gate's own operations change it.
pub struct SessionGate {
    state: watch::Sender<SessionState>,
    store: Arc<dyn AuthProvider>,
    resolver: Arc<dyn UserResolver>,
}

impl SessionGate {
    pub fn new(store: Arc<dyn AuthProvider>, resolver: Arc<dyn UserResolver>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state,
            store,
            resolver,
        }
    }

    pub fn subscribe(&self) -> SessionWatch {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// Validates any persisted token and settles the session.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> SessionPhase {
        let stored = match self.store.get_token() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "could not read stored token");
                None
            }
        };
        let Some(token) = stored else {
            debug!("no stored token");
            self.state.send_replace(SessionState::anonymous());
            return SessionPhase::Anonymous;
        };
        self.state.send_modify(|s| s.token = Some(token.clone()));
        match self.resolve(&token).await {
            Ok(user) => {
                info!(username = %user.username, "session restored");
                SessionPhase::Authenticated
            }
            Err(e) => {
                warn!(error = %e, "session validation failed");
                SessionPhase::Anonymous
            }
        }
    }

    /// Persists `token` and resolves the user it belongs to.
    #[instrument(skip_all)]
    pub async fn login(&self, token: &str) -> Result<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::validation("token must not be empty"));
        }
        self.store.set_token(token)?;
        self.state.send_modify(|s| s.token = Some(token.to_string()));
        let user = self.resolve(token).await?;
        info!(username = %user.username, "logged in");
        Ok(user)
    }

    /// Drops the token immediately. No request is made.
    pub fn logout(&self) -> Result<()> {
        self.state.send_replace(SessionState::anonymous());
        self.store.clear_token()?;
        info!("logged out");
        Ok(())
    }

    async fn resolve(&self, token: &str) -> Result<User> {
        match self.resolver.resolve_current_user(token).await {
            Ok(user) => {
                self.state.send_replace(SessionState {
                    phase: SessionPhase::Authenticated,
                    token: Some(token.to_string()),
                    user: Some(user.clone()),
                });
                Ok(user)
            }
            Err(e) => {
                debug!(error = %e, "discarding rejected token");
                self.state.send_replace(SessionState::anonymous());
                if let Err(clear) = self.store.clear_token() {
                    warn!(error = %clear, "could not clear rejected token");
                }
                Err(AppError::SessionInvalid)
            }
        }
    }
}
