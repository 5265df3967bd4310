use std::sync::Arc;
use std::time::Duration;

use inquire::Password;
use tracing::{info, instrument};

use crate::{
    auth::{AuthProvider, keyring::KeyringAuth, memory::MemoryAuth},
    backend::{ReviewSource, http::ApiClient},
    conversation::ConversationEngine,
    errors::AppError,
    loader::{AccumulationKey, CollectionLoader, Paginated},
    logging,
    models::User,
    session::{SessionGate, SessionPhase},
};

use cli::{Args, Cli, Command, PageArgs};

pub mod cli;
pub mod commands;

/// Set to bypass the OS keyring, e.g. in CI.
pub const TOKEN_ENV: &str = "REVIEWDESK_TOKEN";

pub struct App {
    args: Args,
    command: Command,
    client: Arc<ApiClient>,
    session: SessionGate,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self, AppError> {
        let tokens: Arc<dyn AuthProvider> = match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Arc::new(MemoryAuth::new(Some(token))),
            _ => Arc::new(KeyringAuth::new(logging::PROJECT_NAME)?),
        };
        let client = Arc::new(ApiClient::new(
            &cli.args.api_url,
            Duration::from_secs(cli.args.timeout_secs.max(1)),
            tokens.clone(),
        )?);
        let session = SessionGate::new(tokens, client.clone());
        Ok(Self {
            args: cli.args,
            command: cli.command.unwrap_or(Command::Whoami),
            client,
            session,
        })
    }

    pub async fn run(&mut self) -> Result<(), AppError> {
        logging::init(self.args.log_level)?;
        info!(api = %self.client.api_base(), "starting");
        match self.command.clone() {
            Command::Login { token } => self.login(token).await,
            Command::Logout => {
                self.session.logout()?;
                println!("Signed out.");
                Ok(())
            }
            command => {
                let user = self.require_session().await?;
                self.dispatch(command, &user).await
            }
        }
    }

    async fn login(&self, token: Option<String>) -> Result<(), AppError> {
        let token = match token {
            Some(token) => token,
            None => Self::prompt_token()?,
        };
        let user = self.session.login(&token).await?;
        println!("Signed in as {}.", user.username);
        Ok(())
    }

    pub fn prompt_token() -> Result<String, AppError> {
        let prompt = Password::new("Enter your access token")
            .with_display_toggle_enabled()
            .without_confirmation()
            .with_display_mode(inquire::PasswordDisplayMode::Masked);
        Ok(prompt.prompt()?)
    }

    async fn require_session(&self) -> Result<User, AppError> {
        match self.session.initialize().await {
            SessionPhase::Authenticated => self
                .session
                .current_user()
                .ok_or(AppError::NotAuthenticated),
            _ => {
                eprintln!("Not signed in. Run `reviewdesk login` first.");
                Err(AppError::NotAuthenticated)
            }
        }
    }

    async fn collect<T: Paginated>(
        &self,
        key: AccumulationKey,
        page: &PageArgs,
    ) -> Result<CollectionLoader<T>, AppError> {
        let mut loader = CollectionLoader::new(page.per_page, self.session.subscribe());
        loader
            .load_all(self.client.as_ref(), key, page.filters(), page.pages.max(1))
            .await?;
        Ok(loader)
    }

    #[instrument(skip(self, user))]
    async fn dispatch(&self, command: Command, user: &User) -> Result<(), AppError> {
        let width = commands::terminal_width();
        let output = match command {
            Command::Whoami => {
                let mut line = user.username.clone();
                if let Some(email) = user.email.as_deref() {
                    line.push_str(&format!(" <{email}>"));
                }
                if user.is_admin {
                    line.push_str(" (admin)");
                }
                line + "\n"
            }
            Command::Repos { page } => {
                let loader = self.collect(AccumulationKey::CurrentUser, &page).await?;
                commands::render_repositories(&loader, &user.username)
            }
            Command::Orgs { page } => {
                let loader = self.collect(AccumulationKey::CurrentUser, &page).await?;
                commands::render_organizations(&loader)
            }
            Command::Prs { repo_id, page } => {
                let loader = self.collect(AccumulationKey::Repository(repo_id), &page).await?;
                commands::render_pull_requests(&loader)
            }
            Command::Commits { repo_id, page } => {
                let loader = self.collect(AccumulationKey::Repository(repo_id), &page).await?;
                commands::render_commits(&loader)
            }
            Command::Reviews { context, id, page } => {
                let key = AccumulationKey::ReviewHistory { context, id };
                let loader = self.collect(key, &page).await?;
                commands::render_review_history(&loader)
            }
            Command::Review {
                review_id,
                all_threads,
            } => {
                let engine = self.open_review(review_id).await?;
                commands::render_review(&engine, all_threads, width)
            }
            Command::Threads { review_id } => {
                let engine = self.open_review(review_id).await?;
                engine
                    .threads()
                    .iter()
                    .map(|t| commands::render_thread(t, false, width))
                    .collect()
            }
            Command::Reply {
                review_id,
                thread_id,
                message,
            } => self.reply(review_id, thread_id, message, width).await?,
            Command::Rate {
                review_id,
                rating,
                feedback,
            } => {
                let engine = self.engine(review_id);
                engine.submit_rating(rating, &feedback).await?;
                "Thanks, rating submitted.\n".to_string()
            }
            Command::Trigger { target } => {
                let triggered = self.client.trigger_review(target.into()).await?;
                info!(review_id = ?triggered.review_id, "review triggered");
                commands::render_triggered(&triggered)
            }
            Command::Login { .. } | Command::Logout => {
                return Err(AppError::validation("session commands run before dispatch"));
            }
        };
        print!("{output}");
        Ok(())
    }

    fn engine(&self, review_id: u64) -> ConversationEngine {
        ConversationEngine::new(review_id, self.client.clone(), self.session.subscribe())
    }

    async fn open_review(&self, review_id: u64) -> Result<ConversationEngine, AppError> {
        let mut engine = self.engine(review_id);
        engine.load().await?;
        Ok(engine)
    }

    async fn reply(
        &self,
        review_id: u64,
        thread_id: u64,
        message: Option<String>,
        width: usize,
    ) -> Result<String, AppError> {
        let mut engine = self.open_review(review_id).await?;
        if engine.thread(thread_id).is_none() {
            return Err(AppError::validation(format!(
                "review {review_id} has no thread {thread_id}"
            )));
        }
        let message = match message {
            Some(message) => message,
            None => edit::edit("")?,
        };
        engine.set_draft(thread_id, message);
        let outcome = engine.submit_reply(thread_id).await?;

        let mut out = String::new();
        if let Some(thread) = engine.thread(thread_id) {
            out.push_str(&commands::render_thread(thread, true, width));
        }
        if !outcome.refreshed {
            out.push_str("Reply sent, but the thread could not be refreshed.\n");
        }
        if outcome.review_updated
            && let Some(aggregate) = engine.aggregate()
        {
            out.push_str("\nThe review was revised:\n");
            out.push_str(&commands::render_aggregate(&aggregate, width));
        }
        Ok(out)
    }
}
