use std::{fmt::Display, str::FromStr};

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::{self, Directive};

use crate::{
    backend::{ReviewTarget, http::DEFAULT_API_URL},
    loader::{DEFAULT_PER_PAGE, Filters},
    models::ReviewContext,
};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub args: Args,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(clap::Args, Clone)]
pub struct Args {
    /// Base URL of the review API.
    #[clap(long, env = "REVIEWDESK_API_URL", default_value = DEFAULT_API_URL, global = true)]
    pub api_url: String,
    /// Per-request timeout.
    #[clap(long, default_value_t = 30, global = true)]
    pub timeout_secs: u64,
    #[clap(long, short, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,
    #[clap(long, short)]
    pub print_log_dir: bool,
}

/// Paging controls shared by every list command.
#[derive(clap::Args, Clone, Debug)]
pub struct PageArgs {
    /// How many pages to accumulate before stopping.
    #[clap(long, default_value_t = 1)]
    pub pages: u32,
    #[clap(long, default_value_t = DEFAULT_PER_PAGE)]
    pub per_page: u32,
    /// Extra `key=value` query filters forwarded to the backend.
    #[clap(long = "filter", short = 'f', value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,
}

impl PageArgs {
    pub fn filters(&self) -> Filters {
        self.filters.iter().cloned().collect()
    }
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Store an access token and check it against the backend.
    Login {
        /// Prompted for when omitted.
        #[clap(long)]
        token: Option<String>,
    },
    /// Forget the stored token.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List your repositories, split into owned and collaborator.
    Repos {
        #[clap(flatten)]
        page: PageArgs,
    },
    /// List organizations you belong to.
    Orgs {
        #[clap(flatten)]
        page: PageArgs,
    },
    /// List pull requests of a repository.
    Prs {
        repo_id: u64,
        #[clap(flatten)]
        page: PageArgs,
    },
    /// List commits of a repository.
    Commits {
        repo_id: u64,
        #[clap(flatten)]
        page: PageArgs,
    },
    /// List reviews recorded for a pull request or commit.
    Reviews {
        #[clap(value_enum)]
        context: ReviewContext,
        id: u64,
        #[clap(flatten)]
        page: PageArgs,
    },
    /// Show a review's issue summary and its discussion threads.
    Review {
        review_id: u64,
        /// Print every thread instead of only the expanded ones.
        #[clap(long)]
        all_threads: bool,
    },
    /// List the discussion threads of a review.
    Threads { review_id: u64 },
    /// Reply to a thread and wait for the AI's answer.
    Reply {
        review_id: u64,
        thread_id: u64,
        /// Opens $EDITOR when omitted.
        message: Option<String>,
    },
    /// Rate the AI review from 1 to 5.
    Rate {
        review_id: u64,
        rating: u8,
        feedback: String,
    },
    /// Ask the backend to run a new AI review.
    Trigger {
        #[clap(subcommand)]
        target: TriggerTarget,
    },
}

#[derive(Subcommand, Clone, Copy, Debug)]
pub enum TriggerTarget {
    /// Review a pull request by its number within a repository.
    Pr { repository_id: u64, pr_number: u64 },
    /// Review a single commit.
    Commit { commit_id: u64 },
}

impl From<TriggerTarget> for ReviewTarget {
    fn from(value: TriggerTarget) -> Self {
        match value {
            TriggerTarget::Pr {
                repository_id,
                pr_number,
            } => ReviewTarget::PullRequest {
                repository_id,
                pr_number,
            },
            TriggerTarget::Commit { commit_id } => ReviewTarget::Commit { commit_id },
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    None,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::None => "none",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<LogLevel> for Directive {
    type Error = filter::ParseError;
    fn try_from(value: LogLevel) -> Result<Self, Self::Error> {
        match value {
            LogLevel::None => Directive::from_str("off"),
            other => Directive::from_str(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_review_history_with_filters() {
        let cli = Cli::try_parse_from([
            "reviewdesk",
            "reviews",
            "commit",
            "12",
            "--pages",
            "3",
            "-f",
            "status=completed",
        ])
        .unwrap();
        let Some(Command::Reviews { context, id, page }) = cli.command else {
            panic!("expected reviews command");
        };
        assert_eq!(context, ReviewContext::Commit);
        assert_eq!(id, 12);
        assert_eq!(page.pages, 3);
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);
        assert_eq!(
            page.filters().get("status").map(String::as_str),
            Some("completed")
        );
    }

    #[test]
    fn malformed_filter_is_rejected() {
        assert!(parse_filter("nokey").is_err());
        assert!(parse_filter("=v").is_err());
        assert_eq!(parse_filter("a=b=c").unwrap(), ("a".into(), "b=c".into()));
    }

    #[test]
    fn trigger_targets_map_to_review_targets() {
        let cli = Cli::try_parse_from(["reviewdesk", "trigger", "pr", "3", "17"]).unwrap();
        let Some(Command::Trigger { target }) = cli.command else {
            panic!("expected trigger command");
        };
        assert_eq!(
            ReviewTarget::from(target),
            ReviewTarget::PullRequest {
                repository_id: 3,
                pr_number: 17
            }
        );

        let cli = Cli::try_parse_from(["reviewdesk", "trigger", "commit", "88"]).unwrap();
        let Some(Command::Trigger { target }) = cli.command else {
            panic!("expected trigger command");
        };
        assert_eq!(
            ReviewTarget::from(target),
            ReviewTarget::Commit { commit_id: 88 }
        );
        assert!(Cli::try_parse_from(["reviewdesk", "trigger", "pr", "3"]).is_err());
    }

    #[test]
    fn none_level_turns_logging_off() {
        let directive: Directive = LogLevel::None.try_into().unwrap();
        assert_eq!(directive.to_string(), "off");
    }
}
