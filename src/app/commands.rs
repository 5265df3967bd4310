//! Text rendering for each subcommand.
//!
//! Renderers return `String`s so they can be checked without a terminal;
//! the dispatcher in [`super::App`] prints them.

use std::fmt::Write as _;

use textwrap::Options;

use crate::{
    backend::TriggeredReview,
    conversation::{Author, Comment, ConversationEngine, Thread},
    issues::{FileIssueRecord, IssueAggregate, RatingBand},
    loader::CollectionLoader,
    models::{
        Commit, Organization, PullRequest, Repository, ReviewSummary, partition_by_owner,
    },
    segment::Segment,
};

const INDENT: &str = "    ";

pub fn terminal_width() -> usize {
    textwrap::termwidth().clamp(40, 120)
}

fn wrap_into(out: &mut String, text: &str, indent: &str, width: usize) {
    let options = Options::new(width)
        .initial_indent(indent)
        .subsequent_indent(indent);
    for line in textwrap::wrap(text, &options) {
        let _ = writeln!(out, "{line}");
    }
}

fn footer<T: crate::loader::Paginated>(out: &mut String, loader: &CollectionLoader<T>) {
    let _ = write!(
        out,
        "{} {} across {} page(s)",
        loader.items().len(),
        loader.resource(),
        loader.loaded_pages()
    );
    if loader.has_more() {
        out.push_str(", more available (raise --pages)");
    }
    out.push('\n');
}

pub fn render_repositories(loader: &CollectionLoader<Repository>, username: &str) -> String {
    let mut out = String::new();
    let split = partition_by_owner(loader.items(), username);
    for (heading, repos) in [
        ("Owned", &split.owned),
        ("Collaborator", &split.collaborator),
    ] {
        let _ = writeln!(out, "{heading} ({})", repos.len());
        for repo in repos.iter() {
            let _ = write!(out, "{INDENT}#{:<6} {}", repo.id, repo.repo_name);
            if let Some(desc) = repo.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = write!(out, " - {desc}");
            }
            out.push('\n');
        }
    }
    footer(&mut out, loader);
    out
}

pub fn render_organizations(loader: &CollectionLoader<Organization>) -> String {
    let mut out = String::new();
    for org in loader.items() {
        let _ = writeln!(out, "#{:<6} {}", org.id, org.login);
    }
    footer(&mut out, loader);
    out
}

pub fn render_pull_requests(loader: &CollectionLoader<PullRequest>) -> String {
    let mut out = String::new();
    for pr in loader.items() {
        let _ = writeln!(
            out,
            "#{:<6} PR {:<5} [{}] {}",
            pr.id,
            pr.pr_number,
            pr.status.as_deref().unwrap_or("unknown"),
            pr.title
        );
    }
    footer(&mut out, loader);
    out
}

pub fn render_commits(loader: &CollectionLoader<Commit>) -> String {
    let mut out = String::new();
    for commit in loader.items() {
        let subject = commit.message.lines().next().unwrap_or_default();
        let when = commit
            .timestamp
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "#{:<6} {} {:<10} {}",
            commit.id,
            commit.short_hash(),
            when,
            subject
        );
    }
    footer(&mut out, loader);
    out
}

pub fn render_review_history(loader: &CollectionLoader<ReviewSummary>) -> String {
    let mut out = String::new();
    for review in loader.items() {
        let _ = writeln!(
            out,
            "#{:<6} {:<12} {}",
            review.id,
            review.status,
            review.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    footer(&mut out, loader);
    out
}

fn band_label(value: f64) -> &'static str {
    match RatingBand::of(value) {
        RatingBand::Poor => "poor",
        RatingBand::Fair => "fair",
        RatingBand::Good => "good",
    }
}

fn render_file(out: &mut String, record: &FileIssueRecord, width: usize) {
    let _ = writeln!(out, "{} ({} issues)", record.file, record.total_issues());
    if let Some(summary) = record.summary.as_deref() {
        wrap_into(out, summary, INDENT, width);
    }
    if !record.ratings.is_empty() {
        let ratings: Vec<String> = record
            .ratings
            .iter()
            .map(|(name, value)| format!("{name} {value:.1} ({})", band_label(*value)))
            .collect();
        let _ = writeln!(out, "{INDENT}ratings: {}", ratings.join(", "));
    }
    for issue in &record.critical {
        wrap_into(out, &format!("critical: {issue}"), INDENT, width);
    }
    for issue in &record.syntax {
        wrap_into(
            out,
            &format!("syntax, line {}: {}", issue.location, issue.description),
            INDENT,
            width,
        );
    }
    for issue in &record.standards {
        wrap_into(
            out,
            &format!("standards, line {}: {}", issue.location, issue.standard),
            INDENT,
            width,
        );
    }
}

pub fn render_aggregate(aggregate: &IssueAggregate, width: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "critical {}  syntax {}  standards {}",
        aggregate.critical_count, aggregate.syntax_count, aggregate.standards_count
    );
    if !aggregate.files_with_critical.is_empty() {
        out.push_str("files with critical issues:\n");
        for file in &aggregate.files_with_critical {
            let _ = writeln!(out, "{INDENT}{} ({})", file.file, file.count);
        }
    }
    for record in &aggregate.files {
        out.push('\n');
        render_file(&mut out, record, width);
    }
    out
}

fn render_comment(out: &mut String, comment: &Comment, width: usize) {
    let who = match (comment.author(), &comment.user) {
        (Author::Ai, _) => "AI".to_string(),
        (Author::Human, Some(user)) => user.username.clone(),
        (Author::Human, None) => "unknown".to_string(),
    };
    let marker = if comment.is_error() { " [error]" } else { "" };
    let _ = writeln!(
        out,
        "{INDENT}{who}{marker} at {}",
        comment.created_at.format("%Y-%m-%d %H:%M")
    );
    let body_indent = format!("{INDENT}{INDENT}");
    for segment in comment.segments() {
        match segment {
            Segment::Text { content } => {
                for para in content.split("\n\n").filter(|p| !p.trim().is_empty()) {
                    wrap_into(out, para.trim(), &body_indent, width);
                }
            }
            Segment::Code { language, content } => {
                let _ = writeln!(out, "{body_indent}```{language}");
                for line in content.lines() {
                    let _ = writeln!(out, "{body_indent}{line}");
                }
                let _ = writeln!(out, "{body_indent}```");
            }
        }
    }
    if let Some(analysis) = comment.analysis() {
        if let Some(status) = analysis.feedback_status.as_deref() {
            let _ = writeln!(out, "{body_indent}verdict: {status}");
        }
        if let Some(explanation) = analysis.feedback_explanation.as_deref() {
            wrap_into(out, &format!("why: {explanation}"), &body_indent, width);
        }
        if let Some(suggestion) = analysis.feedback_suggestion.as_deref() {
            wrap_into(out, &format!("suggestion: {suggestion}"), &body_indent, width);
        }
    }
}

pub fn render_thread(thread: &Thread, expanded: bool, width: usize) -> String {
    let mut out = String::new();
    let marker = if expanded { 'v' } else { '>' };
    let _ = writeln!(
        out,
        "{marker} #{} {} [{}] ({} comments, last activity {})",
        thread.id,
        thread.display_title(),
        thread.status,
        thread.comments.len(),
        thread.latest_activity().format("%Y-%m-%d %H:%M")
    );
    if expanded {
        for comment in &thread.comments {
            render_comment(&mut out, comment, width);
        }
    }
    out
}

/// The review page: issue summary followed by the discussion.
pub fn render_review(engine: &ConversationEngine, all_threads: bool, width: usize) -> String {
    let mut out = String::new();
    if let Some(review) = engine.review() {
        let _ = writeln!(
            out,
            "Review #{} [{}] created {}",
            review.id,
            review.status,
            review.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    match engine.aggregate() {
        Some(aggregate) => out.push_str(&render_aggregate(&aggregate, width)),
        None => out.push_str("no results yet\n"),
    }
    out.push('\n');
    if let Some(err) = engine.threads_error() {
        let _ = writeln!(out, "threads unavailable: {err}");
    }
    for thread in engine.threads() {
        let expanded = all_threads || engine.is_expanded(thread.id);
        out.push_str(&render_thread(thread, expanded, width));
    }
    out
}

pub fn render_triggered(triggered: &TriggeredReview) -> String {
    let mut out = String::new();
    let headline = if triggered.already_exists {
        "Review already exists"
    } else {
        "Review requested"
    };
    match triggered.review_id {
        Some(id) => {
            let _ = write!(out, "{headline}: #{id}");
        }
        None => out.push_str(headline),
    }
    if let Some(status) = triggered.status.as_deref() {
        let _ = write!(out, " [{status}]");
    }
    out.push('\n');
    if let Some(detail) = triggered.detail.as_deref() {
        let _ = writeln!(out, "{INDENT}{detail}");
    }
    out
}
