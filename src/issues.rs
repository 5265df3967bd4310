//! Per-file merge of the three issue collections an AI review produces.
//!
//! A review report carries `final` (critical issues, ratings, summary),
//! `syntax` and `standards` sections, each a list of per-file entries that
//! the backend builds independently. [`aggregate`] joins them on the file
//! path so a view can show one record per file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::null_as_default;

/// `review_data.final_result` as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    #[serde(default, deserialize_with = "null_as_default")]
    pub review: ReviewSections,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSections {
    #[serde(default, rename = "final", deserialize_with = "null_as_default")]
    pub final_files: Vec<FinalFile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub syntax: Vec<SyntaxFile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub standards: Vec<StandardsFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalFile {
    pub file: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub critical_issues: Vec<String>,
    #[serde(default, deserialize_with = "ratings")]
    pub ratings: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxFile {
    pub file: String,
    #[serde(default)]
    pub issues: Option<Vec<SyntaxIssue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardsFile {
    pub file: String,
    #[serde(default)]
    pub issues: Option<Vec<StandardsIssue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardsIssue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(default, deserialize_with = "null_as_default")]
    pub standard: String,
}

/// Where an issue sits in its file. The model emits either a bare line
/// number or free text such as `"12-14"`; anything else is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Line(u64),
    Text(String),
    Other(serde_json::Value),
}

impl Default for Location {
    fn default() -> Self {
        Location::Text(String::new())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line(n) => write!(f, "{n}"),
            Location::Text(s) => f.write_str(s),
            Location::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Ratings the model left out come back as `null`; those are dropped.
fn ratings<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<f64>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| Some((name, value?)))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingBand {
    Poor,
    Fair,
    Good,
}

impl RatingBand {
    pub fn of(value: f64) -> Self {
        if value < 5.0 {
            RatingBand::Poor
        } else if value < 7.0 {
            RatingBand::Fair
        } else {
            RatingBand::Good
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileIssueRecord {
    pub file: String,
    pub summary: Option<String>,
    pub critical: Vec<String>,
    pub syntax: Vec<SyntaxIssue>,
    pub standards: Vec<StandardsIssue>,
    pub ratings: BTreeMap<String, f64>,
}

impl FileIssueRecord {
    pub fn total_issues(&self) -> usize {
        self.critical.len() + self.syntax.len() + self.standards.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalFile {
    pub file: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueAggregate {
    pub files: Vec<FileIssueRecord>,
    pub critical_count: usize,
    pub syntax_count: usize,
    pub standards_count: usize,
    pub files_with_critical: Vec<CriticalFile>,
}

impl IssueAggregate {
    pub fn file(&self, path: &str) -> Option<&FileIssueRecord> {
        self.files.iter().find(|r| r.file == path)
    }
}

impl ReviewReport {
    pub fn aggregate(&self) -> IssueAggregate {
        aggregate(
            &self.review.final_files,
            &self.review.syntax,
            &self.review.standards,
        )
    }
}

/// Joins the three collections on the exact file path.
///
/// `final_files` decides which files appear and in which order. Syntax and
/// standards entries for files it does not list still count towards the
/// summary totals but produce no record. When a path appears more than once
/// in a secondary collection, the first entry wins.
pub fn aggregate(
    final_files: &[FinalFile],
    syntax_files: &[SyntaxFile],
    standards_files: &[StandardsFile],
) -> IssueAggregate {
    let mut syntax_by_file: HashMap<&str, &[SyntaxIssue]> = HashMap::new();
    for entry in syntax_files {
        syntax_by_file
            .entry(entry.file.as_str())
            .or_insert_with(|| entry.issues.as_deref().unwrap_or_default());
    }
    let mut standards_by_file: HashMap<&str, &[StandardsIssue]> = HashMap::new();
    for entry in standards_files {
        standards_by_file
            .entry(entry.file.as_str())
            .or_insert_with(|| entry.issues.as_deref().unwrap_or_default());
    }

    let files: Vec<FileIssueRecord> = final_files
        .iter()
        .map(|f| FileIssueRecord {
            file: f.file.clone(),
            summary: f.summary.clone(),
            critical: f.critical_issues.clone(),
            syntax: syntax_by_file
                .get(f.file.as_str())
                .map(|issues| issues.to_vec())
                .unwrap_or_default(),
            standards: standards_by_file
                .get(f.file.as_str())
                .map(|issues| issues.to_vec())
                .unwrap_or_default(),
            ratings: f.ratings.clone(),
        })
        .collect();

    let files_with_critical = files
        .iter()
        .filter(|r| !r.critical.is_empty())
        .map(|r| CriticalFile {
            file: r.file.clone(),
            count: r.critical.len(),
        })
        .collect();

    IssueAggregate {
        critical_count: final_files.iter().map(|f| f.critical_issues.len()).sum(),
        syntax_count: syntax_files
            .iter()
            .map(|f| f.issues.as_ref().map_or(0, Vec::len))
            .sum(),
        standards_count: standards_files
            .iter()
            .map(|f| f.issues.as_ref().map_or(0, Vec::len))
            .sum(),
        files,
        files_with_critical,
    }
}
