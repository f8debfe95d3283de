//! Plane issue definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue priority.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Wire name, as Plane expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::None => "none",
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Capitalized name for human-readable listings.
    pub fn title(&self) -> &'static str {
        match self {
            Priority::None => "None",
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expanded workflow state attached to an issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateDetail {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// A Plane issue (work item) as returned by the REST API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub id: String,
    pub name: String,
    /// Per-project sequence number, the numeric half of an issue code
    pub sequence_id: u64,
    #[serde(default)]
    pub priority: Priority,
    /// UUID of the current workflow state
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_detail: Option<StateDetail>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Issue {
    /// Name of the current state, falling back when the API did not expand it.
    pub fn state_name(&self) -> &str {
        self.state_detail
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("Unknown State")
    }
}

/// A parsed display code such as `CLT-37`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCode {
    /// Project identifier part (`CLT`)
    pub project: String,
    /// Sequence part (`37`)
    pub sequence_id: u64,
}

impl IssueCode {
    /// Parse `LETTERS-DIGITS` from the start of `code`.
    ///
    /// Trailing text after the digits is ignored, so `CLT-37: fix login`
    /// still resolves to `CLT-37`.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        let letters_end = code
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(code.len());
        if letters_end == 0 {
            return None;
        }
        let rest = code[letters_end..].strip_prefix('-')?;
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return None;
        }
        let sequence_id = rest[..digits_end].parse().ok()?;
        Some(Self {
            project: code[..letters_end].to_string(),
            sequence_id,
        })
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.project, self.sequence_id)
    }
}
