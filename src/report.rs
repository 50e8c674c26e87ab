//! Report data model — findings, categories, risk levels, the final report.
//!
//! Everything here is immutable once constructed: analyzers create findings,
//! the engine aggregates them, nothing mutates them afterwards.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::text::{collapse_whitespace, finding_id, truncate_with_ellipsis};

/// Evidence snippets are clipped to this many characters.
pub const MAX_EVIDENCE_CHARS: usize = 80;

// ── Severity ─────────────────────────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

// ── Category ─────────────────────────────────────────────────────────────────

/// Closed set of finding categories. Each carries a fixed scoring weight used
/// only during aggregation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    PromptInjection,
    CodeObfuscation,
    NetworkRisk,
    PermissionRisk,
    DependencyRisk,
    TypoSquatting,
    PathTraversal,
    ShellInjection,
}

impl Category {
    /// Scoring weight, in the closed range [0.5, 1.5].
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::PromptInjection | Self::ShellInjection => 1.5,
            Self::CodeObfuscation => 1.3,
            Self::DependencyRisk | Self::PathTraversal => 1.2,
            Self::TypoSquatting => 1.1,
            Self::NetworkRisk | Self::PermissionRisk => 1.0,
        }
    }
}

// ── Finding ──────────────────────────────────────────────────────────────────

/// One detected issue. Created by an analyzer, consumed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Random short id, kept stable for the lifetime of the report.
    pub id: String,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Path relative to the skill root.
    pub file: PathBuf,
    /// 1-based source line, when known.
    pub line: Option<usize>,
    /// Whitespace-collapsed snippet, at most [`MAX_EVIDENCE_CHARS`] chars.
    pub evidence: Option<String>,
    /// External weakness-classification id, e.g. a CWE.
    pub reference: Option<String>,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: Category,
        message: impl Into<String>,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: finding_id(),
            severity,
            category,
            message: message.into(),
            file: file.into(),
            line: None,
            evidence: None,
            reference: None,
        }
    }

    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach an evidence snippet, collapsed and clipped.
    #[must_use]
    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = Some(truncate_with_ellipsis(
            &collapse_whitespace(evidence),
            MAX_EVIDENCE_CHARS,
        ));
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Dedup key: findings agreeing on all four fields are duplicates.
    #[must_use]
    pub fn dedup_key(&self) -> (Category, &str, &Path, Option<usize>) {
        (self.category, self.message.as_str(), &self.file, self.line)
    }
}

// ── Network calls ────────────────────────────────────────────────────────────

/// A literal URL argument handed to a network-issuing call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkCall {
    pub url: String,
    pub file: PathBuf,
    pub line: Option<usize>,
    /// Whether the host matched the configured allow-list.
    pub allowed: bool,
}

// ── Risk level / recommendation ──────────────────────────────────────────────

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed step function of the aggregate score.
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => Self::Safe,
            1..20 => Self::Low,
            20..40 => Self::Medium,
            40..70 => Self::High,
            _ => Self::Critical,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Install,
    Review,
    Block,
}

// ── Report ───────────────────────────────────────────────────────────────────

/// Aggregate facts about the scanned bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Author present and not on the operator block-list.
    pub author_verified: bool,
    /// Manifest declares at least one runtime or dev dependency.
    pub has_external_deps: bool,
    pub network_calls: Vec<NetworkCall>,
    pub file_count: usize,
    pub total_lines: usize,
    /// SHA-256 over the sorted (relative path, content) pairs.
    pub checksum: String,
}

/// The sole output artifact of a vetting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettingReport {
    pub skill_name: String,
    /// Saturating aggregate in [0, 100].
    pub score: u32,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    pub metadata: ReportMetadata,
    pub recommendation: Recommendation,
    pub generated_at: DateTime<Utc>,
    pub engine_version: String,
}

impl VettingReport {
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == Severity::Critical)
    }
}
