//! Risk scoring — fuses findings and network activity into one number,
//! a level, and a recommendation.

use crate::config::{ScoringConfig, VettingConfig};
use crate::report::{Category, Finding, NetworkCall, Recommendation, Severity};

/// Scores above this trigger a REVIEW recommendation.
const REVIEW_THRESHOLD: u32 = 20;

fn severity_base(scoring: &ScoringConfig, severity: Severity) -> f64 {
    match severity {
        Severity::Critical => scoring.critical_base,
        Severity::Warning => scoring.warning_base,
        Severity::Info => scoring.info_base,
    }
}

/// Aggregate risk score, saturating into [0, 100].
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn compute_score(
    findings: &[Finding],
    network_calls: &[NetworkCall],
    config: &VettingConfig,
) -> u32 {
    let scoring = &config.scoring;

    let mut total: f64 = findings
        .iter()
        .map(|f| f.category.weight() * severity_base(scoring, f.severity))
        .sum();

    let disallowed = network_calls.iter().filter(|c| !c.allowed).count();
    total += disallowed as f64 * scoring.disallowed_call_penalty;

    let over_budget = network_calls.len().saturating_sub(config.max_network_calls);
    total += over_budget as f64 * scoring.over_budget_penalty;

    total.clamp(0.0, 100.0).round() as u32
}

/// Policy verdict. A critical finding blocks outright, except that
/// obfuscation-only criticals respect the `block_obfuscation` toggle.
#[must_use]
pub fn recommend(findings: &[Finding], score: u32, config: &VettingConfig) -> Recommendation {
    let blocking_critical = findings.iter().any(|f| {
        f.severity == Severity::Critical
            && (config.block_obfuscation || f.category != Category::CodeObfuscation)
    });

    if blocking_critical || score >= config.max_risk_score {
        Recommendation::Block
    } else if score > REVIEW_THRESHOLD {
        Recommendation::Review
    } else {
        Recommendation::Install
    }
}
