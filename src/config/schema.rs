//! Operator-controlled vetting policy.
//!
//! Loaded once per run and immutable thereafter. Every knob has a default so
//! an empty config file (or none at all) yields the stock policy.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ── Vetting policy ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VettingConfig {
    /// Network calls tolerated before each extra call adds a penalty.
    pub max_network_calls: usize,
    /// Hostnames a skill may contact: exact (`api.example.com`) or
    /// wildcard (`*.example.com`).
    pub allowed_hosts: Vec<String>,
    /// When false, obfuscation criticals alone no longer force a BLOCK
    /// (they still count toward the score).
    pub block_obfuscation: bool,
    /// Missing author escalates from INFO to WARNING.
    pub require_author: bool,
    /// Score at or above which the recommendation is BLOCK.
    pub max_risk_score: u32,
    pub typosquat_check: bool,
    /// Reference names typosquats are measured against.
    pub typosquat_targets: Vec<String>,
    /// Case-insensitive author deny-list.
    pub blocked_authors: Vec<String>,
    /// Package names blocked in addition to the built-in malicious list.
    pub blocked_packages: Vec<String>,
    /// Dependency-name prefixes that warrant a warning.
    pub suspicious_prefixes: Vec<String>,
    pub lifecycle_policy: LifecyclePolicy,
    /// Files larger than this are checksummed but not analyzed.
    pub max_file_bytes: u64,
    pub scoring: ScoringConfig,
}

impl Default for VettingConfig {
    fn default() -> Self {
        Self {
            max_network_calls: default_max_network_calls(),
            allowed_hosts: Vec::new(),
            block_obfuscation: true,
            require_author: true,
            max_risk_score: default_max_risk_score(),
            typosquat_check: true,
            typosquat_targets: Vec::new(),
            blocked_authors: Vec::new(),
            blocked_packages: Vec::new(),
            suspicious_prefixes: Vec::new(),
            lifecycle_policy: LifecyclePolicy::Flag,
            max_file_bytes: default_max_file_bytes(),
            scoring: ScoringConfig::default(),
        }
    }
}

fn default_max_network_calls() -> usize {
    3
}

fn default_max_risk_score() -> u32 {
    60
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl VettingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_risk_score == 0 || self.max_risk_score > 100 {
            return Err(ConfigError::Validation(format!(
                "max_risk_score must be in 1..=100, got {}",
                self.max_risk_score
            ))
            .into());
        }
        if self.max_file_bytes == 0 {
            return Err(
                ConfigError::Validation("max_file_bytes must be positive".into()).into(),
            );
        }
        self.scoring.validate()
    }
}

// ── Lifecycle-script policy ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePolicy {
    /// No findings for declared lifecycle scripts.
    Allow,
    /// `postinstall` is critical, the rest are warnings.
    #[default]
    Flag,
    /// Every declared lifecycle script is critical.
    Deny,
}

// ── Scoring constants ────────────────────────────────────────────────────────

/// Severity bases and penalties. The defaults are load-bearing for
/// compatibility; they are configuration, not derived quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub critical_base: f64,
    pub warning_base: f64,
    pub info_base: f64,
    /// Added per network call whose host is not allow-listed.
    pub disallowed_call_penalty: f64,
    /// Added per network call beyond `max_network_calls`.
    pub over_budget_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            critical_base: 25.0,
            warning_base: 10.0,
            info_base: 2.0,
            disallowed_call_penalty: 15.0,
            over_budget_penalty: 5.0,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        let bases = [
            ("critical_base", self.critical_base),
            ("warning_base", self.warning_base),
            ("info_base", self.info_base),
            ("disallowed_call_penalty", self.disallowed_call_penalty),
            ("over_budget_penalty", self.over_budget_penalty),
        ];
        for (name, value) in bases {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "scoring.{name} must be a non-negative number, got {value}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        VettingConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn defaults_preserved() {
        let config = VettingConfig::default();
        assert_eq!(config.max_network_calls, 3);
        assert_eq!(config.max_risk_score, 60);
        assert!(config.block_obfuscation);
        assert!(config.require_author);
        assert_eq!(config.lifecycle_policy, LifecyclePolicy::Flag);

        let scoring = config.scoring;
        assert!((scoring.critical_base - 25.0).abs() < f64::EPSILON);
        assert!((scoring.warning_base - 10.0).abs() < f64::EPSILON);
        assert!((scoring.info_base - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: VettingConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(config.max_risk_score, 60);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: VettingConfig = toml::from_str(
            r#"
            max_risk_score = 40
            allowed_hosts = ["api.example.com", "*.internal.dev"]
            lifecycle_policy = "deny"

            [scoring]
            critical_base = 30.0
            "#,
        )
        .expect("partial config parses");

        assert_eq!(config.max_risk_score, 40);
        assert_eq!(config.allowed_hosts.len(), 2);
        assert_eq!(config.lifecycle_policy, LifecyclePolicy::Deny);
        assert!((config.scoring.critical_base - 30.0).abs() < f64::EPSILON);
        // untouched knobs keep defaults
        assert_eq!(config.max_network_calls, 3);
        assert!((config.scoring.warning_base - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_score_rejected() {
        let config = VettingConfig {
            max_risk_score: 101,
            ..VettingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_scoring_base_rejected() {
        let mut config = VettingConfig::default();
        config.scoring.warning_base = -1.0;
        assert!(config.validate().is_err());
    }
}
