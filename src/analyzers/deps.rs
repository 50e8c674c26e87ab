//! Dependency analysis of the parsed package manifest.

use std::path::Path;

use crate::config::{LifecyclePolicy, VettingConfig};
use crate::manifest::PackageManifest;
use crate::report::{Category, Finding, Severity};

/// Packages with documented supply-chain compromises. Merged with the
/// operator block-list at scan time.
const KNOWN_MALICIOUS_PACKAGES: &[&str] = &[
    "event-stream",
    "flatmap-stream",
    "eslint-scope",
    "getcookies",
    "ua-parser-js",
    "coa",
    "rc",
    "node-ipc",
];

/// Version specifiers whose provenance cannot be verified against a registry.
const UNVERIFIABLE_SPEC_PREFIXES: &[&str] = &[
    "git+",
    "git://",
    "github:",
    "http://",
    "https://",
    "ssh://",
    "file:",
    "link:",
];

/// Scripts a package manager runs automatically, ordered by execution stage.
const LIFECYCLE_SCRIPTS: &[&str] = &["preinstall", "install", "postinstall", "prepare"];

#[must_use]
pub fn analyze(manifest: &PackageManifest, file: &Path, config: &VettingConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (name, spec) in manifest.merged_dependencies() {
        let lower = name.to_lowercase();

        let blocked = KNOWN_MALICIOUS_PACKAGES.contains(&lower.as_str())
            || config
                .blocked_packages
                .iter()
                .any(|b| b.eq_ignore_ascii_case(&name));
        if blocked {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    Category::DependencyRisk,
                    format!("known-malicious package dependency: {name}"),
                    file,
                )
                .with_evidence(&format!("{name}@{spec}"))
                .with_reference("CWE-506"),
            );
            continue;
        }

        if config
            .suspicious_prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
        {
            findings.push(
                Finding::new(
                    Severity::Warning,
                    Category::DependencyRisk,
                    format!("dependency name matches a suspicious prefix: {name}"),
                    file,
                )
                .with_evidence(&format!("{name}@{spec}")),
            );
        }

        if UNVERIFIABLE_SPEC_PREFIXES.iter().any(|p| spec.starts_with(p)) {
            findings.push(
                Finding::new(
                    Severity::Warning,
                    Category::DependencyRisk,
                    format!("dependency version cannot be provenance-verified: {name}"),
                    file,
                )
                .with_evidence(&spec)
                .with_reference("CWE-829"),
            );
        }
    }

    if config.lifecycle_policy != LifecyclePolicy::Allow {
        for &script in LIFECYCLE_SCRIPTS {
            let Some(body) = manifest.scripts.get(script) else {
                continue;
            };
            // postinstall runs after the package tree is fully materialized,
            // which is where real-world payloads land.
            let severity = match config.lifecycle_policy {
                LifecyclePolicy::Deny => Severity::Critical,
                _ if script == "postinstall" => Severity::Critical,
                _ => Severity::Warning,
            };
            findings.push(
                Finding::new(
                    severity,
                    Category::DependencyRisk,
                    format!("lifecycle script {script} runs automatically on install"),
                    file,
                )
                .with_evidence(body)
                .with_reference("CWE-829"),
            );
        }
    }

    findings
}
