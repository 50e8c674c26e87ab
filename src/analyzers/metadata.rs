//! Metadata and provenance checks over the parsed skill descriptor.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::VettingConfig;
use crate::manifest::SkillDescriptor;
use crate::report::{Category, Finding, Severity};
use crate::utils::text::levenshtein;

/// Capability strings that hand a skill the keys to the host.
const DANGEROUS_PERMISSIONS: &[&str] = &[
    "*",
    "all",
    "filesystem:*",
    "fs:*",
    "fs:write:*",
    "network:*",
    "net:*",
    "shell",
    "shell:*",
    "exec",
    "system:*",
    "credentials",
    "credentials:*",
    "env:*",
];

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").expect("semver regex")
});

#[must_use]
pub fn analyze(descriptor: &SkillDescriptor, file: &Path, config: &VettingConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    if descriptor.name.is_none() {
        findings.push(Finding::new(
            Severity::Warning,
            Category::DependencyRisk,
            "descriptor declares no skill name",
            file,
        ));
    }

    match &descriptor.author {
        None => {
            let severity = if config.require_author {
                Severity::Warning
            } else {
                Severity::Info
            };
            findings.push(Finding::new(
                severity,
                Category::DependencyRisk,
                "skill declares no author",
                file,
            ));
        }
        Some(author) => {
            if config
                .blocked_authors
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(author))
            {
                findings.push(
                    Finding::new(
                        Severity::Critical,
                        Category::DependencyRisk,
                        "author is on the operator block-list",
                        file,
                    )
                    .with_evidence(author),
                );
            }
        }
    }

    if config.typosquat_check
        && let Some(name) = &descriptor.name
    {
        let lower = name.to_lowercase();
        for target in &config.typosquat_targets {
            let target_lower = target.to_lowercase();
            if target_lower == lower {
                continue;
            }
            // distance >2 is not a plausible typo
            let severity = match levenshtein(&lower, &target_lower) {
                1 => Severity::Critical,
                2 => Severity::Warning,
                _ => continue,
            };
            findings.push(
                Finding::new(
                    severity,
                    Category::TypoSquatting,
                    format!("skill name is confusable with {target}"),
                    file,
                )
                .with_evidence(&format!("{name} vs {target}"))
                .with_reference("CWE-1007"),
            );
        }
    }

    for permission in &descriptor.permissions {
        let lower = permission.to_lowercase();
        if DANGEROUS_PERMISSIONS.contains(&lower.as_str()) {
            findings.push(
                Finding::new(
                    Severity::Critical,
                    Category::PermissionRisk,
                    format!("declares an all-access permission: {permission}"),
                    file,
                )
                .with_evidence(permission)
                .with_reference("CWE-250"),
            );
        }
    }

    if let Some(version) = &descriptor.version
        && !SEMVER_RE.is_match(version)
    {
        findings.push(
            Finding::new(
                Severity::Info,
                Category::DependencyRisk,
                "version string is not semantic-version-like",
                file,
            )
            .with_evidence(version),
        );
    }

    findings
}
