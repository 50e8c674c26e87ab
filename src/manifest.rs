//! Manifest and descriptor parsing.
//!
//! Both files are untrusted input: every field is optional at parse time and
//! validated by the analyzers. Parse failures are values, not errors — the
//! engine turns them into findings.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Dependency descriptor file name.
pub const MANIFEST_FILE: &str = "package.json";
/// Skill descriptor file name, front-matter delimited by `---`.
pub const DESCRIPTOR_FILE: &str = "SKILL.md";

const FRONT_MATTER_MARKER: &str = "---";

// ── Package manifest ─────────────────────────────────────────────────────────

/// Parsed `package.json`. `BTreeMap` keeps dependency iteration and therefore
/// finding order deterministic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Runtime and dev dependencies merged; runtime wins on duplicates.
    #[must_use]
    pub fn merged_dependencies(&self) -> BTreeMap<String, String> {
        let mut merged = self.dev_dependencies.clone();
        for (name, spec) in &self.dependencies {
            merged.insert(name.clone(), spec.clone());
        }
        merged
    }

    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty() || !self.dev_dependencies.is_empty()
    }
}

// ── Skill descriptor ─────────────────────────────────────────────────────────

/// Metadata block of a `SKILL.md`. A missing `name` is a finding downstream,
/// never a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub permissions: Vec<String>,
    pub tools: Vec<String>,
}

/// Tagged outcome of front-matter parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontMatter {
    Parsed(SkillDescriptor),
    /// No opening marker at the top of the file.
    Missing,
    Malformed(String),
}

/// Parse the leading `---` fenced block of a descriptor file.
///
/// Supports the YAML subset the descriptor format actually uses: scalar
/// `key: value` pairs, flow sequences (`[a, b]`), and block sequences
/// (`- item`). A full YAML crate would accept far more than the format
/// allows.
#[must_use]
pub fn parse_front_matter(text: &str) -> FrontMatter {
    let mut lines = text.lines();

    match lines.next() {
        Some(first) if first.trim_end() == FRONT_MATTER_MARKER => {}
        _ => return FrontMatter::Missing,
    }

    let mut descriptor = SkillDescriptor::default();
    let mut list_key: Option<String> = None;
    let mut terminated = false;

    for line in lines {
        let trimmed = line.trim();
        if trimmed == FRONT_MATTER_MARKER {
            terminated = true;
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            let Some(key) = &list_key else {
                return FrontMatter::Malformed(format!("list item without a key: {trimmed}"));
            };
            push_list_item(&mut descriptor, key, unquote(item));
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            return FrontMatter::Malformed(format!("expected `key: value`, got: {trimmed}"));
        };
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return FrontMatter::Malformed(format!("invalid key: {key}"));
        }
        let value = value.trim();

        if value.is_empty() {
            list_key = Some(key.to_string());
            continue;
        }
        list_key = None;

        if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            for item in inner.split(',') {
                let item = unquote(item.trim());
                if !item.is_empty() {
                    push_list_item(&mut descriptor, key, item);
                }
            }
            continue;
        }

        set_scalar(&mut descriptor, key, unquote(value));
    }

    if terminated {
        FrontMatter::Parsed(descriptor)
    } else {
        FrontMatter::Malformed("unterminated front-matter block".into())
    }
}

fn set_scalar(descriptor: &mut SkillDescriptor, key: &str, value: String) {
    match key {
        "name" => descriptor.name = Some(value),
        "version" => descriptor.version = Some(value),
        "author" => descriptor.author = Some(value),
        // single scalar where a sequence is expected — accept it as one entry
        "permissions" => descriptor.permissions.push(value),
        "tools" => descriptor.tools.push(value),
        _ => {}
    }
}

fn push_list_item(descriptor: &mut SkillDescriptor, key: &str, value: String) {
    match key {
        "permissions" => descriptor.permissions.push(value),
        "tools" => descriptor.tools.push(value),
        _ => {}
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(s)
        .to_string()
}
