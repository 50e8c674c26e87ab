//! Vetting engine — composes the analyzers over a collected skill bundle and
//! fuses their findings into one report.
//!
//! Per-file analysis is a pure function of file content and config, so it
//! fans out across a bounded worker pool; results are re-merged in collection
//! order so concurrency can never change finding order, dedup, or checksum.

pub mod scoring;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::analyzers::ast::{AstAnalyzer, Dialect, LiteralNetworkCall};
use crate::analyzers::{deps, metadata, patterns};
use crate::collector::{self, CollectedFile, FileAccess, OsFs};
use crate::config::VettingConfig;
use crate::error::{EngineError, Result};
use crate::manifest::{
    self, DESCRIPTOR_FILE, FrontMatter, MANIFEST_FILE, PackageManifest, SkillDescriptor,
};
use crate::report::{
    Category, Finding, NetworkCall, ReportMetadata, RiskLevel, Severity, VettingReport,
};

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct VettingEngine {
    config: VettingConfig,
    fs: Box<dyn FileAccess>,
    ast: &'static AstAnalyzer,
}

struct LoadedFile {
    relative: PathBuf,
    bytes: Vec<u8>,
    /// Present when the content is valid UTF-8.
    text: Option<String>,
}

struct WorkItem<'a> {
    index: usize,
    relative: &'a Path,
    text: &'a str,
    dialect: Option<Dialect>,
}

#[derive(Default)]
struct FileAnalysis {
    findings: Vec<Finding>,
    network_calls: Vec<LiteralNetworkCall>,
}

impl VettingEngine {
    pub fn new(config: VettingConfig) -> Self {
        Self::with_file_access(config, Box::new(OsFs))
    }

    pub fn with_file_access(config: VettingConfig, fs: Box<dyn FileAccess>) -> Self {
        Self {
            config,
            fs,
            ast: AstAnalyzer::shared(),
        }
    }

    /// Vet the bundle rooted at `root`. The only fatal failure is a root that
    /// is not an accessible directory; everything else becomes findings.
    pub fn vet_skill(&self, root: &Path) -> Result<VettingReport> {
        let meta = self.fs.stat(root).map_err(|source| EngineError::RootAccess {
            path: root.to_path_buf(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(EngineError::InvalidRoot(root.to_path_buf()).into());
        }

        let collected = collector::collect_files(self.fs.as_ref(), root);
        let loaded = self.load(collected);

        let mut findings: Vec<Finding> = Vec::new();
        let mut network_calls: Vec<NetworkCall> = Vec::new();

        // Per-file analysis, fanned out and re-merged in collection order.
        let work = self.plan_work(&loaded);
        let analyses = self.analyze_files(&work);
        for (item, analysis) in work.iter().zip(analyses) {
            findings.extend(analysis.findings);
            for call in analysis.network_calls {
                let allowed = host_allowed(&call.url, &self.config.allowed_hosts);
                if !allowed {
                    findings.push(
                        Finding::new(
                            Severity::Warning,
                            Category::NetworkRisk,
                            format!("network call to non-allow-listed host: {}", call.url),
                            item.relative,
                        )
                        .with_line(call.line)
                        .with_evidence(&call.url),
                    );
                }
                network_calls.push(NetworkCall {
                    url: call.url,
                    file: item.relative.to_path_buf(),
                    line: Some(call.line),
                    allowed,
                });
            }
        }

        // Manifest(s): every package.json in the bundle.
        let mut has_external_deps = false;
        for file in &loaded {
            if file.relative.file_name().is_none_or(|n| n != MANIFEST_FILE) {
                continue;
            }
            let parsed = file
                .text
                .as_deref()
                .ok_or_else(|| "not valid UTF-8".to_string())
                .and_then(|text| PackageManifest::parse(text).map_err(|e| e.to_string()));
            match parsed {
                Ok(parsed) => {
                    has_external_deps = has_external_deps || parsed.has_dependencies();
                    findings.extend(deps::analyze(&parsed, &file.relative, &self.config));
                }
                Err(e) => {
                    findings.push(Finding::new(
                        Severity::Warning,
                        Category::DependencyRisk,
                        format!("manifest cannot be parsed: {e}"),
                        &file.relative,
                    ));
                }
            }
        }

        // Descriptor: the root SKILL.md front-matter.
        let descriptor_path = PathBuf::from(DESCRIPTOR_FILE);
        let mut descriptor = SkillDescriptor::default();
        let descriptor_file = loaded
            .iter()
            .find(|f| f.relative.as_path() == Path::new(DESCRIPTOR_FILE));
        match descriptor_file {
            None => findings.push(Finding::new(
                Severity::Warning,
                Category::DependencyRisk,
                "skill bundle has no descriptor file",
                &descriptor_path,
            )),
            Some(file) => match file.text.as_deref().map(manifest::parse_front_matter) {
                Some(FrontMatter::Parsed(parsed)) => descriptor = parsed,
                Some(FrontMatter::Missing) => findings.push(Finding::new(
                    Severity::Warning,
                    Category::DependencyRisk,
                    "descriptor has no front-matter block",
                    &descriptor_path,
                )),
                Some(FrontMatter::Malformed(e)) => findings.push(Finding::new(
                    Severity::Warning,
                    Category::DependencyRisk,
                    format!("descriptor front-matter is malformed: {e}"),
                    &descriptor_path,
                )),
                None => findings.push(Finding::new(
                    Severity::Warning,
                    Category::DependencyRisk,
                    "descriptor is not valid UTF-8",
                    &descriptor_path,
                )),
            },
        }
        findings.extend(metadata::analyze(&descriptor, &descriptor_path, &self.config));

        let findings = dedup(findings);

        let file_count = loaded.len();
        let total_lines = loaded
            .iter()
            .filter_map(|f| f.text.as_ref())
            .map(|t| t.lines().count())
            .sum();
        let checksum = checksum(&loaded);

        let score = scoring::compute_score(&findings, &network_calls, &self.config);
        let recommendation = scoring::recommend(&findings, score, &self.config);

        let author_verified = descriptor.author.as_ref().is_some_and(|author| {
            !self
                .config
                .blocked_authors
                .iter()
                .any(|blocked| blocked.eq_ignore_ascii_case(author))
        });

        let skill_name = descriptor.name.clone().unwrap_or_else(|| {
            root.file_name()
                .map_or_else(|| "unnamed-skill".to_string(), |n| n.to_string_lossy().into_owned())
        });

        Ok(VettingReport {
            skill_name,
            score,
            risk_level: RiskLevel::from_score(score),
            findings,
            metadata: ReportMetadata {
                author_verified,
                has_external_deps,
                network_calls,
                file_count,
                total_lines,
                checksum,
            },
            recommendation,
            generated_at: Utc::now(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    fn load(&self, collected: Vec<CollectedFile>) -> Vec<LoadedFile> {
        collected
            .into_iter()
            .filter_map(|file| match self.fs.read_file(&file.path) {
                Ok(bytes) => {
                    let text = std::str::from_utf8(&bytes).ok().map(str::to_owned);
                    Some(LoadedFile {
                        relative: file.relative,
                        bytes,
                        text,
                    })
                }
                Err(e) => {
                    tracing::debug!("skipping unreadable file {}: {e}", file.path.display());
                    None
                }
            })
            .collect()
    }

    /// Text files that get per-file analysis. The manifest is handled by the
    /// dependency analyzer instead; oversized files are checksummed only.
    fn plan_work<'a>(&self, loaded: &'a [LoadedFile]) -> Vec<WorkItem<'a>> {
        loaded
            .iter()
            .enumerate()
            .filter_map(|(index, file)| {
                let text = file.text.as_deref()?;
                if file.relative.file_name().is_some_and(|n| n == MANIFEST_FILE) {
                    return None;
                }
                if file.bytes.len() as u64 > self.config.max_file_bytes {
                    tracing::debug!(
                        "skipping analysis of oversized file {} ({} bytes)",
                        file.relative.display(),
                        file.bytes.len()
                    );
                    return None;
                }
                Some(WorkItem {
                    index,
                    relative: &file.relative,
                    text,
                    dialect: Dialect::from_path(&file.relative),
                })
            })
            .collect()
    }

    fn analyze_files(&self, work: &[WorkItem<'_>]) -> Vec<FileAnalysis> {
        if work.is_empty() {
            return Vec::new();
        }

        let workers = worker_count(work.len());
        let chunk_size = work.len().div_ceil(workers);
        let ast = self.ast;

        let mut results: Vec<(usize, FileAnalysis)> = std::thread::scope(|scope| {
            let handles: Vec<_> = work
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|item| {
                                let mut analysis = FileAnalysis::default();
                                if let Some(dialect) = item.dialect {
                                    let out = ast.analyze(item.text, item.relative, dialect);
                                    analysis.findings = out.findings;
                                    analysis.network_calls = out.network_calls;
                                }
                                analysis
                                    .findings
                                    .extend(patterns::analyze(item.text, item.relative));
                                (item.index, analysis)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_default())
                .collect()
        });

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, analysis)| analysis).collect()
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn worker_count(total: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).max(1).min(total)
}

/// First occurrence wins; relative order otherwise preserved.
fn dedup(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(Category, String, PathBuf, Option<usize>)> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.category, f.message.clone(), f.file.clone(), f.line)))
        .collect()
}

/// SHA-256 over relative-path-sorted (path, content) pairs. Paths are joined
/// with `/` regardless of platform so the digest is machine-independent.
fn checksum(files: &[LoadedFile]) -> String {
    let mut sorted: Vec<&LoadedFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut hasher = Sha256::new();
    for file in sorted {
        let rel = file
            .relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&file.bytes);
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn host_allowed(url_str: &str, allowed_hosts: &[String]) -> bool {
    let Ok(parsed) = url::Url::parse(url_str) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    allowed_hosts.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        match entry.strip_prefix("*.") {
            Some(suffix) => host == suffix || host.ends_with(&format!(".{suffix}")),
            None => host == entry,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_allow_list_exact_match() {
        let hosts = vec!["api.example.com".to_string()];
        assert!(host_allowed("https://api.example.com/v1", &hosts));
        assert!(!host_allowed("https://evil.example.com/v1", &hosts));
        assert!(!host_allowed("https://api.example.com.evil.net/v1", &hosts));
    }

    #[test]
    fn host_allow_list_wildcard_match() {
        let hosts = vec!["*.example.com".to_string()];
        assert!(host_allowed("https://api.example.com/", &hosts));
        assert!(host_allowed("https://deep.api.example.com/", &hosts));
        assert!(host_allowed("https://example.com/", &hosts));
        assert!(!host_allowed("https://notexample.com/", &hosts));
    }

    #[test]
    fn unparseable_url_is_never_allowed() {
        let hosts = vec!["*.example.com".to_string()];
        assert!(!host_allowed("not a url", &hosts));
    }

    #[test]
    fn dedup_keeps_first_occurrence_and_order() {
        let a = Finding::new(Severity::Warning, Category::NetworkRisk, "dup", "a.js").with_line(1);
        let first_id = a.id.clone();
        let b = Finding::new(Severity::Warning, Category::NetworkRisk, "other", "a.js");
        let c = Finding::new(Severity::Warning, Category::NetworkRisk, "dup", "a.js").with_line(1);

        let deduped = dedup(vec![a, b, c]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, first_id);
        assert_eq!(deduped[0].message, "dup");
        assert_eq!(deduped[1].message, "other");
    }

    #[test]
    fn dedup_distinguishes_lines() {
        let a = Finding::new(Severity::Warning, Category::NetworkRisk, "dup", "a.js").with_line(1);
        let b = Finding::new(Severity::Warning, Category::NetworkRisk, "dup", "a.js").with_line(2);
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn checksum_is_order_independent() {
        let file_a = LoadedFile {
            relative: PathBuf::from("a.js"),
            bytes: b"aaa".to_vec(),
            text: None,
        };
        let file_b = LoadedFile {
            relative: PathBuf::from("b.js"),
            bytes: b"bbb".to_vec(),
            text: None,
        };
        let forward = checksum(&[
            LoadedFile {
                relative: file_a.relative.clone(),
                bytes: file_a.bytes.clone(),
                text: None,
            },
            LoadedFile {
                relative: file_b.relative.clone(),
                bytes: file_b.bytes.clone(),
                text: None,
            },
        ]);
        let reversed = checksum(&[file_b, file_a]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn checksum_changes_with_content_and_path() {
        let base = checksum(&[LoadedFile {
            relative: PathBuf::from("a.js"),
            bytes: b"aaa".to_vec(),
            text: None,
        }]);
        let renamed = checksum(&[LoadedFile {
            relative: PathBuf::from("b.js"),
            bytes: b"aaa".to_vec(),
            text: None,
        }]);
        let edited = checksum(&[LoadedFile {
            relative: PathBuf::from("a.js"),
            bytes: b"aab".to_vec(),
            text: None,
        }]);
        assert_ne!(base, renamed);
        assert_ne!(base, edited);
    }

    #[test]
    fn worker_count_is_bounded_by_work() {
        assert_eq!(worker_count(1), 1);
        assert!(worker_count(1000) >= 1);
    }
}
