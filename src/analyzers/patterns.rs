//! Heuristic text analysis for threats invisible to structural parsing.
//!
//! Four families: natural-language prompt injection, escape-encoded spellings
//! of dangerous names, credential-store path references, and homoglyph
//! identifier spoofing. Plain-identifier eval/exec/spawn detection is owned by
//! the structural analyzer and deliberately absent here.
//!
//! Lines are scanned comment-aware: block and line comments are stripped
//! (commented-out examples must not trigger findings) while string literal
//! content is always kept (threats hiding in string data must).

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::report::{Category, Finding, Severity};

/// Names whose disguised spellings are worth a finding.
const DANGEROUS_NAMES: &[&str] = &["eval", "exec", "Function", "spawn", "fetch", "require"];

// ── Rule families ────────────────────────────────────────────────────────────

const PROMPT_INJECTION_PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "disregard previous instructions",
    "disregard your training",
    "forget your instructions",
    "override your instructions",
    "you are now a",
    "pretend you are",
    "act as the system",
    "system prompt:",
    "<|im_start|>",
    "<|endoftext|>",
    "[inst]",
    "{{system_prompt}}",
    "{{ system_prompt }}",
];

const CREDENTIAL_PATHS: &[&str] = &[
    ".ssh/id_rsa",
    ".ssh/id_ed25519",
    ".ssh/id_ecdsa",
    ".ssh/authorized_keys",
    ".aws/credentials",
    ".config/gcloud",
    ".azure/accessTokens",
    ".kube/config",
    ".docker/config.json",
    ".netrc",
    ".npmrc",
    "security find-generic-password",
    "libsecret",
    "wincred",
];

const TRAVERSAL_PATTERNS: &[&str] = &["../../", "..\\..\\", "/etc/passwd", "/etc/shadow"];

static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\u\{?([0-9a-fA-F]{4})\}?|\\x([0-9a-fA-F]{2})").expect("escape regex")
});

/// ASCII word characters plus the Cyrillic block, the confusable range the
/// homoglyph scan covers.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Za-z_\x{0400}-\x{04FF}]+").expect("token regex"));

// ── Entry point ──────────────────────────────────────────────────────────────

/// Scan one file's raw text. Line numbers are 1-based.
#[must_use]
pub fn analyze(source: &str, file: &Path) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut scanner = LineScanner::default();

    for (idx, raw_line) in source.lines().enumerate() {
        let line_no = idx + 1;

        let sanitized = scanner.sanitize(raw_line);
        if !sanitized.trim().is_empty() {
            check_prompt_injection(&sanitized, file, line_no, &mut findings);
            check_encoded_evasion(&sanitized, file, line_no, &mut findings);
            check_credential_paths(&sanitized, file, line_no, &mut findings);
            check_traversal(&sanitized, file, line_no, &mut findings);
        }

        // The homoglyph scan runs over the unstripped line: a spoofed
        // identifier inside a comment is still worth surfacing.
        check_homoglyphs(raw_line, file, line_no, &mut findings);
    }

    findings
}

fn check_prompt_injection(line: &str, file: &Path, line_no: usize, out: &mut Vec<Finding>) {
    let lowered = line.to_lowercase();
    if PROMPT_INJECTION_PATTERNS.iter().any(|p| lowered.contains(p)) {
        out.push(
            Finding::new(
                Severity::Critical,
                Category::PromptInjection,
                "text attempts to override agent instructions",
                file,
            )
            .with_line(line_no)
            .with_evidence(line.trim()),
        );
    }
}

fn check_encoded_evasion(line: &str, file: &Path, line_no: usize, out: &mut Vec<Finding>) {
    if !line.contains('\\') {
        return;
    }
    let decoded = decode_escapes(line);
    if decoded == line {
        return;
    }
    for name in DANGEROUS_NAMES {
        if decoded.contains(name) && !line.contains(name) {
            out.push(
                Finding::new(
                    Severity::Critical,
                    Category::CodeObfuscation,
                    format!("escape-encoded spelling of {name}"),
                    file,
                )
                .with_line(line_no)
                .with_evidence(line.trim())
                .with_reference("CWE-116"),
            );
            return;
        }
    }
}

fn check_credential_paths(line: &str, file: &Path, line_no: usize, out: &mut Vec<Finding>) {
    if CREDENTIAL_PATHS.iter().any(|p| line.contains(p)) {
        out.push(
            Finding::new(
                Severity::Critical,
                Category::PermissionRisk,
                "references a credential store path",
                file,
            )
            .with_line(line_no)
            .with_evidence(line.trim())
            .with_reference("CWE-522"),
        );
    }
}

fn check_traversal(line: &str, file: &Path, line_no: usize, out: &mut Vec<Finding>) {
    if TRAVERSAL_PATTERNS.iter().any(|p| line.contains(p)) {
        out.push(
            Finding::new(
                Severity::Warning,
                Category::PathTraversal,
                "path traversal sequence in source text",
                file,
            )
            .with_line(line_no)
            .with_evidence(line.trim())
            .with_reference("CWE-22"),
        );
    }
}

fn check_homoglyphs(line: &str, file: &Path, line_no: usize, out: &mut Vec<Finding>) {
    if line.is_ascii() {
        return;
    }
    for token in TOKEN_RE.find_iter(line) {
        let token = token.as_str();
        if token.is_ascii() {
            continue;
        }
        let normalized: String = token
            .chars()
            .map(|c| confusable_to_ascii(c).unwrap_or(c))
            .collect();
        if normalized != token
            && DANGEROUS_NAMES
                .iter()
                .any(|name| normalized.eq_ignore_ascii_case(name))
        {
            out.push(
                Finding::new(
                    Severity::Critical,
                    Category::CodeObfuscation,
                    "homoglyph-spoofed dangerous identifier",
                    file,
                )
                .with_line(line_no)
                .with_evidence(&format!("{token} renders like {normalized}"))
                .with_reference("CWE-1007"),
            );
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn decode_escapes(line: &str) -> String {
    ESCAPE_RE
        .replace_all(line, |caps: &regex::Captures<'_>| {
            let hex = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Cyrillic letters visually indistinguishable from ASCII.
fn confusable_to_ascii(c: char) -> Option<char> {
    let mapped = match c {
        'а' => 'a',
        'е' => 'e',
        'о' => 'o',
        'р' => 'p',
        'с' => 'c',
        'у' => 'y',
        'х' => 'x',
        'і' => 'i',
        'ѕ' => 's',
        'ј' => 'j',
        'һ' => 'h',
        'А' => 'A',
        'В' => 'B',
        'Е' => 'E',
        'К' => 'K',
        'М' => 'M',
        'Н' => 'H',
        'О' => 'O',
        'Р' => 'P',
        'С' => 'C',
        'Т' => 'T',
        'У' => 'Y',
        'Х' => 'X',
        'Ѕ' => 'S',
        'І' => 'I',
        'Ј' => 'J',
        _ => return None,
    };
    Some(mapped)
}

/// Per-line sanitizer. Block-comment state carries across lines; string
/// literal content passes through untouched.
#[derive(Default)]
struct LineScanner {
    in_block_comment: bool,
}

impl LineScanner {
    fn sanitize(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();
        let mut in_string: Option<char> = None;
        let mut escaped = false;

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }

            if let Some(quote) = in_string {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }

            match c {
                '\'' | '"' | '`' => {
                    in_string = Some(c);
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                _ => out.push(c),
            }
        }

        out
    }
}
