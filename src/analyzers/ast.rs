//! Structural analysis of JS/TS sources over tree-sitter syntax trees.
//!
//! Rules are data records in an ordered table: a tree query, capture filters
//! evaluated in Rust, and finding metadata. Adding a rule is a table edit.
//! A rule whose query does not compile for a dialect (dialect-specific node
//! shapes) is skipped for that dialect — expected, not an error.

use std::path::Path;
use std::sync::OnceLock;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, QueryMatch};

use crate::report::{Category, Finding, Severity};

// ── Dialects ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Dialect {
    const ALL: [Self; 3] = [Self::JavaScript, Self::TypeScript, Self::Tsx];

    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            _ => None,
        }
    }

    fn language(self) -> Language {
        match self {
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }
}

// ── Rule table ───────────────────────────────────────────────────────────────

/// Capture filter applied to a query match. All filters on a rule must pass.
#[derive(Debug, Clone, Copy)]
enum Check {
    /// Capture text equals one of the listed names.
    OneOf(&'static str, &'static [&'static str]),
    /// Capture text contains one of the listed fragments.
    ContainsAny(&'static str, &'static [&'static str]),
}

struct StructuralRule {
    name: &'static str,
    category: Category,
    severity: Severity,
    message: &'static str,
    reference: Option<&'static str>,
    query: &'static str,
    /// Capture whose node supplies the evidence span.
    evidence: &'static str,
    checks: &'static [Check],
}

/// Names that bracket-notation indirection must not reach as string literals.
const INDIRECTION_NAMES: &[&str] = &[
    "eval",
    "exec",
    "execSync",
    "spawn",
    "spawnSync",
    "Function",
    "require",
    "child_process",
];

const PROCESS_MODULES: &[&str] = &["child_process", "node:child_process"];

const INTERACTIVE_SHELLS: &[&str] = &[
    "sh",
    "bash",
    "zsh",
    "dash",
    "fish",
    "/bin/sh",
    "/bin/bash",
    "cmd.exe",
    "powershell",
    "powershell.exe",
];

static STRUCTURAL_RULES: &[StructuralRule] = &[
    StructuralRule {
        name: "call-eval",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "dynamic code execution via eval",
        reference: Some("CWE-95"),
        query: "(call_expression function: (identifier) @callee) @call",
        evidence: "call",
        checks: &[Check::OneOf("callee", &["eval"])],
    },
    StructuralRule {
        name: "function-constructor",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "dynamic function construction from strings",
        reference: Some("CWE-95"),
        query: "(new_expression constructor: (identifier) @callee) @call\n\
                (call_expression function: (identifier) @callee) @call",
        evidence: "call",
        checks: &[Check::OneOf("callee", &["Function"])],
    },
    StructuralRule {
        name: "vm-run-context",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "compiles and runs code in a fresh context",
        reference: Some("CWE-94"),
        query: "(call_expression function: (member_expression object: (identifier) @obj property: (property_identifier) @method)) @call",
        evidence: "call",
        checks: &[
            Check::OneOf("obj", &["vm"]),
            Check::OneOf(
                "method",
                &[
                    "runInNewContext",
                    "runInThisContext",
                    "runInContext",
                    "compileFunction",
                    "createScript",
                ],
            ),
        ],
    },
    StructuralRule {
        name: "vm-script-new",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "constructs a compile-and-run script object",
        reference: Some("CWE-94"),
        query: "(new_expression constructor: (member_expression object: (identifier) @obj property: (property_identifier) @method)) @call",
        evidence: "call",
        checks: &[
            Check::OneOf("obj", &["vm"]),
            Check::OneOf("method", &["Script", "SourceTextModule"]),
        ],
    },
    StructuralRule {
        name: "bracket-indirection",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "dangerous name reached through bracket notation",
        reference: Some("CWE-95"),
        query: "(subscript_expression index: (string (string_fragment) @name)) @expr",
        evidence: "expr",
        checks: &[Check::OneOf("name", INDIRECTION_NAMES)],
    },
    StructuralRule {
        name: "shell-exec-literal",
        category: Category::ShellInjection,
        severity: Severity::Critical,
        message: "shell command executed from a literal string",
        reference: Some("CWE-78"),
        query: "(call_expression function: (identifier) @callee arguments: (arguments . (string) @cmd)) @call\n\
                (call_expression function: (member_expression property: (property_identifier) @callee) arguments: (arguments . (string) @cmd)) @call",
        evidence: "call",
        checks: &[Check::OneOf("callee", &["exec", "execFile"])],
    },
    StructuralRule {
        name: "shell-exec-sync",
        category: Category::ShellInjection,
        severity: Severity::Warning,
        message: "synchronous shell invocation",
        reference: Some("CWE-78"),
        query: "(call_expression function: [(identifier) @callee (member_expression property: (property_identifier) @callee)]) @call",
        evidence: "call",
        checks: &[Check::OneOf("callee", &["execSync", "execFileSync"])],
    },
    StructuralRule {
        name: "process-module-require",
        category: Category::ShellInjection,
        severity: Severity::Warning,
        message: "imports a process-spawning module",
        reference: Some("CWE-78"),
        query: "(call_expression function: (identifier) @fn arguments: (arguments . (string (string_fragment) @module))) @call",
        evidence: "call",
        checks: &[
            Check::OneOf("fn", &["require"]),
            Check::OneOf("module", PROCESS_MODULES),
        ],
    },
    StructuralRule {
        name: "process-module-import",
        category: Category::ShellInjection,
        severity: Severity::Warning,
        message: "imports a process-spawning module",
        reference: Some("CWE-78"),
        query: "(import_statement source: (string (string_fragment) @module)) @stmt",
        evidence: "stmt",
        checks: &[Check::OneOf("module", PROCESS_MODULES)],
    },
    StructuralRule {
        name: "interactive-shell-spawn",
        category: Category::ShellInjection,
        severity: Severity::Critical,
        message: "spawns an interactive shell",
        reference: Some("CWE-78"),
        query: "(call_expression function: [(identifier) @callee (member_expression property: (property_identifier) @callee)] arguments: (arguments . (string (string_fragment) @cmd))) @call",
        evidence: "call",
        checks: &[
            Check::OneOf("callee", &["spawn", "spawnSync", "exec", "execSync"]),
            Check::OneOf("cmd", INTERACTIVE_SHELLS),
        ],
    },
    StructuralRule {
        name: "dynamic-require",
        category: Category::CodeObfuscation,
        severity: Severity::Warning,
        message: "require target is not a string literal and cannot be statically verified",
        reference: Some("CWE-829"),
        query: "(call_expression function: (identifier) @fn arguments: (arguments . [(identifier) (member_expression) (subscript_expression) (binary_expression) (template_string) (call_expression)] @arg)) @call",
        evidence: "call",
        checks: &[Check::OneOf("fn", &["require"])],
    },
    StructuralRule {
        name: "dynamic-import",
        category: Category::CodeObfuscation,
        severity: Severity::Warning,
        message: "import target is not a string literal and cannot be statically verified",
        reference: Some("CWE-829"),
        query: "(call_expression function: (import) arguments: (arguments . [(identifier) (member_expression) (subscript_expression) (binary_expression) (template_string) (call_expression)] @arg)) @call",
        evidence: "call",
        checks: &[],
    },
    StructuralRule {
        name: "env-read",
        category: Category::PermissionRisk,
        severity: Severity::Info,
        message: "reads process environment variables",
        reference: Some("CWE-526"),
        query: "(member_expression object: (identifier) @obj property: (property_identifier) @prop) @expr",
        evidence: "expr",
        checks: &[Check::OneOf("obj", &["process"]), Check::OneOf("prop", &["env"])],
    },
    StructuralRule {
        name: "persistence-install",
        category: Category::PermissionRisk,
        severity: Severity::Critical,
        message: "command installs OS-level persistence",
        reference: None,
        query: "(call_expression arguments: (arguments (string (string_fragment) @cmd))) @call",
        evidence: "call",
        checks: &[Check::ContainsAny(
            "cmd",
            &[
                "crontab",
                "systemctl enable",
                "launchctl load",
                "schtasks",
                "update-rc.d",
                "chkconfig",
            ],
        )],
    },
    StructuralRule {
        name: "prototype-root-assignment",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "assignment to a prototype-chain root property",
        reference: Some("CWE-1321"),
        query: "(assignment_expression left: (member_expression) @target) @expr",
        evidence: "expr",
        checks: &[Check::ContainsAny(
            "target",
            &["__proto__", "Object.prototype", "constructor.prototype"],
        )],
    },
    // TypeScript-only node shape; does not compile for plain JavaScript and
    // is skipped there.
    StructuralRule {
        name: "cast-alias-eval",
        category: Category::CodeObfuscation,
        severity: Severity::Critical,
        message: "dynamic code execution through a type-cast alias",
        reference: Some("CWE-95"),
        query: "(call_expression function: (parenthesized_expression (as_expression (identifier) @callee))) @call",
        evidence: "call",
        checks: &[Check::OneOf("callee", &["eval", "Function"])],
    },
];

// ── Network-call extraction ──────────────────────────────────────────────────

struct NetworkRule {
    query: &'static str,
    checks: &'static [Check],
}

static NETWORK_RULES: &[NetworkRule] = &[
    NetworkRule {
        query: "(call_expression function: (identifier) @callee arguments: (arguments . (string (string_fragment) @url))) @call",
        checks: &[Check::OneOf("callee", &["fetch", "got", "request"])],
    },
    NetworkRule {
        query: "(call_expression function: (member_expression object: (identifier) @obj property: (property_identifier) @method) arguments: (arguments . (string (string_fragment) @url))) @call",
        checks: &[Check::OneOf(
            "obj",
            &["axios", "http", "https", "got", "superagent"],
        )],
    },
];

/// A literal URL argument found in a network-issuing call. The engine decides
/// whether its host is allowed.
#[derive(Debug, Clone)]
pub struct LiteralNetworkCall {
    pub url: String,
    pub line: usize,
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct AstAnalysis {
    pub findings: Vec<Finding>,
    pub network_calls: Vec<LiteralNetworkCall>,
}

struct CompiledRule {
    rule: &'static StructuralRule,
    query: Query,
}

struct CompiledNetworkRule {
    rule: &'static NetworkRule,
    query: Query,
}

struct DialectRules {
    dialect: Dialect,
    language: Language,
    rules: Vec<CompiledRule>,
    network: Vec<CompiledNetworkRule>,
}

/// Holds the compiled grammar queries for every dialect. Construction is the
/// expensive part and happens once per process via [`AstAnalyzer::shared`].
pub struct AstAnalyzer {
    dialects: Vec<DialectRules>,
}

impl AstAnalyzer {
    /// Process-wide analyzer instance. Idempotent: repeated calls return the
    /// same compiled rule set.
    pub fn shared() -> &'static Self {
        static ANALYZER: OnceLock<AstAnalyzer> = OnceLock::new();
        ANALYZER.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        let dialects = Dialect::ALL
            .into_iter()
            .map(|dialect| {
                let language = dialect.language();
                let rules = STRUCTURAL_RULES
                    .iter()
                    .filter_map(|rule| match Query::new(&language, rule.query) {
                        Ok(query) => Some(CompiledRule { rule, query }),
                        Err(e) => {
                            tracing::debug!(
                                "rule {} unavailable for {}: {e}",
                                rule.name,
                                dialect.label()
                            );
                            None
                        }
                    })
                    .collect();
                let network = NETWORK_RULES
                    .iter()
                    .filter_map(|rule| match Query::new(&language, rule.query) {
                        Ok(query) => Some(CompiledNetworkRule { rule, query }),
                        Err(e) => {
                            tracing::debug!(
                                "network query unavailable for {}: {e}",
                                dialect.label()
                            );
                            None
                        }
                    })
                    .collect();
                DialectRules {
                    dialect,
                    language,
                    rules,
                    network,
                }
            })
            .collect();
        Self { dialects }
    }

    /// Evaluate the rule table against one file. A file that fails to parse
    /// yields an empty analysis; the caller still runs the pattern analyzer.
    #[must_use]
    pub fn analyze(&self, source: &str, file: &Path, dialect: Dialect) -> AstAnalysis {
        let Some(set) = self.dialects.iter().find(|d| d.dialect == dialect) else {
            return AstAnalysis::default();
        };

        let mut parser = Parser::new();
        if parser.set_language(&set.language).is_err() {
            return AstAnalysis::default();
        }
        let Some(tree) = parser.parse(source, None) else {
            tracing::debug!("parse failed for {}", file.display());
            return AstAnalysis::default();
        };
        let root = tree.root_node();
        let bytes = source.as_bytes();

        let mut findings = Vec::new();
        for compiled in &set.rules {
            let mut cursor = QueryCursor::new();
            let mut matches = cursor.matches(&compiled.query, root, bytes);
            while let Some(m) = matches.next() {
                if !checks_pass(&compiled.query, m, bytes, compiled.rule.checks) {
                    continue;
                }
                let Some(node) = capture_node(&compiled.query, m, compiled.rule.evidence) else {
                    continue;
                };
                let snippet = node.utf8_text(bytes).unwrap_or_default();
                let mut finding = Finding::new(
                    compiled.rule.severity,
                    compiled.rule.category,
                    compiled.rule.message,
                    file,
                )
                .with_line(node.start_position().row + 1)
                .with_evidence(snippet);
                if let Some(reference) = compiled.rule.reference {
                    finding = finding.with_reference(reference);
                }
                findings.push(finding);
            }
        }

        let mut network_calls = Vec::new();
        for compiled in &set.network {
            let mut cursor = QueryCursor::new();
            let mut matches = cursor.matches(&compiled.query, root, bytes);
            while let Some(m) = matches.next() {
                if !checks_pass(&compiled.query, m, bytes, compiled.rule.checks) {
                    continue;
                }
                let Some(node) = capture_node(&compiled.query, m, "url") else {
                    continue;
                };
                let url = node.utf8_text(bytes).unwrap_or_default();
                // Only literal http/https targets are reported; computed or
                // templated URLs are intentionally not resolved.
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    continue;
                }
                network_calls.push(LiteralNetworkCall {
                    url: url.to_string(),
                    line: node.start_position().row + 1,
                });
            }
        }

        AstAnalysis {
            findings,
            network_calls,
        }
    }
}

fn capture_node<'t>(query: &Query, m: &QueryMatch<'_, 't>, name: &str) -> Option<Node<'t>> {
    let index = query.capture_index_for_name(name)?;
    m.captures.iter().find(|c| c.index == index).map(|c| c.node)
}

fn capture_text<'s>(
    query: &Query,
    m: &QueryMatch<'_, '_>,
    bytes: &'s [u8],
    name: &str,
) -> Option<&'s str> {
    capture_node(query, m, name).and_then(|node| node.utf8_text(bytes).ok())
}

fn checks_pass(query: &Query, m: &QueryMatch<'_, '_>, bytes: &[u8], checks: &[Check]) -> bool {
    checks.iter().all(|check| match check {
        Check::OneOf(capture, names) => {
            capture_text(query, m, bytes, capture).is_some_and(|text| names.contains(&text))
        }
        Check::ContainsAny(capture, fragments) => capture_text(query, m, bytes, capture)
            .is_some_and(|text| fragments.iter().any(|f| text.contains(f))),
    })
}
