use std::path::PathBuf;

use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `SkillVet`.
///
/// Analyzers never fail for "found something bad" — that is a finding, not an
/// error. Only structurally impossible inputs and configuration problems
/// surface here; the binary wraps everything else through `anyhow`.
#[derive(Debug, Error)]
pub enum VetError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Engine ───────────────────────────────────────────────────────────
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Engine errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("skill root is not a directory: {0}")]
    InvalidRoot(PathBuf),

    #[error("skill root is not accessible: {path}: {source}")]
    RootAccess {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, VetError>;
