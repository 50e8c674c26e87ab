//! Command surface — thin rendering and exit-code mapping around the engine.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;

use crate::config;
use crate::engine::VettingEngine;
use crate::report::{Recommendation, Severity, VettingReport};

#[derive(Parser)]
#[command(
    name = "skillvet",
    version,
    about = "Offline static vetting for agent skill bundles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Vet a skill bundle directory and print the report.
    Vet {
        /// Path to the skill root directory.
        path: String,

        /// Policy file (TOML). Defaults to the per-user config when present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Emit the report as JSON instead of formatted text.
        #[arg(long)]
        json: bool,

        /// Ask for confirmation instead of failing on a REVIEW verdict.
        #[arg(long)]
        interactive: bool,
    },
}

/// Exit codes: 0 install, 1 review (unconfirmed), 2 block.
pub fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Vet {
            path,
            config,
            json,
            interactive,
        } => {
            let policy = config::load(config.as_deref())?;
            let root = PathBuf::from(shellexpand::tilde(&path).into_owned());

            let engine = VettingEngine::new(policy);
            let report = engine.vet_skill(&root)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render(&report);
            }

            let code = match report.recommendation {
                Recommendation::Install => 0,
                Recommendation::Review => {
                    if interactive && confirm_review(&report)? {
                        0
                    } else {
                        1
                    }
                }
                Recommendation::Block => 2,
            };
            Ok(code)
        }
    }
}

fn confirm_review(report: &VettingReport) -> Result<bool> {
    let accepted = dialoguer::Confirm::new()
        .with_prompt(format!(
            "{} scored {}/100 — install anyway?",
            report.skill_name, report.score
        ))
        .default(false)
        .interact()?;
    Ok(accepted)
}

fn render(report: &VettingReport) {
    println!("Skill:          {}", style(&report.skill_name).bold());
    println!(
        "Risk:           {}/100 ({})",
        report.score, report.risk_level
    );
    let verdict = match report.recommendation {
        Recommendation::Install => style("INSTALL").green(),
        Recommendation::Review => style("REVIEW").yellow(),
        Recommendation::Block => style("BLOCK").red(),
    };
    println!("Recommendation: {verdict}");
    println!(
        "Files:          {} ({} lines)",
        report.metadata.file_count, report.metadata.total_lines
    );
    println!("Checksum:       sha256:{}", report.metadata.checksum);

    if !report.metadata.network_calls.is_empty() {
        let disallowed = report
            .metadata
            .network_calls
            .iter()
            .filter(|c| !c.allowed)
            .count();
        println!(
            "Network calls:  {} ({disallowed} outside allow-list)",
            report.metadata.network_calls.len()
        );
    }

    if report.findings.is_empty() {
        println!("\n{}", style("No findings.").green());
        return;
    }

    println!("\nFindings ({}):", report.findings.len());
    for finding in &report.findings {
        let severity = match finding.severity {
            Severity::Critical => style("CRITICAL").red().bold(),
            Severity::Warning => style("WARNING ").yellow(),
            Severity::Info => style("INFO    ").dim(),
        };
        let location = finding.line.map_or_else(
            || finding.file.display().to_string(),
            |line| format!("{}:{line}", finding.file.display()),
        );
        println!(
            "  [{severity}] {} {} — {}",
            finding.category,
            style(location).cyan(),
            finding.message
        );
        if let Some(evidence) = &finding.evidence {
            println!("             {}", style(evidence).dim());
        }
    }
}
