//! REPL – Read-Eval-Print Loop for the MachGuard operator console.
//!
//! Any line that does not start with `/` is a machine command and goes
//! through the gatekeeper in standard mode.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /state           – print the live telemetry
//!   /admin <command> – run a command through the override pipeline
//!   /import <file>   – merge a key/value telemetry export
//!   /audit [n]       – show the last `n` audit records (default 10)
//!   /config          – show the active configuration
//!   /quit | /exit    – gracefully exit the CLI

use colored::{ColoredString, Colorize};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use machguard_runtime::{Gatekeeper, Mode};
use machguard_types::{Decision, Severity, StateField, TelemetryState, Verdict};
use tokio::runtime::Runtime;

use crate::config::Config;

const DEFAULT_AUDIT_ROWS: usize = 10;

/// One parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command<'a> {
    Help,
    State,
    Admin(&'a str),
    Import(&'a str),
    Audit(usize),
    Config,
    Quit,
    Submit(&'a str),
    /// A slash-command that is unknown or missing its argument.
    Invalid(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if !line.starts_with('/') {
            return Command::Submit(line);
        }
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match (head, rest) {
            ("/help", _) => Command::Help,
            ("/state", _) => Command::State,
            ("/config", _) => Command::Config,
            ("/quit" | "/exit", _) => Command::Quit,
            ("/admin", cmd) if !cmd.is_empty() => Command::Admin(cmd),
            ("/import", path) if !path.is_empty() => Command::Import(path),
            ("/audit", "") => Command::Audit(DEFAULT_AUDIT_ROWS),
            ("/audit", n) => n.parse().map(Command::Audit).unwrap_or(Command::Invalid(line)),
            _ => Command::Invalid(line),
        }
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(rt: &Runtime, gatekeeper: &Gatekeeper, cfg: &Config, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "machguard>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Command::Help => cmd_help(),
            Command::State => cmd_state(gatekeeper),
            Command::Admin(text) => cmd_submit(rt, gatekeeper, text, Mode::Admin),
            Command::Submit(text) => cmd_submit(rt, gatekeeper, text, Mode::Standard),
            Command::Import(path) => cmd_import(gatekeeper, path),
            Command::Audit(n) => cmd_audit(gatekeeper, n),
            Command::Config => println!("{:#?}", cfg),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Invalid(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown or incomplete command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "MachGuard Commands".bold().underline());
    println!("  {}  – e.g. 'set rpm 1500 absolute' or 'raise the spindle speed by 10%'", "<command>".bold().cyan());
    println!("  {}           – print the live telemetry", "/state".bold().cyan());
    println!("  {} – validate with the override pipeline", "/admin <command>".bold().cyan());
    println!("  {}   – merge a key/value telemetry export", "/import <file>".bold().cyan());
    println!("  {}       – recent audit records", "/audit [n]".bold().cyan());
    println!("  {}          – show the active configuration", "/config".bold().cyan());
    println!("  {}    – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_submit(rt: &Runtime, gatekeeper: &Gatekeeper, text: &str, mode: Mode) {
    if mode == Mode::Admin {
        println!("{}", "  Override pipeline: physical limits will not block.".yellow());
    }
    let verdict = rt.block_on(gatekeeper.submit(text, mode));
    print_verdict(&verdict);

    let reaction = rt.block_on(gatekeeper.react(text, &verdict));
    if let Some(operator) = reaction.operator {
        println!("  {} {}", "operator:".dimmed(), operator);
    }
    if let Some(machine) = reaction.machine {
        println!("  {} {}", "machine: ".dimmed(), machine.italic());
    }
    println!();
}

fn cmd_state(gatekeeper: &Gatekeeper) {
    let snapshot = gatekeeper.store().snapshot();
    println!("{} (version {})", "Live Telemetry".bold().underline(), snapshot.version);
    for (name, value) in state_rows(&snapshot.state) {
        println!("  {:<22} {}", name, value);
    }
}

fn cmd_import(gatekeeper: &Gatekeeper, path: &str) {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            println!("{} {}: {}", "Cannot read".red(), path.yellow(), e);
            return;
        }
    };
    match gatekeeper.import(&text) {
        Ok(version) => println!(
            "{} {} (telemetry version {})",
            "✓ Imported".green(),
            path.bold(),
            version
        ),
        Err(e) => println!("{}: {}", "Import rejected".red(), e),
    }
}

fn cmd_audit(gatekeeper: &Gatekeeper, limit: usize) {
    let records = match gatekeeper.audit().recent(limit) {
        Ok(r) => r,
        Err(e) => {
            println!("{}: {}", "Audit log error".red(), e);
            return;
        }
    };
    if records.is_empty() {
        println!("  {}", "No transactions recorded yet.".dimmed());
        return;
    }
    println!("{}", "Recent Transactions".bold().underline());
    for r in records {
        println!(
            "  {} {} {}",
            r.timestamp.format("%H:%M:%S").to_string().dimmed(),
            decision_tag(r.decision),
            r.input_text
        );
        if let Some(summary) = r.reasoning_summary {
            println!("      {}", summary.dimmed());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

fn print_verdict(verdict: &Verdict) {
    println!(
        "  {}  risk {:.2} (semantic {:.2}, physical {:.2})",
        decision_tag(verdict.decision),
        verdict.risk_score,
        verdict.semantic_risk,
        verdict.physical_risk
    );
    if let Some(reason) = &verdict.reason {
        println!("  {}", reason.bold());
    }
    for command in &verdict.normalized_commands {
        println!("  {} {}", "→".dimmed(), command);
    }
    for entry in &verdict.logs {
        if entry.severity != Severity::Info {
            println!("  {} {}", severity_tag(entry.severity), entry.message);
        }
    }
}

fn decision_tag(decision: Decision) -> ColoredString {
    match decision {
        Decision::Authorized => decision.as_str().green().bold(),
        Decision::Denied => decision.as_str().red().bold(),
        Decision::Filtered => decision.as_str().magenta().bold(),
    }
}

fn severity_tag(severity: Severity) -> ColoredString {
    match severity {
        Severity::Info => "[INFO]".dimmed(),
        Severity::Normalization => "[NORMALIZATION]".cyan(),
        Severity::Warning => "[WARNING]".yellow(),
        Severity::Block => "[BLOCK]".red(),
        Severity::Critical => "[CRITICAL]".red().bold(),
    }
}

/// `(label, value)` pairs for every field of `state`, switches as on/off.
fn state_rows(state: &TelemetryState) -> Vec<(&'static str, String)> {
    let mut rows: Vec<_> = StateField::ALL
        .iter()
        .map(|&field| {
            let value = state.get(field);
            let shown = if field.is_switch() {
                if value != 0.0 { "on".to_string() } else { "off".to_string() }
            } else {
                format!("{value:.1}")
            };
            (field.name(), shown)
        })
        .collect();
    rows.push(("hazard_detected", state.hazard_detected.as_str().to_string()));
    rows.push(("health", state.health.as_str().to_string()));
    rows
}
