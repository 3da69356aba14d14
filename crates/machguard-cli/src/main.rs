//! `machguard-cli` – MachGuard operator console
//!
//! This binary is the operator's entry point to the safety gatekeeper.  It:
//!
//! 1. Checks for `~/.machguard/config.toml`; runs a **First-Run Wizard** when
//!    the file is absent.
//! 2. Builds the [`Gatekeeper`]: live telemetry, the validation pipeline with
//!    the configured reasoning oracle, and the audit sink.
//! 3. Drops the operator into an **interactive REPL** where every plain line
//!    is a machine command and slash-commands inspect state and history.
//! 4. Intercepts **Ctrl-C** to engage the emergency stop in the live
//!    telemetry and exit.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use machguard_audit::{AuditSink, SqliteAuditLog};
use machguard_kernel::TelemetryStore;
use machguard_runtime::{Gatekeeper, SafetyPipeline};
use machguard_types::StateField;

fn main() {
    // RUST_LOG, MACHGUARD_LOG_FORMAT and OTEL_EXPORTER_OTLP_ENDPOINT are
    // honoured here.  Operator-facing output still uses println!.
    let _tracing = machguard_runtime::init_tracing("machguard");

    print_banner();

    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let gatekeeper = match build_gatekeeper(&cfg) {
        Ok(gk) => gk,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start gatekeeper".red(), e);
            std::process::exit(1);
        }
    };
    println!(
        "  Oracle: {}  timeout {} ms",
        cfg.oracle.to_string().bold(),
        cfg.oracle_timeout_ms
    );

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let store = gatekeeper.store().clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – engaging emergency stop …".yellow().bold());

        let mut stopped = (*store.current()).clone();
        stopped.set(StateField::EmergencyStop, 1.0);
        let version = store.replace(stopped);
        warn!(version, "emergency stop engaged by operator interrupt");

        println!("{}", "  ✓ Emergency stop engaged.".green());
        println!("{}", "  ✓ Exiting MachGuard.".green());

        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
    }

    println!();
    println!(
        "  Type a machine command (e.g. {}) or {} for a list of commands.\n",
        "set rpm 1500 absolute".bold(),
        "/help".bold().cyan()
    );

    repl::run(&runtime, &gatekeeper, &cfg, shutdown);
}

fn build_gatekeeper(cfg: &config::Config) -> Result<Gatekeeper, String> {
    let audit: Arc<dyn AuditSink> = match cfg.audit_path() {
        None => {
            let log = cfg.memory_audit();
            info!(capacity = ?log.capacity(), "in-memory audit log");
            Arc::new(log)
        }
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create audit directory: {}", e))?;
            }
            let log = SqliteAuditLog::open(&path.to_string_lossy())
                .map_err(|e| format!("Failed to open audit log at {}: {}", path.display(), e))?;
            info!(path = %path.display(), "audit log opened");
            Arc::new(log)
        }
    };

    let mut pipeline = SafetyPipeline::new(cfg.pipeline_config());
    if let Some(oracle) = cfg.build_oracle() {
        info!(oracle = oracle.name(), "reasoning oracle attached");
        pipeline = pipeline.with_oracle(oracle);
    }

    Ok(Gatekeeper::new(
        Arc::new(TelemetryStore::default()),
        Arc::new(pipeline),
        audit,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║     MachGuard First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up MachGuard.\n");

    let mut cfg = config::Config::default();

    println!("  Which reasoning oracle should back the context checks?");
    println!("    1) Local hazard rules  (default, offline)");
    println!("    2) Model server (OpenAI-compatible, e.g. Ollama)");
    println!("    3) None  (local scoring and physics only)");
    let choice = prompt_line("  Enter choice [1]: ", "1");
    cfg.oracle = match choice.trim() {
        "2" => config::OracleKind::Llm,
        "3" => config::OracleKind::None,
        _ => config::OracleKind::Rules,
    };

    if cfg.oracle == config::OracleKind::Llm {
        cfg.oracle_url = prompt_line(
            &format!("  Model server URL [{}]: ", cfg.oracle_url),
            &cfg.oracle_url,
        );
        cfg.model = prompt_line(&format!("  Model [{}]: ", cfg.model), &cfg.model);
    }

    let timeout = prompt_line(
        &format!("  Oracle timeout in ms [{}]: ", cfg.oracle_timeout_ms),
        &cfg.oracle_timeout_ms.to_string(),
    );
    if let Ok(ms) = timeout.trim().parse::<u64>() {
        cfg.oracle_timeout_ms = ms;
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___         __    _____                     __"#.bold().cyan());
    println!("{}", r#"  /  |/  /__ _____/ /   / ___/_ _____ ________ ___/ /"#.bold().cyan());
    println!("{}", r#" / /|_/ / _ `/ __/ _ \ / (_ / // / _ `/ __/ _ `/ _  / "#.bold().cyan());
    println!("{}", r#"/_/  /_/\_,_/\__/_//_/ \___/\_,_/\_,_/_/  \_,_/\_,_/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "MachGuard".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Safety gatekeeper for machine control commands");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
