//! `hunter-cli` – interactive front end for the project memory store.
//!
//! On start-up the binary:
//!
//! 1. Initialises tracing (console, optional JSON, optional OTLP export).
//! 2. Loads `~/.hunter/config.toml`, writing the defaults on first run.
//! 3. Opens the configured experience store and seeds rules into an empty
//!    rule table.
//! 4. Probes the local Ollama instance for the embedding model.
//! 5. Drops the user into a REPL (`/search`, `/remember`, `/ingest`, ...).
//!
//! Ctrl-C cancels the root token, which aborts in-flight work and ends the
//! REPL.

mod config;
mod ollama;
mod repl;
mod telemetry;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use hunter_memory::{MemoryService, open_store};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ollama::OllamaEmbedder;

fn main() -> ExitCode {
    let _guard = telemetry::init_tracing("hunter");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_ctrlc.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not cancel running commands");
    }

    let result = runtime.block_on(run(cfg, shutdown));
    // A pending stdin read would otherwise block runtime teardown.
    runtime.shutdown_background();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: config::Config, shutdown: CancellationToken) -> Result<(), String> {
    config::ensure_database_dir(&cfg)?;
    let store = open_store(&cfg.store_config())
        .map_err(|e| format!("Failed to open store at {}: {}", cfg.database_path, e))?;
    println!(
        "  Memory store: {} ({})",
        cfg.database_path.bold(),
        store.backend().to_string().cyan()
    );

    match store.seed_rules(&cfg.rules, &shutdown).await {
        Ok(0) => {}
        Ok(n) => println!("  Seeded {} project rule(s).", n),
        Err(e) => warn!(error = %e, "rule seeding failed"),
    }

    let client = reqwest::Client::new();
    print!("\n  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    std::io::stdout().flush().ok();
    let embedder_ready = match ollama::fetch_models(&client, &cfg.ollama_url).await {
        Ok(models) if ollama::has_model(&models, &cfg.embedding_model) => {
            println!("{} (embedding model {})", "online".green(), cfg.embedding_model.bold());
            true
        }
        Ok(_) => {
            println!("{}", "online".green());
            println!(
                "  {}  Run `{}` to enable search and ingestion.",
                format!("Model {} not found.", cfg.embedding_model).yellow(),
                format!("ollama pull {}", cfg.embedding_model).bold()
            );
            false
        }
        Err(e) => {
            println!("{}", "offline".yellow());
            info!(error = %e, "embedding server unavailable");
            println!(
                "  {}  Run `{}` to enable search and ingestion.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
            false
        }
    };

    let mut service = MemoryService::new(Arc::clone(&store))
        .with_search_limit(cfg.search_limit)
        .with_policy(cfg.ingest_policy());
    if embedder_ready {
        service = service.with_embedder(Arc::new(OllamaEmbedder::with_client(
            client,
            cfg.ollama_url.clone(),
            cfg.embedding_model.clone(),
        )));
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&service, shutdown).await;

    store.close();
    info!("memory store closed");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// First run
// ─────────────────────────────────────────────────────────────────────────────

fn first_run() -> config::Config {
    println!();
    println!("  No configuration found. Writing defaults.");
    let mut cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}", "hunter".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Project memory for coding assistants");
    println!();
}
