//! `tsflow` – adapter session host
//!
//! This binary hosts one adapter session.  It:
//!
//! 1. Loads `~/.tsflow/config.toml` (or `$TSFLOW_CONFIG`), falling back to the
//!    built-in defaults; `tsflow init` writes those defaults to disk.
//! 2. Builds the input, action and output collections from the configured
//!    rows and groups them under one all-adapters collection.
//! 3. Initializes everything, lets the simulated input adapters publish, and
//!    consumes the fanned-in streams until every input reports processing
//!    complete.
//! 4. Intercepts **Ctrl-C** to stop the drivers and dispose the session.

mod config;
mod host;
mod telemetry;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

fn main() {
    let _telemetry = telemetry::init_tracing("tsflow");

    print_banner();

    if std::env::args().nth(1).as_deref() == Some("init") {
        write_default_config();
        return;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – stopping input adapters …".yellow().bold()
        );
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config found; using defaults.  Run `{}` to write them.",
                "tsflow init".bold()
            );
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let session = match host::Session::build(&cfg) {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Session error".red(), e);
            std::process::exit(1);
        }
    };

    let summary = session.run(&cfg, shutdown);
    print_summary(&summary);

    println!("\n  Adapters:");
    for row in cfg
        .input_adapters
        .iter()
        .chain(&cfg.action_adapters)
        .chain(&cfg.output_adapters)
    {
        match session.locate(&row.name) {
            Some(found) => println!("    • {found}"),
            None => println!("    • {} {}", row.name.bold(), "(not loaded)".dimmed()),
        }
    }

    session.dispose();
    info!("session disposed");
    println!("\n  {} Session closed.\n", "✓".green().bold());
}

fn write_default_config() {
    let path = config::config_path();
    match config::save_to(&config::Config::default(), &path) {
        Ok(()) => println!(
            "  {} Config saved to {}\n",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn print_summary(summary: &host::RunSummary) {
    println!();
    if summary.interrupted {
        println!("  {}", "Run interrupted.".yellow());
    }
    println!(
        "  Received {} batch(es), {} measurement(s); {} input(s) completed.",
        summary.batches.to_string().bold(),
        summary.measurements.to_string().bold(),
        summary.completions
    );
    for (name, batches) in &summary.per_adapter {
        println!("    {name}: {batches}");
    }
    if !summary.exceptions.is_empty() {
        println!("\n  {}", "Process exceptions:".red().bold());
        for e in &summary.exceptions {
            println!("    [{}] {}", e.origin.dimmed(), e.error);
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   __            ______             "#.bold().cyan());
    println!("{}", r#"  / /______    / __/ /___ _      __"#.bold().cyan());
    println!("{}", r#" / __/ ___/   / /_/ / __ \ | /| / /"#.bold().cyan());
    println!("{}", r#"/ /_(__  )   / __/ / /_/ / |/ |/ / "#.bold().cyan());
    println!("{}", r#"\__/____/   /_/ /_/\____/|__/|__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "tsflow".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Time-series adapter session host");
    println!();
}
