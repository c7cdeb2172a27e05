//! # DevQuest - Game Backend
//!
//! The main binary of the DevQuest coding game.
//!
//! This application provides:
//! - HTTP REST API server (axum-based) for the game client
//! - CLI for database setup, level import and statistics
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/devquest (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐   │
//! │  │    CLI      │    │  HTTP API   │    │  Identity   │   │
//! │  │   (clap)    │    │   (axum)    │    │ (reqwest)   │   │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬──────┘   │
//! │         └──────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                   ┌─────────────────┐                    │
//! │                   │  devquest-core  │                    │
//! │                   │  (THE RULES)    │                    │
//! │                   └─────────────────┘                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! devquest init
//! devquest import -f levels.json
//! devquest server --host 0.0.0.0 --port 8000
//! devquest stats 3
//! ```

use clap::Parser;
use devquest::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // DEVQUEST_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("DEVQUEST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "devquest=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the DevQuest startup banner.
fn print_banner() {
    println!(
        r#"
  ╔╦╗┌─┐┬  ┬╔═╗ ┬ ┬┌─┐┌─┐┌┬┐
   ║║├┤ └┐┌┘║═╬╗│ │├┤ └─┐ │
  ═╩╝└─┘ └┘ ╚═╝╚└─┘└─┘└─┘ ┴

  Game Backend v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
