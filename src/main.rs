//! Weblog - multi-user blogging service

use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use weblog::{config::Args, db::WeblogDb, mail::Mailer, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("weblog={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Weblog");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Database: {}", args.database_path);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!(
        "Page sizes: blogs={}, users={}, comments={}",
        args.blogs_per_page, args.users_per_page, args.comments_per_page
    );
    info!("======================================");

    let db = match WeblogDb::open(Path::new(&args.database_path)) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let mailer = Mailer::tracing(args.mail_sender.clone());
    let state = AppState::new(args.clone(), db, mailer)?;

    let roles = state.accounts.ensure_roles()?;
    info!("Roles ready: {}", roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", "));

    if let Some((email, name, password)) = args.bootstrap_admin() {
        let admin = state.accounts.ensure_admin(email, name, password)?;
        info!(user_id = admin.id, "Administrator account available");
    }

    if let Err(e) = server::run(Arc::new(state)).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
