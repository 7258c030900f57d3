//! Seed data script - inserts the lifecycle states and an administrator account
//!
//! Run with: cargo run --bin seed-data -- --username admin --password <secret>

use clap::Parser;
use tracing::info;

use std::sync::Arc;

use inventory_tracker::{config, db, services::AppServices};

#[derive(Parser)]
#[command(name = "seed-data", about = "Seed lifecycle states and an admin account", version)]
struct Args {
    #[arg(long, default_value = "admin", help = "Administrator username")]
    username: String,

    #[arg(long, help = "Administrator password")]
    password: String,

    #[arg(long, help = "Skip running migrations before seeding")]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("=== Inventory Tracker Seed Data ===");
    let conn = db::establish_connection_from_app_config(&cfg).await?;
    if !args.skip_migrations {
        db::run_migrations(&conn).await?;
    }

    let services = AppServices::new(Arc::new(conn));

    let inserted = services.states.ensure_defaults().await?;
    info!("  Inserted {} lifecycle states", inserted);

    let (admin, created) = services
        .users
        .ensure_admin(&args.username, &args.password)
        .await?;
    if created {
        info!("  Created admin account {}", admin.username);
    } else {
        info!("  Promoted existing account {} to admin", admin.username);
    }

    info!("Seeding complete");
    Ok(())
}
