mod auth;
mod database;
mod db;
mod env;
mod error;
mod menu;
mod models;
mod notifier;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tracing::info;

use env::{DEFAULT_DATABASE_URL, DEFAULT_LOG_FILE, MailConfig};
use menu::Menu;
use notifier::{Mailer, SmtpMailer, UnconfiguredMailer, scan_and_notify};

#[derive(Debug, Parser)]
#[command(version, about = "Clients, proposals and deadline reminders for a licensing consultancy")]
struct Cli {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    /// File that log lines are appended to
    #[arg(long, env = "LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive menu (default)
    Menu,
    /// Run the deadline scan once and exit
    Scan,
    /// Make sure the seed staff list exists and exit
    SeedStaff,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env_files = env::load_environment().context("Failed to load environment")?;
    let cli = Cli::parse();

    telemetry::init_tracing(&cli.log_file)
        .with_context(|| format!("Failed to open log file {}", cli.log_file.display()))?;
    env_files.log();
    info!("Starting licensing desk");

    let pool = database::connect(&cli.database_url).await?;
    database::init_schema(&pool).await?;

    match MailConfig::from_env() {
        Some(config) => {
            let mailer = SmtpMailer::new(&config)?;
            dispatch(cli.command, &pool, &mailer).await
        }
        None => {
            info!("SMTP_HOST not set, email delivery disabled");
            dispatch(cli.command, &pool, &UnconfiguredMailer).await
        }
    }
}

async fn dispatch<M: Mailer>(
    command: Option<Command>,
    pool: &SqlitePool,
    mailer: &M,
) -> anyhow::Result<()> {
    match command.unwrap_or(Command::Menu) {
        Command::Menu => {
            menu::prepare(pool).await;
            let stdin = io::stdin();
            let mut menu = Menu::new(pool, mailer, stdin.lock(), io::stdout());
            menu.run().await?;
        }
        Command::Scan => {
            menu::prepare(pool).await;
            let report = scan_and_notify(pool, mailer, menu::local_now()).await?;
            println!(
                "{} proposal(s) due: {} notified, {} failed, {} skipped.",
                report.due, report.sent, report.failed, report.skipped
            );
        }
        Command::SeedStaff => {
            let created = db::ensure_seed_staff(pool).await?;
            println!("{} staff member(s) created.", created);
        }
    }

    pool.close().await;
    Ok(())
}
