//! Populate the database with demo accounts, authors and books

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use library_server::{config::AppConfig, repository::Repository, seed, services::Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("library_server={}", config.logging.level))
        .init();

    if config.uses_memory_store() {
        anyhow::bail!("Seeding needs a PostgreSQL database_url, not the in-memory store");
    }

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let services = Services::new(Repository::new(pool), &config);
    let report = seed::run(&services).await?;

    tracing::info!(
        users = report.users,
        authors = report.authors,
        books = report.books,
        "Seed completed"
    );
    Ok(())
}
