use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use std::env;
use wallet_indexer::utils::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logger();
    dotenv::dotenv().ok();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    logging::log_database_connection_details(&database_url);
    logging::log_info("Running ledger migrations...");

    let connection = Database::connect(&database_url).await?;
    Migrator::up(&connection, None).await?;

    logging::log_info("Migrations completed successfully!");
    Ok(())
}
