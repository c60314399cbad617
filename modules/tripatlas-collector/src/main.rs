use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coze_client::CozeClient;
use tripatlas_collector::{Collector, WorkflowRunner};
use tripatlas_common::{Config, DataType};
use tripatlas_store::AtlasStore;

#[derive(Parser)]
#[command(name = "tripatlas-collector", about = "One-shot TripAtlas collection run")]
struct Cli {
    /// City to collect, e.g. "杭州"
    city: String,

    /// attraction | restaurant | hotel | city_overview
    #[arg(long, default_value = "attraction")]
    data_type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tripatlas=info".parse()?))
        .init();

    info!("TripAtlas collector starting...");

    let cli = Cli::parse();
    let data_type = DataType::from_str(&cli.data_type)?;

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = AtlasStore::new(pool);
    store.migrate().await?;
    info!("Migrations complete");

    let mut client = CozeClient::new(config.coze_api_token.clone());
    if let Some(base_url) = &config.coze_base_url {
        client = client.with_base_url(base_url);
    }
    let runner = WorkflowRunner::new(client, &config.coze_workflow_id);
    let collector = Collector::new(store, runner);

    let stats = collector.run_once(&cli.city, data_type).await?;
    info!("Collection run complete. {stats}");

    Ok(())
}
