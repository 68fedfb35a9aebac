use clap::Parser;
use graphmirror::cli::{Cli, Commands};
use graphmirror::config::MirrorConfig;
use graphmirror::{Mirror, Schema};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = MirrorConfig::from_path(&cli.config)?;

    let schema_json = std::fs::read_to_string(&config.mirror.schema_path)?;
    let schema: Schema = serde_json::from_str(&schema_json)?;

    let pool = config.database.create_connection().await?;

    match cli.command {
        Commands::Bootstrap => bootstrap_command(pool, schema).await,
        Commands::Status { since_epoch_millis } => {
            status_command(pool, schema, since_epoch_millis).await
        }
    }
}

async fn bootstrap_command(pool: sqlx::SqlitePool, schema: Schema) -> anyhow::Result<()> {
    info!("bootstrapping store");
    Mirror::new(pool, schema).await?;
    println!("store bootstrapped successfully");
    Ok(())
}

async fn status_command(
    pool: sqlx::SqlitePool,
    schema: Schema,
    since_epoch_millis: i64,
) -> anyhow::Result<()> {
    let mirror = Mirror::new(pool, schema).await?;
    let outdated = mirror.find_outdated(since_epoch_millis).await?;

    println!("{} outdated objects", outdated.objects.len());
    for object in &outdated.objects {
        println!("  {} {}", object.typename, object.id);
    }

    println!("{} outdated connections", outdated.connections.len());
    for connection in &outdated.connections {
        println!(
            "  {} {} . {}",
            connection.typename, connection.id, connection.fieldname
        );
    }

    Ok(())
}
