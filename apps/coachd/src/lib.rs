use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use coach_storage::{db::Db, qdrant::QdrantStore};
use coach_sync::{
	EXERCISE_CHANNEL, Listener, PgNotificationSource, RetryPolicy, SyncHandler, WORKOUT_CHANNEL,
};

#[derive(Debug, Parser)]
#[command(rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = coach_config::load(&args.config)?;

	init_tracing(&config)?;

	let db = Arc::new(Db::connect(&config.storage.postgres).await?);

	db.ensure_schema().await?;

	let qdrant = Arc::new(QdrantStore::new(&config.storage.qdrant)?);

	qdrant.ensure_collections().await?;
	tracing::info!("Storage ready.");

	let source = Arc::new(PgNotificationSource {
		dsn: config.storage.postgres.dsn.clone(),
		channels: vec![EXERCISE_CHANNEL.to_string(), WORKOUT_CHANNEL.to_string()],
	});
	let handler = Arc::new(SyncHandler {
		db,
		qdrant,
		embedding: config.providers.embedding.clone(),
		retry: RetryPolicy::from_config(&config.sync),
	});
	let listener = Listener::new(source, handler, &config.sync);
	let (shutdown_tx, shutdown_rx) = watch::channel(false);

	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %err, "Signal listener failed.");
		}

		tracing::info!("Shutdown signal received.");

		let _ = shutdown_tx.send(true);
	});

	listener.run(shutdown_rx).await?;
	tracing::info!("Change sync stopped.");

	Ok(())
}

fn init_tracing(config: &coach_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
