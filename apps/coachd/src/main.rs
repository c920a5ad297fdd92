use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = coachd::Args::parse();
	coachd::run(args).await
}
