//! `iam-gateway` binary entry point.

// crates.io
use clap::Parser;
// self
use iam_gateway::{config::GatewayArgs, error::Result, obs, server};

#[tokio::main]
async fn main() -> Result<()> {
	obs::init_logging();

	let config = GatewayArgs::parse().into_config()?;

	server::run(config).await
}
