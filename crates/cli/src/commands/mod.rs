mod classify;
mod run;

use anyhow::Context;
use stepwise::StepwiseConfig;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let config = load_config(&cli)?;
	match cli.command {
		Commands::Run(args) => run::execute(args, config).await,
		Commands::Classify => classify::execute().await,
		Commands::Config => {
			println!("{}", serde_json::to_string_pretty(&config)?);
			Ok(())
		}
	}
}

/// File settings (if any), then environment overrides.
fn load_config(cli: &Cli) -> anyhow::Result<StepwiseConfig> {
	let config = match &cli.config {
		Some(path) => StepwiseConfig::from_file(path)
			.with_context(|| format!("failed to load config from {}", path.display()))?,
		None => StepwiseConfig::default(),
	};
	Ok(config.with_env_overrides()?)
}
