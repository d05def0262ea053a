use clap::Parser;
use eyre::{bail, Result as EyreResult};
use forge_engine::{Engine, EngineProviders, ForgeConfig};
use tracing::info;

use crate::cli::RootArgs;

/// Start the engine and run until a shutdown signal is received
#[derive(Debug, Parser)]
pub struct RunCommand;

impl RunCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let home = root_args.home;

        if !ForgeConfig::exists(&home) {
            bail!("Forge is not initialized in {:?}; run `forged init` first", home);
        }

        let config = ForgeConfig::load(&home)?;
        let _engine = Engine::build(config, EngineProviders::default())
            .map_err(|err| eyre::eyre!(err))?;

        info!("Forge engine running in {:?}; press Ctrl-C to stop", home);
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        Ok(())
    }
}
