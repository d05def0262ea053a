use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use forge_engine::ForgeConfig;
use tracing::{info, warn};

use crate::cli::RootArgs;

/// Write a default configuration file into the home directory
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Overwrite an existing configuration file
    #[clap(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let home = root_args.home;

        if !home.exists() {
            std::fs::create_dir_all(&home)
                .wrap_err_with(|| format!("failed to create directory {home:?}"))?;
        }

        if ForgeConfig::exists(&home) && !self.force {
            warn!("Forge is already initialized in {:?}", home);
            return Ok(());
        }

        let config = ForgeConfig {
            data_dir: home.join("data"),
            ..ForgeConfig::default()
        };
        std::fs::create_dir_all(&config.data_dir)
            .wrap_err_with(|| format!("failed to create data directory {:?}", config.data_dir))?;

        config.save(&home)?;
        info!("Initialized Forge configuration in {:?}", home);

        Ok(())
    }
}
