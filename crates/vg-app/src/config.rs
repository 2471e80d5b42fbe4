use anyhow::Context;
use tracing::debug;
use vg_core::Config;
use crate::Cli;

/// Loads `.env`, reads the environment, then applies CLI overrides.
pub fn load(cli: &Cli) -> anyhow::Result<Config> {
    if cli.env_file.exists() {
        dotenvy::from_path(&cli.env_file)
            .with_context(|| format!("Failed to read {}", cli.env_file.display()))?;
    } else {
        debug!("No env file at {}", cli.env_file.display());
    }

    let mut conf = Config::from_env()?;

    if let Some(dir) = &cli.work_dir {
        conf.work_dir = dir.clone();
    }
    if let Some(kind) = cli.vectorizer {
        conf.vectorize.kind = kind;
    }

    Ok(conf)
}
