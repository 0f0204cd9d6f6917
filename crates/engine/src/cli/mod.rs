pub mod catalog;
pub mod chat;
pub mod config;

use clap::{Parser, Subcommand};

use sibyl_domain::config::Config;

/// Sibyl — a conversational astrology core.
#[derive(Debug, Parser)]
#[command(name = "sibyl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat with the engine interactively (default when no subcommand is
    /// given).
    Chat {
        /// User id for the conversation.
        #[arg(long, default_value = "cli:local")]
        user: String,
    },
    /// Action catalog utilities.
    #[command(subcommand)]
    Catalog(CatalogCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List every catalog entry with its implementation status.
    List,
    /// Cross-check the catalog against the registered handler set.
    Check,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `SIBYL_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used. A missing file is not an error; defaults apply.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("SIBYL_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = Config::load(std::path::Path::new(&config_path))
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;
    Ok((config, config_path))
}
