use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sibyl_engine::cli::{self, CatalogCommand, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default to chat when no subcommand is given.
    let command = cli.command.unwrap_or(Command::Chat {
        user: "cli:local".into(),
    });

    match command {
        Command::Chat { user } => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::chat::chat(Arc::new(config), user).await
        }
        Command::Catalog(CatalogCommand::List) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::catalog::list(&config)
        }
        Command::Catalog(CatalogCommand::Check) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            let ok = cli::catalog::check(&config)?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config()?;
            let valid = cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
        Command::Version => {
            println!("sibyl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize compact stderr-only tracing for CLI commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute the
/// conversation; set `RUST_LOG` to see engine internals.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
