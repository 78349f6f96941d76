pub mod config;

use clap::{Parser, Subcommand};

/// ChatBridge — a chat session and message gateway.
#[derive(Debug, Parser)]
#[command(name = "chatbridge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP gateway (the default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Lint the config file and report every finding.
    Validate,
    /// Print the resolved configuration, defaults included, as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path named by `CB_CONFIG`, falling back
/// to `config.toml`. A missing file is not an error; everything then runs
/// on defaults. Returns the parsed [`Config`] and the path that was used.
pub fn load_config() -> anyhow::Result<(cb_domain::config::Config, String)> {
    let config_path =
        std::env::var("CB_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        cb_domain::config::Config::default()
    };

    Ok((config, config_path))
}
