use anyhow::anyhow;
use clap::{Parser, Subcommand};
use graph_pg::config::GraphPgConfig;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(version, about = "A GraphQL server generated from a PostgreSQL catalog", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the GraphQL server
    Serve,
    /// Reflect the database schema and output the generated GraphQL SDL
    Introspect {
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

pub fn load_config(config_path: &str) -> anyhow::Result<GraphPgConfig> {
    debug!("Loading config from: {}", config_path);

    if std::path::Path::new(config_path).exists() {
        info!("Config file found, loading from: {}", config_path);

        let config_content = std::fs::read_to_string(config_path).map_err(|e| {
            debug!("Failed to read config file: {}", e);
            e
        })?;

        let config: GraphPgConfig = toml::from_str(&config_content).map_err(|e| {
            debug!("Failed to parse config file: {}", e);
            e
        })?;

        debug!("Config loaded successfully");
        return Ok(config);
    }

    Err(anyhow!("Unable to load config"))
}
