use clap::Parser;
use graph_pg::GraphPg;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands, load_config};

#[tokio::main]
async fn main() -> async_graphql::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve_command(&cli.config).await,
        Commands::Introspect { output } => introspect_command(&cli.config, output).await,
    }
}

async fn serve_command(config_path: &str) -> async_graphql::Result<()> {
    let config = load_config(config_path)?;
    let graph_pg = GraphPg::new(config.clone());

    let pool = config.database.create_connection().await?;

    let (router, listener, _engine) = graph_pg.build(&pool).await?;

    info!(
        "GraphQL server running at http://{}:{}",
        config.server.host, config.server.port
    );

    if let Err(e) = axum::serve(listener, router).await {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}

async fn introspect_command(config_path: &str, output: Option<String>) -> async_graphql::Result<()> {
    let config = load_config(config_path)?;
    let graph_pg = GraphPg::new(config.clone());

    let pool = config.database.create_connection().await?;

    let engine = graph_pg.engine(&pool)?;
    let model = graph_pg.reflect(&engine).await?;
    let schema = graph_pg.build_schema(&model)?.finish()?;
    let sdl = schema.sdl();

    match output {
        Some(file_path) => {
            std::fs::write(&file_path, &sdl)
                .map_err(|e| anyhow::anyhow!("Failed to write to file {}: {}", file_path, e))?;
            info!("GraphQL schema written to: {}", file_path);
        }
        None => {
            println!("{}", sdl);
        }
    }

    Ok(())
}
