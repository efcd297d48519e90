mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use mangabox::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    mangabox::observability::init_tracing();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Server(args) => mangabox::api::run(config, args.address).await?,
        Commands::Download(args) => commands::download(config, args).await?,
        Commands::Prune => commands::prune(&config)?,
    }

    Ok(())
}
