use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mangabox")]
#[command(about = "Manga download service", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MANGABOX_CONFIG or config/mangabox.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Download one manga and exit once nothing is left running
    Download(DownloadArgs),
    /// Remove expired tracking logs from the ledger
    Prune,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// JSON file describing the manga, chapters included
    #[arg(long)]
    pub manga: PathBuf,

    /// Chapter ids to download; all chapters when omitted
    #[arg(long, value_delimiter = ',')]
    pub chapters: Option<Vec<i64>>,

    /// Confirm transfers over a metered network
    #[arg(long)]
    pub yes: bool,

    /// With --yes, stop asking about metered networks from now on
    #[arg(long, requires = "yes")]
    pub dont_ask_again: bool,
}
