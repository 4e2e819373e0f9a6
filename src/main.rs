use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use takedown_observer::config::{
    CorsConfig, DEFAULT_DB_PATH, DEFAULT_LISTEN_ADDR, DEFAULT_READ_POOL_SIZE, DEFAULT_STATIC_DIR,
    ServerConfig,
};
use takedown_observer::store::AccountStore;
use takedown_observer::{Result, export, logging, server};
use tracing::info;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    logging::init(&cli.log_level)?;
    match cli.command {
        Command::Serve(args) => execute_serve(args),
        Command::Export(args) => execute_export(args),
    }
}

fn execute_serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        listen: args.listen,
        db_path: args.db_path,
        static_dir: args.static_dir,
        read_pool_size: args.read_pool_size,
        cors: CorsConfig::with_origins(args.allowed_origins),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(config))
}

fn execute_export(args: ExportArgs) -> Result<()> {
    let store = AccountStore::open(&args.db_path)?;
    let document = export::export_csv(&store)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &document)?;
            info!(output = %path.display(), bytes = document.len(), "export written");
        }
        None => std::io::stdout().write_all(&document)?,
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Collects and aggregates reports of taken-down accounts."
)]
struct Cli {
    /// Default log filter when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Write every tracked account as CSV.
    Export(ExportArgs),
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Socket address to listen on.
    #[arg(long, env = "LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// SQLite database file.
    #[arg(long, env = "SQLITE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,

    /// Directory holding the dashboard's static files.
    #[arg(long, env = "STATIC_DIR", default_value = DEFAULT_STATIC_DIR)]
    static_dir: PathBuf,

    /// Number of SQLite read connections served alongside the writer.
    #[arg(long, env = "READ_POOL_SIZE", default_value_t = DEFAULT_READ_POOL_SIZE)]
    read_pool_size: usize,

    /// Origin allowed to call the API from a browser. Repeatable.
    #[arg(long = "allowed-origin", env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// SQLite database file.
    #[arg(long, env = "SQLITE_DB_PATH", default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,

    /// Output file. Writes to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}
