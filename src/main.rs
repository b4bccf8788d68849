use clap::Parser;
use minum::{HandlerRegistry, HttpDispatcher, Server, ServerConfig, StaticFilesCache, TheBrig};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// A small, self-contained HTTP/1.1 server for static assets and
/// registered handlers.
#[derive(Parser)]
#[command(name = "minum", version, about)]
struct Cli {
    /// Plaintext listen port (overrides SERVER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (overrides HOST_NAME)
    #[arg(long)]
    host: Option<String>,

    /// Static asset directory (overrides STATIC_FILES_DIRECTORY)
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `minum=debug`
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let mut config = ServerConfig::from_env();
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    if let Some(host) = cli.host {
        config.host_name = host;
    }
    if let Some(dir) = cli.static_dir {
        config.static_files_directory = dir;
    }
    let config = Arc::new(config);

    let mut static_files = StaticFilesCache::new(&config);
    static_files.load_directory(&config.static_files_directory)?;
    let static_files = Arc::new(RwLock::new(static_files));

    let registry = Arc::new(RwLock::new(HandlerRegistry::new()));
    let brig = Arc::new(TheBrig::new(&config));

    let dispatcher = HttpDispatcher::new(
        config.clone(),
        registry,
        static_files,
        brig.clone(),
    );
    let handle = Server::new(config, dispatcher, brig).start()?;
    info!(addr = %handle.addr(), "minum started");

    handle
        .join()
        .map_err(|e| io::Error::other(format!("server exited abnormally: {:?}", e)))
}
