//! NetFS CLI - Export a directory over TCP and browse remote exports
//!
//! Usage:
//!   netfs serve <path>              Export a directory tree
//!   netfs ls <path>                 List a remote directory
//!   netfs stat <path>               Show remote attributes
//!   netfs cat <path>                Print a remote file

use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use netfs_core::config::Config;
use netfs_daemon::{NetfsClient, NetfsServer};

#[derive(Parser)]
#[command(name = "netfs")]
#[command(about = "Simple network filesystem", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: per-user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a directory tree
    Serve {
        /// Directory to export
        path: PathBuf,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(short, long)]
        bind: Option<IpAddr>,

        /// Maximum concurrent connections
        #[arg(short = 'w', long)]
        max_workers: Option<usize>,
    },

    /// List a remote directory
    Ls {
        /// Remote path (e.g. /photos)
        path: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Show attributes of a remote entry
    Stat {
        /// Remote path
        path: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Print a remote file to stdout
    Cat {
        /// Remote path
        path: String,

        /// Byte offset to start at
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Maximum bytes to read (default: whole file)
        #[arg(short, long)]
        length: Option<u64>,

        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(clap::Args)]
struct RemoteArgs {
    /// Server host
    #[arg(short, long)]
    server: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    match cli.command {
        Commands::Serve {
            path,
            port,
            bind,
            max_workers,
        } => {
            run_serve(config, path, port, bind, max_workers).await?;
        }
        Commands::Ls { path, remote } => {
            let client = make_client(config, remote);
            for name in client.list(&path).await? {
                println!("{}", name);
            }
        }
        Commands::Stat { path, remote } => {
            let client = make_client(config, remote);
            let record = client.get_attributes(&path).await?;
            let kind = if record.is_dir() { "directory" } else { "file" };
            println!("{}:", path);
            println!("  type:   {}", kind);
            println!("  inode:  {}", record.inode);
            println!("  mode:   {:o}", record.mode & 0o7777);
            println!("  owner:  {}:{}", record.owner_id, record.group_id);
            println!("  links:  {}", record.link_count);
            println!("  size:   {}", record.size);
            println!("  blocks: {}", record.block_count);
            println!(
                "  mtime:  {}.{:09}",
                record.modified_secs, record.modified_nsecs
            );
        }
        Commands::Cat {
            path,
            offset,
            length,
            remote,
        } => {
            let client = make_client(config, remote);
            let length = match length {
                Some(n) => n,
                None => {
                    let record = client.get_attributes(&path).await?;
                    record.size.max(0) as u64
                }
            };
            let data = client.read(&path, offset, length).await?;
            let mut out = std::io::stdout().lock();
            out.write_all(&data)?;
            out.flush()?;
        }
    }

    Ok(())
}

async fn run_serve(
    config: Config,
    path: PathBuf,
    port: Option<u16>,
    bind: Option<IpAddr>,
    max_workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.canonicalize()?;

    if !path.is_dir() {
        error!("Path must be a directory: {:?}", path);
        return Err("Not a directory".into());
    }

    // Flags override the config file.
    let mut server_config = config.server.clone();
    server_config.root = path;
    if let Some(port) = port {
        server_config.port = port;
    }
    if let Some(bind) = bind {
        server_config.bind = bind;
    }
    if let Some(max_workers) = max_workers {
        server_config.max_workers = max_workers;
    }

    let server = NetfsServer::bind(&server_config, config.transport.clone()).await?;
    info!("Exporting {:?}", server_config.root);

    tokio::select! {
        result = server.serve() => {
            if let Err(e) = result {
                error!("Server error: {:?}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

fn make_client(config: Config, remote: RemoteArgs) -> NetfsClient {
    let mut client_config = config.client;
    if let Some(host) = remote.server {
        client_config.host = host;
    }
    if let Some(port) = remote.port {
        client_config.port = port;
    }
    NetfsClient::new(&client_config, config.transport)
}
