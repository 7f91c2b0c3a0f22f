use clap::Parser;
use ferrum_p2p::config::Config;
use ferrum_p2p::database::RedbStore;
use ferrum_p2p::service::Node;
use ferrum_p2p::store::{ChainStore, MemoryStore};
use ferrum_p2p::Network;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "ferrumd")]
#[command(about = "A relaying node for the Ferrum proof-of-work network.", long_about = None)]
struct Args {
    /// Connect to specific peers; these are dialed at startup and always
    /// accepted inbound.
    #[arg(short = 'c', long = "connect")]
    pub connect: Vec<SocketAddr>,

    /// Listen for inbound connections on this address.
    #[arg(short = 'l', long)]
    pub listen: Option<SocketAddr>,

    /// Use the specified network (mainnet, testnet, regtest).
    #[arg(short, long, default_value = "testnet")]
    pub network: Network,

    /// Seconds allowed for the handshake and for ping liveness.
    #[arg(long, default_value_t = 15)]
    pub connection_timeout: u64,

    /// Bound on the inventory work queue.
    #[arg(long, default_value_t = 500)]
    pub max_inv: usize,

    /// Advertise our own address to peers.
    #[arg(long, default_value_t = false)]
    pub announce: bool,

    /// Refuse inbound connections outside the --connect whitelist.
    #[arg(long, default_value_t = false)]
    pub no_accept: bool,

    /// Directory for persistent chain data; in-memory when omitted.
    #[arg(short, long)]
    pub datadir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose logging details.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, default_value_t = false)]
    pub no_color: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(&args)?;

    let mut config = Config::for_network(args.network);
    config.connect = args.connect.clone();
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    config.connection_timeout = Duration::from_secs(args.connection_timeout);
    config.max_inv = args.max_inv;
    config.announce = args.announce;
    config.accept_connections = !args.no_accept;

    let store: Arc<dyn ChainStore> = match &args.datadir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Arc::new(RedbStore::open(&dir.join("chain.redb"))?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    info!(
        network = %config.network,
        height = store.height(),
        "starting ferrum node"
    );

    let node = Node::new(config, store);
    node.run().await?;

    Ok(())
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let level = match args.log_level.as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => {
            eprintln!(
                "Invalid log level: {}. Using 'info' as default.",
                args.log_level
            );
            tracing::Level::INFO
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("tokio=warn".parse()?);

    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr()) && !args.no_color;

    let subscriber = Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_level(true)
            .with_target(true)
            .with_thread_ids(args.verbose)
            .with_thread_names(args.verbose)
            .with_ansi(use_ansi)
            .with_file(args.verbose)
            .with_line_number(args.verbose)
            .with_timer(ChronoUtc::rfc_3339()),
    );

    subscriber.try_init()?;

    Ok(())
}
