use clap::{Parser, Subcommand};
use rawrecv::capture::{CaptureFilter, FilterProtocol};
use rawrecv::config::{self, Config, NetworkConfig};
use rawrecv::telemetry::{init_logging, LogConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "rawrecv")]
#[command(about = "Receive TCP/UDP payloads from raw frame capture")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture on an interface and log every message received
    Listen {
        /// Path to config.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Interface to capture on (overrides the config file)
        #[arg(short, long)]
        interface: Option<String>,

        /// Destination port to receive on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the capture filter for a port and its compiled BPF program
    Filter {
        #[arg(short, long)]
        port: u16,

        /// Match UDP instead of TCP
        #[arg(long)]
        udp: bool,

        /// Snapshot length returned for matching frames
        #[arg(long, default_value_t = config::DEFAULT_SNAPLEN)]
        snaplen: u32,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Listen {
            config,
            interface,
            port,
        } => cmd_listen(config.as_deref(), interface, port),
        Commands::Filter { port, udp, snaplen } => {
            init_logging(None);
            cmd_filter(port, udp, snaplen);
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => {
            init_logging(None);
            cmd_config_validate(&config)
        }
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

/// Merge the config file (if any) with command-line overrides
fn resolve_config(
    path: Option<&Path>,
    interface: Option<String>,
    port: Option<u16>,
) -> Result<Config, String> {
    let mut config = match path {
        Some(path) => config::load(path).map_err(|e| e.to_string())?,
        None => {
            let (Some(interface), Some(port)) = (interface.clone(), port) else {
                return Err("pass --config, or both --interface and --port".into());
            };
            Config {
                network: NetworkConfig::new(interface, port),
                log: LogConfig::default(),
            }
        }
    };

    if let Some(interface) = interface {
        config.network.interface = interface;
    }
    if let Some(port) = port {
        config.network.port = port;
    }

    let validation = config::validate(&config);
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("configuration has errors".into());
    }

    Ok(config)
}

fn cmd_listen(
    path: Option<&Path>,
    interface: Option<String>,
    port: Option<u16>,
) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let config = resolve_config(path, interface, port)?;
    init_logging(Some(&config.log));

    let network = config.network;
    info!(
        "Listening on {} for tcp dst port {}...",
        network.interface, network.port
    );

    let mut session = open_session(&network)?;
    let closer = session.close_handle();
    let stats = session.stats();

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    let result = rt.block_on(async move {
        let shutdown = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupted, closing capture"),
                Err(e) => {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
            }
            closer.close();
        });

        let reader = tokio::task::spawn_blocking(move || -> rawrecv::Result<()> {
            loop {
                let (payload, addr) = session.read()?;
                info!(%addr, len = payload.len(), "message received");
                debug!(payload = ?String::from_utf8_lossy(&payload));
            }
        });

        let result = reader.await;
        shutdown.abort();
        result
    });

    for (name, value) in stats.export() {
        info!("{} = {}", name, value);
    }

    match result.map_err(|e| format!("Receive task failed: {}", e))? {
        Err(e) if e.is_closed() => Ok(()),
        Err(e) => Err(e.to_string()),
        Ok(()) => Ok(()),
    }
}

#[cfg(target_os = "linux")]
fn open_session(
    network: &NetworkConfig,
) -> Result<rawrecv::Session<rawrecv::capture::AfPacketSource>, String> {
    rawrecv::Session::open(network).map_err(|e| format!("{}. Run with root privileges.", e))
}

#[cfg(not(target_os = "linux"))]
fn open_session(
    _network: &NetworkConfig,
) -> Result<rawrecv::Session<rawrecv::capture::MemorySource>, String> {
    Err("live capture is only implemented for Linux AF_PACKET".into())
}

fn cmd_filter(port: u16, udp: bool, snaplen: u32) {
    let protocol = if udp {
        FilterProtocol::Udp
    } else {
        FilterProtocol::Tcp
    };
    let filter = CaptureFilter::new(protocol, port);

    println!("{}", filter);
    print!("{}", filter.compile(snaplen));
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    info!("Validating {}...", config_path.display());

    let config = config::load(config_path).map_err(|e| e.to_string())?;
    let validation = config::validate(&config);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed".into());
    }

    info!(
        "{} is valid ({} warnings)",
        config_path.display(),
        validation.warnings.len()
    );
    Ok(())
}
