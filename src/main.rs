use clap::{Parser, Subcommand};
use log::{error, info, warn};
use ovpn_monitor::configuration::config::Config;
use ovpn_monitor::controller::controller_handler::Controller;
use ovpn_monitor::session_management::session_registry::SessionRegistry;
use ovpn_monitor::storage::file_storage::FileRegistryStore;
use ovpn_monitor::storage::registry_lock::RegistryLock;
use std::fs::OpenOptions;
use std::future::Future;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "ovpn-monitor")]
#[command(version = "0.1.0")]
#[command(about = "Per-client traffic monitor for OpenVPN gateways")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "OVPN_MONITOR_CONFIG", default_value = "monitor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the status file and supervise captures (default)
    Run,
    /// Register a session in the registry file (refused while a monitor runs)
    Add {
        real_address: String,
        virtual_address: String,
        common_name: String,
    },
    /// Remove a session from the registry file (refused while a monitor runs)
    Delete { real_address: String },
    /// Print the registered sessions
    List,
}

fn init_logging(config: Option<&Config>) {
    let level = config.map_or("info", |c| c.logging.level.as_str());
    // RUST_LOG wins over the configured level
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format_target(false);

    if let Some(path) = config.and_then(|c| c.logging.file.as_ref()) {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Unable to open log file {}: {}", path.display(), e),
        }
    }
    builder.init();
}

/// Takes the registry lock for a one-shot edit; refused while a monitor runs.
fn lock_registry(config: &Config) -> RegistryLock {
    RegistryLock::acquire(&config.paths.sessions_file).unwrap_or_else(|e| {
        error!("Unable to edit the session registry: {}", e);
        std::process::exit(1);
    })
}

fn open_registry(config: &Config) -> SessionRegistry {
    SessionRegistry::open(Box::new(FileRegistryStore::new(&config.paths.sessions_file)))
        .unwrap_or_else(|e| {
            error!("Unable to load the session registry: {}", e);
            std::process::exit(1);
        })
}

/// Installs the SIGINT and SIGTERM handlers right away; the returned future
/// resolves on the first of them.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received Ctrl-C"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    })
}

async fn run(config: Config) {
    println!(
        "
==============================================================================
                   ovpn-monitor v0.1.0  :  OpenVPN traffic monitor
==============================================================================
"
    );

    let shutdown = shutdown_signal().unwrap_or_else(|e| {
        error!("Unable to install signal handlers: {}, exiting...", e);
        std::process::exit(1);
    });

    let controller = Controller::new(config).unwrap_or_else(|e| {
        error!("Unable to create a controller instance: {}, exiting...", e);
        std::process::exit(1);
    });

    info!("Starting the controller");
    if let Err(e) = controller.run(shutdown).await {
        error!("Controller stopped on error: {}, exiting...", e);
        std::process::exit(1);
    }
    info!("Bye");
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging(None);
            error!(
                "Unable to import configuration from {}: {}",
                args.config.display(),
                e
            );
            std::process::exit(1);
        }
    };
    init_logging(Some(&config));
    info!("Configuration imported from {}", args.config.display());

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Add {
            real_address,
            virtual_address,
            common_name,
        } => {
            let _lock = lock_registry(&config);
            let mut registry = open_registry(&config);
            match registry.add(&real_address, &virtual_address, &common_name) {
                Ok(session) => println!("{} {}", session.real_address, session.session_id),
                Err(e) => {
                    error!("Unable to add session {}: {}", real_address, e);
                    std::process::exit(1);
                }
            }
        }
        Command::Delete { real_address } => {
            let _lock = lock_registry(&config);
            let mut registry = open_registry(&config);
            match registry.remove(&real_address) {
                Ok(Some(session)) => println!("{} {}", session.real_address, session.session_id),
                Ok(None) => warn!("No session registered for {}", real_address),
                Err(e) => {
                    error!("Unable to delete session {}: {}", real_address, e);
                    std::process::exit(1);
                }
            }
        }
        Command::List => {
            let registry = open_registry(&config);
            for session in registry.sessions().values() {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    session.real_address,
                    session.virtual_address,
                    session.common_name,
                    session.session_id,
                    session.first_seen.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }
}
