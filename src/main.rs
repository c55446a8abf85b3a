//! coracled - Coracle IRC Daemon
//!
//! An IRC server with IRCv3 capabilities, built around two event buses and
//! per-connection session state machines.

mod config;
mod dns;
mod error;
mod events;
mod handlers;
mod network;
mod router;
mod security;
mod state;
mod store;


use std::io::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{Buses, CoreEvent};
use crate::network::Gateway;
use crate::security::password::HashHandler;
use crate::state::ServerContext;
use crate::store::DataStore;

/// Command-line options (kept deliberately small; everything else is
/// configuration).
struct Options {
    config_path: String,
    debug: bool,
    list_hashes: bool,
    mkpasswd: bool,
}

fn usage() -> ! {
    let cmd = std::env::args().next().unwrap_or_else(|| "coracled".to_string());
    println!(
        "{cmd} [options]
Coracle IRC Daemon.

Options:
   --help              - This screen.
   --debug             - Enable debug verbosity
   --nofork            - Do not fork into background (the only mode)
   --config config     - A TOML configuration file to parse
   --list-hashes       - List the supported hashes for passwords
   --mkpasswd          - Return hashed password, to put into the datastore"
    );
    std::process::exit(0);
}

fn parse_options() -> Options {
    let mut options = Options {
        config_path: "coracled.toml".to_string(),
        debug: false,
        list_hashes: false,
        mkpasswd: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" => usage(),
            "--debug" => options.debug = true,
            "--nofork" => {}
            "--config" => match args.next() {
                Some(path) => options.config_path = path,
                None => {
                    eprintln!("coracled: error: no parameter provided for --config");
                    std::process::exit(1);
                }
            },
            "--list-hashes" => options.list_hashes = true,
            "--mkpasswd" => options.mkpasswd = true,
            other => {
                eprintln!("coracled: error: unknown option {other}");
                std::process::exit(1);
            }
        }
    }

    options
}

fn list_hashes(hashing: &HashHandler) -> ! {
    println!(
        "Valid hashing algorithms: {}",
        hashing.valid_schemes().join(", ")
    );
    std::process::exit(0);
}

fn mkpasswd(hashing: &HashHandler) -> ! {
    println!(
        "Valid hashing algorithms: {}",
        hashing.valid_schemes().join(", ")
    );
    print!("Hashing algorithm [{}]: ", hashing.default_scheme());
    let _ = std::io::stdout().flush();

    let mut scheme = String::new();
    if std::io::stdin().read_line(&mut scheme).is_err() {
        std::process::exit(1);
    }
    let scheme = scheme.trim();
    let scheme = if scheme.is_empty() {
        hashing.default_scheme()
    } else {
        scheme
    };

    print!("Password: ");
    let _ = std::io::stdout().flush();
    let mut password = String::new();
    if std::io::stdin().read_line(&mut password).is_err() {
        std::process::exit(1);
    }
    let password = password.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        eprintln!("coracled: error: empty password");
        std::process::exit(1);
    }

    match hashing.encrypt(password, scheme) {
        Ok(hash) => {
            println!();
            println!("{hash}");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("coracled: error: {e}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(config: &Config, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // The first configured log selects the file sink.
    let log_file = config.logs.first().and_then(|log| {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log.path)
        {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("coracled: cannot open log file {}: {e}", log.path);
                None
            }
        }
    });

    match log_file {
        Some(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let options = parse_options();

    let hashing = HashHandler::new();
    if options.list_hashes {
        list_hashes(&hashing);
    }
    if options.mkpasswd {
        mkpasswd(&hashing);
    }

    let config = Config::load(&options.config_path).map_err(|e| {
        eprintln!(
            "coracled: failed to load config from {}: {e}",
            options.config_path
        );
        e
    })?;

    init_tracing(&config, options.debug);
    info!(
        server = %config.name,
        network = %config.network,
        config = %options.config_path,
        "starting coracled"
    );

    let data = match DataStore::create_or_load(&config.data.path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %config.data.path, error = %e, "datastore unavailable, using empty store");
            DataStore::in_memory()
        }
    };

    let mut buses = Buses::default();
    handlers::register_all(&mut buses, &config.extensions);

    let ctx = Arc::new(ServerContext::new(config, data, hashing, buses));
    handlers::install_capabilities(&ctx);
    ctx.start_background_tasks();

    let mut ev = CoreEvent::ServerStart;
    ctx.buses.core.dispatch(&ctx, "server start", &mut ev);
    debug!("init finished");

    // Graceful shutdown on SIGINT/SIGTERM.
    {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => ctx.shutdown("Received SIGINT"),
                _ = sigterm.recv() => ctx.shutdown("Received SIGTERM"),
            }
        });
    }

    let gateway = Gateway::bind(&ctx).await?;
    gateway.run().await;

    // Always save data on the way out.
    if let Err(e) = ctx.data.save() {
        warn!(error = %e, "final datastore save failed");
    }

    info!("coracled stopped");
    Ok(())
}
