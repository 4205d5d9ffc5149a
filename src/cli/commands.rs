use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::logging::init_logging;
use crate::router::{Exchange, RoutesCollection};
use crate::scope::handler;
use crate::server::{DispatchMetrics, HttpServer, Server};

/// Command-line interface for routescope
#[derive(Parser)]
#[command(name = "routescope")]
#[command(about = "routescope CLI", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve static mounts plus /health and /metrics
    Serve {
        /// Path to the YAML or TOML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Address and port to bind, overriding the config
        #[arg(long)]
        addr: Option<String>,

        /// Include error chains in 500 responses
        #[arg(long, default_value_t = false)]
        print_errors: bool,
    },
    /// Print the route table for a config
    Routes {
        /// Path to the YAML or TOML config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Routes for a config: every static mount, then `GET /health` and
/// `GET /metrics`.
///
/// # Errors
///
/// A mount prefix that does not form a valid pattern.
pub fn build_routes(config: &AppConfig, metrics: &Arc<DispatchMetrics>) -> anyhow::Result<RoutesCollection> {
    let mut routes = RoutesCollection::new();
    for mount in &config.static_dirs {
        routes
            .register_static_directory(mount.path.clone(), &mount.url_prefix)
            .with_context(|| format!("mounting {}", mount.path.display()))?
            .name(format!("static:{}", mount.url_prefix));
    }

    routes
        .register(
            "/health",
            "GET",
            handler::from_fn(|ex: Exchange| {
                ex.with_response(|res| -> anyhow::Result<()> {
                    res.set_status(200)?;
                    res.set_header("content-type", "application/json")?;
                    res.append_body(serde_json::json!({"status": "ok"}).to_string().as_bytes());
                    Ok(())
                })?
            }),
        )?
        .name("health");

    let counters = Arc::clone(metrics);
    routes
        .register(
            "/metrics",
            "GET",
            handler::from_fn(move |ex: Exchange| {
                let text = counters.render_prometheus();
                ex.with_response(|res| -> anyhow::Result<()> {
                    res.set_status(200)?;
                    res.set_header("content-type", "text/plain; version=0.0.4")?;
                    res.append_body(text.as_bytes());
                    Ok(())
                })?
            }),
        )?
        .name("metrics");
    Ok(routes)
}

/// A ready-to-serve [`Server`] for a config.
///
/// # Errors
///
/// See [`build_routes`].
pub fn build_app(config: &AppConfig) -> anyhow::Result<Server> {
    let metrics = Arc::new(DispatchMetrics::new());
    let routes = build_routes(config, &metrics)?;
    Ok(Server::builder(routes)
        .config(config.server.clone())
        .metrics(metrics)
        .build())
}

/// Execute a parsed command line.
///
/// # Errors
///
/// Config, logging, bind or signal registration failures.
pub fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            addr,
            print_errors,
        } => {
            let mut settings = AppConfig::load(&config)?;
            if let Some(addr) = addr {
                settings.server.addr = addr;
            }
            settings.server.print_errors |= print_errors;
            init_logging(&settings.logging)?;

            let app = Arc::new(build_app(&settings)?);
            let handle = HttpServer::new(app)
                .workers(settings.server.workers)
                .start(settings.server.addr.as_str())
                .with_context(|| format!("binding {}", settings.server.addr))?;
            info!(addr = %handle.addr(), "Listening");
            wait_for_shutdown()?;
            info!("Shutting down");
            handle.stop();
            Ok(())
        }
        Commands::Routes { config } => {
            let settings = AppConfig::load(&config)?;
            let metrics = Arc::new(DispatchMetrics::new());
            for line in build_routes(&settings, &metrics)?.route_table() {
                println!("{line}");
            }
            Ok(())
        }
    }
}

#[cfg(unix)]
fn wait_for_shutdown() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("registering signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown() -> anyhow::Result<()> {
    loop {
        std::thread::park();
    }
}
