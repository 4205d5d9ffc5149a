//! # CLI Module
//!
//! Command-line entry points for running an application from a config
//! file.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start the HTTP adapter with the configured static mounts plus the
//! built-in `/health` and `/metrics` routes:
//!
//! ```bash
//! routescope serve --config app.yaml
//! routescope serve --config app.toml --addr 127.0.0.1:3000 --print-errors
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML or TOML settings (required)
//! - `--addr <ADDR>` - Override `server.addr`
//! - `--print-errors` - Show error chains on the 500 page
//!
//! `SIGINT` and `SIGTERM` stop the workers and exit cleanly.
//!
//! ### `routes`
//!
//! Print the route table the config produces, one line per route:
//!
//! ```bash
//! routescope routes --config app.yaml
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use routescope::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{build_app, build_routes, run_cli, Cli, Commands};
