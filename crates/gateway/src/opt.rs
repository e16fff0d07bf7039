//! Command-line arguments.

use clap::Parser;

/// The Conduit gateway process: loads a configuration file (or directory of
/// files), starts every configured data module, and serves the HTTP/
/// WebSocket transport.
#[derive(Debug, Parser)]
#[clap(version, about, author)]
pub struct Opt {
    /// Forces debug-level logging regardless of `RUST_LOG`.
    #[arg(long)]
    pub debug: bool,
    /// Path to a configuration file, or a directory of `*.toml` files
    /// merged in alphabetical order.
    #[arg(long)]
    pub config: std::path::PathBuf,
}
