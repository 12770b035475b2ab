// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "k3d-registry")]
#[command(about = "Manage the local image registry shared by k3d clusters")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Do not take the host-wide registry lock (~/.k3d/registry.lock)
    #[arg(long, global = true)]
    pub no_lock: bool,
}

/// Registry settings, read from `--spec` and overridden by flags.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SpecArgs {
    /// YAML file with registry settings
    #[arg(long, value_name = "FILE")]
    pub spec: Option<PathBuf>,

    /// Hostname the registry is reachable under
    #[arg(long)]
    pub name: Option<String>,

    /// Port published on the host
    #[arg(long)]
    pub port: Option<u16>,

    /// Named volume for registry storage
    #[arg(long)]
    pub volume: Option<String>,

    /// Proxy and cache Docker Hub pulls
    #[arg(long)]
    pub cache: bool,

    /// Restart the registry unless stopped manually
    #[arg(long)]
    pub auto_restart: bool,

    /// Base registries.yaml merged into the node configuration
    /// (default: ~/.k3d/registries.yaml if present)
    #[arg(long, value_name = "FILE")]
    pub base_config: Option<PathBuf>,

    /// Leave the registry out of the node configuration
    #[arg(long)]
    pub no_mirror: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Find or create the registry and attach it to a cluster network
    Ensure {
        /// Cluster whose network the registry joins
        #[arg(short, long)]
        cluster: Option<String>,

        #[command(flatten)]
        settings: SpecArgs,
    },

    /// Detach the registry from a cluster, removing it when no cluster is left
    Release {
        /// Cluster being deleted
        #[arg(short, long)]
        cluster: String,

        /// Keep the registry volume even if k3d created it
        #[arg(long)]
        keep_volume: bool,
    },

    /// Print the id of the registry container
    Find,

    /// Write the mirror configuration into a node container
    WriteConfig {
        /// Node container id or name
        #[arg(long)]
        node: String,

        #[command(flatten)]
        settings: SpecArgs,
    },

    /// Print the mirror configuration nodes would receive
    Render {
        #[command(flatten)]
        settings: SpecArgs,
    },
}
