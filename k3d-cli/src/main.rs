// External crates
use clap::Parser;
use tracing::debug;

// Internal imports
use k3d_core::{k3d_error, k3d_error_hint, K3dError};

// Local modules
mod cli;
mod commands;
mod tracing_init;

use cli::Args;
use commands::execute_command;

fn main() {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    if let Err(e) = tracing_init::init_with_defaults(default_filter) {
        k3d_error!("{}", e);
    }
    debug!("Starting k3d-registry {:?}", args.command);

    if let Err(e) = execute_command(args) {
        k3d_error!("❌ {:#}", e);
        if e
            .downcast_ref::<K3dError>()
            .is_some_and(K3dError::is_unavailable)
        {
            k3d_error_hint!("Make sure the Docker daemon is running and reachable");
        }
        std::process::exit(1);
    }
}
