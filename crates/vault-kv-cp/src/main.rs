mod telemetry;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use vault_kv_cp_core::{Endpoint, migrate};
use vault_kv_cp_http::{DESTINATION_PREFIX, SOURCE_PREFIX, VaultConfig, connect};

/// Copy the latest version of every secret under a source KV v2 mount to the
/// same path under a destination mount, overwriting what is there.
///
/// Each Vault is configured from the environment: SOURCE_VAULT_ADDR,
/// SOURCE_VAULT_TOKEN and SOURCE_VAULT_CACERT for the source, and the same
/// variables prefixed with DESTINATION_ for the destination.
#[derive(Parser)]
#[command(name = "vault-kv-cp")]
struct Cli {
    /// KV v2 mount path in the source Vault
    #[arg(value_name = "source-kv-mount-path")]
    source_mount: String,
    /// KV v2 mount path in the destination Vault
    #[arg(value_name = "destination-kv-mount-path")]
    destination_mount: String,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    telemetry::init()?;

    let source_config =
        VaultConfig::from_env(SOURCE_PREFIX).context("invalid source Vault configuration")?;
    let source = connect(&source_config).context("error creating source vault client")?;

    let destination_config = VaultConfig::from_env(DESTINATION_PREFIX)
        .context("invalid destination Vault configuration")?;
    let destination =
        connect(&destination_config).context("error creating destination vault client")?;

    info!(
        source = %source_config.addr,
        source_mount = %cli.source_mount,
        destination = %destination_config.addr,
        destination_mount = %cli.destination_mount,
        "starting migration"
    );
    let summary = migrate(
        Endpoint::new(&source, &cli.source_mount),
        Endpoint::new(&destination, &cli.destination_mount),
    )?;
    info!(
        secrets = summary.secrets,
        directories = summary.directories,
        "migration complete"
    );
    Ok(())
}
