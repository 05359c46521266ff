use anyhow::{bail, Context};
use dagchain_consensus::ConsensusNode;
use dagchain_core::{logging, Config};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const NODE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default_config(),
    };

    logging::init_from_config(&config.logging)?;

    let node = ConsensusNode::open(&config).context("failed to open consensus node")?;
    node.install_global_registry()?;
    let last_stable = node.advance_stability()?;
    let status = node.status()?;

    info!(
        units = status.units,
        tip = ?status.tip,
        last_stable_mci = ?last_stable,
        witness_set_version = status.witness_set_version,
        "Node ready"
    );
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn parse_config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            match args_iter.next() {
                Some(path) => return Ok(Some(PathBuf::from(path))),
                None => bail!("--config was provided without a path"),
            }
        }
    }
    Ok(None)
}
