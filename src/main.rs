#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use tracing::info;

use mongodb_connection_model::model::ConnectionDescriptor;
use mongodb_connection_model::tunnel::{SshTunnel, TunnelOptions};
use mongodb_connection_model::{Error, Result, uri};

/// Parse a MongoDB connection string or attribute file and print its
/// canonical forms.
#[derive(Parser, Debug)]
#[command(name = "mongodb-connection")]
#[command(version)]
#[command(about = "Inspect MongoDB connection descriptors", long_about = None)]
struct Cli {
    /// Connection string (`mongodb://` or `mongodb+srv://`)
    #[arg(required_unless_present = "attributes", conflicts_with = "attributes")]
    uri: Option<String>,

    /// Read connection attributes from a JSON file instead
    #[arg(long, value_name = "FILE")]
    attributes: Option<PathBuf>,

    /// Open the descriptor's SSH tunnel and hold it until Ctrl-C
    #[arg(long)]
    tunnel: bool,
}

#[cfg(feature = "dns")]
async fn parse_uri(input: &str) -> Result<ConnectionDescriptor> {
    if input.starts_with(uri::SRV_SCHEME) {
        let resolver = uri::SystemResolver::from_system_conf()?;
        return uri::parse(input, &resolver).await;
    }
    uri::parse(input, &uri::NoResolver).await
}

#[cfg(not(feature = "dns"))]
async fn parse_uri(input: &str) -> Result<ConnectionDescriptor> {
    uri::parse(input, &uri::NoResolver).await
}

async fn load(cli: &Cli) -> Result<ConnectionDescriptor> {
    if let Some(path) = &cli.attributes {
        let raw = tokio::fs::read_to_string(path).await?;
        let attributes = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        return ConnectionDescriptor::from_attributes(attributes);
    }
    match cli.uri.as_deref() {
        Some(input) => parse_uri(input).await,
        None => Err(Error::Config(
            "a connection string or --attributes is required".to_string(),
        )),
    }
}

async fn hold_tunnel(descriptor: &ConnectionDescriptor) -> Result<()> {
    let Some(config) = &descriptor.ssh_tunnel else {
        return Err(Error::Config("descriptor has no SSH tunnel".to_string()));
    };
    let target = descriptor.hosts.first().cloned().unwrap_or_default();

    let tunnel = SshTunnel::open(config, &target, &TunnelOptions::from_env()).await?;
    println!("{}", tunnel.local_addr());
    println!("{}", descriptor.driver_url_with_tunnel(tunnel.local_addr()));
    info!("SSH tunnel ready, press Ctrl-C to close it");

    tokio::signal::ctrl_c().await?;
    tunnel.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let descriptor = load(&cli).await?;

    println!("{}", descriptor.driver_url());
    println!("{}", serde_json::to_string_pretty(&descriptor.to_attributes())?);

    if cli.tunnel {
        hold_tunnel(&descriptor).await?;
    }

    Ok(())
}
