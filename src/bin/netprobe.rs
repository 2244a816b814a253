//! netprobe
//!
//! Runs one network measurement step and prints its outcome:
//! - `resolve` a domain with the system resolver
//! - `dial` a TCP endpoint
//! - `tls` handshake with an endpoint
//! - `quic` handshake with an endpoint
//!
//! Each run prints a JSON document holding the failure string (or the
//! negotiated parameters) and the network events collected on the way.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use netprobe::{
    config::{generate_example_config, Config},
    logging,
    netx::Netx,
    tlsx::configure_tls_version,
    trace::MeasurementTrace,
    Context,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Network measurement probe
#[derive(Parser, Debug)]
#[command(name = "netprobe")]
#[command(about = "Observable, classifiable network operations")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "netprobe.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error), overrides config
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Log format (pretty, json, compact), overrides config
    #[arg(long)]
    log_format: Option<String>,

    /// Overall deadline of the measurement in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a domain name
    Resolve { domain: String },

    /// Connect to a TCP endpoint
    Dial { address: String },

    /// Connect and perform a TLS handshake
    Tls {
        address: String,

        /// Server name to send (defaults to the host)
        #[arg(long)]
        sni: Option<String>,

        /// ALPN protocols, comma separated
        #[arg(long, value_delimiter = ',')]
        alpn: Vec<String>,

        /// Pin the TLS version (TLSv1.2, TLSv1.3)
        #[arg(long)]
        tls_version: Option<String>,

        /// Skip certificate verification
        #[arg(long)]
        insecure: bool,
    },

    /// Perform a QUIC handshake
    #[cfg(feature = "quic")]
    Quic {
        address: String,

        #[arg(long)]
        sni: Option<String>,

        #[arg(long, value_delimiter = ',')]
        alpn: Vec<String>,
    },

    /// Print an example configuration file
    GenerateConfig,
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(path).with_context(|| format!("loading {}", path))
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.logging.format = format.clone();
    }
    logging::init(&config.logging)?;
    debug!("Configuration: {:?}", config.netx);

    let netx = config.netx.build();
    let trace = Arc::new(MeasurementTrace::new());
    let ctx = Context::new()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_trace(trace.clone());

    let outcome = match args.command {
        Command::GenerateConfig => {
            println!("{}", toml::to_string_pretty(&generate_example_config())?);
            return Ok(());
        }
        Command::Resolve { domain } => resolve(&netx, &ctx, &domain).await,
        Command::Dial { address } => dial(&netx, &ctx, &address).await,
        Command::Tls {
            address,
            sni,
            alpn,
            tls_version,
            insecure,
        } => {
            let mut tls_config = config.netx.tls_config()?;
            if let Some(version) = tls_version {
                configure_tls_version(&mut tls_config, &version)?;
            }
            if let Some(sni) = sni {
                tls_config.server_name = sni;
            }
            tls_config.next_protos = alpn;
            tls_config.insecure_skip_verify = insecure;
            tls(&netx, &ctx, &address, tls_config).await
        }
        #[cfg(feature = "quic")]
        Command::Quic { address, sni, alpn } => {
            let mut tls_config = config.netx.tls_config()?;
            if let Some(sni) = sni {
                tls_config.server_name = sni;
            }
            tls_config.next_protos = alpn;
            quic(&netx, &ctx, &address, tls_config).await
        }
    };

    let events = serde_json::to_value(trace.take_events())?;
    let report = match outcome {
        Ok(mut value) => {
            value["failure"] = Value::Null;
            value["network_events"] = events;
            value
        }
        Err(err) => {
            info!("Measurement failed: {}", err);
            json!({
                "failure": err.failure().map(str::to_string).unwrap_or_else(|| err.to_string()),
                "operation": err.operation().map(|op| op.as_str()),
                "network_events": events,
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn resolve(netx: &Netx, ctx: &Context, domain: &str) -> netprobe::Result<Value> {
    let addrs = netx.new_stdlib_resolver().lookup_host(ctx, domain).await?;
    Ok(json!({
        "addresses": addrs.iter().map(|addr| addr.to_string()).collect::<Vec<_>>(),
    }))
}

async fn dial(netx: &Netx, ctx: &Context, address: &str) -> netprobe::Result<Value> {
    let dialer = netx.new_dialer_with_resolver(netx.new_stdlib_resolver());
    let conn = dialer.dial_context(ctx, "tcp", address).await?;
    Ok(json!({
        "local_address": conn.local_addr()?.to_string(),
        "remote_address": conn.remote_addr()?.to_string(),
    }))
}

async fn tls(
    netx: &Netx,
    ctx: &Context,
    address: &str,
    config: netprobe::tlsx::TlsConfig,
) -> netprobe::Result<Value> {
    let dialer = netx.new_tls_dialer_with_config(
        netx.new_dialer_with_resolver(netx.new_stdlib_resolver()),
        netx.new_tls_handshaker(),
        config,
    );
    let conn = dialer.dial_tls_context(ctx, "tcp", address).await?;
    let state = conn.connection_state();
    Ok(json!({
        "remote_address": conn.remote_addr()?.to_string(),
        "server_name": state.server_name,
        "negotiated_protocol": state.negotiated_protocol,
        "tls_version": state.version_string(),
        "cipher_suite": state.cipher_suite_string(),
        "peer_certificates": state.peer_certificates.len(),
    }))
}

#[cfg(feature = "quic")]
async fn quic(
    netx: &Netx,
    ctx: &Context,
    address: &str,
    config: netprobe::tlsx::TlsConfig,
) -> netprobe::Result<Value> {
    let dialer = netx.new_quic_dialer_with_resolver(netx.new_stdlib_resolver());
    let conn = dialer.dial_context(ctx, address, &config).await?;
    let state = conn.connection_state();
    let report = json!({
        "remote_address": conn.remote_address().to_string(),
        "server_name": state.server_name,
        "negotiated_protocol": state.negotiated_protocol,
        "tls_version": state.version_string(),
        "peer_certificates": state.peer_certificates.len(),
    });
    conn.close();
    Ok(report)
}
