//! CLI argument parsing and startup settings
//!
//! Handles command-line argument parsing and resolves the gateway,
//! credential and protocol from flags, environment and the config file.

use std::env;

use anyhow::{bail, Result};

use crate::config::Config;
use crate::session::{Credential, ProtocolMode};

pub const USAGE: &str = "\
Usage: nodeterm [HOST] [OPTIONS]

Open an interactive shell on HOST through the monitoring gateway.
Without HOST, pick a node from the list in ~/.nodeterm/config.toml.

Options:
  -g, --gateway URL        Gateway base URL (remembered for next time)
  -t, --credential TOKEN   Session credential
  -b, --basic USER:PASS    Dashboard login for the gateway handshake
  -p, --protocol MODE      markers (default) or structured
  -h, --help               Show this help

Environment:
  NODETERM_GATEWAY, NODETERM_CREDENTIAL, NODETERM_LOG

Press Ctrl+] to leave a session.";

/// Parsed command-line arguments
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Args {
    pub host: Option<String>,
    pub gateway: Option<String>,
    pub credential: Option<String>,
    pub basic_auth: Option<String>,
    pub protocol: Option<ProtocolMode>,
    pub help: bool,
}

/// Parse command-line arguments
pub fn parse_args() -> Result<Args> {
    parse_from(env::args().skip(1)) // Skip the binary name
}

pub fn parse_from(argv: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = argv.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                args.help = true;
            }
            "--gateway" | "-g" => {
                args.gateway = Some(value(&mut iter, &arg)?);
            }
            "--credential" | "-t" => {
                args.credential = Some(value(&mut iter, &arg)?);
            }
            "--basic" | "-b" => {
                let value = value(&mut iter, &arg)?;
                if !value.contains(':') {
                    bail!("--basic expects USER:PASS");
                }
                args.basic_auth = Some(value);
            }
            "--protocol" | "-p" => {
                let value = value(&mut iter, &arg)?;
                match ProtocolMode::parse(&value) {
                    Some(mode) => args.protocol = Some(mode),
                    None => bail!("Unknown protocol: {}. Use 'markers' or 'structured'.", value),
                }
            }
            _ if arg.starts_with('-') => bail!("Unknown option: {}", arg),
            _ => {
                if args.host.is_some() {
                    bail!("Only one HOST may be given");
                }
                args.host = Some(arg);
            }
        }
    }

    Ok(args)
}

fn value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    match iter.next() {
        Some(value) => Ok(value),
        None => bail!("{} requires a value", flag),
    }
}

/// Settings for this run, after flags, environment and config are merged
pub struct Settings {
    pub gateway_url: String,
    pub credential: Option<Credential>,
    pub basic_auth: Option<String>,
    pub protocol: ProtocolMode,
}

/// Resolve settings from explicit args, env vars, then the config file
/// An explicit gateway is saved to config for future use.
pub fn resolve(args: &Args, config: &mut Config) -> Result<Settings> {
    if let Some(gateway) = &args.gateway {
        if config.gateway_url.as_deref() != Some(gateway.as_str()) {
            config.set_gateway_url(gateway)?;
        }
    }

    let gateway_url = first_of(
        args.gateway.clone(),
        env::var("NODETERM_GATEWAY").ok(),
        config.gateway_url.clone(),
    );
    let Some(gateway_url) = gateway_url else {
        bail!("No gateway configured. Pass --gateway URL or set NODETERM_GATEWAY.");
    };

    let credential = first_of(
        args.credential.clone(),
        env::var("NODETERM_CREDENTIAL").ok(),
        config.credential.clone(),
    )
    .map(Credential::new);

    let protocol = match args.protocol {
        Some(mode) => mode,
        None => ProtocolMode::parse(&config.protocol).unwrap_or_default(),
    };

    Ok(Settings {
        gateway_url,
        credential,
        basic_auth: args.basic_auth.clone().or_else(|| config.basic_auth.clone()),
        protocol,
    })
}

/// First non-empty value in resolution order
fn first_of(flag: Option<String>, env: Option<String>, config: Option<String>) -> Option<String> {
    [flag, env, config]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}
