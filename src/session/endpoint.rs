//! Gateway endpoint addressing
//!
//! Sessions live at `{gateway}/ws/ssh/{hostAddress}`. Gateways that also sit
//! behind the dashboard's Basic auth take it as an `authorization` query
//! parameter, since browsers cannot set headers on a WebSocket upgrade.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use url::Url;

/// Build the WebSocket URL for a node's terminal session
pub fn session_url(gateway: &str, host: &str, basic_auth: Option<&str>) -> Result<String> {
    let host = host.trim();
    if host.is_empty()
        || host.contains(&['/', '?', '#', '\\'][..])
        || host.chars().any(char::is_whitespace)
    {
        bail!("Invalid node address: {:?}", host);
    }

    let mut url = Url::parse(gateway.trim())
        .with_context(|| format!("Invalid gateway URL {}", gateway))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => bail!("Unsupported gateway scheme {:?} (use ws, wss, http or https)", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot use scheme {} for {}", scheme, gateway))?;

    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| anyhow!("Gateway URL {} cannot carry a path", gateway))?
        .pop_if_empty()
        .extend(["ws", "ssh", host]);

    if let Some(basic) = basic_auth {
        let token = base64::engine::general_purpose::STANDARD.encode(basic);
        url.query_pairs_mut()
            .append_pair("authorization", &format!("Basic {}", token));
    }

    Ok(url.to_string())
}
