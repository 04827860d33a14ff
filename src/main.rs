mod app;
mod cli;
mod config;
mod logging;
mod session;
mod terminal;

use std::io::{self, stdout, BufRead, Write};
use std::panic;

use anyhow::{bail, Result};
use tracing::info;

use crate::app::{App, Outcome};
use crate::config::{Config, NodeEntry};
use crate::session::{SessionOptions, WsConnector};
use crate::terminal::escape::{color, fg, BOLD, DIM, RESET};
use crate::terminal::{CrosstermHost, TerminalSurface};

fn setup_panic_handler() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        terminal::host::emergency_restore();
        original_hook(panic_info);
    }));
}

/// Print the node list and read a choice; `None` quits
fn pick_node(nodes: &[NodeEntry]) -> Result<Option<String>> {
    println!();
    println!("{BOLD}{}NODETERM{RESET} {DIM}choose a node{RESET}", fg(color::CYAN));
    for (i, node) in nodes.iter().enumerate() {
        println!("  {BOLD}{:>2}{RESET}  {:<24} {DIM}{}{RESET}", i + 1, node.name, node.address);
    }
    print!("\nNumber or address (empty to quit): ");
    stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(choose(nodes, line.trim()))
}

fn choose(nodes: &[NodeEntry], input: &str) -> Option<String> {
    if input.is_empty() || input.eq_ignore_ascii_case("q") {
        return None;
    }
    if let Ok(n) = input.parse::<usize>() {
        if let Some(node) = n.checked_sub(1).and_then(|i| nodes.get(i)) {
            return Some(node.address.clone());
        }
    }
    nodes
        .iter()
        .find(|node| node.name == input)
        .map(|node| node.address.clone())
        .or_else(|| Some(input.to_string()))
}

fn print_outcome(host: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Closed => println!("Session to {} closed.", host),
        Outcome::Detached => println!("Disconnected from {}.", host),
        Outcome::Failed(reason) => {
            println!("{}Session to {} failed:{} {}", fg(color::RED), host, RESET, reason)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Err(e) = logging::log_path().and_then(|path| logging::init(&path)) {
        eprintln!("Warning: logging disabled: {}", e);
    }
    let settings = cli::resolve(&args, &mut config)?;
    info!(gateway = %settings.gateway_url, protocol = settings.protocol.as_str(), "starting");

    setup_panic_handler();

    let options = SessionOptions {
        gateway_url: settings.gateway_url.clone(),
        protocol: settings.protocol,
        basic_auth: settings.basic_auth.clone(),
    };
    let mut app = App::new(WsConnector, options, config.fit_delay(), || {
        TerminalSurface::new(Box::new(CrosstermHost::default()), Box::new(stdout()))
    });

    if let Some(host) = &args.host {
        let outcome = app.run(host, settings.credential.clone()).await?;
        print_outcome(host, &outcome);
        return Ok(());
    }

    if config.nodes.is_empty() {
        bail!("No HOST given and no [[nodes]] in {}", Config::config_path()?.display());
    }
    // Back to the list after every session
    while let Some(host) = pick_node(&config.nodes)? {
        let outcome = app.run(&host, settings.credential.clone()).await?;
        print_outcome(&host, &outcome);
    }

    Ok(())
}
