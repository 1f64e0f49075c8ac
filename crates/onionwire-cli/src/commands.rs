//! CLI command implementations.

use anyhow::{bail, Context, Result};
use onionwire_core::control::{reconcile, ControlPortClient, ControlPortConfig, ControlProbe};
use onionwire_core::identity::{generate_key_material, generate_vanity_keypair, OnionKeyMaterial};
use onionwire_core::protocol::{Delivery, MessagePayload};
use onionwire_core::transport::{
    Connection, ConnectionEvent, ConnectionEvents, Transport, TransportConfig,
};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Reject prefixes that can never appear in an onion address.
fn validate_prefix(prefix: &str) -> Result<()> {
    if let Some(c) = prefix
        .chars()
        .find(|c| !matches!(c.to_ascii_lowercase(), 'a'..='z' | '2'..='7'))
    {
        bail!("Invalid base32 character '{}' in prefix (must be a-z or 2-7)", c);
    }
    Ok(())
}

fn print_key(key: &OnionKeyMaterial) {
    println!("  Onion address: {}", key.onion_address().to_hostname());
    println!("  Public key:    {}", hex::encode(key.public_key()));
}

/// Show the address for a seed, or generate a new identity.
pub fn show_address(seed: Option<&str>) -> Result<()> {
    match seed {
        Some(seed) => {
            let key = OnionKeyMaterial::from_hex_seed(seed).context("Invalid seed")?;
            println!("\nOnion identity:");
            print_key(&key);
        }
        None => {
            let key = generate_key_material();
            println!("\nGenerated new identity:");
            print_key(&key);
            println!("  Seed:          {}", hex::encode(key.seed()));
            println!("\nWARNING: The seed is your secret key.");
            println!("Anyone who has it can host your onion address.");
        }
    }
    Ok(())
}

/// Print the expanded secret key Tor stores on disk.
pub fn expand(seed: &str) -> Result<()> {
    let key = OnionKeyMaterial::from_hex_seed(seed).context("Invalid seed")?;
    println!("{}", hex::encode(key.expanded_secret()));
    Ok(())
}

/// Search for an address with the given prefix.
pub async fn vanity(prefix: &str, max_attempts: u32) -> Result<()> {
    validate_prefix(prefix)?;

    println!("Searching for an address starting with '{}'...", prefix.to_ascii_lowercase());
    let owned = prefix.to_string();
    let found = tokio::task::spawn_blocking(move || generate_vanity_keypair(Some(&owned), max_attempts))
        .await
        .context("Vanity search task failed")?
        .context("No match found")?;

    println!("\nFound after {} attempts:", found.attempts);
    print_key(&found.key);
    println!("  Seed:          {}", hex::encode(found.key.seed()));
    Ok(())
}

/// Probe the control port.
pub async fn probe(config: ControlPortConfig) -> Result<()> {
    let endpoint = format!("{}:{}", config.host, config.port);
    match ControlPortClient::new(config).protocol_info().await {
        ControlProbe::Reachable { protocolinfo } => {
            println!("Tor control port {} is reachable:\n", endpoint);
            print!("{}", protocolinfo);
            Ok(())
        }
        ControlProbe::Unreachable { error } => {
            bail!("Tor control port {} is not reachable: {}", endpoint, error)
        }
    }
}

/// Run GETINFO for each key.
pub async fn get_info(config: ControlPortConfig, keys: &[String]) -> Result<()> {
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let info = ControlPortClient::new(config)
        .get_info(&keys)
        .await
        .context("GETINFO failed")?;

    for (key, value) in info {
        match value {
            Some(value) => println!("{}={}", key, value),
            None => println!("{} (not recognized)", key),
        }
    }
    Ok(())
}

/// List live onion services and check them against `expect`.
pub async fn live(config: ControlPortConfig, expect: &[String]) -> Result<()> {
    let report = ControlPortClient::new(config).get_live_onion_addresses().await;

    if let Some(version) = &report.version {
        println!("Tor version: {}", version);
    }
    if let Some(error) = &report.error {
        bail!("Could not list onion services: {}", error);
    }

    println!(
        "\nLive onion services ({}):",
        report.used_key.as_deref().unwrap_or("unknown key")
    );
    if report.onions.is_empty() {
        println!("  (none)");
    }
    for onion in &report.onions {
        println!("  {}.onion", onion);
    }

    if expect.is_empty() {
        return Ok(());
    }

    let result = reconcile(expect, &report.onions);
    println!("\nExpected services:");
    for onion in &result.active {
        println!("  [live]    {}.onion", onion);
    }
    for onion in &result.missing {
        println!("  [missing] {}.onion", onion);
    }
    for onion in &result.unexpected {
        println!("  [extra]   {}.onion", onion);
    }

    if !result.all_active() {
        bail!("{} expected service(s) not live", result.missing.len());
    }
    Ok(())
}

fn describe(delivery: &Delivery) -> String {
    match delivery {
        Delivery::Binary(bytes) => format!("<{} bytes> {}", bytes.len(), hex::encode(bytes)),
        Delivery::Message(MessagePayload::Text(text)) => text.clone(),
        Delivery::Message(MessagePayload::Parsed(value)) => value.to_string(),
    }
}

/// Print a connection's events until it closes.
async fn print_events(peer: String, mut events: ConnectionEvents) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Open => println!("[{}] connected", peer),
            ConnectionEvent::Message(delivery) => println!("[{}] {}", peer, describe(&delivery)),
            ConnectionEvent::Drained => {}
            ConnectionEvent::Error(e) => eprintln!("[{}] error: {}", peer, e),
            ConnectionEvent::Closed(reason) => {
                println!("[{}] closed ({:?})", peer, reason);
                break;
            }
        }
    }
}

/// Accept connections and print every message received.
pub async fn listen(host: &str, port: u16) -> Result<()> {
    let transport = Transport::default();
    let handle = transport
        .listen(port, host, |connection: Connection, events| {
            tokio::spawn(print_events(connection.peer().to_string(), events));
        })
        .await
        .with_context(|| format!("Failed to listen on {}:{}", host, port))?;

    if let Some(addr) = handle.local_addr() {
        println!("Listening on {}. Press Ctrl+C to stop.", addr);
    }

    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl+C")?;
    println!("\nShutting down...");
    handle.shutdown();
    Ok(())
}

/// Connect, send one message and close.
pub async fn dial(
    config: TransportConfig,
    address: &str,
    port: u16,
    message: &str,
    wait: Duration,
) -> Result<()> {
    let transport = Transport::new(config);
    let (connection, events) = transport
        .connect(address, port)
        .await
        .with_context(|| format!("Failed to connect to {}:{}", address, port))?;

    let payload = serde_json::from_str::<Value>(message)
        .unwrap_or_else(|_| Value::String(message.to_string()));
    connection.send(payload).context("Failed to send message")?;

    let printer = tokio::spawn(print_events(connection.peer().to_string(), events));

    // Let the writer flush before closing.
    let flushed = tokio::time::timeout(Duration::from_secs(10), async {
        while connection.buffered_amount() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if flushed.is_err() {
        warn!(buffered = connection.buffered_amount(), "Message not flushed before closing");
    }

    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }

    connection.close();
    let _ = printer.await;
    Ok(())
}
