//! Two callers sharing one socket connection.
//!
//! Demonstrates:
//! - First registration triggering the connect
//! - Status pushes reaching every caller
//! - RPC errors surfacing on the caller that made the call
//! - Ending the client
//!
//! Usage:
//!   cargo run --example 001_shared_socket
//!   cargo run --example 001_shared_socket -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use jsonrpc_link::{Client, Phase, RpcCaller, Status, TransportKind};
use serde_json::json;
use tokio::net::TcpListener;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== 001: Shared Socket ===\n");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let server = common::spawn_line_server(listener);

    // ========================================================================
    // Create Client
    // ========================================================================

    let client = Client::builder()
        .host("127.0.0.1")
        .port(port)
        .transport(TransportKind::Socket)
        .retry_delay(Duration::from_millis(500))
        .build()?;

    // ========================================================================
    // Attach Callers
    // ========================================================================

    let adder = RpcCaller::attach(client.clone(), "add", |status: Status| {
        println!("        [adder] {}", status.text);
    })?;
    let echoer = RpcCaller::attach(client.clone(), "echo", |status: Status| {
        println!("        [echoer] {}", status.text);
    })?;

    client.wait_for_phase(Phase::Connected).await?;
    println!("[Call] add(1, 2, 3)");
    println!("        = {}", adder.invoke(None, json!([1, 2, 3])).await?);
    println!("[Call] echo(\"hi\")");
    println!("        = {}", echoer.invoke(None, json!("hi")).await?);

    // ========================================================================
    // Error Handling
    // ========================================================================

    println!("\n[Call] divide(1, 0)");
    match adder.invoke(Some("divide"), json!([1, 0])).await {
        Ok(value) => println!("        = {value}"),
        Err(e) => println!("        ✗ {e}"),
    }

    drop(echoer);
    drop(adder);

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[Cleanup] Ending client...");
    client.end().await;
    println!("        ✓ Ended ({:?})", client.phase());

    match client.call("add", vec![json!(1)]).await {
        Ok(value) => println!("        unexpected result {value}"),
        Err(e) => println!("        call after end: {e}"),
    }
    server.abort();

    Ok(())
}
