//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - A tiny line-delimited JSON-RPC server to talk to

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "jsonrpc_link=debug"
    } else {
        "jsonrpc_link=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Serves `add` and `echo` over newline-delimited JSON on `listener`.
pub fn spawn_line_server(listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    let Ok(request) = serde_json::from_str::<Value>(&line) else {
                        continue;
                    };
                    let reply = answer(&request);
                    if write_half
                        .write_all(format!("{reply}\n").as_bytes())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
    })
}

fn answer(request: &Value) -> Value {
    let id = request["id"].clone();
    let params = &request["params"];

    match request["method"].as_str() {
        Some("add") => {
            let sum: i64 = params
                .as_array()
                .map(|values| values.iter().filter_map(Value::as_i64).sum())
                .unwrap_or_default();
            json!({"jsonrpc": "2.0", "id": id, "result": sum})
        }
        Some("echo") => json!({"jsonrpc": "2.0", "id": id, "result": params}),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        }),
    }
}
