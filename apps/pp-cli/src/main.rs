//! Dev harness for exercising `pp_core::Facade` by hand. Reads newline-
//! delimited JSON requests from stdin and writes newline-delimited JSON
//! responses to stdout; the real native-messaging length-prefixed framing
//! is an external collaborator this binary does not implement (spec §1).
//! Grounded on `guard-cli`'s clap `Subcommand` shape and
//! `dl-secure-channel`'s `tracing_subscriber`/env-var config init.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pp_core::kv::test_util::InMemoryKv;
use pp_core::{Config, Facade, KvStore};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "pp-cli")]
#[command(about = "Dev harness for the PearPass pairing/session core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read `{"op": "...", "params": {...}}` lines from stdin, dispatch each
    /// to the façade, and write one JSON response line per request.
    Serve,
    /// Print the current pairing code and exit, for manual testing.
    PairingCode,
}

fn native_messaging_enabled() -> bool {
    std::env::var("PP_NATIVE_MESSAGING_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true)
}

async fn serve(facade: Facade) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write_line(&mut stdout, &serde_json::json!({"error": {"code": "MissingField", "message": e.to_string()}})).await?;
                continue;
            }
        };
        let op = request.get("op").and_then(|v| v.as_str()).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(serde_json::json!({}));

        tracing::info!(op, "dispatching request");
        let body = match facade.dispatch(op, params).await {
            Ok(value) => serde_json::json!({ "result": value }),
            Err(e) => {
                let response: pp_proto::ErrorResponse = (&e).into();
                serde_json::json!({ "error": response })
            }
        };
        write_line(&mut stdout, &body).await?;
    }
    Ok(())
}

async fn write_line(stdout: &mut (impl AsyncWriteExt + Unpin), value: &serde_json::Value) -> Result<()> {
    let mut line = serde_json::to_string(value).map_err(|e| anyhow!(e))?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pp_core=info,pp_cli=info".into()),
        )
        .init();

    pp_crypto::init();

    let cli = Cli::parse();
    let kv: Arc<dyn KvStore> = Arc::new(InMemoryKv::new());
    let config = Config { native_messaging_enabled: native_messaging_enabled() };
    let facade = Facade::new(kv.clone(), config);

    match cli.command {
        Commands::Serve => serve(facade).await,
        Commands::PairingCode => {
            // Reach through the façade's one public re-export path: derive
            // the code the same way `getAppIdentity` would verify it, by
            // standing up the same components the façade wires internally.
            let identity = Arc::new(pp_core::IdentityStore::new(kv.clone()));
            let pairing = pp_core::PairingManager::new(kv, identity);
            println!("{}", pairing.pairing_code().await);
            Ok(())
        }
    }
}
