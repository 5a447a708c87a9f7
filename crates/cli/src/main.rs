//! harnessctl (§10.7): a thin client for locating a running
//! harness-gatewayd daemon and probing it over the wire protocol.
//!
//! Locates the daemon the same way the daemon advertises itself — the
//! gateway record file — then speaks raw NDJSON envelopes over TCP. No
//! business logic lives here; this is a debugging and scripting tool,
//! not a full client SDK.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use harness_protocol::command::Command;
use harness_protocol::envelope::ClientEnvelope;
use harness_protocol::new_id;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "harnessctl", about = "Thin client for a running harness-gatewayd daemon", version)]
struct Cli {
    /// Runtime directory the daemon was started with (default: ~/.harness)
    #[arg(long, global = true, env = "HARNESS_RUNTIME")]
    runtime_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Report whether a daemon is running, per its gateway record
    Status,

    /// Send one raw `Command` (as JSON) and print the `CommandResult`
    Call {
        /// JSON body of a `harness_protocol::command::Command` variant,
        /// e.g. '{"kind":"directory.list"}'
        command_json: String,
    },
}

/// Mirrors `harness_gatewayd::gateway::GatewayRecord` — duplicated here
/// rather than pulled in as a dependency, since the CLI only ever reads
/// the file the daemon writes and has no other use for the server crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GatewayRecord {
    pid: u32,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    started_at: chrono::DateTime<chrono::Utc>,
    version: u32,
}

fn runtime_dir(cli: &Cli) -> PathBuf {
    cli.runtime_dir
        .clone()
        .or_else(|| std::env::var("HARNESS_RUNTIME").ok().map(PathBuf::from))
        .unwrap_or_else(|| dirs::home_dir().expect("HOME directory not found").join(".harness"))
}

fn read_record(path: &PathBuf) -> Result<Option<GatewayRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let record_path = runtime_dir(&cli).join("gateway.json");

    match &cli.command {
        Cmd::Status => cmd_status(&record_path),
        Cmd::Call { command_json } => cmd_call(&record_path, command_json).await,
    }
}

fn cmd_status(record_path: &PathBuf) -> Result<()> {
    match read_record(record_path)? {
        None => {
            println!("Not running.");
            Ok(())
        }
        Some(record) if process_alive(record.pid) => {
            println!("PID: {} (running)", record.pid);
            println!("Port: {}", record.port);
            println!("Started: {}", record.started_at);
            Ok(())
        }
        Some(record) => {
            println!("PID: {} (stale — process not found)", record.pid);
            Ok(())
        }
    }
}

async fn cmd_call(record_path: &PathBuf, command_json: &str) -> Result<()> {
    let record = read_record(record_path)?.ok_or_else(|| anyhow!("no running daemon (gateway record not found)"))?;
    if !process_alive(record.pid) {
        bail!("gateway record is stale — pid {} is not running", record.pid);
    }
    let token = record
        .auth_token
        .clone()
        .ok_or_else(|| anyhow!("gateway record has no auth token"))?;

    let command: Command = serde_json::from_str(command_json).context("parsing command JSON")?;

    let stream = TcpStream::connect(("127.0.0.1", record.port))
        .await
        .with_context(|| format!("connecting to 127.0.0.1:{}", record.port))?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    send(&mut write_half, &ClientEnvelope::Auth { token }).await?;
    match next_line(&mut lines).await? {
        Some(line) if line.contains("\"auth.ok\"") => {}
        Some(line) => bail!("authentication failed: {line}"),
        None => bail!("connection closed before authentication completed"),
    }

    let command_id = new_id();
    send(
        &mut write_half,
        &ClientEnvelope::Command {
            command_id: command_id.clone(),
            command,
        },
    )
    .await?;

    loop {
        let Some(line) = tokio::time::timeout(Duration::from_secs(10), next_line(&mut lines))
            .await
            .context("timed out waiting for a response")??
        else {
            bail!("connection closed before the command completed");
        };

        let value: serde_json::Value = serde_json::from_str(&line).context("parsing server envelope")?;
        let Some(kind) = value.get("kind").and_then(|k| k.as_str()) else {
            continue;
        };
        match kind {
            "command.completed" if value.get("commandId").and_then(|v| v.as_str()) == Some(command_id.as_str()) => {
                let pretty = serde_json::to_string_pretty(&value["result"])?;
                println!("{pretty}");
                return Ok(());
            }
            "command.failed" if value.get("commandId").and_then(|v| v.as_str()) == Some(command_id.as_str()) => {
                bail!("command failed: {}", value["error"]);
            }
            _ => continue,
        }
    }
}

async fn send(write_half: &mut (impl AsyncWriteExt + Unpin), envelope: &ClientEnvelope) -> Result<()> {
    let mut line = serde_json::to_string(envelope)?;
    line.push('\n');
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

async fn next_line(lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>) -> Result<Option<String>> {
    Ok(lines.next_line().await?)
}
