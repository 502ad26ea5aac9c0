//! Stdio transport for MCP child-process servers
//!
//! This module implements [`StdioTransport`], which spawns a child process
//! and communicates with it over its stdin/stdout pipes using
//! newline-delimited JSON framing.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (`\n`).
//! - Inbound messages are read from the child's stdout, one JSON object per
//!   line. Each line is validated as a JSON-RPC message; a malformed line is
//!   reported as an error event and reading continues.
//! - The child's stderr is logged via `tracing::debug!` and never treated as
//!   an error condition.
//!
//! # Environment
//!
//! The child does not inherit the parent environment. It receives the
//! variables listed in [`DEFAULT_INHERITED_ENV_VARS`] (when set in the
//! parent) merged with the caller-supplied map, which wins on conflicts.
//!
//! # Lifecycle
//!
//! Nothing is spawned until [`Transport::start`]. Child exit (stdout EOF)
//! emits [`TransportEvent::Closed`](crate::mcp::transport::TransportEvent::Closed).
//! [`Transport::close`] kills the child; dropping the transport sends a
//! best-effort SIGTERM (Unix) or `start_kill` (non-Unix).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::error::{McpError, Result};
use crate::mcp::message::JsonRpcMessage;
use crate::mcp::transport::{EventChannel, EventStream, Transport, TransportEvent};

/// Variables copied from the parent environment into every child.
#[cfg(unix)]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

/// Variables copied from the parent environment into every child.
#[cfg(not(unix))]
pub const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// The subset of the parent environment that is safe to hand to a child.
///
/// Values that look like exported shell functions (`()...`) are skipped.
pub fn default_environment() -> HashMap<String, String> {
    DEFAULT_INHERITED_ENV_VARS
        .iter()
        .filter_map(|key| {
            let value = std::env::var(key).ok()?;
            if value.starts_with("()") {
                return None;
            }
            Some((key.to_string(), value))
        })
        .collect()
}

/// Stdio-based MCP transport that drives a child process.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use mcpwire::mcp::transport::{StdioTransport, Transport};
///
/// # #[tokio::main]
/// # async fn main() -> mcpwire::error::Result<()> {
/// let transport = StdioTransport::new(
///     "npx".into(),
///     vec!["-y".into(), "@modelcontextprotocol/server-everything".into()],
///     HashMap::new(),
///     None,
/// );
/// transport.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    started: AtomicBool,
    /// Present between a successful `start` and `close`.
    process: Mutex<Option<ChildProcess>>,
    events: std::sync::Arc<EventChannel>,
}

#[derive(Debug)]
struct ChildProcess {
    /// Sender side of the stdin channel; `send()` writes here.
    stdin_tx: mpsc::UnboundedSender<String>,
    child: Child,
}

impl StdioTransport {
    /// Describe a child process to spawn on [`Transport::start`].
    pub fn new(
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        cwd: Option<PathBuf>,
    ) -> Self {
        Self {
            command,
            args,
            env,
            cwd,
            started: AtomicBool::new(false),
            process: Mutex::new(None),
            events: std::sync::Arc::new(EventChannel::new()),
        }
    }

    /// OS process id of the running child, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|p| p.child.id())
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    /// Spawn the child process and wire up its pipes.
    ///
    /// # Errors
    ///
    /// Fails if the transport was already started, or if the process cannot
    /// be spawned.
    async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(McpError::transport("StdioTransport already started"));
        }

        let mut env = default_environment();
        env.extend(self.env.clone());

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(&env);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::transport_with(format!("failed to spawn MCP server `{}`", self.command), e)
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("child stdin unavailable after spawn"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("child stdout unavailable after spawn"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::transport("child stderr unavailable after spawn"))?;

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();

        // Background task: forward stdin_rx -> child stdin.
        let writer_events = std::sync::Arc::clone(&self.events);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{msg}\n");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    writer_events.report(McpError::transport_with("write to child stdin failed", e), None);
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        // Background task: child stdout -> validated messages; EOF closes.
        let reader_events = std::sync::Arc::clone(&self.events);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match JsonRpcMessage::parse(line) {
                            Ok(message) => reader_events.emit(TransportEvent::Message(message)),
                            Err(e) => {
                                tracing::warn!("malformed line from MCP server stdout: {e}");
                                reader_events.report(e, None);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        reader_events.report(McpError::transport_with("read from child stdout failed", e), None);
                        break;
                    }
                }
            }
            tracing::debug!("MCP server stdout closed");
            reader_events.close();
        });

        // Background task: drain child stderr -> tracing log.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "mcpwire::mcp::transport::stdio", "mcp server stderr: {line}");
            }
        });

        *self.process.lock().await = Some(ChildProcess { stdin_tx, child });
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        let line = serde_json::to_string(&message)?;
        let process = self.process.lock().await;
        let Some(process) = process.as_ref() else {
            return Err(McpError::transport("StdioTransport not connected"));
        };
        process
            .stdin_tx
            .send(line)
            .map_err(|_| McpError::transport("stdin channel closed"))
    }

    async fn close(&self) -> Result<()> {
        let process = self.process.lock().await.take();
        if let Some(mut process) = process {
            drop(process.stdin_tx);
            if let Err(e) = process.child.kill().await {
                tracing::debug!("failed to kill MCP server process: {e}");
            }
        }
        self.events.close();
        Ok(())
    }

    fn events(&self) -> EventStream {
        self.events.stream()
    }
}

impl Drop for StdioTransport {
    /// Best-effort termination of the child process on drop.
    ///
    /// This method MUST NOT block; it is fire-and-forget.
    fn drop(&mut self) {
        if let Ok(mut process) = self.process.try_lock() {
            if let Some(process) = process.as_mut() {
                #[cfg(unix)]
                {
                    if let Some(pid) = process.child.id() {
                        // SAFETY: pid is a valid process ID obtained from tokio::process::Child.
                        unsafe {
                            libc::kill(pid as libc::pid_t, libc::SIGTERM);
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = process.child.start_kill();
                }
            }
        }
    }
}
