//! Stdio transports: the current process' pipes (server side) and a spawned
//! child process spoken to over its pipes (client side).

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{McpError, McpResult};
use crate::transport::{BoxedReader, BoxedWriter, Transport};

/// Speaks MCP over the current process' stdin/stdout.
///
/// The conventional server-side transport: the host process launches this
/// binary and owns the other end of the pipes.
#[derive(Debug, Default)]
pub struct StdioTransport {
    connected: bool,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self) -> McpResult<(BoxedReader, BoxedWriter)> {
        if self.connected {
            return Err(McpError::transport("stdio transport already connected"));
        }
        self.connected = true;
        debug!("stdio transport attached to process pipes");
        Ok((
            Box::new(tokio::io::stdin()),
            Box::new(tokio::io::stdout()),
        ))
    }
}

/// Spawns a server as a child process and speaks over its pipes.
pub struct ChildProcessTransport {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl ChildProcessTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// Parse a full command line (`program arg1 arg2 ...`).
    pub fn from_command_line(command: &str) -> McpResult<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| McpError::transport("empty command line"))?;
        Ok(Self::new(
            program,
            parts.map(|s| s.to_string()).collect(),
        ))
    }
}

#[async_trait]
impl Transport for ChildProcessTransport {
    async fn connect(&mut self) -> McpResult<(BoxedReader, BoxedWriter)> {
        if self.child.is_some() {
            return Err(McpError::transport("child process already running"));
        }

        info!(program = %self.program, "spawning server process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| McpError::transport(format!("failed to spawn {}: {}", self.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("child stdout unavailable"))?;

        self.child = Some(child);
        Ok((Box::new(stdout), Box::new(stdin)))
    }

    async fn close(&mut self) -> McpResult<()> {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
            info!(program = %self.program, "server process terminated");
        }
        Ok(())
    }
}
