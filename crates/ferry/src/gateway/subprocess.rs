//! Session gateway backed by an external program.
//!
//! The program owns login, verification and session files. Ferry writes one
//! [`GatewayRequest`] per line to its stdin and reads one [`GatewayReply`] per
//! line from its stdout. Its stderr is inherited so gateway logs end up next
//! to ours.
//!
//! Requests are strictly sequential: the connection mutex is held for the
//! whole request/reply exchange. If the program exits or a pipe breaks, the
//! connection is dropped and the next request spawns a fresh process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use ferry_gateway_protocol::{
    AuthStatus, GatewayCommand, GatewayReply, GatewayRequest, MessagePage,
};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ChannelId, GatewayError, MessageId, RawMessage, SessionGateway};
use crate::config::GatewayConfig;

/// How to start the gateway program.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl From<&GatewayConfig> for LaunchSpec {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            workdir: config.workdir.clone(),
        }
    }
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// JSON Lines client for an external session gateway.
pub struct SubprocessGateway {
    spec: LaunchSpec,
    conn: Mutex<Option<Connection>>,
}

impl SubprocessGateway {
    /// Create a gateway client. The program is spawned on first use.
    pub fn new(spec: LaunchSpec) -> Self {
        Self {
            spec,
            conn: Mutex::new(None),
        }
    }

    /// Send a command and decode the reply's `result` as `T`.
    async fn call<T: DeserializeOwned>(&self, command: GatewayCommand) -> Result<T, GatewayError> {
        let value = self.request(command).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn request(&self, command: GatewayCommand) -> Result<serde_json::Value, GatewayError> {
        let mut guard = self.conn.lock().await;

        let alive = match guard.as_mut() {
            Some(conn) => matches!(conn.child.try_wait(), Ok(None)),
            None => false,
        };
        if !alive {
            if guard.is_some() {
                warn!(command = %self.spec.command, "Gateway process exited, respawning");
            }
            *guard = Some(self.spawn()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(GatewayError::Protocol("gateway connection unavailable".to_string()));
        };

        let request = GatewayRequest {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            command,
        };
        let op = request.command.name();
        debug!(id = %request.id, op, "Gateway request");

        match exchange(conn, &request).await {
            Ok(reply) => {
                if let Some(failure) = reply.error {
                    return Err(failure.into());
                }
                Ok(reply.result.unwrap_or(serde_json::Value::Null))
            }
            Err(e) => {
                if matches!(e, GatewayError::Io(_)) {
                    // Broken pipe or EOF: the next request starts over.
                    if let Some(mut conn) = guard.take() {
                        let _ = conn.child.start_kill();
                    }
                }
                Err(e)
            }
        }
    }

    fn spawn(&self) -> Result<Connection, GatewayError> {
        let mut cmd = Command::new(&self.spec.command);
        cmd.args(&self.spec.args);
        if let Some(dir) = &self.spec.workdir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        // SAFETY: pre_exec runs in the forked child before exec. PR_SET_PDEATHSIG
        // makes the gateway receive SIGTERM when Ferry dies. No shared state is
        // touched in the callback.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Protocol("gateway stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Protocol("gateway stdout not captured".to_string()))?;

        info!(command = %self.spec.command, pid = ?child.id(), "Spawned session gateway");

        Ok(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

/// Write one request line and read lines until the matching reply arrives.
async fn exchange(
    conn: &mut Connection,
    request: &GatewayRequest,
) -> Result<GatewayReply, GatewayError> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    conn.stdin.write_all(line.as_bytes()).await?;
    conn.stdin.flush().await?;

    loop {
        let Some(raw) = conn.stdout.next_line().await? else {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "gateway closed its stdout",
            )));
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let reply: GatewayReply = serde_json::from_str(raw)?;
        if reply.id == request.id {
            return Ok(reply);
        }
        // A reply to a request that was abandoned earlier.
        warn!(expected = %request.id, got = %reply.id, "Discarding stale gateway reply");
    }
}

#[async_trait]
impl SessionGateway for SubprocessGateway {
    async fn is_authenticated(&self) -> Result<bool, GatewayError> {
        let status: AuthStatus = self.call(GatewayCommand::IsAuthenticated).await?;
        Ok(status.authenticated)
    }

    async fn fetch_messages(
        &self,
        channel: ChannelId,
        after_id: MessageId,
        limit: u32,
    ) -> Result<Vec<RawMessage>, GatewayError> {
        let page: MessagePage = self
            .call(GatewayCommand::FetchMessages {
                channel_id: channel,
                after_id,
                limit,
            })
            .await?;
        Ok(page.messages)
    }

    async fn forward(
        &self,
        from: ChannelId,
        to: ChannelId,
        messages: &[RawMessage],
    ) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .call(GatewayCommand::Forward {
                from_channel_id: from,
                to_channel_id: to,
                message_ids: messages.iter().map(|m| m.id).collect(),
            })
            .await?;
        Ok(())
    }

    async fn shutdown(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(mut conn) = guard.take() {
            // Closing stdin lets a well-behaved gateway flush its session file.
            drop(conn.stdin);
            if let Err(e) = conn.child.kill().await {
                warn!(error = %e, "Failed to stop session gateway");
            }
            info!("Session gateway stopped");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A gateway written in shell: echoes the request id back with a fixed body.
    fn scripted(body: &str) -> SubprocessGateway {
        let script = format!(
            r#"while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
  printf '{{"id":"%s",{body}}}\n' "$id"
done"#
        );
        SubprocessGateway::new(LaunchSpec {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script],
            workdir: None,
        })
    }

    #[tokio::test]
    async fn is_authenticated_reads_result() {
        let gateway = scripted(r#""result":{"authenticated":true}"#);
        assert!(gateway.is_authenticated().await.unwrap());
        // Second call reuses the same process.
        assert!(gateway.is_authenticated().await.unwrap());
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn fetch_messages_decodes_page() {
        let gateway = scripted(r#""result":{"messages":[{"id":4},{"id":5,"group_key":77}]}"#);
        let page = gateway.fetch_messages(-100, 3, 100).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].group_key, Some(77));
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn error_reply_maps_to_typed_error() {
        let gateway = scripted(r#""error":{"kind":"rate_limited","wait_seconds":7}"#);
        let err = gateway
            .forward(1, 2, &[RawMessage::new(10, None)])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited { wait } if wait == Duration::from_secs(7)));
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn exited_gateway_is_respawned() {
        // Answers one request, then exits.
        let script = r#"IFS= read -r line
id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
printf '{"id":"%s","result":{"authenticated":true}}\n' "$id""#;
        let gateway = SubprocessGateway::new(LaunchSpec {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            workdir: None,
        });

        assert!(gateway.is_authenticated().await.unwrap());
        // Give the shell time to exit so the liveness probe notices.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(gateway.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let gateway = SubprocessGateway::new(LaunchSpec {
            command: "/nonexistent/ferry-gateway".to_string(),
            args: Vec::new(),
            workdir: None,
        });
        let err = gateway.is_authenticated().await.unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
    }
}
