// SSH 会话管理
// 单条 SSH 连接，命令执行走独立通道，文件操作走独立 SFTP 子会话

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Handle;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use tokio::net::TcpStream;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info};

use super::auth;
use super::config::{ClientConfig, HostKeyPolicy};
use super::error::SessionError;
use super::handler::ClientHandler;
use super::remote::{CommandOutput, FileInfo, RemoteSession};
use super::transfer;
use crate::progress::SharedProgress;

/// 默认 SSH 端口
pub const DEFAULT_PORT: u16 = 22;

/// SSH 会话
/// 连接建立后 Handle 在多个通道之间共享，Drop 时释放连接
pub struct SshSession {
    /// 服务器主机名
    host: String,
    /// 服务器端口
    port: u16,
    /// 共享客户端配置
    config: Arc<ClientConfig>,
    /// 共享的 russh Handle（连接成功后设置一次）
    handle: OnceCell<Arc<Handle<ClientHandler>>>,
}

impl Default for SshSession {
    /// 未配置目标的会话；默认配置按空 known_hosts 严格校验，未调用 `set_config` 时连接会被拒绝
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            config: Arc::new(ClientConfig::new(
                "",
                HostKeyPolicy::Strict {
                    known_hosts: PathBuf::new(),
                },
            )),
            handle: OnceCell::new(),
        }
    }
}

impl SshSession {
    /// 设置目标主机
    pub fn set_target(&mut self, host: impl Into<String>, port: u16) {
        self.host = host.into();
        self.port = port;
    }

    /// 设置客户端配置
    pub fn set_config(&mut self, config: Arc<ClientConfig>) {
        self.config = config;
    }

    fn connect_error(&self, cause: impl ToString) -> SessionError {
        SessionError::Connect {
            host: self.host.clone(),
            cause: cause.to_string(),
        }
    }

    fn handle(&self) -> Result<&Arc<Handle<ClientHandler>>, SessionError> {
        self.handle.get().ok_or_else(|| SessionError::NotConnected {
            host: self.host.clone(),
        })
    }

    /// 打开一个 SFTP 子会话
    async fn open_sftp(&self) -> Result<SftpSession, SessionError> {
        let sftp_error = |cause: String| SessionError::Sftp {
            host: self.host.clone(),
            cause,
        };

        let channel = self
            .handle()?
            .channel_open_session()
            .await
            .map_err(|e| sftp_error(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| sftp_error(format!("Failed to request sftp subsystem: {}", e)))?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| sftp_error(e.to_string()))
    }

    /// 关闭 SFTP 子会话；关闭失败只记录日志
    async fn close_sftp(&self, sftp: SftpSession) {
        if let Err(e) = sftp.close().await {
            debug!("[SFTP] Failed to close subsession on '{}': {}", self.host, e);
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn connect(&self) -> Result<(), SessionError> {
        if self.handle.get().is_some() {
            return Ok(());
        }

        let addr = format!("{}:{}", self.host, self.port);
        info!("[SSH] Connecting to {} as '{}'...", addr, self.config.user);

        let tcp_stream = timeout(self.config.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| self.connect_error(format!("dial tcp {}: i/o timeout", addr)))?
            .map_err(|e| self.connect_error(e))?;

        let handler = ClientHandler::new(
            self.host.clone(),
            self.port,
            self.config.host_key_policy.clone(),
        );

        let mut handle = timeout(
            self.config.timeout,
            russh::client::connect_stream(
                Arc::new(self.config.to_russh_config()),
                tcp_stream,
                handler,
            ),
        )
        .await
        .map_err(|_| self.connect_error("ssh handshake timed out"))?
        .map_err(|e| self.connect_error(e))?;

        auth::authenticate(&mut handle, &self.config)
            .await
            .map_err(|e| self.connect_error(e))?;

        info!("[SSH] Connected to {}", addr);

        // 并发 connect 时只保留第一条连接
        let _ = self.handle.set(Arc::new(handle));
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError> {
        let mut channel = self
            .handle()?
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel {
                host: self.host.clone(),
                cause: e.to_string(),
            })?;

        debug!("[SSH] Running '{}' on '{}'", command, self.host);

        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Exec {
                host: self.host.clone(),
                command: command.to_string(),
                cause: e.to_string(),
            })?;

        let mut output = CommandOutput::default();
        let mut exit_status = None;
        let mut exit_signal = None;

        // 读到通道关闭为止，ExitStatus 可能在 Eof 之后到达
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        output.stderr.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    exit_signal = Some(format!("{:?}", signal_name))
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        command_result(&self.host, command, output, exit_status, exit_signal)
    }

    async fn get_content(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        let sftp = self.open_sftp().await?;
        let result = transfer::get_content(&sftp, &self.host, path).await;
        self.close_sftp(sftp).await;
        result
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>, SessionError> {
        let sftp = self.open_sftp().await?;
        let result = transfer::list_directory(&sftp, &self.host, path).await;
        self.close_sftp(sftp).await;
        result
    }

    async fn receive_file(
        &self,
        src: &str,
        dest: &Path,
        progress: Option<SharedProgress>,
    ) -> Result<(), SessionError> {
        let sftp = self.open_sftp().await?;
        let result = transfer::receive_file(&sftp, &self.host, src, dest, progress).await;
        self.close_sftp(sftp).await;
        result
    }

    async fn receive_directory(
        &self,
        src: &str,
        dest: &Path,
        progress: Option<SharedProgress>,
    ) -> Result<(), SessionError> {
        let sftp = self.open_sftp().await?;
        let result = transfer::receive_directory(&sftp, &self.host, src, dest, progress).await;
        self.close_sftp(sftp).await;
        result
    }

    async fn remove(&self, path: &str) -> Result<(), SessionError> {
        let sftp = self.open_sftp().await?;
        let result = transfer::remove(&sftp, &self.host, path).await;
        self.close_sftp(sftp).await;
        result
    }
}

/// 按退出状态组装命令结果；失败时错误中保留已捕获的输出
fn command_result(
    host: &str,
    command: &str,
    mut output: CommandOutput,
    exit_status: Option<u32>,
    exit_signal: Option<String>,
) -> Result<CommandOutput, SessionError> {
    match (exit_status, exit_signal) {
        (Some(status), _) => {
            output.exit_status = status;
            if output.is_success() {
                Ok(output)
            } else {
                Err(SessionError::NonZeroExit {
                    host: host.to_string(),
                    command: command.to_string(),
                    status,
                    output,
                })
            }
        }
        (None, Some(signal)) => Err(SessionError::Signaled {
            host: host.to_string(),
            command: command.to_string(),
            signal,
            output,
        }),
        (None, None) => Err(SessionError::Exec {
            host: host.to_string(),
            command: command.to_string(),
            cause: "remote command exited without exit status".to_string(),
        }),
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if self.handle.get().is_some() {
            info!("[SSH] Closing connection to '{}'", self.host);
        } else {
            debug!("[SSH] Dropping session to '{}' that never connected", self.host);
        }
    }
}
