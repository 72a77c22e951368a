// SSH 会话错误类型定义

use std::path::PathBuf;

use thiserror::Error;

use super::remote::CommandOutput;

/// 远程会话错误类型
/// 每个错误都带有主机名、失败的操作以及底层原因
#[derive(Debug, Error)]
pub enum SessionError {
    /// 建立连接失败（TCP、握手、主机密钥校验或认证）
    #[error("SSH agent: Failed to establish connection to remote host '{host}' ({cause})")]
    Connect { host: String, cause: String },

    /// 会话尚未连接
    #[error("SSH agent: Session to '{host}' is not connected")]
    NotConnected { host: String },

    /// 打开命令通道失败
    #[error("SSH agent: Failed to create SSH session to '{host}' ({cause})")]
    Channel { host: String, cause: String },

    /// 命令执行失败（通道层面）
    #[error("SSH agent: Failed to run command '{command}' on '{host}'. ({cause})")]
    Exec {
        host: String,
        command: String,
        cause: String,
    },

    /// 命令以非零状态退出，仍然携带已捕获的输出
    #[error(
        "SSH agent: Failed to run command '{command}' on '{host}'. (Process exited with status {status})"
    )]
    NonZeroExit {
        host: String,
        command: String,
        status: u32,
        output: CommandOutput,
    },

    /// 命令被信号终止，仍然携带已捕获的输出
    #[error("SSH agent: Failed to run command '{command}' on '{host}'. (Process killed by signal {signal})")]
    Signaled {
        host: String,
        command: String,
        signal: String,
        output: CommandOutput,
    },

    /// 打开 SFTP 子会话失败
    #[error("SSH agent: Failed to create SFTP session to '{host}' ({cause})")]
    Sftp { host: String, cause: String },

    /// 文件传输失败
    #[error("SSH agent: Failed to copy '{path}' from '{host}' over SFTP ({cause})")]
    Transfer {
        host: String,
        path: String,
        cause: String,
    },

    /// 远程文件系统操作失败
    #[error("SSH agent: Failed to {operation} '{path}' on '{host}' over SFTP ({cause})")]
    RemoteFs {
        host: String,
        operation: &'static str,
        path: String,
        cause: String,
    },

    /// 本地文件系统操作失败
    #[error("SSH agent: Failed to {operation} '{}' ({source})", .path.display())]
    LocalFs {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// 失败命令已捕获的输出（NonZeroExit / Signaled 携带）
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            SessionError::NonZeroExit { output, .. } | SessionError::Signaled { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    pub(crate) fn local_fs(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        SessionError::LocalFs {
            operation,
            path: path.into(),
            source,
        }
    }
}
