// SSH 连接模块
//
// 模块结构:
// - config: 客户端配置 (ClientConfig, HostKeyPolicy, AgentSigners)
// - error: 错误类型 (SessionError)
// - handler: russh Handler 实现（主机密钥校验）
// - auth: 私钥 / 认证代理 / known_hosts
// - remote: 会话能力接口 (RemoteSession, FileInfo, CommandOutput)
// - session: 基于 russh 的会话实现 (SshSession)
// - transfer: SFTP 文件操作
// - path: 远程路径工具

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod path;
pub mod remote;
pub mod session;
pub mod transfer;

// 公开导出
pub use config::{ClientConfig, HostKeyPolicy};
pub use error::SessionError;
pub use remote::RemoteSession;
pub use session::{SshSession, DEFAULT_PORT};

#[cfg(test)]
pub use remote::{CommandOutput, FileInfo, MockRemoteSession};
