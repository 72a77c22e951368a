// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait，负责主机密钥校验

use std::future::Future;

use russh::keys::PublicKey;
use tracing::{debug, warn};

use super::config::HostKeyPolicy;

/// SSH 客户端 Handler
pub struct ClientHandler {
    /// 服务器主机名（用于 known_hosts 查找与日志）
    host: String,
    /// 服务器端口
    port: u16,
    /// 主机密钥校验策略
    policy: HostKeyPolicy,
}

impl ClientHandler {
    /// 创建新的 Handler
    pub fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }

    /// 按策略校验服务器公钥
    fn verify(&self, server_public_key: &PublicKey) -> bool {
        let fingerprint = server_public_key.fingerprint(russh::keys::ssh_key::HashAlg::Sha256);
        debug!(
            "[SSH] Server key for '{}': {} ({})",
            self.host,
            fingerprint,
            server_public_key.algorithm()
        );

        match &self.policy {
            HostKeyPolicy::Permissive => true,
            HostKeyPolicy::Strict { known_hosts } => {
                match russh::keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    known_hosts,
                ) {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(
                            "[SSH] Host '{}' is not present in known hosts '{}' (key {})",
                            self.host,
                            known_hosts.display(),
                            fingerprint
                        );
                        false
                    }
                    Err(e) => {
                        warn!(
                            "[SSH] Host key verification for '{}' failed: {}",
                            self.host, e
                        );
                        false
                    }
                }
            }
        }
    }
}

impl russh::client::Handler for ClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let accepted = self.verify(server_public_key);
        async move { Ok(accepted) }
    }
}
