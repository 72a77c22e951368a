// SSH 认证
// 私钥加载、认证代理签名者与 known_hosts 校验策略

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{AuthResult, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use tracing::{debug, error, info, warn};

use super::config::{AgentSigners, ClientConfig, HostKeyPolicy};
use super::handler::ClientHandler;

/// 从磁盘加载私钥
/// 读取失败记为警告，解析失败记为错误，二者都跳过该文件
pub fn load_private_keys(paths: &[PathBuf]) -> Vec<Arc<PrivateKey>> {
    let mut keys = Vec::with_capacity(paths.len());

    for path in paths {
        info!("Loading private key '{}'...", path.display());

        let key_data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read private key '{}' ({})", path.display(), e);
                continue;
            }
        };

        match russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), None) {
            Ok(key) => keys.push(Arc::new(key)),
            Err(e) => error!("Failed to parse private key '{}' ({})", path.display(), e),
        }
    }

    keys
}

/// 读取 SSH_AUTH_SOCK 指向的认证代理持有的公钥
pub async fn load_agent_signers() -> Option<AgentSigners> {
    let socket = match std::env::var_os("SSH_AUTH_SOCK") {
        Some(socket) if !socket.is_empty() => PathBuf::from(socket),
        _ => {
            debug!("SSH_AUTH_SOCK is not set, skipping forwarded signers");
            return None;
        }
    };

    let mut agent = match AgentClient::connect_uds(&socket).await {
        Ok(agent) => agent,
        Err(e) => {
            warn!(
                "Failed to open SSH_AUTH_SOCK '{}' ({})",
                socket.display(),
                e
            );
            return None;
        }
    };

    match agent.request_identities().await {
        Ok(identities) => {
            info!("Loaded {} forwarded signer(s)", identities.len());
            Some(AgentSigners { socket, identities })
        }
        Err(e) => {
            warn!("Failed to provide agent forwarded signers ({})", e);
            None
        }
    }
}

/// 构建严格校验策略；known_hosts 文件必须可读
pub fn strict_policy(known_hosts: &Path) -> std::io::Result<HostKeyPolicy> {
    std::fs::File::open(known_hosts)?;
    Ok(HostKeyPolicy::Strict {
        known_hosts: known_hosts.to_path_buf(),
    })
}

/// 依次尝试私钥与代理签名者，直到服务器接受其中之一
pub async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    config: &ClientConfig,
) -> Result<(), String> {
    if config.signer_count() == 0 {
        return Err("no authentication signers available".to_string());
    }

    // RSA 密钥需要协商签名哈希
    let rsa_hash = handle.best_supported_rsa_hash().await.ok().flatten().flatten();
    let mut last_failure = String::from("all signers rejected");

    for key in &config.keys {
        debug!("[SSH] Trying public key {}", key.algorithm());
        let key_with_alg = PrivateKeyWithHashAlg::new(key.clone(), rsa_hash);

        match handle
            .authenticate_publickey(&config.user, key_with_alg)
            .await
        {
            Ok(AuthResult::Success) => return Ok(()),
            Ok(AuthResult::Failure {
                remaining_methods,
                partial_success,
            }) => {
                last_failure = if partial_success {
                    "partial authentication, additional auth required".to_string()
                } else {
                    format!(
                        "public key rejected, server suggests: {:?}",
                        remaining_methods
                    )
                };
            }
            Err(e) => return Err(e.to_string()),
        }
    }

    if let Some(signers) = &config.agent {
        let mut agent = AgentClient::connect_uds(&signers.socket)
            .await
            .map_err(|e| format!("failed to reach authentication agent: {}", e))?;

        for identity in &signers.identities {
            debug!("[SSH] Trying forwarded signer {}", identity.algorithm());

            match handle
                .authenticate_publickey_with(&config.user, identity.clone(), rsa_hash, &mut agent)
                .await
            {
                Ok(AuthResult::Success) => return Ok(()),
                Ok(AuthResult::Failure {
                    remaining_methods, ..
                }) => {
                    last_failure = format!(
                        "forwarded signer rejected, server suggests: {:?}",
                        remaining_methods
                    );
                }
                Err(e) => {
                    warn!("[SSH] Forwarded signer failed: {}", e);
                    last_failure = e.to_string();
                }
            }
        }
    }

    Err(format!("unable to authenticate: {}", last_failure))
}
