// SSH 客户端配置

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::{PrivateKey, PublicKey};

/// 默认连接/握手超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// 主机密钥校验策略
#[derive(Clone, Debug)]
pub enum HostKeyPolicy {
    /// 严格校验 known_hosts 文件
    Strict { known_hosts: PathBuf },
    /// 接受任何主机密钥
    Permissive,
}

/// 认证代理提供的签名者
#[derive(Clone, Debug)]
pub struct AgentSigners {
    /// SSH_AUTH_SOCK 套接字路径
    pub socket: PathBuf,
    /// 代理持有的公钥
    pub identities: Vec<PublicKey>,
}

/// 所有采集任务共享的 SSH 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 登录用户
    pub user: String,
    /// 连接与握手超时
    pub timeout: Duration,
    /// 从磁盘加载的私钥（按顺序尝试）
    pub keys: Vec<Arc<PrivateKey>>,
    /// 认证代理转发的签名者（在私钥之后尝试）
    pub agent: Option<AgentSigners>,
    /// 主机密钥校验策略
    pub host_key_policy: HostKeyPolicy,
}

impl ClientConfig {
    pub fn new(user: impl Into<String>, host_key_policy: HostKeyPolicy) -> Self {
        Self {
            user: user.into(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
            keys: Vec::new(),
            agent: None,
            host_key_policy,
        }
    }

    /// 签名者总数
    pub fn signer_count(&self) -> usize {
        self.keys.len() + self.agent.as_ref().map_or(0, |a| a.identities.len())
    }

    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        // 握手超时由调用方用 tokio::time::timeout 控制，这里不设置不活动超时
        russh::client::Config {
            inactivity_timeout: None,
            ..Default::default()
        }
    }
}
