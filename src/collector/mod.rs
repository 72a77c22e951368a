// 采集器模块
//
// - node: Cassandra 节点采集（nodetool、系统信息、配置、日志、GC 日志）
// - metrics: Prometheus 快照采集（创建、按时间窗口精简、下载、清理）
// - window: 采集时间窗口

pub mod metrics;
pub mod node;
pub mod window;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::ssh::{RemoteSession, SessionError};

pub use metrics::{MetricsCollector, MetricsSettings};
pub use node::{NodeCollector, NodeSettings};
pub use window::CollectionWindow;

/// 采集器错误类型
#[derive(Debug, Error)]
pub enum CollectError {
    /// 远程会话错误（连接、命令、传输）
    #[error(transparent)]
    Session(#[from] SessionError),

    /// 快照 API 返回失败
    #[error("{0}")]
    SnapshotApi(String),

    /// 快照 API 输出无法解析
    #[error("Failed to unmarshal snapshot command output ({0})")]
    JsonDecode(#[source] serde_json::Error),

    /// 本地文件系统错误
    #[error("Failed to {operation} '{}' ({source})", .path.display())]
    LocalFs {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CollectError {
    pub(crate) fn local_fs(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        CollectError::LocalFs {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// 采集器能力
/// 每个采集器负责一台主机上的一种角色
#[async_trait]
pub trait Collector: Send + Sync {
    /// 角色前缀（用于日志 span，如 "MC" / "NC"）
    fn role(&self) -> &'static str;

    /// 在给定会话上完成采集；只有致命错误才返回 Err
    async fn collect(&self, session: Arc<dyn RemoteSession>) -> Result<(), CollectError>;
}
