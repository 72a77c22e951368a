// 顶层错误类型定义

use std::path::PathBuf;

use thiserror::Error;

/// 运行前（参数、配置、known_hosts）与打包阶段的错误
#[derive(Debug, Error)]
pub enum AgentError {
    /// 配置文件读写失败
    #[error("{0}")]
    ConfigLoad(String),

    /// 命令行参数不合法
    #[error("{0}")]
    ArgumentValidation(String),

    /// known_hosts 文件无法加载
    #[error("Failed to load known hosts '{}' ({source})", .path.display())]
    KnownHosts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 本地文件系统错误
    #[error("Failed to {operation} '{}' ({source})", .path.display())]
    LocalFs {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 压缩包生成失败
    #[error("Failed to compress collected data '{}' ({source})", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl AgentError {
    pub(crate) fn local_fs(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        AgentError::LocalFs {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(e: anyhow::Error) -> Self {
        AgentError::ConfigLoad(format!("{:#}", e))
    }
}
