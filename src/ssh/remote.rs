// 远程会话能力接口
// 收集器只依赖此 trait，测试中用 mock 替换真实 SSH 连接

use std::path::Path;

use async_trait::async_trait;

use super::error::SessionError;
use crate::progress::SharedProgress;

/// 远程目录条目
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// 完整路径（目录路径 + 文件名）
    pub path: String,
    /// 是否为目录
    pub is_directory: bool,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
        }
    }

    /// 文件名（路径最后一段）
    pub fn name(&self) -> &str {
        super::path::basename(&self.path)
    }
}

/// 命令输出
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: Vec<u8>,
    /// 标准错误
    pub stderr: Vec<u8>,
    /// 退出码
    pub exit_status: u32,
}

impl CommandOutput {
    /// 获取标准输出字符串
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// 获取标准错误字符串
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// 检查命令是否成功
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// 单个远程主机上的会话能力
///
/// 所有文件操作都在同一条 SSH 连接上打开独立的 SFTP 子会话，
/// 因此实现必须允许并发调用。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// 目标主机名
    fn host(&self) -> String;

    /// 建立 TCP + SSH 连接
    async fn connect(&self) -> Result<(), SessionError>;

    /// 非交互执行命令，完整捕获 stdout / stderr
    ///
    /// 非零退出返回 [`SessionError::NonZeroExit`]，其中仍带有已捕获的输出。
    async fn execute(&self, command: &str) -> Result<CommandOutput, SessionError>;

    /// 读取远程文件全部内容
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, SessionError>;

    /// 列出目录（单层）
    async fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>, SessionError>;

    /// 下载单个文件；`dest` 为已存在目录时写入 `dest/basename(src)`
    async fn receive_file(
        &self,
        src: &str,
        dest: &Path,
        progress: Option<SharedProgress>,
    ) -> Result<(), SessionError>;

    /// 递归下载目录；`src` 为普通文件时等同于 `receive_file`
    async fn receive_directory(
        &self,
        src: &str,
        dest: &Path,
        progress: Option<SharedProgress>,
    ) -> Result<(), SessionError>;

    /// 递归删除远程文件或目录
    async fn remove(&self, path: &str) -> Result<(), SessionError>;
}
