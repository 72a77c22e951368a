// 日志初始化
// 同时输出到终端（彩色）和工作目录下的 agent.log（纯文本）

use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// 运行日志文件名
pub const LOG_FILE: &str = "agent.log";

/// 文件日志的生命周期守卫
/// 持有期间文件日志持续写入；`finish` 之后只剩终端输出
pub struct LogGuard {
    path: PathBuf,
    guard: Option<WorkerGuard>,
}

impl LogGuard {
    /// 不持有写入线程的守卫（日志已由外部写好）
    #[cfg(test)]
    pub(crate) fn detached(path: PathBuf) -> Self {
        Self { path, guard: None }
    }

    /// 刷新并关闭文件日志，返回日志文件路径
    pub fn finish(mut self) -> PathBuf {
        drop(self.guard.take());
        std::mem::take(&mut self.path)
    }
}

/// 初始化全局日志
/// 日志级别由 RUST_LOG 控制，默认 info
pub fn init() -> io::Result<LogGuard> {
    init_at(PathBuf::from(LOG_FILE))
}

fn init_at(path: PathBuf) -> io::Result<LogGuard> {
    let file = File::create(&path)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_ansi(io::stdout().is_terminal());
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(LogGuard {
        path,
        guard: Some(guard),
    })
}
