// Cassandra 节点采集
// 四个信息任务并发执行，配置 / 日志 / GC 日志在调用方顺序下载

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument};

use super::{CollectError, Collector};
use crate::progress::LogProgress;
use crate::ssh::path;
use crate::ssh::RemoteSession;

/// nodetool 子命令
const NODETOOL_COMMANDS: [&str; 8] = [
    "info",
    "version",
    "status",
    "tpstats",
    "compactionstats -H",
    "gossipinfo",
    "cfstats -H",
    "ring",
];

const IOSTAT_COMMAND: &str = "eval timeout -sHUP 60s iostat -x -m -t -y -z 30 < /dev/null";
const DISK_COMMANDS: [&str; 2] = ["df -h", "du -h"];
const SYSTEM_COMMANDS: [&str; 2] = ["ulimit -a", "free -m"];

/// Cassandra 路径与凭据
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CassandraSettings {
    pub config_path: String,
    pub log_path: String,
    pub gc_path: String,
    pub data_path: Vec<String>,
    /// nodetool JMX 用户名
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// nodetool JMX 密码
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for CassandraSettings {
    fn default() -> Self {
        Self {
            config_path: "/etc/cassandra".to_string(),
            log_path: "/var/log/cassandra".to_string(),
            gc_path: "/var/log/cassandra".to_string(),
            data_path: vec!["/var/lib/cassandra/data".to_string()],
            username: None,
            password: None,
        }
    }
}

/// 需要下载的文件
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CollectingSettings {
    pub configs: Vec<String>,
    pub logs: Vec<String>,
    /// GC 日志文件名的 glob 模式
    pub gc_log_patterns: Vec<String>,
}

impl Default for CollectingSettings {
    fn default() -> Self {
        Self {
            configs: vec![
                "cassandra.yaml".to_string(),
                "cassandra-env.sh".to_string(),
                "jvm.options".to_string(),
                "logback.xml".to_string(),
            ],
            logs: vec!["system.log".to_string()],
            gc_log_patterns: vec!["gc*".to_string()],
        }
    }
}

/// 节点采集配置
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub cassandra: CassandraSettings,
    pub collecting: CollectingSettings,
}

impl NodeSettings {
    /// 带凭据的 nodetool 命令
    fn nodetool(&self, command: &str) -> String {
        let mut line = String::from("nodetool");
        if let Some(user) = &self.cassandra.username {
            line.push_str(&format!(" -u {}", user));
        }
        if let Some(password) = &self.cassandra.password {
            line.push_str(&format!(" -pw {}", password));
        }
        line.push(' ');
        line.push_str(command);
        line
    }

    /// 把日志文本中的密码替换掉
    fn redact(&self, text: &str) -> String {
        match &self.cassandra.password {
            Some(password) if !password.is_empty() => text.replace(password.as_str(), "******"),
            _ => text.to_string(),
        }
    }
}

/// Cassandra 节点采集器
pub struct NodeCollector {
    settings: Arc<NodeSettings>,
    /// 本地 nodes 目录（每台主机写入其下的 <host>/）
    path: PathBuf,
}

impl NodeCollector {
    pub fn new(settings: Arc<NodeSettings>, path: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            path: path.into(),
        }
    }

    async fn download_configs(&self, session: &dyn RemoteSession, host_dir: &Path) {
        let dest = host_dir.join("config");
        if let Err(e) = tokio::fs::create_dir_all(&dest).await {
            error!("Failed to create folder for configs '{}' ({})", dest.display(), e);
            return;
        }

        for name in &self.settings.collecting.configs {
            let src = path::join(&self.settings.cassandra.config_path, name);
            if let Err(e) = session.receive_file(&src, &dest, None).await {
                warn!("Failed to receive config file '{}' ({})", src, e);
            }
        }
    }

    async fn download_logs(&self, session: &dyn RemoteSession, host_dir: &Path) {
        let dest = host_dir.join("logs");
        if let Err(e) = tokio::fs::create_dir_all(&dest).await {
            error!("Failed to create folder for logs '{}' ({})", dest.display(), e);
            return;
        }

        for name in &self.settings.collecting.logs {
            let src = path::join(&self.settings.cassandra.log_path, name);
            let progress = LogProgress::shared(name.as_str());
            if let Err(e) = session.receive_file(&src, &dest, Some(progress)).await {
                warn!("Failed to receive log file '{}' ({})", src, e);
            }
        }
    }

    async fn download_gc_logs(&self, session: &dyn RemoteSession, host_dir: &Path) {
        let dest = host_dir.join("gc_logs");
        if let Err(e) = tokio::fs::create_dir_all(&dest).await {
            error!("Failed to create folder for gc logs '{}' ({})", dest.display(), e);
            return;
        }

        let patterns: Vec<glob::Pattern> = self
            .settings
            .collecting
            .gc_log_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Invalid gc log pattern '{}' ({})", p, e);
                    None
                }
            })
            .collect();

        let gc_path = &self.settings.cassandra.gc_path;
        let entries = match session.list_directory(gc_path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list gc log folder '{}' ({})", gc_path, e);
                return;
            }
        };

        for entry in entries.iter().filter(|e| !e.is_directory) {
            let name = entry.name();
            if !patterns.iter().any(|p| p.matches(name)) {
                continue;
            }
            let progress = LogProgress::shared(name);
            if let Err(e) = session.receive_file(&entry.path, &dest, Some(progress)).await {
                warn!("Failed to receive gc log file '{}' ({})", entry.path, e);
            }
        }
    }
}

#[async_trait]
impl Collector for NodeCollector {
    fn role(&self) -> &'static str {
        "NC"
    }

    async fn collect(&self, session: Arc<dyn RemoteSession>) -> Result<(), CollectError> {
        info!("Node collector started");

        if let Err(e) = session.connect().await {
            error!("{}", e);
            return Err(e.into());
        }

        let host_dir = self.path.join(session.host());
        let info_dir = host_dir.join("info");

        let mut tasks = Vec::new();
        match tokio::fs::create_dir_all(&info_dir).await {
            Ok(()) => {
                tasks.push(tokio::spawn(
                    collect_nodetool_info(session.clone(), self.settings.clone(), info_dir.clone())
                        .in_current_span(),
                ));
                tasks.push(tokio::spawn(
                    collect_io_stats(session.clone(), info_dir.clone()).in_current_span(),
                ));
                tasks.push(tokio::spawn(
                    collect_disk_info(session.clone(), self.settings.clone(), info_dir.clone())
                        .in_current_span(),
                ));
                tasks.push(tokio::spawn(
                    collect_system_info(session.clone(), info_dir.clone()).in_current_span(),
                ));
            }
            Err(e) => error!("Failed to create info folder '{}' ({})", info_dir.display(), e),
        }

        info!("Collecting configuration files...");
        self.download_configs(&*session, &host_dir).await;
        info!("Collecting log files...");
        self.download_logs(&*session, &host_dir).await;
        info!("Collecting gc log files...");
        self.download_gc_logs(&*session, &host_dir).await;

        for task in join_all(tasks).await {
            match task {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("{}", e),
                Err(e) => error!("Info task failed: {}", e),
            }
        }

        info!("Node collector completed");
        Ok(())
    }
}

async fn write_info(path: PathBuf, content: &[u8]) -> Result<(), CollectError> {
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| CollectError::local_fs("save", path, e))
}

/// nodetool 输出，每个子命令一个文件
async fn collect_nodetool_info(
    session: Arc<dyn RemoteSession>,
    settings: Arc<NodeSettings>,
    info_dir: PathBuf,
) -> Result<(), CollectError> {
    info!("Collecting nodetool info...");

    for command in NODETOOL_COMMANDS {
        let output = match session.execute(&settings.nodetool(command)).await {
            Ok(output) => output,
            Err(e) => {
                error!(
                    "Failed to execute 'nodetool {}' ({})",
                    command,
                    settings.redact(&e.to_string())
                );
                continue;
            }
        };

        let file_name = format!("nodetool_{}.info", command.replace(' ', "_"));
        if let Err(e) = write_info(info_dir.join(file_name), &output.stdout).await {
            error!("{}", e);
        }
    }

    info!("Collecting nodetool info completed");
    Ok(())
}

/// iostat 输出；timeout 触发时的非零退出码是预期行为
async fn collect_io_stats(
    session: Arc<dyn RemoteSession>,
    info_dir: PathBuf,
) -> Result<(), CollectError> {
    info!("Collecting IO stats...");

    let output = match session.execute(IOSTAT_COMMAND).await {
        Ok(output) => output,
        Err(e) => match e.output() {
            Some(output) => {
                warn!("{}, saving captured output", e);
                output.clone()
            }
            None => return Err(e.into()),
        },
    };

    write_info(info_dir.join("io_stat.info"), &output.stdout).await?;
    info!("Collecting IO stats completed");
    Ok(())
}

/// df / du 输出合并写入 disk.info
async fn collect_disk_info(
    session: Arc<dyn RemoteSession>,
    settings: Arc<NodeSettings>,
    info_dir: PathBuf,
) -> Result<(), CollectError> {
    info!("Collecting disk info...");

    let mut report = String::new();
    for command in DISK_COMMANDS {
        for data_path in &settings.cassandra.data_path {
            let command = format!("{} {}", command, data_path);
            match session.execute(&command).await {
                Ok(output) => {
                    report.push_str(&command);
                    report.push('\n');
                    report.push_str(&output.stdout_string());
                    report.push('\n');
                }
                Err(e) => error!("Failed to execute '{}' ({})", command, e),
            }
        }
    }

    write_info(info_dir.join("disk.info"), report.as_bytes()).await?;
    info!("Collecting disk info completed");
    Ok(())
}

/// ulimit / free 输出
async fn collect_system_info(
    session: Arc<dyn RemoteSession>,
    info_dir: PathBuf,
) -> Result<(), CollectError> {
    info!("Collecting system info...");

    for command in SYSTEM_COMMANDS {
        match session.execute(command).await {
            Ok(output) => {
                let file_name = format!("{}.info", command.replace(' ', "_"));
                if let Err(e) = write_info(info_dir.join(file_name), &output.stdout).await {
                    error!("{}", e);
                }
            }
            Err(e) => error!("Failed to execute '{}' ({})", command, e),
        }
    }

    info!("Collecting system info completed");
    Ok(())
}
