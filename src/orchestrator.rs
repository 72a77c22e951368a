// 采集编排
// 解析配置与目标主机，为每个 (主机, 角色) 启动采集任务，结束后打包运行目录

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, info, info_span, warn, Instrument};

use crate::archive;
use crate::cli::Cli;
use crate::collector::{CollectionWindow, Collector, MetricsCollector, NodeCollector};
use crate::error::AgentError;
use crate::logging::LogGuard;
use crate::settings::{self, Settings, TargetSettings};
use crate::ssh::{self, ClientConfig, HostKeyPolicy, RemoteSession, SshSession};
use crate::utils;

/// 运行目录名（UTC）
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// 合并后的目标主机
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Targets {
    pub nodes: Vec<String>,
    pub metrics: Vec<String>,
}

impl Targets {
    /// 配置文件中的主机在前，命令行在后；指标主机只保留第一台
    pub fn resolve(settings: &TargetSettings, cli: &Cli) -> Self {
        let nodes = utils::join_to_set(&settings.nodes, &cli.node_hosts);
        let mut metrics = utils::join_to_set(&settings.metrics, &cli.metrics_hosts);

        if metrics.len() > 1 {
            warn!(
                "Only one metrics collecting host is supported, ignoring: {}",
                metrics[1..].join(", ")
            );
            metrics.truncate(1);
        }

        Self { nodes, metrics }
    }
}

/// 一次运行的本地目录布局
#[derive(Debug, Clone)]
pub struct RunLayout {
    /// 采集数据根目录
    pub root: PathBuf,
    /// 启动时间戳
    pub timestamp: String,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, started: DateTime<Utc>) -> Self {
        Self {
            root: root.into(),
            timestamp: started.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.timestamp)
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.run_dir().join("metrics")
    }

    pub fn nodes_dir(&self) -> PathBuf {
        self.run_dir().join("nodes")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(format!("{}-data.zip", self.timestamp))
    }
}

/// 单个采集任务
pub struct Job {
    pub collector: Arc<dyn Collector>,
    pub session: Arc<dyn RemoteSession>,
}

/// 定位并加载配置；缺失或无法解析时使用默认值
pub fn load_settings(config: &str) -> Settings {
    let path = settings::search_settings_path(config);

    match utils::exists(&path) {
        Ok(true) => {}
        Ok(false) => {
            warn!("The settings file '{}' does not exists", path.display());
            return Settings::default();
        }
        Err(e) => {
            warn!("Failed to check settings file '{}' ({})", path.display(), e);
            return Settings::default();
        }
    }

    info!("Loading settings from '{}'...", path.display());
    match Settings::load(&path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("{:#}", e);
            Settings::default()
        }
    }
}

/// 把默认配置写入解析出的配置路径；已存在时拒绝覆盖
pub fn generate_config(config: &str) -> Result<PathBuf, AgentError> {
    let path = settings::search_settings_path(config);
    write_default_settings(&path)?;
    Ok(path)
}

fn write_default_settings(path: &Path) -> Result<(), AgentError> {
    let found = utils::exists(path).map_err(|e| AgentError::local_fs("check", path, e))?;
    if found {
        return Err(AgentError::ConfigLoad(format!(
            "The settings file '{}' already exists",
            path.display()
        )));
    }
    Settings::default().save(path)?;
    Ok(())
}

/// known_hosts 策略：默认严格校验 `~/.ssh/known_hosts`
pub fn host_key_policy(disable_known_hosts: bool, home: Option<&Path>) -> Result<HostKeyPolicy, AgentError> {
    if disable_known_hosts {
        warn!("Host key verification is disabled");
        return Ok(HostKeyPolicy::Permissive);
    }

    let known_hosts = utils::expand_with_home("~/.ssh/known_hosts", home);
    ssh::auth::strict_policy(&known_hosts).map_err(|source| AgentError::KnownHosts {
        path: known_hosts,
        source,
    })
}

/// 构建所有任务共享的 SSH 客户端配置
pub async fn client_config(cli: &Cli, policy: HostKeyPolicy, home: Option<&Path>) -> ClientConfig {
    let mut key_paths = vec![utils::expand_with_home("~/.ssh/id_rsa", home)];
    key_paths.extend(
        cli.private_keys
            .iter()
            .map(|p| utils::expand_with_home(&p.to_string_lossy(), home)),
    );

    let mut config = ClientConfig::new(cli.user(), policy);
    config.keys = ssh::auth::load_private_keys(&key_paths);
    config.agent = ssh::auth::load_agent_signers().await;

    if config.signer_count() == 0 {
        warn!("No private keys or agent identities available for authentication");
    }
    config
}

/// 每个任务独占一个 SSH 会话，客户端配置共享
fn ssh_session(host: &str, port: u16, config: Arc<ClientConfig>) -> Arc<dyn RemoteSession> {
    let mut session = SshSession::default();
    session.set_target(host, port);
    session.set_config(config);
    Arc::new(session)
}

/// 为每台主机和角色创建采集任务
pub fn plan_jobs(
    settings: &Settings,
    targets: &Targets,
    layout: &RunLayout,
    port: u16,
    window: CollectionWindow,
    config: Arc<ClientConfig>,
) -> Vec<Job> {
    let node_settings = Arc::new(settings.node.clone());
    let mut jobs = Vec::with_capacity(targets.metrics.len() + targets.nodes.len());

    for host in &targets.metrics {
        jobs.push(Job {
            collector: Arc::new(MetricsCollector::new(
                settings.metrics.clone(),
                layout.metrics_dir(),
                window,
            )),
            session: ssh_session(host, port, config.clone()),
        });
    }

    for host in &targets.nodes {
        jobs.push(Job {
            collector: Arc::new(NodeCollector::new(node_settings.clone(), layout.nodes_dir())),
            session: ssh_session(host, port, config.clone()),
        });
    }

    jobs
}

/// 并发执行所有任务；单个任务失败只记录日志
/// 返回失败任务数
pub async fn run_jobs(jobs: Vec<Job>) -> usize {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let role = job.collector.role();
            let host = job.session.host();
            let span = info_span!("collect", role, host = %host);

            tokio::spawn(
                async move {
                    let result = job.collector.collect(job.session.clone()).await;
                    if result.is_err() {
                        match role {
                            "MC" => error!("Failed to collect metrics on '{}'", host),
                            _ => error!("Failed to collect node on '{}'", host),
                        }
                    }
                    result.is_ok()
                }
                .instrument(span),
            )
        })
        .collect();

    let mut failed = 0;
    for result in join_all(handles).await {
        match result {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                error!("Collecting task aborted ({})", e);
                failed += 1;
            }
        }
    }
    failed
}

/// 关闭文件日志，复制到运行目录，再打包整个运行目录
pub async fn finalize(layout: &RunLayout, log: LogGuard) -> Result<PathBuf, AgentError> {
    let run_dir = layout.run_dir();
    info!("Compressing collected data ({})...", run_dir.display());

    let log_path = log.finish();
    let log_name = log_path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(crate::logging::LOG_FILE));
    if let Err(e) = utils::copy_file(&log_path, &run_dir.join(log_name)) {
        warn!("Failed to copy log file '{}' ({})", log_path.display(), e);
    }

    let target = layout.archive_path();
    let (source, dest) = (run_dir.clone(), target.clone());
    let entries = tokio::task::spawn_blocking(move || archive::zip_directory(&source, &dest))
        .await
        .map_err(|e| {
            AgentError::local_fs("compress", &run_dir, std::io::Error::new(std::io::ErrorKind::Other, e))
        })??;

    info!("Archived {} entries", entries);
    Ok(target)
}

/// 创建运行目录；失败只记录警告，采集照常进行
pub async fn prepare_run_dir(layout: &RunLayout) -> bool {
    let run_dir = layout.run_dir();
    match tokio::fs::create_dir_all(&run_dir).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to create collecting folder '{}' ({})", run_dir.display(), e);
            false
        }
    }
}

/// 打包并报告结果；打包失败只记录错误，返回压缩包路径
pub async fn compress(layout: &RunLayout, log: LogGuard) -> PathBuf {
    match finalize(layout, log).await {
        Ok(_) => info!("Compressing collected data OK"),
        Err(e) => error!("{}", e),
    }
    layout.archive_path()
}

/// 完整运行流程
pub async fn run(cli: Cli, log: LogGuard) -> Result<(), AgentError> {
    let started = Utc::now();
    let home = utils::home_dir();

    let settings = load_settings(&cli.config);
    let targets = Targets::resolve(&settings.target, &cli);
    let window = cli.window(started)?;

    info!("Metrics collecting hosts are: {:?}", targets.metrics);
    info!(
        "Metrics time span: {} ... {}",
        window.from.to_rfc3339(),
        window.to.to_rfc3339()
    );
    info!("Node collecting hosts are: {:?}", targets.nodes);

    let policy = host_key_policy(cli.disable_known_hosts, home.as_deref())?;
    let config = Arc::new(client_config(&cli, policy, home.as_deref()).await);

    let layout = RunLayout::new(utils::expand(&settings.agent.collected_data_path), started);
    prepare_run_dir(&layout).await;
    info!("Collecting timestamp: {}", layout.timestamp);

    let jobs = plan_jobs(&settings, &targets, &layout, cli.port, window, config);
    let failed = run_jobs(jobs).await;
    if failed > 0 {
        warn!("{} collecting task(s) failed", failed);
    }

    let tarball = compress(&layout, log).await;
    info!("Tarball: {}", tarball.display());
    Ok(())
}
