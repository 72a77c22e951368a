// Prometheus 指标采集
// 创建快照 -> 按时间窗口删除无关块 -> 可选打包 -> 下载 -> 清理

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::window::CollectionWindow;
use super::{CollectError, Collector};
use crate::progress::LogProgress;
use crate::ssh::path;
use crate::ssh::RemoteSession;

const SNAPSHOT_SUCCESS: &str = "success";
const SNAPSHOT_FOLDER: &str = "snapshots";
const SNAPSHOT_TARBALL_PATH: &str = "/tmp/InstaclustrCollection.tar";
const SUPPORTED_BLOCK_VERSION: u32 = 1;

/// Prometheus 服务配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PrometheusSettings {
    /// HTTP 端口
    pub port: u16,
    /// TSDB 数据目录
    pub data_path: String,
}

impl Default for PrometheusSettings {
    fn default() -> Self {
        Self {
            port: 9090,
            data_path: "/var/data".to_string(),
        }
    }
}

/// 指标采集配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub prometheus: PrometheusSettings,
    /// 下载前在远端把快照打成 tar 包
    pub copy_compressed: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            prometheus: PrometheusSettings::default(),
            copy_compressed: true,
        }
    }
}

/// 快照块 meta.json 中的统计信息
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockStats {
    pub num_samples: u64,
    pub num_series: u64,
    pub num_chunks: u64,
}

/// 快照块元数据（meta.json）
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub ulid: String,
    pub version: u32,
    /// 毫秒时间戳
    pub min_time: i64,
    /// 毫秒时间戳
    pub max_time: i64,
    #[serde(default)]
    pub stats: BlockStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotResponse {
    status: String,
    data: SnapshotData,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SnapshotData {
    name: String,
}

/// Prometheus 快照采集器
pub struct MetricsCollector {
    settings: MetricsSettings,
    /// 本地 metrics 目录（快照写入其下的 snapshot/）
    path: PathBuf,
    window: CollectionWindow,
}

impl MetricsCollector {
    pub fn new(settings: MetricsSettings, path: impl Into<PathBuf>, window: CollectionWindow) -> Self {
        Self {
            settings,
            path: path.into(),
            window,
        }
    }

    /// 调用快照 API，返回快照名称
    async fn create_snapshot(&self, session: &dyn RemoteSession) -> Result<String, CollectError> {
        let command = format!(
            "curl -s -XPOST http://localhost:{}/api/v1/admin/tsdb/snapshot",
            self.settings.prometheus.port
        );
        let output = session.execute(&command).await?;

        if !output.stderr.is_empty() {
            return Err(CollectError::SnapshotApi(format!(
                "Failed to create prometheus snapshot: {}",
                output.stderr_string()
            )));
        }

        let response: SnapshotResponse =
            serde_json::from_slice(&output.stdout).map_err(CollectError::JsonDecode)?;

        if response.status != SNAPSHOT_SUCCESS {
            let mut message = format!(
                "Failed to create prometheus snapshot (status: '{}')",
                response.status
            );
            if let Some(cause) = response.error.filter(|e| !e.is_empty()) {
                message.push_str(&format!(": {}", cause));
            }
            return Err(CollectError::SnapshotApi(message));
        }

        Ok(response.data.name)
    }

    /// 删除与采集窗口不重叠的块；单个块的失败只记录警告
    async fn lighten_snapshot(&self, session: &dyn RemoteSession, snapshot_root: &str) {
        let blocks = match session.list_directory(snapshot_root).await {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Failed to list snapshot blocks, downloading whole snapshot ({})", e);
                return;
            }
        };

        for block in blocks.iter().filter(|b| b.is_directory) {
            let meta_path = path::join(&block.path, "meta.json");

            let content = match session.get_content(&meta_path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read block metadata '{}' ({})", meta_path, e);
                    continue;
                }
            };

            let meta: BlockMetadata = match serde_json::from_slice(&content) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Failed to parse block metadata '{}' ({})", meta_path, e);
                    continue;
                }
            };

            if meta.version != SUPPORTED_BLOCK_VERSION {
                warn!(
                    "Skipping block '{}', unsupported metadata version {}",
                    block.name(),
                    meta.version
                );
                continue;
            }

            if self.window.overlaps(meta.min_time, meta.max_time) {
                debug!("Keeping block '{}' ({} samples)", block.name(), meta.stats.num_samples);
                continue;
            }

            info!(
                "Removing block '{}' [{} - {}], outside of collection window",
                block.name(),
                format_millis(meta.min_time),
                format_millis(meta.max_time)
            );
            if let Err(e) = session.remove(&block.path).await {
                warn!("Failed to remove block '{}' ({})", block.path, e);
            }
        }
    }

    /// 在远端把快照目录打成 tar 包
    async fn tarball_snapshot(
        &self,
        session: &dyn RemoteSession,
        snapshot_root: &str,
    ) -> Result<(), CollectError> {
        let command = format!("tar -cf {} -C {} .", SNAPSHOT_TARBALL_PATH, snapshot_root);
        let output = session.execute(&command).await?;

        if !output.stderr.is_empty() {
            return Err(CollectError::SnapshotApi(format!(
                "Failed to create snapshot tarball: {}",
                output.stderr_string()
            )));
        }
        Ok(())
    }
}

fn format_millis(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn log_error<E: std::fmt::Display>(e: E) -> E {
    error!("{}", e);
    e
}

#[async_trait]
impl Collector for MetricsCollector {
    fn role(&self) -> &'static str {
        "MC"
    }

    async fn collect(&self, session: Arc<dyn RemoteSession>) -> Result<(), CollectError> {
        info!("Metrics collecting started");

        session.connect().await.map_err(log_error)?;

        info!("Creating snapshot...");
        let name = self.create_snapshot(&*session).await.map_err(log_error)?;
        info!("Snapshot name: {}", name);

        let snapshot_root = path::join(
            &path::join(&self.settings.prometheus.data_path, SNAPSHOT_FOLDER),
            &name,
        );

        info!("Lightening snapshot...");
        self.lighten_snapshot(&*session, &snapshot_root).await;

        let mut src = snapshot_root.clone();
        let mut resource = "snapshot";

        if self.settings.copy_compressed {
            info!("Creating snapshot tarball...");
            let tarball = self.tarball_snapshot(&*session, &snapshot_root).await;
            match &tarball {
                Ok(()) => info!("Creating snapshot tarball OK"),
                Err(e) => error!("{}", e),
            }

            info!("Cleanup snapshot...");
            match session.remove(&snapshot_root).await {
                Ok(()) => info!("Cleanup snapshot OK"),
                Err(e) => error!("{}", e),
            }

            tarball?;

            src = SNAPSHOT_TARBALL_PATH.to_string();
            resource = "snapshot tarball";
        }

        let dest = self.path.join("snapshot");
        info!("Downloading {}...", resource);
        let download = session
            .receive_directory(&src, &dest, Some(LogProgress::shared(resource)))
            .await;
        match &download {
            Ok(()) => info!("Downloading {} OK", resource),
            Err(e) => error!("Failed to receive {} ({})", resource, e),
        }

        info!("Cleanup {}...", resource);
        session.remove(&src).await.map_err(log_error)?;
        info!("Cleanup {} OK", resource);

        download?;

        info!("Metrics collecting completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{CommandOutput, FileInfo, MockRemoteSession, SessionError};
    use std::path::Path;

    const HOST: &str = "metrics-test-host-1";
    const CREATE_SNAPSHOT_COMMAND: &str =
        "curl -s -XPOST http://localhost:9090/api/v1/admin/tsdb/snapshot";
    const CREATE_SNAPSHOT_RESPONSE: &str = r#"
        {
          "status": "success",
          "data": {
            "name": "20200325T090812Z-78629a0f5f3f164f"
          }
        }
    "#;
    const SNAPSHOT_PATH: &str = "/var/data/snapshots/20200325T090812Z-78629a0f5f3f164f";
    const CREATE_TARBALL_COMMAND: &str =
        "tar -cf /tmp/InstaclustrCollection.tar -C /var/data/snapshots/20200325T090812Z-78629a0f5f3f164f .";
    const METRICS_PATH: &str = "/some/metrics/path";

    const BLOCKS: [(&str, &str, i64, i64); 4] = [
        ("01E444CMB0HSK01H0GSRE20NV1", "01E444CMB0HSK01H0GSRE20NV1", 1584957600000, 1584964800000),
        ("01E444CNCYHACHCQPN2ERCGQPP", "01E444CNCYHACHCQPN2ERCGQPP", 1584964800000, 1584972000000),
        ("01E48F42Q6VHY4E8KBK02E7QE2", "01E48F42Q6VHY4E8KBK02E7QE2", 1584979200000, 1584986400000),
        ("01E48FKDW67J37AEQ0N2S0ZBCZ", "01E48H0HDGMZRJD9BDF91VQ01Y", 1585123200000, 1585129210806),
    ];

    fn block_path(dir: &str) -> String {
        format!("{}/{}", SNAPSHOT_PATH, dir)
    }

    fn meta_json(ulid: &str, min_time: i64, max_time: i64, version: u32) -> Vec<u8> {
        format!(
            r#"{{
                "ulid": "{ulid}",
                "minTime": {min_time},
                "maxTime": {max_time},
                "stats": {{ "numSamples": 9352682, "numSeries": 7411, "numChunks": 74110 }},
                "compaction": {{ "level": 1, "sources": ["{ulid}"] }},
                "version": {version}
            }}"#
        )
        .into_bytes()
    }

    fn stdout(s: &str) -> CommandOutput {
        CommandOutput {
            stdout: s.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    fn stderr(s: &str) -> CommandOutput {
        CommandOutput {
            stderr: s.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    /// 连接成功、快照创建成功
    fn mock_snapshot_created() -> MockRemoteSession {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_execute()
            .withf(|cmd| cmd == CREATE_SNAPSHOT_COMMAND)
            .times(1)
            .returning(|_| Ok(stdout(CREATE_SNAPSHOT_RESPONSE)));
        mock
    }

    fn expect_blocks_listed(mock: &mut MockRemoteSession) {
        mock.expect_list_directory()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| {
                Ok(BLOCKS
                    .iter()
                    .map(|(dir, ..)| FileInfo::new(block_path(dir), true))
                    .collect())
            });
    }

    fn expect_meta(mock: &mut MockRemoteSession, block: usize) {
        let (dir, ulid, min, max) = BLOCKS[block];
        let meta_path = format!("{}/meta.json", block_path(dir));
        let content = meta_json(ulid, min, max, 1);
        mock.expect_get_content()
            .withf(move |p| p == meta_path)
            .times(1)
            .returning(move |_| Ok(content.clone()));
    }

    fn expect_block_removed(mock: &mut MockRemoteSession, block: usize, ok: bool) {
        let path = block_path(BLOCKS[block].0);
        mock.expect_remove()
            .withf(move |p| p == path)
            .times(1)
            .returning(move |p| {
                if ok {
                    Ok(())
                } else {
                    Err(SessionError::RemoteFs {
                        host: HOST.to_string(),
                        operation: "remove directory",
                        path: p.to_string(),
                        cause: "permission denied".to_string(),
                    })
                }
            });
    }

    fn expect_block_kept(mock: &mut MockRemoteSession, block: usize) {
        let path = block_path(BLOCKS[block].0);
        mock.expect_remove().withf(move |p| p == path).never();
    }

    /// 未压缩快照的下载与清理各执行一次
    fn expect_download_and_cleanup(mock: &mut MockRemoteSession) {
        mock.expect_receive_directory()
            .withf(|src, dest, _| src == SNAPSHOT_PATH && dest == Path::new("/some/metrics/path/snapshot"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));
    }

    /// 连接成功、快照创建成功、四个块都可读
    fn mock_with_snapshot(version_of_last: u32) -> MockRemoteSession {
        let mut mock = mock_snapshot_created();
        mock.expect_list_directory()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| {
                Ok(BLOCKS
                    .iter()
                    .map(|(dir, ..)| FileInfo::new(block_path(dir), true))
                    .collect())
            });

        for (i, (dir, ulid, min, max)) in BLOCKS.iter().enumerate() {
            let meta_path = format!("{}/meta.json", block_path(dir));
            let version = if i == BLOCKS.len() - 1 { version_of_last } else { 1 };
            let content = meta_json(ulid, *min, *max, version);
            mock.expect_get_content()
                .withf(move |p| p == meta_path)
                .times(1)
                .returning(move |_| Ok(content.clone()));
        }
        mock
    }

    fn collector(copy_compressed: bool, window: CollectionWindow) -> MetricsCollector {
        let settings = MetricsSettings {
            copy_compressed,
            ..Default::default()
        };
        MetricsCollector::new(settings, METRICS_PATH, window)
    }

    fn window_ms(from: i64, to: i64) -> CollectionWindow {
        CollectionWindow::new(
            Utc.timestamp_millis_opt(from).unwrap(),
            Utc.timestamp_millis_opt(to).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_collect() {
        let mut mock = mock_with_snapshot(1);
        mock.expect_execute()
            .withf(|cmd| cmd == CREATE_TARBALL_COMMAND)
            .times(1)
            .returning(|_| Ok(stdout("")));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_receive_directory()
            .withf(|src, dest, progress| {
                src == SNAPSHOT_TARBALL_PATH
                    && dest == Path::new("/some/metrics/path/snapshot")
                    && progress.is_some()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_TARBALL_PATH)
            .times(1)
            .returning(|_| Ok(()));

        let result = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_compression_disabled() {
        let mut mock = mock_with_snapshot(1);
        mock.expect_receive_directory()
            .withf(|src, dest, _| src == SNAPSHOT_PATH && dest == Path::new("/some/metrics/path/snapshot"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));

        let result = collector(false, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_failed_to_connect() {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().times(1).returning(|| {
            Err(SessionError::Connect {
                host: "Remote test".to_string(),
                cause: "some error".to_string(),
            })
        });
        mock.expect_execute().never();

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "SSH agent: Failed to establish connection to remote host 'Remote test' (some error)"
        );
    }

    #[tokio::test]
    async fn test_collect_on_snapshot_stderr() {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_execute()
            .withf(|cmd| cmd == CREATE_SNAPSHOT_COMMAND)
            .returning(|_| Ok(stderr("we can not do that")));
        mock.expect_list_directory().never();
        mock.expect_receive_directory().never();

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create prometheus snapshot: we can not do that"
        );
    }

    #[tokio::test]
    async fn test_collect_on_malformed_response() {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_execute()
            .withf(|cmd| cmd == CREATE_SNAPSHOT_COMMAND)
            .returning(|_| Ok(stdout(r#"{ "xxx": "blablabla", sdfgsdf gsdfgsdfg } "#)));
        mock.expect_list_directory().never();

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::JsonDecode(_)));
        assert_eq!(
            err.to_string(),
            "Failed to unmarshal snapshot command output (key must be a string at line 1 column 23)"
        );
    }

    #[tokio::test]
    async fn test_collect_on_snapshot_command_error() {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_execute().returning(|cmd| {
            Err(SessionError::Exec {
                host: HOST.to_string(),
                command: cmd.to_string(),
                cause: "channel closed".to_string(),
            })
        });

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "SSH agent: Failed to run command '{}' on '{}'. (channel closed)",
                CREATE_SNAPSHOT_COMMAND, HOST
            )
        );
    }

    #[tokio::test]
    async fn test_collect_on_bad_status() {
        let mut mock = MockRemoteSession::new();
        mock.expect_host().return_const(HOST.to_string());
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_execute().returning(|_| {
            Ok(stdout(
                r#"{"status":"error","errorType":"unavailable","error":"admin APIs disabled"}"#,
            ))
        });
        mock.expect_list_directory().never();

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create prometheus snapshot (status: 'error'): admin APIs disabled"
        );
    }

    #[tokio::test]
    async fn test_collect_removes_blocks_outside_window() {
        let mut mock = mock_with_snapshot(1);
        // 只有第三个块落在窗口内
        for (dir, ..) in [BLOCKS[0], BLOCKS[1], BLOCKS[3]] {
            let path = block_path(dir);
            mock.expect_remove()
                .withf(move |p| p == path)
                .times(1)
                .returning(|_| Ok(()));
        }
        mock.expect_receive_directory()
            .withf(|src, _, _| src == SNAPSHOT_PATH)
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));

        let result = collector(false, window_ms(1584975600000, 1584990000000))
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_unreadable_block_metadata() {
        let mut mock = mock_snapshot_created();
        expect_blocks_listed(&mut mock);

        // 第一个块的 meta.json 读取失败：保留该块，其余块照常处理
        let unreadable = format!("{}/meta.json", block_path(BLOCKS[0].0));
        mock.expect_get_content()
            .withf(move |p| p == unreadable)
            .times(1)
            .returning(|p| {
                Err(SessionError::RemoteFs {
                    host: HOST.to_string(),
                    operation: "open",
                    path: p.to_string(),
                    cause: "no such file".to_string(),
                })
            });
        for block in 1..BLOCKS.len() {
            expect_meta(&mut mock, block);
        }

        expect_block_kept(&mut mock, 0);
        expect_block_removed(&mut mock, 1, true);
        expect_block_kept(&mut mock, 2);
        expect_block_removed(&mut mock, 3, true);
        expect_download_and_cleanup(&mut mock);

        let result = collector(false, window_ms(1584975600000, 1584990000000))
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_failed_block_removal() {
        let mut mock = mock_snapshot_created();
        expect_blocks_listed(&mut mock);
        for block in 0..BLOCKS.len() {
            expect_meta(&mut mock, block);
        }

        expect_block_removed(&mut mock, 0, false);
        expect_block_removed(&mut mock, 1, false);
        expect_block_kept(&mut mock, 2);
        expect_block_removed(&mut mock, 3, true);
        expect_download_and_cleanup(&mut mock);

        let result = collector(false, window_ms(1584975600000, 1584990000000))
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_failed_block_listing_downloads_whole_snapshot() {
        let mut mock = mock_snapshot_created();
        mock.expect_list_directory()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|p| {
                Err(SessionError::RemoteFs {
                    host: HOST.to_string(),
                    operation: "list directory",
                    path: p.to_string(),
                    cause: "permission denied".to_string(),
                })
            });
        mock.expect_get_content().never();
        expect_download_and_cleanup(&mut mock);

        let result = collector(false, window_ms(1584975600000, 1584990000000))
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_keeps_unsupported_block_version() {
        let mut mock = mock_with_snapshot(2);
        // 窗口只覆盖最后一个块之外的时间，但它的版本不受支持，不会被删除
        for (dir, ..) in [BLOCKS[0], BLOCKS[1], BLOCKS[2]] {
            let path = block_path(dir);
            mock.expect_remove()
                .withf(move |p| p == path)
                .times(1)
                .returning(|_| Ok(()));
        }
        mock.expect_receive_directory()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));

        let result = collector(false, window_ms(0, 1000))
            .collect(Arc::new(mock))
            .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_collect_on_tarball_failure_cleans_up() {
        let mut mock = mock_with_snapshot(1);
        mock.expect_execute()
            .withf(|cmd| cmd == CREATE_TARBALL_COMMAND)
            .times(1)
            .returning(|_| Ok(stderr("tar: /tmp: No space left on device")));
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_receive_directory().never();

        let err = collector(true, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create snapshot tarball: tar: /tmp: No space left on device"
        );
    }

    #[tokio::test]
    async fn test_collect_on_download_failure_still_cleans_up() {
        let mut mock = mock_with_snapshot(1);
        mock.expect_receive_directory().times(1).returning(|src, _, _| {
            Err(SessionError::Transfer {
                host: HOST.to_string(),
                path: src.to_string(),
                cause: "connection reset".to_string(),
            })
        });
        mock.expect_remove()
            .withf(|p| p == SNAPSHOT_PATH)
            .times(1)
            .returning(|_| Ok(()));

        let err = collector(false, CollectionWindow::default())
            .collect(Arc::new(mock))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Session(SessionError::Transfer { .. })));
    }

    #[test]
    fn test_default_settings() {
        let settings = MetricsSettings::default();
        assert_eq!(settings.prometheus.port, 9090);
        assert_eq!(settings.prometheus.data_path, "/var/data");
        assert!(settings.copy_compressed);
    }

    #[test]
    fn test_parse_block_metadata() {
        let meta: BlockMetadata =
            serde_json::from_slice(&meta_json("01E444CMB0HSK01H0GSRE20NV1", 1584957600000, 1584964800000, 1))
                .unwrap();
        assert_eq!(meta.ulid, "01E444CMB0HSK01H0GSRE20NV1");
        assert_eq!(meta.version, 1);
        assert_eq!(meta.min_time, 1584957600000);
        assert_eq!(meta.max_time, 1584964800000);
        assert_eq!(meta.stats.num_series, 7411);
    }
}
