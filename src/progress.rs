// 传输进度
// 共享字节计数器、后台采样 ticker 与日志输出适配器

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 采样间隔
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// 进度回调能力
pub trait Progress: Send + Sync {
    /// `copied` 已传输字节数，`total` 总字节数，`remaining` 预估剩余时间
    fn on_tick(&self, copied: u64, total: u64, remaining: Duration);
}

impl<F> Progress for F
where
    F: Fn(u64, u64, Duration) + Send + Sync,
{
    fn on_tick(&self, copied: u64, total: u64, remaining: Duration) {
        self(copied, total, remaining)
    }
}

/// 可在任务之间共享的进度回调
pub type SharedProgress = Arc<dyn Progress>;

/// 共享字节计数器
/// 写入方（传输循环）递增，ticker 读取；值单调递增
#[derive(Debug, Default)]
pub struct TransferCounter {
    n: AtomicU64,
}

impl TransferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 累加已传输字节
    pub fn add(&self, bytes: u64) {
        self.n.fetch_add(bytes, Ordering::AcqRel);
    }

    /// 当前已传输字节
    pub fn get(&self) -> u64 {
        self.n.load(Ordering::Acquire)
    }
}

/// 后台进度 ticker
/// 每秒采样一次计数器；结束时保证再上报一次最终值
pub struct ProgressTicker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// 启动 ticker（需要在 tokio 运行时中调用）
    pub fn spawn(counter: Arc<TransferCounter>, total: u64, progress: SharedProgress) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();

        let handle = tokio::spawn(async move {
            let started_at = Instant::now();
            let mut ticker = tokio::time::interval(TICK_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 跳过第一个即时触发
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let copied = counter.get();
                        progress.on_tick(
                            copied,
                            total,
                            estimate_remaining(started_at.elapsed(), copied, total),
                        );
                    }
                }
            }

            progress.on_tick(counter.get(), total, Duration::ZERO);
        });

        Self { token, handle }
    }

    /// 停止 ticker 并等待最终上报完成
    pub async fn finish(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// 根据已用时间和平均速度预估剩余时间
pub fn estimate_remaining(elapsed: Duration, copied: u64, total: u64) -> Duration {
    if copied == 0 || copied >= total {
        return Duration::ZERO;
    }
    let remaining_bytes = (total - copied) as f64;
    Duration::from_secs_f64(elapsed.as_secs_f64() * remaining_bytes / copied as f64)
}

const DECIMAL_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// 人类可读的大小，保留 4 位有效数字（如 "2.746 MB", "796 B"）
pub fn human_size(size: f64) -> String {
    let mut size = size;
    let mut unit = 0;
    while size >= 1000.0 && unit < DECIMAL_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }

    let precision = match size {
        s if s >= 100.0 => 1,
        s if s >= 10.0 => 2,
        _ => 3,
    };
    let formatted = format!("{:.*}", precision, size);
    let formatted = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", formatted, DECIMAL_UNITS[unit])
}

/// 把进度写到运行日志里的适配器
pub struct LogProgress {
    what: String,
    started_at: Instant,
}

impl LogProgress {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            started_at: Instant::now(),
        }
    }

    /// 包装为共享回调
    pub fn shared(what: impl Into<String>) -> SharedProgress {
        Arc::new(Self::new(what))
    }
}

impl Progress for LogProgress {
    fn on_tick(&self, copied: u64, total: u64, remaining: Duration) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            copied as f64 / elapsed
        } else {
            0.0
        };

        info!(
            "Downloading {}: {} of {} ({}/s), ETA {}",
            self.what,
            human_size(copied as f64),
            human_size(total as f64),
            human_size(rate),
            humantime::format_duration(Duration::from_secs(remaining.as_secs()))
        );
    }
}
