// 指标采集时间窗口

use chrono::{DateTime, TimeZone, Utc};

/// 采集窗口 `[from, to]`（UTC）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl CollectionWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// 从 Unix 纪元到当前时刻
    pub fn until_now() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, Utc::now())
    }

    /// 窗口是否合法（from 不晚于 to）
    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }

    /// 块的时间范围（毫秒时间戳）是否与窗口重叠
    ///
    /// 两侧都是严格比较：恰好落在边界上的块不算重叠。
    pub fn overlaps(&self, min_time_ms: i64, max_time_ms: i64) -> bool {
        let (Some(block_min), Some(block_max)) = (from_millis(min_time_ms), from_millis(max_time_ms))
        else {
            return false;
        };

        (block_min > self.from || block_max > self.from)
            && (block_min < self.to || block_max < self.to)
    }
}

impl Default for CollectionWindow {
    fn default() -> Self {
        Self::until_now()
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
