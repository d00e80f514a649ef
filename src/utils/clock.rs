use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// 时钟抽象，测试中使用可手动推进的时钟
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    /// 毫秒时间戳，克隆之间共享
    Manual(Arc<AtomicI64>),
}

impl Clock {
    pub fn system() -> Self {
        Clock::System
    }

    /// 固定在给定时刻的手动时钟
    pub fn manual(at: DateTime<Utc>) -> Self {
        Clock::Manual(Arc::new(AtomicI64::new(at.timestamp_millis())))
    }

    pub fn now_ms(&self) -> i64 {
        match self {
            Clock::System => Utc::now().timestamp_millis(),
            Clock::Manual(ms) => ms.load(Ordering::SeqCst),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Manual(ms) => DateTime::<Utc>::from_timestamp_millis(ms.load(Ordering::SeqCst))
                .unwrap_or_default(),
        }
    }

    /// 推进手动时钟，对系统时钟无效
    pub fn advance(&self, delta: Duration) {
        if let Clock::Manual(ms) = self {
            ms.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
        }
    }
}
