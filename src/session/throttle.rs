/// 自动保存节流
///
/// 时间轴按固定窗口切分，同一个窗口内只允许一次保存。
#[derive(Debug, Clone, Copy)]
pub struct AutosaveThrottle {
    window_ms: i64,
}

impl AutosaveThrottle {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms: window_ms.max(1),
        }
    }

    /// 当前时刻是否落在与上次保存不同的窗口
    ///
    /// # 参数
    /// - `now_ms`: 当前毫秒时间戳
    /// - `last_saved_at`: 上次保存的毫秒时间戳，从未保存过为 `None`
    pub fn should_save(&self, now_ms: i64, last_saved_at: Option<i64>) -> bool {
        let last = last_saved_at.unwrap_or(0);
        now_ms.div_euclid(self.window_ms) != last.div_euclid(self.window_ms)
    }
}

impl Default for AutosaveThrottle {
    fn default() -> Self {
        Self::new(10_000)
    }
}
