use std::fmt;

/// 展示给考生的同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// 自动保存已发出
    Saved,
    /// 离线或保存失败，已进入队列
    OfflineQueued,
    /// 队列已全部同步
    AllSynced,
    /// 最终提交失败，可重试
    SubmitFailed,
    /// 开始作答失败
    StartFailed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Saved => "Saved",
            SyncStatus::OfflineQueued => "Offline: queued",
            SyncStatus::AllSynced => "All saves synced",
            SyncStatus::SubmitFailed => "Submit failed. Retry.",
            SyncStatus::StartFailed => "Failed to start exam",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
