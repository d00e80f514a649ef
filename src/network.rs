//! 网络状态 - 基础设施层
//!
//! 由外壳（浏览器事件、系统网络回调等）上报在线/离线，
//! 内部通过 `watch` 通道广播，重试循环订阅"恢复在线"事件。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// 在线状态监视器，克隆后共享同一个状态
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// 上报网络状态，只有状态真正变化时才通知订阅者
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("🌐 网络已恢复");
            } else {
                info!("📴 网络已断开");
            }
        }
    }

    /// 订阅状态变化；当前值视为已读，只会收到之后的变化
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::online()
    }
}
