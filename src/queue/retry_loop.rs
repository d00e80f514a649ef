//! 重试循环
//!
//! 一个受监管的周期任务：每个周期在在线时刷新一次队列，
//! 网络从离线恢复为在线时立即额外刷新一次。

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::autosave_queue::AutosaveQueue;
use crate::network::NetworkMonitor;

/// 重试循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// 没有运行中的重试循环
    Idle,
    /// 周期任务运行中
    Retrying,
}

/// 运行中的重试任务句柄
pub(crate) struct RetryLoop {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetryLoop {
    pub(crate) fn abort(self) {
        let _ = self.cancel.send(true);
        self.handle.abort();
    }
}

impl AutosaveQueue {
    /// 启动重试循环（Idle → Retrying），已在运行时不做任何事
    ///
    /// # 参数
    /// - `network`: 网络状态，离线时跳过周期刷新
    /// - `period`: 周期（参考值 5 秒）
    ///
    /// # 返回
    /// 是否新启动了循环
    pub fn start_retry_loop(self: &Arc<Self>, network: NetworkMonitor, period: Duration) -> bool {
        let mut retry = self.retry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if retry.is_some() {
            return false;
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(run_retry_loop(Arc::downgrade(self), network, period, cancel_rx));
        *retry = Some(RetryLoop { cancel, handle });

        info!("[作答 {}] 🔁 重试循环已启动 (周期 {:?})", self.attempt_id(), period);
        true
    }

    /// 停止重试循环（Retrying → Idle），等待任务退出
    ///
    /// 正在进行的刷新会先完成，已经发出的请求不会被取消。
    pub async fn stop_retry_loop(&self) {
        let retry = self
            .retry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(RetryLoop { cancel, handle }) = retry {
            let _ = cancel.send(true);
            let _ = handle.await;
            info!("[作答 {}] ⏹ 重试循环已停止", self.attempt_id());
        }
    }

    pub fn retry_state(&self) -> RetryState {
        let retry = self.retry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match retry.as_ref() {
            Some(r) if !r.handle.is_finished() => RetryState::Retrying,
            _ => RetryState::Idle,
        }
    }
}

async fn run_retry_loop(
    queue: Weak<AutosaveQueue>,
    network: NetworkMonitor,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut online = network.subscribe();

    loop {
        tokio::select! {
            biased;

            _ = cancel.changed() => break,

            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if !*online.borrow_and_update() {
                    continue;
                }
                debug!("网络恢复，立即刷新队列");
            }

            _ = ticker.tick() => {
                if !network.is_online() {
                    continue;
                }
            }
        }

        let Some(queue) = queue.upgrade() else {
            break;
        };
        let report = queue.flush().await;
        if report.attempted > 0 {
            crate::utils::logging::log_flush_report(queue.attempt_id(), &report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Outcome, ScriptedApi};
    use crate::models::SavePayload;
    use crate::storage::MemoryStore;

    fn payload(id: i64) -> SavePayload {
        SavePayload {
            question_id: id.into(),
            answer: None,
            time_spent: 0,
            flagged: false,
        }
    }

    fn build(api: &Arc<ScriptedApi>) -> Arc<AutosaveQueue> {
        Arc::new(AutosaveQueue::new("attempt-1", api.clone(), Arc::new(MemoryStore::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_while_online() {
        let api = Arc::new(ScriptedApi::new());
        api.push_save_outcomes([Outcome::NetworkError]);
        let queue = build(&api);
        let network = NetworkMonitor::online();

        queue.enqueue(payload(1));
        assert!(queue.start_retry_loop(network.clone(), Duration::from_secs(5)));
        assert!(!queue.start_retry_loop(network, Duration::from_secs(5)));
        assert_eq!(queue.retry_state(), RetryState::Retrying);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(api.save_calls(), 1);
        assert_eq!(queue.len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.save_calls(), 2);
        assert!(queue.is_empty());

        queue.stop_retry_loop().await;
        assert_eq!(queue.retry_state(), RetryState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_skips_then_online_flushes_immediately() {
        let api = Arc::new(ScriptedApi::new());
        let queue = build(&api);
        let network = NetworkMonitor::new(false);

        queue.enqueue(payload(1));
        queue.start_retry_loop(network.clone(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(api.save_calls(), 0);

        network.set_online(true);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(api.save_calls(), 1);
        assert!(queue.is_empty());

        queue.stop_retry_loop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_loop_does_not_flush() {
        let api = Arc::new(ScriptedApi::new());
        let queue = build(&api);
        let network = NetworkMonitor::online();

        queue.start_retry_loop(network.clone(), Duration::from_secs(5));
        queue.stop_retry_loop().await;
        assert_eq!(queue.retry_state(), RetryState::Idle);

        queue.enqueue(payload(1));
        network.set_online(false);
        network.set_online(true);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.save_calls(), 0);
        assert_eq!(queue.len(), 1);
    }
}
