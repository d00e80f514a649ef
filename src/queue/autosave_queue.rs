//! 自动保存投递队列 - 业务能力层
//!
//! 把保存失败的请求按顺序缓存下来，并在网络恢复后逐个重新投递。
//!
//! ## 保证
//! - 入队立即返回，从不失败（持久化失败只记日志，内存中的队列仍然有效）
//! - 刷新时严格按入队顺序、逐个串行投递
//! - 刷新过程中新入队的项追加在快照之后，本轮不会访问，也不会丢失或重复
//! - 队列从非空变为空时调用一次完成回调

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use super::retry_loop::RetryLoop;
use crate::api::ExamApi;
use crate::models::{QueueItem, SavePayload};
use crate::storage::{autosave_queue_key, read_json, write_json, DurableStore};
use crate::utils::clock::Clock;

/// 队列清空时的回调
pub type DrainedCallback = Arc<dyn Fn() + Send + Sync>;

/// 一次刷新的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// 本轮尝试投递的数量
    pub attempted: usize,
    /// 投递成功的数量
    pub delivered: usize,
    /// 刷新结束后仍在队列中的数量（含刷新期间新入队的）
    pub remaining: usize,
    /// 因多次被后端拒绝而丢弃的数量
    pub dropped: usize,
}

/// 自动保存投递队列
///
/// 每个实例只服务一个作答 ID，内存中的列表是权威数据，
/// 每次变更后整体镜像到 `autosave_queue::{attempt_id}`。
pub struct AutosaveQueue {
    attempt_id: String,
    key: String,
    api: Arc<dyn ExamApi>,
    store: Arc<dyn DurableStore>,
    clock: Clock,
    items: Mutex<Vec<QueueItem>>,
    flush_lock: tokio::sync::Mutex<()>,
    on_drained: Option<DrainedCallback>,
    max_rejected_attempts: u32,
    closed: AtomicBool,
    pub(super) retry: Mutex<Option<RetryLoop>>,
}

impl AutosaveQueue {
    /// 创建队列，并从持久化存储中恢复上次未投递的项
    ///
    /// # 参数
    /// - `attempt_id`: 作答 ID
    /// - `api`: 后端能力
    /// - `store`: 持久化存储
    pub fn new(attempt_id: impl Into<String>, api: Arc<dyn ExamApi>, store: Arc<dyn DurableStore>) -> Self {
        let attempt_id = attempt_id.into();
        let key = autosave_queue_key(&attempt_id);

        let items = match read_json::<Vec<QueueItem>>(store.as_ref(), &key) {
            Ok(Some(items)) => {
                if !items.is_empty() {
                    info!("[作答 {}] 📥 恢复 {} 条未同步的保存请求", attempt_id, items.len());
                }
                items
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("[作答 {}] ⚠️ 读取本地队列失败，按空队列处理: {}", attempt_id, e);
                Vec::new()
            }
        };

        Self {
            attempt_id,
            key,
            api,
            store,
            clock: Clock::default(),
            items: Mutex::new(items),
            flush_lock: tokio::sync::Mutex::new(()),
            on_drained: None,
            max_rejected_attempts: 5,
            closed: AtomicBool::new(false),
            retry: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// 设置队列清空回调
    pub fn on_drained(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_drained = Some(Arc::new(callback));
        self
    }

    /// 设置后端拒绝（非瞬时失败）的最大次数，0 表示无限重试
    pub fn with_max_rejected_attempts(mut self, max: u32) -> Self {
        self.max_rejected_attempts = max;
        self
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    fn lock_items(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 把当前列表镜像到持久化存储，失败只记录日志
    fn persist(&self, items: &[QueueItem]) {
        if let Err(e) = write_json(self.store.as_ref(), &self.key, items) {
            warn!("[作答 {}] ⚠️ 队列持久化失败（仅保留在内存中）: {}", self.attempt_id, e);
        }
    }

    /// 入队一条保存请求
    ///
    /// `clear()` 之后的入队被忽略。
    pub fn enqueue(&self, payload: SavePayload) {
        if self.closed.load(Ordering::SeqCst) {
            debug!("[作答 {}] 队列已关闭，忽略题目 {}", self.attempt_id, payload.question_id);
            return;
        }
        let item = QueueItem::new(payload, self.clock.now_ms());
        let mut items = self.lock_items();
        debug!(
            "[作答 {}] 入队: 题目 {} (队列长度 {})",
            self.attempt_id,
            item.payload.question_id,
            items.len() + 1
        );
        items.push(item);
        self.persist(&items);
    }

    /// 当前排队的所有项（按投递顺序）
    pub fn pending(&self) -> Vec<QueueItem> {
        self.lock_items().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_items().is_empty()
    }

    /// 丢弃所有项、删除持久化数据并关闭队列（提交成功后调用）
    pub async fn clear(&self) {
        let _guard = self.flush_lock.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        self.lock_items().clear();
        if let Err(e) = self.store.remove(&self.key) {
            warn!("[作答 {}] ⚠️ 删除本地队列失败: {}", self.attempt_id, e);
        }
    }

    /// 按顺序投递队列中的所有项
    ///
    /// 成功的项被移除，失败的项按原顺序保留到下一轮。
    /// 队列为空时直接返回，不触发回调。
    pub async fn flush(&self) -> FlushReport {
        let _guard = self.flush_lock.lock().await;

        let snapshot = self.pending();
        if snapshot.is_empty() {
            return FlushReport::default();
        }

        let mut report = FlushReport {
            attempted: snapshot.len(),
            ..Default::default()
        };
        let mut kept = Vec::with_capacity(snapshot.len());

        for mut item in snapshot.iter().cloned() {
            match self.api.save_answer(&self.attempt_id, &item.payload).await {
                Ok(()) => {
                    report.delivered += 1;
                }
                Err(e) if e.is_transient() => {
                    debug!("[作答 {}] 题目 {} 投递失败，保留: {}", self.attempt_id, item.payload.question_id, e);
                    kept.push(item);
                }
                Err(e) => {
                    item.attempts += 1;
                    if self.max_rejected_attempts > 0 && item.attempts >= self.max_rejected_attempts {
                        error!(
                            "[作答 {}] ❌ 题目 {} 已被后端拒绝 {} 次，放弃投递: {}",
                            self.attempt_id, item.payload.question_id, item.attempts, e
                        );
                        report.dropped += 1;
                    } else {
                        warn!(
                            "[作答 {}] 题目 {} 被后端拒绝 ({}/{}): {}",
                            self.attempt_id, item.payload.question_id, item.attempts, self.max_rejected_attempts, e
                        );
                        kept.push(item);
                    }
                }
            }
        }

        report.remaining = {
            let mut items = self.lock_items();
            // 只有 flush 会移除元素且 flush 串行执行，所以当前列表以快照开头
            let keep = snapshot.len().min(items.len());
            let appended = items.split_off(keep);
            kept.extend(appended);
            *items = kept;
            self.persist(&items);
            items.len()
        };

        debug!(
            "[作答 {}] 刷新完成: 成功 {}/{}，剩余 {}",
            self.attempt_id, report.delivered, report.attempted, report.remaining
        );

        if report.remaining == 0 {
            if let Some(callback) = &self.on_drained {
                callback();
            }
        }

        report
    }
}

impl Drop for AutosaveQueue {
    fn drop(&mut self) {
        let retry = self.retry.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(retry) = retry.take() {
            retry.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Outcome, ScriptedApi};
    use crate::models::AnswerPayload;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn payload(id: i64, answer: &str) -> SavePayload {
        SavePayload {
            question_id: id.into(),
            answer: Some(AnswerPayload::text(answer)),
            time_spent: 5,
            flagged: false,
        }
    }

    fn stored_len(store: &MemoryStore, attempt_id: &str) -> usize {
        read_json::<Vec<QueueItem>>(store, &autosave_queue_key(attempt_id))
            .unwrap()
            .map(|items| items.len())
            .unwrap_or(0)
    }

    fn build(api: &Arc<ScriptedApi>, store: &MemoryStore) -> AutosaveQueue {
        AutosaveQueue::new("attempt-1", api.clone(), Arc::new(store.clone()))
    }

    #[test]
    fn test_enqueue_persists_every_item() {
        let api = Arc::new(ScriptedApi::new());
        let store = MemoryStore::new();
        let queue = build(&api, &store);

        for i in 0..4 {
            queue.enqueue(payload(i, "A"));
            assert_eq!(stored_len(&store, "attempt-1"), (i + 1) as usize);
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(api.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_flush_success_clears_and_calls_back() {
        let api = Arc::new(ScriptedApi::new());
        let store = MemoryStore::new();
        let drained = Arc::new(AtomicUsize::new(0));
        let counter = drained.clone();
        let queue = build(&api, &store).on_drained(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        queue.enqueue(payload(101, "A"));
        let report = queue.flush().await;

        assert_eq!(report, FlushReport { attempted: 1, delivered: 1, remaining: 0, dropped: 0 });
        assert!(queue.is_empty());
        assert_eq!(store.raw(&autosave_queue_key("attempt-1")).as_deref(), Some("[]"));
        assert_eq!(drained.load(Ordering::SeqCst), 1);
        assert_eq!(api.saved(), vec![payload(101, "A")]);
    }

    #[tokio::test]
    async fn test_flush_keeps_failed_in_order() {
        let api = Arc::new(ScriptedApi::new());
        api.push_save_outcomes([
            Outcome::Ok,
            Outcome::NetworkError,
            Outcome::Ok,
            Outcome::Status(503),
            Outcome::Ok,
        ]);
        let store = MemoryStore::new();
        let queue = build(&api, &store);

        for (i, answer) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            queue.enqueue(payload(i as i64, answer));
        }
        let report = queue.flush().await;

        assert_eq!(report.delivered, 3);
        assert_eq!(report.remaining, 2);
        let remaining: Vec<_> = queue.pending().into_iter().map(|item| item.payload).collect();
        assert_eq!(remaining, vec![payload(1, "b"), payload(3, "d")]);
        assert_eq!(stored_len(&store, "attempt-1"), 2);
    }

    #[tokio::test]
    async fn test_fail_once_then_succeed() {
        let api = Arc::new(ScriptedApi::new());
        api.push_save_outcomes([Outcome::Status(500)]);
        let store = MemoryStore::new();
        let queue = build(&api, &store);

        queue.enqueue(payload(1, "A"));
        queue.flush().await;
        assert_eq!(queue.len(), 1);
        queue.flush().await;
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_callback_once_per_drain() {
        let api = Arc::new(ScriptedApi::new());
        let store = MemoryStore::new();
        let drained = Arc::new(AtomicUsize::new(0));
        let counter = drained.clone();
        let queue = build(&api, &store).on_drained(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // 空队列不触发回调
        queue.flush().await;
        assert_eq!(drained.load(Ordering::SeqCst), 0);

        queue.enqueue(payload(1, "A"));
        queue.flush().await;
        queue.flush().await;
        queue.flush().await;
        assert_eq!(drained.load(Ordering::SeqCst), 1);

        queue.enqueue(payload(2, "B"));
        queue.flush().await;
        assert_eq!(drained.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hydrates_from_store() {
        let api = Arc::new(ScriptedApi::new());
        api.set_default_save(Outcome::NetworkError);
        let store = MemoryStore::new();

        {
            let queue = build(&api, &store);
            queue.enqueue(payload(1, "A"));
            queue.enqueue(payload(2, "B"));
            queue.flush().await;
        }

        // 模拟刷新页面：新实例从同一存储恢复
        api.set_default_save(Outcome::Ok);
        let reloaded = build(&api, &store);
        assert_eq!(reloaded.len(), 2);
        let report = reloaded.flush().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(api.saved(), vec![payload(1, "A"), payload(2, "B")]);
    }

    #[tokio::test]
    async fn test_rejections_capped() {
        let api = Arc::new(ScriptedApi::new());
        api.set_default_save(Outcome::Status(422));
        let store = MemoryStore::new();
        let queue = build(&api, &store).with_max_rejected_attempts(2);

        queue.enqueue(payload(1, "A"));
        let first = queue.flush().await;
        assert_eq!((first.remaining, first.dropped), (1, 0));
        assert_eq!(queue.pending()[0].attempts, 1);

        let second = queue.flush().await;
        assert_eq!((second.remaining, second.dropped), (0, 1));
    }

    #[tokio::test]
    async fn test_transient_failures_never_dropped() {
        let api = Arc::new(ScriptedApi::new());
        api.set_default_save(Outcome::Status(502));
        let store = MemoryStore::new();
        let queue = build(&api, &store).with_max_rejected_attempts(1);

        queue.enqueue(payload(1, "A"));
        for _ in 0..5 {
            queue.flush().await;
        }
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending()[0].attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_flush_is_preserved() {
        let api = Arc::new(ScriptedApi::new());
        api.set_save_latency(std::time::Duration::from_millis(200));
        api.push_save_outcomes([Outcome::NetworkError]);
        let store = MemoryStore::new();
        let queue = Arc::new(build(&api, &store));

        queue.enqueue(payload(1, "A"));
        let flushing = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });

        while api.save_calls() == 0 {
            tokio::task::yield_now().await;
        }
        queue.enqueue(payload(2, "B"));

        let report = flushing.await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.remaining, 2);
        let order: Vec<_> = queue.pending().into_iter().map(|item| item.payload).collect();
        assert_eq!(order, vec![payload(1, "A"), payload(2, "B")]);
        assert_eq!(api.save_calls(), 1);

        let report = queue.flush().await;
        assert_eq!(report.delivered, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_memory_queue() {
        let api = Arc::new(ScriptedApi::new());
        api.set_default_save(Outcome::NetworkError);
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let queue = build(&api, &store);

        queue.enqueue(payload(1, "A"));
        assert_eq!(queue.len(), 1);
        assert!(store.raw(&autosave_queue_key("attempt-1")).is_none());

        api.set_default_save(Outcome::Ok);
        assert_eq!(queue.flush().await.delivered, 1);
    }

    #[tokio::test]
    async fn test_clear_removes_key() {
        let api = Arc::new(ScriptedApi::new());
        let store = MemoryStore::new();
        let queue = build(&api, &store);

        queue.enqueue(payload(1, "A"));
        queue.clear().await;
        assert!(queue.is_empty());
        assert!(store.keys().is_empty());

        queue.enqueue(payload(2, "B"));
        assert!(queue.is_empty());
        assert!(store.keys().is_empty());
        assert_eq!(queue.flush().await, FlushReport::default());
    }
}
