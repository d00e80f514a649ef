//! 作答会话 - 流程编排层
//!
//! 把状态存储、倒计时、自动保存节流、投递队列和后端能力组合成一次完整的作答：
//! 开始 → 每秒计时与自动保存 → 手动或到期提交。
//!
//! 所有依赖都在构造时注入，测试中可以替换为脚本化后端、内存存储和手动时钟。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::countdown::{Countdown, CountdownTick};
use super::state_store::{AttemptStore, Direction};
use super::status::SyncStatus;
use super::throttle::AutosaveThrottle;
use crate::api::ExamApi;
use crate::config::Config;
use crate::error::{AppError, AppResult, SubmitError};
use crate::models::{AnswerPayload, AttemptState, Question, QuestionId, SubmitRequest, SubmitResult};
use crate::network::NetworkMonitor;
use crate::queue::AutosaveQueue;
use crate::storage::DurableStore;
use crate::utils::clock::Clock;
use crate::utils::logging::{log_attempt_start, log_flush_report, log_submit_result, truncate_text};

/// 会话依赖
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn ExamApi>,
    pub store: Arc<dyn DurableStore>,
    pub network: NetworkMonitor,
    pub clock: Clock,
}

impl SessionDeps {
    /// 在线网络、系统时钟
    pub fn new(api: Arc<dyn ExamApi>, store: Arc<dyn DurableStore>) -> Self {
        Self {
            api,
            store,
            network: NetworkMonitor::online(),
            clock: Clock::system(),
        }
    }

    pub fn with_network(mut self, network: NetworkMonitor) -> Self {
        self.network = network;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// 一次自动保存采样的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutosaveOutcome {
    /// 没有当前题
    NoQuestion,
    /// 与上次保存处于同一窗口
    Throttled,
    /// 已送达后端（直接保存，或排在更早的保存之后一起刷新）
    Saved,
    /// 离线或保存失败，已入队
    Queued,
    /// 会话已提交，结果被丢弃
    Closed,
}

/// 一次计时步进的结果
#[derive(Debug)]
pub enum TickOutcome {
    /// 仍在计时
    Running { remaining_secs: u64 },
    /// 到期并自动提交成功
    AutoSubmitted(SubmitResult),
    /// 到期自动提交失败，可手动重试
    AutoSubmitFailed(AppError),
    /// 会话已提交
    Finished,
}

struct TimerTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// 作答会话
pub struct AttemptSession {
    exam_id: String,
    attempt_id: String,
    expires_at: DateTime<Utc>,
    tick_interval: std::time::Duration,
    api: Arc<dyn ExamApi>,
    network: NetworkMonitor,
    clock: Clock,
    state: Arc<Mutex<AttemptStore>>,
    queue: Arc<AutosaveQueue>,
    countdown: Mutex<Countdown>,
    throttle: AutosaveThrottle,
    submitting: AtomicBool,
    submitted: AtomicBool,
    ticker: Mutex<Option<TimerTask>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AttemptSession {
    /// 开始（或继续）一次作答
    ///
    /// # 参数
    /// - `exam_id`: 考试ID
    /// - `config`: 计时、节流、重试参数
    /// - `deps`: 注入的后端、存储、网络状态和时钟
    ///
    /// # 返回
    /// 开始接口失败时返回 `AppError::Api`，续答快照失败不影响开始
    pub async fn start(exam_id: &str, config: &Config, deps: SessionDeps) -> AppResult<Arc<Self>> {
        let SessionDeps { api, store, network, clock } = deps;

        let started = api.start_exam(exam_id).await.map_err(|e| {
            error!("❌ {}: {}", SyncStatus::StartFailed, e);
            e
        })?;
        let attempt_id = started.attempt_id;

        let resume = match api.fetch_resume(&attempt_id).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("[作答 {}] ⚠️ 续答快照获取失败，使用本地状态继续: {}", attempt_id, e);
                None
            }
        };

        let attempt = AttemptStore::restore(attempt_id.clone(), started.questions, store.clone(), resume);
        let question_count = attempt.questions().len();
        let state = Arc::new(Mutex::new(attempt));

        let drained_state = state.clone();
        let queue = Arc::new(
            AutosaveQueue::new(attempt_id.clone(), api.clone(), store)
                .with_clock(clock.clone())
                .with_max_rejected_attempts(config.max_rejected_attempts)
                .on_drained(move || lock(&drained_state).set_status(SyncStatus::AllSynced)),
        );
        queue.start_retry_loop(network.clone(), config.retry_interval());

        let countdown = Countdown::from_expiry(started.expires_at, clock.now());
        log_attempt_start(exam_id, &attempt_id, question_count, countdown.remaining());

        Ok(Arc::new(Self {
            exam_id: exam_id.to_string(),
            attempt_id,
            expires_at: started.expires_at,
            tick_interval: config.tick_interval(),
            api,
            network,
            clock,
            state,
            queue,
            countdown: Mutex::new(countdown),
            throttle: AutosaveThrottle::new(config.autosave_window_ms()),
            submitting: AtomicBool::new(false),
            submitted: AtomicBool::new(false),
            ticker: Mutex::new(None),
        }))
    }

    fn lock_state(&self) -> MutexGuard<'_, AttemptStore> {
        lock(&self.state)
    }

    // ========== 查询 ==========

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn queue(&self) -> &Arc<AutosaveQueue> {
        &self.queue
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// 当前状态的副本
    pub fn snapshot(&self) -> AttemptState {
        self.lock_state().state().clone()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.lock_state().questions().to_vec()
    }

    pub fn current_question(&self) -> Option<Question> {
        self.lock_state().current_question().cloned()
    }

    /// 最近一次同步状态文本
    pub fn status(&self) -> String {
        self.lock_state().state().saved_message.clone()
    }

    pub fn remaining_secs(&self) -> u64 {
        lock(&self.countdown).remaining()
    }

    pub fn answered_count(&self) -> usize {
        self.lock_state().answered_count()
    }

    pub fn flagged_count(&self) -> usize {
        self.lock_state().flagged_count()
    }

    pub fn pending_saves(&self) -> usize {
        self.queue.len()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::SeqCst)
    }

    // ========== 作答操作 ==========

    pub fn set_answer(&self, question_id: impl Into<QuestionId>, answer: impl Into<AnswerPayload>) {
        self.lock_state().set_answer(question_id.into(), answer.into());
    }

    pub fn toggle_flag(&self, question_id: impl Into<QuestionId>) -> bool {
        self.lock_state().toggle_flag(&question_id.into())
    }

    pub fn next(&self) -> bool {
        self.lock_state().advance(Direction::Next)
    }

    pub fn prev(&self) -> bool {
        self.lock_state().advance(Direction::Prev)
    }

    pub fn jump_to(&self, index: usize) -> bool {
        self.lock_state().jump_to(index)
    }

    pub fn answer_by_option(&self, n: usize) -> bool {
        self.lock_state().answer_by_option(n)
    }

    // ========== 计时与自动保存 ==========

    /// 对当前题做一次自动保存采样
    ///
    /// 同一节流窗口内只保存一次；离线时不发请求直接入队，保存失败同样入队。
    /// 队列中还有更早的保存时，本次排在它们后面按顺序刷新，同一题不会被旧值覆盖。
    pub async fn autosave(&self) -> AutosaveOutcome {
        if self.is_submitted() {
            return AutosaveOutcome::Closed;
        }
        let now = self.clock.now_ms();
        let payload = {
            let mut state = self.lock_state();
            let Some(payload) = state.current_payload() else {
                return AutosaveOutcome::NoQuestion;
            };
            if !self.throttle.should_save(now, state.state().last_saved_at) {
                return AutosaveOutcome::Throttled;
            }
            state.mark_saved(now, SyncStatus::Saved);
            payload
        };

        if !self.network.is_online() {
            debug!("[作答 {}] 离线，题目 {} 直接入队", self.attempt_id, payload.question_id);
            self.queue.enqueue(payload);
            self.lock_state().set_status(SyncStatus::OfflineQueued);
            return AutosaveOutcome::Queued;
        }

        if !self.queue.is_empty() {
            debug!("[作答 {}] 队列中还有 {} 条更早的保存，排队投递", self.attempt_id, self.queue.len());
            self.queue.enqueue(payload);
            let report = self.queue.flush().await;
            if report.remaining == 0 {
                return AutosaveOutcome::Saved;
            }
            if self.is_submitted() {
                return AutosaveOutcome::Closed;
            }
            self.lock_state().set_status(SyncStatus::OfflineQueued);
            return AutosaveOutcome::Queued;
        }

        let saved = self.api.save_answer(&self.attempt_id, &payload).await;
        // 请求期间会话可能已经提交，此时本地数据已删除，不能再写回
        if self.is_submitted() {
            return AutosaveOutcome::Closed;
        }

        match saved {
            Ok(()) => {
                debug!(
                    "[作答 {}] 💾 已保存题目 {}: {}",
                    self.attempt_id,
                    payload.question_id,
                    truncate_text(&payload.answer.as_ref().map(|a| a.preview()).unwrap_or_default(), 30)
                );
                AutosaveOutcome::Saved
            }
            Err(e) => {
                debug!("[作答 {}] 保存失败，入队: {}", self.attempt_id, e);
                self.queue.enqueue(payload);
                self.lock_state().set_status(SyncStatus::OfflineQueued);
                AutosaveOutcome::Queued
            }
        }
    }

    /// 一次计时步进：累计当前题用时、倒计时减一、自动保存采样，到期时自动提交
    pub async fn on_second(&self) -> TickOutcome {
        if self.is_submitted() {
            return TickOutcome::Finished;
        }

        self.lock_state().tick_current();
        let tick = lock(&self.countdown).tick();
        self.autosave().await;

        match tick {
            CountdownTick::Running(remaining_secs) => TickOutcome::Running { remaining_secs },
            CountdownTick::Finished => TickOutcome::Running { remaining_secs: 0 },
            CountdownTick::Expired => {
                info!("[作答 {}] ⏰ 时间到，自动提交", self.attempt_id);
                match self.submit_guarded(true).await {
                    Ok(result) => TickOutcome::AutoSubmitted(result),
                    Err(e) => TickOutcome::AutoSubmitFailed(e),
                }
            }
        }
    }

    /// 启动每秒计时任务，已在运行时不做任何事
    pub fn run_timers(self: &Arc<Self>) -> bool {
        let mut ticker = lock(&self.ticker);
        if ticker.is_some() || self.is_submitted() {
            return false;
        }

        let (cancel, mut cancel_rx) = watch::channel(false);
        let session = Arc::downgrade(self);
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = interval.tick() => {}
                }

                let Some(session) = session.upgrade() else {
                    break;
                };
                match session.on_second().await {
                    TickOutcome::AutoSubmitted(_) | TickOutcome::Finished => break,
                    TickOutcome::AutoSubmitFailed(_) if session.is_submitted() => break,
                    TickOutcome::AutoSubmitFailed(e) => {
                        warn!("[作答 {}] ⚠️ 自动提交失败，等待手动重试: {}", session.attempt_id, e);
                    }
                    TickOutcome::Running { .. } => {}
                }
            }
        });

        *ticker = Some(TimerTask { cancel, handle });
        info!("[作答 {}] ⏱ 计时器已启动 (间隔 {:?})", self.attempt_id, period);
        true
    }

    /// 提交成功后停止两个计时器
    ///
    /// 计时任务可能正在等待一次自动保存，需要等它退出后才能删除本地数据；
    /// 由计时任务自己发起的提交只发出取消信号，它会在本轮结束后退出。
    async fn stop_timers_after_submit(&self, from_ticker: bool) {
        let ticker = lock(&self.ticker).take();
        if let Some(TimerTask { cancel, handle }) = ticker {
            let _ = cancel.send(true);
            if !from_ticker {
                let _ = handle.await;
            }
        }
        self.queue.stop_retry_loop().await;
    }

    /// 停止两个计时器（每秒计时与队列重试）并等待它们退出
    pub async fn shutdown(&self) {
        let ticker = lock(&self.ticker).take();
        let stop_ticker = async move {
            if let Some(TimerTask { cancel, handle }) = ticker {
                let _ = cancel.send(true);
                let _ = handle.await;
            }
        };

        futures::join!(stop_ticker, self.queue.stop_retry_loop());
        info!("[作答 {}] ⏹ 会话计时器已全部停止", self.attempt_id);
    }

    // ========== 提交 ==========

    /// 提交作答
    ///
    /// 先强制刷新投递队列，再把全部题目的作答一次性提交。
    /// 提交进行中再次调用返回 `SubmitError::InFlight`，成功之后再次调用返回
    /// `SubmitError::AlreadySubmitted`。失败时不拆除任何状态，可以再次提交。
    pub async fn submit(&self) -> AppResult<SubmitResult> {
        self.submit_guarded(false).await
    }

    /// `from_ticker` 为 true 表示由计时任务自身发起（到期自动提交），此时不能等待计时任务退出
    async fn submit_guarded(&self, from_ticker: bool) -> AppResult<SubmitResult> {
        if self.is_submitted() {
            return Err(SubmitError::AlreadySubmitted.into());
        }
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("[作答 {}] 提交正在进行，忽略重复提交", self.attempt_id);
            return Err(SubmitError::InFlight.into());
        }

        let result = self.submit_inner(from_ticker).await;
        self.submitting.store(false, Ordering::SeqCst);
        result
    }

    async fn submit_inner(&self, from_ticker: bool) -> AppResult<SubmitResult> {
        if self.is_submitted() {
            return Err(SubmitError::AlreadySubmitted.into());
        }

        info!("[作答 {}] 📤 提交前同步队列 ({} 条待同步)", self.attempt_id, self.queue.len());
        let report = self.queue.flush().await;
        if report.attempted > 0 {
            log_flush_report(&self.attempt_id, &report);
        }

        let responses = self.lock_state().responses();
        let request = SubmitRequest {
            attempt_id: self.attempt_id.clone(),
            responses,
        };

        match self.api.submit_exam(&self.exam_id, &request).await {
            Ok(result) => {
                self.submitted.store(true, Ordering::SeqCst);
                self.stop_timers_after_submit(from_ticker).await;
                self.lock_state().discard();
                self.queue.clear().await;
                log_submit_result(&self.attempt_id, &result);
                Ok(result)
            }
            Err(e) => {
                error!("[作答 {}] ❌ 提交失败: {}", self.attempt_id, e);
                self.lock_state().set_status(SyncStatus::SubmitFailed);
                Err(SubmitError::Failed(e).into())
            }
        }
    }
}

impl Drop for AttemptSession {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.ticker).take() {
            let _ = task.cancel.send(true);
            task.handle.abort();
        }
    }
}
