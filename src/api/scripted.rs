//! 脚本化后端
//!
//! 按预先设定的结果逐次应答，并记录收到的请求。
//! 用于单元测试、集成测试以及没有后端时的离线演示。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use super::ExamApi;
use crate::error::ApiError;
use crate::models::{
    Question, QuestionType, ResumeSnapshot, SavePayload, StartedAttempt, SubmitRequest, SubmitResult,
};

/// 单次调用的预设结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 成功
    Ok,
    /// 网络错误（连接被拒绝）
    NetworkError,
    /// 后端返回指定的非成功状态码
    Status(u16),
}

impl Outcome {
    fn into_result(self, endpoint: &str) -> Result<(), ApiError> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::NetworkError => Err(ApiError::RequestFailed {
                endpoint: endpoint.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted network error",
                )),
            }),
            Outcome::Status(status) => Err(ApiError::Rejected {
                endpoint: endpoint.to_string(),
                status,
            }),
        }
    }
}

#[derive(Debug)]
struct ScriptState {
    attempt: StartedAttempt,
    start_outcome: Outcome,
    resume: Option<ResumeSnapshot>,
    save_script: VecDeque<Outcome>,
    default_save: Outcome,
    save_latency: Option<Duration>,
    save_calls: usize,
    saved: Vec<SavePayload>,
    submit_script: VecDeque<Outcome>,
    submit_result: SubmitResult,
    submissions: Vec<SubmitRequest>,
}

/// 脚本化后端
#[derive(Debug)]
pub struct ScriptedApi {
    state: Mutex<ScriptState>,
}

impl ScriptedApi {
    /// 默认包含三道题、一小时后截止的作答
    pub fn new() -> Self {
        let attempt = StartedAttempt {
            attempt_id: "attempt-1".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            questions: vec![
                Question::new(101, QuestionType::Mcq, "Question 1"),
                Question::new(102, QuestionType::Multi, "Question 2"),
                Question::new(103, QuestionType::Fib, "Question 3"),
            ],
        };
        Self::with_attempt(attempt)
    }

    pub fn with_attempt(attempt: StartedAttempt) -> Self {
        Self {
            state: Mutex::new(ScriptState {
                attempt,
                start_outcome: Outcome::Ok,
                resume: None,
                save_script: VecDeque::new(),
                default_save: Outcome::Ok,
                save_latency: None,
                save_calls: 0,
                saved: Vec::new(),
                submit_script: VecDeque::new(),
                submit_result: SubmitResult {
                    total_score: Some(0.0),
                    per_question: Vec::new(),
                    percentile: None,
                },
                submissions: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_start_outcome(&self, outcome: Outcome) {
        self.lock().start_outcome = outcome;
    }

    /// 设置续答快照，未设置时续答接口返回 404
    pub fn set_resume(&self, snapshot: ResumeSnapshot) {
        self.lock().resume = Some(snapshot);
    }

    /// 追加接下来若干次保存调用的结果，用完后使用默认结果
    pub fn push_save_outcomes(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.lock().save_script.extend(outcomes);
    }

    pub fn set_default_save(&self, outcome: Outcome) {
        self.lock().default_save = outcome;
    }

    /// 每次保存调用前等待的时间
    pub fn set_save_latency(&self, latency: Duration) {
        self.lock().save_latency = Some(latency);
    }

    pub fn push_submit_outcomes(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.lock().submit_script.extend(outcomes);
    }

    pub fn set_submit_result(&self, result: SubmitResult) {
        self.lock().submit_result = result;
    }

    /// 保存接口被调用的次数（含失败）
    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }

    /// 成功保存的请求体
    pub fn saved(&self) -> Vec<SavePayload> {
        self.lock().saved.clone()
    }

    /// 收到的提交请求（含失败）
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.lock().submissions.clone()
    }
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExamApi for ScriptedApi {
    async fn start_exam(&self, exam_id: &str) -> Result<StartedAttempt, ApiError> {
        let state = self.lock();
        state.start_outcome.into_result(&format!("exams/{}/start/", exam_id))?;
        Ok(state.attempt.clone())
    }

    async fn fetch_resume(&self, attempt_id: &str) -> Result<ResumeSnapshot, ApiError> {
        let endpoint = format!("attempts/{}/resume/", attempt_id);
        self.lock().resume.clone().ok_or(ApiError::Rejected { endpoint, status: 404 })
    }

    async fn save_answer(&self, attempt_id: &str, payload: &SavePayload) -> Result<(), ApiError> {
        let (outcome, latency) = {
            let mut state = self.lock();
            state.save_calls += 1;
            let outcome = state.save_script.pop_front().unwrap_or(state.default_save);
            (outcome, state.save_latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        outcome.into_result(&format!("attempts/{}/save/", attempt_id))?;
        self.lock().saved.push(payload.clone());
        Ok(())
    }

    async fn submit_exam(&self, exam_id: &str, request: &SubmitRequest) -> Result<SubmitResult, ApiError> {
        let mut state = self.lock();
        state.submissions.push(request.clone());
        let outcome = state.submit_script.pop_front().unwrap_or(Outcome::Ok);
        outcome.into_result(&format!("exams/{}/submit/", exam_id))?;
        Ok(state.submit_result.clone())
    }
}
