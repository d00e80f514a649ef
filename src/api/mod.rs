//! API 模块
//!
//! 负责所有与考试后端的交互。上层只依赖 `ExamApi` 能力，
//! 生产环境使用 `HttpExamApi`，测试与离线演示使用 `ScriptedApi`。

pub mod http;
pub mod scripted;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::models::{ResumeSnapshot, SavePayload, StartedAttempt, SubmitRequest, SubmitResult};

pub use http::HttpExamApi;
pub use scripted::{Outcome, ScriptedApi};

/// 考试后端能力
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// 开始作答：返回作答 ID、截止时间和题目列表
    async fn start_exam(&self, exam_id: &str) -> Result<StartedAttempt, ApiError>;

    /// 获取服务端保存的续答快照
    async fn fetch_resume(&self, attempt_id: &str) -> Result<ResumeSnapshot, ApiError>;

    /// 保存单题作答，只关心成功与否
    async fn save_answer(&self, attempt_id: &str, payload: &SavePayload) -> Result<(), ApiError>;

    /// 最终提交
    async fn submit_exam(&self, exam_id: &str, request: &SubmitRequest) -> Result<SubmitResult, ApiError>;
}
