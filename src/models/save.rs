use serde::{Deserialize, Serialize};

use super::answer::AnswerPayload;
use super::ids::QuestionId;

/// 单题保存请求体（同时也是最终提交中每题的格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavePayload {
    pub question_id: QuestionId,
    pub answer: Option<AnswerPayload>,
    pub time_spent: u64,
    pub flagged: bool,
}

/// 自动保存队列中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub payload: SavePayload,
    /// 入队时间（毫秒时间戳）
    pub enqueued_at: i64,
    /// 被后端明确拒绝的次数
    #[serde(default)]
    pub attempts: u32,
}

impl QueueItem {
    pub fn new(payload: SavePayload, enqueued_at: i64) -> Self {
        Self {
            payload,
            enqueued_at,
            attempts: 0,
        }
    }
}

/// 最终提交请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub attempt_id: String,
    pub responses: Vec<SavePayload>,
}

/// 单题判分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

/// 归一化后的提交结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSubmitResponse")]
pub struct SubmitResult {
    pub total_score: Option<f64>,
    pub per_question: Vec<QuestionResult>,
    pub percentile: Option<f64>,
}

/// 提交接口的原始返回：总分可能叫 `score` 也可能叫 `total_score`
#[derive(Debug, Deserialize)]
struct RawSubmitResponse {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    total_score: Option<f64>,
    #[serde(default)]
    per_question: Option<Vec<QuestionResult>>,
    #[serde(default)]
    percentile: Option<f64>,
}

impl From<RawSubmitResponse> for SubmitResult {
    fn from(raw: RawSubmitResponse) -> Self {
        Self {
            total_score: raw.score.or(raw.total_score),
            per_question: raw.per_question.unwrap_or_default(),
            percentile: raw.percentile,
        }
    }
}
