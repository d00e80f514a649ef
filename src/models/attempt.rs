use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::answer::AnswerPayload;
use super::ids::QuestionId;

/// 单次作答的本地状态
///
/// 每次变更都会整体写入本地持久化存储（键见 `storage::attempt_state_key`）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptState {
    /// 当前题目下标（从 0 开始）
    pub current_index: usize,
    /// 已作答内容，缺失表示未作答
    pub answers: BTreeMap<QuestionId, AnswerPayload>,
    /// "稍后检查"标记
    pub flagged: BTreeMap<QuestionId, bool>,
    /// 每题累计用时（秒）
    pub times: BTreeMap<QuestionId, u64>,
    /// 上一次自动保存的时间（毫秒时间戳）
    pub last_saved_at: Option<i64>,
    /// 最近一次同步状态文本
    pub saved_message: String,
}

impl AttemptState {
    pub fn is_flagged(&self, question_id: &QuestionId) -> bool {
        self.flagged.get(question_id).copied().unwrap_or(false)
    }

    pub fn time_spent(&self, question_id: &QuestionId) -> u64 {
        self.times.get(question_id).copied().unwrap_or(0)
    }

    pub fn is_answered(&self, question_id: &QuestionId) -> bool {
        self.answers.get(question_id).is_some_and(|a| !a.is_blank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_layout() {
        let mut state = AttemptState::default();
        state.answers.insert(QuestionId::Num(3), AnswerPayload::text("B"));
        state.last_saved_at = Some(1_700_000_000_000);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["currentIndex"], 0);
        assert_eq!(json["answers"]["3"], "B");
        assert_eq!(json["lastSavedAt"], 1_700_000_000_000i64);

        let back: AttemptState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_missing_fields_default() {
        let state: AttemptState = serde_json::from_str(r#"{"answers": {"1": ["A"]}}"#).unwrap();
        assert!(state.is_answered(&QuestionId::Num(1)));
        assert_eq!(state.current_index, 0);
        assert!(state.last_saved_at.is_none());
    }
}
