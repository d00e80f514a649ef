use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::answer::AnswerPayload;
use super::ids::{deserialize_attempt_id, QuestionId};

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// 单选
    Mcq,
    /// 多选
    Multi,
    /// 填空
    Fib,
    /// 其余题型按主观上传题处理
    #[default]
    #[serde(other)]
    Structured,
}

/// 选项：纯字符串，或带 `label` 的对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Choice {
    Plain(String),
    Detailed {
        #[serde(default)]
        label: Option<String>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub statement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
    /// 其他未使用的字段原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Question {
    pub fn new(id: impl Into<QuestionId>, question_type: QuestionType, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question_type,
            statement: statement.into(),
            choices: None,
            extra: Map::new(),
        }
    }

    /// 选项字母列表，未提供选项时默认 A-D
    pub fn choice_letters(&self) -> Vec<String> {
        match &self.choices {
            None => ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect(),
            Some(choices) => choices
                .iter()
                .enumerate()
                .map(|(i, choice)| match choice {
                    Choice::Plain(s) => s.clone(),
                    Choice::Detailed { label: Some(label), .. } => label.clone(),
                    Choice::Detailed { label: None, .. } => option_letter(i + 1).unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// 第 n 个选项（从 1 开始）对应的字母
pub fn option_letter(n: usize) -> Option<String> {
    if (1..=26).contains(&n) {
        Some(char::from(b'A' + (n as u8 - 1)).to_string())
    } else {
        None
    }
}

/// 开始作答接口的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedAttempt {
    #[serde(deserialize_with = "deserialize_attempt_id")]
    pub attempt_id: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// 服务端保存的续答快照
///
/// 每个字段都可能缺失，缺失表示服务端没有该部分数据。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeSnapshot {
    pub answers: Option<BTreeMap<QuestionId, AnswerPayload>>,
    pub times: Option<BTreeMap<QuestionId, u64>>,
    pub flagged: Option<BTreeMap<QuestionId, bool>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_started_attempt() {
        let body = r#"{
            "attempt_id": 42,
            "expires_at": "2026-10-18T10:00:00Z",
            "questions": [
                {"id": 1, "type": "mcq", "statement": "2+2?", "choices": ["A", {"label": "B", "text": "four"}, {"text": "five"}]},
                {"id": 2, "type": "essay", "statement": "Explain", "marks": 5}
            ]
        }"#;
        let started: StartedAttempt = serde_json::from_str(body).unwrap();
        assert_eq!(started.attempt_id, "42");
        assert_eq!(started.questions.len(), 2);
        assert_eq!(started.questions[0].choice_letters(), vec!["A", "B", "C"]);
        assert_eq!(started.questions[1].question_type, QuestionType::Structured);
        assert_eq!(started.questions[1].extra.get("marks"), Some(&Value::from(5)));
    }

    #[test]
    fn test_default_choice_letters() {
        let q = Question::new(1, QuestionType::Multi, "pick");
        assert_eq!(q.choice_letters(), vec!["A", "B", "C", "D"]);
        assert_eq!(option_letter(3).as_deref(), Some("C"));
        assert_eq!(option_letter(0), None);
    }

    #[test]
    fn test_resume_snapshot_missing_fields() {
        let snapshot: ResumeSnapshot = serde_json::from_str(r#"{"answers": {"7": "A"}}"#).unwrap();
        assert_eq!(
            snapshot.answers.unwrap().get(&QuestionId::Num(7)),
            Some(&AnswerPayload::text("A"))
        );
        assert!(snapshot.times.is_none());
        assert!(snapshot.flagged.is_none());
    }
}
