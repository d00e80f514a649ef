use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单题作答内容
///
/// - 单选 / 填空：字符串
/// - 多选：字母数组
/// - 主观题上传：结构化标记，如 `{"file": "..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    Text(String),
    Choices(Vec<String>),
    Structured(Map<String, Value>),
}

impl AnswerPayload {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerPayload::Text(value.into())
    }

    /// 上传占位标记
    pub fn upload(file: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("file".to_string(), Value::String(file.into()));
        AnswerPayload::Structured(map)
    }

    /// 空字符串不算已作答
    pub fn is_blank(&self) -> bool {
        matches!(self, AnswerPayload::Text(s) if s.is_empty())
    }

    /// 日志用的简短预览
    pub fn preview(&self) -> String {
        match self {
            AnswerPayload::Text(s) => s.clone(),
            AnswerPayload::Choices(items) => items.join(","),
            AnswerPayload::Structured(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

impl From<&str> for AnswerPayload {
    fn from(value: &str) -> Self {
        AnswerPayload::Text(value.to_string())
    }
}

impl From<Vec<String>> for AnswerPayload {
    fn from(value: Vec<String>) -> Self {
        AnswerPayload::Choices(value)
    }
}
