use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 题目标识
///
/// 后端的题目 ID 通常是整数，但 JSON 对象的键永远是字符串，
/// 因此 `"101"` 与 `101` 表示同一道题：反序列化时数字字符串统一归一为 `Num`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestionId {
    Num(i64),
    Text(String),
}

impl QuestionId {
    fn from_text(value: &str) -> Self {
        match value.trim().parse::<i64>() {
            Ok(n) => QuestionId::Num(n),
            Err(_) => QuestionId::Text(value.to_string()),
        }
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Num(n) => write!(f, "{}", n),
            QuestionId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for QuestionId {
    fn from(value: i64) -> Self {
        QuestionId::Num(value)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        QuestionId::from_text(value)
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        QuestionId::from_text(&value)
    }
}

impl Serialize for QuestionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            QuestionId::Num(n) => serializer.serialize_i64(*n),
            QuestionId::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for QuestionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct QuestionIdVisitor;

        impl<'de> Visitor<'de> for QuestionIdVisitor {
            type Value = QuestionId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or integer question id")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(QuestionId::Num(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(i64::try_from(value)
                    .map(QuestionId::Num)
                    .unwrap_or_else(|_| QuestionId::Text(value.to_string())))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(QuestionId::from_text(value))
            }
        }

        deserializer.deserialize_any(QuestionIdVisitor)
    }
}

/// 接受字符串或整数形式的作答 ID，统一转为字符串
pub(crate) fn deserialize_attempt_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct AttemptIdVisitor;

    impl<'de> Visitor<'de> for AttemptIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer attempt id")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(AttemptIdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_numeric_string_key_matches_number() {
        let map: BTreeMap<QuestionId, bool> = serde_json::from_str(r#"{"101": true, "q-7": false}"#).unwrap();
        assert_eq!(map.get(&QuestionId::Num(101)), Some(&true));
        assert_eq!(map.get(&QuestionId::from("q-7")), Some(&false));
    }

    #[test]
    fn test_serialize_keeps_number() {
        assert_eq!(serde_json::to_string(&QuestionId::Num(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&QuestionId::from("abc")).unwrap(), "\"abc\"");

        let mut map = BTreeMap::new();
        map.insert(QuestionId::Num(5), 3u64);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"5":3}"#);
    }
}
