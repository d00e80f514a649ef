//! 本地持久化 - 基础设施层
//!
//! 只暴露"按键读写字符串"的能力，不认识作答状态或队列。
//! 上层通过 `read_json` / `write_json` 完成 JSON 序列化。

pub mod file;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// 持久化键值存储
///
/// 所有操作都返回显式的 `Result`，由调用方决定降级策略。
pub trait DurableStore: Send + Sync {
    /// 读取键对应的值，不存在时返回 `None`
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 写入（覆盖）键对应的值
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// 删除键，不存在时视为成功
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// 作答状态的存储键
pub fn attempt_state_key(attempt_id: &str) -> String {
    format!("attempt_state::{}", attempt_id)
}

/// 自动保存队列的存储键
pub fn autosave_queue_key(attempt_id: &str) -> String {
    format!("autosave_queue::{}", attempt_id)
}

/// 读取并反序列化 JSON 值
pub fn read_json<T: DeserializeOwned>(
    store: &dyn DurableStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Serialize {
                key: key.to_string(),
                source,
            }),
    }
}

/// 序列化为 JSON 并写入
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn DurableStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}
