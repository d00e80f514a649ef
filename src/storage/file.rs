use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::DurableStore;
use crate::error::StorageError;

/// 文件存储
///
/// 每个键对应目录下的一个 JSON 文件，写入时先写临时文件再重命名，
/// 避免进程中途退出留下半个文件。
///
/// 读写使用同步的 `std::fs`，会在调用它的 tokio 工作线程上短暂阻塞。
/// 单个文件只有几 KB，单线程运行时下同样可用；
/// 如果存储目录位于慢速设备上，应在外壳中改用 `spawn_blocking` 包装的实现。
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// 创建文件存储，目录不存在时自动创建
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Write {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

/// 把键转换为合法的文件名
///
/// `[A-Za-z0-9_-]` 原样保留，其余字节（包括 `%` 本身）按 `%XX` 转义，
/// 因此不同的键一定对应不同的文件。
fn sanitize_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        fs::write(&tmp_path, value)
            .and_then(|_| fs::rename(&tmp_path, &path))
            .map_err(|source| StorageError::Write {
                key: key.to_string(),
                source,
            })?;

        debug!("已写入 {} ({} 字节)", path.display(), value.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("autosave_queue::a-1"), "autosave_queue%3A%3Aa-1");
        assert_eq!(sanitize_key("attempt_state::x/../y"), "attempt_state%3A%3Ax%2F%2E%2E%2Fy");
    }

    #[test]
    fn test_distinct_keys_never_share_a_file() {
        assert_ne!(sanitize_key("attempt_state::a:1"), sanitize_key("attempt_state::a_1"));
        assert_ne!(sanitize_key("a%3A"), sanitize_key("a:"));

        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        store.set("attempt_state::a:1", "colon").unwrap();
        store.set("attempt_state::a_1", "underscore").unwrap();

        assert_eq!(store.get("attempt_state::a:1").unwrap().as_deref(), Some("colon"));
        assert_eq!(store.get("attempt_state::a_1").unwrap().as_deref(), Some("underscore"));
    }

    #[test]
    fn test_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache")).unwrap();

        assert!(store.get("attempt_state::1").unwrap().is_none());
        store.set("attempt_state::1", r#"{"currentIndex":2}"#).unwrap();

        // 新实例指向同一目录，相当于进程重启后读取
        let reopened = FileStore::new(dir.path().join("cache")).unwrap();
        assert_eq!(
            reopened.get("attempt_state::1").unwrap().as_deref(),
            Some(r#"{"currentIndex":2}"#)
        );

        reopened.remove("attempt_state::1").unwrap();
        reopened.remove("attempt_state::1").unwrap();
        assert!(store.get("attempt_state::1").unwrap().is_none());
    }
}
