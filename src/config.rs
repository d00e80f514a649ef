use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 后端 API 根地址（不带末尾斜杠）
    pub base_api_url: String,
    /// 访问令牌，存在时以 `Authorization: Bearer` 发送
    pub access_token: Option<String>,
    /// 本地持久化目录（FileStore 使用）
    pub storage_dir: String,
    /// 计时器间隔（毫秒），每个间隔累计一次答题时间并采样自动保存
    pub tick_interval_ms: u64,
    /// 自动保存节流窗口（秒）
    pub autosave_window_secs: u64,
    /// 重试队列刷新周期（秒）
    pub retry_interval_secs: u64,
    /// 单个 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 非网络类拒绝（4xx）的最大重试次数，0 表示不限
    pub max_rejected_attempts: u32,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_api_url: "http://127.0.0.1:8000/api".to_string(),
            access_token: None,
            storage_dir: ".attempt_cache".to_string(),
            tick_interval_ms: 1000,
            autosave_window_secs: 10,
            retry_interval_secs: 5,
            request_timeout_secs: 15,
            max_rejected_attempts: 5,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_api_url: std::env::var("BASE_API_URL").unwrap_or(default.base_api_url),
            access_token: std::env::var("ACCESS_TOKEN").ok().filter(|v| !v.is_empty()).or(default.access_token),
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or(default.storage_dir),
            tick_interval_ms: std::env::var("TICK_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.tick_interval_ms),
            autosave_window_secs: std::env::var("AUTOSAVE_WINDOW_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.autosave_window_secs),
            retry_interval_secs: std::env::var("RETRY_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_interval_secs),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            max_rejected_attempts: std::env::var("MAX_REJECTED_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_rejected_attempts),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
        .normalized()
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    ///
    /// # 参数
    /// - `path`: 配置文件路径
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|err| match err {
            ConfigError::TomlParse { source, .. } => ConfigError::TomlParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// 从 TOML 文本解析配置
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::TomlParse {
            path: String::new(),
            source,
        })?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_api_url.trim().is_empty() {
            return Err(ConfigError::invalid("base_api_url", "不能为空"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::invalid("tick_interval_ms", "必须大于 0"));
        }
        if self.autosave_window_secs == 0 {
            return Err(ConfigError::invalid("autosave_window_secs", "必须大于 0"));
        }
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::invalid("retry_interval_secs", "必须大于 0"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn autosave_window_ms(&self) -> i64 {
        i64::try_from(self.autosave_window_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    fn normalized(mut self) -> Self {
        while self.base_api_url.ends_with('/') {
            self.base_api_url.pop();
        }
        self
    }
}
