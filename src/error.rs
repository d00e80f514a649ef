use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 后端 API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 本地持久化错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 最终提交错误
    #[error("提交错误: {0}")]
    Submit(#[from] SubmitError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 无法建立连接，视为离线
    #[error("网络不可用（离线）")]
    Offline,
    /// 网络请求失败（连接、超时等）
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 后端返回非成功状态码
    #[error("API返回错误状态 ({endpoint}): HTTP {status}")]
    Rejected { endpoint: String, status: u16 },
    /// 响应体无法解析
    #[error("API响应解析失败 ({endpoint}): {message}")]
    Decode { endpoint: String, message: String },
}

impl ApiError {
    /// 是否属于可恢复的瞬时失败
    ///
    /// 离线、网络错误、408/429 以及 5xx 视为瞬时失败；其余 4xx 与解析失败视为后端拒绝。
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Offline | ApiError::RequestFailed { .. } => true,
            ApiError::Rejected { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            ApiError::Decode { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 本地持久化错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读取失败
    #[error("读取失败 ({key}): {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入失败
    #[error("写入失败 ({key}): {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// 删除失败
    #[error("删除失败 ({key}): {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化/反序列化失败
    #[error("JSON处理失败 ({key}): {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// 超出存储配额
    #[error("超出存储配额 ({key}): 上限 {limit} 字节")]
    QuotaExceeded { key: String, limit: usize },
    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

/// 最终提交错误
#[derive(Debug, Error)]
pub enum SubmitError {
    /// 已有提交正在进行
    #[error("已有提交正在进行")]
    InFlight,
    /// 本次作答已提交
    #[error("本次作答已提交")]
    AlreadySubmitted,
    /// 提交请求失败，可重试
    #[error("提交失败: {0}")]
    Failed(#[source] ApiError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 字段取值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 是否是可以再次尝试的提交失败
    pub fn is_retryable_submit(&self) -> bool {
        matches!(self, AppError::Submit(SubmitError::Failed(_)))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
