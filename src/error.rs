use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 消息端点错误
    #[error("端点错误: {0}")]
    Endpoint(#[from] EndpointError),
    /// 设置持久化错误
    #[error("设置错误: {0}")]
    Settings(#[from] SettingsError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 消息端点返回的错误信号
///
/// 发送流程只依赖这些分类，而不关心底层协议
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// 请求频率限制，需等待 `retry_after` 秒
    #[error("请求频率限制，建议等待 {retry_after} 秒")]
    RateLimited { retry_after: u64 },
    /// 内容被拒绝（过长或格式无法解析）
    #[error("内容被拒绝: {0}")]
    ContentRejected(String),
    /// 无权访问目标
    #[error("无权访问目标: {0}")]
    Forbidden(String),
    /// 其他非法请求
    #[error("非法请求: {0}")]
    BadRequest(String),
    /// 端点返回的其他错误响应
    #[error("API返回错误响应 (code={code}): {description}")]
    Api { code: u16, description: String },
    /// 网络或解析层面的失败
    #[error("请求失败: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        EndpointError::Transport(err.to_string())
    }
}

/// 设置持久化错误
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("读取设置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入设置文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("设置文件格式错误 ({path}): {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    #[error("配置项 {field} 的值 '{value}' 无效")]
    InvalidValue { field: String, value: String },
    #[error("读取配置文件失败 ({path}): {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
