//! 程序配置
//!
//! 默认值 → 可选 TOML 文件 → 环境变量，后者覆盖前者

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- Bot API 配置 ---
    pub bot_token: String,
    pub api_base_url: String,
    /// 长轮询超时（秒）
    pub long_poll_timeout_secs: u64,
    /// 频道/格式设置的持久化文件
    pub data_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 发送节奏 ---
    /// 两次成功发送之间的最小间隔（秒）
    pub poll_delay_secs: u64,
    /// 每批发送的投票数量
    pub polls_per_batch: usize,
    /// 批次之间的休息时间（秒）
    pub batch_break_secs: u64,
    /// 限流时的最大尝试次数
    pub retry_attempts: usize,
    // --- 降级截断上限（字符数） ---
    pub question_limit: usize,
    pub option_limit: usize,
    pub explanation_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base_url: "https://api.telegram.org".to_string(),
            long_poll_timeout_secs: 30,
            data_file: "poll_bot_user_data.json".to_string(),
            verbose_logging: false,
            poll_delay_secs: 3,
            polls_per_batch: 20,
            batch_break_secs: 5,
            retry_attempts: 3,
            question_limit: 1000,
            option_limit: 300,
            explanation_limit: 2000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 依次读取 TOML 文件（`POLL_BOT_CONFIG`，默认 `poll_bot.toml`）和环境变量
    ///
    /// 配置文件不存在时直接使用默认值
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("POLL_BOT_CONFIG").unwrap_or_else(|_| "poll_bot.toml".to_string());
        if Path::new(&path).exists() {
            Ok(Self::from_toml_file(&path)?.with_env_overrides())
        } else {
            Ok(Self::from_env())
        }
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::TomlParse { source, .. } => ConfigError::TomlParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse {
            path: String::new(),
            source: e,
        })
    }

    fn with_env_overrides(self) -> Self {
        Self {
            bot_token: std::env::var("BOT_TOKEN").unwrap_or(self.bot_token),
            api_base_url: std::env::var("API_BASE_URL").unwrap_or(self.api_base_url),
            long_poll_timeout_secs: env_parse("LONG_POLL_TIMEOUT_SECS").unwrap_or(self.long_poll_timeout_secs),
            data_file: std::env::var("DATA_FILE").unwrap_or(self.data_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
            poll_delay_secs: env_parse("POLL_DELAY_SECS").unwrap_or(self.poll_delay_secs),
            polls_per_batch: env_parse("POLLS_PER_BATCH").unwrap_or(self.polls_per_batch),
            batch_break_secs: env_parse("BATCH_BREAK_SECS").unwrap_or(self.batch_break_secs),
            retry_attempts: env_parse("RETRY_ATTEMPTS").unwrap_or(self.retry_attempts),
            question_limit: env_parse("QUESTION_LIMIT").unwrap_or(self.question_limit),
            option_limit: env_parse("OPTION_LIMIT").unwrap_or(self.option_limit),
            explanation_limit: env_parse("EXPLANATION_LIMIT").unwrap_or(self.explanation_limit),
        }
    }

    /// 校验启动 Bot 所必需的配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "BOT_TOKEN".to_string(),
            });
        }
        if self.polls_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polls_per_batch".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }

    pub fn batch_break(&self) -> Duration {
        Duration::from_secs(self.batch_break_secs)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}
