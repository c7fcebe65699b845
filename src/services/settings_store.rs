//! 设置存储服务
//!
//! 保存每个提交者的目标频道和前缀/后缀格式。
//! 读写失败只记录日志，不影响调用方。

use crate::clients::ChatTarget;
use crate::error::SettingsError;
use crate::models::OwnerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 提交者的格式设置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerFormat {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl OwnerFormat {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// 在题干前加上前缀
    pub fn format_question(&self, question: &str) -> String {
        if self.prefix.is_empty() {
            question.to_string()
        } else {
            format!("{}\n\n{}", self.prefix, question)
        }
    }

    /// 在解析后加上后缀；解析为空时只保留后缀
    pub fn format_explanation(&self, explanation: &str) -> String {
        match (explanation.is_empty(), self.suffix.is_empty()) {
            (_, true) => explanation.to_string(),
            (true, false) => self.suffix.clone(),
            (false, false) => format!("{}\n\n{}", explanation, self.suffix),
        }
    }
}

/// 持久化文档结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    user_channels: BTreeMap<OwnerId, ChatTarget>,
    #[serde(default)]
    user_format: BTreeMap<OwnerId, OwnerFormat>,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    document: RwLock<SettingsDocument>,
    /// 串行化写文件
    save_lock: tokio::sync::Mutex<()>,
}

impl SettingsStore {
    /// 不落盘的存储
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: RwLock::new(SettingsDocument::default()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 从 JSON 文件加载设置
    ///
    /// 文件不存在或内容损坏时从空设置开始
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = match Self::read_document(&path).await {
            Ok(Some(document)) => {
                info!(
                    "📂 已加载设置: {} 个频道, {} 个格式",
                    document.user_channels.len(),
                    document.user_format.len()
                );
                document
            }
            Ok(None) => {
                debug!("设置文件不存在，使用空设置: {}", path.display());
                SettingsDocument::default()
            }
            Err(e) => {
                warn!("⚠️  {}，使用空设置", e);
                SettingsDocument::default()
            }
        };

        Self {
            path: Some(path),
            document: RwLock::new(document),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_document(path: &Path) -> Result<Option<SettingsDocument>, SettingsError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SettingsError::ReadFailed {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SettingsError::ParseFailed {
                path: path.display().to_string(),
                source: e,
            })
    }

    /// 把当前设置写回文件
    pub async fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;
        let content = {
            let document = self.document.read();
            serde_json::to_string_pretty(&*document).map_err(|e| SettingsError::ParseFailed {
                path: path.display().to_string(),
                source: e,
            })?
        };
        tokio::fs::write(path, content)
            .await
            .map_err(|e| SettingsError::WriteFailed {
                path: path.display().to_string(),
                source: e,
            })
    }

    async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            warn!("⚠️  {}", e);
        }
    }

    pub async fn set_target(&self, owner: OwnerId, target: ChatTarget) {
        info!("📌 用户 {} 设置目标频道: {}", owner, target);
        self.document.write().user_channels.insert(owner, target);
        self.save_logged().await;
    }

    pub async fn set_format(&self, owner: OwnerId, format: OwnerFormat) {
        info!("📝 用户 {} 更新格式设置", owner);
        self.document.write().user_format.insert(owner, format);
        self.save_logged().await;
    }

    pub fn target(&self, owner: OwnerId) -> Option<ChatTarget> {
        self.document.read().user_channels.get(&owner).cloned()
    }

    /// 未设置时返回空前缀/后缀
    pub fn format(&self, owner: OwnerId) -> OwnerFormat {
        self.document
            .read()
            .user_format
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }
}
