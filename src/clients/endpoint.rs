//! 消息端点抽象
//!
//! 发送流程只依赖 [`MessagingEndpoint`] 和 [`EndpointError`] 的分类信号，
//! 生产环境用 `TelegramClient`，测试用 `MockEndpoint`

use crate::error::EndpointError;
use crate::models::OwnerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 发送目标：数字 ID 或 `@username`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl ChatTarget {
    /// 规范化用户输入：能解析为整数就用数字 ID，否则原样保留
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map(ChatTarget::Id)
            .unwrap_or_else(|_| ChatTarget::Username(raw.to_string()))
    }
}

impl From<OwnerId> for ChatTarget {
    fn from(id: OwnerId) -> Self {
        ChatTarget::Id(id)
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Username(name) => write!(f, "{}", name),
        }
    }
}

/// 一次测验投票请求
///
/// 解析字段按字面发送，不请求任何格式解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRequest {
    pub target: ChatTarget,
    pub question: String,
    /// 2–10 个非空选项
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: Option<String>,
    pub anonymous: bool,
}

impl QuizRequest {
    pub fn new(
        target: ChatTarget,
        question: String,
        options: Vec<String>,
        correct_index: usize,
        explanation: String,
    ) -> Self {
        Self {
            target,
            question,
            options,
            correct_index,
            explanation: Some(explanation).filter(|e| !e.is_empty()),
            anonymous: true,
        }
    }
}

/// 以附件形式发送的纯文本文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pub file_name: String,
    pub caption: String,
    pub content: String,
}

/// 外部消息端点
#[async_trait]
pub trait MessagingEndpoint: Send + Sync {
    /// 发送测验投票
    async fn send_quiz(&self, request: &QuizRequest) -> Result<(), EndpointError>;

    /// 发送文本附件
    async fn send_document(
        &self,
        target: &ChatTarget,
        document: &TextDocument,
    ) -> Result<(), EndpointError>;

    /// 发送普通文本消息
    async fn send_message(&self, target: &ChatTarget, text: &str) -> Result<(), EndpointError>;
}
