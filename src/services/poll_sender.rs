//! 单条投票发送服务 - 业务能力层
//!
//! 只负责把一条记录送达目标，不关心批次和队列。
//!
//! 处理顺序：
//! 1. 套用提交者的前缀/后缀，压缩空选项
//! 2. 等待距上次成功发送满 `poll_delay`
//! 3. 限流时按服务端给出的秒数 +1 等待重试
//! 4. 内容被拒绝时先发原文附件，再截断重发一次

use crate::clients::{ChatTarget, MessagingEndpoint, QuizRequest, TextDocument};
use crate::config::Config;
use crate::error::EndpointError;
use crate::models::{option_label, PollRecord};
use crate::services::OwnerFormat;
use crate::utils::logging::truncate_text;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

pub const ARCHIVE_FILE_NAME: &str = "original_poll.txt";
pub const ARCHIVE_CAPTION: &str = "Full original poll content (raw).";
/// 题干和解析的截断标记
pub const LONG_TRUNCATION_MARKER: &str = "\n\n[...truncated...]";
/// 选项的截断标记
pub const OPTION_TRUNCATION_MARKER: &str = "...";

/// 单条记录的发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// 原文已作为附件发送，投票以截断形式送达
    DeliveredTruncated,
    Failed(SendFailure),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, SendOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendFailure {
    #[error("有效选项不足两个")]
    NotEnoughOptions,
    #[error("限流重试次数已用完")]
    ThrottleExhausted,
    #[error("截断后重发仍失败: {0}")]
    TruncatedRejected(EndpointError),
    #[error("无权访问目标: {0}")]
    AccessDenied(String),
    #[error("发送失败: {0}")]
    Permanent(EndpointError),
}

pub struct PollSender {
    endpoint: Arc<dyn MessagingEndpoint>,
    config: Config,
    /// 上次成功发送投票的时刻
    last_sent: Mutex<Option<Instant>>,
}

impl PollSender {
    pub fn new(endpoint: Arc<dyn MessagingEndpoint>, config: Config) -> Self {
        Self {
            endpoint,
            config,
            last_sent: Mutex::new(None),
        }
    }

    /// 发送一条记录
    ///
    /// # 参数
    /// - `record`: 解析得到的原始记录，不会被修改
    /// - `format`: 提交者的前缀/后缀设置
    /// - `target`: 目标频道
    ///
    /// # 返回
    /// 返回发送结果，从不返回错误
    pub async fn send(
        &self,
        record: &PollRecord,
        format: &OwnerFormat,
        target: &ChatTarget,
    ) -> SendOutcome {
        let Some(compacted) = record.compact_options() else {
            warn!("⚠️  跳过选项不足的题目: {}", truncate_text(&record.question, 40));
            return SendOutcome::Failed(SendFailure::NotEnoughOptions);
        };

        let question = format.format_question(&record.question);
        let explanation = format.format_explanation(&record.explanation);
        let request = QuizRequest::new(
            target.clone(),
            question.clone(),
            compacted.options,
            compacted.correct_index,
            explanation.clone(),
        );

        match self.deliver(&request).await {
            Ok(()) => SendOutcome::Delivered,
            Err(EndpointError::ContentRejected(reason)) => {
                warn!("⚠️  内容被拒绝 ({})，发送原文附件并截断重发", reason);
                self.degrade(record, &question, &explanation, &request).await
            }
            Err(EndpointError::Forbidden(reason)) => {
                warn!("🚫 无权向 {} 发送: {}", target, reason);
                SendOutcome::Failed(SendFailure::AccessDenied(reason))
            }
            Err(EndpointError::RateLimited { .. }) => {
                warn!("⚠️  限流重试 {} 次后仍失败", self.config.retry_attempts);
                SendOutcome::Failed(SendFailure::ThrottleExhausted)
            }
            Err(e) => {
                warn!("❌ 发送失败: {}", e);
                SendOutcome::Failed(SendFailure::Permanent(e))
            }
        }
    }

    /// 带发送间隔和限流重试的投票发送
    async fn deliver(&self, request: &QuizRequest) -> Result<(), EndpointError> {
        let max_attempts = self.config.retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.wait_for_slot().await;

            match self.endpoint.send_quiz(request).await {
                Ok(()) => {
                    *self.last_sent.lock() = Some(Instant::now());
                    debug!("✓ 投票已发送: {}", truncate_text(&request.question, 40));
                    return Ok(());
                }
                Err(EndpointError::RateLimited { retry_after }) if attempt < max_attempts => {
                    warn!(
                        "⏳ 被限流，{} 秒后重试 (第 {}/{} 次)",
                        retry_after + 1,
                        attempt,
                        max_attempts
                    );
                    sleep(Duration::from_secs(retry_after + 1)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn wait_for_slot(&self) {
        let last = *self.last_sent.lock();
        if let Some(last) = last {
            sleep_until(last + self.config.poll_delay()).await;
        }
    }

    /// 内容被拒绝后的降级：原文附件 + 截断重发
    async fn degrade(
        &self,
        record: &PollRecord,
        question: &str,
        explanation: &str,
        request: &QuizRequest,
    ) -> SendOutcome {
        let archive = TextDocument {
            file_name: ARCHIVE_FILE_NAME.to_string(),
            caption: ARCHIVE_CAPTION.to_string(),
            content: render_archive(question, &record.options, explanation),
        };
        if let Err(e) = self.endpoint.send_document(&request.target, &archive).await {
            warn!("⚠️  原文附件发送失败: {}", e);
        }

        let options: Vec<String> = request
            .options
            .iter()
            .map(|o| truncate_with_marker(o, self.config.option_limit, OPTION_TRUNCATION_MARKER))
            .collect();
        let correct_index = if request.correct_index < options.len() {
            request.correct_index
        } else {
            0
        };
        let truncated = QuizRequest {
            question: truncate_with_marker(
                &request.question,
                self.config.question_limit,
                LONG_TRUNCATION_MARKER,
            ),
            options,
            correct_index,
            explanation: request.explanation.as_deref().map(|e| {
                truncate_with_marker(e, self.config.explanation_limit, LONG_TRUNCATION_MARKER)
            }),
            ..request.clone()
        };

        match self.deliver(&truncated).await {
            Ok(()) => {
                info!("✓ 截断版本发送成功");
                SendOutcome::DeliveredTruncated
            }
            Err(e) => {
                warn!("❌ 截断版本仍发送失败: {}", e);
                SendOutcome::Failed(SendFailure::TruncatedRejected(e))
            }
        }
    }
}

/// 生成原文附件内容
///
/// 包含全部原始选项（含空白选项）及其字母标号
pub fn render_archive(question: &str, options: &[String], explanation: &str) -> String {
    let mut body = format!("QUESTION:\n{}\n\nOPTIONS:\n", question);
    for (i, option) in options.iter().enumerate() {
        body.push_str(&format!("{}. {}\n", option_label(i), option));
    }
    body.push_str("\nEXPLANATION:\n");
    body.push_str(explanation);
    body
}

/// 超过 `limit` 个字符时截断并追加标记，结果不超过 `limit` 个字符
pub fn truncate_with_marker(text: &str, limit: usize, marker: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(marker.chars().count());
    text.chars().take(keep).collect::<String>() + marker
}
