//! 消息处理流程 - 流程层
//!
//! 核心职责：把一条用户消息变成回复文本，必要时把记录放入发送队列
//!
//! 流程顺序：
//! 1. 命令 → 更新设置并回复
//! 2. 提交 → 检测格式 → 解析 → 入队 → 回复发送计划 → 请求发送周期

use crate::config::Config;
use crate::models::OwnerId;
use crate::orchestrator::{DispatchPlan, DispatchQueue};
use crate::parsers::{parse_submission, InputFormat, Submission};
use crate::services::SettingsStore;
use crate::workflow::commands::{
    Command, FORMAT_SAVED_TEXT, HELP_TEXT, SET_CHANNEL_USAGE, SET_FORMAT_USAGE,
    UNKNOWN_COMMAND_TEXT,
};
use std::sync::Arc;
use tracing::{info, warn};

pub const NOT_RECOGNIZED_TEXT: &str =
    "❌ Invalid MCQ format: the text must contain 'Question' and 'Ans'/'Correct Answer'.";
pub const CSV_FAILED_TEXT: &str = "❌ Could not parse the CSV. Please check the format.";
pub const NO_POLLS_TEXT: &str = "❌ No polls were created (parsing failed). Please check the format.";

/// 一条消息的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowResponse {
    pub reply: String,
    /// 是否需要为该用户启动发送周期
    pub trigger_drain: bool,
}

impl FlowResponse {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            trigger_drain: false,
        }
    }
}

pub struct SubmissionFlow {
    queue: DispatchQueue,
    settings: Arc<SettingsStore>,
    config: Config,
}

impl SubmissionFlow {
    pub fn new(queue: DispatchQueue, settings: Arc<SettingsStore>, config: Config) -> Self {
        Self {
            queue,
            settings,
            config,
        }
    }

    /// 处理一条文本消息
    ///
    /// # 参数
    /// - `owner`: 发送者 ID
    /// - `text`: 消息文本
    ///
    /// # 返回
    /// 返回回复文本以及是否需要启动发送周期
    pub async fn handle(&self, owner: OwnerId, text: &str) -> FlowResponse {
        match Command::parse(text) {
            Command::Help => FlowResponse::reply(HELP_TEXT),
            Command::SetChannel { raw, target } => {
                self.settings.set_target(owner, target).await;
                FlowResponse::reply(format!("✅ Channel set: {}", raw))
            }
            Command::SetChannelUsage => FlowResponse::reply(SET_CHANNEL_USAGE),
            Command::SetFormat(format) => {
                self.settings.set_format(owner, format).await;
                FlowResponse::reply(FORMAT_SAVED_TEXT)
            }
            Command::SetFormatUsage => FlowResponse::reply(SET_FORMAT_USAGE),
            Command::Unknown(name) => {
                warn!("用户 {} 发送了未知命令: {}", owner, name);
                FlowResponse::reply(UNKNOWN_COMMAND_TEXT)
            }
            Command::Submission(text) => self.submit(owner, &text),
        }
    }

    fn submit(&self, owner: OwnerId, text: &str) -> FlowResponse {
        let (format, records) = match parse_submission(text) {
            Submission::NotRecognized => return FlowResponse::reply(NOT_RECOGNIZED_TEXT),
            Submission::Parsed { format, records } => (format, records),
        };

        if records.is_empty() {
            warn!("⚠️  用户 {} 的提交没有解析出任何题目 ({:?})", owner, format);
            return FlowResponse::reply(match format {
                InputFormat::Tabular => CSV_FAILED_TEXT,
                InputFormat::FreeText => NO_POLLS_TEXT,
            });
        }

        let plan = DispatchPlan::new(records.len(), &self.config);
        let queued = self.queue.enqueue(owner, records);
        info!(
            "📥 用户 {} 提交 {} 条题目 ({:?})，队列共 {} 条",
            owner, plan.total, format, queued
        );

        let reply = match format {
            InputFormat::Tabular => format!(
                "📁 CSV detected!\n✓ Loaded {} polls.\nAdded to queue!\nWill be sent in {} batch(es)\n⏱ Estimated time: {}\nStarting to send...",
                plan.total,
                plan.batches,
                plan.estimate_text()
            ),
            InputFormat::FreeText => format!(
                "📊 Processing your polls...\n✓ Found {} polls.\n\nAdded to queue! 📦\nWill be sent in {} batch(es) of up to {} polls each\n⏱ Estimated time: {}\nStarting to send...",
                plan.total,
                plan.batches,
                self.config.polls_per_batch,
                plan.estimate_text()
            ),
        };

        FlowResponse {
            reply,
            trigger_drain: true,
        }
    }
}
