//! 批次调度器 - 编排层
//!
//! ## 职责
//!
//! 为一个提交者运行一次发送周期：
//!
//! 1. 通过 [`DispatchQueue::begin_drain`] 取得单飞锁和该提交者的记录
//! 2. 检查记录和目标频道
//! 3. 按 `polls_per_batch` 分批，逐条交给 [`PollSender`]
//! 4. 批次之间休息 `batch_break`，并通知提交者进度
//! 5. 汇报成功数量，DrainGuard 离开作用域时释放单飞锁
//!
//! 单条记录的失败只计数，不会中断整个周期。

use crate::clients::{ChatTarget, MessagingEndpoint};
use crate::config::Config;
use crate::models::OwnerId;
use crate::orchestrator::dispatch_queue::{DispatchQueue, DrainStart};
use crate::services::{PollSender, SettingsStore};
use crate::utils::logging::{log_batch_complete, log_batch_start, log_cycle_summary};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const NOTHING_QUEUED_TEXT: &str = "❌ No polls found in your queue.";
pub const NO_TARGET_TEXT: &str = "❌ No channel set. Use /setchannel first.";
pub const STARTING_TEXT: &str = "Starting to send...";

/// 一次发送周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 已有周期在运行
    AlreadyProcessing { active_owner: Option<OwnerId> },
    NothingQueued,
    /// 未设置目标频道，取出的记录被丢弃
    NoTarget { dropped: usize },
    Completed(CycleReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub sent: usize,
    pub total: usize,
    pub batches: usize,
}

/// 入队时给提交者的发送计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub total: usize,
    pub batches: usize,
    pub estimate: Duration,
}

impl DispatchPlan {
    /// 预计耗时 = 总数 × 发送间隔 + (批次数 - 1) × 批次休息
    pub fn new(total: usize, config: &Config) -> Self {
        let batches = batch_count(total, config.polls_per_batch);
        let estimate = config.poll_delay() * total as u32
            + config.batch_break() * batches.saturating_sub(1) as u32;
        Self {
            total,
            batches,
            estimate,
        }
    }

    /// 形如 `~2 min 15 sec`
    pub fn estimate_text(&self) -> String {
        let secs = self.estimate.as_secs();
        format!("~{} min {} sec", secs / 60, secs % 60)
    }
}

/// 批次数 = ceil(total / batch_size)
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    let batch_size = batch_size.max(1);
    (total + batch_size - 1) / batch_size
}

pub struct BatchScheduler {
    queue: DispatchQueue,
    sender: PollSender,
    settings: Arc<SettingsStore>,
    endpoint: Arc<dyn MessagingEndpoint>,
    config: Config,
}

impl BatchScheduler {
    pub fn new(
        queue: DispatchQueue,
        endpoint: Arc<dyn MessagingEndpoint>,
        settings: Arc<SettingsStore>,
        config: Config,
    ) -> Self {
        Self {
            queue,
            sender: PollSender::new(endpoint.clone(), config.clone()),
            settings,
            endpoint,
            config,
        }
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// 为 `owner` 运行一次发送周期
    ///
    /// 已有周期在运行时直接返回 [`CycleOutcome::AlreadyProcessing`]
    pub async fn run_cycle(&self, owner: OwnerId) -> CycleOutcome {
        let guard = match self.queue.begin_drain(owner) {
            DrainStart::AlreadyProcessing { active_owner } => {
                info!(
                    "⏳ 用户 {} 的发送请求被忽略，当前正在处理用户 {:?}",
                    owner, active_owner
                );
                return CycleOutcome::AlreadyProcessing { active_owner };
            }
            DrainStart::Started(guard) => guard,
        };

        let owner_chat = ChatTarget::from(owner);
        let records = guard.records();

        if records.is_empty() {
            self.notify(&owner_chat, NOTHING_QUEUED_TEXT).await;
            return CycleOutcome::NothingQueued;
        }

        let Some(target) = self.settings.target(owner) else {
            let dropped = records.len();
            warn!("⚠️  用户 {} 未设置目标频道，丢弃 {} 条记录", owner, dropped);
            self.notify(
                &owner_chat,
                &format!(
                    "{}\n{} queued poll(s) were discarded, please resend them after setting a channel.",
                    NO_TARGET_TEXT, dropped
                ),
            )
            .await;
            return CycleOutcome::NoTarget { dropped };
        };

        let format = self.settings.format(owner);
        let total = records.len();
        let batch_size = self.config.polls_per_batch.max(1);
        let total_batches = batch_count(total, batch_size);
        let mut sent = 0;

        self.notify(&owner_chat, STARTING_TEXT).await;

        for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
            let batch_num = batch_idx + 1;
            let batch_start = batch_idx * batch_size;
            log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let mut batch_sent = 0;
            for record in batch {
                if self.sender.send(record, &format, &target).await.is_delivered() {
                    batch_sent += 1;
                }
            }
            sent += batch_sent;
            log_batch_complete(batch_num, batch_sent, batch.len());

            if batch_num < total_batches {
                self.notify(
                    &owner_chat,
                    &format!("⏸ {}s break...", self.config.batch_break_secs),
                )
                .await;
                tokio::time::sleep(self.config.batch_break()).await;
            }
        }

        self.notify(
            &owner_chat,
            &format!(
                "✅ All done! Successfully sent {}/{} polls to the channel.",
                sent, total
            ),
        )
        .await;
        log_cycle_summary(owner, sent, total);

        CycleOutcome::Completed(CycleReport {
            sent,
            total,
            batches: total_batches,
        })
    }

    /// 通知提交者，失败只记录日志
    async fn notify(&self, owner_chat: &ChatTarget, text: &str) {
        if let Err(e) = self.endpoint.send_message(owner_chat, text).await {
            warn!("⚠️  通知用户 {} 失败: {}", owner_chat, e);
        }
    }
}
