//! 应用入口 - 编排层
//!
//! 持有 Bot API 客户端、发送队列和调度器，
//! 通过长轮询接收消息，发送周期在独立任务中运行，
//! 因此周期运行期间仍能接收新的提交。

use crate::clients::{ChatTarget, MessagingEndpoint, TelegramClient, Update};
use crate::config::Config;
use crate::error::{AppResult, EndpointError};
use crate::orchestrator::{BatchScheduler, CycleOutcome, DispatchQueue};
use crate::services::SettingsStore;
use crate::utils::logging::{log_startup, truncate_text};
use crate::workflow::SubmissionFlow;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 拉取更新失败后的等待时间
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);
const NO_TEXT_REPLY: &str = "No text found in update.";

/// 应用主结构
pub struct App {
    config: Config,
    client: Arc<TelegramClient>,
    flow: SubmissionFlow,
    scheduler: Arc<BatchScheduler>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        log_startup(&config);

        let settings = Arc::new(SettingsStore::load(&config.data_file).await);
        let client = Arc::new(TelegramClient::new(&config)?);
        let endpoint: Arc<dyn MessagingEndpoint> = client.clone();

        let queue = DispatchQueue::new();
        let scheduler = Arc::new(BatchScheduler::new(
            queue.clone(),
            endpoint,
            settings.clone(),
            config.clone(),
        ));
        let flow = SubmissionFlow::new(queue, settings, config.clone());

        Ok(Self {
            config,
            client,
            flow,
            scheduler,
        })
    }

    /// 运行长轮询主循环，收到 Ctrl-C 后退出
    pub async fn run(&self) -> Result<()> {
        info!("🤖 开始接收消息...");
        let mut offset: Option<i64> = None;

        loop {
            let result = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("👋 收到退出信号，程序结束");
                    return Ok(());
                }
                result = self.client.get_updates(offset, self.config.long_poll_timeout_secs) => result,
            };

            let updates = match result {
                Ok(updates) => updates,
                Err(EndpointError::RateLimited { retry_after }) => {
                    warn!("⏳ 拉取更新被限流，{} 秒后重试", retry_after);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                Err(e) => {
                    error!("❌ 拉取更新失败: {}", e);
                    tokio::time::sleep(POLL_ERROR_PAUSE).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                self.handle_update(update).await;
            }
        }
    }

    async fn handle_update(&self, update: Update) {
        let Some(message) = update.into_message() else {
            return;
        };
        let owner = message.owner_id();
        let chat = ChatTarget::Id(message.chat.id);

        let Some(text) = message.text.as_deref() else {
            self.reply(&chat, NO_TEXT_REPLY).await;
            return;
        };
        debug!("收到用户 {} 的消息: {}", owner, truncate_text(text, 60));

        let response = self.flow.handle(owner, text).await;
        self.reply(&chat, &response.reply).await;

        if response.trigger_drain {
            let scheduler = self.scheduler.clone();
            tokio::spawn(async move {
                if let CycleOutcome::AlreadyProcessing { active_owner } =
                    scheduler.run_cycle(owner).await
                {
                    debug!(
                        "用户 {} 的记录留在队列中，等待用户 {:?} 的周期结束",
                        owner, active_owner
                    );
                }
            });
        }
    }

    async fn reply(&self, chat: &ChatTarget, text: &str) {
        if let Err(e) = self.client.send_message(chat, text).await {
            warn!("⚠️  回复 {} 失败: {}", chat, e);
        }
    }
}
