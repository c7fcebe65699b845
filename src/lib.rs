//! # Quiz Poll Dispatch
//!
//! 把用户提交的题目文本解析成测验投票，并按频率限制分批发送到目标频道
//!
//! ## 架构设计
//!
//! ### ① 解析层（Parsers）
//! - `parsers/` - 纯函数，只把文本变成 `PollRecord`
//! - `free_text` - 两种人工书写布局（`Question 1:` / `Question.`）
//! - `tabular` - CSV，表头映射优先，失败时按列位置推断
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - `MessagingEndpoint` 抽象
//! - `TelegramClient` - Bot API 实现
//! - `MockEndpoint` - 可编排响应、记录调用的测试实现
//!
//! ### ③ 业务能力层（Services）
//! - `PollSender` - 发送单条记录（间隔、限流重试、降级）
//! - `SettingsStore` - 每个提交者的目标频道和格式
//!
//! ### ④ 流程层（Workflow）
//! - `Command` - 命令解析
//! - `SubmissionFlow` - 一条消息的完整处理流程
//!
//! ### ⑤ 编排层（Orchestration）
//! - `DispatchQueue` - 多提交者共享队列 + 单飞状态
//! - `BatchScheduler` - 一次发送周期
//! - `App` - 长轮询主循环

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod parsers;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use clients::{ChatTarget, MessagingEndpoint, MockEndpoint, QuizRequest, TelegramClient};
pub use config::Config;
pub use error::{AppError, AppResult, EndpointError};
pub use models::{PollRecord, QueueItem};
pub use orchestrator::{BatchScheduler, CycleOutcome, CycleReport, DispatchQueue};
pub use parsers::{parse_submission, Submission};
pub use services::{OwnerFormat, PollSender, SendOutcome, SettingsStore};
pub use workflow::{Command, SubmissionFlow};
