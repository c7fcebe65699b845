//! 发送队列 - 编排层
//!
//! 多个提交者共享一个按到达顺序排列的队列。
//! 同一时刻只允许一个发送周期运行；入队永不阻塞。

use crate::models::{OwnerId, PollRecord, QueueItem};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// 发送周期状态快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingState {
    pub busy: bool,
    pub active_owner: Option<OwnerId>,
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<QueueItem>,
    state: ProcessingState,
}

/// 共享发送队列，clone 后指向同一个队列
#[derive(Clone, Default)]
pub struct DispatchQueue {
    inner: Arc<Mutex<QueueInner>>,
}

/// 尝试开始发送周期的结果
pub enum DrainStart {
    /// 已有周期在运行，本次请求不做任何事
    AlreadyProcessing { active_owner: Option<OwnerId> },
    Started(DrainGuard),
}

/// 正在运行的发送周期
///
/// 持有该提交者被取出的全部记录；drop 时清除忙碌状态
pub struct DrainGuard {
    queue: DispatchQueue,
    owner: OwnerId,
    records: Vec<PollRecord>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加记录，返回追加后的队列长度
    pub fn enqueue(&self, owner: OwnerId, records: impl IntoIterator<Item = PollRecord>) -> usize {
        let mut inner = self.inner.lock();
        inner
            .items
            .extend(records.into_iter().map(|r| QueueItem::new(owner, r)));
        inner.items.len()
    }

    /// 开始为 `owner` 发送
    ///
    /// 标记忙碌与取出该提交者的记录在同一把锁内完成，
    /// 其余提交者的记录保持原有相对顺序留在队列中
    pub fn begin_drain(&self, owner: OwnerId) -> DrainStart {
        let mut inner = self.inner.lock();
        if inner.state.busy {
            return DrainStart::AlreadyProcessing {
                active_owner: inner.state.active_owner,
            };
        }

        let (mine, rest): (VecDeque<QueueItem>, VecDeque<QueueItem>) =
            std::mem::take(&mut inner.items)
                .into_iter()
                .partition(|item| item.owner == owner);
        inner.items = rest;
        inner.state = ProcessingState {
            busy: true,
            active_owner: Some(owner),
        };
        debug!(
            "用户 {} 取出 {} 条记录，队列剩余 {} 条",
            owner,
            mine.len(),
            inner.items.len()
        );

        DrainStart::Started(DrainGuard {
            queue: self.clone(),
            owner,
            records: mine.into_iter().map(|item| item.record).collect(),
        })
    }

    pub fn state(&self) -> ProcessingState {
        self.inner.lock().state
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 队列中的记录快照（按到达顺序）
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.inner.lock().items.iter().cloned().collect()
    }

    fn finish(&self) {
        self.inner.lock().state = ProcessingState::default();
    }
}

impl DrainGuard {
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn records(&self) -> &[PollRecord] {
        &self.records
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.queue.finish();
    }
}
