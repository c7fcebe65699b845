//! 投票记录模型
//!
//! 解析器产出、调度队列搬运、发送器消费的规范化题目

use serde::{Deserialize, Serialize};

/// 提交者（私聊用户）的标识
pub type OwnerId = i64;

/// 题干无法识别时的占位文本
pub const NO_QUESTION_TEXT: &str = "(No question text)";

/// 单条记录允许的最多选项数
pub const MAX_OPTIONS: usize = 5;

/// 规范化后的测验题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRecord {
    pub question: String,
    /// 保持原始顺序，可能包含空选项（发送前才压缩）
    pub options: Vec<String>,
    /// 指向压缩前 `options` 的下标
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

/// 去掉空选项后的选项列表及重新映射的正确答案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedOptions {
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl PollRecord {
    /// 创建记录，题干为空时使用占位文本
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_index: usize,
        explanation: impl Into<String>,
    ) -> Self {
        let question = question.into();
        Self {
            question: if question.trim().is_empty() {
                NO_QUESTION_TEXT.to_string()
            } else {
                question
            },
            options,
            correct_index,
            explanation: explanation.into(),
        }
    }

    /// 压缩空选项
    ///
    /// 非空选项少于 2 个时返回 `None`；原正确选项本身为空时映射到第一个选项
    pub fn compact_options(&self) -> Option<CompactedOptions> {
        let kept: Vec<usize> = self
            .options
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        if kept.len() < 2 {
            return None;
        }

        let correct_index = kept
            .iter()
            .position(|&i| i == self.correct_index)
            .unwrap_or(0);

        Some(CompactedOptions {
            options: kept.iter().map(|&i| self.options[i].clone()).collect(),
            correct_index,
        })
    }
}

/// 队列中的一项：归属者 + 记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub owner: OwnerId,
    pub record: PollRecord,
}

impl QueueItem {
    pub fn new(owner: OwnerId, record: PollRecord) -> Self {
        Self { owner, record }
    }
}

/// 选项字母标签：0 → 'A'
pub fn option_label(index: usize) -> char {
    (b'A' + index as u8) as char
}
